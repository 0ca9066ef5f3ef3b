mod bus;
mod gpio;

use crate::lcd::hd44780::flags::{
    ADDRESS_MASK, BUSY_FLAG, CursorDirection, DisplayControl, EntryMode, FunctionSet, Instruction,
};
use crate::lcd::hd44780::{BusWidth, LcdError, LcdResult};
pub use gpio::*;
use log::warn;
use std::fmt::Debug;
use std::time::Duration;

/// Outcome of [HD44780Driver::wait_until_ready].
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum BusyWait {
    /// The busy flag cleared after `polls` reads.
    Ready { polls: u32 },
    /// The busy flag was still set after `polls` reads. The display is assumed ready anyway.
    TimedOut { polls: u32 },
    /// The busy flag can't be read (no R/W line). The caller has to wait a fixed time instead.
    Unavailable,
}

/// Register-level interface to an HD44780 controller.
///
/// The default methods encode the instruction set on top of the few raw operations the
/// implementation provides. They don't keep any state; see [crate::lcd::hd44780::Lcd] for that.
pub trait HD44780Driver: Debug {
    /// Width of the data bus in use.
    fn bus_width(&self) -> BusWidth;

    /// Whether the R/W line is wired, making reads (and the busy flag) available.
    fn can_read(&self) -> bool;

    /// Brings the control and data lines to their idle state: all outputs, all low.
    fn prepare(&mut self) -> LcdResult<()>;

    /// Sends a single nibble (the low 4 bits of `nibble`) on the low 4 data lines with one enable
    /// pulse. Only meaningful during initialization, before the interface width is settled.
    fn send_nibble(&mut self, nibble: u8) -> LcdResult<()>;

    /// Sends a command to the HD44780 controller.
    /// Sets the RS pin to 0 (command).
    fn send_command(&mut self, command: u8) -> LcdResult<()>;

    /// Sends data to the HD44780 controller.
    /// Sets the RS pin to 1 (data).
    fn send_data(&mut self, data: u8) -> LcdResult<()>;

    /// Reads the busy flag and address counter.
    /// Sets the RS pin to 0 (command).
    ///
    /// Returns both in a single u8, for easier usage use [Self::get_busy_flag_and_address], which
    /// uses this function internally.
    fn read_command(&mut self) -> LcdResult<u8>;

    /// Reads data from the HD44780 controller.
    /// Sets the RS pin to 1 (data).
    fn read_data(&mut self) -> LcdResult<u8>;

    /// Blocks for at least `duration`.
    fn delay(&mut self, duration: Duration);

    /// Reads the busy flag and address counter.
    fn get_busy_flag_and_address(&mut self) -> LcdResult<(bool, u8)> {
        let command = self.read_command()?;
        let busy_flag = command & BUSY_FLAG != 0;
        let address = command & ADDRESS_MASK;
        Ok((busy_flag, address))
    }

    /// Whether the controller is still processing the last instruction.
    ///
    /// Always `true` without the R/W line, as there's no way to tell.
    fn is_busy(&mut self) -> LcdResult<bool> {
        if !self.can_read() {
            return Ok(true);
        }
        Ok(self.get_busy_flag_and_address()?.0)
    }

    /// Polls the busy flag until it clears, at most `ceiling` times.
    ///
    /// Never blocks indefinitely: reaching the ceiling is reported, not treated as an error.
    fn wait_until_ready(&mut self, ceiling: u32) -> LcdResult<BusyWait> {
        if !self.can_read() {
            return Ok(BusyWait::Unavailable);
        }
        for polls in 0..ceiling {
            if !self.is_busy()? {
                return Ok(BusyWait::Ready { polls: polls + 1 });
            }
        }
        warn!("Display still busy after {} polls, carrying on", ceiling);
        Ok(BusyWait::TimedOut { polls: ceiling })
    }

    /// Clears the display and sets the cursor to the home position.
    fn clear_display(&mut self) -> LcdResult<()> {
        self.send_command(Instruction::ClearDisplay.encode())
    }

    /// Sets the cursor to the home position.
    fn return_home(&mut self) -> LcdResult<()> {
        self.send_command(Instruction::ReturnHome.encode())
    }

    /// Sets the display to the specified entry mode.
    fn set_entry_mode(&mut self, mode: EntryMode) -> LcdResult<()> {
        self.send_command(Instruction::EntryModeSet(mode).encode())
    }

    /// Sets the display on/off, cursor on/off, and blinking on/off.
    fn set_display_control(&mut self, control: DisplayControl) -> LcdResult<()> {
        self.send_command(Instruction::DisplayControl(control).encode())
    }

    /// Moves the cursor or shifts the display.
    fn cursor_shift(&mut self, display_shift: bool, direction: CursorDirection) -> LcdResult<()> {
        self.send_command(
            Instruction::Shift {
                display: display_shift,
                direction,
            }
            .encode(),
        )
    }

    /// Sets the function set.
    fn function_set(&mut self, function: FunctionSet) -> LcdResult<()> {
        self.send_command(Instruction::FunctionSet(function).encode())
    }

    /// Sets the CGRAM address.
    fn set_cgram_address(&mut self, address: u8) -> LcdResult<()> {
        if address > 0b00111111 {
            return Err(LcdError::InvalidArgument);
        }
        self.send_command(Instruction::SetCgramAddress(address).encode())
    }

    /// Sets the DDRAM address.
    fn set_ddram_address(&mut self, address: u8) -> LcdResult<()> {
        if address > ADDRESS_MASK {
            return Err(LcdError::InvalidArgument);
        }
        self.send_command(Instruction::SetDdramAddress(address).encode())
    }
}
