//! Pin-level transfers: the enable strobe, nibble/byte writes and reads, and data line direction.

use crate::delay::Delay;
use crate::lcd::hd44780::LcdResult;
use crate::lcd::hd44780::driver::{DataDirection, GpioHD44780Driver};
use crate::{GpioPort, PinDirection};
use log::trace;
use std::time::Duration;

/// Enable low time before the rising edge (address setup).
pub(super) const ENABLE_SETUP: Duration = Duration::from_micros(1);
/// Minimum enable high time.
pub(super) const ENABLE_PULSE_WIDTH: Duration = Duration::from_nanos(450);
/// Time most instructions take to execute after the falling edge.
pub(super) const EXECUTION_TIME: Duration = Duration::from_micros(37);
/// Time from the enable rising edge until read data is valid.
pub(super) const READ_ACCESS: Duration = Duration::from_micros(1);

impl<P: GpioPort, D: Delay> GpioHD44780Driver<P, D> {
    /// Strobes the E pin: low, high, low again, holding each level for its minimum time.
    ///
    /// The controller latches the data lines on the falling edge.
    pub(super) fn pulse_enable(&mut self) -> LcdResult<()> {
        self.port.write_pin(self.pin_e, false)?;
        self.delay.delay(ENABLE_SETUP);

        self.port.write_pin(self.pin_e, true)?;
        self.delay.delay(ENABLE_PULSE_WIDTH);

        self.port.write_pin(self.pin_e, false)?;
        self.delay.delay(EXECUTION_TIME);
        Ok(())
    }

    /// Drives the low `count` data lines with the low `count` bits of `value`, LSb first.
    fn drive_lines(&mut self, value: u8, count: usize) -> LcdResult<()> {
        for (i, &pin) in self.data_bus.pins().iter().take(count).enumerate() {
            self.port.write_pin(pin, (value >> i) & 1 != 0)?;
        }
        Ok(())
    }

    /// Samples the low `count` data lines while E is high, LSb first.
    fn sample_lines(&mut self, count: usize) -> LcdResult<u8> {
        self.port.write_pin(self.pin_e, true)?;
        self.delay.delay(READ_ACCESS);

        let mut value = 0u8;
        for (i, &pin) in self.data_bus.pins().iter().take(count).enumerate() {
            if self.port.read_pin(pin)? {
                value |= 1 << i;
            }
        }

        self.port.write_pin(self.pin_e, false)?;
        self.delay.delay(ENABLE_SETUP);
        Ok(value)
    }

    /// Writes the low 4 bits of `value` to the low 4 data lines and pulses E.
    pub(super) fn write_nibble(&mut self, value: u8) -> LcdResult<()> {
        trace!("Writing nibble: {:04b}", value & 0x0F);
        self.drive_lines(value, 4)?;
        self.pulse_enable()
    }

    /// Writes `value` to all 8 data lines and pulses E.
    pub(super) fn write_byte(&mut self, value: u8) -> LcdResult<()> {
        trace!("Writing byte: {:08b}", value);
        self.drive_lines(value, 8)?;
        self.pulse_enable()
    }

    /// Reads one nibble from the low 4 data lines into bits 0–3.
    pub(super) fn read_nibble(&mut self) -> LcdResult<u8> {
        self.sample_lines(4)
    }

    /// Reads a byte from all 8 data lines.
    pub(super) fn read_byte(&mut self) -> LcdResult<u8> {
        self.sample_lines(8)
    }

    /// Samples only DB7 during a busy flag read.
    ///
    /// On the 4-bit bus the low nibble still has to be clocked out, so E is pulsed a second time
    /// without sampling anything.
    pub(super) fn sample_busy_flag(&mut self) -> LcdResult<bool> {
        self.port.write_pin(self.pin_e, true)?;
        self.delay.delay(READ_ACCESS);
        let busy = self.port.read_pin(self.data_bus.top_pin())?;
        self.port.write_pin(self.pin_e, false)?;
        self.delay.delay(ENABLE_SETUP);

        if self.data_bus.is_4bit() {
            self.port.write_pin(self.pin_e, true)?;
            self.delay.delay(READ_ACCESS);
            self.port.write_pin(self.pin_e, false)?;
            self.delay.delay(ENABLE_SETUP);
        }

        Ok(busy)
    }

    /// Switches all active data lines to `direction`, unless they already are.
    pub(super) fn set_data_direction(&mut self, direction: DataDirection) -> LcdResult<()> {
        if self.direction == Some(direction) {
            return Ok(());
        }

        let pin_direction = match direction {
            DataDirection::Write => PinDirection::Output,
            DataDirection::Read => PinDirection::Input,
        };
        for &pin in self.data_bus.pins() {
            self.port.configure_pin(pin, pin_direction)?;
        }
        self.direction = Some(direction);

        trace!("Data bus switched to {:?}", direction);
        Ok(())
    }
}
