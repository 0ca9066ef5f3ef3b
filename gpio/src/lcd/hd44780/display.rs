use crate::lcd::hd44780::driver::{BusyWait, HD44780Driver};
use crate::lcd::hd44780::flags::{
    CursorDirection, DisplayControl, EntryMode, FunctionSet, Instruction, TextDirection,
};
use crate::lcd::hd44780::{BusWidth, Geometry, LcdConfig, LcdError, LcdResult};
use log::{debug, info, trace, warn};
use std::time::Duration;

/// Worst-case execution time of clear display and return home (datasheet: 1.52 ms).
pub const LONG_COMMAND_FALLBACK: Duration = Duration::from_millis(2);

/// Step of the power-on initialization sequence.
///
/// The sequence is the one from the datasheet (figures 23 and 24): the controller may power up in
/// either interface mode, so the 8-bit function set is repeated until it's certainly listening,
/// and only then switched to 4 bits if needed.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum InitStep {
    /// Control lines idle, waiting for the supply to settle.
    PowerOn,
    /// Sending the 8-bit function set, `attempt` 0 to 2.
    BusWidthNegotiation { attempt: u8 },
    /// A single `0x2` nibble switching the controller to the 4-bit interface.
    FourBitSwitch,
    /// The real function set: interface width, line count, and font.
    FunctionSet,
    DisplayOn,
    ClearDisplay,
    EntryModeSet,
    Ready,
}

impl InitStep {
    /// The step following this one on a bus of the given width.
    pub fn next(self, width: BusWidth) -> InitStep {
        match self {
            InitStep::PowerOn => InitStep::BusWidthNegotiation { attempt: 0 },
            InitStep::BusWidthNegotiation { attempt } if attempt < 2 => {
                InitStep::BusWidthNegotiation {
                    attempt: attempt + 1,
                }
            }
            InitStep::BusWidthNegotiation { .. } => match width {
                BusWidth::Four => InitStep::FourBitSwitch,
                BusWidth::Eight => InitStep::FunctionSet,
            },
            InitStep::FourBitSwitch => InitStep::FunctionSet,
            InitStep::FunctionSet => InitStep::DisplayOn,
            InitStep::DisplayOn => InitStep::ClearDisplay,
            InitStep::ClearDisplay => InitStep::EntryModeSet,
            InitStep::EntryModeSet | InitStep::Ready => InitStep::Ready,
        }
    }

    /// Minimum time to wait after the step before starting the next one.
    ///
    /// Zero for steps covered by the enable pulse hold time. For [InitStep::ClearDisplay] this is
    /// the fallback used when the busy flag can't be polled.
    pub fn settle_time(self) -> Duration {
        match self {
            // Datasheet: more than 40 ms after Vcc rises to 2.7 V
            InitStep::PowerOn => Duration::from_millis(50),
            // Datasheet: more than 4.1 ms
            InitStep::BusWidthNegotiation { attempt: 0 } => Duration::from_millis(5),
            // Datasheet: more than 100 µs
            InitStep::BusWidthNegotiation { .. } => Duration::from_millis(1),
            InitStep::ClearDisplay => LONG_COMMAND_FALLBACK,
            InitStep::FourBitSwitch
            | InitStep::FunctionSet
            | InitStep::DisplayOn
            | InitStep::EntryModeSet
            | InitStep::Ready => Duration::ZERO,
        }
    }
}

/// HD44780 display controller.
///
/// Owns the driver, runs the initialization sequence and keeps shadow copies of the control
/// registers, since the controller doesn't allow reading them back. Every command goes through
/// here, so the copies always match what was last written.
#[derive(Debug)]
pub struct Lcd<T: HD44780Driver> {
    driver: T,
    geometry: Geometry,
    poll_ceiling: u32,
    function: FunctionSet,
    control: DisplayControl,
    entry: EntryMode,
    row_offsets: [u8; 4],
    step: InitStep,
}

impl<T: HD44780Driver> Lcd<T> {
    pub fn new(driver: T, config: LcdConfig) -> Self {
        let geometry = config.geometry;
        let function = FunctionSet {
            bus_width: driver.bus_width(),
            two_lines: geometry.lines() > 1,
            font: geometry.font(),
        };
        Lcd {
            driver,
            geometry,
            poll_ceiling: config.poll_ceiling,
            function,
            control: DisplayControl::default(),
            entry: EntryMode::default(),
            row_offsets: geometry.row_offsets(),
            step: InitStep::PowerOn,
        }
    }

    /// Runs the power-on initialization sequence.
    ///
    /// Leaves the display on and cleared, with the cursor and blinking off, text flowing left to
    /// right and autoscroll off. Succeeds only once.
    ///
    /// If a step fails, the sequence goes back to [InitStep::PowerOn] and the error is returned,
    /// so calling `init` again starts over. The datasheet sequence works from any interface mode
    /// the controller was left in.
    pub fn init(&mut self) -> LcdResult<()> {
        if self.is_initialized() {
            return Err(LcdError::AlreadyInitialized);
        }

        let width = self.function.bus_width;
        while self.step != InitStep::Ready {
            debug!("LCD init step: {:?}", self.step);
            if let Err(err) = self.run_step(self.step) {
                warn!("LCD init failed at {:?}: {}", self.step, err);
                self.step = InitStep::PowerOn;
                self.control = DisplayControl::default();
                self.entry = EntryMode::default();
                return Err(err);
            }
            self.step = self.step.next(width);
        }

        info!("LCD ready ({:?})", self.function);
        Ok(())
    }

    fn run_step(&mut self, step: InitStep) -> LcdResult<()> {
        match step {
            InitStep::PowerOn => {
                self.driver.prepare()?;
                self.driver.delay(step.settle_time());
            }
            InitStep::BusWidthNegotiation { .. } => {
                match self.function.bus_width {
                    BusWidth::Four => self.driver.send_nibble(0x3)?,
                    BusWidth::Eight => self.driver.function_set(self.function)?,
                }
                self.driver.delay(step.settle_time());
            }
            InitStep::FourBitSwitch => self.driver.send_nibble(0x2)?,
            InitStep::FunctionSet => self.driver.function_set(self.function)?,
            InitStep::DisplayOn => {
                self.control = DisplayControl {
                    display_on: true,
                    cursor_on: false,
                    blink_on: false,
                };
                self.driver.set_display_control(self.control)?;
            }
            InitStep::ClearDisplay => {
                self.driver.clear_display()?;
                self.wait_for_completion()?;
            }
            InitStep::EntryModeSet => {
                self.entry = EntryMode {
                    direction: TextDirection::LeftToRight,
                    autoscroll: false,
                };
                self.driver.set_entry_mode(self.entry)?;
            }
            InitStep::Ready => {}
        }
        Ok(())
    }

    fn ensure_ready(&self) -> LcdResult<()> {
        if self.step == InitStep::Ready {
            Ok(())
        } else {
            Err(LcdError::NotInitialized)
        }
    }

    /// Waits for a long instruction (clear display, return home) to finish.
    fn wait_for_completion(&mut self) -> LcdResult<()> {
        match self.driver.wait_until_ready(self.poll_ceiling)? {
            BusyWait::Ready { polls } => trace!("Ready after {} polls", polls),
            BusyWait::TimedOut { .. } => {}
            BusyWait::Unavailable => self.driver.delay(LONG_COMMAND_FALLBACK),
        }
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.step == InitStep::Ready
    }

    pub fn init_step(&self) -> InitStep {
        self.step
    }

    pub fn geometry(&self) -> Geometry {
        self.geometry
    }

    /// Last function set written.
    pub fn function(&self) -> FunctionSet {
        self.function
    }

    /// Last display control written.
    pub fn display_control(&self) -> DisplayControl {
        self.control
    }

    /// Last entry mode written.
    ///
    /// A clear resets the controller to left-to-right, but not this copy. It keeps reporting the
    /// last entry mode command until the next one.
    pub fn entry_mode(&self) -> EntryMode {
        self.entry
    }

    /// DDRAM address of the first character of each row; only the first `lines` are used.
    pub fn row_offsets(&self) -> &[u8] {
        let used = usize::from(self.geometry.lines()).min(self.row_offsets.len());
        &self.row_offsets[..used]
    }

    pub fn driver(&self) -> &T {
        &self.driver
    }

    pub fn driver_mut(&mut self) -> &mut T {
        &mut self.driver
    }

    fn update_control(&mut self, update: impl FnOnce(&mut DisplayControl)) -> LcdResult<()> {
        self.ensure_ready()?;
        update(&mut self.control);
        self.driver.set_display_control(self.control)
    }

    fn update_entry(&mut self, update: impl FnOnce(&mut EntryMode)) -> LcdResult<()> {
        self.ensure_ready()?;
        update(&mut self.entry);
        self.driver.set_entry_mode(self.entry)
    }

    pub fn set_display_on(&mut self, on: bool) -> LcdResult<()> {
        self.update_control(|control| control.display_on = on)
    }

    pub fn set_cursor_visible(&mut self, visible: bool) -> LcdResult<()> {
        self.update_control(|control| control.cursor_on = visible)
    }

    pub fn set_blink(&mut self, blink: bool) -> LcdResult<()> {
        self.update_control(|control| control.blink_on = blink)
    }

    pub fn set_text_direction(&mut self, direction: TextDirection) -> LcdResult<()> {
        self.update_entry(|entry| entry.direction = direction)
    }

    pub fn left_to_right(&mut self) -> LcdResult<()> {
        self.set_text_direction(TextDirection::LeftToRight)
    }

    pub fn right_to_left(&mut self) -> LcdResult<()> {
        self.set_text_direction(TextDirection::RightToLeft)
    }

    /// With autoscroll on, the whole display shifts on every character instead of the cursor
    /// moving.
    pub fn set_autoscroll(&mut self, autoscroll: bool) -> LcdResult<()> {
        self.update_entry(|entry| entry.autoscroll = autoscroll)
    }

    /// Shifts the whole display without touching DDRAM.
    pub fn scroll_display_left(&mut self) -> LcdResult<()> {
        self.ensure_ready()?;
        self.driver.cursor_shift(true, CursorDirection::Left)
    }

    pub fn scroll_display_right(&mut self) -> LcdResult<()> {
        self.ensure_ready()?;
        self.driver.cursor_shift(true, CursorDirection::Right)
    }

    pub fn move_cursor_left(&mut self) -> LcdResult<()> {
        self.ensure_ready()?;
        self.driver.cursor_shift(false, CursorDirection::Left)
    }

    pub fn move_cursor_right(&mut self) -> LcdResult<()> {
        self.ensure_ready()?;
        self.driver.cursor_shift(false, CursorDirection::Right)
    }

    /// Clears the display and moves the cursor home, waiting until the controller is done.
    ///
    /// The controller also switches back to left-to-right entry. [Self::entry_mode] doesn't follow,
    /// so call [Self::set_text_direction] afterwards to keep right-to-left text.
    pub fn clear(&mut self) -> LcdResult<()> {
        self.ensure_ready()?;
        self.driver.clear_display()?;
        self.wait_for_completion()
    }

    /// Moves the cursor home and undoes any display shift, waiting until the controller is done.
    pub fn home(&mut self) -> LcdResult<()> {
        self.ensure_ready()?;
        self.driver.return_home()?;
        self.wait_for_completion()
    }

    /// Moves the cursor to `col` on `row`, both counted from 0.
    ///
    /// Rows past the last one are clamped to it. Columns aren't checked: on a line shorter than
    /// the controller's 40 characters, a large column lands in the invisible part of DDRAM, or on
    /// 4-line panels, on the row below.
    pub fn set_cursor(&mut self, col: u8, row: u8) -> LcdResult<()> {
        self.ensure_ready()?;
        let last_row = self.row_offsets().len() - 1;
        let row = usize::from(row).min(last_row);
        let address = col.wrapping_add(self.row_offsets[row]) & 0x7F;
        self.driver.set_ddram_address(address)
    }

    /// Stores a custom glyph in one of the 8 CGRAM slots. `slot` is taken modulo 8.
    ///
    /// Each byte is one row of pixels, top to bottom, with the rightmost pixel in bit 0. The glyph
    /// shows up as character code `slot`. Leaves the address counter in CGRAM, so set the cursor
    /// before printing again.
    pub fn create_char(&mut self, slot: u8, glyph: &[u8; 8]) -> LcdResult<()> {
        self.ensure_ready()?;
        let slot = slot & 0x7;
        self.driver.set_cgram_address(slot << 3)?;
        for &row in glyph {
            self.driver.send_data(row)?;
        }
        Ok(())
    }

    /// Writes `text` at the cursor. Non-ASCII characters are replaced by `?`.
    ///
    /// No wrapping: text past the end of a line continues wherever the address counter goes.
    pub fn print(&mut self, text: &str) -> LcdResult<()> {
        self.ensure_ready()?;
        for c in text.chars() {
            if c.is_ascii() {
                self.driver.send_data(c as u8)?;
            } else {
                warn!("Non-ASCII character: {}", c);
                self.driver.send_data(b'?')?;
            }
        }
        Ok(())
    }

    /// Sends a raw instruction byte.
    ///
    /// Display control and entry mode instructions update the shadow copies. A function set that
    /// would change the interface width is refused, since the bus wiring can't follow it.
    pub fn write_command(&mut self, command: u8) -> LcdResult<()> {
        self.ensure_ready()?;
        let instruction = Instruction::decode(command);
        if let Some(Instruction::FunctionSet(function)) = instruction {
            if function.bus_width != self.function.bus_width {
                return Err(LcdError::InvalidArgument);
            }
        }

        self.driver.send_command(command)?;

        match instruction {
            Some(Instruction::DisplayControl(control)) => self.control = control,
            Some(Instruction::EntryModeSet(entry)) => self.entry = entry,
            Some(Instruction::FunctionSet(function)) => self.function = function,
            Some(Instruction::ClearDisplay | Instruction::ReturnHome) => {
                self.wait_for_completion()?
            }
            _ => {}
        }
        Ok(())
    }

    /// Writes a raw byte to DDRAM or CGRAM, wherever the address counter points.
    pub fn write_data(&mut self, data: u8) -> LcdResult<()> {
        self.ensure_ready()?;
        self.driver.send_data(data)
    }

    /// Reads the byte at the address counter, which then moves like after a write.
    pub fn read_data(&mut self) -> LcdResult<u8> {
        self.ensure_ready()?;
        self.driver.read_data()
    }

    /// Raw busy flag (bit 7) and address counter (bits 0–6).
    pub fn read_address_and_busy(&mut self) -> LcdResult<u8> {
        self.ensure_ready()?;
        self.driver.read_command()
    }

    /// Whether the controller is still executing an instruction. Always `true` without the R/W
    /// line.
    pub fn is_busy(&mut self) -> LcdResult<bool> {
        self.ensure_ready()?;
        self.driver.is_busy()
    }

    /// Reads `len` characters of DDRAM starting at `col` on `row`, same addressing as
    /// [Self::set_cursor]. Leaves the cursor after the last character read.
    pub fn read_at(&mut self, col: u8, row: u8, len: usize) -> LcdResult<Vec<u8>> {
        self.ensure_ready()?;
        if !self.driver.can_read() {
            return Err(LcdError::ReadLineDisconnected);
        }
        self.set_cursor(col, row)?;
        (0..len).map(|_| self.driver.read_data()).collect()
    }

    /// Reads the visible part of a whole row.
    ///
    /// Character codes up to 31 (custom glyphs and their mirrors) come back as spaces. Use
    /// [Self::read_at] for the raw bytes.
    pub fn read_line(&mut self, row: u8) -> LcdResult<String> {
        let columns = usize::from(self.geometry.columns());
        let bytes = self.read_at(0, row, columns)?;
        Ok(bytes
            .into_iter()
            .map(|byte| if byte <= 31 { ' ' } else { char::from(byte) })
            .collect())
    }
}
