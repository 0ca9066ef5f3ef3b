//! Simulated HD44780 behind the [GpioPort] interface.
//!
//! [SimulatedHd44780] watches the pins the way the controller would: it latches the data lines
//! on the falling edge of E, drives them on the rising edge of E during reads, keeps DDRAM, CGRAM
//! and the control registers, and tracks how long each instruction keeps it busy. Time only
//! advances through the paired [SimDelay].
//!
//! Both handles are cheap clones sharing one device, so a test can hand one to the driver and keep
//! another for inspection.

use crate::delay::Delay;
use crate::lcd::hd44780::flags::{
    ADDRESS_MASK, CursorDirection, DisplayControl, EntryMode, FunctionSet, Instruction,
    TextDirection,
};
use crate::lcd::hd44780::{BusWidth, LcdWiring};
use crate::{GpioError, GpioPort, GpioResult, PinDirection, PinId};
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::time::Duration;

/// Time after power-on before the controller accepts instructions.
pub const POWER_ON_TIME: Duration = Duration::from_millis(40);
/// Execution time of clear display and return home.
pub const LONG_EXECUTION_TIME: Duration = Duration::from_micros(1520);
/// Execution time of every other instruction and of data writes.
pub const SHORT_EXECUTION_TIME: Duration = Duration::from_micros(37);

const DDRAM_SIZE: usize = 128;
const CGRAM_SIZE: usize = 64;
const CGRAM_MASK: u8 = 0b00111111;

/// What the busy flag reports.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq)]
pub enum BusyMode {
    /// Busy while the last instruction is executing.
    #[default]
    Timed,
    /// Never busy.
    Idle,
    /// Always busy, as if the controller hung.
    Stuck,
}

/// Something the host did to the simulated display.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum SimEvent {
    Configure(PinId, PinDirection),
    Write(PinId, bool),
    Read(PinId),
    Delay(Duration),
}

/// A protocol violation the controller would have silently mishandled.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Violation {
    /// A byte was latched before the power-on time had passed.
    TooEarly { at: Duration },
    /// A byte was latched while the previous instruction was still executing.
    WhileBusy { at: Duration },
}

#[derive(Debug, Copy, Clone, Default)]
struct PinState {
    direction: Option<PinDirection>,
    level: bool,
}

#[derive(Debug)]
struct Device {
    wiring: LcdWiring,
    pins: HashMap<PinId, PinState>,
    busy_mode: BusyMode,

    now: Duration,
    ready_at: Duration,
    busy_until: Duration,

    four_bit: bool,
    write_high_nibble: Option<u8>,
    read_low_nibble: Option<u8>,
    bus_out: u8,
    enable: bool,

    ddram: [u8; DDRAM_SIZE],
    cgram: [u8; CGRAM_SIZE],
    address: u8,
    cgram_selected: bool,
    display_shift: i16,
    function: Option<FunctionSet>,
    control: DisplayControl,
    entry: EntryMode,

    events: Vec<SimEvent>,
    pulses: usize,
    instructions: Vec<u8>,
    data_writes: Vec<u8>,
    violations: Vec<Violation>,
}

impl Device {
    fn new(wiring: LcdWiring) -> Self {
        Device {
            wiring,
            pins: HashMap::new(),
            busy_mode: BusyMode::default(),
            now: Duration::ZERO,
            ready_at: POWER_ON_TIME,
            busy_until: Duration::ZERO,
            four_bit: false,
            write_high_nibble: None,
            read_low_nibble: None,
            bus_out: 0,
            enable: false,
            ddram: [b' '; DDRAM_SIZE],
            cgram: [0; CGRAM_SIZE],
            address: 0,
            cgram_selected: false,
            display_shift: 0,
            function: None,
            control: DisplayControl::default(),
            entry: EntryMode::default(),
            events: Vec::new(),
            pulses: 0,
            instructions: Vec::new(),
            data_writes: Vec::new(),
            violations: Vec::new(),
        }
    }

    fn level(&self, pin: PinId) -> bool {
        self.pins.get(&pin).is_some_and(|state| state.level)
    }

    /// R/W tied to ground reads as write.
    fn reading(&self) -> bool {
        self.wiring.rw.is_some_and(|rw| self.level(rw))
    }

    fn busy_flag(&self) -> bool {
        match self.busy_mode {
            BusyMode::Timed => self.now < self.busy_until,
            BusyMode::Idle => false,
            BusyMode::Stuck => true,
        }
    }

    /// Levels of DB0–DB7 as the controller sees them. Unconnected lines read low.
    fn sample_bus(&self) -> u8 {
        let shift = 8 - self.wiring.data.pins().len();
        self.wiring
            .data
            .pins()
            .iter()
            .enumerate()
            .filter(|(_, pin)| self.level(**pin))
            .fold(0u8, |bus, (i, _)| bus | 1 << (i + shift))
    }

    fn set_enable(&mut self, level: bool) {
        let was = self.enable;
        self.enable = level;
        match (was, level) {
            (false, true) => {
                self.pulses += 1;
                if self.reading() {
                    self.drive_bus();
                }
            }
            (true, false) if !self.reading() => self.latch(),
            _ => {}
        }
    }

    fn latch(&mut self) {
        self.read_low_nibble = None;
        let bus = self.sample_bus();
        let byte = if self.four_bit {
            match self.write_high_nibble.take() {
                Some(high) => high | bus >> 4,
                None => {
                    self.write_high_nibble = Some(bus & 0xF0);
                    return;
                }
            }
        } else {
            bus
        };

        if self.now < self.ready_at {
            self.violations.push(Violation::TooEarly { at: self.now });
        } else if self.now < self.busy_until {
            self.violations.push(Violation::WhileBusy { at: self.now });
        }

        if self.level(self.wiring.rs) {
            self.write_data(byte);
        } else {
            self.execute(byte);
        }
    }

    fn execute(&mut self, command: u8) {
        self.instructions.push(command);
        let mut execution_time = SHORT_EXECUTION_TIME;

        match Instruction::decode(command) {
            Some(Instruction::ClearDisplay) => {
                self.ddram = [b' '; DDRAM_SIZE];
                self.address = 0;
                self.cgram_selected = false;
                self.display_shift = 0;
                self.entry.direction = TextDirection::LeftToRight;
                execution_time = LONG_EXECUTION_TIME;
            }
            Some(Instruction::ReturnHome) => {
                self.address = 0;
                self.cgram_selected = false;
                self.display_shift = 0;
                execution_time = LONG_EXECUTION_TIME;
            }
            Some(Instruction::EntryModeSet(entry)) => self.entry = entry,
            Some(Instruction::DisplayControl(control)) => self.control = control,
            Some(Instruction::Shift { display, direction }) => {
                let step = match direction {
                    CursorDirection::Left => -1,
                    CursorDirection::Right => 1,
                };
                if display {
                    self.display_shift += step;
                } else {
                    self.step_address(step);
                }
            }
            Some(Instruction::FunctionSet(function)) => {
                self.four_bit = function.bus_width == BusWidth::Four;
                self.function = Some(function);
            }
            Some(Instruction::SetCgramAddress(address)) => {
                self.cgram_selected = true;
                self.address = address;
            }
            Some(Instruction::SetDdramAddress(address)) => {
                self.cgram_selected = false;
                self.address = address;
            }
            None => {}
        }

        self.busy_until = self.now + execution_time;
    }

    fn write_data(&mut self, data: u8) {
        self.data_writes.push(data);
        if self.cgram_selected {
            self.cgram[(self.address & CGRAM_MASK) as usize] = data;
        } else {
            self.ddram[(self.address & ADDRESS_MASK) as usize] = data;
        }

        let step = self.entry_step();
        self.step_address(step);
        if self.entry.autoscroll && !self.cgram_selected {
            self.display_shift += step;
        }
        self.busy_until = self.now + SHORT_EXECUTION_TIME;
    }

    fn read_data(&mut self) -> u8 {
        let data = if self.cgram_selected {
            self.cgram[(self.address & CGRAM_MASK) as usize]
        } else {
            self.ddram[(self.address & ADDRESS_MASK) as usize]
        };
        let step = self.entry_step();
        self.step_address(step);
        data
    }

    fn entry_step(&self) -> i16 {
        match self.entry.direction {
            TextDirection::LeftToRight => 1,
            TextDirection::RightToLeft => -1,
        }
    }

    fn step_address(&mut self, step: i16) {
        let mask = if self.cgram_selected {
            CGRAM_MASK
        } else {
            ADDRESS_MASK
        };
        self.address = (self.address as i16 + step) as u8 & mask;
    }

    /// Puts the next byte (or nibble) of a read onto DB0–DB7.
    fn drive_bus(&mut self) {
        if let Some(low) = self.read_low_nibble.take() {
            self.bus_out = low << 4;
            return;
        }

        let byte = if self.level(self.wiring.rs) {
            self.read_data()
        } else {
            (self.busy_flag() as u8) << 7 | self.address & ADDRESS_MASK
        };
        if self.four_bit {
            self.read_low_nibble = Some(byte & 0x0F);
        }
        self.bus_out = byte;
    }

    /// Level the host reads on a data line configured as input.
    fn driven_level(&self, pin: PinId) -> Option<bool> {
        let pins = self.wiring.data.pins();
        let shift = 8 - pins.len();
        let index = pins.iter().position(|data| *data == pin)?;
        Some(self.reading() && self.bus_out & 1 << (index + shift) != 0)
    }
}

/// A simulated HD44780 wired to the pins in [LcdWiring].
///
/// Starts in the power-on state: 8-bit interface, display off, DDRAM filled with spaces, and
/// [POWER_ON_TIME] to go before instructions are accepted.
#[derive(Debug, Clone)]
pub struct SimulatedHd44780 {
    device: Rc<RefCell<Device>>,
}

impl SimulatedHd44780 {
    pub fn new(wiring: LcdWiring) -> Self {
        SimulatedHd44780 {
            device: Rc::new(RefCell::new(Device::new(wiring))),
        }
    }

    /// Skips the power-on time, for tests that don't go through initialization.
    pub fn powered_up(self) -> Self {
        self.device.borrow_mut().ready_at = Duration::ZERO;
        self
    }

    /// A delay source advancing this display's clock.
    pub fn delay(&self) -> SimDelay {
        SimDelay {
            device: Rc::clone(&self.device),
        }
    }

    pub fn set_busy_mode(&self, mode: BusyMode) {
        self.device.borrow_mut().busy_mode = mode;
    }

    /// Time elapsed since power-on.
    pub fn now(&self) -> Duration {
        self.device.borrow().now
    }

    pub fn events(&self) -> Vec<SimEvent> {
        self.device.borrow().events.clone()
    }

    /// Forgets the recorded events, enable pulses, instructions and data writes. Violations are
    /// kept.
    pub fn clear_events(&self) {
        let mut device = self.device.borrow_mut();
        device.events.clear();
        device.pulses = 0;
        device.instructions.clear();
        device.data_writes.clear();
    }

    /// Number of rising edges on E.
    pub fn enable_pulses(&self) -> usize {
        self.device.borrow().pulses
    }

    /// Every byte latched into the instruction register, in order.
    pub fn instructions(&self) -> Vec<u8> {
        self.device.borrow().instructions.clone()
    }

    /// Every byte latched into the data register, in order.
    pub fn data_writes(&self) -> Vec<u8> {
        self.device.borrow().data_writes.clone()
    }

    pub fn violations(&self) -> Vec<Violation> {
        self.device.borrow().violations.clone()
    }

    pub fn ddram(&self) -> [u8; DDRAM_SIZE] {
        self.device.borrow().ddram
    }

    pub fn cgram(&self) -> [u8; CGRAM_SIZE] {
        self.device.borrow().cgram
    }

    /// `len` characters of DDRAM starting at `address`, wrapping around.
    pub fn text(&self, address: u8, len: usize) -> String {
        let device = self.device.borrow();
        (0..len)
            .map(|i| device.ddram[(address as usize + i) % DDRAM_SIZE] as char)
            .collect()
    }

    pub fn address_counter(&self) -> u8 {
        self.device.borrow().address
    }

    /// Interface width the controller currently expects.
    pub fn interface_width(&self) -> BusWidth {
        if self.device.borrow().four_bit {
            BusWidth::Four
        } else {
            BusWidth::Eight
        }
    }

    /// Last function set latched, `None` before the first one.
    pub fn function(&self) -> Option<FunctionSet> {
        self.device.borrow().function
    }

    pub fn display_control(&self) -> DisplayControl {
        self.device.borrow().control
    }

    pub fn entry_mode(&self) -> EntryMode {
        self.device.borrow().entry
    }

    /// Net display shift, positive to the right.
    pub fn display_shift(&self) -> i16 {
        self.device.borrow().display_shift
    }

    pub fn pin_direction(&self, pin: PinId) -> Option<PinDirection> {
        self.device.borrow().pins.get(&pin)?.direction
    }
}

impl GpioPort for SimulatedHd44780 {
    fn configure_pin(&mut self, pin: PinId, direction: PinDirection) -> GpioResult<()> {
        let mut device = self.device.borrow_mut();
        device.events.push(SimEvent::Configure(pin, direction));
        device.pins.entry(pin).or_default().direction = Some(direction);
        Ok(())
    }

    fn write_pin(&mut self, pin: PinId, level: bool) -> GpioResult<()> {
        let mut device = self.device.borrow_mut();
        let state = device.pins.entry(pin).or_default();
        if state.direction != Some(PinDirection::Output) {
            return Err(GpioError::InvalidArgument);
        }
        state.level = level;
        device.events.push(SimEvent::Write(pin, level));

        if pin == device.wiring.enable {
            device.set_enable(level);
        }
        Ok(())
    }

    fn read_pin(&mut self, pin: PinId) -> GpioResult<bool> {
        let mut device = self.device.borrow_mut();
        device.events.push(SimEvent::Read(pin));
        let state = device.pins.get(&pin).copied().unwrap_or_default();
        match state.direction {
            Some(PinDirection::Output) => Ok(state.level),
            Some(PinDirection::Input) => Ok(device.driven_level(pin).unwrap_or(false)),
            None => Err(GpioError::InvalidArgument),
        }
    }
}

/// [Delay] advancing the clock of a [SimulatedHd44780] instead of sleeping.
#[derive(Debug, Clone)]
pub struct SimDelay {
    device: Rc<RefCell<Device>>,
}

impl SimDelay {
    fn advance(&mut self, duration: Duration) {
        let mut device = self.device.borrow_mut();
        device.events.push(SimEvent::Delay(duration));
        device.now += duration;
    }
}

impl Delay for SimDelay {
    fn delay_ms(&mut self, ms: u32) {
        self.advance(Duration::from_millis(ms.into()));
    }

    fn delay_us(&mut self, us: u32) {
        self.advance(Duration::from_micros(us.into()));
    }
}
