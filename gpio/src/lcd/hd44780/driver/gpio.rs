use crate::delay::Delay;
use crate::lcd::hd44780::driver::HD44780Driver;
use crate::lcd::hd44780::{BusWidth, DataBus, LcdError, LcdResult, LcdWiring};
use crate::{GpioPort, PinDirection, PinId};
use log::trace;
use std::time::Duration;

/// Direction the data lines were last configured for.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum DataDirection {
    /// Host drives the data lines.
    Write,
    /// Controller drives the data lines.
    Read,
}

/// [HD44780Driver] over a parallel 4-bit or 8-bit GPIO bus.
///
/// Each enable pulse holds E low for 1 µs, high for at least 450 ns, and then waits 37 µs after
/// the falling edge, which covers the execution time of every instruction except clearing the
/// display and returning home. Those are left to the caller, through the busy flag or a delay.
///
/// The data lines are only switched between input and output when a transfer needs the other
/// direction; the last configured direction is remembered.
#[derive(Debug)]
pub struct GpioHD44780Driver<P, D> {
    pub(super) port: P,
    pub(super) delay: D,
    pub(super) pin_e: PinId,
    pub(super) pin_rw: Option<PinId>,
    pub(super) pin_rs: PinId,
    pub(super) data_bus: DataBus,
    pub(super) direction: Option<DataDirection>,
}

impl<P: GpioPort, D: Delay> GpioHD44780Driver<P, D> {
    /// Creates a new driver. Doesn't touch the pins until [HD44780Driver::prepare] is called.
    ///
    /// # Parameters
    ///
    /// - `port`: GPIO lines the display is connected to.
    /// - `delay`: timing source for the enable pulses and the initialization delays.
    /// - `wiring`: which lines are which. Without the R/W line, the driver will only support write
    ///   operations (R/W pin of the display must be connected to GND, signifying write mode).
    pub fn new(port: P, delay: D, wiring: LcdWiring) -> Self {
        GpioHD44780Driver {
            port,
            delay,
            pin_e: wiring.enable,
            pin_rw: wiring.rw,
            pin_rs: wiring.rs,
            data_bus: wiring.data,
            direction: None,
        }
    }

    /// Direction of the data lines, `None` before they were first configured.
    pub fn data_direction(&self) -> Option<DataDirection> {
        self.direction
    }

    /// Writes a full byte to the instruction (`rs == false`) or data (`rs == true`) register.
    fn write_register(&mut self, value: u8, rs: bool) -> LcdResult<()> {
        trace!("Sending data: {:08b}, RS: {}", value, rs);

        // Set RS pin
        self.port.write_pin(self.pin_rs, rs)?;

        // Set RW pin to write
        if let Some(rw) = self.pin_rw {
            self.port.write_pin(rw, false)?;
        }

        self.set_data_direction(DataDirection::Write)?;

        match self.data_bus.width() {
            BusWidth::Four => {
                self.write_nibble(value >> 4)?;
                self.write_nibble(value & 0x0F)?;
            }
            BusWidth::Eight => self.write_byte(value)?,
        }

        Ok(())
    }

    /// Reads a full byte from the instruction (`rs == false`) or data (`rs == true`) register.
    fn read_register(&mut self, rs: bool) -> LcdResult<u8> {
        let rw = self.pin_rw.ok_or(LcdError::ReadLineDisconnected)?;

        // Set RW pin to read
        self.port.write_pin(rw, true)?;

        // Set RS pin
        self.port.write_pin(self.pin_rs, rs)?;

        self.set_data_direction(DataDirection::Read)?;

        let data = match self.data_bus.width() {
            BusWidth::Four => {
                let high_nibble = self.read_nibble()?;
                let low_nibble = self.read_nibble()?;
                (high_nibble << 4) | low_nibble
            }
            BusWidth::Eight => self.read_byte()?,
        };

        trace!("Read data: {:08b}, RS: {}", data, rs);

        Ok(data)
    }
}

impl<P: GpioPort, D: Delay> HD44780Driver for GpioHD44780Driver<P, D> {
    fn bus_width(&self) -> BusWidth {
        self.data_bus.width()
    }

    fn can_read(&self) -> bool {
        self.pin_rw.is_some()
    }

    fn prepare(&mut self) -> LcdResult<()> {
        self.port.configure_pin(self.pin_rs, PinDirection::Output)?;
        self.port.configure_pin(self.pin_e, PinDirection::Output)?;
        if let Some(rw) = self.pin_rw {
            self.port.configure_pin(rw, PinDirection::Output)?;
        }
        self.set_data_direction(DataDirection::Write)?;

        self.port.write_pin(self.pin_rs, false)?;
        self.port.write_pin(self.pin_e, false)?;
        if let Some(rw) = self.pin_rw {
            self.port.write_pin(rw, false)?;
        }
        Ok(())
    }

    fn send_nibble(&mut self, nibble: u8) -> LcdResult<()> {
        self.port.write_pin(self.pin_rs, false)?;
        if let Some(rw) = self.pin_rw {
            self.port.write_pin(rw, false)?;
        }
        self.set_data_direction(DataDirection::Write)?;
        self.write_nibble(nibble)
    }

    fn send_command(&mut self, command: u8) -> LcdResult<()> {
        self.write_register(command, false)
    }

    fn send_data(&mut self, data: u8) -> LcdResult<()> {
        self.write_register(data, true)
    }

    fn read_command(&mut self) -> LcdResult<u8> {
        self.read_register(false)
    }

    fn read_data(&mut self) -> LcdResult<u8> {
        self.read_register(true)
    }

    fn delay(&mut self, duration: Duration) {
        self.delay.delay(duration);
    }

    /// Reads only the busy flag line instead of the whole register.
    fn is_busy(&mut self) -> LcdResult<bool> {
        let Some(rw) = self.pin_rw else {
            return Ok(true);
        };

        self.port.write_pin(rw, true)?;
        self.port.write_pin(self.pin_rs, false)?;
        self.set_data_direction(DataDirection::Read)?;

        self.sample_busy_flag()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lcd::hd44780::driver::BusyWait;
    use crate::lcd::hd44780::driver::bus::{ENABLE_PULSE_WIDTH, ENABLE_SETUP, EXECUTION_TIME};
    use crate::sim::{BusyMode, SimDelay, SimEvent, SimulatedHd44780};

    fn wiring_4bit(rw: bool) -> LcdWiring {
        LcdWiring {
            rs: PinId::new(0, 22),
            rw: rw.then_some(PinId::new(0, 27)),
            enable: PinId::new(0, 17),
            data: DataBus::Bus4Bit([
                PinId::new(0, 26),
                PinId::new(0, 16),
                PinId::new(0, 20),
                PinId::new(0, 21),
            ]),
        }
    }

    fn wiring_8bit(rw: bool) -> LcdWiring {
        LcdWiring {
            rs: PinId::new(1, 10),
            rw: rw.then_some(PinId::new(1, 9)),
            enable: PinId::new(1, 8),
            data: DataBus::Bus8Bit([
                PinId::new(1, 0),
                PinId::new(1, 1),
                PinId::new(1, 2),
                PinId::new(1, 3),
                PinId::new(1, 4),
                PinId::new(1, 5),
                PinId::new(1, 6),
                PinId::new(1, 7),
            ]),
        }
    }

    fn driver(
        wiring: LcdWiring,
    ) -> (
        SimulatedHd44780,
        GpioHD44780Driver<SimulatedHd44780, SimDelay>,
    ) {
        let sim = SimulatedHd44780::new(wiring).powered_up();
        let mut driver = GpioHD44780Driver::new(sim.clone(), sim.delay(), wiring);
        driver.prepare().unwrap();
        (sim, driver)
    }

    /// Puts the simulated controller into 4-bit mode the way initialization would.
    fn switch_to_4bit(driver: &mut GpioHD44780Driver<SimulatedHd44780, SimDelay>) {
        for _ in 0..3 {
            driver.send_nibble(0x3).unwrap();
        }
        driver.send_nibble(0x2).unwrap();
        driver.send_command(0x28).unwrap();
    }

    #[test]
    fn two_pulses_per_byte_on_4bit_bus() {
        let (sim, mut driver) = driver(wiring_4bit(false));
        switch_to_4bit(&mut driver);
        sim.clear_events();

        driver.send_data(b'A').unwrap();
        assert_eq!(sim.enable_pulses(), 2);

        driver.send_command(0x0C).unwrap();
        assert_eq!(sim.enable_pulses(), 4);
    }

    #[test]
    fn one_pulse_per_byte_on_8bit_bus() {
        let (sim, mut driver) = driver(wiring_8bit(false));
        sim.clear_events();

        driver.send_data(b'A').unwrap();
        assert_eq!(sim.enable_pulses(), 1);

        driver.send_command(0x0C).unwrap();
        assert_eq!(sim.enable_pulses(), 2);
        assert_eq!(sim.instructions(), vec![0x0C]);
        assert_eq!(sim.data_writes(), vec![b'A']);
    }

    #[test]
    fn nibbles_go_high_first() {
        let (sim, mut driver) = driver(wiring_4bit(false));
        switch_to_4bit(&mut driver);

        driver.send_data(0xA5).unwrap();
        assert_eq!(sim.data_writes(), vec![0xA5]);
    }

    #[test]
    fn enable_pulse_shape() {
        let wiring = wiring_8bit(false);
        let (sim, mut driver) = driver(wiring);
        sim.clear_events();

        driver.pulse_enable().unwrap();

        assert_eq!(
            sim.events(),
            vec![
                SimEvent::Write(wiring.enable, false),
                SimEvent::Delay(ENABLE_SETUP),
                SimEvent::Write(wiring.enable, true),
                // 450 ns, rounded up to the delay resolution
                SimEvent::Delay(Duration::from_micros(1)),
                SimEvent::Write(wiring.enable, false),
                SimEvent::Delay(EXECUTION_TIME),
            ]
        );
        assert!(Duration::from_micros(1) >= ENABLE_PULSE_WIDTH);
    }

    #[test]
    fn read_without_rw_line_is_a_configuration_error() {
        let (_sim, mut driver) = driver(wiring_4bit(false));
        assert_eq!(driver.read_data(), Err(LcdError::ReadLineDisconnected));
        assert_eq!(driver.read_command(), Err(LcdError::ReadLineDisconnected));
    }

    #[test]
    fn written_data_reads_back() {
        for wiring in [wiring_4bit(true), wiring_8bit(true)] {
            let (_sim, mut driver) = driver(wiring);
            if wiring.data.is_4bit() {
                switch_to_4bit(&mut driver);
            }

            driver.set_ddram_address(0x05).unwrap();
            driver.send_data(b'Z').unwrap();
            driver.set_ddram_address(0x05).unwrap();
            assert_eq!(driver.read_data().unwrap(), b'Z');

            let (busy, address) = driver.get_busy_flag_and_address().unwrap();
            assert!(!busy);
            // Reading data advances the address counter too
            assert_eq!(address, 0x06);
        }
    }

    #[test]
    fn read_then_write_switches_lines_to_outputs_before_first_pulse() {
        let wiring = wiring_4bit(true);
        let (sim, mut driver) = driver(wiring);
        switch_to_4bit(&mut driver);

        driver.read_command().unwrap();
        assert_eq!(driver.data_direction(), Some(DataDirection::Read));
        for pin in wiring.data.pins() {
            assert_eq!(sim.pin_direction(*pin), Some(PinDirection::Input));
        }
        sim.clear_events();

        driver.send_data(b'x').unwrap();

        let events = sim.events();
        let first_pulse = events
            .iter()
            .position(|event| *event == SimEvent::Write(wiring.enable, true))
            .unwrap();
        for pin in wiring.data.pins() {
            let configured = events
                .iter()
                .position(|event| *event == SimEvent::Configure(*pin, PinDirection::Output))
                .unwrap();
            assert!(configured < first_pulse);
        }
        assert_eq!(driver.data_direction(), Some(DataDirection::Write));
        for pin in wiring.data.pins() {
            assert_eq!(sim.pin_direction(*pin), Some(PinDirection::Output));
        }
        // Control lines never leave output mode
        assert_eq!(sim.pin_direction(wiring.enable), Some(PinDirection::Output));
    }

    #[test]
    fn direction_is_not_reconfigured_needlessly() {
        let (sim, mut driver) = driver(wiring_8bit(true));
        sim.clear_events();

        driver.send_data(1).unwrap();
        driver.send_data(2).unwrap();

        let events = sim.events();
        assert!(!events.iter().any(|event| matches!(event, SimEvent::Configure(..))));
    }

    #[test]
    fn busy_flag_without_rw_line_is_always_set() {
        let (_sim, mut driver) = driver(wiring_4bit(false));
        assert!(driver.is_busy().unwrap());
        assert_eq!(driver.wait_until_ready(10).unwrap(), BusyWait::Unavailable);
    }

    #[test]
    fn busy_flag_fast_path_matches_full_read() {
        for wiring in [wiring_4bit(true), wiring_8bit(true)] {
            let (sim, mut driver) = driver(wiring);
            if wiring.data.is_4bit() {
                switch_to_4bit(&mut driver);
            }
            sim.set_busy_mode(BusyMode::Stuck);
            assert!(driver.is_busy().unwrap());
            assert!(driver.get_busy_flag_and_address().unwrap().0);

            sim.set_busy_mode(BusyMode::Idle);
            assert!(!driver.is_busy().unwrap());
            // The skipped low nibble keeps the 4-bit read in step
            assert!(!driver.get_busy_flag_and_address().unwrap().0);
        }
    }

    #[test]
    fn busy_poll_gives_up_at_the_ceiling() {
        let (sim, mut driver) = driver(wiring_8bit(true));
        sim.set_busy_mode(BusyMode::Stuck);

        assert_eq!(
            driver.wait_until_ready(500).unwrap(),
            BusyWait::TimedOut { polls: 500 }
        );
    }

    #[test]
    fn busy_poll_returns_once_the_clear_finishes() {
        let (sim, mut driver) = driver(wiring_8bit(true));

        driver.clear_display().unwrap();
        let outcome = driver.wait_until_ready(0xFFFF).unwrap();

        assert!(matches!(outcome, BusyWait::Ready { polls } if polls > 1));
        assert!(sim.violations().is_empty());
    }
}
