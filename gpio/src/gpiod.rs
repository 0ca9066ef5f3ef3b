//! [GpioPort] implementation on top of the Linux GPIO character device, using the gpiod library.
//!
//! Every port is one GPIO chip (`/dev/gpiochipN`), and every pin is a line offset on that chip.
use crate::{GpioBias, GpioDriveMode, GpioError, GpioPort, GpioResult, PinDirection, PinId};
use log::trace;
use std::collections::HashMap;
use std::fmt::{Debug, Formatter};
use std::path::Path;

impl From<GpioBias> for gpiod::Bias {
    fn from(bias: GpioBias) -> Self {
        match bias {
            GpioBias::None => gpiod::Bias::Disable,
            GpioBias::PullUp => gpiod::Bias::PullUp,
            GpioBias::PullDown => gpiod::Bias::PullDown,
        }
    }
}

impl From<GpioDriveMode> for gpiod::Drive {
    fn from(drive: GpioDriveMode) -> Self {
        match drive {
            GpioDriveMode::PushPull => gpiod::Drive::PushPull,
            GpioDriveMode::OpenDrain => gpiod::Drive::OpenDrain,
            GpioDriveMode::OpenSource => gpiod::Drive::OpenSource,
        }
    }
}

enum RequestedLine {
    Input(gpiod::Lines<gpiod::Input>),
    /// Output line along with the last level written to it.
    Output(gpiod::Lines<gpiod::Output>, bool),
}

/// A [GpioPort] spanning one or more GPIO chips.
///
/// Lines are requested lazily, on [GpioPort::configure_pin]. Changing the direction releases
/// the previous request first, as the kernel doesn't allow requesting the same line twice.
pub struct GpiodPort {
    chips: Vec<gpiod::Chip>,
    lines: HashMap<PinId, RequestedLine>,
    biases: HashMap<PinId, GpioBias>,
    drives: HashMap<PinId, GpioDriveMode>,
}

impl GpiodPort {
    /// Creates a port from already opened chips. The index in `chips` is the port number.
    pub fn new(chips: Vec<gpiod::Chip>) -> Self {
        GpiodPort {
            chips,
            lines: HashMap::new(),
            biases: HashMap::new(),
            drives: HashMap::new(),
        }
    }

    /// Opens the chips at the given paths, e.g. `/dev/gpiochip0`.
    pub fn open<P: AsRef<Path>>(paths: &[P]) -> GpioResult<Self> {
        let chips = paths
            .iter()
            .map(|path| gpiod::Chip::new(path.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(chips))
    }

    /// Sets the bias used for the line from the next time it's configured.
    pub fn set_bias(&mut self, pin: PinId, bias: GpioBias) -> GpioResult<()> {
        self.check_pin(pin)?;
        self.biases.insert(pin, bias);
        Ok(())
    }

    /// Sets how the line is driven from the next time it's configured as an output.
    pub fn set_drive_mode(&mut self, pin: PinId, drive: GpioDriveMode) -> GpioResult<()> {
        self.check_pin(pin)?;
        self.drives.insert(pin, drive);
        Ok(())
    }

    fn check_pin(&self, pin: PinId) -> GpioResult<&gpiod::Chip> {
        let chip = self
            .chips
            .get(pin.port as usize)
            .ok_or(GpioError::InvalidArgument)?;
        if u32::from(pin.pin) >= chip.num_lines() {
            return Err(GpioError::InvalidArgument);
        }
        Ok(chip)
    }

    fn request(&self, pin: PinId, direction: PinDirection) -> GpioResult<RequestedLine> {
        let chip = self.check_pin(pin)?;
        let bias = self.biases.get(&pin).copied().unwrap_or_default();
        let drive = self.drives.get(&pin).copied().unwrap_or_default();
        let offsets = [u32::from(pin.pin)];

        let line = match direction {
            PinDirection::Input => RequestedLine::Input(
                chip.request_lines(
                    gpiod::Options::input(offsets)
                        .consumer(env!("CARGO_PKG_NAME"))
                        .bias(bias.into()),
                )?,
            ),
            PinDirection::Output => RequestedLine::Output(
                chip.request_lines(
                    gpiod::Options::output(offsets)
                        .consumer(env!("CARGO_PKG_NAME"))
                        .bias(bias.into())
                        .drive(drive.into()),
                )?,
                false,
            ),
        };
        Ok(line)
    }
}

impl Debug for GpiodPort {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let names = self.chips.iter().map(|chip| chip.name()).collect::<Vec<_>>();
        write!(f, "GpiodPort({:?})", names)
    }
}

impl GpioPort for GpiodPort {
    fn configure_pin(&mut self, pin: PinId, direction: PinDirection) -> GpioResult<()> {
        let current = match self.lines.get(&pin) {
            Some(RequestedLine::Input(_)) => Some(PinDirection::Input),
            Some(RequestedLine::Output(..)) => Some(PinDirection::Output),
            None => None,
        };
        if current == Some(direction) {
            return Ok(());
        }

        // Release the old request before asking for the line again
        self.lines.remove(&pin);
        let line = self.request(pin, direction)?;
        self.lines.insert(pin, line);
        trace!("Configured {} as {:?}", pin, direction);
        Ok(())
    }

    fn write_pin(&mut self, pin: PinId, level: bool) -> GpioResult<()> {
        match self.lines.get_mut(&pin) {
            Some(RequestedLine::Output(line, last)) => {
                line.set_values([level])?;
                *last = level;
                Ok(())
            }
            _ => Err(GpioError::InvalidArgument),
        }
    }

    fn read_pin(&mut self, pin: PinId) -> GpioResult<bool> {
        match self.lines.get(&pin) {
            Some(RequestedLine::Input(line)) => {
                let values = line.get_values([false])?;
                Ok(values[0])
            }
            Some(RequestedLine::Output(_, last)) => Ok(*last),
            None => Err(GpioError::InvalidArgument),
        }
    }
}
