pub mod delay;
pub mod gpiod;
pub mod lcd;
#[cfg(any(test, feature = "sim"))]
pub mod sim;

use std::fmt::{Debug, Display, Formatter};
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error, Eq, PartialEq, Clone)]
pub enum GpioError {
    #[error("pin already in use")]
    AlreadyInUse,
    #[error("invalid argument")]
    InvalidArgument,
    #[error("IO error: {0}")]
    Io(std::io::ErrorKind),
    #[error("error: {0}")]
    Other(String),
}

impl From<std::io::Error> for GpioError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            // Another consumer holds the line
            std::io::ErrorKind::ResourceBusy => GpioError::AlreadyInUse,
            kind => GpioError::Io(kind),
        }
    }
}

pub type GpioResult<T> = Result<T, GpioError>;

/// Identifies a single GPIO line as a `(port, pin)` pair.
///
/// What a port is depends on the backend. For [gpiod::GpiodPort] it's the index of the GPIO chip,
/// for microcontroller-style backends it would be the GPIO bank.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct PinId {
    pub port: u8,
    pub pin: u8,
}

impl PinId {
    pub const fn new(port: u8, pin: u8) -> Self {
        PinId { port, pin }
    }
}

impl Display for PinId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.port, self.pin)
    }
}

impl FromStr for PinId {
    type Err = GpioError;

    /// Parses either `port:pin` or a bare `pin` (port 0).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parse = |part: &str| {
            part.trim()
                .parse::<u8>()
                .map_err(|_| GpioError::Other(format!("parsing pin `{}` failed", s)))
        };
        match s.split_once(':') {
            Some((port, pin)) => Ok(PinId::new(parse(port)?, parse(pin)?)),
            None => Ok(PinId::new(0, parse(s)?)),
        }
    }
}

/// Direction a GPIO line is configured for.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum PinDirection {
    Input,
    Output,
}

/// Specifies the bias of the GPIO pin.
///
/// You can use this to enable pull-up or pull-down resistors.
/// These should work in both input and output modes.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum GpioBias {
    #[default]
    None,
    PullUp,
    PullDown,
}

impl FromStr for GpioBias {
    type Err = GpioError;

    /// Parses `none`, `pull-up`/`pullup` or `pull-down`/`pulldown`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "").as_str() {
            "none" => Ok(GpioBias::None),
            "pullup" => Ok(GpioBias::PullUp),
            "pulldown" => Ok(GpioBias::PullDown),
            _ => Err(GpioError::Other(format!("unknown bias `{}`", s))),
        }
    }
}

/// Specifies how an output line is driven.
///
/// Open drain only ever pulls the line low and lets it float high, so an external pull-up to a
/// higher supply sets the high level. That's how 3.3 V pins talk to 5 V TTL inputs.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum GpioDriveMode {
    /// Driven high or low with low impedance.
    #[default]
    PushPull,
    /// Driven low, or left floating when high.
    OpenDrain,
    /// Driven high, or left floating when low.
    OpenSource,
}

impl GpioDriveMode {
    /// The level the line is actually driven to for `value`, or `None` if it's left floating.
    pub fn get_state(&self, value: bool) -> Option<bool> {
        match self {
            GpioDriveMode::PushPull => Some(value),
            GpioDriveMode::OpenDrain => {
                if value { None } else { Some(false) }
            }
            GpioDriveMode::OpenSource => {
                if value { Some(true) } else { None }
            }
        }
    }
}

impl FromStr for GpioDriveMode {
    type Err = GpioError;

    /// Parses `push-pull`, `open-drain` or `open-source`, dashes optional.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "").as_str() {
            "pushpull" => Ok(GpioDriveMode::PushPull),
            "opendrain" => Ok(GpioDriveMode::OpenDrain),
            "opensource" => Ok(GpioDriveMode::OpenSource),
            _ => Err(GpioError::Other(format!("unknown drive mode `{}`", s))),
        }
    }
}

/// A set of GPIO lines addressed by [PinId].
///
/// This is the whole capability the LCD driver needs from the board: switching a line between
/// input and output, and writing or reading its level. Enabling port clocks or claiming the
/// underlying device is the backend's (or the caller's) business, done before the port is handed
/// to a driver.
pub trait GpioPort: Debug {
    /// Configures the line as an input or an output.
    ///
    /// Reconfiguring a line to the direction it already has must be harmless.
    fn configure_pin(&mut self, pin: PinId, direction: PinDirection) -> GpioResult<()>;

    /// Writes the logical level of an output line.
    fn write_pin(&mut self, pin: PinId, level: bool) -> GpioResult<()>;

    /// Reads the logical level of a line.
    fn read_pin(&mut self, pin: PinId) -> GpioResult<bool>;
}

impl<T: GpioPort + ?Sized> GpioPort for &mut T {
    fn configure_pin(&mut self, pin: PinId, direction: PinDirection) -> GpioResult<()> {
        (**self).configure_pin(pin, direction)
    }

    fn write_pin(&mut self, pin: PinId, level: bool) -> GpioResult<()> {
        (**self).write_pin(pin, level)
    }

    fn read_pin(&mut self, pin: PinId) -> GpioResult<bool> {
        (**self).read_pin(pin)
    }
}

impl<T: GpioPort + ?Sized> GpioPort for Box<T> {
    fn configure_pin(&mut self, pin: PinId, direction: PinDirection) -> GpioResult<()> {
        (**self).configure_pin(pin, direction)
    }

    fn write_pin(&mut self, pin: PinId, level: bool) -> GpioResult<()> {
        (**self).write_pin(pin, level)
    }

    fn read_pin(&mut self, pin: PinId) -> GpioResult<bool> {
        (**self).read_pin(pin)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pin_id_parses_port_and_line() {
        assert_eq!("2:17".parse::<PinId>(), Ok(PinId::new(2, 17)));
        assert_eq!(" 26 ".parse::<PinId>(), Ok(PinId::new(0, 26)));
        assert!("a:1".parse::<PinId>().is_err());
        assert!("1:300".parse::<PinId>().is_err());
    }

    #[test]
    fn busy_line_is_already_in_use() {
        let err = std::io::Error::from(std::io::ErrorKind::ResourceBusy);
        assert_eq!(GpioError::from(err), GpioError::AlreadyInUse);
        let err = std::io::Error::from(std::io::ErrorKind::PermissionDenied);
        assert_eq!(
            GpioError::from(err),
            GpioError::Io(std::io::ErrorKind::PermissionDenied)
        );
    }

    #[test]
    fn bias_parses_case_insensitively() {
        assert_eq!("none".parse::<GpioBias>(), Ok(GpioBias::None));
        assert_eq!("Pull-Up".parse::<GpioBias>(), Ok(GpioBias::PullUp));
        assert_eq!("pulldown".parse::<GpioBias>(), Ok(GpioBias::PullDown));
        assert!("up".parse::<GpioBias>().is_err());
    }

    #[test]
    fn drive_mode_parses() {
        assert_eq!("open-drain".parse::<GpioDriveMode>(), Ok(GpioDriveMode::OpenDrain));
        assert_eq!("PushPull".parse::<GpioDriveMode>(), Ok(GpioDriveMode::PushPull));
        assert_eq!(" open-source ".parse::<GpioDriveMode>(), Ok(GpioDriveMode::OpenSource));
        assert!("drain".parse::<GpioDriveMode>().is_err());
    }

    #[test]
    fn open_drain_floats_high() {
        assert_eq!(GpioDriveMode::OpenDrain.get_state(true), None);
        assert_eq!(GpioDriveMode::OpenDrain.get_state(false), Some(false));
        assert_eq!(GpioDriveMode::OpenSource.get_state(false), None);
        assert_eq!(GpioDriveMode::PushPull.get_state(true), Some(true));
    }
}
