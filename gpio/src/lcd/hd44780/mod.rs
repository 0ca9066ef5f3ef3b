//! HD44780 character LCD module.
//!
//! The driver is split in two layers:
//!
//! - [driver::HD44780Driver] is the register-level interface: writing commands and data, reading
//!   the busy flag/address counter and DDRAM/CGRAM, and waiting for the controller.
//!   [driver::GpioHD44780Driver] implements it over a parallel 4-bit or 8-bit GPIO bus.
//! - [Lcd] is the display controller. It runs the power-on initialization sequence, keeps shadow
//!   copies of the write-only control registers and offers the usual high-level API (cursor,
//!   blinking, scrolling, custom characters, printing).
//!
//! ```no_run
//! use charlcd_gpio::PinId;
//! use charlcd_gpio::delay::StdDelay;
//! use charlcd_gpio::gpiod::GpiodPort;
//! use charlcd_gpio::lcd::hd44780::driver::GpioHD44780Driver;
//! use charlcd_gpio::lcd::hd44780::{DataBus, Lcd, LcdConfig, LcdWiring};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let port = GpiodPort::open(&["/dev/gpiochip0"])?;
//! let wiring = LcdWiring {
//!     rs: PinId::new(0, 22),
//!     rw: Some(PinId::new(0, 27)),
//!     enable: PinId::new(0, 17),
//!     data: DataBus::Bus4Bit([
//!         PinId::new(0, 26),
//!         PinId::new(0, 16),
//!         PinId::new(0, 20),
//!         PinId::new(0, 21),
//!     ]),
//! };
//! let driver = GpioHD44780Driver::new(port, StdDelay, wiring);
//! let mut lcd = Lcd::new(driver, LcdConfig::default());
//! lcd.init()?;
//! lcd.print("Hello")?;
//! # Ok(())
//! # }
//! ```

mod config;
mod display;
pub mod driver;
pub mod flags;

use crate::GpioError;
pub use config::*;
pub use display::*;
use thiserror::Error;

#[derive(Debug, Error, Eq, PartialEq, Clone)]
pub enum LcdError {
    /// A read was requested, but the R/W line isn't wired to the host.
    #[error("the R/W line is not connected, reading is impossible")]
    ReadLineDisconnected,
    #[error("the display is not initialized")]
    NotInitialized,
    #[error("the display is already initialized")]
    AlreadyInitialized,
    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),
    #[error("invalid argument")]
    InvalidArgument,
    #[error("GPIO error: {0}")]
    Gpio(#[from] GpioError),
}

pub type LcdResult<T> = Result<T, LcdError>;
