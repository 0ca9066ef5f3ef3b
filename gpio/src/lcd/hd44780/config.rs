use crate::PinId;
use crate::lcd::hd44780::{LcdError, LcdResult};

/// Default ceiling for busy flag polls, after which the display is assumed to be ready.
pub const DEFAULT_POLL_CEILING: u32 = 0xFFFF;

/// Width of the data bus between the host and the controller.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum BusWidth {
    /// Only DB4–DB7 are connected; every byte is sent as two nibbles, high nibble first.
    Four,
    /// DB0–DB7 are connected.
    Eight,
}

/// Character font height.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq)]
pub enum FontSize {
    #[default]
    Dots5x8,
    /// Only available on single-line displays. Ignored otherwise.
    Dots5x10,
}

/// Data lines of the display, LSb first.
///
/// For the 4-bit bus, the pins are the ones connected to DB4–DB7.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum DataBus {
    Bus4Bit([PinId; 4]),
    Bus8Bit([PinId; 8]),
}

impl DataBus {
    pub fn width(&self) -> BusWidth {
        match self {
            DataBus::Bus4Bit(_) => BusWidth::Four,
            DataBus::Bus8Bit(_) => BusWidth::Eight,
        }
    }

    pub fn is_4bit(&self) -> bool {
        matches!(self, DataBus::Bus4Bit(_))
    }

    /// The active data lines, LSb first.
    pub fn pins(&self) -> &[PinId] {
        match self {
            DataBus::Bus4Bit(pins) => pins,
            DataBus::Bus8Bit(pins) => pins,
        }
    }

    /// The line carrying DB7, where the busy flag shows up.
    pub fn top_pin(&self) -> PinId {
        match self {
            DataBus::Bus4Bit(pins) => pins[3],
            DataBus::Bus8Bit(pins) => pins[7],
        }
    }
}

impl TryFrom<&[PinId]> for DataBus {
    type Error = LcdError;

    fn try_from(pins: &[PinId]) -> Result<Self, Self::Error> {
        if let Ok(pins) = <[PinId; 4]>::try_from(pins) {
            Ok(DataBus::Bus4Bit(pins))
        } else if let Ok(pins) = <[PinId; 8]>::try_from(pins) {
            Ok(DataBus::Bus8Bit(pins))
        } else {
            Err(LcdError::InvalidConfig("the data bus needs exactly 4 or 8 pins"))
        }
    }
}

/// How the display is wired to the host.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct LcdWiring {
    /// Register select: `0` for the instruction register, `1` for data.
    pub rs: PinId,
    /// Read/write select. `None` if the display's R/W is tied to ground, which makes the display
    /// write-only: no reads, and no busy flag.
    pub rw: Option<PinId>,
    /// Enable strobe.
    pub enable: PinId,
    pub data: DataBus,
}

/// Physical layout of the display.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct Geometry {
    columns: u8,
    lines: u8,
    font: FontSize,
}

impl Geometry {
    /// The controller addresses at most 4 rows, 40 columns each.
    pub fn new(columns: u8, lines: u8, font: FontSize) -> LcdResult<Self> {
        if !(1..=40).contains(&columns) {
            return Err(LcdError::InvalidConfig("columns must be within 1..=40"));
        }
        if !(1..=4).contains(&lines) {
            return Err(LcdError::InvalidConfig("lines must be within 1..=4"));
        }
        Ok(Geometry { columns, lines, font })
    }

    pub fn columns(&self) -> u8 {
        self.columns
    }

    pub fn lines(&self) -> u8 {
        self.lines
    }

    /// The font actually used. 5x10 falls back to 5x8 on multi-line displays.
    pub fn font(&self) -> FontSize {
        if self.lines == 1 {
            self.font
        } else {
            FontSize::Dots5x8
        }
    }

    /// DDRAM address of the first character of each row.
    ///
    /// Rows 2 and 3 of 4-line panels continue rows 0 and 1, right after the visible columns.
    pub fn row_offsets(&self) -> [u8; 4] {
        [0x00, 0x40, self.columns, 0x40 + self.columns]
    }
}

impl Default for Geometry {
    /// The common 16x2 display.
    fn default() -> Self {
        Geometry {
            columns: 16,
            lines: 2,
            font: FontSize::Dots5x8,
        }
    }
}

/// Everything the display controller needs to know up front.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct LcdConfig {
    pub geometry: Geometry,
    /// How many times the busy flag is polled before giving up and assuming the display is ready.
    pub poll_ceiling: u32,
}

impl LcdConfig {
    pub fn new(geometry: Geometry) -> Self {
        LcdConfig {
            geometry,
            poll_ceiling: DEFAULT_POLL_CEILING,
        }
    }

    pub fn with_poll_ceiling(mut self, poll_ceiling: u32) -> Self {
        self.poll_ceiling = poll_ceiling;
        self
    }
}

impl Default for LcdConfig {
    fn default() -> Self {
        Self::new(Geometry::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn geometry_is_validated() {
        assert!(Geometry::new(16, 2, FontSize::Dots5x8).is_ok());
        assert_eq!(
            Geometry::new(16, 0, FontSize::Dots5x8),
            Err(LcdError::InvalidConfig("lines must be within 1..=4"))
        );
        assert!(Geometry::new(16, 5, FontSize::Dots5x8).is_err());
        assert!(Geometry::new(0, 2, FontSize::Dots5x8).is_err());
        assert!(Geometry::new(41, 1, FontSize::Dots5x8).is_err());
    }

    #[test]
    fn row_offsets_follow_columns() {
        let geometry = Geometry::new(20, 4, FontSize::Dots5x8).unwrap();
        assert_eq!(geometry.row_offsets(), [0x00, 0x40, 0x14, 0x54]);
    }

    #[test]
    fn tall_font_only_on_single_line() {
        let single = Geometry::new(16, 1, FontSize::Dots5x10).unwrap();
        let double = Geometry::new(16, 2, FontSize::Dots5x10).unwrap();
        assert_eq!(single.font(), FontSize::Dots5x10);
        assert_eq!(double.font(), FontSize::Dots5x8);
    }

    #[test]
    fn data_bus_from_pin_slice() {
        let pins: Vec<PinId> = (0..8).map(|pin| PinId::new(0, pin)).collect();
        assert_eq!(DataBus::try_from(&pins[..4]).unwrap().width(), BusWidth::Four);
        let bus = DataBus::try_from(&pins[..]).unwrap();
        assert_eq!(bus.width(), BusWidth::Eight);
        assert_eq!(bus.top_pin(), PinId::new(0, 7));
        assert!(DataBus::try_from(&pins[..5]).is_err());
    }
}
