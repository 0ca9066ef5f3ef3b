//! HD44780 instruction set.
//!
//! The control registers of the controller are write-only, so these types double as the shadow
//! copies the display controller keeps of what it last wrote.

use crate::lcd::hd44780::{BusWidth, FontSize};

/// `00000001`: clears DDRAM and returns the cursor home.
pub const CLEAR_DISPLAY: u8 = 0b00000001;
/// `0000001?`: returns the cursor home and undoes display shifts.
pub const RETURN_HOME: u8 = 0b00000010;
/// `000001DS`: see [EntryMode].
pub const ENTRY_MODE_SET: u8 = 0b00000100;
/// `00001DCB`: see [DisplayControl].
pub const DISPLAY_CONTROL: u8 = 0b00001000;
/// `0001DR??`: moves the cursor or shifts the display.
pub const CURSOR_SHIFT: u8 = 0b00010000;
/// `001DNF??`: see [FunctionSet].
pub const FUNCTION_SET: u8 = 0b00100000;
/// `01AAAAAA`: sets the CGRAM address.
pub const SET_CGRAM_ADDR: u8 = 0b01000000;
/// `1AAAAAAA`: sets the DDRAM address.
pub const SET_DDRAM_ADDR: u8 = 0b10000000;

/// Busy flag bit in the busy flag/address counter register.
pub const BUSY_FLAG: u8 = 0b10000000;
/// Address counter bits in the busy flag/address counter register.
pub const ADDRESS_MASK: u8 = 0b01111111;

/// Direction in which the cursor or the display moves.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum CursorDirection {
    /// Moves the cursor to the left after writing/reading data.
    Left,
    /// Moves the cursor to the right after writing/reading data.
    Right,
}

/// Direction the text flows in, i.e. whether the address counter increments or decrements after
/// each data byte.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq)]
pub enum TextDirection {
    /// Address increments, text grows to the right.
    #[default]
    LeftToRight,
    /// Address decrements, text grows to the left.
    RightToLeft,
}

/// Entry mode register: `000001DS`.
///
/// `D` is `1` for [TextDirection::LeftToRight]; `S` shifts the whole display on every write
/// (autoscroll).
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq)]
pub struct EntryMode {
    pub direction: TextDirection,
    pub autoscroll: bool,
}

impl EntryMode {
    pub fn bits(&self) -> u8 {
        let mut bits = 0;
        if self.direction == TextDirection::LeftToRight {
            bits |= 0b00000010;
        }
        if self.autoscroll {
            bits |= 0b00000001;
        }
        bits
    }

    pub fn from_bits(bits: u8) -> Self {
        EntryMode {
            direction: if bits & 0b00000010 != 0 {
                TextDirection::LeftToRight
            } else {
                TextDirection::RightToLeft
            },
            autoscroll: bits & 0b00000001 != 0,
        }
    }
}

/// Display on/off control register: `00001DCB`.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq)]
pub struct DisplayControl {
    pub display_on: bool,
    pub cursor_on: bool,
    pub blink_on: bool,
}

impl DisplayControl {
    pub fn bits(&self) -> u8 {
        let mut bits = 0;
        if self.display_on {
            bits |= 0b00000100;
        }
        if self.cursor_on {
            bits |= 0b00000010;
        }
        if self.blink_on {
            bits |= 0b00000001;
        }
        bits
    }

    pub fn from_bits(bits: u8) -> Self {
        DisplayControl {
            display_on: bits & 0b00000100 != 0,
            cursor_on: bits & 0b00000010 != 0,
            blink_on: bits & 0b00000001 != 0,
        }
    }
}

/// Function set register: `001DNF??`.
///
/// `D` selects the 8-bit interface, `N` two display lines (also used for 4-line panels, which
/// are two lines folded), and `F` the 5x10 font.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct FunctionSet {
    pub bus_width: BusWidth,
    pub two_lines: bool,
    pub font: FontSize,
}

impl FunctionSet {
    pub fn bits(&self) -> u8 {
        let mut bits = 0;
        if self.bus_width == BusWidth::Eight {
            bits |= 0b00010000;
        }
        if self.two_lines {
            bits |= 0b00001000;
        }
        if self.font == FontSize::Dots5x10 {
            bits |= 0b00000100;
        }
        bits
    }

    pub fn from_bits(bits: u8) -> Self {
        FunctionSet {
            bus_width: if bits & 0b00010000 != 0 {
                BusWidth::Eight
            } else {
                BusWidth::Four
            },
            two_lines: bits & 0b00001000 != 0,
            font: if bits & 0b00000100 != 0 {
                FontSize::Dots5x10
            } else {
                FontSize::Dots5x8
            },
        }
    }
}

/// A decoded instruction register write.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Instruction {
    ClearDisplay,
    ReturnHome,
    EntryModeSet(EntryMode),
    DisplayControl(DisplayControl),
    Shift {
        display: bool,
        direction: CursorDirection,
    },
    FunctionSet(FunctionSet),
    SetCgramAddress(u8),
    SetDdramAddress(u8),
}

impl Instruction {
    /// Decodes a command byte. Returns `None` for `00000000`, which isn't an instruction.
    pub fn decode(command: u8) -> Option<Self> {
        let instruction = if command & SET_DDRAM_ADDR != 0 {
            Instruction::SetDdramAddress(command & ADDRESS_MASK)
        } else if command & SET_CGRAM_ADDR != 0 {
            Instruction::SetCgramAddress(command & 0b00111111)
        } else if command & FUNCTION_SET != 0 {
            Instruction::FunctionSet(FunctionSet::from_bits(command))
        } else if command & CURSOR_SHIFT != 0 {
            Instruction::Shift {
                display: command & 0b00001000 != 0,
                direction: if command & 0b00000100 != 0 {
                    CursorDirection::Right
                } else {
                    CursorDirection::Left
                },
            }
        } else if command & DISPLAY_CONTROL != 0 {
            Instruction::DisplayControl(DisplayControl::from_bits(command))
        } else if command & ENTRY_MODE_SET != 0 {
            Instruction::EntryModeSet(EntryMode::from_bits(command))
        } else if command & RETURN_HOME != 0 {
            Instruction::ReturnHome
        } else if command & CLEAR_DISPLAY != 0 {
            Instruction::ClearDisplay
        } else {
            return None;
        };
        Some(instruction)
    }

    pub fn encode(&self) -> u8 {
        match *self {
            Instruction::ClearDisplay => CLEAR_DISPLAY,
            Instruction::ReturnHome => RETURN_HOME,
            Instruction::EntryModeSet(mode) => ENTRY_MODE_SET | mode.bits(),
            Instruction::DisplayControl(control) => DISPLAY_CONTROL | control.bits(),
            Instruction::Shift { display, direction } => {
                let mut command = CURSOR_SHIFT;
                if display {
                    command |= 0b00001000;
                }
                if direction == CursorDirection::Right {
                    command |= 0b00000100;
                }
                command
            }
            Instruction::FunctionSet(function) => FUNCTION_SET | function.bits(),
            Instruction::SetCgramAddress(address) => SET_CGRAM_ADDR | (address & 0b00111111),
            Instruction::SetDdramAddress(address) => SET_DDRAM_ADDR | (address & ADDRESS_MASK),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_what_it_encodes() {
        let instructions = [
            Instruction::ClearDisplay,
            Instruction::ReturnHome,
            Instruction::EntryModeSet(EntryMode::default()),
            Instruction::DisplayControl(DisplayControl {
                display_on: true,
                cursor_on: false,
                blink_on: true,
            }),
            Instruction::Shift {
                display: true,
                direction: CursorDirection::Left,
            },
            Instruction::FunctionSet(FunctionSet {
                bus_width: BusWidth::Four,
                two_lines: true,
                font: FontSize::Dots5x8,
            }),
            Instruction::SetCgramAddress(0x08),
            Instruction::SetDdramAddress(0x40),
        ];
        for instruction in instructions {
            assert_eq!(Instruction::decode(instruction.encode()), Some(instruction));
        }
    }

    #[test]
    fn known_command_bytes() {
        let function = FunctionSet {
            bus_width: BusWidth::Eight,
            two_lines: true,
            font: FontSize::Dots5x8,
        };
        assert_eq!(Instruction::FunctionSet(function).encode(), 0x38);
        assert_eq!(
            Instruction::EntryModeSet(EntryMode::default()).encode(),
            0x06
        );
        assert_eq!(
            Instruction::decode(0x0C),
            Some(Instruction::DisplayControl(DisplayControl {
                display_on: true,
                cursor_on: false,
                blink_on: false,
            }))
        );
        assert_eq!(Instruction::decode(0x00), None);
        // Don't-care bits of return home are ignored
        assert_eq!(Instruction::decode(0x03), Some(Instruction::ReturnHome));
    }
}
