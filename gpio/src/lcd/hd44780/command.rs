//! HD44780 instruction encoding.

use crate::lcd::hd44780::driver::CursorDirection;

pub const CLEAR_DISPLAY: u8 = 0b00000001;
pub const RETURN_HOME: u8 = 0b00000010;
pub const ENTRY_MODE_SET: u8 = 0b00000100;
pub const DISPLAY_CONTROL: u8 = 0b00001000;
pub const CURSOR_SHIFT: u8 = 0b00010000;
pub const FUNCTION_SET: u8 = 0b00100000;
pub const SET_CGRAM_ADDRESS: u8 = 0b01000000;
pub const SET_DDRAM_ADDRESS: u8 = 0b10000000;

// Entry mode set
pub const ENTRY_INCREMENT: u8 = 0b00000010;
pub const ENTRY_SHIFT: u8 = 0b00000001;

// Display on/off control
pub const DISPLAY_ON: u8 = 0b00000100;
pub const CURSOR_ON: u8 = 0b00000010;
pub const BLINK_ON: u8 = 0b00000001;

// Cursor or display shift
pub const SHIFT_DISPLAY: u8 = 0b00001000;
pub const SHIFT_RIGHT: u8 = 0b00000100;

// Function set
pub const EIGHT_BIT: u8 = 0b00010000;
pub const TWO_LINES: u8 = 0b00001000;
pub const FONT_5X10: u8 = 0b00000100;

pub const MAX_CGRAM_ADDRESS: u8 = 0x3F;
pub const MAX_DDRAM_ADDRESS: u8 = 0x7F;

/// DDRAM address of the first character of the second line.
pub const LINE_2_ADDRESS: u8 = 0x40;

/// Busy flag bit of the byte read with RS = 0. The other bits are the address counter.
pub const BUSY_FLAG: u8 = 0b10000000;

const fn flag(set: bool, bit: u8) -> u8 {
    if set { bit } else { 0 }
}

/// `000001IS`
pub const fn entry_mode_set(direction: CursorDirection, shift: bool) -> u8 {
    ENTRY_MODE_SET
        | flag(matches!(direction, CursorDirection::Right), ENTRY_INCREMENT)
        | flag(shift, ENTRY_SHIFT)
}

/// `00001DCB`
pub const fn display_control(display_on: bool, cursor_on: bool, blink_on: bool) -> u8 {
    DISPLAY_CONTROL
        | flag(display_on, DISPLAY_ON)
        | flag(cursor_on, CURSOR_ON)
        | flag(blink_on, BLINK_ON)
}

/// `0001SR00`
pub const fn cursor_shift(display_shift: bool, direction: CursorDirection) -> u8 {
    CURSOR_SHIFT
        | flag(display_shift, SHIFT_DISPLAY)
        | flag(matches!(direction, CursorDirection::Right), SHIFT_RIGHT)
}

/// `001DNF00`
pub const fn function_set(eight_bit: bool, two_lines: bool, font_5x10: bool) -> u8 {
    FUNCTION_SET
        | flag(eight_bit, EIGHT_BIT)
        | flag(two_lines, TWO_LINES)
        | flag(font_5x10, FONT_5X10)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encoding() {
        assert_eq!(entry_mode_set(CursorDirection::Right, false), 0x06);
        assert_eq!(entry_mode_set(CursorDirection::Left, true), 0x05);
        assert_eq!(display_control(true, false, true), 0x0D);
        assert_eq!(cursor_shift(true, CursorDirection::Left), 0x18);
        assert_eq!(cursor_shift(false, CursorDirection::Right), 0x14);
        assert_eq!(function_set(false, true, false), 0x28);
        assert_eq!(function_set(true, false, true), 0x34);
    }
}
