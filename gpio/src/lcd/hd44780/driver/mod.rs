mod gpio;

use crate::lcd::hd44780::command::{self, LINE_2_ADDRESS, MAX_CGRAM_ADDRESS, MAX_DDRAM_ADDRESS};
use crate::{GpioError, GpioResult};
pub use gpio::*;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;

/// Interface of an HD44780 character LCD controller driver.
///
/// The required methods are the low-level transfers, which handle the bus protocol and the
/// controller's busy state as configured. The provided methods build the rest of the instruction
/// set on top of [HD44780Driver::send_command].
///
/// None of the transfers can detect a missing or faulty controller. Errors only come from the GPIO
/// backend, or from an operation the wiring cannot do (reading with R/W tied to ground).
pub trait HD44780Driver: Debug {
    /// Runs the power-on initialization sequence and configures the display.
    fn init(&mut self) -> GpioResult<()>;

    /// Sends an instruction, with RS = 0.
    fn send_command(&mut self, command: u8) -> GpioResult<()>;

    /// Writes a character code at the current address, with RS = 1.
    fn write_char(&mut self, data: u8) -> GpioResult<()>;

    /// Writes characters up to the first `0` byte or the end of the slice.
    ///
    /// Returns only once every character has been transferred.
    fn write_bytes(&mut self, data: &[u8]) -> GpioResult<()>;

    /// Reads the busy flag.
    ///
    /// Depending on the configuration this either waits for the flag to clear and returns `false`,
    /// or samples it once and returns it.
    fn is_busy(&mut self) -> GpioResult<bool>;

    /// Reads the address counter.
    fn get_address(&mut self) -> GpioResult<u8>;

    /// Reads the character at the current address.
    fn read_char(&mut self) -> GpioResult<u8>;

    /// See [HD44780Driver::write_bytes].
    fn write_str(&mut self, s: &str) -> GpioResult<()> {
        self.write_bytes(s.as_bytes())
    }

    /// Blanks the whole DDRAM and moves the cursor home.
    fn clear_display(&mut self) -> GpioResult<()> {
        self.send_command(command::CLEAR_DISPLAY)
    }

    /// Moves the cursor home and undoes any display shift. DDRAM is left as is.
    fn return_home(&mut self) -> GpioResult<()> {
        self.send_command(command::RETURN_HOME)
    }

    /// Moves the cursor to the start of line 0 or 1.
    fn line_home(&mut self, line: u8) -> GpioResult<()> {
        let address = match line {
            0 => 0,
            1 => LINE_2_ADDRESS,
            _ => return Err(GpioError::InvalidArgument),
        };
        self.set_ddram_address(address)
    }

    fn set_entry_mode(&mut self, direction: CursorDirection, shift: bool) -> GpioResult<()> {
        self.send_command(command::entry_mode_set(direction, shift))
    }

    fn set_display_control(
        &mut self,
        display_on: bool,
        cursor_on: bool,
        blink_on: bool,
    ) -> GpioResult<()> {
        self.send_command(command::display_control(display_on, cursor_on, blink_on))
    }

    /// Moves the cursor, or the whole display when `display_shift` is set, by one position.
    fn cursor_shift(&mut self, display_shift: bool, direction: CursorDirection) -> GpioResult<()> {
        self.send_command(command::cursor_shift(display_shift, direction))
    }

    fn cursor_move_left(&mut self) -> GpioResult<()> {
        self.cursor_shift(false, CursorDirection::Left)
    }

    fn cursor_move_right(&mut self) -> GpioResult<()> {
        self.cursor_shift(false, CursorDirection::Right)
    }

    fn display_move_left(&mut self) -> GpioResult<()> {
        self.cursor_shift(true, CursorDirection::Left)
    }

    fn display_move_right(&mut self) -> GpioResult<()> {
        self.cursor_shift(true, CursorDirection::Right)
    }

    /// Selects CGRAM for the following data transfers.
    fn set_cgram_address(&mut self, address: u8) -> GpioResult<()> {
        if address > MAX_CGRAM_ADDRESS {
            return Err(GpioError::InvalidArgument);
        }
        self.send_command(command::SET_CGRAM_ADDRESS | address)
    }

    /// Selects DDRAM for the following data transfers.
    fn set_ddram_address(&mut self, address: u8) -> GpioResult<()> {
        if address > MAX_DDRAM_ADDRESS {
            return Err(GpioError::InvalidArgument);
        }
        self.send_command(command::SET_DDRAM_ADDRESS | address)
    }
}

/// Direction the address counter moves in after each data transfer, or the direction of a shift.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CursorDirection {
    Left,
    Right,
}
