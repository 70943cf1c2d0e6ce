//! Wiring and mode selection of an HD44780 display.
//!
//! A [LcdConfig] is chosen once, when the driver is composed, and never changes afterwards.
//! All the builder methods are `const`, so a board can keep its configuration in a `const` item.

use crate::lcd::hd44780::command;
use crate::lcd::hd44780::driver::CursorDirection;
use crate::lcd::hd44780::timing::{Timing, LONGEST_INSTRUCTION_NS};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Which data lines are wired to which bits of the data port.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BusWidth {
    /// 4-bit interface, D7..D4 on port bits 7..4.
    FourBitUpper,
    /// 4-bit interface, D7..D4 on port bits 3..0.
    FourBitLower,
    /// 8-bit interface, D7..D0 on port bits 7..0.
    EightBit,
}

impl BusWidth {
    pub const fn is_8bit(&self) -> bool {
        matches!(self, BusWidth::EightBit)
    }

    pub const fn is_4bit(&self) -> bool {
        !self.is_8bit()
    }

    /// Port bits owned by the display.
    pub const fn port_mask(&self) -> u8 {
        match self {
            BusWidth::FourBitUpper => 0xF0,
            BusWidth::FourBitLower => 0x0F,
            BusWidth::EightBit => 0xFF,
        }
    }

    /// Port bit carrying D7, the busy flag.
    pub const fn busy_mask(&self) -> u8 {
        match self {
            BusWidth::FourBitUpper | BusWidth::EightBit => command::BUSY_FLAG,
            BusWidth::FourBitLower => command::BUSY_FLAG >> 4,
        }
    }

    /// Places a nibble (low 4 bits of `nibble`) on the D7..D4 port bits.
    pub const fn nibble_to_port(&self, nibble: u8) -> u8 {
        match self {
            BusWidth::FourBitUpper | BusWidth::EightBit => (nibble & 0x0F) << 4,
            BusWidth::FourBitLower => nibble & 0x0F,
        }
    }

    /// Extracts the D7..D4 nibble from a port value.
    pub const fn port_to_nibble(&self, port: u8) -> u8 {
        match self {
            BusWidth::FourBitUpper | BusWidth::EightBit => (port >> 4) & 0x0F,
            BusWidth::FourBitLower => port & 0x0F,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RwLine {
    /// R/W is driven by the host, enabling reads and busy flag polling.
    Controlled,
    /// R/W is tied to ground, the display can only be written to.
    Grounded,
}

/// How the driver makes sure the controller is ready before a transfer.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadyCheck {
    /// Wait [Timing::settle_ns] before every transfer.
    FixedDelay,
    /// Poll the busy flag before every transfer.
    BusyFlag,
}

/// Whether transfers after initialization wait for the controller themselves.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Blocking {
    /// Every transfer waits for the controller,
    /// [HD44780Driver::is_busy](super::driver::HD44780Driver::is_busy) spins.
    Blocking,
    /// Transfers go out immediately. The caller polls
    /// [HD44780Driver::is_busy](super::driver::HD44780Driver::is_busy), which samples once.
    NonBlocking,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Lines {
    One,
    Two,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Font {
    Font5x8,
    Font5x10,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Error)]
pub enum LcdConfigError {
    #[error("busy flag polling needs a controlled R/W line")]
    BusyFlagWithoutRw,
    #[error("non-blocking mode needs a controlled R/W line")]
    NonBlockingWithoutRw,
    #[error("the R/W pin does not match the configured R/W line")]
    RwPinMismatch,
    #[error("clock of {0} Hz is too slow")]
    ClockTooSlow(u32),
    #[error("settle time of {0} ns is shorter than the slowest instruction")]
    SettleTooShort(u32),
    #[error("busy poll limit must be at least 1")]
    ZeroPollLimit,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LcdConfig {
    pub bus_width: BusWidth,
    pub rw_line: RwLine,
    pub ready_check: ReadyCheck,
    pub blocking: Blocking,
    pub lines: Lines,
    pub font: Font,
    /// Cursor movement after each data transfer, `Right` increments the address.
    pub cursor_direction: CursorDirection,
    pub display_shift: bool,
    pub display_on: bool,
    pub cursor_on: bool,
    pub blink_on: bool,
    pub timing: Timing,
    /// Gives up busy flag polling after this many samples, `None` polls forever.
    pub busy_poll_limit: Option<u32>,
}

impl LcdConfig {
    /// The PICDEM 2 board wiring: 4-bit interface on the low half of the port, controlled R/W,
    /// blocking transfers separated by a fixed delay, 2 lines of 5x8 characters, visible blinking
    /// cursor moving right, 4 MHz clock.
    pub const PICDEM2: LcdConfig = LcdConfig {
        bus_width: BusWidth::FourBitLower,
        rw_line: RwLine::Controlled,
        ready_check: ReadyCheck::FixedDelay,
        blocking: Blocking::Blocking,
        lines: Lines::Two,
        font: Font::Font5x8,
        cursor_direction: CursorDirection::Right,
        display_shift: false,
        display_on: true,
        cursor_on: true,
        blink_on: true,
        timing: Timing::REFERENCE,
        busy_poll_limit: None,
    };

    pub const fn with_bus_width(mut self, bus_width: BusWidth) -> Self {
        self.bus_width = bus_width;
        self
    }

    pub const fn with_rw_line(mut self, rw_line: RwLine) -> Self {
        self.rw_line = rw_line;
        self
    }

    pub const fn with_ready_check(mut self, ready_check: ReadyCheck) -> Self {
        self.ready_check = ready_check;
        self
    }

    pub const fn with_blocking(mut self, blocking: Blocking) -> Self {
        self.blocking = blocking;
        self
    }

    pub const fn with_lines(mut self, lines: Lines) -> Self {
        self.lines = lines;
        self
    }

    pub const fn with_font(mut self, font: Font) -> Self {
        self.font = font;
        self
    }

    pub const fn with_entry_mode(
        mut self,
        cursor_direction: CursorDirection,
        display_shift: bool,
    ) -> Self {
        self.cursor_direction = cursor_direction;
        self.display_shift = display_shift;
        self
    }

    pub const fn with_display_control(
        mut self,
        display_on: bool,
        cursor_on: bool,
        blink_on: bool,
    ) -> Self {
        self.display_on = display_on;
        self.cursor_on = cursor_on;
        self.blink_on = blink_on;
        self
    }

    pub const fn with_timing(mut self, timing: Timing) -> Self {
        self.timing = timing;
        self
    }

    pub const fn with_busy_poll_limit(mut self, limit: Option<u32>) -> Self {
        self.busy_poll_limit = limit;
        self
    }

    /// Checks that the selected modes can work together.
    pub fn validate(&self) -> Result<(), LcdConfigError> {
        let grounded = self.rw_line == RwLine::Grounded;
        if grounded && self.ready_check == ReadyCheck::BusyFlag {
            return Err(LcdConfigError::BusyFlagWithoutRw);
        }
        if grounded && self.blocking == Blocking::NonBlocking {
            return Err(LcdConfigError::NonBlockingWithoutRw);
        }
        if self.timing.cycle_hz() == 0 {
            return Err(LcdConfigError::ClockTooSlow(self.timing.clock_hz));
        }
        if self.timing.settle_ns < LONGEST_INSTRUCTION_NS {
            return Err(LcdConfigError::SettleTooShort(self.timing.settle_ns));
        }
        if self.busy_poll_limit == Some(0) {
            return Err(LcdConfigError::ZeroPollLimit);
        }
        Ok(())
    }

    pub const fn function_set_command(&self) -> u8 {
        command::function_set(
            self.bus_width.is_8bit(),
            matches!(self.lines, Lines::Two),
            matches!(self.font, Font::Font5x10),
        )
    }

    pub const fn entry_mode_command(&self) -> u8 {
        command::entry_mode_set(self.cursor_direction, self.display_shift)
    }

    pub const fn display_control_command(&self) -> u8 {
        command::display_control(self.display_on, self.cursor_on, self.blink_on)
    }
}

impl Default for LcdConfig {
    fn default() -> Self {
        LcdConfig::PICDEM2
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_picdem2_commands() {
        let config = LcdConfig::PICDEM2;
        assert_eq!(config.function_set_command(), 0b00101000);
        assert_eq!(config.entry_mode_command(), 0b00000110);
        assert_eq!(config.display_control_command(), 0b00001111);
        assert_eq!(config.validate(), Ok(()));
    }

    #[test]
    fn test_mode_commands() {
        let config = LcdConfig::PICDEM2
            .with_bus_width(BusWidth::EightBit)
            .with_font(Font::Font5x10)
            .with_entry_mode(CursorDirection::Left, true)
            .with_display_control(true, false, false);
        assert_eq!(config.function_set_command(), 0b00111100);
        assert_eq!(config.entry_mode_command(), 0b00000101);
        assert_eq!(config.display_control_command(), 0x0C);

        let config = LcdConfig::PICDEM2
            .with_lines(Lines::One)
            .with_display_control(false, false, false);
        assert_eq!(config.function_set_command(), 0b00100000);
        assert_eq!(config.display_control_command(), 0x08);
    }

    #[test]
    fn test_bus_width_placement() {
        assert_eq!(BusWidth::FourBitLower.nibble_to_port(0b1010), 0b0000_1010);
        assert_eq!(BusWidth::FourBitUpper.nibble_to_port(0b1010), 0b1010_0000);
        assert_eq!(BusWidth::FourBitLower.port_to_nibble(0b0110_1001), 0b1001);
        assert_eq!(BusWidth::FourBitUpper.port_to_nibble(0b0110_1001), 0b0110);
        assert_eq!(BusWidth::FourBitLower.busy_mask(), 0x08);
        assert_eq!(BusWidth::FourBitUpper.busy_mask(), 0x80);
        assert_eq!(BusWidth::EightBit.busy_mask(), 0x80);
    }

    #[test]
    fn test_rejects_reads_without_rw() {
        let grounded = LcdConfig::PICDEM2.with_rw_line(RwLine::Grounded);
        assert_eq!(grounded.validate(), Ok(()));
        assert_eq!(
            grounded.with_ready_check(ReadyCheck::BusyFlag).validate(),
            Err(LcdConfigError::BusyFlagWithoutRw)
        );
        assert_eq!(
            grounded.with_blocking(Blocking::NonBlocking).validate(),
            Err(LcdConfigError::NonBlockingWithoutRw)
        );
    }

    #[test]
    fn test_rejects_bad_timing() {
        let config = LcdConfig::PICDEM2.with_timing(Timing::new(3));
        assert_eq!(config.validate(), Err(LcdConfigError::ClockTooSlow(3)));

        let config = LcdConfig::PICDEM2.with_timing(Timing::REFERENCE.with_settle_ns(1_000_000));
        assert_eq!(config.validate(), Err(LcdConfigError::SettleTooShort(1_000_000)));

        let config = LcdConfig::PICDEM2.with_busy_poll_limit(Some(0));
        assert_eq!(config.validate(), Err(LcdConfigError::ZeroPollLimit));
    }

    #[test]
    fn test_partial_json_falls_back_to_defaults() {
        let config: LcdConfig = serde_json::from_str(
            r#"{
                "bus_width": "four_bit_upper",
                "ready_check": "busy_flag",
                "timing": { "clock_hz": 8000000 }
            }"#,
        )
        .unwrap();
        assert_eq!(config.bus_width, BusWidth::FourBitUpper);
        assert_eq!(config.ready_check, ReadyCheck::BusyFlag);
        assert_eq!(config.timing.clock_hz, 8_000_000);
        assert_eq!(config.timing.settle_ns, 2_000_000);
        assert_eq!(config.lines, Lines::Two);
    }
}
