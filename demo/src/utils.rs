use log::warn;
use std::ops::RangeBounds;
use xlcd_gpio::lcd::hd44780::command::LINE_2_ADDRESS;
use xlcd_gpio::lcd::hd44780::config::Lines;
use xlcd_gpio::lcd::hd44780::driver::HD44780Driver;
use xlcd_gpio::{GpioError, GpioResult};

/// Characters per line in the DDRAM of a two-line display. A one-line display has twice as many.
pub const LINE_LENGTH: usize = 40;

pub fn row_count(lines: Lines) -> usize {
    match lines {
        Lines::One => 1,
        Lines::Two => 2,
    }
}

pub trait WithinExt {
    fn within(&self, range: impl RangeBounds<Self>) -> bool;
}

impl<T: PartialOrd<T>> WithinExt for T {
    fn within(&self, range: impl RangeBounds<Self>) -> bool {
        range.contains(self)
    }
}

pub trait DisplayExt {
    fn print(&mut self, s: &str) -> GpioResult<()>;
    /// Moves the cursor to `row` and `col` of a display with the given line count.
    fn set_cursor(&mut self, lines: Lines, row: usize, col: usize) -> GpioResult<()>;
}

impl<T: ?Sized + HD44780Driver> DisplayExt for T {
    fn print(&mut self, s: &str) -> GpioResult<()> {
        let bytes: Vec<u8> = s
            .chars()
            .map(|c| {
                if c.is_ascii() && c != '\0' {
                    c as u8
                } else {
                    warn!("Unprintable character: {:?}", c);
                    b'?'
                }
            })
            .collect();
        self.write_bytes(&bytes)
    }

    fn set_cursor(&mut self, lines: Lines, row: usize, col: usize) -> GpioResult<()> {
        let rows = row_count(lines);
        let line_length = LINE_LENGTH * 2 / rows;
        if !row.within(0..rows) || !col.within(0..line_length) {
            return Err(GpioError::InvalidArgument);
        }
        self.set_ddram_address((col + LINE_2_ADDRESS as usize * row) as u8)
    }
}

/// Splits a pin list like `26, 16, 20, 21` or `26;16;20;21`.
pub fn parse_pin_bus(pin_str: &str) -> eyre::Result<Vec<usize>> {
    Ok(pin_str
        .split([',', ' ', ';'])
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| s.parse())
        .collect::<Result<Vec<_>, _>>()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use xlcd_gpio::lcd::hd44780::config::{BusWidth, LcdConfig};
    use xlcd_gpio::lcd::hd44780::driver::GpioHD44780Driver;
    use xlcd_gpio::sim::SimLcd;

    #[test]
    fn test_set_cursor_follows_line_count() {
        let sim = SimLcd::new(BusWidth::FourBitLower);
        let pin_e = sim.pin_e();
        let pin_rs = sim.pin_rs();
        let pin_rw = sim.pin_rw();
        let mut port = sim.port();
        let config = LcdConfig::PICDEM2.with_lines(Lines::One);
        let delay = sim.delay();
        let mut lcd =
            GpioHD44780Driver::new(config, &pin_e, Some(&pin_rw), &pin_rs, &mut port, delay)
                .unwrap();
        lcd.init().unwrap();

        lcd.set_cursor(Lines::One, 0, 45).unwrap();
        assert_eq!(sim.address_counter(), 45);
        assert_eq!(lcd.set_cursor(Lines::One, 1, 0), Err(GpioError::InvalidArgument));
        assert_eq!(lcd.set_cursor(Lines::One, 0, 80), Err(GpioError::InvalidArgument));

        lcd.set_cursor(Lines::Two, 1, 3).unwrap();
        assert_eq!(sim.address_counter(), 0x43);
        assert_eq!(lcd.set_cursor(Lines::Two, 0, 40), Err(GpioError::InvalidArgument));
        assert_eq!(lcd.set_cursor(Lines::Two, 2, 0), Err(GpioError::InvalidArgument));
    }

    #[test]
    fn test_parse_pin_bus() {
        assert_eq!(parse_pin_bus("26, 16,20 ;21").unwrap(), vec![26, 16, 20, 21]);
        assert!(parse_pin_bus("26, x").is_err());
    }

    #[test]
    fn test_within() {
        assert!(3.within(0..4));
        assert!(!4.within(0..4));
    }
}
