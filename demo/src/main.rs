mod config;
mod utils;

use crate::config::Config;
use crate::utils::{DisplayExt, parse_pin_bus, row_count};
use dotenv::dotenv;
use eyre::{bail, eyre};
use log::{debug, info};
use std::env::var;
use std::hint::spin_loop;
use sysinfo::System;
use xlcd_gpio::delay::StdDelay;
use xlcd_gpio::gpiod::GpiodDriver;
use xlcd_gpio::lcd::hd44780::config::{Blocking, BusWidth, RwLine};
use xlcd_gpio::lcd::hd44780::driver::{GpioHD44780Driver, HD44780Driver};
use xlcd_gpio::sim::SimLcd;
use xlcd_gpio::{GpioDriver, GpioOutput, GpioResult};

const DEFAULT_GPIO_CHIP: &str = "/dev/gpiochip0";
const VISIBLE_COLUMNS: u8 = 16;

/// Maps the data pins, listed from the lowest data line up, to the bits of the port they are
/// wired to.
fn port_indices(bus_width: BusWidth, pins: &[usize]) -> eyre::Result<[Option<usize>; 8]> {
    let (offset, expected) = match bus_width {
        BusWidth::FourBitUpper => (4, 4),
        BusWidth::FourBitLower => (0, 4),
        BusWidth::EightBit => (0, 8),
    };
    if pins.len() != expected {
        bail!("Expected {} data pins, got {}", expected, pins.len());
    }

    let mut indices = [None; 8];
    for (bit, &pin) in pins.iter().enumerate() {
        indices[offset + bit] = Some(pin);
    }
    Ok(indices)
}

fn wait_ready(lcd: &mut dyn HD44780Driver) -> GpioResult<()> {
    while lcd.is_busy()? {
        spin_loop();
    }
    Ok(())
}

fn show(lcd: &mut dyn HD44780Driver, config: &Config) -> eyre::Result<()> {
    // Commands don't wait by themselves in non-blocking mode
    let non_blocking = config.lcd.blocking == Blocking::NonBlocking;

    lcd.init()?;

    let lines = config.lcd.lines;
    for (row, line) in config.greeting.iter().take(row_count(lines)).enumerate() {
        if non_blocking {
            wait_ready(lcd)?;
        }
        lcd.set_cursor(lines, row, 0)?;
        lcd.print(line)?;
    }

    if config.lcd.rw_line == RwLine::Controlled {
        if non_blocking {
            wait_ready(lcd)?;
        }
        info!("Address counter after greeting: {:#04x}", lcd.get_address()?);
    }

    Ok(())
}

fn run_sim(config: &Config) -> eyre::Result<()> {
    let sim = SimLcd::new(config.lcd.bus_width);
    let pin_e = sim.pin_e();
    let pin_rs = sim.pin_rs();
    let pin_rw = sim.pin_rw();
    let mut port = sim.port();
    let rw_out: Option<&dyn GpioOutput> = match config.lcd.rw_line {
        RwLine::Controlled => Some(&pin_rw),
        RwLine::Grounded => None,
    };

    let mut lcd =
        GpioHD44780Driver::new(config.lcd, &pin_e, rw_out, &pin_rs, &mut port, sim.delay())?;
    debug!("{:?} created.", lcd);

    show(&mut lcd, config)?;

    for row in 0..row_count(config.lcd.lines) as u8 {
        info!("Line {}: [{}]", row + 1, sim.line(row, VISIBLE_COLUMNS));
    }
    info!(
        "Short E pulses: {}, writes while busy: {}",
        sim.short_pulses(),
        sim.ignored_writes()
    );
    Ok(())
}

fn run_gpiod(config: &Config) -> eyre::Result<()> {
    // Get pin numbers from env
    let chip = var("XLCD_GPIO_CHIP").unwrap_or_else(|_| DEFAULT_GPIO_CHIP.to_string());
    let lcd_e_pin_no: usize = var("XLCD_PIN_E")?.parse()?;
    let lcd_rs_pin_no: usize = var("XLCD_PIN_RS")?.parse()?;
    let lcd_data_pin_nos = parse_pin_bus(&var("XLCD_PINS_DATA")?)?;
    let lcd_port_indices = port_indices(config.lcd.bus_width, &lcd_data_pin_nos)?;

    info!(
        "LCD @ {} E: {}, RS: {}, Data: {:?}",
        chip, lcd_e_pin_no, lcd_rs_pin_no, lcd_data_pin_nos
    );

    debug!("Initializing GPIO driver...");
    let gpio = GpiodDriver::open(&chip)?;
    debug!("{:?} initialized.", gpio);

    let mut lcd_e_pin = gpio.get_pin(lcd_e_pin_no)?;
    let mut lcd_rs_pin = gpio.get_pin(lcd_rs_pin_no)?;
    let mut lcd_rw_pin = match config.lcd.rw_line {
        RwLine::Controlled => Some(gpio.get_pin(var("XLCD_PIN_RW")?.parse()?)?),
        RwLine::Grounded => None,
    };
    if let Some(pin) = &lcd_rw_pin {
        info!("LCD RW: {}", pin.index());
    }

    let lcd_e_out = lcd_e_pin.as_output()?;
    let lcd_rs_out = lcd_rs_pin.as_output()?;
    let lcd_rw_out = lcd_rw_pin.as_mut().map(|pin| pin.as_output()).transpose()?;
    let mut lcd_data_port = gpio.get_port(lcd_port_indices)?;

    let mut lcd = GpioHD44780Driver::new(
        config.lcd,
        &*lcd_e_out,
        lcd_rw_out.as_deref(),
        &*lcd_rs_out,
        &mut *lcd_data_port,
        StdDelay,
    )?;
    debug!("{:?} created.", lcd);

    show(&mut lcd, config)
}

fn main() -> eyre::Result<()> {
    // Initialize environment and logger
    dotenv().ok();
    pretty_env_logger::init();

    const UNKNOWN_STR: &str = "???";

    info!(
        "xlcd demo {} on {}",
        env!("CARGO_PKG_VERSION"),
        System::host_name().as_deref().unwrap_or(UNKNOWN_STR)
    );
    info!(
        "System ver {} kernel ver {}",
        System::long_os_version().as_deref().unwrap_or(UNKNOWN_STR),
        System::kernel_version().as_deref().unwrap_or(UNKNOWN_STR),
    );
    info!("Architecture {}", System::cpu_arch());

    debug!("Trying to load config...");
    let config = match Config::try_load()? {
        Some(config) => {
            info!("Config loaded.");
            config
        }
        None => {
            info!("Config not found. Using default");
            let config = Config::default();
            config.save()?;
            info!("Default config saved to {}.", Config::path().display());
            config
        }
    };
    config.lcd.validate()?;
    debug!("{:?}", config);

    let backend = var("XLCD_BACKEND").unwrap_or_else(|_| "gpiod".to_string());
    match backend.as_str() {
        "gpiod" => run_gpiod(&config)?,
        "sim" => run_sim(&config)?,
        other => return Err(eyre!("Unknown backend: {}", other)),
    }

    info!("Done.");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use xlcd_gpio::lcd::hd44780::config::{LcdConfig, Lines};

    #[test]
    fn test_port_indices() {
        let indices = port_indices(BusWidth::FourBitUpper, &[26, 16, 20, 21]).unwrap();
        assert_eq!(indices, [None, None, None, None, Some(26), Some(16), Some(20), Some(21)]);
        let indices = port_indices(BusWidth::FourBitLower, &[26, 16, 20, 21]).unwrap();
        assert_eq!(indices[..4], [Some(26), Some(16), Some(20), Some(21)]);
        assert!(port_indices(BusWidth::EightBit, &[1, 2, 3, 4]).is_err());
    }

    #[test]
    fn test_show_on_simulator() {
        let config = Config {
            lcd: LcdConfig::PICDEM2.with_blocking(Blocking::NonBlocking),
            greeting: vec!["caf\u{e9}".to_string(), "ok".to_string()],
        };
        let sim = SimLcd::new(config.lcd.bus_width);
        let pin_e = sim.pin_e();
        let pin_rs = sim.pin_rs();
        let pin_rw = sim.pin_rw();
        let mut port = sim.port();
        let delay = sim.delay();
        let mut lcd =
            GpioHD44780Driver::new(config.lcd, &pin_e, Some(&pin_rw), &pin_rs, &mut port, delay)
                .unwrap();

        show(&mut lcd, &config).unwrap();

        assert_eq!(sim.line(0, 5), "caf? ");
        assert_eq!(sim.line(1, 2), "ok");
        assert_eq!(sim.ignored_writes(), 0);
    }

    #[test]
    fn test_show_one_line_display() {
        let config = Config {
            lcd: LcdConfig::PICDEM2.with_lines(Lines::One),
            greeting: vec!["first".to_string(), "second".to_string()],
        };
        let sim = SimLcd::new(config.lcd.bus_width);
        let pin_e = sim.pin_e();
        let pin_rs = sim.pin_rs();
        let pin_rw = sim.pin_rw();
        let mut port = sim.port();
        let delay = sim.delay();
        let mut lcd =
            GpioHD44780Driver::new(config.lcd, &pin_e, Some(&pin_rw), &pin_rs, &mut port, delay)
                .unwrap();

        show(&mut lcd, &config).unwrap();

        assert_eq!(sim.line(0, 5), "first");
        assert_eq!(sim.function(), (false, false));
        assert_eq!(sim.ddram(0x40), b' ');
    }
}
