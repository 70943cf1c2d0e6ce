//! HD44780 character LCD module.
//!
//! See [HD44780Driver](driver::HD44780Driver) for the driver interface and
//! [GpioHD44780Driver](driver::GpioHD44780Driver) for the implementation bit-banging GPIO pins.
//! The wiring and modes are selected with a [LcdConfig](config::LcdConfig), and the protocol
//! waits derive from its [Timing](timing::Timing).
//!
//! # Sources
//!
//! - Hitachi, “HD44780U (LCD-II) Dot Matrix Liquid Crystal Display
//!   Controller/Driver,” rev. 0.0, 1998, figures 23–24 (initializing by instruction) and table 6
//!   (instructions).

pub mod command;
pub mod config;
pub mod driver;
pub mod timing;
