//! GPIO capabilities and an HD44780 character LCD driver built on them.
//!
//! Drivers in [lcd] only see the traits below: single control lines ([GpioOutput]) and an 8-line
//! data port ([GpioPort]). Backends provide them, [gpiod] for Linux GPIO character devices and
//! [sim] for a simulated display.

pub mod delay;
pub mod gpiod;
pub mod lcd;
pub mod sim;

use std::fmt::Debug;
use thiserror::Error;

#[derive(Debug, Error, Eq, PartialEq, Clone)]
pub enum GpioError {
    #[error("pin already in use")]
    AlreadyInUse,
    #[error("invalid argument")]
    InvalidArgument,
    #[error("not supported by the wiring or backend")]
    NotSupported,
    #[error("device did not become ready in time")]
    Timeout,
    #[error("IO error: {0}")]
    Io(std::io::ErrorKind),
}

impl From<std::io::Error> for GpioError {
    fn from(err: std::io::Error) -> Self {
        GpioError::Io(err.kind())
    }
}

pub type GpioResult<T> = Result<T, GpioError>;

/// A source of GPIO lines, e.g. one GPIO chip.
///
/// A line can only be handed out once at a time. Claiming it again fails with
/// [GpioError::AlreadyInUse] until the previous pin or port is dropped.
pub trait GpioDriver: Debug {
    /// Claims a single line.
    fn get_pin(&self, index: usize) -> GpioResult<Box<dyn GpioPin + '_>>;

    /// Claims up to 8 lines as a parallel port. Each entry maps a port bit (LSb first) to a line
    /// index, `None` leaves that bit unconnected.
    fn get_port(&self, indices: [Option<usize>; 8]) -> GpioResult<Box<dyn GpioPort + '_>>;
}

/// A claimed line, not yet configured.
pub trait GpioPin: Debug {
    /// Line index within its driver.
    fn index(&self) -> usize;

    /// Configures the line as an output, driven low.
    fn as_output(&mut self) -> GpioResult<Box<dyn GpioOutput + '_>>;
}

/// A control line, such as E, RS or R/W.
pub trait GpioOutput: Debug {
    /// Drives the line high (`true`) or low (`false`).
    fn write(&self, value: bool) -> GpioResult<()>;
}

/// Direction of a group of port lines.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum PortDirection {
    Input,
    Output,
}

/// An 8-line parallel port, modelled after a microcontroller `PORTx`/`TRISx` register pair.
///
/// Every operation takes a mask, LSb first, and leaves the lines outside of it untouched.
/// This lets a driver own only half of a port, the other half staying under the host's control.
pub trait GpioPort: Debug {
    /// Switches the masked lines to input or output.
    fn set_direction(&mut self, mask: u8, direction: PortDirection) -> GpioResult<()>;

    /// Drives the masked output lines to the matching bits of `value`.
    fn write(&mut self, mask: u8, value: u8) -> GpioResult<()>;

    /// Reads the whole port. Input lines report their level, output lines their driven value,
    /// and unconnected lines read as `0`.
    fn read(&self) -> GpioResult<u8>;
}
