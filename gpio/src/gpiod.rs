//! Linux GPIO character device backend, using the gpiod library.
//!
//! Used on hosts (e.g. a Raspberry Pi) where the display is wired to lines of a
//! `/dev/gpiochipN` device.
use crate::{GpioDriver, GpioError, GpioOutput, GpioPin, GpioPort, GpioResult, PortDirection};
use bitvec::vec::BitVec;
use log::{debug, trace};
use std::fmt::{Debug, Formatter};
use std::sync::atomic::AtomicU8;

const CONSUMER: &str = env!("CARGO_PKG_NAME");

/// GPIO driver handing out lines of one gpiod chip.
pub struct GpiodDriver {
    chip: gpiod::Chip,
    /// Lines currently handed out as a pin or part of a port.
    claimed: BitVec<AtomicU8>,
}

impl GpiodDriver {
    pub fn new(chip: gpiod::Chip) -> Self {
        let claimed = BitVec::repeat(false, chip.num_lines() as usize);
        Self { chip, claimed }
    }

    /// Opens the GPIO chip at the given path, e.g. `/dev/gpiochip0`.
    pub fn open(path: &str) -> GpioResult<Self> {
        let driver = Self::new(gpiod::Chip::new(path)?);
        debug!("Opened {} with {} lines", path, driver.claimed.len());
        Ok(driver)
    }

    /// Claims every given line, or none of them.
    fn claim(&self, indices: &[usize]) -> GpioResult<()> {
        if indices.iter().any(|&index| index >= self.claimed.len()) {
            return Err(GpioError::InvalidArgument);
        }
        if indices.iter().any(|&index| self.claimed[index]) {
            return Err(GpioError::AlreadyInUse);
        }

        for &index in indices {
            self.claimed.set_aliased(index, true);
        }
        Ok(())
    }

    fn release(&self, index: usize) {
        self.claimed.set_aliased(index, false);
    }

    fn request_output(
        &self,
        index: usize,
        value: bool,
    ) -> GpioResult<gpiod::Lines<gpiod::Output>> {
        let options = gpiod::Options::output([index as u32]).consumer(CONSUMER);
        let line = self.chip.request_lines(options)?;
        line.set_values([value])?;
        Ok(line)
    }

    fn request_input(&self, index: usize) -> GpioResult<gpiod::Lines<gpiod::Input>> {
        let options = gpiod::Options::input([index as u32]).consumer(CONSUMER);
        let line = self.chip.request_lines(options)?;
        Ok(line)
    }
}

impl Debug for GpiodDriver {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "GpiodDriver({})", self.chip.name())
    }
}

impl GpioDriver for GpiodDriver {
    fn get_pin(&self, index: usize) -> GpioResult<Box<dyn GpioPin + '_>> {
        self.claim(&[index])?;
        Ok(Box::new(GpiodPin { driver: self, index }))
    }

    fn get_port(&self, indices: [Option<usize>; 8]) -> GpioResult<Box<dyn GpioPort + '_>> {
        let connected: Vec<usize> = indices.iter().flatten().copied().collect();
        self.claim(&connected)?;

        Ok(Box::new(GpiodPort {
            driver: self,
            indices,
            lines: Default::default(),
            latch: 0,
        }))
    }
}

struct GpiodPin<'a> {
    driver: &'a GpiodDriver,
    index: usize,
}

impl Debug for GpiodPin<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}[{}]", self.driver, self.index)
    }
}

impl GpioPin for GpiodPin<'_> {
    fn index(&self) -> usize {
        self.index
    }

    fn as_output(&mut self) -> GpioResult<Box<dyn GpioOutput + '_>> {
        let line = self.driver.request_output(self.index, false)?;
        Ok(Box::new(GpiodOutput { pin: self, line }))
    }
}

impl Drop for GpiodPin<'_> {
    fn drop(&mut self) {
        self.driver.release(self.index);
    }
}

struct GpiodOutput<'a> {
    pin: &'a GpiodPin<'a>,
    line: gpiod::Lines<gpiod::Output>,
}

impl Debug for GpiodOutput<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}[output]", self.pin)
    }
}

impl GpioOutput for GpiodOutput<'_> {
    fn write(&self, value: bool) -> GpioResult<()> {
        self.line.set_values([value])?;
        Ok(())
    }
}

/// A single line of a [GpiodPort]. Lines are requested one by one so that half of the port can
/// change direction while the other half keeps its state.
#[derive(Default)]
enum PortLine {
    #[default]
    Unrequested,
    Input(gpiod::Lines<gpiod::Input>),
    Output(gpiod::Lines<gpiod::Output>),
}

struct GpiodPort<'a> {
    driver: &'a GpiodDriver,
    indices: [Option<usize>; 8],
    lines: [PortLine; 8],
    /// Last value driven on the output lines, LSb first.
    latch: u8,
}

impl Debug for GpiodPort<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}{:?}[port]", self.driver, self.indices)
    }
}

impl GpioPort for GpiodPort<'_> {
    fn set_direction(&mut self, mask: u8, direction: PortDirection) -> GpioResult<()> {
        for bit in 0..8 {
            let Some(index) = self.indices[bit] else { continue };
            if mask & (1 << bit) == 0 {
                continue;
            }

            // The kernel refuses to hand out a line that is still requested
            self.lines[bit] = PortLine::Unrequested;
            self.lines[bit] = match direction {
                PortDirection::Input => PortLine::Input(self.driver.request_input(index)?),
                PortDirection::Output => {
                    let high = self.latch & (1 << bit) != 0;
                    PortLine::Output(self.driver.request_output(index, high)?)
                }
            };
        }
        trace!("Port {:08b} set to {:?}", mask, direction);
        Ok(())
    }

    fn write(&mut self, mask: u8, value: u8) -> GpioResult<()> {
        self.latch = (self.latch & !mask) | (value & mask);
        for (bit, line) in self.lines.iter().enumerate() {
            if mask & (1 << bit) == 0 {
                continue;
            }
            if let PortLine::Output(line) = line {
                line.set_values([value & (1 << bit) != 0])?;
            }
        }
        Ok(())
    }

    fn read(&self) -> GpioResult<u8> {
        let mut value = 0u8;
        for (bit, line) in self.lines.iter().enumerate() {
            let high = match line {
                PortLine::Unrequested => false,
                PortLine::Input(line) => line.get_values([false])?[0],
                PortLine::Output(_) => self.latch & (1 << bit) != 0,
            };
            value |= (high as u8) << bit;
        }
        Ok(value)
    }
}

impl Drop for GpiodPort<'_> {
    fn drop(&mut self) {
        for &index in self.indices.iter().flatten() {
            self.driver.release(index);
        }
    }
}
