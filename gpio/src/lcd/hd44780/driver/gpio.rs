use crate::lcd::hd44780::command::BUSY_FLAG;
use crate::lcd::hd44780::config::{
    Blocking, BusWidth, LcdConfig, LcdConfigError, ReadyCheck, RwLine,
};
use crate::lcd::hd44780::driver::HD44780Driver;
use crate::{GpioError, GpioOutput, GpioPort, GpioResult, PortDirection};
use embedded_hal::delay::DelayNs;
use log::{debug, trace, warn};
use std::fmt::{Debug, Formatter};

/// Function set with DL = 1, as seen on D7..D4 while the controller's interface width is unknown.
const SYNC_NIBBLE: u8 = 0b0011;
/// Function set with DL = 0, switching the controller to the 4-bit interface.
const FOUR_BIT_NIBBLE: u8 = 0b0010;

/// HD44780 driver bit-banging the parallel interface over GPIO.
///
/// E, RS and the optional R/W are single output pins, the data lines are the bits of a
/// [GpioPort] selected by [LcdConfig::bus_width]. The other bits of the port are left alone,
/// so the host can keep using them.
///
/// The pins must already be configured as outputs by the host. The driver only switches the
/// direction of its own data lines, for reads.
pub struct GpioHD44780Driver<'a, D: DelayNs> {
    pin_e: &'a dyn GpioOutput,
    pin_rw: Option<&'a dyn GpioOutput>,
    pin_rs: &'a dyn GpioOutput,
    data_port: &'a mut dyn GpioPort,
    delay: D,
    config: LcdConfig,
    /// Set for the duration of [HD44780Driver::init], during which every transfer blocks.
    initializing: bool,
}

impl<'a, D: DelayNs> GpioHD44780Driver<'a, D> {
    /// Creates a new driver.
    ///
    /// # Parameters
    ///
    /// - `config`: the wiring and modes, checked with [LcdConfig::validate].
    /// - `pin_e`: Enable output pin.
    /// - `pin_rw`: Read/write output pin. Must be `Some` exactly when the config has
    ///   [RwLine::Controlled].
    /// - `pin_rs`: Register select output pin.
    /// - `data_port`: The port the data lines are wired to.
    /// - `delay`: Delay provider used for every protocol wait.
    pub fn new(
        config: LcdConfig,
        pin_e: &'a dyn GpioOutput,
        pin_rw: Option<&'a dyn GpioOutput>,
        pin_rs: &'a dyn GpioOutput,
        data_port: &'a mut dyn GpioPort,
        delay: D,
    ) -> Result<Self, LcdConfigError> {
        config.validate()?;
        if pin_rw.is_some() != (config.rw_line == RwLine::Controlled) {
            return Err(LcdConfigError::RwPinMismatch);
        }

        Ok(GpioHD44780Driver {
            pin_e,
            pin_rw,
            pin_rs,
            data_port,
            delay,
            config,
            initializing: false,
        })
    }

    /// Whether [HD44780Driver::init] is currently running.
    pub fn is_initializing(&self) -> bool {
        self.initializing
    }

    fn bus(&self) -> BusWidth {
        self.config.bus_width
    }

    fn wait_enable(&mut self) {
        let ns = self.config.timing.enable_pulse_ns();
        self.delay.delay_ns(ns);
    }

    fn pulse_e(&mut self) -> GpioResult<()> {
        self.pin_e.write(true)?;
        self.wait_enable();
        self.pin_e.write(false)?;
        Ok(())
    }

    /// Presents a nibble on D7..D4 and latches it.
    fn write_nibble(&mut self, nibble: u8) -> GpioResult<()> {
        let bus = self.bus();
        trace!("Writing nibble: {:04b}", nibble);
        self.data_port.write(bus.port_mask(), bus.nibble_to_port(nibble))?;
        self.pulse_e()
    }

    /// Waits until the controller can take a transfer, as configured.
    ///
    /// During initialization this always waits. Afterwards, in non-blocking mode, it is up to the
    /// caller to poll [HD44780Driver::is_busy].
    fn wait_ready(&mut self) -> GpioResult<()> {
        if !self.initializing && self.config.blocking == Blocking::NonBlocking {
            return Ok(());
        }

        match self.config.ready_check {
            ReadyCheck::FixedDelay => {
                let ns = self.config.timing.settle_wait_ns();
                self.delay.delay_ns(ns);
            }
            ReadyCheck::BusyFlag => {
                self.is_busy()?;
            }
        }
        Ok(())
    }

    fn send(&mut self, data: u8, rs: bool) -> GpioResult<()> {
        self.wait_ready()?;

        trace!("Sending data: {:08b}, RS: {}", data, rs);

        self.pin_rs.write(rs)?;
        self.pin_e.write(false)?;
        if let Some(rw) = self.pin_rw {
            rw.write(false)?;
        }

        match self.bus() {
            BusWidth::EightBit => {
                self.data_port.write(0xFF, data)?;
                self.pulse_e()?;
            }
            BusWidth::FourBitUpper | BusWidth::FourBitLower => {
                self.write_nibble(data >> 4)?;
                self.write_nibble(data & 0x0F)?;
            }
        }

        Ok(())
    }

    /// Puts the controller in read mode and switches the data lines to input.
    fn begin_read(&mut self, rs: bool, rw: &dyn GpioOutput) -> GpioResult<()> {
        self.pin_rs.write(rs)?;
        rw.write(true)?;
        self.pin_e.write(false)?;

        let mask = self.bus().port_mask();
        self.data_port.set_direction(mask, PortDirection::Input)
    }

    /// Raises E for a read, counting it in `strobes`.
    fn raise_e(&mut self, strobes: &mut u8) -> GpioResult<()> {
        self.pin_e.write(true)?;
        *strobes += 1;
        self.wait_enable();
        Ok(())
    }

    /// Ends a read however far it got: drives E low, clocks out the other half of a 4-bit read
    /// left after an odd number of strobes, then switches the data lines back to output and the
    /// controller back to write mode.
    ///
    /// Every step is attempted even if an earlier one fails. The first error is returned.
    fn end_read(&mut self, rw: &dyn GpioOutput, strobes: u8) -> GpioResult<()> {
        let bus = self.bus();
        let mut result = self.pin_e.write(false);
        if bus.is_4bit() && strobes % 2 == 1 {
            self.wait_enable();
            result = result.and(self.pulse_e());
        }
        result = result.and(self.data_port.set_direction(bus.port_mask(), PortDirection::Output));
        result.and(rw.write(false))
    }

    /// Samples the data lines while E is high. E is left high after the last sample.
    fn read_data(&mut self, strobes: &mut u8) -> GpioResult<u8> {
        let bus = self.bus();
        match bus {
            BusWidth::EightBit => {
                self.raise_e(strobes)?;
                self.data_port.read()
            }
            BusWidth::FourBitUpper | BusWidth::FourBitLower => {
                self.raise_e(strobes)?;
                let high_nibble = bus.port_to_nibble(self.data_port.read()?);
                self.pin_e.write(false)?;
                self.wait_enable();

                self.raise_e(strobes)?;
                let low_nibble = bus.port_to_nibble(self.data_port.read()?);

                Ok((high_nibble << 4) | low_nibble)
            }
        }
    }

    /// Reads a full byte. The bus is handed back in write mode even when the read fails.
    fn read(&mut self, rs: bool) -> GpioResult<u8> {
        self.wait_ready()?;

        let rw = self.pin_rw.ok_or(GpioError::NotSupported)?;
        let mut strobes = 0;
        let data = self
            .begin_read(rs, rw)
            .and_then(|_| self.read_data(&mut strobes));
        let restored = self.end_read(rw, strobes);
        let data = data.and_then(|data| restored.map(|_| data))?;

        trace!("Read data: {:08b}, RS: {}", data, rs);

        Ok(data)
    }

    /// Raises E and samples the busy flag, spinning on it while initializing or in blocking mode.
    fn sample_busy(&mut self, strobes: &mut u8) -> GpioResult<bool> {
        self.raise_e(strobes)?;
        if self.initializing || self.config.blocking == Blocking::Blocking {
            self.spin_while_busy()?;
            return Ok(false);
        }
        Ok(self.data_port.read()? & self.bus().busy_mask() != 0)
    }

    /// Keeps sampling the busy flag, with E held high, until it clears.
    ///
    /// Gives up with [GpioError::Timeout] after [LcdConfig::busy_poll_limit] samples, if set.
    fn spin_while_busy(&mut self) -> GpioResult<()> {
        let busy_mask = self.bus().busy_mask();
        let mut polls = 0u32;
        while self.data_port.read()? & busy_mask != 0 {
            polls += 1;
            if self.config.busy_poll_limit.is_some_and(|limit| polls >= limit) {
                warn!("Busy flag still set after {} polls", polls);
                return Err(GpioError::Timeout);
            }
        }
        trace!("Busy flag cleared after {} polls", polls);
        Ok(())
    }

    /// Samples the busy flag until it clears, calling [HD44780Driver::is_busy] repeatedly.
    ///
    /// Meant for non-blocking mode, where `is_busy` samples once. Honors
    /// [LcdConfig::busy_poll_limit].
    pub fn wait_until_ready(&mut self) -> GpioResult<()> {
        let mut polls = 0u32;
        while self.is_busy()? {
            polls += 1;
            if self.config.busy_poll_limit.is_some_and(|limit| polls >= limit) {
                warn!("Display still busy after {} polls", polls);
                return Err(GpioError::Timeout);
            }
        }
        Ok(())
    }
}

impl<D: DelayNs> Debug for GpioHD44780Driver<'_, D> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GpioHD44780Driver")
            .field("pin_e", &self.pin_e)
            .field("pin_rw", &self.pin_rw)
            .field("pin_rs", &self.pin_rs)
            .field("data_port", &self.data_port)
            .field("config", &self.config)
            .field("initializing", &self.initializing)
            .finish()
    }
}

impl<D: DelayNs> HD44780Driver for GpioHD44780Driver<'_, D> {
    /// Initializes the display by instruction.
    ///
    /// The controller might power up in either interface width, or in the middle of a 4-bit
    /// transfer. Presenting the 8-bit function set `0011` three times, with the documented waits,
    /// brings it to a known 8-bit state. In 4-bit mode the `0010` nibble then switches it to the
    /// 4-bit interface.
    ///
    /// Then it sends, blocking regardless of the configured mode:
    /// - function set (bus width, lines, font),
    /// - display off,
    /// - clear display,
    /// - entry mode,
    /// - display control.
    fn init(&mut self) -> GpioResult<()> {
        self.initializing = true;
        let result = self.init_sequence();
        self.initializing = false;
        result
    }

    fn send_command(&mut self, command: u8) -> GpioResult<()> {
        self.send(command, false)
    }

    fn write_char(&mut self, data: u8) -> GpioResult<()> {
        self.send(data, true)
    }

    fn write_bytes(&mut self, data: &[u8]) -> GpioResult<()> {
        for &byte in data.iter().take_while(|&&byte| byte != 0) {
            if self.config.blocking == Blocking::NonBlocking {
                self.wait_until_ready()?;
            }
            self.write_char(byte)?;
        }
        Ok(())
    }

    /// Reads the busy flag by setting RS to 0, R/W to read, and sampling D7 while E is high.
    ///
    /// During initialization and in blocking mode it keeps sampling until the flag clears and
    /// returns `false`. In non-blocking mode it samples once.
    ///
    /// In 4-bit mode, E is pulsed once more afterwards to clock out the low half of the address.
    /// E, R/W and the data line directions are restored even if the GPIO backend fails midway.
    fn is_busy(&mut self) -> GpioResult<bool> {
        let rw = self.pin_rw.ok_or(GpioError::NotSupported)?;
        let mut strobes = 0;
        let busy = self
            .begin_read(false, rw)
            .and_then(|_| self.sample_busy(&mut strobes));
        let restored = self.end_read(rw, strobes);
        busy.and_then(|busy| restored.map(|_| busy))
    }

    fn get_address(&mut self) -> GpioResult<u8> {
        Ok(self.read(false)? & !BUSY_FLAG)
    }

    fn read_char(&mut self) -> GpioResult<u8> {
        self.read(true)
    }
}

impl<D: DelayNs> GpioHD44780Driver<'_, D> {
    fn init_sequence(&mut self) -> GpioResult<()> {
        let bus = self.bus();
        let timing = self.config.timing;

        debug!("Initializing HD44780 with {:?}", self.config);

        self.data_port.set_direction(bus.port_mask(), PortDirection::Output)?;
        self.data_port.write(bus.port_mask(), 0)?;

        self.pin_rs.write(false)?;
        self.pin_e.write(false)?;
        if let Some(rw) = self.pin_rw {
            rw.write(false)?;
        }

        self.delay.delay_ns(timing.power_on_ns());

        // Synchronize
        for _ in 0..3 {
            match bus {
                BusWidth::EightBit => {
                    self.data_port.write(0xFF, SYNC_NIBBLE << 4)?;
                    self.pulse_e()?;
                }
                BusWidth::FourBitUpper | BusWidth::FourBitLower => self.write_nibble(SYNC_NIBBLE)?,
            }
            self.delay.delay_ns(timing.function_set_ns());
        }
        if bus.is_4bit() {
            self.write_nibble(FOUR_BIT_NIBBLE)?;
        }
        debug!("Interface synchronized");

        self.send_command(self.config.function_set_command())?;
        self.set_display_control(false, false, false)?;
        self.clear_display()?;
        self.send_command(self.config.entry_mode_command())?;
        self.send_command(self.config.display_control_command())?;

        debug!("HD44780 initialized");
        Ok(())
    }
}
