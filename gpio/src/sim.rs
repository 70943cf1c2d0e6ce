//! Simulated HD44780 controller wired to in-memory pins.
//!
//! [SimLcd] hands out [SimOutput] pins for E, RS and R/W, a [SimPort] for the data lines and a
//! [SimDelay] for the waits. They all share the same state, so a driver built from them talks to
//! a model of the controller that follows the datasheet closely enough to notice protocol
//! mistakes: it latches on the falling edge of E, starts in the 8-bit interface, ignores writes
//! while busy, and only gets out of busy when enough time has passed, either by waiting or by
//! polling the busy flag.
//!
//! Everything seen on the bus is recorded as [BusEvent]s.

use crate::lcd::hd44780::config::BusWidth;
use crate::{GpioOutput, GpioPort, GpioResult, PortDirection};
use embedded_hal::delay::DelayNs;
use log::trace;
use std::cell::RefCell;

/// Internal reset time after power-up, with the busy flag held.
pub const POWER_ON_BUSY_NS: u64 = 10_000_000;
/// Execution time of most instructions.
pub const INSTRUCTION_NS: u64 = 37_000;
/// Execution time of clear display and return home.
pub const SLOW_INSTRUCTION_NS: u64 = 1_520_000;
/// Execution time of a data write, including the address counter update.
pub const DATA_NS: u64 = 41_000;
/// Time a single busy flag sample takes.
pub const POLL_NS: u64 = 1_000;
/// Minimum E high time the controller accepts.
pub const MIN_ENABLE_NS: u64 = 450;

const DDRAM_SIZE: usize = 128;
const CGRAM_SIZE: usize = 64;
const BLANK: u8 = b' ';

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ControlLine {
    E,
    Rs,
    Rw,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum BusEvent {
    /// E changed level.
    Enable(bool),
    /// A write was latched on the falling edge of E. `value` is D7..D0 as seen by the controller,
    /// so in 4-bit mode the nibble is in the upper half.
    Latch { rs: bool, value: u8 },
    /// A complete instruction or data byte was executed.
    Execute { rs: bool, value: u8 },
    /// A write arrived while the controller was busy and was dropped.
    Ignored { rs: bool, value: u8 },
    /// The busy flag was sampled by the host.
    BusySample(bool),
    /// The host waited this many nanoseconds.
    Delay(u32),
}

#[derive(Debug)]
struct SimState {
    rs: bool,
    rw: bool,
    e: bool,
    /// Values driven by the host, LSb first.
    port_latch: u8,
    /// Port bits switched to input.
    port_inputs: u8,

    four_bit: bool,
    /// High nibble of a 4-bit write waiting for its low half.
    pending_nibble: Option<u8>,
    /// Whether the next 4-bit read presents the low nibble.
    read_low: bool,

    ddram: [u8; DDRAM_SIZE],
    cgram: [u8; CGRAM_SIZE],
    address: u8,
    cgram_selected: bool,
    increment: bool,
    shift: bool,
    display_on: bool,
    cursor_on: bool,
    blink_on: bool,
    two_lines: bool,
    font_5x10: bool,
    display_offset: u8,

    busy_ns: u64,
    stuck: bool,
    e_high_ns: u64,
    short_pulses: usize,
    ignored_writes: usize,
    events: Vec<BusEvent>,
}

impl SimState {
    fn new() -> Self {
        SimState {
            rs: false,
            rw: false,
            e: false,
            port_latch: 0,
            port_inputs: 0,
            four_bit: false,
            pending_nibble: None,
            read_low: false,
            ddram: [BLANK; DDRAM_SIZE],
            cgram: [0; CGRAM_SIZE],
            address: 0,
            cgram_selected: false,
            increment: true,
            shift: false,
            display_on: false,
            cursor_on: false,
            blink_on: false,
            two_lines: false,
            font_5x10: false,
            display_offset: 0,
            busy_ns: POWER_ON_BUSY_NS,
            stuck: false,
            e_high_ns: 0,
            short_pulses: 0,
            ignored_writes: 0,
            events: Vec::new(),
        }
    }

    fn busy(&self) -> bool {
        self.stuck || self.busy_ns > 0
    }

    fn elapse(&mut self, ns: u64) {
        self.busy_ns = self.busy_ns.saturating_sub(ns);
        if self.e {
            self.e_high_ns += ns;
        }
    }

    fn line_length(&self) -> u8 {
        if self.two_lines { 40 } else { 80 }
    }

    /// Address after moving the counter by one, following the DDRAM layout.
    fn step_address(&self, address: u8, forward: bool) -> u8 {
        if self.cgram_selected {
            let next = if forward { address.wrapping_add(1) } else { address.wrapping_sub(1) };
            return next & 0x3F;
        }

        match (self.two_lines, address, forward) {
            (true, 0x27, true) => 0x40,
            (true, 0x67, true) => 0x00,
            (true, 0x40, false) => 0x27,
            (true, 0x00, false) => 0x67,
            (false, 0x4F, true) => 0x00,
            (false, 0x00, false) => 0x4F,
            (_, address, true) => (address + 1) & 0x7F,
            (_, address, false) => (address - 1) & 0x7F,
        }
    }

    fn shift_display(&mut self, left: bool) {
        let length = self.line_length();
        self.display_offset = if left {
            (self.display_offset + 1) % length
        } else {
            (self.display_offset + length - 1) % length
        };
    }

    /// The byte the controller presents on a read.
    fn output_byte(&self) -> u8 {
        if self.rs {
            if self.cgram_selected {
                self.cgram[(self.address & 0x3F) as usize]
            } else {
                self.ddram[(self.address & 0x7F) as usize]
            }
        } else {
            ((self.busy() as u8) << 7) | (self.address & 0x7F)
        }
    }

    fn execute(&mut self, rs: bool, value: u8) {
        trace!("Simulated HD44780 executing {:08b}, RS: {}", value, rs);
        self.events.push(BusEvent::Execute { rs, value });

        if rs {
            if self.cgram_selected {
                self.cgram[(self.address & 0x3F) as usize] = value;
            } else {
                self.ddram[(self.address & 0x7F) as usize] = value;
                if self.shift {
                    self.shift_display(self.increment);
                }
            }
            self.address = self.step_address(self.address, self.increment);
            self.busy_ns = DATA_NS;
            return;
        }

        self.busy_ns = INSTRUCTION_NS;
        if value & 0x80 != 0 {
            self.address = value & 0x7F;
            self.cgram_selected = false;
        } else if value & 0x40 != 0 {
            self.address = value & 0x3F;
            self.cgram_selected = true;
        } else if value & 0x20 != 0 {
            self.four_bit = value & 0x10 == 0;
            self.two_lines = value & 0x08 != 0;
            self.font_5x10 = value & 0x04 != 0;
            self.pending_nibble = None;
            self.read_low = false;
        } else if value & 0x10 != 0 {
            let right = value & 0x04 != 0;
            if value & 0x08 != 0 {
                self.shift_display(!right);
            } else {
                self.address = self.step_address(self.address, right);
            }
        } else if value & 0x08 != 0 {
            self.display_on = value & 0x04 != 0;
            self.cursor_on = value & 0x02 != 0;
            self.blink_on = value & 0x01 != 0;
        } else if value & 0x04 != 0 {
            self.increment = value & 0x02 != 0;
            self.shift = value & 0x01 != 0;
        } else if value & 0x02 != 0 {
            self.address = 0;
            self.cgram_selected = false;
            self.display_offset = 0;
            self.busy_ns = SLOW_INSTRUCTION_NS;
        } else if value & 0x01 != 0 {
            self.ddram = [BLANK; DDRAM_SIZE];
            self.address = 0;
            self.cgram_selected = false;
            self.display_offset = 0;
            self.increment = true;
            self.busy_ns = SLOW_INSTRUCTION_NS;
        }
    }

    fn latch_write(&mut self, value: u8) {
        let rs = self.rs;
        if self.busy() {
            self.ignored_writes += 1;
            self.events.push(BusEvent::Ignored { rs, value });
            return;
        }

        self.events.push(BusEvent::Latch { rs, value });
        if !self.four_bit {
            self.execute(rs, value);
            return;
        }

        match self.pending_nibble.take() {
            None => self.pending_nibble = Some(value & 0xF0),
            Some(high) => self.execute(rs, high | (value >> 4)),
        }
    }

    fn complete_read(&mut self) {
        if self.four_bit && !self.read_low {
            self.read_low = true;
            return;
        }

        self.read_low = false;
        if self.rs && !self.busy() {
            self.address = self.step_address(self.address, self.increment);
        }
    }
}

/// A simulated HD44780 controller. See the [module documentation](self).
#[derive(Debug)]
pub struct SimLcd {
    wiring: BusWidth,
    state: RefCell<SimState>,
}

impl SimLcd {
    /// Creates a freshly powered-up controller whose data lines are wired to the port as
    /// described by `wiring`.
    pub fn new(wiring: BusWidth) -> Self {
        SimLcd {
            wiring,
            state: RefCell::new(SimState::new()),
        }
    }

    pub fn pin_e(&self) -> SimOutput<'_> {
        SimOutput { sim: self, line: ControlLine::E }
    }

    pub fn pin_rs(&self) -> SimOutput<'_> {
        SimOutput { sim: self, line: ControlLine::Rs }
    }

    pub fn pin_rw(&self) -> SimOutput<'_> {
        SimOutput { sim: self, line: ControlLine::Rw }
    }

    pub fn port(&self) -> SimPort<'_> {
        SimPort { sim: self }
    }

    pub fn delay(&self) -> SimDelay<'_> {
        SimDelay { sim: self }
    }

    /// D7..D0 as driven onto the port bits.
    fn to_port(&self, data: u8) -> u8 {
        match self.wiring {
            BusWidth::FourBitUpper => data & 0xF0,
            BusWidth::FourBitLower => data >> 4,
            BusWidth::EightBit => data,
        }
    }

    /// D7..D0 as seen from the port bits. Unwired data lines read as `0`.
    fn from_port(&self, port: u8) -> u8 {
        match self.wiring {
            BusWidth::FourBitUpper => port & 0xF0,
            BusWidth::FourBitLower => (port & 0x0F) << 4,
            BusWidth::EightBit => port,
        }
    }

    fn set_line(&self, line: ControlLine, value: bool) {
        let mut state = self.state.borrow_mut();
        match line {
            ControlLine::Rs => state.rs = value,
            ControlLine::Rw => state.rw = value,
            ControlLine::E => {
                if state.e == value {
                    return;
                }
                state.e = value;
                state.events.push(BusEvent::Enable(value));
                if value {
                    state.e_high_ns = 0;
                    return;
                }

                if state.e_high_ns < MIN_ENABLE_NS {
                    state.short_pulses += 1;
                }
                if state.rw {
                    state.complete_read();
                } else {
                    let driven = state.port_latch & !state.port_inputs;
                    let data = self.from_port(driven);
                    state.latch_write(data);
                }
            }
        }
    }

    fn read_port(&self) -> u8 {
        let mut state = self.state.borrow_mut();
        let mut value = state.port_latch & !state.port_inputs;

        if state.rw && state.e {
            let byte = state.output_byte();
            let data = if !state.four_bit {
                byte
            } else if state.read_low {
                byte << 4
            } else {
                byte & 0xF0
            };
            value |= self.to_port(data) & state.port_inputs;

            if !state.rs && !state.read_low {
                let busy = state.busy();
                state.events.push(BusEvent::BusySample(busy));
                state.elapse(POLL_NS);
            }
        }

        value
    }

    pub fn events(&self) -> Vec<BusEvent> {
        self.state.borrow().events.clone()
    }

    pub fn clear_events(&self) {
        self.state.borrow_mut().events.clear();
    }

    /// Values of every accepted latch, in order.
    pub fn latches(&self) -> Vec<(bool, u8)> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                BusEvent::Latch { rs, value } => Some((rs, value)),
                _ => None,
            })
            .collect()
    }

    /// Every executed instruction or data byte, in order.
    pub fn executed(&self) -> Vec<(bool, u8)> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                BusEvent::Execute { rs, value } => Some((rs, value)),
                _ => None,
            })
            .collect()
    }

    /// Every busy flag sample, in order.
    pub fn busy_samples(&self) -> Vec<bool> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                BusEvent::BusySample(busy) => Some(busy),
                _ => None,
            })
            .collect()
    }

    pub fn ddram(&self, address: u8) -> u8 {
        self.state.borrow().ddram[(address & 0x7F) as usize]
    }

    pub fn cgram(&self, address: u8) -> u8 {
        self.state.borrow().cgram[(address & 0x3F) as usize]
    }

    pub fn address_counter(&self) -> u8 {
        self.state.borrow().address
    }

    /// The visible characters of a line, `width` characters wide, honoring the display shift.
    pub fn line(&self, row: u8, width: u8) -> String {
        let state = self.state.borrow();
        let length = state.line_length() as usize;
        let base = if state.two_lines && row == 1 { 0x40 } else { 0x00 };
        (0..width as usize)
            .map(|column| {
                let address = base + (state.display_offset as usize + column) % length;
                state.ddram[address] as char
            })
            .collect()
    }

    pub fn is_four_bit(&self) -> bool {
        self.state.borrow().four_bit
    }

    /// Display, cursor and blink state.
    pub fn display_control(&self) -> (bool, bool, bool) {
        let state = self.state.borrow();
        (state.display_on, state.cursor_on, state.blink_on)
    }

    /// Address increment and display shift state.
    pub fn entry_mode(&self) -> (bool, bool) {
        let state = self.state.borrow();
        (state.increment, state.shift)
    }

    /// Two-line mode and 5x10 font state.
    pub fn function(&self) -> (bool, bool) {
        let state = self.state.borrow();
        (state.two_lines, state.font_5x10)
    }

    pub fn display_offset(&self) -> u8 {
        self.state.borrow().display_offset
    }

    pub fn is_busy(&self) -> bool {
        self.state.borrow().busy()
    }

    /// Keeps the busy flag set for another `ns` nanoseconds.
    pub fn hold_busy(&self, ns: u64) {
        self.state.borrow_mut().busy_ns = ns;
    }

    /// Makes the busy flag stick, like a hung or missing controller with a pulled-up D7.
    pub fn hang(&self) {
        self.state.borrow_mut().stuck = true;
    }

    pub fn short_pulses(&self) -> usize {
        self.state.borrow().short_pulses
    }

    pub fn ignored_writes(&self) -> usize {
        self.state.borrow().ignored_writes
    }

    pub fn line_level(&self, line: ControlLine) -> bool {
        let state = self.state.borrow();
        match line {
            ControlLine::E => state.e,
            ControlLine::Rs => state.rs,
            ControlLine::Rw => state.rw,
        }
    }

    /// Port bits currently switched to input.
    pub fn port_inputs(&self) -> u8 {
        self.state.borrow().port_inputs
    }

    /// Values last driven on the port.
    pub fn port_latch(&self) -> u8 {
        self.state.borrow().port_latch
    }
}

/// A control line of a [SimLcd].
#[derive(Debug)]
pub struct SimOutput<'a> {
    sim: &'a SimLcd,
    line: ControlLine,
}

impl GpioOutput for SimOutput<'_> {
    fn write(&self, value: bool) -> GpioResult<()> {
        self.sim.set_line(self.line, value);
        Ok(())
    }
}

/// The data port of a [SimLcd].
#[derive(Debug)]
pub struct SimPort<'a> {
    sim: &'a SimLcd,
}

impl GpioPort for SimPort<'_> {
    fn set_direction(&mut self, mask: u8, direction: PortDirection) -> GpioResult<()> {
        let mut state = self.sim.state.borrow_mut();
        match direction {
            PortDirection::Input => state.port_inputs |= mask,
            PortDirection::Output => state.port_inputs &= !mask,
        }
        Ok(())
    }

    fn write(&mut self, mask: u8, value: u8) -> GpioResult<()> {
        let mut state = self.sim.state.borrow_mut();
        state.port_latch = (state.port_latch & !mask) | (value & mask);
        Ok(())
    }

    fn read(&self) -> GpioResult<u8> {
        Ok(self.sim.read_port())
    }
}

/// Delay provider of a [SimLcd]. Advances simulated time instead of sleeping.
#[derive(Debug)]
pub struct SimDelay<'a> {
    sim: &'a SimLcd,
}

impl DelayNs for SimDelay<'_> {
    fn delay_ns(&mut self, ns: u32) {
        let mut state = self.sim.state.borrow_mut();
        state.events.push(BusEvent::Delay(ns));
        state.elapse(ns as u64);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Latches a full byte in whatever interface mode the controller is in.
    fn write_byte(sim: &SimLcd, rs: bool, value: u8) {
        let mut port = sim.port();
        port.set_direction(0xFF, PortDirection::Output).unwrap();
        sim.pin_rs().write(rs).unwrap();
        let nibbles = if sim.is_four_bit() { vec![value & 0xF0, value << 4] } else { vec![value] };
        for nibble in nibbles {
            port.write(0xFF, sim.to_port(nibble)).unwrap();
            sim.pin_e().write(true).unwrap();
            sim.delay().delay_ns(1_000);
            sim.pin_e().write(false).unwrap();
            sim.delay().delay_ns(2_000_000);
        }
    }

    fn powered_up(wiring: BusWidth) -> SimLcd {
        let sim = SimLcd::new(wiring);
        sim.delay().delay_ns(POWER_ON_BUSY_NS as u32);
        sim
    }

    #[test]
    fn test_ignores_writes_during_power_on() {
        let sim = SimLcd::new(BusWidth::EightBit);
        write_byte(&sim, false, 0x38);
        assert_eq!(sim.ignored_writes(), 1);
        assert!(sim.executed().is_empty());
    }

    #[test]
    fn test_switches_to_four_bit_interface() {
        let sim = powered_up(BusWidth::EightBit);
        write_byte(&sim, false, 0x20);
        assert!(sim.is_four_bit());
        write_byte(&sim, false, 0x28);
        assert_eq!(sim.executed(), vec![(false, 0x20), (false, 0x28)]);
        assert_eq!(sim.function(), (true, false));
    }

    #[test]
    fn test_data_write_advances_address() {
        let sim = powered_up(BusWidth::EightBit);
        write_byte(&sim, false, 0x38);
        write_byte(&sim, false, 0x80 | 0x26);
        write_byte(&sim, true, b'x');
        write_byte(&sim, true, b'y');
        write_byte(&sim, true, b'z');
        assert_eq!(sim.ddram(0x26), b'x');
        assert_eq!(sim.ddram(0x27), b'y');
        assert_eq!(sim.ddram(0x40), b'z');
        assert_eq!(sim.address_counter(), 0x41);
    }

    #[test]
    fn test_clear_resets_address_and_entry_mode() {
        let sim = powered_up(BusWidth::EightBit);
        write_byte(&sim, false, 0x38);
        write_byte(&sim, false, 0x04);
        write_byte(&sim, false, 0x85);
        write_byte(&sim, true, b'q');
        assert_eq!(sim.address_counter(), 0x04);
        write_byte(&sim, false, 0x01);
        assert_eq!(sim.ddram(0x05), b' ');
        assert_eq!(sim.address_counter(), 0);
        assert_eq!(sim.entry_mode(), (true, false));
    }

    #[test]
    fn test_short_enable_pulse_is_counted() {
        let sim = powered_up(BusWidth::EightBit);
        sim.pin_e().write(true).unwrap();
        sim.delay().delay_ns(100);
        sim.pin_e().write(false).unwrap();
        assert_eq!(sim.short_pulses(), 1);
    }

    #[test]
    fn test_busy_flag_visible_on_lower_nibble() {
        let sim = powered_up(BusWidth::FourBitLower);
        write_byte(&sim, false, 0x20);
        sim.hold_busy(5_000);

        let mut port = sim.port();
        port.set_direction(0x0F, PortDirection::Input).unwrap();
        sim.pin_rs().write(false).unwrap();
        sim.pin_rw().write(true).unwrap();
        sim.pin_e().write(true).unwrap();
        assert_eq!(port.read().unwrap() & 0x08, 0x08);
        sim.hold_busy(0);
        assert_eq!(port.read().unwrap() & 0x08, 0x00);
        assert_eq!(sim.busy_samples(), vec![true, false]);
    }

    #[test]
    fn test_display_shift() {
        let sim = powered_up(BusWidth::EightBit);
        write_byte(&sim, false, 0x38);
        write_byte(&sim, true, b'a');
        write_byte(&sim, true, b'b');
        write_byte(&sim, false, 0x18);
        assert_eq!(sim.display_offset(), 1);
        assert_eq!(sim.line(0, 2), "b ");
        write_byte(&sim, false, 0x1C);
        assert_eq!(sim.line(0, 2), "ab");
    }
}
