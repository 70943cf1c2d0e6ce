//! Timing constants of the HD44780 initialization and transfer protocol.
//!
//! The controller specifies its timings in absolute time, while a bit-banging host counts
//! instruction cycles. Every minimum below is therefore converted into whole instruction cycles
//! of the host clock, rounded up, and the wait that is actually issued is the duration of those
//! cycles.
//! Changing the clock frequency re-derives all waits, and they never get shorter than the minimum.

use serde::{Deserialize, Serialize};

/// Clock of the PICDEM 2 board, 4 MHz.
pub const REFERENCE_CLOCK_HZ: u32 = 4_000_000;
/// Oscillator clocks per instruction cycle (PIC18: Fosc/4).
pub const CLOCKS_PER_CYCLE: u32 = 4;

/// Settle time after power-up before the first function set.
pub const POWER_ON_NS: u32 = 15_000_000;
/// Settle time after each of the three synchronizing function set pulses.
pub const FUNCTION_SET_NS: u32 = 4_000_000;
/// Minimum width of the E pulse.
pub const ENABLE_PULSE_NS: u32 = 500;
/// Default fixed delay used instead of busy flag polling.
pub const SETTLE_NS: u32 = 2_000_000;
/// Execution time of the slowest instructions (clear display, return home).
pub const LONGEST_INSTRUCTION_NS: u32 = 1_520_000;

const NS_PER_SECOND: u64 = 1_000_000_000;

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Timing {
    /// Host oscillator frequency in Hz.
    pub clock_hz: u32,
    /// Fixed wait before each transfer when the busy flag is not polled.
    pub settle_ns: u32,
}

impl Timing {
    pub const REFERENCE: Timing = Timing::new(REFERENCE_CLOCK_HZ);

    pub const fn new(clock_hz: u32) -> Self {
        Timing {
            clock_hz,
            settle_ns: SETTLE_NS,
        }
    }

    pub const fn with_settle_ns(mut self, settle_ns: u32) -> Self {
        self.settle_ns = settle_ns;
        self
    }

    /// Instruction cycles per second.
    pub const fn cycle_hz(&self) -> u32 {
        self.clock_hz / CLOCKS_PER_CYCLE
    }

    /// Number of whole instruction cycles lasting at least `ns` nanoseconds.
    pub const fn cycles_for(&self, ns: u32) -> u64 {
        let cycle_hz = self.cycle_hz() as u64;
        (ns as u64 * cycle_hz).div_ceil(NS_PER_SECOND)
    }

    /// Duration of `cycles` instruction cycles, rounded up to the next nanosecond.
    pub const fn cycles_to_ns(&self, cycles: u64) -> u64 {
        let cycle_hz = self.cycle_hz() as u64;
        if cycle_hz == 0 {
            return 0;
        }
        (cycles * NS_PER_SECOND).div_ceil(cycle_hz)
    }

    /// The wait actually issued for a minimum of `ns` nanoseconds.
    pub const fn wait_ns(&self, ns: u32) -> u32 {
        let wait = self.cycles_to_ns(self.cycles_for(ns));
        if wait > u32::MAX as u64 {
            u32::MAX
        } else {
            wait as u32
        }
    }

    pub const fn power_on_ns(&self) -> u32 {
        self.wait_ns(POWER_ON_NS)
    }

    pub const fn function_set_ns(&self) -> u32 {
        self.wait_ns(FUNCTION_SET_NS)
    }

    pub const fn enable_pulse_ns(&self) -> u32 {
        self.wait_ns(ENABLE_PULSE_NS)
    }

    pub const fn settle_wait_ns(&self) -> u32 {
        self.wait_ns(self.settle_ns)
    }
}

impl Default for Timing {
    fn default() -> Self {
        Timing::REFERENCE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_cycles() {
        let timing = Timing::REFERENCE;
        assert_eq!(timing.cycle_hz(), 1_000_000);
        assert_eq!(timing.cycles_for(POWER_ON_NS), 15_000);
        assert_eq!(timing.cycles_for(FUNCTION_SET_NS), 4_000);
        assert_eq!(timing.cycles_for(SETTLE_NS), 2_000);
        assert_eq!(timing.power_on_ns(), POWER_ON_NS);
        assert_eq!(timing.function_set_ns(), FUNCTION_SET_NS);
    }

    #[test]
    fn test_enable_pulse_rounds_up_to_a_cycle() {
        // One instruction cycle at 4 MHz lasts 1 us
        assert_eq!(Timing::REFERENCE.cycles_for(ENABLE_PULSE_NS), 1);
        assert_eq!(Timing::REFERENCE.enable_pulse_ns(), 1_000);
    }

    #[test]
    fn test_cycles_scale_with_clock() {
        let fast = Timing::new(8_000_000);
        assert_eq!(fast.cycles_for(POWER_ON_NS), 30_000);
        assert_eq!(fast.cycles_for(FUNCTION_SET_NS), 8_000);
        assert_eq!(fast.enable_pulse_ns(), 500);

        let slow = Timing::new(3_000_000);
        assert_eq!(slow.cycles_for(POWER_ON_NS), 11_250);
    }

    #[test]
    fn test_waits_never_shorter_than_minimum() {
        for clock_hz in [1_000_000, 3_000_000, 4_000_000, 7_372_800, 20_000_000, 40_000_000] {
            let timing = Timing::new(clock_hz);
            for ns in [ENABLE_PULSE_NS, FUNCTION_SET_NS, POWER_ON_NS, SETTLE_NS, 333] {
                assert!(timing.wait_ns(ns) >= ns, "{} Hz, {} ns", clock_hz, ns);
            }
        }
    }
}
