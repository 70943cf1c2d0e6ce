use embedded_hal::delay::DelayNs;
use std::thread::sleep;
use std::time::Duration;

/// Blocking delay backed by [std::thread::sleep].
///
/// The OS scheduler decides the real resolution. Waits only ever come out longer than asked for.
#[derive(Copy, Clone, Debug, Default)]
pub struct StdDelay;

impl DelayNs for StdDelay {
    fn delay_ns(&mut self, ns: u32) {
        sleep(Duration::from_nanos(ns as u64));
    }
}
