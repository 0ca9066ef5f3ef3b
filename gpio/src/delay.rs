//! Timing source used by the drivers.

use std::fmt::Debug;
use std::hint::spin_loop;
use std::thread::sleep;
use std::time::{Duration, Instant};

/// Blocking delay primitives.
///
/// Microsecond delays are allowed to be coarse (a busy loop), but never shorter than requested.
pub trait Delay: Debug {
    /// Blocks for at least `ms` milliseconds.
    fn delay_ms(&mut self, ms: u32);

    /// Blocks for at least `us` microseconds.
    fn delay_us(&mut self, us: u32);

    /// Blocks for at least `duration`, rounded up to whole microseconds.
    fn delay(&mut self, duration: Duration) {
        let us = duration.as_nanos().div_ceil(1_000);
        if us == 0 {
            return;
        }
        if us % 1_000 == 0 {
            self.delay_ms(u32::try_from(us / 1_000).unwrap_or(u32::MAX));
        } else {
            self.delay_us(u32::try_from(us).unwrap_or(u32::MAX));
        }
    }
}

impl<T: Delay + ?Sized> Delay for &mut T {
    fn delay_ms(&mut self, ms: u32) {
        (**self).delay_ms(ms)
    }

    fn delay_us(&mut self, us: u32) {
        (**self).delay_us(us)
    }
}

impl<T: Delay + ?Sized> Delay for Box<T> {
    fn delay_ms(&mut self, ms: u32) {
        (**self).delay_ms(ms)
    }

    fn delay_us(&mut self, us: u32) {
        (**self).delay_us(us)
    }
}

/// [Delay] backed by the standard library.
///
/// Milliseconds go through [sleep]. Microseconds spin on [Instant], as the scheduler can't be
/// trusted with single-microsecond sleeps.
#[derive(Copy, Clone, Debug, Default)]
pub struct StdDelay;

impl Delay for StdDelay {
    fn delay_ms(&mut self, ms: u32) {
        sleep(Duration::from_millis(ms.into()));
    }

    fn delay_us(&mut self, us: u32) {
        let duration = Duration::from_micros(us.into());
        let start = Instant::now();
        while start.elapsed() < duration {
            spin_loop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Default)]
    struct RecordingDelay {
        calls: Vec<(&'static str, u32)>,
    }

    impl Delay for RecordingDelay {
        fn delay_ms(&mut self, ms: u32) {
            self.calls.push(("ms", ms));
        }

        fn delay_us(&mut self, us: u32) {
            self.calls.push(("us", us));
        }
    }

    #[test]
    fn duration_rounds_up_to_microseconds() {
        let mut delay = RecordingDelay::default();
        delay.delay(Duration::from_nanos(450));
        delay.delay(Duration::from_micros(37));
        delay.delay(Duration::from_millis(5));
        delay.delay(Duration::ZERO);
        assert_eq!(delay.calls, vec![("us", 1), ("us", 37), ("ms", 5)]);
    }

    #[test]
    fn std_delay_waits_at_least_the_requested_time() {
        let mut delay = StdDelay;
        let start = Instant::now();
        delay.delay_us(200);
        assert!(start.elapsed() >= Duration::from_micros(200));
    }
}
