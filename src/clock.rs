use std::time::{SystemTime, UNIX_EPOCH};

/// A source of sample timestamps.
///
/// The collector calls this once per appended value. Hosts that already own a
/// time base can hand in a closure; anything `Fn() -> u64` is a clock.
pub trait Clock: Send + Sync + 'static {
    /// Returns the current timestamp. The unit is whatever the host expects
    /// (the built-in clocks use nanoseconds since the UNIX epoch).
    fn now(&self) -> u64;
}

impl<F> Clock for F
where
    F: Fn() -> u64 + Send + Sync + 'static,
{
    fn now(&self) -> u64 {
        self()
    }
}

fn wall_clock_ns() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| u64::try_from(elapsed.as_nanos()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}

/// A clock that uses `std::time::SystemTime`.
///
/// Susceptible to NTP adjustments, but needs no calibration.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> u64 {
        wall_clock_ns()
    }
}

/// TSC-backed sample clock.
///
/// Reading the counter is far cheaper than a syscall, which matters when a
/// short interval stamps many fields per cycle. Timestamps count nanoseconds
/// from `base_ns` (the wall clock at construction unless anchored explicitly)
/// and never go backwards.
#[derive(Debug, Clone)]
pub struct QuantaClock {
    counter: quanta::Clock,
    base_ns: u64,
    anchor: quanta::Instant,
}

impl QuantaClock {
    pub fn new() -> Self {
        Self::anchored_at(wall_clock_ns())
    }

    /// Start counting from `base_ns` instead of the current wall time.
    pub fn anchored_at(base_ns: u64) -> Self {
        let counter = quanta::Clock::new();
        let anchor = counter.now();
        Self {
            counter,
            base_ns,
            anchor,
        }
    }
}

impl Default for QuantaClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for QuantaClock {
    fn now(&self) -> u64 {
        let elapsed = self.counter.now().duration_since(self.anchor);
        let elapsed_ns = u64::try_from(elapsed.as_nanos()).unwrap_or(u64::MAX);
        self.base_ns.saturating_add(elapsed_ns)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closures_are_clocks() {
        let clock: Box<dyn Clock> = Box::new(|| 42u64);
        assert_eq!(clock.now(), 42);
    }

    #[test]
    fn quanta_clock_counts_from_its_anchor() {
        let clock = QuantaClock::anchored_at(1_000);
        let a = clock.now();
        let b = clock.now();
        assert!(a >= 1_000);
        assert!(b >= a);
        assert_eq!(QuantaClock::anchored_at(u64::MAX).now(), u64::MAX);
    }
}
