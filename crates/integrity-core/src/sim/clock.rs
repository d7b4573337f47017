/// Microsecond virtual clock shared by the simulated controller and runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct SimClock {
    now_us: u64,
}

impl SimClock {
    /// Clock reading in microseconds.
    #[must_use]
    pub const fn now_us(&self) -> u64 {
        self.now_us
    }

    /// Clock reading truncated to whole milliseconds.
    #[must_use]
    pub const fn now_ms(&self) -> u64 {
        self.now_us / 1_000
    }

    /// Moves the clock forward by `delta_us`.
    pub const fn advance_us(&mut self, delta_us: u64) {
        self.now_us = self.now_us.saturating_add(delta_us);
    }

    /// Moves the clock to `at_us`; the clock never runs backwards.
    pub const fn set_us(&mut self, at_us: u64) {
        if at_us > self.now_us {
            self.now_us = at_us;
        }
    }
}
