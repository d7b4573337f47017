/// Phase of the write/verify/recover cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum EngineState {
    /// Filling the region with the sentinel pattern.
    #[default]
    Write,
    /// Reading blocks back through the CRC-checking controller.
    Read,
    /// Restoring a block found corrupted.
    Rewrite,
    /// Terminal; no further transfers are issued.
    Exit,
}

/// Phase that issued the last transfer plus the phase the next dispatch runs.
///
/// The completion of one transfer is reported one event before the decision
/// to start the following one, so the intended next phase has to survive
/// across that boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct PhaseTracker {
    /// Phase of the most recent dispatch.
    pub current: EngineState,
    /// Phase the next dispatch will execute.
    pub next: EngineState,
}

impl PhaseTracker {
    /// Records that `phase` just ran and `next` is pending.
    pub const fn enter(&mut self, phase: EngineState, next: EngineState) {
        self.current = phase;
        self.next = next;
    }

    /// Returns `true` once the terminal phase has run.
    #[must_use]
    pub const fn is_finished(self) -> bool {
        matches!(self.current, EngineState::Exit)
    }
}
