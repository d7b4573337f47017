//! Error log and aggregate counters.

use tracing::warn;

use crate::{EngineState, Throughput};

/// One detected CRC fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct ErrorRecord {
    /// Clock reading when the tick handler saw the fault.
    pub detected_at_ms: u64,
    /// Start offset of the faulty block.
    pub block_id: usize,
}

/// Bounded, append-only record of detected faults.
///
/// The first `capacity` records are kept in detection order; later ones are
/// counted and dropped, never evicting earlier entries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorLog {
    records: Vec<ErrorRecord>,
    capacity: usize,
    dropped: u64,
}

impl ErrorLog {
    /// Creates an empty log holding at most `capacity` records.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            records: Vec::with_capacity(capacity),
            capacity,
            dropped: 0,
        }
    }

    /// Appends `record` if room remains. Returns `false` when it was dropped.
    pub fn record(&mut self, record: ErrorRecord) -> bool {
        if self.records.len() < self.capacity {
            self.records.push(record);
            true
        } else {
            if self.dropped == 0 {
                warn!(capacity = self.capacity, "error log full, dropping further records");
            }
            self.dropped += 1;
            false
        }
    }

    /// Retained records in detection order.
    #[must_use]
    pub fn records(&self) -> &[ErrorRecord] {
        &self.records
    }

    /// Number of retained records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns `true` when nothing was logged.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Maximum number of retained records.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Records rejected because the log was full.
    #[must_use]
    pub const fn dropped(&self) -> u64 {
        self.dropped
    }
}

/// Aggregate run counters and read-phase timestamps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct Stats {
    /// All transfers accepted by the controller.
    pub transfers_issued: u64,
    /// Write-phase transfers.
    pub write_transfers: u64,
    /// Read transfers, re-reads included.
    pub read_transfers: u64,
    /// Recovery writes.
    pub rewrite_transfers: u64,
    /// Queue-full refusals absorbed by the busy-retry loop.
    pub busy_refusals: u64,
    /// CRC faults detected, logged or not.
    pub faults_detected: u64,
    /// Faults that did not fit in the error log.
    pub faults_dropped: u64,
    /// Corruptions applied by the fault injector.
    pub faults_injected: u64,
    /// Clock reading at the first read transfer.
    pub read_started_ms: Option<u64>,
    /// Clock reading when the pass target was reached.
    pub read_finished_ms: Option<u64>,
}

impl Stats {
    pub(crate) const fn record_issued(&mut self, phase: EngineState) {
        self.transfers_issued += 1;
        match phase {
            EngineState::Write => self.write_transfers += 1,
            EngineState::Read => self.read_transfers += 1,
            EngineState::Rewrite => self.rewrite_transfers += 1,
            EngineState::Exit => {}
        }
    }

    /// Read-phase time bracketing the configured passes, 0 until both ends are known.
    #[must_use]
    pub const fn elapsed_ms(&self) -> u64 {
        match (self.read_started_ms, self.read_finished_ms) {
            (Some(start), Some(end)) => end.saturating_sub(start),
            _ => 0,
        }
    }

    /// Throughput of `bytes_moved` over the measured read time.
    #[must_use]
    pub fn throughput(&self, bytes_moved: u64) -> Throughput {
        Throughput::from_measurement(bytes_moved, self.elapsed_ms())
    }
}

/// Completed share of `total` in whole percent, clamped to 100.
///
/// Computed in 64 bits so long runs cannot overflow the intermediate product.
#[must_use]
pub const fn progress_percent(done: u64, total: u64) -> u8 {
    if total == 0 {
        return 100;
    }
    let percent = done.saturating_mul(100) / total;
    if percent >= 100 {
        100
    } else {
        #[allow(clippy::cast_possible_truncation)]
        {
            percent as u8
        }
    }
}
