//! Host-facing contracts: engine configuration, the hardware adapter trait and
//! the reporting types handed back to the surrounding runtime.

use std::fmt;

use crate::{
    ConfigError, ErrorRecord, FaultEntry, FaultTrigger, RegionLayout, Stats, TransferStatus,
};

/// Default number of payload elements moved by one block transfer.
pub const DEFAULT_BLOCK_WORDS: usize = 1000;

/// Default number of guard elements trailing each block.
pub const DEFAULT_GUARD_WORDS: usize = 1;

/// Default number of blocks in the tested region.
pub const DEFAULT_REGION_BLOCKS: usize = 28;

/// Default number of full read passes before the engine exits.
pub const DEFAULT_PASS_TARGET: u32 = 4;

/// Pattern written to every block during the write phase.
pub const DEFAULT_SENTINEL: u32 = 0x5f5f_5f5f;

/// Known-bad pattern stored by injected faults.
pub const DEFAULT_CORRUPT_VALUE: u32 = 0x0f0f_0f0f;

/// Number of error records kept before further faults are only counted.
pub const DEFAULT_ERROR_LOG_CAPACITY: usize = 50;

/// Attempts made against a busy controller before giving up.
pub const DEFAULT_RETRY_LIMIT: u32 = 100_000;

/// Granularity of read-progress log milestones.
pub const DEFAULT_PROGRESS_STEP_PERCENT: u8 = 10;

/// Size of one region element in bytes.
pub const WORD_BYTES: usize = 4;

/// Number of `(time, block)` pairs returned in a status reply.
pub const STATUS_REPLY_ENTRIES: usize = 4;

/// Direction of a block transfer relative to the external memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum TransferDirection {
    /// External memory to local staging buffer.
    Read,
    /// Local staging buffer to external memory.
    Write,
}

impl fmt::Display for TransferDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Read => f.write_str("read"),
            Self::Write => f.write_str("write"),
        }
    }
}

/// One block transfer handed to the hardware adapter.
///
/// `external` spans the whole block stride (payload plus guard elements) and
/// `local` is the staging buffer holding exactly one payload. The adapter must
/// be done touching both slices when `start_block_transfer` returns;
/// completion is still reported through the transfer-complete event.
#[derive(Debug)]
pub struct TransferRequest<'a> {
    /// Transfer direction.
    pub direction: TransferDirection,
    /// Element offset of the block inside the region.
    pub offset: usize,
    /// Block stride in external memory.
    pub external: &'a mut [u32],
    /// Staging buffer endpoint.
    pub local: &'a mut [u32],
}

/// Primitives the engine consumes from the DMA controller and runtime.
pub trait Platform {
    /// Queues a block transfer with hardware CRC checking.
    ///
    /// Returns `false` when the controller queue is full; the engine retries.
    fn start_block_transfer(&mut self, request: TransferRequest<'_>) -> bool;

    /// Reads the latched checksum status of the last transfer.
    fn transfer_status(&self) -> TransferStatus;

    /// Clears a latched CRC error and restarts the controller.
    fn clear_transfer_error(&mut self);

    /// Monotonic clock in milliseconds.
    fn now_ms(&self) -> u64;
}

/// How a rewrite of the last block in a pass affects the pass counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "kebab-case"))]
pub enum PassAccounting {
    /// Undo the wrap so the re-read completes the same pass again.
    #[default]
    AdjustOnWrap,
    /// Count every wrap, including the one caused by the re-read.
    CountEveryWrap,
}

/// Immutable configuration of one integrity run.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct EngineConfig {
    /// Total region size in elements.
    pub region_words: usize,
    /// Payload elements per block transfer.
    pub block_words: usize,
    /// Extra elements after each block; the first one holds the block CRC.
    pub guard_words: usize,
    /// Full read passes to complete before exiting.
    pub pass_target: u32,
    /// Pattern held by the write staging buffer.
    pub sentinel: u32,
    /// Maximum number of retained error records.
    pub error_log_capacity: usize,
    /// Busy-retry attempts per transfer before reporting a refusal.
    pub retry_limit: u32,
    /// Pass counter behaviour on last-block rewrites.
    pub pass_accounting: PassAccounting,
    /// Enables the fault schedule. Production checks leave this off.
    pub fault_injection: bool,
    /// Deterministic corruption schedule.
    pub fault_schedule: Vec<FaultEntry>,
    /// Read-progress log granularity in percent (0 disables milestones).
    pub progress_step_percent: u8,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            region_words: (DEFAULT_BLOCK_WORDS + DEFAULT_GUARD_WORDS) * DEFAULT_REGION_BLOCKS,
            block_words: DEFAULT_BLOCK_WORDS,
            guard_words: DEFAULT_GUARD_WORDS,
            pass_target: DEFAULT_PASS_TARGET,
            sentinel: DEFAULT_SENTINEL,
            error_log_capacity: DEFAULT_ERROR_LOG_CAPACITY,
            retry_limit: DEFAULT_RETRY_LIMIT,
            pass_accounting: PassAccounting::AdjustOnWrap,
            fault_injection: false,
            fault_schedule: Vec::new(),
            progress_step_percent: DEFAULT_PROGRESS_STEP_PERCENT,
        }
    }
}

impl EngineConfig {
    /// Builds a configuration for the given geometry with all other fields defaulted.
    #[must_use]
    pub fn with_geometry(region_words: usize, block_words: usize, pass_target: u32) -> Self {
        Self {
            region_words,
            block_words,
            guard_words: 0,
            pass_target,
            ..Self::default()
        }
    }

    /// Enables fault injection with the given schedule.
    #[must_use]
    pub fn with_faults(mut self, schedule: Vec<FaultEntry>) -> Self {
        self.fault_injection = true;
        self.fault_schedule = schedule;
        self
    }

    /// Elements between consecutive block starts.
    #[must_use]
    pub const fn stride(&self) -> usize {
        self.block_words.saturating_add(self.guard_words)
    }

    /// Checks geometry, limits and the fault schedule.
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigError`] found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let layout = RegionLayout::new(self.region_words, self.block_words, self.guard_words)?;

        if self.pass_target == 0 {
            return Err(ConfigError::ZeroPassTarget);
        }
        if self.error_log_capacity == 0 {
            return Err(ConfigError::ZeroLogCapacity);
        }
        if self.retry_limit == 0 {
            return Err(ConfigError::ZeroRetryLimit);
        }

        for entry in &self.fault_schedule {
            if entry.offset >= self.region_words {
                return Err(ConfigError::FaultOutOfRange {
                    offset: entry.offset,
                    region_words: self.region_words,
                });
            }
            // Payload plus the first guard element, which holds the CRC.
            let checked = layout
                .block_containing(entry.offset)
                .is_some_and(|start| entry.offset - start <= self.block_words);
            if !checked {
                return Err(ConfigError::FaultUnchecked {
                    offset: entry.offset,
                });
            }
            if let FaultTrigger::Pass(pass) = entry.trigger {
                if pass >= self.pass_target {
                    return Err(ConfigError::FaultPassUnreachable {
                        offset: entry.offset,
                        pass,
                        pass_target: self.pass_target,
                    });
                }
            }
            if entry.value == self.sentinel {
                return Err(ConfigError::FaultValueIsSentinel {
                    offset: entry.offset,
                    value: entry.value,
                });
            }
        }

        Ok(())
    }
}

/// Read throughput over the measured passes.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum Throughput {
    /// Elapsed time was zero (or nothing was measured).
    Undefined,
    /// Bytes moved per millisecond.
    BytesPerMs(f64),
}

impl Throughput {
    /// Derives throughput from a byte count and an elapsed time.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn from_measurement(bytes_moved: u64, elapsed_ms: u64) -> Self {
        if elapsed_ms == 0 {
            Self::Undefined
        } else {
            Self::BytesPerMs(bytes_moved as f64 / elapsed_ms as f64)
        }
    }

    /// Converts to megabytes (10^6 bytes) per second.
    #[must_use]
    pub fn megabytes_per_second(self) -> Option<f64> {
        match self {
            Self::Undefined => None,
            Self::BytesPerMs(rate) => Some(rate / 1e3),
        }
    }
}

/// Final or in-progress summary of a run.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct Report {
    /// Read-phase time bracketing the configured passes.
    pub elapsed_ms: u64,
    /// Payload bytes read back over the measured passes.
    pub bytes_moved: u64,
    /// Derived read throughput.
    pub throughput: Throughput,
    /// Logged faults in detection order.
    pub error_records: Vec<ErrorRecord>,
    /// Aggregate counters.
    pub stats: Stats,
}

impl fmt::Display for Report {
    #[allow(clippy::cast_precision_loss)]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.throughput.megabytes_per_second() {
            Some(rate) => writeln!(
                f,
                "Throughput: {rate:.2} MB/s ({:.2} MB in {:.1} s)",
                self.bytes_moved as f64 / 1e6,
                self.elapsed_ms as f64 / 1e3
            )?,
            None => writeln!(f, "Not enough data to compute throughput.")?,
        }
        writeln!(f, "Failed {} DMA transfers", self.stats.faults_detected)?;
        for (index, record) in self.error_records.iter().enumerate() {
            writeln!(
                f,
                "Err:{} T:{:.2} s block_id:{}",
                index + 1,
                record.detected_at_ms as f64 / 1e3,
                record.block_id
            )?;
        }
        Ok(())
    }
}

/// Answer to a host status query.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct StatusReply {
    /// Monotonic reply counter, starting at 1.
    pub sequence: u32,
    /// Total faults detected so far.
    pub errors: u64,
    /// First logged faults, at most [`STATUS_REPLY_ENTRIES`].
    pub entries: Vec<ErrorRecord>,
}

impl fmt::Display for StatusReply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.sequence, self.errors)?;
        for record in &self.entries {
            write!(f, ",{},{}", record.detected_at_ms, record.block_id)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{
        EngineConfig, PassAccounting, StatusReply, Throughput, TransferDirection,
        DEFAULT_ERROR_LOG_CAPACITY, DEFAULT_SENTINEL,
    };
    use crate::{ConfigError, ErrorRecord, FaultEntry, FaultTrigger};

    #[test]
    fn default_config_matches_reference_geometry() {
        let config = EngineConfig::default();
        assert_eq!(config.block_words, 1000);
        assert_eq!(config.stride(), 1001);
        assert_eq!(config.region_words % config.stride(), 0);
        assert_eq!(config.sentinel, DEFAULT_SENTINEL);
        assert_eq!(config.error_log_capacity, DEFAULT_ERROR_LOG_CAPACITY);
        assert_eq!(config.pass_accounting, PassAccounting::AdjustOnWrap);
        assert!(!config.fault_injection);
        assert_eq!(config.validate(), Ok(()));
    }

    #[test]
    fn validation_rejects_degenerate_limits() {
        let mut config = EngineConfig::with_geometry(4000, 1000, 0);
        assert_eq!(config.validate(), Err(ConfigError::ZeroPassTarget));

        config.pass_target = 1;
        config.error_log_capacity = 0;
        assert_eq!(config.validate(), Err(ConfigError::ZeroLogCapacity));

        config.error_log_capacity = 1;
        config.retry_limit = 0;
        assert_eq!(config.validate(), Err(ConfigError::ZeroRetryLimit));
    }

    #[test]
    fn validation_rejects_invisible_or_out_of_range_faults() {
        let sentinel_fault = EngineConfig::with_geometry(4000, 1000, 1).with_faults(vec![
            FaultEntry::with_value(FaultTrigger::Pass(0), 10, DEFAULT_SENTINEL),
        ]);
        assert_eq!(
            sentinel_fault.validate(),
            Err(ConfigError::FaultValueIsSentinel {
                offset: 10,
                value: DEFAULT_SENTINEL
            })
        );

        let outside = EngineConfig::with_geometry(4000, 1000, 1)
            .with_faults(vec![FaultEntry::new(FaultTrigger::EveryPass, 4000)]);
        assert_eq!(
            outside.validate(),
            Err(ConfigError::FaultOutOfRange {
                offset: 4000,
                region_words: 4000
            })
        );
    }

    #[test]
    fn validation_rejects_faults_in_the_untested_tail() {
        let config = EngineConfig::with_geometry(4500, 1000, 2)
            .with_faults(vec![FaultEntry::new(FaultTrigger::Pass(0), 4200)]);
        assert_eq!(
            config.validate(),
            Err(ConfigError::FaultUnchecked { offset: 4200 })
        );
    }

    #[test]
    fn validation_keeps_crc_slot_but_rejects_later_guard_elements() {
        let guarded = |offset| EngineConfig {
            guard_words: 2,
            ..EngineConfig::with_geometry(4008, 1000, 2)
        }
        .with_faults(vec![FaultEntry::new(FaultTrigger::Pass(0), offset)]);

        assert_eq!(guarded(1000).validate(), Ok(()));
        assert_eq!(
            guarded(1001).validate(),
            Err(ConfigError::FaultUnchecked { offset: 1001 })
        );
        assert_eq!(guarded(1002).validate(), Ok(()));
    }

    #[test]
    fn validation_rejects_pass_triggers_beyond_the_target() {
        let config = EngineConfig::with_geometry(4000, 1000, 2)
            .with_faults(vec![FaultEntry::new(FaultTrigger::Pass(2), 10)]);
        assert_eq!(
            config.validate(),
            Err(ConfigError::FaultPassUnreachable {
                offset: 10,
                pass: 2,
                pass_target: 2
            })
        );

        let last = EngineConfig::with_geometry(4000, 1000, 2)
            .with_faults(vec![FaultEntry::new(FaultTrigger::Pass(1), 10)]);
        assert_eq!(last.validate(), Ok(()));
    }

    #[test]
    fn throughput_is_undefined_without_elapsed_time() {
        assert_eq!(Throughput::from_measurement(4096, 0), Throughput::Undefined);
        assert_eq!(Throughput::Undefined.megabytes_per_second(), None);
        assert_eq!(
            Throughput::from_measurement(32_000, 10),
            Throughput::BytesPerMs(3200.0)
        );
        assert_eq!(
            Throughput::BytesPerMs(3200.0).megabytes_per_second(),
            Some(3.2)
        );
    }

    #[test]
    fn status_reply_renders_host_line() {
        let reply = StatusReply {
            sequence: 3,
            errors: 2,
            entries: vec![
                ErrorRecord {
                    detected_at_ms: 10,
                    block_id: 2002,
                },
                ErrorRecord {
                    detected_at_ms: 40,
                    block_id: 5005,
                },
            ],
        };
        assert_eq!(reply.to_string(), "3:2,10,2002,40,5005");
    }

    #[test]
    fn direction_display_is_lowercase() {
        assert_eq!(TransferDirection::Read.to_string(), "read");
        assert_eq!(TransferDirection::Write.to_string(), "write");
    }
}
