//! SDRAM integrity engine: fills a region with a sentinel, reads it back through
//! a CRC-checking DMA controller and rewrites any block found corrupted.

/// Fault and error taxonomy.
pub mod fault;
pub use fault::{ConfigError, IntegrityError, TransferStatus};

/// Host-facing configuration, adapter trait and report types.
pub mod api;
pub use api::{
    EngineConfig, PassAccounting, Platform, Report, StatusReply, Throughput, TransferDirection,
    TransferRequest, DEFAULT_BLOCK_WORDS, DEFAULT_CORRUPT_VALUE, DEFAULT_ERROR_LOG_CAPACITY,
    DEFAULT_GUARD_WORDS, DEFAULT_PASS_TARGET, DEFAULT_PROGRESS_STEP_PERCENT,
    DEFAULT_REGION_BLOCKS, DEFAULT_RETRY_LIMIT, DEFAULT_SENTINEL, STATUS_REPLY_ENTRIES,
    WORD_BYTES,
};

/// Region storage, block geometry and staging buffers.
pub mod memory;
pub use memory::{
    BlockCursor, RegionLayout, SdramRegion, StagingBuffers, READ_MAP_CORRUPT, READ_MAP_INTACT,
};

/// Schedule-driven fault injection.
pub mod injector;
pub use injector::{FaultEntry, FaultInjector, FaultTrigger, ParseFaultError};

/// Error log, counters and progress arithmetic.
pub mod diag;
pub use diag::{progress_percent, ErrorLog, ErrorRecord, Stats};

/// Engine phase model.
pub mod state;
pub use state::{EngineState, PhaseTracker};

/// Event-driven write/verify/recover state machine.
pub mod engine;
pub use engine::IntegrityEngine;

/// Simulated controller and event driver.
pub mod sim;
pub use sim::{drive, SimConfig, SimEvent, SimulatedDma};

#[cfg(test)]
use proptest as _;
#[cfg(test)]
use rstest as _;
