use thiserror::Error;

use crate::api::TransferDirection;

/// Checksum outcome of the most recent block transfer, as latched by the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum TransferStatus {
    /// No checksum mismatch is latched.
    #[default]
    Ok,
    /// The controller latched a CRC mismatch and halted until cleared.
    CrcError,
}

impl TransferStatus {
    /// Returns `true` when a CRC mismatch is latched.
    #[must_use]
    pub const fn is_crc_error(self) -> bool {
        matches!(self, Self::CrcError)
    }
}

/// Configuration rejected before any memory is allocated.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Error)]
pub enum ConfigError {
    /// Blocks must carry at least one element.
    #[error("block size must be non-zero")]
    ZeroBlockSize,
    /// The region cannot hold even a single block stride.
    #[error("region of {region_words} words cannot hold one block stride of {stride} words")]
    RegionTooSmall {
        /// Configured region size in elements.
        region_words: usize,
        /// Block size plus guard elements.
        stride: usize,
    },
    /// At least one read pass is required to finish.
    #[error("pass target must be non-zero")]
    ZeroPassTarget,
    /// The error log must be able to keep at least one record.
    #[error("error log capacity must be non-zero")]
    ZeroLogCapacity,
    /// The busy-retry loop needs at least one attempt.
    #[error("busy-retry limit must be non-zero")]
    ZeroRetryLimit,
    /// An injected value equal to the sentinel would never be detected.
    #[error("fault value {value:#010x} at offset {offset} equals the sentinel pattern")]
    FaultValueIsSentinel {
        /// Target element offset.
        offset: usize,
        /// Offending corruption value.
        value: u32,
    },
    /// A scheduled fault targets an element outside the region.
    #[error("fault offset {offset} lies outside the {region_words}-word region")]
    FaultOutOfRange {
        /// Target element offset.
        offset: usize,
        /// Configured region size in elements.
        region_words: usize,
    },
    /// A scheduled fault targets an element no checksum covers: the
    /// trailing partial block, or a guard element past the CRC slot.
    #[error("fault offset {offset} is never covered by a block checksum")]
    FaultUnchecked {
        /// Target element offset.
        offset: usize,
    },
    /// A pass-triggered fault names a pass the run never reaches.
    #[error("fault at offset {offset} fires on pass {pass}, but only {pass_target} passes run")]
    FaultPassUnreachable {
        /// Target element offset.
        offset: usize,
        /// Zero-based pass named by the trigger.
        pass: u32,
        /// Configured pass target.
        pass_target: u32,
    },
}

/// Failures surfaced to the code embedding the engine.
///
/// CRC mismatches are not listed here: they are recovered inside the state
/// machine and only show up in the error log.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Error)]
pub enum IntegrityError {
    /// Region or staging buffer could not be allocated.
    #[error("cannot allocate {what} ({words} words)")]
    Allocation {
        /// Which buffer failed.
        what: &'static str,
        /// Requested size in elements.
        words: usize,
    },
    /// Configuration failed validation.
    #[error(transparent)]
    InvalidConfig(#[from] ConfigError),
    /// The controller kept refusing a transfer past the busy-retry cap.
    #[error("{direction} transfer at offset {offset} refused {attempts} times")]
    TransferRefused {
        /// Direction of the refused transfer.
        direction: TransferDirection,
        /// Element offset of the target block.
        offset: usize,
        /// Number of attempts made.
        attempts: u32,
    },
    /// The simulation driver ran out of its event budget.
    #[error("engine did not finish within {events} events")]
    Stalled {
        /// Events delivered before giving up.
        events: u64,
    },
}

impl IntegrityError {
    /// Errors that prevent the engine from ever entering the event loop.
    #[must_use]
    pub const fn is_startup_failure(&self) -> bool {
        matches!(self, Self::Allocation { .. } | Self::InvalidConfig(_))
    }
}
