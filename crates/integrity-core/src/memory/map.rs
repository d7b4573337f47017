//! Block geometry of the tested region and cursor arithmetic.

use std::ops::Range;

use crate::{ConfigError, WORD_BYTES};

/// Position of the engine inside the region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct BlockCursor {
    /// Element offset of the next block to transfer.
    pub current_offset: usize,
    /// Element offset of the last read block, kept for rewrite addressing.
    pub previous_offset: usize,
    /// Transfers issued in the current write or read phase.
    pub transfers_in_phase: u64,
    /// Full read passes completed.
    pub repetition_count: u32,
}

/// Flat region partitioned into strides of `block_words + guard_words` elements.
///
/// Only whole strides are visited: when the region size is not a multiple of
/// the stride, the trailing partial block is never transferred.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RegionLayout {
    region_words: usize,
    block_words: usize,
    stride: usize,
}

impl RegionLayout {
    /// Validates and builds a layout.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ZeroBlockSize`] for empty blocks and
    /// [`ConfigError::RegionTooSmall`] when not even one stride fits.
    pub const fn new(
        region_words: usize,
        block_words: usize,
        guard_words: usize,
    ) -> Result<Self, ConfigError> {
        if block_words == 0 {
            return Err(ConfigError::ZeroBlockSize);
        }
        let stride = block_words.saturating_add(guard_words);
        if region_words < stride {
            return Err(ConfigError::RegionTooSmall {
                region_words,
                stride,
            });
        }
        Ok(Self {
            region_words,
            block_words,
            stride,
        })
    }

    /// Region size in elements.
    #[must_use]
    pub const fn region_words(&self) -> usize {
        self.region_words
    }

    /// Payload elements per block.
    #[must_use]
    pub const fn block_words(&self) -> usize {
        self.block_words
    }

    /// Elements between consecutive block starts.
    #[must_use]
    pub const fn stride(&self) -> usize {
        self.stride
    }

    /// Number of blocks visited in one pass.
    #[must_use]
    pub const fn blocks_per_pass(&self) -> usize {
        self.region_words / self.stride
    }

    /// Start offset of the last visited block.
    #[must_use]
    pub const fn last_block_start(&self) -> usize {
        (self.blocks_per_pass() - 1) * self.stride
    }

    /// Byte address of the cursor's block relative to the region base.
    #[must_use]
    pub const fn block_address(&self, cursor: &BlockCursor) -> usize {
        cursor.current_offset * WORD_BYTES
    }

    /// Element range covered by the stride starting at `offset`.
    #[must_use]
    pub const fn block_span(&self, offset: usize) -> Range<usize> {
        offset..offset + self.stride
    }

    /// Start offset of the visited block holding `element`, if any.
    #[must_use]
    pub const fn block_containing(&self, element: usize) -> Option<usize> {
        let start = element - element % self.stride;
        if start + self.stride <= self.region_words {
            Some(start)
        } else {
            None
        }
    }

    /// Steps to the next block start, wrapping at the end of the region.
    ///
    /// Returns `true` on wrap, after incrementing the pass counter.
    pub const fn advance(&self, cursor: &mut BlockCursor) -> bool {
        let next = cursor.current_offset + self.stride;
        if next > self.region_words - self.stride {
            cursor.current_offset = 0;
            cursor.repetition_count += 1;
            true
        } else {
            cursor.current_offset = next;
            false
        }
    }

    /// Steps back exactly one block.
    ///
    /// Returns `true` when this crosses the wrap boundary backwards (the
    /// cursor was at 0). The pass counter is left alone; callers decide how
    /// that crossing is accounted.
    pub const fn retreat_one(&self, cursor: &mut BlockCursor) -> bool {
        if cursor.current_offset == 0 {
            cursor.current_offset = self.last_block_start();
            true
        } else {
            cursor.current_offset -= self.stride;
            false
        }
    }
}
