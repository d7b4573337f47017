//! External region storage, block geometry and local staging buffers.

/// Block geometry and cursor arithmetic.
pub mod map;
/// Write and read staging buffers.
pub mod staging;

pub use map::{BlockCursor, RegionLayout};
pub use staging::{StagingBuffers, READ_MAP_CORRUPT, READ_MAP_INTACT};

use std::ops::Range;

use crate::IntegrityError;

/// Allocates a zero-initialised or pattern-filled element buffer, reporting
/// exhaustion instead of aborting.
pub(crate) fn try_alloc_words(
    what: &'static str,
    words: usize,
    fill: u32,
) -> Result<Box<[u32]>, IntegrityError> {
    let mut storage = Vec::new();
    storage
        .try_reserve_exact(words)
        .map_err(|_| IntegrityError::Allocation { what, words })?;
    storage.resize(words, fill);
    Ok(storage.into_boxed_slice())
}

/// The external memory under test, as a flat element array.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SdramRegion {
    words: Box<[u32]>,
}

impl SdramRegion {
    /// Allocates a zeroed region.
    ///
    /// # Errors
    ///
    /// Returns [`IntegrityError::Allocation`] when the backing store cannot be reserved.
    pub fn allocate(words: usize) -> Result<Self, IntegrityError> {
        Ok(Self {
            words: try_alloc_words("sdram region", words, 0)?,
        })
    }

    /// Region size in elements.
    #[must_use]
    pub fn len(&self) -> usize {
        self.words.len()
    }

    /// Returns `true` for an empty region.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    /// Whole region contents.
    #[must_use]
    pub fn as_slice(&self) -> &[u32] {
        &self.words
    }

    /// Mutable view of the whole region, as seen by the controller.
    #[must_use]
    pub fn as_mut_slice(&mut self) -> &mut [u32] {
        &mut self.words
    }

    /// Mutable view of one block stride.
    #[must_use]
    pub fn block_mut(&mut self, span: Range<usize>) -> &mut [u32] {
        &mut self.words[span]
    }
}
