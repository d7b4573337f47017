//! Local endpoints of block transfers.

use crate::memory::try_alloc_words;
use crate::IntegrityError;

/// Read-map glyph for an element still holding the sentinel.
pub const READ_MAP_INTACT: char = '-';

/// Read-map glyph for an element that differs from the sentinel.
pub const READ_MAP_CORRUPT: char = '*';

/// Write and read staging buffers, one block of payload each.
///
/// Correctness is decided by the controller CRC, never by comparing the read
/// buffer; its contents only feed the diagnostic read map.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagingBuffers {
    write: Box<[u32]>,
    read: Box<[u32]>,
}

impl StagingBuffers {
    /// Allocates both buffers with the write side holding `sentinel`.
    ///
    /// # Errors
    ///
    /// Returns [`IntegrityError::Allocation`] when either buffer cannot be reserved.
    pub fn allocate(block_words: usize, sentinel: u32) -> Result<Self, IntegrityError> {
        Ok(Self {
            write: try_alloc_words("write staging buffer", block_words, sentinel)?,
            read: try_alloc_words("read staging buffer", block_words, 0)?,
        })
    }

    /// Restores the sentinel in the write buffer and clears the read buffer.
    pub fn reinitialize(&mut self, sentinel: u32) {
        self.write.fill(sentinel);
        self.read.fill(0);
    }

    /// Write-side buffer.
    #[must_use]
    pub fn write(&self) -> &[u32] {
        &self.write
    }

    /// Read-side buffer.
    #[must_use]
    pub fn read(&self) -> &[u32] {
        &self.read
    }

    pub(crate) fn write_mut(&mut self) -> &mut [u32] {
        &mut self.write
    }

    pub(crate) fn read_mut(&mut self) -> &mut [u32] {
        &mut self.read
    }

    /// Renders the read buffer as intact/corrupt glyphs and clears it.
    pub fn render_read_map(&mut self, sentinel: u32) -> String {
        let map = self
            .read
            .iter()
            .map(|word| {
                if *word == sentinel {
                    READ_MAP_INTACT
                } else {
                    READ_MAP_CORRUPT
                }
            })
            .collect();
        self.read.fill(0);
        map
    }
}
