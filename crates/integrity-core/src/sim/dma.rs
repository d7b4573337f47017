//! Software model of the CRC-checking block DMA controller.
//!
//! Writes latch a CRC-32C of the payload, in the first guard element when the
//! stride has one and in a side table otherwise. Reads recompute it; on a
//! mismatch the controller latches the error bit and halts without raising a
//! completion, which leaves detection to the next tick.

use std::collections::{BTreeMap, VecDeque};

use crate::sim::SimClock;
use crate::{Platform, TransferDirection, TransferRequest, TransferStatus};

/// Raw status bit set while a transfer is queued.
pub const STATUS_BUSY: u32 = 1 << 0;

/// Raw status bit latched on a read CRC mismatch.
pub const STATUS_CRC_ERROR: u32 = 1 << 13;

/// Decodes the controller status register.
#[must_use]
pub const fn decode_status(raw: u32) -> TransferStatus {
    if raw & STATUS_CRC_ERROR != 0 {
        TransferStatus::CrcError
    } else {
        TransferStatus::Ok
    }
}

/// Timing of the simulated runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct SimConfig {
    /// Period of the tick event.
    pub tick_period_us: u64,
    /// Time from transfer start to its completion event.
    pub transfer_latency_us: u64,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            tick_period_us: 10_000,
            transfer_latency_us: 25,
        }
    }
}

/// Event delivered by [`SimulatedDma::next_event`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SimEvent {
    /// A queued transfer finished without a checksum error.
    TransferComplete,
    /// The periodic timer fired.
    Tick,
}

/// Transfer accepted by the simulated controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct JournalEntry {
    /// Transfer direction.
    pub direction: TransferDirection,
    /// Block start offset.
    pub offset: usize,
}

fn block_crc(words: &[u32]) -> u32 {
    words
        .iter()
        .fold(0, |crc, word| crc32c::crc32c_append(crc, &word.to_le_bytes()))
}

/// Simulated controller plus virtual clock, implementing [`Platform`].
#[derive(Debug, Clone)]
pub struct SimulatedDma {
    config: SimConfig,
    clock: SimClock,
    status: u32,
    pending: VecDeque<u64>,
    refusals_remaining: u32,
    latched_crcs: BTreeMap<usize, u32>,
    journal: Option<Vec<JournalEntry>>,
    next_tick_us: u64,
    ticks: u64,
}

impl SimulatedDma {
    /// Controller with the given timing; the first tick fires one period in.
    #[must_use]
    pub fn new(config: SimConfig) -> Self {
        Self {
            config,
            clock: SimClock::default(),
            status: 0,
            pending: VecDeque::new(),
            refusals_remaining: 0,
            latched_crcs: BTreeMap::new(),
            journal: None,
            next_tick_us: config.tick_period_us,
            ticks: 0,
        }
    }

    /// Records every accepted transfer for later inspection.
    #[must_use]
    pub fn with_journal(mut self) -> Self {
        self.journal = Some(Vec::new());
        self
    }

    /// Makes the next `count` start requests report a full queue.
    pub const fn refuse_next(&mut self, count: u32) {
        self.refusals_remaining = count;
    }

    /// Accepted transfers, empty unless the journal was enabled.
    #[must_use]
    pub fn journal(&self) -> &[JournalEntry] {
        self.journal.as_deref().unwrap_or_default()
    }

    /// Raw status register.
    #[must_use]
    pub const fn raw_status(&self) -> u32 {
        self.status
    }

    /// Virtual clock.
    #[must_use]
    pub const fn clock(&self) -> &SimClock {
        &self.clock
    }

    /// Ticks delivered so far.
    #[must_use]
    pub const fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Advances the clock to the next event and returns it.
    ///
    /// Completions due before the next tick win; a halted controller has no
    /// pending completion, so only ticks are produced until the error is cleared.
    pub fn next_event(&mut self) -> SimEvent {
        match self.pending.front().copied() {
            Some(due_us) if due_us < self.next_tick_us => {
                self.pending.pop_front();
                self.clock.set_us(due_us);
                if self.pending.is_empty() {
                    self.status &= !STATUS_BUSY;
                }
                SimEvent::TransferComplete
            }
            _ => {
                self.clock.set_us(self.next_tick_us);
                self.next_tick_us += self.config.tick_period_us.max(1);
                self.ticks += 1;
                SimEvent::Tick
            }
        }
    }

    fn queue_completion(&mut self) {
        let due_us = self.clock.now_us() + self.config.transfer_latency_us;
        self.pending.push_back(due_us);
        self.status |= STATUS_BUSY;
    }

    fn write_block(&mut self, offset: usize, external: &mut [u32], local: &[u32]) {
        let payload = local.len();
        external[..payload].copy_from_slice(local);
        let crc = block_crc(local);
        match external.get_mut(payload) {
            Some(guard) => *guard = crc,
            None => {
                self.latched_crcs.insert(offset, crc);
            }
        }
    }

    /// Returns `false` on a checksum mismatch.
    fn read_block(&self, offset: usize, external: &[u32], local: &mut [u32]) -> bool {
        let payload = local.len();
        local.copy_from_slice(&external[..payload]);
        let expected = external
            .get(payload)
            .copied()
            .or_else(|| self.latched_crcs.get(&offset).copied());
        expected.is_none_or(|crc| crc == block_crc(local))
    }
}

impl Platform for SimulatedDma {
    fn start_block_transfer(&mut self, request: TransferRequest<'_>) -> bool {
        if self.refusals_remaining > 0 {
            self.refusals_remaining -= 1;
            return false;
        }
        if self.status & STATUS_CRC_ERROR != 0 {
            return false;
        }

        let TransferRequest {
            direction,
            offset,
            external,
            local,
        } = request;
        if let Some(journal) = self.journal.as_mut() {
            journal.push(JournalEntry { direction, offset });
        }

        match direction {
            TransferDirection::Write => {
                self.write_block(offset, external, local);
                self.queue_completion();
            }
            TransferDirection::Read => {
                if self.read_block(offset, external, local) {
                    self.queue_completion();
                } else {
                    self.status |= STATUS_CRC_ERROR;
                }
            }
        }
        true
    }

    fn transfer_status(&self) -> TransferStatus {
        decode_status(self.status)
    }

    fn clear_transfer_error(&mut self) {
        self.status &= !STATUS_CRC_ERROR;
    }

    fn now_ms(&self) -> u64 {
        self.clock.now_ms()
    }
}

#[cfg(test)]
mod tests {
    use super::{decode_status, SimConfig, SimEvent, SimulatedDma, STATUS_BUSY, STATUS_CRC_ERROR};
    use crate::{Platform, TransferDirection, TransferRequest, TransferStatus};

    fn transfer(
        dma: &mut SimulatedDma,
        direction: TransferDirection,
        external: &mut [u32],
        local: &mut [u32],
    ) -> bool {
        dma.start_block_transfer(TransferRequest {
            direction,
            offset: 0,
            external,
            local,
        })
    }

    #[test]
    fn status_decoding_only_looks_at_the_crc_bit() {
        assert_eq!(decode_status(0), TransferStatus::Ok);
        assert_eq!(decode_status(STATUS_BUSY), TransferStatus::Ok);
        assert_eq!(
            decode_status(STATUS_CRC_ERROR | STATUS_BUSY),
            TransferStatus::CrcError
        );
    }

    #[test]
    fn guard_word_holds_the_write_crc() {
        let mut dma = SimulatedDma::new(SimConfig::default());
        let mut external = [0_u32; 5];
        let mut local = [0x5f5f_5f5f_u32; 4];
        assert!(transfer(&mut dma, TransferDirection::Write, &mut external, &mut local));

        assert_eq!(&external[..4], &[0x5f5f_5f5f; 4]);
        assert_ne!(external[4], 0);
        assert_eq!(dma.raw_status() & STATUS_BUSY, STATUS_BUSY);
    }

    #[test]
    fn corrupted_read_halts_without_completion() {
        let mut dma = SimulatedDma::new(SimConfig::default());
        let mut external = [0_u32; 4];
        let mut write = [7_u32; 4];
        let mut read = [0_u32; 4];
        transfer(&mut dma, TransferDirection::Write, &mut external, &mut write);
        assert_eq!(dma.next_event(), SimEvent::TransferComplete);

        external[2] = 0x0f0f_0f0f;
        assert!(transfer(&mut dma, TransferDirection::Read, &mut external, &mut read));
        assert_eq!(read, [7, 7, 0x0f0f_0f0f, 7]);
        assert!(dma.transfer_status().is_crc_error());
        assert!(!transfer(&mut dma, TransferDirection::Read, &mut external, &mut read));

        assert_eq!(dma.next_event(), SimEvent::Tick);
        assert_eq!(dma.now_ms(), 10);
        dma.clear_transfer_error();
        assert_eq!(dma.transfer_status(), TransferStatus::Ok);
    }

    #[test]
    fn refusals_are_consumed_before_accepting() {
        let mut dma = SimulatedDma::new(SimConfig::default()).with_journal();
        let mut external = [0_u32; 2];
        let mut local = [1_u32; 2];
        dma.refuse_next(2);
        assert!(!transfer(&mut dma, TransferDirection::Write, &mut external, &mut local));
        assert!(!transfer(&mut dma, TransferDirection::Write, &mut external, &mut local));
        assert!(transfer(&mut dma, TransferDirection::Write, &mut external, &mut local));
        assert_eq!(dma.journal().len(), 1);
    }

    #[test]
    fn completions_due_before_the_tick_come_first() {
        let mut dma = SimulatedDma::new(SimConfig {
            tick_period_us: 100,
            transfer_latency_us: 60,
        });
        let mut external = [0_u32; 2];
        let mut local = [1_u32; 2];
        transfer(&mut dma, TransferDirection::Write, &mut external, &mut local);
        assert_eq!(dma.next_event(), SimEvent::TransferComplete);
        assert_eq!(dma.clock().now_us(), 60);

        transfer(&mut dma, TransferDirection::Write, &mut external, &mut local);
        assert_eq!(dma.next_event(), SimEvent::Tick);
        assert_eq!(dma.next_event(), SimEvent::TransferComplete);
        assert_eq!(dma.clock().now_us(), 120);
        assert_eq!(dma.ticks(), 1);
    }
}
