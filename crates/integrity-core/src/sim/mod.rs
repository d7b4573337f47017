//! Deterministic runtime for driving the engine without hardware.

/// Virtual clock.
pub mod clock;
/// Simulated CRC-checking DMA controller.
pub mod dma;

pub use clock::SimClock;
pub use dma::{
    decode_status, JournalEntry, SimConfig, SimEvent, SimulatedDma, STATUS_BUSY,
    STATUS_CRC_ERROR,
};

use tracing::debug;

use crate::{IntegrityEngine, IntegrityError};

/// Default event budget for [`drive`].
pub const DEFAULT_MAX_EVENTS: u64 = 10_000_000;

/// Starts `engine` and feeds it controller events until it exits.
///
/// Returns the number of events delivered.
///
/// # Errors
///
/// Propagates engine failures and returns [`IntegrityError::Stalled`] when
/// `max_events` are delivered without reaching the exit phase.
pub fn drive(
    engine: &mut IntegrityEngine,
    dma: &mut SimulatedDma,
    max_events: u64,
) -> Result<u64, IntegrityError> {
    engine.start(dma)?;

    let mut delivered = 0_u64;
    while !engine.is_finished() {
        if delivered >= max_events {
            return Err(IntegrityError::Stalled { events: delivered });
        }
        match dma.next_event() {
            SimEvent::TransferComplete => engine.on_transfer_complete_event(dma)?,
            SimEvent::Tick => engine.on_tick_event(dma)?,
        }
        delivered += 1;
    }

    debug!(delivered, ticks = dma.ticks(), "simulation drained");
    Ok(delivered)
}
