//! Property coverage for cursor arithmetic, logging bounds and accounting.

#![allow(
    clippy::pedantic,
    clippy::nursery,
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss,
    clippy::cast_sign_loss
)]

use integrity_core::{
    drive, progress_percent, BlockCursor, EngineConfig, ErrorLog, ErrorRecord, IntegrityEngine,
    RegionLayout, SimConfig, SimulatedDma, Throughput, DEFAULT_SENTINEL,
};
use crc32c as _;
use proptest::prelude::*;
use rstest as _;
#[cfg(feature = "serde")]
use serde as _;
use thiserror as _;
use tracing as _;

proptest! {
    #[test]
    fn property_cursor_wraps_once_per_pass(
        block in 1_usize..64,
        guard in 0_usize..4,
        blocks in 1_usize..20,
        extra in 0_usize..64,
    ) {
        let stride = block + guard;
        let region = blocks * stride + extra % stride;
        let layout = RegionLayout::new(region, block, guard).expect("at least one stride");
        prop_assert_eq!(layout.blocks_per_pass(), blocks);

        let mut cursor = BlockCursor::default();
        for index in 1..=blocks {
            let before = cursor;
            let wrapped = layout.advance(&mut cursor);
            prop_assert_eq!(wrapped, index == blocks);
            prop_assert_eq!(cursor.current_offset, (index % blocks) * stride);
            prop_assert!(cursor.current_offset + stride <= region);

            let mut back = cursor;
            prop_assert_eq!(layout.retreat_one(&mut back), wrapped);
            prop_assert_eq!(back.current_offset, before.current_offset);
        }
        prop_assert_eq!(cursor.repetition_count, 1);
    }

    #[test]
    fn property_clean_run_leaves_sentinel_in_every_visited_block(
        block in 1_usize..48,
        blocks in 1_usize..12,
        extra in 0_usize..48,
        passes in 1_u32..4,
    ) {
        let region = blocks * block + extra % block;
        let config = EngineConfig::with_geometry(region, block, passes);
        let mut engine = IntegrityEngine::initialize(config).expect("valid config");
        let mut dma = SimulatedDma::new(SimConfig::default());
        drive(&mut engine, &mut dma, 1_000_000).expect("run finishes");

        let words = engine.region().as_slice();
        let visited = blocks * block;
        prop_assert!(words[..visited].iter().all(|word| *word == DEFAULT_SENTINEL));
        prop_assert!(words[visited..].iter().all(|word| *word == 0));
        prop_assert_eq!(engine.snapshot().read_transfers, u64::from(passes) * blocks as u64);
        prop_assert_eq!(engine.cursor().repetition_count, passes);
    }

    #[test]
    fn property_error_log_never_exceeds_capacity(capacity in 1_usize..64, faults in 0_usize..200) {
        let mut log = ErrorLog::with_capacity(capacity);
        for block_id in 0..faults {
            log.record(ErrorRecord { detected_at_ms: block_id as u64, block_id });
        }

        let kept = faults.min(capacity);
        prop_assert_eq!(log.len(), kept);
        prop_assert_eq!(log.dropped(), (faults - kept) as u64);
        prop_assert!(log
            .records()
            .iter()
            .enumerate()
            .all(|(index, record)| record.block_id == index));
    }

    #[test]
    fn property_throughput_is_bytes_over_elapsed(bytes in any::<u32>(), elapsed in 1_u64..1_000_000) {
        let expected = f64::from(bytes) / elapsed as f64;
        prop_assert_eq!(
            Throughput::from_measurement(u64::from(bytes), elapsed),
            Throughput::BytesPerMs(expected)
        );
        prop_assert_eq!(Throughput::from_measurement(u64::from(bytes), 0), Throughput::Undefined);
    }

    #[test]
    fn property_progress_is_monotonic_and_capped(total in 1_u64..u64::MAX / 200, done in any::<u64>()) {
        let percent = progress_percent(done, total);
        prop_assert!(percent <= 100);
        prop_assert!(progress_percent(done.saturating_add(1), total) >= percent);
        prop_assert_eq!(progress_percent(total, total), 100);
    }
}
