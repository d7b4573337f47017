//! The write/verify/recover state machine.
//!
//! The engine owns the region under test, both staging buffers, the cursor,
//! the error log and the counters. The surrounding runtime delivers three
//! kinds of events (tick, transfer complete, inbound message) and passes the
//! hardware adapter into each handler. Every handler runs to completion
//! before the next event is dispatched, so no state is shared or locked.

use tracing::{debug, info, trace, warn, Level};

use crate::diag::progress_percent;
use crate::memory::{SdramRegion, StagingBuffers};
use crate::{
    BlockCursor, EngineConfig, EngineState, ErrorLog, ErrorRecord, FaultInjector,
    IntegrityError, PassAccounting, PhaseTracker, Platform, RegionLayout, Report, Stats,
    StatusReply, TransferDirection, TransferRequest, STATUS_REPLY_ENTRIES, WORD_BYTES,
};

/// Single owned instance of the integrity check.
#[derive(Debug)]
pub struct IntegrityEngine {
    config: EngineConfig,
    layout: RegionLayout,
    region: SdramRegion,
    buffers: StagingBuffers,
    injector: FaultInjector,
    cursor: BlockCursor,
    phases: PhaseTracker,
    log: ErrorLog,
    stats: Stats,
    started: bool,
    next_milestone: u8,
    replies: u32,
}

impl IntegrityEngine {
    /// Validates `config` and allocates the region and staging buffers.
    ///
    /// # Errors
    ///
    /// Returns [`IntegrityError::InvalidConfig`] for a rejected configuration
    /// and [`IntegrityError::Allocation`] when memory cannot be reserved. In
    /// both cases the engine must not enter the event loop.
    pub fn initialize(config: EngineConfig) -> Result<Self, IntegrityError> {
        config.validate()?;
        let layout =
            RegionLayout::new(config.region_words, config.block_words, config.guard_words)?;
        let region = SdramRegion::allocate(config.region_words)?;
        let buffers = StagingBuffers::allocate(config.block_words, config.sentinel)?;
        let injector = if config.fault_injection {
            FaultInjector::new(&config.fault_schedule)
        } else {
            FaultInjector::disabled()
        };

        let untested = layout.region_words() % layout.stride();
        if untested != 0 {
            warn!(
                untested,
                stride = layout.stride(),
                "region is not a whole number of strides, trailing elements are skipped"
            );
        }
        info!(
            region_words = layout.region_words(),
            block_words = layout.block_words(),
            stride = layout.stride(),
            blocks = layout.blocks_per_pass(),
            passes = config.pass_target,
            fault_injection = config.fault_injection,
            "integrity engine initialised"
        );

        Ok(Self {
            layout,
            region,
            buffers,
            injector,
            cursor: BlockCursor::default(),
            phases: PhaseTracker::default(),
            log: ErrorLog::with_capacity(config.error_log_capacity),
            stats: Stats::default(),
            started: false,
            next_milestone: config.progress_step_percent,
            replies: 0,
            config,
        })
    }

    /// Issues the first write. Later calls are no-ops.
    ///
    /// # Errors
    ///
    /// Returns [`IntegrityError::TransferRefused`] when the controller stays busy.
    pub fn start<P: Platform>(&mut self, platform: &mut P) -> Result<(), IntegrityError> {
        if self.started {
            return Ok(());
        }
        info!("write phase started");
        self.dispatch(platform)?;
        self.started = true;
        Ok(())
    }

    /// Handles a transfer-complete event by starting the pending phase.
    ///
    /// # Errors
    ///
    /// Returns [`IntegrityError::TransferRefused`] when the controller stays busy.
    pub fn on_transfer_complete_event<P: Platform>(
        &mut self,
        platform: &mut P,
    ) -> Result<(), IntegrityError> {
        if self.phases.is_finished() {
            return Ok(());
        }
        self.dispatch(platform)
    }

    /// Handles a timer tick by checking the latched CRC status.
    ///
    /// A faulty read halts the controller without a completion event, so the
    /// tick is where it is noticed. The fault is logged against the last read
    /// block, the flag is cleared and the rewrite is dispatched before the
    /// handler returns.
    ///
    /// # Errors
    ///
    /// Returns [`IntegrityError::TransferRefused`] when the rewrite cannot be queued.
    pub fn on_tick_event<P: Platform>(&mut self, platform: &mut P) -> Result<(), IntegrityError> {
        if self.phases.is_finished() || !platform.transfer_status().is_crc_error() {
            return Ok(());
        }
        if self.phases.current != EngineState::Read {
            warn!(phase = ?self.phases.current, "crc error outside the read phase, clearing");
            platform.clear_transfer_error();
            return Ok(());
        }

        let record = ErrorRecord {
            detected_at_ms: platform.now_ms(),
            block_id: self.cursor.previous_offset,
        };
        self.stats.faults_detected += 1;
        if !self.log.record(record) {
            self.stats.faults_dropped += 1;
        }
        warn!(
            block_id = record.block_id,
            detected_at_ms = record.detected_at_ms,
            pass = self.cursor.repetition_count,
            "crc mismatch on read"
        );
        if tracing::enabled!(Level::TRACE) {
            let map = self.buffers.render_read_map(self.config.sentinel);
            trace!(block_id = record.block_id, %map, "read buffer");
        }

        platform.clear_transfer_error();
        self.phases.next = EngineState::Rewrite;
        self.dispatch(platform)
    }

    /// Answers a host status query.
    pub fn on_message_event(&mut self) -> StatusReply {
        self.replies = self.replies.wrapping_add(1);
        StatusReply {
            sequence: self.replies,
            errors: self.stats.faults_detected,
            entries: self
                .log
                .records()
                .iter()
                .take(STATUS_REPLY_ENTRIES)
                .copied()
                .collect(),
        }
    }

    /// Returns `true` once the exit phase has run.
    #[must_use]
    pub const fn is_finished(&self) -> bool {
        self.phases.is_finished()
    }

    /// Payload bytes read back, capped at the configured passes.
    ///
    /// Every rewrite is followed by exactly one re-read of the same block, so
    /// those re-reads are excluded. Under [`PassAccounting::CountEveryWrap`] a
    /// last-block rewrite ends the run early and fewer bytes are counted.
    #[must_use]
    pub fn bytes_moved(&self) -> u64 {
        let covered = self
            .stats
            .read_transfers
            .saturating_sub(self.stats.rewrite_transfers)
            .min(self.read_transfer_target());
        covered * (self.layout.block_words() * WORD_BYTES) as u64
    }

    /// Current summary; throughput stays undefined until the passes complete.
    #[must_use]
    pub fn report(&self) -> Report {
        let bytes_moved = self.bytes_moved();
        Report {
            elapsed_ms: self.stats.elapsed_ms(),
            bytes_moved,
            throughput: self.stats.throughput(bytes_moved),
            error_records: self.log.records().to_vec(),
            stats: self.stats,
        }
    }

    /// Copy of the aggregate counters.
    #[must_use]
    pub const fn snapshot(&self) -> Stats {
        self.stats
    }

    /// Releases the region and buffers, returning the final report.
    #[must_use]
    pub fn teardown(self) -> Report {
        let report = self.report();
        debug!(
            region_words = self.region.len(),
            "integrity engine torn down"
        );
        report
    }

    /// Read progress over the configured passes, in percent.
    #[must_use]
    pub fn progress_percent(&self) -> u8 {
        if self.phases.is_finished() {
            return 100;
        }
        if self.stats.read_started_ms.is_none() {
            return 0;
        }
        progress_percent(self.cursor.transfers_in_phase, self.read_transfer_target())
    }

    /// Engine configuration.
    #[must_use]
    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Region geometry.
    #[must_use]
    pub const fn layout(&self) -> &RegionLayout {
        &self.layout
    }

    /// Cursor position and pass counters.
    #[must_use]
    pub const fn cursor(&self) -> &BlockCursor {
        &self.cursor
    }

    /// Current and pending phase.
    #[must_use]
    pub const fn phases(&self) -> PhaseTracker {
        self.phases
    }

    /// Phase of the most recent dispatch.
    #[must_use]
    pub const fn state(&self) -> EngineState {
        self.phases.current
    }

    /// Retained error records.
    #[must_use]
    pub const fn error_log(&self) -> &ErrorLog {
        &self.log
    }

    /// Region contents.
    #[must_use]
    pub const fn region(&self) -> &SdramRegion {
        &self.region
    }

    /// Staging buffers.
    #[must_use]
    pub const fn buffers(&self) -> &StagingBuffers {
        &self.buffers
    }

    fn read_transfer_target(&self) -> u64 {
        u64::from(self.config.pass_target) * self.layout.blocks_per_pass() as u64
    }

    fn dispatch<P: Platform>(&mut self, platform: &mut P) -> Result<(), IntegrityError> {
        match self.phases.next {
            EngineState::Write => self.write_block(platform),
            EngineState::Read => self.read_block(platform),
            EngineState::Rewrite => self.rewrite_block(platform),
            EngineState::Exit => {
                self.finish(platform);
                Ok(())
            }
        }
    }

    fn write_block<P: Platform>(&mut self, platform: &mut P) -> Result<(), IntegrityError> {
        let offset = self.cursor.current_offset;
        self.issue(platform, EngineState::Write, offset)?;
        trace!(offset, "block written");

        self.layout.advance(&mut self.cursor);
        self.cursor.transfers_in_phase += 1;

        if self.cursor.transfers_in_phase == self.layout.blocks_per_pass() as u64 {
            self.cursor = BlockCursor::default();
            self.phases.enter(EngineState::Write, EngineState::Read);
            info!(
                blocks = self.layout.blocks_per_pass(),
                "write phase complete, starting read passes"
            );
        } else {
            self.phases.enter(EngineState::Write, EngineState::Write);
        }
        Ok(())
    }

    fn read_block<P: Platform>(&mut self, platform: &mut P) -> Result<(), IntegrityError> {
        if self.stats.read_started_ms.is_none() {
            self.stats.read_started_ms = Some(platform.now_ms());
        }

        let fired = self.injector.maybe_corrupt(
            self.region.as_mut_slice(),
            &self.cursor,
            self.cursor.transfers_in_phase,
        );
        if fired > 0 {
            info!(
                fired,
                pass = self.cursor.repetition_count,
                "injected faults into region"
            );
            self.stats.faults_injected = self.injector.injected();
        }

        let offset = self.cursor.current_offset;
        self.issue(platform, EngineState::Read, offset)?;
        trace!(offset, pass = self.cursor.repetition_count, "block read");

        self.cursor.previous_offset = offset;
        if self.layout.advance(&mut self.cursor) {
            debug!(completed = self.cursor.repetition_count, "read pass complete");
        }
        self.cursor.transfers_in_phase += 1;
        self.phases.enter(EngineState::Read, EngineState::Read);
        self.log_progress(platform);

        if self.cursor.repetition_count >= self.config.pass_target {
            self.stats.read_finished_ms = Some(platform.now_ms());
            self.phases.next = EngineState::Exit;
        }
        Ok(())
    }

    fn rewrite_block<P: Platform>(&mut self, platform: &mut P) -> Result<(), IntegrityError> {
        self.buffers.reinitialize(self.config.sentinel);

        let mut cursor = self.cursor;
        let crossed_wrap = self.layout.retreat_one(&mut cursor);
        debug_assert_eq!(cursor.current_offset, cursor.previous_offset);
        if crossed_wrap && self.config.pass_accounting == PassAccounting::AdjustOnWrap {
            cursor.repetition_count = cursor.repetition_count.saturating_sub(1);
        }

        self.issue(platform, EngineState::Rewrite, cursor.current_offset)?;
        self.cursor = cursor;
        self.injector
            .notify_rewrite(&self.layout.block_span(cursor.current_offset));
        debug!(
            block_id = cursor.current_offset,
            pass = cursor.repetition_count,
            crossed_wrap,
            "rewrote corrupted block"
        );

        self.phases.enter(EngineState::Rewrite, EngineState::Read);
        Ok(())
    }

    fn finish<P: Platform>(&mut self, platform: &P) {
        self.phases.enter(EngineState::Exit, EngineState::Exit);
        info!(
            percent = 100,
            now_ms = platform.now_ms(),
            elapsed_ms = self.stats.elapsed_ms(),
            faults = self.stats.faults_detected,
            transfers = self.stats.transfers_issued,
            "integrity check finished"
        );
    }

    fn log_progress<P: Platform>(&mut self, platform: &P) {
        let step = self.config.progress_step_percent;
        if step == 0 || self.next_milestone >= 100 {
            return;
        }
        let percent = progress_percent(self.cursor.transfers_in_phase, self.read_transfer_target());
        if percent < self.next_milestone {
            return;
        }
        info!(percent, now_ms = platform.now_ms(), "read progress");
        while self.next_milestone <= percent {
            self.next_milestone = self.next_milestone.saturating_add(step);
        }
    }

    /// Starts one transfer, spinning while the controller reports a full queue.
    fn issue<P: Platform>(
        &mut self,
        platform: &mut P,
        phase: EngineState,
        offset: usize,
    ) -> Result<(), IntegrityError> {
        let direction = match phase {
            EngineState::Read => TransferDirection::Read,
            EngineState::Write | EngineState::Rewrite | EngineState::Exit => {
                TransferDirection::Write
            }
        };
        let limit = self.config.retry_limit;
        let external = self.region.block_mut(self.layout.block_span(offset));
        let local = match direction {
            TransferDirection::Read => self.buffers.read_mut(),
            TransferDirection::Write => self.buffers.write_mut(),
        };

        for attempt in 1..=limit {
            let request = TransferRequest {
                direction,
                offset,
                external: &mut *external,
                local: &mut *local,
            };
            if platform.start_block_transfer(request) {
                if attempt > 1 {
                    debug!(%direction, offset, refusals = attempt - 1, "controller accepted after busy retries");
                }
                self.stats.record_issued(phase);
                return Ok(());
            }
            self.stats.busy_refusals += 1;
        }

        warn!(%direction, offset, attempts = limit, "controller refused transfer");
        Err(IntegrityError::TransferRefused {
            direction,
            offset,
            attempts: limit,
        })
    }
}
