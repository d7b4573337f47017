//! Deterministic, schedule-driven corruption of region elements.
//!
//! Faults exist purely to exercise the rewrite path. Each schedule entry fires
//! at most once until the block containing its offset is rewritten, so the
//! same location is never corrupted twice without recovery in between.

use std::ops::Range;
use std::str::FromStr;

use thiserror::Error;
use tracing::debug;

use crate::{BlockCursor, DEFAULT_CORRUPT_VALUE};

/// Point in the read sweep at which a fault fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "kebab-case"))]
pub enum FaultTrigger {
    /// Before the first read of every pass.
    EveryPass,
    /// Before the first read of the given zero-based pass.
    Pass(u32),
    /// Before the given zero-based read transfer.
    ReadTransfer(u64),
}

/// One entry of the corruption schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct FaultEntry {
    /// When the fault fires.
    pub trigger: FaultTrigger,
    /// Absolute element offset inside the region.
    pub offset: usize,
    /// Value stored at `offset`.
    pub value: u32,
}

impl FaultEntry {
    /// Entry storing [`DEFAULT_CORRUPT_VALUE`].
    #[must_use]
    pub const fn new(trigger: FaultTrigger, offset: usize) -> Self {
        Self::with_value(trigger, offset, DEFAULT_CORRUPT_VALUE)
    }

    /// Entry storing an explicit value.
    #[must_use]
    pub const fn with_value(trigger: FaultTrigger, offset: usize, value: u32) -> Self {
        Self {
            trigger,
            offset,
            value,
        }
    }
}

/// Rejected textual fault entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Error)]
pub enum ParseFaultError {
    /// Missing the `@offset` part.
    #[error("expected <trigger>@<offset>[=<value>], got `{0}`")]
    Shape(String),
    /// Unknown trigger keyword.
    #[error("unknown trigger `{0}` (expected every, pass:<n> or read:<n>)")]
    Trigger(String),
    /// A numeric field failed to parse.
    #[error("invalid number `{0}`")]
    Number(String),
}

fn parse_number<T: FromStr>(text: &str) -> Result<T, ParseFaultError> {
    text.parse()
        .map_err(|_| ParseFaultError::Number(text.to_string()))
}

fn parse_value(text: &str) -> Result<u32, ParseFaultError> {
    match text
        .strip_prefix("0x")
        .or_else(|| text.strip_prefix("0X"))
    {
        Some(hex) => u32::from_str_radix(hex, 16)
            .map_err(|_| ParseFaultError::Number(text.to_string())),
        None => parse_number(text),
    }
}

impl FromStr for FaultTrigger {
    type Err = ParseFaultError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        match text.split_once(':') {
            None if text == "every" => Ok(Self::EveryPass),
            Some(("pass", pass)) => parse_number(pass).map(Self::Pass),
            Some(("read", index)) => parse_number(index).map(Self::ReadTransfer),
            _ => Err(ParseFaultError::Trigger(text.to_string())),
        }
    }
}

/// Parses `<trigger>@<offset>[=<value>]`, e.g. `pass:0@2400=0x0f0f0f0f`.
impl FromStr for FaultEntry {
    type Err = ParseFaultError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let (trigger, target) = text
            .split_once('@')
            .ok_or_else(|| ParseFaultError::Shape(text.to_string()))?;
        let trigger = trigger.parse()?;
        match target.split_once('=') {
            Some((offset, value)) => Ok(Self::with_value(
                trigger,
                parse_number(offset)?,
                parse_value(value)?,
            )),
            None => Ok(Self::new(trigger, parse_number(target)?)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ScheduledFault {
    entry: FaultEntry,
    armed: bool,
    last_pass: Option<u32>,
}

impl ScheduledFault {
    fn due(&self, cursor: &BlockCursor, transfer_index: u64) -> bool {
        if !self.armed {
            return false;
        }
        let pass = cursor.repetition_count;
        let pass_start = cursor.current_offset == 0 && self.last_pass != Some(pass);
        match self.entry.trigger {
            FaultTrigger::EveryPass => pass_start,
            FaultTrigger::Pass(target) => pass_start && pass == target,
            FaultTrigger::ReadTransfer(index) => transfer_index == index,
        }
    }
}

/// Applies the corruption schedule during the read phase.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FaultInjector {
    faults: Vec<ScheduledFault>,
    injected: u64,
}

impl FaultInjector {
    /// Arms every entry of `schedule`; an empty schedule never fires.
    #[must_use]
    pub fn new(schedule: &[FaultEntry]) -> Self {
        Self {
            faults: schedule
                .iter()
                .map(|entry| ScheduledFault {
                    entry: *entry,
                    armed: true,
                    last_pass: None,
                })
                .collect(),
            injected: 0,
        }
    }

    /// Injector with no schedule.
    #[must_use]
    pub fn disabled() -> Self {
        Self::default()
    }

    /// Total corruptions applied so far.
    #[must_use]
    pub const fn injected(&self) -> u64 {
        self.injected
    }

    /// Number of entries currently waiting to fire.
    #[must_use]
    pub fn armed(&self) -> usize {
        self.faults.iter().filter(|fault| fault.armed).count()
    }

    /// Corrupts every entry due before the read at `cursor`, returning how many fired.
    pub fn maybe_corrupt(
        &mut self,
        region: &mut [u32],
        cursor: &BlockCursor,
        transfer_index: u64,
    ) -> usize {
        let mut fired = 0;
        for fault in &mut self.faults {
            if !fault.due(cursor, transfer_index) {
                continue;
            }
            let Some(slot) = region.get_mut(fault.entry.offset) else {
                continue;
            };
            *slot = fault.entry.value;
            fault.armed = false;
            fault.last_pass = Some(cursor.repetition_count);
            fired += 1;
            debug!(
                offset = fault.entry.offset,
                value = fault.entry.value,
                pass = cursor.repetition_count,
                transfer_index,
                "corrupted region element"
            );
        }
        self.injected += fired as u64;
        fired
    }

    /// Re-arms entries whose offset lies in a block that was just rewritten.
    pub fn notify_rewrite(&mut self, span: &Range<usize>) {
        for fault in &mut self.faults {
            if span.contains(&fault.entry.offset) {
                fault.armed = true;
            }
        }
    }
}
