//! scheduler.rs — Per-sentence emission cadence
//!
//! Each sentence kind has its own target interval, independent of the tick
//! period. `now` is monotonic elapsed time since the scenario started; the
//! wall clock never enters here.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::Serialize;

use crate::sentences::SentenceKind;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SentenceTimingEntry {
    pub kind: SentenceKind,
    pub interval: Duration,
    /// Slot of the last emission; `None` until the first one
    pub last_emitted: Option<Duration>,
}

#[derive(Debug, Clone, Default)]
pub struct Scheduler {
    entries: Vec<SentenceTimingEntry>,
    emitted: BTreeMap<SentenceKind, u64>,
}

impl Scheduler {
    /// Zero intervals are dropped (kind disabled).
    pub fn new(intervals: impl IntoIterator<Item = (SentenceKind, Duration)>) -> Self {
        let entries = intervals
            .into_iter()
            .filter(|(_, interval)| !interval.is_zero())
            .map(|(kind, interval)| SentenceTimingEntry { kind, interval, last_emitted: None })
            .collect();
        Self { entries, emitted: BTreeMap::new() }
    }

    /// Kinds due at `now`, in table order. A due entry advances by exactly one
    /// interval so the long-run cadence holds regardless of tick jitter; when
    /// it has fallen more than a full interval behind it snaps to `now`.
    pub fn due(&mut self, now: Duration) -> Vec<SentenceKind> {
        let mut due = Vec::new();
        for entry in &mut self.entries {
            let next_slot = match entry.last_emitted {
                None => Some(now),
                Some(last) if now.saturating_sub(last) >= entry.interval => {
                    let slot = last + entry.interval;
                    Some(if now.saturating_sub(slot) >= entry.interval { now } else { slot })
                }
                Some(_) => None,
            };
            if let Some(slot) = next_slot {
                entry.last_emitted = Some(slot);
                *self.emitted.entry(entry.kind).or_insert(0) += 1;
                due.push(entry.kind);
            }
        }
        due
    }

    pub fn entries(&self) -> &[SentenceTimingEntry] {
        &self.entries
    }

    pub fn emitted(&self) -> &BTreeMap<SentenceKind, u64> {
        &self.emitted
    }
}
