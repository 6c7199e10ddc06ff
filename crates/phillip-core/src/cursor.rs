//! Checkpoint cursor over a feed with no stable cursor and no event ids.
//!
//! The feed is re-read from the top on every poll, so consecutive polls
//! overlap. The cursor remembers the timestamp and work of the last accepted
//! event and filters each newly classified event against it:
//!
//! | event vs. watermark                     | verdict   |
//! |-----------------------------------------|-----------|
//! | older                                   | Stale     |
//! | same second, same work                  | Duplicate |
//! | same second, different work             | Accept    |
//! | newer                                   | Accept    |
//!
//! # Forward progress
//!
//! When the last event of a poll shares the watermark's second, the watermark
//! moves one second past it. Otherwise a burst where every event falls in one
//! second would keep the cursor on that instant indefinitely. The cost is that
//! an event landing later in that exact second is treated as stale.

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{DomainEvent, WorkId};

/// Resolution of feed timestamps.
pub fn time_unit() -> TimeDelta {
    TimeDelta::seconds(1)
}

/// Last accepted position in the feed.
///
/// Persisted as `{"timestamp": "<ISO-8601>", "work_id": <id>}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Watermark {
    pub timestamp: DateTime<Utc>,
    pub work_id: Option<WorkId>,
}

impl Watermark {
    /// Watermark accepting everything at or after `timestamp`.
    pub fn since(timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            work_id: None,
        }
    }
}

impl Default for Watermark {
    fn default() -> Self {
        Self::since(DateTime::<Utc>::UNIX_EPOCH)
    }
}

/// Outcome of checking an event against the watermark.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Accept,
    /// Older than the watermark; already processed.
    Stale,
    /// The event the watermark points at, re-served by an overlapping poll.
    Duplicate,
}

impl Verdict {
    pub fn is_accept(&self) -> bool {
        matches!(self, Self::Accept)
    }
}

/// High-water mark of the map feed.
///
/// Owned by the single poll loop that drives it. Checking ([`evaluate`]) and
/// advancing ([`commit`]) are separate so the loop can dispatch between them;
/// the watermark only moves once an event has been delivered.
///
/// [`evaluate`]: Self::evaluate
/// [`commit`]: Self::commit
#[derive(Debug, Clone, Default)]
pub struct CheckpointCursor {
    watermark: Watermark,
}

impl CheckpointCursor {
    pub fn new(watermark: Watermark) -> Self {
        Self { watermark }
    }

    pub fn watermark(&self) -> &Watermark {
        &self.watermark
    }

    /// Decide whether `event` is new. Never mutates.
    pub fn evaluate(&self, event: &DomainEvent) -> Verdict {
        let last = &self.watermark;
        if event.timestamp < last.timestamp {
            Verdict::Stale
        } else if event.timestamp == last.timestamp && last.work_id == Some(event.work_id) {
            Verdict::Duplicate
        } else {
            Verdict::Accept
        }
    }

    /// Advance past an accepted event.
    ///
    /// `last_in_batch` marks the final event of the current poll, which
    /// triggers the one-unit bump on a timestamp tie. The timestamp never
    /// moves backwards, even if called with an event that was not accepted.
    pub fn commit(&mut self, event: &DomainEvent, last_in_batch: bool) {
        let previous = self.watermark.timestamp;
        let next = if last_in_batch && event.timestamp == previous {
            event.timestamp + time_unit()
        } else {
            event.timestamp
        };
        self.watermark.timestamp = next.max(previous);
        self.watermark.work_id = Some(event.work_id);
    }

    /// [`evaluate`](Self::evaluate) and, on accept, [`commit`](Self::commit).
    pub fn consider(&mut self, event: &DomainEvent, last_in_batch: bool) -> Verdict {
        let verdict = self.evaluate(event);
        if verdict.is_accept() {
            self.commit(event, last_in_batch);
        }
        verdict
    }

    /// Replace the watermark. The only way to move it backwards.
    pub fn reset(&mut self, watermark: Watermark) {
        self.watermark = watermark;
    }
}
