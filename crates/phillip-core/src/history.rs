//! Nomination history of a single work.
//!
//! Walks a work's complete event history and keeps only the nomination
//! lifecycle: who bubbled, qualified, disqualified or popped it, oldest first.
//! Used to credit the nominators when the work gets ranked, since the ranked
//! event itself has no actor.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::classify::nomination_tag;
use crate::model::{EventTag, RawKind, RawRecord};

/// One step of a work's nomination history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NominationHistoryEntry {
    pub label: EventTag,
    pub actor_id: u64,
}

/// Reduce a chronological (oldest-first) history to its nomination entries.
///
/// A `nominate` entry is Qualified when the next raw entry is a `qualify`
/// marker and Bubbled otherwise; the lookahead crosses page boundaries because
/// the whole history is available. The last entry has no successor and always
/// takes the Bubbled default, which is a known gap rather than a
/// mis-classification. Kinds outside the nomination lifecycle are dropped, and
/// an empty history reduces to an empty list.
pub fn reduce_history<I>(history: I) -> Vec<NominationHistoryEntry>
where
    I: IntoIterator<Item = RawRecord>,
{
    let mut records = history.into_iter().peekable();
    let mut entries = Vec::new();

    while let Some(record) = records.next() {
        let label = match record.raw_kind() {
            Some(RawKind::Nominate) => nomination_tag(records.peek()),
            Some(RawKind::Disqualify) => EventTag::Disqualified,
            Some(RawKind::NominationReset) => EventTag::Popped,
            _ => continue,
        };
        let Some(actor) = &record.actor else {
            debug!(kind = %record.kind, work_id = %record.work_id, "history entry without actor");
            continue;
        };
        entries.push(NominationHistoryEntry {
            label,
            actor_id: actor.id,
        });
    }

    entries
}
