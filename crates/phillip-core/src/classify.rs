//! Feed classification: raw records to typed domain events.
//!
//! The feed does not say whether a nomination qualified the work. A qualifying
//! nomination is immediately followed (chronologically) by a synthetic
//! `qualify` marker, so every record is classified together with its
//! successor. Markers are only ever looked at, never emitted.
//!
//! # Kind table
//!
//! | raw kind           | event                    | source reference        |
//! |--------------------|--------------------------|-------------------------|
//! | `nominate`         | Bubbled / Qualified      | work page               |
//! | `disqualify`       | Disqualified             | second content anchor   |
//! | `nomination_reset` | Popped                   | first content anchor    |
//! | `rank`             | Ranked (no actor)        | work page               |
//! | `love`             | Loved (no actor)         | work page               |

use std::iter::Peekable;

use crate::error::ClassifyError;
use crate::model::{Actor, DomainEvent, EventKind, EventTag, RawKind, RawRecord};

/// Content anchor holding the discussion link of a `nomination_reset` record.
pub const POPPED_ANCHOR: usize = 0;
/// Content anchor holding the discussion link of a `disqualify` record.
pub const DISQUALIFIED_ANCHOR: usize = 1;

/// Resolve a `nominate` record from its chronological successor.
///
/// Shared by batch classification and history reduction so both apply the
/// same rule.
pub fn nomination_tag(next: Option<&RawRecord>) -> EventTag {
    match next {
        Some(next) if next.is_qualify_marker() => EventTag::Qualified,
        _ => EventTag::Bubbled,
    }
}

/// Classify one record given the record that follows it.
///
/// Returns `None` for `qualify` markers, which exist only as lookahead.
pub fn classify(
    current: &RawRecord,
    next: Option<&RawRecord>,
) -> Option<Result<DomainEvent, ClassifyError>> {
    let Some(kind) = current.raw_kind() else {
        return Some(Err(ClassifyError::UnclassifiedKind {
            kind: current.kind.clone(),
        }));
    };

    let event_kind = match kind {
        RawKind::Qualify => return None,
        RawKind::Nominate => require_actor(current, kind).map(|actor| {
            match nomination_tag(next) {
                EventTag::Qualified => EventKind::Qualified { actor },
                _ => EventKind::Bubbled { actor },
            }
        }),
        RawKind::Disqualify => require_actor(current, kind).map(|actor| EventKind::Disqualified {
            actor,
            post_message: current.post_message.clone(),
        }),
        RawKind::NominationReset => {
            require_actor(current, kind).map(|actor| EventKind::Popped {
                actor,
                post_message: current.post_message.clone(),
            })
        }
        RawKind::Rank => Ok(EventKind::Ranked),
        RawKind::Love => Ok(EventKind::Loved),
    };

    let result = event_kind.and_then(|event_kind| {
        let source_reference = source_reference(current, kind)?;
        Ok(DomainEvent {
            work_id: current.work_id,
            timestamp: current.timestamp,
            source_reference,
            kind: event_kind,
        })
    });
    Some(result)
}

fn require_actor(record: &RawRecord, kind: RawKind) -> Result<Actor, ClassifyError> {
    record.actor.clone().ok_or(ClassifyError::MissingActor {
        kind,
        work_id: record.work_id,
    })
}

fn source_reference(record: &RawRecord, kind: RawKind) -> Result<String, ClassifyError> {
    let index = match kind {
        RawKind::NominationReset => POPPED_ANCHOR,
        RawKind::Disqualify => DISQUALIFIED_ANCHOR,
        _ => return Ok(record.work_id.page_url()),
    };
    record
        .anchors
        .get(index)
        .cloned()
        .ok_or(ClassifyError::MissingAnchor {
            kind,
            work_id: record.work_id,
            index,
        })
}

/// Lazy classification of an oldest-first batch.
///
/// Yields one item per record that is not a `qualify` marker.
pub struct Classified<I: Iterator<Item = RawRecord>> {
    records: Peekable<I>,
}

impl<I: Iterator<Item = RawRecord>> Iterator for Classified<I> {
    type Item = Result<DomainEvent, ClassifyError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let current = self.records.next()?;
            if let Some(item) = classify(&current, self.records.peek()) {
                return Some(item);
            }
        }
    }
}

/// Classify a batch already in chronological (oldest-first) order.
pub fn classify_batch<I>(records: I) -> Classified<I::IntoIter>
where
    I: IntoIterator<Item = RawRecord>,
{
    Classified {
        records: records.into_iter().peekable(),
    }
}

/// Classify a batch as the feed serves it (newest-first).
pub fn classify_feed(
    batch: Vec<RawRecord>,
) -> Classified<std::iter::Rev<std::vec::IntoIter<RawRecord>>> {
    classify_batch(batch.into_iter().rev())
}
