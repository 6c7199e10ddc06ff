use thiserror::Error;

use crate::model::{RawKind, WorkId};

/// A raw record that could not be turned into a domain event.
///
/// The record is skipped; the rest of the batch is still classified.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClassifyError {
    /// The feed emitted a kind the table does not know. Usually means
    /// upstream added a new event type.
    #[error("unclassified event kind: {kind}")]
    UnclassifiedKind { kind: String },

    #[error("{kind} record for work {work_id} has no anchor at index {index}")]
    MissingAnchor {
        kind: RawKind,
        work_id: WorkId,
        index: usize,
    },

    #[error("{kind} record for work {work_id} has no actor")]
    MissingActor { kind: RawKind, work_id: WorkId },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("no dispatch target: register a consumer or configure a webhook")]
    NoDispatchTarget,

    #[error("both the map feed and the group feed are disabled")]
    NothingToRun,

    #[error("poll interval for {0} must be greater than zero")]
    InvalidInterval(&'static str),
}
