pub mod classify;
pub mod config;
pub mod cursor;
mod error;
pub mod history;
pub mod model;
pub mod roster;

pub use classify::{classify_batch, classify_feed};
pub use config::{FeedFilter, PollConfig};
pub use cursor::{CheckpointCursor, Verdict, Watermark};
pub use error::{ClassifyError, ConfigError};
pub use history::{NominationHistoryEntry, reduce_history};
pub use model::{
    Actor, ActorQuery, Difficulty, DomainEvent, EventKind, EventTag, GameMode, GroupId, RawKind,
    RawRecord, RosterEntry, WorkId, WorkMetadata,
};
pub use roster::{RosterDiff, RosterSnapshot};
