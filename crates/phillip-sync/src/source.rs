//! The seam between the poll loops and wherever the feed comes from.

use async_trait::async_trait;
use phillip_core::{
    Actor, ActorQuery, FeedFilter, GroupId, RawRecord, RosterEntry, WorkId, WorkMetadata,
};

use crate::SyncError;

/// Read access to the review feed and the lookups that enrich it.
#[async_trait]
pub trait FeedSource: Send + Sync {
    /// The most recent page of the feed, newest first, restricted to the
    /// kinds `filter` enables.
    async fn fetch_feed_batch(&self, filter: &FeedFilter) -> Result<Vec<RawRecord>, SyncError>;

    async fn fetch_work_metadata(&self, work_id: WorkId) -> Result<WorkMetadata, SyncError>;

    async fn fetch_actor(&self, query: ActorQuery) -> Result<Actor, SyncError>;

    /// Complete history of one work, oldest first.
    async fn fetch_work_history(&self, work_id: WorkId) -> Result<Vec<RawRecord>, SyncError>;

    async fn fetch_group_roster(&self, group: GroupId) -> Result<Vec<RosterEntry>, SyncError>;
}
