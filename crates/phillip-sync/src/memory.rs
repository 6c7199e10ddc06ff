//! In-memory [`FeedSource`] for replaying recorded feeds and for tests.

use std::collections::{HashMap, VecDeque};

use async_trait::async_trait;
use phillip_core::{
    Actor, ActorQuery, FeedFilter, GroupId, RawRecord, RosterEntry, WorkId, WorkMetadata,
};
use tokio::sync::Mutex;
use tracing::debug;

use crate::{FeedSource, SyncError};

type Scripted<T> = Result<T, String>;

#[derive(Default)]
struct State {
    batches: VecDeque<Scripted<Vec<RawRecord>>>,
    rosters: HashMap<GroupId, VecDeque<Scripted<Vec<RosterEntry>>>>,
    metadata: HashMap<WorkId, WorkMetadata>,
    actors: HashMap<u64, Actor>,
    histories: HashMap<WorkId, Scripted<Vec<RawRecord>>>,
    feed_calls: usize,
}

fn unavailable(reason: String) -> SyncError {
    SyncError::Server {
        status: 503,
        body: reason,
    }
}

/// Serves scripted responses.
///
/// Feed batches are served once each, in push order; an exhausted queue
/// serves an empty page. Roster responses are queued per group and the last
/// one stays in place, so a group keeps its final membership. Lookups of
/// unknown works or users fail with [`SyncError::NotFound`]; unknown
/// histories are empty unless scripted to fail.
#[derive(Default)]
pub struct MemorySource {
    state: Mutex<State>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_metadata(mut self, metadata: WorkMetadata) -> Self {
        self.state.get_mut().metadata.insert(metadata.work_id, metadata);
        self
    }

    pub fn with_actor(mut self, actor: Actor) -> Self {
        self.state.get_mut().actors.insert(actor.id, actor);
        self
    }

    pub fn with_history(mut self, work_id: WorkId, history: Vec<RawRecord>) -> Self {
        self.state.get_mut().histories.insert(work_id, Ok(history));
        self
    }

    /// Queue a feed page, newest record first.
    pub async fn push_batch(&self, batch: Vec<RawRecord>) {
        self.state.lock().await.batches.push_back(Ok(batch));
    }

    /// Make the next feed fetch fail.
    pub async fn fail_feed(&self, reason: impl Into<String>) {
        self.state.lock().await.batches.push_back(Err(reason.into()));
    }

    pub async fn push_roster(&self, group: GroupId, members: Vec<RosterEntry>) {
        self.state
            .lock()
            .await
            .rosters
            .entry(group)
            .or_default()
            .push_back(Ok(members));
    }

    pub async fn fail_roster(&self, group: GroupId, reason: impl Into<String>) {
        self.state
            .lock()
            .await
            .rosters
            .entry(group)
            .or_default()
            .push_back(Err(reason.into()));
    }

    /// Make every history fetch for `work_id` fail.
    pub async fn fail_history(&self, work_id: WorkId, reason: impl Into<String>) {
        self.state
            .lock()
            .await
            .histories
            .insert(work_id, Err(reason.into()));
    }

    pub async fn insert_metadata(&self, metadata: WorkMetadata) {
        self.state
            .lock()
            .await
            .metadata
            .insert(metadata.work_id, metadata);
    }

    /// Number of feed fetches served so far.
    pub async fn feed_calls(&self) -> usize {
        self.state.lock().await.feed_calls
    }
}

#[async_trait]
impl FeedSource for MemorySource {
    async fn fetch_feed_batch(&self, filter: &FeedFilter) -> Result<Vec<RawRecord>, SyncError> {
        let mut state = self.state.lock().await;
        state.feed_calls += 1;
        let batch = state.batches.pop_front().unwrap_or(Ok(Vec::new()));
        let kinds = filter.kinds();
        let batch: Vec<RawRecord> = batch
            .map_err(unavailable)?
            .into_iter()
            .filter(|r| r.raw_kind().is_none_or(|k| kinds.contains(&k)))
            .collect();
        debug!(count = batch.len(), "served feed batch");
        Ok(batch)
    }

    async fn fetch_work_metadata(&self, work_id: WorkId) -> Result<WorkMetadata, SyncError> {
        self.state
            .lock()
            .await
            .metadata
            .get(&work_id)
            .cloned()
            .ok_or_else(|| SyncError::NotFound(format!("beatmapset {work_id}")))
    }

    async fn fetch_actor(&self, query: ActorQuery) -> Result<Actor, SyncError> {
        let state = self.state.lock().await;
        let found = match &query {
            ActorQuery::Id(id) => state.actors.get(id),
            ActorQuery::Name(name) => state
                .actors
                .values()
                .find(|a| a.name.as_deref().is_some_and(|n| n.eq_ignore_ascii_case(name))),
        };
        found
            .cloned()
            .ok_or_else(|| SyncError::NotFound(format!("user {query}")))
    }

    async fn fetch_work_history(&self, work_id: WorkId) -> Result<Vec<RawRecord>, SyncError> {
        self.state
            .lock()
            .await
            .histories
            .get(&work_id)
            .cloned()
            .unwrap_or(Ok(Vec::new()))
            .map_err(unavailable)
    }

    async fn fetch_group_roster(&self, group: GroupId) -> Result<Vec<RosterEntry>, SyncError> {
        let mut state = self.state.lock().await;
        let Some(queue) = state.rosters.get_mut(&group) else {
            return Ok(Vec::new());
        };
        let next = if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        };
        next.unwrap_or(Ok(Vec::new())).map_err(unavailable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn record(kind: &str) -> RawRecord {
        RawRecord::new(kind, Utc.timestamp_opt(100, 0).unwrap(), WorkId(1))
    }

    fn member(id: u64) -> RosterEntry {
        RosterEntry {
            id,
            username: format!("user{id}"),
            default_group: "bng".into(),
            profile_colour: None,
            avatar_url: None,
            country_code: None,
        }
    }

    #[tokio::test]
    async fn batches_served_once_then_empty() {
        let source = MemorySource::new();
        source.push_batch(vec![record("rank")]).await;
        let filter = FeedFilter::default();
        assert_eq!(source.fetch_feed_batch(&filter).await.unwrap().len(), 1);
        assert!(source.fetch_feed_batch(&filter).await.unwrap().is_empty());
        assert_eq!(source.feed_calls().await, 2);
    }

    #[tokio::test]
    async fn filter_drops_disabled_kinds() {
        let source = MemorySource::new();
        source
            .push_batch(vec![record("rank"), record("love"), record("qualify")])
            .await;
        let filter = FeedFilter {
            love: false,
            nominate: false,
            ..FeedFilter::default()
        };
        let batch = source.fetch_feed_batch(&filter).await.unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].kind, "rank");
    }

    #[tokio::test]
    async fn scripted_failure() {
        let source = MemorySource::new();
        source.fail_feed("maintenance").await;
        let err = source
            .fetch_feed_batch(&FeedFilter::default())
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::Server { status: 503, .. }));
    }

    #[tokio::test]
    async fn last_roster_is_sticky() {
        let source = MemorySource::new();
        source.push_roster(28, vec![member(1)]).await;
        source.push_roster(28, vec![member(1), member(2)]).await;
        assert_eq!(source.fetch_group_roster(28).await.unwrap().len(), 1);
        assert_eq!(source.fetch_group_roster(28).await.unwrap().len(), 2);
        assert_eq!(source.fetch_group_roster(28).await.unwrap().len(), 2);
        assert!(source.fetch_group_roster(7).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn scripted_history_failure() {
        let source = MemorySource::new().with_history(WorkId(2), vec![record("rank")]);
        source.fail_history(WorkId(1), "gone").await;
        assert!(matches!(
            source.fetch_work_history(WorkId(1)).await,
            Err(SyncError::Server { status: 503, .. })
        ));
        assert_eq!(source.fetch_work_history(WorkId(2)).await.unwrap().len(), 1);
        assert!(source.fetch_work_history(WorkId(3)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn actor_lookup_by_id_and_name() {
        let source = MemorySource::new().with_actor(Actor::new(2, "peppy"));
        assert_eq!(
            source.fetch_actor(ActorQuery::Id(2)).await.unwrap().name.as_deref(),
            Some("peppy")
        );
        assert_eq!(
            source.fetch_actor(ActorQuery::Name("PEPPY".into())).await.unwrap().id,
            2
        );
        assert!(matches!(
            source.fetch_actor(ActorQuery::Id(9)).await,
            Err(SyncError::NotFound(_))
        ));
    }
}
