//! The map poll loop: fetch, classify, filter through the cursor, enrich, dispatch.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use anyhow::Context;
use futures::stream::{self, StreamExt};
use phillip_core::{
    CheckpointCursor, DomainEvent, PollConfig, Watermark, WorkId, WorkMetadata, classify_feed,
};
use phillip_store::StateDir;
use phillip_sync::{FeedSource, SyncError};
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::dispatch::{Dispatcher, Notification};
use crate::enrich::enrich;

/// Concurrent metadata lookups per poll.
const METADATA_CONCURRENCY: usize = 4;

/// Counts for one poll of the map feed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MapPollReport {
    pub fetched: usize,
    pub dispatched: usize,
    /// Accepted but kept from consumers (system account).
    pub suppressed: usize,
    /// Stale or duplicate.
    pub rejected: usize,
    /// Records that could not be classified.
    pub skipped: usize,
}

/// Owns the checkpoint cursor of the map feed.
pub struct MapFeed {
    source: Arc<dyn FeedSource>,
    config: Arc<PollConfig>,
    cursor: CheckpointCursor,
    store: Option<StateDir>,
}

impl MapFeed {
    pub fn new(source: Arc<dyn FeedSource>, config: Arc<PollConfig>) -> Self {
        Self {
            source,
            config,
            cursor: CheckpointCursor::default(),
            store: None,
        }
    }

    /// Save the watermark to `store` after every poll.
    pub fn with_store(mut self, store: StateDir) -> Self {
        self.store = Some(store);
        self
    }

    /// Resume from `watermark` instead of the epoch.
    pub fn with_watermark(mut self, watermark: Watermark) -> Self {
        self.cursor.reset(watermark);
        self
    }

    pub fn cursor(&self) -> &CheckpointCursor {
        &self.cursor
    }

    /// Run one poll.
    ///
    /// Each accepted event is dispatched before the cursor moves past it. If
    /// a fetch fails the poll stops there: events already dispatched stay
    /// committed, the rest are picked up again by the next poll.
    pub async fn poll(&mut self, dispatcher: &Dispatcher) -> anyhow::Result<MapPollReport> {
        let result = self.poll_inner(dispatcher).await;
        self.persist();
        result
    }

    async fn poll_inner(&mut self, dispatcher: &Dispatcher) -> anyhow::Result<MapPollReport> {
        let batch = self
            .source
            .fetch_feed_batch(&self.config.filter)
            .await
            .context("fetching map feed")?;
        let mut report = MapPollReport {
            fetched: batch.len(),
            ..MapPollReport::default()
        };

        let mut events = Vec::with_capacity(batch.len());
        for item in classify_feed(batch) {
            match item {
                Ok(event) => events.push(event),
                Err(e) => {
                    warn!(error = %e, "skipping feed record");
                    report.skipped += 1;
                }
            }
        }
        // Stable: same-second events keep their feed order.
        events.sort_by_key(|e| e.timestamp);

        let (mut metadata, mut failures) = self.prefetch(&events).await;

        let count = events.len();
        for (i, event) in events.into_iter().enumerate() {
            let last_in_batch = i + 1 == count;
            let verdict = self.cursor.evaluate(&event);
            if !verdict.is_accept() {
                debug!(
                    work_id = %event.work_id,
                    timestamp = %event.timestamp,
                    ?verdict,
                    "rejected"
                );
                report.rejected += 1;
                continue;
            }
            if self.config.is_suppressed(event.actor()) {
                debug!(work_id = %event.work_id, tag = %event.tag(), "suppressed system event");
                self.cursor.commit(&event, last_in_batch);
                report.suppressed += 1;
                continue;
            }

            let work_id = event.work_id;
            if let Some(e) = failures.remove(&work_id) {
                return Err(
                    anyhow::Error::new(e).context(format!("metadata for beatmapset {work_id}"))
                );
            }
            let meta = match metadata.get(&work_id) {
                Some(meta) => meta.clone(),
                None => {
                    let meta = self
                        .source
                        .fetch_work_metadata(work_id)
                        .await
                        .with_context(|| format!("metadata for beatmapset {work_id}"))?;
                    metadata.insert(work_id, meta.clone());
                    meta
                }
            };

            let tag = event.tag();
            let notice = enrich(self.source.as_ref(), &self.config, event.clone(), meta).await;
            let delivered = dispatcher.publish(&Notification::Map(notice)).await;
            info!(work_id = %work_id, tag = %tag, delivered, "dispatched map event");
            self.cursor.commit(&event, last_in_batch);
            report.dispatched += 1;
        }

        Ok(report)
    }

    /// Fetch metadata of every work that may be dispatched this poll.
    ///
    /// Candidates are events not older than the watermark at the start of the
    /// poll, which is a superset of what the cursor will accept.
    async fn prefetch(
        &self,
        events: &[DomainEvent],
    ) -> (HashMap<WorkId, WorkMetadata>, HashMap<WorkId, SyncError>) {
        let floor = self.cursor.watermark().timestamp;
        let works: BTreeSet<WorkId> = events
            .iter()
            .filter(|e| e.timestamp >= floor && !self.config.is_suppressed(e.actor()))
            .map(|e| e.work_id)
            .collect();

        let source = &self.source;
        let results: Vec<(WorkId, Result<WorkMetadata, SyncError>)> = stream::iter(works)
            .map(|id| async move { (id, source.fetch_work_metadata(id).await) })
            .buffer_unordered(METADATA_CONCURRENCY)
            .collect()
            .await;

        let mut found = HashMap::new();
        let mut failed = HashMap::new();
        for (id, result) in results {
            match result {
                Ok(meta) => {
                    found.insert(id, meta);
                }
                Err(e) => {
                    failed.insert(id, e);
                }
            }
        }
        (found, failed)
    }

    fn persist(&self) {
        let Some(store) = &self.store else {
            return;
        };
        if let Err(e) = store.save_watermark(self.cursor.watermark()) {
            warn!(error = %e, "could not save watermark");
        }
    }

    /// Poll every `map_interval` until `shutdown` flips.
    pub async fn run(mut self, dispatcher: Arc<Dispatcher>, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.config.map_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(interval_secs = self.config.map_interval.as_secs(), "map feed started");
        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = shutdown.changed() => break,
            }
            if *shutdown.borrow() {
                break;
            }
            match self.poll(&dispatcher).await {
                Ok(report) => info!(
                    fetched = report.fetched,
                    dispatched = report.dispatched,
                    suppressed = report.suppressed,
                    rejected = report.rejected,
                    skipped = report.skipped,
                    "map poll complete"
                ),
                Err(e) => dispatcher.report_error(&e).await,
            }
        }
        info!("map feed stopped");
    }
}
