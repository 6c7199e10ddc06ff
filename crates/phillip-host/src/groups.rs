//! The roster poll loop: diff each tracked group against its last snapshot.

use std::sync::Arc;

use anyhow::Context;
use phillip_core::roster::diff;
use phillip_core::{GroupId, PollConfig, RosterSnapshot};
use phillip_store::{Rosters, StateDir};
use phillip_sync::FeedSource;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

use crate::dispatch::{Dispatcher, Notification, RosterChange, RosterNotice};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RosterPollReport {
    pub groups: usize,
    pub failed: usize,
    pub added: usize,
    pub removed: usize,
}

/// Owns the last snapshot of every tracked group.
pub struct RosterFeed {
    source: Arc<dyn FeedSource>,
    config: Arc<PollConfig>,
    snapshots: Rosters,
    store: Option<StateDir>,
}

impl RosterFeed {
    pub fn new(source: Arc<dyn FeedSource>, config: Arc<PollConfig>) -> Self {
        Self {
            source,
            config,
            snapshots: Rosters::new(),
            store: None,
        }
    }

    pub fn with_store(mut self, store: StateDir) -> Self {
        self.store = Some(store);
        self
    }

    /// Start from previously saved snapshots.
    pub fn with_snapshots(mut self, snapshots: Rosters) -> Self {
        self.snapshots = snapshots;
        self
    }

    pub fn snapshots(&self) -> &Rosters {
        &self.snapshots
    }

    /// Poll every tracked group once, in configured order.
    ///
    /// A group's snapshot is replaced only after its changes were dispatched.
    /// A failed fetch is reported to consumers and leaves that group's
    /// snapshot in place; the remaining groups are still polled.
    pub async fn poll(&mut self, dispatcher: &Dispatcher) -> RosterPollReport {
        let mut report = RosterPollReport::default();
        let groups = self.config.groups.clone();
        for group in groups {
            match self.poll_group(group, dispatcher).await {
                Ok((added, removed)) => {
                    report.groups += 1;
                    report.added += added;
                    report.removed += removed;
                }
                Err(e) => {
                    report.failed += 1;
                    dispatcher.report_error(&e).await;
                }
            }
        }
        self.persist();
        report
    }

    async fn poll_group(
        &mut self,
        group: GroupId,
        dispatcher: &Dispatcher,
    ) -> anyhow::Result<(usize, usize)> {
        let members = self
            .source
            .fetch_group_roster(group)
            .await
            .with_context(|| format!("fetching roster of group {group}"))?;
        let current = RosterSnapshot::new(members);
        let previous = self.snapshots.get(&group).cloned().unwrap_or_default();
        let changes = diff(&previous, &current);
        let counts = (changes.added.len(), changes.removed.len());

        let notices = changes
            .added
            .into_iter()
            .map(|entry| (RosterChange::Added, entry))
            .chain(changes.removed.into_iter().map(|entry| (RosterChange::Removed, entry)));
        for (change, entry) in notices {
            info!(
                group,
                user_id = entry.id,
                username = %entry.username,
                change = change.topic(),
                "roster change"
            );
            let notice = Notification::Roster(RosterNotice {
                group,
                change,
                entry,
            });
            dispatcher.publish(&notice).await;
        }

        self.snapshots.insert(group, current);
        Ok(counts)
    }

    fn persist(&self) {
        let Some(store) = &self.store else {
            return;
        };
        if let Err(e) = store.save_rosters(&self.snapshots) {
            warn!(error = %e, "could not save rosters");
        }
    }

    /// Poll every `roster_interval` until `shutdown` flips.
    pub async fn run(mut self, dispatcher: Arc<Dispatcher>, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.config.roster_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(
            interval_secs = self.config.roster_interval.as_secs(),
            groups = ?self.config.groups,
            "group feed started"
        );
        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = shutdown.changed() => break,
            }
            if *shutdown.borrow() {
                break;
            }
            let report = self.poll(&dispatcher).await;
            info!(
                groups = report.groups,
                failed = report.failed,
                added = report.added,
                removed = report.removed,
                "group poll complete"
            );
        }
        info!("group feed stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::testing::Recorder;
    use phillip_core::RosterEntry;
    use phillip_core::config::groups;
    use phillip_sync::MemorySource;

    fn member(id: u64, group: &str) -> RosterEntry {
        RosterEntry {
            id,
            username: format!("user{id}"),
            default_group: group.into(),
            profile_colour: None,
            avatar_url: None,
            country_code: None,
        }
    }

    fn config(groups: &[u32]) -> Arc<PollConfig> {
        Arc::new(PollConfig {
            groups: groups.to_vec(),
            ..PollConfig::default()
        })
    }

    fn dispatcher(recorder: &Arc<Recorder>) -> Dispatcher {
        let mut dispatcher = Dispatcher::new();
        for topic in ["group_added", "group_removed", "bng_limited"] {
            dispatcher.subscribe(topic, recorder.clone());
        }
        dispatcher
    }

    async fn changes(recorder: &Recorder) -> Vec<(String, u64)> {
        recorder
            .seen
            .lock()
            .await
            .iter()
            .filter_map(|(topic, n)| match n {
                Notification::Roster(notice) => Some((topic.clone(), notice.entry.id)),
                Notification::Map(_) => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn added_and_removed_members_notified() {
        let source = Arc::new(MemorySource::new());
        for ids in [[1, 2, 3], [2, 3, 4]] {
            let members = ids.iter().map(|&id| member(id, "bng")).collect();
            source.push_roster(groups::FULL_BN, members).await;
        }

        let recorder = Arc::new(Recorder::default());
        let dispatcher = dispatcher(&recorder);
        let mut feed = RosterFeed::new(source, config(&[groups::FULL_BN]));

        let first = feed.poll(&dispatcher).await;
        assert_eq!(first.added, 3);
        recorder.seen.lock().await.clear();

        let second = feed.poll(&dispatcher).await;
        assert_eq!((second.added, second.removed), (1, 1));
        assert_eq!(
            changes(&recorder).await,
            vec![("group_added".to_string(), 4), ("group_removed".to_string(), 1)]
        );
        assert!(feed.snapshots()[&groups::FULL_BN].contains(4));
    }

    #[tokio::test]
    async fn group_label_topic_follows_change_topic() {
        let source = Arc::new(MemorySource::new());
        source
            .push_roster(groups::PROBATION_BN, vec![member(9, "bng_limited")])
            .await;
        let recorder = Arc::new(Recorder::default());
        let mut feed = RosterFeed::new(source, config(&[groups::PROBATION_BN]));
        feed.poll(&dispatcher(&recorder)).await;
        assert_eq!(
            changes(&recorder).await,
            vec![("group_added".to_string(), 9), ("bng_limited".to_string(), 9)]
        );
    }

    #[tokio::test]
    async fn failed_group_keeps_its_snapshot() {
        let source = Arc::new(MemorySource::new());
        source.push_roster(groups::NAT, vec![member(1, "nat")]).await;
        source.fail_roster(groups::NAT, "timeout").await;
        source.push_roster(groups::NAT, vec![member(1, "nat")]).await;
        source.push_roster(groups::GMT, vec![member(5, "gmt")]).await;

        let recorder = Arc::new(Recorder::default());
        let dispatcher = dispatcher(&recorder);
        let mut feed = RosterFeed::new(source, config(&[groups::NAT, groups::GMT]));

        feed.poll(&dispatcher).await;
        let before = feed.snapshots().clone();

        let report = feed.poll(&dispatcher).await;
        assert_eq!((report.groups, report.failed), (1, 1));
        assert_eq!(feed.snapshots(), &before);
        assert_eq!(
            *recorder.errors.lock().await,
            vec!["fetching roster of group 7".to_string()]
        );

        // Unchanged membership: nothing new is dispatched.
        recorder.seen.lock().await.clear();
        let report = feed.poll(&dispatcher).await;
        assert_eq!(
            report,
            RosterPollReport {
                groups: 2,
                ..RosterPollReport::default()
            }
        );
        assert!(changes(&recorder).await.is_empty());
    }

    #[tokio::test]
    async fn broken_group_does_not_starve_later_groups() {
        let source = Arc::new(MemorySource::new());
        source.fail_roster(groups::NAT, "404").await;
        source.push_roster(groups::GMT, vec![member(5, "gmt")]).await;

        let recorder = Arc::new(Recorder::default());
        let dispatcher = dispatcher(&recorder);
        let mut feed = RosterFeed::new(source, config(&[groups::NAT, groups::GMT]));

        for _ in 0..3 {
            let report = feed.poll(&dispatcher).await;
            assert_eq!((report.groups, report.failed), (1, 1));
        }
        assert_eq!(changes(&recorder).await, vec![("group_added".to_string(), 5)]);
        assert!(feed.snapshots()[&groups::GMT].contains(5));
        assert!(!feed.snapshots().contains_key(&groups::NAT));
        assert_eq!(recorder.errors.lock().await.len(), 3);
    }

    #[tokio::test]
    async fn saved_snapshots_suppress_bootstrap() {
        let tmp = tempfile::tempdir().unwrap();
        let store = StateDir::open(tmp.path()).unwrap();
        let source = Arc::new(MemorySource::new());
        source.push_roster(groups::GMT, vec![member(5, "gmt")]).await;

        let mut feed =
            RosterFeed::new(source.clone(), config(&[groups::GMT])).with_store(store.clone());
        feed.poll(&Dispatcher::new()).await;

        let recorder = Arc::new(Recorder::default());
        let mut resumed = RosterFeed::new(source, config(&[groups::GMT]))
            .with_snapshots(store.load_rosters().unwrap());
        resumed.poll(&dispatcher(&recorder)).await;
        assert!(changes(&recorder).await.is_empty());
    }
}
