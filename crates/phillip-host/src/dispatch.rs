//! Topic-based fan-out of notifications to consumers.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use phillip_core::{GroupId, RosterEntry};
use tracing::{debug, error, warn};

use crate::enrich::MapNotice;

/// Topic every map notification is published under, before its tag topic.
pub const MAP_EVENT: &str = "map_event";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RosterChange {
    Added,
    Removed,
}

impl RosterChange {
    pub fn topic(&self) -> &'static str {
        match self {
            Self::Added => "group_added",
            Self::Removed => "group_removed",
        }
    }
}

/// A membership change of one group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RosterNotice {
    pub group: GroupId,
    pub change: RosterChange,
    pub entry: RosterEntry,
}

#[derive(Debug, Clone)]
pub enum Notification {
    Map(MapNotice),
    Roster(RosterNotice),
}

impl Notification {
    /// Topics in publish order: the general one, then the specific one.
    pub fn topics(&self) -> [&str; 2] {
        match self {
            Self::Map(notice) => [MAP_EVENT, notice.event.tag().topic()],
            Self::Roster(notice) => [notice.change.topic(), notice.entry.default_group.as_str()],
        }
    }
}

/// Receives notifications for the topics it is subscribed to.
#[async_trait]
pub trait Consumer: Send + Sync {
    fn name(&self) -> &str;

    async fn notify(&self, topic: &str, notification: &Notification) -> anyhow::Result<()>;

    /// Called when a poll fails. Default: ignore.
    async fn on_error(&self, _error: &anyhow::Error) {}
}

/// Maps topics to subscribed consumers.
///
/// Delivery is sequential in subscription order. A failing consumer is
/// logged and skipped; it never stops delivery to the others.
#[derive(Default)]
pub struct Dispatcher {
    subscribers: HashMap<String, Vec<Arc<dyn Consumer>>>,
    consumers: Vec<Arc<dyn Consumer>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self, topic: impl Into<String>, consumer: Arc<dyn Consumer>) {
        if !self.consumers.iter().any(|c| Arc::ptr_eq(c, &consumer)) {
            self.consumers.push(Arc::clone(&consumer));
        }
        self.subscribers.entry(topic.into()).or_default().push(consumer);
    }

    /// Whether anything is listening at all.
    pub fn has_consumers(&self) -> bool {
        !self.consumers.is_empty()
    }

    /// Deliver `notification` on each of its topics. Returns the number of
    /// successful deliveries.
    pub async fn publish(&self, notification: &Notification) -> usize {
        let mut delivered = 0;
        for topic in notification.topics() {
            let Some(consumers) = self.subscribers.get(topic) else {
                continue;
            };
            for consumer in consumers {
                match consumer.notify(topic, notification).await {
                    Ok(()) => {
                        debug!(consumer = consumer.name(), topic, "delivered");
                        delivered += 1;
                    }
                    Err(e) => {
                        warn!(consumer = consumer.name(), topic, error = %e, "consumer failed");
                    }
                }
            }
        }
        delivered
    }

    /// Tell every consumer that a poll failed.
    pub async fn report_error(&self, err: &anyhow::Error) {
        error!(error = %err, "poll failed");
        for consumer in &self.consumers {
            consumer.on_error(err).await;
        }
    }
}


#[cfg(test)]
mod tests {
    use super::testing::Recorder;
    use super::*;

    fn roster_notice(change: RosterChange) -> Notification {
        Notification::Roster(RosterNotice {
            group: 28,
            change,
            entry: RosterEntry {
                id: 1,
                username: "user1".into(),
                default_group: "bng".into(),
                profile_colour: None,
                avatar_url: None,
                country_code: None,
            },
        })
    }

    #[tokio::test]
    async fn publishes_on_both_topics_in_order() {
        let recorder = Arc::new(Recorder::default());
        let mut dispatcher = Dispatcher::new();
        dispatcher.subscribe("group_added", recorder.clone());
        dispatcher.subscribe("bng", recorder.clone());

        let delivered = dispatcher.publish(&roster_notice(RosterChange::Added)).await;
        assert_eq!(delivered, 2);
        assert_eq!(recorder.topics().await, vec!["group_added", "bng"]);

        // Not subscribed to removals, only to the group label.
        dispatcher.publish(&roster_notice(RosterChange::Removed)).await;
        assert_eq!(recorder.topics().await, vec!["group_added", "bng", "bng"]);
    }

    #[tokio::test]
    async fn failing_consumer_does_not_block_others() {
        let failing = Arc::new(Recorder {
            fail_on: Some("group_added"),
            ..Recorder::default()
        });
        let healthy = Arc::new(Recorder::default());
        let mut dispatcher = Dispatcher::new();
        dispatcher.subscribe("group_added", failing.clone());
        dispatcher.subscribe("group_added", healthy.clone());

        let delivered = dispatcher.publish(&roster_notice(RosterChange::Added)).await;
        assert_eq!(delivered, 1);
        assert!(failing.topics().await.is_empty());
        assert_eq!(healthy.topics().await, vec!["group_added"]);
    }

    #[tokio::test]
    async fn errors_reach_each_consumer_once() {
        let recorder = Arc::new(Recorder::default());
        let mut dispatcher = Dispatcher::new();
        assert!(!dispatcher.has_consumers());
        dispatcher.subscribe("group_added", recorder.clone());
        dispatcher.subscribe("group_removed", recorder.clone());
        assert!(dispatcher.has_consumers());

        dispatcher.report_error(&anyhow::anyhow!("feed down")).await;
        assert_eq!(*recorder.errors.lock().await, vec!["feed down".to_string()]);
    }
}
