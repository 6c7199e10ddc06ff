//! Startup validation, loop supervision and shutdown.

use std::sync::Arc;

use anyhow::Context;
use phillip_core::{PollConfig, Watermark};
use phillip_store::{Rosters, StateDir};
use phillip_sync::FeedSource;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{error, info};

use crate::dispatch::Dispatcher;
use crate::feed::MapFeed;
use crate::groups::RosterFeed;

/// Flips once to tell every loop to stop at its next iteration boundary.
#[derive(Debug, Clone)]
pub struct Shutdown {
    tx: Arc<watch::Sender<bool>>,
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }

    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_triggered(&self) -> bool {
        *self.tx.borrow()
    }
}

/// Everything the two loops need, assembled by the embedding application.
pub struct Runner {
    source: Arc<dyn FeedSource>,
    config: Arc<PollConfig>,
    dispatcher: Arc<Dispatcher>,
    store: Option<StateDir>,
    watermark: Option<Watermark>,
    rosters: Rosters,
}

impl Runner {
    pub fn new(source: Arc<dyn FeedSource>, config: PollConfig, dispatcher: Dispatcher) -> Self {
        Self {
            source,
            config: Arc::new(config),
            dispatcher: Arc::new(dispatcher),
            store: None,
            watermark: None,
            rosters: Rosters::new(),
        }
    }

    /// Load the saved watermark and rosters from `store` and keep saving to it.
    ///
    /// A watermark passed to [`with_watermark`](Self::with_watermark)
    /// afterwards takes precedence over the saved one.
    pub fn with_store(mut self, store: StateDir) -> anyhow::Result<Self> {
        self.watermark = store.load_watermark().context("loading watermark")?;
        self.rosters = store.load_rosters().context("loading rosters")?;
        info!(
            path = %store.path().display(),
            watermark = ?self.watermark.as_ref().map(|w| w.timestamp),
            groups = self.rosters.len(),
            "restored state"
        );
        self.store = Some(store);
        Ok(self)
    }

    pub fn with_watermark(mut self, watermark: Watermark) -> Self {
        self.watermark = Some(watermark);
        self
    }

    /// Validate, then run the enabled loops until `shutdown` triggers.
    ///
    /// Configuration errors are returned before any loop starts; runtime
    /// failures are reported to consumers by the loops themselves.
    pub async fn run(self, shutdown: &Shutdown) -> anyhow::Result<()> {
        self.config
            .validate(self.dispatcher.has_consumers())
            .context("invalid configuration")?;

        let mut tasks = JoinSet::new();
        if !self.config.disable_map_feed {
            let mut feed = MapFeed::new(Arc::clone(&self.source), Arc::clone(&self.config));
            if let Some(watermark) = self.watermark {
                feed = feed.with_watermark(watermark);
            }
            if let Some(store) = &self.store {
                feed = feed.with_store(store.clone());
            }
            tasks.spawn(feed.run(Arc::clone(&self.dispatcher), shutdown.subscribe()));
        }
        if !self.config.disable_group_feed {
            let mut feed = RosterFeed::new(Arc::clone(&self.source), Arc::clone(&self.config))
                .with_snapshots(self.rosters);
            if let Some(store) = &self.store {
                feed = feed.with_store(store.clone());
            }
            tasks.spawn(feed.run(Arc::clone(&self.dispatcher), shutdown.subscribe()));
        }

        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "poll loop panicked");
            }
        }
        info!("all loops stopped");
        Ok(())
    }
}
