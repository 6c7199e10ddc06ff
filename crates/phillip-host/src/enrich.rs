//! Joins accepted events with what consumers need to render them.

use std::collections::HashMap;

use phillip_core::{
    Actor, ActorQuery, DomainEvent, EventKind, EventTag, PollConfig, WorkMetadata, reduce_history,
};
use phillip_sync::FeedSource;
use tracing::warn;

/// One step of a ranked work's nomination history, with the actor's name
/// resolved where possible.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Contributor {
    pub label: EventTag,
    pub actor: Actor,
}

/// An accepted map event ready for delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MapNotice {
    pub event: DomainEvent,
    pub metadata: WorkMetadata,
    /// Only filled for Ranked events.
    pub contributors: Vec<Contributor>,
}

impl MapNotice {
    pub fn new(event: DomainEvent, metadata: WorkMetadata) -> Self {
        Self {
            event,
            metadata,
            contributors: Vec::new(),
        }
    }
}

/// Build the notice for `event`.
///
/// Lookups here are best effort: a failed name lookup leaves the actor
/// unnamed and a failed history fetch leaves the contributor list empty.
pub async fn enrich(
    source: &dyn FeedSource,
    config: &PollConfig,
    mut event: DomainEvent,
    metadata: WorkMetadata,
) -> MapNotice {
    if let Some(actor) = event.actor_mut() {
        if actor.name.is_none() {
            *actor = resolve(source, actor.id).await;
        }
    }
    let contributors = match event.kind {
        EventKind::Ranked => contributors(source, config, &event).await,
        _ => Vec::new(),
    };
    MapNotice {
        event,
        metadata,
        contributors,
    }
}

async fn resolve(source: &dyn FeedSource, id: u64) -> Actor {
    match source.fetch_actor(ActorQuery::Id(id)).await {
        Ok(actor) => actor,
        Err(e) => {
            warn!(user_id = id, error = %e, "could not resolve user name");
            Actor::unnamed(id)
        }
    }
}

async fn contributors(
    source: &dyn FeedSource,
    config: &PollConfig,
    event: &DomainEvent,
) -> Vec<Contributor> {
    let history = match source.fetch_work_history(event.work_id).await {
        Ok(history) => history,
        Err(e) => {
            warn!(work_id = %event.work_id, error = %e, "no nomination history");
            return Vec::new();
        }
    };

    let mut names: HashMap<u64, Actor> = HashMap::new();
    let mut out = Vec::new();
    for entry in reduce_history(history) {
        // The system account never gets credit, even when its events are kept.
        if entry.actor_id == config.system_actor_id {
            continue;
        }
        let actor = match names.get(&entry.actor_id) {
            Some(actor) => actor.clone(),
            None => {
                let actor = resolve(source, entry.actor_id).await;
                names.insert(entry.actor_id, actor.clone());
                actor
            }
        };
        out.push(Contributor {
            label: entry.label,
            actor,
        });
    }
    out
}

#[cfg(test)]
pub(crate) mod fixtures {
    use chrono::{DateTime, TimeZone, Utc};
    use phillip_core::{Difficulty, GameMode, WorkId, WorkMetadata};

    pub fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    pub fn metadata(work: u64) -> WorkMetadata {
        WorkMetadata {
            work_id: WorkId(work),
            artist: format!("artist{work}"),
            title: format!("title{work}"),
            creator_name: "Plaudible".into(),
            cover_url: WorkId(work).cover_url(),
            difficulties: vec![
                Difficulty {
                    name: "Normal".into(),
                    mode: GameMode::Osu,
                },
                Difficulty {
                    name: "Oni".into(),
                    mode: GameMode::Taiko,
                },
            ],
        }
    }
}
