//! Shared types for the review feed: raw records, domain events, works and rosters.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Origin of every page and profile link the feed produces.
pub const OSU_BASE_URL: &str = "https://osu.ppy.sh";

/// Identifier of a work (beatmapset).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkId(pub u64);

impl WorkId {
    /// Canonical page of the work.
    pub fn page_url(&self) -> String {
        format!("{OSU_BASE_URL}/beatmapsets/{}", self.0)
    }

    pub fn cover_url(&self) -> String {
        format!("https://assets.ppy.sh/beatmaps/{}/covers/cover.jpg", self.0)
    }
}

impl fmt::Display for WorkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a reviewer group (osu-web `UserGroup` id).
pub type GroupId = u32;

/// The user who triggered an event.
///
/// The feed always carries the id; the display name is only present when the
/// page embedded it, otherwise it is resolved later through the source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: u64,
    pub name: Option<String>,
}

impl Actor {
    pub fn new(id: u64, name: impl Into<String>) -> Self {
        Self {
            id,
            name: Some(name.into()),
        }
    }

    pub fn unnamed(id: u64) -> Self {
        Self { id, name: None }
    }

    /// Name if known, otherwise `#<id>`.
    pub fn display_name(&self) -> String {
        match &self.name {
            Some(name) => name.clone(),
            None => format!("#{}", self.id),
        }
    }

    pub fn profile_url(&self) -> String {
        format!("{OSU_BASE_URL}/users/{}", self.id)
    }
}

/// How to look a user up.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ActorQuery {
    Id(u64),
    Name(String),
}

impl fmt::Display for ActorQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Id(id) => write!(f, "{id}"),
            Self::Name(name) => f.write_str(name),
        }
    }
}

/// Raw event kinds the feed is known to emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RawKind {
    Nominate,
    /// Synthetic marker following a nomination that qualified the work.
    Qualify,
    Disqualify,
    NominationReset,
    Rank,
    Love,
}

impl RawKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Nominate => "nominate",
            Self::Qualify => "qualify",
            Self::Disqualify => "disqualify",
            Self::NominationReset => "nomination_reset",
            Self::Rank => "rank",
            Self::Love => "love",
        }
    }

    pub fn parse(kind: &str) -> Option<Self> {
        match kind {
            "nominate" => Some(Self::Nominate),
            "qualify" => Some(Self::Qualify),
            "disqualify" => Some(Self::Disqualify),
            "nomination_reset" => Some(Self::NominationReset),
            "rank" => Some(Self::Rank),
            "love" => Some(Self::Love),
            _ => None,
        }
    }
}

impl fmt::Display for RawKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One record of the activity feed or of a work's history, as fetched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawRecord {
    /// Source-defined tag, kept as a string so unknown kinds reach the classifier.
    pub kind: String,
    pub timestamp: DateTime<Utc>,
    pub work_id: WorkId,
    pub actor: Option<Actor>,
    /// Links of the record's content block, in document order.
    pub anchors: Vec<String>,
    /// Opening post of the discussion that caused the event, if any.
    pub post_message: Option<String>,
}

impl RawRecord {
    pub fn new(kind: impl Into<String>, timestamp: DateTime<Utc>, work_id: WorkId) -> Self {
        Self {
            kind: kind.into(),
            timestamp,
            work_id,
            actor: None,
            anchors: Vec::new(),
            post_message: None,
        }
    }

    pub fn with_actor(mut self, actor: Actor) -> Self {
        self.actor = Some(actor);
        self
    }

    pub fn with_anchors(mut self, anchors: Vec<String>) -> Self {
        self.anchors = anchors;
        self
    }

    pub fn with_post_message(mut self, message: impl Into<String>) -> Self {
        self.post_message = Some(message.into());
        self
    }

    pub fn raw_kind(&self) -> Option<RawKind> {
        RawKind::parse(&self.kind)
    }

    pub fn is_qualify_marker(&self) -> bool {
        self.raw_kind() == Some(RawKind::Qualify)
    }
}

/// Variant tag of a [`DomainEvent`], without its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventTag {
    Bubbled,
    Qualified,
    Disqualified,
    Popped,
    Ranked,
    Loved,
}

impl EventTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Bubbled => "Bubbled",
            Self::Qualified => "Qualified",
            Self::Disqualified => "Disqualified",
            Self::Popped => "Popped",
            Self::Ranked => "Ranked",
            Self::Loved => "Loved",
        }
    }

    /// Dispatcher topic for this tag.
    pub fn topic(&self) -> &'static str {
        match self {
            Self::Bubbled => "bubbled",
            Self::Qualified => "qualified",
            Self::Disqualified => "disqualified",
            Self::Popped => "popped",
            Self::Ranked => "ranked",
            Self::Loved => "loved",
        }
    }
}

impl fmt::Display for EventTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Variant payload of a [`DomainEvent`].
///
/// Ranked and Loved have no actor: the work changes state without a single
/// user the feed can attribute it to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventKind {
    Bubbled {
        actor: Actor,
    },
    Qualified {
        actor: Actor,
    },
    Disqualified {
        actor: Actor,
        post_message: Option<String>,
    },
    Popped {
        actor: Actor,
        post_message: Option<String>,
    },
    Ranked,
    Loved,
}

/// A classified review lifecycle event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainEvent {
    pub work_id: WorkId,
    pub timestamp: DateTime<Utc>,
    /// Link to the post or page that caused the event.
    pub source_reference: String,
    pub kind: EventKind,
}

impl DomainEvent {
    pub fn tag(&self) -> EventTag {
        match self.kind {
            EventKind::Bubbled { .. } => EventTag::Bubbled,
            EventKind::Qualified { .. } => EventTag::Qualified,
            EventKind::Disqualified { .. } => EventTag::Disqualified,
            EventKind::Popped { .. } => EventTag::Popped,
            EventKind::Ranked => EventTag::Ranked,
            EventKind::Loved => EventTag::Loved,
        }
    }

    pub fn actor(&self) -> Option<&Actor> {
        match &self.kind {
            EventKind::Bubbled { actor }
            | EventKind::Qualified { actor }
            | EventKind::Disqualified { actor, .. }
            | EventKind::Popped { actor, .. } => Some(actor),
            EventKind::Ranked | EventKind::Loved => None,
        }
    }

    pub fn actor_mut(&mut self) -> Option<&mut Actor> {
        match &mut self.kind {
            EventKind::Bubbled { actor }
            | EventKind::Qualified { actor }
            | EventKind::Disqualified { actor, .. }
            | EventKind::Popped { actor, .. } => Some(actor),
            EventKind::Ranked | EventKind::Loved => None,
        }
    }

    pub fn post_message(&self) -> Option<&str> {
        match &self.kind {
            EventKind::Disqualified { post_message, .. }
            | EventKind::Popped { post_message, .. } => post_message.as_deref(),
            _ => None,
        }
    }
}

/// Game mode of a difficulty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GameMode {
    Osu,
    Taiko,
    Catch,
    Mania,
}

impl GameMode {
    /// Mode from the v1 API's numeric `mode` field.
    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "0" => Some(Self::Osu),
            "1" => Some(Self::Taiko),
            "2" => Some(Self::Catch),
            "3" => Some(Self::Mania),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Osu => "osu",
            Self::Taiko => "taiko",
            Self::Catch => "catch",
            Self::Mania => "mania",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Difficulty {
    pub name: String,
    pub mode: GameMode,
}

/// Descriptive data of a work, fetched separately from the feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkMetadata {
    pub work_id: WorkId,
    pub artist: String,
    pub title: String,
    pub creator_name: String,
    pub cover_url: String,
    pub difficulties: Vec<Difficulty>,
}

impl WorkMetadata {
    /// Distinct game modes, in the order the difficulties list them.
    pub fn modes(&self) -> Vec<GameMode> {
        let mut modes = Vec::new();
        for diff in &self.difficulties {
            if !modes.contains(&diff.mode) {
                modes.push(diff.mode);
            }
        }
        modes
    }
}

/// One member of a reviewer group, as listed on the group page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RosterEntry {
    pub id: u64,
    pub username: String,
    /// Highest group of the user, e.g. `bng`, `bng_limited`, `nat`.
    pub default_group: String,
    #[serde(default)]
    pub profile_colour: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub country_code: Option<String>,
}
