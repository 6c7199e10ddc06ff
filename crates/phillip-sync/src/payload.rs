//! JSON payloads served by osu-web and the v1 API, and their conversion into
//! core types.
//!
//! The web pages embed their data as JSON in `<script id="json-…">` tags; the
//! shapes below keep only the fields the feed needs and ignore the rest.

use chrono::{DateTime, Utc};
use phillip_core::model::OSU_BASE_URL;
use phillip_core::{
    Actor, Difficulty, GameMode, RawKind, RawRecord, RosterEntry, WorkId, WorkMetadata,
};
use serde::Deserialize;

use crate::SyncError;

#[derive(Debug, Deserialize)]
pub struct WebEvent {
    #[serde(rename = "type")]
    pub kind: String,
    pub created_at: String,
    #[serde(default)]
    pub user_id: Option<u64>,
    #[serde(default)]
    pub user: Option<WebUser>,
    #[serde(default)]
    pub beatmapset: Option<WebBeatmapset>,
    #[serde(default)]
    pub beatmapset_id: Option<u64>,
    #[serde(default)]
    pub comment: Option<WebComment>,
    #[serde(default)]
    pub discussion: Option<WebDiscussion>,
}

#[derive(Debug, Deserialize)]
pub struct WebUser {
    pub id: u64,
    pub username: String,
}

#[derive(Debug, Deserialize)]
pub struct WebBeatmapset {
    pub id: u64,
}

#[derive(Debug, Deserialize)]
pub struct WebComment {
    #[serde(default)]
    pub beatmap_discussion_id: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct WebDiscussion {
    pub id: u64,
    #[serde(default)]
    pub starting_post: Option<WebPost>,
}

#[derive(Debug, Deserialize)]
pub struct WebPost {
    pub message: String,
}

/// `json-beatmapset-discussion` on a work's discussion page.
#[derive(Debug, Deserialize)]
pub struct DiscussionPage {
    pub beatmapset: DiscussionBeatmapset,
}

#[derive(Debug, Deserialize)]
pub struct DiscussionBeatmapset {
    #[serde(default)]
    pub events: Vec<WebEvent>,
}

/// One difficulty row of v1 `get_beatmaps`. The v1 API encodes numbers as strings.
#[derive(Debug, Deserialize)]
pub struct ApiBeatmap {
    pub beatmapset_id: String,
    pub artist: String,
    pub title: String,
    pub creator: String,
    pub version: String,
    pub mode: String,
}

/// One row of v1 `get_user`.
#[derive(Debug, Deserialize)]
pub struct ApiUser {
    pub user_id: String,
    pub username: String,
}

pub fn discussion_url(discussion_id: u64) -> String {
    format!("{OSU_BASE_URL}/beatmapsets/beatmap-discussions/{discussion_id}")
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, SyncError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|source| SyncError::Timestamp {
            raw: raw.to_string(),
            source,
        })
}

impl WebEvent {
    /// Convert into a [`RawRecord`].
    ///
    /// History events omit the work, so the caller passes the work it asked
    /// for. Anchors follow the link order of the rendered event: a
    /// disqualification reads "by <user> … <discussion>", a nomination reset
    /// "<discussion> by <user>".
    pub fn into_record(self, fallback_work: Option<WorkId>) -> Result<RawRecord, SyncError> {
        let timestamp = parse_timestamp(&self.created_at)?;
        let work_id = self
            .beatmapset
            .as_ref()
            .map(|b| WorkId(b.id))
            .or(self.beatmapset_id.map(WorkId))
            .or(fallback_work)
            .ok_or_else(|| SyncError::Malformed(format!("{} event without a work", self.kind)))?;

        let actor = match (&self.user, self.user_id) {
            (Some(user), _) => Some(Actor::new(user.id, user.username.clone())),
            (None, Some(id)) => Some(Actor::unnamed(id)),
            (None, None) => None,
        };

        let discussion_id = self
            .comment
            .as_ref()
            .and_then(|c| c.beatmap_discussion_id)
            .or(self.discussion.as_ref().map(|d| d.id));
        let anchors = match (discussion_id, &actor) {
            (Some(id), Some(actor)) => match RawKind::parse(&self.kind) {
                Some(RawKind::Disqualify) => vec![actor.profile_url(), discussion_url(id)],
                Some(RawKind::NominationReset) => vec![discussion_url(id), actor.profile_url()],
                _ => Vec::new(),
            },
            _ => Vec::new(),
        };

        let post_message = self
            .discussion
            .and_then(|d| d.starting_post)
            .map(|p| p.message);

        Ok(RawRecord {
            kind: self.kind,
            timestamp,
            work_id,
            actor,
            anchors,
            post_message,
        })
    }
}

/// Fold v1 `get_beatmaps` rows (one per difficulty) into a work's metadata.
pub fn metadata_from_rows(
    work_id: WorkId,
    rows: Vec<ApiBeatmap>,
) -> Result<WorkMetadata, SyncError> {
    let first = rows
        .first()
        .ok_or_else(|| SyncError::NotFound(format!("beatmapset {work_id}")))?;
    if first.beatmapset_id != work_id.0.to_string() {
        return Err(SyncError::Malformed(format!(
            "asked for beatmapset {work_id}, got {}",
            first.beatmapset_id
        )));
    }
    let artist = first.artist.clone();
    let title = first.title.clone();
    let creator_name = first.creator.clone();

    let difficulties = rows
        .into_iter()
        .map(|row| {
            let mode = GameMode::from_code(&row.mode)
                .ok_or_else(|| SyncError::Malformed(format!("unknown mode {}", row.mode)))?;
            Ok(Difficulty {
                name: row.version,
                mode,
            })
        })
        .collect::<Result<Vec<_>, SyncError>>()?;

    Ok(WorkMetadata {
        work_id,
        artist,
        title,
        creator_name,
        cover_url: work_id.cover_url(),
        difficulties,
    })
}

impl TryFrom<ApiUser> for Actor {
    type Error = SyncError;

    fn try_from(user: ApiUser) -> Result<Self, Self::Error> {
        let id = user
            .user_id
            .parse()
            .map_err(|_| SyncError::Malformed(format!("user id {:?}", user.user_id)))?;
        Ok(Actor::new(id, user.username))
    }
}

/// Decode the `json-users` list of a group page.
pub fn roster_from_json(json: &str) -> Result<Vec<RosterEntry>, SyncError> {
    Ok(serde_json::from_str(json)?)
}
