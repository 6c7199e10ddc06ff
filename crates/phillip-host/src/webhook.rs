//! Discord webhook rendering of map notifications.

use phillip_core::{EventKind, EventTag};
use serde_json::{Value, json};

use crate::enrich::MapNotice;

pub const COLOR_DEFAULT: u32 = 29625;
/// Used for Popped and Disqualified.
pub const COLOR_SETBACK: u32 = 15408128;

const EXCERPT_MIN: usize = 20;
const EXCERPT_MAX: usize = 80;

pub fn icon(tag: EventTag) -> &'static str {
    match tag {
        EventTag::Bubbled => ":thought_balloon:",
        EventTag::Qualified => ":heart:",
        EventTag::Ranked => ":sparkling_heart:",
        EventTag::Disqualified => ":broken_heart:",
        EventTag::Popped => ":anger_right:",
        EventTag::Loved => ":gift_heart:",
    }
}

fn prefix(text: &str, chars: usize) -> &str {
    match text.char_indices().nth(chars) {
        Some((end, _)) => &text[..end],
        None => text,
    }
}

/// Short form of a discussion post for the embed footer.
///
/// Takes the first line. A first line under 20 characters is too terse on
/// its own, so the first 80 characters of the whole post are used instead.
/// Anything over 80 characters is cut and marked with `...`.
pub fn excerpt(message: &str) -> String {
    let first_line = message.split('\n').next().unwrap_or_default();
    if first_line.chars().count() < EXCERPT_MIN {
        return prefix(message, EXCERPT_MAX).to_string();
    }
    if first_line.chars().count() > EXCERPT_MAX {
        return format!("{}...", prefix(message, EXCERPT_MAX));
    }
    first_line.to_string()
}

/// The embed for one map notice.
pub fn embed(notice: &MapNotice) -> Value {
    let event = &notice.event;
    let meta = &notice.metadata;
    let tag = event.tag();
    let modes: Vec<&str> = meta.modes().iter().map(|m| m.as_str()).collect();

    let mut description = format!(
        "[**{} - {}**]({})\r\nMapped by {} **[{}]**",
        meta.artist,
        meta.title,
        event.source_reference,
        meta.creator_name,
        modes.join("][")
    );
    if matches!(event.kind, EventKind::Ranked) {
        let credits: String = notice
            .contributors
            .iter()
            .map(|c| {
                format!(
                    "{} [{}](https://osu.ppy.sh/u/{}) ",
                    icon(c.label),
                    c.actor.display_name(),
                    c.actor.id
                )
            })
            .collect();
        description.push_str("\r\n ");
        description.push_str(&credits);
    }

    let mut embed = json!({
        "title": format!("{} {}", icon(tag), tag),
        "description": description,
        "color": COLOR_DEFAULT,
        "thumbnail": { "url": meta.cover_url },
    });

    if let Some(actor) = event.actor() {
        let mut footer = actor.display_name();
        if matches!(tag, EventTag::Popped | EventTag::Disqualified) {
            if let Some(message) = event.post_message() {
                footer.push_str(" - ");
                footer.push_str(&excerpt(message));
            }
            embed["color"] = json!(COLOR_SETBACK);
        }
        embed["footer"] = json!({
            "icon_url": format!("https://a.ppy.sh/{}", actor.id),
            "text": footer,
        });
    }
    embed
}

/// Webhook request body: the source link as content, plus the embed.
pub fn payload(notice: &MapNotice) -> Value {
    json!({
        "content": notice.event.source_reference,
        "embeds": [embed(notice)],
    })
}

#[cfg(feature = "webhook")]
pub use client::WebhookConsumer;

#[cfg(feature = "webhook")]
mod client {
    use async_trait::async_trait;
    use tracing::info;

    use super::payload;
    use crate::dispatch::{Consumer, Notification};

    /// Posts every map notification to a Discord webhook.
    pub struct WebhookConsumer {
        client: reqwest::Client,
        url: String,
    }

    impl WebhookConsumer {
        pub fn new(url: impl Into<String>) -> Self {
            Self {
                client: reqwest::Client::new(),
                url: url.into(),
            }
        }
    }

    #[async_trait]
    impl Consumer for WebhookConsumer {
        fn name(&self) -> &str {
            "webhook"
        }

        async fn notify(&self, _topic: &str, notification: &Notification) -> anyhow::Result<()> {
            let Notification::Map(notice) = notification else {
                return Ok(());
            };
            let resp = self
                .client
                .post(&self.url)
                .json(&payload(notice))
                .send()
                .await?;
            let status = resp.status();
            if !status.is_success() {
                let body = resp.text().await.unwrap_or_default();
                anyhow::bail!("webhook returned {status}: {body}");
            }
            info!(work_id = %notice.event.work_id, tag = %notice.event.tag(), "posted to webhook");
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enrich::Contributor;
    use crate::enrich::fixtures::{at, metadata};
    use phillip_core::{Actor, DomainEvent, WorkId};

    fn notice(kind: EventKind, source_reference: &str) -> MapNotice {
        MapNotice::new(
            DomainEvent {
                work_id: WorkId(1),
                timestamp: at(100),
                source_reference: source_reference.into(),
                kind,
            },
            metadata(1),
        )
    }

    #[test]
    fn excerpt_keeps_plain_first_line() {
        assert_eq!(
            excerpt("the kiai on the hard is unrankable\nsee timestamps"),
            "the kiai on the hard is unrankable"
        );
    }

    #[test]
    fn excerpt_short_first_line_uses_whole_message() {
        assert_eq!(excerpt("veto\nsecond line"), "veto\nsecond line");
        let long = format!("hi\n{}", "x".repeat(100));
        assert_eq!(excerpt(&long).chars().count(), 80);
        assert!(!excerpt(&long).ends_with("..."));
    }

    #[test]
    fn excerpt_long_first_line_is_cut() {
        let line = "é".repeat(90);
        let cut = excerpt(&line);
        assert!(cut.ends_with("..."));
        assert_eq!(cut.chars().count(), 83);
    }

    #[test]
    fn bubbled_embed_shape() {
        let n = notice(
            EventKind::Bubbled {
                actor: Actor::new(10, "Hivie"),
            },
            "https://osu.ppy.sh/beatmapsets/1",
        );
        let e = embed(&n);
        assert_eq!(e["title"], ":thought_balloon: Bubbled");
        assert_eq!(
            e["description"],
            "[**artist1 - title1**](https://osu.ppy.sh/beatmapsets/1)\r\nMapped by Plaudible **[osu][taiko]**"
        );
        assert_eq!(e["color"], COLOR_DEFAULT);
        assert_eq!(e["thumbnail"]["url"], "https://assets.ppy.sh/beatmaps/1/covers/cover.jpg");
        assert_eq!(e["footer"]["text"], "Hivie");
        assert_eq!(e["footer"]["icon_url"], "https://a.ppy.sh/10");
    }

    #[test]
    fn popped_embed_is_red_with_excerpt() {
        let n = notice(
            EventKind::Popped {
                actor: Actor::new(20, "Naxess"),
                post_message: Some("offset is 15ms early on every diff".into()),
            },
            "https://osu.ppy.sh/beatmapsets/beatmap-discussions/9",
        );
        let e = embed(&n);
        assert_eq!(e["color"], COLOR_SETBACK);
        assert_eq!(e["footer"]["text"], "Naxess - offset is 15ms early on every diff");
    }

    #[test]
    fn ranked_embed_lists_contributors_without_footer() {
        let mut n = notice(EventKind::Ranked, "https://osu.ppy.sh/beatmapsets/1");
        n.contributors = vec![
            Contributor {
                label: EventTag::Bubbled,
                actor: Actor::new(10, "Hivie"),
            },
            Contributor {
                label: EventTag::Qualified,
                actor: Actor::unnamed(11),
            },
        ];
        let e = embed(&n);
        assert!(e.get("footer").is_none());
        let description = e["description"].as_str().unwrap();
        assert!(description.ends_with(
            "\r\n :thought_balloon: [Hivie](https://osu.ppy.sh/u/10) :heart: [#11](https://osu.ppy.sh/u/11) "
        ));
    }

    #[test]
    fn payload_carries_source_as_content() {
        let n = notice(EventKind::Loved, "https://osu.ppy.sh/beatmapsets/1");
        let p = payload(&n);
        assert_eq!(p["content"], "https://osu.ppy.sh/beatmapsets/1");
        assert_eq!(p["embeds"][0]["title"], ":gift_heart: Loved");
    }
}
