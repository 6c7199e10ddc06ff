//! Console cards for notifications.
//!
//! Renders each notification as a short card grouped into sections, for
//! `--print` and for watching the feed without a webhook.

use std::fmt::Write;

use async_trait::async_trait;
use phillip_host::{Consumer, MapNotice, Notification, RosterChange, RosterNotice};

const LABEL_WIDTH: usize = 12;

/// Prints every notification it receives to stdout.
pub struct ConsoleConsumer;

#[async_trait]
impl Consumer for ConsoleConsumer {
    fn name(&self) -> &str {
        "console"
    }

    async fn notify(&self, topic: &str, notification: &Notification) -> anyhow::Result<()> {
        println!("[{topic}]");
        print!("{}", render_card(notification));
        Ok(())
    }

    async fn on_error(&self, error: &anyhow::Error) {
        eprintln!("poll failed: {error:#}");
    }
}

// ── Public API ──

pub fn render_card(notification: &Notification) -> String {
    match notification {
        Notification::Map(notice) => map_card(notice),
        Notification::Roster(notice) => roster_card(notice),
    }
}

// ── Card rendering ──

fn row(out: &mut String, label: &str, value: impl std::fmt::Display) {
    let _ = writeln!(out, "  {label:<width$} {value}", width = LABEL_WIDTH);
}

fn map_card(notice: &MapNotice) -> String {
    let event = &notice.event;
    let meta = &notice.metadata;
    let mut out = String::new();

    let _ = writeln!(out, "=== {}: {} - {} ===", event.tag(), meta.artist, meta.title);
    out.push('\n');

    out.push_str("Work\n");
    row(&mut out, "id", event.work_id);
    row(&mut out, "creator", &meta.creator_name);
    let modes: Vec<&str> = meta.modes().iter().map(|m| m.as_str()).collect();
    if !modes.is_empty() {
        row(&mut out, "modes", modes.join(", "));
    }
    row(&mut out, "page", event.work_id.page_url());
    out.push('\n');

    out.push_str("Event\n");
    row(&mut out, "at", event.timestamp.format("%Y-%m-%d %H:%M:%S UTC"));
    if let Some(actor) = event.actor() {
        row(&mut out, "by", format!("{} ({})", actor.display_name(), actor.profile_url()));
    }
    row(&mut out, "source", &event.source_reference);
    if let Some(message) = event.post_message() {
        let first = message.lines().next().unwrap_or_default();
        row(&mut out, "post", first);
    }
    out.push('\n');

    if !notice.contributors.is_empty() {
        out.push_str("Nominators\n");
        for c in &notice.contributors {
            row(&mut out, c.label.as_str(), c.actor.display_name());
        }
        out.push('\n');
    }
    out
}

fn roster_card(notice: &RosterNotice) -> String {
    let entry = &notice.entry;
    let verb = match notice.change {
        RosterChange::Added => "joined",
        RosterChange::Removed => "left",
    };
    let mut out = String::new();
    let _ = writeln!(out, "=== {} {verb} group {} ===", entry.username, notice.group);
    out.push('\n');
    out.push_str("Member\n");
    row(&mut out, "id", entry.id);
    row(&mut out, "group", &entry.default_group);
    if let Some(country) = &entry.country_code {
        row(&mut out, "country", country);
    }
    row(&mut out, "profile", format!("https://osu.ppy.sh/users/{}", entry.id));
    out.push('\n');
    out
}
