//! Host runtime: poll loops, enrichment, and dispatch of review notifications to consumers.

pub mod dispatch;
pub mod enrich;
pub mod feed;
pub mod groups;
pub mod runtime;
pub mod webhook;

pub use dispatch::{Consumer, Dispatcher, MAP_EVENT, Notification, RosterChange, RosterNotice};
pub use enrich::{Contributor, MapNotice};
pub use feed::{MapFeed, MapPollReport};
pub use groups::{RosterFeed, RosterPollReport};
pub use runtime::{Runner, Shutdown};

#[cfg(feature = "webhook")]
pub use webhook::WebhookConsumer;
