//! Feed sources: the `FeedSource` seam, an in-memory source and the live osu! client.

mod error;
pub mod memory;
pub mod payload;
pub mod source;

#[cfg(feature = "http")]
pub mod http;
#[cfg(feature = "http")]
mod page;

pub use error::SyncError;
pub use memory::MemorySource;
pub use source::FeedSource;

#[cfg(feature = "http")]
pub use http::{ClientConfig, OsuClient};
