//! Storage layer: the state directory that lets the poll loops resume where they stopped.

mod error;
pub use error::StoreError;

mod state;
pub use state::{Rosters, StateDir};
