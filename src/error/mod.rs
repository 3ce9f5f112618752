//! Error taxonomy shared by every component of the crate.

mod types;

pub use types::{CounterTokenError, EntityKind, Result};
