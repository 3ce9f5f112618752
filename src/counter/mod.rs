//! Named bounded counters and their change/removal observer bus.
//!
//! The store is a cheap-to-clone handle; every clone sees the same counters.
//! Observers run synchronously, in registration order, after the store lock
//! has been released, so a handler may call back into the store.

mod core;

pub use self::core::{ChangeHandler, Counter, CounterStore, RemoveHandler, parse_count};
