//! Tracks which surfaces currently have viewers and raises transition events.

mod core;

pub use self::core::{
    PresenceChanges, PresenceEvent, PresenceSignal, SurfaceHandler, SurfaceId,
    SurfacePresenceTracker, ViewerId, diff_presence,
};
