//! Persistent token group definitions and their per-surface placement state.

mod core;

pub use self::core::{
    LifecycleState, SurfaceState, TokenDefaults, TokenGroup, TokenGroupSpec, TokenRegistry,
    normalize_image_source,
};
