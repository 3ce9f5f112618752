//! Counter-driven token synchronization.
//!
//! A [`CounterStore`] holds named bounded counters. Each [`TokenGroup`] binds a
//! counter to a picture; the [`SyncController`] keeps one visual instance per
//! counter point on every surface that currently has viewers, packs them into
//! a grid and pushes overlapping groups apart. All layout work is serialized
//! through a single [`SerializedEventGate`].

pub mod canvas;
pub mod counter;
pub mod error;
pub mod geometry;
pub mod layout;
pub mod logging;
pub mod metrics;
pub mod observer;
pub mod persist;
pub mod presence;
pub mod registry;
pub mod runtime;
pub mod spend;

pub use canvas::{Canvas, CanvasEvent, CanvasOps, InstanceId, Layer, MemoryCanvas, NewVisual, VisualObject};
pub use counter::{ChangeHandler, Counter, CounterStore, RemoveHandler, parse_count};
pub use error::{CounterTokenError, EntityKind, Result};
pub use geometry::{BoundingBox, Point, Size};
pub use layout::{Collision, GridSpec, Obstacle, Packing, find_collision, pack, row_capacity};
pub use logging::{
    FileSink, LogEvent, LogFields, LogLevel, LogSink, Logger, LoggingError, LoggingResult,
    MemorySink, NullSink,
};
pub use metrics::{MetricSnapshot, SyncMetrics};
pub use observer::ObserverId;
pub use persist::{CURRENT_VERSION, MigrationContext, PersistedState, StateFile};
pub use presence::{
    PresenceChanges, PresenceEvent, PresenceSignal, SurfaceId, SurfacePresenceTracker, ViewerId,
};
pub use registry::{
    LifecycleState, SurfaceState, TokenDefaults, TokenGroup, TokenGroupSpec, TokenRegistry,
};
pub use runtime::{
    Clock, EngineConfig, GroupGeometry, ManualClock, PassKey, PassOutcome, SerializedEventGate,
    Submission, SyncController, SyncReport, SystemClock,
};
pub use spend::{SHARED_POOL, SpendDistributor, SpendOutcome, route_spend};
