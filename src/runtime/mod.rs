//! Synchronization runtime: the serialized gate, deferred packing passes and
//! the controller that keeps token instances in step with counters.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::logging::Logger;
use crate::metrics::SyncMetrics;
use crate::presence::SurfaceId;
use crate::registry::TokenDefaults;

pub mod clock;
mod controller;
mod engine;
pub mod gate;
pub mod scheduler;

pub use clock::{Clock, ManualClock, SystemClock};
pub use controller::SyncController;
pub use engine::{GroupGeometry, PassOutcome};
pub use gate::{SerializedEventGate, Submission};
pub use scheduler::{Admission, LayoutScheduler, PassKey};

/// Configuration knobs for the synchronization controller.
#[derive(Clone)]
pub struct EngineConfig {
    /// Quiet period before a coalesced packing pass runs.
    pub debounce_quiet: Duration,
    /// No instance is placed above or left of this offset.
    pub min_border: f64,
    /// Geometry for groups created without explicit values.
    pub token_defaults: TokenDefaults,
    /// Optional structured logger used by the controller.
    pub logger: Option<Logger>,
    /// Metrics accumulator; `None` disables collection.
    pub metrics: Option<Arc<Mutex<SyncMetrics>>>,
    /// Target field used when emitting metrics snapshots.
    pub metrics_target: String,
    /// Time source for debounce deadlines.
    pub clock: Arc<dyn Clock>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            debounce_quiet: Duration::from_millis(250),
            min_border: 10.0,
            token_defaults: TokenDefaults::default(),
            logger: None,
            metrics: None,
            metrics_target: "counter_tokens::metrics".to_string(),
            clock: Arc::new(SystemClock),
        }
    }
}

impl EngineConfig {
    pub fn with_logger(mut self, logger: Logger) -> Self {
        self.logger = Some(logger);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_debounce_quiet(mut self, quiet: Duration) -> Self {
        self.debounce_quiet = quiet;
        self
    }

    pub fn with_min_border(mut self, border: f64) -> Self {
        self.min_border = border;
        self
    }

    pub fn with_token_defaults(mut self, defaults: TokenDefaults) -> Self {
        self.token_defaults = defaults;
        self
    }

    /// Enable metrics collection if it has not already been configured.
    pub fn enable_metrics(&mut self) {
        if self.metrics.is_none() {
            self.metrics = Some(Arc::new(Mutex::new(SyncMetrics::new())));
        }
    }

    /// Disable metrics collection and prevent further snapshots.
    pub fn disable_metrics(&mut self) {
        self.metrics = None;
    }

    /// Access the shared metrics handle if metrics are enabled.
    pub fn metrics_handle(&self) -> Option<Arc<Mutex<SyncMetrics>>> {
        self.metrics.as_ref().map(Arc::clone)
    }
}

/// A failure caught at a gated handler boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncReport {
    pub action: &'static str,
    pub group: Option<String>,
    pub surface: Option<SurfaceId>,
    pub message: String,
}
