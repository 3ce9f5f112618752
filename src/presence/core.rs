use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, MutexGuard};

use serde::{Deserialize, Serialize};

use crate::error::{CounterTokenError, Result};
use crate::logging::{LogLevel, Logger, emit, json_kv};
use crate::observer::{ObserverId, ObserverList};

const TARGET: &str = "counter_tokens::presence";

pub type SurfaceId = String;
pub type ViewerId = String;

/// Raw "assigned surfaces" signal: the primary surface plus per-viewer overrides.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceSignal {
    pub primary: SurfaceId,
    #[serde(default)]
    pub per_viewer: BTreeMap<ViewerId, SurfaceId>,
}

impl PresenceSignal {
    pub fn new(primary: impl Into<SurfaceId>) -> Self {
        Self {
            primary: primary.into(),
            per_viewer: BTreeMap::new(),
        }
    }

    pub fn with_viewer(mut self, viewer: impl Into<ViewerId>, surface: impl Into<SurfaceId>) -> Self {
        self.per_viewer.insert(viewer.into(), surface.into());
        self
    }

    fn assignments(&self) -> impl Iterator<Item = &SurfaceId> {
        std::iter::once(&self.primary).chain(self.per_viewer.values())
    }

    /// Occupancy multiset: how many assignments point at each surface.
    pub fn occupancy(&self) -> BTreeMap<SurfaceId, usize> {
        let mut counts = BTreeMap::new();
        for surface in self.assignments() {
            *counts.entry(surface.clone()).or_insert(0) += 1;
        }
        counts
    }

    /// Deduplicated surfaces, primary first.
    pub fn surfaces(&self) -> Vec<SurfaceId> {
        let mut seen = BTreeSet::new();
        self.assignments()
            .filter(|surface| seen.insert(surface.as_str()))
            .cloned()
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PresenceEvent {
    /// Occupancy of a surface rose.
    ViewerAdded,
    /// Occupancy fell but the surface still has viewers.
    ViewerRemoved,
    /// Surface was unoccupied and now has a viewer.
    FirstViewer,
    /// Surface had viewers and now has none.
    LastViewerLeft,
}

impl PresenceEvent {
    const ALL: [PresenceEvent; 4] = [
        PresenceEvent::ViewerAdded,
        PresenceEvent::LastViewerLeft,
        PresenceEvent::ViewerRemoved,
        PresenceEvent::FirstViewer,
    ];

    fn slot(self) -> usize {
        match self {
            PresenceEvent::ViewerAdded => 0,
            PresenceEvent::ViewerRemoved => 1,
            PresenceEvent::FirstViewer => 2,
            PresenceEvent::LastViewerLeft => 3,
        }
    }

    fn label(self) -> &'static str {
        match self {
            PresenceEvent::ViewerAdded => "viewer_added",
            PresenceEvent::ViewerRemoved => "viewer_removed",
            PresenceEvent::FirstViewer => "first_viewer",
            PresenceEvent::LastViewerLeft => "last_viewer_left",
        }
    }
}

/// The four event classes produced by one signal update.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PresenceChanges {
    pub viewer_added: Vec<SurfaceId>,
    pub viewer_removed: Vec<SurfaceId>,
    pub first_viewer: Vec<SurfaceId>,
    pub last_viewer_left: Vec<SurfaceId>,
}

impl PresenceChanges {
    pub fn surfaces(&self, event: PresenceEvent) -> &[SurfaceId] {
        match event {
            PresenceEvent::ViewerAdded => &self.viewer_added,
            PresenceEvent::ViewerRemoved => &self.viewer_removed,
            PresenceEvent::FirstViewer => &self.first_viewer,
            PresenceEvent::LastViewerLeft => &self.last_viewer_left,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.viewer_added.is_empty()
            && self.viewer_removed.is_empty()
            && self.first_viewer.is_empty()
            && self.last_viewer_left.is_empty()
    }
}

/// Compare occupancy before and after a signal change.
pub fn diff_presence(previous: &PresenceSignal, next: &PresenceSignal) -> PresenceChanges {
    let before = previous.occupancy();
    let after = next.occupancy();
    let mut changes = PresenceChanges::default();

    for (surface, &count) in &after {
        let prior = before.get(surface).copied().unwrap_or(0);
        if count > prior {
            changes.viewer_added.push(surface.clone());
        }
        if prior == 0 {
            changes.first_viewer.push(surface.clone());
        }
    }
    for (surface, &prior) in &before {
        let count = after.get(surface).copied().unwrap_or(0);
        if count == 0 {
            changes.last_viewer_left.push(surface.clone());
        } else if count < prior {
            changes.viewer_removed.push(surface.clone());
        }
    }
    changes
}

pub type SurfaceHandler = Arc<dyn Fn(&str) + Send + Sync>;

#[derive(Default)]
struct TrackerInner {
    signal: PresenceSignal,
    observers: [ObserverList<SurfaceHandler>; 4],
}

/// Cheap-to-clone handle; clones share state and subscriptions.
#[derive(Clone, Default)]
pub struct SurfacePresenceTracker {
    inner: Arc<Mutex<TrackerInner>>,
    logger: Option<Logger>,
}

impl SurfacePresenceTracker {
    pub fn new(initial: PresenceSignal) -> Self {
        Self {
            inner: Arc::new(Mutex::new(TrackerInner {
                signal: initial,
                observers: Default::default(),
            })),
            logger: None,
        }
    }

    pub fn with_logger(mut self, logger: Logger) -> Self {
        self.logger = Some(logger);
        self
    }

    fn lock(&self) -> Result<MutexGuard<'_, TrackerInner>> {
        self.inner
            .lock()
            .map_err(|_| CounterTokenError::Poisoned("presence tracker"))
    }

    pub fn observe(&self, event: PresenceEvent, handler: SurfaceHandler) -> Result<ObserverId> {
        Ok(self.lock()?.observers[event.slot()].push(handler))
    }

    pub fn ignore(&self, event: PresenceEvent, id: ObserverId) -> Result<bool> {
        Ok(self.lock()?.observers[event.slot()].remove(id))
    }

    /// Apply a new raw signal and notify each event class's subscribers.
    pub fn update(&self, signal: PresenceSignal) -> Result<PresenceChanges> {
        let (changes, handlers) = {
            let mut inner = self.lock()?;
            let changes = diff_presence(&inner.signal, &signal);
            inner.signal = signal;
            let handlers: Vec<(PresenceEvent, Vec<SurfaceHandler>)> = PresenceEvent::ALL
                .iter()
                .map(|event| (*event, inner.observers[event.slot()].snapshot()))
                .collect();
            (changes, handlers)
        };

        for (event, subscribers) in handlers {
            for surface in changes.surfaces(event) {
                emit(
                    self.logger.as_ref(),
                    LogLevel::Debug,
                    TARGET,
                    event.label(),
                    [json_kv("surface", surface.as_str())],
                );
                for handler in &subscribers {
                    handler(surface);
                }
            }
        }
        Ok(changes)
    }

    pub fn active_surfaces(&self) -> Vec<SurfaceId> {
        self.lock()
            .map(|inner| inner.signal.surfaces())
            .unwrap_or_default()
    }

    pub fn primary_surface(&self) -> Option<SurfaceId> {
        self.lock().ok().map(|inner| inner.signal.primary.clone())
    }

    pub fn is_active(&self, surface: &str) -> bool {
        self.active_surfaces().iter().any(|s| s == surface)
    }
}
