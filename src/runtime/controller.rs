use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use serde_json::{Value, json};

use crate::canvas::{Canvas, CanvasEvent};
use crate::counter::{ChangeHandler, Counter, CounterStore};
use crate::error::{CounterTokenError, EntityKind, Result};
use crate::logging::{LogLevel, emit, json_kv};
use crate::metrics::{MetricSnapshot, SyncMetrics};
use crate::observer::ObserverId;
use crate::persist::{CURRENT_VERSION, PersistedState};
use crate::presence::{PresenceEvent, SurfaceId, SurfacePresenceTracker};
use crate::registry::{SurfaceState, TokenGroup, TokenGroupSpec, TokenRegistry};

use super::engine::{Engine, EventEffect, GroupGeometry};
use super::gate::{SerializedEventGate, Submission};
use super::scheduler::{Admission, LayoutScheduler, PassKey};
use super::{EngineConfig, SyncReport};

const TARGET: &str = "counter_tokens::sync";
const LAYOUT_TARGET: &str = "counter_tokens::layout";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PassReason {
    Counter,
    Attach,
    Moved,
    Geometry,
    Anchor,
    Deferred,
}

impl PassReason {
    fn label(self) -> &'static str {
        match self {
            PassReason::Counter => "counter",
            PassReason::Attach => "attach",
            PassReason::Moved => "moved",
            PassReason::Geometry => "geometry",
            PassReason::Anchor => "anchor",
            PassReason::Deferred => "deferred",
        }
    }
}

struct ControllerInner {
    store: CounterStore,
    presence: SurfacePresenceTracker,
    gate: SerializedEventGate,
    scheduler: Mutex<LayoutScheduler>,
    /// Locked only from gate tasks.
    engine: Mutex<Engine>,
    reports: Mutex<Vec<SyncReport>>,
    presence_watchers: Mutex<Vec<(PresenceEvent, ObserverId)>>,
    config: EngineConfig,
    started: Instant,
}

/// Keeps token instances on every active surface in step with their counters.
///
/// Counter changes, presence transitions and canvas edits are all funnelled
/// through one [`SerializedEventGate`]; layout state is only read or written
/// by tasks running behind it. Operator calls (`add_group`, `remove_group`,
/// ...) also run as gate tasks and wait for their result, so they fail with
/// [`CounterTokenError::GateUnavailable`] when issued from inside a handler.
#[derive(Clone)]
pub struct SyncController {
    inner: Arc<ControllerInner>,
}

impl SyncController {
    pub fn new<C>(
        store: CounterStore,
        presence: SurfacePresenceTracker,
        canvas: C,
        config: EngineConfig,
    ) -> Result<Self>
    where
        C: Canvas + 'static,
    {
        let engine = Engine::new(Box::new(canvas), config.token_defaults, config.min_border);
        let inner = Arc::new(ControllerInner {
            store,
            presence,
            gate: SerializedEventGate::new(),
            scheduler: Mutex::new(LayoutScheduler::new(config.debounce_quiet)),
            engine: Mutex::new(engine),
            reports: Mutex::new(Vec::new()),
            presence_watchers: Mutex::new(Vec::new()),
            started: config.clock.now(),
            config,
        });
        inner.watch_presence()?;
        Ok(Self { inner })
    }

    pub fn store(&self) -> &CounterStore {
        &self.inner.store
    }

    pub fn presence(&self) -> &SurfacePresenceTracker {
        &self.inner.presence
    }

    /// Load persisted state (if any) and attach every group to the surfaces
    /// that currently have viewers. Instance ids the canvas no longer holds
    /// are pruned; surfaces without viewers are cleared.
    pub fn init(&self, restored: Option<PersistedState>) -> Result<()> {
        self.inner.call(move |inner| inner.restore(restored))
    }

    pub fn add_group(&self, spec: TokenGroupSpec) -> Result<TokenGroup> {
        self.inner.call(move |inner| inner.create_group(spec))
    }

    /// Create a group using the image of an object on the primary surface,
    /// then remove that object.
    pub fn add_group_from_object(
        &self,
        name: impl Into<String>,
        counter_name: impl Into<String>,
        object_name: impl Into<String>,
    ) -> Result<TokenGroup> {
        let (name, counter_name, object_name) = (name.into(), counter_name.into(), object_name.into());
        self.inner.call(move |inner| {
            let surface = inner
                .presence
                .primary_surface()
                .ok_or_else(|| CounterTokenError::NotFound {
                    kind: EntityKind::Surface,
                    name: "primary".to_string(),
                })?;
            let object = inner
                .engine()?
                .canvas()
                .find_by_name(&surface, &object_name)
                .ok_or_else(|| CounterTokenError::NotFound {
                    kind: EntityKind::Instance,
                    name: object_name.clone(),
                })?;
            let group = inner.create_group(TokenGroupSpec::new(
                name,
                counter_name,
                object.image_source.clone(),
            ))?;
            inner.engine()?.canvas().destroy(&object.id)?;
            Ok(group)
        })
    }

    pub fn remove_group(&self, name: &str) -> Result<()> {
        let name = name.to_string();
        self.inner
            .call(move |inner| inner.teardown_group(&name).map(|_| ()))
    }

    /// Remove every group. Returns how many were removed; a group that fails
    /// to tear down is reported and the rest are still removed.
    pub fn reset_groups(&self) -> Result<usize> {
        self.inner.call(|inner| {
            let names = inner.engine()?.registry.names();
            let mut removed = 0;
            for name in &names {
                match inner.teardown_group(name) {
                    Ok(_) => removed += 1,
                    Err(err) => inner.report("teardown", Some(name.as_str()), None, &err),
                }
            }
            Ok(removed)
        })
    }

    /// `(group, counter)` pairs in registration order.
    pub fn list_groups(&self) -> Result<Vec<(String, String)>> {
        self.inner.call(|inner| {
            Ok(inner
                .engine()?
                .registry
                .in_order()
                .into_iter()
                .map(|group| (group.name.clone(), group.counter_name.clone()))
                .collect())
        })
    }

    pub fn group(&self, name: &str) -> Result<TokenGroup> {
        let name = name.to_string();
        self.inner
            .call(move |inner| inner.engine()?.registry.require(&name).cloned())
    }

    pub fn surface_state(&self, group: &str, surface: &str) -> Result<Option<SurfaceState>> {
        let (group, surface) = (group.to_string(), surface.to_string());
        self.inner.call(move |inner| {
            Ok(inner
                .engine()?
                .registry
                .require(&group)?
                .surface(&surface)
                .cloned())
        })
    }

    /// Change size, spacing or anchor, then repack on every attached surface.
    pub fn set_group_geometry(&self, name: &str, geometry: GroupGeometry) -> Result<TokenGroup> {
        let name = name.to_string();
        self.inner.call(move |inner| {
            let surfaces = inner.engine()?.set_geometry(&name, geometry)?;
            for surface in surfaces {
                inner.request_pass(PassKey::new(name.as_str(), surface), PassReason::Geometry);
            }
            inner.engine()?.registry.require(&name).cloned()
        })
    }

    /// Forward an edit someone made on the canvas. Failures surface through
    /// [`drain_reports`](Self::drain_reports).
    pub fn handle_canvas_event(&self, event: CanvasEvent) -> Submission {
        self.inner
            .submit(move |inner| inner.apply_canvas_event(event))
    }

    /// Submit deferred packing passes whose quiet period has elapsed.
    pub fn tick(&self) -> Result<usize> {
        let now = self.inner.config.clock.now();
        let due = self.inner.scheduler()?.take_due(now);
        let count = due.len();
        for key in due {
            self.inner.submit_pass(key, PassReason::Deferred);
        }
        Ok(count)
    }

    pub fn pending_deferred(&self) -> usize {
        self.inner
            .scheduler()
            .map(|scheduler| scheduler.deferred_len())
            .unwrap_or(0)
    }

    pub fn drain_reports(&self) -> Vec<SyncReport> {
        self.inner
            .reports
            .lock()
            .map(|mut reports| std::mem::take(&mut *reports))
            .unwrap_or_default()
    }

    pub fn persisted_state(&self) -> Result<PersistedState> {
        self.inner.call(|inner| {
            Ok(PersistedState {
                version: CURRENT_VERSION,
                counters: inner.store.snapshot()?,
                groups: inner.engine()?.registry.to_persisted(),
            })
        })
    }

    /// Log and return a metrics snapshot when metrics are enabled.
    pub fn emit_metrics(&self) -> Option<MetricSnapshot> {
        let config = &self.inner.config;
        let handle = config.metrics.as_ref()?;
        let uptime = config.clock.now().saturating_duration_since(self.inner.started);
        let snapshot = handle.lock().ok()?.snapshot(uptime);
        if let Some(logger) = &config.logger {
            let _ = logger.log_event(snapshot.to_log_event(&config.metrics_target));
        }
        Some(snapshot)
    }

    /// Unregister every counter and presence subscription. Instances stay on
    /// the canvas.
    pub fn shutdown(&self) -> Result<()> {
        self.inner.call(|inner| {
            let (watchers, removals) = {
                let mut engine = inner.engine()?;
                let watchers: Vec<ObserverId> =
                    std::mem::take(&mut engine.watchers).into_values().collect();
                let removals: Vec<ObserverId> = std::mem::take(&mut engine.removal_watchers)
                    .into_values()
                    .collect();
                (watchers, removals)
            };
            for id in watchers {
                inner.store.ignore_change(id)?;
            }
            for id in removals {
                inner.store.ignore_remove(id)?;
            }
            let subscriptions = inner
                .presence_watchers
                .lock()
                .map(|mut watchers| std::mem::take(&mut *watchers))
                .map_err(|_| CounterTokenError::Poisoned("presence subscriptions"))?;
            for (event, id) in subscriptions {
                inner.presence.ignore(event, id)?;
            }
            inner.log(LogLevel::Info, "controller_shutdown", std::iter::empty());
            Ok(())
        })
    }
}

impl ControllerInner {
    fn engine(&self) -> Result<MutexGuard<'_, Engine>> {
        self.engine
            .lock()
            .map_err(|_| CounterTokenError::Poisoned("sync engine"))
    }

    fn scheduler(&self) -> Result<MutexGuard<'_, LayoutScheduler>> {
        self.scheduler
            .lock()
            .map_err(|_| CounterTokenError::Poisoned("layout scheduler"))
    }

    fn log<I>(&self, level: LogLevel, message: &str, fields: I)
    where
        I: IntoIterator<Item = (String, Value)>,
    {
        emit(self.config.logger.as_ref(), level, TARGET, message, fields);
    }

    fn with_metrics(&self, update: impl FnOnce(&mut SyncMetrics)) {
        if let Some(metrics) = &self.config.metrics {
            if let Ok(mut guard) = metrics.lock() {
                update(&mut guard);
            }
        }
    }

    /// Record a failure caught at a handler boundary.
    fn report(
        &self,
        action: &'static str,
        group: Option<&str>,
        surface: Option<&str>,
        err: &CounterTokenError,
    ) {
        self.log(
            LogLevel::Error,
            "handler_failed",
            [
                json_kv("action", action),
                json_kv("group", group.map_or(Value::Null, |g| json!(g))),
                json_kv("surface", surface.map_or(Value::Null, |s| json!(s))),
                json_kv("error", err.to_string()),
            ],
        );
        self.with_metrics(SyncMetrics::record_failure);
        if let Ok(mut reports) = self.reports.lock() {
            reports.push(SyncReport {
                action,
                group: group.map(str::to_string),
                surface: surface.map(str::to_string),
                message: err.to_string(),
            });
        }
    }

    /// Run an operator call behind the gate and wait for its result.
    fn call<T, F>(self: &Arc<Self>, operation: F) -> Result<T>
    where
        F: FnOnce(&Arc<ControllerInner>) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let inner = Arc::clone(self);
        match self.gate.call(move || operation(&inner)) {
            Some(result) => result,
            None => Err(CounterTokenError::GateUnavailable),
        }
    }

    /// Queue a handler behind the gate without waiting.
    fn submit<F>(self: &Arc<Self>, task: F) -> Submission
    where
        F: FnOnce(&Arc<ControllerInner>) + Send + 'static,
    {
        let weak = Arc::downgrade(self);
        self.gate.submit(move || {
            if let Some(inner) = weak.upgrade() {
                task(&inner);
            }
        })
    }

    fn watch_presence(self: &Arc<Self>) -> Result<()> {
        let weak = Arc::downgrade(self);
        let first = self.presence.observe(
            PresenceEvent::FirstViewer,
            Arc::new(move |surface: &str| {
                if let Some(inner) = weak.upgrade() {
                    let surface = surface.to_string();
                    inner.submit(move |inner| {
                        if let Err(err) = inner.attach_surface(&surface) {
                            inner.report("attach", None, Some(surface.as_str()), &err);
                        }
                    });
                }
            }),
        )?;
        let weak = Arc::downgrade(self);
        let last = self.presence.observe(
            PresenceEvent::LastViewerLeft,
            Arc::new(move |surface: &str| {
                if let Some(inner) = weak.upgrade() {
                    let surface = surface.to_string();
                    inner.submit(move |inner| {
                        if let Err(err) = inner.detach_surface(&surface) {
                            inner.report("detach", None, Some(surface.as_str()), &err);
                        }
                    });
                }
            }),
        )?;
        let mut watchers = self
            .presence_watchers
            .lock()
            .map_err(|_| CounterTokenError::Poisoned("presence subscriptions"))?;
        watchers.push((PresenceEvent::FirstViewer, first));
        watchers.push((PresenceEvent::LastViewerLeft, last));
        Ok(())
    }

    fn restore(self: &Arc<Self>, restored: Option<PersistedState>) -> Result<()> {
        if let Some(state) = restored {
            let mut engine = self.engine()?;
            if !engine.registry.is_empty() {
                return Err(CounterTokenError::invalid(
                    "persisted state can only be restored before groups are added",
                ));
            }
            self.store.restore(state.counters)?;
            engine.registry = TokenRegistry::from_persisted(state.groups);
        }

        let groups: Vec<(String, String, bool)> = self
            .engine()?
            .registry
            .in_order()
            .into_iter()
            .map(|g| (g.name.clone(), g.counter_name.clone(), g.is_removing()))
            .collect();
        for (name, counter, removing) in &groups {
            if *removing {
                if let Err(err) = self.teardown_group(name) {
                    self.report("teardown", Some(name.as_str()), None, &err);
                }
                continue;
            }
            if !self.engine()?.removal_watchers.contains_key(name) {
                self.watch_removal(name, counter)?;
            }
        }

        let active = self.presence.active_surfaces();
        let stale: Vec<SurfaceId> = {
            let engine = self.engine()?;
            let mut surfaces: Vec<SurfaceId> = engine
                .registry
                .in_order()
                .into_iter()
                .flat_map(|group| group.per_surface.keys().cloned())
                .filter(|surface| !active.contains(surface))
                .collect();
            surfaces.sort();
            surfaces.dedup();
            surfaces
        };
        for surface in &stale {
            self.detach_surface(surface)?;
        }
        for surface in &active {
            self.attach_surface(surface)?;
        }
        self.log(
            LogLevel::Info,
            "controller_initialized",
            [
                json_kv("groups", groups.len()),
                json_kv("surfaces", active.len()),
            ],
        );
        Ok(())
    }

    fn create_group(self: &Arc<Self>, spec: TokenGroupSpec) -> Result<TokenGroup> {
        let (name, counter) = {
            let mut engine = self.engine()?;
            let defaults = engine.defaults;
            let group = engine.registry.create(spec, &defaults)?;
            (group.name.clone(), group.counter_name.clone())
        };
        self.watch_removal(&name, &counter)?;
        for surface in self.presence.active_surfaces() {
            self.attach_group(&name, &counter, &surface)?;
        }
        self.log(
            LogLevel::Info,
            "group_created",
            [
                json_kv("group", name.as_str()),
                json_kv("counter", counter.as_str()),
            ],
        );
        self.engine()?.registry.require(&name).cloned()
    }

    fn watch_removal(self: &Arc<Self>, group: &str, counter: &str) -> Result<()> {
        let weak = Arc::downgrade(self);
        let (owner, watched) = (group.to_string(), counter.to_string());
        let id = self.store.observe_remove(Arc::new(move |name: &str| {
            if name != watched {
                return;
            }
            if let Some(inner) = weak.upgrade() {
                let group = owner.clone();
                inner.submit(move |inner| {
                    if let Err(err) = inner.teardown_group(&group) {
                        inner.report("teardown", Some(group.as_str()), None, &err);
                    }
                });
            }
        }))?;
        self.engine()?
            .removal_watchers
            .insert(group.to_string(), id);
        Ok(())
    }

    fn change_handler(self: &Arc<Self>, key: &PassKey, counter: &str) -> ChangeHandler {
        let weak = Arc::downgrade(self);
        let (key, watched) = (key.clone(), counter.to_string());
        Arc::new(move |name: &str, value: &Counter| {
            if name != watched {
                return;
            }
            if let Some(inner) = weak.upgrade() {
                inner.counter_changed(&key, value.current);
            }
        })
    }

    fn counter_changed(self: &Arc<Self>, key: &PassKey, value: u64) {
        let group = key.group.clone();
        self.submit(move |inner| match inner.engine() {
            Ok(mut engine) => engine.observe_value(&group, value),
            Err(err) => inner.report("observe", Some(group.as_str()), None, &err),
        });
        self.request_pass(key.clone(), PassReason::Counter);
    }

    fn attach_surface(self: &Arc<Self>, surface: &str) -> Result<()> {
        let groups: Vec<(String, String)> = self
            .engine()?
            .registry
            .in_order()
            .into_iter()
            .filter(|group| !group.is_removing())
            .map(|group| (group.name.clone(), group.counter_name.clone()))
            .collect();
        for (group, counter) in &groups {
            if let Err(err) = self.attach_group(group, counter, surface) {
                self.report("attach", Some(group.as_str()), Some(surface), &err);
            }
        }
        self.log(
            LogLevel::Info,
            "surface_attached",
            [json_kv("surface", surface), json_kv("groups", groups.len())],
        );
        Ok(())
    }

    fn attach_group(self: &Arc<Self>, group: &str, counter: &str, surface: &str) -> Result<()> {
        let key = PassKey::new(group, surface);
        let pruned = {
            let mut engine = self.engine()?;
            let pruned = engine.attach(group, surface)?;
            if engine.watchers.contains_key(&key) {
                return Ok(());
            }
            pruned
        };
        // Registration replays the counter's current value, which queues the
        // first pass for this key.
        let id = self
            .store
            .observe_change(self.change_handler(&key, counter))?;
        self.engine()?.watchers.insert(key.clone(), id);
        if !self.store.contains(counter) {
            self.request_pass(key, PassReason::Attach);
        }
        self.log(
            LogLevel::Debug,
            "group_attached",
            [
                json_kv("group", group),
                json_kv("surface", surface),
                json_kv("pruned", pruned),
            ],
        );
        Ok(())
    }

    fn detach_surface(self: &Arc<Self>, surface: &str) -> Result<()> {
        let watchers: Vec<ObserverId> = {
            let mut engine = self.engine()?;
            let keys: Vec<PassKey> = engine
                .watchers
                .keys()
                .filter(|key| key.surface == surface)
                .cloned()
                .collect();
            keys.iter()
                .filter_map(|key| engine.watchers.remove(key))
                .collect()
        };
        for id in watchers {
            self.store.ignore_change(id)?;
        }
        self.scheduler()?.cancel_where(|key| key.surface == surface);

        let mut destroyed = 0;
        let mut engine = self.engine()?;
        let groups: Vec<String> = engine
            .registry
            .in_order()
            .into_iter()
            .filter(|group| group.surface(surface).is_some())
            .map(|group| group.name.clone())
            .collect();
        for group in &groups {
            match engine.detach(group, surface) {
                Ok(count) => destroyed += count,
                Err(err) => self.report("detach", Some(group.as_str()), Some(surface), &err),
            }
        }
        drop(engine);
        self.log(
            LogLevel::Info,
            "surface_detached",
            [
                json_kv("surface", surface),
                json_kv("groups", groups.len()),
                json_kv("destroyed", destroyed),
            ],
        );
        Ok(())
    }

    /// Remove a group: stop reacting to it, clear its instances, forget it.
    fn teardown_group(self: &Arc<Self>, name: &str) -> Result<usize> {
        let (watchers, removal) = {
            let mut engine = self.engine()?;
            engine.mark_removing(name)?;
            (engine.take_watchers(name), engine.removal_watchers.remove(name))
        };
        for id in watchers {
            self.store.ignore_change(id)?;
        }
        self.scheduler()?.cancel_where(|key| key.group == name);
        let destroyed = {
            let mut engine = self.engine()?;
            let destroyed = engine.clear_group(name)?;
            engine.registry.remove(name)?;
            destroyed
        };
        if let Some(id) = removal {
            self.store.ignore_remove(id)?;
        }
        self.with_metrics(|metrics| metrics.record_reconcile(0, 0, destroyed));
        self.log(
            LogLevel::Info,
            "group_removed",
            [json_kv("group", name), json_kv("destroyed", destroyed)],
        );
        Ok(destroyed)
    }

    fn request_pass(self: &Arc<Self>, key: PassKey, reason: PassReason) {
        let admission = match self.scheduler() {
            Ok(mut scheduler) => scheduler.request(&key, self.config.clock.now()),
            Err(err) => {
                self.report("schedule", Some(key.group.as_str()), Some(key.surface.as_str()), &err);
                return;
            }
        };
        match admission {
            Admission::Admitted => {
                self.submit_pass(key, reason);
            }
            Admission::Deferred => emit(
                self.config.logger.as_ref(),
                LogLevel::Debug,
                LAYOUT_TARGET,
                "pass_deferred",
                [
                    json_kv("group", key.group.as_str()),
                    json_kv("surface", key.surface.as_str()),
                    json_kv("reason", reason.label()),
                ],
            ),
        }
    }

    fn submit_pass(self: &Arc<Self>, key: PassKey, reason: PassReason) {
        self.submit(move |inner| inner.run_pass(&key, reason));
    }

    fn run_pass(self: &Arc<Self>, key: &PassKey, reason: PassReason) {
        let result = self.engine().and_then(|mut engine| engine.run_pass(key));
        if let Ok(mut scheduler) = self.scheduler() {
            scheduler.finish(key);
        }
        match result {
            Ok(Some(outcome)) => {
                self.with_metrics(|metrics| {
                    metrics.record_pass(reason == PassReason::Deferred);
                    metrics.record_reconcile(outcome.created, outcome.reused, outcome.destroyed);
                    if outcome.collision.is_some() {
                        metrics.record_collision();
                    }
                });
                if outcome.anchor_moved {
                    self.follow_anchor(key);
                }
                if let Some(collision) = &outcome.collision {
                    emit(
                        self.config.logger.as_ref(),
                        LogLevel::Info,
                        LAYOUT_TARGET,
                        "collision_resolved",
                        [
                            json_kv("group", key.group.as_str()),
                            json_kv("surface", key.surface.as_str()),
                            json_kv("with", collision.with.as_str()),
                            json_kv("top", collision.pushed_top),
                        ],
                    );
                }
                emit(
                    self.config.logger.as_ref(),
                    LogLevel::Debug,
                    LAYOUT_TARGET,
                    "pass_completed",
                    [
                        json_kv("group", key.group.as_str()),
                        json_kv("surface", key.surface.as_str()),
                        json_kv("reason", reason.label()),
                        json_kv("instances", outcome.instances),
                        json_kv("created", outcome.created),
                        json_kv("reused", outcome.reused),
                        json_kv("destroyed", outcome.destroyed),
                        json_kv("pruned", outcome.pruned),
                    ],
                );
            }
            Ok(None) => emit(
                self.config.logger.as_ref(),
                LogLevel::Trace,
                LAYOUT_TARGET,
                "pass_skipped",
                [
                    json_kv("group", key.group.as_str()),
                    json_kv("surface", key.surface.as_str()),
                ],
            ),
            Err(err) => self.report("pass", Some(key.group.as_str()), Some(key.surface.as_str()), &err),
        }
    }

    /// The anchor is shared by every surface; repack the ones `key` did not cover.
    fn follow_anchor(self: &Arc<Self>, key: &PassKey) {
        let surfaces: Vec<SurfaceId> = match self.engine() {
            Ok(engine) => engine
                .registry
                .get(&key.group)
                .map(|group| {
                    group
                        .per_surface
                        .keys()
                        .filter(|surface| **surface != key.surface)
                        .cloned()
                        .collect()
                })
                .unwrap_or_default(),
            Err(err) => {
                self.report("schedule", Some(key.group.as_str()), None, &err);
                return;
            }
        };
        for surface in surfaces {
            self.request_pass(PassKey::new(key.group.as_str(), surface), PassReason::Anchor);
        }
    }

    fn apply_canvas_event(self: &Arc<Self>, event: CanvasEvent) {
        let object = event.object();
        let effect = self
            .engine()
            .and_then(|mut engine| engine.apply_event(&event));
        match effect {
            Ok(EventEffect::Ignored) => {}
            Ok(EventEffect::Repack(keys)) => {
                for key in keys {
                    self.request_pass(key, PassReason::Moved);
                }
            }
            Ok(EventEffect::Resized) => self.log(
                LogLevel::Debug,
                "size_enforced",
                [json_kv("object", object.id.as_str())],
            ),
            Ok(EventEffect::Recovered { lost, replacement }) => {
                self.with_metrics(SyncMetrics::record_recovery);
                self.log(
                    LogLevel::Warn,
                    "instance_recovered",
                    [
                        json_kv("surface", object.surface.as_str()),
                        json_kv("lost", lost),
                        json_kv("replacement", replacement),
                    ],
                );
            }
            Err(err) => self.report(
                "canvas_event",
                None,
                Some(object.surface.as_str()),
                &err,
            ),
        }
    }
}
