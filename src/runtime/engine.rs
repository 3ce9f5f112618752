//! Layout state touched only from inside gate tasks.

use std::collections::BTreeMap;

use crate::canvas::{Canvas, CanvasEvent, InstanceId, Layer, NewVisual, VisualObject};
use crate::error::{CounterTokenError, Result};
use crate::geometry::{BoundingBox, Point, Size};
use crate::layout::{Collision, GridSpec, Obstacle, anchor_for_slot, find_collision, pack};
use crate::observer::ObserverId;
use crate::registry::{LifecycleState, SurfaceState, TokenDefaults, TokenGroup, TokenRegistry};

use super::scheduler::PassKey;

/// What one packing pass did to a group on a surface.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PassOutcome {
    pub instances: usize,
    pub pruned: usize,
    pub created: usize,
    pub reused: usize,
    pub destroyed: usize,
    pub bounding_box: Option<BoundingBox>,
    pub collision: Option<Collision>,
    /// The shared group anchor changed during this pass.
    pub anchor_moved: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum EventEffect {
    Ignored,
    /// Passes to run, the edited surface first.
    Repack(Vec<PassKey>),
    Resized,
    Recovered { lost: InstanceId, replacement: InstanceId },
}

/// Partial geometry update for an existing group.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct GroupGeometry {
    pub size: Option<Size>,
    pub spacing: Option<(f64, f64)>,
    pub anchor: Option<Point>,
}

impl GroupGeometry {
    fn validate(&self) -> Result<()> {
        if let Some(size) = self.size {
            if !(size.width > 0.0 && size.height > 0.0) {
                return Err(CounterTokenError::invalid("token size must be positive"));
            }
        }
        if let Some((x, y)) = self.spacing {
            if !(x >= 0.0 && y >= 0.0) {
                return Err(CounterTokenError::invalid("token spacing must not be negative"));
            }
        }
        Ok(())
    }
}

/// Listed instances sorted by the index in their names.
struct SlotPlan {
    slots: Vec<Option<InstanceId>>,
    strays: Vec<InstanceId>,
}

pub(crate) struct Engine {
    pub(crate) registry: TokenRegistry,
    canvas: Box<dyn Canvas>,
    /// Counter change subscription per attached group and surface.
    pub(crate) watchers: BTreeMap<PassKey, ObserverId>,
    /// Counter removal subscription per group.
    pub(crate) removal_watchers: BTreeMap<String, ObserverId>,
    pub(crate) defaults: TokenDefaults,
    min_border: f64,
}

impl Engine {
    pub(crate) fn new(canvas: Box<dyn Canvas>, defaults: TokenDefaults, min_border: f64) -> Self {
        Self {
            registry: TokenRegistry::new(),
            canvas,
            watchers: BTreeMap::new(),
            removal_watchers: BTreeMap::new(),
            defaults,
            min_border,
        }
    }

    pub(crate) fn canvas(&mut self) -> &mut dyn Canvas {
        self.canvas.as_mut()
    }

    fn grid_for(&self, group: &TokenGroup) -> GridSpec {
        GridSpec::new(group.anchor, group.size(), group.pitch(), self.min_border)
    }

    /// Ensure `group` has state on `surface`, dropping ids the canvas no
    /// longer holds. Returns how many ids were pruned.
    pub(crate) fn attach(&mut self, group: &str, surface: &str) -> Result<usize> {
        let entry = self
            .registry
            .require_mut(group)?
            .per_surface
            .entry(surface.to_string())
            .or_default();
        let before = entry.instance_ids.len();
        let canvas = &self.canvas;
        entry.instance_ids.retain(|id| canvas.find(id).is_some());
        Ok(before - entry.instance_ids.len())
    }

    /// Destroy the group's instances on `surface` and forget the surface.
    pub(crate) fn detach(&mut self, group: &str, surface: &str) -> Result<usize> {
        let Some(state) = self.registry.require_mut(group)?.per_surface.remove(surface) else {
            return Ok(0);
        };
        self.destroy_all(&state.instance_ids)
    }

    /// Destroy every instance of `group` on every surface.
    pub(crate) fn clear_group(&mut self, group: &str) -> Result<usize> {
        let surfaces = std::mem::take(&mut self.registry.require_mut(group)?.per_surface);
        let mut destroyed = 0;
        for state in surfaces.values() {
            destroyed += self.destroy_all(&state.instance_ids)?;
        }
        Ok(destroyed)
    }

    fn destroy_all(&mut self, ids: &[InstanceId]) -> Result<usize> {
        let mut destroyed = 0;
        for id in ids.iter().rev() {
            if self.canvas.find(id).is_some() {
                self.canvas.destroy(id)?;
                destroyed += 1;
            }
        }
        Ok(destroyed)
    }

    pub(crate) fn observe_value(&mut self, group: &str, value: u64) {
        if let Some(group) = self.registry.get_mut(group) {
            group.observed_value = Some(value);
        }
    }

    /// Reconcile, pack, resolve one collision and record the result.
    ///
    /// `Ok(None)` means there was nothing to do: the group is gone, being
    /// removed, or not attached to the surface.
    pub(crate) fn run_pass(&mut self, key: &PassKey) -> Result<Option<PassOutcome>> {
        let Some(group) = self.registry.get(&key.group) else {
            return Ok(None);
        };
        if group.is_removing() {
            return Ok(None);
        }
        let Some(state) = group.surface(&key.surface) else {
            return Ok(None);
        };
        let listed = state.instance_ids.clone();
        let group = group.clone();
        let mut outcome = PassOutcome::default();

        let plan = self.slots_by_name(&group, &listed, &mut outcome);
        // Without a known value the group keeps the size it was listed with.
        let target = match group.observed_value {
            Some(value) => usize::try_from(value).unwrap_or(usize::MAX),
            None => listed.len(),
        };
        let mut ids = Vec::new();
        let reconciled = self.reconcile(&group, &key.surface, plan, target, &mut ids, &mut outcome);
        if let Some(state) = self.surface_state_mut(key) {
            state.instance_ids = ids.clone();
        }
        reconciled?;

        let grid = self.grid_for(&group);
        let mut anchor = group.anchor.clamped(self.min_border);
        let mut packing = pack(ids.len(), &grid.with_anchor(anchor));
        if let Some(bbox) = packing.bounding_box {
            let obstacles = self.obstacles(key);
            if let Some(collision) = find_collision(&bbox, group.height, group.spacing_y, obstacles)
            {
                anchor = Point::new(anchor.left, collision.pushed_top).clamped(self.min_border);
                packing = pack(ids.len(), &grid.with_anchor(anchor));
                outcome.collision = Some(collision);
            }
        }

        for (id, position) in ids.iter().zip(&packing.positions) {
            self.canvas.move_to(id, *position)?;
        }

        if let Some(stored) = self.registry.get_mut(&key.group) {
            stored.anchor = anchor;
            if let Some(state) = stored.surface_mut(&key.surface) {
                state.bounding_box = packing.bounding_box;
            }
        }
        outcome.anchor_moved = anchor != group.anchor;
        outcome.instances = ids.len();
        outcome.bounding_box = packing.bounding_box;
        Ok(Some(outcome))
    }

    fn surface_state_mut(&mut self, key: &PassKey) -> Option<&mut SurfaceState> {
        self.registry
            .get_mut(&key.group)
            .and_then(|group| group.surface_mut(&key.surface))
    }

    /// Surviving instances placed at the index their name carries. Ids the
    /// canvas no longer holds are pruned; ids whose name carries no free
    /// index are returned as strays.
    fn slots_by_name(
        &self,
        group: &TokenGroup,
        listed: &[InstanceId],
        outcome: &mut PassOutcome,
    ) -> SlotPlan {
        let mut slots: Vec<Option<InstanceId>> = vec![None; listed.len()];
        let mut strays = Vec::new();
        for id in listed {
            let Some(object) = self.canvas.find(id) else {
                outcome.pruned += 1;
                continue;
            };
            match group.instance_index(&object.name) {
                Some(index) if slots.get(index).is_some_and(Option::is_none) => {
                    slots[index] = Some(object.id);
                }
                _ => strays.push(object.id),
            }
        }
        SlotPlan { slots, strays }
    }

    /// Bring the slots to `target` instances whose names match their index:
    /// strays and excess instances (highest index first) are destroyed, gaps
    /// are filled by reuse or creation.
    fn reconcile(
        &mut self,
        group: &TokenGroup,
        surface: &str,
        plan: SlotPlan,
        target: usize,
        ids: &mut Vec<InstanceId>,
        outcome: &mut PassOutcome,
    ) -> Result<()> {
        let SlotPlan { mut slots, strays } = plan;
        for id in strays.iter().rev() {
            self.canvas.destroy(id)?;
            outcome.destroyed += 1;
        }
        while slots.len() > target {
            if let Some(Some(id)) = slots.pop() {
                self.canvas.destroy(&id)?;
                outcome.destroyed += 1;
            }
        }
        slots.resize(target, None);

        for (index, slot) in slots.into_iter().enumerate() {
            let id = match slot {
                Some(id) => id,
                None => self.fill_slot(group, surface, index, ids, outcome)?,
            };
            ids.push(id);
        }
        Ok(())
    }

    fn fill_slot(
        &mut self,
        group: &TokenGroup,
        surface: &str,
        index: usize,
        taken: &[InstanceId],
        outcome: &mut PassOutcome,
    ) -> Result<InstanceId> {
        let name = group.instance_name(index);
        let existing = self
            .canvas
            .find_by_name(surface, &name)
            .filter(|object| !taken.contains(&object.id));
        if let Some(object) = existing {
            if object.size != group.size() {
                self.canvas.resize(&object.id, group.size())?;
            }
            outcome.reused += 1;
            return Ok(object.id);
        }
        let object = self.canvas.create(NewVisual {
            surface: surface.to_string(),
            name,
            image_source: group.image_source.clone(),
            position: group.anchor.clamped(self.min_border),
            size: group.size(),
            layer: Layer::Map,
        })?;
        self.canvas.to_front(&object.id)?;
        outcome.created += 1;
        Ok(object.id)
    }

    /// Other groups' boxes on the surface, in registration order.
    fn obstacles(&self, key: &PassKey) -> Vec<Obstacle> {
        self.registry
            .in_order()
            .into_iter()
            .filter(|group| group.name != key.group && !group.is_removing())
            .filter_map(|group| {
                let bbox = group.surface(&key.surface)?.bounding_box?;
                Some(Obstacle {
                    group: group.name.clone(),
                    bounding_box: bbox,
                    item_height: group.height,
                    spacing_y: group.spacing_y,
                })
            })
            .collect()
    }

    /// Group listing `object` as one of its instances, and the object's grid index.
    fn owner_of(&self, object: &VisualObject) -> Option<(&TokenGroup, usize)> {
        self.registry.in_order().into_iter().find_map(|group| {
            group.instance_index(&object.name)?;
            let index = group
                .surface(&object.surface)?
                .instance_ids
                .iter()
                .position(|id| *id == object.id)?;
            Some((group, index))
        })
    }

    pub(crate) fn apply_event(&mut self, event: &CanvasEvent) -> Result<EventEffect> {
        let object = event.object();
        let Some((group, index)) = self.owner_of(object) else {
            return Ok(EventEffect::Ignored);
        };
        if group.is_removing() {
            return Ok(EventEffect::Ignored);
        }
        let name = group.name.clone();

        match event {
            CanvasEvent::Moved { previous, .. } => {
                if object.position == *previous {
                    return Ok(EventEffect::Ignored);
                }
                let count = group
                    .surface(&object.surface)
                    .map_or(index + 1, |state| state.instance_ids.len());
                let anchor = anchor_for_slot(object.position, index, count, &self.grid_for(group));
                let mut keys = vec![PassKey::new(name.as_str(), object.surface.as_str())];
                keys.extend(
                    group
                        .per_surface
                        .keys()
                        .filter(|surface| **surface != object.surface)
                        .map(|surface| PassKey::new(name.as_str(), surface.as_str())),
                );
                self.registry.require_mut(&name)?.anchor = anchor;
                Ok(EventEffect::Repack(keys))
            }
            CanvasEvent::Resized { .. } => {
                let size = group.size();
                if object.size == size {
                    return Ok(EventEffect::Ignored);
                }
                self.canvas.resize(&object.id, size)?;
                Ok(EventEffect::Resized)
            }
            CanvasEvent::Destroyed { .. } => {
                let replacement = self.canvas.create(NewVisual::replica_of(object))?;
                self.canvas.to_front(&replacement.id)?;
                let key = PassKey::new(name, object.surface.clone());
                if let Some(slot) = self
                    .surface_state_mut(&key)
                    .and_then(|state| state.instance_ids.get_mut(index))
                {
                    *slot = replacement.id.clone();
                }
                Ok(EventEffect::Recovered {
                    lost: object.id.clone(),
                    replacement: replacement.id,
                })
            }
        }
    }

    /// Update geometry and resize live instances. Returns the attached surfaces.
    pub(crate) fn set_geometry(&mut self, name: &str, geometry: GroupGeometry) -> Result<Vec<String>> {
        geometry.validate()?;
        let group = self.registry.require_mut(name)?;
        if group.is_removing() {
            return Err(CounterTokenError::group_not_found(name));
        }
        if let Some(size) = geometry.size {
            group.width = size.width;
            group.height = size.height;
        }
        if let Some((x, y)) = geometry.spacing {
            group.spacing_x = x;
            group.spacing_y = y;
        }
        if let Some(anchor) = geometry.anchor {
            group.anchor = anchor;
        }
        let size = group.size();
        let surfaces: Vec<String> = group.per_surface.keys().cloned().collect();
        let ids: Vec<InstanceId> = group
            .per_surface
            .values()
            .flat_map(|state| state.instance_ids.iter().cloned())
            .collect();
        for id in ids {
            if self.canvas.find(&id).is_some_and(|object| object.size != size) {
                self.canvas.resize(&id, size)?;
            }
        }
        Ok(surfaces)
    }

    pub(crate) fn mark_removing(&mut self, name: &str) -> Result<()> {
        self.registry.require_mut(name)?.lifecycle_state = LifecycleState::Removing;
        Ok(())
    }

    /// Change subscriptions belonging to `group`, removed from the table.
    pub(crate) fn take_watchers(&mut self, group: &str) -> Vec<ObserverId> {
        let keys: Vec<PassKey> = self
            .watchers
            .keys()
            .filter(|key| key.group == group)
            .cloned()
            .collect();
        keys.iter()
            .filter_map(|key| self.watchers.remove(key))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::MemoryCanvas;
    use crate::registry::TokenGroupSpec;

    fn engine_with(canvas: &MemoryCanvas, groups: &[&str]) -> Engine {
        let mut engine = Engine::new(Box::new(canvas.clone()), TokenDefaults::default(), 10.0);
        for name in groups {
            engine
                .registry
                .create(TokenGroupSpec::new(*name, "hp", "coin.png"), &TokenDefaults::default())
                .unwrap();
            engine.attach(name, "page").unwrap();
        }
        engine
    }

    fn ids(engine: &Engine, group: &str) -> Vec<InstanceId> {
        engine
            .registry
            .get(group)
            .unwrap()
            .surface("page")
            .unwrap()
            .instance_ids
            .clone()
    }

    #[test]
    fn pass_creates_and_destroys_to_match_value() {
        let canvas = MemoryCanvas::new();
        let mut engine = engine_with(&canvas, &["hp-token"]);
        let key = PassKey::new("hp-token", "page");

        engine.observe_value("hp-token", 4);
        let outcome = engine.run_pass(&key).unwrap().unwrap();
        assert_eq!((outcome.created, outcome.instances), (4, 4));
        let names: Vec<String> = canvas
            .named_on("page", "hp-token")
            .into_iter()
            .map(|o| o.name)
            .collect();
        assert_eq!(names, vec!["hp-token 0", "hp-token 1", "hp-token 2", "hp-token 3"]);

        let first = ids(&engine, "hp-token");
        engine.observe_value("hp-token", 2);
        let outcome = engine.run_pass(&key).unwrap().unwrap();
        assert_eq!(outcome.destroyed, 2);
        assert_eq!(ids(&engine, "hp-token"), first[..2].to_vec());
        assert_eq!(canvas.len(), 2);
    }

    #[test]
    fn pass_reuses_objects_with_expected_names() {
        let canvas = MemoryCanvas::new();
        let stray = canvas
            .place(NewVisual {
                surface: "page".to_string(),
                name: "hp-token 0".to_string(),
                image_source: "coin.png".to_string(),
                position: Point::new(400.0, 400.0),
                size: Size::new(30.0, 30.0),
                layer: Layer::Map,
            })
            .unwrap();
        let mut engine = engine_with(&canvas, &["hp-token"]);
        engine.observe_value("hp-token", 2);
        let outcome = engine
            .run_pass(&PassKey::new("hp-token", "page"))
            .unwrap()
            .unwrap();
        assert_eq!((outcome.reused, outcome.created), (1, 1));
        assert_eq!(ids(&engine, "hp-token")[0], stray.id);
        assert_eq!(canvas.find(&stray.id).unwrap().position, Point::new(30.0, 30.0));
    }

    #[test]
    fn pass_refills_a_missing_middle_instance_under_its_own_name() {
        let canvas = MemoryCanvas::new();
        let mut engine = engine_with(&canvas, &["g"]);
        let key = PassKey::new("g", "page");
        engine.observe_value("g", 3);
        engine.run_pass(&key).unwrap();
        let before = ids(&engine, "g");
        canvas.user_destroy(&before[1]).unwrap();

        let outcome = engine.run_pass(&key).unwrap().unwrap();
        assert_eq!((outcome.pruned, outcome.created), (1, 1));
        let after = ids(&engine, "g");
        assert_eq!((&after[0], &after[2]), (&before[0], &before[2]));
        let names: Vec<String> = after.iter().map(|id| canvas.find(id).unwrap().name).collect();
        assert_eq!(names, vec!["g 0", "g 1", "g 2"]);
        assert_eq!(canvas.len(), 3);
    }

    #[test]
    fn duplicate_listed_names_are_destroyed() {
        let canvas = MemoryCanvas::new();
        let mut engine = engine_with(&canvas, &["g"]);
        let key = PassKey::new("g", "page");
        engine.observe_value("g", 2);
        engine.run_pass(&key).unwrap();
        let twin = canvas
            .place(NewVisual {
                surface: "page".to_string(),
                name: "g 1".to_string(),
                image_source: "coin.png".to_string(),
                position: Point::new(90.0, 90.0),
                size: Size::new(30.0, 30.0),
                layer: Layer::Map,
            })
            .unwrap();
        engine
            .registry
            .get_mut("g")
            .unwrap()
            .surface_mut("page")
            .unwrap()
            .instance_ids
            .push(twin.id.clone());

        let outcome = engine.run_pass(&key).unwrap().unwrap();
        assert_eq!(outcome.destroyed, 1);
        assert!(canvas.find(&twin.id).is_none());
        assert_eq!(ids(&engine, "g").len(), 2);
        assert_eq!(canvas.len(), 2);
    }

    #[test]
    fn pass_without_observed_value_only_repacks() {
        let canvas = MemoryCanvas::new();
        let mut engine = engine_with(&canvas, &["hp-token"]);
        let outcome = engine
            .run_pass(&PassKey::new("hp-token", "page"))
            .unwrap()
            .unwrap();
        assert_eq!(outcome.instances, 0);
        assert!(outcome.bounding_box.is_none());
    }

    #[test]
    fn pass_skips_detached_and_removing_groups() {
        let canvas = MemoryCanvas::new();
        let mut engine = engine_with(&canvas, &["a"]);
        assert!(engine.run_pass(&PassKey::new("a", "elsewhere")).unwrap().is_none());
        assert!(engine.run_pass(&PassKey::new("missing", "page")).unwrap().is_none());
        engine.mark_removing("a").unwrap();
        assert!(engine.run_pass(&PassKey::new("a", "page")).unwrap().is_none());
    }

    #[test]
    fn overlapping_group_is_pushed_below() {
        let canvas = MemoryCanvas::new();
        let mut engine = engine_with(&canvas, &["first", "second"]);
        engine.observe_value("first", 3);
        engine.observe_value("second", 2);
        let settled = engine.run_pass(&PassKey::new("first", "page")).unwrap().unwrap();
        assert!(!settled.anchor_moved);
        let outcome = engine
            .run_pass(&PassKey::new("second", "page"))
            .unwrap()
            .unwrap();

        let collision = outcome.collision.unwrap();
        assert_eq!(collision.with, "first");
        assert!(outcome.anchor_moved);
        // first spans 15..45 vertically; push = 45 + 30 + 5
        assert_eq!(engine.registry.get("second").unwrap().anchor.top, 80.0);
        let moved = outcome.bounding_box.unwrap();
        let first = engine.registry.get("first").unwrap().surface("page").unwrap().bounding_box.unwrap();
        assert!(!moved.intersects(&first));
    }

    #[test]
    fn moved_instance_reanchors_its_group() {
        let canvas = MemoryCanvas::new();
        let mut engine = engine_with(&canvas, &["g"]);
        engine.observe_value("g", 3);
        engine.run_pass(&PassKey::new("g", "page")).unwrap();
        let second = ids(&engine, "g")[1].clone();

        let event = canvas.user_move(&second, Point::new(200.0, 100.0)).unwrap();
        let effect = engine.apply_event(&event).unwrap();
        assert_eq!(effect, EventEffect::Repack(vec![PassKey::new("g", "page")]));
        assert_eq!(engine.registry.get("g").unwrap().anchor, Point::new(165.0, 100.0));
    }

    #[test]
    fn destroyed_instance_is_recreated_in_place() {
        let canvas = MemoryCanvas::new();
        let mut engine = engine_with(&canvas, &["g"]);
        engine.observe_value("g", 2);
        engine.run_pass(&PassKey::new("g", "page")).unwrap();
        let lost = ids(&engine, "g")[0].clone();

        let event = canvas.user_destroy(&lost).unwrap();
        let EventEffect::Recovered { replacement, .. } = engine.apply_event(&event).unwrap() else {
            panic!("expected recovery");
        };
        assert_eq!(ids(&engine, "g")[0], replacement);
        assert_eq!(canvas.find(&replacement).unwrap().name, "g 0");
    }

    #[test]
    fn foreign_objects_are_ignored() {
        let canvas = MemoryCanvas::new();
        let mut engine = engine_with(&canvas, &["g"]);
        let other = canvas
            .place(NewVisual {
                surface: "page".to_string(),
                name: "g 0".to_string(),
                image_source: "x".to_string(),
                position: Point::new(50.0, 50.0),
                size: Size::new(10.0, 10.0),
                layer: Layer::Objects,
            })
            .unwrap();
        let event = canvas.user_resize(&other.id, Size::new(90.0, 90.0)).unwrap();
        assert_eq!(engine.apply_event(&event).unwrap(), EventEffect::Ignored);
    }
}
