use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::error::{CounterTokenError, Result};
use crate::geometry::{Point, Size};

use super::{Canvas, CanvasEvent, InstanceId, NewVisual, VisualObject};

/// Tally of engine-issued canvas operations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CanvasOps {
    pub created: u64,
    pub destroyed: u64,
    pub moved: u64,
    pub resized: u64,
}

#[derive(Default)]
struct CanvasState {
    objects: BTreeMap<InstanceId, VisualObject>,
    z_order: Vec<InstanceId>,
    next_id: u64,
    ops: CanvasOps,
}

impl CanvasState {
    fn allocate_id(&mut self) -> InstanceId {
        self.next_id += 1;
        format!("obj-{:05}", self.next_id)
    }

    fn insert(&mut self, visual: NewVisual) -> VisualObject {
        let id = self.allocate_id();
        let object = VisualObject {
            id: id.clone(),
            surface: visual.surface,
            name: visual.name,
            image_source: visual.image_source,
            position: visual.position,
            size: visual.size,
            layer: visual.layer,
        };
        self.objects.insert(id.clone(), object.clone());
        self.z_order.push(id);
        object
    }

    fn get_mut(&mut self, id: &str) -> Result<&mut VisualObject> {
        self.objects
            .get_mut(id)
            .ok_or_else(|| missing(id))
    }

    fn take(&mut self, id: &str) -> Result<VisualObject> {
        let object = self.objects.remove(id).ok_or_else(|| missing(id))?;
        self.z_order.retain(|entry| entry != id);
        Ok(object)
    }
}

fn missing(id: &str) -> CounterTokenError {
    CounterTokenError::ExternalStateInconsistent(format!("object {id} is not on the canvas"))
}

/// In-memory canvas. Clones share the same objects, so a host or test can
/// keep a handle while the engine owns another.
#[derive(Clone, Default)]
pub struct MemoryCanvas {
    state: Arc<Mutex<CanvasState>>,
}

impl MemoryCanvas {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, CanvasState>> {
        self.state
            .lock()
            .map_err(|_| CounterTokenError::Poisoned("memory canvas"))
    }

    /// Place an object as a person would; no notification is produced.
    pub fn place(&self, visual: NewVisual) -> Result<VisualObject> {
        Ok(self.lock()?.insert(visual))
    }

    pub fn user_move(&self, id: &str, position: Point) -> Result<CanvasEvent> {
        let mut state = self.lock()?;
        let object = state.get_mut(id)?;
        let previous = object.position;
        object.position = position;
        Ok(CanvasEvent::Moved {
            object: object.clone(),
            previous,
        })
    }

    pub fn user_resize(&self, id: &str, size: Size) -> Result<CanvasEvent> {
        let mut state = self.lock()?;
        let object = state.get_mut(id)?;
        let previous = object.size;
        object.size = size;
        Ok(CanvasEvent::Resized {
            object: object.clone(),
            previous,
        })
    }

    pub fn user_destroy(&self, id: &str) -> Result<CanvasEvent> {
        let object = self.lock()?.take(id)?;
        Ok(CanvasEvent::Destroyed { object })
    }

    pub fn ops(&self) -> CanvasOps {
        self.lock().map(|state| state.ops).unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.lock().map(|state| state.objects.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Objects on a surface whose name starts with `prefix`, ordered by name
    /// suffix index where present.
    pub fn named_on(&self, surface: &str, prefix: &str) -> Vec<VisualObject> {
        let mut objects: Vec<VisualObject> = self
            .objects_on(surface)
            .into_iter()
            .filter(|object| object.name.starts_with(prefix))
            .collect();
        objects.sort_by_key(|object| {
            object
                .name
                .rsplit(' ')
                .next()
                .and_then(|suffix| suffix.parse::<u64>().ok())
                .unwrap_or(u64::MAX)
        });
        objects
    }

    /// Front-most object id on a surface.
    pub fn topmost(&self, surface: &str) -> Option<InstanceId> {
        let state = self.lock().ok()?;
        let found = state
            .z_order
            .iter()
            .rev()
            .find(|id| {
                state
                    .objects
                    .get(*id)
                    .is_some_and(|object| object.surface == surface)
            })
            .cloned();
        found
    }
}

impl Canvas for MemoryCanvas {
    fn find(&self, id: &str) -> Option<VisualObject> {
        self.lock().ok()?.objects.get(id).cloned()
    }

    fn find_by_name(&self, surface: &str, name: &str) -> Option<VisualObject> {
        self.lock()
            .ok()?
            .objects
            .values()
            .find(|object| object.surface == surface && object.name == name)
            .cloned()
    }

    fn objects_on(&self, surface: &str) -> Vec<VisualObject> {
        self.lock()
            .map(|state| {
                state
                    .objects
                    .values()
                    .filter(|object| object.surface == surface)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    fn create(&mut self, visual: NewVisual) -> Result<VisualObject> {
        let mut state = self.lock()?;
        state.ops.created += 1;
        Ok(state.insert(visual))
    }

    fn destroy(&mut self, id: &str) -> Result<()> {
        let mut state = self.lock()?;
        state.take(id)?;
        state.ops.destroyed += 1;
        Ok(())
    }

    fn move_to(&mut self, id: &str, position: Point) -> Result<()> {
        let mut state = self.lock()?;
        state.get_mut(id)?.position = position;
        state.ops.moved += 1;
        Ok(())
    }

    fn resize(&mut self, id: &str, size: Size) -> Result<()> {
        let mut state = self.lock()?;
        state.get_mut(id)?.size = size;
        state.ops.resized += 1;
        Ok(())
    }

    fn to_front(&mut self, id: &str) -> Result<()> {
        let mut state = self.lock()?;
        if !state.objects.contains_key(id) {
            return Err(missing(id));
        }
        state.z_order.retain(|entry| entry != id);
        state.z_order.push(id.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::Layer;

    fn visual(name: &str) -> NewVisual {
        NewVisual {
            surface: "main".to_string(),
            name: name.to_string(),
            image_source: "img".to_string(),
            position: Point::new(30.0, 30.0),
            size: Size::new(30.0, 30.0),
            layer: Layer::Map,
        }
    }

    #[test]
    fn clones_share_objects() {
        let canvas = MemoryCanvas::new();
        let mut engine_side = canvas.clone();
        let object = engine_side.create(visual("coin 0")).unwrap();
        assert_eq!(canvas.find(&object.id).unwrap().name, "coin 0");
        assert_eq!(canvas.ops().created, 1);
    }

    #[test]
    fn user_edits_report_previous_geometry() {
        let canvas = MemoryCanvas::new();
        let object = canvas.place(visual("coin 0")).unwrap();
        let event = canvas.user_move(&object.id, Point::new(90.0, 40.0)).unwrap();
        match event {
            CanvasEvent::Moved { object, previous } => {
                assert_eq!(previous, Point::new(30.0, 30.0));
                assert_eq!(object.position, Point::new(90.0, 40.0));
            }
            other => panic!("unexpected event {other:?}"),
        }
        assert_eq!(canvas.ops(), CanvasOps::default());
    }

    #[test]
    fn missing_objects_are_external_inconsistency() {
        let mut canvas = MemoryCanvas::new();
        assert!(matches!(
            canvas.move_to("nope", Point::default()),
            Err(CounterTokenError::ExternalStateInconsistent(_))
        ));
    }

    #[test]
    fn to_front_reorders() {
        let mut canvas = MemoryCanvas::new();
        let a = canvas.create(visual("coin 0")).unwrap();
        let b = canvas.create(visual("coin 1")).unwrap();
        assert_eq!(canvas.topmost("main"), Some(b.id.clone()));
        canvas.to_front(&a.id).unwrap();
        assert_eq!(canvas.topmost("main"), Some(a.id));
    }

    #[test]
    fn named_on_orders_by_index() {
        let canvas = MemoryCanvas::new();
        for name in ["coin 10", "coin 2", "other 0", "coin 0"] {
            canvas.place(visual(name)).unwrap();
        }
        let names: Vec<String> = canvas
            .named_on("main", "coin ")
            .into_iter()
            .map(|object| object.name)
            .collect();
        assert_eq!(names, vec!["coin 0", "coin 2", "coin 10"]);
    }
}
