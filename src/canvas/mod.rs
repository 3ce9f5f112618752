//! Canvas collaborator: the external, mutable surface holding visual objects.
//!
//! The engine only talks to the canvas through [`Canvas`]. Edits made by
//! people arrive separately as [`CanvasEvent`]s which the host forwards to
//! the synchronization controller.

mod memory;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::geometry::{Point, Size};
use crate::presence::SurfaceId;

pub use memory::{CanvasOps, MemoryCanvas};

pub type InstanceId = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Layer {
    #[default]
    Map,
    Objects,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VisualObject {
    pub id: InstanceId,
    pub surface: SurfaceId,
    pub name: String,
    pub image_source: String,
    pub position: Point,
    pub size: Size,
    pub layer: Layer,
}

/// Attributes for a visual object that does not exist yet.
#[derive(Debug, Clone, PartialEq)]
pub struct NewVisual {
    pub surface: SurfaceId,
    pub name: String,
    pub image_source: String,
    pub position: Point,
    pub size: Size,
    pub layer: Layer,
}

impl NewVisual {
    /// Same attributes as an existing object, minus its identity.
    pub fn replica_of(object: &VisualObject) -> Self {
        Self {
            surface: object.surface.clone(),
            name: object.name.clone(),
            image_source: object.image_source.clone(),
            position: object.position,
            size: object.size,
            layer: object.layer,
        }
    }
}

/// Notification of an edit someone else made to a visual object.
#[derive(Debug, Clone, PartialEq)]
pub enum CanvasEvent {
    Moved { object: VisualObject, previous: Point },
    Resized { object: VisualObject, previous: Size },
    Destroyed { object: VisualObject },
}

impl CanvasEvent {
    pub fn object(&self) -> &VisualObject {
        match self {
            CanvasEvent::Moved { object, .. }
            | CanvasEvent::Resized { object, .. }
            | CanvasEvent::Destroyed { object } => object,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            CanvasEvent::Moved { .. } => "moved",
            CanvasEvent::Resized { .. } => "resized",
            CanvasEvent::Destroyed { .. } => "destroyed",
        }
    }
}

/// Operations the engine performs on the canvas.
///
/// Implementations must not call back into the engine synchronously from
/// these methods except through `SyncController::handle_canvas_event`,
/// which only enqueues.
pub trait Canvas: Send {
    fn find(&self, id: &str) -> Option<VisualObject>;
    fn find_by_name(&self, surface: &str, name: &str) -> Option<VisualObject>;
    fn objects_on(&self, surface: &str) -> Vec<VisualObject>;
    fn create(&mut self, visual: NewVisual) -> Result<VisualObject>;
    fn destroy(&mut self, id: &str) -> Result<()>;
    fn move_to(&mut self, id: &str, position: Point) -> Result<()>;
    fn resize(&mut self, id: &str, size: Size) -> Result<()>;
    fn to_front(&mut self, id: &str) -> Result<()>;
}
