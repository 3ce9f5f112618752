//! Single-step collision resolution between token groups on one surface.

use crate::geometry::BoundingBox;

/// Another group's last recorded footprint on the surface being checked.
#[derive(Debug, Clone, PartialEq)]
pub struct Obstacle {
    pub group: String,
    pub bounding_box: BoundingBox,
    pub item_height: f64,
    pub spacing_y: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Collision {
    pub with: String,
    /// Top-row anchor that moves the checked group clear of `with`.
    pub pushed_top: f64,
}

/// First obstacle (in the order given) overlapping `moved` on both axes.
///
/// Callers pass obstacles in registration order and leave out the moved
/// group itself, groups being removed and groups with no box on the surface.
pub fn find_collision<I>(
    moved: &BoundingBox,
    item_height: f64,
    spacing_y: f64,
    obstacles: I,
) -> Option<Collision>
where
    I: IntoIterator<Item = Obstacle>,
{
    obstacles
        .into_iter()
        .find(|obstacle| moved.intersects(&obstacle.bounding_box))
        .map(|obstacle| Collision {
            pushed_top: obstacle.bounding_box.last_y
                + item_height.max(obstacle.item_height)
                + spacing_y.max(obstacle.spacing_y),
            with: obstacle.group,
        })
}
