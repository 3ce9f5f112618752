//! Grid packing and collision resolution for token groups.
//!
//! Both halves are pure: they compute positions and boxes from geometry and
//! leave canvas mutation to the synchronization controller.

pub mod collision;
pub mod grid;

pub use collision::{Collision, Obstacle, find_collision};
pub use grid::{GridSpec, Packing, anchor_for_slot, pack, row_capacity, slot};
