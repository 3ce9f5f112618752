//! Deterministic grid packing.
//!
//! Instances are laid out left to right from the anchor. Row capacity is
//! chosen once per pass from the total instance count:
//!
//! | instances | per row |
//! |-----------|---------|
//! | 1..=5     | all     |
//! | 6..=10    | 5       |
//! | 11+       | 10      |
//!
//! Positions are centre points. The anchor is clamped to the minimum border
//! before packing, so nothing sits above or left of it and no two instances
//! share a position.

use crate::geometry::{BoundingBox, Point, Size};

/// Geometry driving one packing pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridSpec {
    pub anchor: Point,
    pub size: Size,
    pub pitch_x: f64,
    pub pitch_y: f64,
    pub min_border: f64,
}

impl GridSpec {
    pub fn new(anchor: Point, size: Size, pitch: (f64, f64), min_border: f64) -> Self {
        Self {
            anchor,
            size,
            pitch_x: pitch.0,
            pitch_y: pitch.1,
            min_border,
        }
    }

    pub fn with_anchor(mut self, anchor: Point) -> Self {
        self.anchor = anchor;
        self
    }
}

/// Result of a packing pass: one position per instance plus the enclosing box.
#[derive(Debug, Clone, PartialEq)]
pub struct Packing {
    pub positions: Vec<Point>,
    pub bounding_box: Option<BoundingBox>,
}

pub fn row_capacity(count: usize) -> usize {
    if count > 10 {
        10
    } else if count > 5 {
        5
    } else {
        count.max(1)
    }
}

/// `(column, row)` of `index` within a group of `count` instances.
pub fn slot(index: usize, count: usize) -> (usize, usize) {
    let capacity = row_capacity(count);
    (index % capacity, index / capacity)
}

pub fn pack(count: usize, grid: &GridSpec) -> Packing {
    let capacity = row_capacity(count);
    let start = grid.anchor.clamped(grid.min_border);
    let mut positions = Vec::with_capacity(count);
    let mut left = start.left;
    let mut top = start.top;
    let mut on_row = 0usize;

    for _ in 0..count {
        if on_row >= capacity {
            left = start.left;
            top += grid.pitch_y;
            on_row = 0;
        }
        positions.push(Point::new(left, top));
        left += grid.pitch_x;
        on_row += 1;
    }

    let bounding_box = BoundingBox::around(&positions, grid.size);
    Packing {
        positions,
        bounding_box,
    }
}

/// Anchor that places instance `index` (of `count`) at `position`.
pub fn anchor_for_slot(position: Point, index: usize, count: usize, grid: &GridSpec) -> Point {
    let (column, row) = slot(index, count.max(index + 1));
    Point::new(
        position.left - column as f64 * grid.pitch_x,
        position.top - row as f64 * grid.pitch_y,
    )
    .clamped(grid.min_border)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid() -> GridSpec {
        GridSpec::new(Point::new(30.0, 30.0), Size::new(30.0, 30.0), (35.0, 35.0), 10.0)
    }

    fn rows(packing: &Packing) -> Vec<usize> {
        let mut rows: Vec<(f64, usize)> = Vec::new();
        for p in &packing.positions {
            match rows.iter_mut().find(|(top, _)| *top == p.top) {
                Some((_, n)) => *n += 1,
                None => rows.push((p.top, 1)),
            }
        }
        rows.into_iter().map(|(_, n)| n).collect()
    }

    #[test]
    fn test_small_groups_use_one_row() {
        for count in 1..=5 {
            assert_eq!(rows(&pack(count, &grid())), vec![count]);
        }
    }

    #[test]
    fn test_medium_groups_wrap_at_five() {
        assert_eq!(rows(&pack(6, &grid())), vec![5, 1]);
        assert_eq!(rows(&pack(10, &grid())), vec![5, 5]);
    }

    #[test]
    fn test_large_groups_wrap_at_ten() {
        assert_eq!(rows(&pack(11, &grid())), vec![10, 1]);
        assert_eq!(rows(&pack(16, &grid())), vec![10, 6]);
        assert_eq!(rows(&pack(25, &grid())), vec![10, 10, 5]);
    }

    #[test]
    fn test_first_instance_sits_on_anchor() {
        let packing = pack(7, &grid());
        assert_eq!(packing.positions[0], Point::new(30.0, 30.0));
        assert_eq!(packing.positions[4], Point::new(170.0, 30.0));
        assert_eq!(packing.positions[5], Point::new(30.0, 65.0));
    }

    #[test]
    fn test_packing_is_idempotent() {
        let g = grid();
        assert_eq!(pack(13, &g), pack(13, &g));
    }

    #[test]
    fn test_positions_clamp_to_border() {
        let g = grid().with_anchor(Point::new(-50.0, 2.0));
        let packing = pack(3, &g);
        assert_eq!(
            packing.positions,
            vec![
                Point::new(10.0, 10.0),
                Point::new(45.0, 10.0),
                Point::new(80.0, 10.0),
            ]
        );
    }

    #[test]
    fn test_bounding_box_spans_extremal_centres() {
        let packing = pack(6, &grid());
        let bbox = packing.bounding_box.unwrap();
        assert_eq!(bbox, BoundingBox::new(15.0, 185.0, 15.0, 80.0));
        assert!(pack(0, &grid()).bounding_box.is_none());
    }

    #[test]
    fn test_anchor_for_slot_inverts_packing() {
        let g = grid();
        let packing = pack(8, &g);
        for (index, position) in packing.positions.iter().enumerate() {
            assert_eq!(anchor_for_slot(*position, index, 8, &g), g.anchor);
        }
    }
}
