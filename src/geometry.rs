use serde::{Deserialize, Serialize};

/// Canvas position of an object's centre point.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub left: f64,
    pub top: f64,
}

impl Point {
    pub const fn new(left: f64, top: f64) -> Self {
        Self { left, top }
    }

    /// Clamp both coordinates so neither lies above/left of `border`.
    pub fn clamped(self, border: f64) -> Self {
        Self {
            left: self.left.max(border),
            top: self.top.max(border),
        }
    }
}

/// Width and height of a visual object.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Size {
    pub width: f64,
    pub height: f64,
}

impl Size {
    pub const fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }
}

/// Axis-aligned rectangle enclosing every instance of a group on one surface.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoundingBox {
    pub start_x: f64,
    pub last_x: f64,
    pub start_y: f64,
    pub last_y: f64,
}

impl BoundingBox {
    pub const fn new(start_x: f64, last_x: f64, start_y: f64, last_y: f64) -> Self {
        Self {
            start_x,
            last_x,
            start_y,
            last_y,
        }
    }

    /// Box covering items of `size` centred on every point in `centres`.
    pub fn around(centres: &[Point], size: Size) -> Option<Self> {
        let first = centres.first()?;
        let (mut min_left, mut max_left) = (first.left, first.left);
        let (mut min_top, mut max_top) = (first.top, first.top);
        for p in &centres[1..] {
            min_left = min_left.min(p.left);
            max_left = max_left.max(p.left);
            min_top = min_top.min(p.top);
            max_top = max_top.max(p.top);
        }
        let half_w = size.width / 2.0;
        let half_h = size.height / 2.0;
        Some(Self::new(
            min_left - half_w,
            max_left + half_w,
            min_top - half_h,
            max_top + half_h,
        ))
    }

    pub fn overlaps_x(&self, other: &BoundingBox) -> bool {
        self.start_x < other.last_x && other.start_x < self.last_x
    }

    pub fn overlaps_y(&self, other: &BoundingBox) -> bool {
        self.start_y < other.last_y && other.start_y < self.last_y
    }

    /// Both ranges must overlap; touching edges do not count.
    pub fn intersects(&self, other: &BoundingBox) -> bool {
        self.overlaps_x(other) && self.overlaps_y(other)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn around_uses_extremal_centres() {
        let points = [Point::new(30.0, 30.0), Point::new(90.0, 30.0), Point::new(30.0, 65.0)];
        let bbox = BoundingBox::around(&points, Size::new(30.0, 20.0)).unwrap();
        assert_eq!(bbox, BoundingBox::new(15.0, 105.0, 20.0, 75.0));
    }

    #[test]
    fn around_empty_is_none() {
        assert!(BoundingBox::around(&[], Size::new(1.0, 1.0)).is_none());
    }

    #[test]
    fn intersects_requires_both_axes() {
        let a = BoundingBox::new(0.0, 100.0, 30.0, 80.0);
        let below = BoundingBox::new(0.0, 100.0, 50.0, 90.0);
        let beside = BoundingBox::new(200.0, 300.0, 50.0, 90.0);
        let touching = BoundingBox::new(0.0, 100.0, 80.0, 120.0);
        assert!(a.intersects(&below));
        assert!(!a.intersects(&beside));
        assert!(!a.intersects(&touching));
    }

    #[test]
    fn clamp_respects_border() {
        assert_eq!(Point::new(-4.0, 50.0).clamped(10.0), Point::new(10.0, 50.0));
    }
}
