//! Geometry in the accessibility / window-server coordinate space: top-left
//! origin on the primary screen, y grows downwards.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const fn new(x: f64, y: f64) -> Self { Self { x, y } }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Size {
    pub width: f64,
    pub height: f64,
}

impl Size {
    pub const fn new(width: f64, height: f64) -> Self { Self { width, height } }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub origin: Point,
    pub size: Size,
}

impl Rect {
    pub const fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            origin: Point::new(x, y),
            size: Size::new(width, height),
        }
    }

    pub fn from_parts(origin: Point, size: Size) -> Self { Self { origin, size } }

    pub fn min_x(&self) -> f64 { self.origin.x }

    pub fn min_y(&self) -> f64 { self.origin.y }

    pub fn max_x(&self) -> f64 { self.origin.x + self.size.width }

    pub fn max_y(&self) -> f64 { self.origin.y + self.size.height }

    pub fn area(&self) -> f64 { self.size.width.max(0.0) * self.size.height.max(0.0) }

    pub fn center(&self) -> Point {
        Point::new(
            self.origin.x + self.size.width / 2.0,
            self.origin.y + self.size.height / 2.0,
        )
    }

    /// The same size, translated so its center lands on `center`.
    pub fn centered_at(&self, center: Point) -> Rect {
        Rect::from_parts(
            Point::new(
                center.x - self.size.width / 2.0,
                center.y - self.size.height / 2.0,
            ),
            self.size,
        )
    }

    pub fn contains(&self, point: Point) -> bool {
        point.x >= self.min_x()
            && point.x < self.max_x()
            && point.y >= self.min_y()
            && point.y < self.max_y()
    }

    /// Area of the overlap between the two rectangles, zero when disjoint.
    pub fn intersection_area(&self, other: &Rect) -> f64 {
        let w = self.max_x().min(other.max_x()) - self.min_x().max(other.min_x());
        let h = self.max_y().min(other.max_y()) - self.min_y().max(other.min_y());
        if w <= 0.0 || h <= 0.0 { 0.0 } else { w * h }
    }

    /// Every edge of `other` lies within `tolerance` of the matching edge here.
    pub fn same_as_within(&self, other: &Rect, tolerance: f64) -> bool {
        (self.origin.x - other.origin.x).abs() <= tolerance
            && (self.origin.y - other.origin.y).abs() <= tolerance
            && (self.size.width - other.size.width).abs() <= tolerance
            && (self.size.height - other.size.height).abs() <= tolerance
    }

    /// Sum of the absolute position and size differences.
    pub fn aggregate_error(&self, other: &Rect) -> f64 {
        self.position_error(other)
            + (self.size.width - other.size.width).abs()
            + (self.size.height - other.size.height).abs()
    }

    pub fn position_error(&self, other: &Rect) -> f64 {
        (self.origin.x - other.origin.x).abs() + (self.origin.y - other.origin.y).abs()
    }

    pub fn at_least(&self, width: f64, height: f64) -> bool {
        self.size.width > width && self.size.height > height
    }
}

#[cfg(target_os = "macos")]
mod cg {
    use objc2_core_foundation::{CGPoint, CGRect, CGSize};

    use super::{Point, Rect, Size};

    impl From<CGRect> for Rect {
        fn from(rect: CGRect) -> Self {
            Rect::new(rect.origin.x, rect.origin.y, rect.size.width, rect.size.height)
        }
    }

    impl From<Rect> for CGRect {
        fn from(rect: Rect) -> Self {
            CGRect::new(
                CGPoint::new(rect.origin.x, rect.origin.y),
                CGSize::new(rect.size.width, rect.size.height),
            )
        }
    }

    impl From<Point> for CGPoint {
        fn from(point: Point) -> Self { CGPoint::new(point.x, point.y) }
    }

    impl From<CGPoint> for Point {
        fn from(point: CGPoint) -> Self { Point::new(point.x, point.y) }
    }

    impl From<Size> for CGSize {
        fn from(size: Size) -> Self { CGSize::new(size.width, size.height) }
    }

    impl From<CGSize> for Size {
        fn from(size: CGSize) -> Self { Size::new(size.width, size.height) }
    }
}
