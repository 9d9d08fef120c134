use serde::{Deserialize, Serialize};

/// A point in virtual-screen coordinates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub const fn new(x: i32, y: i32) -> Self { Self { x, y } }

    pub fn distance_to(self, other: Point) -> f64 {
        let dx = (self.x - other.x) as f64;
        let dy = (self.y - other.y) as f64;
        (dx * dx + dy * dy).sqrt()
    }
}

/// An axis-aligned rectangle in virtual-screen coordinates.
///
/// `right` and `bottom` are exclusive, matching the OS rectangle convention.
/// Callers must check [`Rect::is_degenerate`] before handing a rectangle to the
/// OS, since arithmetic on margins can produce empty or inverted rectangles.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rect {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl Rect {
    pub const fn new(left: i32, top: i32, right: i32, bottom: i32) -> Self {
        Self { left, top, right, bottom }
    }

    pub const fn from_size(left: i32, top: i32, width: i32, height: i32) -> Self {
        Self {
            left,
            top,
            right: left + width,
            bottom: top + height,
        }
    }

    pub fn width(&self) -> i32 { self.right - self.left }

    pub fn height(&self) -> i32 { self.bottom - self.top }

    pub fn center(&self) -> Point {
        Point::new(self.left + self.width() / 2, self.top + self.height() / 2)
    }

    pub fn is_degenerate(&self) -> bool { self.right <= self.left || self.bottom <= self.top }

    pub fn contains(&self, p: Point) -> bool {
        p.x >= self.left && p.x < self.right && p.y >= self.top && p.y < self.bottom
    }

    /// Shrinks every edge by `amount`. Negative amounts grow the rectangle.
    pub fn inset(&self, amount: i32) -> Rect {
        Rect {
            left: self.left + amount,
            top: self.top + amount,
            right: self.right - amount,
            bottom: self.bottom - amount,
        }
    }

    pub fn inset_edges(&self, left: i32, top: i32, right: i32, bottom: i32) -> Rect {
        Rect {
            left: self.left + left,
            top: self.top + top,
            right: self.right - right,
            bottom: self.bottom - bottom,
        }
    }

    /// Returns the rectangle with inverted edges collapsed so that
    /// `right >= left` and `bottom >= top` always hold.
    pub fn normalized(&self) -> Rect {
        Rect {
            left: self.left,
            top: self.top,
            right: self.right.max(self.left),
            bottom: self.bottom.max(self.top),
        }
    }

    pub fn intersects(&self, other: &Rect) -> bool {
        self.left < other.right
            && other.left < self.right
            && self.top < other.bottom
            && other.top < self.bottom
    }

    pub fn area(&self) -> i64 {
        let r = self.normalized();
        r.width() as i64 * r.height() as i64
    }
}
