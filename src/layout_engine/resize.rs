use serde::{Deserialize, Serialize};

use super::graph::Orientation;
use crate::sys::geometry::Rect;

/// Ratio bounds for hotkey-driven split resizes.
pub const SPLIT_RATIO_RANGE: (f32, f32) = (0.05, 0.95);

/// Ratio bounds for edge drags, kept tighter so a drag cannot hide a sibling.
pub const EDGE_RATIO_RANGE: (f32, f32) = (0.1, 0.9);

pub fn clamp_ratio(ratio: f32, (lo, hi): (f32, f32)) -> f32 { ratio.clamp(lo, hi) }

/// Edge of a window the user grabbed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResizeEdge {
    Left,
    Top,
    Right,
    Bottom,
}

impl ResizeEdge {
    /// Orientation of the split whose divider this edge follows.
    pub fn orientation(self) -> Orientation {
        match self {
            ResizeEdge::Left | ResizeEdge::Right => Orientation::Vertical,
            ResizeEdge::Top | ResizeEdge::Bottom => Orientation::Horizontal,
        }
    }

    /// True when the edge faces the second child of a split, so the window
    /// must sit in the first child for that split to border this edge.
    pub fn faces_second(self) -> bool { matches!(self, ResizeEdge::Right | ResizeEdge::Bottom) }
}

/// Smallest tile a resize may produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MinTileSize {
    pub width: i32,
    pub height: i32,
}

impl Default for MinTileSize {
    fn default() -> Self { Self { width: 470, height: 150 } }
}

impl MinTileSize {
    /// A tile only violates the minimum along a dimension that shrank, so an
    /// already-small tile can still be grown.
    pub fn violated_by(&self, before: Rect, after: Rect) -> bool {
        let width_bad = after.width() < before.width() && after.width() < self.width;
        let height_bad = after.height() < before.height() && after.height() < self.height;
        width_bad || height_bad
    }
}

/// Edges whose position changed between `before` and `after`, with the
/// outward movement in pixels (positive = the window grew on that side).
pub fn moved_edges(before: Rect, after: Rect) -> Vec<(ResizeEdge, i32)> {
    let mut edges = Vec::new();
    if after.left != before.left {
        edges.push((ResizeEdge::Left, before.left - after.left));
    }
    if after.top != before.top {
        edges.push((ResizeEdge::Top, before.top - after.top));
    }
    if after.right != before.right {
        edges.push((ResizeEdge::Right, after.right - before.right));
    }
    if after.bottom != before.bottom {
        edges.push((ResizeEdge::Bottom, after.bottom - before.bottom));
    }
    edges
}
