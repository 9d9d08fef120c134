pub mod binary_tree;
pub(crate) mod graph;
pub mod resize;
pub mod utils;

pub use binary_tree::{BspTree, LayoutError, NodeId};
pub use graph::{Direction, Orientation};
pub use resize::{MinTileSize, ResizeEdge};
use serde::{Deserialize, Serialize};

use crate::sys::geometry::Rect;
use crate::sys::window::WindowId;

/// A single "put this window here" instruction produced by a layout pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Placement {
    pub window: WindowId,
    pub rect: Rect,
    pub visible: bool,
    pub focus: bool,
}

impl Placement {
    pub fn tiled(window: WindowId, rect: Rect) -> Self {
        Self { window, rect, visible: true, focus: false }
    }
}
