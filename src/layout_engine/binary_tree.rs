//! Arena-backed binary space partition tree for one workspace.
//!
//! Every split isolates exactly one window (the first child) from the rest,
//! so a tree of N windows is a left-skewed chain of N-1 splits whose
//! orientation alternates with depth. Rebuilding clears the arena and bumps
//! the generation; only the insertion order survives a rebuild.

use serde::{Deserialize, Serialize};
use slotmap::{SlotMap, new_key_type};
use thiserror::Error;
use tracing::{debug, trace};

use super::graph::{Direction, Orientation};
use super::resize::{
    EDGE_RATIO_RANGE, MinTileSize, ResizeEdge, SPLIT_RATIO_RANGE, clamp_ratio,
};
use crate::common::collections::{HashMap, HashSet};
use crate::sys::geometry::Rect;
use crate::sys::window::WindowId;

pub const DEFAULT_RATIO: f32 = 0.5;

new_key_type! {
    pub struct NodeId;
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum LayoutError {
    #[error("window {0} is not tiled")]
    NotTiled(WindowId),
    #[error("window {0} has no parent split")]
    NoSplit(WindowId),
    #[error("no split borders the {edge:?} edge of window {window}")]
    NoMatchingSplit { window: WindowId, edge: ResizeEdge },
    #[error("resize would shrink a tile below {}x{}", .0.width, .0.height)]
    ConstraintViolation(MinTileSize),
    #[error("cannot swap window {0} with itself")]
    SameWindow(WindowId),
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum NodeKind {
    Split {
        first: NodeId,
        second: NodeId,
        ratio: f32,
        orientation: Orientation,
    },
    Leaf {
        window: WindowId,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Node {
    parent: Option<NodeId>,
    kind: NodeKind,
    bounds: Rect,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BspTree {
    nodes: SlotMap<NodeId, Node>,
    root: Option<NodeId>,
    window_to_node: HashMap<WindowId, NodeId>,
    order: Vec<WindowId>,
    area: Rect,
    margin: i32,
    min_tile: MinTileSize,
    generation: u64,
}

impl BspTree {
    pub fn new(margin: i32, min_tile: MinTileSize) -> Self {
        Self {
            nodes: SlotMap::with_key(),
            root: None,
            window_to_node: HashMap::default(),
            order: Vec::new(),
            area: Rect::default(),
            margin,
            min_tile,
            generation: 0,
        }
    }

    pub fn generation(&self) -> u64 { self.generation }

    pub fn area(&self) -> Rect { self.area }

    pub fn windows(&self) -> &[WindowId] { &self.order }

    pub fn contains(&self, window: WindowId) -> bool { self.window_to_node.contains_key(&window) }

    pub fn is_empty(&self) -> bool { self.root.is_none() }

    pub fn leaf_count(&self) -> usize {
        self.nodes.values().filter(|n| matches!(n.kind, NodeKind::Leaf { .. })).count()
    }

    pub fn split_count(&self) -> usize {
        self.nodes.values().filter(|n| matches!(n.kind, NodeKind::Split { .. })).count()
    }

    pub fn rect_of(&self, window: WindowId) -> Option<Rect> {
        self.window_to_node.get(&window).map(|&node| self.nodes[node].bounds)
    }

    /// Ratio of the split directly above `window`.
    pub fn parent_ratio(&self, window: WindowId) -> Option<f32> {
        let node = *self.window_to_node.get(&window)?;
        let parent = self.nodes[node].parent?;
        match self.nodes[parent].kind {
            NodeKind::Split { ratio, .. } => Some(ratio),
            NodeKind::Leaf { .. } => None,
        }
    }

    pub fn ratios(&self) -> Vec<f32> {
        self.nodes
            .values()
            .filter_map(|n| match n.kind {
                NodeKind::Split { ratio, .. } => Some(ratio),
                NodeKind::Leaf { .. } => None,
            })
            .collect()
    }

    /// Discards the current tree and builds a fresh one over `windows`.
    ///
    /// Windows already in the tree keep their relative order; new ones are
    /// appended in the order given.
    pub fn build(&mut self, windows: &[WindowId], area: Rect) {
        let wanted: HashSet<WindowId> = windows.iter().copied().collect();
        let mut order: Vec<WindowId> =
            self.order.iter().copied().filter(|w| wanted.contains(w)).collect();
        let mut seen: HashSet<WindowId> = order.iter().copied().collect();
        for &w in windows {
            if seen.insert(w) {
                order.push(w);
            }
        }

        self.nodes.clear();
        self.window_to_node.clear();
        self.generation += 1;
        self.area = area;
        self.root = self.build_subtree(&order, None, 0);
        self.order = order;
        self.relayout();
        trace!(
            generation = self.generation,
            windows = self.order.len(),
            "rebuilt tree"
        );
    }

    /// Rebuilds only when membership changed; otherwise keeps the split
    /// ratios and just lays the tree out over `area`.
    pub fn sync(&mut self, windows: &[WindowId], area: Rect) {
        let same_members = windows.len() == self.order.len()
            && windows.iter().all(|w| self.window_to_node.contains_key(w));
        if same_members {
            if area != self.area {
                self.area = area;
                self.relayout();
            }
        } else {
            self.build(windows, area);
        }
    }

    pub fn set_margin(&mut self, margin: i32) {
        self.margin = margin;
        self.relayout();
    }

    /// Current window rectangles, in insertion order.
    pub fn layout(&self) -> Vec<(WindowId, Rect)> {
        self.order
            .iter()
            .filter_map(|&w| self.rect_of(w).map(|r| (w, r)))
            .collect()
    }

    /// Moves the split directly above `window` so that the window grows by
    /// `delta` of the split's extent (shrinks for negative values).
    pub fn resize(&mut self, window: WindowId, delta: f32) -> Result<f32, LayoutError> {
        let node = *self.window_to_node.get(&window).ok_or(LayoutError::NotTiled(window))?;
        let parent = self.nodes[node].parent.ok_or(LayoutError::NoSplit(window))?;
        let NodeKind::Split { first, ratio, .. } = self.nodes[parent].kind else {
            return Err(LayoutError::NoSplit(window));
        };
        let signed = if first == node { delta } else { -delta };
        let new_ratio = clamp_ratio(ratio + signed, SPLIT_RATIO_RANGE);
        self.try_set_ratio(parent, new_ratio)?;
        debug!(%window, from = ratio, to = new_ratio, "resized split");
        Ok(new_ratio)
    }

    /// Moves the divider bordering `edge` of `window` outward by `pixels`
    /// (inward for negative values).
    ///
    /// The split is the nearest ancestor whose divider actually runs along
    /// that edge, so the same drag has the same effect wherever the window
    /// sits in the tree.
    pub fn resize_edge(
        &mut self,
        window: WindowId,
        edge: ResizeEdge,
        pixels: i32,
    ) -> Result<f32, LayoutError> {
        let leaf = *self.window_to_node.get(&window).ok_or(LayoutError::NotTiled(window))?;
        let mut node = leaf;
        while let Some(parent) = self.nodes[node].parent {
            if let NodeKind::Split { first, ratio, orientation, .. } = self.nodes[parent].kind {
                let in_first = first == node;
                if orientation == edge.orientation() && in_first == edge.faces_second() {
                    let bounds = self.nodes[parent].bounds;
                    let extent = match orientation {
                        Orientation::Vertical => bounds.width(),
                        Orientation::Horizontal => bounds.height(),
                    };
                    if extent <= 0 {
                        break;
                    }
                    let amount = pixels as f32 / extent as f32;
                    let signed = if in_first { amount } else { -amount };
                    let new_ratio = clamp_ratio(ratio + signed, EDGE_RATIO_RANGE);
                    self.try_set_ratio(parent, new_ratio)?;
                    debug!(%window, ?edge, pixels, from = ratio, to = new_ratio, "resized edge");
                    return Ok(new_ratio);
                }
            }
            node = parent;
        }
        Err(LayoutError::NoMatchingSplit { window, edge })
    }

    /// Sets a split's ratio, or leaves the tree untouched if any tile below it
    /// would shrink past the minimum size.
    fn try_set_ratio(&mut self, split: NodeId, ratio: f32) -> Result<(), LayoutError> {
        let bounds = self.nodes[split].bounds;
        let mut proposed = Vec::new();
        self.compute_bounds(split, bounds, Some((split, ratio)), &mut proposed);
        for (node, after) in proposed {
            if let NodeKind::Leaf { .. } = self.nodes[node].kind {
                if self.min_tile.violated_by(self.nodes[node].bounds, after) {
                    return Err(LayoutError::ConstraintViolation(self.min_tile));
                }
            }
        }
        if let NodeKind::Split { ratio: r, .. } = &mut self.nodes[split].kind {
            *r = ratio;
        }
        self.place(split, bounds);
        Ok(())
    }

    /// Exchanges the windows held by two leaves. The tree shape and every
    /// bound stay as they are.
    pub fn swap(&mut self, a: WindowId, b: WindowId) -> Result<[(WindowId, Rect); 2], LayoutError> {
        if a == b {
            return Err(LayoutError::SameWindow(a));
        }
        let na = *self.window_to_node.get(&a).ok_or(LayoutError::NotTiled(a))?;
        let nb = *self.window_to_node.get(&b).ok_or(LayoutError::NotTiled(b))?;

        self.nodes[na].kind = NodeKind::Leaf { window: b };
        self.nodes[nb].kind = NodeKind::Leaf { window: a };
        self.window_to_node.insert(a, nb);
        self.window_to_node.insert(b, na);

        let ia = self.order.iter().position(|&w| w == a);
        let ib = self.order.iter().position(|&w| w == b);
        if let (Some(ia), Some(ib)) = (ia, ib) {
            self.order.swap(ia, ib);
        }

        Ok([(a, self.nodes[nb].bounds), (b, self.nodes[na].bounds)])
    }

    /// The window reached by moving from `window` in `direction`, wrapping
    /// around to the far side of the workspace at its edge.
    ///
    /// Moves that find a neighbour invert: going back the opposite way
    /// returns to `window`. Wrapped moves pick the far-side tile closest on
    /// the perpendicular axis and do not invert in general.
    pub fn window_in_direction(&self, window: WindowId, direction: Direction) -> Option<WindowId> {
        let leaf = *self.window_to_node.get(&window)?;
        if let Some(target) = self.find_neighbor_leaf(leaf, direction) {
            return self.window_at(target);
        }
        self.wrap_around(window, direction)
    }

    /// Like [`Self::window_in_direction`], but never wraps.
    pub fn neighbor_in_direction(&self, window: WindowId, direction: Direction) -> Option<WindowId> {
        let leaf = *self.window_to_node.get(&window)?;
        self.find_neighbor_leaf(leaf, direction).and_then(|n| self.window_at(n))
    }

    fn find_neighbor_leaf(&self, from_leaf: NodeId, direction: Direction) -> Option<NodeId> {
        let source = self.nodes[from_leaf].bounds;
        let mut current = from_leaf;
        while let Some(parent) = self.nodes[current].parent {
            if let NodeKind::Split { first, second, orientation, .. } = self.nodes[parent].kind {
                if orientation == direction.split_orientation() {
                    let is_first = first == current;
                    if is_first == direction.toward_second() {
                        let target = if is_first { second } else { first };
                        return Some(self.find_closest_leaf_in_direction(target, direction, source));
                    }
                }
            }
            current = parent;
        }
        None
    }

    /// Descends from `node`, staying on the side adjacent to where we came
    /// from and, across perpendicular splits, on the side whose centre is
    /// nearest `source`. Ties go to the first child.
    fn find_closest_leaf_in_direction(
        &self,
        mut node: NodeId,
        direction: Direction,
        source: Rect,
    ) -> NodeId {
        loop {
            match self.nodes[node].kind {
                NodeKind::Leaf { .. } => return node,
                NodeKind::Split { first, second, orientation, .. } => {
                    node = if orientation == direction.split_orientation() {
                        if direction.toward_second() { first } else { second }
                    } else {
                        let center = perpendicular_center(source, direction);
                        let d1 = (perpendicular_center(self.nodes[first].bounds, direction) - center).abs();
                        let d2 =
                            (perpendicular_center(self.nodes[second].bounds, direction) - center).abs();
                        if d2 < d1 { second } else { first }
                    };
                }
            }
        }
    }

    fn wrap_around(&self, window: WindowId, direction: Direction) -> Option<WindowId> {
        let source = self.rect_of(window)?;
        let source_center = perpendicular_center(source, direction);
        // Larger is more extreme in the opposite direction, e.g. moving Left
        // prefers the rightmost tile.
        let extremity = |r: Rect| match direction {
            Direction::Left => r.right,
            Direction::Right => -r.left,
            Direction::Up => r.bottom,
            Direction::Down => -r.top,
        };
        self.order
            .iter()
            .enumerate()
            .filter(|&(_, &w)| w != window)
            .filter_map(|(i, &w)| self.rect_of(w).map(|r| (i, w, r)))
            .min_by_key(|&(i, _, r)| {
                let gap = (perpendicular_center(r, direction) - source_center).abs();
                (gap, -extremity(r), i)
            })
            .map(|(_, w, _)| w)
    }

    fn window_at(&self, node: NodeId) -> Option<WindowId> {
        match self.nodes.get(node)?.kind {
            NodeKind::Leaf { window } => Some(window),
            NodeKind::Split { .. } => None,
        }
    }

    pub fn collect_windows_under(&self, node: NodeId, out: &mut Vec<WindowId>) {
        match self.nodes[node].kind {
            NodeKind::Leaf { window } => out.push(window),
            NodeKind::Split { first, second, .. } => {
                self.collect_windows_under(first, out);
                self.collect_windows_under(second, out);
            }
        }
    }

    pub fn draw_tree(&self) -> String {
        let mut out = String::new();
        match self.root {
            Some(root) => {
                if ascii_tree::write_tree(&mut out, &self.draw_node(root)).is_err() {
                    out.clear();
                }
            }
            None => out.push_str("<empty>\n"),
        }
        out
    }

    fn draw_node(&self, node: NodeId) -> ascii_tree::Tree {
        let n = &self.nodes[node];
        match n.kind {
            NodeKind::Leaf { window } => ascii_tree::Tree::Leaf(vec![format!(
                "{window} [{}, {}, {}x{}]",
                n.bounds.left,
                n.bounds.top,
                n.bounds.width(),
                n.bounds.height()
            )]),
            NodeKind::Split { first, second, ratio, orientation } => ascii_tree::Tree::Node(
                format!("{orientation:?} {ratio:.2}"),
                vec![self.draw_node(first), self.draw_node(second)],
            ),
        }
    }

    fn build_subtree(
        &mut self,
        windows: &[WindowId],
        parent: Option<NodeId>,
        depth: usize,
    ) -> Option<NodeId> {
        match windows {
            [] => None,
            [window] => Some(self.make_leaf(*window, parent)),
            [window, rest @ ..] => {
                let first = self.make_leaf(*window, None);
                let second = match self.build_subtree(rest, None, depth + 1) {
                    Some(node) => node,
                    None => return Some(first),
                };
                let split = self.nodes.insert(Node {
                    parent,
                    kind: NodeKind::Split {
                        first,
                        second,
                        ratio: DEFAULT_RATIO,
                        orientation: Orientation::for_depth(depth),
                    },
                    bounds: Rect::default(),
                });
                self.nodes[first].parent = Some(split);
                self.nodes[second].parent = Some(split);
                Some(split)
            }
        }
    }

    fn make_leaf(&mut self, window: WindowId, parent: Option<NodeId>) -> NodeId {
        let id = self.nodes.insert(Node {
            parent,
            kind: NodeKind::Leaf { window },
            bounds: Rect::default(),
        });
        self.window_to_node.insert(window, id);
        id
    }

    fn relayout(&mut self) {
        if let Some(root) = self.root {
            self.place(root, self.area);
        }
    }

    fn place(&mut self, node: NodeId, bounds: Rect) {
        let mut placed = Vec::new();
        self.compute_bounds(node, bounds, None, &mut placed);
        for (node, rect) in placed {
            self.nodes[node].bounds = rect;
        }
    }

    /// Computes bounds for `node` and everything below it, optionally with
    /// one split's ratio overridden.
    fn compute_bounds(
        &self,
        node: NodeId,
        bounds: Rect,
        ratio_override: Option<(NodeId, f32)>,
        out: &mut Vec<(NodeId, Rect)>,
    ) {
        out.push((node, bounds));
        if let NodeKind::Split { first, second, ratio, orientation } = self.nodes[node].kind {
            let ratio = match ratio_override {
                Some((id, r)) if id == node => r,
                _ => ratio,
            };
            let (a, b) = split_rect(bounds, orientation, ratio, self.margin);
            self.compute_bounds(first, a, ratio_override, out);
            self.compute_bounds(second, b, ratio_override, out);
        }
    }
}

/// Divides `bounds` at `ratio`, leaving `margin` pixels between the halves.
pub fn split_rect(bounds: Rect, orientation: Orientation, ratio: f32, margin: i32) -> (Rect, Rect) {
    let before = margin / 2;
    let after = margin - before;
    match orientation {
        Orientation::Vertical => {
            let at = bounds.left + (bounds.width() as f32 * ratio).round() as i32;
            (
                Rect::new(bounds.left, bounds.top, at - before, bounds.bottom).normalized(),
                Rect::new(at + after, bounds.top, bounds.right, bounds.bottom).normalized(),
            )
        }
        Orientation::Horizontal => {
            let at = bounds.top + (bounds.height() as f32 * ratio).round() as i32;
            (
                Rect::new(bounds.left, bounds.top, bounds.right, at - before).normalized(),
                Rect::new(bounds.left, at + after, bounds.right, bounds.bottom).normalized(),
            )
        }
    }
}

fn perpendicular_center(r: Rect, direction: Direction) -> i32 {
    match direction.split_orientation() {
        Orientation::Vertical => r.center().y,
        Orientation::Horizontal => r.center().x,
    }
}
