use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, trace};

use crate::common::collections::HashSet;
use crate::common::config::LayoutSettings;
use crate::layout_engine::utils::{compute_stacked_area, compute_tiling_area};
use crate::layout_engine::{BspTree, Direction, LayoutError, MinTileSize, Placement, ResizeEdge};
use crate::sys::geometry::Rect;
use crate::sys::window::WindowId;

pub const WORKSPACE_COUNT: usize = 8;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum WorkspaceError {
    #[error("workspace id {0} is out of range 1..=8")]
    InvalidWorkspaceId(u8),
    #[error("window {0} is not in this workspace")]
    UnknownWindow(WindowId),
    #[error("no window {direction:?} of {window}")]
    NoNeighbor { window: WindowId, direction: Direction },
    #[error(transparent)]
    Layout(#[from] LayoutError),
}

/// Workspace number as the user sees it, 1 through 8.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct WorkspaceId(u8);

impl WorkspaceId {
    pub const FIRST: WorkspaceId = WorkspaceId(1);
    pub const LAST: WorkspaceId = WorkspaceId(WORKSPACE_COUNT as u8);

    pub fn new(id: u8) -> Result<Self, WorkspaceError> {
        if (1..=WORKSPACE_COUNT as u8).contains(&id) {
            Ok(Self(id))
        } else {
            Err(WorkspaceError::InvalidWorkspaceId(id))
        }
    }

    pub fn get(self) -> u8 { self.0 }

    pub fn index(self) -> usize { self.0 as usize - 1 }

    pub fn all() -> impl Iterator<Item = WorkspaceId> { (1..=WORKSPACE_COUNT as u8).map(WorkspaceId) }
}

impl TryFrom<u8> for WorkspaceId {
    type Error = WorkspaceError;

    fn try_from(id: u8) -> Result<Self, Self::Error> { Self::new(id) }
}

impl From<WorkspaceId> for u8 {
    fn from(id: WorkspaceId) -> u8 { id.0 }
}

impl std::fmt::Display for WorkspaceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { write!(f, "{}", self.0) }
}

/// One of a monitor's eight window groups.
///
/// Modes are two flags rather than one enum: a workspace can be paused while
/// remembering that it was stacked, and resumes stacked when unpaused.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workspace {
    id: WorkspaceId,
    tree: BspTree,
    windows: Vec<WindowId>,
    excluded: HashSet<WindowId>,
    stacked: bool,
    paused: bool,
    stacked_index: usize,
    last_active: Option<WindowId>,
}

impl Workspace {
    pub fn new(id: WorkspaceId, layout: &LayoutSettings) -> Self {
        let min_tile = MinTileSize {
            width: layout.min_tile_width,
            height: layout.min_tile_height,
        };
        Self {
            id,
            tree: BspTree::new(layout.margin, min_tile),
            windows: Vec::new(),
            excluded: HashSet::default(),
            stacked: layout.stacked_on_startup,
            paused: false,
            stacked_index: 0,
            last_active: None,
        }
    }

    pub fn id(&self) -> WorkspaceId { self.id }

    pub fn windows(&self) -> &[WindowId] { &self.windows }

    pub fn is_empty(&self) -> bool { self.windows.is_empty() }

    pub fn len(&self) -> usize { self.windows.len() }

    pub fn is_stacked(&self) -> bool { self.stacked }

    pub fn is_paused(&self) -> bool { self.paused }

    pub fn stacked_index(&self) -> usize { self.stacked_index }

    pub fn tree(&self) -> &BspTree { &self.tree }

    pub fn last_active(&self) -> Option<WindowId> { self.last_active }

    pub fn set_last_active(&mut self, window: WindowId) {
        if self.contains_window(window) {
            self.last_active = Some(window);
            if let Some(i) = self.get_tileable_windows().iter().position(|&w| w == window) {
                self.stacked_index = i;
            }
        }
    }

    pub fn contains_window(&self, window: WindowId) -> bool { self.windows.contains(&window) }

    pub fn is_excluded(&self, window: WindowId) -> bool { self.excluded.contains(&window) }

    /// Members that take part in tiling, in membership order.
    pub fn get_tileable_windows(&self) -> Vec<WindowId> {
        self.windows.iter().copied().filter(|w| !self.excluded.contains(w)).collect()
    }

    pub fn add_window(&mut self, window: WindowId) -> bool {
        if self.contains_window(window) {
            return false;
        }
        self.windows.push(window);
        trace!(workspace = %self.id, %window, "window added");
        true
    }

    pub fn remove_window(&mut self, window: WindowId) -> bool {
        let Some(pos) = self.windows.iter().position(|&w| w == window) else {
            return false;
        };
        let tile_pos = self.get_tileable_windows().iter().position(|&w| w == window);
        self.windows.remove(pos);
        self.excluded.remove(&window);
        if self.last_active == Some(window) {
            self.last_active = None;
        }
        if let Some(tile_pos) = tile_pos {
            if tile_pos < self.stacked_index {
                self.stacked_index -= 1;
            }
        }
        let count = self.get_tileable_windows().len();
        if self.stacked_index >= count {
            self.stacked_index = count.saturating_sub(1);
        }
        trace!(workspace = %self.id, %window, "window removed");
        true
    }

    /// Removes every window, returning them in membership order.
    pub fn clear(&mut self) -> Vec<WindowId> {
        self.excluded.clear();
        self.last_active = None;
        self.stacked_index = 0;
        let windows = std::mem::take(&mut self.windows);
        self.tree.build(&[], self.tree.area());
        windows
    }

    pub fn set_stacked(&mut self, stacked: bool) { self.stacked = stacked; }

    /// Flips whether `window` takes part in tiling. Returns true when the
    /// window is tiled afterwards.
    pub fn toggle_window_tiling(&mut self, window: WindowId) -> Result<bool, WorkspaceError> {
        if !self.contains_window(window) {
            return Err(WorkspaceError::UnknownWindow(window));
        }
        if self.excluded.remove(&window) {
            Ok(true)
        } else {
            self.excluded.insert(window);
            Ok(false)
        }
    }

    /// Computes where every window of this workspace should go.
    pub fn apply_tiling(&mut self, work_area: Rect, layout: &LayoutSettings) -> Vec<Placement> {
        if self.paused {
            trace!(workspace = %self.id, "paused; not tiling");
            return Vec::new();
        }
        if self.stacked {
            return self.stacked_placements(work_area, layout);
        }
        self.tiled_placements(work_area, layout)
    }

    fn tiled_placements(&mut self, work_area: Rect, layout: &LayoutSettings) -> Vec<Placement> {
        let tileable = self.get_tileable_windows();
        self.tree.sync(&tileable, compute_tiling_area(work_area, layout));
        self.tree.layout().into_iter().map(|(w, r)| Placement::tiled(w, r)).collect()
    }

    fn stacked_placements(&mut self, work_area: Rect, layout: &LayoutSettings) -> Vec<Placement> {
        let tileable = self.get_tileable_windows();
        if tileable.is_empty() {
            return Vec::new();
        }
        if self.stacked_index >= tileable.len() {
            self.stacked_index = 0;
        }
        let rect = compute_stacked_area(work_area, layout);
        // Hidden windows still get the rectangle so their buffers stay the
        // right size for when they come to the front.
        tileable
            .into_iter()
            .enumerate()
            .map(|(i, window)| {
                let active = i == self.stacked_index;
                Placement { window, rect, visible: active, focus: active }
            })
            .collect()
    }

    pub fn enable_stacked_mode(&mut self, work_area: Rect, layout: &LayoutSettings) -> Vec<Placement> {
        self.stacked = true;
        if let Some(active) = self.last_active {
            if let Some(i) = self.get_tileable_windows().iter().position(|&w| w == active) {
                self.stacked_index = i;
            }
        }
        debug!(workspace = %self.id, index = self.stacked_index, "stacked mode on");
        self.apply_tiling(work_area, layout)
    }

    pub fn disable_stacked_mode(&mut self, work_area: Rect, layout: &LayoutSettings) -> Vec<Placement> {
        self.stacked = false;
        debug!(workspace = %self.id, "stacked mode off");
        self.apply_tiling(work_area, layout)
    }

    pub fn toggle_stacked_mode(&mut self, work_area: Rect, layout: &LayoutSettings) -> Vec<Placement> {
        if self.stacked {
            self.disable_stacked_mode(work_area, layout)
        } else {
            self.enable_stacked_mode(work_area, layout)
        }
    }

    /// Entering pause from stacked mode lays the windows out as tiles once so
    /// none of them stays hidden while tiling is suspended.
    pub fn toggle_paused_mode(&mut self, work_area: Rect, layout: &LayoutSettings) -> Vec<Placement> {
        if self.paused {
            self.paused = false;
            debug!(workspace = %self.id, "resumed");
            return self.apply_tiling(work_area, layout);
        }
        let placements = if self.stacked {
            self.tiled_placements(work_area, layout)
        } else {
            Vec::new()
        };
        self.paused = true;
        debug!(workspace = %self.id, stacked = self.stacked, "paused");
        placements
    }

    pub fn cycle_stacked_window(
        &mut self,
        step: i32,
        work_area: Rect,
        layout: &LayoutSettings,
    ) -> Vec<Placement> {
        if !self.stacked || self.paused {
            return Vec::new();
        }
        let count = self.get_tileable_windows().len();
        if count == 0 {
            return Vec::new();
        }
        self.stacked_index = (self.stacked_index as i64 + step as i64).rem_euclid(count as i64) as usize;
        self.stacked_placements(work_area, layout)
    }

    pub fn jump_to_stacked_window(
        &mut self,
        index: usize,
        work_area: Rect,
        layout: &LayoutSettings,
    ) -> Vec<Placement> {
        if !self.stacked || self.paused || index >= self.get_tileable_windows().len() {
            return Vec::new();
        }
        self.stacked_index = index;
        self.stacked_placements(work_area, layout)
    }

    /// The active stacked window, if the workspace is stacked.
    pub fn stacked_window(&self) -> Option<WindowId> {
        if !self.stacked {
            return None;
        }
        self.get_tileable_windows().get(self.stacked_index).copied()
    }

    pub fn get_window_in_direction(&self, window: WindowId, direction: Direction) -> Option<WindowId> {
        if self.stacked || self.paused {
            return None;
        }
        self.tree.window_in_direction(window, direction)
    }

    pub fn swap_window_in_direction(
        &mut self,
        window: WindowId,
        direction: Direction,
    ) -> Result<Vec<Placement>, WorkspaceError> {
        let target = self
            .get_window_in_direction(window, direction)
            .ok_or(WorkspaceError::NoNeighbor { window, direction })?;
        self.swap_windows(window, target)
    }

    /// Exchanges two tiled windows and returns their new placements.
    pub fn swap_windows(&mut self, a: WindowId, b: WindowId) -> Result<Vec<Placement>, WorkspaceError> {
        for w in [a, b] {
            if !self.contains_window(w) {
                return Err(WorkspaceError::UnknownWindow(w));
            }
        }
        let moved = self.tree.swap(a, b)?;
        let ia = self.windows.iter().position(|&w| w == a);
        let ib = self.windows.iter().position(|&w| w == b);
        if let (Some(ia), Some(ib)) = (ia, ib) {
            self.windows.swap(ia, ib);
        }
        Ok(moved.into_iter().map(|(w, r)| Placement::tiled(w, r)).collect())
    }

    /// Stacked and paused workspaces have no splits to move; nothing
    /// changes and no placements come back.
    pub fn resize_split(&mut self, window: WindowId, delta: f32) -> Result<Vec<Placement>, WorkspaceError> {
        if self.stacked || self.paused {
            return Ok(Vec::new());
        }
        self.tree.resize(window, delta)?;
        Ok(self.current_tiles())
    }

    pub fn resize_edge(
        &mut self,
        window: WindowId,
        edge: ResizeEdge,
        pixels: i32,
    ) -> Result<Vec<Placement>, WorkspaceError> {
        if self.stacked || self.paused {
            return Ok(Vec::new());
        }
        self.tree.resize_edge(window, edge, pixels)?;
        Ok(self.current_tiles())
    }

    /// Where the tree last put `window`.
    pub fn tile_rect(&self, window: WindowId) -> Option<Rect> { self.tree.rect_of(window) }

    fn current_tiles(&self) -> Vec<Placement> {
        self.tree.layout().into_iter().map(|(w, r)| Placement::tiled(w, r)).collect()
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use test_log::test;

    use super::*;

    const WORK: Rect = Rect::new(0, 0, 1920, 1080);

    fn w(n: u64) -> WindowId { WindowId(n) }

    fn workspace(n: u64) -> Workspace {
        let mut ws = Workspace::new(WorkspaceId::FIRST, &LayoutSettings::default());
        for i in 1..=n {
            ws.add_window(w(i));
        }
        ws
    }

    fn visible(placements: &[Placement]) -> Vec<WindowId> {
        placements.iter().filter(|p| p.visible).map(|p| p.window).collect()
    }

    #[test]
    fn workspace_ids_are_one_through_eight() {
        assert!(WorkspaceId::new(0).is_err());
        assert!(WorkspaceId::new(9).is_err());
        assert_eq!(WorkspaceId::new(8).unwrap(), WorkspaceId::LAST);
        assert_eq!(WorkspaceId::all().count(), WORKSPACE_COUNT);
        assert_eq!(WorkspaceId::new(3).unwrap().index(), 2);
    }

    #[test]
    fn tiled_layout_places_every_tileable_window() {
        let mut ws = workspace(3);
        let placements = ws.apply_tiling(WORK, &LayoutSettings::default());
        assert_eq!(placements.len(), 3);
        assert_eq!(placements[0].rect, Rect::new(0, 0, 956, 1080));
        assert!(placements.iter().all(|p| p.visible && !p.focus));
    }

    #[test]
    fn excluded_windows_get_no_placement() {
        let mut ws = workspace(3);
        assert_eq!(ws.toggle_window_tiling(w(2)), Ok(false));
        let placements = ws.apply_tiling(WORK, &LayoutSettings::default());
        assert_eq!(placements.iter().map(|p| p.window).collect::<Vec<_>>(), vec![w(1), w(3)]);
        assert_eq!(ws.toggle_window_tiling(w(2)), Ok(true));
        assert_eq!(ws.toggle_window_tiling(w(9)), Err(WorkspaceError::UnknownWindow(w(9))));
    }

    #[test]
    fn stacked_mode_shares_one_rect_and_shows_one_window() {
        let layout = LayoutSettings::default();
        let mut ws = workspace(3);
        ws.set_last_active(w(2));
        let placements = ws.enable_stacked_mode(WORK, &layout);
        assert_eq!(placements.len(), 3);
        assert!(placements.iter().all(|p| p.rect == Rect::new(2, 2, 1918, 1078)));
        assert_eq!(visible(&placements), vec![w(2)]);
        assert_eq!(ws.stacked_window(), Some(w(2)));
    }

    #[test]
    fn cycling_wraps_both_ways() {
        let layout = LayoutSettings::default();
        let mut ws = workspace(3);
        ws.enable_stacked_mode(WORK, &layout);
        assert_eq!(visible(&ws.cycle_stacked_window(-1, WORK, &layout)), vec![w(3)]);
        assert_eq!(visible(&ws.cycle_stacked_window(1, WORK, &layout)), vec![w(1)]);
        assert_eq!(visible(&ws.cycle_stacked_window(4, WORK, &layout)), vec![w(2)]);
    }

    #[test]
    fn jump_ignores_out_of_range_indices() {
        let layout = LayoutSettings::default();
        let mut ws = workspace(3);
        ws.enable_stacked_mode(WORK, &layout);
        assert_eq!(visible(&ws.jump_to_stacked_window(2, WORK, &layout)), vec![w(3)]);
        assert!(ws.jump_to_stacked_window(3, WORK, &layout).is_empty());
        assert_eq!(ws.stacked_index(), 2);
    }

    #[test]
    fn cycling_outside_stacked_mode_is_a_noop() {
        let mut ws = workspace(2);
        assert!(ws.cycle_stacked_window(1, WORK, &LayoutSettings::default()).is_empty());
        assert_eq!(ws.stacked_index(), 0);
    }

    #[test]
    fn pausing_from_stacked_tiles_first() {
        let layout = LayoutSettings::default();
        let mut ws = workspace(2);
        ws.enable_stacked_mode(WORK, &layout);

        let placements = ws.toggle_paused_mode(WORK, &layout);
        assert!(ws.is_paused());
        assert_eq!(visible(&placements), vec![w(1), w(2)]);
        assert_ne!(placements[0].rect, placements[1].rect);
        assert!(ws.apply_tiling(WORK, &layout).is_empty());

        let resumed = ws.toggle_paused_mode(WORK, &layout);
        assert!(!ws.is_paused());
        assert!(ws.is_stacked());
        assert_eq!(visible(&resumed), vec![w(1)]);
    }

    #[test]
    fn pausing_normal_workspace_emits_nothing() {
        let layout = LayoutSettings::default();
        let mut ws = workspace(2);
        assert!(ws.toggle_paused_mode(WORK, &layout).is_empty());
        assert_eq!(ws.toggle_paused_mode(WORK, &layout).len(), 2);
    }

    #[test]
    fn removing_windows_keeps_stacked_index_valid() {
        let layout = LayoutSettings::default();
        let mut ws = workspace(3);
        ws.enable_stacked_mode(WORK, &layout);
        ws.jump_to_stacked_window(2, WORK, &layout);
        ws.remove_window(w(1));
        assert_eq!(ws.stacked_window(), Some(w(3)));
        ws.remove_window(w(3));
        assert_eq!(ws.stacked_window(), Some(w(2)));
    }

    #[test]
    fn swap_in_direction_exchanges_tiles() {
        let layout = LayoutSettings::default();
        let mut ws = workspace(3);
        ws.apply_tiling(WORK, &layout);
        let left = ws.tile_rect(w(1)).unwrap();
        let placements = ws.swap_window_in_direction(w(1), Direction::Right).unwrap();
        assert_eq!(placements.len(), 2);
        assert_eq!(ws.tile_rect(w(2)), Some(left));
        assert_eq!(ws.windows(), &[w(2), w(1), w(3)]);
    }

    #[test]
    fn resize_split_reports_all_tiles() {
        let layout = LayoutSettings::default();
        let mut ws = workspace(3);
        ws.apply_tiling(WORK, &layout);
        let placements = ws.resize_split(w(1), 0.1).unwrap();
        assert_eq!(placements.len(), 3);
        assert_eq!(placements[0].rect.right, 1148);
        assert!(matches!(ws.resize_split(w(7), 0.1), Err(WorkspaceError::Layout(_))));
    }

    #[test]
    fn resizing_is_a_no_op_when_stacked_or_paused() {
        let layout = LayoutSettings::default();
        let mut ws = workspace(3);
        ws.apply_tiling(WORK, &layout);
        let ratios = ws.tree().ratios();

        ws.toggle_stacked_mode(WORK, &layout);
        assert_eq!(ws.resize_split(w(1), 0.1), Ok(Vec::new()));
        assert_eq!(ws.resize_edge(w(1), ResizeEdge::Right, 100), Ok(Vec::new()));
        assert_eq!(ws.tree().ratios(), ratios);

        ws.toggle_stacked_mode(WORK, &layout);
        ws.toggle_paused_mode(WORK, &layout);
        assert_eq!(ws.resize_split(w(1), 0.1), Ok(Vec::new()));
        assert_eq!(ws.resize_edge(w(1), ResizeEdge::Right, 100), Ok(Vec::new()));
        assert_eq!(ws.tree().ratios(), ratios);
    }

    #[test]
    fn stacked_on_startup_is_honoured() {
        let layout = LayoutSettings { stacked_on_startup: true, ..Default::default() };
        assert!(Workspace::new(WorkspaceId::FIRST, &layout).is_stacked());
    }
}
