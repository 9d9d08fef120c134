use tracing::{debug, trace};

use super::workspace::{Workspace, WorkspaceError, WorkspaceId};
use crate::common::collections::{BTreeSet, HashMap};
use crate::common::config::LayoutSettings;
use crate::layout_engine::Placement;
use crate::sys::geometry::Rect;
use crate::sys::window::{MonitorHandle, MonitorInfo, WindowId};

/// What has to change on screen after switching workspaces.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct WorkspaceSwitch {
    pub hide: Vec<WindowId>,
    /// Members of the new workspace that get no placement but must be shown.
    pub show: Vec<WindowId>,
    pub placements: Vec<Placement>,
}

/// Result of moving a window between two workspaces of one monitor.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct WorkspaceMove {
    pub from: Option<WorkspaceId>,
    pub hide: Option<WindowId>,
    pub placements: Vec<Placement>,
}

#[derive(Debug, Clone)]
pub struct Monitor {
    index: usize,
    handle: MonitorHandle,
    bounds: Rect,
    work_area: Rect,
    primary: bool,
    workspaces: Vec<Workspace>,
    current: WorkspaceId,
    positions: HashMap<WindowId, Rect>,
    backup_workspaces: BTreeSet<WorkspaceId>,
}

impl Monitor {
    /// `index` is the monitor's position in primary-first order.
    pub fn new(index: usize, info: &MonitorInfo, layout: &LayoutSettings) -> Self {
        Self {
            index,
            handle: info.handle,
            bounds: info.bounds,
            work_area: info.work_area,
            primary: info.is_primary,
            workspaces: WorkspaceId::all().map(|id| Workspace::new(id, layout)).collect(),
            current: WorkspaceId::FIRST,
            positions: HashMap::default(),
            backup_workspaces: BTreeSet::new(),
        }
    }

    pub fn index(&self) -> usize { self.index }

    pub fn handle(&self) -> MonitorHandle { self.handle }

    pub fn bounds(&self) -> Rect { self.bounds }

    pub fn work_area(&self) -> Rect { self.work_area }

    pub fn is_primary(&self) -> bool { self.primary }

    pub fn current(&self) -> WorkspaceId { self.current }

    pub fn workspaces(&self) -> &[Workspace] { &self.workspaces }

    pub fn get_workspace(&self, id: WorkspaceId) -> &Workspace { &self.workspaces[id.index()] }

    pub fn get_workspace_mut(&mut self, id: WorkspaceId) -> &mut Workspace {
        &mut self.workspaces[id.index()]
    }

    pub fn get_current_workspace(&self) -> &Workspace { self.get_workspace(self.current) }

    pub fn get_current_workspace_mut(&mut self) -> &mut Workspace {
        let current = self.current;
        self.get_workspace_mut(current)
    }

    /// Sets the current workspace without touching any window.
    pub fn set_current(&mut self, id: WorkspaceId) { self.current = id; }

    pub fn workspace_of(&self, window: WindowId) -> Option<WorkspaceId> {
        self.workspaces.iter().find(|ws| ws.contains_window(window)).map(Workspace::id)
    }

    pub fn window_count(&self) -> usize { self.workspaces.iter().map(Workspace::len).sum() }

    pub fn all_windows(&self) -> Vec<WindowId> {
        self.workspaces.iter().flat_map(|ws| ws.windows().iter().copied()).collect()
    }

    pub fn add_window(&mut self, id: WorkspaceId, window: WindowId) -> bool {
        self.get_workspace_mut(id).add_window(window)
    }

    /// Removes `window` from whichever workspace holds it.
    pub fn remove_window(&mut self, window: WindowId) -> Option<WorkspaceId> {
        let id = self.workspace_of(window)?;
        let ws = self.get_workspace_mut(id);
        ws.remove_window(window);
        if ws.is_empty() {
            self.backup_workspaces.remove(&id);
        }
        self.remove_window_tracking(window);
        Some(id)
    }

    pub fn switch_to_workspace(
        &mut self,
        id: WorkspaceId,
        layout: &LayoutSettings,
    ) -> Option<WorkspaceSwitch> {
        if id == self.current {
            return None;
        }
        let hide = self.get_current_workspace().windows().to_vec();
        self.current = id;
        let work_area = self.work_area;
        let ws = self.get_workspace_mut(id);
        let placements = ws.apply_tiling(work_area, layout);
        let show = ws
            .windows()
            .iter()
            .copied()
            .filter(|w| !placements.iter().any(|p| p.window == *w))
            .collect();
        debug!(monitor = self.index, workspace = %id, hidden = hide.len(), "switched workspace");
        Some(WorkspaceSwitch { hide, show, placements })
    }

    pub fn move_window_to_workspace(
        &mut self,
        window: WindowId,
        id: WorkspaceId,
        layout: &LayoutSettings,
    ) -> Result<WorkspaceMove, WorkspaceError> {
        let from = self.workspace_of(window).ok_or(WorkspaceError::UnknownWindow(window))?;
        if from == id {
            return Ok(WorkspaceMove { from: Some(from), ..Default::default() });
        }
        self.get_workspace_mut(from).remove_window(window);
        if self.get_workspace(from).is_empty() {
            self.backup_workspaces.remove(&from);
        }
        self.get_workspace_mut(id).add_window(window);

        let work_area = self.work_area;
        let mut result = WorkspaceMove { from: Some(from), ..Default::default() };
        if from == self.current {
            result.placements = self.get_workspace_mut(from).apply_tiling(work_area, layout);
            result.hide = Some(window);
        } else if id == self.current {
            result.placements = self.get_workspace_mut(id).apply_tiling(work_area, layout);
        }
        trace!(%window, from = %from, to = %id, "moved window between workspaces");
        Ok(result)
    }

    pub fn retile_current(&mut self, layout: &LayoutSettings) -> Vec<Placement> {
        let work_area = self.work_area;
        self.get_current_workspace_mut().apply_tiling(work_area, layout)
    }

    pub fn track_window_position(&mut self, window: WindowId, rect: Rect) {
        self.positions.insert(window, rect);
    }

    pub fn remove_window_tracking(&mut self, window: WindowId) { self.positions.remove(&window); }

    pub fn tracked_position(&self, window: WindowId) -> Option<Rect> {
        self.positions.get(&window).copied()
    }

    pub fn first_empty_workspace(&self, taken: &BTreeSet<WorkspaceId>) -> Option<WorkspaceId> {
        self.workspaces
            .iter()
            .find(|ws| ws.is_empty() && !taken.contains(&ws.id()))
            .map(Workspace::id)
    }

    pub fn mark_backup_workspace(&mut self, id: WorkspaceId) { self.backup_workspaces.insert(id); }

    pub fn backup_workspaces(&self) -> Vec<WorkspaceId> {
        self.backup_workspaces.iter().copied().collect()
    }

    pub fn is_backup_workspace(&self, id: WorkspaceId) -> bool { self.backup_workspaces.contains(&id) }

    /// Empties every workspace and forgets all tracked positions.
    pub fn detach_all(&mut self) -> Vec<WindowId> {
        self.positions.clear();
        self.backup_workspaces.clear();
        self.workspaces.iter_mut().flat_map(Workspace::clear).collect()
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn w(n: u64) -> WindowId { WindowId(n) }

    fn ws(n: u8) -> WorkspaceId { WorkspaceId::new(n).unwrap() }

    fn monitor() -> Monitor {
        let info = MonitorInfo {
            handle: MonitorHandle(1),
            bounds: Rect::from_size(0, 0, 1920, 1080),
            work_area: Rect::from_size(0, 0, 1920, 1040),
            is_primary: true,
        };
        Monitor::new(0, &info, &LayoutSettings::default())
    }

    #[test]
    fn starts_with_eight_workspaces_on_the_first() {
        let m = monitor();
        assert_eq!(m.workspaces().len(), 8);
        assert_eq!(m.current(), WorkspaceId::FIRST);
        assert_eq!(m.get_current_workspace().id(), WorkspaceId::FIRST);
    }

    #[test]
    fn switching_hides_old_and_tiles_new() {
        let layout = LayoutSettings::default();
        let mut m = monitor();
        m.add_window(ws(1), w(1));
        m.add_window(ws(2), w(2));
        m.add_window(ws(2), w(3));
        m.get_workspace_mut(ws(2)).toggle_window_tiling(w(3)).unwrap();

        let switch = m.switch_to_workspace(ws(2), &layout).unwrap();
        assert_eq!(switch.hide, vec![w(1)]);
        assert_eq!(switch.show, vec![w(3)]);
        assert_eq!(switch.placements.len(), 1);
        assert_eq!(switch.placements[0].rect, Rect::from_size(0, 0, 1920, 1040));
        assert_eq!(m.current(), ws(2));
        assert!(m.switch_to_workspace(ws(2), &layout).is_none());
    }

    #[test]
    fn moving_off_the_current_workspace_hides_the_window() {
        let layout = LayoutSettings::default();
        let mut m = monitor();
        m.add_window(ws(1), w(1));
        m.add_window(ws(1), w(2));

        let moved = m.move_window_to_workspace(w(2), ws(5), &layout).unwrap();
        assert_eq!(moved.from, Some(ws(1)));
        assert_eq!(moved.hide, Some(w(2)));
        assert_eq!(moved.placements.len(), 1);
        assert_eq!(m.workspace_of(w(2)), Some(ws(5)));
        assert!(m.move_window_to_workspace(w(9), ws(2), &layout).is_err());
    }

    #[test]
    fn position_tracking() {
        let mut m = monitor();
        let r = Rect::new(1, 2, 3, 4);
        m.track_window_position(w(1), r);
        assert_eq!(m.tracked_position(w(1)), Some(r));
        m.remove_window_tracking(w(1));
        assert_eq!(m.tracked_position(w(1)), None);
    }

    #[test]
    fn backup_mark_clears_when_workspace_empties() {
        let mut m = monitor();
        m.add_window(ws(2), w(1));
        m.mark_backup_workspace(ws(2));
        assert_eq!(m.backup_workspaces(), vec![ws(2)]);
        m.remove_window(w(1));
        assert!(m.backup_workspaces().is_empty());
    }

    #[test]
    fn first_empty_skips_taken_workspaces() {
        let mut m = monitor();
        m.add_window(ws(1), w(1));
        let mut taken = BTreeSet::new();
        assert_eq!(m.first_empty_workspace(&taken), Some(ws(2)));
        taken.insert(ws(2));
        assert_eq!(m.first_empty_workspace(&taken), Some(ws(3)));
    }

    #[test]
    fn detach_all_empties_everything() {
        let mut m = monitor();
        m.add_window(ws(1), w(1));
        m.add_window(ws(4), w(2));
        m.track_window_position(w(1), Rect::default());
        let mut detached = m.detach_all();
        detached.sort();
        assert_eq!(detached, vec![w(1), w(2)]);
        assert_eq!(m.window_count(), 0);
        assert_eq!(m.tracked_position(w(1)), None);
    }
}
