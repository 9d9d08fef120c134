use std::time::Instant;

use tracing::{debug, trace, warn};

use super::monitor::{Monitor, WorkspaceSwitch};
use super::workspace::WorkspaceId;
use crate::common::config::{Config, LayoutSettings};
use crate::layout_engine::Placement;
use crate::sys::frame_correction::FrameCorrection;
use crate::sys::geometry::{Point, Rect};
use crate::sys::window::{MonitorInfo, SetRectFlags, System, WindowId, order_primary_first};

/// Every monitor we manage plus the state shared between them.
#[derive(Debug)]
pub struct Desktop {
    monitors: Vec<Monitor>,
    frames: FrameCorrection,
    layout: LayoutSettings,
}

impl Desktop {
    pub fn new(config: &Config) -> Self {
        Self {
            monitors: Vec::new(),
            frames: FrameCorrection::new(config.frames.clone()),
            layout: config.layout.clone(),
        }
    }

    pub fn layout(&self) -> &LayoutSettings { &self.layout }

    pub fn monitors(&self) -> &[Monitor] { &self.monitors }

    pub fn monitors_mut(&mut self) -> &mut [Monitor] { &mut self.monitors }

    pub fn monitor(&self, index: usize) -> Option<&Monitor> { self.monitors.get(index) }

    pub fn monitor_mut(&mut self, index: usize) -> Option<&mut Monitor> { self.monitors.get_mut(index) }

    pub fn monitor_count(&self) -> usize { self.monitors.len() }

    /// Replaces the monitor list with fresh, empty monitors for `infos`.
    pub fn set_monitors(&mut self, infos: Vec<MonitorInfo>) {
        self.monitors = order_primary_first(infos)
            .iter()
            .enumerate()
            .map(|(i, info)| Monitor::new(i, info, &self.layout))
            .collect();
        debug!(count = self.monitors.len(), "monitors rebuilt");
    }

    /// Monitor geometry in primary-first order, for topology comparisons.
    pub fn topology(&self) -> Vec<(Rect, Rect, bool)> {
        self.monitors.iter().map(|m| (m.bounds(), m.work_area(), m.is_primary())).collect()
    }

    pub fn locate(&self, window: WindowId) -> Option<(usize, WorkspaceId)> {
        self.monitors
            .iter()
            .find_map(|m| m.workspace_of(window).map(|ws| (m.index(), ws)))
    }

    pub fn contains(&self, window: WindowId) -> bool { self.locate(window).is_some() }

    pub fn total_windows(&self) -> usize { self.monitors.iter().map(Monitor::window_count).sum() }

    pub fn monitor_at_point(&self, point: Point) -> Option<usize> {
        self.monitors.iter().position(|m| m.bounds().contains(point))
    }

    /// The monitor holding the centre of `rect`, falling back to the primary.
    pub fn monitor_for_rect(&self, rect: Rect) -> usize {
        self.monitor_at_point(rect.center()).unwrap_or(0)
    }

    /// Adds every unmanaged, non-minimized top-level window to the current
    /// workspace of the monitor holding its centre. Returns how many were
    /// added.
    pub fn discover_windows(&mut self, system: &dyn System) -> usize {
        let mut discovered = 0;
        for window in system.enumerate_windows() {
            if system.is_minimized(window) || self.contains(window) {
                continue;
            }
            let Some(rect) = system.window_rect(window) else {
                warn!(%window, "skipping window without geometry");
                continue;
            };
            let index = self.monitor_for_rect(rect);
            if let Some(monitor) = self.monitors.get_mut(index) {
                let current = monitor.current();
                monitor.add_window(current, window);
                discovered += 1;
            }
        }
        discovered
    }

    pub fn remove_window(&mut self, window: WindowId) -> Option<(usize, WorkspaceId)> {
        self.frames.forget(window);
        self.monitors
            .iter_mut()
            .find_map(|m| m.remove_window(window).map(|ws| (m.index(), ws)))
    }

    pub fn detach_all(&mut self) -> Vec<WindowId> {
        self.monitors.iter_mut().flat_map(Monitor::detach_all).collect()
    }

    /// Pushes placements for windows on monitor `index` to the OS.
    ///
    /// Failures are per window: a window that refuses the move is logged and
    /// skipped. Returns the number of windows actually moved.
    pub fn apply(&mut self, system: &dyn System, index: usize, placements: &[Placement]) -> usize {
        let now = Instant::now();
        self.frames.prune(now);
        let Some(monitor) = self.monitors.get_mut(index) else {
            return 0;
        };
        let mut applied = 0;
        let mut focus = None;
        for p in placements {
            if p.rect.is_degenerate() {
                warn!(window = %p.window, rect = ?p.rect, "skipping degenerate placement");
                continue;
            }
            let outer = self.frames.outer_rect(system, p.window, p.rect, now);
            if !system.set_window_rect(p.window, outer, SetRectFlags::LAYOUT) {
                warn!(window = %p.window, "failed to move window");
                continue;
            }
            monitor.track_window_position(p.window, p.rect);
            system.set_window_visible(p.window, p.visible);
            if p.focus {
                focus = Some(p.window);
            }
            applied += 1;
        }
        if let Some(window) = focus {
            system.focus_window(window);
        }
        trace!(monitor = index, applied, total = placements.len(), "applied placements");
        applied
    }

    pub fn apply_switch(&mut self, system: &dyn System, index: usize, switch: &WorkspaceSwitch) {
        for &window in &switch.hide {
            system.set_window_visible(window, false);
        }
        for &window in &switch.show {
            system.set_window_visible(window, true);
        }
        self.apply(system, index, &switch.placements);
    }

    /// Lays out the current workspace of monitor `index`.
    pub fn retile_monitor(&mut self, system: &dyn System, index: usize) -> Vec<Placement> {
        let layout = self.layout.clone();
        let Some(monitor) = self.monitors.get_mut(index) else {
            return Vec::new();
        };
        let placements = monitor.retile_current(&layout);
        self.apply(system, index, &placements);
        placements
    }

    /// Re-tiles every workspace and makes only current workspaces visible.
    pub fn retile_all(&mut self, system: &dyn System) {
        let layout = self.layout.clone();
        for index in 0..self.monitors.len() {
            let monitor = &mut self.monitors[index];
            let current = monitor.current();
            let work_area = monitor.work_area();
            let mut shown = Vec::new();
            for id in WorkspaceId::all() {
                let ws = monitor.get_workspace_mut(id);
                if id == current {
                    shown = ws.apply_tiling(work_area, &layout);
                    for &w in ws.windows() {
                        if !shown.iter().any(|p| p.window == w) {
                            system.set_window_visible(w, true);
                        }
                    }
                } else {
                    // Keep hidden workspaces' trees current so switching to
                    // them later does not rebuild from stale membership.
                    ws.apply_tiling(work_area, &layout);
                    for &w in ws.windows() {
                        system.set_window_visible(w, false);
                    }
                }
            }
            self.apply(system, index, &shown);
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use test_log::test;

    use super::*;
    use crate::sys::headless::{HeadlessSystem, HeadlessWindow};
    use crate::sys::window::MonitorHandle;

    fn info(handle: u64, left: i32, primary: bool) -> MonitorInfo {
        MonitorInfo {
            handle: MonitorHandle(handle),
            bounds: Rect::from_size(left, 0, 1920, 1080),
            work_area: Rect::from_size(left, 0, 1920, 1040),
            is_primary: primary,
        }
    }

    fn ws(n: u8) -> WorkspaceId { WorkspaceId::new(n).unwrap() }

    #[test]
    fn monitors_are_indexed_primary_first() {
        let mut desktop = Desktop::new(&Config::default());
        desktop.set_monitors(vec![info(5, 1920, false), info(6, 0, true)]);
        assert_eq!(desktop.monitor(0).unwrap().handle(), MonitorHandle(6));
        assert_eq!(desktop.monitor(1).unwrap().index(), 1);
        assert_eq!(desktop.monitor_at_point(Point::new(2000, 10)), Some(1));
        assert_eq!(desktop.monitor_at_point(Point::new(-5, 10)), None);
    }

    #[test]
    fn apply_corrects_frames_and_tracks_positions() {
        let system = HeadlessSystem::default();
        let a = system.add_window(
            HeadlessWindow::new(Rect::new(0, 0, 100, 100)).with_invisible_border(7, 0, 7, 7),
        );
        let b = system.add_window(HeadlessWindow::new(Rect::new(0, 0, 100, 100)));
        let mut desktop = Desktop::new(&Config::default());
        desktop.set_monitors(vec![info(1, 0, true)]);
        desktop.monitor_mut(0).unwrap().add_window(ws(1), a);
        desktop.monitor_mut(0).unwrap().add_window(ws(1), b);

        let placements = desktop.retile_monitor(&system, 0);
        assert_eq!(placements.len(), 2);
        assert_eq!(system.visible_rect(a), Some(placements[0].rect));
        assert_eq!(system.window_rect(a), Some(Rect::new(-7, 0, 963, 1047)));
        assert_eq!(
            desktop.monitor(0).unwrap().tracked_position(b),
            Some(placements[1].rect)
        );
    }

    #[test]
    fn vanished_windows_are_skipped() {
        let system = HeadlessSystem::default();
        let a = system.add_window(HeadlessWindow::new(Rect::new(0, 0, 100, 100)));
        let mut desktop = Desktop::new(&Config::default());
        desktop.set_monitors(vec![info(1, 0, true)]);
        desktop.monitor_mut(0).unwrap().add_window(ws(1), a);
        desktop.monitor_mut(0).unwrap().add_window(ws(1), WindowId(404));
        let placements = desktop.monitor_mut(0).unwrap().retile_current(&LayoutSettings::default());
        assert_eq!(desktop.apply(&system, 0, &placements), 1);
    }

    #[test]
    fn retile_all_hides_non_current_workspaces() {
        let system = HeadlessSystem::default();
        let a = system.add_window(HeadlessWindow::new(Rect::new(0, 0, 100, 100)));
        let b = system.add_window(HeadlessWindow::new(Rect::new(0, 0, 100, 100)));
        let mut desktop = Desktop::new(&Config::default());
        desktop.set_monitors(vec![info(1, 0, true)]);
        desktop.monitor_mut(0).unwrap().add_window(ws(1), a);
        desktop.monitor_mut(0).unwrap().add_window(ws(2), b);
        desktop.retile_all(&system);
        assert!(system.is_visible(a));
        assert!(!system.is_visible(b));
        assert_eq!(desktop.locate(b), Some((0, ws(2))));
        assert_eq!(desktop.total_windows(), 2);
    }
}
