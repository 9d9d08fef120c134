//! Snapshots of workspace contents keyed by monitor role.
//!
//! OS monitor handles are reassigned on hot-plug, so backups are keyed by
//! (monitor count, position in primary-first order) instead. One generation
//! is kept per count so that returning to a count seen earlier restores the
//! layout from that time.

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use super::monitor::Monitor;
use super::workspace::WorkspaceId;
use crate::common::collections::BTreeMap;
use crate::sys::geometry::Rect;
use crate::sys::window::WindowId;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkspaceBackup {
    pub windows: Vec<WindowId>,
    pub stacked: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitorBackup {
    pub workspaces: BTreeMap<WorkspaceId, WorkspaceBackup>,
    pub current: WorkspaceId,
    pub bounds: Rect,
}

impl MonitorBackup {
    pub fn capture(monitor: &Monitor) -> Self {
        let workspaces = monitor
            .workspaces()
            .iter()
            .filter(|ws| !ws.is_empty())
            .map(|ws| {
                (ws.id(), WorkspaceBackup {
                    windows: ws.windows().to_vec(),
                    stacked: ws.is_stacked(),
                })
            })
            .collect();
        Self {
            workspaces,
            current: monitor.current(),
            bounds: monitor.bounds(),
        }
    }

    pub fn window_count(&self) -> usize { self.workspaces.values().map(|ws| ws.windows.len()).sum() }

    pub fn is_empty(&self) -> bool { self.window_count() == 0 }

    pub fn windows(&self) -> impl Iterator<Item = (WorkspaceId, WindowId)> + '_ {
        self.workspaces
            .iter()
            .flat_map(|(&id, ws)| ws.windows.iter().map(move |&w| (id, w)))
    }
}

pub type PositionBackups = BTreeMap<usize, MonitorBackup>;

#[derive(Debug, Default, Clone)]
pub struct BackupStore {
    by_count: BTreeMap<usize, PositionBackups>,
}

impl BackupStore {
    /// Stores `backup` unless that would replace a non-empty backup with an
    /// empty one. Returns whether the slot was written.
    pub fn record(&mut self, count: usize, position: usize, backup: MonitorBackup) -> bool {
        if count == 0 {
            return false;
        }
        let slots = self.by_count.entry(count).or_default();
        if let Some(existing) = slots.get(&position) {
            if backup.is_empty() && !existing.is_empty() {
                debug!(count, position, "keeping non-empty backup over empty capture");
                return false;
            }
        }
        trace!(count, position, windows = backup.window_count(), "recorded backup");
        slots.insert(position, backup);
        true
    }

    /// Records every monitor under the current monitor count.
    pub fn capture_all(&mut self, monitors: &[Monitor]) {
        let count = monitors.len();
        for monitor in monitors {
            self.record(count, monitor.index(), MonitorBackup::capture(monitor));
        }
    }

    pub fn get(&self, count: usize) -> Option<&PositionBackups> { self.by_count.get(&count) }

    /// Known counts from largest to smallest.
    pub fn counts_descending(&self) -> impl Iterator<Item = (usize, &PositionBackups)> {
        self.by_count.iter().rev().map(|(&count, slots)| (count, slots))
    }

    pub fn is_empty(&self) -> bool { self.by_count.is_empty() }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::common::config::LayoutSettings;
    use crate::sys::window::{MonitorHandle, MonitorInfo};

    fn monitor(index: usize, windows: &[(u8, u64)]) -> Monitor {
        let info = MonitorInfo {
            handle: MonitorHandle(index as u64 + 10),
            bounds: Rect::from_size(1920 * index as i32, 0, 1920, 1080),
            work_area: Rect::from_size(1920 * index as i32, 0, 1920, 1040),
            is_primary: index == 0,
        };
        let mut m = Monitor::new(index, &info, &LayoutSettings::default());
        for &(ws, w) in windows {
            m.add_window(WorkspaceId::new(ws).unwrap(), WindowId(w));
        }
        m
    }

    #[test]
    fn capture_skips_empty_workspaces() {
        let backup = MonitorBackup::capture(&monitor(0, &[(1, 1), (3, 2), (3, 3)]));
        assert_eq!(backup.workspaces.len(), 2);
        assert_eq!(backup.window_count(), 3);
        assert_eq!(backup.current, WorkspaceId::FIRST);
    }

    #[test]
    fn empty_capture_never_overwrites_populated_backup() {
        let mut store = BackupStore::default();
        assert!(store.record(2, 1, MonitorBackup::capture(&monitor(1, &[(3, 7)]))));
        assert!(!store.record(2, 1, MonitorBackup::capture(&monitor(1, &[]))));
        assert_eq!(store.get(2).unwrap()[&1].window_count(), 1);
        assert!(store.record(2, 1, MonitorBackup::capture(&monitor(1, &[(2, 8), (2, 9)]))));
        assert_eq!(store.get(2).unwrap()[&1].window_count(), 2);
    }

    #[test]
    fn zero_monitors_record_nothing() {
        let mut store = BackupStore::default();
        store.capture_all(&[]);
        assert!(store.is_empty());
    }

    #[test]
    fn counts_iterate_largest_first() {
        let mut store = BackupStore::default();
        store.capture_all(&[monitor(0, &[(1, 1)])]);
        store.capture_all(&[monitor(0, &[(1, 1)]), monitor(1, &[]), monitor(2, &[(1, 2)])]);
        store.capture_all(&[monitor(0, &[(1, 1)]), monitor(1, &[(1, 3)])]);
        let counts: Vec<usize> = store.counts_descending().map(|(c, _)| c).collect();
        assert_eq!(counts, vec![3, 2, 1]);
    }
}
