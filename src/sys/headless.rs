//! An in-memory [`System`] for replaying recorded sessions and for tests.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use super::frame_correction::FrameInsets;
use super::geometry::Rect;
use super::window::{MonitorInfo, SetRectFlags, System, SystemError, WindowId};
use crate::common::collections::{BTreeMap, VecDeque};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeadlessWindow {
    /// Outer rectangle, invisible border included.
    pub rect: Rect,
    #[serde(default)]
    pub invisible_border: FrameInsets,
    /// Client area inset from the outer rectangle.
    #[serde(default)]
    pub client_insets: FrameInsets,
    #[serde(default = "yes")]
    pub reports_extended_frame: bool,
    #[serde(default)]
    pub class: Option<String>,
    #[serde(default)]
    pub process: Option<String>,
    #[serde(default = "yes")]
    pub visible: bool,
    #[serde(default)]
    pub minimized: bool,
}

fn yes() -> bool { true }

impl HeadlessWindow {
    pub fn new(rect: Rect) -> Self {
        Self {
            rect,
            invisible_border: FrameInsets::ZERO,
            client_insets: FrameInsets::ZERO,
            reports_extended_frame: true,
            class: None,
            process: None,
            visible: true,
            minimized: false,
        }
    }

    pub fn with_invisible_border(mut self, left: i32, top: i32, right: i32, bottom: i32) -> Self {
        self.invisible_border = FrameInsets { left, top, right, bottom };
        self
    }

    pub fn with_client_insets(mut self, left: i32, top: i32, right: i32, bottom: i32) -> Self {
        self.client_insets = FrameInsets { left, top, right, bottom };
        self
    }

    pub fn without_extended_frame_bounds(mut self) -> Self {
        self.reports_extended_frame = false;
        self
    }

    pub fn with_class(mut self, class: &str) -> Self {
        self.class = Some(class.to_string());
        self
    }

    pub fn with_process(mut self, process: &str) -> Self {
        self.process = Some(process.to_string());
        self
    }

    /// The rectangle the user actually sees.
    pub fn visible_rect(&self) -> Rect {
        let b = self.invisible_border;
        self.rect.inset_edges(b.left, b.top, b.right, b.bottom)
    }
}

#[derive(Default)]
struct State {
    windows: BTreeMap<WindowId, HeadlessWindow>,
    next_id: u64,
    monitors: Vec<MonitorInfo>,
    set_rect_calls: Vec<(WindowId, Rect)>,
    focused: Option<WindowId>,
    pending_errors: VecDeque<String>,
    pending_panics: usize,
}

#[derive(Default)]
pub struct HeadlessSystem {
    state: Mutex<State>,
}

impl HeadlessSystem {
    pub fn new(monitors: Vec<MonitorInfo>) -> Self {
        let system = Self::default();
        system.set_monitors(monitors);
        system
    }

    pub fn add_window(&self, window: HeadlessWindow) -> WindowId {
        let mut state = self.state.lock();
        state.next_id += 1;
        let id = WindowId(state.next_id);
        state.windows.insert(id, window);
        id
    }

    pub fn insert_window(&self, id: WindowId, window: HeadlessWindow) {
        let mut state = self.state.lock();
        state.next_id = state.next_id.max(id.0);
        state.windows.insert(id, window);
    }

    pub fn destroy_window(&self, id: WindowId) -> Option<HeadlessWindow> {
        self.state.lock().windows.remove(&id)
    }

    pub fn update_window(&self, id: WindowId, f: impl FnOnce(&mut HeadlessWindow)) {
        if let Some(window) = self.state.lock().windows.get_mut(&id) {
            f(window);
        }
    }

    pub fn window(&self, id: WindowId) -> Option<HeadlessWindow> {
        self.state.lock().windows.get(&id).cloned()
    }

    pub fn visible_rect(&self, id: WindowId) -> Option<Rect> {
        self.state.lock().windows.get(&id).map(HeadlessWindow::visible_rect)
    }

    pub fn is_visible(&self, id: WindowId) -> bool {
        self.state.lock().windows.get(&id).is_some_and(|w| w.visible)
    }

    pub fn focused(&self) -> Option<WindowId> { self.state.lock().focused }

    pub fn set_monitors(&self, monitors: Vec<MonitorInfo>) { self.state.lock().monitors = monitors; }

    /// The next `count` calls to `enumerate_monitors` fail.
    pub fn fail_enumerations(&self, count: usize) {
        self.state.lock().pending_errors =
            (0..count).map(|i| format!("device not ready (attempt {})", i + 1)).collect();
    }

    /// The next `count` calls to `enumerate_monitors` panic, standing in
    /// for a misbehaving driver.
    pub fn panic_enumerations(&self, count: usize) { self.state.lock().pending_panics = count; }

    pub fn set_rect_calls(&self) -> Vec<(WindowId, Rect)> { self.state.lock().set_rect_calls.clone() }

    pub fn clear_calls(&self) { self.state.lock().set_rect_calls.clear(); }
}

impl System for HeadlessSystem {
    fn window_rect(&self, window: WindowId) -> Option<Rect> {
        self.state.lock().windows.get(&window).map(|w| w.rect)
    }

    fn set_window_rect(&self, window: WindowId, rect: Rect, _flags: SetRectFlags) -> bool {
        let mut state = self.state.lock();
        let Some(w) = state.windows.get_mut(&window) else {
            return false;
        };
        w.rect = rect;
        state.set_rect_calls.push((window, rect));
        true
    }

    fn extended_frame_bounds(&self, window: WindowId) -> Option<Rect> {
        let state = self.state.lock();
        let w = state.windows.get(&window)?;
        w.reports_extended_frame.then(|| w.visible_rect())
    }

    fn client_rect_on_screen(&self, window: WindowId) -> Option<Rect> {
        let state = self.state.lock();
        let w = state.windows.get(&window)?;
        let c = w.client_insets;
        Some(w.rect.inset_edges(c.left, c.top, c.right, c.bottom))
    }

    fn window_class(&self, window: WindowId) -> Option<String> {
        self.state.lock().windows.get(&window).and_then(|w| w.class.clone())
    }

    fn process_name(&self, window: WindowId) -> Option<String> {
        self.state.lock().windows.get(&window).and_then(|w| w.process.clone())
    }

    fn set_window_visible(&self, window: WindowId, visible: bool) {
        if let Some(w) = self.state.lock().windows.get_mut(&window) {
            w.visible = visible;
        }
    }

    fn focus_window(&self, window: WindowId) {
        let mut state = self.state.lock();
        if state.windows.contains_key(&window) {
            state.focused = Some(window);
        }
    }

    fn is_window(&self, window: WindowId) -> bool { self.state.lock().windows.contains_key(&window) }

    fn is_minimized(&self, window: WindowId) -> bool {
        self.state.lock().windows.get(&window).is_some_and(|w| w.minimized)
    }

    fn enumerate_monitors(&self) -> Result<Vec<MonitorInfo>, SystemError> {
        let mut state = self.state.lock();
        if state.pending_panics > 0 {
            state.pending_panics -= 1;
            drop(state);
            panic!("monitor enumeration crashed");
        }
        if let Some(reason) = state.pending_errors.pop_front() {
            return Err(SystemError::Enumeration(reason));
        }
        Ok(state.monitors.clone())
    }

    fn enumerate_windows(&self) -> Vec<WindowId> {
        self.state
            .lock()
            .windows
            .iter()
            .filter(|(_, w)| !w.minimized)
            .map(|(id, _)| *id)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::sys::window::MonitorHandle;

    #[test]
    fn records_geometry_writes() {
        let system = HeadlessSystem::default();
        let w = system.add_window(HeadlessWindow::new(Rect::new(0, 0, 10, 10)));
        assert!(system.set_window_rect(w, Rect::new(5, 5, 50, 50), SetRectFlags::LAYOUT));
        assert!(!system.set_window_rect(WindowId(404), Rect::default(), SetRectFlags::LAYOUT));
        assert_eq!(system.set_rect_calls(), vec![(w, Rect::new(5, 5, 50, 50))]);
        assert_eq!(system.window_rect(w), Some(Rect::new(5, 5, 50, 50)));
    }

    #[test]
    fn scripted_enumeration_failures() {
        let monitor = MonitorInfo {
            handle: MonitorHandle(1),
            bounds: Rect::from_size(0, 0, 1920, 1080),
            work_area: Rect::from_size(0, 0, 1920, 1040),
            is_primary: true,
        };
        let system = HeadlessSystem::new(vec![monitor.clone()]);
        system.fail_enumerations(2);
        assert!(system.enumerate_monitors().is_err());
        assert!(system.enumerate_monitors().is_err());
        assert_eq!(system.enumerate_monitors().unwrap(), vec![monitor]);
    }

    #[test]
    fn minimized_windows_are_not_enumerated() {
        let system = HeadlessSystem::default();
        let a = system.add_window(HeadlessWindow::new(Rect::new(0, 0, 10, 10)));
        let b = system.add_window(HeadlessWindow::new(Rect::new(0, 0, 10, 10)));
        system.update_window(b, |w| w.minimized = true);
        assert_eq!(system.enumerate_windows(), vec![a]);
        assert!(system.is_minimized(b));
    }
}
