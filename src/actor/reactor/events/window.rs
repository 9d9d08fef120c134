use tracing::{debug, trace, warn};

use crate::actor::reactor::{Reactor, ReactorError, announce_layout};
use crate::sys::window::WindowId;

pub struct WindowEventHandler;

impl WindowEventHandler {
    /// A window became a tiling candidate: created, shown or restored.
    pub fn handle_window_appeared(reactor: &mut Reactor, window: WindowId) -> Result<(), ReactorError> {
        let shared = reactor.shared.clone();
        let system = &*shared.system;
        let mut desktop = shared.desktop.lock();
        if desktop.contains(window) {
            trace!(%window, "already managed");
            return Ok(());
        }
        if !system.is_window(window) || system.is_minimized(window) {
            debug!(%window, "ignoring window that is gone or minimized");
            return Ok(());
        }
        let Some(rect) = system.window_rect(window) else {
            warn!(%window, "could not read window geometry");
            return Ok(());
        };
        let index = desktop.monitor_for_rect(rect);
        let Some(monitor) = desktop.monitor_mut(index) else {
            return Ok(());
        };
        let current = monitor.current();
        monitor.add_window(current, window);
        debug!(%window, monitor = index, workspace = %current, "managing window");
        desktop.retile_monitor(system, index);
        announce_layout(&reactor.broadcast, &desktop, index);
        Ok(())
    }

    pub fn handle_window_destroyed(reactor: &mut Reactor, window: WindowId) -> Result<(), ReactorError> {
        reactor.drag_manager.cancel(window);
        if reactor.focused == Some(window) {
            reactor.focused = None;
        }
        Self::forget(reactor, window)
    }

    pub fn handle_window_minimized(reactor: &mut Reactor, window: WindowId) -> Result<(), ReactorError> {
        reactor.drag_manager.cancel(window);
        Self::forget(reactor, window)
    }

    pub fn handle_window_focused(reactor: &mut Reactor, window: WindowId) -> Result<(), ReactorError> {
        let shared = reactor.shared.clone();
        let mut desktop = shared.desktop.lock();
        let (index, id) = desktop.locate(window).ok_or(ReactorError::Unmanaged(window))?;
        reactor.focused = Some(window);
        let Some(monitor) = desktop.monitor_mut(index) else {
            return Ok(());
        };
        let ws = monitor.get_workspace_mut(id);
        let was_showing = ws.stacked_window();
        ws.set_last_active(window);
        // Focusing a hidden stacked window brings it to the front.
        if ws.is_stacked() && was_showing != Some(window) && id == monitor.current() {
            desktop.retile_monitor(&*shared.system, index);
        }
        Ok(())
    }

    fn forget(reactor: &mut Reactor, window: WindowId) -> Result<(), ReactorError> {
        let shared = reactor.shared.clone();
        let mut desktop = shared.desktop.lock();
        let (index, id) = desktop.remove_window(window).ok_or(ReactorError::Unmanaged(window))?;
        debug!(%window, monitor = index, workspace = %id, "stopped managing window");
        let on_screen = desktop.monitor(index).is_some_and(|m| m.current() == id);
        if on_screen {
            desktop.retile_monitor(&*shared.system, index);
            announce_layout(&reactor.broadcast, &desktop, index);
        }
        Ok(())
    }
}
