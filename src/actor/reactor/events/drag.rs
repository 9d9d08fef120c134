use std::time::Instant;

use tracing::{debug, trace, warn};

use crate::actor::drag_swap::{DragKind, FinishedDrag};
use crate::actor::reactor::{Reactor, ReactorError, announce_layout};
use crate::layout_engine::Placement;
use crate::layout_engine::resize::moved_edges;
use crate::model::Desktop;
use crate::sys::geometry::{Point, Rect};
use crate::sys::window::{System, WindowId};

pub struct DragEventHandler;

impl DragEventHandler {
    pub fn handle_move_size_start(
        reactor: &mut Reactor,
        window: WindowId,
        pointer: Point,
        now: Instant,
    ) -> Result<(), ReactorError> {
        reactor.drag_manager.expire_stale(now);
        let shared = reactor.shared.clone();
        let desktop = shared.desktop.lock();
        let (index, id) = desktop.locate(window).ok_or(ReactorError::Unmanaged(window))?;
        let Some(monitor) = desktop.monitor(index) else {
            return Ok(());
        };
        let ws = monitor.get_workspace(id);
        if id != monitor.current() || ws.is_paused() || ws.is_stacked() || ws.is_excluded(window) {
            trace!(%window, "not tracking drag outside the tiled layout");
            return Ok(());
        }
        let Some(initial) = monitor
            .tracked_position(window)
            .or_else(|| ws.tile_rect(window))
            .or_else(|| visible_rect(&*shared.system, window))
        else {
            warn!(%window, "drag started on a window without geometry");
            return Ok(());
        };
        reactor.drag_manager.begin(window, index, id, initial, pointer, now);
        Ok(())
    }

    pub fn handle_location_changed(
        reactor: &mut Reactor,
        window: WindowId,
        pointer: Point,
        now: Instant,
    ) -> Result<(), ReactorError> {
        reactor.drag_manager.expire_stale(now);
        let Some(state) = reactor.drag_manager.state().filter(|s| s.window == window) else {
            return Ok(());
        };
        let candidates = {
            let desktop = reactor.shared.desktop.lock();
            let Some(monitor) = desktop.monitor(state.monitor) else {
                return Ok(());
            };
            let ws = monitor.get_workspace(state.workspace);
            ws.get_tileable_windows()
                .into_iter()
                .filter_map(|w| ws.tile_rect(w).map(|r| (w, r)))
                .collect::<Vec<_>>()
        };
        reactor.drag_manager.update(window, pointer, &candidates, now);
        Ok(())
    }

    pub fn handle_move_size_end(
        reactor: &mut Reactor,
        window: WindowId,
        pointer: Point,
        now: Instant,
    ) -> Result<(), ReactorError> {
        reactor.drag_manager.expire_stale(now);
        let Some(finished) = reactor.drag_manager.finish(window, pointer, now) else {
            return Self::snap_back(reactor, window);
        };
        let shared = reactor.shared.clone();
        let system = &*shared.system;
        let mut desktop = shared.desktop.lock();
        let source = finished.state.monitor;
        let location = desktop.locate(window);
        if location != Some((source, finished.state.workspace)) {
            debug!(%window, ?location, "window left its workspace during the drag");
            let mut touched = vec![source];
            touched.extend(location.map(|(index, _)| index).filter(|&index| index != source));
            for index in touched {
                desktop.retile_monitor(system, index);
                announce_layout(&reactor.broadcast, &desktop, index);
            }
            return Ok(());
        }

        if finished.qualifies {
            if let Some(target) = finished.state.target {
                return Self::swap(reactor, &mut desktop, system, &finished, target, now);
            }
            if let Some(destination) = Self::empty_monitor_under(&desktop, &finished) {
                return Self::move_to_monitor(reactor, &mut desktop, system, &finished, destination);
            }
        }
        if !Self::commit_resize(reactor, &mut desktop, system, &finished) {
            desktop.retile_monitor(system, finished.state.monitor);
        }
        Ok(())
    }

    fn swap(
        reactor: &mut Reactor,
        desktop: &mut Desktop,
        system: &dyn System,
        finished: &FinishedDrag,
        target: WindowId,
        now: Instant,
    ) -> Result<(), ReactorError> {
        let window = finished.state.window;
        let index = finished.state.monitor;
        if !reactor.drag_manager.cooldown_allows(window, target, now) {
            debug!(%window, %target, "swap suppressed by cooldown");
            desktop.retile_monitor(system, index);
            return Ok(());
        }
        let target_before = desktop.monitor(index).and_then(|m| m.tracked_position(target));
        let Some(monitor) = desktop.monitor_mut(index) else {
            return Ok(());
        };
        let swapped = monitor.get_workspace_mut(finished.state.workspace).swap_windows(window, target);
        match swapped {
            Ok(placements) => {
                reactor.drag_manager.record_swap(window, target, now);
                debug!(%window, %target, "swapped by drag");
                desktop.apply(system, index, &placements);
                announce_layout(&reactor.broadcast, desktop, index);
                Ok(())
            }
            Err(err) => {
                warn!(%window, %target, %err, "drag swap failed, reverting");
                let mut revert = vec![Placement::tiled(window, finished.state.initial_rect)];
                revert.extend(target_before.map(|r| Placement::tiled(target, r)));
                desktop.apply(system, index, &revert);
                Err(err.into())
            }
        }
    }

    /// A monitor other than the source whose current workspace is empty and
    /// that contains the release point.
    fn empty_monitor_under(desktop: &Desktop, finished: &FinishedDrag) -> Option<usize> {
        let index = desktop.monitor_at_point(finished.pointer)?;
        let monitor = desktop.monitor(index)?;
        (index != finished.state.monitor && monitor.get_current_workspace().is_empty())
            .then_some(index)
    }

    fn move_to_monitor(
        reactor: &Reactor,
        desktop: &mut Desktop,
        system: &dyn System,
        finished: &FinishedDrag,
        destination: usize,
    ) -> Result<(), ReactorError> {
        let window = finished.state.window;
        let source = finished.state.monitor;
        if let Some(monitor) = desktop.monitor_mut(source) {
            monitor.remove_window(window);
        }
        let Some(monitor) = desktop.monitor_mut(destination) else {
            return Ok(());
        };
        let current = monitor.current();
        monitor.add_window(current, window);
        debug!(%window, from = source, to = destination, "moved window to another monitor");
        for index in [source, destination] {
            desktop.retile_monitor(system, index);
            announce_layout(&reactor.broadcast, desktop, index);
        }
        Ok(())
    }

    /// Turns a border drag into split changes. Returns whether anything
    /// changed.
    fn commit_resize(
        reactor: &Reactor,
        desktop: &mut Desktop,
        system: &dyn System,
        finished: &FinishedDrag,
    ) -> bool {
        let window = finished.state.window;
        let before = finished.state.initial_rect;
        let Some(after) = visible_rect(system, window) else {
            return false;
        };
        if after.width() == before.width() && after.height() == before.height() {
            return false;
        }
        if let DragKind::Move = finished.state.kind {
            trace!(%window, "size changed during a move gesture");
        }
        let index = finished.state.monitor;
        let Some(monitor) = desktop.monitor_mut(index) else {
            return false;
        };
        let ws = monitor.get_workspace_mut(finished.state.workspace);
        let mut placements = None;
        for (edge, pixels) in moved_edges(before, after) {
            match ws.resize_edge(window, edge, pixels) {
                Ok(p) if !p.is_empty() => placements = Some(p),
                Ok(_) => {}
                Err(err) => debug!(%window, ?edge, pixels, %err, "edge resize rejected"),
            }
        }
        let Some(placements) = placements else {
            return false;
        };
        desktop.apply(system, index, &placements);
        announce_layout(&reactor.broadcast, desktop, index);
        true
    }

    /// Puts a window whose gesture we did not see back into its tile.
    fn snap_back(reactor: &mut Reactor, window: WindowId) -> Result<(), ReactorError> {
        let shared = reactor.shared.clone();
        let mut desktop = shared.desktop.lock();
        let (index, id) = desktop.locate(window).ok_or(ReactorError::Unmanaged(window))?;
        if desktop.monitor(index).is_some_and(|m| m.current() == id) {
            desktop.retile_monitor(&*shared.system, index);
        }
        Ok(())
    }
}

fn visible_rect(system: &dyn System, window: WindowId) -> Option<Rect> {
    system.extended_frame_bounds(window).or_else(|| system.window_rect(window))
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use test_log::test;

    use crate::actor::reactor::{Command, Event};
    use crate::actor::reactor::tests::{Harness, harness, harness_with, monitor, test_config};
    use crate::model::WorkspaceId;
    use crate::sys::geometry::{Point, Rect};
    use crate::sys::window::WindowId;

    const W1: WindowId = WindowId(1);
    const W2: WindowId = WindowId(2);
    const W3: WindowId = WindowId(3);

    fn start(window: WindowId, pointer: Point, time: u64) -> Event {
        Event::MoveSizeStart { window, pointer, time: Some(time) }
    }

    fn moved(window: WindowId, pointer: Point, time: u64) -> Event {
        Event::LocationChanged { window, pointer, time: Some(time) }
    }

    fn end(window: WindowId, pointer: Point, time: u64) -> Event {
        Event::MoveSizeEnd { window, pointer, time: Some(time) }
    }

    /// A 40ms drag starting at `at`.
    fn drag(h: &mut Harness, window: WindowId, from: Point, to: Point, at: u64) {
        h.reactor.handle_event(start(window, from, at));
        h.reactor.handle_event(moved(window, to, at + 10));
        h.reactor.handle_event(end(window, to, at + 40));
    }

    fn no_cooldown() -> Harness {
        let mut config = test_config();
        config.drag.cooldown_ms = 0;
        harness_with(config, vec![monitor(1, 0, true)], 3)
    }

    #[test]
    fn dragging_onto_a_window_swaps_and_repeating_reverses() {
        let mut h = no_cooldown();
        let top = Rect::new(964, 0, 1920, 536);
        let bottom = Rect::new(964, 544, 1920, 1080);

        drag(&mut h, W2, Point::new(1400, 10), Point::new(1400, 800), 0);
        assert_eq!(h.rect(2), bottom);
        assert_eq!(h.rect(3), top);
        assert_eq!(h.tile(2), Some(bottom));

        drag(&mut h, W2, Point::new(1400, 560), Point::new(1400, 300), 100);
        assert_eq!(h.rect(2), top);
        assert_eq!(h.rect(3), bottom);
        assert_eq!(h.rect(1), Rect::new(0, 0, 956, 1080));
    }

    #[test]
    fn repeated_swaps_within_cooldown_are_ignored() {
        let mut h = harness(3);
        drag(&mut h, W2, Point::new(1400, 10), Point::new(1400, 800), 0);
        assert_eq!(h.rect(2), Rect::new(964, 544, 1920, 1080));

        drag(&mut h, W2, Point::new(1400, 560), Point::new(1400, 300), 100);
        assert_eq!(h.rect(2), Rect::new(964, 544, 1920, 1080));
        assert_eq!(h.rect(3), Rect::new(964, 0, 1920, 536));
    }

    #[test]
    fn quick_flicks_do_not_swap() {
        let mut h = harness(3);
        h.reactor.handle_event(start(W2, Point::new(1400, 10), 0));
        h.reactor.handle_event(moved(W2, Point::new(1400, 800), 5));
        h.reactor.handle_event(end(W2, Point::new(1400, 800), 10));
        assert_eq!(h.rect(2), Rect::new(964, 0, 1920, 536));
        assert_eq!(h.rect(3), Rect::new(964, 544, 1920, 1080));
    }

    #[test]
    fn dropping_on_empty_space_snaps_back() {
        let mut h = harness(2);
        h.system.update_window(W1, |w| w.rect = Rect::from_size(300, 300, 956, 1080));
        drag(&mut h, W1, Point::new(400, 10), Point::new(500, 400), 0);
        assert_eq!(h.rect(1), Rect::new(0, 0, 956, 1080));
    }

    #[test]
    fn dropping_on_an_empty_monitor_moves_the_window() {
        let mut h = harness_with(test_config(), vec![monitor(1, 0, true), monitor(2, 1920, false)], 2);
        drag(&mut h, W1, Point::new(400, 10), Point::new(2500, 500), 0);
        assert_eq!(h.reactor.shared.desktop.lock().locate(W1), Some((1, WorkspaceId::FIRST)));
        assert_eq!(h.rect(1), Rect::new(1920, 0, 3840, 1080));
        assert_eq!(h.rect(2), Rect::new(0, 0, 1920, 1080));
    }

    #[test]
    fn border_drag_moves_the_split() {
        let mut h = harness(2);
        h.reactor.handle_event(start(W1, Point::new(952, 500), 0));
        h.system.update_window(W1, |w| w.rect.right = 1056);
        h.reactor.handle_event(moved(W1, Point::new(1052, 500), 20));
        h.reactor.handle_event(end(W1, Point::new(1052, 500), 60));
        assert_eq!(h.rect(1), Rect::new(0, 0, 1056, 1080));
        assert_eq!(h.rect(2), Rect::new(1064, 0, 1920, 1080));
    }

    #[test]
    fn border_drag_past_minimum_reverts() {
        let mut h = harness(2);
        h.reactor.handle_event(start(W1, Point::new(952, 500), 0));
        h.system.update_window(W1, |w| w.rect.right = 1700);
        h.reactor.handle_event(end(W1, Point::new(1700, 500), 60));
        assert_eq!(h.rect(1), Rect::new(0, 0, 956, 1080));
        assert_eq!(h.rect(2), Rect::new(964, 0, 1920, 1080));
    }

    #[test]
    fn abandoned_gesture_is_replaced() {
        let mut h = no_cooldown();
        h.reactor.handle_event(start(W3, Point::new(1400, 560), 0));
        drag(&mut h, W2, Point::new(1400, 10), Point::new(1400, 800), 100);
        assert_eq!(h.rect(2), Rect::new(964, 544, 1920, 1080));
        assert!(h.reactor.drag_manager.state().is_none());
    }

    #[test]
    fn window_moved_away_mid_drag_leaves_the_source_tiled() {
        let mut h = harness(3);
        let ws3 = WorkspaceId::new(3).unwrap();
        h.reactor.handle_event(start(W2, Point::new(1400, 10), 0));
        h.reactor.handle_event(moved(W2, Point::new(1400, 800), 10));
        h.reactor.handle_event(Event::WindowFocused(W2));
        h.reactor.handle_event(Event::Command(Command::MoveWindowToWorkspace(ws3)));
        h.system.update_window(W3, |w| w.rect = Rect::from_size(1200, 300, 400, 400));
        h.system.update_window(W1, |w| w.rect = Rect::from_size(50, 50, 400, 400));

        h.reactor.handle_event(end(W2, Point::new(1400, 800), 40));
        assert_eq!(h.reactor.shared.desktop.lock().locate(W2), Some((0, ws3)));
        assert_eq!(h.rect(1), Rect::new(0, 0, 956, 1080));
        assert_eq!(h.rect(3), Rect::new(964, 0, 1920, 1080));
        assert!(h.reactor.drag_manager.state().is_none());
    }
}
