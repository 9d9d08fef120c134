use tracing::{debug, info};

use crate::actor::broadcast::BroadcastEvent;
use crate::actor::reactor::{Command, Reactor, ReactorError, announce_indicator, announce_layout};
use crate::layout_engine::Placement;
use crate::model::{Desktop, Workspace};
use crate::sys::window::WindowId;

pub struct CommandEventHandler;

impl CommandEventHandler {
    pub fn handle_command(reactor: &mut Reactor, command: Command) -> Result<(), ReactorError> {
        info!(?command);
        let shared = reactor.shared.clone();
        let system = &*shared.system;
        let mut desktop = shared.desktop.lock();
        let index = reactor.active_monitor(&desktop);
        let layout = desktop.layout().clone();
        let Some(monitor) = desktop.monitor(index) else {
            return Ok(());
        };
        let work_area = monitor.work_area();
        let current = monitor.current();

        match command {
            Command::FocusDirection(direction) => {
                let window = focused_on_current(reactor, &desktop, index)?;
                let ws = current_workspace(&mut desktop, index);
                let Some(target) = ws.get_window_in_direction(window, direction) else {
                    debug!(%window, ?direction, "nothing to focus");
                    return Ok(());
                };
                ws.set_last_active(target);
                reactor.focused = Some(target);
                system.focus_window(target);
            }
            Command::SwapDirection(direction) => {
                let window = focused_on_current(reactor, &desktop, index)?;
                let placements =
                    current_workspace(&mut desktop, index).swap_window_in_direction(window, direction)?;
                apply(reactor, &mut desktop, index, &placements);
            }
            Command::ResizeSplit(delta) => {
                let window = focused_on_current(reactor, &desktop, index)?;
                let placements = current_workspace(&mut desktop, index).resize_split(window, delta)?;
                apply(reactor, &mut desktop, index, &placements);
            }
            Command::SwitchWorkspace(id) => {
                let Some(monitor) = desktop.monitor_mut(index) else {
                    return Ok(());
                };
                let Some(switch) = monitor.switch_to_workspace(id, &layout) else {
                    return Ok(());
                };
                reactor.focused = monitor.get_current_workspace().last_active();
                desktop.apply_switch(system, index, &switch);
                reactor.broadcast.send(BroadcastEvent::WorkspaceChanged { monitor: index, workspace: id });
                announce_indicator(&reactor.broadcast, &desktop, index);
                announce_layout(&reactor.broadcast, &desktop, index);
            }
            Command::MoveWindowToWorkspace(id) => {
                let window = focused_on_current(reactor, &desktop, index)?;
                let Some(monitor) = desktop.monitor_mut(index) else {
                    return Ok(());
                };
                let moved = monitor.move_window_to_workspace(window, id, &layout)?;
                if let Some(hidden) = moved.hide {
                    system.set_window_visible(hidden, false);
                    monitor.remove_window_tracking(hidden);
                    reactor.focused = None;
                }
                apply(reactor, &mut desktop, index, &moved.placements);
                announce_indicator(&reactor.broadcast, &desktop, index);
            }
            Command::ToggleStacked => {
                let placements =
                    current_workspace(&mut desktop, index).toggle_stacked_mode(work_area, &layout);
                apply(reactor, &mut desktop, index, &placements);
            }
            Command::TogglePaused => {
                let placements =
                    current_workspace(&mut desktop, index).toggle_paused_mode(work_area, &layout);
                apply(reactor, &mut desktop, index, &placements);
            }
            Command::CycleStacked(step) => {
                let ws = current_workspace(&mut desktop, index);
                let placements = ws.cycle_stacked_window(step, work_area, &layout);
                reactor.focused = ws.stacked_window().or(reactor.focused);
                apply(reactor, &mut desktop, index, &placements);
            }
            Command::JumpToStacked(position) => {
                let ws = current_workspace(&mut desktop, index);
                let placements = ws.jump_to_stacked_window(position, work_area, &layout);
                reactor.focused = ws.stacked_window().or(reactor.focused);
                apply(reactor, &mut desktop, index, &placements);
            }
            Command::ToggleWindowTiling => {
                let window = focused_on_current(reactor, &desktop, index)?;
                let tiled = current_workspace(&mut desktop, index).toggle_window_tiling(window)?;
                debug!(%window, tiled, "toggled tiling");
                desktop.retile_monitor(system, index);
                announce_layout(&reactor.broadcast, &desktop, index);
            }
            Command::Retile => {
                desktop.retile_all(system);
                for index in 0..desktop.monitor_count() {
                    announce_layout(&reactor.broadcast, &desktop, index);
                }
            }
        }
        debug!(monitor = index, workspace = %current, "command handled");
        Ok(())
    }
}

/// The focused window, provided it lives on the current workspace of
/// `index`.
fn focused_on_current(reactor: &Reactor, desktop: &Desktop, index: usize) -> Result<WindowId, ReactorError> {
    let window = reactor.focused.ok_or(ReactorError::NoFocus)?;
    let monitor = desktop.monitor(index).ok_or(ReactorError::Unmanaged(window))?;
    if monitor.get_current_workspace().contains_window(window) {
        Ok(window)
    } else {
        Err(ReactorError::Unmanaged(window))
    }
}

/// Only called once `index` is known to name an existing monitor.
fn current_workspace(desktop: &mut Desktop, index: usize) -> &mut Workspace {
    desktop.monitors_mut()[index].get_current_workspace_mut()
}

fn apply(reactor: &Reactor, desktop: &mut Desktop, index: usize, placements: &[Placement]) {
    if placements.is_empty() {
        return;
    }
    desktop.apply(&*reactor.shared.system, index, placements);
    announce_layout(&reactor.broadcast, desktop, index);
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use test_log::test;

    use crate::actor::broadcast::BroadcastEvent;
    use crate::actor::reactor::tests::harness;
    use crate::actor::reactor::{Command, Event};
    use crate::layout_engine::Direction;
    use crate::model::WorkspaceId;
    use crate::sys::geometry::Rect;
    use crate::sys::window::WindowId;

    const W1: WindowId = WindowId(1);
    const W2: WindowId = WindowId(2);
    const W3: WindowId = WindowId(3);

    fn ws(n: u8) -> WorkspaceId { WorkspaceId::new(n).unwrap() }

    fn command(h: &mut crate::actor::reactor::tests::Harness, command: Command) {
        h.reactor.handle_event(Event::Command(command));
    }

    #[test]
    fn focus_moves_between_neighbours() {
        let mut h = harness(3);
        h.reactor.handle_event(Event::WindowFocused(W1));
        command(&mut h, Command::FocusDirection(Direction::Right));
        assert_eq!(h.reactor.focused(), Some(W2));
        assert_eq!(h.system.focused(), Some(W2));
        command(&mut h, Command::FocusDirection(Direction::Down));
        assert_eq!(h.reactor.focused(), Some(W3));
        command(&mut h, Command::FocusDirection(Direction::Left));
        assert_eq!(h.reactor.focused(), Some(W1));
    }

    #[test]
    fn swap_in_direction_exchanges_tiles() {
        let mut h = harness(3);
        h.reactor.handle_event(Event::WindowFocused(W1));
        command(&mut h, Command::SwapDirection(Direction::Right));
        assert_eq!(h.rect(1), Rect::new(964, 0, 1920, 536));
        assert_eq!(h.rect(2), Rect::new(0, 0, 956, 1080));
    }

    #[test]
    fn resize_split_grows_the_focused_window() {
        let mut h = harness(3);
        h.reactor.handle_event(Event::WindowFocused(W1));
        command(&mut h, Command::ResizeSplit(0.1));
        assert_eq!(h.rect(1), Rect::new(0, 0, 1148, 1080));
        assert_eq!(h.rect(2), Rect::new(1156, 0, 1920, 536));
    }

    #[test]
    fn resize_past_the_minimum_is_refused() {
        let mut h = harness(2);
        h.reactor.handle_event(Event::WindowFocused(W1));
        command(&mut h, Command::ResizeSplit(0.4));
        assert_eq!(h.rect(1), Rect::new(0, 0, 956, 1080));
    }

    #[test]
    fn switching_workspaces_hides_and_restores_windows() {
        let mut h = harness(2);
        h.reactor.handle_event(Event::WindowFocused(W2));
        command(&mut h, Command::SwitchWorkspace(ws(2)));
        assert!(!h.system.is_visible(W1));
        assert!(!h.system.is_visible(W2));
        assert_eq!(h.reactor.focused(), None);
        assert!(h.drain().contains(&BroadcastEvent::WorkspaceChanged { monitor: 0, workspace: ws(2) }));

        command(&mut h, Command::SwitchWorkspace(ws(1)));
        assert!(h.system.is_visible(W1));
        assert!(h.system.is_visible(W2));
        assert_eq!(h.reactor.focused(), Some(W2));
    }

    #[test]
    fn moving_a_window_to_another_workspace_retiles_the_rest() {
        let mut h = harness(3);
        h.reactor.handle_event(Event::WindowFocused(W1));
        command(&mut h, Command::MoveWindowToWorkspace(ws(3)));
        assert!(!h.system.is_visible(W1));
        assert_eq!(h.workspace_windows(0, ws(3)), vec![W1]);
        assert_eq!(h.rect(2), Rect::new(0, 0, 956, 1080));
        assert_eq!(h.rect(3), Rect::new(964, 0, 1920, 1080));
    }

    #[test]
    fn stacked_mode_cycles_and_jumps() {
        let mut h = harness(3);
        h.reactor.handle_event(Event::WindowFocused(W1));
        command(&mut h, Command::ToggleStacked);
        assert_eq!(h.rect(1), Rect::new(2, 2, 1918, 1078));
        assert!(h.system.is_visible(W1));
        assert!(!h.system.is_visible(W2));

        command(&mut h, Command::CycleStacked(-1));
        assert!(h.system.is_visible(W3));
        assert!(!h.system.is_visible(W1));
        assert_eq!(h.reactor.focused(), Some(W3));

        command(&mut h, Command::JumpToStacked(1));
        assert!(h.system.is_visible(W2));
        assert!(!h.system.is_visible(W3));

        command(&mut h, Command::ToggleStacked);
        assert!(h.system.is_visible(W1));
        assert!(h.system.is_visible(W3));
        assert_eq!(h.rect(1), Rect::new(0, 0, 956, 1080));
    }

    #[test]
    fn resizing_a_stacked_workspace_keeps_one_window_visible() {
        let mut h = harness(3);
        h.reactor.handle_event(Event::WindowFocused(W1));
        command(&mut h, Command::ToggleStacked);
        h.system.clear_calls();
        command(&mut h, Command::ResizeSplit(0.1));
        assert!(h.system.set_rect_calls().is_empty());
        assert_eq!(h.rect(1), Rect::new(2, 2, 1918, 1078));
        assert!(!h.system.is_visible(W2));
        assert!(!h.system.is_visible(W3));
    }

    #[test]
    fn resizing_a_paused_workspace_moves_nothing() {
        let mut h = harness(2);
        h.reactor.handle_event(Event::WindowFocused(W1));
        command(&mut h, Command::TogglePaused);
        h.system.clear_calls();
        command(&mut h, Command::ResizeSplit(0.1));
        assert!(h.system.set_rect_calls().is_empty());

        command(&mut h, Command::TogglePaused);
        assert_eq!(h.rect(1), Rect::new(0, 0, 956, 1080));
    }

    #[test]
    fn paused_workspaces_leave_windows_alone() {
        let mut h = harness(2);
        h.reactor.handle_event(Event::WindowFocused(W1));
        command(&mut h, Command::TogglePaused);
        h.system.update_window(W1, |w| w.rect = Rect::from_size(50, 50, 500, 500));
        h.system.clear_calls();
        command(&mut h, Command::Retile);
        assert!(h.system.set_rect_calls().is_empty());

        command(&mut h, Command::TogglePaused);
        assert_eq!(h.rect(1), Rect::new(0, 0, 956, 1080));
    }

    #[test]
    fn excluded_windows_get_no_tile() {
        let mut h = harness(2);
        h.reactor.handle_event(Event::WindowFocused(W1));
        command(&mut h, Command::ToggleWindowTiling);
        assert_eq!(h.rect(2), Rect::new(0, 0, 1920, 1080));
        assert_eq!(h.tile(1), None);

        command(&mut h, Command::ToggleWindowTiling);
        assert_eq!(h.rect(1), Rect::new(0, 0, 956, 1080));
    }

    #[test]
    fn commands_without_focus_are_ignored() {
        let mut h = harness(2);
        h.system.clear_calls();
        command(&mut h, Command::SwapDirection(Direction::Right));
        assert!(h.system.set_rect_calls().is_empty());
    }
}
