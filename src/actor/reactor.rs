//! The reactor owns the desktop model and is the only place layout changes
//! originate from.
//!
//! Window notifications, pointer gestures and commands arrive as [`Event`]s
//! on a single thread and are handled one at a time under the layout gate.
//! Monitor changes are the exception: they are handed to the
//! [`DisplayTopologyManager`], which debounces them and reconciles on its
//! own thread.

mod display_topology;
pub mod error;
mod events;
mod replay;

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

pub use display_topology::{DisplayTopologyManager, ReconcileOutcome, Reconciler, Trigger};
pub use error::ReactorError;
use events::command::CommandEventHandler;
use events::drag::DragEventHandler;
use events::window::WindowEventHandler;
use parking_lot::Mutex;
pub use replay::{Record, Scenario, ScenarioWindow, describe, replay};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, instrument, trace, warn};

use crate::actor;
use crate::actor::broadcast::{BroadcastEvent, BroadcastSender};
use crate::actor::drag_swap::DragManager;
use crate::common::config::Config;
use crate::layout_engine::Direction;
use crate::model::{Desktop, WorkspaceId};
use crate::sys::gate::LayoutGate;
use crate::sys::geometry::Point;
use crate::sys::window::{System, WindowId};

pub type Sender = actor::Sender<Event>;
pub type Receiver = actor::Receiver<Event>;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum Event {
    WindowCreated(WindowId),
    WindowShown(WindowId),
    WindowDestroyed(WindowId),
    WindowFocused(WindowId),
    WindowMinimized(WindowId),
    WindowRestored(WindowId),
    /// The user grabbed a window's title bar or border.
    ///
    /// `time` is milliseconds since the reactor started. Events arriving
    /// without one are stamped on receipt, before they are recorded.
    MoveSizeStart {
        window: WindowId,
        pointer: Point,
        #[serde(default)]
        time: Option<u64>,
    },
    LocationChanged {
        window: WindowId,
        pointer: Point,
        #[serde(default)]
        time: Option<u64>,
    },
    MoveSizeEnd {
        window: WindowId,
        pointer: Point,
        #[serde(default)]
        time: Option<u64>,
    },
    /// A display device was plugged in (`arrival`) or removed.
    DeviceChanged {
        arrival: bool,
    },
    DisplayChanged,
    Command(Command),
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum Command {
    FocusDirection(Direction),
    SwapDirection(Direction),
    /// Grow (positive) or shrink the focused window along its parent split.
    ResizeSplit(f32),
    SwitchWorkspace(WorkspaceId),
    MoveWindowToWorkspace(WorkspaceId),
    ToggleStacked,
    TogglePaused,
    CycleStacked(i32),
    JumpToStacked(usize),
    ToggleWindowTiling,
    Retile,
}

/// State the reactor shares with the reconciler thread.
pub struct Shared {
    pub desktop: Mutex<Desktop>,
    pub gate: LayoutGate,
    pub system: Arc<dyn System>,
}

pub struct Reactor {
    config: Config,
    shared: Arc<Shared>,
    topology: DisplayTopologyManager,
    drag_manager: DragManager,
    focused: Option<WindowId>,
    broadcast: BroadcastSender,
    record: Record,
    epoch: Instant,
}

impl Reactor {
    /// Starts the reactor on its own thread and returns its inbox.
    pub fn spawn(
        config: Config,
        system: Arc<dyn System>,
        record: Record,
        broadcast: BroadcastSender,
    ) -> Result<Sender, ReactorError> {
        let (events_tx, events) = actor::channel();
        thread::Builder::new().name("reactor".to_string()).spawn(move || {
            let mut reactor = Reactor::new(config, system, record, broadcast);
            reactor.initialize();
            match tokio::runtime::Builder::new_current_thread().build() {
                Ok(runtime) => runtime.block_on(reactor.run(events)),
                Err(err) => error!(%err, "could not start reactor runtime"),
            }
        })?;
        Ok(events_tx)
    }

    /// A reactor whose monitor reconciliation is debounced on a timer thread.
    pub fn new(
        config: Config,
        system: Arc<dyn System>,
        record: Record,
        broadcast: BroadcastSender,
    ) -> Reactor {
        Self::build(config, system, record, broadcast, DisplayTopologyManager::spawn)
    }

    /// A reactor that reconciles monitors synchronously, as soon as the
    /// event arrives.
    pub fn new_inline(
        config: Config,
        system: Arc<dyn System>,
        record: Record,
        broadcast: BroadcastSender,
    ) -> Reactor {
        Self::build(config, system, record, broadcast, DisplayTopologyManager::inline)
    }

    fn build(
        config: Config,
        system: Arc<dyn System>,
        mut record: Record,
        broadcast: BroadcastSender,
        topology: impl FnOnce(Arc<Reconciler>) -> DisplayTopologyManager,
    ) -> Reactor {
        record.start(&*system);
        let shared = Arc::new(Shared {
            desktop: Mutex::new(Desktop::new(&config)),
            gate: LayoutGate::new(),
            system,
        });
        let reconciler =
            Arc::new(Reconciler::new(shared.clone(), config.monitors.clone(), broadcast.clone()));
        Reactor {
            drag_manager: DragManager::new(config.drag.clone()),
            topology: topology(reconciler),
            config,
            shared,
            focused: None,
            broadcast,
            record,
            epoch: Instant::now(),
        }
    }

    pub fn config(&self) -> &Config { &self.config }

    pub fn shared(&self) -> &Arc<Shared> { &self.shared }

    pub fn focused(&self) -> Option<WindowId> { self.focused }

    /// Discovers monitors and existing windows and tiles them.
    #[instrument(name = "reactor::initialize", skip(self))]
    pub fn initialize(&mut self) {
        let system = self.shared.system.clone();
        let monitors = match system.enumerate_monitors() {
            Ok(monitors) if !monitors.is_empty() => monitors,
            Ok(_) => {
                warn!("no monitors at startup, waiting for one to arrive");
                self.topology.notify(Trigger::Arrival);
                return;
            }
            Err(err) => {
                warn!(%err, "could not enumerate monitors at startup");
                self.topology.notify(Trigger::Arrival);
                return;
            }
        };

        let gate = self.shared.gate.enter();
        let mut desktop = self.shared.desktop.lock();
        desktop.set_monitors(monitors);
        let discovered = desktop.discover_windows(&*system);
        desktop.retile_all(&*system);
        info!(monitors = desktop.monitor_count(), windows = discovered, "initialized");
        for index in 0..desktop.monitor_count() {
            announce_indicator(&self.broadcast, &desktop, index);
            announce_layout(&self.broadcast, &desktop, index);
        }
        drop(desktop);
        drop(gate);
        self.topology.arm_check();
    }

    pub async fn run(mut self, mut events: Receiver) {
        while let Some((span, event)) = events.recv().await {
            let _guard = span.enter();
            self.handle_event(event);
        }
        debug!("reactor inbox closed");
    }

    /// Gives gesture events a timestamp so recordings replay with the
    /// same timing.
    fn stamp(&self, mut event: Event) -> Event {
        if let Event::MoveSizeStart { time, .. }
        | Event::LocationChanged { time, .. }
        | Event::MoveSizeEnd { time, .. } = &mut event
        {
            if time.is_none() {
                *time = Some(u64::try_from(self.epoch.elapsed().as_millis()).unwrap_or(u64::MAX));
            }
        }
        event
    }

    fn instant(&self, time: Option<u64>) -> Instant {
        time.map_or_else(Instant::now, |ms| self.epoch + Duration::from_millis(ms))
    }

    fn log_event(&self, event: &Event) {
        match event {
            Event::LocationChanged { .. } => trace!(?event, "Event"),
            _ => debug!(?event, "Event"),
        }
    }

    #[instrument(name = "reactor::handle_event", skip(self), fields(event=?event))]
    pub fn handle_event(&mut self, event: Event) {
        let event = self.stamp(event);
        self.log_event(&event);
        self.record.on_event(&event);

        match event {
            Event::DeviceChanged { arrival } => {
                let trigger = if arrival { Trigger::Arrival } else { Trigger::Removal };
                self.topology.notify(trigger);
                return;
            }
            Event::DisplayChanged => {
                self.topology.notify(Trigger::DisplayChange);
                return;
            }
            _ => {}
        }

        let shared = self.shared.clone();
        let Some(_gate) = shared.gate.try_enter() else {
            debug!("layout in progress, dropping event");
            return;
        };
        match catch_unwind(AssertUnwindSafe(|| self.dispatch(event))) {
            Ok(Ok(())) => {}
            Ok(Err(err)) => debug!(%err, "event not applied"),
            Err(panic) => error!(panic = panic_message(&*panic), "panic while handling event"),
        }
    }

    fn dispatch(&mut self, event: Event) -> Result<(), ReactorError> {
        match event {
            Event::WindowCreated(window)
            | Event::WindowShown(window)
            | Event::WindowRestored(window) => WindowEventHandler::handle_window_appeared(self, window),
            Event::WindowDestroyed(window) => {
                WindowEventHandler::handle_window_destroyed(self, window)
            }
            Event::WindowMinimized(window) => {
                WindowEventHandler::handle_window_minimized(self, window)
            }
            Event::WindowFocused(window) => WindowEventHandler::handle_window_focused(self, window),
            Event::MoveSizeStart { window, pointer, time } => {
                let now = self.instant(time);
                DragEventHandler::handle_move_size_start(self, window, pointer, now)
            }
            Event::LocationChanged { window, pointer, time } => {
                let now = self.instant(time);
                DragEventHandler::handle_location_changed(self, window, pointer, now)
            }
            Event::MoveSizeEnd { window, pointer, time } => {
                let now = self.instant(time);
                DragEventHandler::handle_move_size_end(self, window, pointer, now)
            }
            Event::Command(command) => CommandEventHandler::handle_command(self, command),
            Event::DeviceChanged { .. } | Event::DisplayChanged => Ok(()),
        }
    }

    /// The monitor commands act on: the one holding the focused window,
    /// else the primary.
    fn active_monitor(&self, desktop: &Desktop) -> usize {
        self.focused.and_then(|w| desktop.locate(w)).map_or(0, |(index, _)| index)
    }
}

fn announce_layout(broadcast: &BroadcastSender, desktop: &Desktop, index: usize) {
    if let Some(monitor) = desktop.monitor(index) {
        broadcast.send(BroadcastEvent::LayoutApplied {
            monitor: index,
            workspace: monitor.current(),
            windows: monitor.get_current_workspace().len(),
        });
    }
}

fn announce_indicator(broadcast: &BroadcastSender, desktop: &Desktop, index: usize) {
    if let Some(monitor) = desktop.monitor(index) {
        broadcast.send(BroadcastEvent::IndicatorRefresh {
            monitor: index,
            current: monitor.current(),
            backup_workspaces: monitor.backup_workspaces(),
        });
    }
}

pub(super) fn panic_message(panic: &(dyn std::any::Any + Send)) -> &str {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s
    } else {
        "non-string panic payload"
    }
}
