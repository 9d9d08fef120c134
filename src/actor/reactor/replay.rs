//! Event recordings and scripted scenarios.
//!
//! A recording is one RON value per line: a [`Scenario`] header describing
//! the monitors and windows at startup, then every event the reactor saw.
//! Hand-written scenarios may instead be a single multi-line RON document.

use std::fmt::Write as _;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::{Event, Reactor, ReactorError};
use crate::actor::broadcast;
use crate::common::collections::VecDeque;
use crate::common::config::Config;
use crate::model::Desktop;
use crate::sys::headless::{HeadlessSystem, HeadlessWindow};
use crate::sys::window::{MonitorInfo, System, WindowId};

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ScenarioWindow {
    pub id: WindowId,
    pub window: HeadlessWindow,
    /// Only exists once its `window_created` event is replayed.
    #[serde(default)]
    pub late: bool,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct Scenario {
    pub monitors: Vec<MonitorInfo>,
    #[serde(default)]
    pub windows: Vec<ScenarioWindow>,
    /// Monitor lists to switch to, one per replayed device or display
    /// change, in order.
    #[serde(default)]
    pub monitor_changes: Vec<Vec<MonitorInfo>>,
    #[serde(default)]
    pub events: Vec<Event>,
}

impl Scenario {
    /// What `system` shows right now, without any events.
    pub fn capture(system: &dyn System) -> Self {
        let windows = system
            .enumerate_windows()
            .into_iter()
            .filter_map(|id| {
                let mut window = HeadlessWindow::new(system.window_rect(id)?);
                window.class = system.window_class(id);
                window.process = system.process_name(id);
                Some(ScenarioWindow { id, window, late: false })
            })
            .collect();
        Self {
            monitors: system.enumerate_monitors().unwrap_or_default(),
            windows,
            ..Self::default()
        }
    }

    pub fn parse(text: &str) -> Result<Self, ReactorError> {
        if let Ok(scenario) = ron::from_str::<Scenario>(text) {
            return Ok(scenario);
        }
        let mut lines = text.lines().map(str::trim).filter(|l| !l.is_empty() && !l.starts_with("//"));
        let Some(header) = lines.next() else {
            return Ok(Self::default());
        };
        let mut scenario: Scenario = ron::from_str(header)?;
        for line in lines {
            scenario.events.push(ron::from_str(line)?);
        }
        Ok(scenario)
    }

    pub fn read(path: &Path) -> Result<Self, ReactorError> {
        Self::parse(&std::fs::read_to_string(path)?)
    }

    /// A headless system holding the scenario's monitors and startup windows.
    pub fn system(&self) -> HeadlessSystem {
        let system = HeadlessSystem::new(self.monitors.clone());
        for w in self.windows.iter().filter(|w| !w.late) {
            system.insert_window(w.id, w.window.clone());
        }
        system
    }

    /// Runs every event through a fresh reactor and returns the final
    /// desktop, rendered by [`describe`].
    pub fn run(&self, mut config: Config, record: Record) -> String {
        config.monitors.settle_ms = 0;
        let system = Arc::new(self.system());
        let (tx, _rx) = broadcast::channel();
        let mut reactor = Reactor::new_inline(config, system.clone(), record, tx);
        reactor.initialize();

        let mut monitor_changes: VecDeque<_> = self.monitor_changes.iter().cloned().collect();
        for event in &self.events {
            match event {
                Event::WindowCreated(id) => {
                    if let Some(late) = self.windows.iter().find(|w| w.late && w.id == *id) {
                        system.insert_window(late.id, late.window.clone());
                    }
                }
                Event::WindowDestroyed(id) => {
                    system.destroy_window(*id);
                }
                Event::WindowMinimized(id) => system.update_window(*id, |w| w.minimized = true),
                Event::WindowRestored(id) => system.update_window(*id, |w| w.minimized = false),
                Event::DeviceChanged { .. } | Event::DisplayChanged => {
                    if let Some(monitors) = monitor_changes.pop_front() {
                        system.set_monitors(monitors);
                    }
                }
                _ => {}
            }
            reactor.handle_event(event.clone());
        }
        info!(events = self.events.len(), "replay finished");
        let desktop = reactor.shared().desktop.lock();
        describe(&desktop)
    }
}

/// Appends every event to a file, one RON value per line.
pub struct Record {
    file: Option<BufWriter<File>>,
}

impl Record {
    pub fn new(path: Option<&Path>) -> Result<Self, ReactorError> {
        let file = path.map(File::create).transpose()?.map(BufWriter::new);
        Ok(Self { file })
    }

    pub fn disabled() -> Self { Self { file: None } }

    pub fn is_enabled(&self) -> bool { self.file.is_some() }

    pub fn start(&mut self, system: &dyn System) {
        if self.is_enabled() {
            self.write_line(&Scenario::capture(system));
        }
    }

    pub fn on_event(&mut self, event: &Event) { self.write_line(event) }

    fn write_line<T: Serialize>(&mut self, value: &T) {
        let Some(file) = &mut self.file else {
            return;
        };
        let line = match ron::to_string(value) {
            Ok(line) => line,
            Err(err) => {
                warn!(%err, "could not encode recorded value");
                return;
            }
        };
        let written = writeln!(file, "{line}").and_then(|()| file.flush());
        if let Err(err) = written {
            warn!(%err, "recording failed, disabling it");
            self.file = None;
        }
    }
}

pub fn replay(path: &Path, config: Config, record: Record) -> Result<String, ReactorError> {
    let scenario = Scenario::read(path)?;
    debug!(
        monitors = scenario.monitors.len(),
        windows = scenario.windows.len(),
        events = scenario.events.len(),
        "loaded scenario"
    );
    Ok(scenario.run(config, record))
}

/// Renders every non-empty workspace: its tree and where each window went.
pub fn describe(desktop: &Desktop) -> String {
    let mut out = String::new();
    for monitor in desktop.monitors() {
        let b = monitor.bounds();
        _ = writeln!(
            out,
            "monitor {} [{}, {}, {}x{}]{}",
            monitor.index(),
            b.left,
            b.top,
            b.width(),
            b.height(),
            if monitor.is_primary() { " primary" } else { "" }
        );
        for ws in monitor.workspaces().iter().filter(|ws| !ws.is_empty()) {
            let mut flags = Vec::new();
            if ws.id() == monitor.current() {
                flags.push("current");
            }
            if ws.is_stacked() {
                flags.push("stacked");
            }
            if ws.is_paused() {
                flags.push("paused");
            }
            if monitor.is_backup_workspace(ws.id()) {
                flags.push("backup");
            }
            _ = writeln!(out, "  workspace {} {:?}", ws.id(), flags);
            for line in ws.tree().draw_tree().lines() {
                _ = writeln!(out, "    {line}");
            }
            for &window in ws.windows() {
                _ = match monitor.tracked_position(window) {
                    Some(r) => writeln!(out, "    {window} -> [{}, {}, {}, {}]", r.left, r.top, r.right, r.bottom),
                    None => writeln!(out, "    {window} -> hidden"),
                };
            }
        }
    }
    out
}
