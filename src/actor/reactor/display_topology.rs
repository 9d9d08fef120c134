//! Monitor hot-plug handling.
//!
//! OS notifications only schedule work here. The [`Reconciler`] runs on the
//! timer thread, holds the layout gate for the whole pass and rebuilds the
//! monitor list from role-keyed backups, so windows survive monitors
//! disappearing and coming back under new handles.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, instrument, trace, warn};

use super::{Shared, panic_message};
use crate::actor::broadcast::{BroadcastEvent, BroadcastSender};
use crate::common::collections::{BTreeSet, HashSet};
use crate::common::config::MonitorSettings;
use crate::model::{BackupStore, Desktop, MonitorBackup, WorkspaceId};
use crate::sys::timer::Timer;
use crate::sys::window::{MonitorInfo, System, WindowId, order_primary_first};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trigger {
    Arrival,
    Removal,
    DisplayChange,
    /// Periodic comparison against what the OS reports.
    Check,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// The periodic check found nothing to do.
    Unchanged,
    /// Same or more monitors than before; every window has a home.
    Restored { monitors: usize },
    /// Fewer monitors; workspaces of the lost ones were merged into the
    /// last surviving monitor.
    Consolidated { monitors: usize },
    /// The OS could not tell us about monitors. The previous layout was put
    /// back and the pass should run again.
    Retry,
}

pub struct Reconciler {
    shared: Arc<Shared>,
    settings: MonitorSettings,
    backups: Mutex<BackupStore>,
    attempts: AtomicU32,
    broadcast: BroadcastSender,
}

impl Reconciler {
    pub fn new(shared: Arc<Shared>, settings: MonitorSettings, broadcast: BroadcastSender) -> Self {
        Self {
            shared,
            settings,
            backups: Mutex::new(BackupStore::default()),
            attempts: AtomicU32::new(0),
            broadcast,
        }
    }

    pub fn attempts(&self) -> u32 { self.attempts.load(Ordering::Relaxed) }

    pub fn settings(&self) -> &MonitorSettings { &self.settings }

    /// How long to wait before acting on `trigger`.
    ///
    /// Arrivals back off exponentially with the number of unsuccessful
    /// attempts, capped at the configured maximum.
    pub fn delay_for(&self, trigger: Trigger) -> Duration {
        match trigger {
            Trigger::Arrival => {
                let factor = 1u32.checked_shl(self.attempts()).unwrap_or(u32::MAX);
                self.settings
                    .arrival_base_delay()
                    .saturating_mul(factor)
                    .min(self.settings.arrival_max_delay())
            }
            Trigger::Removal | Trigger::DisplayChange => self.settings.removal_delay(),
            Trigger::Check => self.settings.check_interval().unwrap_or(Duration::ZERO),
        }
    }

    /// What to schedule once a pass with `outcome` has finished.
    pub fn follow_up(&self, outcome: ReconcileOutcome) -> Option<(Duration, Trigger)> {
        match outcome {
            ReconcileOutcome::Retry => Some((self.delay_for(Trigger::Arrival), Trigger::Arrival)),
            _ => self.settings.check_interval().map(|interval| (interval, Trigger::Check)),
        }
    }

    #[instrument(name = "reconciler::reconcile", skip(self))]
    pub fn reconcile(&self, trigger: Trigger) -> ReconcileOutcome {
        let _gate = self.shared.gate.enter();
        let system = &*self.shared.system;

        if trigger == Trigger::Check {
            match system.enumerate_monitors() {
                Ok(infos) if !infos.is_empty() && !self.matches_current(infos.clone()) => {
                    info!("monitor topology drifted, reconciling");
                }
                Ok(_) => return ReconcileOutcome::Unchanged,
                Err(err) => {
                    trace!(%err, "topology check could not enumerate monitors");
                    return ReconcileOutcome::Unchanged;
                }
            }
        }

        let old_count = {
            let mut desktop = self.shared.desktop.lock();
            self.backups.lock().capture_all(desktop.monitors());
            let detached = desktop.detach_all();
            debug!(monitors = desktop.monitor_count(), windows = detached.len(), "detached windows");
            desktop.monitor_count()
        };

        let settle = self.settings.settle();
        if !settle.is_zero() {
            thread::sleep(settle);
        }

        let infos = match system.enumerate_monitors() {
            Ok(infos) if !infos.is_empty() => infos,
            Ok(_) => {
                warn!("OS reported no monitors");
                return self.restore_previous(old_count);
            }
            Err(err) => {
                warn!(%err, "monitor enumeration failed");
                return self.restore_previous(old_count);
            }
        };

        let mut desktop = self.shared.desktop.lock();
        desktop.set_monitors(infos);
        let new_count = desktop.monitor_count();
        let backups = self.backups.lock();
        let mut placed = HashSet::default();

        let outcome = if new_count >= old_count {
            restore_grown(&mut desktop, system, &backups, old_count, &mut placed);
            self.attempts.store(0, Ordering::Relaxed);
            ReconcileOutcome::Restored { monitors: new_count }
        } else {
            consolidate(&mut desktop, system, &backups, old_count, &mut placed);
            self.attempts.fetch_add(1, Ordering::Relaxed);
            ReconcileOutcome::Consolidated { monitors: new_count }
        };
        drop(backups);

        // Nothing was managed yet: startup found no readable monitors.
        if old_count == 0 {
            let adopted = desktop.discover_windows(system);
            debug!(adopted, "adopted windows after first monitors appeared");
        }
        desktop.retile_all(system);
        info!(old_count, new_count, windows = placed.len(), ?outcome, "monitors reconciled");
        self.announce(&desktop);
        outcome
    }

    fn matches_current(&self, infos: Vec<MonitorInfo>) -> bool {
        let reported: Vec<_> = order_primary_first(infos)
            .into_iter()
            .map(|m| (m.bounds, m.work_area, m.is_primary))
            .collect();
        reported == self.shared.desktop.lock().topology()
    }

    fn restore_previous(&self, old_count: usize) -> ReconcileOutcome {
        let system = &*self.shared.system;
        let mut desktop = self.shared.desktop.lock();
        let backups = self.backups.lock();
        let mut placed = HashSet::default();
        if let Some(slots) = backups.get(old_count) {
            for (&position, backup) in slots {
                restore_monitor(&mut desktop, system, position, backup, &mut placed);
            }
        }
        drop(backups);
        desktop.retile_all(system);
        let attempts = self.attempts.fetch_add(1, Ordering::Relaxed) + 1;
        debug!(attempts, windows = placed.len(), "kept previous layout until monitors are readable");
        ReconcileOutcome::Retry
    }

    fn announce(&self, desktop: &Desktop) {
        for monitor in desktop.monitors() {
            self.broadcast.send(BroadcastEvent::IndicatorRefresh {
                monitor: monitor.index(),
                current: monitor.current(),
                backup_workspaces: monitor.backup_workspaces(),
            });
            self.broadcast.send(BroadcastEvent::LayoutApplied {
                monitor: monitor.index(),
                workspace: monitor.current(),
                windows: monitor.get_current_workspace().len(),
            });
        }
    }
}

/// Puts `backup` back onto the monitor at `position`, skipping windows that
/// are gone or already placed elsewhere in this pass.
fn restore_monitor(
    desktop: &mut Desktop,
    system: &dyn System,
    position: usize,
    backup: &MonitorBackup,
    placed: &mut HashSet<WindowId>,
) -> usize {
    let Some(monitor) = desktop.monitor_mut(position) else {
        return 0;
    };
    let mut restored = 0;
    for (&id, saved) in &backup.workspaces {
        monitor.get_workspace_mut(id).set_stacked(saved.stacked);
        for &window in &saved.windows {
            if placed.contains(&window) || !system.is_window(window) {
                continue;
            }
            monitor.add_window(id, window);
            placed.insert(window);
            restored += 1;
        }
    }
    monitor.set_current(backup.current);
    trace!(position, restored, "restored monitor");
    restored
}

fn restore_grown(
    desktop: &mut Desktop,
    system: &dyn System,
    backups: &BackupStore,
    old_count: usize,
    placed: &mut HashSet<WindowId>,
) {
    let new_count = desktop.monitor_count();
    if let Some(slots) = backups.get(new_count) {
        for (&position, backup) in slots.range(..new_count) {
            restore_monitor(desktop, system, position, backup, placed);
        }
    } else {
        // No layout was ever saved for this many monitors; fill positions
        // from the largest counts we know about.
        let mut filled = BTreeSet::new();
        for (count, slots) in backups.counts_descending() {
            for (&position, backup) in slots.range(..new_count) {
                if filled.insert(position) {
                    trace!(count, position, "filling position from another monitor count");
                    restore_monitor(desktop, system, position, backup, placed);
                }
            }
        }
    }

    // Anything that was on screen before the change but is not covered by
    // the restored backups stays where it was.
    let Some(previous) = backups.get(old_count) else {
        return;
    };
    for (&position, backup) in previous {
        let target = position.min(new_count.saturating_sub(1));
        for (id, window) in backup.windows() {
            if placed.contains(&window) || !system.is_window(window) {
                continue;
            }
            if let Some(monitor) = desktop.monitor_mut(target) {
                monitor.add_window(id, window);
                placed.insert(window);
            }
        }
    }
}

fn consolidate(
    desktop: &mut Desktop,
    system: &dyn System,
    backups: &BackupStore,
    old_count: usize,
    placed: &mut HashSet<WindowId>,
) {
    let new_count = desktop.monitor_count();
    let Some(previous) = backups.get(old_count) else {
        return;
    };
    for (&position, backup) in previous.range(..new_count) {
        restore_monitor(desktop, system, position, backup, placed);
    }

    let last = new_count - 1;
    let mut taken = BTreeSet::new();
    for (&position, backup) in previous.range(new_count..) {
        for (&id, saved) in &backup.workspaces {
            let windows: Vec<WindowId> = saved
                .windows
                .iter()
                .copied()
                .filter(|w| !placed.contains(w) && system.is_window(*w))
                .collect();
            if windows.is_empty() {
                continue;
            }
            let Some(monitor) = desktop.monitor_mut(last) else {
                return;
            };
            let target = monitor.first_empty_workspace(&taken).unwrap_or(WorkspaceId::LAST);
            taken.insert(target);
            if monitor.get_workspace(target).is_empty() {
                monitor.get_workspace_mut(target).set_stacked(saved.stacked);
            }
            for &window in &windows {
                monitor.add_window(target, window);
                placed.insert(window);
            }
            monitor.mark_backup_workspace(target);
            debug!(
                from_position = position,
                from_workspace = %id,
                to_workspace = %target,
                windows = windows.len(),
                "consolidated workspace of a lost monitor"
            );
        }
    }
}

/// Runs one pass and works out the next one. A panic is logged and
/// treated as a failed pass, so the timer keeps running and retries.
fn run_guarded(reconciler: &Reconciler, trigger: Trigger) -> Option<(Duration, Trigger)> {
    match catch_unwind(AssertUnwindSafe(|| reconciler.reconcile(trigger))) {
        Ok(outcome) => reconciler.follow_up(outcome),
        Err(panic) => {
            error!(?trigger, panic = panic_message(&*panic), "panic during reconciliation");
            reconciler.follow_up(ReconcileOutcome::Retry)
        }
    }
}

/// Owns the debounce timer that runs the reconciler.
pub struct DisplayTopologyManager {
    reconciler: Arc<Reconciler>,
    timer: Option<Timer<Trigger>>,
}

impl DisplayTopologyManager {
    /// Runs reconciliation on a background timer thread.
    pub fn spawn(reconciler: Arc<Reconciler>) -> Self {
        let worker = reconciler.clone();
        let timer = Timer::spawn("display-topology", move |trigger, handle| {
            if let Some((delay, next)) = run_guarded(&worker, trigger) {
                handle.schedule(delay, next);
            }
        });
        let timer = match timer {
            Ok(timer) => Some(timer),
            Err(err) => {
                warn!(%err, "could not start topology timer, reconciling inline");
                None
            }
        };
        Self { reconciler, timer }
    }

    /// Runs reconciliation synchronously on the caller's thread. Used for
    /// replays, where timing must be deterministic.
    pub fn inline(reconciler: Arc<Reconciler>) -> Self { Self { reconciler, timer: None } }

    pub fn reconciler(&self) -> &Arc<Reconciler> { &self.reconciler }

    /// Schedules a pass for `trigger`, replacing any pending one.
    pub fn notify(&self, trigger: Trigger) {
        match &self.timer {
            Some(timer) => {
                let delay = self.reconciler.delay_for(trigger);
                debug!(?trigger, ?delay, "scheduled reconciliation");
                timer.schedule(delay, trigger);
            }
            None => {
                let outcome = catch_unwind(AssertUnwindSafe(|| self.reconciler.reconcile(trigger)))
                    .unwrap_or_else(|panic| {
                        error!(?trigger, panic = panic_message(&*panic), "panic during reconciliation");
                        ReconcileOutcome::Retry
                    });
                if outcome == ReconcileOutcome::Retry {
                    warn!(?trigger, "reconciliation needs a retry; none scheduled inline");
                }
            }
        }
    }

    /// Starts the periodic topology check, if enabled.
    pub fn arm_check(&self) {
        if let (Some(timer), Some(interval)) = (&self.timer, self.reconciler.settings().check_interval()) {
            timer.schedule(interval, Trigger::Check);
        }
    }
}
