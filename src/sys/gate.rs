//! The "layout in progress" guard.
//!
//! The event path never waits: a notification that arrives while a layout
//! pass is running is dropped. Background work (monitor reconciliation)
//! waits for the gate instead. Either way the gate is released when the
//! guard is dropped, including while unwinding from a panic.

use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::{Condvar, Mutex};

#[derive(Default)]
pub struct LayoutGate {
    busy: Mutex<bool>,
    released: Condvar,
    dropped: AtomicU64,
}

#[must_use = "the gate is released as soon as the guard is dropped"]
pub struct GateGuard<'a> {
    gate: &'a LayoutGate,
}

impl LayoutGate {
    pub fn new() -> Self { Self::default() }

    /// Enters the gate unless someone else holds it.
    pub fn try_enter(&self) -> Option<GateGuard<'_>> {
        let mut busy = self.busy.lock();
        if *busy {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            return None;
        }
        *busy = true;
        Some(GateGuard { gate: self })
    }

    /// Blocks until the gate is free, then enters it.
    pub fn enter(&self) -> GateGuard<'_> {
        let mut busy = self.busy.lock();
        while *busy {
            self.released.wait(&mut busy);
        }
        *busy = true;
        GateGuard { gate: self }
    }

    pub fn is_busy(&self) -> bool { *self.busy.lock() }

    /// Number of `try_enter` calls turned away so far.
    pub fn dropped(&self) -> u64 { self.dropped.load(Ordering::Relaxed) }
}

impl Drop for GateGuard<'_> {
    fn drop(&mut self) {
        *self.gate.busy.lock() = false;
        self.gate.released.notify_one();
    }
}
