//! The seam between the layout engine and the operating system.
//!
//! Everything the engine needs from the OS goes through [`System`]. The real
//! event-hook and window APIs live outside this crate; [`super::headless`]
//! provides an in-memory implementation.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::geometry::Rect;

/// Opaque OS window handle. The OS owns the window; we only refer to it.
#[derive(PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WindowId(pub u64);

impl WindowId {
    #[inline]
    pub const fn new(id: u64) -> Self { Self(id) }

    #[inline]
    pub fn as_u64(self) -> u64 { self.0 }
}

impl std::fmt::Display for WindowId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// Opaque OS display handle. Not stable across hot-plug.
#[derive(PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MonitorHandle(pub u64);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitorInfo {
    pub handle: MonitorHandle,
    pub bounds: Rect,
    pub work_area: Rect,
    pub is_primary: bool,
}

/// Orders monitors primary-first, then by enumeration order.
///
/// The resulting position is the only monitor identity that survives a
/// hot-plug; the OS handles are reassigned freely.
pub fn order_primary_first(mut monitors: Vec<MonitorInfo>) -> Vec<MonitorInfo> {
    monitors.sort_by_key(|m| !m.is_primary);
    monitors
}

bitflags! {
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
    #[repr(transparent)]
    pub struct SetRectFlags: u32 {
        const NO_ZORDER   = 1 << 0;
        const NO_ACTIVATE = 1 << 1;
        const ASYNC       = 1 << 2;
        const NO_REDRAW   = 1 << 3;

        const LAYOUT = Self::NO_ZORDER.bits() | Self::NO_ACTIVATE.bits() | Self::ASYNC.bits();
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SystemError {
    #[error("monitor enumeration failed: {0}")]
    Enumeration(String),
    #[error("window {0} is gone")]
    WindowGone(WindowId),
}

pub trait System: Send + Sync {
    /// The outer rectangle of the window, as the move/resize API sees it.
    fn window_rect(&self, window: WindowId) -> Option<Rect>;

    fn set_window_rect(&self, window: WindowId, rect: Rect, flags: SetRectFlags) -> bool;

    /// The visible frame as reported by the compositor, if it will tell us.
    fn extended_frame_bounds(&self, window: WindowId) -> Option<Rect>;

    /// The client area mapped to screen coordinates.
    fn client_rect_on_screen(&self, window: WindowId) -> Option<Rect>;

    fn window_class(&self, window: WindowId) -> Option<String>;

    /// Executable name of the owning process.
    fn process_name(&self, window: WindowId) -> Option<String>;

    fn set_window_visible(&self, window: WindowId, visible: bool);

    fn focus_window(&self, window: WindowId);

    fn is_window(&self, window: WindowId) -> bool;

    fn is_minimized(&self, window: WindowId) -> bool;

    fn enumerate_monitors(&self) -> Result<Vec<MonitorInfo>, SystemError>;

    /// Top-level windows the validity filter already accepted for tiling.
    fn enumerate_windows(&self) -> Vec<WindowId>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(handle: u64, primary: bool) -> MonitorInfo {
        MonitorInfo {
            handle: MonitorHandle(handle),
            bounds: Rect::from_size(0, 0, 100, 100),
            work_area: Rect::from_size(0, 0, 100, 90),
            is_primary: primary,
        }
    }

    #[test]
    fn primary_sorts_first_and_keeps_enumeration_order() {
        let ordered = order_primary_first(vec![info(7, false), info(3, false), info(9, true)]);
        let handles: Vec<u64> = ordered.iter().map(|m| m.handle.0).collect();
        assert_eq!(handles, vec![9, 7, 3]);
    }

    #[test]
    fn layout_flags_compose() {
        assert!(SetRectFlags::LAYOUT.contains(SetRectFlags::NO_ACTIVATE));
        assert!(!SetRectFlags::LAYOUT.contains(SetRectFlags::NO_REDRAW));
    }
}
