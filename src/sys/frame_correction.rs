//! Converts the rectangle a window should visibly occupy into the rectangle
//! the OS move/resize call expects.
//!
//! Most windows carry an invisible resize border outside their visible frame.
//! If we handed the layout rectangle straight to the OS, neighbouring tiles
//! would show gaps of a few pixels on each side.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::trace;

use super::geometry::Rect;
use super::window::{System, WindowId};
use crate::common::collections::HashMap;
use crate::common::config::FrameSettings;

/// Per-edge amount the outer rectangle extends past the visible frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameInsets {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl FrameInsets {
    pub const ZERO: FrameInsets = FrameInsets { left: 0, top: 0, right: 0, bottom: 0 };

    pub fn is_zero(&self) -> bool { *self == Self::ZERO }

    /// Grows a desired visible rectangle into the outer rectangle to request.
    pub fn expand(&self, visible: Rect) -> Rect {
        visible.inset_edges(-self.left, -self.top, -self.right, -self.bottom)
    }

    fn tighten(self, px: i32) -> FrameInsets {
        FrameInsets {
            left: self.left - px,
            top: self.top - px,
            right: self.right - px,
            bottom: self.bottom - px,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct CachedInsets {
    insets: FrameInsets,
    computed_at: Instant,
}

#[derive(Debug)]
pub struct FrameCorrection {
    settings: FrameSettings,
    ttl: Duration,
    cache: HashMap<WindowId, CachedInsets>,
}

impl FrameCorrection {
    pub fn new(settings: FrameSettings) -> Self {
        let ttl = settings.correction_ttl();
        Self {
            settings,
            ttl,
            cache: HashMap::default(),
        }
    }

    /// Returns the rectangle to pass to the OS so that `window` visibly
    /// covers `visible`.
    pub fn outer_rect(
        &mut self,
        system: &dyn System,
        window: WindowId,
        visible: Rect,
        now: Instant,
    ) -> Rect {
        self.insets(system, window, now).expand(visible)
    }

    pub fn insets(&mut self, system: &dyn System, window: WindowId, now: Instant) -> FrameInsets {
        if let Some(cached) = self.cache.get(&window) {
            if now.saturating_duration_since(cached.computed_at) < self.ttl {
                return cached.insets;
            }
        }
        let insets = self.compute(system, window);
        self.cache.insert(window, CachedInsets { insets, computed_at: now });
        insets
    }

    pub fn forget(&mut self, window: WindowId) { self.cache.remove(&window); }

    /// Drops entries whose TTL has passed.
    pub fn prune(&mut self, now: Instant) {
        let ttl = self.ttl;
        self.cache.retain(|_, c| now.saturating_duration_since(c.computed_at) < ttl);
    }

    pub fn cached_len(&self) -> usize { self.cache.len() }

    fn compute(&self, system: &dyn System, window: WindowId) -> FrameInsets {
        let Some(outer) = system.window_rect(window) else {
            trace!(%window, "no outer rect; skipping frame correction");
            return FrameInsets::ZERO;
        };

        if let Some(frame) = system.extended_frame_bounds(window) {
            return FrameInsets {
                left: frame.left - outer.left,
                top: frame.top - outer.top,
                right: outer.right - frame.right,
                bottom: outer.bottom - frame.bottom,
            };
        }

        let Some(client) = system.client_rect_on_screen(window) else {
            return FrameInsets::ZERO;
        };
        // The title bar is part of the visible frame, so the top edge is left
        // alone.
        let base = FrameInsets {
            left: client.left - outer.left,
            top: 0,
            right: outer.right - client.right,
            bottom: outer.bottom - client.bottom,
        };

        if self.draws_own_frame(system, window) { base.tighten(1) } else { base }
    }

    fn draws_own_frame(&self, system: &dyn System, window: WindowId) -> bool {
        let borderless = system
            .window_class(window)
            .is_some_and(|class| self.settings.is_borderless_class(&class));
        let chromium = system
            .process_name(window)
            .is_some_and(|process| self.settings.is_chromium_process(&process));
        borderless || chromium
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::sys::headless::{HeadlessSystem, HeadlessWindow};

    fn correction() -> FrameCorrection { FrameCorrection::new(FrameSettings::default()) }

    #[test]
    fn extended_bounds_give_exact_insets() {
        let system = HeadlessSystem::default();
        let w = system.add_window(
            HeadlessWindow::new(Rect::new(100, 100, 500, 400)).with_invisible_border(7, 0, 7, 7),
        );
        let mut fc = correction();
        let now = Instant::now();
        assert_eq!(
            fc.insets(&system, w, now),
            FrameInsets { left: 7, top: 0, right: 7, bottom: 7 }
        );
        assert_eq!(
            fc.outer_rect(&system, w, Rect::new(0, 0, 960, 1080), now),
            Rect::new(-7, 0, 967, 1087)
        );
    }

    #[test]
    fn client_rect_fallback_ignores_top_and_tightens_chromium() {
        let system = HeadlessSystem::default();
        let w = system.add_window(
            HeadlessWindow::new(Rect::new(0, 0, 400, 300))
                .with_client_insets(8, 31, 8, 8)
                .without_extended_frame_bounds()
                .with_process("chrome.exe"),
        );
        let mut fc = correction();
        assert_eq!(
            fc.insets(&system, w, Instant::now()),
            FrameInsets { left: 7, top: -1, right: 7, bottom: 7 }
        );
    }

    #[test]
    fn missing_window_degrades_to_zero() {
        let system = HeadlessSystem::default();
        let mut fc = correction();
        let r = Rect::new(0, 0, 10, 10);
        assert_eq!(fc.outer_rect(&system, WindowId(99), r, Instant::now()), r);
    }

    #[test]
    fn cache_expires_on_time() {
        let system = HeadlessSystem::default();
        let w = system.add_window(
            HeadlessWindow::new(Rect::new(0, 0, 400, 300)).with_invisible_border(7, 0, 7, 7),
        );
        let mut fc = correction();
        let t0 = Instant::now();
        assert_eq!(fc.insets(&system, w, t0).left, 7);

        system.update_window(w, |hw| hw.invisible_border = FrameInsets::ZERO);
        assert_eq!(fc.insets(&system, w, t0 + Duration::from_millis(100)).left, 7);
        assert_eq!(fc.insets(&system, w, t0 + Duration::from_millis(600)).left, 0);

        fc.prune(t0 + Duration::from_secs(5));
        assert_eq!(fc.cached_len(), 0);
    }
}
