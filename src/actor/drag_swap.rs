//! Tracks one pointer-driven move/resize gesture at a time and decides which
//! tiled window, if any, it should swap with.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::common::collections::HashMap;
use crate::common::config::DragSettings;
use crate::layout_engine::ResizeEdge;
use crate::model::WorkspaceId;
use crate::sys::geometry::{Point, Rect};
use crate::sys::window::WindowId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DragKind {
    Move,
    Resize(ResizeEdge),
}

#[derive(Debug, Clone, PartialEq)]
pub struct DragState {
    pub window: WindowId,
    pub monitor: usize,
    pub workspace: WorkspaceId,
    /// Where the layout had the window when the gesture started.
    pub initial_rect: Rect,
    pub initial_pointer: Point,
    pub kind: DragKind,
    pub moved: bool,
    pub started: Instant,
    pub last_seen: Instant,
    pub target: Option<WindowId>,
}

/// A gesture that just ended.
#[derive(Debug, Clone, PartialEq)]
pub struct FinishedDrag {
    pub state: DragState,
    pub pointer: Point,
    /// Moved past the threshold and lasted long enough to count as a move.
    pub qualifies: bool,
}

/// Classifies a gesture from where the pointer grabbed the window.
///
/// Corners, the title bar and the interior all move the window; only the
/// resize band along a single side below the title bar resizes it.
pub fn classify(rect: Rect, pointer: Point, settings: &DragSettings) -> DragKind {
    let band = settings.resize_border;
    let near_left = pointer.x < rect.left + band;
    let near_right = pointer.x >= rect.right - band;
    let near_top = pointer.y < rect.top + band;
    let near_bottom = pointer.y >= rect.bottom - band;
    let in_title_bar = pointer.y < rect.top + settings.title_bar_height;

    let horizontal = near_left || near_right;
    let vertical = near_top || near_bottom;
    if (horizontal && vertical) || in_title_bar {
        return DragKind::Move;
    }
    if near_left {
        DragKind::Resize(ResizeEdge::Left)
    } else if near_right {
        DragKind::Resize(ResizeEdge::Right)
    } else if near_bottom {
        DragKind::Resize(ResizeEdge::Bottom)
    } else {
        DragKind::Move
    }
}

/// Picks the swap target for a pointer at `pointer` among `candidates`.
///
/// A candidate qualifies when the pointer is inside its rectangle grown by
/// the proximity band and within the maximum distance of its centre; the
/// nearest qualifying centre wins.
pub fn pick_target(
    pointer: Point,
    candidates: &[(WindowId, Rect)],
    settings: &DragSettings,
) -> Option<WindowId> {
    candidates
        .iter()
        .filter(|(_, rect)| rect.inset(-settings.swap_proximity).contains(pointer))
        .map(|&(window, rect)| (window, pointer.distance_to(rect.center())))
        .filter(|&(_, distance)| distance <= settings.max_swap_distance)
        .min_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(window, _)| window)
}

#[derive(Debug)]
pub struct DragManager {
    settings: DragSettings,
    state: Option<DragState>,
    last_swap_by_window: HashMap<WindowId, Instant>,
    last_swap_by_pair: HashMap<(WindowId, WindowId), Instant>,
}

impl DragManager {
    pub fn new(settings: DragSettings) -> Self {
        Self {
            settings,
            state: None,
            last_swap_by_window: HashMap::default(),
            last_swap_by_pair: HashMap::default(),
        }
    }

    pub fn settings(&self) -> &DragSettings { &self.settings }

    pub fn state(&self) -> Option<&DragState> { self.state.as_ref() }

    pub fn is_dragging(&self, window: WindowId) -> bool {
        self.state.as_ref().is_some_and(|s| s.window == window)
    }

    /// Starts tracking a gesture, returning any gesture it replaces.
    pub fn begin(
        &mut self,
        window: WindowId,
        monitor: usize,
        workspace: WorkspaceId,
        initial_rect: Rect,
        pointer: Point,
        now: Instant,
    ) -> Option<DragState> {
        let kind = classify(initial_rect, pointer, &self.settings);
        debug!(%window, ?kind, "drag started");
        let previous = self.state.replace(DragState {
            window,
            monitor,
            workspace,
            initial_rect,
            initial_pointer: pointer,
            kind,
            moved: false,
            started: now,
            last_seen: now,
            target: None,
        });
        if let Some(prev) = &previous {
            debug!(window = %prev.window, "replaced abandoned drag");
        }
        previous
    }

    /// Drops a gesture that has not been heard from for too long.
    pub fn expire_stale(&mut self, now: Instant) -> Option<DragState> {
        let abandon_after = self.settings.abandon_after();
        let stale = self
            .state
            .as_ref()
            .is_some_and(|s| now.saturating_duration_since(s.last_seen) >= abandon_after);
        if stale {
            let state = self.state.take();
            if let Some(s) = &state {
                debug!(window = %s.window, "dropping abandoned drag");
            }
            state
        } else {
            None
        }
    }

    /// Feeds a pointer position. Returns the current swap target.
    pub fn update(
        &mut self,
        window: WindowId,
        pointer: Point,
        candidates: &[(WindowId, Rect)],
        now: Instant,
    ) -> Option<WindowId> {
        let settings = &self.settings;
        let state = self.state.as_mut().filter(|s| s.window == window)?;
        state.last_seen = now;
        if !state.moved
            && state.initial_pointer.distance_to(pointer) > settings.move_threshold as f64
        {
            state.moved = true;
            trace!(%window, "drag passed move threshold");
        }
        if state.moved && state.kind == DragKind::Move {
            let others: Vec<_> = candidates.iter().copied().filter(|(w, _)| *w != window).collect();
            let target = pick_target(pointer, &others, settings);
            if target != state.target {
                trace!(%window, ?target, "swap target changed");
            }
            state.target = target;
        }
        state.target
    }

    /// Ends the gesture on `window`, if one is being tracked.
    pub fn finish(&mut self, window: WindowId, pointer: Point, now: Instant) -> Option<FinishedDrag> {
        if !self.is_dragging(window) {
            return None;
        }
        let mut state = self.state.take()?;
        if state.initial_pointer.distance_to(pointer) > self.settings.move_threshold as f64 {
            state.moved = true;
        }
        let long_enough =
            now.saturating_duration_since(state.started) >= self.settings.min_duration();
        let qualifies = state.kind == DragKind::Move && state.moved && long_enough;
        debug!(%window, qualifies, target = ?state.target, "drag finished");
        Some(FinishedDrag { state, pointer, qualifies })
    }

    pub fn cancel(&mut self, window: WindowId) {
        if self.is_dragging(window) {
            self.state = None;
        }
    }

    /// Whether a swap between `a` and `b` is outside every cooldown.
    pub fn cooldown_allows(&self, a: WindowId, b: WindowId, now: Instant) -> bool {
        let cooldown = self.settings.cooldown();
        let recent = |at: Option<&Instant>| {
            at.is_some_and(|&t| now.saturating_duration_since(t) < cooldown)
        };
        !(recent(self.last_swap_by_window.get(&a))
            || recent(self.last_swap_by_window.get(&b))
            || recent(self.last_swap_by_pair.get(&pair(a, b))))
    }

    pub fn record_swap(&mut self, a: WindowId, b: WindowId, now: Instant) {
        self.last_swap_by_window.insert(a, now);
        self.last_swap_by_window.insert(b, now);
        self.last_swap_by_pair.insert(pair(a, b), now);
        let keep = self.settings.cooldown().max(Duration::from_secs(1)) * 10;
        self.last_swap_by_window.retain(|_, t| now.saturating_duration_since(*t) < keep);
        self.last_swap_by_pair.retain(|_, t| now.saturating_duration_since(*t) < keep);
    }
}

fn pair(a: WindowId, b: WindowId) -> (WindowId, WindowId) { if a <= b { (a, b) } else { (b, a) } }

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    const TILE: Rect = Rect::new(0, 0, 956, 1080);

    fn w(n: u64) -> WindowId { WindowId(n) }

    fn manager() -> DragManager { DragManager::new(DragSettings::default()) }

    #[test]
    fn classification() {
        let s = DragSettings::default();
        assert_eq!(classify(TILE, Point::new(400, 10), &s), DragKind::Move);
        assert_eq!(classify(TILE, Point::new(400, 500), &s), DragKind::Move);
        assert_eq!(classify(TILE, Point::new(2, 1078), &s), DragKind::Move);
        assert_eq!(classify(TILE, Point::new(2, 10), &s), DragKind::Move);
        assert_eq!(classify(TILE, Point::new(2, 500), &s), DragKind::Resize(ResizeEdge::Left));
        assert_eq!(classify(TILE, Point::new(952, 500), &s), DragKind::Resize(ResizeEdge::Right));
        assert_eq!(classify(TILE, Point::new(400, 1075), &s), DragKind::Resize(ResizeEdge::Bottom));
    }

    #[test]
    fn target_must_be_near_and_close() {
        let s = DragSettings::default();
        let candidates = [
            (w(2), Rect::new(964, 0, 1920, 536)),
            (w(3), Rect::new(964, 544, 1920, 1080)),
        ];
        assert_eq!(pick_target(Point::new(1400, 300), &candidates, &s), Some(w(2)));
        assert_eq!(pick_target(Point::new(1400, 800), &candidates, &s), Some(w(3)));
        // Inside the proximity band but too far from any centre.
        assert_eq!(pick_target(Point::new(940, 540), &candidates, &s), None);
        assert_eq!(pick_target(Point::new(100, 100), &candidates, &s), None);
    }

    #[test]
    fn target_only_after_threshold() {
        let mut m = manager();
        let t0 = Instant::now();
        let candidates = [(w(1), TILE), (w(2), Rect::new(964, 0, 1920, 1080))];
        m.begin(w(1), 0, WorkspaceId::FIRST, TILE, Point::new(1200, 10), t0);
        assert_eq!(m.update(w(1), Point::new(1205, 12), &candidates, t0), None);
        assert!(!m.state().unwrap().moved);
        assert_eq!(m.update(w(1), Point::new(1400, 300), &candidates, t0), Some(w(2)));
    }

    #[test]
    fn finish_requires_movement_and_duration() {
        let mut m = manager();
        let t0 = Instant::now();
        m.begin(w(1), 0, WorkspaceId::FIRST, TILE, Point::new(400, 10), t0);
        let quick = m.finish(w(1), Point::new(700, 300), t0 + Duration::from_millis(5)).unwrap();
        assert!(!quick.qualifies);

        m.begin(w(1), 0, WorkspaceId::FIRST, TILE, Point::new(400, 10), t0);
        let still = m.finish(w(1), Point::new(402, 11), t0 + Duration::from_millis(100)).unwrap();
        assert!(!still.qualifies);

        m.begin(w(1), 0, WorkspaceId::FIRST, TILE, Point::new(400, 10), t0);
        let real = m.finish(w(1), Point::new(700, 300), t0 + Duration::from_millis(100)).unwrap();
        assert!(real.qualifies);
        assert!(m.state().is_none());
        assert!(m.finish(w(1), Point::new(0, 0), t0).is_none());
    }

    #[test]
    fn stale_gestures_expire() {
        let mut m = manager();
        let t0 = Instant::now();
        m.begin(w(1), 0, WorkspaceId::FIRST, TILE, Point::new(400, 10), t0);
        assert!(m.expire_stale(t0 + Duration::from_secs(1)).is_none());
        assert!(m.expire_stale(t0 + Duration::from_secs(31)).is_some());
        assert!(m.state().is_none());
    }

    #[test]
    fn new_gesture_replaces_old() {
        let mut m = manager();
        let t0 = Instant::now();
        m.begin(w(1), 0, WorkspaceId::FIRST, TILE, Point::new(400, 10), t0);
        let old = m.begin(w(2), 0, WorkspaceId::FIRST, TILE, Point::new(400, 10), t0);
        assert_eq!(old.map(|s| s.window), Some(w(1)));
        assert!(m.is_dragging(w(2)));
    }

    #[test]
    fn swaps_cool_down_per_window_and_pair() {
        let mut m = manager();
        let t0 = Instant::now();
        assert!(m.cooldown_allows(w(1), w(2), t0));
        m.record_swap(w(1), w(2), t0);
        assert!(!m.cooldown_allows(w(2), w(1), t0 + Duration::from_millis(500)));
        assert!(!m.cooldown_allows(w(1), w(3), t0 + Duration::from_millis(500)));
        assert!(m.cooldown_allows(w(3), w(4), t0 + Duration::from_millis(500)));
        assert!(m.cooldown_allows(w(1), w(2), t0 + Duration::from_millis(1500)));
    }
}
