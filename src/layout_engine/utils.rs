use crate::common::config::LayoutSettings;
use crate::sys::geometry::Rect;

/// The part of a monitor's work area that tiles may occupy.
pub fn compute_tiling_area(work_area: Rect, layout: &LayoutSettings) -> Rect {
    if layout.outer_gap == 0 {
        work_area
    } else {
        work_area.inset(layout.outer_gap).normalized()
    }
}

/// The single rectangle every window of a stacked workspace shares.
pub fn compute_stacked_area(work_area: Rect, layout: &LayoutSettings) -> Rect {
    compute_tiling_area(work_area, layout).inset(layout.border_width).normalized()
}
