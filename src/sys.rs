//! The boundary with the operating system.

pub mod frame_correction;
pub mod gate;
pub mod geometry;
pub mod headless;
pub mod timer;
pub mod window;
