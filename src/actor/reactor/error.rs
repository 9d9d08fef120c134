use thiserror::Error;

use crate::layout_engine::LayoutError;
use crate::model::WorkspaceError;
use crate::sys::window::{SystemError, WindowId};

#[derive(Debug, Error)]
pub enum ReactorError {
    #[error(transparent)]
    Workspace(#[from] WorkspaceError),
    #[error(transparent)]
    Layout(#[from] LayoutError),
    #[error(transparent)]
    System(#[from] SystemError),
    #[error("window {0} is not managed")]
    Unmanaged(WindowId),
    #[error("no window has focus")]
    NoFocus,
    #[error("recording I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("could not decode recorded session: {0}")]
    Decode(#[from] ron::error::SpannedError),
    #[error("could not encode event: {0}")]
    Encode(#[from] ron::Error),
}
