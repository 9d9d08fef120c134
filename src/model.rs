pub mod backup;
pub mod desktop;
pub mod monitor;
pub mod workspace;

pub use backup::{BackupStore, MonitorBackup, WorkspaceBackup};
pub use desktop::Desktop;
pub use monitor::{Monitor, WorkspaceMove, WorkspaceSwitch};
pub use workspace::{WORKSPACE_COUNT, Workspace, WorkspaceError, WorkspaceId};
