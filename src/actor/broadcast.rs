//! Notifications for the border and workspace-indicator renderers.

use serde::{Deserialize, Serialize};

use crate::model::WorkspaceId;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "snake_case")]
#[serde(tag = "type")]
pub enum BroadcastEvent {
    /// Tiling was (re)applied to a workspace.
    LayoutApplied {
        monitor: usize,
        workspace: WorkspaceId,
        windows: usize,
    },
    /// The indicator for `monitor` should be redrawn. `backup_workspaces`
    /// holds workspaces filled from a disconnected monitor.
    IndicatorRefresh {
        monitor: usize,
        current: WorkspaceId,
        backup_workspaces: Vec<WorkspaceId>,
    },
    WorkspaceChanged {
        monitor: usize,
        workspace: WorkspaceId,
    },
}

pub type BroadcastSender = crate::actor::Sender<BroadcastEvent>;
pub type BroadcastReceiver = crate::actor::Receiver<BroadcastEvent>;

pub fn channel() -> (BroadcastSender, BroadcastReceiver) { crate::actor::channel() }

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn serializes_with_type_tag() {
        let event = BroadcastEvent::IndicatorRefresh {
            monitor: 0,
            current: WorkspaceId::FIRST,
            backup_workspaces: vec![WorkspaceId::new(2).unwrap()],
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "indicator_refresh");
        assert_eq!(json["backup_workspaces"], serde_json::json!([2]));
    }
}
