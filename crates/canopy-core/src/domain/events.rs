//! Events - 公開イベントとモニタ間イベント
//!
//! - `LifecycleEvent`: EventSink へ fire-and-forget で公開するステータス変更通知
//! - `MonitorStatusEvent` / `MonitorScalingEvent`: モニタツリー内を伝播するイベント

use serde::{Deserialize, Serialize};

use crate::domain::application::Application;
use crate::domain::ids::{
    ApplicationId, ClusterId, ComponentId, GroupId, InstanceId, NetworkPartitionId,
};
use crate::domain::status::Status;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LifecycleEvent {
    ApplicationCreated {
        application_id: ApplicationId,
    },
    ApplicationActivated {
        application_id: ApplicationId,
        instance_id: InstanceId,
    },
    ApplicationTerminating {
        application_id: ApplicationId,
        instance_id: InstanceId,
    },
    ApplicationTerminated {
        application_id: ApplicationId,
        instance_id: InstanceId,
        clusters: Vec<ClusterId>,
    },
    GroupCreated {
        application_id: ApplicationId,
        group_id: GroupId,
        instance_id: InstanceId,
    },
    GroupActivated {
        application_id: ApplicationId,
        group_id: GroupId,
        instance_id: InstanceId,
    },
    GroupInactive {
        application_id: ApplicationId,
        group_id: GroupId,
        instance_id: InstanceId,
    },
    GroupTerminating {
        application_id: ApplicationId,
        group_id: GroupId,
        instance_id: InstanceId,
    },
    GroupTerminated {
        application_id: ApplicationId,
        group_id: GroupId,
        instance_id: InstanceId,
    },
    /// Asks the cluster subsystem to terminate one cluster instance.
    ClusterTerminating {
        application_id: ApplicationId,
        service_type: String,
        cluster_id: String,
        instance_id: InstanceId,
    },
    CompleteApplications {
        applications: Vec<Application>,
    },
}

impl LifecycleEvent {
    /// ログ用の短い名前
    pub fn name(&self) -> &'static str {
        match self {
            LifecycleEvent::ApplicationCreated { .. } => "application_created",
            LifecycleEvent::ApplicationActivated { .. } => "application_activated",
            LifecycleEvent::ApplicationTerminating { .. } => "application_terminating",
            LifecycleEvent::ApplicationTerminated { .. } => "application_terminated",
            LifecycleEvent::GroupCreated { .. } => "group_created",
            LifecycleEvent::GroupActivated { .. } => "group_activated",
            LifecycleEvent::GroupInactive { .. } => "group_inactive",
            LifecycleEvent::GroupTerminating { .. } => "group_terminating",
            LifecycleEvent::GroupTerminated { .. } => "group_terminated",
            LifecycleEvent::ClusterTerminating { .. } => "cluster_terminating",
            LifecycleEvent::CompleteApplications { .. } => "complete_applications",
        }
    }
}

/// MonitorStatusEvent は子→親 / 親→子に伝わるステータス変更
///
/// `id` は送信元のコンポーネント、`instance_id` は受信側から見たインスタンス。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorStatusEvent {
    pub id: ComponentId,
    pub instance_id: InstanceId,
    pub status: Status,
}

/// MonitorScalingEvent は外部で決まったスケーリング要求
#[derive(Debug, Clone, PartialEq)]
pub struct MonitorScalingEvent {
    /// Component that originated the scaling need.
    pub id: ComponentId,
    pub network_partition_id: NetworkPartitionId,
    pub instance_id: InstanceId,
    pub factor: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lifecycle_event_is_tagged() {
        let event = LifecycleEvent::GroupActivated {
            application_id: ApplicationId::new("app1"),
            group_id: GroupId::new("web"),
            instance_id: InstanceId::new("app1-1"),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "group_activated");
        assert_eq!(json["group_id"], "web");
        assert_eq!(event.name(), "group_activated");
    }
}
