//! LifecycleCommand - ApplicationBuilder への状態遷移要求
//!
//! 外部イベントもモニタの判断も、最終的にはこのコマンドとして
//! ApplicationBuilder に渡り、検証 → スナップショット更新 → 永続化 → 公開 の順で処理されます。

use crate::domain::ids::{ApplicationId, GroupId, InstanceId, NetworkPartitionId};
use crate::domain::instance::GroupInstance;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleCommand {
    ApplicationInstanceCreated {
        application_id: ApplicationId,
        instance_id: InstanceId,
        network_partition_id: NetworkPartitionId,
    },
    ApplicationActivated {
        application_id: ApplicationId,
        instance_id: InstanceId,
    },
    ApplicationTerminated {
        application_id: ApplicationId,
        instance_id: InstanceId,
    },
    GroupCreated {
        application_id: ApplicationId,
        group_id: GroupId,
        instance_id: InstanceId,
    },
    GroupInstanceCreated {
        application_id: ApplicationId,
        group_id: GroupId,
        instance: GroupInstance,
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
    /// Drops a terminated group instance once its propagation has finished.
    ReapGroupInstance {
        application_id: ApplicationId,
        group_id: GroupId,
        instance_id: InstanceId,
    },
    /// Drops a terminated application instance, and the application itself
    /// once no live instance remains.
    ReapApplicationInstance {
        application_id: ApplicationId,
        instance_id: InstanceId,
    },
}

impl LifecycleCommand {
    pub fn application_id(&self) -> &ApplicationId {
        match self {
            LifecycleCommand::ApplicationInstanceCreated { application_id, .. }
            | LifecycleCommand::ApplicationActivated { application_id, .. }
            | LifecycleCommand::ApplicationTerminated { application_id, .. }
            | LifecycleCommand::GroupCreated { application_id, .. }
            | LifecycleCommand::GroupInstanceCreated { application_id, .. }
            | LifecycleCommand::GroupActivated { application_id, .. }
            | LifecycleCommand::GroupInactive { application_id, .. }
            | LifecycleCommand::GroupTerminating { application_id, .. }
            | LifecycleCommand::GroupTerminated { application_id, .. }
            | LifecycleCommand::ReapGroupInstance { application_id, .. }
            | LifecycleCommand::ReapApplicationInstance { application_id, .. } => application_id,
        }
    }
}
