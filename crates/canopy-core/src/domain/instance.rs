//! Instance - アプリケーション / グループの実行中インスタンス
//!
//! 2 種類のインスタンスはステータス型だけが違うので `Instance<S>` にまとめています。
//! parent_id は親インスタンスへの後方参照で、所有関係ではありません。

use serde::{Deserialize, Serialize};

use crate::domain::ids::{InstanceId, NetworkPartitionId, PartitionId};
use crate::domain::status::{ApplicationStatus, GroupStatus, Lifecycle, Status};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instance<S> {
    pub instance_id: InstanceId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<InstanceId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network_partition_id: Option<NetworkPartitionId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partition_id: Option<PartitionId>,
    pub status: S,
}

pub type ApplicationInstance = Instance<ApplicationStatus>;
pub type GroupInstance = Instance<GroupStatus>;

impl<S: Lifecycle> Instance<S> {
    /// Created 状態のインスタンスを作る
    pub fn new(instance_id: InstanceId) -> Self {
        Self {
            instance_id,
            parent_id: None,
            network_partition_id: None,
            partition_id: None,
            status: S::initial(),
        }
    }

    pub fn with_parent(mut self, parent_id: Option<InstanceId>) -> Self {
        self.parent_id = parent_id;
        self
    }

    pub fn with_network_partition(mut self, id: Option<NetworkPartitionId>) -> Self {
        self.network_partition_id = id;
        self
    }

    pub fn with_partition(mut self, id: Option<PartitionId>) -> Self {
        self.partition_id = id;
        self
    }

    pub fn is_state_transition_valid(&self, next: S) -> bool {
        self.status.can_transition_to(next)
    }

    pub fn is_live(&self) -> bool {
        !self.status.is_terminal()
    }
}

impl<S: Lifecycle + Into<Status>> Instance<S> {
    /// モニタ側で使う種別非依存のビュー
    pub fn context(&self) -> InstanceContext {
        InstanceContext {
            instance_id: self.instance_id.clone(),
            parent_id: self.parent_id.clone(),
            network_partition_id: self.network_partition_id.clone(),
            status: self.status.into(),
        }
    }
}

/// InstanceContext はスナップショットから読み出したインスタンスの要約
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceContext {
    pub instance_id: InstanceId,
    pub parent_id: Option<InstanceId>,
    pub network_partition_id: Option<NetworkPartitionId>,
    pub status: Status,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_instance_starts_created() {
        let instance = GroupInstance::new(InstanceId::new("g-1"))
            .with_parent(Some(InstanceId::new("app-1")))
            .with_network_partition(Some(NetworkPartitionId::new("np1")));

        assert_eq!(instance.status, GroupStatus::Created);
        assert!(instance.is_live());
        assert!(instance.is_state_transition_valid(GroupStatus::Active));
        assert!(!instance.is_state_transition_valid(GroupStatus::Terminated));
    }

    #[test]
    fn context_carries_placement() {
        let mut instance = ApplicationInstance::new(InstanceId::new("app-1"))
            .with_network_partition(Some(NetworkPartitionId::new("np1")));
        instance.status = ApplicationStatus::Terminating;

        let ctx = instance.context();
        assert_eq!(ctx.status, Status::Terminating);
        assert_eq!(ctx.network_partition_id, Some(NetworkPartitionId::new("np1")));
        assert!(ctx.parent_id.is_none());
    }
}
