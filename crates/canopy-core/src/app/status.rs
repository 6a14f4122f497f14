//! Status - スナップショットとモニタの状態を外部へ見せるビュー

use serde::{Deserialize, Serialize};

use crate::domain::{
    Application, ApplicationId, Group, GroupId, Instance, InstanceId, Lifecycle,
    NetworkPartitionId, PartitionId, Status,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceView {
    pub instance_id: InstanceId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<InstanceId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network_partition_id: Option<NetworkPartitionId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partition_id: Option<PartitionId>,
    pub status: Status,
}

impl<S: Lifecycle + Into<Status>> From<&Instance<S>> for InstanceView {
    fn from(instance: &Instance<S>) -> Self {
        Self {
            instance_id: instance.instance_id.clone(),
            parent_id: instance.parent_id.clone(),
            network_partition_id: instance.network_partition_id.clone(),
            partition_id: instance.partition_id.clone(),
            status: instance.status.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupStatusView {
    pub group_id: GroupId,
    pub instances: Vec<InstanceView>,
}

/// ApplicationStatusView はアプリケーション 1 つ分の状態
///
/// グループは定義順に深さ優先で平坦化します。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationStatusView {
    pub application_id: ApplicationId,
    pub instances: Vec<InstanceView>,
    pub groups: Vec<GroupStatusView>,
    /// 生成済みのモニタ数（ツリーが無ければ 0）
    pub monitors: usize,
    pub cluster_monitors: Vec<String>,
}

impl ApplicationStatusView {
    pub fn new(app: &Application, monitors: usize, cluster_monitors: Vec<String>) -> Self {
        let mut groups = Vec::new();
        collect_groups(&app.children.groups, &mut groups);
        Self {
            application_id: app.id.clone(),
            instances: app.instances.values().map(InstanceView::from).collect(),
            groups,
            monitors,
            cluster_monitors,
        }
    }

    pub fn group(&self, id: &GroupId) -> Option<&GroupStatusView> {
        self.groups.iter().find(|g| &g.group_id == id)
    }
}

fn collect_groups(groups: &[Group], out: &mut Vec<GroupStatusView>) {
    for group in groups {
        out.push(GroupStatusView {
            group_id: group.id.clone(),
            instances: group.instances.values().map(InstanceView::from).collect(),
        });
        collect_groups(&group.children.groups, out);
    }
}
