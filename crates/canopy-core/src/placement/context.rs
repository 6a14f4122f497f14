//! Partition / NetworkPartition contexts - 配置ドメインごとのインスタンス数キャッシュ
//!
//! モニタごとに持つ一時的な状態で、永続化しません。
//! パーティションのコンテキストは最初に配置候補になったときに作られ、
//! モニタが破棄されると一緒に消えます。

use std::collections::{BTreeMap, BTreeSet};

use crate::domain::{InstanceId, NetworkPartitionId, NetworkPartitionPolicy, PartitionId, PartitionPolicy};

/// PartitionContext は 1 パーティション内のインスタンス数を数える
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionContext {
    partition_id: PartitionId,
    network_partition_id: NetworkPartitionId,
    max: u32,
    instances: BTreeSet<InstanceId>,
    terminating: BTreeSet<InstanceId>,
}

impl PartitionContext {
    pub fn new(network_partition_id: NetworkPartitionId, policy: &PartitionPolicy) -> Self {
        Self {
            partition_id: policy.id.clone(),
            network_partition_id,
            max: policy.max,
            instances: BTreeSet::new(),
            terminating: BTreeSet::new(),
        }
    }

    pub fn partition_id(&self) -> &PartitionId {
        &self.partition_id
    }

    pub fn network_partition_id(&self) -> &NetworkPartitionId {
        &self.network_partition_id
    }

    pub fn max(&self) -> u32 {
        self.max
    }

    /// Terminating を含む、まだ終了していないインスタンス数
    pub fn non_terminated_count(&self) -> usize {
        self.instances.len()
    }

    pub fn terminating_count(&self) -> usize {
        self.terminating.len()
    }

    /// `max == 0` は上限なし
    pub fn has_capacity(&self) -> bool {
        self.max == 0 || self.instances.len() < self.max as usize
    }

    pub fn contains(&self, instance: &InstanceId) -> bool {
        self.instances.contains(instance)
    }

    fn add_instance(&mut self, instance: InstanceId) {
        self.instances.insert(instance);
    }

    fn mark_terminating(&mut self, instance: &InstanceId) {
        if self.instances.contains(instance) {
            self.terminating.insert(instance.clone());
        }
    }

    fn remove_instance(&mut self, instance: &InstanceId) {
        self.instances.remove(instance);
        self.terminating.remove(instance);
    }
}

/// PlacedInstance はネットワークパーティション内の 1 インスタンスの配置
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlacedInstance {
    pub instance_id: InstanceId,
    pub parent_id: Option<InstanceId>,
    pub partition_id: Option<PartitionId>,
}

/// NetworkPartitionContext はモニタが 1 ネットワークパーティションに持つ状態
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkPartitionContext {
    id: NetworkPartitionId,
    partitions: Vec<PartitionContext>,
    instances: BTreeMap<InstanceId, PlacedInstance>,
    terminating: BTreeSet<InstanceId>,
}

impl NetworkPartitionContext {
    pub fn new(id: NetworkPartitionId) -> Self {
        Self {
            id,
            partitions: Vec::new(),
            instances: BTreeMap::new(),
            terminating: BTreeSet::new(),
        }
    }

    pub fn id(&self) -> &NetworkPartitionId {
        &self.id
    }

    pub fn partition(&self, id: &PartitionId) -> Option<&PartitionContext> {
        self.partitions.iter().find(|p| &p.partition_id == id)
    }

    pub fn partitions(&self) -> &[PartitionContext] {
        &self.partitions
    }

    /// ポリシーの順番で配置候補を返す（なければここで作る）
    ///
    /// 既存コンテキストの上限はポリシーの値で更新する。
    /// 新しく作るコンテキストには、既に追跡しているそのパーティションのインスタンスを数え込む。
    pub fn candidates(&mut self, policy: &NetworkPartitionPolicy) -> Vec<&PartitionContext> {
        for partition in &policy.partitions {
            match self
                .partitions
                .iter_mut()
                .find(|p| p.partition_id == partition.id)
            {
                Some(existing) => existing.max = partition.max,
                None => {
                    let mut ctx = PartitionContext::new(self.id.clone(), partition);
                    for placed in self
                        .instances
                        .values()
                        .filter(|i| i.partition_id.as_ref() == Some(&partition.id))
                    {
                        ctx.add_instance(placed.instance_id.clone());
                        if self.terminating.contains(&placed.instance_id) {
                            ctx.mark_terminating(&placed.instance_id);
                        }
                    }
                    self.partitions.push(ctx);
                }
            }
        }
        policy
            .partitions
            .iter()
            .filter_map(|p| self.partition(&p.id))
            .collect()
    }

    pub fn add_instance(&mut self, placed: PlacedInstance) {
        if let Some(pid) = &placed.partition_id
            && let Some(partition) = self.partitions.iter_mut().find(|p| &p.partition_id == pid)
        {
            partition.add_instance(placed.instance_id.clone());
        }
        self.instances.insert(placed.instance_id.clone(), placed);
    }

    pub fn mark_terminating(&mut self, instance: &InstanceId) {
        if self.instances.contains_key(instance) {
            self.terminating.insert(instance.clone());
        }
        for partition in &mut self.partitions {
            partition.mark_terminating(instance);
        }
    }

    pub fn remove_instance(&mut self, instance: &InstanceId) -> Option<PlacedInstance> {
        self.terminating.remove(instance);
        for partition in &mut self.partitions {
            partition.remove_instance(instance);
        }
        self.instances.remove(instance)
    }

    pub fn instance(&self, id: &InstanceId) -> Option<&PlacedInstance> {
        self.instances.get(id)
    }

    pub fn instance_count(&self) -> usize {
        self.instances.len()
    }

    pub fn non_terminated_count_of_partition(&self, id: &PartitionId) -> usize {
        self.partition(id)
            .map(PartitionContext::non_terminated_count)
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn np_policy(partitions: &[(&str, u32)]) -> NetworkPartitionPolicy {
        NetworkPartitionPolicy {
            id: NetworkPartitionId::new("np1"),
            partition_algorithm: "round-robin".into(),
            partitions: partitions
                .iter()
                .map(|(id, max)| PartitionPolicy {
                    id: PartitionId::new(*id),
                    max: *max,
                })
                .collect(),
        }
    }

    #[test]
    fn candidates_are_created_lazily_in_policy_order() {
        let mut ctx = NetworkPartitionContext::new(NetworkPartitionId::new("np1"));
        assert!(ctx.partitions().is_empty());

        let ids: Vec<String> = ctx
            .candidates(&np_policy(&[("p2", 0), ("p1", 0)]))
            .iter()
            .map(|p| p.partition_id().to_string())
            .collect();
        assert_eq!(ids, vec!["p2", "p1"]);
        assert_eq!(ctx.partitions().len(), 2);
    }

    #[test]
    fn counts_follow_instance_lifecycle() {
        let mut ctx = NetworkPartitionContext::new(NetworkPartitionId::new("np1"));
        ctx.candidates(&np_policy(&[("p1", 2)]));
        let p1 = PartitionId::new("p1");

        for id in ["g-1", "g-2"] {
            ctx.add_instance(PlacedInstance {
                instance_id: InstanceId::new(id),
                parent_id: Some(InstanceId::new("app-1")),
                partition_id: Some(p1.clone()),
            });
        }
        assert_eq!(ctx.non_terminated_count_of_partition(&p1), 2);
        assert!(!ctx.partition(&p1).unwrap().has_capacity());

        ctx.mark_terminating(&InstanceId::new("g-1"));
        assert_eq!(ctx.partition(&p1).unwrap().terminating_count(), 1);

        ctx.remove_instance(&InstanceId::new("g-1"));
        assert_eq!(ctx.non_terminated_count_of_partition(&p1), 1);
        assert!(ctx.partition(&p1).unwrap().has_capacity());
        assert_eq!(ctx.instance_count(), 1);
    }

    #[test]
    fn instances_tracked_before_the_first_candidate_call_are_counted() {
        let mut ctx = NetworkPartitionContext::new(NetworkPartitionId::new("np1"));
        for (id, partition) in [("web-1", "p1"), ("web-2", "p2"), ("web-3", "p1")] {
            ctx.add_instance(PlacedInstance {
                instance_id: InstanceId::new(id),
                parent_id: Some(InstanceId::new("app-1")),
                partition_id: Some(PartitionId::new(partition)),
            });
        }
        ctx.mark_terminating(&InstanceId::new("web-3"));

        let candidates = ctx.candidates(&np_policy(&[("p1", 2), ("p2", 0)]));
        assert_eq!(candidates[0].non_terminated_count(), 2);
        assert_eq!(candidates[0].terminating_count(), 1);
        assert!(!candidates[0].has_capacity());
        assert_eq!(candidates[1].non_terminated_count(), 1);
        assert!(candidates[1].has_capacity());
    }
}
