//! GroupMonitor - グループインスタンスの配置と子の集約
//!
//! # 配置フロー（create_instances）
//! 1. スナップショットから親インスタンスを引き、ネットワークパーティションを決める
//! 2. NetworkPartitionContext を取得（無ければ作成）
//! 3. deployment policy を解決（グループ指定 → ApplicationPolicy の子ポリシー → 無し）
//! 4. アルゴリズムでパーティションを選ぶ
//! 5. インスタンス id を決める（min = max = 1 なら親の id を再利用）
//! 6. ランタイムに記録し、`GroupInstanceCreated` → `StartDependency` を返す

use std::collections::BTreeMap;

use tracing::{debug, info, warn};

use crate::domain::{
    ApplicationId, DeploymentPolicy, Group, GroupId, GroupInstance, InstanceId, LifecycleCommand,
    MonitorScalingEvent, MonitorStatusEvent, NetworkPartitionId, OrchestrationError,
    PlacementError, Status,
};
use crate::monitor::{
    parent, ComponentMonitor, Effect, MonitorCore, MonitorCx, MonitorEnv, RuntimeInstance,
};
use crate::placement::{NetworkPartitionContext, PlacedInstance};

#[derive(Debug)]
pub struct GroupMonitor {
    pub group_id: GroupId,
    pub group_scaling_enabled: bool,
    network_partitions: BTreeMap<NetworkPartitionId, NetworkPartitionContext>,
}

impl GroupMonitor {
    pub fn new(group: &Group) -> Self {
        Self {
            group_id: group.id.clone(),
            group_scaling_enabled: group.group_scaling_enabled,
            network_partitions: BTreeMap::new(),
        }
    }

    pub fn network_partition(&self, id: &NetworkPartitionId) -> Option<&NetworkPartitionContext> {
        self.network_partitions.get(id)
    }

    /// スナップショットに既にあるインスタンスを配置情報に反映する
    pub fn track(&mut self, instance: &RuntimeInstance) {
        let Some(np) = &instance.network_partition_id else {
            return;
        };
        self.network_partitions
            .entry(np.clone())
            .or_insert_with(|| NetworkPartitionContext::new(np.clone()))
            .add_instance(PlacedInstance {
                instance_id: instance.instance_id.clone(),
                parent_id: instance.parent_id.clone(),
                partition_id: instance.partition_id.clone(),
            });
    }

    pub(crate) fn mark_terminating(&mut self, instance_id: &InstanceId) {
        for np in self.network_partitions.values_mut() {
            np.mark_terminating(instance_id);
        }
    }

    pub(crate) fn forget_instance(&mut self, instance_id: &InstanceId) {
        for np in self.network_partitions.values_mut() {
            np.remove_instance(instance_id);
        }
    }

    /// 親インスタンスごとに 1 つずつグループインスタンスを作る
    ///
    /// 途中で配置に失敗した場合は、この呼び出しで追加した分を巻き戻してエラーを返します。
    pub fn create_instances(
        &mut self,
        core: &mut MonitorCore,
        cx: &MonitorCx<'_>,
        env: &MonitorEnv<'_>,
        parent_instance_ids: &[InstanceId],
    ) -> Result<Vec<Effect>, OrchestrationError> {
        let mut created: Vec<(InstanceId, NetworkPartitionId)> = Vec::new();
        let result = self.place_all(core, cx, env, parent_instance_ids, &mut created);
        if result.is_err() {
            for (instance_id, np) in &created {
                core.instances.remove(instance_id);
                if let Some(ctx) = self.network_partitions.get_mut(np) {
                    ctx.remove_instance(instance_id);
                }
            }
        }
        result
    }

    fn place_all(
        &mut self,
        core: &mut MonitorCore,
        cx: &MonitorCx<'_>,
        env: &MonitorEnv<'_>,
        parent_instance_ids: &[InstanceId],
        created: &mut Vec<(InstanceId, NetworkPartitionId)>,
    ) -> Result<Vec<Effect>, OrchestrationError> {
        let group = cx.app.group_recursively(&self.group_id).ok_or_else(|| {
            OrchestrationError::InconsistentTopology(format!(
                "group {} has a monitor but no definition",
                self.group_id
            ))
        })?;
        let parent_component = core
            .parent
            .and_then(|p| cx.node(p))
            .map(|n| n.component().clone())
            .ok_or_else(|| {
                OrchestrationError::InconsistentTopology(format!(
                    "group monitor {} has no parent monitor",
                    self.group_id
                ))
            })?;
        let policy = resolve_policy(group, &cx.app.id, env)?;

        let mut effects = Vec::new();
        for parent_id in parent_instance_ids {
            let parent = cx
                .app
                .instance_context(&parent_component, parent_id)
                .ok_or_else(|| {
                    OrchestrationError::InconsistentTopology(format!(
                        "parent instance {parent_id} of {parent_component} not found"
                    ))
                })?;
            let np_id = parent.network_partition_id.ok_or_else(|| {
                OrchestrationError::InconsistentTopology(format!(
                    "parent instance {parent_id} has no network partition"
                ))
            })?;

            let np_ctx = self
                .network_partitions
                .entry(np_id.clone())
                .or_insert_with(|| NetworkPartitionContext::new(np_id.clone()));

            let partition_id = match &policy {
                Some(policy) => {
                    let np_policy = policy.network_partition(&np_id).ok_or_else(|| {
                        PlacementError::NetworkPartitionNotInPolicy {
                            policy: policy.id.clone(),
                            network_partition: np_id.clone(),
                        }
                    })?;
                    let algorithm = env.algorithms.resolve(&np_policy.partition_algorithm)?;
                    let candidates = np_ctx.candidates(np_policy);
                    let index = algorithm
                        .select(&candidates)
                        .ok_or_else(|| PlacementError::NoCapacity(np_id.clone()))?;
                    let selected = candidates
                        .get(index)
                        .map(|c| c.partition_id().clone())
                        .ok_or_else(|| PlacementError::InvalidSelection {
                            algorithm: algorithm.name().to_string(),
                            index,
                            candidates: candidates.len(),
                        })?;
                    debug!(
                        group_id = %self.group_id,
                        algorithm = algorithm.name(),
                        partition_id = %selected,
                        "partition selected"
                    );
                    Some(selected)
                }
                None => None,
            };

            let instance_id = if group.reuses_parent_instance_id() {
                parent_id.clone()
            } else {
                env.ids.generate_instance_id(&core.component)
            };
            if core.instances.contains_key(&instance_id) {
                warn!(
                    group_id = %self.group_id,
                    instance_id = %instance_id,
                    "group instance already tracked; skipped"
                );
                continue;
            }

            np_ctx.add_instance(PlacedInstance {
                instance_id: instance_id.clone(),
                parent_id: Some(parent_id.clone()),
                partition_id: partition_id.clone(),
            });
            let mut runtime = RuntimeInstance::new(instance_id.clone(), Some(parent_id.clone()));
            runtime.network_partition_id = Some(np_id.clone());
            runtime.partition_id = partition_id.clone();
            core.instances.insert(instance_id.clone(), runtime);
            created.push((instance_id.clone(), np_id.clone()));

            info!(
                group_id = %self.group_id,
                instance_id = %instance_id,
                parent_id = %parent_id,
                network_partition_id = %np_id,
                "group instance placed"
            );
            effects.push(Effect::Lifecycle(LifecycleCommand::GroupInstanceCreated {
                application_id: cx.app.id.clone(),
                group_id: self.group_id.clone(),
                instance: GroupInstance::new(instance_id)
                    .with_parent(Some(parent_id.clone()))
                    .with_network_partition(Some(np_id))
                    .with_partition(partition_id),
            }));
        }

        if !created.is_empty() {
            effects.push(Effect::StartDependency {
                target: core.id,
                instance_ids: created.iter().map(|(id, _)| id.clone()).collect(),
            });
        }
        Ok(effects)
    }
}

/// 親の起動順序で他の兄弟を待つ子か（その場合は依存側の Active を待って起動される）
pub(super) fn waits_for_siblings(core: &MonitorCore, cx: &MonitorCx<'_>) -> bool {
    core.parent
        .and_then(|p| cx.node(p))
        .is_some_and(|parent| parent.core.startup.has_dependencies(&core.component))
}

/// グループに適用する deployment policy（無ければ配置なし）
fn resolve_policy(
    group: &Group,
    application_id: &ApplicationId,
    env: &MonitorEnv<'_>,
) -> Result<Option<DeploymentPolicy>, PlacementError> {
    match &group.deployment_policy {
        Some(name) => env
            .policies
            .get_deployment_policy(name)
            .map(Some)
            .ok_or_else(|| PlacementError::PolicyNotFound(name.clone())),
        None => Ok(env
            .policies
            .get_deployment_policy_by_application(application_id)
            .and_then(|p| p.child_policy(&group.id).cloned())),
    }
}

impl ComponentMonitor for GroupMonitor {
    fn on_child_status_event(
        &mut self,
        core: &mut MonitorCore,
        cx: &MonitorCx<'_>,
        event: &MonitorStatusEvent,
    ) -> Vec<Effect> {
        parent::on_child_status_event(core, cx, event)
    }

    fn on_parent_status_event(
        &mut self,
        core: &mut MonitorCore,
        cx: &MonitorCx<'_>,
        event: &MonitorStatusEvent,
    ) -> Vec<Effect> {
        match event.status {
            Status::Terminating => {
                let targets: Vec<InstanceId> = if core.instances.contains_key(&event.instance_id) {
                    vec![event.instance_id.clone()]
                } else {
                    core.instances_with_parent(&event.instance_id)
                        .map(|i| i.instance_id.clone())
                        .collect()
                };
                targets
                    .into_iter()
                    .filter(|id| {
                        core.instance(id).is_some_and(|i| {
                            !matches!(i.status, Status::Terminating | Status::Terminated)
                        })
                    })
                    .map(|instance_id| {
                        Effect::Lifecycle(LifecycleCommand::GroupTerminating {
                            application_id: cx.app.id.clone(),
                            group_id: self.group_id.clone(),
                            instance_id,
                        })
                    })
                    .collect()
            }
            Status::Created
                if !core.has_live_instance_for(&event.instance_id)
                    && !waits_for_siblings(core, cx) =>
            {
                vec![Effect::CreateInstances {
                    target: core.id,
                    parent_instance_ids: vec![event.instance_id.clone()],
                }]
            }
            _ => Vec::new(),
        }
    }

    fn on_child_scaling_event(
        &mut self,
        core: &mut MonitorCore,
        cx: &MonitorCx<'_>,
        event: &MonitorScalingEvent,
    ) -> Vec<Effect> {
        parent::on_child_scaling_event(core, cx, event)
    }

    fn on_parent_scaling_event(
        &mut self,
        core: &mut MonitorCore,
        _cx: &MonitorCx<'_>,
        event: &MonitorScalingEvent,
    ) -> Vec<Effect> {
        info!(
            group_id = %self.group_id,
            origin = %event.id,
            network_partition_id = %event.network_partition_id,
            factor = event.factor,
            "scaling request from parent"
        );
        parent::forward_scaling_to_children(core, event)
    }
}
