//! ApplicationMonitor - モニタツリーのルート

use tracing::{info, warn};

use crate::domain::{
    Application, InstanceId, LifecycleCommand, MonitorScalingEvent, MonitorStatusEvent,
    NetworkPartitionId,
};
use crate::monitor::{parent, ComponentMonitor, Effect, MonitorCore, MonitorCx, RuntimeInstance};

/// ApplicationMonitor はアプリケーションインスタンスを追跡する
///
/// 親を持たないので parent 系イベントは届かない（届いたらログだけ）。
#[derive(Debug, Default)]
pub struct ApplicationMonitor;

impl ApplicationMonitor {
    pub fn new() -> Self {
        Self
    }

    /// ネットワークパーティションごとにアプリケーションインスタンスを用意する
    ///
    /// 既にスナップショットにある分は追跡だけ行い、新規分は
    /// `ApplicationInstanceCreated` として記録してから起動依存を開始します。
    pub fn create_instances(
        &mut self,
        core: &mut MonitorCore,
        app: &Application,
        network_partitions: &[NetworkPartitionId],
    ) -> (Vec<InstanceId>, Vec<Effect>) {
        let mut effects = Vec::new();
        let mut instance_ids = Vec::new();

        for np in network_partitions {
            let existing = app
                .instances
                .values()
                .find(|i| i.is_live() && i.network_partition_id.as_ref() == Some(np));
            let instance_id = match existing {
                Some(existing) => {
                    info!(
                        application_id = %app.id,
                        instance_id = %existing.instance_id,
                        network_partition_id = %np,
                        "application instance already exists"
                    );
                    existing.instance_id.clone()
                }
                None => {
                    let instance_id = next_instance_id(app, core);
                    effects.push(Effect::Lifecycle(
                        LifecycleCommand::ApplicationInstanceCreated {
                            application_id: app.id.clone(),
                            instance_id: instance_id.clone(),
                            network_partition_id: np.clone(),
                        },
                    ));
                    instance_id
                }
            };

            let mut runtime = RuntimeInstance::new(instance_id.clone(), None);
            runtime.network_partition_id = Some(np.clone());
            if let Some(existing) = existing {
                runtime.status = existing.status.into();
            }
            core.instances.entry(instance_id.clone()).or_insert(runtime);
            instance_ids.push(instance_id);
        }

        if !instance_ids.is_empty() {
            effects.push(Effect::StartDependency {
                target: core.id,
                instance_ids: instance_ids.clone(),
            });
        }
        (instance_ids, effects)
    }
}

/// `<application>-<n>` の形で未使用の番号を探す
fn next_instance_id(app: &Application, core: &MonitorCore) -> InstanceId {
    let mut n = app.instances.len() + 1;
    loop {
        let candidate = InstanceId::new(format!("{}-{n}", app.id));
        if !app.instances.contains_key(&candidate) && !core.instances.contains_key(&candidate) {
            return candidate;
        }
        n += 1;
    }
}

impl ComponentMonitor for ApplicationMonitor {
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
        _cx: &MonitorCx<'_>,
        event: &MonitorStatusEvent,
    ) -> Vec<Effect> {
        warn!(
            monitor = %core.component,
            from = %event.id,
            "application monitor has no parent; event ignored"
        );
        Vec::new()
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
        parent::forward_scaling_to_children(core, event)
    }
}
