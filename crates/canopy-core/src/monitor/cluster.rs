//! ClusterMonitor - クラスタの葉モニタ
//!
//! クラスタのステータスは外部のクラスタサブシステムが正であり、ここでは
//! 報告されたステータスをツリーへ中継するだけです。

use tracing::{info, warn};

use crate::domain::{
    ClusterDataHolder, ClusterId, InstanceId, LifecycleEvent, MonitorScalingEvent,
    MonitorStatusEvent, Status,
};
use crate::monitor::group::waits_for_siblings;
use crate::monitor::{ComponentMonitor, Effect, MonitorCore, MonitorCx, RuntimeInstance};

#[derive(Debug)]
pub struct ClusterMonitor {
    pub alias: ClusterId,
    pub cluster_id: String,
    pub service_type: String,
    scaling_signals: Vec<MonitorScalingEvent>,
}

impl ClusterMonitor {
    pub fn new(cluster: &ClusterDataHolder) -> Self {
        Self {
            alias: cluster.alias.clone(),
            cluster_id: cluster.cluster_id.clone(),
            service_type: cluster.service_type.clone(),
            scaling_signals: Vec::new(),
        }
    }

    /// 親から受け取ったスケーリング要求を取り出す（クラスタ側の autoscaler が消費する）
    ///
    /// 取り出した分はバッファから消えるので、同じ要求が二度返ることはありません。
    pub fn take_scaling_signals(&mut self) -> Vec<MonitorScalingEvent> {
        std::mem::take(&mut self.scaling_signals)
    }

    /// 親インスタンスごとにクラスタインスタンスを用意する
    ///
    /// クラスタインスタンスの id は親インスタンスの id と同じです。
    pub fn create_instances(
        &mut self,
        core: &mut MonitorCore,
        cx: &MonitorCx<'_>,
        parent_instance_ids: &[InstanceId],
    ) -> Vec<Effect> {
        let parent_component = core.parent.and_then(|p| cx.node(p)).map(|n| n.component().clone());
        let mut created = 0usize;
        for parent_id in parent_instance_ids {
            if core.has_live_instance_for(parent_id) {
                continue;
            }
            let mut runtime = RuntimeInstance::new(parent_id.clone(), Some(parent_id.clone()));
            runtime.network_partition_id = parent_component
                .as_ref()
                .and_then(|c| cx.app.instance_context(c, parent_id))
                .and_then(|ctx| ctx.network_partition_id);
            core.instances.insert(parent_id.clone(), runtime);
            created += 1;
            info!(
                cluster_id = %self.cluster_id,
                instance_id = %parent_id,
                "cluster instance started"
            );
        }

        if created == 0 {
            return Vec::new();
        }
        vec![Effect::RegisterClusterMonitor(self.cluster_id.clone())]
    }

    fn terminating_event(&self, cx: &MonitorCx<'_>, instance_id: InstanceId) -> Effect {
        Effect::Publish(LifecycleEvent::ClusterTerminating {
            application_id: cx.app.id.clone(),
            service_type: self.service_type.clone(),
            cluster_id: self.cluster_id.clone(),
            instance_id,
        })
    }
}

impl ComponentMonitor for ClusterMonitor {
    fn on_child_status_event(
        &mut self,
        core: &mut MonitorCore,
        _cx: &MonitorCx<'_>,
        event: &MonitorStatusEvent,
    ) -> Vec<Effect> {
        warn!(
            monitor = %core.component,
            child = %event.id,
            "cluster monitor has no children; event ignored"
        );
        Vec::new()
    }

    fn on_parent_status_event(
        &mut self,
        core: &mut MonitorCore,
        cx: &MonitorCx<'_>,
        event: &MonitorStatusEvent,
    ) -> Vec<Effect> {
        match event.status {
            Status::Terminating => core
                .instances_with_parent(&event.instance_id)
                .filter(|i| !matches!(i.status, Status::Terminating | Status::Terminated))
                .flat_map(|i| {
                    [
                        Effect::SetStatus {
                            component: core.component.clone(),
                            instance_id: i.instance_id.clone(),
                            status: Status::Terminating,
                        },
                        self.terminating_event(cx, i.instance_id.clone()),
                    ]
                })
                .collect(),
            Status::Created if !waits_for_siblings(core, cx) => {
                self.create_instances(core, cx, std::slice::from_ref(&event.instance_id))
            }
            _ => Vec::new(),
        }
    }

    fn on_child_scaling_event(
        &mut self,
        core: &mut MonitorCore,
        _cx: &MonitorCx<'_>,
        event: &MonitorScalingEvent,
    ) -> Vec<Effect> {
        warn!(
            monitor = %core.component,
            origin = %event.id,
            "cluster monitor has no children; scaling event ignored"
        );
        Vec::new()
    }

    fn on_parent_scaling_event(
        &mut self,
        _core: &mut MonitorCore,
        _cx: &MonitorCx<'_>,
        event: &MonitorScalingEvent,
    ) -> Vec<Effect> {
        info!(
            cluster_id = %self.cluster_id,
            origin = %event.id,
            factor = event.factor,
            "scaling request recorded"
        );
        self.scaling_signals.push(event.clone());
        Vec::new()
    }
}
