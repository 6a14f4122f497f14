//! Monitor - ランタイムのモニタ階層
//!
//! アプリケーション定義を写したツリー（ApplicationMonitor → GroupMonitor → ClusterMonitor）が
//! 子のステータス変化を集約し、親の変化を子に伝えます。
//!
//! # 設計原則
//! - モニタはスナップショットを直接書き換えない（遷移は `Effect::Lifecycle` で ApplicationBuilder へ）
//! - ハンドラは同期関数で、続きの作業を `Effect` として返す
//! - 親子リンクは `MonitorTree` のアリーナ上の id（所有権の循環なし）
//! - `set_status` がモニタ側ステータスを変える唯一の入口

pub mod application;
pub mod cluster;
pub mod group;
mod parent;
pub mod registry;
pub mod run_loop;
pub mod status_chain;
pub mod tree;

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use tracing::{debug, info, warn};

use crate::domain::{
    Application, ComponentId, DependencyTree, Instance, InstanceId, Lifecycle, LifecycleCommand,
    LifecycleEvent, MonitorScalingEvent, MonitorStatusEvent, NetworkPartitionId, PartitionId,
    ScalingDependencyTree, Status,
};
use crate::placement::AlgorithmRegistry;
use crate::ports::{IdGenerator, PolicyStore};

pub use application::ApplicationMonitor;
pub use cluster::ClusterMonitor;
pub use group::GroupMonitor;
pub use registry::MonitorRegistry;
pub use run_loop::MonitorLoop;
pub use status_chain::{ChildState, StatusProcessor, StatusProcessorChain};
pub use tree::{MonitorSettings, MonitorTree};

/// MonitorId は `MonitorTree` 内のノード番号
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MonitorId(u32);

impl MonitorId {
    pub(crate) fn new(raw: u32) -> Self {
        Self(raw)
    }
}

impl fmt::Display for MonitorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// RuntimeInstance はモニタが追跡する 1 インスタンス
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeInstance {
    pub instance_id: InstanceId,
    pub parent_id: Option<InstanceId>,
    pub network_partition_id: Option<NetworkPartitionId>,
    pub partition_id: Option<PartitionId>,
    pub status: Status,
}

impl RuntimeInstance {
    pub fn new(instance_id: InstanceId, parent_id: Option<InstanceId>) -> Self {
        Self {
            instance_id,
            parent_id,
            network_partition_id: None,
            partition_id: None,
            status: Status::Created,
        }
    }

    pub fn is_live(&self) -> bool {
        self.status != Status::Terminated
    }
}

impl<S: Lifecycle + Into<Status>> From<&Instance<S>> for RuntimeInstance {
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

/// Effect はハンドラが返す「次にやること」
///
/// ドライバが深さ優先で順に実行するので、返した順序がそのまま処理順になります。
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Update a monitor's runtime status through `set_status`.
    SetStatus {
        component: ComponentId,
        instance_id: InstanceId,
        status: Status,
    },
    /// Track an instance the snapshot already knows about.
    TrackInstance {
        component: ComponentId,
        instance: RuntimeInstance,
    },
    NotifyParent {
        target: MonitorId,
        event: MonitorStatusEvent,
    },
    NotifyChild {
        target: MonitorId,
        event: MonitorStatusEvent,
    },
    ScaleParent {
        target: MonitorId,
        event: MonitorScalingEvent,
    },
    ScaleChild {
        target: MonitorId,
        event: MonitorScalingEvent,
    },
    /// Create the child monitor if needed and start it for the given parent instances.
    StartChild {
        parent: MonitorId,
        child: ComponentId,
        parent_instance_ids: Vec<InstanceId>,
    },
    StartMinimum {
        target: MonitorId,
        parent_instance_ids: Vec<InstanceId>,
    },
    CreateInstances {
        target: MonitorId,
        parent_instance_ids: Vec<InstanceId>,
    },
    /// Start the starting roots of a monitor for the given own instances.
    StartDependency {
        target: MonitorId,
        instance_ids: Vec<InstanceId>,
    },
    RemoveMonitor(MonitorId),
    Lifecycle(LifecycleCommand),
    Publish(LifecycleEvent),
    RegisterClusterMonitor(String),
    DeregisterClusterMonitor(String),
}

/// MonitorEnv は配置に必要な外部依存
pub struct MonitorEnv<'a> {
    pub policies: &'a dyn PolicyStore,
    pub algorithms: &'a AlgorithmRegistry,
    pub ids: &'a dyn IdGenerator,
}

/// MonitorCx はハンドラ実行中に読めるもの
///
/// 処理中のノード自身はアリーナから取り出されているので `tree` には含まれません。
pub struct MonitorCx<'a> {
    pub tree: &'a MonitorTree,
    pub app: &'a Application,
}

impl MonitorCx<'_> {
    pub fn node(&self, id: MonitorId) -> Option<&MonitorNode> {
        self.tree.get(id)
    }
}

/// MonitorCore は全モニタ共通の状態
#[derive(Debug)]
pub struct MonitorCore {
    pub id: MonitorId,
    pub component: ComponentId,
    pub parent: Option<MonitorId>,
    pub children: BTreeMap<ComponentId, MonitorId>,
    pub instances: BTreeMap<InstanceId, RuntimeInstance>,
    pub startup: DependencyTree,
    pub scaling: ScalingDependencyTree,
    /// (child, instance) pairs waiting for a terminated notification.
    pub terminating: BTreeSet<(ComponentId, InstanceId)>,
    pub inactive: BTreeSet<(ComponentId, InstanceId)>,
    /// Some sibling in the parent's startup order waits for this monitor.
    pub has_startup_dependents: bool,
    /// This monitor is listed in a scaling-dependency set of its parent.
    pub has_group_scaling_dependent: bool,
}

impl MonitorCore {
    pub fn new(id: MonitorId, component: ComponentId, parent: Option<MonitorId>) -> Self {
        Self {
            id,
            component,
            parent,
            children: BTreeMap::new(),
            instances: BTreeMap::new(),
            startup: DependencyTree::new(),
            scaling: ScalingDependencyTree::default(),
            terminating: BTreeSet::new(),
            inactive: BTreeSet::new(),
            has_startup_dependents: false,
            has_group_scaling_dependent: false,
        }
    }

    pub fn instance(&self, id: &InstanceId) -> Option<&RuntimeInstance> {
        self.instances.get(id)
    }

    pub fn instances_with_parent<'a>(
        &'a self,
        parent: &'a InstanceId,
    ) -> impl Iterator<Item = &'a RuntimeInstance> + 'a {
        self.instances
            .values()
            .filter(move |i| i.parent_id.as_ref() == Some(parent))
    }

    pub fn has_live_instance_for(&self, parent: &InstanceId) -> bool {
        self.instances_with_parent(parent).any(|i| i.is_live())
    }

    pub fn has_live_instances(&self) -> bool {
        self.instances.values().any(|i| i.is_live())
    }

    pub fn child_monitor<'a>(
        &self,
        cx: &'a MonitorCx<'_>,
        child: &ComponentId,
    ) -> Option<&'a MonitorNode> {
        self.children.get(child).and_then(|id| cx.tree.get(*id))
    }
}

/// MonitorKind はモニタ種別ごとの状態
#[derive(Debug)]
pub enum MonitorKind {
    Application(ApplicationMonitor),
    Group(GroupMonitor),
    Cluster(ClusterMonitor),
}

/// ComponentMonitor はモニタ種別ごとのイベント処理
pub trait ComponentMonitor {
    fn on_child_status_event(
        &mut self,
        core: &mut MonitorCore,
        cx: &MonitorCx<'_>,
        event: &MonitorStatusEvent,
    ) -> Vec<Effect>;

    fn on_parent_status_event(
        &mut self,
        core: &mut MonitorCore,
        cx: &MonitorCx<'_>,
        event: &MonitorStatusEvent,
    ) -> Vec<Effect>;

    fn on_child_scaling_event(
        &mut self,
        core: &mut MonitorCore,
        cx: &MonitorCx<'_>,
        event: &MonitorScalingEvent,
    ) -> Vec<Effect>;

    fn on_parent_scaling_event(
        &mut self,
        core: &mut MonitorCore,
        cx: &MonitorCx<'_>,
        event: &MonitorScalingEvent,
    ) -> Vec<Effect>;
}

/// MonitorNode はアリーナに置かれる 1 モニタ
#[derive(Debug)]
pub struct MonitorNode {
    pub core: MonitorCore,
    pub kind: MonitorKind,
    run_loop: Option<MonitorLoop>,
}

impl MonitorNode {
    pub fn new(core: MonitorCore, kind: MonitorKind, run_loop: Option<MonitorLoop>) -> Self {
        Self {
            core,
            kind,
            run_loop,
        }
    }

    pub fn id(&self) -> MonitorId {
        self.core.id
    }

    pub fn component(&self) -> &ComponentId {
        &self.core.component
    }

    pub fn group_scaling_enabled(&self) -> bool {
        match &self.kind {
            MonitorKind::Group(group) => group.group_scaling_enabled,
            _ => false,
        }
    }

    pub fn is_group(&self) -> bool {
        matches!(self.kind, MonitorKind::Group(_))
    }

    pub fn is_destroyed(&self) -> bool {
        self.run_loop.as_ref().is_some_and(|l| l.is_destroyed())
    }

    /// スナップショット側で作られたインスタンスを追跡に加える（既知なら何もしない）
    pub fn track(&mut self, instance: RuntimeInstance) {
        if self.core.instances.contains_key(&instance.instance_id) {
            return;
        }
        if let MonitorKind::Group(group) = &mut self.kind {
            group.track(&instance);
        }
        self.core
            .instances
            .insert(instance.instance_id.clone(), instance);
    }

    pub(crate) fn destroy(&mut self) {
        if let Some(run_loop) = self.run_loop.take() {
            run_loop.destroy();
        }
    }

    pub fn on_child_status_event(
        &mut self,
        cx: &MonitorCx<'_>,
        event: &MonitorStatusEvent,
    ) -> Vec<Effect> {
        debug!(
            monitor = %self.core.component,
            child = %event.id,
            instance_id = %event.instance_id,
            status = %event.status,
            "child status event"
        );
        // core と kind を別々に借用する
        let Self { core, kind, .. } = self;
        dispatch(kind).on_child_status_event(core, cx, event)
    }

    pub fn on_parent_status_event(
        &mut self,
        cx: &MonitorCx<'_>,
        event: &MonitorStatusEvent,
    ) -> Vec<Effect> {
        debug!(
            monitor = %self.core.component,
            parent = %event.id,
            instance_id = %event.instance_id,
            status = %event.status,
            "parent status event"
        );
        let Self { core, kind, .. } = self;
        dispatch(kind).on_parent_status_event(core, cx, event)
    }

    pub fn on_child_scaling_event(
        &mut self,
        cx: &MonitorCx<'_>,
        event: &MonitorScalingEvent,
    ) -> Vec<Effect> {
        let Self { core, kind, .. } = self;
        dispatch(kind).on_child_scaling_event(core, cx, event)
    }

    pub fn on_parent_scaling_event(
        &mut self,
        cx: &MonitorCx<'_>,
        event: &MonitorScalingEvent,
    ) -> Vec<Effect> {
        let Self { core, kind, .. } = self;
        dispatch(kind).on_parent_scaling_event(core, cx, event)
    }

    /// set_status はモニタ側ステータスの唯一の更新口
    ///
    /// # フロー
    /// 1. ランタイムインスタンスのステータスを更新
    /// 2. 親へ通知（グループが Inactive で起動依存の後続が無い場合は通知しない）
    /// 3. 全ての子へ通知
    /// 4. Terminated ならインスタンスと配置情報を破棄
    pub fn set_status(
        &mut self,
        cx: &MonitorCx<'_>,
        instance_id: &InstanceId,
        status: Status,
    ) -> Vec<Effect> {
        let scaling_enabled = self.group_scaling_enabled();
        let Some(instance) = self.core.instances.get_mut(instance_id) else {
            warn!(
                monitor = %self.core.component,
                instance_id = %instance_id,
                status = %status,
                "runtime instance not found; status not applied"
            );
            return Vec::new();
        };
        instance.status = status;
        let recorded_parent = instance.parent_id.clone();
        info!(
            monitor = %self.core.component,
            instance_id = %instance_id,
            status = %status,
            "monitor status updated"
        );

        let mut effects = Vec::new();
        // 起動依存の後続を持たないグループの Inactive だけは親へ上げない（クラスタの葉は常に通知）
        let notify_parent =
            status != Status::Inactive || self.core.has_startup_dependents || !self.is_group();
        if notify_parent && let Some(parent) = self.core.parent {
            let parent_instance = if scaling_enabled {
                cx.app
                    .instance_context(&self.core.component, instance_id)
                    .and_then(|ctx| ctx.parent_id)
                    .or(recorded_parent)
            } else {
                recorded_parent.or_else(|| Some(instance_id.clone()))
            };
            match parent_instance {
                Some(parent_instance) => effects.push(Effect::NotifyParent {
                    target: parent,
                    event: MonitorStatusEvent {
                        id: self.core.component.clone(),
                        instance_id: parent_instance,
                        status,
                    },
                }),
                None => warn!(
                    monitor = %self.core.component,
                    instance_id = %instance_id,
                    "parent instance unknown; parent not notified"
                ),
            }
        }

        for child in self.core.children.values() {
            effects.push(Effect::NotifyChild {
                target: *child,
                event: MonitorStatusEvent {
                    id: self.core.component.clone(),
                    instance_id: instance_id.clone(),
                    status,
                },
            });
        }

        match status {
            Status::Terminating => {
                if let MonitorKind::Group(group) = &mut self.kind {
                    group.mark_terminating(instance_id);
                }
            }
            Status::Terminated => {
                self.core.instances.remove(instance_id);
                if let MonitorKind::Group(group) = &mut self.kind {
                    group.forget_instance(instance_id);
                }
            }
            _ => {}
        }

        effects
    }
}

fn dispatch(kind: &mut MonitorKind) -> &mut dyn ComponentMonitor {
    match kind {
        MonitorKind::Application(m) => m,
        MonitorKind::Group(m) => m,
        MonitorKind::Cluster(m) => m,
    }
}
