//! MonitorTree - 1 アプリケーション分のモニタのアリーナ
//!
//! ノードは `MonitorId` で参照し合います。ハンドラ実行中は対象ノードをアリーナから
//! 取り出し、残りのツリーを読み取り専用で渡してから戻します。

use std::collections::HashMap;
use std::time::Duration;

use tracing::{debug, info};

use crate::domain::{
    Application, ApplicationId, ClusterId, ClusterStatus, ComponentId, DependencyTree, InstanceId,
    Lifecycle, NetworkPartitionId, OrchestrationError, ScalingDependencyTree,
};
use crate::monitor::{
    ApplicationMonitor, ClusterMonitor, Effect, GroupMonitor, MonitorCore, MonitorCx, MonitorEnv,
    MonitorId, MonitorKind, MonitorLoop, MonitorNode, RuntimeInstance, StatusProcessorChain,
};

/// MonitorSettings はモニタ生成時の設定
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonitorSettings {
    pub interval: Duration,
    /// Spawn a background loop per monitor when a tokio runtime is present.
    pub spawn_loops: bool,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
            spawn_loops: true,
        }
    }
}

#[derive(Debug)]
pub struct MonitorTree {
    application_id: ApplicationId,
    root: MonitorId,
    nodes: HashMap<MonitorId, MonitorNode>,
    index: HashMap<ComponentId, MonitorId>,
    next_id: u32,
    settings: MonitorSettings,
    chain: StatusProcessorChain,
}

impl MonitorTree {
    /// ルートの ApplicationMonitor だけを持つツリーを作る
    ///
    /// 起動順序に循環があれば `DependencyCycle` を返します。
    pub fn new(app: &Application, settings: MonitorSettings) -> Result<Self, OrchestrationError> {
        let root = MonitorId::new(0);
        let component = app.component_id();
        let mut core = MonitorCore::new(root, component.clone(), None);
        core.startup = DependencyTree::from_children(&app.children)?;
        core.scaling = ScalingDependencyTree::from_children(&app.children);
        for instance in app.instances.values().filter(|i| i.is_live()) {
            core.instances
                .insert(instance.instance_id.clone(), RuntimeInstance::from(instance));
        }

        let mut tree = Self {
            application_id: app.id.clone(),
            root,
            nodes: HashMap::new(),
            index: HashMap::new(),
            next_id: 1,
            settings,
            chain: StatusProcessorChain::default(),
        };
        let run_loop = tree.spawn_loop(&component);
        tree.nodes.insert(
            root,
            MonitorNode::new(core, MonitorKind::Application(ApplicationMonitor::new()), run_loop),
        );
        tree.index.insert(component, root);
        info!(application_id = %app.id, "application monitor created");
        Ok(tree)
    }

    pub fn application_id(&self) -> &ApplicationId {
        &self.application_id
    }

    pub fn root(&self) -> MonitorId {
        self.root
    }

    pub fn get(&self, id: MonitorId) -> Option<&MonitorNode> {
        self.nodes.get(&id)
    }

    pub fn find(&self, component: &ComponentId) -> Option<MonitorId> {
        self.index.get(component).copied()
    }

    pub fn node_for(&self, component: &ComponentId) -> Option<&MonitorNode> {
        self.find(component).and_then(|id| self.get(id))
    }

    pub fn node_for_mut(&mut self, component: &ComponentId) -> Option<&mut MonitorNode> {
        let id = self.find(component)?;
        self.nodes.get_mut(&id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn nodes(&self) -> impl Iterator<Item = &MonitorNode> {
        self.nodes.values()
    }

    /// ツリー内のクラスタモニタが監視している cluster id
    pub fn cluster_ids(&self) -> Vec<String> {
        self.nodes
            .values()
            .filter_map(|n| match &n.kind {
                MonitorKind::Cluster(c) => Some(c.cluster_id.clone()),
                _ => None,
            })
            .collect()
    }

    pub(crate) fn chain(&self) -> &StatusProcessorChain {
        &self.chain
    }

    fn require(&self, component: &ComponentId) -> Result<MonitorId, OrchestrationError> {
        self.find(component).ok_or_else(|| {
            OrchestrationError::MonitorNotFound(format!(
                "{component} in application {}",
                self.application_id
            ))
        })
    }

    fn spawn_loop(&self, component: &ComponentId) -> Option<MonitorLoop> {
        if !self.settings.spawn_loops {
            return None;
        }
        MonitorLoop::spawn(component.clone(), self.settings.interval)
    }

    /// ノードを取り出して `f` を実行し、戻す
    fn with_node<R>(
        &mut self,
        id: MonitorId,
        app: &Application,
        f: impl FnOnce(&mut MonitorNode, &MonitorCx<'_>) -> R,
    ) -> Result<R, OrchestrationError> {
        let mut node = self.nodes.remove(&id).ok_or_else(|| {
            OrchestrationError::MonitorNotFound(format!(
                "monitor {id} in application {}",
                self.application_id
            ))
        })?;
        let out = {
            let cx = MonitorCx {
                tree: &*self,
                app,
            };
            f(&mut node, &cx)
        };
        self.nodes.insert(id, node);
        Ok(out)
    }

    /// アプリケーションインスタンスを用意して起動依存を開始する
    pub fn start_application(
        &mut self,
        app: &Application,
        network_partitions: &[NetworkPartitionId],
    ) -> Result<(Vec<InstanceId>, Vec<Effect>), OrchestrationError> {
        let root = self.root;
        self.with_node(root, app, |node, _cx| match &mut node.kind {
            MonitorKind::Application(monitor) => {
                Ok(monitor.create_instances(&mut node.core, app, network_partitions))
            }
            _ => Err(OrchestrationError::InconsistentTopology(
                "root monitor is not an application monitor".into(),
            )),
        })?
    }

    /// Effect を 1 つ処理して続きを返す
    pub fn apply(
        &mut self,
        effect: Effect,
        app: &Application,
        env: &MonitorEnv<'_>,
    ) -> Result<Vec<Effect>, OrchestrationError> {
        match effect {
            Effect::SetStatus {
                component,
                instance_id,
                status,
            } => {
                let id = self.require(&component)?;
                self.with_node(id, app, |node, cx| node.set_status(cx, &instance_id, status))
            }
            Effect::TrackInstance {
                component,
                instance,
            } => {
                let id = self.require(&component)?;
                self.with_node(id, app, |node, _| {
                    node.track(instance);
                    Vec::new()
                })
            }
            Effect::NotifyParent { target, event } => {
                self.with_node(target, app, |node, cx| node.on_child_status_event(cx, &event))
            }
            Effect::NotifyChild { target, event } => {
                self.with_node(target, app, |node, cx| node.on_parent_status_event(cx, &event))
            }
            Effect::ScaleParent { target, event } => {
                self.with_node(target, app, |node, cx| node.on_child_scaling_event(cx, &event))
            }
            Effect::ScaleChild { target, event } => {
                self.with_node(target, app, |node, cx| node.on_parent_scaling_event(cx, &event))
            }
            Effect::StartChild {
                parent,
                child,
                parent_instance_ids,
            } => self.start_child(parent, &child, &parent_instance_ids, app),
            Effect::StartMinimum {
                target,
                parent_instance_ids,
            } => {
                let (initial, effects) =
                    self.start_minimum_dependencies(target, &parent_instance_ids, app, env)?;
                debug!(monitor = %target, initial, "minimum dependencies started");
                Ok(effects)
            }
            Effect::CreateInstances {
                target,
                parent_instance_ids,
            } => self.create_instances(target, &parent_instance_ids, app, env),
            Effect::StartDependency {
                target,
                instance_ids,
            } => self.start_dependency(target, &instance_ids),
            Effect::RemoveMonitor(id) => Ok(self.remove_subtree(id)),
            other @ (Effect::Lifecycle(_)
            | Effect::Publish(_)
            | Effect::RegisterClusterMonitor(_)
            | Effect::DeregisterClusterMonitor(_)) => Err(OrchestrationError::InconsistentTopology(
                format!("{other:?} is not handled by the monitor tree"),
            )),
        }
    }

    fn start_child(
        &mut self,
        parent: MonitorId,
        child: &ComponentId,
        parent_instance_ids: &[InstanceId],
        app: &Application,
    ) -> Result<Vec<Effect>, OrchestrationError> {
        let existing = self
            .get(parent)
            .ok_or_else(|| OrchestrationError::MonitorNotFound(format!("monitor {parent}")))?
            .core
            .children
            .get(child)
            .copied();
        let child_id = match existing {
            Some(id) => id,
            None => self.insert_child(parent, child, app)?,
        };

        match child {
            ComponentId::Group(_) => Ok(vec![Effect::StartMinimum {
                target: child_id,
                parent_instance_ids: parent_instance_ids.to_vec(),
            }]),
            ComponentId::Cluster(_) => self.with_node(child_id, app, |node, cx| match &mut node.kind {
                MonitorKind::Cluster(monitor) => {
                    monitor.create_instances(&mut node.core, cx, parent_instance_ids)
                }
                _ => Vec::new(),
            }),
            ComponentId::Application(_) => Err(OrchestrationError::InconsistentTopology(format!(
                "{child} cannot be a child monitor"
            ))),
        }
    }

    /// 定義から子モニタを作ってアリーナに登録する
    fn insert_child(
        &mut self,
        parent: MonitorId,
        child: &ComponentId,
        app: &Application,
    ) -> Result<MonitorId, OrchestrationError> {
        let parent_node = self
            .get(parent)
            .ok_or_else(|| OrchestrationError::MonitorNotFound(format!("monitor {parent}")))?;
        let children = app.children_of(parent_node.component()).ok_or_else(|| {
            OrchestrationError::InconsistentTopology(format!(
                "{} has no definition in application {}",
                parent_node.component(),
                app.id
            ))
        })?;
        if !children.contains(child) {
            return Err(OrchestrationError::InconsistentTopology(format!(
                "{child} is not a child of {}",
                parent_node.component()
            )));
        }

        let id = MonitorId::new(self.next_id);
        let mut core = MonitorCore::new(id, child.clone(), Some(parent));
        core.has_startup_dependents = parent_node.core.startup.has_dependents(child);
        core.has_group_scaling_dependent = parent_node.core.scaling.contains(child);

        let kind = match child {
            ComponentId::Group(group_id) => {
                let def = children.group(group_id).ok_or_else(|| {
                    OrchestrationError::InconsistentTopology(format!("group {group_id} not defined"))
                })?;
                core.startup = DependencyTree::from_children(&def.children)?;
                core.scaling = ScalingDependencyTree::from_children(&def.children);
                let mut monitor = GroupMonitor::new(def);
                for instance in def.live_instances() {
                    let runtime = RuntimeInstance::from(instance);
                    monitor.track(&runtime);
                    core.instances.insert(runtime.instance_id.clone(), runtime);
                }
                MonitorKind::Group(monitor)
            }
            ComponentId::Cluster(alias) => {
                let def = children.cluster(alias).ok_or_else(|| {
                    OrchestrationError::InconsistentTopology(format!("cluster {alias} not defined"))
                })?;
                MonitorKind::Cluster(ClusterMonitor::new(def))
            }
            ComponentId::Application(_) => {
                return Err(OrchestrationError::InconsistentTopology(format!(
                    "{child} cannot be a child monitor"
                )));
            }
        };

        self.next_id += 1;
        let run_loop = self.spawn_loop(child);
        self.nodes.insert(id, MonitorNode::new(core, kind, run_loop));
        self.index.insert(child.clone(), id);
        if let Some(parent_node) = self.nodes.get_mut(&parent) {
            parent_node.core.children.insert(child.clone(), id);
        }
        info!(
            application_id = %self.application_id,
            monitor = %child,
            "monitor created"
        );
        Ok(id)
    }

    /// 定義ツリーを辿り、モニタが無ければ祖先ごと作る
    pub fn ensure_monitor(
        &mut self,
        component: &ComponentId,
        app: &Application,
    ) -> Result<MonitorId, OrchestrationError> {
        if let Some(id) = self.find(component) {
            return Ok(id);
        }
        let parent_component = app.parent_of(component).ok_or_else(|| {
            OrchestrationError::InconsistentTopology(format!(
                "{component} is not defined in application {}",
                app.id
            ))
        })?;
        let parent = self.ensure_monitor(&parent_component, app)?;
        self.insert_child(parent, component, app)
    }

    /// 最小インスタンス数を満たすように起動する
    ///
    /// # 戻り値
    /// - `true`: 生存インスタンスが 1 つも無く、全ての親インスタンス分を新規作成した（初回起動）
    /// - `false`: 既存インスタンスがあった（不足分だけ作成、または既存の依存を再開）
    pub fn start_minimum_dependencies(
        &mut self,
        target: MonitorId,
        parent_instance_ids: &[InstanceId],
        app: &Application,
        env: &MonitorEnv<'_>,
    ) -> Result<(bool, Vec<Effect>), OrchestrationError> {
        let node = self
            .get(target)
            .ok_or_else(|| OrchestrationError::MonitorNotFound(format!("monitor {target}")))?;
        let MonitorKind::Group(monitor) = &node.kind else {
            return Err(OrchestrationError::InconsistentTopology(format!(
                "{} is not a group monitor",
                node.component()
            )));
        };
        let group = app.group_recursively(&monitor.group_id).ok_or_else(|| {
            OrchestrationError::InconsistentTopology(format!(
                "group {} has a monitor but no definition",
                monitor.group_id
            ))
        })?;

        let live: Vec<InstanceId> = group.live_instances().map(|i| i.instance_id.clone()).collect();
        if live.is_empty() {
            let effects = self.create_instances(target, parent_instance_ids, app, env)?;
            return Ok((true, effects));
        }

        let missing: Vec<InstanceId> = parent_instance_ids
            .iter()
            .filter(|p| group.live_instances_with_parent(p).next().is_none())
            .cloned()
            .collect();
        if live.len() >= group.min_instances as usize || missing.is_empty() {
            return Ok((
                false,
                vec![Effect::StartDependency {
                    target,
                    instance_ids: live,
                }],
            ));
        }
        let effects = self.create_instances(target, &missing, app, env)?;
        Ok((false, effects))
    }

    fn create_instances(
        &mut self,
        target: MonitorId,
        parent_instance_ids: &[InstanceId],
        app: &Application,
        env: &MonitorEnv<'_>,
    ) -> Result<Vec<Effect>, OrchestrationError> {
        self.with_node(target, app, |node, cx| match &mut node.kind {
            MonitorKind::Group(monitor) => {
                monitor.create_instances(&mut node.core, cx, env, parent_instance_ids)
            }
            MonitorKind::Cluster(monitor) => {
                Ok(monitor.create_instances(&mut node.core, cx, parent_instance_ids))
            }
            MonitorKind::Application(_) => Err(OrchestrationError::InconsistentTopology(
                "application instances are created per network partition".into(),
            )),
        })?
    }

    /// 起動順序の先頭（依存を持たない子）を開始する
    fn start_dependency(
        &self,
        target: MonitorId,
        instance_ids: &[InstanceId],
    ) -> Result<Vec<Effect>, OrchestrationError> {
        let node = self
            .get(target)
            .ok_or_else(|| OrchestrationError::MonitorNotFound(format!("monitor {target}")))?;
        if instance_ids.is_empty() {
            return Ok(Vec::new());
        }
        Ok(node
            .core
            .startup
            .starting_roots()
            .into_iter()
            .map(|child| Effect::StartChild {
                parent: target,
                child,
                parent_instance_ids: instance_ids.to_vec(),
            })
            .collect())
    }

    /// モニタとその子孫を破棄する
    pub fn remove_subtree(&mut self, id: MonitorId) -> Vec<Effect> {
        let mut effects = Vec::new();
        let parent = self.nodes.get(&id).and_then(|n| n.core.parent);
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            let Some(mut node) = self.nodes.remove(&current) else {
                continue;
            };
            stack.extend(node.core.children.values().copied());
            self.index.remove(node.component());
            if let MonitorKind::Cluster(cluster) = &node.kind {
                effects.push(Effect::DeregisterClusterMonitor(cluster.cluster_id.clone()));
            }
            node.destroy();
            debug!(
                application_id = %self.application_id,
                monitor = %node.component(),
                "monitor removed"
            );
        }
        if let Some(parent) = parent
            && let Some(parent_node) = self.nodes.get_mut(&parent)
        {
            parent_node.core.children.retain(|_, child| *child != id);
        }
        effects
    }

    /// クラスタサブシステムから報告されたステータスを葉モニタに反映する
    pub fn on_cluster_status(
        &mut self,
        alias: &ClusterId,
        instance_id: &InstanceId,
        status: ClusterStatus,
        app: &Application,
    ) -> Result<Vec<Effect>, OrchestrationError> {
        let component = ComponentId::Cluster(alias.clone());
        let id = self.require(&component)?;
        self.with_node(id, app, |node, cx| {
            let current = node
                .core
                .instance(instance_id)
                .map(|i| ClusterStatus::from(i.status))
                .ok_or_else(|| OrchestrationError::NotFound {
                    kind: "cluster instance",
                    id: format!("{alias}/{instance_id}"),
                })?;
            if !current.can_transition_to(status) {
                return Err(OrchestrationError::InvalidTransition {
                    component: component.clone(),
                    instance_id: instance_id.clone(),
                    from: current.to_string(),
                    to: status.to_string(),
                });
            }
            Ok(node.set_status(cx, instance_id, status.into()))
        })?
    }
}
