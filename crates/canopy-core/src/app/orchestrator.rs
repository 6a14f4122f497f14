//! Orchestrator - アプリケーションの起動・外部イベント受付・状態参照の入口
//!
//! # 設計原則
//! - ライフサイクルの変更は ApplicationBuilder 経由のみ
//! - 起動系（start_application / start_minimum_dependencies）は設定の欠陥を Err で返す
//! - 外部から届くイベントの NotFound / InvalidTransition はログだけ出して Ok
//!
//! # ロック順序
//! スナップショット（共有）→ モニタレジストリ。どちらも drive の前に解放します。

use std::sync::Arc;

use tracing::{info, warn};

use crate::app::application_builder::ApplicationBuilder;
use crate::app::engine::Engine;
use crate::app::holder::ApplicationHolder;
use crate::app::status::ApplicationStatusView;
use crate::domain::{
    Application, ApplicationId, ApplicationStatus, Children, ClusterId, ClusterStatus,
    ComponentId, DependencyTree, GroupId, GroupStatus, InstanceId, MonitorScalingEvent,
    OrchestrationError, PlacementError,
};
use crate::monitor::{Effect, MonitorEnv, MonitorKind, MonitorTree};
use crate::ports::ApplicationClusterContext;

#[derive(Clone)]
pub struct Orchestrator {
    engine: Arc<Engine>,
}

impl Orchestrator {
    pub(crate) fn new(engine: Arc<Engine>) -> Self {
        Self { engine }
    }

    pub fn application_builder(&self) -> ApplicationBuilder {
        ApplicationBuilder::new(self.engine.clone())
    }

    pub fn holder(&self) -> Arc<ApplicationHolder> {
        self.engine.holder.clone()
    }

    /// 定義を検証してからアプリケーションを登録する
    ///
    /// 起動順序の循環はここで `DependencyCycle` として返します。
    pub async fn deploy_application(
        &self,
        app: Application,
        clusters: &[ApplicationClusterContext],
    ) -> Result<(), OrchestrationError> {
        validate_startup_orders(&app.children)?;
        self.application_builder()
            .handle_application_created(app, clusters)
            .await;
        Ok(())
    }

    /// ネットワークパーティションごとにアプリケーションインスタンスを作り、依存を起動する
    pub async fn start_application(
        &self,
        application_id: &ApplicationId,
    ) -> Result<Vec<InstanceId>, OrchestrationError> {
        let policy = self
            .engine
            .policies
            .get_deployment_policy_by_application(application_id)
            .ok_or_else(|| {
                PlacementError::PolicyNotFound(format!("application policy for {application_id}"))
            })?;

        let (instance_ids, effects) = self
            .with_tree(application_id, true, |tree, app, _| {
                tree.start_application(app, &policy.network_partitions)
            })
            .await?;
        info!(
            application_id = %application_id,
            instances = instance_ids.len(),
            "application starting"
        );
        self.engine.drive(application_id, effects).await?;
        Ok(instance_ids)
    }

    /// グループの最小インスタンス数を満たす
    ///
    /// 生存インスタンスが 1 つも無く、全て新規作成した場合に `true`（初回起動）を返します。
    pub async fn start_minimum_dependencies(
        &self,
        application_id: &ApplicationId,
        group_id: &GroupId,
        parent_instance_ids: &[InstanceId],
    ) -> Result<bool, OrchestrationError> {
        let component = ComponentId::Group(group_id.clone());
        let (initial, effects) = self
            .with_tree(application_id, true, |tree, app, env| {
                let target = tree.ensure_monitor(&component, app)?;
                tree.start_minimum_dependencies(target, parent_instance_ids, app, env)
            })
            .await?;
        self.engine.drive(application_id, effects).await?;
        Ok(initial)
    }

    /// クラスタサブシステムからのステータス報告
    pub async fn on_cluster_status(
        &self,
        application_id: &ApplicationId,
        alias: &ClusterId,
        instance_id: &InstanceId,
        status: ClusterStatus,
    ) -> Result<(), OrchestrationError> {
        let result = self
            .with_tree(application_id, false, |tree, app, _| {
                tree.on_cluster_status(alias, instance_id, status, app)
            })
            .await;
        self.finish(application_id, result).await
    }

    /// 外部で決まったスケーリング要求を、発生元モニタの親から中継する
    pub async fn on_scaling_event(
        &self,
        application_id: &ApplicationId,
        event: MonitorScalingEvent,
    ) -> Result<(), OrchestrationError> {
        let result = self
            .with_tree(application_id, false, |tree, _, _| {
                let origin = tree.node_for(&event.id).ok_or_else(|| {
                    OrchestrationError::MonitorNotFound(format!("scaling origin {}", event.id))
                })?;
                Ok(match origin.core.parent {
                    Some(parent) => vec![Effect::ScaleParent {
                        target: parent,
                        event: event.clone(),
                    }],
                    None => vec![Effect::ScaleChild {
                        target: origin.id(),
                        event: event.clone(),
                    }],
                })
            })
            .await;
        self.finish(application_id, result).await
    }

    pub async fn application_status(
        &self,
        application_id: &ApplicationId,
        instance_id: &InstanceId,
    ) -> Option<ApplicationStatus> {
        let apps = self.engine.holder.read().await;
        apps.get(application_id)
            .and_then(|app| app.instance(instance_id))
            .map(|i| i.status)
    }

    pub async fn group_status(
        &self,
        application_id: &ApplicationId,
        group_id: &GroupId,
        instance_id: &InstanceId,
    ) -> Option<GroupStatus> {
        let apps = self.engine.holder.read().await;
        apps.get(application_id)
            .and_then(|app| app.group_recursively(group_id))
            .and_then(|group| group.instance(instance_id))
            .map(|i| i.status)
    }

    /// クラスタモニタが把握しているクラスタインスタンスのステータス
    pub async fn cluster_status(
        &self,
        application_id: &ApplicationId,
        alias: &ClusterId,
        instance_id: &InstanceId,
    ) -> Option<ClusterStatus> {
        let registry = self.engine.monitors.lock().await;
        registry
            .tree(application_id)?
            .node_for(&ComponentId::Cluster(alias.clone()))?
            .core
            .instance(instance_id)
            .map(|i| ClusterStatus::from(i.status))
    }

    pub async fn status(&self, application_id: &ApplicationId) -> Option<ApplicationStatusView> {
        let apps = self.engine.holder.read().await;
        let app = apps.get(application_id)?;
        let registry = self.engine.monitors.lock().await;
        let (monitors, mut cluster_monitors) = match registry.tree(application_id) {
            Some(tree) => (
                tree.len(),
                tree.cluster_ids()
                    .into_iter()
                    .filter(|id| registry.has_cluster_monitor(id))
                    .collect(),
            ),
            None => (0, Vec::new()),
        };
        cluster_monitors.sort();
        Some(ApplicationStatusView::new(app, monitors, cluster_monitors))
    }

    pub async fn monitor_count(&self, application_id: &ApplicationId) -> usize {
        self.engine
            .monitors
            .lock()
            .await
            .tree(application_id)
            .map_or(0, MonitorTree::len)
    }

    /// クラスタの葉に届いたスケーリング要求を取り出す
    ///
    /// 返した要求はモニタから消えます。次の呼び出しはそれ以降に届いた分だけを返します。
    pub async fn cluster_scaling_signals(
        &self,
        application_id: &ApplicationId,
        alias: &ClusterId,
    ) -> Vec<MonitorScalingEvent> {
        let mut registry = self.engine.monitors.lock().await;
        let node = registry
            .tree_mut(application_id)
            .and_then(|tree| tree.node_for_mut(&ComponentId::Cluster(alias.clone())));
        match node.map(|n| &mut n.kind) {
            Some(MonitorKind::Cluster(cluster)) => cluster.take_scaling_signals(),
            _ => Vec::new(),
        }
    }

    /// 全モニタツリーを破棄する（バックグラウンドループも止まる）
    pub async fn shutdown(&self) {
        let trees = self.engine.monitors.lock().await.clear();
        info!(trees, "orchestrator shut down");
    }

    async fn with_tree<R>(
        &self,
        application_id: &ApplicationId,
        create: bool,
        f: impl FnOnce(&mut MonitorTree, &Application, &MonitorEnv<'_>) -> Result<R, OrchestrationError>,
    ) -> Result<R, OrchestrationError> {
        let apps = self.engine.holder.read().await;
        let app = apps
            .get(application_id)
            .ok_or_else(|| OrchestrationError::not_found(application_id))?;
        let mut registry = self.engine.monitors.lock().await;
        if create && !registry.contains(application_id) {
            registry.insert_tree(MonitorTree::new(app, self.engine.settings)?);
        }
        let tree = registry.tree_mut(application_id).ok_or_else(|| {
            OrchestrationError::MonitorNotFound(format!("monitor tree for {application_id}"))
        })?;
        f(tree, app, &self.engine.monitor_env())
    }

    async fn finish(
        &self,
        application_id: &ApplicationId,
        result: Result<Vec<Effect>, OrchestrationError>,
    ) -> Result<(), OrchestrationError> {
        match result {
            Ok(effects) => self.engine.drive(application_id, effects).await,
            Err(e) if e.is_routine() => {
                warn!(application_id = %application_id, error = %e, "event ignored");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}

fn validate_startup_orders(children: &Children) -> Result<(), OrchestrationError> {
    DependencyTree::from_children(children)?;
    children.groups.iter().try_for_each(|g| validate_startup_orders(&g.children))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    use crate::app::testing::Harness;
    use crate::domain::application::fixtures::{cluster, two_tier_app};
    use crate::domain::policy::fixtures::{app_policy, policy};
    use crate::domain::{ErrorKind, Group, GroupInstance, LifecycleEvent, NetworkPartitionId};

    fn app1() -> ApplicationId {
        ApplicationId::new("app1")
    }

    fn id(raw: &str) -> InstanceId {
        InstanceId::new(raw)
    }

    fn group(raw: &str) -> ComponentId {
        ComponentId::Group(GroupId::new(raw))
    }

    /// app1 ── web(min=2, max=4, dp1) ── php
    fn scaled_web_app() -> Application {
        let mut web = Group::new("web");
        web.min_instances = 2;
        web.max_instances = 4;
        web.deployment_policy = Some("dp1".into());
        web.children.clusters.push(cluster("php"));
        let mut app = Application::new("app1");
        app.children.groups.push(web);
        app
    }

    async fn deploy_with_parents(harness: &Harness, app: Application, parents: &[&str]) {
        harness.orchestrator.deploy_application(app, &[]).await.unwrap();
        for parent in parents {
            harness
                .builder()
                .handle_application_instance_created(&app1(), &id(parent), &NetworkPartitionId::new("np1"))
                .await;
        }
    }

    #[tokio::test]
    async fn single_instance_group_reuses_parent_id_on_initial_startup() {
        let harness = Harness::new().await;
        deploy_with_parents(&harness, two_tier_app(), &["p1"]).await;

        let initial = harness
            .orchestrator
            .start_minimum_dependencies(&app1(), &GroupId::new("web"), &[id("p1")])
            .await
            .unwrap();

        assert!(initial);
        assert_eq!(
            harness.orchestrator.group_status(&app1(), &GroupId::new("web"), &id("p1")).await,
            Some(GroupStatus::Created)
        );
        assert_eq!(
            harness.orchestrator.cluster_status(&app1(), &"php".into(), &id("p1")).await,
            Some(ClusterStatus::Created)
        );
    }

    #[tokio::test]
    async fn missing_parents_get_exactly_one_new_instance() {
        let harness = Harness::new().await;
        harness
            .policies
            .add_deployment_policy(policy("dp1", "np1", "round-robin", &[("part1", 0), ("part2", 0)]));
        let mut app = scaled_web_app();
        let existing = GroupInstance::new(id("web-existing"))
            .with_parent(Some(id("p1")))
            .with_network_partition(Some(NetworkPartitionId::new("np1")))
            .with_partition(Some("part1".into()));
        app.children.groups[0]
            .instances
            .insert(existing.instance_id.clone(), existing.clone());
        deploy_with_parents(&harness, app, &["p1", "p2"]).await;

        let initial = harness
            .orchestrator
            .start_minimum_dependencies(&app1(), &GroupId::new("web"), &[id("p1"), id("p2")])
            .await
            .unwrap();

        assert!(!initial);
        let app = harness.orchestrator.holder().get_application(&app1()).await.unwrap();
        let web = app.group_recursively(&GroupId::new("web")).unwrap();
        assert_eq!(web.instances.len(), 2);
        assert_eq!(web.instance(&id("web-existing")), Some(&existing));
        let created: Vec<&GroupInstance> = web
            .instances
            .values()
            .filter(|i| i.instance_id != id("web-existing"))
            .collect();
        assert_eq!(created.len(), 1);
        assert_eq!(created[0].parent_id, Some(id("p2")));
        // part1 は既存で 1 つ埋まっているので round-robin は part2 を選ぶ
        assert_eq!(created[0].partition_id, Some("part2".into()));
    }

    #[tokio::test]
    async fn satisfied_minimum_creates_nothing() {
        let harness = Harness::new().await;
        harness
            .policies
            .add_deployment_policy(policy("dp1", "np1", "round-robin", &[("part1", 0)]));
        deploy_with_parents(&harness, scaled_web_app(), &["p1", "p2"]).await;

        let web = GroupId::new("web");
        let parents = [id("p1"), id("p2")];
        assert!(harness.orchestrator.start_minimum_dependencies(&app1(), &web, &parents).await.unwrap());
        assert!(!harness.orchestrator.start_minimum_dependencies(&app1(), &web, &parents).await.unwrap());

        let app = harness.orchestrator.holder().get_application(&app1()).await.unwrap();
        assert_eq!(app.group_recursively(&web).unwrap().instances.len(), 2);
    }

    #[rstest::rstest]
    #[case::network_partition_not_in_policy(
        "np-other",
        "round-robin",
        PlacementError::NetworkPartitionNotInPolicy {
            policy: "dp1".into(),
            network_partition: NetworkPartitionId::new("np1"),
        }
    )]
    #[case::unknown_algorithm("np1", "random", PlacementError::UnknownAlgorithm("random".into()))]
    #[case::no_capacity("np1", "one-after-another", PlacementError::NoCapacity(NetworkPartitionId::new("np1")))]
    #[tokio::test]
    async fn placement_errors_are_surfaced(
        #[case] np: &str,
        #[case] algorithm: &str,
        #[case] expected: PlacementError,
    ) {
        let harness = Harness::new().await;
        // no_capacity: part1 は既存インスタンスで埋まっている
        harness
            .policies
            .add_deployment_policy(policy("dp1", np, algorithm, &[("part1", 1)]));
        let mut app = scaled_web_app();
        if expected == PlacementError::NoCapacity(NetworkPartitionId::new("np1")) {
            let existing = GroupInstance::new(id("web-existing"))
                .with_parent(Some(id("p0")))
                .with_network_partition(Some(NetworkPartitionId::new("np1")))
                .with_partition(Some("part1".into()));
            app.children.groups[0]
                .instances
                .insert(existing.instance_id.clone(), existing);
        }
        deploy_with_parents(&harness, app, &["p0", "p1"]).await;

        let err = harness
            .orchestrator
            .start_minimum_dependencies(&app1(), &GroupId::new("web"), &[id("p1")])
            .await
            .unwrap_err();
        assert!(matches!(&err, OrchestrationError::Placement(e) if *e == expected));
        assert_eq!(err.kind(), ErrorKind::Configuration);

        let app = harness.orchestrator.holder().get_application(&app1()).await.unwrap();
        let web = app.group_recursively(&GroupId::new("web")).unwrap();
        assert!(web.live_instances_with_parent(&id("p1")).next().is_none());
    }

    #[tokio::test]
    async fn unknown_parent_is_an_inconsistent_topology() {
        let harness = Harness::new().await;
        deploy_with_parents(&harness, two_tier_app(), &[]).await;

        let err = harness
            .orchestrator
            .start_minimum_dependencies(&app1(), &GroupId::new("web"), &[id("ghost")])
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InconsistentTopology);
    }

    #[tokio::test]
    async fn start_application_requires_an_application_policy() {
        let harness = Harness::new().await;
        deploy_with_parents(&harness, two_tier_app(), &[]).await;

        let err = harness.orchestrator.start_application(&app1()).await.unwrap_err();
        assert!(matches!(
            err,
            OrchestrationError::Placement(PlacementError::PolicyNotFound(_))
        ));
        assert_eq!(harness.orchestrator.monitor_count(&app1()).await, 0);
    }

    #[tokio::test]
    async fn deploy_rejects_startup_cycles() {
        let harness = Harness::new().await;
        let mut app = two_tier_app();
        app.children.groups[0].children.startup_orders = vec![vec![
            ComponentId::Cluster("php".into()),
            ComponentId::Cluster("php".into()),
        ]];

        let err = harness.orchestrator.deploy_application(app, &[]).await.unwrap_err();
        assert!(matches!(err, OrchestrationError::DependencyCycle(_)));
        assert!(harness.orchestrator.holder().get_applications().await.is_empty());
    }

    #[tokio::test]
    async fn start_application_creates_one_instance_per_network_partition() {
        let harness = Harness::new().await;
        harness.orchestrator.deploy_application(two_tier_app(), &[]).await.unwrap();
        harness.policies.add_application_policy(app_policy("app1", &["np1", "np2"]));

        let ids = harness.orchestrator.start_application(&app1()).await.unwrap();
        assert_eq!(ids, vec![id("app1-1"), id("app1-2")]);

        let view = harness.orchestrator.status(&app1()).await.unwrap();
        assert_eq!(view.instances.len(), 2);
        // app + web + db + php + mysql
        assert_eq!(view.monitors, 5);
        assert_eq!(view.cluster_monitors, vec!["mysql.cluster", "php.cluster"]);
        assert_eq!(view.group(&GroupId::new("web")).unwrap().instances.len(), 2);

        // 2 回目は既存インスタンスを再利用する
        let again = harness.orchestrator.start_application(&app1()).await.unwrap();
        assert_eq!(again, ids);
        assert_eq!(harness.orchestrator.status(&app1()).await.unwrap().instances.len(), 2);
    }

    #[tokio::test]
    async fn full_activation_is_published_once() {
        let harness = Harness::started().await;
        let instance = id("app1-1");

        for alias in ["php", "mysql"] {
            harness
                .orchestrator
                .on_cluster_status(&app1(), &alias.into(), &instance, ClusterStatus::Active)
                .await
                .unwrap();
        }

        assert_eq!(
            harness.orchestrator.group_status(&app1(), &GroupId::new("web"), &instance).await,
            Some(GroupStatus::Active)
        );
        assert_eq!(
            harness.orchestrator.application_status(&app1(), &instance).await,
            Some(ApplicationStatus::Active)
        );
        assert_eq!(harness.events.count("application_activated"), 1);
        assert_eq!(harness.events.count("group_activated"), 2);

        // 重複報告は遷移表で弾かれる
        harness
            .orchestrator
            .on_cluster_status(&app1(), &"php".into(), &instance, ClusterStatus::Active)
            .await
            .unwrap();
        assert_eq!(harness.events.count("application_activated"), 1);
    }

    #[tokio::test]
    async fn startup_order_waits_for_the_dependency_to_become_active() {
        let harness = Harness::new().await;
        let mut app = two_tier_app();
        app.children.startup_orders = vec![vec![group("db"), group("web")]];
        harness.orchestrator.deploy_application(app, &[]).await.unwrap();
        harness.policies.add_application_policy(app_policy("app1", &["np1"]));
        harness.orchestrator.start_application(&app1()).await.unwrap();

        let instance = id("app1-1");
        let web = GroupId::new("web");
        assert_eq!(harness.orchestrator.group_status(&app1(), &web, &instance).await, None);

        harness
            .orchestrator
            .on_cluster_status(&app1(), &"mysql".into(), &instance, ClusterStatus::Active)
            .await
            .unwrap();
        assert_eq!(
            harness.orchestrator.group_status(&app1(), &web, &instance).await,
            Some(GroupStatus::Created)
        );
        // web がまだ Active ではないのでアプリケーションは Created のまま
        assert_eq!(
            harness.orchestrator.application_status(&app1(), &instance).await,
            Some(ApplicationStatus::Created)
        );

        harness
            .orchestrator
            .on_cluster_status(&app1(), &"php".into(), &instance, ClusterStatus::Active)
            .await
            .unwrap();
        assert_eq!(
            harness.orchestrator.application_status(&app1(), &instance).await,
            Some(ApplicationStatus::Active)
        );
    }

    #[tokio::test]
    async fn inactive_child_with_dependents_does_not_change_the_parent() {
        let harness = Harness::new().await;
        let mut app = two_tier_app();
        app.children.startup_orders = vec![vec![group("db"), group("web")]];
        harness.orchestrator.deploy_application(app, &[]).await.unwrap();
        harness.policies.add_application_policy(app_policy("app1", &["np1"]));
        harness.orchestrator.start_application(&app1()).await.unwrap();

        let instance = id("app1-1");
        for alias in ["mysql", "php"] {
            harness
                .orchestrator
                .on_cluster_status(&app1(), &alias.into(), &instance, ClusterStatus::Active)
                .await
                .unwrap();
        }
        assert_eq!(
            harness.orchestrator.application_status(&app1(), &instance).await,
            Some(ApplicationStatus::Active)
        );

        harness
            .orchestrator
            .on_cluster_status(&app1(), &"mysql".into(), &instance, ClusterStatus::Inactive)
            .await
            .unwrap();

        assert_eq!(
            harness.orchestrator.group_status(&app1(), &GroupId::new("db"), &instance).await,
            Some(GroupStatus::Inactive)
        );
        assert_eq!(
            harness.orchestrator.application_status(&app1(), &instance).await,
            Some(ApplicationStatus::Active)
        );
        assert_eq!(harness.events.count("group_inactive"), 1);
    }

    #[tokio::test]
    async fn invalid_cluster_reports_are_ignored() {
        let harness = Harness::started().await;
        let instance = id("app1-1");

        harness
            .orchestrator
            .on_cluster_status(&app1(), &"php".into(), &instance, ClusterStatus::Terminated)
            .await
            .unwrap();
        harness
            .orchestrator
            .on_cluster_status(&app1(), &"php".into(), &id("nope"), ClusterStatus::Active)
            .await
            .unwrap();
        harness
            .orchestrator
            .on_cluster_status(&ApplicationId::new("missing"), &"php".into(), &instance, ClusterStatus::Active)
            .await
            .unwrap();

        assert_eq!(
            harness.orchestrator.cluster_status(&app1(), &"php".into(), &instance).await,
            Some(ClusterStatus::Created)
        );
    }

    #[rstest::rstest]
    #[case::web_first(["web", "db"])]
    #[case::db_first(["db", "web"])]
    #[tokio::test]
    async fn recursive_termination_finishes_exactly_once(#[case] order: [&str; 2]) {
        let harness = Harness::started().await;
        let instance = id("app1-1");
        assert!(harness.builder().handle_application_policy_undeployed(&app1()).await);
        assert_eq!(
            harness.orchestrator.application_status(&app1(), &instance).await,
            Some(ApplicationStatus::Terminating)
        );
        assert_eq!(harness.events.count("group_terminating"), 2);
        assert_eq!(harness.events.count("cluster_terminating"), 2);

        for alias in order.map(|g| if g == "web" { "php" } else { "mysql" }) {
            harness
                .orchestrator
                .on_cluster_status(&app1(), &alias.into(), &instance, ClusterStatus::Terminated)
                .await
                .unwrap();
        }

        assert_eq!(harness.events.count("group_terminated"), 2);
        assert_eq!(harness.events.count("application_terminated"), 1);
        let terminated = harness
            .events
            .events()
            .into_iter()
            .find_map(|e| match e {
                LifecycleEvent::ApplicationTerminated { clusters, .. } => Some(clusters),
                _ => None,
            })
            .unwrap();
        assert_eq!(terminated.len(), 2);
        assert!(harness.orchestrator.holder().get_application(&app1()).await.is_none());
        assert_eq!(harness.orchestrator.monitor_count(&app1()).await, 0);
    }

    #[tokio::test]
    async fn compensating_terminations_only_for_clusters_without_a_monitor() {
        let harness = Harness::new().await;
        let mut app = two_tier_app();
        app.children.startup_orders = vec![vec![group("web"), group("db")]];
        harness.orchestrator.deploy_application(app, &[]).await.unwrap();
        harness.policies.add_application_policy(app_policy("app1", &["np1"]));
        harness.orchestrator.start_application(&app1()).await.unwrap();
        for (service_type, instance) in [("php", "php-m1"), ("mysql", "mysql-m1"), ("mysql", "mysql-m2")] {
            harness
                .topology
                .add_cluster_instance(service_type, &format!("{service_type}.cluster"), id(instance));
        }

        assert!(harness.builder().handle_application_policy_undeployed(&app1()).await);

        let by_cluster = harness.events.events().into_iter().fold(
            BTreeMap::<String, Vec<InstanceId>>::new(),
            |mut acc, e| {
                if let LifecycleEvent::ClusterTerminating { cluster_id, instance_id, .. } = e {
                    acc.entry(cluster_id).or_default().push(instance_id);
                }
                acc
            },
        );
        // php はモニタ経由で 1 回、mysql はモニタが無いのでトポロジの全インスタンス
        assert_eq!(by_cluster["php.cluster"], vec![id("app1-1")]);
        assert_eq!(by_cluster["mysql.cluster"], vec![id("mysql-m1"), id("mysql-m2")]);
    }

    #[tokio::test]
    async fn scaling_signal_reaches_sibling_group_clusters() {
        let harness = Harness::new().await;
        let mut app = two_tier_app();
        app.children.groups[0].group_scaling_enabled = true;
        app.children.scaling_dependents = vec![vec![group("web"), group("db")]];
        harness.orchestrator.deploy_application(app, &[]).await.unwrap();
        harness.policies.add_application_policy(app_policy("app1", &["np1"]));
        harness.orchestrator.start_application(&app1()).await.unwrap();

        harness
            .orchestrator
            .on_scaling_event(
                &app1(),
                MonitorScalingEvent {
                    id: group("web"),
                    network_partition_id: NetworkPartitionId::new("np1"),
                    instance_id: id("app1-1"),
                    factor: 1.5,
                },
            )
            .await
            .unwrap();

        let mysql = harness
            .orchestrator
            .cluster_scaling_signals(&app1(), &"mysql".into())
            .await;
        assert_eq!(mysql.len(), 1);
        assert_eq!(mysql[0].id, group("web"));
        assert!(harness
            .orchestrator
            .cluster_scaling_signals(&app1(), &"php".into())
            .await
            .is_empty());
        // 取り出し済みの要求は残らない
        assert!(harness
            .orchestrator
            .cluster_scaling_signals(&app1(), &"mysql".into())
            .await
            .is_empty());
    }

    #[tokio::test]
    async fn scaling_signals_drain_between_reads() {
        let harness = Harness::new().await;
        let mut app = two_tier_app();
        app.children.groups[0].group_scaling_enabled = true;
        app.children.scaling_dependents = vec![vec![group("web"), group("db")]];
        harness.orchestrator.deploy_application(app, &[]).await.unwrap();
        harness.policies.add_application_policy(app_policy("app1", &["np1"]));
        harness.orchestrator.start_application(&app1()).await.unwrap();

        let signal = |factor: f64| MonitorScalingEvent {
            id: group("web"),
            network_partition_id: NetworkPartitionId::new("np1"),
            instance_id: id("app1-1"),
            factor,
        };
        for factor in [1.5, 2.0] {
            harness
                .orchestrator
                .on_scaling_event(&app1(), signal(factor))
                .await
                .unwrap();
        }
        let first = harness
            .orchestrator
            .cluster_scaling_signals(&app1(), &"mysql".into())
            .await;
        assert_eq!(first.iter().map(|s| s.factor).collect::<Vec<_>>(), vec![1.5, 2.0]);

        harness
            .orchestrator
            .on_scaling_event(&app1(), signal(0.5))
            .await
            .unwrap();
        let second = harness
            .orchestrator
            .cluster_scaling_signals(&app1(), &"mysql".into())
            .await;
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].factor, 0.5);
    }

    #[tokio::test]
    async fn shutdown_destroys_every_tree() {
        let harness = Harness::started().await;
        harness.orchestrator.shutdown().await;
        assert_eq!(harness.orchestrator.monitor_count(&app1()).await, 0);
        assert!(harness.orchestrator.holder().get_application(&app1()).await.is_some());
    }
}
