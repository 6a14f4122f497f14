//! ApplicationBuilder - スナップショットを変更する唯一のゲートウェイ
//!
//! # 設計原則
//! - ステータスの変更はここだけ（モニタはランタイムの記録しか持たない）
//! - 検証 → 変更 → 永続化 は排他ロックの内側、公開はロック解放後
//! - 不正なイベントはログだけ出して捨てる（呼び出し側にエラーを返さない）
//!
//! # フロー
//! 1. `LifecycleCommand` を `Engine::apply_lifecycle` で適用し、続きの Effect を得る
//! 2. `Engine::drive` でモニタツリーへの伝播を最後まで流す

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::app::engine::Engine;
use crate::app::holder::ApplicationsWriteGuard;
use crate::domain::{
    Application, ApplicationId, ApplicationInstance, ApplicationStatus, ClusterDataHolder,
    ComponentId, GroupId, GroupInstance, GroupStatus, Instance, InstanceId, Lifecycle,
    LifecycleCommand, LifecycleEvent, NetworkPartitionId, OrchestrationError, PartitionId,
};
use crate::monitor::{Effect, RuntimeInstance};
use crate::ports::ApplicationClusterContext;

#[derive(Clone)]
pub struct ApplicationBuilder {
    engine: Arc<Engine>,
}

impl ApplicationBuilder {
    pub(crate) fn new(engine: Arc<Engine>) -> Self {
        Self { engine }
    }

    /// アプリケーションを登録する
    ///
    /// 既に存在すれば何もしません。クラスタ作成に失敗した場合も何も残しません。
    pub async fn handle_application_created(
        &self,
        app: Application,
        clusters: &[ApplicationClusterContext],
    ) {
        let application_id = app.id.clone();
        {
            let mut apps = self.engine.holder.write().await;
            if apps.contains(&application_id) {
                warn!(application_id = %application_id, "application already exists");
                return;
            }
            if let Err(e) = self
                .engine
                .controller
                .create_application_clusters(&application_id, clusters)
                .await
            {
                error!(
                    application_id = %application_id,
                    error = %e,
                    "cluster creation failed; application not created"
                );
                return;
            }
            apps.insert(app);
            self.engine.persist_or_log(&apps, &application_id).await;
        }
        info!(application_id = %application_id, clusters = clusters.len(), "application created");
        self.engine.events.publish(LifecycleEvent::ApplicationCreated { application_id });
    }

    pub async fn handle_application_instance_created(
        &self,
        application_id: &ApplicationId,
        instance_id: &InstanceId,
        network_partition_id: &NetworkPartitionId,
    ) {
        self.run(LifecycleCommand::ApplicationInstanceCreated {
            application_id: application_id.clone(),
            instance_id: instance_id.clone(),
            network_partition_id: network_partition_id.clone(),
        })
        .await;
    }

    pub async fn handle_application_activated(
        &self,
        application_id: &ApplicationId,
        instance_id: &InstanceId,
    ) {
        self.run(LifecycleCommand::ApplicationActivated {
            application_id: application_id.clone(),
            instance_id: instance_id.clone(),
        })
        .await;
    }

    pub async fn handle_application_terminated(
        &self,
        application_id: &ApplicationId,
        instance_id: &InstanceId,
    ) {
        self.run(LifecycleCommand::ApplicationTerminated {
            application_id: application_id.clone(),
            instance_id: instance_id.clone(),
        })
        .await;
    }

    /// スナップショットとストアから削除し、モニタツリーを破棄する
    pub async fn handle_application_undeployed(&self, application_id: &ApplicationId) {
        if self
            .engine
            .policies
            .get_deployment_policy_by_application(application_id)
            .is_some()
        {
            warn!(
                application_id = %application_id,
                "application policy is still deployed; undeploy the policy first"
            );
        }

        {
            let mut apps = self.engine.holder.write().await;
            match apps.remove(application_id).await {
                Ok(Some(_)) => info!(application_id = %application_id, "application undeployed"),
                Ok(None) => {
                    warn!(application_id = %application_id, "application not found; nothing to undeploy");
                    return;
                }
                Err(e) => error!(
                    application_id = %application_id,
                    error = %e,
                    "failed to remove application from the store"
                ),
            }
        }
        self.engine.monitors.lock().await.remove_tree(application_id);
    }

    /// 全インスタンスを Terminating にして終了の伝播を始める
    ///
    /// アプリケーションが無ければ `false` を返します。
    pub async fn handle_application_policy_undeployed(&self, application_id: &ApplicationId) -> bool {
        let root = ComponentId::Application(application_id.clone());
        let (events, effects, clusters) = {
            let mut apps = self.engine.holder.write().await;
            let Some(app) = apps.get_mut(application_id) else {
                warn!(application_id = %application_id, "application not found; policy undeploy ignored");
                return false;
            };

            let mut events = Vec::new();
            let mut effects = Vec::new();
            for instance in app.instances.values_mut() {
                if !instance.is_state_transition_valid(ApplicationStatus::Terminating) {
                    warn!(
                        application_id = %application_id,
                        instance_id = %instance.instance_id,
                        status = %instance.status,
                        "instance cannot move to Terminating"
                    );
                    continue;
                }
                instance.status = ApplicationStatus::Terminating;
                events.push(LifecycleEvent::ApplicationTerminating {
                    application_id: application_id.clone(),
                    instance_id: instance.instance_id.clone(),
                });
                effects.push(Effect::SetStatus {
                    component: root.clone(),
                    instance_id: instance.instance_id.clone(),
                    status: ApplicationStatus::Terminating.into(),
                });
            }
            let clusters = app.cluster_data_recursively();
            if !events.is_empty() {
                self.engine.persist_or_log(&apps, application_id).await;
            }
            (events, effects, clusters)
        };

        info!(
            application_id = %application_id,
            instances = events.len(),
            "application terminating"
        );
        for event in events {
            self.engine.events.publish(event);
        }
        self.publish_unmonitored_cluster_terminations(application_id, &clusters)
            .await;

        if let Err(e) = self.engine.drive(application_id, effects).await {
            error!(application_id = %application_id, error = %e, "termination propagation failed");
        }
        true
    }

    /// モニタが一度も作られなかったクラスタは、トポロジ上のインスタンスへ直接終了を通知する
    async fn publish_unmonitored_cluster_terminations(
        &self,
        application_id: &ApplicationId,
        clusters: &[ClusterDataHolder],
    ) {
        let unmonitored: Vec<&ClusterDataHolder> = {
            let registry = self.engine.monitors.lock().await;
            clusters
                .iter()
                .filter(|c| !registry.has_cluster_monitor(&c.cluster_id))
                .collect()
        };

        for cluster in unmonitored {
            let Some(instances) = self
                .engine
                .topology
                .cluster_instances(&cluster.service_type, &cluster.cluster_id)
            else {
                debug!(cluster_id = %cluster.cluster_id, "cluster not in topology");
                continue;
            };
            for instance_id in instances {
                info!(
                    application_id = %application_id,
                    cluster_id = %cluster.cluster_id,
                    instance_id = %instance_id,
                    "terminating cluster instance without a monitor"
                );
                self.engine.events.publish(LifecycleEvent::ClusterTerminating {
                    application_id: application_id.clone(),
                    service_type: cluster.service_type.clone(),
                    cluster_id: cluster.cluster_id.clone(),
                    instance_id,
                });
            }
        }
    }

    pub async fn handle_group_created(
        &self,
        application_id: &ApplicationId,
        group_id: &GroupId,
        instance_id: &InstanceId,
    ) {
        self.run(LifecycleCommand::GroupCreated {
            application_id: application_id.clone(),
            group_id: group_id.clone(),
            instance_id: instance_id.clone(),
        })
        .await;
    }

    pub async fn handle_group_instance_created(
        &self,
        application_id: &ApplicationId,
        group_id: &GroupId,
        instance_id: &InstanceId,
        parent_id: Option<&InstanceId>,
        partition_id: Option<&PartitionId>,
        network_partition_id: Option<&NetworkPartitionId>,
    ) {
        self.run(LifecycleCommand::GroupInstanceCreated {
            application_id: application_id.clone(),
            group_id: group_id.clone(),
            instance: GroupInstance::new(instance_id.clone())
                .with_parent(parent_id.cloned())
                .with_partition(partition_id.cloned())
                .with_network_partition(network_partition_id.cloned()),
        })
        .await;
    }

    pub async fn handle_group_activated(
        &self,
        application_id: &ApplicationId,
        group_id: &GroupId,
        instance_id: &InstanceId,
    ) {
        self.run(LifecycleCommand::GroupActivated {
            application_id: application_id.clone(),
            group_id: group_id.clone(),
            instance_id: instance_id.clone(),
        })
        .await;
    }

    pub async fn handle_group_inactive(
        &self,
        application_id: &ApplicationId,
        group_id: &GroupId,
        instance_id: &InstanceId,
    ) {
        self.run(LifecycleCommand::GroupInactive {
            application_id: application_id.clone(),
            group_id: group_id.clone(),
            instance_id: instance_id.clone(),
        })
        .await;
    }

    pub async fn handle_group_terminating(
        &self,
        application_id: &ApplicationId,
        group_id: &GroupId,
        instance_id: &InstanceId,
    ) {
        self.run(LifecycleCommand::GroupTerminating {
            application_id: application_id.clone(),
            group_id: group_id.clone(),
            instance_id: instance_id.clone(),
        })
        .await;
    }

    pub async fn handle_group_terminated(
        &self,
        application_id: &ApplicationId,
        group_id: &GroupId,
        instance_id: &InstanceId,
    ) {
        self.run(LifecycleCommand::GroupTerminated {
            application_id: application_id.clone(),
            group_id: group_id.clone(),
            instance_id: instance_id.clone(),
        })
        .await;
    }

    /// スナップショット全体を共有ロックの内側で公開する
    pub async fn handle_complete_applications(&self) {
        let apps = self.engine.holder.read().await;
        let applications: Vec<Application> = apps.iter().cloned().collect();
        debug!(applications = applications.len(), "publishing complete applications");
        self.engine
            .events
            .publish(LifecycleEvent::CompleteApplications { applications });
    }

    async fn run(&self, command: LifecycleCommand) {
        let application_id = command.application_id().clone();
        let effects = self.engine.apply_lifecycle(command).await;
        if let Err(e) = self.engine.drive(&application_id, effects).await {
            error!(application_id = %application_id, error = %e, "propagation failed");
        }
    }
}

impl Engine {
    /// コマンドを検証・適用・永続化・公開し、モニタへ流す続きを返す
    ///
    /// 検証に失敗した場合は何も変更せず空の Vec を返します。
    pub(crate) async fn apply_lifecycle(&self, command: LifecycleCommand) -> Vec<Effect> {
        match command {
            LifecycleCommand::ApplicationInstanceCreated {
                application_id,
                instance_id,
                network_partition_id,
            } => {
                self.application_instance_created(application_id, instance_id, network_partition_id)
                    .await
            }
            LifecycleCommand::ApplicationActivated {
                application_id,
                instance_id,
            } => {
                self.application_transition(application_id, instance_id, ApplicationStatus::Active)
                    .await
            }
            LifecycleCommand::ApplicationTerminated {
                application_id,
                instance_id,
            } => {
                self.application_transition(
                    application_id,
                    instance_id,
                    ApplicationStatus::Terminated,
                )
                .await
            }
            LifecycleCommand::GroupCreated {
                application_id,
                group_id,
                instance_id,
            } => self.group_created(application_id, group_id, instance_id).await,
            LifecycleCommand::GroupInstanceCreated {
                application_id,
                group_id,
                instance,
            } => {
                self.group_instance_created(application_id, group_id, instance)
                    .await
            }
            LifecycleCommand::GroupActivated {
                application_id,
                group_id,
                instance_id,
            } => {
                self.group_transition(application_id, group_id, instance_id, GroupStatus::Active)
                    .await
            }
            LifecycleCommand::GroupInactive {
                application_id,
                group_id,
                instance_id,
            } => {
                self.group_transition(application_id, group_id, instance_id, GroupStatus::Inactive)
                    .await
            }
            LifecycleCommand::GroupTerminating {
                application_id,
                group_id,
                instance_id,
            } => {
                self.group_transition(
                    application_id,
                    group_id,
                    instance_id,
                    GroupStatus::Terminating,
                )
                .await
            }
            LifecycleCommand::GroupTerminated {
                application_id,
                group_id,
                instance_id,
            } => {
                self.group_transition(
                    application_id,
                    group_id,
                    instance_id,
                    GroupStatus::Terminated,
                )
                .await
            }
            LifecycleCommand::ReapGroupInstance {
                application_id,
                group_id,
                instance_id,
            } => {
                self.reap_group_instance(&application_id, &group_id, &instance_id)
                    .await;
                Vec::new()
            }
            LifecycleCommand::ReapApplicationInstance {
                application_id,
                instance_id,
            } => {
                self.reap_application_instance(&application_id, &instance_id)
                    .await;
                Vec::new()
            }
        }
    }

    pub(crate) async fn persist_or_log(
        &self,
        apps: &ApplicationsWriteGuard<'_>,
        application_id: &ApplicationId,
    ) {
        if let Err(e) = apps.persist(application_id).await {
            error!(
                application_id = %application_id,
                error = %e,
                "failed to persist application; keeping the in-memory change"
            );
        }
    }

    async fn application_instance_created(
        &self,
        application_id: ApplicationId,
        instance_id: InstanceId,
        network_partition_id: NetworkPartitionId,
    ) -> Vec<Effect> {
        let runtime = {
            let mut apps = self.holder.write().await;
            let Some(app) = apps.get_mut(&application_id) else {
                rejected(&application_id, &OrchestrationError::not_found(&application_id));
                return Vec::new();
            };
            if app.instances.get(&instance_id).is_some_and(|i| i.is_live()) {
                warn!(
                    application_id = %application_id,
                    instance_id = %instance_id,
                    "application instance already exists"
                );
                return Vec::new();
            }
            let instance = ApplicationInstance::new(instance_id.clone())
                .with_network_partition(Some(network_partition_id.clone()));
            let runtime = RuntimeInstance::from(&instance);
            app.instances.insert(instance_id.clone(), instance);
            self.persist_or_log(&apps, &application_id).await;
            runtime
        };
        info!(
            application_id = %application_id,
            instance_id = %instance_id,
            network_partition_id = %network_partition_id,
            "application instance created"
        );
        vec![Effect::TrackInstance {
            component: ComponentId::Application(application_id),
            instance: runtime,
        }]
    }

    async fn application_transition(
        &self,
        application_id: ApplicationId,
        instance_id: InstanceId,
        target: ApplicationStatus,
    ) -> Vec<Effect> {
        let component = ComponentId::Application(application_id.clone());
        let clusters = {
            let mut apps = self.holder.write().await;
            let result = apps
                .get_mut(&application_id)
                .ok_or_else(|| OrchestrationError::not_found(&application_id))
                .and_then(|app| {
                    transition(app.instances.get_mut(&instance_id), &component, &instance_id, target)?;
                    Ok(app
                        .cluster_data_recursively()
                        .into_iter()
                        .map(|c| c.alias)
                        .collect::<Vec<_>>())
                });
            let clusters = match result {
                Ok(clusters) => clusters,
                Err(e) => {
                    rejected(&application_id, &e);
                    return Vec::new();
                }
            };
            self.persist_or_log(&apps, &application_id).await;
            clusters
        };

        info!(
            application_id = %application_id,
            instance_id = %instance_id,
            status = %target,
            "application status updated"
        );
        let event = match target {
            ApplicationStatus::Active => Some(LifecycleEvent::ApplicationActivated {
                application_id: application_id.clone(),
                instance_id: instance_id.clone(),
            }),
            ApplicationStatus::Terminating => Some(LifecycleEvent::ApplicationTerminating {
                application_id: application_id.clone(),
                instance_id: instance_id.clone(),
            }),
            ApplicationStatus::Terminated => Some(LifecycleEvent::ApplicationTerminated {
                application_id: application_id.clone(),
                instance_id: instance_id.clone(),
                clusters,
            }),
            ApplicationStatus::Created => None,
        };
        if let Some(event) = event {
            self.events.publish(event);
        }

        let mut effects = vec![Effect::SetStatus {
            component,
            instance_id: instance_id.clone(),
            status: target.into(),
        }];
        if target == ApplicationStatus::Terminated {
            effects.push(Effect::Lifecycle(LifecycleCommand::ReapApplicationInstance {
                application_id,
                instance_id,
            }));
        }
        effects
    }

    /// 既に Created のインスタンスを告知し直す
    async fn group_created(
        &self,
        application_id: ApplicationId,
        group_id: GroupId,
        instance_id: InstanceId,
    ) -> Vec<Effect> {
        let component = ComponentId::Group(group_id.clone());
        {
            let apps = self.holder.read().await;
            let status = apps
                .get(&application_id)
                .ok_or_else(|| OrchestrationError::not_found(&application_id))
                .and_then(|app| {
                    app.group_recursively(&group_id)
                        .ok_or_else(|| OrchestrationError::not_found(&group_id))
                })
                .and_then(|group| {
                    group
                        .instance(&instance_id)
                        .map(|i| i.status)
                        .ok_or_else(|| OrchestrationError::not_found(&instance_id))
                });
            let error = match status {
                Ok(GroupStatus::Created) => None,
                Ok(status) => Some(OrchestrationError::InvalidTransition {
                    component: component.clone(),
                    instance_id: instance_id.clone(),
                    from: status.to_string(),
                    to: GroupStatus::Created.to_string(),
                }),
                Err(e) => Some(e),
            };
            if let Some(e) = error {
                rejected(&application_id, &e);
                return Vec::new();
            }
        }

        info!(
            application_id = %application_id,
            group_id = %group_id,
            instance_id = %instance_id,
            "group instance announced"
        );
        self.events.publish(LifecycleEvent::GroupCreated {
            application_id,
            group_id,
            instance_id: instance_id.clone(),
        });
        vec![Effect::SetStatus {
            component,
            instance_id,
            status: GroupStatus::Created.into(),
        }]
    }

    /// グループインスタンスを記録する
    ///
    /// 同じ id の生存インスタンスがあれば重複として無視し、
    /// 回収前の Terminated インスタンスなら置き換えます。
    async fn group_instance_created(
        &self,
        application_id: ApplicationId,
        group_id: GroupId,
        instance: GroupInstance,
    ) -> Vec<Effect> {
        let instance_id = instance.instance_id.clone();
        let runtime = {
            let mut apps = self.holder.write().await;
            let group = apps
                .get_mut(&application_id)
                .ok_or_else(|| OrchestrationError::not_found(&application_id))
                .and_then(|app| {
                    app.group_recursively_mut(&group_id)
                        .ok_or_else(|| OrchestrationError::not_found(&group_id))
                });
            let group = match group {
                Ok(group) => group,
                Err(e) => {
                    rejected(&application_id, &e);
                    return Vec::new();
                }
            };
            if group.instance(&instance_id).is_some_and(|i| i.is_live()) {
                warn!(
                    application_id = %application_id,
                    group_id = %group_id,
                    instance_id = %instance_id,
                    "group instance already exists"
                );
                return Vec::new();
            }
            let runtime = RuntimeInstance::from(&instance);
            group.instances.insert(instance_id.clone(), instance);
            self.persist_or_log(&apps, &application_id).await;
            runtime
        };

        info!(
            application_id = %application_id,
            group_id = %group_id,
            instance_id = %instance_id,
            "group instance created"
        );
        self.events.publish(LifecycleEvent::GroupCreated {
            application_id: application_id.clone(),
            group_id: group_id.clone(),
            instance_id,
        });
        vec![Effect::TrackInstance {
            component: ComponentId::Group(group_id),
            instance: runtime,
        }]
    }

    async fn group_transition(
        &self,
        application_id: ApplicationId,
        group_id: GroupId,
        instance_id: InstanceId,
        target: GroupStatus,
    ) -> Vec<Effect> {
        let component = ComponentId::Group(group_id.clone());
        {
            let mut apps = self.holder.write().await;
            let result = apps
                .get_mut(&application_id)
                .ok_or_else(|| OrchestrationError::not_found(&application_id))
                .and_then(|app| {
                    app.group_recursively_mut(&group_id)
                        .ok_or_else(|| OrchestrationError::not_found(&group_id))
                })
                .and_then(|group| {
                    transition(group.instances.get_mut(&instance_id), &component, &instance_id, target)
                });
            if let Err(e) = result {
                rejected(&application_id, &e);
                return Vec::new();
            }
            self.persist_or_log(&apps, &application_id).await;
        }

        info!(
            application_id = %application_id,
            group_id = %group_id,
            instance_id = %instance_id,
            status = %target,
            "group status updated"
        );
        if let Some(event) = group_event(&application_id, &group_id, &instance_id, target) {
            self.events.publish(event);
        }

        let mut effects = vec![Effect::SetStatus {
            component,
            instance_id: instance_id.clone(),
            status: target.into(),
        }];
        if target == GroupStatus::Terminated {
            effects.push(Effect::Lifecycle(LifecycleCommand::ReapGroupInstance {
                application_id,
                group_id,
                instance_id,
            }));
        }
        effects
    }

    /// 伝播が終わった Terminated のグループインスタンスを取り除く
    async fn reap_group_instance(
        &self,
        application_id: &ApplicationId,
        group_id: &GroupId,
        instance_id: &InstanceId,
    ) {
        let mut apps = self.holder.write().await;
        let removed = apps
            .get_mut(application_id)
            .and_then(|app| app.group_recursively_mut(group_id))
            .filter(|group| {
                group
                    .instance(instance_id)
                    .is_some_and(|i| i.status == GroupStatus::Terminated)
            })
            .and_then(|group| group.instances.remove(instance_id))
            .is_some();
        if removed {
            self.persist_or_log(&apps, application_id).await;
            debug!(
                application_id = %application_id,
                group_id = %group_id,
                instance_id = %instance_id,
                "terminated group instance removed"
            );
        }
    }

    /// Terminated のアプリケーションインスタンスを取り除き、最後の 1 つならアプリケーションごと消す
    async fn reap_application_instance(
        &self,
        application_id: &ApplicationId,
        instance_id: &InstanceId,
    ) {
        let application_removed = {
            let mut apps = self.holder.write().await;
            let Some(app) = apps.get_mut(application_id) else {
                return;
            };
            if app
                .instance(instance_id)
                .is_some_and(|i| i.status == ApplicationStatus::Terminated)
            {
                app.instances.remove(instance_id);
            }
            if app.live_instance_count() > 0 {
                self.persist_or_log(&apps, application_id).await;
                false
            } else {
                if let Err(e) = apps.remove(application_id).await {
                    error!(
                        application_id = %application_id,
                        error = %e,
                        "failed to remove application from the store"
                    );
                }
                true
            }
        };

        if application_removed {
            self.monitors.lock().await.remove_tree(application_id);
            info!(application_id = %application_id, "application removed");
        }
    }
}

fn transition<S: Lifecycle>(
    instance: Option<&mut Instance<S>>,
    component: &ComponentId,
    instance_id: &InstanceId,
    target: S,
) -> Result<(), OrchestrationError> {
    let instance = instance.ok_or_else(|| OrchestrationError::not_found(instance_id))?;
    if !instance.is_state_transition_valid(target) {
        return Err(OrchestrationError::InvalidTransition {
            component: component.clone(),
            instance_id: instance_id.clone(),
            from: instance.status.to_string(),
            to: target.to_string(),
        });
    }
    instance.status = target;
    Ok(())
}

fn group_event(
    application_id: &ApplicationId,
    group_id: &GroupId,
    instance_id: &InstanceId,
    status: GroupStatus,
) -> Option<LifecycleEvent> {
    let application_id = application_id.clone();
    let group_id = group_id.clone();
    let instance_id = instance_id.clone();
    match status {
        GroupStatus::Created => None,
        GroupStatus::Active => Some(LifecycleEvent::GroupActivated {
            application_id,
            group_id,
            instance_id,
        }),
        GroupStatus::Inactive => Some(LifecycleEvent::GroupInactive {
            application_id,
            group_id,
            instance_id,
        }),
        GroupStatus::Terminating => Some(LifecycleEvent::GroupTerminating {
            application_id,
            group_id,
            instance_id,
        }),
        GroupStatus::Terminated => Some(LifecycleEvent::GroupTerminated {
            application_id,
            group_id,
            instance_id,
        }),
    }
}

fn rejected(application_id: &ApplicationId, error: &OrchestrationError) {
    warn!(application_id = %application_id, error = %error, "lifecycle event rejected");
}
