//! OrchestratorBuilder - ポートの組み立てと起動時検証
//!
//! # 設計原則
//! - 指定しなかったポートはインメモリ実装で埋める
//! - build() 時に全 deployment policy のアルゴリズム名を解決する（Fail-fast）
//! - スナップショットは build() 時にストアから復元する

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::info;

use crate::app::engine::Engine;
use crate::app::holder::ApplicationHolder;
use crate::app::Orchestrator;
use crate::config::OrchestratorConfig;
use crate::domain::StoreError;
use crate::impls::{
    BroadcastEventSink, InMemoryApplicationStore, InMemoryPolicyStore, InMemoryTopology,
    NoopCloudController,
};
use crate::monitor::MonitorRegistry;
use crate::placement::{AlgorithmRegistry, PartitionAlgorithm, RegistryError};
use crate::ports::{
    ApplicationStore, CloudController, EventSink, IdGenerator, PolicyStore, SystemClock,
    TopologyView, UlidGenerator,
};

/// OrchestratorBuilder は Orchestrator を構築する
///
/// # 使用例
/// ```ignore
/// let orchestrator = OrchestratorBuilder::new()
///     .config(config)
///     .policy_store(policies)
///     .register_algorithm(Arc::new(MyAlgorithm))?
///     .build()
///     .await?;
/// ```
pub struct OrchestratorBuilder {
    config: OrchestratorConfig,
    algorithms: AlgorithmRegistry,
    store: Option<Arc<dyn ApplicationStore>>,
    policies: Option<Arc<dyn PolicyStore>>,
    ids: Option<Arc<dyn IdGenerator>>,
    events: Option<Arc<dyn EventSink>>,
    controller: Option<Arc<dyn CloudController>>,
    topology: Option<Arc<dyn TopologyView>>,
}

#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("deployment policy {policy} uses unknown partition algorithm '{algorithm}'")]
    UnknownAlgorithm { policy: String, algorithm: String },

    #[error("failed to restore applications: {0}")]
    Store(#[from] StoreError),
}

impl OrchestratorBuilder {
    pub fn new() -> Self {
        Self {
            config: OrchestratorConfig::default(),
            algorithms: AlgorithmRegistry::with_defaults(),
            store: None,
            policies: None,
            ids: None,
            events: None,
            controller: None,
            topology: None,
        }
    }

    pub fn config(mut self, config: OrchestratorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn application_store(mut self, store: Arc<dyn ApplicationStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn policy_store(mut self, policies: Arc<dyn PolicyStore>) -> Self {
        self.policies = Some(policies);
        self
    }

    pub fn id_generator(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = Some(ids);
        self
    }

    pub fn event_sink(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn cloud_controller(mut self, controller: Arc<dyn CloudController>) -> Self {
        self.controller = Some(controller);
        self
    }

    pub fn topology(mut self, topology: Arc<dyn TopologyView>) -> Self {
        self.topology = Some(topology);
        self
    }

    /// 既定の 2 つに加えて配置アルゴリズムを登録する
    pub fn register_algorithm(
        mut self,
        algorithm: Arc<dyn PartitionAlgorithm>,
    ) -> Result<Self, RegistryError> {
        self.algorithms.register(algorithm)?;
        Ok(self)
    }

    /// 検証してから Orchestrator を生成する
    ///
    /// # 検証
    /// - 全 deployment policy のアルゴリズム名が登録済みか
    /// - 未登録があれば BuildError::UnknownAlgorithm
    pub async fn build(self) -> Result<Orchestrator, BuildError> {
        let policies = self
            .policies
            .unwrap_or_else(|| Arc::new(InMemoryPolicyStore::new()));
        for policy in policies.deployment_policies() {
            if let Some(unknown) = policy
                .algorithm_names()
                .find(|name| !self.algorithms.contains(name))
            {
                return Err(BuildError::UnknownAlgorithm {
                    policy: policy.id.clone(),
                    algorithm: unknown.to_string(),
                });
            }
        }

        let store = self
            .store
            .unwrap_or_else(|| Arc::new(InMemoryApplicationStore::new()));
        let holder = ApplicationHolder::load(store).await?;
        let capacity = self.config.event_channel_capacity;

        let engine = Engine {
            holder: Arc::new(holder),
            monitors: Mutex::new(MonitorRegistry::new()),
            policies,
            algorithms: self.algorithms,
            ids: self
                .ids
                .unwrap_or_else(|| Arc::new(UlidGenerator::new(SystemClock))),
            events: self
                .events
                .unwrap_or_else(|| Arc::new(BroadcastEventSink::new(capacity))),
            controller: self
                .controller
                .unwrap_or_else(|| Arc::new(NoopCloudController)),
            topology: self
                .topology
                .unwrap_or_else(|| Arc::new(InMemoryTopology::new())),
            settings: self.config.monitor_settings(),
        };
        info!(
            algorithms = ?engine.algorithms.registered_names(),
            monitor_interval_secs = self.config.monitor_interval_secs,
            "orchestrator built"
        );
        Ok(Orchestrator::new(Arc::new(engine)))
    }
}

impl Default for OrchestratorBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::application::fixtures::two_tier_app;
    use crate::domain::policy::fixtures::policy;
    use crate::placement::PartitionContext;

    struct LastOnly;

    impl PartitionAlgorithm for LastOnly {
        fn name(&self) -> &'static str {
            "last-only"
        }

        fn select(&self, candidates: &[&PartitionContext]) -> Option<usize> {
            candidates.len().checked_sub(1)
        }
    }

    fn policies_using(algorithm: &str) -> Arc<InMemoryPolicyStore> {
        let policies = Arc::new(InMemoryPolicyStore::new());
        policies.add_deployment_policy(policy("dp1", "np1", algorithm, &[("p1", 1)]));
        policies
    }

    #[tokio::test]
    async fn build_with_defaults() {
        assert!(OrchestratorBuilder::new().build().await.is_ok());
    }

    #[tokio::test]
    async fn unknown_algorithm_fails_the_build() {
        let result = OrchestratorBuilder::new()
            .policy_store(policies_using("random"))
            .build()
            .await;
        assert!(matches!(
            result,
            Err(BuildError::UnknownAlgorithm { policy, algorithm })
                if policy == "dp1" && algorithm == "random"
        ));
    }

    #[tokio::test]
    async fn registered_algorithm_is_accepted() {
        let result = OrchestratorBuilder::new()
            .policy_store(policies_using("last-only"))
            .register_algorithm(Arc::new(LastOnly))
            .unwrap()
            .build()
            .await;
        assert!(result.is_ok());
    }

    #[test]
    fn default_algorithms_cannot_be_replaced() {
        struct FakeRoundRobin;
        impl PartitionAlgorithm for FakeRoundRobin {
            fn name(&self) -> &'static str {
                "round-robin"
            }
            fn select(&self, _: &[&PartitionContext]) -> Option<usize> {
                None
            }
        }
        assert!(matches!(
            OrchestratorBuilder::new().register_algorithm(Arc::new(FakeRoundRobin)),
            Err(RegistryError::AlreadyRegistered(_))
        ));
    }

    #[tokio::test]
    async fn snapshot_is_restored_from_the_store() {
        let store = Arc::new(InMemoryApplicationStore::with_applications([two_tier_app()]).unwrap());
        let orchestrator = OrchestratorBuilder::new()
            .application_store(store)
            .build()
            .await
            .unwrap();
        assert_eq!(orchestrator.holder().get_applications().await.len(), 1);
    }
}
