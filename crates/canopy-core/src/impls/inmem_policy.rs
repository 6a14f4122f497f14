//! InMemoryPolicyStore - 起動時に登録したポリシーを返すだけの PolicyStore

use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock};

use crate::domain::{ApplicationId, ApplicationPolicy, DeploymentPolicy};
use crate::ports::PolicyStore;

#[derive(Default)]
pub struct InMemoryPolicyStore {
    deployment_policies: RwLock<BTreeMap<String, DeploymentPolicy>>,
    application_policies: RwLock<BTreeMap<ApplicationId, ApplicationPolicy>>,
}

impl InMemoryPolicyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_deployment_policy(&self, policy: DeploymentPolicy) {
        self.deployment_policies
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(policy.id.clone(), policy);
    }

    pub fn add_application_policy(&self, policy: ApplicationPolicy) {
        self.application_policies
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(policy.application_id.clone(), policy);
    }

    /// アプリケーションポリシーの undeploy
    pub fn remove_application_policy(&self, id: &ApplicationId) -> Option<ApplicationPolicy> {
        self.application_policies
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id)
    }
}

impl PolicyStore for InMemoryPolicyStore {
    fn get_deployment_policy(&self, name: &str) -> Option<DeploymentPolicy> {
        self.deployment_policies
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    fn get_deployment_policy_by_application(
        &self,
        application_id: &ApplicationId,
    ) -> Option<ApplicationPolicy> {
        self.application_policies
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(application_id)
            .cloned()
    }

    fn deployment_policies(&self) -> Vec<DeploymentPolicy> {
        let mut out: Vec<DeploymentPolicy> = self
            .deployment_policies
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        let apps = self
            .application_policies
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        for app in apps.values() {
            out.extend(app.children.values().cloned());
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::policy::fixtures::{app_policy, policy};
    use crate::domain::GroupId;

    #[test]
    fn lists_named_and_child_policies() {
        let store = InMemoryPolicyStore::new();
        store.add_deployment_policy(policy("dp1", "np1", "round-robin", &[("p1", 0)]));

        let mut app = app_policy("app1", &["np1"]);
        app.children.insert(
            GroupId::new("web"),
            policy("web-dp", "np1", "one-after-another", &[("p1", 1)]),
        );
        store.add_application_policy(app);

        assert!(store.get_deployment_policy("dp1").is_some());
        assert!(store.get_deployment_policy("missing").is_none());
        assert_eq!(store.deployment_policies().len(), 2);

        let app_id = ApplicationId::new("app1");
        assert!(store.get_deployment_policy_by_application(&app_id).is_some());
        store.remove_application_policy(&app_id);
        assert!(store.get_deployment_policy_by_application(&app_id).is_none());
    }
}
