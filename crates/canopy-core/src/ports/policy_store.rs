//! PolicyStore port - デプロイメントポリシーの参照

use crate::domain::{ApplicationId, ApplicationPolicy, DeploymentPolicy};

/// PolicyStore は設定済みのポリシーを読み出す
///
/// ポリシーの登録・読み込みは外部の責務で、コアは参照だけを行う。
pub trait PolicyStore: Send + Sync {
    fn get_deployment_policy(&self, name: &str) -> Option<DeploymentPolicy>;

    fn get_deployment_policy_by_application(
        &self,
        application_id: &ApplicationId,
    ) -> Option<ApplicationPolicy>;

    /// All deployment policies, including application child policies.
    /// Used to validate algorithm names at wiring time.
    fn deployment_policies(&self) -> Vec<DeploymentPolicy>;
}
