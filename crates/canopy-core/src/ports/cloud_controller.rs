//! CloudController port - インフラ側へのクラスタ作成依頼

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::{ApplicationId, ClusterId, ControllerError};

/// ApplicationClusterContext はクラスタ 1 つ分の作成パラメータ
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationClusterContext {
    pub alias: ClusterId,
    pub cluster_id: String,
    pub service_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deployment_policy: Option<String>,
}

/// CloudController はアプリケーション作成時に一度だけ呼ばれる
#[async_trait]
pub trait CloudController: Send + Sync {
    async fn create_application_clusters(
        &self,
        application_id: &ApplicationId,
        clusters: &[ApplicationClusterContext],
    ) -> Result<(), ControllerError>;
}
