//! CloudController の開発用実装

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex;
use tracing::debug;

use crate::domain::{ApplicationId, ControllerError};
use crate::ports::{ApplicationClusterContext, CloudController};

/// 何もせず成功する
#[derive(Debug, Default)]
pub struct NoopCloudController;

#[async_trait]
impl CloudController for NoopCloudController {
    async fn create_application_clusters(
        &self,
        application_id: &ApplicationId,
        clusters: &[ApplicationClusterContext],
    ) -> Result<(), ControllerError> {
        debug!(application_id = %application_id, clusters = clusters.len(), "skipping cluster creation");
        Ok(())
    }
}

/// 呼び出しを記録する。`reject()` 後は全ての依頼を拒否する
#[derive(Default)]
pub struct RecordingCloudController {
    calls: Mutex<Vec<(ApplicationId, Vec<ApplicationClusterContext>)>>,
    rejecting: AtomicBool,
}

impl RecordingCloudController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reject(&self) {
        self.rejecting.store(true, Ordering::SeqCst);
    }

    pub async fn calls(&self) -> Vec<(ApplicationId, Vec<ApplicationClusterContext>)> {
        self.calls.lock().await.clone()
    }
}

#[async_trait]
impl CloudController for RecordingCloudController {
    async fn create_application_clusters(
        &self,
        application_id: &ApplicationId,
        clusters: &[ApplicationClusterContext],
    ) -> Result<(), ControllerError> {
        if self.rejecting.load(Ordering::SeqCst) {
            return Err(ControllerError::Rejected(format!(
                "clusters for {application_id} were rejected"
            )));
        }
        self.calls
            .lock()
            .await
            .push((application_id.clone(), clusters.to_vec()));
        Ok(())
    }
}
