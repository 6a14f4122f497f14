//! Errors - エラー型と分類
//!
//! # 分類
//! - NotFound / InvalidTransition: 遅延・重複イベントで普通に起きる。ログだけ出して中断
//! - MonitorNotFound: その枝の伝播だけスキップ（兄弟には影響しない）
//! - InconsistentTopology / Placement / DependencyCycle: 設定の欠陥。呼び出し側に返す
//! - Infrastructure: 永続化・コントローラの障害

use thiserror::Error;

use crate::domain::ids::{ComponentId, InstanceId, NetworkPartitionId};

/// ErrorKind は運用上の分類
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    InvalidTransition,
    MonitorNotFound,
    InconsistentTopology,
    Configuration,
    Infrastructure,
}

#[derive(Debug, Error)]
pub enum OrchestrationError {
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("invalid status transition for {component} [instance-id] {instance_id}: {from} -> {to}")]
    InvalidTransition {
        component: ComponentId,
        instance_id: InstanceId,
        from: String,
        to: String,
    },

    #[error("monitor not found: {0}")]
    MonitorNotFound(String),

    #[error("inconsistent topology: {0}")]
    InconsistentTopology(String),

    #[error("startup dependency cycle: {0:?}")]
    DependencyCycle(Vec<ComponentId>),

    #[error(transparent)]
    Placement(#[from] PlacementError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Controller(#[from] ControllerError),
}

impl OrchestrationError {
    /// `NotFound` for any typed id.
    pub fn not_found<T: crate::domain::ids::IdMarker>(id: &crate::domain::ids::Id<T>) -> Self {
        OrchestrationError::NotFound {
            kind: id.kind(),
            id: id.to_string(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            OrchestrationError::NotFound { .. } => ErrorKind::NotFound,
            OrchestrationError::InvalidTransition { .. } => ErrorKind::InvalidTransition,
            OrchestrationError::MonitorNotFound(_) => ErrorKind::MonitorNotFound,
            OrchestrationError::InconsistentTopology(_) => ErrorKind::InconsistentTopology,
            OrchestrationError::DependencyCycle(_) | OrchestrationError::Placement(_) => {
                ErrorKind::Configuration
            }
            OrchestrationError::Store(_) | OrchestrationError::Controller(_) => {
                ErrorKind::Infrastructure
            }
        }
    }

    /// ログだけ出して処理を続けてよいエラーか
    pub fn is_routine(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::NotFound | ErrorKind::InvalidTransition | ErrorKind::MonitorNotFound
        )
    }
}

/// PlacementError は配置先を決められなかった
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlacementError {
    #[error("deployment policy not found: {0}")]
    PolicyNotFound(String),

    #[error("network partition {network_partition} is not part of deployment policy {policy}")]
    NetworkPartitionNotInPolicy {
        policy: String,
        network_partition: NetworkPartitionId,
    },

    #[error("unknown partition algorithm: {0}")]
    UnknownAlgorithm(String),

    #[error("no partition with free capacity in network partition {0}")]
    NoCapacity(NetworkPartitionId),

    #[error("partition algorithm {algorithm} selected candidate {index} of {candidates}")]
    InvalidSelection {
        algorithm: String,
        index: usize,
        candidates: usize,
    },
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum ControllerError {
    #[error("cluster creation rejected: {0}")]
    Rejected(String),

    #[error("controller unavailable: {0}")]
    Unavailable(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ids::ApplicationId;

    #[test]
    fn classifies_errors() {
        let not_found = OrchestrationError::not_found(&ApplicationId::new("app1"));
        assert_eq!(not_found.kind(), ErrorKind::NotFound);
        assert!(not_found.is_routine());
        assert_eq!(not_found.to_string(), "application not found: app1");

        let placement: OrchestrationError =
            PlacementError::UnknownAlgorithm("random".into()).into();
        assert_eq!(placement.kind(), ErrorKind::Configuration);
        assert!(!placement.is_routine());

        let topology = OrchestrationError::InconsistentTopology("x".into());
        assert!(!topology.is_routine());
    }
}
