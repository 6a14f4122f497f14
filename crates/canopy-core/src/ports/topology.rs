//! TopologyView port - 外部トポロジの読み取り
//!
//! モニタが存在しないクラスタを undeploy するときだけ使います。

use crate::domain::InstanceId;

pub trait TopologyView: Send + Sync {
    /// Instances the topology knows for a cluster, or None when the cluster is unknown.
    fn cluster_instances(&self, service_type: &str, cluster_id: &str) -> Option<Vec<InstanceId>>;
}
