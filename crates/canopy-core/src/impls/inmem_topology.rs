//! InMemoryTopology - クラスタのインスタンス一覧を保持するだけの TopologyView

use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock};

use crate::domain::InstanceId;
use crate::ports::TopologyView;

/// (service_type, cluster_id) ごとのインスタンス一覧
#[derive(Default)]
pub struct InMemoryTopology {
    clusters: RwLock<BTreeMap<(String, String), Vec<InstanceId>>>,
}

impl InMemoryTopology {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_cluster_instance(&self, service_type: &str, cluster_id: &str, instance: InstanceId) {
        self.clusters
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry((service_type.to_string(), cluster_id.to_string()))
            .or_default()
            .push(instance);
    }
}

impl TopologyView for InMemoryTopology {
    fn cluster_instances(&self, service_type: &str, cluster_id: &str) -> Option<Vec<InstanceId>> {
        self.clusters
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&(service_type.to_string(), cluster_id.to_string()))
            .cloned()
    }
}
