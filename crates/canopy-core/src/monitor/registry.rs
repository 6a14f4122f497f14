//! MonitorRegistry - アプリケーションごとのモニタツリーと稼働中クラスタモニタの一覧

use std::collections::{BTreeSet, HashMap};

use tracing::{debug, info};

use crate::domain::ApplicationId;
use crate::monitor::MonitorTree;

#[derive(Debug, Default)]
pub struct MonitorRegistry {
    trees: HashMap<ApplicationId, MonitorTree>,
    cluster_monitors: BTreeSet<String>,
}

impl MonitorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_tree(&mut self, tree: MonitorTree) {
        self.trees.insert(tree.application_id().clone(), tree);
    }

    pub fn tree(&self, id: &ApplicationId) -> Option<&MonitorTree> {
        self.trees.get(id)
    }

    pub fn tree_mut(&mut self, id: &ApplicationId) -> Option<&mut MonitorTree> {
        self.trees.get_mut(id)
    }

    pub fn contains(&self, id: &ApplicationId) -> bool {
        self.trees.contains_key(id)
    }

    /// ツリーを破棄する（各モニタのループは Drop で止まる）
    pub fn remove_tree(&mut self, id: &ApplicationId) -> bool {
        let Some(tree) = self.trees.remove(id) else {
            return false;
        };
        for cluster_id in tree.cluster_ids() {
            self.cluster_monitors.remove(&cluster_id);
        }
        info!(application_id = %id, monitors = tree.len(), "monitor tree destroyed");
        true
    }

    /// 全ツリーを破棄する
    pub fn clear(&mut self) -> usize {
        let count = self.trees.len();
        self.trees.clear();
        self.cluster_monitors.clear();
        count
    }

    pub fn register_cluster(&mut self, cluster_id: String) {
        if self.cluster_monitors.insert(cluster_id.clone()) {
            debug!(cluster_id = %cluster_id, "cluster monitor registered");
        }
    }

    pub fn deregister_cluster(&mut self, cluster_id: &str) {
        if self.cluster_monitors.remove(cluster_id) {
            debug!(cluster_id = %cluster_id, "cluster monitor deregistered");
        }
    }

    pub fn has_cluster_monitor(&self, cluster_id: &str) -> bool {
        self.cluster_monitors.contains(cluster_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::application::fixtures::two_tier_app;
    use crate::monitor::MonitorSettings;

    #[test]
    fn removing_a_tree_forgets_its_cluster_monitors() {
        let app = two_tier_app();
        let settings = MonitorSettings {
            spawn_loops: false,
            ..MonitorSettings::default()
        };
        let mut registry = MonitorRegistry::new();
        registry.insert_tree(MonitorTree::new(&app, settings).unwrap());
        registry.register_cluster("other.cluster".into());

        assert!(registry.contains(&app.id));
        assert!(registry.remove_tree(&app.id));
        assert!(!registry.remove_tree(&app.id));
        assert!(registry.has_cluster_monitor("other.cluster"));

        registry.deregister_cluster("other.cluster");
        assert!(!registry.has_cluster_monitor("other.cluster"));
    }
}
