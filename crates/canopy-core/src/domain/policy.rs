//! Deployment policies - どのパーティションにどのアルゴリズムで配置するか

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::domain::ids::{ApplicationId, GroupId, NetworkPartitionId, PartitionId};

/// PartitionPolicy は 1 つのパーティションの上限
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionPolicy {
    pub id: PartitionId,
    /// Maximum number of instances placed here. `0` means unbounded.
    #[serde(default)]
    pub max: u32,
}

/// NetworkPartitionPolicy は 1 つのネットワークパーティション内の配置ルール
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkPartitionPolicy {
    pub id: NetworkPartitionId,
    /// Registered placement algorithm name, e.g. `round-robin`.
    pub partition_algorithm: String,
    pub partitions: Vec<PartitionPolicy>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentPolicy {
    pub id: String,
    pub network_partitions: Vec<NetworkPartitionPolicy>,
}

impl DeploymentPolicy {
    pub fn network_partition(&self, id: &NetworkPartitionId) -> Option<&NetworkPartitionPolicy> {
        self.network_partitions.iter().find(|np| &np.id == id)
    }

    /// ポリシーが参照しているアルゴリズム名
    pub fn algorithm_names(&self) -> impl Iterator<Item = &str> {
        self.network_partitions
            .iter()
            .map(|np| np.partition_algorithm.as_str())
    }
}

/// ApplicationPolicy はアプリケーション単位の配置ルール
///
/// アプリケーションインスタンスはネットワークパーティションごとに 1 つ作られます。
/// `children` は deployment policy 名を持たないグループ向けのフォールバック。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationPolicy {
    pub application_id: ApplicationId,
    pub network_partitions: Vec<NetworkPartitionId>,
    #[serde(default)]
    pub children: BTreeMap<GroupId, DeploymentPolicy>,
}

impl ApplicationPolicy {
    pub fn child_policy(&self, group: &GroupId) -> Option<&DeploymentPolicy> {
        self.children.get(group)
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    pub fn policy(id: &str, np: &str, algorithm: &str, partitions: &[(&str, u32)]) -> DeploymentPolicy {
        DeploymentPolicy {
            id: id.to_string(),
            network_partitions: vec![NetworkPartitionPolicy {
                id: NetworkPartitionId::new(np),
                partition_algorithm: algorithm.to_string(),
                partitions: partitions
                    .iter()
                    .map(|(p, max)| PartitionPolicy {
                        id: PartitionId::new(*p),
                        max: *max,
                    })
                    .collect(),
            }],
        }
    }

    pub fn app_policy(app: &str, nps: &[&str]) -> ApplicationPolicy {
        ApplicationPolicy {
            application_id: ApplicationId::new(app),
            network_partitions: nps.iter().map(|np| NetworkPartitionId::new(*np)).collect(),
            children: BTreeMap::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;

    #[test]
    fn looks_up_network_partition() {
        let dp = policy("dp1", "np1", "round-robin", &[("p1", 2), ("p2", 0)]);
        let np = dp.network_partition(&NetworkPartitionId::new("np1")).unwrap();
        assert_eq!(np.partitions.len(), 2);
        assert!(dp.network_partition(&NetworkPartitionId::new("np2")).is_none());
        assert_eq!(dp.algorithm_names().collect::<Vec<_>>(), vec!["round-robin"]);
    }

    #[test]
    fn application_policy_parses_child_policies() {
        let raw = r#"{
            "application_id": "shop",
            "network_partitions": ["np1"],
            "children": {
                "web": { "id": "web-dp", "network_partitions": [
                    { "id": "np1", "partition_algorithm": "one-after-another",
                      "partitions": [ { "id": "p1", "max": 1 } ] } ] }
            }
        }"#;
        let policy: ApplicationPolicy = serde_json::from_str(raw).unwrap();
        let web = policy.child_policy(&GroupId::new("web")).unwrap();
        assert_eq!(web.network_partitions[0].partitions[0].max, 1);
    }
}
