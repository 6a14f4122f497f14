//! Application / Group definitions - スナップショットに保存されるツリー
//!
//! Application → Group → Cluster の入れ子構造です。Cluster は外部管理の葉なので
//! ここでは `ClusterDataHolder`（参照情報）だけを持ちます。
//!
//! # 設計原則
//! - ステータスの変更は ApplicationBuilder だけが行う
//! - 子要素（groups / clusters / startup order）は `Children` に集約し、
//!   Application と Group で同じ構造を共有する

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::domain::ids::{ApplicationId, ClusterId, ComponentId, GroupId, InstanceId};
use crate::domain::instance::{ApplicationInstance, GroupInstance, InstanceContext};

/// ClusterDataHolder はアプリケーション内のクラスタへの参照
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterDataHolder {
    /// Alias within the application (`cluster.<alias>`).
    pub alias: ClusterId,
    /// Topology-level cluster id.
    pub cluster_id: String,
    pub service_type: String,
}

/// Children はグループ / アプリケーションの直下の構成要素
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Children {
    #[serde(default)]
    pub groups: Vec<Group>,
    #[serde(default)]
    pub clusters: Vec<ClusterDataHolder>,
    /// Each entry is an ordered chain: every element starts after the one before it.
    #[serde(default)]
    pub startup_orders: Vec<Vec<ComponentId>>,
    /// Sets of siblings that scale together.
    #[serde(default)]
    pub scaling_dependents: Vec<Vec<ComponentId>>,
}

impl Children {
    /// 直下の全要素（groups → clusters の順）
    pub fn component_ids(&self) -> Vec<ComponentId> {
        self.groups
            .iter()
            .map(|g| ComponentId::Group(g.id.clone()))
            .chain(
                self.clusters
                    .iter()
                    .map(|c| ComponentId::Cluster(c.alias.clone())),
            )
            .collect()
    }

    pub fn contains(&self, id: &ComponentId) -> bool {
        match id {
            ComponentId::Group(g) => self.group(g).is_some(),
            ComponentId::Cluster(c) => self.cluster(c).is_some(),
            ComponentId::Application(_) => false,
        }
    }

    pub fn group(&self, id: &GroupId) -> Option<&Group> {
        self.groups.iter().find(|g| &g.id == id)
    }

    pub fn cluster(&self, alias: &ClusterId) -> Option<&ClusterDataHolder> {
        self.clusters.iter().find(|c| &c.alias == alias)
    }

    fn find_group(&self, id: &GroupId) -> Option<&Group> {
        for group in &self.groups {
            if &group.id == id {
                return Some(group);
            }
            if let Some(found) = group.children.find_group(id) {
                return Some(found);
            }
        }
        None
    }

    fn find_group_mut(&mut self, id: &GroupId) -> Option<&mut Group> {
        for group in &mut self.groups {
            if &group.id == id {
                return Some(group);
            }
            if let Some(found) = group.children.find_group_mut(id) {
                return Some(found);
            }
        }
        None
    }

    fn find_parent_of(&self, owner: ComponentId, target: &ComponentId) -> Option<ComponentId> {
        if self.contains(target) {
            return Some(owner);
        }
        self.groups.iter().find_map(|g| {
            g.children
                .find_parent_of(ComponentId::Group(g.id.clone()), target)
        })
    }

    fn collect_clusters(&self, out: &mut Vec<ClusterDataHolder>) {
        out.extend(self.clusters.iter().cloned());
        for group in &self.groups {
            group.children.collect_clusters(out);
        }
    }
}

fn default_one() -> u32 {
    1
}

/// Group は独立してスケールできるアプリケーションのサブユニット
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Group {
    pub id: GroupId,
    #[serde(default = "default_one")]
    pub min_instances: u32,
    #[serde(default = "default_one")]
    pub max_instances: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deployment_policy: Option<String>,
    #[serde(default)]
    pub group_scaling_enabled: bool,
    #[serde(default)]
    pub instances: BTreeMap<InstanceId, GroupInstance>,
    #[serde(default)]
    pub children: Children,
}

impl Group {
    pub fn new(id: impl Into<GroupId>) -> Self {
        Self {
            id: id.into(),
            min_instances: 1,
            max_instances: 1,
            deployment_policy: None,
            group_scaling_enabled: false,
            instances: BTreeMap::new(),
            children: Children::default(),
        }
    }

    /// min / max が両方 1 ならスケールなし（親の instance id を再利用する）
    pub fn reuses_parent_instance_id(&self) -> bool {
        self.min_instances == 1 && self.max_instances == 1
    }

    pub fn instance(&self, id: &InstanceId) -> Option<&GroupInstance> {
        self.instances.get(id)
    }

    pub fn live_instances(&self) -> impl Iterator<Item = &GroupInstance> {
        self.instances.values().filter(|i| i.is_live())
    }

    pub fn live_instance_count(&self) -> usize {
        self.live_instances().count()
    }

    /// 親インスタンスに紐づく生存インスタンス
    pub fn live_instances_with_parent<'a>(
        &'a self,
        parent: &'a InstanceId,
    ) -> impl Iterator<Item = &'a GroupInstance> + 'a {
        self.live_instances()
            .filter(move |i| i.parent_id.as_ref() == Some(parent))
    }
}

/// Application はデプロイ単位のルート
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Application {
    pub id: ApplicationId,
    #[serde(default)]
    pub instances: BTreeMap<InstanceId, ApplicationInstance>,
    #[serde(default)]
    pub children: Children,
}

impl Application {
    pub fn new(id: impl Into<ApplicationId>) -> Self {
        Self {
            id: id.into(),
            instances: BTreeMap::new(),
            children: Children::default(),
        }
    }

    pub fn component_id(&self) -> ComponentId {
        ComponentId::Application(self.id.clone())
    }

    pub fn instance(&self, id: &InstanceId) -> Option<&ApplicationInstance> {
        self.instances.get(id)
    }

    pub fn live_instance_count(&self) -> usize {
        self.instances.values().filter(|i| i.is_live()).count()
    }

    pub fn group_recursively(&self, id: &GroupId) -> Option<&Group> {
        self.children.find_group(id)
    }

    pub fn group_recursively_mut(&mut self, id: &GroupId) -> Option<&mut Group> {
        self.children.find_group_mut(id)
    }

    /// ツリー内の全クラスタ参照
    pub fn cluster_data_recursively(&self) -> Vec<ClusterDataHolder> {
        let mut out = Vec::new();
        self.children.collect_clusters(&mut out);
        out
    }

    pub fn cluster_recursively(&self, alias: &ClusterId) -> Option<ClusterDataHolder> {
        self.cluster_data_recursively()
            .into_iter()
            .find(|c| &c.alias == alias)
    }

    /// 指定コンポーネントの直下の子要素（クラスタは葉なので None）
    pub fn children_of(&self, component: &ComponentId) -> Option<&Children> {
        match component {
            ComponentId::Application(id) if id == &self.id => Some(&self.children),
            ComponentId::Group(g) => self.group_recursively(g).map(|g| &g.children),
            _ => None,
        }
    }

    /// 定義ツリー上の親コンポーネント
    pub fn parent_of(&self, component: &ComponentId) -> Option<ComponentId> {
        self.children.find_parent_of(self.component_id(), component)
    }

    /// アプリケーション / グループのインスタンス情報（クラスタは外部管理なので None）
    pub fn instance_context(
        &self,
        component: &ComponentId,
        instance_id: &InstanceId,
    ) -> Option<InstanceContext> {
        match component {
            ComponentId::Application(id) if id == &self.id => {
                self.instance(instance_id).map(|i| i.context())
            }
            ComponentId::Group(g) => self
                .group_recursively(g)
                .and_then(|g| g.instance(instance_id))
                .map(|i| i.context()),
            _ => None,
        }
    }
}

/// Applications はスナップショット全体
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Applications {
    applications: BTreeMap<ApplicationId, Application>,
}

impl Applications {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &ApplicationId) -> Option<&Application> {
        self.applications.get(id)
    }

    pub fn get_mut(&mut self, id: &ApplicationId) -> Option<&mut Application> {
        self.applications.get_mut(id)
    }

    pub fn contains(&self, id: &ApplicationId) -> bool {
        self.applications.contains_key(id)
    }

    pub fn insert(&mut self, app: Application) -> Option<Application> {
        self.applications.insert(app.id.clone(), app)
    }

    pub fn remove(&mut self, id: &ApplicationId) -> Option<Application> {
        self.applications.remove(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Application> {
        self.applications.values()
    }

    pub fn len(&self) -> usize {
        self.applications.len()
    }

    pub fn is_empty(&self) -> bool {
        self.applications.is_empty()
    }
}

impl FromIterator<Application> for Applications {
    fn from_iter<I: IntoIterator<Item = Application>>(iter: I) -> Self {
        let mut apps = Applications::new();
        for app in iter {
            apps.insert(app);
        }
        apps
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    pub fn cluster(alias: &str) -> ClusterDataHolder {
        ClusterDataHolder {
            alias: ClusterId::new(alias),
            cluster_id: format!("{alias}.cluster"),
            service_type: alias.to_string(),
        }
    }

    /// app1 ── web(group) ── php(cluster)
    ///      └─ db(group) ─── mysql(cluster)
    pub fn two_tier_app() -> Application {
        let mut web = Group::new("web");
        web.children.clusters.push(cluster("php"));
        let mut db = Group::new("db");
        db.children.clusters.push(cluster("mysql"));

        let mut app = Application::new("app1");
        app.children.groups.push(web);
        app.children.groups.push(db);
        app
    }
}
