//! Dependency trees for startup ordering and group scaling.
//!
//! Design:
//! - Forward edges: component -> components it waits for before starting
//! - Reverse edges: component -> components that wait for it (startup dependents)
//! - Invariant: edges and reverse_edges must be kept in sync

use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::domain::application::Children;
use crate::domain::errors::OrchestrationError;
use crate::domain::ids::ComponentId;

/// Startup dependency tree of one parent's direct children.
///
/// Built from the parent's startup orders; every child is a node even when it
/// appears in no order, so it starts as a root.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DependencyTree {
    /// Children in definition order.
    members: Vec<ComponentId>,

    /// Forward edges: component -> components it depends on
    edges: BTreeMap<ComponentId, BTreeSet<ComponentId>>,

    /// Reverse edges: component -> components that depend on it
    reverse_edges: BTreeMap<ComponentId, BTreeSet<ComponentId>>,
}

impl DependencyTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Children の startup order からツリーを作る
    ///
    /// 定義にない要素を参照していれば InconsistentTopology、循環していれば DependencyCycle。
    pub fn from_children(children: &Children) -> Result<Self, OrchestrationError> {
        let mut tree = Self {
            members: children.component_ids(),
            ..Self::default()
        };

        for order in &children.startup_orders {
            for id in order {
                if !children.contains(id) {
                    return Err(OrchestrationError::InconsistentTopology(format!(
                        "startup order references unknown child {id}"
                    )));
                }
            }
            for pair in order.windows(2) {
                tree.add_dependency(pair[1].clone(), pair[0].clone());
            }
        }

        if let Some(cycle) = tree.detect_cycle() {
            return Err(OrchestrationError::DependencyCycle(cycle));
        }
        Ok(tree)
    }

    /// Add a dependency: `component` starts only after `depends_on`.
    pub fn add_dependency(&mut self, component: ComponentId, depends_on: ComponentId) {
        self.edges
            .entry(component.clone())
            .or_default()
            .insert(depends_on.clone());
        self.reverse_edges
            .entry(depends_on)
            .or_default()
            .insert(component);
    }

    pub fn members(&self) -> &[ComponentId] {
        &self.members
    }

    /// 依存を持たない子（最初に起動する）
    pub fn starting_roots(&self) -> Vec<ComponentId> {
        self.members
            .iter()
            .filter(|id| !self.has_dependencies(id))
            .cloned()
            .collect()
    }

    pub fn has_dependencies(&self, id: &ComponentId) -> bool {
        self.edges.get(id).is_some_and(|deps| !deps.is_empty())
    }

    pub fn dependencies_of(&self, id: &ComponentId) -> Vec<ComponentId> {
        self.edges
            .get(id)
            .map(|deps| deps.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// `id` has startup dependents: something waits for it.
    pub fn has_dependents(&self, id: &ComponentId) -> bool {
        self.reverse_edges
            .get(id)
            .is_some_and(|waiting| !waiting.is_empty())
    }

    /// Components waiting for `id`, in definition order.
    pub fn dependents_of(&self, id: &ComponentId) -> Vec<ComponentId> {
        let Some(waiting) = self.reverse_edges.get(id) else {
            return Vec::new();
        };
        self.members
            .iter()
            .filter(|m| waiting.contains(*m))
            .cloned()
            .collect()
    }

    /// Detect a cycle with three-colour DFS.
    ///
    /// Returns the nodes on the first cycle found, or None for a DAG.
    pub fn detect_cycle(&self) -> Option<Vec<ComponentId>> {
        #[derive(Clone, Copy, PartialEq, Eq)]
        enum Color {
            White,
            Gray,
            Black,
        }

        fn visit<'a>(
            tree: &'a DependencyTree,
            node: &'a ComponentId,
            colors: &mut HashMap<&'a ComponentId, Color>,
            path: &mut Vec<&'a ComponentId>,
        ) -> Option<Vec<ComponentId>> {
            colors.insert(node, Color::Gray);
            path.push(node);
            if let Some(deps) = tree.edges.get(node) {
                for dep in deps {
                    match colors.get(dep).copied().unwrap_or(Color::White) {
                        Color::Gray => {
                            let start = path.iter().position(|n| *n == dep).unwrap_or(0);
                            return Some(path[start..].iter().map(|n| (*n).clone()).collect());
                        }
                        Color::White => {
                            if let Some(cycle) = visit(tree, dep, colors, path) {
                                return Some(cycle);
                            }
                        }
                        Color::Black => {}
                    }
                }
            }
            path.pop();
            colors.insert(node, Color::Black);
            None
        }

        let mut colors = HashMap::new();
        for node in self.edges.keys() {
            if colors.get(node).copied().unwrap_or(Color::White) == Color::White {
                let mut path = Vec::new();
                if let Some(cycle) = visit(self, node, &mut colors, &mut path) {
                    return Some(cycle);
                }
            }
        }
        None
    }
}

/// Sets of sibling components that must scale together.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScalingDependencyTree {
    sets: Vec<BTreeSet<ComponentId>>,
}

impl ScalingDependencyTree {
    pub fn from_children(children: &Children) -> Self {
        Self {
            sets: children
                .scaling_dependents
                .iter()
                .map(|set| set.iter().cloned().collect())
                .collect(),
        }
    }

    /// `id` がどれかのスケーリング集合に属しているか
    pub fn contains(&self, id: &ComponentId) -> bool {
        self.sets.iter().any(|set| set.contains(id))
    }

    /// `id` と一緒にスケールする兄弟（自身は含まない）
    pub fn siblings_of(&self, id: &ComponentId) -> Vec<ComponentId> {
        let mut out: BTreeSet<ComponentId> = BTreeSet::new();
        for set in self.sets.iter().filter(|set| set.contains(id)) {
            out.extend(set.iter().filter(|m| *m != id).cloned());
        }
        out.into_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::application::fixtures::cluster;
    use crate::domain::application::Group;

    fn id(raw: &str) -> ComponentId {
        raw.parse().unwrap()
    }

    fn children(orders: &[&[&str]]) -> Children {
        Children {
            groups: vec![Group::new("web"), Group::new("api")],
            clusters: vec![cluster("mysql"), cluster("redis")],
            startup_orders: orders
                .iter()
                .map(|o| o.iter().map(|s| id(s)).collect())
                .collect(),
            scaling_dependents: vec![vec![id("group.web"), id("group.api")]],
        }
    }

    #[test]
    fn unordered_children_are_all_roots() {
        let tree = DependencyTree::from_children(&children(&[])).unwrap();
        assert_eq!(tree.starting_roots().len(), 4);
        assert!(!tree.has_dependents(&id("cluster.mysql")));
    }

    #[test]
    fn startup_order_creates_forward_and_reverse_edges() {
        let tree = DependencyTree::from_children(&children(&[&[
            "cluster.mysql",
            "group.api",
            "group.web",
        ]]))
        .unwrap();

        assert_eq!(tree.starting_roots(), vec![id("cluster.mysql"), id("cluster.redis")]);
        assert!(tree.has_dependents(&id("cluster.mysql")));
        assert_eq!(tree.dependents_of(&id("cluster.mysql")), vec![id("group.api")]);
        assert_eq!(tree.dependencies_of(&id("group.web")), vec![id("group.api")]);
        assert!(!tree.has_dependents(&id("group.web")));
    }

    #[test]
    fn dependents_follow_definition_order() {
        let tree = DependencyTree::from_children(&children(&[
            &["cluster.mysql", "group.api"],
            &["cluster.mysql", "group.web"],
        ]))
        .unwrap();
        assert_eq!(
            tree.dependents_of(&id("cluster.mysql")),
            vec![id("group.web"), id("group.api")]
        );
    }

    #[test]
    fn cycle_is_rejected() {
        let err = DependencyTree::from_children(&children(&[
            &["group.web", "group.api"],
            &["group.api", "group.web"],
        ]))
        .unwrap_err();
        match err {
            OrchestrationError::DependencyCycle(cycle) => {
                assert!(cycle.contains(&id("group.web")));
                assert!(cycle.contains(&id("group.api")));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn unknown_reference_is_inconsistent_topology() {
        let err = DependencyTree::from_children(&children(&[&["group.ghost", "group.web"]]))
            .unwrap_err();
        assert!(matches!(err, OrchestrationError::InconsistentTopology(_)));
    }

    #[test]
    fn scaling_siblings_exclude_self() {
        let tree = ScalingDependencyTree::from_children(&children(&[]));
        assert!(tree.contains(&id("group.web")));
        assert!(!tree.contains(&id("cluster.mysql")));
        assert_eq!(tree.siblings_of(&id("group.web")), vec![id("group.api")]);
        assert!(tree.siblings_of(&id("cluster.redis")).is_empty());
    }
}
