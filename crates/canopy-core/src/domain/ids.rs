//! Domain identifiers (strongly-typed IDs).
//!
//! # Phantom type パターン
//! `Id<T>` で共通実装を提供し、`T` はマーカー型（PhantomData）として
//! コンパイル時の型安全性だけを担います。ApplicationId と GroupId は混同できません。
//!
//! ID の値は外部（デプロイ定義やトポロジ）から来るので文字列で保持します。
//! スケールアウトで新しく作る instance id だけは `IdGenerator` が ULID から生成します。

use serde::{Deserialize, Serialize};
use std::fmt;
use std::marker::PhantomData;
use std::str::FromStr;

/// IdMarker は各 ID 型のマーカー trait
///
/// ログやエラーメッセージで使う種別名（"application", "group" など）を提供します。
pub trait IdMarker: Send + Sync + 'static {
    /// 種別名（例: "application", "instance"）
    fn kind() -> &'static str;
}

/// ジェネリック ID 型
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Id<T: IdMarker> {
    value: String,
    #[serde(skip)]
    _marker: PhantomData<T>,
}

impl<T: IdMarker> Id<T> {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            _marker: PhantomData,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.value
    }

    /// 種別名（エラーメッセージ用）
    pub fn kind(&self) -> &'static str {
        T::kind()
    }
}

impl<T: IdMarker> From<&str> for Id<T> {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl<T: IdMarker> From<String> for Id<T> {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl<T: IdMarker> fmt::Display for Id<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.value)
    }
}

// ========================================
// マーカー型の定義
// ========================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ApplicationMarker {}

impl IdMarker for ApplicationMarker {
    fn kind() -> &'static str {
        "application"
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum GroupMarker {}

impl IdMarker for GroupMarker {
    fn kind() -> &'static str {
        "group"
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ClusterMarker {}

impl IdMarker for ClusterMarker {
    fn kind() -> &'static str {
        "cluster"
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum InstanceMarker {}

impl IdMarker for InstanceMarker {
    fn kind() -> &'static str {
        "instance"
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum NetworkPartitionMarker {}

impl IdMarker for NetworkPartitionMarker {
    fn kind() -> &'static str {
        "network-partition"
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PartitionMarker {}

impl IdMarker for PartitionMarker {
    fn kind() -> &'static str {
        "partition"
    }
}

// ========================================
// Type Alias
// ========================================

/// Identifier of a deployed application.
pub type ApplicationId = Id<ApplicationMarker>;

/// Alias of a group, unique within its application.
pub type GroupId = Id<GroupMarker>;

/// Alias of a cluster, unique within its application.
pub type ClusterId = Id<ClusterMarker>;

/// Identifier of one running instance of an application, group or cluster.
pub type InstanceId = Id<InstanceMarker>;

pub type NetworkPartitionId = Id<NetworkPartitionMarker>;

pub type PartitionId = Id<PartitionMarker>;

/// ComponentId はモニタツリー上のノードを指す
///
/// 文字列表現は `app.<id>` / `group.<alias>` / `cluster.<alias>` で、
/// startup order や scaling dependents の定義でもこの形式を使います。
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ComponentId {
    Application(ApplicationId),
    Group(GroupId),
    Cluster(ClusterId),
}

impl ComponentId {
    pub fn is_group(&self) -> bool {
        matches!(self, ComponentId::Group(_))
    }

    pub fn is_cluster(&self) -> bool {
        matches!(self, ComponentId::Cluster(_))
    }
}

impl From<GroupId> for ComponentId {
    fn from(id: GroupId) -> Self {
        ComponentId::Group(id)
    }
}

impl From<ClusterId> for ComponentId {
    fn from(id: ClusterId) -> Self {
        ComponentId::Cluster(id)
    }
}

impl From<ApplicationId> for ComponentId {
    fn from(id: ApplicationId) -> Self {
        ComponentId::Application(id)
    }
}

impl fmt::Display for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ComponentId::Application(id) => write!(f, "app.{id}"),
            ComponentId::Group(id) => write!(f, "group.{id}"),
            ComponentId::Cluster(id) => write!(f, "cluster.{id}"),
        }
    }
}

/// ComponentIdParseError は `ComponentId` の文字列パース失敗
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid component reference '{0}', expected app.<id>, group.<alias> or cluster.<alias>")]
pub struct ComponentIdParseError(pub String);

impl FromStr for ComponentId {
    type Err = ComponentIdParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let Some((kind, alias)) = s.split_once('.') else {
            return Err(ComponentIdParseError(s.to_string()));
        };
        if alias.is_empty() {
            return Err(ComponentIdParseError(s.to_string()));
        }
        match kind {
            "app" => Ok(ComponentId::Application(ApplicationId::new(alias))),
            "group" => Ok(ComponentId::Group(GroupId::new(alias))),
            "cluster" | "cartridge" => Ok(ComponentId::Cluster(ClusterId::new(alias))),
            _ => Err(ComponentIdParseError(s.to_string())),
        }
    }
}

impl TryFrom<String> for ComponentId {
    type Error = ComponentIdParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ComponentId> for String {
    fn from(id: ComponentId) -> Self {
        id.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn ids_display_raw_value() {
        let app = ApplicationId::new("app1");
        let inst = InstanceId::from("app1-1");

        assert_eq!(app.to_string(), "app1");
        assert_eq!(inst.as_str(), "app1-1");
        assert_eq!(app.kind(), "application");
        assert_eq!(inst.kind(), "instance");
    }

    #[test]
    fn ids_serialize_as_plain_strings() {
        let id = GroupId::new("db-tier");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"db-tier\"");

        let back: GroupId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }

    #[rstest]
    #[case::application("app.shop", ComponentId::Application(ApplicationId::new("shop")))]
    #[case::group("group.web", ComponentId::Group(GroupId::new("web")))]
    #[case::cluster("cluster.php", ComponentId::Cluster(ClusterId::new("php")))]
    #[case::legacy_cartridge("cartridge.mysql", ComponentId::Cluster(ClusterId::new("mysql")))]
    fn component_id_parses(#[case] raw: &str, #[case] expected: ComponentId) {
        assert_eq!(raw.parse::<ComponentId>().unwrap(), expected);
    }

    #[rstest]
    #[case::no_dot("web")]
    #[case::empty_alias("group.")]
    #[case::unknown_kind("service.web")]
    fn component_id_rejects_malformed(#[case] raw: &str) {
        assert!(raw.parse::<ComponentId>().is_err());
    }

    #[test]
    fn component_id_round_trips_through_json() {
        let id = ComponentId::Group(GroupId::new("web"));
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"group.web\"");
        assert_eq!(serde_json::from_str::<ComponentId>(&json).unwrap(), id);
    }
}
