//! Implementations - 開発・テスト用のポート実装
//!
//! 全てプロセス内（InMemory）で完結します。本番の永続化やメッセージブローカは
//! 同じ trait を別クレートで実装する想定です。

pub mod cloud_controller;
pub mod event_sinks;
pub mod inmem_policy;
pub mod inmem_store;
pub mod inmem_topology;

pub use self::cloud_controller::{NoopCloudController, RecordingCloudController};
pub use self::event_sinks::{BroadcastEventSink, RecordingEventSink};
pub use self::inmem_policy::InMemoryPolicyStore;
pub use self::inmem_store::InMemoryApplicationStore;
pub use self::inmem_topology::InMemoryTopology;
