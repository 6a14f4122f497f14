//! canopy-core
//!
//! Lifecycle orchestration for composite applications: groups and clusters
//! arranged in a tree, started in dependency order and torn down bottom-up.
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（ids, status, instance, application, dependency, policy, events, errors, commands）
//! - **ports**: 抽象化レイヤー（ApplicationStore, PolicyStore, EventSink, CloudController, TopologyView, IdGenerator, Clock）
//! - **placement**: パーティション選択アルゴリズム（round-robin, one-after-another）
//! - **monitor**: Application / Group / Cluster モニタの階層とステータス連鎖
//! - **app**: ApplicationBuilder, Orchestrator, OrchestratorBuilder, スナップショット
//! - **impls**: 実装（InMemory ストアなど開発用）
//! - **config**: TOML の実行時設定

pub mod app;
pub mod config;
pub mod domain;
pub mod impls;
pub mod monitor;
pub mod placement;
pub mod ports;

pub use app::{ApplicationBuilder, Orchestrator, OrchestratorBuilder};
pub use config::OrchestratorConfig;
