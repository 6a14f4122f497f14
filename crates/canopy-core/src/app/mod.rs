//! Application layer - ライフサイクルの更新窓口とオーケストレータ
//!
//! # 構成
//! - `ApplicationBuilder`: スナップショットへの全ての書き込みを担う唯一のゲートウェイ
//! - `Orchestrator`: 起動・クラスタ報告・スケーリング要求の受付と状態参照
//! - `OrchestratorBuilder`: ポートを組み立てて Orchestrator を作る
//! - `ApplicationHolder`: スナップショットの RwLock と永続化

pub mod application_builder;
pub mod builder;
pub(crate) mod engine;
pub mod holder;
pub mod orchestrator;
pub mod status;

pub use application_builder::ApplicationBuilder;
pub use builder::{BuildError, OrchestratorBuilder};
pub use holder::{ApplicationHolder, ApplicationsWriteGuard};
pub use orchestrator::Orchestrator;
pub use status::{ApplicationStatusView, GroupStatusView, InstanceView};
