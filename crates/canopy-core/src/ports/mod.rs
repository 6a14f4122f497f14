//! Ports - 抽象化レイヤー
//!
//! オーケストレーションのコアが外部システムに期待するインターフェースです。
//! 実装の詳細（レジストリの永続化、クラウドコントローラ、メッセージブローカ）は隠蔽します。
//!
//! # 設計原則
//! - スナップショット（Applications）の正本はプロセス内の ApplicationHolder
//! - 永続化は last-writer-wins（複数プロセス間の合意はしない）
//! - イベント公開は fire-and-forget

pub mod application_store;
pub mod clock;
pub mod cloud_controller;
pub mod event_sink;
pub mod id_generator;
pub mod policy_store;
pub mod topology;

pub use self::application_store::ApplicationStore;
pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::cloud_controller::{ApplicationClusterContext, CloudController};
pub use self::event_sink::EventSink;
pub use self::id_generator::{IdGenerator, UlidGenerator};
pub use self::policy_store::PolicyStore;
pub use self::topology::TopologyView;
