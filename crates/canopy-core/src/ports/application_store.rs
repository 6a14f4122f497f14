//! ApplicationStore port - スナップショットの永続化先
//!
//! ロックは ApplicationHolder 側が持つので、ここは純粋な保存 / 削除だけです。

use async_trait::async_trait;

use crate::domain::{Application, ApplicationId, StoreError};

/// ApplicationStore はアプリケーション定義とインスタンス状態を永続化する
///
/// # 設計原則
/// - 呼び出しは必ず排他ロック（ApplicationHolder::write）の内側
/// - 同じ id への persist は上書き（last-writer-wins）
#[async_trait]
pub trait ApplicationStore: Send + Sync {
    /// 起動時にスナップショットを復元する
    async fn load_all(&self) -> Result<Vec<Application>, StoreError>;

    async fn persist(&self, app: &Application) -> Result<(), StoreError>;

    async fn remove(&self, id: &ApplicationId) -> Result<(), StoreError>;
}
