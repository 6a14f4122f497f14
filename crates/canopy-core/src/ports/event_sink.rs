//! EventSink port - ステータス変更通知の公開
//!
//! # 実装
//! - BroadcastEventSink: tokio broadcast チャネルで購読者へ配る
//! - RecordingEventSink: 公開されたイベントを記録する（テスト / デモ用）

use crate::domain::LifecycleEvent;

/// EventSink はライフサイクルイベントを fire-and-forget で公開する
///
/// 失敗しても呼び出し側には返さない（購読者がいなくても処理は続く）。
/// スナップショットのロックを解放した後に呼ばれる。
pub trait EventSink: Send + Sync {
    fn publish(&self, event: LifecycleEvent);
}
