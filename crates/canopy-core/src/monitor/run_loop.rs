//! MonitorLoop - モニタごとの定期評価ループ
//!
//! # フロー
//! 1. 1 周ごとに destroyed フラグを確認（立っていたら終了）
//! 2. destroyed の変更 OR 次の tick を待つ
//!
//! モニタの破棄（`destroy` または Drop）でフラグが立ち、次の周回で止まります。

use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use crate::domain::ComponentId;

#[derive(Debug)]
pub struct MonitorLoop {
    destroyed: watch::Sender<bool>,
    handle: Option<JoinHandle<()>>,
}

impl MonitorLoop {
    /// 現在の tokio ランタイム上でループを起動する（ランタイム外なら None）
    pub fn spawn(component: ComponentId, interval: Duration) -> Option<Self> {
        let runtime = tokio::runtime::Handle::try_current().ok()?;
        let (destroyed, destroyed_rx) = watch::channel(false);
        let handle = runtime.spawn(run(component, interval, destroyed_rx));
        Some(Self {
            destroyed,
            handle: Some(handle),
        })
    }

    pub fn destroy(&self) {
        // 受信側が既に終わっていても構わない
        let _ = self.destroyed.send(true);
    }

    pub fn is_destroyed(&self) -> bool {
        *self.destroyed.borrow()
    }

    /// フラグを立ててループの終了を待つ
    pub async fn shutdown(mut self) {
        self.destroy();
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

impl Drop for MonitorLoop {
    fn drop(&mut self) {
        self.destroy();
    }
}

async fn run(component: ComponentId, interval: Duration, mut destroyed: watch::Receiver<bool>) {
    let mut ticker = tokio::time::interval(interval);
    debug!(monitor = %component, ?interval, "monitor loop started");

    loop {
        if *destroyed.borrow() {
            break;
        }

        tokio::select! {
            changed = destroyed.changed() => {
                if changed.is_err() {
                    break;
                }
                // 変更が入ったら次のループで判定
                continue;
            }
            _ = ticker.tick() => {
                trace!(monitor = %component, "monitor tick");
            }
        }
    }

    debug!(monitor = %component, "monitor loop stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::GroupId;

    #[tokio::test]
    async fn stops_after_destroy() {
        let run_loop = MonitorLoop::spawn(
            ComponentId::Group(GroupId::new("web")),
            Duration::from_millis(5),
        )
        .unwrap();
        assert!(!run_loop.is_destroyed());

        tokio::time::sleep(Duration::from_millis(20)).await;
        tokio::time::timeout(Duration::from_secs(1), run_loop.shutdown())
            .await
            .expect("loop should stop once destroyed");
    }

    #[test]
    fn does_not_spawn_outside_a_runtime() {
        assert!(MonitorLoop::spawn(
            ComponentId::Group(GroupId::new("web")),
            Duration::from_secs(60)
        )
        .is_none());
    }
}
