//! EventSink の実装
//!
//! - BroadcastEventSink: tokio broadcast で購読者へ配る。購読者がいなければ捨てる
//! - RecordingEventSink: 公開順に記録する

use std::sync::{Mutex, PoisonError};
use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::domain::LifecycleEvent;
use crate::ports::EventSink;

pub struct BroadcastEventSink {
    sender: broadcast::Sender<LifecycleEvent>,
}

impl BroadcastEventSink {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.sender.subscribe()
    }
}

impl EventSink for BroadcastEventSink {
    fn publish(&self, event: LifecycleEvent) {
        let name = event.name();
        // 購読者がいないときの送信エラーは無視する（fire-and-forget）
        match self.sender.send(event) {
            Ok(receivers) => info!(event = name, receivers, "published lifecycle event"),
            Err(_) => debug!(event = name, "no subscribers for lifecycle event"),
        }
    }
}

#[derive(Default)]
pub struct RecordingEventSink {
    events: Mutex<Vec<LifecycleEvent>>,
}

impl RecordingEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<LifecycleEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// 名前（`LifecycleEvent::name`）でフィルタした件数
    pub fn count(&self, name: &str) -> usize {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|e| e.name() == name)
            .count()
    }

    pub fn clear(&self) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

impl EventSink for RecordingEventSink {
    fn publish(&self, event: LifecycleEvent) {
        debug!(event = event.name(), "recorded lifecycle event");
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ApplicationId;

    #[tokio::test]
    async fn broadcast_reaches_subscribers() {
        let sink = BroadcastEventSink::new(8);
        let mut rx = sink.subscribe();

        sink.publish(LifecycleEvent::ApplicationCreated {
            application_id: ApplicationId::new("app1"),
        });

        let event = rx.recv().await.unwrap();
        assert_eq!(event.name(), "application_created");
    }

    #[test]
    fn broadcast_without_subscribers_does_not_fail() {
        let sink = BroadcastEventSink::new(8);
        sink.publish(LifecycleEvent::ApplicationCreated {
            application_id: ApplicationId::new("app1"),
        });
    }

    #[test]
    fn recording_sink_counts_by_name() {
        let sink = RecordingEventSink::new();
        sink.publish(LifecycleEvent::ApplicationCreated {
            application_id: ApplicationId::new("app1"),
        });
        assert_eq!(sink.count("application_created"), 1);
        sink.clear();
        assert!(sink.events().is_empty());
    }
}
