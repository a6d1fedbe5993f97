use crate::domain::entities::{SyncConflict, SyncCycleReport};
use crate::domain::value_objects::{ActionId, ActionStatus};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// エンジンが発行するライフサイクルイベント。
///
/// 配信は at-least-once・ベストエフォート順序。遅延した購読者は
/// 進捗イベントを取りこぼすことがある。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SyncEvent {
    ActionEnqueued { action_id: ActionId },
    ActionUpdated { action_id: ActionId, status: ActionStatus },
    ActionRemoved { action_id: ActionId },
    CycleStarted { batch_size: usize },
    CycleProgress { percent: u8 },
    ActionSynced { action_id: ActionId },
    ActionFailed { action_id: ActionId, error: String },
    ConflictDetected { conflict: SyncConflict },
    CycleCompleted { report: SyncCycleReport },
    NetworkStatusChanged { online: bool },
}

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// broadcastチャネルを包んだイベントバス。購読者ゼロでの送信は黙って捨てる。
#[derive(Debug)]
pub struct SyncEventBus {
    sender: broadcast::Sender<SyncEvent>,
}

impl SyncEventBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.sender.subscribe()
    }

    pub fn emit(&self, event: SyncEvent) {
        // 送信失敗は「購読者がいない」ことしか意味しない
        let _ = self.sender.send(event);
    }
}

impl Default for SyncEventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscriber_receives_emitted_events() {
        let bus = SyncEventBus::new();
        let mut rx = bus.subscribe();

        bus.emit(SyncEvent::CycleStarted { batch_size: 3 });
        bus.emit(SyncEvent::CycleProgress { percent: 33 });

        assert_eq!(rx.recv().await.unwrap(), SyncEvent::CycleStarted { batch_size: 3 });
        assert_eq!(rx.recv().await.unwrap(), SyncEvent::CycleProgress { percent: 33 });
    }

    #[test]
    fn emit_without_subscribers_is_silent() {
        let bus = SyncEventBus::new();
        bus.emit(SyncEvent::CycleProgress { percent: 50 });
    }
}
