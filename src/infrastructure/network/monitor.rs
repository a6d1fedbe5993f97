use crate::application::ports::NetworkMonitor;
use async_trait::async_trait;
use tokio::sync::watch;

/// ホスト側から接続状態を流し込む NetworkMonitor 実装。
///
/// プラットフォーム固有の接続検知（OSのリスナー、ヘルスチェック等）を持つ
/// 側が `set_online` を呼ぶ。テストからも同じ口で駆動できる。
pub struct ManualNetworkMonitor {
    sender: watch::Sender<bool>,
}

impl ManualNetworkMonitor {
    pub fn new(initial: bool) -> Self {
        let (sender, _) = watch::channel(initial);
        Self { sender }
    }

    pub fn set_online(&self, online: bool) {
        // 値が変わらない send も watch 的には無害
        let _ = self.sender.send(online);
    }
}

#[async_trait]
impl NetworkMonitor for ManualNetworkMonitor {
    async fn is_online(&self) -> bool {
        *self.sender.borrow()
    }

    fn watch(&self) -> watch::Receiver<bool> {
        self.sender.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn watch_observes_transitions() {
        let monitor = ManualNetworkMonitor::new(false);
        let mut rx = monitor.watch();

        assert!(!monitor.is_online().await);

        monitor.set_online(true);
        rx.changed().await.unwrap();
        assert!(*rx.borrow());
        assert!(monitor.is_online().await);
    }
}
