use async_trait::async_trait;
use tokio::sync::watch;

/// 接続状態の観測境界。現在値の問い合わせと遷移の購読のみを提供し、
/// キュー状態には一切触れない。
#[async_trait]
pub trait NetworkMonitor: Send + Sync {
    async fn is_online(&self) -> bool;

    /// 接続状態の変化を通知する watch チャネル。受信側は最新値のみを見る。
    fn watch(&self) -> watch::Receiver<bool>;
}
