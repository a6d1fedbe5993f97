use crate::domain::entities::SyncStatusSnapshot;
use chrono::Utc;
use tokio::sync::RwLock;

/// 集約ステータスの保持と、サイクルの single-flight ガード。
///
/// `try_begin_cycle` が false を返した呼び出し側はサイクルを開始しては
/// ならない。ガードの解放は `finish_cycle` のみが行う。
pub struct StatusTracker {
    status: RwLock<SyncStatusSnapshot>,
    error_history_limit: usize,
}

impl StatusTracker {
    pub fn new(error_history_limit: usize) -> Self {
        Self {
            status: RwLock::new(SyncStatusSnapshot::default()),
            error_history_limit,
        }
    }

    pub async fn snapshot(&self) -> SyncStatusSnapshot {
        self.status.read().await.clone()
    }

    pub async fn is_syncing(&self) -> bool {
        self.status.read().await.is_syncing
    }

    pub async fn set_online(&self, online: bool) {
        let mut status = self.status.write().await;
        status.is_online = online;
    }

    pub async fn set_pending(&self, count: usize) {
        let mut status = self.status.write().await;
        status.pending_actions = count;
    }

    /// サイクル開始を試みる。既に実行中なら false。
    pub async fn try_begin_cycle(&self) -> bool {
        let mut status = self.status.write().await;
        if status.is_syncing {
            return false;
        }
        status.is_syncing = true;
        status.sync_progress = 0;
        true
    }

    pub async fn set_progress(&self, percent: u8) {
        let mut status = self.status.write().await;
        status.sync_progress = percent.min(100);
    }

    pub async fn finish_cycle(&self, pending: usize) {
        let mut status = self.status.write().await;
        status.is_syncing = false;
        status.sync_progress = 100;
        status.pending_actions = pending;
        status.last_sync_time = Some(Utc::now());
    }

    /// 恒久失敗のメッセージを履歴へ積む。上限を超えた分は古い方から捨てる。
    pub async fn push_error(&self, message: String) {
        let mut status = self.status.write().await;
        status.errors.push(message);
        let overflow = status.errors.len().saturating_sub(self.error_history_limit);
        if overflow > 0 {
            status.errors.drain(..overflow);
        }
    }
}
