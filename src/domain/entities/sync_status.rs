use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// UI層が購読する集約ステータス。キューと接続状態から常に再計算され、
/// それ自体は永続化されない。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SyncStatusSnapshot {
    pub is_online: bool,
    pub is_syncing: bool,
    pub pending_actions: usize,
    pub last_sync_time: Option<DateTime<Utc>>,
    /// 実行中サイクル内の進捗 (0-100)
    pub sync_progress: u8,
    /// 直近の恒久失敗メッセージ（上限付き、新しいものが末尾）
    pub errors: Vec<String>,
}

impl Default for SyncStatusSnapshot {
    fn default() -> Self {
        Self {
            is_online: false,
            is_syncing: false,
            pending_actions: 0,
            last_sync_time: None,
            sync_progress: 0,
            errors: Vec::new(),
        }
    }
}
