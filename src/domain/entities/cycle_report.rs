use serde::{Deserialize, Serialize};

/// 1回の同期サイクルの結果集計。
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SyncCycleReport {
    pub attempted: u32,
    pub synced: u32,
    pub failed: u32,
    pub conflicts: u32,
    pub pending_after: usize,
}
