use crate::domain::value_objects::{ActionId, EntityId, EntityType};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// サーバが報告したコンフリクト。イベント経由でアプリケーション層へ渡る。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SyncConflict {
    pub action_id: ActionId,
    pub entity_type: EntityType,
    pub entity_id: EntityId,
    pub server_data: Value,
}
