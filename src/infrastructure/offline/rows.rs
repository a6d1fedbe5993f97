use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct OfflineActionRow {
    pub seq: i64,
    pub action_id: String,
    pub kind: String,
    pub entity_type: String,
    pub entity_id: String,
    pub payload: String,
    pub priority: String,
    pub status: String,
    pub retry_count: i64,
    pub max_retries: i64,
    pub created_at: i64,
    pub last_error: Option<String>,
}
