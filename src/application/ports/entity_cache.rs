use crate::domain::value_objects::{EntityId, EntityType};
use async_trait::async_trait;
use serde_json::Value;

/// ローカルに保持するエンティティ表現のキャッシュ境界。
/// 同期成功やコンフリクト解決でサーバ側の最新データを反映する。
#[async_trait]
pub trait EntityCache: Send + Sync {
    async fn apply(&self, entity_type: &EntityType, entity_id: &EntityId, data: Value);
    async fn get(&self, entity_type: &EntityType, entity_id: &EntityId) -> Option<Value>;
    async fn invalidate(&self, entity_type: &EntityType, entity_id: &EntityId);
}
