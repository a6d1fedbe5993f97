use crate::application::ports::EntityCache;
use crate::domain::value_objects::{EntityId, EntityType};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

#[derive(Clone)]
struct CacheEntry {
    data: Value,
    expires_at: Instant,
}

/// 同期結果を反映するインメモリのエンティティキャッシュ。
/// UI 層はここから再調停済みの表現を読む。
pub struct MemoryEntityCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
    ttl: Duration,
}

impl MemoryEntityCache {
    /// 既定TTLは1時間
    pub fn new() -> Self {
        Self::with_ttl(Duration::from_secs(3600))
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    fn key(entity_type: &EntityType, entity_id: &EntityId) -> String {
        format!("{entity_type}:{entity_id}")
    }

    /// 期限切れエントリを取り除く
    pub async fn cleanup_expired(&self) {
        let mut entries = self.entries.write().await;
        let now = Instant::now();
        entries.retain(|_, entry| entry.expires_at > now);
    }

    pub async fn size(&self) -> usize {
        self.entries.read().await.len()
    }
}

impl Default for MemoryEntityCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EntityCache for MemoryEntityCache {
    async fn apply(&self, entity_type: &EntityType, entity_id: &EntityId, data: Value) {
        let entry = CacheEntry {
            data,
            expires_at: Instant::now() + self.ttl,
        };
        let mut entries = self.entries.write().await;
        entries.insert(Self::key(entity_type, entity_id), entry);
    }

    async fn get(&self, entity_type: &EntityType, entity_id: &EntityId) -> Option<Value> {
        let entries = self.entries.read().await;
        entries
            .get(&Self::key(entity_type, entity_id))
            .filter(|entry| entry.expires_at > Instant::now())
            .map(|entry| entry.data.clone())
    }

    async fn invalidate(&self, entity_type: &EntityType, entity_id: &EntityId) {
        let mut entries = self.entries.write().await;
        entries.remove(&Self::key(entity_type, entity_id));
    }
}
