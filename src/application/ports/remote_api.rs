use crate::domain::value_objects::{ActionId, ActionPayload, EntityId, EntityType};
use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

/// リモート呼び出しの失敗分類。Sync Executor はこれを同期結果へ写像する。
#[derive(Debug, Error)]
pub enum RemoteApiError {
    #[error("network error: {0}")]
    Network(String),

    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("rejected by server: {0}")]
    Validation(String),

    #[error("conflicting server state")]
    Conflict { server_data: Value },
}

/// リモート呼び出しの成功レスポンス。`data` にはサーバ側の最新表現が入る
/// （CREATE ではサーバ採番のIDを含む）。
#[derive(Debug, Clone, Default)]
pub struct RemoteResponse {
    pub data: Option<Value>,
}

/// エンティティ種別ごとのリモートAPI境界。
///
/// `idempotency_key` にはアクション自身のIDを渡す。サーバ側がこのキーで
/// 再送を重複適用しないことは外部要件であり、エンジンは強制しない。
#[async_trait]
pub trait RemoteApi: Send + Sync {
    async fn create(
        &self,
        entity_type: &EntityType,
        payload: &ActionPayload,
        idempotency_key: &ActionId,
        force: bool,
    ) -> Result<RemoteResponse, RemoteApiError>;

    async fn update(
        &self,
        entity_type: &EntityType,
        entity_id: &EntityId,
        payload: &ActionPayload,
        idempotency_key: &ActionId,
        force: bool,
    ) -> Result<RemoteResponse, RemoteApiError>;

    async fn delete(
        &self,
        entity_type: &EntityType,
        entity_id: &EntityId,
        idempotency_key: &ActionId,
    ) -> Result<RemoteResponse, RemoteApiError>;
}
