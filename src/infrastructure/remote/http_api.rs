use crate::application::ports::{RemoteApi, RemoteApiError, RemoteResponse};
use crate::domain::value_objects::{ActionId, ActionPayload, EntityId, EntityType};
use crate::shared::config::RemoteConfig;
use crate::shared::error::AppError;
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;

const IDEMPOTENCY_HEADER: &str = "Idempotency-Key";
const FORCE_HEADER: &str = "X-Force-Overwrite";

/// Ledgerline バックエンドの REST API を叩く RemoteApi 実装。
///
/// エンティティ種別ごとに `/api/v1/{entity}` 系のルートへ書き込み、
/// アクションIDを Idempotency-Key ヘッダで渡す。
pub struct HttpRemoteApi {
    base_url: String,
    client: reqwest::Client,
}

impl HttpRemoteApi {
    pub fn new(config: &RemoteConfig) -> Result<Self, AppError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| AppError::Configuration(e.to_string()))?;

        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    fn collection_url(&self, entity_type: &EntityType) -> String {
        format!("{}/api/v1/{}", self.base_url, entity_type)
    }

    fn entity_url(&self, entity_type: &EntityType, entity_id: &EntityId) -> String {
        format!("{}/api/v1/{}/{}", self.base_url, entity_type, entity_id)
    }

    async fn dispatch(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<RemoteResponse, RemoteApiError> {
        let response = request.send().await.map_err(map_transport_error)?;
        let status = response.status();

        if status.is_success() {
            let data = response.json::<Value>().await.ok();
            return Ok(RemoteResponse { data });
        }

        let body = response
            .text()
            .await
            .unwrap_or_else(|_| status.to_string());

        match status.as_u16() {
            409 => Err(RemoteApiError::Conflict {
                server_data: extract_conflict_data(&body),
            }),
            400..=499 => Err(RemoteApiError::Validation(format!("{status}: {body}"))),
            _ => Err(RemoteApiError::Network(format!("{status}: {body}"))),
        }
    }
}

fn map_transport_error(err: reqwest::Error) -> RemoteApiError {
    if err.is_timeout() {
        RemoteApiError::Timeout(err.to_string())
    } else {
        RemoteApiError::Network(err.to_string())
    }
}

/// 409 応答のボディからサーバ側データを取り出す。`data` フィールドが
/// あればそれを、なければボディ全体を使う。JSONでなければ文字列のまま。
fn extract_conflict_data(body: &str) -> Value {
    match serde_json::from_str::<Value>(body) {
        Ok(parsed) => parsed.get("data").cloned().unwrap_or(parsed),
        Err(_) => Value::String(body.to_string()),
    }
}

#[async_trait]
impl RemoteApi for HttpRemoteApi {
    async fn create(
        &self,
        entity_type: &EntityType,
        payload: &ActionPayload,
        idempotency_key: &ActionId,
        force: bool,
    ) -> Result<RemoteResponse, RemoteApiError> {
        let mut request = self
            .client
            .post(self.collection_url(entity_type))
            .header(IDEMPOTENCY_HEADER, idempotency_key.as_str())
            .json(payload.as_json());
        if force {
            request = request.header(FORCE_HEADER, "true");
        }
        self.dispatch(request).await
    }

    async fn update(
        &self,
        entity_type: &EntityType,
        entity_id: &EntityId,
        payload: &ActionPayload,
        idempotency_key: &ActionId,
        force: bool,
    ) -> Result<RemoteResponse, RemoteApiError> {
        let mut request = self
            .client
            .put(self.entity_url(entity_type, entity_id))
            .header(IDEMPOTENCY_HEADER, idempotency_key.as_str())
            .json(payload.as_json());
        if force {
            request = request.header(FORCE_HEADER, "true");
        }
        self.dispatch(request).await
    }

    async fn delete(
        &self,
        entity_type: &EntityType,
        entity_id: &EntityId,
        idempotency_key: &ActionId,
    ) -> Result<RemoteResponse, RemoteApiError> {
        let request = self
            .client
            .delete(self.entity_url(entity_type, entity_id))
            .header(IDEMPOTENCY_HEADER, idempotency_key.as_str());
        self.dispatch(request).await
    }
}
