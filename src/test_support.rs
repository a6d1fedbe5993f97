//! テストから利用する軽量実装。結合テスト（`tests/`）からも参照するため
//! 通常モジュールとして公開している。

use crate::application::ports::{ActionStore, RemoteApi, RemoteApiError, RemoteResponse};
use crate::domain::entities::OfflineAction;
use crate::domain::value_objects::{ActionId, ActionPayload, EntityId, EntityType};
use crate::shared::error::AppError;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

/// 失敗注入つきのインメモリ ActionStore。
#[derive(Default)]
pub struct MemoryActionStore {
    actions: Mutex<Vec<OfflineAction>>,
    fail_next: AtomicBool,
}

impl MemoryActionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 次の書き込み1回を失敗させる
    pub fn fail_next_write(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }

    pub fn stored(&self) -> Vec<OfflineAction> {
        self.actions.lock().unwrap().clone()
    }

    fn check_failure(&self) -> Result<(), AppError> {
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(AppError::Persistence("injected failure".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl ActionStore for MemoryActionStore {
    async fn load_all(&self) -> Result<Vec<OfflineAction>, AppError> {
        Ok(self.actions.lock().unwrap().clone())
    }

    async fn save_all(&self, actions: &[OfflineAction]) -> Result<(), AppError> {
        self.check_failure()?;
        *self.actions.lock().unwrap() = actions.to_vec();
        Ok(())
    }

    async fn upsert(&self, action: &OfflineAction) -> Result<(), AppError> {
        self.check_failure()?;
        let mut actions = self.actions.lock().unwrap();
        if let Some(existing) = actions.iter_mut().find(|a| a.id == action.id) {
            *existing = action.clone();
        } else {
            actions.push(action.clone());
        }
        Ok(())
    }

    async fn remove(&self, id: &ActionId) -> Result<(), AppError> {
        self.check_failure()?;
        self.actions.lock().unwrap().retain(|a| &a.id != id);
        Ok(())
    }

    async fn clear(&self) -> Result<(), AppError> {
        self.check_failure()?;
        self.actions.lock().unwrap().clear();
        Ok(())
    }
}

/// スクリプト可能なリモート応答。
#[derive(Debug, Clone)]
pub enum ScriptedOutcome {
    Success(Option<Value>),
    Network(String),
    Timeout(String),
    Validation(String),
    Conflict(Value),
}

impl ScriptedOutcome {
    fn into_result(self) -> Result<RemoteResponse, RemoteApiError> {
        match self {
            ScriptedOutcome::Success(data) => Ok(RemoteResponse { data }),
            ScriptedOutcome::Network(reason) => Err(RemoteApiError::Network(reason)),
            ScriptedOutcome::Timeout(reason) => Err(RemoteApiError::Timeout(reason)),
            ScriptedOutcome::Validation(reason) => Err(RemoteApiError::Validation(reason)),
            ScriptedOutcome::Conflict(server_data) => {
                Err(RemoteApiError::Conflict { server_data })
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCall {
    pub operation: String,
    pub entity_type: String,
    pub entity_id: Option<String>,
    pub idempotency_key: String,
    pub force: bool,
}

/// 呼び出しを記録し、スクリプトされた応答を順に返すリモートAPIモック。
/// スクリプトが尽きたら既定応答を返す。
pub struct MockRemoteApi {
    scripted: Mutex<VecDeque<ScriptedOutcome>>,
    default: Mutex<ScriptedOutcome>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl MockRemoteApi {
    pub fn new() -> Self {
        Self::always(ScriptedOutcome::Success(None))
    }

    pub fn always(default: ScriptedOutcome) -> Self {
        Self {
            scripted: Mutex::new(VecDeque::new()),
            default: Mutex::new(default),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn push(&self, outcome: ScriptedOutcome) {
        self.scripted.lock().unwrap().push_back(outcome);
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    fn next(&self, call: RecordedCall) -> Result<RemoteResponse, RemoteApiError> {
        self.calls.lock().unwrap().push(call);
        let scripted = self.scripted.lock().unwrap().pop_front();
        scripted
            .unwrap_or_else(|| self.default.lock().unwrap().clone())
            .into_result()
    }
}

impl Default for MockRemoteApi {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RemoteApi for MockRemoteApi {
    async fn create(
        &self,
        entity_type: &EntityType,
        _payload: &ActionPayload,
        idempotency_key: &ActionId,
        force: bool,
    ) -> Result<RemoteResponse, RemoteApiError> {
        self.next(RecordedCall {
            operation: "create".to_string(),
            entity_type: entity_type.to_string(),
            entity_id: None,
            idempotency_key: idempotency_key.to_string(),
            force,
        })
    }

    async fn update(
        &self,
        entity_type: &EntityType,
        entity_id: &EntityId,
        _payload: &ActionPayload,
        idempotency_key: &ActionId,
        force: bool,
    ) -> Result<RemoteResponse, RemoteApiError> {
        self.next(RecordedCall {
            operation: "update".to_string(),
            entity_type: entity_type.to_string(),
            entity_id: Some(entity_id.to_string()),
            idempotency_key: idempotency_key.to_string(),
            force,
        })
    }

    async fn delete(
        &self,
        entity_type: &EntityType,
        entity_id: &EntityId,
        idempotency_key: &ActionId,
    ) -> Result<RemoteResponse, RemoteApiError> {
        self.next(RecordedCall {
            operation: "delete".to_string(),
            entity_type: entity_type.to_string(),
            entity_id: Some(entity_id.to_string()),
            idempotency_key: idempotency_key.to_string(),
            force: false,
        })
    }
}
