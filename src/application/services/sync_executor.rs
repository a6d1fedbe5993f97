use crate::application::ports::{RemoteApi, RemoteApiError};
use crate::domain::entities::OfflineAction;
use crate::domain::value_objects::ActionKind;
use serde_json::Value;
use std::sync::Arc;

/// 1アクション分のリモート呼び出し結果の分類。
#[derive(Debug, Clone, PartialEq)]
pub enum SyncOutcome {
    /// 成功。サーバ側の最新表現が返ることがある
    Success(Option<Value>),
    /// サーバがコンフリクトを報告した。Conflict Resolver へ回す
    Conflict(Value),
    /// 一時的な失敗。リトライ1回を消費する
    Retryable(String),
    /// リトライしても成功しない失敗
    Permanent(String),
}

/// アクション種別をリモートAPI境界の操作へ写像し、結果を分類する。
/// アクションIDを冪等性キーとして渡すため、タイムアウト後の再送が
/// 二重適用になることはない（サーバ側要件）。
pub struct SyncExecutor {
    remote: Arc<dyn RemoteApi>,
}

impl SyncExecutor {
    pub fn new(remote: Arc<dyn RemoteApi>) -> Self {
        Self { remote }
    }

    pub async fn execute(&self, action: &OfflineAction, force: bool) -> SyncOutcome {
        let result = match action.kind {
            ActionKind::Create => {
                self.remote
                    .create(&action.entity_type, &action.payload, &action.id, force)
                    .await
            }
            ActionKind::Update => {
                self.remote
                    .update(
                        &action.entity_type,
                        &action.entity_id,
                        &action.payload,
                        &action.id,
                        force,
                    )
                    .await
            }
            ActionKind::Delete => {
                self.remote
                    .delete(&action.entity_type, &action.entity_id, &action.id)
                    .await
            }
        };

        match result {
            Ok(response) => SyncOutcome::Success(response.data),
            Err(RemoteApiError::Conflict { server_data }) => SyncOutcome::Conflict(server_data),
            Err(err @ RemoteApiError::Network(_)) | Err(err @ RemoteApiError::Timeout(_)) => {
                SyncOutcome::Retryable(err.to_string())
            }
            Err(RemoteApiError::Validation(reason)) => SyncOutcome::Permanent(reason),
        }
    }
}
