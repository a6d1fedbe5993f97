use crate::domain::value_objects::{
    ActionId, ActionKind, ActionPayload, ActionStatus, EntityId, EntityType, Priority,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// キューに積む前のアクション。`ActionQueue::enqueue` が ID と連番を採番する。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ActionDraft {
    pub kind: ActionKind,
    pub entity_type: EntityType,
    pub entity_id: EntityId,
    pub payload: ActionPayload,
    pub priority: Priority,
    pub max_retries: Option<u32>,
}

impl ActionDraft {
    pub fn new(
        kind: ActionKind,
        entity_type: EntityType,
        entity_id: EntityId,
        payload: ActionPayload,
        priority: Priority,
    ) -> Self {
        Self {
            kind,
            entity_type,
            entity_id,
            payload,
            priority,
            max_retries: None,
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }
}

/// 永続化される単一のオフラインミューテーション。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OfflineAction {
    pub id: ActionId,
    pub kind: ActionKind,
    pub entity_type: EntityType,
    pub entity_id: EntityId,
    pub payload: ActionPayload,
    pub priority: Priority,
    /// エンキュー順の単調連番。同一エンティティのFIFOを厳密にする。
    pub seq: u64,
    pub created_at: DateTime<Utc>,
    pub retry_count: u32,
    pub max_retries: u32,
    pub status: ActionStatus,
    pub last_error: Option<String>,
}

impl OfflineAction {
    pub fn from_draft(draft: ActionDraft, seq: u64, default_max_retries: u32) -> Self {
        // ストアはミリ秒精度で保持するため、生成時点で丸めておく
        let now = Utc::now();
        let created_at = DateTime::from_timestamp_millis(now.timestamp_millis()).unwrap_or(now);
        Self {
            id: ActionId::generate(),
            kind: draft.kind,
            entity_type: draft.entity_type,
            entity_id: draft.entity_id,
            payload: draft.payload,
            priority: draft.priority,
            seq,
            created_at,
            retry_count: 0,
            max_retries: draft.max_retries.unwrap_or(default_max_retries),
            status: ActionStatus::Pending,
            last_error: None,
        }
    }

    pub fn begin_processing(&mut self) {
        self.status = ActionStatus::Processing;
    }

    /// リトライ1回分を消費する。上限に達したら恒久失敗へ遷移。
    pub fn record_failure(&mut self, error: String) {
        self.retry_count = (self.retry_count + 1).min(self.max_retries);
        self.status = if self.retry_count >= self.max_retries {
            ActionStatus::FailedPermanent
        } else {
            ActionStatus::Failed
        };
        self.last_error = Some(error);
    }

    /// リトライしても成功し得ない失敗。リトライ予算は消費しない。
    pub fn fail_permanently(&mut self, error: String) {
        self.status = ActionStatus::FailedPermanent;
        self.last_error = Some(error);
    }

    pub fn hold(&mut self) {
        self.status = ActionStatus::Held;
    }

    pub fn resume(&mut self) {
        self.status = ActionStatus::Pending;
    }

    pub fn reset_for_retry(&mut self) {
        self.retry_count = 0;
        self.status = ActionStatus::Pending;
        self.last_error = None;
    }

    pub fn references(&self, entity_type: &EntityType, entity_id: &EntityId) -> bool {
        &self.entity_type == entity_type && &self.entity_id == entity_id
    }
}
