use super::rows::OfflineActionRow;
use crate::domain::entities::OfflineAction;
use crate::domain::value_objects::{
    ActionId, ActionKind, ActionPayload, ActionStatus, EntityId, EntityType, Priority,
};
use crate::shared::error::AppError;
use chrono::{DateTime, Utc};

pub fn action_from_row(row: OfflineActionRow) -> Result<OfflineAction, AppError> {
    let created_at = DateTime::<Utc>::from_timestamp_millis(row.created_at)
        .ok_or_else(|| AppError::Serialization(format!("invalid timestamp: {}", row.created_at)))?;

    Ok(OfflineAction {
        id: ActionId::parse(&row.action_id).map_err(AppError::Serialization)?,
        kind: row.kind.parse::<ActionKind>().map_err(AppError::Serialization)?,
        entity_type: EntityType::parse(&row.entity_type).map_err(AppError::Serialization)?,
        entity_id: EntityId::parse(&row.entity_id).map_err(AppError::Serialization)?,
        payload: ActionPayload::from_json_str(&row.payload).map_err(AppError::Serialization)?,
        priority: row.priority.parse::<Priority>().map_err(AppError::Serialization)?,
        seq: row.seq as u64,
        created_at,
        retry_count: row.retry_count as u32,
        max_retries: row.max_retries as u32,
        status: row.status.parse::<ActionStatus>().map_err(AppError::Serialization)?,
        last_error: row.last_error,
    })
}

pub fn row_from_action(action: &OfflineAction) -> Result<OfflineActionRow, AppError> {
    Ok(OfflineActionRow {
        seq: action.seq as i64,
        action_id: action.id.to_string(),
        kind: action.kind.as_str().to_string(),
        entity_type: action.entity_type.to_string(),
        entity_id: action.entity_id.to_string(),
        payload: serde_json::to_string(action.payload.as_json())?,
        priority: action.priority.as_str().to_string(),
        status: action.status.as_str().to_string(),
        retry_count: i64::from(action.retry_count),
        max_retries: i64::from(action.max_retries),
        created_at: action.created_at.timestamp_millis(),
        last_error: action.last_error.clone(),
    })
}
