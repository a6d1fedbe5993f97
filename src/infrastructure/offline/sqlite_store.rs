use super::mappers::{action_from_row, row_from_action};
use super::rows::OfflineActionRow;
use crate::application::ports::ActionStore;
use crate::domain::entities::OfflineAction;
use crate::domain::value_objects::ActionId;
use crate::shared::error::AppError;
use async_trait::async_trait;
use sqlx::{Pool, Sqlite};

/// sqlx/SQLite 実装の永続アクションストア。
pub struct SqliteActionStore {
    pool: Pool<Sqlite>,
}

impl SqliteActionStore {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }

    pub async fn migrate(pool: &Pool<Sqlite>) -> Result<(), AppError> {
        sqlx::migrate!("./migrations").run(pool).await?;
        Ok(())
    }

    async fn insert_row(
        executor: &mut sqlx::SqliteConnection,
        row: &OfflineActionRow,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO offline_actions (
                seq, action_id, kind, entity_type, entity_id, payload,
                priority, status, retry_count, max_retries, created_at, last_error
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
            "#,
        )
        .bind(row.seq)
        .bind(&row.action_id)
        .bind(&row.kind)
        .bind(&row.entity_type)
        .bind(&row.entity_id)
        .bind(&row.payload)
        .bind(&row.priority)
        .bind(&row.status)
        .bind(row.retry_count)
        .bind(row.max_retries)
        .bind(row.created_at)
        .bind(&row.last_error)
        .execute(executor)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl ActionStore for SqliteActionStore {
    async fn load_all(&self) -> Result<Vec<OfflineAction>, AppError> {
        let rows = sqlx::query_as::<_, OfflineActionRow>(
            "SELECT * FROM offline_actions ORDER BY seq ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(action_from_row).collect()
    }

    /// 全件をトランザクション内で入れ替える。途中失敗時は元の内容が残る。
    async fn save_all(&self, actions: &[OfflineAction]) -> Result<(), AppError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM offline_actions")
            .execute(&mut *tx)
            .await?;
        for action in actions {
            let row = row_from_action(action)?;
            Self::insert_row(&mut *tx, &row).await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn upsert(&self, action: &OfflineAction) -> Result<(), AppError> {
        let row = row_from_action(action)?;

        sqlx::query(
            r#"
            INSERT INTO offline_actions (
                seq, action_id, kind, entity_type, entity_id, payload,
                priority, status, retry_count, max_retries, created_at, last_error
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
            ON CONFLICT(action_id) DO UPDATE SET
                entity_id = excluded.entity_id,
                payload = excluded.payload,
                priority = excluded.priority,
                status = excluded.status,
                retry_count = excluded.retry_count,
                max_retries = excluded.max_retries,
                last_error = excluded.last_error
            "#,
        )
        .bind(row.seq)
        .bind(&row.action_id)
        .bind(&row.kind)
        .bind(&row.entity_type)
        .bind(&row.entity_id)
        .bind(&row.payload)
        .bind(&row.priority)
        .bind(&row.status)
        .bind(row.retry_count)
        .bind(row.max_retries)
        .bind(row.created_at)
        .bind(&row.last_error)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn remove(&self, id: &ActionId) -> Result<(), AppError> {
        sqlx::query("DELETE FROM offline_actions WHERE action_id = ?1")
            .bind(id.as_str())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn clear(&self) -> Result<(), AppError> {
        sqlx::query("DELETE FROM offline_actions")
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
