use crate::domain::entities::OfflineAction;
use crate::domain::value_objects::ActionId;
use crate::shared::error::AppError;
use async_trait::async_trait;

/// 永続アクションストアの境界。プロセス再起動をまたいでキューを保持する。
///
/// `save_all` は全件の読み替えをアトミックに行い、`upsert`/`remove` は
/// 1アクション単位でアトミックであること。途中失敗で部分書き込みを
/// 残してはならない。
#[async_trait]
pub trait ActionStore: Send + Sync {
    async fn load_all(&self) -> Result<Vec<OfflineAction>, AppError>;
    async fn save_all(&self, actions: &[OfflineAction]) -> Result<(), AppError>;
    async fn upsert(&self, action: &OfflineAction) -> Result<(), AppError>;
    async fn remove(&self, id: &ActionId) -> Result<(), AppError>;
    async fn clear(&self) -> Result<(), AppError>;
}
