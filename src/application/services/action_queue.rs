use crate::application::events::{SyncEvent, SyncEventBus};
use crate::application::ports::ActionStore;
use crate::application::services::status_tracker::StatusTracker;
use crate::domain::entities::{ActionDraft, OfflineAction};
use crate::domain::value_objects::{ActionId, ActionStatus, EntityId, EntityType};
use crate::shared::error::AppError;
use std::sync::Arc;
use tokio::sync::RwLock;

struct QueueInner {
    actions: Vec<OfflineAction>,
    next_seq: u64,
}

/// オフラインアクションのライフサイクルを単独で所有するキュー。
///
/// すべての変更は永続ストアへの書き込みが成功してからメモリ上の状態に
/// 反映される。書き込みが失敗した場合は呼び出し元へエラーを返し、
/// 変更前の状態を維持する。
pub struct ActionQueue {
    store: Arc<dyn ActionStore>,
    status: Arc<StatusTracker>,
    events: Arc<SyncEventBus>,
    default_max_retries: u32,
    inner: RwLock<QueueInner>,
}

impl ActionQueue {
    /// ストアからキューを復元する。クラッシュ時に Processing のまま残った
    /// アクションは Pending として扱う。
    pub async fn load(
        store: Arc<dyn ActionStore>,
        status: Arc<StatusTracker>,
        events: Arc<SyncEventBus>,
        default_max_retries: u32,
    ) -> Result<Self, AppError> {
        let mut actions = store.load_all().await?;

        let mut recovered = 0usize;
        for action in actions.iter_mut() {
            if action.status == ActionStatus::Processing {
                action.status = ActionStatus::Pending;
                recovered += 1;
            }
        }
        if recovered > 0 {
            store.save_all(&actions).await?;
            tracing::info!(
                target: "sync::queue",
                recovered,
                "recovered interrupted actions as pending"
            );
        }

        let next_seq = actions.iter().map(|a| a.seq).max().map_or(1, |max| max + 1);
        let queue = Self {
            store,
            status,
            events,
            default_max_retries,
            inner: RwLock::new(QueueInner { actions, next_seq }),
        };
        queue.refresh_pending().await;
        Ok(queue)
    }

    pub async fn enqueue(&self, draft: ActionDraft) -> Result<ActionId, AppError> {
        let mut inner = self.inner.write().await;
        let action = OfflineAction::from_draft(draft, inner.next_seq, self.default_max_retries);

        self.store.upsert(&action).await?;

        let id = action.id.clone();
        inner.next_seq += 1;
        inner.actions.push(action);
        drop(inner);

        self.refresh_pending().await;
        self.events
            .emit(SyncEvent::ActionEnqueued { action_id: id.clone() });
        tracing::debug!(target: "sync::queue", action_id = %id, "action enqueued");
        Ok(id)
    }

    pub async fn mark_processing(&self, id: &ActionId) -> Result<(), AppError> {
        self.apply_update(id, |action| action.begin_processing())
            .await
            .map(|_| ())
    }

    /// 成功したアクションはキューと永続ストアの双方から取り除く。
    pub async fn mark_completed(&self, id: &ActionId) -> Result<(), AppError> {
        let mut inner = self.inner.write().await;
        let idx = self.position(&inner, id)?;

        self.store.remove(id).await?;
        inner.actions.remove(idx);
        drop(inner);

        self.refresh_pending().await;
        self.events.emit(SyncEvent::ActionUpdated {
            action_id: id.clone(),
            status: ActionStatus::Completed,
        });
        Ok(())
    }

    /// リトライ1回を消費して失敗を記録する。到達後の状態を返す。
    pub async fn mark_failed(&self, id: &ActionId, error: &str) -> Result<ActionStatus, AppError> {
        let updated = self
            .apply_update(id, |action| action.record_failure(error.to_string()))
            .await?;
        Ok(updated.status)
    }

    /// リトライ予算を消費しない恒久失敗（ビジネスバリデーション等）。
    pub async fn mark_failed_permanent(&self, id: &ActionId, error: &str) -> Result<(), AppError> {
        self.apply_update(id, |action| action.fail_permanently(error.to_string()))
            .await
            .map(|_| ())
    }

    pub async fn hold(&self, id: &ActionId) -> Result<(), AppError> {
        self.apply_update(id, |action| action.hold()).await.map(|_| ())
    }

    pub async fn resume_held(&self, id: &ActionId) -> Result<(), AppError> {
        let mut inner = self.inner.write().await;
        let idx = self.position(&inner, id)?;
        if inner.actions[idx].status != ActionStatus::Held {
            return Err(AppError::InvalidInput(format!(
                "action {id} is not held"
            )));
        }
        let mut updated = inner.actions[idx].clone();
        updated.resume();
        self.store.upsert(&updated).await?;
        inner.actions[idx] = updated.clone();
        drop(inner);

        self.refresh_pending().await;
        self.events.emit(SyncEvent::ActionUpdated {
            action_id: updated.id,
            status: updated.status,
        });
        Ok(())
    }

    /// Failed のアクションを Pending に戻し、リトライ回数をリセットする。
    /// FailedPermanent と Held は対象外。`force_sync` の前段で呼ばれる。
    pub async fn reset_failed(&self) -> Result<usize, AppError> {
        let mut inner = self.inner.write().await;

        let mut updated = inner.actions.clone();
        let mut reset_ids = Vec::new();
        for action in updated.iter_mut() {
            if action.status == ActionStatus::Failed {
                action.reset_for_retry();
                reset_ids.push(action.id.clone());
            }
        }
        if reset_ids.is_empty() {
            return Ok(0);
        }

        self.store.save_all(&updated).await?;
        inner.actions = updated;
        drop(inner);

        self.refresh_pending().await;
        for action_id in &reset_ids {
            self.events.emit(SyncEvent::ActionUpdated {
                action_id: action_id.clone(),
                status: ActionStatus::Pending,
            });
        }
        Ok(reset_ids.len())
    }

    /// CREATE 完了時に、プレースホルダIDを参照している残りのアクションへ
    /// サーバ採番のIDを伝搬する。書き換えは全件まとめてアトミックに永続化。
    pub async fn rewrite_entity_id(
        &self,
        entity_type: &EntityType,
        placeholder: &EntityId,
        server_id: &EntityId,
    ) -> Result<usize, AppError> {
        let mut inner = self.inner.write().await;

        let mut updated = inner.actions.clone();
        let mut rewritten = 0usize;
        for action in updated.iter_mut() {
            if action.references(entity_type, placeholder) {
                action.entity_id = server_id.clone();
                rewritten += 1;
            }
        }
        if rewritten == 0 {
            return Ok(0);
        }

        self.store.save_all(&updated).await?;
        inner.actions = updated;
        drop(inner);

        tracing::info!(
            target: "sync::queue",
            entity_type = %entity_type,
            placeholder = %placeholder,
            server_id = %server_id,
            rewritten,
            "rewrote placeholder entity id"
        );
        Ok(rewritten)
    }

    /// 優先度順（High > Medium > Low、同順位はエンキュー順）で最大 `limit` 件を
    /// 選ぶ。同一エンティティのアクションは、先行するものがバッチに含まれて
    /// いない限り後続を選ばない。先頭が FailedPermanent / Held のエンティティは
    /// 解決されるまで丸ごと保留される。
    pub async fn select_batch(&self, limit: usize) -> Vec<OfflineAction> {
        let inner = self.inner.read().await;

        let mut candidates: Vec<&OfflineAction> = inner
            .actions
            .iter()
            .filter(|a| a.status.is_selectable())
            .collect();
        candidates.sort_by(|a, b| {
            b.priority
                .rank()
                .cmp(&a.priority.rank())
                .then(a.seq.cmp(&b.seq))
        });

        let mut batch: Vec<OfflineAction> = Vec::new();
        let mut selected: Vec<&ActionId> = Vec::new();
        // 先行アクションが同じパスの後半で選ばれてブロックが解けることが
        // あるため、追加が出なくなるまで繰り返す
        loop {
            let mut changed = false;
            for candidate in &candidates {
                if batch.len() >= limit {
                    break;
                }
                if selected.contains(&&candidate.id) {
                    continue;
                }
                let blocked = inner.actions.iter().any(|earlier| {
                    earlier.seq < candidate.seq
                        && earlier.references(&candidate.entity_type, &candidate.entity_id)
                        && !selected.contains(&&earlier.id)
                });
                if blocked {
                    continue;
                }
                selected.push(&candidate.id);
                batch.push((*candidate).clone());
                changed = true;
            }
            if !changed || batch.len() >= limit {
                break;
            }
        }
        batch
    }

    pub async fn get(&self, id: &ActionId) -> Option<OfflineAction> {
        let inner = self.inner.read().await;
        inner.actions.iter().find(|a| &a.id == id).cloned()
    }

    pub async fn is_pending(&self, id: &ActionId) -> bool {
        let inner = self.inner.read().await;
        inner
            .actions
            .iter()
            .any(|a| &a.id == id && a.status.is_open())
    }

    pub async fn snapshot(&self) -> Vec<OfflineAction> {
        self.inner.read().await.actions.clone()
    }

    pub async fn pending_count(&self) -> usize {
        let inner = self.inner.read().await;
        inner.actions.iter().filter(|a| a.status.is_open()).count()
    }

    /// 自動同期の対象となるアクションが存在するか
    pub async fn has_selectable(&self) -> bool {
        let inner = self.inner.read().await;
        inner.actions.iter().any(|a| a.status.is_selectable())
    }

    pub async fn remove(&self, id: &ActionId) -> Result<(), AppError> {
        let mut inner = self.inner.write().await;
        let idx = self.position(&inner, id)?;

        self.store.remove(id).await?;
        inner.actions.remove(idx);
        drop(inner);

        self.refresh_pending().await;
        self.events
            .emit(SyncEvent::ActionRemoved { action_id: id.clone() });
        Ok(())
    }

    pub async fn clear_all(&self) -> Result<(), AppError> {
        let mut inner = self.inner.write().await;
        self.store.clear().await?;
        inner.actions.clear();
        drop(inner);

        self.refresh_pending().await;
        Ok(())
    }

    fn position(&self, inner: &QueueInner, id: &ActionId) -> Result<usize, AppError> {
        inner
            .actions
            .iter()
            .position(|a| &a.id == id)
            .ok_or_else(|| AppError::NotFound(format!("action {id} not found")))
    }

    async fn apply_update<F>(&self, id: &ActionId, mutate: F) -> Result<OfflineAction, AppError>
    where
        F: FnOnce(&mut OfflineAction),
    {
        let mut inner = self.inner.write().await;
        let idx = self.position(&inner, id)?;

        let mut updated = inner.actions[idx].clone();
        mutate(&mut updated);

        self.store.upsert(&updated).await?;
        inner.actions[idx] = updated.clone();
        drop(inner);

        self.refresh_pending().await;
        self.events.emit(SyncEvent::ActionUpdated {
            action_id: updated.id.clone(),
            status: updated.status,
        });
        Ok(updated)
    }

    async fn refresh_pending(&self) {
        let count = self.pending_count().await;
        self.status.set_pending(count).await;
    }
}
