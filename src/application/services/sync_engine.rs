use crate::application::events::{SyncEvent, SyncEventBus};
use crate::application::ports::{ActionStore, EntityCache, NetworkMonitor, RemoteApi};
use crate::application::services::action_queue::ActionQueue;
use crate::application::services::conflict_resolver::{
    ConflictDecision, ConflictResolver, MergeFn,
};
use crate::application::services::status_tracker::StatusTracker;
use crate::application::services::sync_executor::{SyncExecutor, SyncOutcome};
use crate::domain::entities::{
    ActionDraft, OfflineAction, SyncConflict, SyncCycleReport, SyncStatusSnapshot,
};
use crate::domain::value_objects::{ActionId, ActionKind, ActionStatus, EntityId};
use crate::shared::config::SyncConfig;
use crate::shared::error::AppError;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

/// 同期エンジン本体。スケジューリングとサイクル実行を駆動する。
///
/// 依存（ストア・リモートAPI・接続監視・エンティティキャッシュ）は
/// すべてコンストラクタで注入する。サイクルは single-flight で、実行中の
/// 二重トリガーは無視される（キューイングはしない）。
pub struct SyncEngine {
    config: SyncConfig,
    queue: Arc<ActionQueue>,
    executor: SyncExecutor,
    resolver: ConflictResolver,
    cache: Arc<dyn EntityCache>,
    monitor: Arc<dyn NetworkMonitor>,
    status: Arc<StatusTracker>,
    events: Arc<SyncEventBus>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl SyncEngine {
    pub async fn new(
        config: SyncConfig,
        store: Arc<dyn ActionStore>,
        remote: Arc<dyn RemoteApi>,
        monitor: Arc<dyn NetworkMonitor>,
        cache: Arc<dyn EntityCache>,
    ) -> Result<Self, AppError> {
        let events = Arc::new(SyncEventBus::new());
        let status = Arc::new(StatusTracker::new(config.error_history_limit));
        let queue = Arc::new(
            ActionQueue::load(store, status.clone(), events.clone(), config.max_retries).await?,
        );
        status.set_online(monitor.is_online().await).await;

        let resolver = ConflictResolver::new(
            config.conflict_resolution,
            config.entity_overrides.clone(),
        );

        Ok(Self {
            config,
            queue,
            executor: SyncExecutor::new(remote),
            resolver,
            cache,
            monitor,
            status,
            events,
            tasks: Mutex::new(Vec::new()),
        })
    }

    /// MERGE 戦略で使うマージ関数を差し替える。`start` 前に呼ぶこと。
    pub fn set_merge_fn(&mut self, merge_fn: Arc<MergeFn>) {
        let resolver = ConflictResolver::new(
            self.config.conflict_resolution,
            self.config.entity_overrides.clone(),
        )
        .with_merge_fn(merge_fn);
        self.resolver = resolver;
    }

    /// バックグラウンドループを起動する。周期タイマー（`auto_sync` 時のみ）と
    /// 再接続トリガーの2本。
    pub async fn start(self: &Arc<Self>) {
        let mut tasks = self.tasks.lock().await;

        if self.config.auto_sync {
            let engine = Arc::clone(self);
            tasks.push(tokio::spawn(async move {
                let mut interval = tokio::time::interval(Duration::from_secs(
                    engine.config.sync_interval_secs,
                ));
                loop {
                    interval.tick().await;
                    if engine.monitor.is_online().await && engine.queue.has_selectable().await {
                        if let Err(e) = engine.run_cycle().await {
                            tracing::error!(target: "sync::cycle", error = %e, "periodic sync failed");
                        }
                    }
                }
            }));
        }

        // 購読は spawn より前に済ませる。start 直後の遷移を取りこぼさないため
        let mut rx = self.monitor.watch();
        let mut last = *rx.borrow_and_update();
        let engine = Arc::clone(self);
        tasks.push(tokio::spawn(async move {
            loop {
                if rx.changed().await.is_err() {
                    break;
                }
                let online = *rx.borrow();
                if online == last {
                    continue;
                }
                last = online;
                engine.status.set_online(online).await;
                engine
                    .events
                    .emit(SyncEvent::NetworkStatusChanged { online });
                tracing::info!(target: "sync::network", online, "network status changed");

                if online && engine.queue.has_selectable().await {
                    if let Err(e) = engine.run_cycle().await {
                        tracing::error!(target: "sync::cycle", error = %e, "reconnect sync failed");
                    }
                }
            }
        }));
    }

    pub async fn shutdown(&self) {
        let mut tasks = self.tasks.lock().await;
        for task in tasks.drain(..) {
            task.abort();
        }
    }

    /// アクションをキューへ積む。オンラインなら即時サイクルを裏で起動する。
    /// ネットワークI/Oを待つことはない。
    pub async fn enqueue(self: &Arc<Self>, draft: ActionDraft) -> Result<ActionId, AppError> {
        let id = self.queue.enqueue(draft).await?;

        if self.monitor.is_online().await {
            let engine = Arc::clone(self);
            tokio::spawn(async move {
                if let Err(e) = engine.run_cycle().await {
                    tracing::warn!(target: "sync::cycle", error = %e, "enqueue-triggered sync failed");
                }
            });
        }
        Ok(id)
    }

    /// 即時サイクルを起動せずにキューへ積む。まとめて投入してから
    /// `run_cycle` / 周期タイマーに任せたい場合に使う。
    pub async fn enqueue_without_trigger(&self, draft: ActionDraft) -> Result<ActionId, AppError> {
        self.queue.enqueue(draft).await
    }

    /// Failed のアクションをリセットしてからサイクルを起動する。
    /// サイクルが実行中の場合リセットだけが適用され、実行は次のトリガーに
    /// 持ち越される。
    pub async fn force_sync(&self) -> Result<Option<SyncCycleReport>, AppError> {
        let reset = self.queue.reset_failed().await?;
        if reset > 0 {
            tracing::info!(target: "sync::cycle", reset, "reset failed actions before force sync");
        }
        self.run_cycle().await
    }

    /// 1サイクルを実行する。オフライン・実行中・対象なしの場合は何もしない。
    pub async fn run_cycle(&self) -> Result<Option<SyncCycleReport>, AppError> {
        if !self.monitor.is_online().await {
            return Ok(None);
        }
        if !self.queue.has_selectable().await {
            return Ok(None);
        }
        if !self.status.try_begin_cycle().await {
            return Ok(None);
        }

        let result = self.process_batch().await;

        let pending = self.queue.pending_count().await;
        self.status.finish_cycle(pending).await;

        match result {
            Ok(mut report) => {
                report.pending_after = pending;
                self.events.emit(SyncEvent::CycleCompleted { report });
                tracing::info!(
                    target: "sync::cycle",
                    attempted = report.attempted,
                    synced = report.synced,
                    failed = report.failed,
                    conflicts = report.conflicts,
                    pending = pending,
                    "sync cycle completed"
                );
                Ok(Some(report))
            }
            Err(e) => {
                tracing::error!(target: "sync::cycle", error = %e, "sync cycle aborted");
                Err(e)
            }
        }
    }

    pub async fn status(&self) -> SyncStatusSnapshot {
        self.status.snapshot().await
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.events.subscribe()
    }

    pub async fn get_action(&self, id: &ActionId) -> Option<OfflineAction> {
        self.queue.get(id).await
    }

    pub async fn pending_actions(&self) -> Vec<OfflineAction> {
        self.queue.snapshot().await
    }

    /// 手動解決待ちのアクションを再開する。
    pub async fn resume_held(&self, id: &ActionId) -> Result<(), AppError> {
        self.queue.resume_held(id).await
    }

    pub async fn remove_action(&self, id: &ActionId) -> Result<(), AppError> {
        self.queue.remove(id).await
    }

    pub async fn clear_all(&self) -> Result<(), AppError> {
        self.queue.clear_all().await
    }

    async fn process_batch(&self) -> Result<SyncCycleReport, AppError> {
        let batch = self
            .queue
            .select_batch(self.config.batch_size as usize)
            .await;
        let total = batch.len();

        self.events.emit(SyncEvent::CycleStarted { batch_size: total });
        tracing::debug!(target: "sync::cycle", batch = total, "sync cycle started");

        let mut report = SyncCycleReport {
            attempted: total as u32,
            ..SyncCycleReport::default()
        };

        // 同一エンティティへの変更をエンキュー順で適用するため、バッチ内は
        // 逐次実行とする（帯域よりも順序の決定性を優先）
        for (index, selected) in batch.into_iter().enumerate() {
            if index > 0 && self.config.action_delay_ms > 0 {
                tokio::time::sleep(Duration::from_millis(self.config.action_delay_ms)).await;
            }

            // バッチ選択後にプレースホルダIDの書き換えが入ることがあるため、
            // 実行直前に最新の状態を取り直す
            let Some(action) = self.queue.get(&selected.id).await else {
                continue;
            };
            self.process_action(action, &mut report).await?;

            let percent = (((index + 1) * 100) / total) as u8;
            self.status.set_progress(percent).await;
            self.events.emit(SyncEvent::CycleProgress { percent });
        }

        Ok(report)
    }

    async fn process_action(
        &self,
        action: OfflineAction,
        report: &mut SyncCycleReport,
    ) -> Result<(), AppError> {
        self.queue.mark_processing(&action.id).await?;

        match self.executor.execute(&action, false).await {
            SyncOutcome::Success(data) => {
                self.complete_action(&action, data).await?;
                report.synced += 1;
            }
            SyncOutcome::Retryable(reason) => {
                self.fail_action(&action, &reason, false).await?;
                report.failed += 1;
            }
            SyncOutcome::Permanent(reason) => {
                self.fail_action(&action, &reason, true).await?;
                report.failed += 1;
            }
            SyncOutcome::Conflict(server_data) => {
                report.conflicts += 1;
                self.resolve_conflict(action, server_data, report).await?;
            }
        }
        Ok(())
    }

    async fn resolve_conflict(
        &self,
        action: OfflineAction,
        server_data: Value,
        report: &mut SyncCycleReport,
    ) -> Result<(), AppError> {
        self.events.emit(SyncEvent::ConflictDetected {
            conflict: SyncConflict {
                action_id: action.id.clone(),
                entity_type: action.entity_type.clone(),
                entity_id: action.entity_id.clone(),
                server_data: server_data.clone(),
            },
        });
        tracing::warn!(
            target: "sync::conflict",
            action_id = %action.id,
            entity_type = %action.entity_type,
            entity_id = %action.entity_id,
            "conflict reported by server"
        );

        match self.resolver.resolve(&action, &server_data) {
            ConflictDecision::AcceptServer(data) => {
                self.complete_action(&action, Some(data)).await?;
                report.synced += 1;
            }
            ConflictDecision::RetryWithForce(payload) => {
                let mut forced = action.clone();
                forced.payload = payload;

                match self.executor.execute(&forced, true).await {
                    SyncOutcome::Success(data) => {
                        self.complete_action(&forced, data).await?;
                        report.synced += 1;
                    }
                    // force再送でもコンフリクトが続く場合はリトライ扱いに
                    // してリトライ上限を効かせる
                    SyncOutcome::Conflict(_) => {
                        self.fail_action(&forced, "conflict persisted after forced retry", false)
                            .await?;
                        report.failed += 1;
                    }
                    SyncOutcome::Retryable(reason) => {
                        self.fail_action(&forced, &reason, false).await?;
                        report.failed += 1;
                    }
                    SyncOutcome::Permanent(reason) => {
                        self.fail_action(&forced, &reason, true).await?;
                        report.failed += 1;
                    }
                }
            }
            ConflictDecision::Hold => {
                self.queue.hold(&action.id).await?;
            }
        }
        Ok(())
    }

    async fn complete_action(
        &self,
        action: &OfflineAction,
        server_data: Option<Value>,
    ) -> Result<(), AppError> {
        let mut effective_id = action.entity_id.clone();

        if let Some(data) = &server_data {
            // CREATE 完了時、サーバ採番のIDをプレースホルダ参照へ伝搬する
            if action.kind == ActionKind::Create {
                if let Some(server_id) = data.get("id").and_then(Value::as_str) {
                    if server_id != action.entity_id.as_str() {
                        if let Ok(server_id) = EntityId::parse(server_id) {
                            self.queue
                                .rewrite_entity_id(
                                    &action.entity_type,
                                    &action.entity_id,
                                    &server_id,
                                )
                                .await?;
                            effective_id = server_id;
                        }
                    }
                }
            }
            self.cache
                .apply(&action.entity_type, &effective_id, data.clone())
                .await;
        }
        if action.kind == ActionKind::Delete {
            self.cache
                .invalidate(&action.entity_type, &action.entity_id)
                .await;
        }

        self.queue.mark_completed(&action.id).await?;
        self.events.emit(SyncEvent::ActionSynced {
            action_id: action.id.clone(),
        });
        tracing::debug!(target: "sync::cycle", action_id = %action.id, "action synced");
        Ok(())
    }

    async fn fail_action(
        &self,
        action: &OfflineAction,
        reason: &str,
        permanent: bool,
    ) -> Result<(), AppError> {
        let status = if permanent {
            self.queue.mark_failed_permanent(&action.id, reason).await?;
            ActionStatus::FailedPermanent
        } else {
            self.queue.mark_failed(&action.id, reason).await?
        };

        if status == ActionStatus::FailedPermanent {
            self.status
                .push_error(format!("action {} failed: {reason}", action.id))
                .await;
            tracing::error!(
                target: "sync::cycle",
                action_id = %action.id,
                error = reason,
                "action failed permanently"
            );
        } else {
            tracing::warn!(
                target: "sync::cycle",
                action_id = %action.id,
                error = reason,
                "action failed, will retry"
            );
        }

        self.events.emit(SyncEvent::ActionFailed {
            action_id: action.id.clone(),
            error: reason.to_string(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::value_objects::{ActionPayload, EntityType, Priority};
    use crate::infrastructure::cache::MemoryEntityCache;
    use crate::infrastructure::network::ManualNetworkMonitor;
    use crate::shared::config::ConflictStrategy;
    use crate::test_support::{MemoryActionStore, MockRemoteApi, ScriptedOutcome};
    use serde_json::json;
    use std::collections::HashMap;

    fn test_config() -> SyncConfig {
        SyncConfig {
            auto_sync: false,
            sync_interval_secs: 3600,
            max_retries: 3,
            batch_size: 10,
            action_delay_ms: 0,
            conflict_resolution: ConflictStrategy::ServerWins,
            entity_overrides: HashMap::new(),
            error_history_limit: 20,
        }
    }

    struct Harness {
        engine: Arc<SyncEngine>,
        remote: Arc<MockRemoteApi>,
        monitor: Arc<ManualNetworkMonitor>,
        cache: Arc<MemoryEntityCache>,
    }

    async fn setup(config: SyncConfig, remote: MockRemoteApi, online: bool) -> Harness {
        let remote = Arc::new(remote);
        let monitor = Arc::new(ManualNetworkMonitor::new(online));
        let cache = Arc::new(MemoryEntityCache::new());
        let engine = SyncEngine::new(
            config,
            Arc::new(MemoryActionStore::new()),
            remote.clone(),
            monitor.clone(),
            cache.clone(),
        )
        .await
        .unwrap();
        Harness {
            engine: Arc::new(engine),
            remote,
            monitor,
            cache,
        }
    }

    fn draft(kind: ActionKind, entity: &str, priority: Priority) -> ActionDraft {
        ActionDraft::new(
            kind,
            EntityType::parse("expense").unwrap(),
            EntityId::parse(entity).unwrap(),
            ActionPayload::new(json!({"status": "draft"})).unwrap(),
            priority,
        )
    }

    async fn wait_for_cycle_completed(
        rx: &mut broadcast::Receiver<SyncEvent>,
    ) -> SyncCycleReport {
        loop {
            let event = tokio::time::timeout(Duration::from_secs(2), rx.recv())
                .await
                .expect("timed out waiting for cycle completion")
                .expect("event channel closed");
            if let SyncEvent::CycleCompleted { report } = event {
                return report;
            }
        }
    }

    #[tokio::test]
    async fn run_cycle_syncs_pending_actions() {
        let h = setup(test_config(), MockRemoteApi::new(), true).await;
        h.engine
            .enqueue_without_trigger(draft(ActionKind::Create, "e1", Priority::Medium))
            .await
            .unwrap();
        h.engine
            .enqueue_without_trigger(draft(ActionKind::Update, "e2", Priority::Medium))
            .await
            .unwrap();

        let report = h.engine.run_cycle().await.unwrap().unwrap();

        assert_eq!(report.attempted, 2);
        assert_eq!(report.synced, 2);
        assert_eq!(report.failed, 0);
        assert!(h.engine.pending_actions().await.is_empty());
        assert_eq!(h.remote.call_count(), 2);
    }

    #[tokio::test]
    async fn run_cycle_is_a_noop_while_offline() {
        let h = setup(test_config(), MockRemoteApi::new(), false).await;
        h.engine
            .enqueue_without_trigger(draft(ActionKind::Update, "e1", Priority::Medium))
            .await
            .unwrap();

        let report = h.engine.run_cycle().await.unwrap();

        assert!(report.is_none());
        assert_eq!(h.remote.call_count(), 0);
        assert_eq!(h.engine.pending_actions().await.len(), 1);
    }

    #[tokio::test]
    async fn retryable_failures_exhaust_the_budget_after_exact_attempts() {
        let remote = MockRemoteApi::always(ScriptedOutcome::Network("unreachable".to_string()));
        let h = setup(test_config(), remote, true).await;
        let id = h
            .engine
            .enqueue_without_trigger(draft(ActionKind::Update, "e1", Priority::Medium))
            .await
            .unwrap();

        for _ in 0..3 {
            h.engine.run_cycle().await.unwrap();
        }

        let action = h.engine.get_action(&id).await.unwrap();
        assert_eq!(action.status, ActionStatus::FailedPermanent);
        assert_eq!(action.retry_count, 3);
        assert_eq!(h.remote.call_count(), 3);

        // 恒久失敗は以後のサイクルから除外される
        assert!(h.engine.run_cycle().await.unwrap().is_none());
        assert_eq!(h.remote.call_count(), 3);

        let status = h.engine.status().await;
        assert_eq!(status.errors.len(), 1);
    }

    #[tokio::test]
    async fn cycle_attempts_at_most_batch_size_actions() {
        let h = setup(test_config(), MockRemoteApi::new(), true).await;
        for i in 0..25 {
            h.engine
                .enqueue_without_trigger(draft(
                    ActionKind::Create,
                    &format!("e{i}"),
                    Priority::Medium,
                ))
                .await
                .unwrap();
        }

        let report = h.engine.run_cycle().await.unwrap().unwrap();

        assert_eq!(report.attempted, 10);
        assert_eq!(h.remote.call_count(), 10);
        assert_eq!(h.engine.pending_actions().await.len(), 15);
    }

    #[tokio::test]
    async fn server_wins_conflict_completes_and_applies_server_data() {
        let remote = MockRemoteApi::always(ScriptedOutcome::Conflict(json!({"status": "paid"})));
        let h = setup(test_config(), remote, true).await;
        let id = h
            .engine
            .enqueue_without_trigger(draft(ActionKind::Update, "inv-1", Priority::Medium))
            .await
            .unwrap();

        let report = h.engine.run_cycle().await.unwrap().unwrap();

        assert_eq!(report.conflicts, 1);
        assert_eq!(report.synced, 1);
        assert!(h.engine.get_action(&id).await.is_none());

        let cached = h
            .cache
            .get(
                &EntityType::parse("expense").unwrap(),
                &EntityId::parse("inv-1").unwrap(),
            )
            .await;
        assert_eq!(cached, Some(json!({"status": "paid"})));
    }

    #[tokio::test]
    async fn client_wins_conflict_reissues_with_force() {
        let mut config = test_config();
        config.conflict_resolution = ConflictStrategy::ClientWins;
        let remote = MockRemoteApi::new();
        remote.push(ScriptedOutcome::Conflict(json!({"status": "paid"})));
        let h = setup(config, remote, true).await;
        let id = h
            .engine
            .enqueue_without_trigger(draft(ActionKind::Update, "inv-1", Priority::Medium))
            .await
            .unwrap();

        let report = h.engine.run_cycle().await.unwrap().unwrap();

        assert_eq!(report.conflicts, 1);
        assert_eq!(report.synced, 1);
        assert!(h.engine.get_action(&id).await.is_none());

        let calls = h.remote.calls();
        assert_eq!(calls.len(), 2);
        assert!(!calls[0].force);
        assert!(calls[1].force);
    }

    #[tokio::test]
    async fn manual_conflict_holds_the_action_until_resumed() {
        let mut config = test_config();
        config.conflict_resolution = ConflictStrategy::Manual;
        let remote = MockRemoteApi::new();
        remote.push(ScriptedOutcome::Conflict(json!({"status": "paid"})));
        let h = setup(config, remote, true).await;
        let id = h
            .engine
            .enqueue_without_trigger(draft(ActionKind::Update, "inv-1", Priority::Medium))
            .await
            .unwrap();

        h.engine.run_cycle().await.unwrap();
        assert_eq!(
            h.engine.get_action(&id).await.unwrap().status,
            ActionStatus::Held
        );

        // 保留中は自動サイクルの対象外
        assert!(h.engine.run_cycle().await.unwrap().is_none());
        assert_eq!(h.remote.call_count(), 1);

        h.engine.resume_held(&id).await.unwrap();
        let report = h.engine.run_cycle().await.unwrap().unwrap();
        assert_eq!(report.synced, 1);
    }

    #[tokio::test]
    async fn completed_create_rewrites_placeholder_for_queued_actions() {
        let remote = MockRemoteApi::new();
        remote.push(ScriptedOutcome::Success(Some(json!({"id": "srv-9"}))));
        let h = setup(test_config(), remote, true).await;
        h.engine
            .enqueue_without_trigger(draft(ActionKind::Create, "tmp-1", Priority::Medium))
            .await
            .unwrap();
        h.engine
            .enqueue_without_trigger(draft(ActionKind::Update, "tmp-1", Priority::Medium))
            .await
            .unwrap();

        let report = h.engine.run_cycle().await.unwrap().unwrap();

        assert_eq!(report.synced, 2);
        let calls = h.remote.calls();
        assert_eq!(calls[0].operation, "create");
        assert_eq!(calls[1].operation, "update");
        // UPDATE はサーバ採番のIDで送られる
        assert_eq!(calls[1].entity_id.as_deref(), Some("srv-9"));
    }

    #[tokio::test]
    async fn force_sync_resets_failed_actions_first() {
        let remote = MockRemoteApi::new();
        remote.push(ScriptedOutcome::Network("unreachable".to_string()));
        let h = setup(test_config(), remote, true).await;
        let id = h
            .engine
            .enqueue_without_trigger(draft(ActionKind::Update, "e1", Priority::Medium))
            .await
            .unwrap();

        h.engine.run_cycle().await.unwrap();
        assert_eq!(
            h.engine.get_action(&id).await.unwrap().status,
            ActionStatus::Failed
        );

        let report = h.engine.force_sync().await.unwrap().unwrap();
        assert_eq!(report.synced, 1);
        assert!(h.engine.get_action(&id).await.is_none());
    }

    #[tokio::test]
    async fn concurrent_trigger_does_not_start_a_second_cycle() {
        let mut config = test_config();
        config.action_delay_ms = 200;
        let h = setup(config, MockRemoteApi::new(), true).await;
        for i in 0..2 {
            h.engine
                .enqueue_without_trigger(draft(
                    ActionKind::Update,
                    &format!("e{i}"),
                    Priority::Medium,
                ))
                .await
                .unwrap();
        }

        let engine = Arc::clone(&h.engine);
        let first = tokio::spawn(async move { engine.run_cycle().await });

        // 1本目のサイクルが action_delay で寝ている間に2本目を投げる
        tokio::time::sleep(Duration::from_millis(100)).await;
        let second = h.engine.force_sync().await.unwrap();
        assert!(second.is_none());

        let report = first.await.unwrap().unwrap().unwrap();
        assert_eq!(report.synced, 2);
        assert_eq!(h.remote.call_count(), 2);
    }

    #[tokio::test]
    async fn reconnect_triggers_a_cycle_without_waiting_for_the_timer() {
        let h = setup(test_config(), MockRemoteApi::new(), false).await;
        for i in 0..3 {
            h.engine
                .enqueue_without_trigger(draft(
                    ActionKind::Update,
                    &format!("e{i}"),
                    Priority::Medium,
                ))
                .await
                .unwrap();
        }
        h.engine.start().await;
        let mut rx = h.engine.subscribe();

        h.monitor.set_online(true);

        let report = wait_for_cycle_completed(&mut rx).await;
        assert_eq!(report.synced, 3);
        assert!(h.engine.pending_actions().await.is_empty());

        h.engine.shutdown().await;
    }

    #[tokio::test]
    async fn enqueue_while_online_triggers_an_immediate_cycle() {
        let h = setup(test_config(), MockRemoteApi::new(), true).await;
        let mut rx = h.engine.subscribe();

        h.engine
            .enqueue(draft(ActionKind::Create, "e1", Priority::High))
            .await
            .unwrap();

        let report = wait_for_cycle_completed(&mut rx).await;
        assert_eq!(report.synced, 1);
    }

    #[tokio::test]
    async fn permanent_validation_failure_is_surfaced_and_not_retried() {
        let remote =
            MockRemoteApi::always(ScriptedOutcome::Validation("bad amount".to_string()));
        let h = setup(test_config(), remote, true).await;
        let id = h
            .engine
            .enqueue_without_trigger(draft(ActionKind::Update, "e1", Priority::Medium))
            .await
            .unwrap();

        h.engine.run_cycle().await.unwrap();

        let action = h.engine.get_action(&id).await.unwrap();
        assert_eq!(action.status, ActionStatus::FailedPermanent);
        assert_eq!(action.retry_count, 0);

        let status = h.engine.status().await;
        assert_eq!(status.errors.len(), 1);
        assert!(status.errors[0].contains("bad amount"));

        // 以後のサイクルでは再試行されない
        assert!(h.engine.run_cycle().await.unwrap().is_none());
        assert_eq!(h.remote.call_count(), 1);
    }
}
