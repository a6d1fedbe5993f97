//! 同期エンジンの結合テスト。SQLite ストアを共有プールで挟み、
//! プロセス再起動に相当する「ストアからの再構築」込みで検証する。

use ledgerline_sync::test_support::{MockRemoteApi, ScriptedOutcome};
use ledgerline_sync::{
    ActionDraft, ActionKind, ActionPayload, ActionStatus, ConflictStrategy, EntityCache, EntityId,
    EntityType, ManualNetworkMonitor, MemoryEntityCache, Priority, SqliteActionStore, SyncConfig,
    SyncEngine, SyncEvent,
};
use serde_json::json;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Pool, Sqlite};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

async fn setup_pool() -> Pool<Sqlite> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    SqliteActionStore::migrate(&pool).await.unwrap();
    pool
}

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

async fn build_engine(
    pool: Pool<Sqlite>,
    remote: Arc<MockRemoteApi>,
    monitor: Arc<ManualNetworkMonitor>,
    cache: Arc<MemoryEntityCache>,
    config: SyncConfig,
) -> Arc<SyncEngine> {
    let store = Arc::new(SqliteActionStore::new(pool));
    Arc::new(
        SyncEngine::new(config, store, remote, monitor, cache)
            .await
            .unwrap(),
    )
}

fn draft(kind: ActionKind, entity: &str, priority: Priority) -> ActionDraft {
    ActionDraft::new(
        kind,
        EntityType::parse("expense").unwrap(),
        EntityId::parse(entity).unwrap(),
        ActionPayload::new(json!({"status": "draft", "amount": 10})).unwrap(),
        priority,
    )
}

#[tokio::test]
async fn pending_actions_survive_a_restart_with_unchanged_payload() {
    let pool = setup_pool().await;
    let monitor = Arc::new(ManualNetworkMonitor::new(false));
    let engine = build_engine(
        pool.clone(),
        Arc::new(MockRemoteApi::new()),
        monitor,
        Arc::new(MemoryEntityCache::new()),
        test_config(),
    )
    .await;

    for i in 0..3 {
        engine
            .enqueue_without_trigger(draft(
                ActionKind::Update,
                &format!("e{i}"),
                Priority::Medium,
            ))
            .await
            .unwrap();
    }
    let before = engine.pending_actions().await;
    drop(engine);

    // 再起動相当: 同じプールから新しいエンジンを組み立てる
    let monitor = Arc::new(ManualNetworkMonitor::new(false));
    let restarted = build_engine(
        pool,
        Arc::new(MockRemoteApi::new()),
        monitor,
        Arc::new(MemoryEntityCache::new()),
        test_config(),
    )
    .await;

    let after = restarted.pending_actions().await;
    assert_eq!(after, before);
    assert!(after
        .iter()
        .all(|a| a.payload.as_json() == &json!({"status": "draft", "amount": 10})));
}

#[tokio::test]
async fn bounded_retry_reaches_permanent_failure_after_exact_attempts() {
    let pool = setup_pool().await;
    let remote = Arc::new(MockRemoteApi::always(ScriptedOutcome::Network(
        "unreachable".to_string(),
    )));
    let monitor = Arc::new(ManualNetworkMonitor::new(true));
    let engine = build_engine(
        pool,
        remote.clone(),
        monitor,
        Arc::new(MemoryEntityCache::new()),
        test_config(),
    )
    .await;

    let id = engine
        .enqueue_without_trigger(draft(ActionKind::Update, "e1", Priority::Medium))
        .await
        .unwrap();

    for _ in 0..3 {
        engine.run_cycle().await.unwrap();
    }

    let action = engine.get_action(&id).await.unwrap();
    assert_eq!(action.status, ActionStatus::FailedPermanent);
    assert_eq!(action.retry_count, 3);
    assert_eq!(remote.call_count(), 3);

    // 以後の自動サイクルからは除外される
    assert!(engine.run_cycle().await.unwrap().is_none());
    assert_eq!(remote.call_count(), 3);
}

#[tokio::test]
async fn per_entity_order_is_preserved_under_priority_inversion() {
    let pool = setup_pool().await;
    let remote = Arc::new(MockRemoteApi::new());
    let monitor = Arc::new(ManualNetworkMonitor::new(true));
    let engine = build_engine(
        pool,
        remote.clone(),
        monitor,
        Arc::new(MemoryEntityCache::new()),
        test_config(),
    )
    .await;

    engine
        .enqueue_without_trigger(draft(ActionKind::Update, "e1", Priority::Low))
        .await
        .unwrap();
    engine
        .enqueue_without_trigger(draft(ActionKind::Delete, "e1", Priority::Low))
        .await
        .unwrap();
    engine
        .enqueue_without_trigger(draft(ActionKind::Update, "e2", Priority::High))
        .await
        .unwrap();

    engine.run_cycle().await.unwrap();

    let calls = remote.calls();
    assert_eq!(calls.len(), 3);
    // e2 が先行してよいが、e1 の UPDATE は必ず DELETE より前
    assert_eq!(calls[0].entity_id.as_deref(), Some("e2"));
    assert_eq!(calls[1].operation, "update");
    assert_eq!(calls[1].entity_id.as_deref(), Some("e1"));
    assert_eq!(calls[2].operation, "delete");
    assert_eq!(calls[2].entity_id.as_deref(), Some("e1"));
}

#[tokio::test]
async fn cycle_attempts_exactly_batch_size_of_backlog() {
    let pool = setup_pool().await;
    let remote = Arc::new(MockRemoteApi::new());
    let monitor = Arc::new(ManualNetworkMonitor::new(true));
    let engine = build_engine(
        pool,
        remote.clone(),
        monitor,
        Arc::new(MemoryEntityCache::new()),
        test_config(),
    )
    .await;

    for i in 0..25 {
        engine
            .enqueue_without_trigger(draft(
                ActionKind::Create,
                &format!("e{i}"),
                Priority::Medium,
            ))
            .await
            .unwrap();
    }

    let report = engine.run_cycle().await.unwrap().unwrap();
    assert_eq!(report.attempted, 10);
    assert_eq!(report.synced, 10);
    assert_eq!(engine.pending_actions().await.len(), 15);
    assert_eq!(remote.call_count(), 10);
}

#[tokio::test]
async fn server_wins_conflict_applies_server_state_locally() {
    let pool = setup_pool().await;
    let remote = Arc::new(MockRemoteApi::new());
    remote.push(ScriptedOutcome::Conflict(json!({"status": "paid"})));
    let monitor = Arc::new(ManualNetworkMonitor::new(true));
    let cache = Arc::new(MemoryEntityCache::new());
    let engine = build_engine(pool, remote, monitor, cache.clone(), test_config()).await;

    let id = engine
        .enqueue_without_trigger(draft(ActionKind::Update, "inv-1", Priority::Medium))
        .await
        .unwrap();

    let report = engine.run_cycle().await.unwrap().unwrap();
    assert_eq!(report.conflicts, 1);
    assert_eq!(report.synced, 1);
    assert!(engine.get_action(&id).await.is_none());

    let cached = cache
        .get(
            &EntityType::parse("expense").unwrap(),
            &EntityId::parse("inv-1").unwrap(),
        )
        .await;
    assert_eq!(cached, Some(json!({"status": "paid"})));
}

#[tokio::test]
async fn reconnect_starts_a_cycle_without_the_periodic_timer() {
    let pool = setup_pool().await;
    let remote = Arc::new(MockRemoteApi::new());
    let monitor = Arc::new(ManualNetworkMonitor::new(false));
    let engine = build_engine(
        pool,
        remote.clone(),
        monitor.clone(),
        Arc::new(MemoryEntityCache::new()),
        test_config(),
    )
    .await;

    for i in 0..3 {
        engine
            .enqueue_without_trigger(draft(
                ActionKind::Update,
                &format!("e{i}"),
                Priority::Medium,
            ))
            .await
            .unwrap();
    }
    engine.start().await;
    let mut events = engine.subscribe();

    monitor.set_online(true);

    let report = loop {
        let event = tokio::time::timeout(Duration::from_secs(2), events.recv())
            .await
            .expect("timed out waiting for reconnect-triggered cycle")
            .expect("event channel closed");
        if let SyncEvent::CycleCompleted { report } = event {
            break report;
        }
    };

    assert_eq!(report.synced, 3);
    assert!(engine.pending_actions().await.is_empty());
    assert_eq!(remote.call_count(), 3);

    engine.shutdown().await;
}

#[tokio::test]
async fn progress_events_cover_the_whole_cycle() {
    let pool = setup_pool().await;
    let remote = Arc::new(MockRemoteApi::new());
    let monitor = Arc::new(ManualNetworkMonitor::new(true));
    let engine = build_engine(
        pool,
        remote,
        monitor,
        Arc::new(MemoryEntityCache::new()),
        test_config(),
    )
    .await;

    for i in 0..4 {
        engine
            .enqueue_without_trigger(draft(
                ActionKind::Update,
                &format!("e{i}"),
                Priority::Medium,
            ))
            .await
            .unwrap();
    }
    let mut events = engine.subscribe();

    engine.run_cycle().await.unwrap();

    let mut progress = Vec::new();
    while let Ok(event) = events.try_recv() {
        if let SyncEvent::CycleProgress { percent } = event {
            progress.push(percent);
        }
    }
    assert_eq!(progress, vec![25, 50, 75, 100]);
}
