//! 同期エンジンを実バックエンドに対して手で動かすハーネス。
//!
//! ```text
//! LEDGERLINE_API_BASE_URL=http://localhost:3001 \
//! LEDGERLINE_DATABASE_URL=sqlite::memory: \
//!     cargo run --bin sync_harness
//! ```
//!
//! 起動するとサンプルの expense CREATE を1件キューに積み、イベントを
//! 標準出力へ流し続ける。Ctrl-C で終了。

use anyhow::anyhow;
use ledgerline_sync::{
    ActionDraft, ActionKind, ActionPayload, EngineConfig, EntityId, EntityType, HttpRemoteApi,
    ManualNetworkMonitor, MemoryEntityCache, Priority, SqliteActionStore, SyncEngine,
};
use sqlx::sqlite::SqlitePoolOptions;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    ledgerline_sync::init_logging();

    let config = EngineConfig::from_env();
    config.validate().map_err(|e| anyhow!(e))?;

    let pool = SqlitePoolOptions::new()
        .max_connections(config.database.max_connections)
        .connect(&config.database.url)
        .await?;
    SqliteActionStore::migrate(&pool).await?;

    let store = Arc::new(SqliteActionStore::new(pool));
    let remote = Arc::new(HttpRemoteApi::new(&config.remote)?);
    let monitor = Arc::new(ManualNetworkMonitor::new(true));
    let cache = Arc::new(MemoryEntityCache::new());

    let engine = Arc::new(SyncEngine::new(config.sync, store, remote, monitor, cache).await?);
    engine.start().await;
    let mut events = engine.subscribe();

    info!("sync harness started, enqueueing a sample expense");

    let placeholder = EntityId::parse(&format!("tmp-{}", Uuid::new_v4())).map_err(|e| anyhow!(e))?;
    engine
        .enqueue(ActionDraft::new(
            ActionKind::Create,
            EntityType::parse("expense").map_err(|e| anyhow!(e))?,
            placeholder,
            ActionPayload::from_json_str(r#"{"description": "harness expense", "amount": 12.5}"#)
                .map_err(|e| anyhow!(e))?,
            Priority::Medium,
        ))
        .await?;

    loop {
        tokio::select! {
            event = events.recv() => {
                match event {
                    Ok(event) => println!("{}", serde_json::to_string(&event)?),
                    Err(err) => {
                        tracing::warn!(error = %err, "event stream lagged");
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                break;
            }
        }
    }

    let status = engine.status().await;
    info!(
        pending = status.pending_actions,
        errors = status.errors.len(),
        "sync harness shutting down"
    );
    engine.shutdown().await;
    Ok(())
}
