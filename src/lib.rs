pub mod application;
pub mod domain;
pub mod infrastructure;
pub mod shared;
pub mod test_support;

pub use application::events::{SyncEvent, SyncEventBus};
pub use application::ports::{
    ActionStore, EntityCache, NetworkMonitor, RemoteApi, RemoteApiError, RemoteResponse,
};
pub use application::services::{
    ActionQueue, ConflictDecision, ConflictResolver, MergeFn, StatusTracker, SyncEngine,
    SyncExecutor, SyncOutcome,
};
pub use domain::entities::{
    ActionDraft, OfflineAction, SyncConflict, SyncCycleReport, SyncStatusSnapshot,
};
pub use domain::value_objects::{
    ActionId, ActionKind, ActionPayload, ActionStatus, EntityId, EntityType, Priority,
};
pub use infrastructure::cache::MemoryEntityCache;
pub use infrastructure::network::ManualNetworkMonitor;
pub use infrastructure::offline::SqliteActionStore;
pub use infrastructure::remote::HttpRemoteApi;
pub use shared::config::{
    ConflictStrategy, DatabaseConfig, EngineConfig, RemoteConfig, SyncConfig,
};
pub use shared::error::AppError;

/// ログ設定の初期化
pub fn init_logging() {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ledgerline_sync=debug,info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
