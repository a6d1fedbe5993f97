use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// 競合解決ポリシー。グローバル既定値に加えてエンティティ種別ごとに上書きできる。
#[derive(Debug, Copy, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ConflictStrategy {
    #[default]
    ServerWins,
    ClientWins,
    Merge,
    Manual,
}

impl ConflictStrategy {
    pub fn as_str(&self) -> &str {
        match self {
            ConflictStrategy::ServerWins => "server_wins",
            ConflictStrategy::ClientWins => "client_wins",
            ConflictStrategy::Merge => "merge",
            ConflictStrategy::Manual => "manual",
        }
    }

    fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "server_wins" => Some(ConflictStrategy::ServerWins),
            "client_wins" => Some(ConflictStrategy::ClientWins),
            "merge" => Some(ConflictStrategy::Merge),
            "manual" => Some(ConflictStrategy::Manual),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    pub database: DatabaseConfig,
    pub remote: RemoteConfig,
    pub sync: SyncConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub connection_timeout: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteConfig {
    pub base_url: String,
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    pub auto_sync: bool,
    pub sync_interval_secs: u64,
    pub max_retries: u32,
    pub batch_size: u32,
    /// 連続するリモート呼び出しの間に挟む待機時間
    pub action_delay_ms: u64,
    pub conflict_resolution: ConflictStrategy,
    #[serde(default)]
    pub entity_overrides: HashMap<String, ConflictStrategy>,
    pub error_history_limit: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: default_database_url(),
                max_connections: 5,
                connection_timeout: 30,
            },
            remote: RemoteConfig {
                base_url: "http://localhost:3001".to_string(),
                request_timeout_secs: 30,
            },
            sync: SyncConfig::default(),
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            auto_sync: true,
            sync_interval_secs: 30,
            max_retries: 3,
            batch_size: 10,
            action_delay_ms: 1000,
            conflict_resolution: ConflictStrategy::ServerWins,
            entity_overrides: HashMap::new(),
            error_history_limit: 20,
        }
    }
}

fn default_database_url() -> String {
    let dir = dirs::data_local_dir()
        .map(|base| base.join("ledgerline"))
        .unwrap_or_else(|| PathBuf::from("data"));
    format!("sqlite:{}", dir.join("sync.db").display())
}

impl EngineConfig {
    pub fn from_env() -> Self {
        let mut cfg = Self::default();

        if let Ok(v) = std::env::var("LEDGERLINE_DATABASE_URL") {
            if !v.trim().is_empty() {
                cfg.database.url = v;
            }
        }
        if let Ok(v) = std::env::var("LEDGERLINE_API_BASE_URL") {
            if !v.trim().is_empty() {
                cfg.remote.base_url = v;
            }
        }
        if let Ok(v) = std::env::var("LEDGERLINE_API_TIMEOUT_SECS") {
            if let Some(value) = parse_u64(&v) {
                cfg.remote.request_timeout_secs = value.max(1);
            }
        }
        if let Ok(v) = std::env::var("LEDGERLINE_SYNC_AUTO") {
            cfg.sync.auto_sync = parse_bool(&v, cfg.sync.auto_sync);
        }
        if let Ok(v) = std::env::var("LEDGERLINE_SYNC_INTERVAL_SECS") {
            if let Some(value) = parse_u64(&v) {
                cfg.sync.sync_interval_secs = value.max(1);
            }
        }
        if let Ok(v) = std::env::var("LEDGERLINE_SYNC_MAX_RETRIES") {
            if let Some(value) = parse_u64(&v) {
                cfg.sync.max_retries = value.min(u64::from(u32::MAX)) as u32;
            }
        }
        if let Ok(v) = std::env::var("LEDGERLINE_SYNC_BATCH_SIZE") {
            if let Some(value) = parse_u64(&v) {
                cfg.sync.batch_size = value.clamp(1, u64::from(u32::MAX)) as u32;
            }
        }
        if let Ok(v) = std::env::var("LEDGERLINE_SYNC_ACTION_DELAY_MS") {
            if let Some(value) = parse_u64(&v) {
                cfg.sync.action_delay_ms = value;
            }
        }
        if let Ok(v) = std::env::var("LEDGERLINE_CONFLICT_RESOLUTION") {
            if let Some(strategy) = ConflictStrategy::parse(&v) {
                cfg.sync.conflict_resolution = strategy;
            }
        }

        cfg
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.database.max_connections == 0 {
            return Err("Database max_connections must be greater than 0".to_string());
        }
        if self.remote.base_url.trim().is_empty() {
            return Err("Remote base_url must not be empty".to_string());
        }
        if self.remote.request_timeout_secs == 0 {
            return Err("Remote request_timeout_secs must be greater than 0".to_string());
        }
        if self.sync.sync_interval_secs == 0 {
            return Err("Sync sync_interval_secs must be greater than 0".to_string());
        }
        if self.sync.batch_size == 0 {
            return Err("Sync batch_size must be greater than 0".to_string());
        }
        if self.sync.error_history_limit == 0 {
            return Err("Sync error_history_limit must be greater than 0".to_string());
        }
        Ok(())
    }
}

fn parse_bool(s: &str, default: bool) -> bool {
    match s.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => true,
        "0" | "false" | "no" | "off" => false,
        _ => default,
    }
}

fn parse_u64(value: &str) -> Option<u64> {
    value.trim().parse::<u64>().ok()
}
