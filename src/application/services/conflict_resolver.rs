use crate::domain::entities::OfflineAction;
use crate::domain::value_objects::{ActionPayload, EntityType};
use crate::shared::config::ConflictStrategy;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// 呼び出し側が差し替えられるマージ関数。
/// `(local, server) -> merged` で、キー単位ではサーバ側が優先される想定。
pub type MergeFn = dyn Fn(&Value, &Value) -> Value + Send + Sync;

/// コンフリクト解決の結果。
#[derive(Debug, Clone, PartialEq)]
pub enum ConflictDecision {
    /// サーバ側データを受け入れ、アクションを完了扱いにする
    AcceptServer(Value),
    /// 指定ペイロードで force 付き再送を行う
    RetryWithForce(ActionPayload),
    /// 手動解決待ちとして保留する
    Hold,
}

/// 純粋な戦略関数の集まり。キュー状態には触れない。
pub struct ConflictResolver {
    default_strategy: ConflictStrategy,
    entity_overrides: HashMap<String, ConflictStrategy>,
    merge_fn: Arc<MergeFn>,
}

impl ConflictResolver {
    pub fn new(
        default_strategy: ConflictStrategy,
        entity_overrides: HashMap<String, ConflictStrategy>,
    ) -> Self {
        Self {
            default_strategy,
            entity_overrides,
            merge_fn: Arc::new(shallow_merge),
        }
    }

    pub fn with_merge_fn(mut self, merge_fn: Arc<MergeFn>) -> Self {
        self.merge_fn = merge_fn;
        self
    }

    pub fn strategy_for(&self, entity_type: &EntityType) -> ConflictStrategy {
        self.entity_overrides
            .get(entity_type.as_str())
            .copied()
            .unwrap_or(self.default_strategy)
    }

    pub fn resolve(&self, action: &OfflineAction, server_data: &Value) -> ConflictDecision {
        match self.strategy_for(&action.entity_type) {
            ConflictStrategy::ServerWins => ConflictDecision::AcceptServer(server_data.clone()),
            ConflictStrategy::ClientWins => {
                ConflictDecision::RetryWithForce(action.payload.clone())
            }
            ConflictStrategy::Merge => {
                let merged = (self.merge_fn)(action.payload.as_json(), server_data);
                match ActionPayload::new(merged) {
                    Ok(payload) => ConflictDecision::RetryWithForce(payload),
                    // マージ関数が null を返したらサーバ側を採用する
                    Err(_) => ConflictDecision::AcceptServer(server_data.clone()),
                }
            }
            ConflictStrategy::Manual => ConflictDecision::Hold,
        }
    }
}

/// 既定のシャローマージ。両辺がオブジェクトならローカルをベースに
/// サーバ側のキーで上書きし、そうでなければサーバ側の値をそのまま使う。
pub fn shallow_merge(local: &Value, server: &Value) -> Value {
    match (local, server) {
        (Value::Object(local_map), Value::Object(server_map)) => {
            let mut merged = local_map.clone();
            for (key, value) in server_map {
                merged.insert(key.clone(), value.clone());
            }
            Value::Object(merged)
        }
        _ => server.clone(),
    }
}
