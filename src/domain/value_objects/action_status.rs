use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    FailedPermanent,
    /// 手動解決待ちのコンフリクト。自動同期の対象から外れる。
    Held,
}

impl ActionStatus {
    pub fn as_str(&self) -> &str {
        match self {
            ActionStatus::Pending => "pending",
            ActionStatus::Processing => "processing",
            ActionStatus::Completed => "completed",
            ActionStatus::Failed => "failed",
            ActionStatus::FailedPermanent => "failed_permanent",
            ActionStatus::Held => "held",
        }
    }

    /// 自動同期サイクルで選択可能な状態か
    pub fn is_selectable(&self) -> bool {
        matches!(self, ActionStatus::Pending | ActionStatus::Failed)
    }

    /// 未完了としてステータス集計に含める状態か
    pub fn is_open(&self) -> bool {
        matches!(
            self,
            ActionStatus::Pending | ActionStatus::Processing | ActionStatus::Failed
        )
    }
}

impl fmt::Display for ActionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ActionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ActionStatus::Pending),
            "processing" => Ok(ActionStatus::Processing),
            "completed" => Ok(ActionStatus::Completed),
            "failed" => Ok(ActionStatus::Failed),
            "failed_permanent" => Ok(ActionStatus::FailedPermanent),
            "held" => Ok(ActionStatus::Held),
            other => Err(format!("Unknown action status: {other}")),
        }
    }
}
