pub mod conflict;
pub mod cycle_report;
pub mod offline_action;
pub mod sync_status;

pub use conflict::SyncConflict;
pub use cycle_report::SyncCycleReport;
pub use offline_action::{ActionDraft, OfflineAction};
pub use sync_status::SyncStatusSnapshot;
