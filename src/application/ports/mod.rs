pub mod action_store;
pub mod entity_cache;
pub mod network_monitor;
pub mod remote_api;

pub use action_store::ActionStore;
pub use entity_cache::EntityCache;
pub use network_monitor::NetworkMonitor;
pub use remote_api::{RemoteApi, RemoteApiError, RemoteResponse};
