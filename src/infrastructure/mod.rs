pub mod cache;
pub mod network;
pub mod offline;
pub mod remote;
