pub mod audit;
pub mod claim;
pub mod config;
pub mod init;
pub mod maintenance;
pub mod phase;
pub mod reconcile;
pub mod render;
pub mod state;
