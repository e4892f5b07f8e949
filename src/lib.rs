pub mod config;
pub mod core;
pub mod error;
pub mod logging;
pub mod models;
pub mod storage;

pub use config::{AppConfig, RemoteConfig, SyncSettings};
pub use core::{PathFilter, SyncEngine, SyncReport};
pub use error::SyncError;
pub use models::{Direction, SyncPhase, SyncProgress};
