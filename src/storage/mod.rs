//! # Storage Module
//!
//! SQLite persistence for PaceMates data.
//!
//! ## Storage Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         STORAGE SYSTEM                                  │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │  SQLite Database                                                │   │
//! │  │  ───────────────                                                 │   │
//! │  │                                                                 │   │
//! │  │  Tables:                                                        │   │
//! │  │  • accounts       - Registered users + JSON friend sets         │   │
//! │  │  • friend_invites - Directed invite records                     │   │
//! │  │  • runs           - Activity log records                        │   │
//! │  │                                                                 │   │
//! │  │  Friend-graph writes (accept, unfriend) mutate both sides of    │   │
//! │  │  an edge inside one transaction. The rest is row-level CRUD.    │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

mod database;
mod schema;

pub use database::{AccountRecord, Database, DatabaseConfig, InviteRecord, RunRecord};

use crate::error::Result;

/// Storage configuration
#[derive(Debug, Clone, Default)]
pub struct StorageConfig {
    /// Path to the database file (None for in-memory)
    pub database_path: Option<String>,
}

/// Initialize the storage system
pub async fn init(config: StorageConfig) -> Result<Database> {
    Database::open(config.database_path.as_deref()).await
}
