//! # Database Schema
//!
//! SQL schema definitions for the PaceMates database.
//!
//! ## Schema Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         DATABASE SCHEMA                                 │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  ┌─────────────────┐    ┌─────────────────┐      ┌─────────────────┐    │
//! │  │    accounts     │    │ friend_invites  │      │      runs       │    │
//! │  ├─────────────────┤    ├─────────────────┤      ├─────────────────┤    │
//! │  │ id              │◄───│ sender_id       │      │ id              │    │
//! │  │ email           │◄───│ receiver_id     │  ┌──►│ user_id         │    │
//! │  │ username        │    │ status          │  │   │ label           │    │
//! │  │ password_hash   │    │ created_at      │  │   │ mileage         │    │
//! │  │ role            │    └─────────────────┘  │   │ duration_hours  │    │
//! │  │ friends (JSON)  │─────────────────────────┘   │ duration_mins   │    │
//! │  │ created_at      │                             │ duration_secs   │    │
//! │  │ updated_at      │                             └─────────────────┘    │
//! │  └─────────────────┘                                                    │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The `friends` column is a JSON array of account ids. It must stay
//! symmetric across the pair: `b` appears in `a`'s array exactly when `a`
//! appears in `b`'s. Every write to it happens inside a transaction that
//! updates both sides.

/// Current schema version
pub const SCHEMA_VERSION: i32 = 2;

/// SQL to create all tables (fresh database, current version)
pub const CREATE_TABLES: &str = r#"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER PRIMARY KEY
);

-- Accounts table
-- Registered users with their hashed credentials and friend set
CREATE TABLE IF NOT EXISTS accounts (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    -- Contact / login address
    email TEXT,
    -- Display handle, unique across accounts
    username TEXT NOT NULL UNIQUE,
    -- Salted hash, never the plaintext password
    password_hash TEXT NOT NULL,
    -- Coarse authorization role ('user', 'admin')
    role TEXT,
    -- JSON array of friend account ids; symmetric across the pair
    friends TEXT NOT NULL DEFAULT '[]',
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_accounts_username ON accounts(username);
CREATE INDEX IF NOT EXISTS idx_accounts_email ON accounts(email);

-- Friend invites table
-- Directed invite records; at most one pending row per (sender, receiver)
CREATE TABLE IF NOT EXISTS friend_invites (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    sender_id INTEGER NOT NULL,
    receiver_id INTEGER NOT NULL,
    -- 'pending' | 'accepted' | 'rejected'
    status TEXT NOT NULL DEFAULT 'pending',
    created_at INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_invites_receiver ON friend_invites(receiver_id, status);
CREATE INDEX IF NOT EXISTS idx_invites_sender ON friend_invites(sender_id);

-- Runs table
-- Activity log records; plain CRUD, no cross-row invariants
CREATE TABLE IF NOT EXISTS runs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id INTEGER NOT NULL,
    label TEXT,
    mileage REAL NOT NULL DEFAULT 0,
    duration_hours INTEGER,
    duration_minutes INTEGER,
    duration_seconds INTEGER
);
CREATE INDEX IF NOT EXISTS idx_runs_user ON runs(user_id);
"#;

/// Migration from v1 to v2: friend graph support
///
/// v1 databases predate the social features and hold only accounts and
/// runs. v2 adds the invite table and the friends column.
pub const MIGRATE_V1_TO_V2: &str = r#"
ALTER TABLE accounts ADD COLUMN friends TEXT NOT NULL DEFAULT '[]';

CREATE TABLE IF NOT EXISTS friend_invites (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    sender_id INTEGER NOT NULL,
    receiver_id INTEGER NOT NULL,
    status TEXT NOT NULL DEFAULT 'pending',
    created_at INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_invites_receiver ON friend_invites(receiver_id, status);
CREATE INDEX IF NOT EXISTS idx_invites_sender ON friend_invites(sender_id);

UPDATE schema_version SET version = 2;
"#;
