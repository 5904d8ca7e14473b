//! # Database
//!
//! SQLite database wrapper for the PaceMates backend.
//!
//! ## Database Operations
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      DATABASE OPERATIONS                                │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  ┌─────────────────┐                                                   │
//! │  │    Services     │  AccountService / InviteService / RunService      │
//! │  └────────┬────────┘                                                   │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  ┌─────────────────┐                                                   │
//! │  │    Database     │  High-level API                                   │
//! │  │   (this file)   │  - Account rows + friend-set column               │
//! │  │                 │  - Invite rows                                    │
//! │  │                 │  - Transactional units (accept / sever)           │
//! │  └────────┬────────┘                                                   │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  ┌─────────────────┐                                                   │
//! │  │    rusqlite     │  SQLite wrapper                                   │
//! │  │                 │  - Prepared statements                            │
//! │  │                 │  - Transactions                                   │
//! │  └────────┬────────┘                                                   │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  ┌─────────────────┐                                                   │
//! │  │   SQLite DB     │  Storage                                          │
//! │  │   (file or      │  - In-memory for tests                            │
//! │  │    memory)      │  - File for production                            │
//! │  └─────────────────┘                                                   │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The friend graph lives in the `friends` JSON column of `accounts`.
//! [`Database::accept_invite_tx`] and [`Database::sever_friendship_tx`] are
//! the only writers of that column, and each commits both sides of the edge
//! (plus any dependent invite row) in one SQLite transaction, so a partial
//! edge is never observable to a subsequent read.

use parking_lot::Mutex;
use rusqlite::{params, Connection};
use std::collections::BTreeSet;
use std::sync::Arc;

use super::schema;
use crate::error::{Error, Result};

/// Database configuration
#[derive(Debug, Clone, Default)]
pub struct DatabaseConfig {
    /// Path to the database file
    pub path: Option<String>,
}

/// An account row as stored
#[derive(Debug, Clone)]
pub struct AccountRecord {
    /// Database ID
    pub id: i64,
    /// Contact / login address
    pub email: Option<String>,
    /// Display handle
    pub username: String,
    /// Salted password hash
    pub password_hash: String,
    /// Authorization role
    pub role: Option<String>,
    /// JSON array of friend account ids
    pub friends: String,
    /// Created timestamp
    pub created_at: i64,
    /// Last updated timestamp
    pub updated_at: i64,
}

/// A friend invite row as stored
#[derive(Debug, Clone)]
pub struct InviteRecord {
    /// Database ID
    pub id: i64,
    /// Sending account id
    pub sender_id: i64,
    /// Receiving account id
    pub receiver_id: i64,
    /// 'pending' | 'accepted' | 'rejected'
    pub status: String,
    /// Created timestamp
    pub created_at: i64,
}

/// A run row as stored
#[derive(Debug, Clone)]
pub struct RunRecord {
    /// Database ID
    pub id: i64,
    /// Owning account id
    pub user_id: i64,
    /// Free-form label
    pub label: Option<String>,
    /// Distance in miles
    pub mileage: f64,
    /// Duration hours component
    pub duration_hours: Option<i64>,
    /// Duration minutes component
    pub duration_minutes: Option<i64>,
    /// Duration seconds component
    pub duration_seconds: Option<i64>,
}

/// The main database handle
///
/// This wraps a SQLite connection and provides high-level methods for
/// storing and retrieving PaceMates data. The connection mutex serializes
/// individual statements; whole-operation serialization for racy pairs is
/// the invite service's pair-lock concern.
pub struct Database {
    /// The underlying SQLite connection
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open or create a database
    ///
    /// If path is None, creates an in-memory database (useful for testing).
    pub async fn open(path: Option<&str>) -> Result<Self> {
        let conn = match path {
            Some(p) => Connection::open(p)
                .map_err(|e| Error::DatabaseError(format!("Failed to open database: {}", e)))?,
            None => Connection::open_in_memory().map_err(|e| {
                Error::DatabaseError(format!("Failed to create in-memory database: {}", e))
            })?,
        };

        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };

        db.init_schema()?;

        Ok(db)
    }

    /// Initialize the database schema
    fn init_schema(&self) -> Result<()> {
        let conn = self.conn.lock();

        let version: Option<i32> = conn
            .query_row("SELECT version FROM schema_version LIMIT 1", [], |row| {
                row.get(0)
            })
            .ok();

        match version {
            None => {
                // Fresh database, create all tables
                conn.execute_batch(schema::CREATE_TABLES)
                    .map_err(|e| Error::DatabaseError(format!("Failed to create tables: {}", e)))?;

                conn.execute(
                    "INSERT INTO schema_version (version) VALUES (?)",
                    params![schema::SCHEMA_VERSION],
                )
                .map_err(|e| {
                    Error::DatabaseError(format!("Failed to set schema version: {}", e))
                })?;

                tracing::info!("Database schema created (version {})", schema::SCHEMA_VERSION);
            }
            Some(v) if v < schema::SCHEMA_VERSION => {
                tracing::info!(
                    "Database schema version {} is older than current {}, running migrations",
                    v,
                    schema::SCHEMA_VERSION
                );

                if v < 2 {
                    tracing::info!("Running migration v1 → v2 (friend invites, friend sets)");
                    conn.execute_batch(schema::MIGRATE_V1_TO_V2)
                        .map_err(|e| {
                            Error::DatabaseError(format!("Migration v1→v2 failed: {}", e))
                        })?;
                }

                tracing::info!(
                    "All migrations complete (now at version {})",
                    schema::SCHEMA_VERSION
                );
            }
            Some(v) => {
                tracing::debug!("Database schema version: {}", v);
            }
        }

        Ok(())
    }

    // ========================================================================
    // ACCOUNT OPERATIONS
    // ========================================================================

    /// Create a new account; returns its assigned id
    pub fn create_account(
        &self,
        email: Option<&str>,
        username: &str,
        password_hash: &str,
        role: Option<&str>,
    ) -> Result<i64> {
        let conn = self.conn.lock();
        let now = crate::time::now_timestamp();

        conn.execute(
            "INSERT INTO accounts (email, username, password_hash, role, friends, created_at, updated_at)
             VALUES (?, ?, ?, ?, '[]', ?, ?)",
            params![email, username, password_hash, role, now, now],
        )
        .map_err(|e| Error::DatabaseError(format!("Failed to create account: {}", e)))?;

        Ok(conn.last_insert_rowid())
    }

    /// Get an account by id
    pub fn get_account(&self, id: i64) -> Result<Option<AccountRecord>> {
        let conn = self.conn.lock();

        let result = conn.query_row(
            "SELECT id, email, username, password_hash, role, friends, created_at, updated_at
             FROM accounts WHERE id = ?",
            params![id],
            row_to_account,
        );

        match result {
            Ok(record) => Ok(Some(record)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(Error::DatabaseError(format!("Failed to get account: {}", e))),
        }
    }

    /// Get an account by username
    pub fn get_account_by_username(&self, username: &str) -> Result<Option<AccountRecord>> {
        let conn = self.conn.lock();

        let result = conn.query_row(
            "SELECT id, email, username, password_hash, role, friends, created_at, updated_at
             FROM accounts WHERE username = ?",
            params![username],
            row_to_account,
        );

        match result {
            Ok(record) => Ok(Some(record)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(Error::DatabaseError(format!("Failed to get account: {}", e))),
        }
    }

    /// Get an account by email
    pub fn get_account_by_email(&self, email: &str) -> Result<Option<AccountRecord>> {
        let conn = self.conn.lock();

        let result = conn.query_row(
            "SELECT id, email, username, password_hash, role, friends, created_at, updated_at
             FROM accounts WHERE email = ?",
            params![email],
            row_to_account,
        );

        match result {
            Ok(record) => Ok(Some(record)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(Error::DatabaseError(format!("Failed to get account: {}", e))),
        }
    }

    /// Get all accounts
    pub fn get_all_accounts(&self) -> Result<Vec<AccountRecord>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(
                "SELECT id, email, username, password_hash, role, friends, created_at, updated_at
                 FROM accounts ORDER BY username",
            )
            .map_err(|e| Error::DatabaseError(format!("Failed to prepare query: {}", e)))?;

        let rows = stmt
            .query_map([], row_to_account)
            .map_err(|e| Error::DatabaseError(format!("Failed to query accounts: {}", e)))?;

        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| Error::DatabaseError(format!("Failed to read account row: {}", e)))
    }

    /// Search accounts by username or email substring
    pub fn search_accounts(&self, term: &str) -> Result<Vec<AccountRecord>> {
        let conn = self.conn.lock();
        let pattern = format!("%{}%", term);

        let mut stmt = conn
            .prepare(
                "SELECT id, email, username, password_hash, role, friends, created_at, updated_at
                 FROM accounts WHERE username LIKE ? OR email LIKE ? ORDER BY username",
            )
            .map_err(|e| Error::DatabaseError(format!("Failed to prepare query: {}", e)))?;

        let rows = stmt
            .query_map(params![pattern, pattern], row_to_account)
            .map_err(|e| Error::DatabaseError(format!("Failed to search accounts: {}", e)))?;

        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| Error::DatabaseError(format!("Failed to read account row: {}", e)))
    }

    /// Update an account's profile fields; returns false if the id is unknown
    pub fn update_account(
        &self,
        id: i64,
        email: Option<&str>,
        username: &str,
        password_hash: &str,
        role: Option<&str>,
    ) -> Result<bool> {
        let conn = self.conn.lock();
        let now = crate::time::now_timestamp();

        let changed = conn
            .execute(
                "UPDATE accounts SET email = ?, username = ?, password_hash = ?, role = ?, updated_at = ?
                 WHERE id = ?",
                params![email, username, password_hash, role, now, id],
            )
            .map_err(|e| Error::DatabaseError(format!("Failed to update account: {}", e)))?;

        Ok(changed > 0)
    }

    /// Delete an account; returns false if the id is unknown
    pub fn delete_account(&self, id: i64) -> Result<bool> {
        let conn = self.conn.lock();

        let changed = conn
            .execute("DELETE FROM accounts WHERE id = ?", params![id])
            .map_err(|e| Error::DatabaseError(format!("Failed to delete account: {}", e)))?;

        Ok(changed > 0)
    }

    /// Get an account's friend set
    pub fn get_friend_ids(&self, id: i64) -> Result<BTreeSet<i64>> {
        let conn = self.conn.lock();
        read_friend_set(&conn, id)
    }

    // ========================================================================
    // INVITE OPERATIONS
    // ========================================================================

    /// Insert a new pending invite; returns the stored row
    pub fn create_invite(&self, sender_id: i64, receiver_id: i64) -> Result<InviteRecord> {
        let conn = self.conn.lock();
        let now = crate::time::now_timestamp();

        conn.execute(
            "INSERT INTO friend_invites (sender_id, receiver_id, status, created_at)
             VALUES (?, ?, 'pending', ?)",
            params![sender_id, receiver_id, now],
        )
        .map_err(|e| Error::DatabaseError(format!("Failed to create invite: {}", e)))?;

        Ok(InviteRecord {
            id: conn.last_insert_rowid(),
            sender_id,
            receiver_id,
            status: "pending".to_string(),
            created_at: now,
        })
    }

    /// Get an invite by id, regardless of parties or status
    pub fn get_invite(&self, id: i64) -> Result<Option<InviteRecord>> {
        let conn = self.conn.lock();

        let result = conn.query_row(
            "SELECT id, sender_id, receiver_id, status, created_at
             FROM friend_invites WHERE id = ?",
            params![id],
            row_to_invite,
        );

        match result {
            Ok(record) => Ok(Some(record)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(Error::DatabaseError(format!("Failed to get invite: {}", e))),
        }
    }

    /// Get a pending invite by id, scoped to its receiver
    pub fn get_pending_invite_for_receiver(
        &self,
        id: i64,
        receiver_id: i64,
    ) -> Result<Option<InviteRecord>> {
        let conn = self.conn.lock();

        let result = conn.query_row(
            "SELECT id, sender_id, receiver_id, status, created_at
             FROM friend_invites WHERE id = ? AND receiver_id = ? AND status = 'pending'",
            params![id, receiver_id],
            row_to_invite,
        );

        match result {
            Ok(record) => Ok(Some(record)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(Error::DatabaseError(format!("Failed to get invite: {}", e))),
        }
    }

    /// Get an invite by id, scoped to its sender (any status)
    pub fn get_invite_for_sender(&self, id: i64, sender_id: i64) -> Result<Option<InviteRecord>> {
        let conn = self.conn.lock();

        let result = conn.query_row(
            "SELECT id, sender_id, receiver_id, status, created_at
             FROM friend_invites WHERE id = ? AND sender_id = ?",
            params![id, sender_id],
            row_to_invite,
        );

        match result {
            Ok(record) => Ok(Some(record)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(Error::DatabaseError(format!("Failed to get invite: {}", e))),
        }
    }

    /// Find the pending invite for an ordered (sender, receiver) pair
    pub fn find_pending_invite(
        &self,
        sender_id: i64,
        receiver_id: i64,
    ) -> Result<Option<InviteRecord>> {
        let conn = self.conn.lock();

        let result = conn.query_row(
            "SELECT id, sender_id, receiver_id, status, created_at
             FROM friend_invites
             WHERE sender_id = ? AND receiver_id = ? AND status = 'pending'",
            params![sender_id, receiver_id],
            row_to_invite,
        );

        match result {
            Ok(record) => Ok(Some(record)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(Error::DatabaseError(format!("Failed to find invite: {}", e))),
        }
    }

    /// Get all pending invites addressed to a user, in store order
    pub fn get_pending_invites_for(&self, receiver_id: i64) -> Result<Vec<InviteRecord>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(
                "SELECT id, sender_id, receiver_id, status, created_at
                 FROM friend_invites WHERE receiver_id = ? AND status = 'pending'",
            )
            .map_err(|e| Error::DatabaseError(format!("Failed to prepare query: {}", e)))?;

        let rows = stmt
            .query_map(params![receiver_id], row_to_invite)
            .map_err(|e| Error::DatabaseError(format!("Failed to query invites: {}", e)))?;

        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| Error::DatabaseError(format!("Failed to read invite row: {}", e)))
    }

    /// Delete an invite row; returns false if the id is unknown
    pub fn delete_invite(&self, id: i64) -> Result<bool> {
        let conn = self.conn.lock();

        let changed = conn
            .execute("DELETE FROM friend_invites WHERE id = ?", params![id])
            .map_err(|e| Error::DatabaseError(format!("Failed to delete invite: {}", e)))?;

        Ok(changed > 0)
    }

    // ========================================================================
    // TRANSACTIONAL UNITS
    //
    // The two cross-entity mutation pairs of the friend graph. Each runs in
    // a single SQLite transaction: either every write lands or none does.
    // ========================================================================

    /// Accept a pending invite: mark it accepted and add both friend edges
    ///
    /// Fails with [`Error::InviteNotFound`] if the invite is no longer
    /// pending by the time the transaction runs (the caller's re-check under
    /// its pair lock), and [`Error::AccountNotFound`] if either party has
    /// vanished. On any failure the transaction rolls back untouched.
    pub fn accept_invite_tx(
        &self,
        invite_id: i64,
        sender_id: i64,
        receiver_id: i64,
    ) -> Result<InviteRecord> {
        let mut conn = self.conn.lock();
        let now = crate::time::now_timestamp();

        let tx = conn
            .transaction()
            .map_err(|e| Error::DatabaseError(format!("Failed to begin transaction: {}", e)))?;

        let changed = tx
            .execute(
                "UPDATE friend_invites SET status = 'accepted'
                 WHERE id = ? AND receiver_id = ? AND status = 'pending'",
                params![invite_id, receiver_id],
            )
            .map_err(|e| Error::DatabaseError(format!("Failed to accept invite: {}", e)))?;
        if changed == 0 {
            return Err(Error::InviteNotFound);
        }

        add_friend_edge(&tx, sender_id, receiver_id, now)?;
        add_friend_edge(&tx, receiver_id, sender_id, now)?;

        let record = tx
            .query_row(
                "SELECT id, sender_id, receiver_id, status, created_at
                 FROM friend_invites WHERE id = ?",
                params![invite_id],
                row_to_invite,
            )
            .map_err(|e| Error::DatabaseError(format!("Failed to read invite: {}", e)))?;

        tx.commit()
            .map_err(|e| Error::DatabaseError(format!("Failed to commit acceptance: {}", e)))?;

        Ok(record)
    }

    /// Sever a friendship: remove both edges and every invite between the pair
    ///
    /// Invites are deleted regardless of direction or status so that a
    /// future invite between the two ids is not blocked by stale history.
    /// Fails with [`Error::AccountNotFound`] if either account has vanished;
    /// nothing is committed on that path.
    pub fn sever_friendship_tx(&self, id_a: i64, id_b: i64) -> Result<()> {
        let mut conn = self.conn.lock();
        let now = crate::time::now_timestamp();

        let tx = conn
            .transaction()
            .map_err(|e| Error::DatabaseError(format!("Failed to begin transaction: {}", e)))?;

        remove_friend_edge(&tx, id_a, id_b, now)?;
        remove_friend_edge(&tx, id_b, id_a, now)?;

        tx.execute(
            "DELETE FROM friend_invites
             WHERE (sender_id = ? AND receiver_id = ?) OR (sender_id = ? AND receiver_id = ?)",
            params![id_a, id_b, id_b, id_a],
        )
        .map_err(|e| Error::DatabaseError(format!("Failed to delete stale invites: {}", e)))?;

        tx.commit()
            .map_err(|e| Error::DatabaseError(format!("Failed to commit unfriend: {}", e)))?;

        Ok(())
    }

    // ========================================================================
    // RUN OPERATIONS
    // ========================================================================

    /// Insert a new run; returns its assigned id
    pub fn create_run(&self, run: &RunRecord) -> Result<i64> {
        let conn = self.conn.lock();

        conn.execute(
            "INSERT INTO runs (user_id, label, mileage, duration_hours, duration_minutes, duration_seconds)
             VALUES (?, ?, ?, ?, ?, ?)",
            params![
                run.user_id,
                run.label,
                run.mileage,
                run.duration_hours,
                run.duration_minutes,
                run.duration_seconds,
            ],
        )
        .map_err(|e| Error::DatabaseError(format!("Failed to create run: {}", e)))?;

        Ok(conn.last_insert_rowid())
    }

    /// Get a run by id
    pub fn get_run(&self, id: i64) -> Result<Option<RunRecord>> {
        let conn = self.conn.lock();

        let result = conn.query_row(
            "SELECT id, user_id, label, mileage, duration_hours, duration_minutes, duration_seconds
             FROM runs WHERE id = ?",
            params![id],
            row_to_run,
        );

        match result {
            Ok(record) => Ok(Some(record)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(Error::DatabaseError(format!("Failed to get run: {}", e))),
        }
    }

    /// Get all runs for a user
    pub fn get_runs_by_user(&self, user_id: i64) -> Result<Vec<RunRecord>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(
                "SELECT id, user_id, label, mileage, duration_hours, duration_minutes, duration_seconds
                 FROM runs WHERE user_id = ?",
            )
            .map_err(|e| Error::DatabaseError(format!("Failed to prepare query: {}", e)))?;

        let rows = stmt
            .query_map(params![user_id], row_to_run)
            .map_err(|e| Error::DatabaseError(format!("Failed to query runs: {}", e)))?;

        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| Error::DatabaseError(format!("Failed to read run row: {}", e)))
    }

    /// Get all runs
    pub fn get_all_runs(&self) -> Result<Vec<RunRecord>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(
                "SELECT id, user_id, label, mileage, duration_hours, duration_minutes, duration_seconds
                 FROM runs",
            )
            .map_err(|e| Error::DatabaseError(format!("Failed to prepare query: {}", e)))?;

        let rows = stmt
            .query_map([], row_to_run)
            .map_err(|e| Error::DatabaseError(format!("Failed to query runs: {}", e)))?;

        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| Error::DatabaseError(format!("Failed to read run row: {}", e)))
    }

    /// Update a run's fields; returns false if the id is unknown
    pub fn update_run(&self, run: &RunRecord) -> Result<bool> {
        let conn = self.conn.lock();

        let changed = conn
            .execute(
                "UPDATE runs SET label = ?, mileage = ?, duration_hours = ?, duration_minutes = ?, duration_seconds = ?
                 WHERE id = ?",
                params![
                    run.label,
                    run.mileage,
                    run.duration_hours,
                    run.duration_minutes,
                    run.duration_seconds,
                    run.id,
                ],
            )
            .map_err(|e| Error::DatabaseError(format!("Failed to update run: {}", e)))?;

        Ok(changed > 0)
    }

    /// Delete a run; returns false if the id is unknown
    pub fn delete_run(&self, id: i64) -> Result<bool> {
        let conn = self.conn.lock();

        let changed = conn
            .execute("DELETE FROM runs WHERE id = ?", params![id])
            .map_err(|e| Error::DatabaseError(format!("Failed to delete run: {}", e)))?;

        Ok(changed > 0)
    }
}

// ============================================================================
// ROW MAPPERS & FRIEND-SET HELPERS
// ============================================================================

fn row_to_account(row: &rusqlite::Row<'_>) -> rusqlite::Result<AccountRecord> {
    Ok(AccountRecord {
        id: row.get(0)?,
        email: row.get(1)?,
        username: row.get(2)?,
        password_hash: row.get(3)?,
        role: row.get(4)?,
        friends: row.get(5)?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

fn row_to_invite(row: &rusqlite::Row<'_>) -> rusqlite::Result<InviteRecord> {
    Ok(InviteRecord {
        id: row.get(0)?,
        sender_id: row.get(1)?,
        receiver_id: row.get(2)?,
        status: row.get(3)?,
        created_at: row.get(4)?,
    })
}

fn row_to_run(row: &rusqlite::Row<'_>) -> rusqlite::Result<RunRecord> {
    Ok(RunRecord {
        id: row.get(0)?,
        user_id: row.get(1)?,
        label: row.get(2)?,
        mileage: row.get(3)?,
        duration_hours: row.get(4)?,
        duration_minutes: row.get(5)?,
        duration_seconds: row.get(6)?,
    })
}

/// Decode an account's friend set, failing if the account is missing
fn read_friend_set(conn: &Connection, id: i64) -> Result<BTreeSet<i64>> {
    let json: String = conn
        .query_row(
            "SELECT friends FROM accounts WHERE id = ?",
            params![id],
            |row| row.get(0),
        )
        .map_err(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => Error::AccountNotFound,
            e => Error::DatabaseError(format!("Failed to read friend set: {}", e)),
        })?;

    let ids: BTreeSet<i64> = serde_json::from_str(&json)?;
    Ok(ids)
}

fn write_friend_set(conn: &Connection, id: i64, friends: &BTreeSet<i64>, now: i64) -> Result<()> {
    let json = serde_json::to_string(friends)?;
    conn.execute(
        "UPDATE accounts SET friends = ?, updated_at = ? WHERE id = ?",
        params![json, now, id],
    )
    .map_err(|e| Error::DatabaseError(format!("Failed to write friend set: {}", e)))?;
    Ok(())
}

/// Add `other` to `id`'s friend set (idempotent, never self-referential)
fn add_friend_edge(conn: &Connection, id: i64, other: i64, now: i64) -> Result<()> {
    let mut friends = read_friend_set(conn, id)?;
    if other != id && friends.insert(other) {
        write_friend_set(conn, id, &friends, now)?;
    }
    Ok(())
}

/// Remove `other` from `id`'s friend set
fn remove_friend_edge(conn: &Connection, id: i64, other: i64, now: i64) -> Result<()> {
    let mut friends = read_friend_set(conn, id)?;
    if friends.remove(&other) {
        write_friend_set(conn, id, &friends, now)?;
    }
    Ok(())
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    async fn open_db() -> Database {
        Database::open(None).await.unwrap()
    }

    #[tokio::test]
    async fn test_account_crud() {
        let db = open_db().await;

        let id = db
            .create_account(Some("alice@example.com"), "alice", "hash", Some("user"))
            .unwrap();
        assert!(id > 0);

        let account = db.get_account(id).unwrap().unwrap();
        assert_eq!(account.username, "alice");
        assert_eq!(account.friends, "[]");

        assert!(db.get_account(id + 100).unwrap().is_none());

        assert!(db.delete_account(id).unwrap());
        assert!(db.get_account(id).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_invite_rows() {
        let db = open_db().await;
        let a = db.create_account(None, "a", "h", None).unwrap();
        let b = db.create_account(None, "b", "h", None).unwrap();

        let invite = db.create_invite(a, b).unwrap();
        assert_eq!(invite.status, "pending");

        // Receiver-scoped lookup only matches the real receiver
        assert!(db
            .get_pending_invite_for_receiver(invite.id, b)
            .unwrap()
            .is_some());
        assert!(db
            .get_pending_invite_for_receiver(invite.id, a)
            .unwrap()
            .is_none());

        assert!(db.find_pending_invite(a, b).unwrap().is_some());
        assert!(db.find_pending_invite(b, a).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_accept_tx_is_symmetric() {
        let db = open_db().await;
        let a = db.create_account(None, "a", "h", None).unwrap();
        let b = db.create_account(None, "b", "h", None).unwrap();
        let invite = db.create_invite(a, b).unwrap();

        let accepted = db.accept_invite_tx(invite.id, a, b).unwrap();
        assert_eq!(accepted.status, "accepted");

        assert!(db.get_friend_ids(a).unwrap().contains(&b));
        assert!(db.get_friend_ids(b).unwrap().contains(&a));
    }

    #[tokio::test]
    async fn test_accept_tx_rolls_back_on_missing_party() {
        let db = open_db().await;
        let a = db.create_account(None, "a", "h", None).unwrap();
        let b = db.create_account(None, "b", "h", None).unwrap();
        let invite = db.create_invite(a, b).unwrap();

        // Sender disappears before acceptance commits
        db.delete_account(a).unwrap();
        let err = db.accept_invite_tx(invite.id, a, b).unwrap_err();
        assert!(matches!(err, Error::AccountNotFound));

        // Rollback: the invite is still pending and no edge was written
        let invite = db.get_invite(invite.id).unwrap().unwrap();
        assert_eq!(invite.status, "pending");
        assert!(db.get_friend_ids(b).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_sever_tx_removes_edges_and_invites() {
        let db = open_db().await;
        let a = db.create_account(None, "a", "h", None).unwrap();
        let b = db.create_account(None, "b", "h", None).unwrap();
        let invite = db.create_invite(a, b).unwrap();
        db.accept_invite_tx(invite.id, a, b).unwrap();

        db.sever_friendship_tx(a, b).unwrap();

        assert!(db.get_friend_ids(a).unwrap().is_empty());
        assert!(db.get_friend_ids(b).unwrap().is_empty());
        assert!(db.get_invite(invite.id).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_run_crud() {
        let db = open_db().await;
        let run = RunRecord {
            id: 0,
            user_id: 1,
            label: Some("morning loop".into()),
            mileage: 3.2,
            duration_hours: Some(0),
            duration_minutes: Some(28),
            duration_seconds: Some(41),
        };

        let id = db.create_run(&run).unwrap();
        let stored = db.get_run(id).unwrap().unwrap();
        assert_eq!(stored.label.as_deref(), Some("morning loop"));
        assert_eq!(stored.duration_minutes, Some(28));

        let updated = RunRecord {
            id,
            mileage: 3.5,
            ..stored
        };
        assert!(db.update_run(&updated).unwrap());
        assert_eq!(db.get_run(id).unwrap().unwrap().mileage, 3.5);

        assert!(db.delete_run(id).unwrap());
        assert!(db.get_run(id).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_migration_v1_to_v2() {
        // Build a v1 database by hand, then reopen it through Database::open
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pacemates.db");
        let path = path.to_str().unwrap();

        {
            let conn = Connection::open(path).unwrap();
            conn.execute_batch(
                "CREATE TABLE schema_version (version INTEGER PRIMARY KEY);
                 INSERT INTO schema_version (version) VALUES (1);
                 CREATE TABLE accounts (
                     id INTEGER PRIMARY KEY AUTOINCREMENT,
                     email TEXT,
                     username TEXT NOT NULL UNIQUE,
                     password_hash TEXT NOT NULL,
                     role TEXT,
                     created_at INTEGER NOT NULL,
                     updated_at INTEGER NOT NULL
                 );
                 INSERT INTO accounts (email, username, password_hash, created_at, updated_at)
                 VALUES ('a@example.com', 'a', 'h', 0, 0);",
            )
            .unwrap();
        }

        let db = Database::open(Some(path)).await.unwrap();

        // Migrated accounts get an empty friend set, and invites work
        let account = db.get_account(1).unwrap().unwrap();
        assert_eq!(account.friends, "[]");
        let b = db.create_account(None, "b", "h", None).unwrap();
        assert!(db.create_invite(1, b).is_ok());
    }
}
