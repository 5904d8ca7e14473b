//! # Accounts Module
//!
//! Account registration, authentication, and profile management.
//!
//! The invite manager consumes two things from here: account lookup by id
//! and the friend-set field. Everything else is field-level CRUD with no
//! cross-entity invariants; the friend set itself is only ever written by
//! the invite manager's transactional units.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::storage::{AccountRecord, Database};

/// A registered user account
///
/// The password hash stays inside the storage layer; this type is safe to
/// hand to a transport layer as-is.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    /// Unique id, assigned at registration, immutable
    pub id: i64,
    /// Contact / login address
    pub email: Option<String>,
    /// Display handle, unique across accounts
    pub username: String,
    /// Coarse authorization role
    pub role: Option<String>,
    /// Ids of this account's friends; symmetric across every pair
    pub friends: BTreeSet<i64>,
    /// When the account was created (Unix timestamp)
    pub created_at: i64,
    /// Last profile or friend-set update
    pub updated_at: i64,
}

impl TryFrom<AccountRecord> for Account {
    type Error = Error;

    fn try_from(record: AccountRecord) -> Result<Self> {
        let friends: BTreeSet<i64> = serde_json::from_str(&record.friends)?;
        Ok(Self {
            id: record.id,
            email: record.email,
            username: record.username,
            role: record.role,
            friends,
            created_at: record.created_at,
            updated_at: record.updated_at,
        })
    }
}

/// Password hashing seam, injected into the account service
pub trait PasswordHasher: Send + Sync {
    /// Hash a plaintext password for storage
    fn hash_password(&self, password: &str) -> String;
    /// Verify a plaintext password against a stored hash
    fn verify_password(&self, password: &str, hash: &str) -> bool;
}

/// Salted SHA-256 password hasher
///
/// Stored form is `hex(salt)$hex(sha256(salt || password))` with a random
/// 16-byte salt per password.
#[derive(Debug, Default)]
pub struct Sha256PasswordHasher;

impl Sha256PasswordHasher {
    fn digest(salt: &[u8], password: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(salt);
        hasher.update(password.as_bytes());
        hex::encode(hasher.finalize())
    }
}

impl PasswordHasher for Sha256PasswordHasher {
    fn hash_password(&self, password: &str) -> String {
        let salt: [u8; 16] = rand::random();
        format!("{}${}", hex::encode(salt), Self::digest(&salt, password))
    }

    fn verify_password(&self, password: &str, hash: &str) -> bool {
        let Some((salt_hex, digest)) = hash.split_once('$') else {
            return false;
        };
        let Ok(salt) = hex::decode(salt_hex) else {
            return false;
        };
        Self::digest(&salt, password) == digest
    }
}

/// Service for managing user accounts
pub struct AccountService {
    /// Database for persistence
    db: Arc<Database>,
    /// Password hashing strategy
    hasher: Arc<dyn PasswordHasher>,
}

impl AccountService {
    /// Create a new account service
    pub fn new(db: Arc<Database>, hasher: Arc<dyn PasswordHasher>) -> Self {
        Self { db, hasher }
    }

    /// Register a new account with a hashed password
    pub fn create_account(
        &self,
        email: Option<&str>,
        username: &str,
        password: &str,
        role: Option<&str>,
    ) -> Result<Account> {
        if self.db.get_account_by_username(username)?.is_some() {
            return Err(Error::UsernameTaken);
        }

        let hash = self.hasher.hash_password(password);
        let id = self.db.create_account(email, username, &hash, role)?;

        tracing::info!("Registered account {} ({})", id, username);
        let record = self.db.get_account(id)?.ok_or(Error::AccountNotFound)?;
        record.try_into()
    }

    /// Authenticate by email and password
    pub fn authenticate(&self, email: &str, password: &str) -> Result<Account> {
        let record = self
            .db
            .get_account_by_email(email)?
            .ok_or(Error::AccountNotFound)?;

        if !self.hasher.verify_password(password, &record.password_hash) {
            return Err(Error::InvalidCredentials);
        }

        tracing::debug!("Authenticated account {}", record.id);
        record.try_into()
    }

    /// Get an account by id
    pub fn get_account(&self, id: i64) -> Result<Account> {
        let record = self.db.get_account(id)?.ok_or(Error::AccountNotFound)?;
        record.try_into()
    }

    /// Get all accounts
    pub fn get_all_accounts(&self) -> Result<Vec<Account>> {
        self.db
            .get_all_accounts()?
            .into_iter()
            .map(Account::try_from)
            .collect()
    }

    /// Search accounts by username or email substring
    pub fn search_accounts(&self, term: &str) -> Result<Vec<Account>> {
        self.db
            .search_accounts(term)?
            .into_iter()
            .map(Account::try_from)
            .collect()
    }

    /// Update an account's profile, re-hashing the password
    pub fn update_account(
        &self,
        id: i64,
        email: Option<&str>,
        username: &str,
        password: &str,
        role: Option<&str>,
    ) -> Result<Account> {
        let hash = self.hasher.hash_password(password);
        if !self.db.update_account(id, email, username, &hash, role)? {
            return Err(Error::AccountNotFound);
        }

        tracing::info!("Updated account {}", id);
        let record = self.db.get_account(id)?.ok_or(Error::AccountNotFound)?;
        record.try_into()
    }

    /// Delete an account
    ///
    /// Deletion does not cascade into the friend graph; a dangling id in
    /// someone's friend set reads as NotFound at the point of use, and
    /// `get_friends` skips it.
    pub fn delete_account(&self, id: i64) -> Result<()> {
        if !self.db.delete_account(id)? {
            return Err(Error::AccountNotFound);
        }
        tracing::info!("Deleted account {}", id);
        Ok(())
    }

    /// Resolve an account's friend set to full account records
    ///
    /// Dangling ids (friends whose account was since deleted) are skipped.
    pub fn get_friends(&self, id: i64) -> Result<Vec<Account>> {
        let friend_ids = {
            let record = self.db.get_account(id)?.ok_or(Error::AccountNotFound)?;
            let friends: BTreeSet<i64> = serde_json::from_str(&record.friends)?;
            friends
        };

        let mut friends = Vec::with_capacity(friend_ids.len());
        for friend_id in friend_ids {
            if let Some(record) = self.db.get_account(friend_id)? {
                friends.push(record.try_into()?);
            }
        }
        Ok(friends)
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn service(db: Arc<Database>) -> AccountService {
        AccountService::new(db, Arc::new(Sha256PasswordHasher))
    }

    #[test]
    fn test_password_hash_roundtrip() {
        let hasher = Sha256PasswordHasher;
        let hash = hasher.hash_password("hunter2");

        assert!(hasher.verify_password("hunter2", &hash));
        assert!(!hasher.verify_password("hunter3", &hash));
        assert!(!hasher.verify_password("hunter2", "garbage"));

        // Salting: the same password hashes differently each time
        let other = hasher.hash_password("hunter2");
        assert_ne!(hash, other);
    }

    #[tokio::test]
    async fn test_register_and_authenticate() {
        let db = Arc::new(Database::open(None).await.unwrap());
        let service = service(db);

        let account = service
            .create_account(Some("alice@example.com"), "alice", "hunter2", Some("user"))
            .unwrap();
        assert_eq!(account.username, "alice");
        assert!(account.friends.is_empty());

        let authed = service.authenticate("alice@example.com", "hunter2").unwrap();
        assert_eq!(authed.id, account.id);

        let err = service.authenticate("alice@example.com", "wrong").unwrap_err();
        assert!(matches!(err, Error::InvalidCredentials));

        let err = service.authenticate("nobody@example.com", "hunter2").unwrap_err();
        assert!(matches!(err, Error::AccountNotFound));
    }

    #[tokio::test]
    async fn test_username_taken() {
        let db = Arc::new(Database::open(None).await.unwrap());
        let service = service(db);

        service.create_account(None, "alice", "pw", None).unwrap();
        let err = service.create_account(None, "alice", "pw2", None).unwrap_err();
        assert!(matches!(err, Error::UsernameTaken));
    }

    #[tokio::test]
    async fn test_update_and_delete() {
        let db = Arc::new(Database::open(None).await.unwrap());
        let service = service(db);

        let account = service.create_account(None, "alice", "pw", None).unwrap();
        let updated = service
            .update_account(account.id, Some("a@example.com"), "alice2", "pw2", None)
            .unwrap();
        assert_eq!(updated.username, "alice2");
        assert!(service.authenticate("a@example.com", "pw2").is_ok());

        service.delete_account(account.id).unwrap();
        let err = service.get_account(account.id).unwrap_err();
        assert!(matches!(err, Error::AccountNotFound));

        let err = service.delete_account(account.id).unwrap_err();
        assert!(matches!(err, Error::AccountNotFound));
    }

    #[tokio::test]
    async fn test_search_accounts() {
        let db = Arc::new(Database::open(None).await.unwrap());
        let service = service(db);

        service
            .create_account(Some("alice@example.com"), "alice", "pw", None)
            .unwrap();
        service
            .create_account(Some("bob@example.com"), "bob", "pw", None)
            .unwrap();

        let hits = service.search_accounts("ali").unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].username, "alice");

        // Email matches too
        let hits = service.search_accounts("example.com").unwrap();
        assert_eq!(hits.len(), 2);
    }

    #[tokio::test]
    async fn test_get_friends_skips_dangling_ids() {
        let db = Arc::new(Database::open(None).await.unwrap());
        let service = service(db.clone());

        let a = service.create_account(None, "alice", "pw", None).unwrap();
        let b = service.create_account(None, "bob", "pw", None).unwrap();
        let c = service.create_account(None, "carol", "pw", None).unwrap();

        let invites = crate::invites::InviteService::new(db.clone());
        let i1 = invites.create_invite(a.id, b.id).unwrap();
        invites.accept_invite(b.id, i1.id).unwrap();
        let i2 = invites.create_invite(a.id, c.id).unwrap();
        invites.accept_invite(c.id, i2.id).unwrap();

        assert_eq!(service.get_friends(a.id).unwrap().len(), 2);

        // Carol's account goes away without the graph being cleaned up
        service.delete_account(c.id).unwrap();
        let friends = service.get_friends(a.id).unwrap();
        assert_eq!(friends.len(), 1);
        assert_eq!(friends[0].username, "bob");
    }
}
