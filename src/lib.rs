//! # PaceMates Core
//!
//! Backend core for PaceMates, a run-tracking service with a social layer:
//! accounts, friend invites, and activity logs over one SQLite store.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       PACEMATES CORE MODULES                            │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  ┌──────────────┐   ┌──────────────────┐   ┌──────────────┐            │
//! │  │   Accounts   │   │     Invites      │   │     Runs     │            │
//! │  │              │   │                  │   │              │            │
//! │  │ - Register   │   │ - Create/Accept  │   │ - Log run    │            │
//! │  │ - Auth       │   │ - Reject/Withdraw│   │ - Durations  │            │
//! │  │ - Friends    │   │ - Unfriend       │   │ - Mileage    │            │
//! │  └──────┬───────┘   └────────┬─────────┘   └──────┬───────┘            │
//! │         │                    │                    │                    │
//! │         └────────────────────┴────────────────────┘                    │
//! │                              │                                         │
//! │                    ┌─────────▼─────────┐                               │
//! │                    │      Storage      │                               │
//! │                    │                   │                               │
//! │                    │ - SQLite          │                               │
//! │                    │ - Transactions    │                               │
//! │                    │ - Migrations      │                               │
//! │                    └───────────────────┘                               │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Hierarchy
//!
//! - [`error`] - Error types for the entire library
//! - [`storage`] - SQLite persistence (schema, migrations, transactions)
//! - [`accounts`] - Account registration, authentication, friend lists
//! - [`invites`] - Friend-invite lifecycle and friend-graph consistency
//! - [`runs`] - Activity log CRUD
//!
//! ## Consistency Model
//!
//! The friend graph is the only state with non-trivial invariants:
//! friendship is symmetric, nobody is their own friend, and at most one
//! pending invite exists per ordered sender/receiver pair. The invite
//! manager enforces these with two mechanisms layered on the store:
//!
//! 1. Every cross-entity mutation pair (the two friend-set writes of an
//!    acceptance, the two removals of an unfriend plus its invite cleanup)
//!    commits as one SQLite transaction.
//! 2. Every graph-mutating operation serializes on an in-process lock keyed
//!    by the unordered account-id pair, so racing reciprocal invites cannot
//!    double-accept and racing duplicates cannot both insert.
//!
//! Services are constructed with their dependencies ([`storage::Database`],
//! a [`accounts::PasswordHasher`]) passed in explicitly; the crate holds no
//! process-wide mutable state.
//!
//! ## Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use pacemates_core::accounts::{AccountService, Sha256PasswordHasher};
//! use pacemates_core::invites::InviteService;
//! use pacemates_core::storage::Database;
//!
//! # async fn demo() -> pacemates_core::Result<()> {
//! let db = Arc::new(Database::open(Some("pacemates.db")).await?);
//! let accounts = AccountService::new(db.clone(), Arc::new(Sha256PasswordHasher));
//! let invites = InviteService::new(db.clone());
//!
//! let alice = accounts.create_account(None, "alice", "hunter2", None)?;
//! let bob = accounts.create_account(None, "bob", "hunter2", None)?;
//!
//! let invite = invites.create_invite(alice.id, bob.id)?;
//! invites.accept_invite(bob.id, invite.id)?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

// ============================================================================
// MODULE DECLARATIONS
// ============================================================================

pub mod accounts;
pub mod error;
pub mod invites;
pub mod runs;
pub mod storage;
/// Time utilities for persisted timestamps.
pub mod time;

// ============================================================================
// RE-EXPORTS
// ============================================================================

pub use accounts::{Account, AccountService, PasswordHasher, Sha256PasswordHasher};
pub use error::{Error, Result};
pub use invites::{FriendInvite, InviteService, InviteStatus};
pub use runs::{Run, RunService};
pub use storage::Database;
