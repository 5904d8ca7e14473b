//! # Error Handling
//!
//! Crate-wide error types for PaceMates Core.
//!
//! ## Error Hierarchy
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                           ERROR HIERARCHY                               │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  Error (top-level)                                                      │
//! │  │                                                                      │
//! │  ├── Account Errors                                                     │
//! │  │   ├── AccountNotFound       - No account with that id                │
//! │  │   ├── UsernameTaken         - Username already registered            │
//! │  │   └── InvalidCredentials    - Password verification failed           │
//! │  │                                                                      │
//! │  ├── Invite / Friend Errors                                             │
//! │  │   ├── InviteNotFound        - No invite under caller's scope         │
//! │  │   ├── NotFriends            - Pair is not mutually friended          │
//! │  │   ├── AlreadyFriends        - Pair already mutually friended         │
//! │  │   ├── InvitePending         - Duplicate pending invite               │
//! │  │   └── CannotInviteSelf      - Sender and receiver are the same       │
//! │  │                                                                      │
//! │  ├── Run Errors                                                         │
//! │  │   └── RunNotFound           - No run record with that id             │
//! │  │                                                                      │
//! │  └── Infrastructure Errors                                              │
//! │      ├── DatabaseError         - SQLite failure, propagated unchanged   │
//! │      └── SerializationError    - JSON encode/decode failure             │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Validation outcomes come in exactly two kinds a transport layer cares
//! about: *not found* (the entity is absent, or absent under the caller's
//! authorization scope) and *invalid request* (the operation is well-formed
//! but the graph state forbids it). [`Error::is_not_found`] and
//! [`Error::is_invalid_request`] expose that split; anything that is neither
//! is an infrastructure fault and carries no partial state with it.

use thiserror::Error;

/// Result type alias for PaceMates Core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for PaceMates Core
///
/// All errors are categorized by module/domain to make error handling
/// clearer and to provide meaningful error messages to API consumers.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Account Errors (200-299)
    // ========================================================================

    /// No account exists with the requested id
    #[error("Account not found.")]
    AccountNotFound,

    /// Username is already registered
    #[error("Username already exists.")]
    UsernameTaken,

    /// Password verification failed
    #[error("Invalid email or password.")]
    InvalidCredentials,

    // ========================================================================
    // Invite / Friend Errors (300-399)
    // ========================================================================

    /// No invite exists with that id under the caller's scope
    #[error("Friend invite not found.")]
    InviteNotFound,

    /// The two accounts are not mutually friended
    #[error("These users are not friends.")]
    NotFriends,

    /// The two accounts are already mutually friended
    #[error("Already friends with this user.")]
    AlreadyFriends,

    /// A pending invite already exists for this sender/receiver pair
    #[error("A friend invite is already pending for this user.")]
    InvitePending,

    /// Sender and receiver are the same account
    #[error("Cannot send a friend invite to yourself.")]
    CannotInviteSelf,

    // ========================================================================
    // Run Errors (400-499)
    // ========================================================================

    /// No run record exists with the requested id
    #[error("Run not found.")]
    RunNotFound,

    // ========================================================================
    // Infrastructure Errors (500-599)
    // ========================================================================

    /// Database error
    #[error("Database error: {0}")]
    DatabaseError(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl Error {
    /// Get the numeric error code for transport layers
    ///
    /// Error codes are organized by category:
    /// - 200-299: Accounts
    /// - 300-399: Invites / friend graph
    /// - 400-499: Runs
    /// - 500-599: Infrastructure
    pub fn code(&self) -> i32 {
        match self {
            // Accounts (200-299)
            Error::AccountNotFound => 200,
            Error::UsernameTaken => 210,
            Error::InvalidCredentials => 211,

            // Invites (300-399)
            Error::InviteNotFound => 300,
            Error::NotFriends => 301,
            Error::CannotInviteSelf => 310,
            Error::AlreadyFriends => 311,
            Error::InvitePending => 312,

            // Runs (400-499)
            Error::RunNotFound => 400,

            // Infrastructure (500-599)
            Error::DatabaseError(_) => 500,
            Error::SerializationError(_) => 501,
        }
    }

    /// True when the entity is absent, or absent under the caller's scope
    ///
    /// `NotFriends` counts as not-found: unfriending a pair that is not
    /// currently friended behaves like operating on a missing edge.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Error::AccountNotFound
                | Error::InviteNotFound
                | Error::RunNotFound
                | Error::NotFriends
        )
    }

    /// True when the request is well-formed but the current state forbids it
    pub fn is_invalid_request(&self) -> bool {
        matches!(
            self,
            Error::UsernameTaken
                | Error::InvalidCredentials
                | Error::CannotInviteSelf
                | Error::AlreadyFriends
                | Error::InvitePending
        )
    }
}

// ============================================================================
// ERROR CONVERSIONS
// ============================================================================

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Error::DatabaseError(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::SerializationError(err.to_string())
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(Error::AccountNotFound.code(), 200);
        assert_eq!(Error::InviteNotFound.code(), 300);
        assert_eq!(Error::RunNotFound.code(), 400);
        assert_eq!(Error::DatabaseError("test".into()).code(), 500);
    }

    #[test]
    fn test_error_kinds() {
        assert!(Error::AccountNotFound.is_not_found());
        assert!(Error::NotFriends.is_not_found());
        assert!(Error::InvitePending.is_invalid_request());
        assert!(Error::CannotInviteSelf.is_invalid_request());

        // Infrastructure faults are neither kind
        let db_err = Error::DatabaseError("locked".into());
        assert!(!db_err.is_not_found());
        assert!(!db_err.is_invalid_request());
    }

    #[test]
    fn test_sqlite_conversion() {
        let err: Error = rusqlite::Error::QueryReturnedNoRows.into();
        assert!(matches!(err, Error::DatabaseError(_)));
    }
}
