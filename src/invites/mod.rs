//! # Friend Invites Module
//!
//! Invite lifecycle management and friend-graph consistency.
//!
//! ## Invite Flow
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        FRIEND INVITE FLOW                               │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  Sender                                       Receiver                  │
//! │  ─────────────────────────────────────────────────────────────          │
//! │                                                                         │
//! │  create_invite(S, R)                                                    │
//! │  ┌─────────────────────┐                                                │
//! │  │ Validate:           │                                                │
//! │  │ • S != R            │                                                │
//! │  │ • both exist        │                                                │
//! │  │ • not friends       │   ──────────────────►  get_invites_by_user_id  │
//! │  │ • no duplicate      │                        ┌──────────────────┐    │
//! │  │ • reciprocal? ──────┼──► auto-accept         │ Accept / Reject  │    │
//! │  └─────────────────────┘                        └────────┬─────────┘    │
//! │           │                                              │              │
//! │           ▼                                              ▼              │
//! │  withdraw_invite(S, id)                       accept: both friend sets  │
//! │  deletes the pending row                      gain the other id in one  │
//! │                                               transaction               │
//! │                                               reject: row deleted, no   │
//! │                                               history kept              │
//! │                                                                         │
//! │  unfriend(A, B): removes both edges and every invite between the pair   │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Consistency Model
//!
//! Two invariants drive everything here: friendship is symmetric (`b` is in
//! `a`'s friend set exactly when `a` is in `b`'s), and at most one pending
//! invite exists per ordered pair. The storage layer guarantees the first by
//! committing both sides of an edge in one transaction; this module
//! guarantees the second by serializing every graph-mutating operation on an
//! in-process lock keyed by the unordered id pair. Two reciprocal
//! `create_invite` calls racing each other would otherwise both pass
//! validation and double-accept; under the pair lock one of them wins and
//! the other sees the already-created (or already-accepted) state.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::storage::{Database, InviteRecord};

/// Status of a friend invite
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InviteStatus {
    /// Waiting for the receiver's decision
    Pending,
    /// Accepted; the parties became friends at that moment
    Accepted,
    /// Rejected; the record is deleted right after the transition
    Rejected,
}

impl InviteStatus {
    /// Convert to database string
    pub fn as_str(&self) -> &'static str {
        match self {
            InviteStatus::Pending => "pending",
            InviteStatus::Accepted => "accepted",
            InviteStatus::Rejected => "rejected",
        }
    }

    /// Parse from database string
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(InviteStatus::Pending),
            "accepted" => Some(InviteStatus::Accepted),
            "rejected" => Some(InviteStatus::Rejected),
            _ => None,
        }
    }
}

/// A directed friend invite between two accounts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FriendInvite {
    /// Unique id, assigned by the store, never reused
    pub id: i64,
    /// Who sent the invite
    pub sender_id: i64,
    /// Who it is addressed to
    pub receiver_id: i64,
    /// Current lifecycle state
    pub status: InviteStatus,
    /// When it was created (Unix timestamp)
    pub created_at: i64,
}

impl TryFrom<InviteRecord> for FriendInvite {
    type Error = Error;

    fn try_from(record: InviteRecord) -> Result<Self> {
        let status = InviteStatus::parse(&record.status).ok_or_else(|| {
            Error::DatabaseError(format!("Unknown invite status '{}'", record.status))
        })?;
        Ok(Self {
            id: record.id,
            sender_id: record.sender_id,
            receiver_id: record.receiver_id,
            status,
            created_at: record.created_at,
        })
    }
}

/// Lock table keyed by the unordered account-id pair
///
/// Every graph-mutating operation on the pair `{a, b}` holds this lock from
/// validation through commit. Locks are created on first use and kept for
/// the lifetime of the service; the table stays small because keys are
/// account-id pairs that actually interacted.
struct PairLocks {
    inner: Mutex<HashMap<(i64, i64), Arc<Mutex<()>>>>,
}

impl PairLocks {
    fn new() -> Self {
        Self {
            inner: Mutex::new(HashMap::new()),
        }
    }

    /// Get the lock for an unordered pair
    fn for_pair(&self, a: i64, b: i64) -> Arc<Mutex<()>> {
        let key = if a <= b { (a, b) } else { (b, a) };
        self.inner
            .lock()
            .entry(key)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}

/// Service for managing friend invites and the friend graph
///
/// Holds its dependencies by injection; there is no process-wide instance.
pub struct InviteService {
    /// Database for persistence
    db: Arc<Database>,
    /// Per-pair serialization of graph mutations
    pair_locks: PairLocks,
}

impl InviteService {
    /// Create a new invite service
    pub fn new(db: Arc<Database>) -> Self {
        Self {
            db,
            pair_locks: PairLocks::new(),
        }
    }

    /// Create a friend invite from `sender_id` to `receiver_id`
    ///
    /// Validation order: self-invite, sender exists, receiver exists, not
    /// already friends, no duplicate pending invite. If the receiver already
    /// has a pending invite *to* the sender, the two invites express the
    /// same intent: that invite is accepted on the spot and returned instead
    /// of creating a second record.
    pub fn create_invite(&self, sender_id: i64, receiver_id: i64) -> Result<FriendInvite> {
        if sender_id == receiver_id {
            return Err(Error::CannotInviteSelf);
        }

        let lock = self.pair_locks.for_pair(sender_id, receiver_id);
        let _guard = lock.lock();

        if self.db.get_account(sender_id)?.is_none() {
            return Err(Error::AccountNotFound);
        }
        if self.db.get_account(receiver_id)?.is_none() {
            return Err(Error::AccountNotFound);
        }

        if self.db.get_friend_ids(sender_id)?.contains(&receiver_id) {
            return Err(Error::AlreadyFriends);
        }

        if self.db.find_pending_invite(sender_id, receiver_id)?.is_some() {
            return Err(Error::InvitePending);
        }

        // Mutual invite: the receiver already asked us. Collapse the two
        // into one acceptance, with the caller acting as the accepting
        // receiver of the existing invite.
        if let Some(reciprocal) = self.db.find_pending_invite(receiver_id, sender_id)? {
            tracing::info!(
                "Invite from {} to {} matches pending invite {}, accepting it",
                sender_id,
                receiver_id,
                reciprocal.id
            );
            return self.accept_locked(&reciprocal);
        }

        let record = self.db.create_invite(sender_id, receiver_id)?;
        tracing::info!("Created friend invite {} ({} → {})", record.id, sender_id, receiver_id);
        record.try_into()
    }

    /// Get all pending invites addressed to a user
    ///
    /// Returns an empty list for unknown users; never an error. Order is
    /// the store's natural order.
    pub fn get_invites_by_user_id(&self, user_id: i64) -> Result<Vec<FriendInvite>> {
        self.db
            .get_pending_invites_for(user_id)?
            .into_iter()
            .map(FriendInvite::try_from)
            .collect()
    }

    /// Accept a pending invite addressed to `receiver_id`
    ///
    /// A receiver may only accept invites addressed to them; anything else
    /// is indistinguishable from a missing invite.
    pub fn accept_invite(&self, receiver_id: i64, invite_id: i64) -> Result<FriendInvite> {
        let invite = self
            .db
            .get_pending_invite_for_receiver(invite_id, receiver_id)?
            .ok_or(Error::InviteNotFound)?;

        let lock = self.pair_locks.for_pair(invite.sender_id, invite.receiver_id);
        let _guard = lock.lock();

        self.accept_locked(&invite)
    }

    /// Accept transition, pair lock already held
    ///
    /// The transaction re-checks that the invite is still pending, so a
    /// concurrent withdraw or unfriend that slipped in before the lock was
    /// taken surfaces as InviteNotFound rather than a double acceptance.
    fn accept_locked(&self, invite: &InviteRecord) -> Result<FriendInvite> {
        let record =
            self.db
                .accept_invite_tx(invite.id, invite.sender_id, invite.receiver_id)?;

        tracing::info!(
            "Accepted friend invite {} ({} and {} are now friends)",
            record.id,
            record.sender_id,
            record.receiver_id
        );
        record.try_into()
    }

    /// Reject a pending invite addressed to `receiver_id`
    ///
    /// Rejections leave no durable history: the record is deleted and a
    /// pre-deletion snapshot returned for confirmation.
    pub fn reject_invite(&self, receiver_id: i64, invite_id: i64) -> Result<FriendInvite> {
        let invite = self
            .db
            .get_pending_invite_for_receiver(invite_id, receiver_id)?
            .ok_or(Error::InviteNotFound)?;

        let lock = self.pair_locks.for_pair(invite.sender_id, invite.receiver_id);
        let _guard = lock.lock();

        // Re-check under the lock; a concurrent accept may have won.
        if self
            .db
            .get_pending_invite_for_receiver(invite_id, receiver_id)?
            .is_none()
        {
            return Err(Error::InviteNotFound);
        }
        self.db.delete_invite(invite_id)?;

        tracing::info!("Rejected friend invite {} ({} → {})", invite.id, invite.sender_id, receiver_id);
        Ok(FriendInvite {
            id: invite.id,
            sender_id: invite.sender_id,
            receiver_id: invite.receiver_id,
            status: InviteStatus::Rejected,
            created_at: invite.created_at,
        })
    }

    /// Withdraw an invite sent by `sender_id`
    ///
    /// No status filter: a sender may withdraw their invite record whatever
    /// state it is in, matching the API's historical behavior. The record is
    /// deleted and its snapshot returned.
    pub fn withdraw_invite(&self, sender_id: i64, invite_id: i64) -> Result<FriendInvite> {
        let invite = self
            .db
            .get_invite_for_sender(invite_id, sender_id)?
            .ok_or(Error::InviteNotFound)?;

        let lock = self.pair_locks.for_pair(invite.sender_id, invite.receiver_id);
        let _guard = lock.lock();

        if !self.db.delete_invite(invite_id)? {
            return Err(Error::InviteNotFound);
        }

        tracing::info!("Withdrew friend invite {} ({} → {})", invite.id, sender_id, invite.receiver_id);
        invite.try_into()
    }

    /// Dissolve the friendship between two accounts
    ///
    /// Requires symmetric membership (asymmetric state reads as "not
    /// currently friends"). Removes both edges and deletes every invite
    /// between the pair, in either direction and whatever its status, so a
    /// future invite is not blocked by stale history.
    pub fn unfriend(&self, id_a: i64, id_b: i64) -> Result<()> {
        if self.db.get_account(id_a)?.is_none() || self.db.get_account(id_b)?.is_none() {
            return Err(Error::AccountNotFound);
        }

        let lock = self.pair_locks.for_pair(id_a, id_b);
        let _guard = lock.lock();

        let a_friends = self.db.get_friend_ids(id_a)?;
        let b_friends = self.db.get_friend_ids(id_b)?;
        if !a_friends.contains(&id_b) || !b_friends.contains(&id_a) {
            return Err(Error::NotFriends);
        }

        self.db.sever_friendship_tx(id_a, id_b)?;

        tracing::info!("Unfriended {} and {}", id_a, id_b);
        Ok(())
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    async fn setup() -> (Arc<Database>, InviteService, i64, i64) {
        let db = Arc::new(Database::open(None).await.unwrap());
        let a = db.create_account(None, "alice", "h", None).unwrap();
        let b = db.create_account(None, "bob", "h", None).unwrap();
        let service = InviteService::new(db.clone());
        (db, service, a, b)
    }

    fn assert_symmetric(db: &Database, ids: &[i64]) {
        for &a in ids {
            let a_friends = db.get_friend_ids(a).unwrap();
            assert!(!a_friends.contains(&a), "{} is its own friend", a);
            for &b in ids {
                let b_friends = db.get_friend_ids(b).unwrap();
                assert_eq!(
                    a_friends.contains(&b),
                    b_friends.contains(&a),
                    "friendship between {} and {} is not symmetric",
                    a,
                    b
                );
            }
        }
    }

    #[tokio::test]
    async fn test_create_invite_pending() {
        let (_db, service, a, b) = setup().await;

        let invite = service.create_invite(a, b).unwrap();
        assert_eq!(invite.sender_id, a);
        assert_eq!(invite.receiver_id, b);
        assert_eq!(invite.status, InviteStatus::Pending);
        assert!(invite.created_at > 0);
    }

    #[tokio::test]
    async fn test_create_invite_self() {
        let (_db, service, a, _b) = setup().await;

        let err = service.create_invite(a, a).unwrap_err();
        assert!(matches!(err, Error::CannotInviteSelf));
    }

    #[tokio::test]
    async fn test_create_invite_unknown_accounts() {
        let (_db, service, a, _b) = setup().await;

        assert!(matches!(
            service.create_invite(9999, a).unwrap_err(),
            Error::AccountNotFound
        ));
        assert!(matches!(
            service.create_invite(a, 9999).unwrap_err(),
            Error::AccountNotFound
        ));
    }

    #[tokio::test]
    async fn test_create_invite_duplicate() {
        let (_db, service, a, b) = setup().await;

        service.create_invite(a, b).unwrap();
        let err = service.create_invite(a, b).unwrap_err();
        assert!(matches!(err, Error::InvitePending));
    }

    #[tokio::test]
    async fn test_create_invite_already_friends() {
        let (db, service, a, b) = setup().await;

        let invite = service.create_invite(a, b).unwrap();
        service.accept_invite(b, invite.id).unwrap();
        assert_symmetric(&db, &[a, b]);

        let err = service.create_invite(a, b).unwrap_err();
        assert!(matches!(err, Error::AlreadyFriends));
        // Same outcome in the other direction
        let err = service.create_invite(b, a).unwrap_err();
        assert!(matches!(err, Error::AlreadyFriends));
    }

    #[tokio::test]
    async fn test_mutual_invite_auto_accepts() {
        let (db, service, a, b) = setup().await;

        let first = service.create_invite(a, b).unwrap();
        let resolved = service.create_invite(b, a).unwrap();

        // No second record: the original invite transitioned to accepted
        assert_eq!(resolved.id, first.id);
        assert_eq!(resolved.sender_id, a);
        assert_eq!(resolved.status, InviteStatus::Accepted);

        assert!(db.get_friend_ids(a).unwrap().contains(&b));
        assert!(db.get_friend_ids(b).unwrap().contains(&a));
        assert_symmetric(&db, &[a, b]);

        // Nothing pending remains in either direction
        assert!(service.get_invites_by_user_id(a).unwrap().is_empty());
        assert!(service.get_invites_by_user_id(b).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_get_invites_by_user_id() {
        let (db, service, a, b) = setup().await;
        let c = db.create_account(None, "carol", "h", None).unwrap();

        service.create_invite(a, b).unwrap();
        service.create_invite(c, b).unwrap();

        let invites = service.get_invites_by_user_id(b).unwrap();
        assert_eq!(invites.len(), 2);
        assert!(invites.iter().all(|i| i.receiver_id == b));
        assert!(invites.iter().all(|i| i.status == InviteStatus::Pending));

        // Unknown users simply have no pending invites
        assert!(service.get_invites_by_user_id(9999).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_accept_invite() {
        let (db, service, a, b) = setup().await;

        let invite = service.create_invite(a, b).unwrap();
        let accepted = service.accept_invite(b, invite.id).unwrap();

        assert_eq!(accepted.status, InviteStatus::Accepted);
        assert!(db.get_friend_ids(a).unwrap().contains(&b));
        assert!(db.get_friend_ids(b).unwrap().contains(&a));
        assert_symmetric(&db, &[a, b]);
    }

    #[tokio::test]
    async fn test_accept_invite_wrong_receiver() {
        let (_db, service, a, b) = setup().await;

        let invite = service.create_invite(a, b).unwrap();
        // The sender cannot accept their own invite
        let err = service.accept_invite(a, invite.id).unwrap_err();
        assert!(matches!(err, Error::InviteNotFound));
    }

    #[tokio::test]
    async fn test_accept_invite_twice() {
        let (_db, service, a, b) = setup().await;

        let invite = service.create_invite(a, b).unwrap();
        service.accept_invite(b, invite.id).unwrap();
        let err = service.accept_invite(b, invite.id).unwrap_err();
        assert!(matches!(err, Error::InviteNotFound));
    }

    #[tokio::test]
    async fn test_reject_invite_leaves_no_history() {
        let (db, service, a, b) = setup().await;

        let invite = service.create_invite(a, b).unwrap();
        let rejected = service.reject_invite(b, invite.id).unwrap();

        assert_eq!(rejected.id, invite.id);
        assert_eq!(rejected.status, InviteStatus::Rejected);
        assert!(db.get_invite(invite.id).unwrap().is_none());
        assert!(db.get_friend_ids(a).unwrap().is_empty());

        // A fresh invite between the pair is not blocked
        assert!(service.create_invite(a, b).is_ok());
    }

    #[tokio::test]
    async fn test_withdraw_invite() {
        let (db, service, a, b) = setup().await;

        let invite = service.create_invite(a, b).unwrap();
        let withdrawn = service.withdraw_invite(a, invite.id).unwrap();

        assert_eq!(withdrawn.id, invite.id);
        assert!(db.get_invite(invite.id).unwrap().is_none());
        assert!(service.get_invites_by_user_id(b).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_withdraw_invite_receiver_cannot() {
        let (_db, service, a, b) = setup().await;

        let invite = service.create_invite(a, b).unwrap();
        let err = service.withdraw_invite(b, invite.id).unwrap_err();
        assert!(matches!(err, Error::InviteNotFound));
    }

    #[tokio::test]
    async fn test_withdraw_accepted_invite_is_permitted() {
        let (db, service, a, b) = setup().await;

        let invite = service.create_invite(a, b).unwrap();
        service.accept_invite(b, invite.id).unwrap();

        // Withdrawal has no status filter; the leftover accepted record
        // can be deleted by its sender. The friendship itself is untouched.
        let withdrawn = service.withdraw_invite(a, invite.id).unwrap();
        assert_eq!(withdrawn.status, InviteStatus::Accepted);
        assert!(db.get_friend_ids(a).unwrap().contains(&b));
    }

    #[tokio::test]
    async fn test_unfriend() {
        let (db, service, a, b) = setup().await;

        let invite = service.create_invite(a, b).unwrap();
        service.accept_invite(b, invite.id).unwrap();

        service.unfriend(a, b).unwrap();

        assert!(db.get_friend_ids(a).unwrap().is_empty());
        assert!(db.get_friend_ids(b).unwrap().is_empty());
        // The retained accepted invite went with the friendship
        assert!(db.get_invite(invite.id).unwrap().is_none());
        assert_symmetric(&db, &[a, b]);

        // The pair can start over
        assert!(service.create_invite(a, b).is_ok());
    }

    #[tokio::test]
    async fn test_unfriend_not_friends() {
        let (_db, service, a, b) = setup().await;

        let err = service.unfriend(a, b).unwrap_err();
        assert!(matches!(err, Error::NotFriends));
    }

    #[tokio::test]
    async fn test_unfriend_unknown_account() {
        let (_db, service, a, _b) = setup().await;

        let err = service.unfriend(a, 9999).unwrap_err();
        assert!(matches!(err, Error::AccountNotFound));
    }

    #[tokio::test]
    async fn test_at_most_one_pending_per_ordered_pair() {
        let (db, service, a, b) = setup().await;

        service.create_invite(a, b).unwrap();
        let _ = service.create_invite(a, b);
        let _ = service.create_invite(a, b);

        let pending = db.get_pending_invites_for(b).unwrap();
        assert_eq!(pending.len(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_reciprocal_create_race() {
        let (db, service, a, b) = setup().await;
        let service = Arc::new(service);

        let s1 = service.clone();
        let s2 = service.clone();
        let t1 = thread::spawn(move || s1.create_invite(a, b));
        let t2 = thread::spawn(move || s2.create_invite(b, a));
        let r1 = t1.join().unwrap();
        let r2 = t2.join().unwrap();

        // Both orderings are legal, but never two pending records and never
        // a double acceptance: exactly one invite row exists afterward and
        // it is accepted, with the friendship symmetric.
        assert!(r1.is_ok() && r2.is_ok());
        let accepted: Vec<_> = [r1.unwrap(), r2.unwrap()]
            .into_iter()
            .filter(|i| i.status == InviteStatus::Accepted)
            .collect();
        assert_eq!(accepted.len(), 1);

        assert!(db.get_friend_ids(a).unwrap().contains(&b));
        assert!(db.get_friend_ids(b).unwrap().contains(&a));
        assert_symmetric(&db, &[a, b]);
        assert!(service.get_invites_by_user_id(a).unwrap().is_empty());
        assert!(service.get_invites_by_user_id(b).unwrap().is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_duplicate_create_race() {
        let (db, service, a, b) = setup().await;
        let service = Arc::new(service);

        let s1 = service.clone();
        let s2 = service.clone();
        let t1 = thread::spawn(move || s1.create_invite(a, b));
        let t2 = thread::spawn(move || s2.create_invite(a, b));
        let r1 = t1.join().unwrap();
        let r2 = t2.join().unwrap();

        // One wins, the other sees the duplicate
        assert!(r1.is_ok() != r2.is_ok());
        let err = if r1.is_err() { r1.unwrap_err() } else { r2.unwrap_err() };
        assert!(matches!(err, Error::InvitePending));
        assert_eq!(db.get_pending_invites_for(b).unwrap().len(), 1);
    }

    #[test]
    fn test_invite_status_strings() {
        assert_eq!(InviteStatus::Pending.as_str(), "pending");
        assert_eq!(InviteStatus::Accepted.as_str(), "accepted");
        assert_eq!(InviteStatus::parse("rejected"), Some(InviteStatus::Rejected));
        assert_eq!(InviteStatus::parse("expired"), None);
    }
}
