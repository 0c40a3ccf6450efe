#![allow(async_fn_in_trait)]

use std::future::Future;

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use uuid::Uuid;

use cermont_auth_types::identity::Principal;
use cermont_domain::id::FamilyId;

use crate::domain::types::{
    AuditEntry, LoginAttempts, NewUser, OneTimeCode, OutboxEvent, RefreshSession, UserRecord,
};
use crate::error::AuthServiceError;

// Methods returning `impl Future + Send` are the ones dispatched through a
// `TaskSpawner`; their futures must cross into a detached task.

/// Credential-store access to user rows.
pub trait UserRepository: Clone + Send + Sync + 'static {
    /// Lookup by already-normalized email.
    async fn find_by_email(&self, email: &str) -> Result<Option<UserRecord>, AuthServiceError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<UserRecord>, AuthServiceError>;

    /// Insert a user. Fails with `Conflict` if the email is taken.
    async fn create(&self, user: &NewUser) -> Result<UserRecord, AuthServiceError>;

    /// Record one failed credential check in a single atomic update.
    ///
    /// The failure that brings the counter to `max_attempts` locks the
    /// account until `lock_until` and restarts the counter at zero; any
    /// other failure only increments it. Concurrent callers each see the
    /// counter their own update produced.
    async fn increment_login_attempts(
        &self,
        user_id: Uuid,
        max_attempts: i32,
        lock_until: DateTime<Utc>,
    ) -> Result<LoginAttempts, AuthServiceError>;

    async fn reset_login_attempts(&self, user_id: Uuid) -> Result<(), AuthServiceError>;

    fn update_last_login(
        &self,
        user_id: Uuid,
        at: DateTime<Utc>,
    ) -> impl Future<Output = Result<(), AuthServiceError>> + Send;

    async fn update_password_hash(
        &self,
        user_id: Uuid,
        password_hash: &str,
    ) -> Result<(), AuthServiceError>;
}

/// Refresh-session rows, keyed by token digest.
pub trait SessionRepository: Send + Sync {
    async fn create_refresh_token(&self, session: &RefreshSession)
    -> Result<(), AuthServiceError>;

    async fn find_session_by_token(
        &self,
        token_hash: &str,
    ) -> Result<Option<RefreshSession>, AuthServiceError>;

    /// Revoke one session. Returns `true` only if this call moved it from
    /// live to revoked; a concurrent caller that lost the race gets `false`.
    async fn revoke_session(&self, token_hash: &str) -> Result<bool, AuthServiceError>;

    /// Revoke every live session in a family. Returns the number revoked.
    async fn revoke_session_family(&self, family: FamilyId) -> Result<u64, AuthServiceError>;

    /// Revoke every live session of a user. Returns the number revoked.
    async fn revoke_user_sessions(&self, user_id: Uuid) -> Result<u64, AuthServiceError>;
}

/// Second-factor codes.
pub trait OneTimeCodeRepository: Send + Sync {
    /// Delete the user's unverified codes and insert `code`, atomically.
    /// Concurrent replacements for one user are serialized, so at most one
    /// unverified code exists afterwards.
    async fn replace_unverified(&self, code: &OneTimeCode) -> Result<(), AuthServiceError>;

    /// The user's unverified code, if any.
    async fn find_unverified(&self, user_id: Uuid)
    -> Result<Option<OneTimeCode>, AuthServiceError>;

    /// Bump the attempt counter and return the new value.
    async fn record_failed_attempt(&self, id: Uuid) -> Result<i32, AuthServiceError>;

    /// Remove a code outright (attempts exhausted or expired).
    async fn invalidate(&self, id: Uuid) -> Result<(), AuthServiceError>;

    /// Conditionally flip `verified` false -> true. Returns `false` if the
    /// code was already consumed or gone.
    async fn mark_verified(&self, id: Uuid) -> Result<bool, AuthServiceError>;
}

pub trait AuditLogRepository: Clone + Send + Sync + 'static {
    fn create_audit_log(
        &self,
        entry: AuditEntry,
    ) -> impl Future<Output = Result<(), AuthServiceError>> + Send;
}

/// Hands events to the external delivery subsystem.
pub trait EventPublisher: Clone + Send + Sync + 'static {
    fn publish(
        &self,
        event: OutboxEvent,
    ) -> impl Future<Output = Result<(), AuthServiceError>> + Send;
}

/// Short-TTL principal cache for the request guard. Entries may be stale
/// for up to the TTL after a user is deactivated.
pub trait UserCache: Send + Sync {
    async fn get(&self, user_id: Uuid) -> Result<Option<Principal>, AuthServiceError>;

    async fn put(&self, principal: &Principal) -> Result<(), AuthServiceError>;
}

/// Access tokens revoked before their natural expiry, keyed by `jti`.
pub trait TokenDenylist: Send + Sync {
    async fn deny(&self, jti: &str, ttl_secs: u64) -> Result<(), AuthServiceError>;

    async fn is_denied(&self, jti: &str) -> Result<bool, AuthServiceError>;
}

pub type SideEffect = BoxFuture<'static, Result<(), AuthServiceError>>;

/// Runs best-effort side effects without making the caller wait.
///
/// Implementations must log a failed task; they never report it back.
pub trait TaskSpawner: Send + Sync {
    fn spawn(&self, label: &'static str, task: SideEffect);
}
