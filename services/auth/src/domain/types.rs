use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use cermont_auth_types::identity::Principal;
use cermont_domain::id::FamilyId;
use cermont_domain::user::UserRole;

/// Consecutive failed logins that trigger a lockout.
pub const MAX_FAILED_LOGIN_ATTEMPTS: i32 = 5;

/// How long a lockout lasts.
pub const LOCKOUT_DURATION_SECS: i64 = 15 * 60;

/// One-time code time-to-live in seconds.
pub const ONE_TIME_CODE_TTL_SECS: i64 = 300;

/// Wrong guesses allowed before a one-time code is discarded.
pub const ONE_TIME_CODE_MAX_ATTEMPTS: i32 = 5;

/// Shortest password accepted at registration or password change.
pub const MIN_PASSWORD_LEN: usize = 8;

pub fn lockout_duration() -> Duration {
    Duration::seconds(LOCKOUT_DURATION_SECS)
}

/// Credential-store view of a user.
#[derive(Debug, Clone)]
pub struct UserRecord {
    pub id: Uuid,
    pub email: String,
    pub password_hash: String,
    pub name: String,
    pub role: UserRole,
    pub active: bool,
    pub failed_login_attempts: i32,
    pub locked_until: Option<DateTime<Utc>>,
    pub two_factor_enabled: bool,
    pub last_login_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl UserRecord {
    /// Lock end time if the account is locked at `now`.
    pub fn locked_at(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.locked_until.filter(|until| *until > now)
    }

    /// Admins with 2FA switched on must present a one-time code.
    pub fn requires_two_factor(&self) -> bool {
        self.role.requires_two_factor() && self.two_factor_enabled
    }

    pub fn principal(&self) -> Principal {
        Principal {
            user_id: self.id,
            email: self.email.clone(),
            name: self.name.clone(),
            role: self.role,
        }
    }
}

/// Insert payload for registration.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub id: Uuid,
    pub email: String,
    pub password_hash: String,
    pub name: String,
    pub role: UserRole,
}

/// Counter state after `increment_login_attempts`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoginAttempts {
    pub attempts: i32,
    pub locked_until: Option<DateTime<Utc>>,
    /// This update is the one that applied the lock.
    pub locked: bool,
}

/// Persisted refresh session. `token_hash` is the SHA-256 hex digest of the
/// opaque token handed to the client.
#[derive(Debug, Clone)]
pub struct RefreshSession {
    pub id: Uuid,
    pub token_hash: String,
    pub user_id: Uuid,
    pub family: FamilyId,
    pub expires_at: DateTime<Utc>,
    pub revoked: bool,
    pub revoked_at: Option<DateTime<Utc>>,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl RefreshSession {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

/// A second-factor code.
#[derive(Debug, Clone)]
pub struct OneTimeCode {
    pub id: Uuid,
    pub user_id: Uuid,
    pub code: String,
    pub expires_at: DateTime<Utc>,
    pub verified: bool,
    pub attempts: i32,
    pub created_at: DateTime<Utc>,
}

impl OneTimeCode {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditAction {
    Login,
    LoginFailed,
    AccountLocked,
    Logout,
    Refresh,
    Register,
    PasswordChanged,
    TwoFactorChallenge,
    SecurityIncident,
}

impl AuditAction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Login => "LOGIN",
            Self::LoginFailed => "LOGIN_FAILED",
            Self::AccountLocked => "ACCOUNT_LOCKED",
            Self::Logout => "LOGOUT",
            Self::Refresh => "REFRESH",
            Self::Register => "REGISTER",
            Self::PasswordChanged => "PASSWORD_CHANGED",
            Self::TwoFactorChallenge => "TWO_FACTOR_CHALLENGE",
            Self::SecurityIncident => "SECURITY_INCIDENT",
        }
    }
}

/// Where a request came from. Recorded on sessions and audit rows only.
#[derive(Debug, Clone, Default)]
pub struct ClientInfo {
    pub ip: Option<String>,
    pub user_agent: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AuditEntry {
    pub user_id: Option<Uuid>,
    pub action: AuditAction,
    pub reason: Option<String>,
    pub client: ClientInfo,
}

/// Outbox event for async delivery (code e-mails, session notifications).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboxEvent {
    pub id: Uuid,
    pub kind: String,
    pub user_id: Option<Uuid>,
    pub payload: serde_json::Value,
    pub idempotency_key: String,
}

impl OutboxEvent {
    /// Build an event whose idempotency key is `{kind}:{subject}`.
    pub fn new(
        kind: &str,
        user_id: Option<Uuid>,
        subject: impl std::fmt::Display,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind: kind.to_owned(),
            user_id,
            payload,
            idempotency_key: format!("{kind}:{subject}"),
        }
    }
}

pub const EVENT_ONE_TIME_CODE_ISSUED: &str = "one_time_code_issued";
pub const EVENT_TOKEN_REFRESHED: &str = "token_refreshed";
pub const EVENT_SESSION_FAMILY_REVOKED: &str = "session_family_revoked";
pub const EVENT_LOGGED_OUT: &str = "logged_out";
