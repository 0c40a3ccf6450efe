//! Building blocks shared by the session use cases: opaque refresh tokens,
//! token-pair issuance and best-effort side-effect dispatch.

use anyhow::Context as _;
use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use cermont_auth_types::cookie::REFRESH_TOKEN_TTL_SECS;
use cermont_auth_types::token::TokenSigner;
use cermont_domain::id::FamilyId;

use crate::domain::repository::{
    AuditLogRepository, EventPublisher, SessionRepository, TaskSpawner, UserRepository,
};
use crate::domain::types::{
    AuditAction, AuditEntry, ClientInfo, MAX_FAILED_LOGIN_ATTEMPTS, OutboxEvent, RefreshSession,
    UserRecord, lockout_duration,
};
use crate::error::AuthServiceError;

/// An access token plus the refresh token that can renew it.
#[derive(Debug, Clone, Serialize)]
pub struct SessionTokens {
    pub access_token: String,
    /// Seconds since epoch.
    pub access_token_expires_at: u64,
    pub refresh_token: String,
    pub refresh_token_expires_at: DateTime<Utc>,
    #[serde(skip)]
    pub family: FamilyId,
}

/// 256 random bits, URL-safe base64. Only its digest is persisted.
pub fn generate_refresh_token() -> String {
    let bytes: [u8; 32] = rand::random();
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Store key for a refresh token: lowercase hex SHA-256.
pub fn hash_refresh_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

pub fn refresh_token_ttl() -> Duration {
    Duration::seconds(REFRESH_TOKEN_TTL_SECS)
}

/// Mint an access token and persist a refresh session in `family`.
pub async fn issue_session<S: SessionRepository>(
    sessions: &S,
    signer: &TokenSigner,
    user: &UserRecord,
    family: FamilyId,
    client: &ClientInfo,
) -> Result<SessionTokens, AuthServiceError> {
    let access = signer
        .issue_access_token(user.id, &user.email, user.role)
        .context("sign access token")?;

    let refresh_token = generate_refresh_token();
    let now = Utc::now();
    let session = RefreshSession {
        id: Uuid::now_v7(),
        token_hash: hash_refresh_token(&refresh_token),
        user_id: user.id,
        family,
        expires_at: now + refresh_token_ttl(),
        revoked: false,
        revoked_at: None,
        ip: client.ip.clone(),
        user_agent: client.user_agent.clone(),
        created_at: now,
    };
    sessions.create_refresh_token(&session).await?;

    Ok(SessionTokens {
        access_token: access.token,
        access_token_expires_at: access.expires_at,
        refresh_token,
        refresh_token_expires_at: session.expires_at,
        family,
    })
}

/// Charge one failed credential check (password or one-time code) to the
/// user's lockout budget. Returns the lock end time when this failure locked
/// the account.
pub async fn count_failed_attempt<U: UserRepository>(
    users: &U,
    user_id: Uuid,
    now: DateTime<Utc>,
) -> Result<Option<DateTime<Utc>>, AuthServiceError> {
    let state = users
        .increment_login_attempts(user_id, MAX_FAILED_LOGIN_ATTEMPTS, now + lockout_duration())
        .await?;
    if !state.locked {
        return Ok(None);
    }
    tracing::warn!(
        user_id = %user_id,
        until = ?state.locked_until,
        "account locked after repeated failed attempts"
    );
    Ok(state.locked_until)
}

pub fn audit_entry(
    user_id: Option<Uuid>,
    action: AuditAction,
    reason: Option<&str>,
    client: &ClientInfo,
) -> AuditEntry {
    AuditEntry {
        user_id,
        action,
        reason: reason.map(str::to_owned),
        client: client.clone(),
    }
}

pub fn dispatch_audit<A: AuditLogRepository>(spawner: &dyn TaskSpawner, audit: &A, entry: AuditEntry) {
    let audit = audit.clone();
    spawner.spawn(
        "audit_log",
        Box::pin(async move { audit.create_audit_log(entry).await }),
    );
}

pub fn dispatch_event<P: EventPublisher>(spawner: &dyn TaskSpawner, events: &P, event: OutboxEvent) {
    let events = events.clone();
    spawner.spawn(
        "publish_event",
        Box::pin(async move { events.publish(event).await }),
    );
}

/// Pass classified failures through; log unclassified ones with full detail
/// before they leave the use case.
pub fn surface(operation: &'static str, err: AuthServiceError) -> AuthServiceError {
    if let AuthServiceError::Internal(_) = err {
        tracing::error!(operation, error = %err.detail(), "unexpected failure");
    }
    err
}
