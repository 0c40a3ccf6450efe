use std::sync::Arc;

use chrono::Utc;
use serde_json::json;

use cermont_auth_types::token::TokenSigner;

use crate::domain::repository::{
    AuditLogRepository, EventPublisher, SessionRepository, TaskSpawner, UserRepository,
};
use crate::domain::types::{
    AuditAction, ClientInfo, EVENT_SESSION_FAMILY_REVOKED, EVENT_TOKEN_REFRESHED, OutboxEvent,
    RefreshSession,
};
use crate::error::AuthServiceError;
use crate::usecase::session::{
    SessionTokens, audit_entry, dispatch_audit, dispatch_event, hash_refresh_token,
    issue_session, surface,
};

pub struct RefreshInput {
    pub refresh_token: String,
    pub client: ClientInfo,
}

/// Refresh-token rotation with reuse detection.
///
/// A refresh token is single-use. Presenting one that was already rotated
/// means two parties hold it, so the whole family is revoked and both are
/// forced to log in again.
pub struct RefreshUseCase<U, S, A, P>
where
    U: UserRepository,
    S: SessionRepository,
    A: AuditLogRepository,
    P: EventPublisher,
{
    pub users: U,
    pub sessions: S,
    pub audit: A,
    pub events: P,
    pub signer: TokenSigner,
    pub spawner: Arc<dyn TaskSpawner>,
}

impl<U, S, A, P> RefreshUseCase<U, S, A, P>
where
    U: UserRepository,
    S: SessionRepository,
    A: AuditLogRepository,
    P: EventPublisher,
{
    pub async fn execute(&self, input: RefreshInput) -> Result<SessionTokens, AuthServiceError> {
        self.rotate(input).await.map_err(|e| surface("refresh", e))
    }

    async fn rotate(&self, input: RefreshInput) -> Result<SessionTokens, AuthServiceError> {
        if input.refresh_token.is_empty() {
            return Err(AuthServiceError::Unauthorized);
        }
        let token_hash = hash_refresh_token(&input.refresh_token);

        let session = self
            .sessions
            .find_session_by_token(&token_hash)
            .await?
            .ok_or(AuthServiceError::Unauthorized)?;

        if session.revoked {
            return Err(self.on_reuse(&session, &input.client).await);
        }
        if session.is_expired(Utc::now()) {
            return Err(AuthServiceError::Unauthorized);
        }

        // Conditional revoke: the loser of a concurrent rotation sees `false`
        // and is handled as a replay.
        if !self.sessions.revoke_session(&token_hash).await? {
            return Err(self.on_reuse(&session, &input.client).await);
        }

        let user = self
            .users
            .find_by_id(session.user_id)
            .await?
            .filter(|u| u.active)
            .ok_or(AuthServiceError::Unauthorized)?;

        let tokens = issue_session(
            &self.sessions,
            &self.signer,
            &user,
            session.family,
            &input.client,
        )
        .await?;

        dispatch_audit(
            self.spawner.as_ref(),
            &self.audit,
            audit_entry(Some(user.id), AuditAction::Refresh, None, &input.client),
        );
        dispatch_event(
            self.spawner.as_ref(),
            &self.events,
            OutboxEvent::new(
                EVENT_TOKEN_REFRESHED,
                Some(user.id),
                session.id,
                json!({ "user_id": user.id, "family": session.family }),
            ),
        );

        Ok(tokens)
    }

    /// Revoke the whole family and produce the error to return. A failure to
    /// revoke is surfaced instead of `Unauthorized`.
    async fn on_reuse(&self, session: &RefreshSession, client: &ClientInfo) -> AuthServiceError {
        let revoked = match self.sessions.revoke_session_family(session.family).await {
            Ok(n) => n,
            Err(e) => return e,
        };
        tracing::warn!(
            user_id = %session.user_id,
            family = %session.family,
            revoked,
            "refresh token reuse detected, session family revoked"
        );

        dispatch_audit(
            self.spawner.as_ref(),
            &self.audit,
            audit_entry(
                Some(session.user_id),
                AuditAction::SecurityIncident,
                Some("refresh token reuse"),
                client,
            ),
        );
        dispatch_event(
            self.spawner.as_ref(),
            &self.events,
            OutboxEvent::new(
                EVENT_SESSION_FAMILY_REVOKED,
                Some(session.user_id),
                format!("{}:{}", session.family, session.id),
                json!({ "user_id": session.user_id, "family": session.family, "revoked": revoked }),
            ),
        );

        AuthServiceError::Unauthorized
    }
}
