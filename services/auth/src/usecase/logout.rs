use std::sync::Arc;

use chrono::Utc;
use serde_json::json;
use uuid::Uuid;

use crate::domain::repository::{
    AuditLogRepository, EventPublisher, SessionRepository, TaskSpawner, TokenDenylist,
};
use crate::domain::types::{AuditAction, ClientInfo, EVENT_LOGGED_OUT, OutboxEvent};
use crate::error::AuthServiceError;
use crate::usecase::session::{
    audit_entry, dispatch_audit, dispatch_event, hash_refresh_token, surface,
};

/// Access token presented with the logout request.
#[derive(Debug, Clone)]
pub struct PresentedAccessToken {
    pub jti: String,
    /// Seconds since epoch.
    pub exp: u64,
}

pub struct LogoutInput {
    pub user_id: Uuid,
    pub refresh_token: Option<String>,
    pub access_token: Option<PresentedAccessToken>,
    pub client: ClientInfo,
}

/// Ends one session. Only the presented refresh token is revoked, never its
/// family; a missing or foreign token is ignored.
pub struct LogoutUseCase<S, A, P, D>
where
    S: SessionRepository,
    A: AuditLogRepository,
    P: EventPublisher,
    D: TokenDenylist,
{
    pub sessions: S,
    pub audit: A,
    pub events: P,
    pub denylist: D,
    pub spawner: Arc<dyn TaskSpawner>,
}

impl<S, A, P, D> LogoutUseCase<S, A, P, D>
where
    S: SessionRepository,
    A: AuditLogRepository,
    P: EventPublisher,
    D: TokenDenylist,
{
    pub async fn execute(&self, input: LogoutInput) -> Result<(), AuthServiceError> {
        self.logout(input).await.map_err(|e| surface("logout", e))
    }

    async fn logout(&self, input: LogoutInput) -> Result<(), AuthServiceError> {
        let refresh_token = input.refresh_token.as_deref().filter(|t| !t.is_empty());
        if let Some(token) = refresh_token {
            let token_hash = hash_refresh_token(token);
            match self.sessions.find_session_by_token(&token_hash).await? {
                Some(session) if session.user_id == input.user_id => {
                    self.sessions.revoke_session(&token_hash).await?;
                }
                Some(_) => {
                    tracing::warn!(user_id = %input.user_id, "logout presented another user's refresh token");
                }
                None => {}
            }
        }

        if let Some(access) = &input.access_token {
            let now = Utc::now().timestamp().max(0) as u64;
            let ttl = access.exp.saturating_sub(now);
            if let Err(e) = self.denylist.deny(&access.jti, ttl).await {
                tracing::warn!(user_id = %input.user_id, error = %e.detail(), "failed to denylist access token");
            }
        }

        dispatch_audit(
            self.spawner.as_ref(),
            &self.audit,
            audit_entry(Some(input.user_id), AuditAction::Logout, None, &input.client),
        );
        dispatch_event(
            self.spawner.as_ref(),
            &self.events,
            OutboxEvent::new(
                EVENT_LOGGED_OUT,
                Some(input.user_id),
                Uuid::now_v7(),
                json!({ "user_id": input.user_id }),
            ),
        );
        Ok(())
    }
}
