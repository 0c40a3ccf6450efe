use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use cermont_auth_types::identity::Principal;
use cermont_auth_types::token::TokenSigner;
use cermont_domain::id::FamilyId;
use cermont_domain::user::{is_plausible_email, normalize_email};

use crate::domain::repository::{
    AuditLogRepository, EventPublisher, OneTimeCodeRepository, SessionRepository, TaskSpawner,
    UserRepository,
};
use crate::domain::types::{AuditAction, ClientInfo, UserRecord};
use crate::error::AuthServiceError;
use crate::infra::password::PasswordHasher;
use crate::usecase::session::{
    SessionTokens, audit_entry, count_failed_attempt, dispatch_audit, issue_session, surface,
};
use crate::usecase::two_factor::OneTimeCodeService;

pub struct LoginInput {
    pub email: String,
    pub password: String,
    /// Accepted for compatibility. Refresh lifetime is 7 days either way.
    pub remember_me: bool,
    pub two_factor_code: Option<String>,
    pub client: ClientInfo,
}

#[derive(Debug)]
pub enum LoginOutcome {
    Authenticated(AuthenticatedSession),
    /// A code was sent; repeat the login with it. No tokens were issued.
    TwoFactorRequired { expires_in: i64 },
}

#[derive(Debug, Clone, Serialize)]
pub struct AuthenticatedSession {
    #[serde(flatten)]
    pub tokens: SessionTokens,
    pub user: Principal,
}

pub struct LoginUseCase<U, S, C, A, P>
where
    U: UserRepository,
    S: SessionRepository,
    C: OneTimeCodeRepository,
    A: AuditLogRepository,
    P: EventPublisher,
{
    pub users: U,
    pub sessions: S,
    pub audit: A,
    pub one_time_codes: OneTimeCodeService<U, C, P>,
    pub signer: TokenSigner,
    pub hasher: PasswordHasher,
    pub spawner: Arc<dyn TaskSpawner>,
}

impl<U, S, C, A, P> LoginUseCase<U, S, C, A, P>
where
    U: UserRepository,
    S: SessionRepository,
    C: OneTimeCodeRepository,
    A: AuditLogRepository,
    P: EventPublisher,
{
    pub async fn execute(&self, input: LoginInput) -> Result<LoginOutcome, AuthServiceError> {
        self.login(input).await.map_err(|e| surface("login", e))
    }

    async fn login(&self, input: LoginInput) -> Result<LoginOutcome, AuthServiceError> {
        let email = normalize_email(&input.email);
        if email.is_empty() || input.password.is_empty() || !is_plausible_email(&email) {
            return Err(AuthServiceError::InvalidCredentials);
        }

        let Some(user) = self.users.find_by_email(&email).await? else {
            self.record_audit(None, AuditAction::LoginFailed, Some("unknown email"), &input.client);
            return Err(AuthServiceError::InvalidCredentials);
        };

        let now = Utc::now();
        if let Some(until) = user.locked_at(now) {
            return Err(AuthServiceError::AccountLocked { until });
        }
        if !user.active {
            return Err(AuthServiceError::AccountDisabled);
        }

        if !self.hasher.verify(&input.password, &user.password_hash).await? {
            self.record_failed_login(&user, now, &input.client).await?;
            return Err(AuthServiceError::InvalidCredentials);
        }

        let code = input
            .two_factor_code
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty());
        match code {
            Some(code) => {
                let check = self.one_time_codes.verify(&email, code).await?;
                if !check.valid {
                    // The code service has already charged the failure.
                    self.audit_failure(
                        user.id,
                        "invalid one-time code",
                        check.locked_until,
                        &input.client,
                    );
                    return Err(AuthServiceError::InvalidOneTimeCode);
                }
            }
            None if user.requires_two_factor() => {
                let sent = self.one_time_codes.send(&email).await?;
                self.record_audit(
                    Some(user.id),
                    AuditAction::TwoFactorChallenge,
                    None,
                    &input.client,
                );
                return Ok(LoginOutcome::TwoFactorRequired {
                    expires_in: sent.expires_in_secs,
                });
            }
            None => {}
        }

        if user.failed_login_attempts > 0 || user.locked_until.is_some() {
            self.users.reset_login_attempts(user.id).await?;
        }

        let tokens = issue_session(
            &self.sessions,
            &self.signer,
            &user,
            FamilyId::generate(),
            &input.client,
        )
        .await?;

        let users = self.users.clone();
        let user_id = user.id;
        self.spawner.spawn(
            "update_last_login",
            Box::pin(async move { users.update_last_login(user_id, now).await }),
        );
        self.record_audit(Some(user.id), AuditAction::Login, None, &input.client);
        tracing::info!(
            user_id = %user.id,
            family = %tokens.family,
            remember_me = input.remember_me,
            "login succeeded"
        );

        Ok(LoginOutcome::Authenticated(AuthenticatedSession {
            tokens,
            user: user.principal(),
        }))
    }

    /// Bump the failure counter; the fifth consecutive failure locks the
    /// account and restarts the count.
    async fn record_failed_login(
        &self,
        user: &UserRecord,
        now: DateTime<Utc>,
        client: &ClientInfo,
    ) -> Result<(), AuthServiceError> {
        let locked_until = count_failed_attempt(&self.users, user.id, now).await?;
        self.audit_failure(user.id, "invalid password", locked_until, client);
        Ok(())
    }

    fn audit_failure(
        &self,
        user_id: uuid::Uuid,
        reason: &str,
        locked_until: Option<DateTime<Utc>>,
        client: &ClientInfo,
    ) {
        self.record_audit(Some(user_id), AuditAction::LoginFailed, Some(reason), client);
        if locked_until.is_some() {
            self.record_audit(Some(user_id), AuditAction::AccountLocked, None, client);
        }
    }

    fn record_audit(
        &self,
        user_id: Option<uuid::Uuid>,
        action: AuditAction,
        reason: Option<&str>,
        client: &ClientInfo,
    ) {
        dispatch_audit(
            self.spawner.as_ref(),
            &self.audit,
            audit_entry(user_id, action, reason, client),
        );
    }
}
