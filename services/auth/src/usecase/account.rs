use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use cermont_auth_types::token::TokenSigner;
use cermont_domain::id::FamilyId;
use cermont_domain::user::{UserRole, is_plausible_email, normalize_email};

use crate::domain::repository::{
    AuditLogRepository, SessionRepository, TaskSpawner, UserRepository,
};
use crate::domain::types::{AuditAction, ClientInfo, MIN_PASSWORD_LEN, NewUser};
use crate::error::AuthServiceError;
use crate::infra::password::PasswordHasher;
use crate::usecase::login::AuthenticatedSession;
use crate::usecase::session::{audit_entry, dispatch_audit, issue_session, surface};

fn check_new_password(password: &str) -> Result<(), AuthServiceError> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AuthServiceError::InvalidRequest("password too short"));
    }
    Ok(())
}

// ── Register ──────────────────────────────────────────────────────────────────

pub struct RegisterInput {
    pub email: String,
    pub password: String,
    pub name: String,
    /// Defaults to technician.
    pub role: Option<UserRole>,
    pub client: ClientInfo,
}

pub struct RegisterUseCase<U, S, A>
where
    U: UserRepository,
    S: SessionRepository,
    A: AuditLogRepository,
{
    pub users: U,
    pub sessions: S,
    pub audit: A,
    pub signer: TokenSigner,
    pub hasher: PasswordHasher,
    pub spawner: Arc<dyn TaskSpawner>,
}

impl<U, S, A> RegisterUseCase<U, S, A>
where
    U: UserRepository,
    S: SessionRepository,
    A: AuditLogRepository,
{
    pub async fn execute(
        &self,
        input: RegisterInput,
    ) -> Result<AuthenticatedSession, AuthServiceError> {
        self.register(input)
            .await
            .map_err(|e| surface("register", e))
    }

    async fn register(
        &self,
        input: RegisterInput,
    ) -> Result<AuthenticatedSession, AuthServiceError> {
        let email = normalize_email(&input.email);
        if !is_plausible_email(&email) {
            return Err(AuthServiceError::InvalidRequest("invalid email"));
        }
        let name = input.name.trim();
        if name.is_empty() {
            return Err(AuthServiceError::InvalidRequest("name is required"));
        }
        check_new_password(&input.password)?;

        if self.users.find_by_email(&email).await?.is_some() {
            return Err(AuthServiceError::Conflict);
        }

        let password_hash = self.hasher.hash(&input.password).await?;
        // The store still rejects a concurrent duplicate with Conflict.
        let user = self
            .users
            .create(&NewUser {
                id: Uuid::now_v7(),
                email,
                password_hash,
                name: name.to_owned(),
                role: input.role.unwrap_or(UserRole::Technician),
            })
            .await?;

        let tokens = issue_session(
            &self.sessions,
            &self.signer,
            &user,
            FamilyId::generate(),
            &input.client,
        )
        .await?;

        dispatch_audit(
            self.spawner.as_ref(),
            &self.audit,
            audit_entry(Some(user.id), AuditAction::Register, None, &input.client),
        );
        tracing::info!(user_id = %user.id, role = %user.role, "user registered");

        Ok(AuthenticatedSession {
            tokens,
            user: user.principal(),
        })
    }
}

// ── Current user ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct UserProfile {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub role: UserRole,
    pub two_factor_enabled: bool,
    #[serde(serialize_with = "cermont_core::serde::to_rfc3339_ms_opt")]
    pub last_login_at: Option<DateTime<Utc>>,
    #[serde(serialize_with = "cermont_core::serde::to_rfc3339_ms")]
    pub created_at: DateTime<Utc>,
}

pub struct GetCurrentUserUseCase<U: UserRepository> {
    pub users: U,
}

impl<U: UserRepository> GetCurrentUserUseCase<U> {
    pub async fn execute(&self, user_id: Uuid) -> Result<UserProfile, AuthServiceError> {
        let user = self
            .users
            .find_by_id(user_id)
            .await
            .map_err(|e| surface("current_user", e))?
            .filter(|u| u.active)
            .ok_or(AuthServiceError::Unauthorized)?;

        Ok(UserProfile {
            id: user.id,
            email: user.email,
            name: user.name,
            role: user.role,
            two_factor_enabled: user.two_factor_enabled,
            last_login_at: user.last_login_at,
            created_at: user.created_at,
        })
    }
}

// ── Change password ───────────────────────────────────────────────────────────

pub struct ChangePasswordInput {
    pub user_id: Uuid,
    pub current_password: String,
    pub new_password: String,
    pub client: ClientInfo,
}

/// Replaces the password and ends every refresh session of the user.
pub struct ChangePasswordUseCase<U, S, A>
where
    U: UserRepository,
    S: SessionRepository,
    A: AuditLogRepository,
{
    pub users: U,
    pub sessions: S,
    pub audit: A,
    pub hasher: PasswordHasher,
    pub spawner: Arc<dyn TaskSpawner>,
}

impl<U, S, A> ChangePasswordUseCase<U, S, A>
where
    U: UserRepository,
    S: SessionRepository,
    A: AuditLogRepository,
{
    pub async fn execute(&self, input: ChangePasswordInput) -> Result<(), AuthServiceError> {
        self.change(input)
            .await
            .map_err(|e| surface("change_password", e))
    }

    async fn change(&self, input: ChangePasswordInput) -> Result<(), AuthServiceError> {
        let user = self
            .users
            .find_by_id(input.user_id)
            .await?
            .filter(|u| u.active)
            .ok_or(AuthServiceError::Unauthorized)?;

        if !self
            .hasher
            .verify(&input.current_password, &user.password_hash)
            .await?
        {
            return Err(AuthServiceError::InvalidCredentials);
        }
        check_new_password(&input.new_password)?;

        let password_hash = self.hasher.hash(&input.new_password).await?;
        self.users
            .update_password_hash(user.id, &password_hash)
            .await?;
        let revoked = self.sessions.revoke_user_sessions(user.id).await?;

        dispatch_audit(
            self.spawner.as_ref(),
            &self.audit,
            audit_entry(
                Some(user.id),
                AuditAction::PasswordChanged,
                None,
                &input.client,
            ),
        );
        tracing::info!(user_id = %user.id, revoked, "password changed, sessions revoked");
        Ok(())
    }
}
