use anyhow::Context as _;
use chrono::{DateTime, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, Condition, DatabaseConnection,
    DatabaseTransaction, EntityTrait, QueryFilter, QueryOrder, QuerySelect, SqlErr,
    TransactionTrait,
};
use uuid::Uuid;

use cermont_auth_schema::{audit_logs, one_time_codes, outbox_events, refresh_tokens, users};
use cermont_domain::id::FamilyId;
use cermont_domain::user::UserRole;

use crate::domain::repository::{
    AuditLogRepository, EventPublisher, OneTimeCodeRepository, SessionRepository, UserRepository,
};
use crate::domain::types::{
    AuditEntry, LoginAttempts, NewUser, ONE_TIME_CODE_MAX_ATTEMPTS, OneTimeCode, OutboxEvent,
    RefreshSession, UserRecord,
};
use crate::error::AuthServiceError;

// ── User repository ───────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct DbUserRepository {
    pub db: DatabaseConnection,
}

impl UserRepository for DbUserRepository {
    async fn find_by_email(&self, email: &str) -> Result<Option<UserRecord>, AuthServiceError> {
        let model = users::Entity::find()
            .filter(users::Column::Email.eq(email))
            .one(&self.db)
            .await
            .context("find user by email")?;
        model.map(user_from_model).transpose()
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<UserRecord>, AuthServiceError> {
        let model = users::Entity::find_by_id(id)
            .one(&self.db)
            .await
            .context("find user by id")?;
        model.map(user_from_model).transpose()
    }

    async fn create(&self, user: &NewUser) -> Result<UserRecord, AuthServiceError> {
        let now = Utc::now();
        let result = users::ActiveModel {
            id: Set(user.id),
            email: Set(user.email.clone()),
            password_hash: Set(user.password_hash.clone()),
            name: Set(user.name.clone()),
            role: Set(user.role.as_str().to_owned()),
            active: Set(true),
            failed_login_attempts: Set(0),
            locked_until: Set(None),
            two_factor_enabled: Set(false),
            last_login_at: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&self.db)
        .await;

        match result {
            Ok(model) => user_from_model(model),
            Err(e) if matches!(e.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) => {
                Err(AuthServiceError::Conflict)
            }
            Err(e) => Err(anyhow::Error::new(e).context("create user").into()),
        }
    }

    async fn increment_login_attempts(
        &self,
        user_id: Uuid,
        max_attempts: i32,
        lock_until: DateTime<Utc>,
    ) -> Result<LoginAttempts, AuthServiceError> {
        // Both CASE arms read the pre-update row, so the threshold check and
        // the lock land in the same statement under the row lock.
        let reaches_limit = || {
            Condition::all()
                .add(Expr::col(users::Column::FailedLoginAttempts).gte(max_attempts - 1))
        };
        let rows = users::Entity::update_many()
            .filter(users::Column::Id.eq(user_id))
            .col_expr(
                users::Column::FailedLoginAttempts,
                Expr::case(reaches_limit(), Expr::value(0))
                    .finally(Expr::col(users::Column::FailedLoginAttempts).add(1))
                    .into(),
            )
            .col_expr(
                users::Column::LockedUntil,
                Expr::case(reaches_limit(), Expr::value(Some(lock_until)))
                    .finally(Expr::col(users::Column::LockedUntil))
                    .into(),
            )
            .col_expr(users::Column::UpdatedAt, Expr::value(Utc::now()))
            .exec_with_returning(&self.db)
            .await
            .context("increment login attempts")?;
        let model = rows
            .into_iter()
            .next()
            .context("increment login attempts: user vanished")?;
        Ok(LoginAttempts {
            attempts: model.failed_login_attempts,
            locked_until: model.locked_until,
            // Every other update leaves the counter at one or more.
            locked: model.failed_login_attempts == 0,
        })
    }

    async fn reset_login_attempts(&self, user_id: Uuid) -> Result<(), AuthServiceError> {
        users::Entity::update_many()
            .filter(users::Column::Id.eq(user_id))
            .col_expr(users::Column::FailedLoginAttempts, Expr::value(0))
            .col_expr(
                users::Column::LockedUntil,
                Expr::value(Option::<DateTime<Utc>>::None),
            )
            .exec(&self.db)
            .await
            .context("reset login attempts")?;
        Ok(())
    }

    async fn update_last_login(
        &self,
        user_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<(), AuthServiceError> {
        users::Entity::update_many()
            .filter(users::Column::Id.eq(user_id))
            .col_expr(users::Column::LastLoginAt, Expr::value(Some(at)))
            .exec(&self.db)
            .await
            .context("update last login")?;
        Ok(())
    }

    async fn update_password_hash(
        &self,
        user_id: Uuid,
        password_hash: &str,
    ) -> Result<(), AuthServiceError> {
        users::Entity::update_many()
            .filter(users::Column::Id.eq(user_id))
            .col_expr(users::Column::PasswordHash, Expr::value(password_hash))
            .col_expr(users::Column::UpdatedAt, Expr::value(Utc::now()))
            .exec(&self.db)
            .await
            .context("update password hash")?;
        Ok(())
    }
}

fn user_from_model(model: users::Model) -> Result<UserRecord, AuthServiceError> {
    let role = model
        .role
        .parse::<UserRole>()
        .with_context(|| format!("user {} has unknown role", model.id))?;
    Ok(UserRecord {
        id: model.id,
        email: model.email,
        password_hash: model.password_hash,
        name: model.name,
        role,
        active: model.active,
        failed_login_attempts: model.failed_login_attempts,
        locked_until: model.locked_until,
        two_factor_enabled: model.two_factor_enabled,
        last_login_at: model.last_login_at,
        created_at: model.created_at,
    })
}

// ── Session repository ────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct DbSessionRepository {
    pub db: DatabaseConnection,
}

impl SessionRepository for DbSessionRepository {
    async fn create_refresh_token(
        &self,
        session: &RefreshSession,
    ) -> Result<(), AuthServiceError> {
        refresh_tokens::ActiveModel {
            id: Set(session.id),
            token_hash: Set(session.token_hash.clone()),
            user_id: Set(session.user_id),
            family: Set(session.family.0),
            expires_at: Set(session.expires_at),
            revoked: Set(false),
            revoked_at: Set(None),
            ip: Set(session.ip.clone()),
            user_agent: Set(session.user_agent.clone()),
            created_at: Set(session.created_at),
        }
        .insert(&self.db)
        .await
        .context("create refresh token")?;
        Ok(())
    }

    async fn find_session_by_token(
        &self,
        token_hash: &str,
    ) -> Result<Option<RefreshSession>, AuthServiceError> {
        let model = refresh_tokens::Entity::find()
            .filter(refresh_tokens::Column::TokenHash.eq(token_hash))
            .one(&self.db)
            .await
            .context("find session by token")?;
        Ok(model.map(session_from_model))
    }

    async fn revoke_session(&self, token_hash: &str) -> Result<bool, AuthServiceError> {
        // Conditional on revoked = false: concurrent rotations of one token
        // cannot both observe rows_affected = 1.
        let result = refresh_tokens::Entity::update_many()
            .filter(refresh_tokens::Column::TokenHash.eq(token_hash))
            .filter(refresh_tokens::Column::Revoked.eq(false))
            .col_expr(refresh_tokens::Column::Revoked, Expr::value(true))
            .col_expr(refresh_tokens::Column::RevokedAt, Expr::value(Some(Utc::now())))
            .exec(&self.db)
            .await
            .context("revoke session")?;
        Ok(result.rows_affected == 1)
    }

    async fn revoke_session_family(&self, family: FamilyId) -> Result<u64, AuthServiceError> {
        let result = refresh_tokens::Entity::update_many()
            .filter(refresh_tokens::Column::Family.eq(family.0))
            .filter(refresh_tokens::Column::Revoked.eq(false))
            .col_expr(refresh_tokens::Column::Revoked, Expr::value(true))
            .col_expr(refresh_tokens::Column::RevokedAt, Expr::value(Some(Utc::now())))
            .exec(&self.db)
            .await
            .context("revoke session family")?;
        Ok(result.rows_affected)
    }

    async fn revoke_user_sessions(&self, user_id: Uuid) -> Result<u64, AuthServiceError> {
        let result = refresh_tokens::Entity::update_many()
            .filter(refresh_tokens::Column::UserId.eq(user_id))
            .filter(refresh_tokens::Column::Revoked.eq(false))
            .col_expr(refresh_tokens::Column::Revoked, Expr::value(true))
            .col_expr(refresh_tokens::Column::RevokedAt, Expr::value(Some(Utc::now())))
            .exec(&self.db)
            .await
            .context("revoke user sessions")?;
        Ok(result.rows_affected)
    }
}

fn session_from_model(model: refresh_tokens::Model) -> RefreshSession {
    RefreshSession {
        id: model.id,
        token_hash: model.token_hash,
        user_id: model.user_id,
        family: FamilyId(model.family),
        expires_at: model.expires_at,
        revoked: model.revoked,
        revoked_at: model.revoked_at,
        ip: model.ip,
        user_agent: model.user_agent,
        created_at: model.created_at,
    }
}

// ── One-time code repository ──────────────────────────────────────────────────

#[derive(Clone)]
pub struct DbOneTimeCodeRepository {
    pub db: DatabaseConnection,
}

impl OneTimeCodeRepository for DbOneTimeCodeRepository {
    async fn replace_unverified(&self, code: &OneTimeCode) -> Result<(), AuthServiceError> {
        self.db
            .transaction::<_, (), sea_orm::DbErr>(|txn| {
                let code = code.clone();
                Box::pin(async move {
                    // Row lock on the owner serializes concurrent sends.
                    users::Entity::find_by_id(code.user_id)
                        .lock_exclusive()
                        .one(txn)
                        .await?;
                    one_time_codes::Entity::delete_many()
                        .filter(one_time_codes::Column::UserId.eq(code.user_id))
                        .filter(one_time_codes::Column::Verified.eq(false))
                        .exec(txn)
                        .await?;
                    insert_one_time_code(txn, &code).await
                })
            })
            .await
            .context("replace unverified one-time codes")?;
        Ok(())
    }

    async fn find_unverified(
        &self,
        user_id: Uuid,
    ) -> Result<Option<OneTimeCode>, AuthServiceError> {
        let model = one_time_codes::Entity::find()
            .filter(one_time_codes::Column::UserId.eq(user_id))
            .filter(one_time_codes::Column::Verified.eq(false))
            .order_by_desc(one_time_codes::Column::CreatedAt)
            .one(&self.db)
            .await
            .context("find unverified one-time code")?;
        Ok(model.map(code_from_model))
    }

    async fn record_failed_attempt(&self, id: Uuid) -> Result<i32, AuthServiceError> {
        let rows = one_time_codes::Entity::update_many()
            .filter(one_time_codes::Column::Id.eq(id))
            .col_expr(
                one_time_codes::Column::Attempts,
                Expr::col(one_time_codes::Column::Attempts).add(1),
            )
            .exec_with_returning(&self.db)
            .await
            .context("record one-time code attempt")?;
        // A concurrent invalidation removed the row: treat it as exhausted.
        Ok(rows
            .first()
            .map(|m| m.attempts)
            .unwrap_or(ONE_TIME_CODE_MAX_ATTEMPTS))
    }

    async fn invalidate(&self, id: Uuid) -> Result<(), AuthServiceError> {
        one_time_codes::Entity::delete_by_id(id)
            .exec(&self.db)
            .await
            .context("invalidate one-time code")?;
        Ok(())
    }

    async fn mark_verified(&self, id: Uuid) -> Result<bool, AuthServiceError> {
        let result = one_time_codes::Entity::update_many()
            .filter(one_time_codes::Column::Id.eq(id))
            .filter(one_time_codes::Column::Verified.eq(false))
            .col_expr(one_time_codes::Column::Verified, Expr::value(true))
            .exec(&self.db)
            .await
            .context("mark one-time code verified")?;
        Ok(result.rows_affected == 1)
    }
}

async fn insert_one_time_code(
    txn: &DatabaseTransaction,
    code: &OneTimeCode,
) -> Result<(), sea_orm::DbErr> {
    one_time_codes::ActiveModel {
        id: Set(code.id),
        user_id: Set(code.user_id),
        code: Set(code.code.clone()),
        expires_at: Set(code.expires_at),
        verified: Set(false),
        attempts: Set(0),
        created_at: Set(code.created_at),
    }
    .insert(txn)
    .await?;
    Ok(())
}

fn code_from_model(model: one_time_codes::Model) -> OneTimeCode {
    OneTimeCode {
        id: model.id,
        user_id: model.user_id,
        code: model.code,
        expires_at: model.expires_at,
        verified: model.verified,
        attempts: model.attempts,
        created_at: model.created_at,
    }
}

// ── Audit log + outbox ────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct DbAuditLogRepository {
    pub db: DatabaseConnection,
}

impl AuditLogRepository for DbAuditLogRepository {
    async fn create_audit_log(&self, entry: AuditEntry) -> Result<(), AuthServiceError> {
        audit_logs::ActiveModel {
            id: Set(Uuid::now_v7()),
            user_id: Set(entry.user_id),
            action: Set(entry.action.as_str().to_owned()),
            reason: Set(entry.reason),
            ip: Set(entry.client.ip),
            user_agent: Set(entry.client.user_agent),
            created_at: Set(Utc::now()),
        }
        .insert(&self.db)
        .await
        .context("create audit log")?;
        Ok(())
    }
}

/// Writes events to the outbox table for the delivery subsystem.
#[derive(Clone)]
pub struct DbOutboxPublisher {
    pub db: DatabaseConnection,
}

impl EventPublisher for DbOutboxPublisher {
    async fn publish(&self, event: OutboxEvent) -> Result<(), AuthServiceError> {
        let now = Utc::now();
        outbox_events::ActiveModel {
            id: Set(event.id),
            kind: Set(event.kind),
            user_id: Set(event.user_id),
            payload: Set(event.payload),
            idempotency_key: Set(event.idempotency_key),
            created_at: Set(now),
            processed_at: Set(None),
        }
        .insert(&self.db)
        .await
        .context("publish outbox event")?;
        Ok(())
    }
}
