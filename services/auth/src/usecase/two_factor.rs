use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use rand::RngExt;
use serde::Serialize;
use serde_json::json;
use uuid::Uuid;

use cermont_domain::user::normalize_email;

use crate::domain::repository::{
    EventPublisher, OneTimeCodeRepository, TaskSpawner, UserRepository,
};
use crate::domain::types::{
    EVENT_ONE_TIME_CODE_ISSUED, ONE_TIME_CODE_MAX_ATTEMPTS, ONE_TIME_CODE_TTL_SECS, OneTimeCode,
    OutboxEvent,
};
use crate::error::AuthServiceError;
use crate::usecase::session::{count_failed_attempt, dispatch_event, surface};

/// Uniform over 000000..=999999, zero-padded.
pub fn generate_code() -> String {
    let n: u32 = rand::rng().random_range(0..1_000_000);
    format!("{n:06}")
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct CodeSent {
    pub expires_in_secs: i64,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct CodeVerification {
    pub valid: bool,
    pub user_id: Option<Uuid>,
    /// Set when this wrong guess locked the account.
    #[serde(skip)]
    pub locked_until: Option<DateTime<Utc>>,
}

impl CodeVerification {
    fn rejected() -> Self {
        Self {
            valid: false,
            user_id: None,
            locked_until: None,
        }
    }
}

/// Issues and checks numeric second-factor codes.
pub struct OneTimeCodeService<U, C, P>
where
    U: UserRepository,
    C: OneTimeCodeRepository,
    P: EventPublisher,
{
    pub users: U,
    pub codes: C,
    pub events: P,
    pub spawner: Arc<dyn TaskSpawner>,
}

impl<U, C, P> OneTimeCodeService<U, C, P>
where
    U: UserRepository,
    C: OneTimeCodeRepository,
    P: EventPublisher,
{
    /// Replace any pending code for the user with a fresh one and queue it
    /// for delivery. Delivery is fire-and-forget.
    pub async fn send(&self, email: &str) -> Result<CodeSent, AuthServiceError> {
        self.send_inner(email)
            .await
            .map_err(|e| surface("send_one_time_code", e))
    }

    async fn send_inner(&self, email: &str) -> Result<CodeSent, AuthServiceError> {
        let email = normalize_email(email);
        let user = self
            .users
            .find_by_email(&email)
            .await?
            .ok_or(AuthServiceError::UserNotFound)?;
        if !user.two_factor_enabled {
            return Err(AuthServiceError::TwoFactorNotEnabled);
        }
        // No fresh codes while locked.
        let now = Utc::now();
        if let Some(until) = user.locked_at(now) {
            return Err(AuthServiceError::AccountLocked { until });
        }

        let code = OneTimeCode {
            id: Uuid::now_v7(),
            user_id: user.id,
            code: generate_code(),
            expires_at: now + Duration::seconds(ONE_TIME_CODE_TTL_SECS),
            verified: false,
            attempts: 0,
            created_at: now,
        };
        self.codes.replace_unverified(&code).await?;

        let event = OutboxEvent::new(
            EVENT_ONE_TIME_CODE_ISSUED,
            Some(user.id),
            code.id,
            json!({
                "email": user.email,
                "name": user.name,
                "code": code.code,
                "expires_in_secs": ONE_TIME_CODE_TTL_SECS,
            }),
        );
        dispatch_event(self.spawner.as_ref(), &self.events, event);
        tracing::info!(user_id = %user.id, "one-time code issued");

        Ok(CodeSent {
            expires_in_secs: ONE_TIME_CODE_TTL_SECS,
        })
    }

    /// Check `code` against the user's pending code.
    ///
    /// A correct code is consumed. A wrong one burns an attempt on the code
    /// and counts as a failed login for the account; the code is discarded
    /// once attempts run out, it has expired, or the account gets locked.
    /// Nothing is checked while the account is locked.
    pub async fn verify(
        &self,
        email: &str,
        code: &str,
    ) -> Result<CodeVerification, AuthServiceError> {
        self.verify_inner(email, code)
            .await
            .map_err(|e| surface("verify_one_time_code", e))
    }

    async fn verify_inner(
        &self,
        email: &str,
        code: &str,
    ) -> Result<CodeVerification, AuthServiceError> {
        let email = normalize_email(email);
        let Some(user) = self.users.find_by_email(&email).await? else {
            return Ok(CodeVerification::rejected());
        };
        let now = Utc::now();
        if user.locked_at(now).is_some() {
            return Ok(CodeVerification::rejected());
        }
        let Some(pending) = self.codes.find_unverified(user.id).await? else {
            return Ok(CodeVerification::rejected());
        };

        if pending.is_expired(now) || pending.attempts >= ONE_TIME_CODE_MAX_ATTEMPTS {
            self.codes.invalidate(pending.id).await?;
            return Ok(CodeVerification::rejected());
        }

        if !constant_time_eq(pending.code.as_bytes(), code.trim().as_bytes()) {
            let attempts = self.codes.record_failed_attempt(pending.id).await?;
            let locked_until = count_failed_attempt(&self.users, user.id, now).await?;
            if attempts >= ONE_TIME_CODE_MAX_ATTEMPTS || locked_until.is_some() {
                self.codes.invalidate(pending.id).await?;
                tracing::warn!(user_id = %user.id, attempts, "one-time code discarded");
            }
            return Ok(CodeVerification {
                locked_until,
                ..CodeVerification::rejected()
            });
        }

        // Lost a race with another verify of the same code.
        if !self.codes.mark_verified(pending.id).await? {
            return Ok(CodeVerification::rejected());
        }

        Ok(CodeVerification {
            valid: true,
            user_id: Some(user.id),
            locked_until: None,
        })
    }
}
