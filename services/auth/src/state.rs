use std::sync::Arc;

use deadpool_redis::Pool as RedisPool;
use sea_orm::DatabaseConnection;

use cermont_auth_types::token::TokenSigner;

use crate::domain::repository::TaskSpawner;
use crate::infra::cache::{GuardCache, NoopUserCache, RedisTokenDenylist, RedisUserCache};
use crate::infra::db::{
    DbAuditLogRepository, DbOneTimeCodeRepository, DbOutboxPublisher, DbSessionRepository,
    DbUserRepository,
};
use crate::infra::password::PasswordHasher;
use crate::usecase::account::{ChangePasswordUseCase, GetCurrentUserUseCase, RegisterUseCase};
use crate::usecase::guard::AuthenticateUseCase;
use crate::usecase::login::LoginUseCase;
use crate::usecase::logout::LogoutUseCase;
use crate::usecase::refresh::RefreshUseCase;
use crate::usecase::two_factor::OneTimeCodeService;

/// Shared application state passed to every handler via axum `State`.
#[derive(Clone)]
pub struct AppState {
    pub db: DatabaseConnection,
    pub redis: RedisPool,
    pub signer: TokenSigner,
    pub hasher: PasswordHasher,
    pub spawner: Arc<dyn TaskSpawner>,
    pub cookie_domain: String,
    /// `0` disables the guard cache.
    pub user_cache_ttl_secs: u64,
}

impl AppState {
    pub fn user_repo(&self) -> DbUserRepository {
        DbUserRepository {
            db: self.db.clone(),
        }
    }

    pub fn session_repo(&self) -> DbSessionRepository {
        DbSessionRepository {
            db: self.db.clone(),
        }
    }

    pub fn one_time_code_repo(&self) -> DbOneTimeCodeRepository {
        DbOneTimeCodeRepository {
            db: self.db.clone(),
        }
    }

    pub fn audit_repo(&self) -> DbAuditLogRepository {
        DbAuditLogRepository {
            db: self.db.clone(),
        }
    }

    pub fn outbox(&self) -> DbOutboxPublisher {
        DbOutboxPublisher {
            db: self.db.clone(),
        }
    }

    pub fn user_cache(&self) -> GuardCache {
        if self.user_cache_ttl_secs == 0 {
            GuardCache::Disabled(NoopUserCache)
        } else {
            GuardCache::Redis(RedisUserCache {
                pool: self.redis.clone(),
                ttl_secs: self.user_cache_ttl_secs,
            })
        }
    }

    pub fn denylist(&self) -> RedisTokenDenylist {
        RedisTokenDenylist {
            pool: self.redis.clone(),
        }
    }

    pub fn one_time_codes(
        &self,
    ) -> OneTimeCodeService<DbUserRepository, DbOneTimeCodeRepository, DbOutboxPublisher> {
        OneTimeCodeService {
            users: self.user_repo(),
            codes: self.one_time_code_repo(),
            events: self.outbox(),
            spawner: Arc::clone(&self.spawner),
        }
    }

    pub fn login(
        &self,
    ) -> LoginUseCase<
        DbUserRepository,
        DbSessionRepository,
        DbOneTimeCodeRepository,
        DbAuditLogRepository,
        DbOutboxPublisher,
    > {
        LoginUseCase {
            users: self.user_repo(),
            sessions: self.session_repo(),
            audit: self.audit_repo(),
            one_time_codes: self.one_time_codes(),
            signer: self.signer.clone(),
            hasher: self.hasher.clone(),
            spawner: Arc::clone(&self.spawner),
        }
    }

    pub fn refresh(
        &self,
    ) -> RefreshUseCase<DbUserRepository, DbSessionRepository, DbAuditLogRepository, DbOutboxPublisher>
    {
        RefreshUseCase {
            users: self.user_repo(),
            sessions: self.session_repo(),
            audit: self.audit_repo(),
            events: self.outbox(),
            signer: self.signer.clone(),
            spawner: Arc::clone(&self.spawner),
        }
    }

    pub fn logout(
        &self,
    ) -> LogoutUseCase<DbSessionRepository, DbAuditLogRepository, DbOutboxPublisher, RedisTokenDenylist>
    {
        LogoutUseCase {
            sessions: self.session_repo(),
            audit: self.audit_repo(),
            events: self.outbox(),
            denylist: self.denylist(),
            spawner: Arc::clone(&self.spawner),
        }
    }

    pub fn register(
        &self,
    ) -> RegisterUseCase<DbUserRepository, DbSessionRepository, DbAuditLogRepository> {
        RegisterUseCase {
            users: self.user_repo(),
            sessions: self.session_repo(),
            audit: self.audit_repo(),
            signer: self.signer.clone(),
            hasher: self.hasher.clone(),
            spawner: Arc::clone(&self.spawner),
        }
    }

    pub fn current_user(&self) -> GetCurrentUserUseCase<DbUserRepository> {
        GetCurrentUserUseCase {
            users: self.user_repo(),
        }
    }

    pub fn change_password(
        &self,
    ) -> ChangePasswordUseCase<DbUserRepository, DbSessionRepository, DbAuditLogRepository> {
        ChangePasswordUseCase {
            users: self.user_repo(),
            sessions: self.session_repo(),
            audit: self.audit_repo(),
            hasher: self.hasher.clone(),
            spawner: Arc::clone(&self.spawner),
        }
    }

    pub fn authenticate(
        &self,
    ) -> AuthenticateUseCase<DbUserRepository, GuardCache, RedisTokenDenylist> {
        AuthenticateUseCase {
            users: self.user_repo(),
            cache: self.user_cache(),
            denylist: self.denylist(),
            signer: self.signer.clone(),
        }
    }
}
