use anyhow::Context as _;
use deadpool_redis::Pool;
use deadpool_redis::redis::AsyncCommands;
use uuid::Uuid;

use cermont_auth_types::identity::Principal;

use crate::domain::repository::{TokenDenylist, UserCache};
use crate::error::AuthServiceError;

fn principal_key(user_id: Uuid) -> String {
    format!("auth_principal:{user_id}")
}

fn denied_jti_key(jti: &str) -> String {
    format!("denied_jti:{jti}")
}

/// Guard principal cache in Redis. Entries expire after `ttl_secs`.
#[derive(Clone)]
pub struct RedisUserCache {
    pub pool: Pool,
    pub ttl_secs: u64,
}

impl UserCache for RedisUserCache {
    async fn get(&self, user_id: Uuid) -> Result<Option<Principal>, AuthServiceError> {
        let mut conn = self.pool.get().await.context("redis pool")?;
        let value: Option<Vec<u8>> = conn
            .get(principal_key(user_id))
            .await
            .context("get cached principal")?;
        match value {
            Some(bytes) => Ok(Some(
                serde_json::from_slice(&bytes).context("decode cached principal")?,
            )),
            None => Ok(None),
        }
    }

    async fn put(&self, principal: &Principal) -> Result<(), AuthServiceError> {
        let bytes = serde_json::to_vec(principal).context("encode principal")?;
        let mut conn = self.pool.get().await.context("redis pool")?;
        let (): () = conn
            .set_ex(principal_key(principal.user_id), bytes, self.ttl_secs)
            .await
            .context("cache principal")?;
        Ok(())
    }
}

/// Used when the cache TTL is configured as zero: every guard check reads the store.
#[derive(Clone, Copy, Default)]
pub struct NoopUserCache;

impl UserCache for NoopUserCache {
    async fn get(&self, _user_id: Uuid) -> Result<Option<Principal>, AuthServiceError> {
        Ok(None)
    }

    async fn put(&self, _principal: &Principal) -> Result<(), AuthServiceError> {
        Ok(())
    }
}

/// Either cache backend, chosen once at startup.
#[derive(Clone)]
pub enum GuardCache {
    Redis(RedisUserCache),
    Disabled(NoopUserCache),
}

impl UserCache for GuardCache {
    async fn get(&self, user_id: Uuid) -> Result<Option<Principal>, AuthServiceError> {
        match self {
            Self::Redis(c) => c.get(user_id).await,
            Self::Disabled(c) => c.get(user_id).await,
        }
    }

    async fn put(&self, principal: &Principal) -> Result<(), AuthServiceError> {
        match self {
            Self::Redis(c) => c.put(principal).await,
            Self::Disabled(c) => c.put(principal).await,
        }
    }
}

#[derive(Clone)]
pub struct RedisTokenDenylist {
    pub pool: Pool,
}

impl TokenDenylist for RedisTokenDenylist {
    async fn deny(&self, jti: &str, ttl_secs: u64) -> Result<(), AuthServiceError> {
        if ttl_secs == 0 {
            return Ok(());
        }
        let mut conn = self.pool.get().await.context("redis pool")?;
        let (): () = conn
            .set_ex(denied_jti_key(jti), "1", ttl_secs)
            .await
            .context("deny access token")?;
        Ok(())
    }

    async fn is_denied(&self, jti: &str) -> Result<bool, AuthServiceError> {
        let mut conn = self.pool.get().await.context("redis pool")?;
        let denied: bool = conn
            .exists(denied_jti_key(jti))
            .await
            .context("check access token denylist")?;
        Ok(denied)
    }
}
