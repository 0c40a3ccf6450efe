use cermont_auth_types::identity::Principal;
use cermont_auth_types::token::{TokenInfo, TokenSigner};

use crate::domain::repository::{TokenDenylist, UserCache, UserRepository};
use crate::error::AuthServiceError;
use crate::usecase::session::surface;

/// Result of a successful guard check.
#[derive(Debug, Clone)]
pub struct AuthenticatedRequest {
    pub principal: Principal,
    pub token: TokenInfo,
}

/// Resolves a bearer token to an active user.
///
/// The principal cache may serve a user for up to its TTL after they were
/// deactivated. Signature, expiry and denylist checks are never cached.
pub struct AuthenticateUseCase<U, C, D>
where
    U: UserRepository,
    C: UserCache,
    D: TokenDenylist,
{
    pub users: U,
    pub cache: C,
    pub denylist: D,
    pub signer: TokenSigner,
}

impl<U, C, D> AuthenticateUseCase<U, C, D>
where
    U: UserRepository,
    C: UserCache,
    D: TokenDenylist,
{
    pub async fn execute(
        &self,
        bearer: Option<&str>,
    ) -> Result<AuthenticatedRequest, AuthServiceError> {
        self.authenticate(bearer)
            .await
            .map_err(|e| surface("authenticate", e))
    }

    async fn authenticate(
        &self,
        bearer: Option<&str>,
    ) -> Result<AuthenticatedRequest, AuthServiceError> {
        let bearer = bearer.ok_or(AuthServiceError::Unauthorized)?;
        let token = self.signer.verify(bearer).map_err(|e| {
            tracing::debug!(error = %e, "access token rejected");
            AuthServiceError::Unauthorized
        })?;

        if self.denylist.is_denied(&token.jti).await? {
            return Err(AuthServiceError::Unauthorized);
        }

        let cached = match self.cache.get(token.user_id).await {
            Ok(hit) => hit,
            Err(e) => {
                tracing::warn!(error = %e.detail(), "principal cache read failed");
                None
            }
        };
        if let Some(principal) = cached {
            return Ok(AuthenticatedRequest { principal, token });
        }

        let principal = self
            .users
            .find_by_id(token.user_id)
            .await?
            .filter(|u| u.active)
            .ok_or(AuthServiceError::Unauthorized)?
            .principal();

        if let Err(e) = self.cache.put(&principal).await {
            tracing::warn!(error = %e.detail(), "principal cache write failed");
        }
        Ok(AuthenticatedRequest { principal, token })
    }
}
