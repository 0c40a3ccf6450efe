//! JWT access-token signing and validation.

#[cfg(any(feature = "USE_ONLY_IN_AUTH_SERVICE", test))]
use std::time::{SystemTime, UNIX_EPOCH};

#[cfg(any(feature = "USE_ONLY_IN_AUTH_SERVICE", test))]
use jsonwebtoken::{EncodingKey, Header, encode};
use jsonwebtoken::{DecodingKey, Validation, decode};
use serde::Deserialize;
#[cfg(any(feature = "USE_ONLY_IN_AUTH_SERVICE", test))]
use serde::Serialize;
use uuid::Uuid;

use cermont_domain::user::UserRole;

/// Default access-token lifetime in seconds (15 minutes).
pub const ACCESS_TOKEN_TTL_SECS: i64 = 900;

/// User identity extracted from a validated access token.
#[derive(Debug, Clone)]
pub struct TokenInfo {
    pub user_id: Uuid,
    pub email: String,
    pub role: UserRole,
    /// Unique token id; key for the revocation denylist.
    pub jti: String,
    pub exp: u64,
}

/// Errors returned by [`TokenSigner::verify`].
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("invalid signature")]
    InvalidSignature,
    #[error("token expired")]
    Expired,
    #[error("malformed token")]
    Malformed,
}

/// JWT claims payload.
///
/// | Field | JWT claim | Meaning |
/// |-------|-----------|---------|
/// | `sub` | `sub` | user id (UUID string) |
/// | `legacy_user_id` | `userId` | user id, written by older issuers only |
/// | `email` | custom | normalized email |
/// | `role` | custom | [`UserRole`] wire name |
/// | `jti` | `jti` | unique token id |
/// | `iat` / `exp` | `iat` / `exp` | seconds since epoch |
///
/// Tokens are issued with `sub` only. `userId` is read as a fallback so
/// tokens minted before the claim was standardized keep validating until
/// they expire.
#[derive(Debug, Deserialize)]
#[cfg_attr(any(feature = "USE_ONLY_IN_AUTH_SERVICE", test), derive(Serialize))]
pub struct JwtClaims {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,
    #[serde(default, rename = "userId", skip_serializing_if = "Option::is_none")]
    pub legacy_user_id: Option<String>,
    pub email: String,
    pub role: UserRole,
    pub jti: String,
    pub iat: u64,
    pub exp: u64,
}

impl JwtClaims {
    /// Subject id, preferring `sub` over the legacy `userId` claim.
    pub fn subject(&self) -> Option<&str> {
        self.sub.as_deref().or(self.legacy_user_id.as_deref())
    }
}

/// A freshly signed access token.
#[derive(Debug, Clone)]
pub struct IssuedAccessToken {
    pub token: String,
    pub jti: String,
    pub expires_at: u64,
}

#[cfg(any(feature = "USE_ONLY_IN_AUTH_SERVICE", test))]
fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

/// Issues and verifies HS256 access tokens.
///
/// Verification is a pure signature + expiry check; it never touches storage.
#[derive(Clone)]
pub struct TokenSigner {
    #[cfg(any(feature = "USE_ONLY_IN_AUTH_SERVICE", test))]
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl_secs: i64,
}

impl TokenSigner {
    pub fn new(secret: &str, ttl_secs: i64) -> Self {
        Self {
            #[cfg(any(feature = "USE_ONLY_IN_AUTH_SERVICE", test))]
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            ttl_secs,
        }
    }

    pub fn ttl_secs(&self) -> i64 {
        self.ttl_secs
    }

    /// Verify signature and expiry, returning the parsed identity.
    ///
    /// Zero leeway: a token is rejected the second its `exp` passes.
    pub fn verify(&self, token: &str) -> Result<TokenInfo, AuthError> {
        let mut validation = Validation::new(jsonwebtoken::Algorithm::HS256);
        validation.validate_exp = true;
        validation.leeway = 0;
        validation.required_spec_claims.clear();
        validation.set_required_spec_claims(&["exp"]);

        let claims = decode::<JwtClaims>(token, &self.decoding, &validation)
            .map_err(|e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::Expired,
                jsonwebtoken::errors::ErrorKind::InvalidSignature => AuthError::InvalidSignature,
                _ => AuthError::Malformed,
            })?
            .claims;

        let user_id = claims
            .subject()
            .and_then(|s| s.parse::<Uuid>().ok())
            .ok_or(AuthError::Malformed)?;

        Ok(TokenInfo {
            user_id,
            email: claims.email,
            role: claims.role,
            jti: claims.jti,
            exp: claims.exp,
        })
    }

    /// Sign a new access token with a random `jti`.
    ///
    /// Requires the `USE_ONLY_IN_AUTH_SERVICE` feature: the auth service is
    /// the sole issuer, every other consumer only verifies.
    #[cfg(any(feature = "USE_ONLY_IN_AUTH_SERVICE", test))]
    pub fn issue_access_token(
        &self,
        user_id: Uuid,
        email: &str,
        role: UserRole,
    ) -> Result<IssuedAccessToken, jsonwebtoken::errors::Error> {
        let iat = now_secs();
        let exp = iat.saturating_add_signed(self.ttl_secs);
        let jti = Uuid::new_v4().to_string();
        let claims = JwtClaims {
            sub: Some(user_id.to_string()),
            legacy_user_id: None,
            email: email.to_owned(),
            role,
            jti: jti.clone(),
            iat,
            exp,
        };
        let token = encode(&Header::default(), &claims, &self.encoding)?;
        Ok(IssuedAccessToken {
            token,
            jti,
            expires_at: exp,
        })
    }
}
