use std::convert::Infallible;
use std::future::Future;

use axum::extract::{FromRequestParts, OptionalFromRequestParts};
use axum::http::HeaderMap;
use axum::http::header::USER_AGENT;
use axum::http::request::Parts;

use cermont_auth_types::identity::{Principal, bearer_token};
use cermont_auth_types::token::TokenInfo;

use crate::domain::types::ClientInfo;
use crate::error::AuthServiceError;
use crate::state::AppState;

const X_FORWARDED_FOR: &str = "x-forwarded-for";
const X_REAL_IP: &str = "x-real-ip";

/// A request that passed the guard: valid, non-denylisted access token of an
/// active user.
///
/// Rejects with `401 UNAUTHORIZED` otherwise.
#[derive(Debug, Clone)]
pub struct Authenticated {
    pub principal: Principal,
    pub token: TokenInfo,
}

impl FromRequestParts<AppState> for Authenticated {
    type Rejection = AuthServiceError;

    fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> impl Future<Output = Result<Self, Self::Rejection>> + Send {
        let bearer = bearer_token(&parts.headers);
        let guard = state.authenticate();

        async move {
            let request = guard.execute(bearer.as_deref()).await?;
            Ok(Self {
                principal: request.principal,
                token: request.token,
            })
        }
    }
}

/// `Option<Authenticated>`: `None` for anonymous callers and for rejected
/// tokens. Store failures still reject.
impl OptionalFromRequestParts<AppState> for Authenticated {
    type Rejection = AuthServiceError;

    fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> impl Future<Output = Result<Option<Self>, Self::Rejection>> + Send {
        let bearer = bearer_token(&parts.headers);
        let guard = state.authenticate();

        async move {
            let Some(bearer) = bearer else {
                return Ok(None);
            };
            match guard.execute(Some(&bearer)).await {
                Ok(request) => Ok(Some(Self {
                    principal: request.principal,
                    token: request.token,
                })),
                Err(AuthServiceError::Unauthorized) => Ok(None),
                Err(e) => Err(e),
            }
        }
    }
}

/// First hop of `x-forwarded-for`, then `x-real-ip`.
fn client_ip(headers: &HeaderMap) -> Option<String> {
    let forwarded = headers
        .get(X_FORWARDED_FOR)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty());

    forwarded
        .or_else(|| {
            headers
                .get(X_REAL_IP)
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
                .filter(|v| !v.is_empty())
        })
        .map(str::to_owned)
}

impl<S> FromRequestParts<S> for ClientInfo
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    fn from_request_parts(
        parts: &mut Parts,
        _state: &S,
    ) -> impl Future<Output = Result<Self, Self::Rejection>> + Send {
        let info = ClientInfo {
            ip: client_ip(&parts.headers),
            user_agent: parts
                .headers
                .get(USER_AGENT)
                .and_then(|v| v.to_str().ok())
                .map(str::to_owned),
        };
        async move { Ok(info) }
    }
}
