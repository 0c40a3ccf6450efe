//! Bearer-token extraction and the normalized authenticated identity.

use axum_extra::extract::cookie::CookieJar;
use http::HeaderMap;
use http::header::AUTHORIZATION;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use cermont_domain::user::UserRole;

use crate::cookie::CERMONT_ACCESS_TOKEN;

/// Identity handed to downstream authorization after a request passes the guard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub user_id: Uuid,
    pub email: String,
    pub name: String,
    pub role: UserRole,
}

/// Extract the access token from `Authorization: Bearer <token>`, falling back
/// to the access-token cookie.
///
/// The header wins when both are present. Returns `None` for an empty token.
pub fn bearer_token(headers: &HeaderMap) -> Option<String> {
    let from_header = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| {
            let (scheme, token) = v.trim().split_once(' ')?;
            scheme.eq_ignore_ascii_case("bearer").then(|| token.trim())
        })
        .filter(|t| !t.is_empty())
        .map(str::to_owned);

    from_header.or_else(|| {
        CookieJar::from_headers(headers)
            .get(CERMONT_ACCESS_TOKEN)
            .map(|c| c.value().to_owned())
            .filter(|t| !t.is_empty())
    })
}
