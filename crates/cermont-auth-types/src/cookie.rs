//! Cookie builders for access and refresh tokens.

use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use time::Duration;

/// Cookie name for the access token (fallback to the `Authorization` header).
pub const CERMONT_ACCESS_TOKEN: &str = "cermont_access_token";

/// Cookie name for the opaque refresh token.
pub const CERMONT_REFRESH_TOKEN: &str = "cermont_refresh_token";

/// Refresh-token lifetime in seconds (7 days). Also the cookie Max-Age.
pub const REFRESH_TOKEN_TTL_SECS: i64 = 604_800;

/// Refresh cookie is only sent to the session endpoints.
const REFRESH_COOKIE_PATH: &str = "/auth";

/// Set the access-token cookie on the jar.
///
/// ```
/// use axum_extra::extract::cookie::CookieJar;
/// use cermont_auth_types::cookie::{set_access_token_cookie, CERMONT_ACCESS_TOKEN};
///
/// let jar = CookieJar::new();
/// let jar = set_access_token_cookie(jar, "token_value".to_string(), "example.com".to_string(), 900);
/// let cookie = jar.get(CERMONT_ACCESS_TOKEN).unwrap();
/// assert_eq!(cookie.path(), Some("/"));
/// assert_eq!(cookie.max_age(), Some(time::Duration::seconds(900)));
/// assert!(cookie.http_only().unwrap_or(false));
/// ```
pub fn set_access_token_cookie(
    jar: CookieJar,
    value: String,
    domain: String,
    max_age_secs: i64,
) -> CookieJar {
    let cookie = Cookie::build((CERMONT_ACCESS_TOKEN, value))
        .path("/")
        .domain(domain)
        .max_age(Duration::seconds(max_age_secs))
        .http_only(true)
        .secure(true)
        .same_site(SameSite::Lax)
        .build();
    jar.add(cookie)
}

/// Set the refresh-token cookie on the jar.
///
/// ```
/// use axum_extra::extract::cookie::CookieJar;
/// use cermont_auth_types::cookie::{set_refresh_token_cookie, CERMONT_REFRESH_TOKEN};
///
/// let jar = CookieJar::new();
/// let jar = set_refresh_token_cookie(jar, "refresh_value".to_string(), "example.com".to_string());
/// let cookie = jar.get(CERMONT_REFRESH_TOKEN).unwrap();
/// assert_eq!(cookie.path(), Some("/auth"));
/// assert_eq!(cookie.domain(), Some("example.com"));
/// assert_eq!(cookie.max_age(), Some(time::Duration::seconds(604800)));
/// assert!(cookie.secure().unwrap_or(false));
/// ```
pub fn set_refresh_token_cookie(jar: CookieJar, value: String, domain: String) -> CookieJar {
    let cookie = Cookie::build((CERMONT_REFRESH_TOKEN, value))
        .path(REFRESH_COOKIE_PATH)
        .domain(domain)
        .max_age(Duration::seconds(REFRESH_TOKEN_TTL_SECS))
        .http_only(true)
        .secure(true)
        .same_site(SameSite::Strict)
        .build();
    jar.add(cookie)
}

/// Clear both token cookies by setting Max-Age to 0.
///
/// ```
/// use axum_extra::extract::cookie::CookieJar;
/// use cermont_auth_types::cookie::{
///     clear_cookies, set_refresh_token_cookie, CERMONT_ACCESS_TOKEN, CERMONT_REFRESH_TOKEN,
/// };
///
/// let jar = CookieJar::new();
/// let jar = set_refresh_token_cookie(jar, "r".to_string(), "example.com".to_string());
/// let jar = clear_cookies(jar, "example.com".to_string());
/// assert_eq!(jar.get(CERMONT_REFRESH_TOKEN).unwrap().max_age(), Some(time::Duration::ZERO));
/// assert_eq!(jar.get(CERMONT_ACCESS_TOKEN).unwrap().max_age(), Some(time::Duration::ZERO));
/// ```
pub fn clear_cookies(jar: CookieJar, domain: String) -> CookieJar {
    let access = Cookie::build((CERMONT_ACCESS_TOKEN, ""))
        .path("/")
        .domain(domain.clone())
        .max_age(Duration::ZERO)
        .http_only(true)
        .secure(true)
        .same_site(SameSite::Lax)
        .build();
    let refresh = Cookie::build((CERMONT_REFRESH_TOKEN, ""))
        .path(REFRESH_COOKIE_PATH)
        .domain(domain)
        .max_age(Duration::ZERO)
        .http_only(true)
        .secure(true)
        .same_site(SameSite::Strict)
        .build();
    jar.add(access).add(refresh)
}
