use cermont_auth_types::token::ACCESS_TOKEN_TTL_SECS;

/// Auth service configuration loaded from environment variables.
#[derive(Debug)]
pub struct AuthConfig {
    /// PostgreSQL connection URL.
    pub database_url: String,
    /// Redis connection URL (principal cache + access-token denylist).
    pub redis_url: String,
    /// HMAC secret for signing access tokens.
    pub jwt_secret: String,
    /// Cookie domain attribute (root domain, e.g. "cermont.example").
    pub cookie_domain: String,
    /// TCP port to listen on (default 3112). Env var: `AUTH_PORT`.
    pub auth_port: u16,
    /// Access-token lifetime (default 900). Env var: `ACCESS_TOKEN_TTL_SECS`.
    pub access_token_ttl_secs: i64,
    /// Guard principal cache TTL (default 30, `0` disables). Env var: `USER_CACHE_TTL_SECS`.
    pub user_cache_ttl_secs: u64,
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl AuthConfig {
    pub fn from_env() -> Self {
        Self {
            database_url: std::env::var("DATABASE_URL").expect("DATABASE_URL"),
            redis_url: std::env::var("REDIS_URL").expect("REDIS_URL"),
            jwt_secret: std::env::var("JWT_SECRET").expect("JWT_SECRET"),
            cookie_domain: std::env::var("COOKIE_DOMAIN").expect("COOKIE_DOMAIN"),
            auth_port: env_or("AUTH_PORT", 3112),
            access_token_ttl_secs: env_or("ACCESS_TOKEN_TTL_SECS", ACCESS_TOKEN_TTL_SECS),
            user_cache_ttl_secs: env_or("USER_CACHE_TTL_SECS", 30),
        }
    }
}
