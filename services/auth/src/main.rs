use std::sync::Arc;

use sea_orm::Database;
use tracing::info;

use cermont_auth::config::AuthConfig;
use cermont_auth::infra::password::PasswordHasher;
use cermont_auth::infra::tasks::TokioTaskSpawner;
use cermont_auth::router::build_router;
use cermont_auth::state::AppState;
use cermont_auth_types::token::TokenSigner;

#[tokio::main]
async fn main() {
    cermont_core::tracing::init_tracing("info,cermont_auth=debug,tower_http=info");

    let config = AuthConfig::from_env();

    let db = Database::connect(&config.database_url)
        .await
        .expect("failed to connect to database");

    let redis_cfg = deadpool_redis::Config::from_url(&config.redis_url);
    let redis = redis_cfg
        .create_pool(Some(deadpool_redis::Runtime::Tokio1))
        .expect("failed to create Redis pool");

    let state = AppState {
        db,
        redis,
        signer: TokenSigner::new(&config.jwt_secret, config.access_token_ttl_secs),
        hasher: PasswordHasher::default(),
        spawner: Arc::new(TokioTaskSpawner),
        cookie_domain: config.cookie_domain,
        user_cache_ttl_secs: config.user_cache_ttl_secs,
    };

    let router = build_router(state);
    let addr = format!("0.0.0.0:{}", config.auth_port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("failed to bind");

    info!(%addr, "auth service listening");
    axum::serve(listener, router).await.expect("server error");
}
