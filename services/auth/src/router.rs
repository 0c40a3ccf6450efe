use axum::{
    Router,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;

use cermont_core::health::healthz;
use cermont_core::middleware::{propagate_request_id_layer, request_id_layer};

use crate::handlers::{
    auth::{change_password, login, logout, me, refresh, register},
    health::readyz,
    two_factor::{send_code, verify_code},
};
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        // Health
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        // Session lifecycle
        .route("/auth/login", post(login))
        .route("/auth/refresh", post(refresh))
        .route("/auth/logout", post(logout))
        // Account
        .route("/auth/register", post(register))
        .route("/auth/me", get(me))
        .route("/auth/password", post(change_password))
        // Second factor
        .route("/auth/2fa/send", post(send_code))
        .route("/auth/2fa/verify", post(verify_code))
        .layer(propagate_request_id_layer())
        .layer(TraceLayer::new_for_http())
        .layer(request_id_layer())
        .with_state(state)
}
