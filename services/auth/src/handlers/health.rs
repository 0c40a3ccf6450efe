use axum::{Json, extract::State, http::StatusCode};
use serde_json::Value;

use cermont_core::health::readiness;

use crate::state::AppState;

/// `GET /readyz`: database ping and a Redis connection checkout.
pub async fn readyz(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    let database = state.db.ping().await.is_ok();
    let redis = state.redis.get().await.is_ok();
    readiness(&[("database", database), ("redis", redis)])
}
