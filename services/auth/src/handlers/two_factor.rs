use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use serde::Deserialize;

use crate::error::AuthServiceError;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct SendCodeRequest {
    pub email: String,
}

pub async fn send_code(
    State(state): State<AppState>,
    Json(body): Json<SendCodeRequest>,
) -> Result<impl IntoResponse, AuthServiceError> {
    let sent = state.one_time_codes().send(&body.email).await?;
    Ok((StatusCode::CREATED, Json(sent)))
}

#[derive(Deserialize)]
pub struct VerifyCodeRequest {
    pub email: String,
    pub code: String,
}

/// Always 200; `valid` carries the outcome.
pub async fn verify_code(
    State(state): State<AppState>,
    Json(body): Json<VerifyCodeRequest>,
) -> Result<impl IntoResponse, AuthServiceError> {
    let verification = state
        .one_time_codes()
        .verify(&body.email, &body.code)
        .await?;
    Ok(Json(verification))
}
