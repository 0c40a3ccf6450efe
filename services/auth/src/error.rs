use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use chrono::{DateTime, Utc};

/// Auth service error variants.
///
/// Every variant except `Internal` is a classified outcome and reaches the
/// caller unchanged. `InvalidCredentials` and `InvalidOneTimeCode` share one
/// message so responses never reveal which factor failed or whether the
/// email exists.
#[derive(Debug, thiserror::Error)]
pub enum AuthServiceError {
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("account locked")]
    AccountLocked { until: DateTime<Utc> },
    #[error("account disabled")]
    AccountDisabled,
    #[error("invalid credentials")]
    InvalidOneTimeCode,
    #[error("unauthorized")]
    Unauthorized,
    #[error("email already registered")]
    Conflict,
    #[error("user not found")]
    UserNotFound,
    #[error("two-factor authentication is not enabled")]
    TwoFactorNotEnabled,
    #[error("{0}")]
    InvalidRequest(&'static str),
    #[error("internal error")]
    Internal(#[from] anyhow::Error),
}

impl AuthServiceError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidCredentials => "INVALID_CREDENTIALS",
            Self::AccountLocked { .. } => "ACCOUNT_LOCKED",
            Self::AccountDisabled => "ACCOUNT_DISABLED",
            Self::InvalidOneTimeCode => "INVALID_ONE_TIME_CODE",
            Self::Unauthorized => "UNAUTHORIZED",
            Self::Conflict => "CONFLICT",
            Self::UserNotFound => "USER_NOT_FOUND",
            Self::TwoFactorNotEnabled => "TWO_FACTOR_NOT_ENABLED",
            Self::InvalidRequest(_) => "INVALID_REQUEST",
            Self::Internal(_) => "INTERNAL",
        }
    }

    /// Full cause chain for logs. Never put this in a response body.
    pub fn detail(&self) -> String {
        match self {
            Self::Internal(e) => format!("{e:#}"),
            other => other.to_string(),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::InvalidCredentials | Self::InvalidOneTimeCode | Self::Unauthorized => {
                StatusCode::UNAUTHORIZED
            }
            Self::AccountLocked { .. } | Self::AccountDisabled => StatusCode::FORBIDDEN,
            Self::Conflict => StatusCode::CONFLICT,
            Self::UserNotFound => StatusCode::NOT_FOUND,
            Self::TwoFactorNotEnabled | Self::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AuthServiceError {
    fn into_response(self) -> Response {
        // 4xx are recorded by TraceLayer. Only 500s carry a chain worth logging.
        if let Self::Internal(_) = self {
            tracing::error!(error = %self.detail(), kind = "INTERNAL", "internal error");
        }
        let mut body = serde_json::json!({
            "kind": self.kind(),
            "message": self.to_string(),
        });
        if let Self::AccountLocked { until } = &self {
            body["locked_until"] = serde_json::Value::String(
                until.to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
            );
        }
        (self.status(), axum::Json(body)).into_response()
    }
}
