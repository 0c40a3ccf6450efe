use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use axum_extra::extract::CookieJar;
use serde::Deserialize;
use serde_json::json;

use cermont_auth_types::cookie::{
    CERMONT_REFRESH_TOKEN, clear_cookies, set_access_token_cookie, set_refresh_token_cookie,
};
use cermont_domain::user::UserRole;

use crate::domain::types::ClientInfo;
use crate::error::AuthServiceError;
use crate::handlers::extractor::Authenticated;
use crate::state::AppState;
use crate::usecase::account::{ChangePasswordInput, RegisterInput};
use crate::usecase::login::{LoginInput, LoginOutcome};
use crate::usecase::logout::{LogoutInput, PresentedAccessToken};
use crate::usecase::refresh::RefreshInput;
use crate::usecase::session::SessionTokens;

fn with_session_cookies(jar: CookieJar, state: &AppState, tokens: &SessionTokens) -> CookieJar {
    let jar = set_access_token_cookie(
        jar,
        tokens.access_token.clone(),
        state.cookie_domain.clone(),
        state.signer.ttl_secs(),
    );
    set_refresh_token_cookie(jar, tokens.refresh_token.clone(), state.cookie_domain.clone())
}

// ── POST /auth/login ──────────────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
    #[serde(default, alias = "rememberMe")]
    pub remember_me: bool,
    #[serde(default, alias = "twoFactorCode")]
    pub two_factor_code: Option<String>,
}

pub async fn login(
    State(state): State<AppState>,
    client: ClientInfo,
    jar: CookieJar,
    Json(body): Json<LoginRequest>,
) -> Result<impl IntoResponse, AuthServiceError> {
    let outcome = state
        .login()
        .execute(LoginInput {
            email: body.email,
            password: body.password,
            remember_me: body.remember_me,
            two_factor_code: body.two_factor_code,
            client,
        })
        .await?;

    match outcome {
        LoginOutcome::Authenticated(session) => {
            let jar = with_session_cookies(jar, &state, &session.tokens);
            Ok((StatusCode::OK, jar, Json(json!(session))))
        }
        LoginOutcome::TwoFactorRequired { expires_in } => Ok((
            StatusCode::OK,
            jar,
            Json(json!({ "requires_2fa": true, "expires_in": expires_in })),
        )),
    }
}

// ── POST /auth/register ───────────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub name: String,
    #[serde(default)]
    pub role: Option<UserRole>,
}

/// A requested role is honoured only when an admin makes the call.
pub async fn register(
    State(state): State<AppState>,
    caller: Option<Authenticated>,
    client: ClientInfo,
    jar: CookieJar,
    Json(body): Json<RegisterRequest>,
) -> Result<impl IntoResponse, AuthServiceError> {
    let is_admin = caller.is_some_and(|c| c.principal.role == UserRole::Admin);
    let role = body.role.filter(|_| is_admin);

    let session = state
        .register()
        .execute(RegisterInput {
            email: body.email,
            password: body.password,
            name: body.name,
            role,
            client,
        })
        .await?;

    // An admin creating an account keeps their own cookies.
    let jar = if is_admin {
        jar
    } else {
        with_session_cookies(jar, &state, &session.tokens)
    };
    Ok((StatusCode::CREATED, jar, Json(session)))
}

// ── POST /auth/refresh ────────────────────────────────────────────────────────

#[derive(Deserialize, Default)]
pub struct RefreshRequest {
    #[serde(default, alias = "refreshToken")]
    pub refresh_token: Option<String>,
}

/// Token comes from the body when present, otherwise from the refresh cookie.
pub async fn refresh(
    State(state): State<AppState>,
    client: ClientInfo,
    jar: CookieJar,
    body: Option<Json<RefreshRequest>>,
) -> Result<Response, AuthServiceError> {
    let body = body.map(|Json(b)| b).unwrap_or_default();
    let refresh_token = body
        .refresh_token
        .or_else(|| jar.get(CERMONT_REFRESH_TOKEN).map(|c| c.value().to_owned()))
        .ok_or(AuthServiceError::Unauthorized)?;

    let result = state
        .refresh()
        .execute(RefreshInput {
            refresh_token,
            client,
        })
        .await;

    match result {
        Ok(tokens) => {
            let jar = with_session_cookies(jar, &state, &tokens);
            Ok((StatusCode::OK, jar, Json(tokens)).into_response())
        }
        Err(e @ AuthServiceError::Unauthorized) => {
            // Dead refresh cookies only cause retry loops.
            let jar = clear_cookies(jar, state.cookie_domain.clone());
            Ok((jar, e).into_response())
        }
        Err(e) => Err(e),
    }
}

// ── POST /auth/logout ─────────────────────────────────────────────────────────

#[derive(Deserialize, Default)]
pub struct LogoutRequest {
    #[serde(default, alias = "refreshToken")]
    pub refresh_token: Option<String>,
}

pub async fn logout(
    State(state): State<AppState>,
    caller: Authenticated,
    client: ClientInfo,
    jar: CookieJar,
    body: Option<Json<LogoutRequest>>,
) -> Result<impl IntoResponse, AuthServiceError> {
    let body = body.map(|Json(b)| b).unwrap_or_default();
    let refresh_token = body
        .refresh_token
        .or_else(|| jar.get(CERMONT_REFRESH_TOKEN).map(|c| c.value().to_owned()));

    state
        .logout()
        .execute(LogoutInput {
            user_id: caller.principal.user_id,
            refresh_token,
            access_token: Some(PresentedAccessToken {
                jti: caller.token.jti,
                exp: caller.token.exp,
            }),
            client,
        })
        .await?;

    let jar = clear_cookies(jar, state.cookie_domain.clone());
    Ok((StatusCode::NO_CONTENT, jar))
}

// ── GET /auth/me ──────────────────────────────────────────────────────────────

pub async fn me(
    State(state): State<AppState>,
    caller: Authenticated,
) -> Result<impl IntoResponse, AuthServiceError> {
    let profile = state
        .current_user()
        .execute(caller.principal.user_id)
        .await?;
    Ok(Json(profile))
}

// ── POST /auth/password ───────────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct ChangePasswordRequest {
    #[serde(alias = "currentPassword")]
    pub current_password: String,
    #[serde(alias = "newPassword")]
    pub new_password: String,
}

/// Every refresh session ends, so the caller's cookies are cleared too.
pub async fn change_password(
    State(state): State<AppState>,
    caller: Authenticated,
    client: ClientInfo,
    jar: CookieJar,
    Json(body): Json<ChangePasswordRequest>,
) -> Result<impl IntoResponse, AuthServiceError> {
    state
        .change_password()
        .execute(ChangePasswordInput {
            user_id: caller.principal.user_id,
            current_password: body.current_password,
            new_password: body.new_password,
            client,
        })
        .await?;

    let jar = clear_cookies(jar, state.cookie_domain.clone());
    Ok((StatusCode::NO_CONTENT, jar))
}
