//! Credential, one-time-code and session endpoints. OAuth sign-in lives in
//! `core::oauth` and ends in the same session machinery.

pub mod otp;
pub mod password;
pub mod session;

use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::{Duration, Utc};
use serde::Deserialize;
use std::sync::Arc;
use tower_cookies::Cookies;

use crate::core::email::otp_email;
use crate::core::shared::error::{ApiError, ApiResult};
use crate::core::shared::models::{normalize_email, User, VerificationToken};
use crate::core::shared::state::AppState;
use crate::core::shared::utils::is_valid_email;

pub use session::{CurrentUser, MaybeUser};
use session::{removal_cookie, set_session_cookie, start_session, SessionResponse};

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct OtpRequest {
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct OtpVerifyRequest {
    pub email: String,
    pub code: String,
}

fn checked_email(raw: &str) -> ApiResult<String> {
    let email = normalize_email(raw);
    if !is_valid_email(&email) {
        return Err(ApiError::validation("Invalid email address"));
    }
    Ok(email)
}

fn invalid_credentials() -> ApiError {
    ApiError::Unauthorized("Invalid email or password".into())
}

pub async fn register(
    State(state): State<Arc<AppState>>,
    cookies: Cookies,
    Json(req): Json<RegisterRequest>,
) -> ApiResult<impl IntoResponse> {
    let email = checked_email(&req.email)?;
    if let Some(issue) = password::validate_password(&req.password).first() {
        return Err(ApiError::Validation(issue.message()));
    }
    if state.store.find_user_by_email(&email).await?.is_some() {
        return Err(ApiError::Conflict("Email already registered".into()));
    }

    let name = req
        .name
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty());
    let mut user = User::new(&email, name);
    user.password_hash = Some(
        password::hash_password(req.password)
            .await
            .map_err(|e| ApiError::Internal(e.to_string()))?,
    );
    let user = state.store.create_user(user).await?;
    log::info!("Registered user {}", user.id);

    let session = start_session(&state, &user).await?;
    set_session_cookie(&state, &cookies, &session);
    Ok((StatusCode::CREATED, Json(SessionResponse::new(user, session))))
}

pub async fn login(
    State(state): State<Arc<AppState>>,
    cookies: Cookies,
    Json(req): Json<LoginRequest>,
) -> ApiResult<Json<SessionResponse>> {
    let email = normalize_email(&req.email);
    let user = state
        .store
        .find_user_by_email(&email)
        .await?
        .ok_or_else(invalid_credentials)?;
    let hash = user.password_hash.clone().ok_or_else(invalid_credentials)?;

    let valid = password::verify_password(req.password, hash)
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    if !valid {
        log::warn!("Failed login for user {}", user.id);
        return Err(invalid_credentials());
    }

    let session = start_session(&state, &user).await?;
    set_session_cookie(&state, &cookies, &session);
    Ok(Json(SessionResponse::new(user, session)))
}

pub async fn request_otp(
    State(state): State<Arc<AppState>>,
    Json(req): Json<OtpRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    let email = checked_email(&req.email)?;
    let minutes = state.config.auth.otp_minutes;
    let code = otp::generate_code();
    let expires_at = Utc::now() + Duration::minutes(minutes);

    state
        .store
        .replace_verification_token(VerificationToken {
            identifier: email.clone(),
            token_hash: otp::hash_code(&email, &code),
            expires_at,
        })
        .await?;

    if let Err(e) = state.mailer.send(otp_email(&email, &code, minutes)).await {
        log::error!("Failed to send sign-in code: {}", e);
        return Err(ApiError::Internal("Failed to send sign-in code".into()));
    }

    Ok(Json(serde_json::json!({ "sent": true, "expiresAt": expires_at })))
}

pub async fn verify_otp(
    State(state): State<Arc<AppState>>,
    cookies: Cookies,
    Json(req): Json<OtpVerifyRequest>,
) -> ApiResult<Json<SessionResponse>> {
    let invalid = || ApiError::Unauthorized("Invalid or expired code".into());
    let email = checked_email(&req.email)?;
    if !otp::is_well_formed(&req.code) {
        return Err(invalid());
    }

    let token = state
        .store
        .take_verification_token(&email, &otp::hash_code(&email, &req.code))
        .await?
        .ok_or_else(invalid)?;
    if token.expires_at <= Utc::now() {
        return Err(invalid());
    }

    let now = Utc::now();
    let user = match state.store.find_user_by_email(&email).await? {
        Some(mut user) => {
            if user.email_verified.is_none() {
                user.email_verified = Some(now);
                user.updated_at = now;
                state.store.update_user(&user).await?;
            }
            user
        }
        None => {
            let mut user = User::new(&email, None);
            user.email_verified = Some(now);
            let user = state.store.create_user(user).await?;
            log::info!("Created user {} from sign-in code", user.id);
            user
        }
    };

    let session = start_session(&state, &user).await?;
    set_session_cookie(&state, &cookies, &session);
    Ok(Json(SessionResponse::new(user, session)))
}

pub async fn current_session(MaybeUser(current): MaybeUser) -> Json<serde_json::Value> {
    match current {
        Some(CurrentUser { user, session }) => Json(serde_json::json!({
            "user": user,
            "expiresAt": session.expires_at,
        })),
        None => Json(serde_json::json!({ "user": null })),
    }
}

pub async fn logout(
    State(state): State<Arc<AppState>>,
    cookies: Cookies,
    MaybeUser(current): MaybeUser,
) -> ApiResult<StatusCode> {
    if let Some(current) = current {
        state.store.delete_session(&current.session.token).await?;
    }
    cookies.remove(removal_cookie());
    Ok(StatusCode::NO_CONTENT)
}

pub fn configure() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/auth/register", post(register))
        .route("/api/auth/login", post(login))
        .route("/api/auth/otp/request", post(request_otp))
        .route("/api/auth/otp/verify", post(verify_otp))
        .route("/api/auth/session", get(current_session))
        .route("/api/auth/logout", post(logout))
}
