//! Registration, login/logout, and the password-reset flow.

use std::str::FromStr;
use std::sync::Arc;

use axum::extract::State;
use axum::http::{header, HeaderMap};
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::api::error::ApiError;
use crate::api::middleware::auth::session_cookie;
use crate::api::types::SESSION_COOKIE;
use crate::app_state::AppState;
use crate::auth::session::Session;
use crate::auth::{self, email_is_valid, password_meets_rules};
use crate::db::repository::user;
use crate::mailer::{self, send_fire_and_forget};
use crate::models::enums::{Role, UserStatus};
use crate::models::user::NewUser;

#[derive(Deserialize)]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub password: String,
    pub confirm_password: String,
    pub role: String,
    pub medical_id: Option<String>,
}

#[derive(Serialize)]
pub struct RegisterResponse {
    pub id: i64,
    pub message: &'static str,
}

/// `POST /api/auth/register`
///
/// All validation failures are collected and returned together; nothing is
/// persisted unless every check passes.
pub async fn register(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RegisterRequest>,
) -> Result<Json<RegisterResponse>, ApiError> {
    let mut errors = Vec::new();

    if req.name.trim().is_empty() {
        errors.push("Name is required".to_string());
    }
    if !email_is_valid(&req.email) {
        errors.push("A valid email address is required".to_string());
    }
    if !password_meets_rules(&req.password) {
        errors.push(
            "Password must be at least 8 characters with uppercase, lowercase and a digit"
                .to_string(),
        );
    }
    if req.password != req.confirm_password {
        errors.push("Passwords do not match".to_string());
    }

    let role = match Role::from_str(&req.role) {
        Ok(Role::Admin) | Err(_) => {
            errors.push("Invalid role".to_string());
            None
        }
        Ok(role) => Some(role),
    };
    if matches!(role, Some(Role::Doctor) | Some(Role::Pharmacist))
        && req
            .medical_id
            .as_deref()
            .map(str::trim)
            .unwrap_or("")
            .is_empty()
    {
        errors.push("Medical ID is required for doctors and pharmacists".to_string());
    }

    // Uniqueness pre-check joins the validation list rather than surfacing
    // as a constraint error
    if email_is_valid(&req.email) {
        let conn = state.db()?;
        if user::email_exists(&conn, &req.email)? {
            errors.push("This email address is already registered".to_string());
        }
    }

    if !errors.is_empty() {
        return Err(ApiError::Validation(errors));
    }
    let role = role.ok_or_else(|| ApiError::Internal("role validated but absent".into()))?;

    let password_hash = auth::hash_password(&req.password)?;
    let new = NewUser {
        name: req.name.trim().to_string(),
        email: req.email.trim().to_string(),
        password_hash,
        role,
        medical_id: req.medical_id.filter(|m| !m.trim().is_empty()),
    };

    let id = {
        let mut conn = state.db()?;
        user::create_user(&mut conn, &new)?
    };

    let (subject, body) = mailer::welcome_message(&new.name);
    send_fire_and_forget(state.mailer.as_ref(), &new.email, &subject, &body);

    tracing::info!(user_id = id, role = new.role.as_str(), "user registered");
    Ok(Json(RegisterResponse {
        id,
        message: "Registration successful",
    }))
}

#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Serialize)]
pub struct LoginResponse {
    pub user_id: i64,
    pub name: String,
    pub role: Role,
}

/// `POST /api/auth/login` — verify credentials, open a session, set the
/// session cookie. Inactive accounts are rejected before the password check.
pub async fn login(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let found = {
        let conn = state.db()?;
        user::find_by_email(&conn, &req.email)?
    };
    let found = found.ok_or(ApiError::InvalidCredentials)?;

    if found.status == UserStatus::Inactive {
        return Err(ApiError::AccountInactive);
    }
    if !auth::verify_password(&req.password, &found.password_hash) {
        return Err(ApiError::InvalidCredentials);
    }

    let token = state.sessions()?.insert(Session {
        user_id: found.id,
        name: found.name.clone(),
        email: found.email.clone(),
        role: found.role,
    });

    let cookie = format!(
        "{SESSION_COOKIE}={token}; HttpOnly; Path=/; SameSite=Lax; Max-Age={}",
        state.config.session_ttl_secs
    );

    tracing::info!(user_id = found.id, role = found.role.as_str(), "login");
    Ok((
        [(header::SET_COOKIE, cookie)],
        Json(LoginResponse {
            user_id: found.id,
            name: found.name,
            role: found.role,
        }),
    ))
}

/// `POST /api/auth/logout` — drop the session and clear the cookie. Works
/// with a stale or missing cookie too.
pub async fn logout(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    if let Some(token) = session_cookie(&headers) {
        state.sessions()?.remove(&token);
    }
    let cookie = format!("{SESSION_COOKIE}=; HttpOnly; Path=/; Max-Age=0");
    Ok((
        [(header::SET_COOKIE, cookie)],
        Json(serde_json::json!({ "message": "Logged out" })),
    ))
}

#[derive(Deserialize)]
pub struct ForgotPasswordRequest {
    pub email: String,
}

/// `POST /api/auth/forgot-password`
///
/// Stores a 1-hour reset token and emails it when the address is known.
/// The response is identical either way, so the endpoint does not reveal
/// which addresses have accounts.
pub async fn forgot_password(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ForgotPasswordRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let found = {
        let conn = state.db()?;
        user::find_by_email(&conn, &req.email)?
    };

    if let Some(found) = found {
        let token = auth::generate_reset_token();
        let expiry = (chrono::Utc::now() + chrono::Duration::hours(1))
            .format("%Y-%m-%d %H:%M:%S")
            .to_string();
        {
            let conn = state.db()?;
            user::set_reset_token(&conn, found.id, &token, &expiry)?;
        }

        let (subject, body) = mailer::password_reset_message(&found.name, &token);
        send_fire_and_forget(state.mailer.as_ref(), &found.email, &subject, &body);
        tracing::info!(user_id = found.id, "password reset requested");
    }

    Ok(Json(serde_json::json!({
        "message": "If that email address is registered, a reset link has been sent"
    })))
}

#[derive(Deserialize)]
pub struct ResetPasswordRequest {
    pub token: String,
    pub password: String,
    pub confirm_password: String,
}

/// `POST /api/auth/reset-password` — consume an unexpired token, set the
/// new password, clear the token, confirm by email.
pub async fn reset_password(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ResetPasswordRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let mut errors = Vec::new();
    if !password_meets_rules(&req.password) {
        errors.push(
            "Password must be at least 8 characters with uppercase, lowercase and a digit"
                .to_string(),
        );
    }
    if req.password != req.confirm_password {
        errors.push("Passwords do not match".to_string());
    }
    if !errors.is_empty() {
        return Err(ApiError::Validation(errors));
    }

    let found = {
        let conn = state.db()?;
        user::find_by_reset_token(&conn, &req.token)?
    };
    let found =
        found.ok_or_else(|| ApiError::BadRequest("Invalid or expired reset token".into()))?;

    let password_hash = auth::hash_password(&req.password)?;
    {
        let mut conn = state.db()?;
        user::complete_password_reset(&mut conn, found.id, &password_hash)?;
    }

    let (subject, body) = mailer::password_reset_confirmation(&found.name);
    send_fire_and_forget(state.mailer.as_ref(), &found.email, &subject, &body);

    tracing::info!(user_id = found.id, "password reset completed");
    Ok(Json(serde_json::json!({ "message": "Password has been reset" })))
}
