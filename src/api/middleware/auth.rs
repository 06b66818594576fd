//! Session-cookie authentication middleware and role gates.
//!
//! `require_session` resolves the session cookie against the server-side
//! store (via `Extension<Arc<AppState>>`, injected as the outermost layer)
//! and puts a `CurrentUser` into request extensions. The role gates run
//! after it and only check the injected identity.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, HeaderMap, Request};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::api::error::ApiError;
use crate::api::types::{CurrentUser, SESSION_COOKIE};
use crate::app_state::AppState;
use crate::models::enums::Role;

/// Extract the session cookie value from a request's Cookie header.
pub fn session_cookie(headers: &HeaderMap) -> Option<String> {
    let raw = headers.get(header::COOKIE)?.to_str().ok()?;
    raw.split(';').map(str::trim).find_map(|pair| {
        let (name, value) = pair.split_once('=')?;
        (name == SESSION_COOKIE).then(|| value.to_string())
    })
}

/// Require a valid session cookie; injects `CurrentUser` on success.
pub async fn require_session(req: Request<Body>, next: Next) -> Response {
    match require_session_inner(req, next).await {
        Ok(resp) => resp,
        Err(err) => err.into_response(),
    }
}

async fn require_session_inner(
    mut req: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let state: Arc<AppState> = req
        .extensions()
        .get::<Arc<AppState>>()
        .cloned()
        .ok_or_else(|| ApiError::Internal("missing app state".into()))?;

    let token = session_cookie(req.headers()).ok_or(ApiError::Unauthorized)?;

    // Guard dropped before the request is forwarded
    let session = {
        let mut sessions = state.sessions()?;
        sessions.get(&token)
    }
    .ok_or(ApiError::Unauthorized)?;

    req.extensions_mut().insert(CurrentUser::from(session));
    Ok(next.run(req).await)
}

pub async fn require_admin(req: Request<Body>, next: Next) -> Response {
    guard_role(req, next, Role::Admin).await
}

pub async fn require_doctor(req: Request<Body>, next: Next) -> Response {
    guard_role(req, next, Role::Doctor).await
}

pub async fn require_patient(req: Request<Body>, next: Next) -> Response {
    guard_role(req, next, Role::Patient).await
}

async fn guard_role(req: Request<Body>, next: Next, role: Role) -> Response {
    match req.extensions().get::<CurrentUser>() {
        Some(user) if user.role == role => next.run(req).await,
        Some(_) => ApiError::Forbidden.into_response(),
        None => ApiError::Unauthorized.into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn cookie_parsed_among_others() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("theme=dark; rxportal_session=abc123; lang=en"),
        );
        assert_eq!(session_cookie(&headers).as_deref(), Some("abc123"));
    }

    #[test]
    fn missing_cookie_is_none() {
        let headers = HeaderMap::new();
        assert!(session_cookie(&headers).is_none());

        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, HeaderValue::from_static("theme=dark"));
        assert!(session_cookie(&headers).is_none());
    }
}
