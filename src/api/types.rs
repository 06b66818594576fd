//! Shared API types.

use crate::auth::session::Session;
use crate::models::enums::Role;

/// Name of the session cookie issued at login.
pub const SESSION_COOKIE: &str = "rxportal_session";

/// Authenticated identity injected into request extensions by the session
/// middleware. Handlers receive it via `Extension<CurrentUser>`.
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub user_id: i64,
    pub name: String,
    pub email: String,
    pub role: Role,
}

impl From<Session> for CurrentUser {
    fn from(session: Session) -> Self {
        Self {
            user_id: session.user_id,
            name: session.name,
            email: session.email,
            role: session.role,
        }
    }
}
