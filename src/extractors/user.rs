//! Caller identity from trusted upstream headers (`X-User-ID`, `X-User-Roles`).

use axum::{
    extract::Request,
    http::HeaderMap,
    middleware::Next,
    response::Response,
};

pub const USER_ID_HEADER: &str = "X-User-ID";
/// Comma-separated role names.
pub const USER_ROLES_HEADER: &str = "X-User-Roles";
pub const SUPER_ADMIN_ROLE: &str = "super_admin";

/// Authenticated caller, stored in request extensions.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CurrentUser {
    pub id: String,
    pub roles: Vec<String>,
}

impl CurrentUser {
    pub fn is_super_admin(&self) -> bool {
        self.roles.iter().any(|r| r == SUPER_ADMIN_ROLE)
    }

    pub fn from_headers(headers: &HeaderMap) -> Option<Self> {
        let id = headers
            .get(USER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())?;
        let roles = headers
            .get(USER_ROLES_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(|s| {
                s.split(',')
                    .map(|r| r.trim().to_string())
                    .filter(|r| !r.is_empty())
                    .collect()
            })
            .unwrap_or_default();
        Some(CurrentUser { id, roles })
    }
}

/// Middleware: put a [`CurrentUser`] into extensions when the identity headers are present.
pub async fn user_from_headers(mut request: Request, next: Next) -> Response {
    if let Some(user) = CurrentUser::from_headers(request.headers()) {
        tracing::debug!(user = %user.id, "caller identified");
        request.extensions_mut().insert(user);
    }
    next.run(request).await
}
