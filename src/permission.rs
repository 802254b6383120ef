//! Permission predicates folded into one route middleware.
//!
//! ```ignore
//! let gate = set_permissions([Box::new(AuthenticationRequired) as Box<dyn Permission>]);
//! let route = post(handler).route_layer(axum::middleware::from_fn_with_state(gate, enforce));
//! ```

use crate::error::AppError;
use crate::extractors::user::CurrentUser;
use axum::{
    extract::{Request, State},
    http::{request::Parts, StatusCode},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;

pub trait Permission: Send + Sync {
    fn has_required_permissions(&self, parts: &Parts) -> bool;

    fn status_code(&self) -> StatusCode {
        StatusCode::FORBIDDEN
    }

    fn error_msg(&self) -> &str {
        "Forbidden"
    }
}

fn current_user(parts: &Parts) -> Option<&CurrentUser> {
    parts.extensions.get::<CurrentUser>()
}

/// Any identified caller.
#[derive(Clone, Copy, Debug, Default)]
pub struct AuthenticationRequired;

impl Permission for AuthenticationRequired {
    fn has_required_permissions(&self, parts: &Parts) -> bool {
        current_user(parts).is_some()
    }

    fn status_code(&self) -> StatusCode {
        StatusCode::UNAUTHORIZED
    }

    fn error_msg(&self) -> &str {
        "Auth error"
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SuperAdminRequired;

impl Permission for SuperAdminRequired {
    fn has_required_permissions(&self, parts: &Parts) -> bool {
        current_user(parts).map(CurrentUser::is_super_admin).unwrap_or(false)
    }

    fn error_msg(&self) -> &str {
        "Not super admin"
    }
}

/// Lets anonymous callers through; identified callers must be super admins.
#[derive(Clone, Copy, Debug, Default)]
pub struct SuperAdminIfAuthenticated;

impl Permission for SuperAdminIfAuthenticated {
    fn has_required_permissions(&self, parts: &Parts) -> bool {
        current_user(parts).map(CurrentUser::is_super_admin).unwrap_or(true)
    }
}

/// Ordered list of predicates; the first unmet one decides the error.
#[derive(Clone, Default)]
pub struct PermissionGate {
    permissions: Arc<Vec<Arc<dyn Permission>>>,
}

impl PermissionGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a predicate, checked after the ones already present.
    pub fn require(self, permission: impl Permission + 'static) -> Self {
        let mut permissions: Vec<Arc<dyn Permission>> = self.permissions.iter().cloned().collect();
        permissions.push(Arc::new(permission));
        PermissionGate {
            permissions: Arc::new(permissions),
        }
    }

    pub fn len(&self) -> usize {
        self.permissions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.permissions.is_empty()
    }

    pub fn check(&self, parts: &Parts) -> Result<(), AppError> {
        match self.permissions.iter().find(|p| !p.has_required_permissions(parts)) {
            Some(denied) => {
                tracing::debug!(status = %denied.status_code(), reason = denied.error_msg(), "permission denied");
                Err(AppError::PermissionDenied {
                    status: denied.status_code(),
                    message: denied.error_msg().to_string(),
                })
            }
            None => Ok(()),
        }
    }
}

pub fn set_permissions<I>(permissions: I) -> PermissionGate
where
    I: IntoIterator<Item = Box<dyn Permission>>,
{
    PermissionGate {
        permissions: Arc::new(permissions.into_iter().map(Arc::<dyn Permission>::from).collect()),
    }
}

/// Route middleware running `gate` before the handler.
pub async fn enforce(State(gate): State<PermissionGate>, request: Request, next: Next) -> Result<Response, AppError> {
    let (parts, body) = request.into_parts();
    gate.check(&parts)?;
    Ok(next.run(Request::from_parts(parts, body)).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request as HttpRequest;

    fn parts(user: Option<CurrentUser>) -> Parts {
        let (mut parts, _) = HttpRequest::builder().uri("/todo").body(()).unwrap().into_parts();
        if let Some(u) = user {
            parts.extensions.insert(u);
        }
        parts
    }

    fn user(roles: &[&str]) -> CurrentUser {
        CurrentUser {
            id: "u-1".into(),
            roles: roles.iter().map(|r| r.to_string()).collect(),
        }
    }

    struct Never;

    impl Permission for Never {
        fn has_required_permissions(&self, _parts: &Parts) -> bool {
            false
        }
    }

    #[test]
    fn first_unmet_predicate_decides() {
        let gate = set_permissions([
            Box::new(AuthenticationRequired) as Box<dyn Permission>,
            Box::new(SuperAdminRequired),
        ]);
        match gate.check(&parts(None)) {
            Err(AppError::PermissionDenied { status, message }) => {
                assert_eq!(status, StatusCode::UNAUTHORIZED);
                assert_eq!(message, "Auth error");
            }
            other => panic!("unexpected {:?}", other),
        }
        match gate.check(&parts(Some(user(&["editor"])))) {
            Err(AppError::PermissionDenied { status, message }) => {
                assert_eq!(status, StatusCode::FORBIDDEN);
                assert_eq!(message, "Not super admin");
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(gate.check(&parts(Some(user(&["super_admin"])))).is_ok());
    }

    #[test]
    fn defaults_and_anonymous_pass_through() {
        let gate = PermissionGate::new().require(SuperAdminIfAuthenticated);
        assert!(gate.check(&parts(None)).is_ok());
        assert!(gate.check(&parts(Some(user(&[])))).is_err());

        let gate = gate.require(Never);
        assert_eq!(gate.len(), 2);
        match gate.check(&parts(None)) {
            Err(AppError::PermissionDenied { status, message }) => {
                assert_eq!(status, StatusCode::FORBIDDEN);
                assert_eq!(message, "Forbidden");
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(PermissionGate::new().check(&parts(None)).is_ok());
    }
}
