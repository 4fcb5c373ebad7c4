//! Bearer-token authentication middleware for Axum
//!
//! Verifies the identity provider's JWT, ensures the caller's account exists
//! and stores an `AuthenticatedUser` in the request extensions. WebSocket
//! clients that cannot set headers may pass `?access_token=`.

use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{header, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::{debug, warn};

use crate::application::services::{AccountService, Caller};
use crate::infrastructure::crypto::jwt::{verify_token, JwtConfig};

use super::error::ApiError;

/// Authentication state
#[derive(Clone)]
pub struct AuthState {
    pub jwt_config: JwtConfig,
    pub accounts: Arc<AccountService>,
}

/// Authenticated caller, available to handlers via `Extension`
#[derive(Clone, Debug)]
pub struct AuthenticatedUser {
    pub user_id: String,
    pub username: String,
    pub role: Option<String>,
    pub is_admin: bool,
}

impl AuthenticatedUser {
    pub fn caller(&self) -> Caller {
        Caller {
            user_id: self.user_id.clone(),
            is_admin: self.is_admin,
        }
    }
}

fn bearer(header_value: &str) -> Option<&str> {
    header_value
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

fn query_token(query: Option<&str>) -> Option<String> {
    query?.split('&').find_map(|pair| {
        let (key, value) = pair.split_once('=')?;
        (key == "access_token" && !value.is_empty()).then(|| value.to_string())
    })
}

fn unauthorized(message: &str) -> Response {
    ApiError::new(StatusCode::UNAUTHORIZED, "unauthenticated", message).into_response()
}

pub async fn auth_middleware(
    State(auth_state): State<AuthState>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let from_header = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(bearer)
        .map(str::to_string);
    let Some(token) = from_header.or_else(|| query_token(request.uri().query())) else {
        return unauthorized("Missing bearer token");
    };

    let claims = match verify_token(&token, &auth_state.jwt_config) {
        Ok(claims) => claims,
        Err(e) => {
            debug!(error = %e, "Rejected bearer token");
            return unauthorized("Invalid or expired token");
        }
    };

    let account = match auth_state.accounts.ensure(&claims.identity()).await {
        Ok(account) => account,
        Err(e) => {
            warn!(user_id = %claims.sub, error = %e, "Could not ensure account");
            return ApiError::from(e).into_response();
        }
    };

    let user = AuthenticatedUser {
        is_admin: claims.is_admin(&auth_state.jwt_config),
        user_id: account.id,
        username: account.display_name,
        role: claims.role,
    };
    request.extensions_mut().insert(user);
    next.run(request).await
}

/// Reject non-admin callers. Must run after `auth_middleware`.
pub async fn require_admin(request: Request<Body>, next: Next) -> Response {
    let is_admin = request
        .extensions()
        .get::<AuthenticatedUser>()
        .is_some_and(|u| u.is_admin);
    if !is_admin {
        return ApiError::forbidden("Administrator role required").into_response();
    }
    next.run(request).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bearer_prefix_is_required() {
        assert_eq!(bearer("Bearer abc"), Some("abc"));
        assert_eq!(bearer("Basic abc"), None);
        assert_eq!(bearer("Bearer  "), None);
    }

    #[test]
    fn access_token_query_is_found() {
        assert_eq!(query_token(Some("facility=1&access_token=xyz")), Some("xyz".into()));
        assert_eq!(query_token(Some("access_token=")), None);
        assert_eq!(query_token(None), None);
    }
}
