//! Request authentication and general API rate limiting.

use axum::{
    body::Body,
    extract::State,
    http::{Request, header},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;

use super::extract::client_ip;
use super::state::AppState;
use crate::auth::{AuthError, AuthErrorCode};
use crate::rate_limit::RateConcern;
use crate::token::Identity;

/// Bearer token from the `Authorization` header, if well-formed.
pub fn bearer_token(request: &Request<Body>) -> Option<&str> {
    let value = request.headers().get(header::AUTHORIZATION)?.to_str().ok()?;
    let token = value.strip_prefix("Bearer ")?.trim();
    (!token.is_empty()).then_some(token)
}

/// Populate an [`Identity`] from the bearer token.
///
/// Never rejects: allow-listed paths are passed through untouched, a missing
/// or invalid token leaves the request anonymous and downstream extractors
/// decide whether that is acceptable.
pub async fn authenticate_request(
    State(state): State<Arc<AppState>>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    if state
        .allow_list
        .is_public(request.method(), request.uri().path())
    {
        return next.run(request).await;
    }

    let identity = match bearer_token(&request) {
        Some(token) => match state.auth.authenticate(token) {
            Ok(identity) => Some(identity),
            Err(e) => {
                tracing::debug!(
                    path = %request.uri().path(),
                    error = %e.code.name(),
                    "Bearer token rejected, continuing anonymously"
                );
                None
            }
        },
        None => None,
    };

    if let Some(identity) = identity {
        request.extensions_mut().insert(identity);
    }
    next.run(request).await
}

/// General API quota keyed by `api:<userId>` for identified callers and
/// `api:<ip>` otherwise.
pub async fn api_rate_limit(
    State(state): State<Arc<AppState>>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, AuthError> {
    let id = match request.extensions().get::<Identity>() {
        Some(identity) => format!("{}-{}", identity.user_type, identity.user_id),
        None => client_ip(
            request.headers(),
            request.extensions(),
            &state.trusted_proxies,
        )
            .unwrap_or_else(|| "unknown".to_string()),
    };

    if !state.auth.limiter().check(RateConcern::Api, &id).await {
        return Err(AuthError::from_code(AuthErrorCode::RateLimited));
    }
    Ok(next.run(request).await)
}
