//! Static bearer token check for the admin API.

use axum::{
    body::Body,
    extract::State,
    http::{header, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::debug;

use super::super::ServerConfig;

fn bearer_token(request: &Request<Body>) -> Option<&str> {
    request
        .headers()
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
}

/// Lets every request through when no admin token is configured.
pub async fn require_admin_token(
    State(config): State<ServerConfig>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let Some(expected) = config.admin_token.as_deref() else {
        return next.run(request).await;
    };

    if bearer_token(&request) == Some(expected) {
        next.run(request).await
    } else {
        debug!("Rejected admin request to {}", request.uri().path());
        StatusCode::UNAUTHORIZED.into_response()
    }
}
