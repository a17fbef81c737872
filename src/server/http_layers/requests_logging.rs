//! Request logging middleware

use super::super::state::ServerState;
use crate::server::metrics::{categorize_endpoint, record_http_request};
use axum::extract::State;
use axum::{
    body::Body,
    http::{header, header::HeaderMap, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::time::Instant;
use tracing::{error, info};

#[derive(PartialEq, PartialOrd, Clone, Debug, Default, clap::ValueEnum)]
pub enum RequestsLoggingLevel {
    None,
    #[default]
    Path,
    Headers,
    Body,
}

impl std::fmt::Display for RequestsLoggingLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Bodies at or above this size are summarized instead of printed.
const MAX_LOGGED_BODY: usize = 1024;

fn content_length(headers: &HeaderMap) -> Result<usize, &'static str> {
    headers
        .get(header::CONTENT_LENGTH)
        .ok_or("no content-length")?
        .to_str()
        .map_err(|_| "unreadable content-length")?
        .parse()
        .map_err(|_| "non-numeric content-length")
}

fn log_headers(direction: &str, headers: &HeaderMap) {
    info!("  {} headers:", direction);
    for (name, value) in headers {
        if name == header::AUTHORIZATION {
            info!("    {}: <redacted>", name);
        } else {
            info!("    {}: {:?}", name, value);
        }
    }
}

/// Logs a small body and hands back an equivalent one. Streams without a
/// content-length (progress responses, chunked uploads) pass through untouched.
async fn log_body(direction: &str, headers: &HeaderMap, body: Body) -> Result<Body, Response> {
    let size = match content_length(headers) {
        Ok(size) => size,
        Err(reason) => {
            info!("  {} body: {}", direction, reason);
            return Ok(body);
        }
    };
    if size >= MAX_LOGGED_BODY {
        info!("  {} body: {:#}", direction, byte_unit::Byte::from(size));
        return Ok(body);
    }

    let bytes = axum::body::to_bytes(body, size).await.map_err(|err| {
        error!("Failed to buffer {} body: {}", direction, err);
        (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error").into_response()
    })?;
    info!("  {} body:\n{}", direction, String::from_utf8_lossy(&bytes));
    Ok(Body::from(bytes))
}

pub async fn log_requests(
    State(state): State<ServerState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let level = state.config.requests_logging_level.clone();
    let start = Instant::now();
    let method = request.method().clone();
    let path = request.uri().path().to_string();

    if level > RequestsLoggingLevel::None {
        info!("--> {} {}", method, request.uri());
    }
    if level >= RequestsLoggingLevel::Headers {
        log_headers("request", request.headers());
    }
    let request = if level >= RequestsLoggingLevel::Body {
        let (parts, body) = request.into_parts();
        match log_body("request", &parts.headers, body).await {
            Ok(body) => Request::from_parts(parts, body),
            Err(response) => return response,
        }
    } else {
        request
    };

    let mut response = next.run(request).await;

    if level >= RequestsLoggingLevel::Headers {
        log_headers("response", response.headers());
    }
    if level >= RequestsLoggingLevel::Body {
        let (parts, body) = response.into_parts();
        response = match log_body("response", &parts.headers, body).await {
            Ok(body) => Response::from_parts(parts, body),
            Err(response) => return response,
        };
    }

    let elapsed = start.elapsed();
    let status = response.status().as_u16();
    if level > RequestsLoggingLevel::None {
        info!("<-- {} {} {} in {}ms", status, method, path, elapsed.as_millis());
    }
    record_http_request(method.as_str(), categorize_endpoint(&path), status, elapsed);

    response
}
