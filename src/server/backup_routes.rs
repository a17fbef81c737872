//! Routes under `/api/admin/backup`.
//!
//! Creation and restore answer with an NDJSON progress stream while the work
//! runs on a blocking task. Failures that happen before the stream starts map
//! to a status code, later ones to an `error` progress line.

use axum::{
    body::{Body, Bytes},
    extract::{multipart::Field, DefaultBodyLimit, Multipart, Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use futures::stream;
use serde::Serialize;
use std::collections::BTreeMap;
use std::convert::Infallible;
use tokio::sync::mpsc;
use tokio_util::io::ReaderStream;
use tracing::{debug, error, info, warn};

use super::state::{GuardedBackupService, ServerState};
use super::ServerConfig;
use crate::backup::progress::NDJSON_CONTENT_TYPE;
use crate::backup::{
    ProgressEvent, RestoreOptions, RestoreRequestOptions, SessionGuard, SessionState,
};

const PROGRESS_CHANNEL_CAPACITY: usize = 32;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

fn error_response(status: StatusCode, error: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: error.into(),
        }),
    )
        .into_response()
}

fn bad_request(error: impl Into<String>) -> Response {
    error_response(StatusCode::BAD_REQUEST, error)
}

fn acquire_session(
    backups: &GuardedBackupService,
    operation: SessionState,
) -> Result<SessionGuard, Response> {
    backups.session().try_acquire(operation).map_err(|err| {
        warn!("Rejected {} request: {}", operation, err);
        error_response(StatusCode::CONFLICT, err.to_string())
    })
}

fn progress_response(rx: mpsc::Receiver<ProgressEvent>) -> Response {
    let lines = stream::unfold(rx, |mut rx| async move {
        let event = rx.recv().await?;
        Some((Ok::<_, Infallible>(event.to_line()), rx))
    });
    (
        [(header::CONTENT_TYPE, NDJSON_CONTENT_TYPE)],
        Body::from_stream(lines),
    )
        .into_response()
}

/// Progress callback for blocking work feeding a [`progress_response`].
fn forward(tx: &mpsc::Sender<ProgressEvent>) -> impl FnMut(ProgressEvent) + '_ {
    move |event| {
        if tx.blocking_send(event).is_err() {
            debug!("Progress receiver went away");
        }
    }
}

async fn get_stats(State(backups): State<GuardedBackupService>) -> Response {
    match tokio::task::spawn_blocking(move || backups.stats()).await {
        Ok(Ok(stats)) => Json(stats).into_response(),
        Ok(Err(err)) => {
            error!("Failed to compute backup stats: {}", err);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
        }
        Err(err) => error_response(StatusCode::INTERNAL_SERVER_ERROR, err.to_string()),
    }
}

async fn create_backup(State(backups): State<GuardedBackupService>) -> Response {
    let guard = match acquire_session(&backups, SessionState::BackingUp) {
        Ok(guard) => guard,
        Err(response) => return response,
    };

    info!("Starting backup");
    let (tx, rx) = mpsc::channel(PROGRESS_CHANNEL_CAPACITY);
    tokio::task::spawn_blocking(move || {
        if let Err(err) = backups.create(forward(&tx)) {
            let _ = tx.blocking_send(ProgressEvent::error(err.to_string()));
        }
        // Idle again before the stream ends.
        drop(guard);
    });
    progress_response(rx)
}

async fn get_download(State(backups): State<GuardedBackupService>) -> Response {
    match backups.download_manifest() {
        Some(manifest) => Json(manifest).into_response(),
        None => error_response(StatusCode::NOT_FOUND, "No backup available, create one first"),
    }
}

async fn download_part(
    State(backups): State<GuardedBackupService>,
    Path(index): Path<usize>,
) -> Response {
    let (part, file) = match backups.open_part(index) {
        Ok(Some(opened)) => opened,
        Ok(None) => {
            return error_response(StatusCode::NOT_FOUND, format!("No backup part {}", index))
        }
        Err(err) => {
            error!("Failed to open backup part {}: {}", index, err);
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, err.to_string());
        }
    };
    let file = tokio::fs::File::from_std(file);

    debug!("Serving backup part {} ({} bytes)", part.filename, part.size);
    (
        [
            (header::CONTENT_TYPE, "application/zip".to_string()),
            (header::CONTENT_LENGTH, part.size.to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", part.filename),
            ),
        ],
        Body::from_stream(ReaderStream::new(file)),
    )
        .into_response()
}

async fn next_field(multipart: &mut Multipart) -> Result<Option<Field<'_>>, Response> {
    multipart
        .next_field()
        .await
        .map_err(|err| bad_request(format!("Malformed upload: {}", err)))
}

async fn read_bytes(field: Field<'_>) -> Result<Bytes, Response> {
    let name = field.name().unwrap_or_default().to_string();
    field
        .bytes()
        .await
        .map_err(|err| bad_request(format!("Failed to read {}: {}", name, err)))
}

async fn read_options(field: Field<'_>) -> Result<RestoreOptions, Response> {
    let text = field
        .text()
        .await
        .map_err(|err| bad_request(format!("Failed to read options: {}", err)))?;
    if text.trim().is_empty() {
        return Ok(RestoreOptions::default());
    }
    serde_json::from_str::<RestoreRequestOptions>(&text)
        .map(RestoreOptions::from)
        .map_err(|err| bad_request(format!("Invalid restore options: {}", err)))
}

async fn read_single_upload(mut multipart: Multipart) -> Result<(Bytes, RestoreOptions), Response> {
    let mut archive = None;
    let mut options = RestoreOptions::default();
    while let Some(field) = next_field(&mut multipart).await? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "backup" => archive = Some(read_bytes(field).await?),
            "options" => options = read_options(field).await?,
            other => debug!("Ignoring form field {}", other),
        }
    }
    match archive {
        Some(archive) if !archive.is_empty() => Ok((archive, options)),
        _ => Err(bad_request("No backup file provided")),
    }
}

async fn read_multi_part_upload(
    mut multipart: Multipart,
    max_parts: usize,
) -> Result<(Vec<Bytes>, RestoreOptions), Response> {
    let mut total_parts: Option<usize> = None;
    let mut parts = BTreeMap::new();
    let mut options = RestoreOptions::default();

    while let Some(field) = next_field(&mut multipart).await? {
        let name = field.name().unwrap_or_default().to_string();
        if name == "totalParts" {
            let text = field
                .text()
                .await
                .map_err(|err| bad_request(format!("Failed to read totalParts: {}", err)))?;
            let total = text
                .trim()
                .parse::<usize>()
                .map_err(|_| bad_request(format!("totalParts is not a number: {}", text)))?;
            total_parts = Some(total);
        } else if name == "options" {
            options = read_options(field).await?;
        } else if let Some(index) = name.strip_prefix("backupPart") {
            let index = index
                .parse::<usize>()
                .ok()
                .filter(|i| (1..=max_parts).contains(i))
                .ok_or_else(|| bad_request(format!("Unexpected part field {}", name)))?;
            let bytes = read_bytes(field).await?;
            if parts.insert(index, bytes).is_some() {
                return Err(bad_request(format!("{} was sent twice", name)));
            }
        } else {
            debug!("Ignoring form field {}", name);
        }
    }

    let total = total_parts.ok_or_else(|| bad_request("totalParts is required"))?;
    if total == 0 || total > max_parts {
        return Err(bad_request(format!(
            "totalParts must be between 1 and {}, got {}",
            max_parts, total
        )));
    }
    if parts.len() != total {
        return Err(bad_request(format!(
            "Expected {} parts, received {}",
            total,
            parts.len()
        )));
    }
    if let Some(missing) = (1..=total).find(|i| !parts.contains_key(i)) {
        return Err(bad_request(format!("backupPart{} is missing", missing)));
    }

    Ok((parts.into_values().collect(), options))
}

fn spawn_restore(
    backups: GuardedBackupService,
    guard: SessionGuard,
    parts: Vec<Bytes>,
    options: RestoreOptions,
) -> Response {
    info!(
        "Restoring {} part(s), domains: {:?}, overwrite: {}",
        parts.len(),
        options.selected_domains(),
        options.overwrite_existing
    );
    let (tx, rx) = mpsc::channel(PROGRESS_CHANNEL_CAPACITY);
    tokio::task::spawn_blocking(move || {
        if let Err(err) = backups.restore(&parts, &options, forward(&tx)) {
            let _ = tx.blocking_send(ProgressEvent::error(err.to_string()));
        }
        drop(guard);
    });
    progress_response(rx)
}

async fn restore_backup(
    State(backups): State<GuardedBackupService>,
    multipart: Multipart,
) -> Response {
    let guard = match acquire_session(&backups, SessionState::Restoring) {
        Ok(guard) => guard,
        Err(response) => return response,
    };
    match read_single_upload(multipart).await {
        Ok((archive, options)) => spawn_restore(backups, guard, vec![archive], options),
        Err(response) => response,
    }
}

async fn restore_multi_part(
    State(backups): State<GuardedBackupService>,
    State(config): State<ServerConfig>,
    multipart: Multipart,
) -> Response {
    let guard = match acquire_session(&backups, SessionState::Restoring) {
        Ok(guard) => guard,
        Err(response) => return response,
    };
    match read_multi_part_upload(multipart, config.max_restore_parts).await {
        Ok((parts, options)) => spawn_restore(backups, guard, parts, options),
        Err(response) => response,
    }
}

pub fn backup_routes(config: &ServerConfig) -> Router<ServerState> {
    Router::new()
        .route("/stats", get(get_stats))
        .route("/create", post(create_backup))
        .route("/download", get(get_download))
        .route("/download-part/{part}", get(download_part))
        .route(
            "/restore",
            post(restore_backup).layer(DefaultBodyLimit::max(config.restore_body_limit(1))),
        )
        .route(
            "/restore-multipart",
            post(restore_multi_part).layer(DefaultBodyLimit::max(
                config.restore_body_limit(config.max_restore_parts),
            )),
        )
}
