//! Client behavior against a scripted server: progress stream parsing,
//! part delivery pacing and error mapping.

use async_trait::async_trait;
use axum::{
    body::Body,
    extract::{Multipart, Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use beatvault::backup::archive::sha256_hex;
use beatvault::backup::{
    progress_events, ArchivePart, BackupError, BackupResult, DownloadManifest, RestoreOptions,
    SelectedFile, SelectedFileSet, SessionState,
};
use beatvault::client::{BackupRestoreManager, ClientConfig, DownloadSink, BACKUP_API_PREFIX};
use futures::{stream, StreamExt};
use std::convert::Infallible;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio::sync::Notify;

const PART_1: &[u8] = b"first part of the archive";
const PART_2: &[u8] = b"second part of the archive";

/// Creation progress split mid-line, with a line that is not JSON in between.
const CREATE_CHUNKS: &[&str] = &[
    "{\"step\":\"start\",\"mess",
    "age\":\"Starting backup\"}\nthis is not json\n{\"step\":",
    "\"complete\",\"message\":\"Backup ready\"}\n",
];

#[derive(Clone, Default)]
struct Stub {
    /// When set, `/create` answers only after a notification.
    create_gate: Option<Arc<Notify>>,
    corrupt_checksum: bool,
    fail_multipart: bool,
    uploaded: Arc<Mutex<Vec<(String, Vec<u8>)>>>,
}

fn ndjson(chunks: Vec<String>) -> Response {
    let body = stream::iter(chunks.into_iter().map(Ok::<_, Infallible>));
    (
        [(header::CONTENT_TYPE, "application/x-ndjson")],
        Body::from_stream(body),
    )
        .into_response()
}

fn part(index: usize, bytes: &[u8]) -> ArchivePart {
    ArchivePart {
        index,
        filename: format!("beatvault-backup-test-part{}.zip", index),
        size: bytes.len() as u64,
        sha256: sha256_hex(bytes),
    }
}

async fn create(State(stub): State<Stub>) -> Response {
    if let Some(gate) = &stub.create_gate {
        gate.notified().await;
    }
    ndjson(CREATE_CHUNKS.iter().map(|c| c.to_string()).collect())
}

async fn download(State(stub): State<Stub>) -> Json<DownloadManifest> {
    let mut second = part(2, PART_2);
    if stub.corrupt_checksum {
        second.sha256 = sha256_hex(b"something else");
    }
    Json(DownloadManifest::Multipart {
        parts: vec![part(1, PART_1), second],
    })
}

async fn download_part(Path(index): Path<usize>) -> Response {
    match index {
        1 => PART_1.into_response(),
        2 => PART_2.into_response(),
        _ => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn restore() -> Response {
    ndjson(vec![
        "{\"step\":\"start\",\"message\":\"Reading backup archive\"}\n".to_string(),
        "{\"step\":\"error\",\"message\":\"manifest.json is missing\"}\n".to_string(),
    ])
}

async fn restore_multi_part(State(stub): State<Stub>, mut multipart: Multipart) -> Response {
    if stub.fail_multipart {
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }
    while let Ok(Some(field)) = multipart.next_field().await {
        let name = field.name().unwrap_or_default().to_string();
        let bytes = field.bytes().await.unwrap_or_default();
        stub.uploaded.lock().unwrap().push((name, bytes.to_vec()));
    }
    ndjson(vec![
        "{\"step\":\"complete\",\"message\":\"Restore complete\"}\n".to_string(),
    ])
}

/// Serves the scripted endpoints and returns the base URL.
async fn spawn_stub(stub: Stub) -> String {
    let routes = Router::new()
        .route("/create", post(create))
        .route("/download", get(download))
        .route("/download-part/{part}", get(download_part))
        .route("/restore", post(restore))
        .route("/restore-multipart", post(restore_multi_part))
        .with_state(stub);
    let app = Router::new().nest(BACKUP_API_PREFIX, routes);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://127.0.0.1:{}", port)
}

#[derive(Default)]
struct RecordingSink {
    deliveries: Mutex<Vec<(usize, Vec<u8>, Instant)>>,
}

#[async_trait]
impl DownloadSink for RecordingSink {
    async fn deliver(&self, part: &ArchivePart, bytes: &[u8]) -> BackupResult<()> {
        self.deliveries
            .lock()
            .unwrap()
            .push((part.index, bytes.to_vec(), Instant::now()));
        Ok(())
    }
}

#[tokio::test]
async fn test_progress_stream_skips_malformed_lines() {
    let base_url = spawn_stub(Stub::default()).await;

    let response = reqwest::Client::new()
        .post(format!("{}{}/create", base_url, BACKUP_API_PREFIX))
        .send()
        .await
        .unwrap();
    let events: Vec<_> = progress_events(Box::pin(response.bytes_stream()))
        .map(|event| event.unwrap())
        .collect()
        .await;

    let steps: Vec<&str> = events.iter().map(|e| e.step.as_str()).collect();
    assert_eq!(steps, vec!["start", "complete"]);
    assert_eq!(events[0].message, "Starting backup");
}

#[tokio::test]
async fn test_parts_are_delivered_in_order_one_interval_apart() {
    let base_url = spawn_stub(Stub::default()).await;
    let manager = BackupRestoreManager::new(ClientConfig::new(base_url)).unwrap();
    let sink = RecordingSink::default();

    let manifest = manager.create_backup(&sink).await.unwrap();

    assert_eq!(manifest.part_count(), 2);
    let deliveries = sink.deliveries.lock().unwrap();
    assert_eq!(deliveries.len(), 2);
    assert_eq!(deliveries[0].0, 1);
    assert_eq!(deliveries[0].1, PART_1);
    assert_eq!(deliveries[1].0, 2);
    assert_eq!(deliveries[1].1, PART_2);
    assert!(deliveries[1].2.duration_since(deliveries[0].2) >= Duration::from_millis(1000));

    assert_eq!(manager.progress().current().unwrap().step, "complete");
    assert_eq!(manager.session_state(), SessionState::Idle);
}

#[tokio::test]
async fn test_checksum_mismatch_stops_delivery() {
    let base_url = spawn_stub(Stub {
        corrupt_checksum: true,
        ..Default::default()
    })
    .await;
    let mut config = ClientConfig::new(base_url);
    config.part_interval = Duration::from_millis(10);
    let manager = BackupRestoreManager::new(config).unwrap();
    let sink = RecordingSink::default();

    let err = manager.create_backup(&sink).await.unwrap_err();

    assert!(matches!(err, BackupError::InvalidArchive(_)), "{:?}", err);
    assert_eq!(sink.deliveries.lock().unwrap().len(), 1);
    assert!(manager.progress().current().is_none());
}

#[tokio::test]
async fn test_error_step_becomes_remote_error() {
    let base_url = spawn_stub(Stub::default()).await;
    let manager = BackupRestoreManager::new(ClientConfig::new(base_url)).unwrap();
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("backup.zip");
    std::fs::write(&path, PART_1).unwrap();

    let file = SelectedFile::from_path(&path).await.unwrap();
    let err = manager
        .restore_backup(&file, &RestoreOptions::default())
        .await
        .unwrap_err();

    match err {
        BackupError::Remote(message) => assert_eq!(message, "manifest.json is missing"),
        other => panic!("expected a remote error, got {:?}", other),
    }
    assert!(manager.progress().current().is_none());
    assert_eq!(manager.session_state(), SessionState::Idle);
}

#[tokio::test]
async fn test_multi_part_upload_follows_sequence_order() {
    let stub = Stub::default();
    let uploaded = stub.uploaded.clone();
    let base_url = spawn_stub(stub).await;
    let manager = BackupRestoreManager::new(ClientConfig::new(base_url)).unwrap();
    let dir = TempDir::new().unwrap();
    let first = dir.path().join("backup-part1.zip");
    let second = dir.path().join("backup-part2.zip");
    std::fs::write(&first, PART_1).unwrap();
    std::fs::write(&second, PART_2).unwrap();

    let files = SelectedFileSet::from_paths(&[&second, &first]).await.unwrap();
    manager
        .restore_multi_part(&files, &RestoreOptions::default())
        .await
        .unwrap();

    let uploaded = uploaded.lock().unwrap();
    let field = |name: &str| {
        uploaded
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, bytes)| bytes.clone())
            .unwrap()
    };
    assert_eq!(field("totalParts"), b"2");
    assert_eq!(field("backupPart1"), PART_1);
    assert_eq!(field("backupPart2"), PART_2);
    let options: serde_json::Value = serde_json::from_slice(&field("options")).unwrap();
    assert_eq!(options["clearExisting"], false);
    assert_eq!(options["users"], false);
    assert_eq!(options["restoreFiles"], true);
}

#[tokio::test]
async fn test_failed_status_becomes_transport_error() {
    let base_url = spawn_stub(Stub {
        fail_multipart: true,
        ..Default::default()
    })
    .await;
    let manager = BackupRestoreManager::new(ClientConfig::new(base_url)).unwrap();
    let dir = TempDir::new().unwrap();
    let mut paths = Vec::new();
    for (i, bytes) in [PART_1, PART_2].iter().enumerate() {
        let path = dir.path().join(format!("backup-part{}.zip", i + 1));
        std::fs::write(&path, bytes).unwrap();
        paths.push(path);
    }

    let files = SelectedFileSet::from_paths(&paths).await.unwrap();
    let err = manager
        .restore_multi_part(&files, &RestoreOptions::default())
        .await
        .unwrap_err();

    assert!(
        matches!(
            err,
            BackupError::Transport { status, .. } if status == StatusCode::INTERNAL_SERVER_ERROR
        ),
        "{:?}",
        err
    );
    assert_eq!(manager.session_state(), SessionState::Idle);
}

#[tokio::test]
async fn test_second_operation_is_busy_while_backup_runs() {
    let gate = Arc::new(Notify::new());
    let base_url = spawn_stub(Stub {
        create_gate: Some(gate.clone()),
        ..Default::default()
    })
    .await;
    let mut config = ClientConfig::new(base_url);
    config.part_interval = Duration::from_millis(10);
    let manager = BackupRestoreManager::new(config).unwrap();
    let sink = RecordingSink::default();

    let (backup, (restore, second_backup)) = tokio::join!(manager.create_backup(&sink), async {
        while manager.session_state() != SessionState::BackingUp {
            tokio::task::yield_now().await;
        }
        let file = SelectedFile::new("/tmp/backup.zip", 10);
        let restore = manager
            .restore_backup(&file, &RestoreOptions::default())
            .await;
        let second_backup = manager.create_backup(&RecordingSink::default()).await;
        gate.notify_one();
        (restore, second_backup)
    });

    assert!(
        matches!(restore, Err(BackupError::Busy(SessionState::BackingUp))),
        "{:?}",
        restore
    );
    assert!(matches!(
        second_backup,
        Err(BackupError::Busy(SessionState::BackingUp))
    ));
    assert_eq!(backup.unwrap().part_count(), 2);
    assert_eq!(sink.deliveries.lock().unwrap().len(), 2);
    assert_eq!(manager.session_state(), SessionState::Idle);
}
