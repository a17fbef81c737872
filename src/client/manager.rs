//! HTTP client driving backup creation, download and restore on a marketplace server.

use futures::StreamExt;
use reqwest::multipart::{Form, Part};
use reqwest::{Method, RequestBuilder, Response};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::context::{ProgressSlot, RestoreContext};
use super::sink::DownloadSink;
use crate::backup::archive::sha256_hex;
use crate::backup::sequencer::validate_selection;
use crate::backup::{
    progress_events, BackupError, BackupResult, BackupStats, DownloadManifest, RestoreOptions,
    SelectedFile, SelectedFileSet, SessionLock, SessionState, ValidationError,
    MAX_PART_SIZE_BYTES,
};

pub const BACKUP_API_PREFIX: &str = "/api/admin/backup";

/// Delay between consecutive part deliveries of a multi-part download.
pub const DEFAULT_PART_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: String,
    pub admin_token: Option<String>,
    /// Streaming calls carry no overall timeout, only this connect timeout.
    pub connect_timeout: Option<Duration>,
    pub part_interval: Duration,
    pub max_part_size: u64,
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            admin_token: None,
            connect_timeout: Some(Duration::from_secs(10)),
            part_interval: DEFAULT_PART_INTERVAL,
            max_part_size: MAX_PART_SIZE_BYTES,
        }
    }
}

pub struct BackupRestoreManager {
    client: reqwest::Client,
    base_url: String,
    admin_token: Option<String>,
    part_interval: Duration,
    max_part_size: u64,
    session: SessionLock,
    progress: ProgressSlot,
}

impl BackupRestoreManager {
    pub fn new(config: ClientConfig) -> BackupResult<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = config.connect_timeout {
            builder = builder.connect_timeout(timeout);
        }
        let client = builder.build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            admin_token: config.admin_token,
            part_interval: config.part_interval,
            max_part_size: config.max_part_size,
            session: SessionLock::new(),
            progress: ProgressSlot::new(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn progress(&self) -> &ProgressSlot {
        &self.progress
    }

    pub fn session_state(&self) -> SessionState {
        self.session.state()
    }

    /// A restore session reporting into this manager's progress slot.
    pub fn restore_context(&self) -> RestoreContext {
        RestoreContext::new(self.progress.clone())
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}{}{}", self.base_url, BACKUP_API_PREFIX, path);
        let builder = self.client.request(method, url);
        match &self.admin_token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    pub async fn get_stats(&self) -> BackupResult<BackupStats> {
        let response = self.request(Method::GET, "/stats").send().await?;
        let response = check_status(response, "Fetching backup stats")?;
        Ok(response.json().await?)
    }

    /// Creates a backup on the server and delivers every part to `sink`.
    ///
    /// Parts of a multi-part backup are delivered one at a time, each at least
    /// the configured part interval after the previous one.
    pub async fn create_backup(&self, sink: &dyn DownloadSink) -> BackupResult<DownloadManifest> {
        let _session = self.session.try_acquire(SessionState::BackingUp)?;
        let result = self.run_backup(sink).await;
        if let Err(err) = &result {
            warn!("Backup failed: {}", err);
            self.progress.clear();
        }
        result
    }

    async fn run_backup(&self, sink: &dyn DownloadSink) -> BackupResult<DownloadManifest> {
        info!("Requesting backup from {}", self.base_url);
        let response = self.request(Method::POST, "/create").send().await?;
        self.follow_progress(response, "Backup creation").await?;

        let response = self.request(Method::GET, "/download").send().await?;
        let manifest: DownloadManifest = check_status(response, "Backup finalization")?
            .json()
            .await?;

        let mut last_delivery: Option<Instant> = None;
        for part in manifest.parts() {
            let response = self
                .request(Method::GET, &format!("/download-part/{}", part.index))
                .send()
                .await?;
            let bytes = check_status(response, "Part download")?.bytes().await?;
            if sha256_hex(&bytes) != part.sha256 {
                return Err(BackupError::InvalidArchive(format!(
                    "{} does not match its checksum",
                    part.filename
                )));
            }

            if let Some(previous) = last_delivery {
                tokio::time::sleep_until(previous + self.part_interval).await;
            }
            sink.deliver(part, &bytes).await?;
            last_delivery = Some(Instant::now());
            debug!("Delivered part {}/{}", part.index, manifest.part_count());
        }

        info!("Backup downloaded in {} part(s)", manifest.part_count());
        Ok(manifest)
    }

    /// Uploads a single archive and applies it with `options`.
    pub async fn restore_backup(&self, file: &SelectedFile, options: &RestoreOptions) -> BackupResult<()> {
        validate_selection(std::slice::from_ref(file), self.max_part_size)?;
        let _session = self.session.try_acquire(SessionState::Restoring)?;

        let result: BackupResult<()> = async {
            let form = Form::new()
                .part("backup", zip_part(file).await?)
                .text("options", serde_json::to_string(&options.to_request())?);
            let response = self
                .request(Method::POST, "/restore")
                .multipart(form)
                .send()
                .await?;
            self.follow_progress(response, "Restore").await
        }
        .await;
        self.finish_restore(result)
    }

    /// Uploads an ordered part sequence; the server reassembles it in the
    /// declared order. Parts are not checksummed on the way up.
    pub async fn restore_multi_part(
        &self,
        files: &SelectedFileSet,
        options: &RestoreOptions,
    ) -> BackupResult<()> {
        if files.is_empty() {
            return Err(ValidationError::EmptySelection.into());
        }
        validate_selection(files.files(), self.max_part_size)?;
        let _session = self.session.try_acquire(SessionState::Restoring)?;

        let result: BackupResult<()> = async {
            let mut form = Form::new()
                .text("totalParts", files.len().to_string())
                .text("options", serde_json::to_string(&options.to_request())?);
            for (i, file) in files.files().iter().enumerate() {
                form = form.part(format!("backupPart{}", i + 1), zip_part(file).await?);
            }
            let response = self
                .request(Method::POST, "/restore-multipart")
                .multipart(form)
                .send()
                .await?;
            self.follow_progress(response, "Multi-part restore").await
        }
        .await;
        self.finish_restore(result)
    }

    /// Submits the context's selection with its options, then resets it.
    pub async fn restore(&self, ctx: &mut RestoreContext) -> BackupResult<()> {
        let selection = ctx
            .selection()
            .cloned()
            .ok_or(ValidationError::EmptySelection)?;
        let options = ctx.options.clone();
        let result = match selection.files() {
            [single] => self.restore_backup(single, &options).await,
            _ => self.restore_multi_part(&selection, &options).await,
        };
        if result.is_ok() {
            ctx.reset();
        }
        result
    }

    fn finish_restore(&self, result: BackupResult<()>) -> BackupResult<()> {
        match &result {
            Ok(()) => info!("Restore applied"),
            Err(err) => {
                warn!("Restore failed: {}", err);
                self.progress.clear();
            }
        }
        result
    }

    /// Feeds the progress stream of `response` into the slot until it ends.
    async fn follow_progress(&self, response: Response, operation: &'static str) -> BackupResult<()> {
        let response = check_status(response, operation)?;
        let mut events = Box::pin(progress_events(Box::pin(response.bytes_stream())));
        while let Some(event) = events.next().await {
            let event = event?;
            if event.is_error() {
                return Err(BackupError::Remote(event.message));
            }
            debug!("{}: [{}] {}", operation, event.step, event.message);
            self.progress.set(event);
        }
        Ok(())
    }
}

fn check_status(response: Response, operation: &'static str) -> BackupResult<Response> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        Err(BackupError::Transport { operation, status })
    }
}

async fn zip_part(file: &SelectedFile) -> BackupResult<Part> {
    let bytes = file.read().await?;
    Ok(Part::bytes(bytes)
        .file_name(file.filename.clone())
        .mime_str("application/zip")?)
}
