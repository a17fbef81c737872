use axum::{http::StatusCode, response::IntoResponse};
use lazy_static::lazy_static;
use prometheus::{
    CounterVec, Encoder, Gauge, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder,
};
use std::time::Duration;

/// Metric name prefix for all beatvault metrics
const PREFIX: &str = "beatvault";

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();

    // HTTP Request Metrics
    pub static ref HTTP_REQUESTS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_http_requests_total"), "Total number of HTTP requests"),
        &["method", "path", "status"]
    ).expect("Failed to create http_requests_total metric");

    pub static ref HTTP_REQUEST_DURATION_SECONDS: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            format!("{PREFIX}_http_request_duration_seconds"),
            "HTTP request duration in seconds"
        )
        .buckets(vec![0.001, 0.01, 0.05, 0.1, 0.5, 1.0, 2.0, 5.0, 10.0]),
        &["method", "path"]
    ).expect("Failed to create http_request_duration_seconds metric");

    // Backup Metrics
    pub static ref BACKUP_RUNS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_backup_runs_total"), "Backup runs by outcome"),
        &["outcome"]
    ).expect("Failed to create backup_runs_total metric");

    pub static ref BACKUP_DURATION_SECONDS: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            format!("{PREFIX}_backup_duration_seconds"),
            "Time spent packaging a backup"
        )
        .buckets(vec![0.1, 0.5, 1.0, 5.0, 15.0, 60.0, 300.0]),
        &["outcome"]
    ).expect("Failed to create backup_duration_seconds metric");

    pub static ref BACKUP_ARCHIVE_BYTES: Gauge = Gauge::new(
        format!("{PREFIX}_backup_archive_bytes"),
        "Size of the last backup archive produced"
    ).expect("Failed to create backup_archive_bytes metric");

    pub static ref BACKUP_ARCHIVE_PARTS: Gauge = Gauge::new(
        format!("{PREFIX}_backup_archive_parts"),
        "Number of parts of the last backup archive produced"
    ).expect("Failed to create backup_archive_parts metric");

    // Restore Metrics
    pub static ref RESTORE_RUNS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_restore_runs_total"), "Restore runs by kind and outcome"),
        &["kind", "outcome"]
    ).expect("Failed to create restore_runs_total metric");

    pub static ref RESTORE_DURATION_SECONDS: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            format!("{PREFIX}_restore_duration_seconds"),
            "Time spent applying a restore"
        )
        .buckets(vec![0.1, 0.5, 1.0, 5.0, 15.0, 60.0, 300.0]),
        &["kind"]
    ).expect("Failed to create restore_duration_seconds metric");

    pub static ref RESTORE_ROWS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_restore_rows_total"), "Rows written by restores"),
        &["table"]
    ).expect("Failed to create restore_rows_total metric");
}

/// Initialize all metrics and register them with the Prometheus registry
pub fn init_metrics() {
    // Already registered is fine, tests call this repeatedly
    let _ = REGISTRY.register(Box::new(HTTP_REQUESTS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(HTTP_REQUEST_DURATION_SECONDS.clone()));
    let _ = REGISTRY.register(Box::new(BACKUP_RUNS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(BACKUP_DURATION_SECONDS.clone()));
    let _ = REGISTRY.register(Box::new(BACKUP_ARCHIVE_BYTES.clone()));
    let _ = REGISTRY.register(Box::new(BACKUP_ARCHIVE_PARTS.clone()));
    let _ = REGISTRY.register(Box::new(RESTORE_RUNS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(RESTORE_DURATION_SECONDS.clone()));
    let _ = REGISTRY.register(Box::new(RESTORE_ROWS_TOTAL.clone()));

    tracing::info!("Metrics system initialized successfully");
}

/// Record an HTTP request
pub fn record_http_request(method: &str, path: &str, status: u16, duration: Duration) {
    HTTP_REQUESTS_TOTAL
        .with_label_values(&[method, path, &status.to_string()])
        .inc();

    HTTP_REQUEST_DURATION_SECONDS
        .with_label_values(&[method, path])
        .observe(duration.as_secs_f64());
}

/// Collapses per-part download paths into one label.
pub fn categorize_endpoint(path: &str) -> &str {
    const DOWNLOAD_PART: &str = "/api/admin/backup/download-part/";
    if path.starts_with(DOWNLOAD_PART) {
        "/api/admin/backup/download-part/{part}"
    } else {
        path
    }
}

pub fn record_backup_run(outcome: &str, duration: Duration) {
    BACKUP_RUNS_TOTAL.with_label_values(&[outcome]).inc();
    BACKUP_DURATION_SECONDS
        .with_label_values(&[outcome])
        .observe(duration.as_secs_f64());
}

pub fn set_last_archive(total_bytes: u64, parts: usize) {
    BACKUP_ARCHIVE_BYTES.set(total_bytes as f64);
    BACKUP_ARCHIVE_PARTS.set(parts as f64);
}

/// `kind` is `single` or `multipart`.
pub fn record_restore_run(kind: &str, outcome: &str, duration: Duration) {
    RESTORE_RUNS_TOTAL.with_label_values(&[kind, outcome]).inc();
    RESTORE_DURATION_SECONDS
        .with_label_values(&[kind])
        .observe(duration.as_secs_f64());
}

pub fn record_restored_rows(table: &str, rows: usize) {
    RESTORE_ROWS_TOTAL
        .with_label_values(&[table])
        .inc_by(rows as f64);
}

/// Handler for the /metrics endpoint
pub async fn metrics_handler() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();

    let mut buffer = vec![];
    match encoder.encode(&metric_families, &mut buffer) {
        Ok(()) => {
            let response = String::from_utf8(buffer).unwrap_or_else(|_| String::from(""));
            (StatusCode::OK, response)
        }
        Err(e) => {
            tracing::error!("Failed to encode metrics: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to encode metrics: {}", e),
            )
        }
    }
}
