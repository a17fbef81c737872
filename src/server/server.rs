use anyhow::{Context, Result};
use std::time::Duration;

use axum::{
    extract::State,
    middleware,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::Serialize;
use tracing::info;

use super::backup_routes::backup_routes;
use super::metrics::metrics_handler;
use super::{log_requests, require_admin_token, state::*, ServerConfig};
use crate::client::BACKUP_API_PREFIX;

const BUILD_HASH: &str = env!("BEATVAULT_BUILD_HASH");

#[derive(Serialize)]
struct ServerStats {
    pub uptime: String,
    pub hash: String,
}

fn format_uptime(duration: Duration) -> String {
    let total_seconds = duration.as_secs();

    let days = total_seconds / 86_400;
    let hours = (total_seconds % 86_400) / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    format!("{}d {:02}:{:02}:{:02}", days, hours, minutes, seconds)
}

async fn home(State(state): State<ServerState>) -> impl IntoResponse {
    let stats = ServerStats {
        uptime: format_uptime(state.start_time.elapsed()),
        hash: state.hash.clone(),
    };
    Json(stats)
}

fn make_router(state: ServerState) -> Router {
    let admin_routes: Router = backup_routes(&state.config)
        .layer(middleware::from_fn_with_state(
            state.config.clone(),
            require_admin_token,
        ))
        .with_state(state.clone());

    let home_router: Router = Router::new()
        .route("/", get(home))
        .with_state(state.clone());

    home_router
        .nest(BACKUP_API_PREFIX, admin_routes)
        .layer(middleware::from_fn_with_state(state, log_requests))
}

pub fn make_app(config: ServerConfig, market_store: GuardedMarketStore) -> Result<Router> {
    std::fs::create_dir_all(&config.backup_dir)
        .with_context(|| format!("Failed to create backup dir {:?}", config.backup_dir))?;
    let state = ServerState::new(config, market_store, BUILD_HASH.to_owned());
    Ok(make_router(state))
}

fn make_metrics_app() -> Router {
    Router::new().route("/metrics", get(metrics_handler))
}

pub async fn run_server(config: ServerConfig, market_store: GuardedMarketStore) -> Result<()> {
    let port = config.port;
    let metrics_port = config.metrics_port;
    let app = make_app(config, market_store)?;

    let metrics_listener = tokio::net::TcpListener::bind(format!("127.0.0.1:{}", metrics_port))
        .await
        .with_context(|| format!("Failed to bind metrics port {}", metrics_port))?;
    tokio::spawn(async move {
        if let Err(err) = axum::serve(metrics_listener, make_metrics_app()).await {
            tracing::error!("Metrics server stopped: {}", err);
        }
    });

    let listener = tokio::net::TcpListener::bind(format!("127.0.0.1:{}", port))
        .await
        .with_context(|| format!("Failed to bind port {}", port))?;
    info!("Listening on {}", listener.local_addr()?);

    Ok(axum::serve(listener, app).await?)
}
