use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, level_filters::LevelFilter};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use beatvault::config;
use beatvault::server::{metrics, run_server, RequestsLoggingLevel, ServerConfig};
use beatvault::store::{MarketStore, MarketTable, SqliteMarketStore};

/// Absolute form of a path argument; paths that do not exist yet are kept as given.
fn parse_path(s: &str) -> Result<PathBuf, String> {
    let path = PathBuf::from(s);
    match path.canonicalize() {
        Ok(resolved) => Ok(resolved),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            if path.is_absolute() {
                return Ok(path);
            }
            std::env::current_dir()
                .map(|cwd| cwd.join(&path))
                .map_err(|err| format!("Cannot resolve '{}' against the working dir: {}", s, err))
        }
        Err(err) => Err(format!("Cannot resolve '{}': {}", s, err)),
    }
}

#[derive(Parser, Debug)]
struct CliArgs {
    /// Optional TOML file; any value set there wins over the flag.
    #[clap(long, value_parser = parse_path)]
    pub config: Option<PathBuf>,

    /// Data directory with beatvault.db, and by default uploads/ and backups/.
    #[clap(long, value_parser = parse_path)]
    pub data_dir: Option<PathBuf>,

    /// Directory of the uploaded media files (beats, covers, stems).
    #[clap(long, value_parser = parse_path)]
    pub uploads_path: Option<PathBuf>,

    /// Directory where backup parts are written before download.
    #[clap(long, value_parser = parse_path)]
    pub backup_dir: Option<PathBuf>,

    /// Port of the admin HTTP API.
    #[clap(short, long, default_value_t = 3001)]
    pub port: u16,

    /// Port serving Prometheus metrics.
    #[clap(long, default_value_t = 9091)]
    pub metrics_port: u16,

    /// How much of each request to log: none, path, headers or body.
    #[clap(long, default_value = "path")]
    pub logging_level: RequestsLoggingLevel,

    /// Bearer token required on the admin API. No check when unset.
    #[clap(long)]
    pub admin_token: Option<String>,
}

impl From<&CliArgs> for config::CliConfig {
    fn from(args: &CliArgs) -> Self {
        config::CliConfig {
            data_dir: args.data_dir.clone(),
            uploads_path: args.uploads_path.clone(),
            backup_dir: args.backup_dir.clone(),
            port: args.port,
            metrics_port: args.metrics_port,
            logging_level: args.logging_level.clone(),
            admin_token: args.admin_token.clone(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli_args = CliArgs::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init()?;

    let file_config = match &cli_args.config {
        Some(path) => {
            info!("Reading config file {:?}", path);
            Some(config::FileConfig::load(path)?)
        }
        None => None,
    };

    // TOML overrides CLI
    let cli_config: config::CliConfig = (&cli_args).into();
    let app_config = config::AppConfig::resolve(&cli_config, file_config)?;

    info!("Configuration loaded:");
    info!("  data_dir: {:?}", app_config.data_dir);
    info!("  uploads_path: {:?}", app_config.uploads_path);
    info!("  backup_dir: {:?}", app_config.backup_dir);
    info!("  port: {}", app_config.port);
    info!(
        "  admin auth: {}",
        if app_config.admin_token.is_some() {
            "enabled"
        } else {
            "disabled"
        }
    );

    let market_store = Arc::new(SqliteMarketStore::new(app_config.db_path())?);
    for table in MarketTable::ALL {
        info!("  {}: {} rows", table, market_store.count_rows(table)?);
    }

    info!("Initializing metrics...");
    metrics::init_metrics();

    info!(
        "Serving the admin API on port {} and metrics on port {}",
        app_config.port, app_config.metrics_port
    );

    tokio::select! {
        result = run_server(ServerConfig::from(&app_config), market_store) => {
            info!("Server exited: {:?}", result);
            result
        },
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
            Ok(())
        }
    }
}
