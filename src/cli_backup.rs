//! Admin command line for backing up and restoring a beatvault server.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod cli_style;

use beatvault::backup::{megabytes, DataDomain, DownloadManifest};
use beatvault::client::{BackupRestoreManager, ClientConfig, DirectorySink, ProgressSlot};
use cli_style::{
    get_styles, print_error, print_key_value, print_list_item, print_section_footer,
    print_section_header, print_success, print_warning,
};

fn parse_path(s: &str) -> Result<PathBuf> {
    let original_path = PathBuf::from(s);
    if original_path.is_absolute() {
        return Ok(original_path);
    }
    let cwd = std::env::current_dir()?;
    Ok(cwd.join(original_path))
}

#[derive(Parser, Debug)]
#[command(styles=get_styles(), name = "beatvault-admin")]
struct CliArgs {
    /// Base URL of the beatvault server.
    #[clap(long, default_value = "http://127.0.0.1:3001")]
    pub server: String,

    /// Admin bearer token, if the server requires one.
    #[clap(long)]
    pub token: Option<String>,

    /// Minimum delay between two part downloads, in milliseconds.
    #[clap(long, default_value_t = 1000)]
    pub part_interval_ms: u64,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Shows what a backup would contain.
    Stats,

    /// Creates a backup on the server and downloads its parts.
    Create {
        /// Directory the parts are written to.
        #[clap(long, default_value = ".", value_parser = parse_path)]
        out_dir: PathBuf,
    },

    /// Restores a backup from one archive or from all parts of a split one.
    /// Parts may be given in any order.
    Restore {
        #[clap(required = true, value_parser = parse_path)]
        files: Vec<PathBuf>,

        /// Replace existing rows and files instead of keeping them.
        #[clap(long)]
        overwrite: bool,

        /// Domains to add to the default selection (users is off by default).
        #[clap(long, value_enum)]
        include: Vec<DataDomain>,

        /// Domains to leave untouched.
        #[clap(long, value_enum)]
        exclude: Vec<DataDomain>,
    },
}

/// Mirrors the progress slot into a spinner until aborted.
fn spawn_spinner(slot: &ProgressSlot) -> Result<(ProgressBar, JoinHandle<()>)> {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(ProgressStyle::default_spinner().template("{spinner} [{prefix}] {msg}")?);
    spinner.enable_steady_tick(Duration::from_millis(100));

    let mut rx = slot.subscribe();
    let bar = spinner.clone();
    let handle = tokio::spawn(async move {
        while rx.changed().await.is_ok() {
            let current = rx.borrow_and_update().clone();
            if let Some(event) = current {
                bar.set_prefix(event.step);
                bar.set_message(event.message);
            }
        }
    });
    Ok((spinner, handle))
}

async fn with_spinner<T, F>(slot: &ProgressSlot, operation: F) -> Result<T>
where
    F: std::future::Future<Output = beatvault::BackupResult<T>>,
{
    let (spinner, handle) = spawn_spinner(slot)?;
    let result = operation.await;
    handle.abort();
    spinner.finish_and_clear();
    Ok(result?)
}

async fn show_stats(manager: &BackupRestoreManager) -> Result<()> {
    let stats = manager.get_stats().await?;
    print_section_header("Backup contents");
    for (table, rows) in &stats.database {
        print_key_value(table, &rows.to_string());
    }
    print_key_value(
        "media files",
        &format!(
            "{} ({:#})",
            stats.files.count,
            byte_unit::Byte::from(stats.files.total_size)
        ),
    );
    print_section_footer();
    Ok(())
}

async fn create(manager: &BackupRestoreManager, out_dir: PathBuf) -> Result<()> {
    std::fs::create_dir_all(&out_dir)
        .with_context(|| format!("Could not create output directory {:?}", out_dir))?;
    let sink = DirectorySink::new(&out_dir);
    let manifest = with_spinner(manager.progress(), manager.create_backup(&sink)).await?;

    match &manifest {
        DownloadManifest::Single { part } => {
            print_success(&format!("Backup saved as {}", out_dir.join(&part.filename).display()))
        }
        DownloadManifest::Multipart { parts } => {
            print_success(&format!(
                "Backup saved in {} parts under {}",
                parts.len(),
                out_dir.display()
            ));
            for part in parts {
                print_list_item(
                    &format!("{} ({:.2} MB)", part.filename, megabytes(part.size)),
                    1,
                );
            }
        }
    }
    Ok(())
}

async fn restore(
    manager: &BackupRestoreManager,
    files: Vec<PathBuf>,
    overwrite: bool,
    include: Vec<DataDomain>,
    exclude: Vec<DataDomain>,
) -> Result<()> {
    let mut ctx = manager.restore_context();
    let selection = ctx.select(&files).await?;
    print_section_header("Restoring");
    for name in selection.filenames() {
        print_list_item(name, 1);
    }

    for domain in include {
        ctx.options.set(domain, true);
    }
    for domain in exclude {
        ctx.options.set(domain, false);
    }
    ctx.options.overwrite_existing = overwrite;
    let domains: Vec<String> = ctx
        .options
        .selected_domains()
        .iter()
        .map(|d| d.to_string())
        .collect();
    print_key_value("domains", &domains.join(", "));
    print_section_footer();
    if overwrite {
        print_warning("Existing data in the selected domains will be replaced");
    }

    with_spinner(manager.progress(), manager.restore(&mut ctx)).await?;
    print_success("Restore complete");
    Ok(())
}

async fn run(cli_args: CliArgs) -> Result<()> {
    let mut config = ClientConfig::new(cli_args.server);
    config.admin_token = cli_args.token;
    config.part_interval = Duration::from_millis(cli_args.part_interval_ms);
    let manager = BackupRestoreManager::new(config)?;

    match cli_args.command {
        Command::Stats => show_stats(&manager).await,
        Command::Create { out_dir } => create(&manager, out_dir).await,
        Command::Restore {
            files,
            overwrite,
            include,
            exclude,
        } => restore(&manager, files, overwrite, include, exclude).await,
    }
}

#[tokio::main]
async fn main() {
    let cli_args = CliArgs::parse();

    let _ = tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::WARN.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init();

    if let Err(err) = run(cli_args).await {
        print_error(&format!("{:#}", err));
        std::process::exit(1);
    }
}
