use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{error, info, level_filters::LevelFilter};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use storynest_server::analytics::SqliteAnalyticsStore;
use storynest_server::config::{AppConfig, CliConfig, FileConfig};
use storynest_server::library::{AccessTokenStore, Book, BookStore, SqliteLibraryStore};
use storynest_server::server::{self, run_server, RequestsLoggingLevel};
use storynest_server::user::{AccessKind, PasswordResetStore, SqliteUserStore};

fn parse_path(s: &str) -> Result<PathBuf> {
    let path_buf = PathBuf::from(s);
    let original_path = match path_buf.canonicalize() {
        Ok(path) => path,
        Err(msg) => {
            if msg.kind() == std::io::ErrorKind::NotFound {
                path_buf
            } else {
                return Err(msg).with_context(|| format!("Error resolving path: {}", s));
            }
        }
    };
    if original_path.is_absolute() {
        return Ok(original_path);
    }
    let cwd = std::env::current_dir()?;
    Ok(cwd.join(original_path))
}

#[derive(Parser, Debug)]
struct CliArgs {
    /// Directory holding the SQLite database files.
    #[clap(long, value_parser = parse_path)]
    pub db_dir: Option<PathBuf>,

    /// Path to an optional TOML config file; its values override CLI flags.
    #[clap(long, value_parser = parse_path)]
    pub config: Option<PathBuf>,

    /// The port to listen on.
    #[clap(short, long, default_value_t = 3001)]
    pub port: u16,

    /// The level of logging to perform on each request.
    #[clap(long, default_value = "path")]
    pub logging_level: RequestsLoggingLevel,

    /// Shared secret for signing session and book access tokens.
    #[clap(long)]
    pub session_secret: Option<String>,

    /// Days until a session token expires.
    #[clap(long, default_value_t = 7)]
    pub session_expiry_days: u64,

    /// Days until a book access token expires. Omit for tokens that never
    /// expire.
    #[clap(long)]
    pub book_token_expiry_days: Option<u64>,

    /// Base URL of the externally hosted book reader.
    #[clap(long)]
    pub reader_base_url: Option<String>,

    /// Platform identifier passed to the reader.
    #[clap(long)]
    pub platform_id: Option<String>,

    /// Return-to-library URL passed to the reader.
    #[clap(long)]
    pub library_url: Option<String>,

    /// Id of the platform's free book, auto-granted to every user.
    #[clap(long)]
    pub free_book_id: Option<String>,

    /// Interval in hours between pruning runs for expired reset tokens and
    /// access token records. Set to 0 to disable pruning.
    #[clap(long, default_value_t = 24)]
    pub prune_interval_hours: u64,
}

const FREE_BOOK_TITLE: &str = "Where the Bright Things Grow";

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
        .try_init()
        .unwrap();

    let file_config = cli_args
        .config
        .as_ref()
        .map(FileConfig::load)
        .transpose()?;

    let cli_config = CliConfig {
        db_dir: cli_args.db_dir,
        port: cli_args.port,
        logging_level: cli_args.logging_level,
        session_secret: cli_args.session_secret,
        session_expiry_days: cli_args.session_expiry_days,
        book_token_expiry_days: cli_args.book_token_expiry_days,
        reader_base_url: cli_args.reader_base_url,
        platform_id: cli_args.platform_id,
        library_url: cli_args.library_url,
        free_book_id: cli_args.free_book_id,
    };
    let config = AppConfig::resolve(&cli_config, file_config)?;

    info!("Opening SQLite databases in {:?}...", config.db_dir);
    let user_store = Arc::new(SqliteUserStore::new(config.user_db_path())?);
    let library_store = Arc::new(SqliteLibraryStore::new(config.library_db_path())?);
    let analytics_store = Arc::new(SqliteAnalyticsStore::new(config.analytics_db_path())?);

    // The platform's one free book must exist before the first access request
    if library_store.get_book(&config.free_book_id)?.is_none() {
        info!("Seeding free book {}", config.free_book_id);
        library_store.upsert_book(&Book {
            id: config.free_book_id.clone(),
            title: FREE_BOOK_TITLE.to_string(),
            slug: config.free_book_id.clone(),
            access: AccessKind::Free,
        })?;
    }

    info!("Initializing metrics...");
    server::metrics::init_metrics();

    if cli_args.prune_interval_hours > 0 {
        let interval_hours = cli_args.prune_interval_hours;
        let pruning_user_store = user_store.clone();
        let pruning_library_store = library_store.clone();

        info!("Pruning enabled: every {} hours", interval_hours);

        tokio::spawn(async move {
            let interval = Duration::from_secs(interval_hours * 60 * 60);
            let mut ticker = tokio::time::interval(interval);

            // Skip the first immediate tick, wait for the first interval
            ticker.tick().await;

            loop {
                ticker.tick().await;

                match pruning_user_store.prune_expired_reset_tokens(SystemTime::now()) {
                    Ok(count) if count > 0 => info!("Pruned {} expired reset tokens", count),
                    Ok(_) => {}
                    Err(e) => error!("Failed to prune reset tokens: {}", e),
                }

                let now_epoch = SystemTime::now()
                    .duration_since(UNIX_EPOCH)
                    .map(|d| d.as_secs())
                    .unwrap_or(0);
                match pruning_library_store.prune_expired_access_records(now_epoch) {
                    Ok(count) if count > 0 => {
                        info!("Pruned {} expired book access tokens", count)
                    }
                    Ok(_) => {}
                    Err(e) => error!("Failed to prune book access tokens: {}", e),
                }
            }
        });
    }

    info!("Ready to serve at port {}!", config.port);
    run_server(
        config.server_config(),
        user_store,
        library_store,
        analytics_store,
    )
    .await
}
