mod file_config;

pub use file_config::FileConfig;

use crate::book_access::BookAccessSettings;
use crate::server::{RequestsLoggingLevel, ServerConfig};
use anyhow::{bail, Result};
use clap::ValueEnum;
use std::path::PathBuf;

/// CLI arguments that can be used for config resolution.
/// This struct mirrors the CLI arguments that can be overridden by TOML config.
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    pub db_dir: Option<PathBuf>,
    pub port: u16,
    pub logging_level: RequestsLoggingLevel,
    pub session_secret: Option<String>,
    pub session_expiry_days: u64,
    pub book_token_expiry_days: Option<u64>,
    pub reader_base_url: Option<String>,
    pub platform_id: Option<String>,
    pub library_url: Option<String>,
    pub free_book_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub db_dir: PathBuf,
    pub port: u16,
    pub logging_level: RequestsLoggingLevel,
    /// Required; there is deliberately no built-in fallback secret.
    pub session_secret: String,
    pub session_expiry_days: u64,
    /// None means issued book tokens never expire.
    pub book_token_expiry_days: Option<u64>,
    pub reader_base_url: String,
    pub platform_id: String,
    pub library_url: String,
    pub free_book_id: String,
}

impl AppConfig {
    /// Resolve configuration from CLI arguments and optional TOML file config.
    /// TOML values override CLI values where present.
    pub fn resolve(cli: &CliConfig, file_config: Option<FileConfig>) -> Result<Self> {
        let file = file_config.unwrap_or_default();

        let db_dir = file
            .db_dir
            .map(PathBuf::from)
            .or_else(|| cli.db_dir.clone())
            .ok_or_else(|| {
                anyhow::anyhow!("db_dir must be specified via --db-dir or in config file")
            })?;
        if !db_dir.exists() {
            bail!("Database directory does not exist: {:?}", db_dir);
        }
        if !db_dir.is_dir() {
            bail!("db_dir is not a directory: {:?}", db_dir);
        }

        let session_secret = file
            .session_secret
            .or_else(|| cli.session_secret.clone())
            .ok_or_else(|| {
                anyhow::anyhow!(
                    "session_secret must be specified via --session-secret or in config file"
                )
            })?;
        if session_secret.len() < 16 {
            bail!("session_secret must be at least 16 characters");
        }

        let port = file.port.unwrap_or(cli.port);
        let logging_level = file
            .logging_level
            .and_then(|s| parse_logging_level(&s))
            .unwrap_or_else(|| cli.logging_level.clone());

        let session_expiry_days = file.session_expiry_days.unwrap_or(cli.session_expiry_days);
        let book_token_expiry_days = file
            .book_token_expiry_days
            .or(cli.book_token_expiry_days);

        let reader_base_url = file
            .reader_base_url
            .or_else(|| cli.reader_base_url.clone())
            .unwrap_or_else(|| "https://reader.storynest.example.com".to_string());
        let platform_id = file
            .platform_id
            .or_else(|| cli.platform_id.clone())
            .unwrap_or_else(|| "storynest-web".to_string());
        let library_url = file
            .library_url
            .or_else(|| cli.library_url.clone())
            .unwrap_or_else(|| "https://storynest.example.com/library".to_string());
        let free_book_id = file
            .free_book_id
            .or_else(|| cli.free_book_id.clone())
            .unwrap_or_else(|| "wtbtg".to_string());

        Ok(Self {
            db_dir,
            port,
            logging_level,
            session_secret,
            session_expiry_days,
            book_token_expiry_days,
            reader_base_url,
            platform_id,
            library_url,
            free_book_id,
        })
    }

    pub fn user_db_path(&self) -> PathBuf {
        self.db_dir.join("user.db")
    }

    pub fn library_db_path(&self) -> PathBuf {
        self.db_dir.join("library.db")
    }

    pub fn analytics_db_path(&self) -> PathBuf {
        self.db_dir.join("analytics.db")
    }

    pub fn book_access_settings(&self) -> BookAccessSettings {
        BookAccessSettings {
            secret: self.session_secret.clone(),
            token_expiry_days: self.book_token_expiry_days,
            reader_base_url: self.reader_base_url.clone(),
            platform_id: self.platform_id.clone(),
            library_url: self.library_url.clone(),
        }
    }

    pub fn server_config(&self) -> ServerConfig {
        ServerConfig {
            port: self.port,
            requests_logging_level: self.logging_level.clone(),
            session_secret: self.session_secret.clone(),
            session_expiry_days: self.session_expiry_days,
            book_access: self.book_access_settings(),
        }
    }
}

/// Parses a logging level string into RequestsLoggingLevel.
/// Uses clap's ValueEnum trait for parsing.
fn parse_logging_level(s: &str) -> Option<RequestsLoggingLevel> {
    RequestsLoggingLevel::from_str(s, true).ok()
}
