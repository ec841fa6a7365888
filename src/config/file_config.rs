use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

/// Optional TOML configuration file. Every field mirrors a CLI argument;
/// values present in the file override the CLI.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FileConfig {
    pub db_dir: Option<String>,
    pub port: Option<u16>,
    pub logging_level: Option<String>,
    pub session_secret: Option<String>,
    pub session_expiry_days: Option<u64>,
    /// Days until a book access token expires; omit for tokens that never do.
    pub book_token_expiry_days: Option<u64>,
    pub reader_base_url: Option<String>,
    pub platform_id: Option<String>,
    pub library_url: Option<String>,
    pub free_book_id: Option<String>,
}

impl FileConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file {:?}", path.as_ref()))?;
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {:?}", path.as_ref()))
    }
}
