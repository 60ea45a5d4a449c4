use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 8000;
pub const DEFAULT_DATABASE: &str = "bookshelf.db";
pub const DEFAULT_UPLOAD_DIR: &str = "./uploaded_books";
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 64 * 1024 * 1024;

/// Contents of `bookshelf.toml`. Every key is optional.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct BookshelfConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub database: Option<String>,
    pub upload_dir: Option<String>,
    pub max_upload_bytes: Option<usize>,
    /// Only apply the `date_published` list filter when `genre` is also set
    pub date_filter_requires_genre: Option<bool>,
}

/// Fully resolved settings the service runs with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub host: String,
    pub port: u16,
    pub database: PathBuf,
    pub upload_dir: PathBuf,
    pub max_upload_bytes: usize,
    pub date_filter_requires_genre: bool,
}

impl BookshelfConfig {
    /// Fill unset keys with defaults.
    pub fn resolve(self) -> Settings {
        Settings {
            host: self.host.unwrap_or_else(|| DEFAULT_HOST.to_string()),
            port: self.port.unwrap_or(DEFAULT_PORT),
            database: PathBuf::from(self.database.unwrap_or_else(|| DEFAULT_DATABASE.to_string())),
            upload_dir: PathBuf::from(self.upload_dir.unwrap_or_else(|| DEFAULT_UPLOAD_DIR.to_string())),
            max_upload_bytes: self.max_upload_bytes.unwrap_or(DEFAULT_MAX_UPLOAD_BYTES),
            date_filter_requires_genre: self.date_filter_requires_genre.unwrap_or(true),
        }
    }

    /// Config written by `bookshelf init`: every default spelled out.
    pub fn with_defaults() -> Self {
        Self {
            host: Some(DEFAULT_HOST.to_string()),
            port: Some(DEFAULT_PORT),
            database: Some(DEFAULT_DATABASE.to_string()),
            upload_dir: Some(DEFAULT_UPLOAD_DIR.to_string()),
            max_upload_bytes: Some(DEFAULT_MAX_UPLOAD_BYTES),
            date_filter_requires_genre: Some(true),
        }
    }
}

pub fn default_config_path() -> PathBuf {
    PathBuf::from("bookshelf.toml")
}

/// Comment block written above the keys by `bookshelf init`.
const CONFIG_HEADER: &str = "\
# Bookshelf configuration. Every key is optional; removing one restores its default.
#
# database / upload_dir: relative paths resolve against the working directory.
# max_upload_bytes: largest request body accepted, file included. Larger uploads get 413.
# date_filter_requires_genre: when true, GET /books ignores `date_published`
#   unless `genre` is also given. Set to false to filter by date on its own.

";

pub fn load_config(path: Option<&Path>) -> anyhow::Result<Option<BookshelfConfig>> {
    let path = path.map(Path::to_path_buf).unwrap_or_else(default_config_path);
    if !path.exists() {
        return Ok(None);
    }

    let contents = std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let config: BookshelfConfig = toml::from_str(&contents)
        .with_context(|| format!("invalid config in {}", path.display()))?;
    if config.max_upload_bytes == Some(0) {
        anyhow::bail!("{}: max_upload_bytes must be greater than zero", path.display());
    }
    Ok(Some(config))
}

pub fn write_config(path: &Path, config: &BookshelfConfig, force: bool) -> anyhow::Result<()> {
    if path.exists() && !force {
        anyhow::bail!("config already exists at {} (use --force to overwrite)", path.display());
    }

    let contents = format!("{CONFIG_HEADER}{}", toml::to_string_pretty(config)?);
    std::fs::write(path, contents)?;
    Ok(())
}

/// Create the database's parent directory and the upload directory.
pub fn prepare_dirs(settings: &Settings) -> anyhow::Result<()> {
    if let Some(parent) = settings.database.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
    }
    std::fs::create_dir_all(&settings.upload_dir)
        .with_context(|| format!("failed to create {}", settings.upload_dir.display()))?;
    Ok(())
}
