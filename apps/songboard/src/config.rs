//! Configuration module for songboard.
//!
//! Loads configuration from `config.toml` with environment variable overrides.

use config::{Config as ConfigLoader, Environment, File};
use serde::Deserialize;
use std::path::PathBuf;

use crate::error::AppError;

/// Main application configuration
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub catalog: CatalogConfig,
    #[serde(default)]
    pub sync: SyncConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Origins allowed by CORS. Empty means same-origin only.
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origins: Vec::new(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

/// Database configuration
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./data/songboard.db")
}

/// External music catalog (iTunes Search API) configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CatalogConfig {
    #[serde(default = "default_catalog_url")]
    pub base_url: String,
    /// Two-letter storefront code sent with every request.
    #[serde(default = "default_country")]
    pub country: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Minimum spacing between catalog requests, 0 disables spacing.
    #[serde(default)]
    pub rate_limit_ms: u64,
    /// Edge length in pixels that artwork URLs are upgraded to.
    #[serde(default = "default_artwork_size")]
    pub artwork_size: u32,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            base_url: default_catalog_url(),
            country: default_country(),
            timeout_secs: default_timeout_secs(),
            rate_limit_ms: 0,
            artwork_size: default_artwork_size(),
        }
    }
}

fn default_catalog_url() -> String {
    "https://itunes.apple.com".to_string()
}

fn default_country() -> String {
    "US".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_artwork_size() -> u32 {
    600
}

/// Import and sync tuning
#[derive(Debug, Clone, Deserialize)]
pub struct SyncConfig {
    /// Tracks written concurrently per batch during an album import.
    #[serde(default = "default_track_batch_size")]
    pub track_batch_size: usize,
    /// Catalog lookups issued concurrently per batch during sync.
    #[serde(default = "default_fetch_batch_size")]
    pub fetch_batch_size: usize,
    /// Albums requested per artist when building a sync preview.
    #[serde(default = "default_album_limit")]
    pub album_limit: u32,
    /// Most recent albums imported per artist by sync-all.
    #[serde(default = "default_recent_album_limit")]
    pub recent_album_limit: u32,
    /// Cron expression (with seconds) for the scheduled sync-all run.
    #[serde(default)]
    pub schedule: Option<String>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            track_batch_size: default_track_batch_size(),
            fetch_batch_size: default_fetch_batch_size(),
            album_limit: default_album_limit(),
            recent_album_limit: default_recent_album_limit(),
            schedule: None,
        }
    }
}

fn default_track_batch_size() -> usize {
    10
}

fn default_fetch_batch_size() -> usize {
    5
}

fn default_album_limit() -> u32 {
    200
}

fn default_recent_album_limit() -> u32 {
    5
}

impl Config {
    /// Load configuration from file and environment variables.
    ///
    /// Configuration is loaded in the following order (later sources override earlier):
    /// 1. Default values
    /// 2. `config.toml` in current directory (optional)
    /// 3. Environment variables with `SONGBOARD_` prefix
    ///
    /// Environment variables use double underscore for nesting:
    /// - `SONGBOARD_SERVER__PORT=9000` sets `server.port`
    /// - `SONGBOARD_SYNC__SCHEDULE="0 0 4 * * *"` sets `sync.schedule`
    pub fn load() -> Result<Self, AppError> {
        Self::load_from("config.toml")
    }

    /// Load configuration from a specific file path.
    pub fn load_from(config_path: &str) -> Result<Self, AppError> {
        let config = ConfigLoader::builder()
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8080)?
            .set_default("database.path", "./data/songboard.db")?
            .set_default("catalog.base_url", "https://itunes.apple.com")?
            .set_default("catalog.country", "US")?
            .set_default("sync.track_batch_size", 10)?
            .set_default("sync.fetch_batch_size", 5)?
            .add_source(File::with_name(config_path).required(false))
            // SONGBOARD_SERVER__PORT=9000 -> server.port = 9000
            .add_source(
                Environment::with_prefix("SONGBOARD")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: Config = config.try_deserialize()?;
        config.validate()?;

        Ok(config)
    }

    fn validate(&self) -> Result<(), AppError> {
        if self.sync.track_batch_size == 0 || self.sync.fetch_batch_size == 0 {
            return Err(AppError::Config(config::ConfigError::Message(
                "sync batch sizes must be at least 1".to_string(),
            )));
        }

        if self.catalog.base_url.trim().is_empty() {
            return Err(AppError::Config(config::ConfigError::Message(
                "catalog.base_url cannot be empty".to_string(),
            )));
        }

        if self.sync.schedule.is_none() {
            tracing::debug!("No sync schedule configured - sync-all runs on demand only");
        }

        Ok(())
    }

    /// Get the server socket address
    pub fn server_addr(&self) -> std::net::SocketAddr {
        use std::net::{IpAddr, Ipv4Addr, SocketAddr};
        let ip: IpAddr = self.server.host.parse().unwrap_or_else(|_| {
            tracing::warn!("Invalid host '{}', using 0.0.0.0", self.server.host);
            IpAddr::V4(Ipv4Addr::UNSPECIFIED)
        });
        SocketAddr::new(ip, self.server.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = Config::load_from("nonexistent.toml").unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.database.path, PathBuf::from("./data/songboard.db"));
        assert_eq!(config.catalog.base_url, "https://itunes.apple.com");
        assert_eq!(config.catalog.artwork_size, 600);
    }

    #[test]
    fn test_sync_defaults() {
        let config = Config::load_from("nonexistent.toml").unwrap();
        assert_eq!(config.sync.track_batch_size, 10);
        assert_eq!(config.sync.fetch_batch_size, 5);
        assert_eq!(config.sync.recent_album_limit, 5);
        assert!(config.sync.schedule.is_none());
    }

    #[test]
    fn test_server_addr() {
        let config = Config::load_from("nonexistent.toml").unwrap();
        let addr = config.server_addr();
        assert_eq!(addr.port(), 8080);
    }

    #[test]
    fn test_invalid_host_falls_back() {
        let mut config = Config::default();
        config.server.host = "not-an-ip".to_string();
        assert!(config.server_addr().ip().is_unspecified());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("songboard.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(
            file,
            "[catalog]\ncountry = \"GB\"\n\n[sync]\ntrack_batch_size = 3\nschedule = \"0 0 4 * * *\""
        )
        .unwrap();

        let config = Config::load_from(path.to_str().unwrap()).unwrap();
        assert_eq!(config.catalog.country, "GB");
        assert_eq!(config.sync.track_batch_size, 3);
        assert_eq!(config.sync.schedule.as_deref(), Some("0 0 4 * * *"));
    }

    #[test]
    fn test_zero_batch_size_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "[sync]\ntrack_batch_size = 0\n").unwrap();

        assert!(Config::load_from(path.to_str().unwrap()).is_err());
    }
}
