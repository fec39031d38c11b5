use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct MapkeeperConfig {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub blobs: BlobConfig,
    pub reset: ResetConfig,
    pub backup: BackupConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub log_level: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StorageConfig {
    pub db_path: String,
}

/// Where screenshot and image files live.
///
/// `backend = "local"` treats `root` as the bucket directory; `backend = "http"`
/// talks to an object-storage REST API at `base_url` using `service_key`.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct BlobConfig {
    pub backend: String,
    pub bucket: String,
    pub root: String,
    pub base_url: String,
    pub service_key: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ResetConfig {
    /// Wrap the row-deletion phase in a savepoint so a failing step undoes the earlier ones.
    pub transactional: bool,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct BackupConfig {
    pub folder: String,
    pub max_stored_backups: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 8787,
            log_level: "info".into(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        let db_path = default_mapkeeper_dir()
            .join("atlas.db")
            .to_string_lossy()
            .into_owned();
        Self { db_path }
    }
}

impl Default for BlobConfig {
    fn default() -> Self {
        let root = default_mapkeeper_dir()
            .join("blobs")
            .to_string_lossy()
            .into_owned();
        Self {
            backend: "local".into(),
            bucket: "screenshots".into(),
            root,
            base_url: String::new(),
            service_key: String::new(),
        }
    }
}

impl Default for ResetConfig {
    fn default() -> Self {
        Self {
            transactional: true,
        }
    }
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            folder: "backups".into(),
            max_stored_backups: 5,
        }
    }
}

/// Returns `~/.mapkeeper/`
pub fn default_mapkeeper_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".mapkeeper")
}

/// Returns the default config file path: `~/.mapkeeper/config.toml`
pub fn default_config_path() -> PathBuf {
    default_mapkeeper_dir().join("config.toml")
}

impl MapkeeperConfig {
    /// Load config from TOML file (if it exists) then apply env var overrides.
    pub fn load() -> Result<Self> {
        Self::load_from(default_config_path())
    }

    /// Load from a specific path, then apply env var overrides.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut config = if path.exists() {
            let contents =
                std::fs::read_to_string(path).context("failed to read config file")?;
            toml::from_str(&contents).context("failed to parse config TOML")?
        } else {
            info!("no config file at {}, using defaults", path.display());
            MapkeeperConfig::default()
        };

        config.apply_env_overrides()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(val) = std::env::var("MAPKEEPER_HOST") {
            self.server.host = val;
        }
        if let Ok(val) = std::env::var("MAPKEEPER_PORT") {
            self.server.port = val
                .parse()
                .with_context(|| format!("MAPKEEPER_PORT is not a port number: {val}"))?;
        }
        if let Ok(val) = std::env::var("MAPKEEPER_LOG_LEVEL") {
            self.server.log_level = val;
        }
        if let Ok(val) = std::env::var("MAPKEEPER_DB") {
            self.storage.db_path = val;
        }
        if let Ok(val) = std::env::var("MAPKEEPER_BLOB_BACKEND") {
            self.blobs.backend = val;
        }
        if let Ok(val) = std::env::var("MAPKEEPER_BLOB_ROOT") {
            self.blobs.root = val;
        }
        if let Ok(val) = std::env::var("MAPKEEPER_STORAGE_URL") {
            self.blobs.base_url = val;
        }
        if let Ok(val) = std::env::var("MAPKEEPER_SERVICE_KEY") {
            self.blobs.service_key = val;
        }
        Ok(())
    }

    /// Resolve the database path, expanding `~` if needed.
    pub fn resolved_db_path(&self) -> PathBuf {
        expand_tilde(&self.storage.db_path)
    }

    /// Resolve the local blob root, expanding `~` if needed.
    pub fn resolved_blob_root(&self) -> PathBuf {
        expand_tilde(&self.blobs.root)
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

pub fn expand_tilde(path: &str) -> PathBuf {
    match (path.strip_prefix("~/"), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(path),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = MapkeeperConfig::default();
        assert_eq!(config.server.port, 8787);
        assert_eq!(config.server.log_level, "info");
        assert_eq!(config.blobs.backend, "local");
        assert_eq!(config.blobs.bucket, "screenshots");
        assert!(config.reset.transactional);
        assert_eq!(config.backup.max_stored_backups, 5);
        assert!(config.storage.db_path.ends_with("atlas.db"));
    }

    #[test]
    fn parse_toml_config() {
        let toml_str = r#"
[server]
log_level = "debug"
port = 9000

[storage]
db_path = "/tmp/test.db"

[blobs]
backend = "http"
base_url = "https://storage.example.com"

[reset]
transactional = false
"#;
        let config: MapkeeperConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.server.log_level, "debug");
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.storage.db_path, "/tmp/test.db");
        assert_eq!(config.blobs.backend, "http");
        assert_eq!(config.blobs.base_url, "https://storage.example.com");
        assert!(!config.reset.transactional);
        // defaults still apply for unset fields
        assert_eq!(config.blobs.bucket, "screenshots");
        assert_eq!(config.backup.folder, "backups");
        assert_eq!(config.server.host, "127.0.0.1");
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let tmp = tempfile::TempDir::new().unwrap();
        let config = MapkeeperConfig::load_from(tmp.path().join("absent.toml")).unwrap();
        assert_eq!(config.blobs.bucket, "screenshots");
    }

    #[test]
    fn env_overrides_apply() {
        let mut config = MapkeeperConfig::default();
        std::env::set_var("MAPKEEPER_DB", "/tmp/override.db");
        std::env::set_var("MAPKEEPER_BLOB_ROOT", "/tmp/blobs");
        std::env::set_var("MAPKEEPER_LOG_LEVEL", "trace");

        config.apply_env_overrides().unwrap();

        assert_eq!(config.storage.db_path, "/tmp/override.db");
        assert_eq!(config.blobs.root, "/tmp/blobs");
        assert_eq!(config.server.log_level, "trace");

        // Clean up
        std::env::remove_var("MAPKEEPER_DB");
        std::env::remove_var("MAPKEEPER_BLOB_ROOT");
        std::env::remove_var("MAPKEEPER_LOG_LEVEL");
    }

    #[test]
    fn expand_tilde_leaves_absolute_paths() {
        assert_eq!(expand_tilde("/var/data"), PathBuf::from("/var/data"));
    }
}
