/// Worker configuration management
/// Stores worker settings in ~/.config/groupapp-backup/config.toml

use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::utils::constants::*;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Successful versions transferred per service before moving on
    pub max_backup_versions: usize,
    /// Root of the shared per-tenant service data
    pub share_data_path: PathBuf,
    /// Directory holding persisted backup status records
    pub status_dir: PathBuf,
    pub image_pull_attempts: u32,
    pub plugin_pull_attempts: u32,
    pub image_push_attempts: u32,
    /// URL scheme of the remote transfer endpoint
    pub transfer_scheme: String,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            max_backup_versions: DEFAULT_MAX_BACKUP_VERSIONS,
            share_data_path: PathBuf::from(DEFAULT_SHARE_DATA_PATH),
            status_dir: default_status_dir(),
            image_pull_attempts: DEFAULT_IMAGE_PULL_ATTEMPTS,
            plugin_pull_attempts: DEFAULT_PLUGIN_PULL_ATTEMPTS,
            image_push_attempts: DEFAULT_IMAGE_PUSH_ATTEMPTS,
            transfer_scheme: "http".to_string(),
        }
    }
}

fn default_status_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("groupapp-backup")
        .join("status")
}

impl WorkerConfig {
    /// Get config file path
    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Could not determine the user config directory")?
            .join("groupapp-backup");
        Ok(config_dir.join("config.toml"))
    }

    /// Load configuration from the default location
    pub fn load() -> Result<Self> {
        Self::load_from(Self::config_path()?)
    }

    /// Load configuration from a file, falling back to defaults when the
    /// file does not exist. Environment overrides are applied last.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let mut config = if path.exists() {
            let contents = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            toml::from_str(&contents)
                .with_context(|| format!("Failed to parse config file {}", path.display()))?
        } else {
            Self::default()
        };

        config.apply_env();
        Ok(config)
    }

    fn apply_env(&mut self) {
        if let Some(path) = non_empty_env(SHARE_DATA_PATH_ENV) {
            self.share_data_path = PathBuf::from(path);
        }
    }

    /// Shared data directory of one service
    pub fn service_data_dir(&self, tenant_id: &str, service_id: &str) -> PathBuf {
        self.share_data_path
            .join("tenant")
            .join(tenant_id)
            .join("service")
            .join(service_id)
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}
