/// Backup task descriptor and per-run task state

use serde::{Deserialize, Deserializer};
use std::path::PathBuf;

use crate::core::error::{BackupError, BackupResult};
use crate::core::registry::RegistryAuth;
use crate::core::remote::RemoteTarget;
use crate::utils::{strip_trailing_separator, MODE_FULL_OFFLINE, MODE_FULL_ONLINE};

/// Task descriptor as dispatched by the scheduler
#[derive(Debug, Clone, Deserialize)]
pub struct TaskDescriptor {
    pub group_id: String,
    #[serde(default)]
    pub service_ids: Vec<String>,
    pub mode: String,
    pub version: String,
    #[serde(default)]
    pub event_id: String,
    #[serde(default)]
    pub slug_info: SlugInfo,
    #[serde(default)]
    pub image_info: ImageInfo,
    pub source_dir: String,
    #[serde(default)]
    pub source_type: String,
    pub backup_id: String,
}

/// Transfer endpoint credentials
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SlugInfo {
    #[serde(default)]
    pub namespace: String,
    #[serde(default, alias = "ftp_host")]
    pub host: String,
    #[serde(default, alias = "ftp_port", deserialize_with = "string_or_number")]
    pub port: String,
    #[serde(default, alias = "ftp_username")]
    pub user: String,
    #[serde(default, alias = "ftp_password")]
    pub password: String,
}

/// Image hub credentials
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ImageInfo {
    #[serde(default)]
    pub hub_url: String,
    #[serde(default)]
    pub hub_user: String,
    #[serde(default)]
    pub hub_password: String,
    #[serde(default)]
    pub namespace: String,
    #[serde(default)]
    pub is_trust: bool,
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Port {
        Text(String),
        Number(u64),
    }

    Ok(match Port::deserialize(deserializer)? {
        Port::Text(s) => s,
        Port::Number(n) => n.to_string(),
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackupMode {
    /// `full-offline`: everything lands in the local archive
    Local,
    /// `full-online`: artifacts and archive are pushed out when the
    /// matching endpoint is configured
    Remote,
}

impl BackupMode {
    pub fn parse(mode: &str) -> BackupResult<Self> {
        match mode {
            MODE_FULL_ONLINE => Ok(BackupMode::Remote),
            MODE_FULL_OFFLINE => Ok(BackupMode::Local),
            other => Err(BackupError::UnknownMode(other.to_string())),
        }
    }
}

/// Where slugs and the finished archive go
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackupDestination {
    Local,
    Remote(RemoteTarget),
}

/// Registry hub receiving backup images
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HubTarget {
    pub hub_url: String,
    pub namespace: String,
    pub auth: RegistryAuth,
    pub trusted: bool,
}

/// Where images go
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageDestination {
    Local,
    Hub(HubTarget),
}

/// Mutable state of one backup run
#[derive(Debug, Clone)]
pub struct BackupTask {
    pub group_id: String,
    pub service_ids: Vec<String>,
    pub mode: BackupMode,
    pub version: String,
    pub event_id: String,
    pub backup_id: String,
    pub destination: BackupDestination,
    pub image_destination: ImageDestination,
    /// Working directory first, then the archive location
    pub source_dir: String,
    pub source_type: String,
    /// Bytes moved so far
    pub backup_size: u64,
}

impl BackupTask {
    pub fn from_descriptor(raw: &[u8]) -> BackupResult<Self> {
        let descriptor: TaskDescriptor =
            serde_json::from_slice(raw).map_err(BackupError::Descriptor)?;
        Self::from_parsed(descriptor)
    }

    pub fn from_parsed(descriptor: TaskDescriptor) -> BackupResult<Self> {
        let mode = BackupMode::parse(&descriptor.mode)?;

        let remote = RemoteTarget {
            namespace: descriptor.slug_info.namespace,
            host: descriptor.slug_info.host,
            port: descriptor.slug_info.port,
            user: descriptor.slug_info.user,
            password: descriptor.slug_info.password,
        };
        let destination = match mode {
            BackupMode::Remote if remote.is_configured() => BackupDestination::Remote(remote),
            _ => BackupDestination::Local,
        };

        let image = descriptor.image_info;
        let image_destination = match mode {
            BackupMode::Remote if !image.hub_url.is_empty() => ImageDestination::Hub(HubTarget {
                auth: RegistryAuth {
                    username: image.hub_user,
                    password: image.hub_password,
                    server: image.hub_url.clone(),
                },
                hub_url: image.hub_url,
                namespace: image.namespace,
                trusted: image.is_trust,
            }),
            _ => ImageDestination::Local,
        };

        Ok(Self {
            group_id: descriptor.group_id,
            service_ids: descriptor.service_ids,
            mode,
            version: descriptor.version,
            event_id: descriptor.event_id,
            backup_id: descriptor.backup_id,
            destination,
            image_destination,
            source_dir: descriptor.source_dir,
            source_type: descriptor.source_type,
            backup_size: 0,
        })
    }

    /// Working directory with one trailing separator removed
    pub fn source_path(&self) -> PathBuf {
        PathBuf::from(strip_trailing_separator(&self.source_dir))
    }

    /// Remote directory of this backup: `{namespace}/backup/{group}_{version}`
    pub fn remote_root(&self, target: &RemoteTarget) -> String {
        format!("{}/backup/{}_{}", target.namespace, self.group_id, self.version)
    }

    pub fn add_size(&mut self, bytes: u64) {
        self.backup_size += bytes;
    }
}
