/// Application snapshot model and metadata format detection
///
/// The API writes `region_apps_metadata.json` in one of two layouts:
/// a bare list of service snapshots (legacy) or an object carrying
/// services, plugins and plugin build versions (structured). Nothing in the
/// payload names the layout, so detection is structural: decoders are tried
/// in order and the first success wins.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

use crate::core::error::{BackupError, BackupResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MetadataVersion {
    /// Bare list of service snapshots
    Old,
    /// Object with services, plugins and plugin build versions
    New,
}

impl fmt::Display for MetadataVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetadataVersion::Old => f.write_str("legacy"),
            MetadataVersion::New => f.write_str("structured"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppSnapshot {
    pub services: Vec<ServiceSnapshot>,
    #[serde(default)]
    pub plugins: Vec<Plugin>,
    #[serde(default)]
    pub plugin_build_versions: Vec<PluginBuildVersion>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceSnapshot {
    pub service_id: String,
    pub service: ServiceIdentity,
    #[serde(default)]
    pub versions: Vec<VersionRecord>,
    #[serde(default, rename = "service_volume")]
    pub volumes: Vec<VolumeRecord>,
    /// Ports, env, labels, health checks and other relations, carried untouched
    #[serde(flatten)]
    pub relations: Map<String, Value>,
}

impl ServiceSnapshot {
    /// Human-facing name used in events
    pub fn display_name(&self) -> &str {
        if self.service.service_alias.is_empty() {
            &self.service_id
        } else {
            &self.service.service_alias
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceIdentity {
    pub tenant_id: String,
    pub service_id: String,
    #[serde(default)]
    pub service_alias: String,
    #[serde(default)]
    pub service_name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VersionStatus {
    Success,
    Failure,
    Lost,
    /// Builds still running or any status this worker does not act on
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionRecord {
    /// `image` or `slug`
    pub delivered_type: String,
    /// Image reference or slug file path
    pub delivered_path: String,
    pub final_status: VersionStatus,
    pub build_version: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VolumeRecord {
    pub volume_name: String,
    #[serde(default)]
    pub host_path: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plugin {
    pub plugin_id: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginBuildVersion {
    pub plugin_id: String,
    pub deploy_version: String,
    pub build_local_image: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A snapshot together with the layout it was decoded from
#[derive(Debug, Clone)]
pub struct ResolvedMetadata {
    pub version: MetadataVersion,
    pub snapshot: AppSnapshot,
}

/// One failed decode attempt
#[derive(Debug)]
pub struct SchemaAttempt {
    pub version: MetadataVersion,
    pub error: serde_json::Error,
}

impl fmt::Display for SchemaAttempt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.version, self.error)
    }
}

type Decoder = fn(&[u8]) -> Result<AppSnapshot, serde_json::Error>;

/// Structured first: it is what current API versions write.
const DECODERS: [(MetadataVersion, Decoder); 2] = [
    (MetadataVersion::New, decode_structured),
    (MetadataVersion::Old, decode_legacy),
];

fn decode_structured(blob: &[u8]) -> Result<AppSnapshot, serde_json::Error> {
    serde_json::from_slice(blob)
}

fn decode_legacy(blob: &[u8]) -> Result<AppSnapshot, serde_json::Error> {
    let services: Vec<ServiceSnapshot> = serde_json::from_slice(blob)?;
    Ok(AppSnapshot {
        services,
        plugins: Vec::new(),
        plugin_build_versions: Vec::new(),
    })
}

/// Decode a metadata blob with the first schema that accepts it
pub fn resolve(blob: &[u8]) -> BackupResult<ResolvedMetadata> {
    let mut attempts = Vec::with_capacity(DECODERS.len());

    for (version, decode) in DECODERS {
        match decode(blob) {
            Ok(snapshot) => return Ok(ResolvedMetadata { version, snapshot }),
            Err(error) => attempts.push(SchemaAttempt { version, error }),
        }
    }

    Err(BackupError::UnrecognizedMetadata { attempts })
}

/// Classify a metadata blob without keeping the decoded snapshot
pub fn classify(blob: &[u8]) -> BackupResult<MetadataVersion> {
    resolve(blob).map(|resolved| resolved.version)
}
