/// Error taxonomy of a backup run

use std::path::PathBuf;
use thiserror::Error;

use crate::core::metadata::SchemaAttempt;
use crate::core::transfer::ArtifactKind;

#[derive(Debug, Error)]
pub enum BackupError {
    #[error("failed to decode backup task descriptor")]
    Descriptor(#[source] serde_json::Error),

    #[error("unknown backup mode '{0}'")]
    UnknownMode(String),

    #[error("no container runtime client available")]
    NoRuntimeClient,

    #[error("failed to read metadata {}", .path.display())]
    ReadMetadata {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("metadata matches no known schema ({})", describe_attempts(.attempts))]
    UnrecognizedMetadata { attempts: Vec<SchemaAttempt> },

    #[error("unknown delivered kind '{0}'")]
    UnknownArtifactKind(String),

    #[error("failed to back up {kind} of service {service} version {version}")]
    Transfer {
        kind: ArtifactKind,
        service: String,
        version: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Application({service}) Backup build version failure")]
    ServiceExhausted { service: String },

    #[error("failed to back up volume {volume} of service {service}")]
    Volume {
        service: String,
        volume: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("failed to back up plugin {plugin} image {image}")]
    Plugin {
        plugin: String,
        image: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("failed to finalize backup: {step}")]
    Finalize {
        step: &'static str,
        #[source]
        source: anyhow::Error,
    },

    #[error("failed to persist backup status for {backup_id}")]
    Status {
        backup_id: String,
        #[source]
        source: anyhow::Error,
    },
}

pub type BackupResult<T> = std::result::Result<T, BackupError>;

fn describe_attempts(attempts: &[SchemaAttempt]) -> String {
    attempts
        .iter()
        .map(|a| a.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Render an error with its whole source chain on one line
pub fn error_chain(err: &dyn std::error::Error) -> String {
    let mut rendered = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        rendered.push_str(": ");
        rendered.push_str(&cause.to_string());
        source = cause.source();
    }
    rendered
}
