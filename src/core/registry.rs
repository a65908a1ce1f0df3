/// Container registry operations used by the backup worker

use anyhow::Result;
use async_trait::async_trait;
use std::path::Path;

use crate::core::reference::ImageReference;

/// Credentials for a registry push or pull
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegistryAuth {
    pub username: String,
    pub password: String,
    pub server: String,
}

impl RegistryAuth {
    pub fn is_empty(&self) -> bool {
        self.username.is_empty() && self.password.is_empty()
    }
}

/// Result of a successful pull
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PulledImage {
    /// Size reported by the runtime for the pulled image
    pub size: u64,
}

#[async_trait]
pub trait RegistryClient: Send + Sync {
    /// Pull an image, retrying up to `attempts` times
    async fn pull(&self, reference: &str, auth: Option<&RegistryAuth>, attempts: u32)
        -> Result<PulledImage>;

    /// Tag a local image under another reference
    async fn tag(&self, source: &str, target: &ImageReference) -> Result<()>;

    /// Plain authenticated push
    async fn push(&self, target: &ImageReference, auth: &RegistryAuth, attempts: u32) -> Result<()>;

    /// Push to a registry that requires the trusted path
    async fn trusted_push(
        &self,
        target: &ImageReference,
        auth: &RegistryAuth,
        attempts: u32,
    ) -> Result<()>;

    /// Export an image to a tar file, returning the bytes written
    async fn save(&self, reference: &str, dst: &Path) -> Result<u64>;

    /// Fetch the manifest of a reference from its registry; fails when the
    /// image does not exist there
    async fn manifest(&self, reference: &ImageReference) -> Result<()>;
}
