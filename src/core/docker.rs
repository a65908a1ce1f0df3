/// Docker engine integration
///
/// Implements registry operations (pull, tag, push, save, manifest lookup)
/// on top of the local Docker daemon.

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use bollard::auth::DockerCredentials;
use bollard::image::{CreateImageOptions, PushImageOptions, TagImageOptions};
use bollard::Docker;
use futures::StreamExt;
use std::path::Path;
use std::time::Duration;
use tokio::io::AsyncWriteExt;

use crate::core::reference::ImageReference;
use crate::core::registry::{PulledImage, RegistryAuth, RegistryClient};
use crate::utils::ensure_parent_dir;

/// Delay between retries of a failed pull or push
const RETRY_DELAY: Duration = Duration::from_secs(2);

#[derive(Clone)]
pub struct DockerRegistry {
    docker: Docker,
}

impl DockerRegistry {
    /// Connect to the local Docker daemon
    pub fn connect() -> Result<Self> {
        let docker = Docker::connect_with_local_defaults()
            .context("Failed to connect to Docker daemon. Is Docker running?")?;
        Ok(Self { docker })
    }

    /// Check if Docker daemon is accessible
    pub async fn check_docker(&self) -> bool {
        self.docker.ping().await.is_ok()
    }

    fn credentials(auth: &RegistryAuth) -> Option<DockerCredentials> {
        if auth.is_empty() {
            return None;
        }
        Some(DockerCredentials {
            username: Some(auth.username.clone()),
            password: Some(auth.password.clone()),
            serveraddress: (!auth.server.is_empty()).then(|| auth.server.clone()),
            ..Default::default()
        })
    }

    async fn pull_once(&self, reference: &str, credentials: Option<DockerCredentials>) -> Result<()> {
        let options = Some(CreateImageOptions {
            from_image: reference,
            ..Default::default()
        });

        let mut stream = self.docker.create_image(options, None, credentials);
        while let Some(item) = stream.next().await {
            let info = item.with_context(|| format!("Failed to pull image {}", reference))?;
            if let Some(error) = info.error {
                bail!("Failed to pull image {}: {}", reference, error);
            }
        }
        Ok(())
    }

    async fn push_once(&self, target: &ImageReference, credentials: Option<DockerCredentials>) -> Result<()> {
        let options = Some(PushImageOptions {
            tag: target.tag.clone(),
        });

        let mut stream = self
            .docker
            .push_image(&target.repository(), options, credentials);
        while let Some(item) = stream.next().await {
            let info = item.with_context(|| format!("Failed to push image {}", target))?;
            if let Some(error) = info.error {
                bail!("Failed to push image {}: {}", target, error);
            }
        }
        Ok(())
    }

    async fn image_size(&self, reference: &str) -> Result<u64> {
        let inspect = self
            .docker
            .inspect_image(reference)
            .await
            .with_context(|| format!("Failed to inspect image {}", reference))?;
        Ok(inspect.size.unwrap_or(0).max(0) as u64)
    }
}

#[async_trait]
impl RegistryClient for DockerRegistry {
    async fn pull(
        &self,
        reference: &str,
        auth: Option<&RegistryAuth>,
        attempts: u32,
    ) -> Result<PulledImage> {
        let credentials = auth.and_then(Self::credentials);
        let attempts = attempts.max(1);
        let mut last_error = None;

        for attempt in 1..=attempts {
            match self.pull_once(reference, credentials.clone()).await {
                Ok(()) => {
                    let size = self.image_size(reference).await?;
                    tracing::debug!(image = reference, size, "image pulled");
                    return Ok(PulledImage { size });
                }
                Err(e) => {
                    tracing::warn!(image = reference, attempt, attempts, "pull failed: {:#}", e);
                    last_error = Some(e);
                    if attempt < attempts {
                        tokio::time::sleep(RETRY_DELAY).await;
                    }
                }
            }
        }

        Err(last_error.unwrap_or_else(|| anyhow!("Failed to pull image {}", reference)))
    }

    async fn tag(&self, source: &str, target: &ImageReference) -> Result<()> {
        let options = Some(TagImageOptions {
            repo: target.repository(),
            tag: target.tag.clone(),
        });
        self.docker
            .tag_image(source, options)
            .await
            .with_context(|| format!("Failed to tag {} as {}", source, target))
    }

    async fn push(&self, target: &ImageReference, auth: &RegistryAuth, attempts: u32) -> Result<()> {
        let credentials = Self::credentials(auth);
        let attempts = attempts.max(1);
        let mut last_error = None;

        for attempt in 1..=attempts {
            match self.push_once(target, credentials.clone()).await {
                Ok(()) => return Ok(()),
                Err(e) => {
                    tracing::warn!(image = %target, attempt, attempts, "push failed: {:#}", e);
                    last_error = Some(e);
                    if attempt < attempts {
                        tokio::time::sleep(RETRY_DELAY).await;
                    }
                }
            }
        }

        Err(last_error.unwrap_or_else(|| anyhow!("Failed to push image {}", target)))
    }

    async fn trusted_push(
        &self,
        target: &ImageReference,
        auth: &RegistryAuth,
        attempts: u32,
    ) -> Result<()> {
        if auth.is_empty() {
            bail!("Trusted registry push of {} requires credentials", target);
        }
        self.push(target, auth, attempts).await?;

        // The trusted registry must serve the pushed manifest back to the
        // same credentials before the push counts.
        self.docker
            .inspect_registry_image(&target.to_string(), Self::credentials(auth))
            .await
            .with_context(|| format!("Trusted registry did not confirm {}", target))?;
        Ok(())
    }

    async fn save(&self, reference: &str, dst: &Path) -> Result<u64> {
        ensure_parent_dir(dst).await?;
        let mut file = tokio::fs::File::create(dst)
            .await
            .with_context(|| format!("Failed to create {}", dst.display()))?;

        let mut written: u64 = 0;
        let mut stream = self.docker.export_image(reference);
        while let Some(chunk) = stream.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(e) => {
                    drop(file);
                    let _ = tokio::fs::remove_file(dst).await;
                    return Err(e).with_context(|| format!("Failed to export image {}", reference));
                }
            };
            file.write_all(&chunk)
                .await
                .with_context(|| format!("Failed to write {}", dst.display()))?;
            written += chunk.len() as u64;
        }
        file.flush().await?;

        Ok(written)
    }

    async fn manifest(&self, reference: &ImageReference) -> Result<()> {
        self.docker
            .inspect_registry_image(&reference.to_string(), None)
            .await
            .with_context(|| {
                format!("Failed to get manifest of {}, it may not exist", reference)
            })?;
        Ok(())
    }
}
