/// Per-artifact transfer: {image, slug} × {local, remote}
///
/// Local transfers land inside the working directory and are accounted for
/// by the final archive size. Remote transfers report their own size.

use anyhow::{Context, Result};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::core::error::BackupError;
use crate::core::metadata::VersionRecord;
use crate::core::reference::ImageReference;
use crate::core::registry::RegistryClient;
use crate::core::remote::{push_scoped, RemoteTarget, TransferClient};
use crate::core::task::{BackupDestination, BackupTask, HubTarget, ImageDestination};
use crate::utils::{copy_file, ensure_parent_dir, format_bytes};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    Image,
    Slug,
}

impl FromStr for ArtifactKind {
    type Err = BackupError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "image" => Ok(ArtifactKind::Image),
            "slug" => Ok(ArtifactKind::Slug),
            other => Err(BackupError::UnknownArtifactKind(other.to_string())),
        }
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArtifactKind::Image => f.write_str("image"),
            ArtifactKind::Slug => f.write_str("slug"),
        }
    }
}

/// The transfer chosen for one artifact
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferPlan<'a> {
    SlugToLocal,
    SlugToRemote(&'a RemoteTarget),
    ImageToLocal,
    ImageToHub(&'a HubTarget),
}

impl<'a> TransferPlan<'a> {
    pub fn for_artifact(kind: ArtifactKind, task: &'a BackupTask) -> Self {
        match (kind, &task.destination, &task.image_destination) {
            (ArtifactKind::Slug, BackupDestination::Remote(target), _) => {
                TransferPlan::SlugToRemote(target)
            }
            (ArtifactKind::Slug, BackupDestination::Local, _) => TransferPlan::SlugToLocal,
            (ArtifactKind::Image, _, ImageDestination::Hub(hub)) => TransferPlan::ImageToHub(hub),
            (ArtifactKind::Image, _, ImageDestination::Local) => TransferPlan::ImageToLocal,
        }
    }
}

/// Local path of a service artifact inside the working directory
pub fn local_artifact_path(
    source_dir: &Path,
    service_id: &str,
    kind: ArtifactKind,
    build_version: &str,
) -> PathBuf {
    let file = match kind {
        ArtifactKind::Slug => format!("slug_{}.tgz", build_version),
        ArtifactKind::Image => format!("image_{}.tar", build_version),
    };
    source_dir.join(format!("app_{}", service_id)).join(file)
}

pub struct TransferStrategy<'a> {
    registry: &'a dyn RegistryClient,
    transfer: &'a dyn TransferClient,
    pull_attempts: u32,
    push_attempts: u32,
}

impl<'a> TransferStrategy<'a> {
    pub fn new(
        registry: &'a dyn RegistryClient,
        transfer: &'a dyn TransferClient,
        pull_attempts: u32,
        push_attempts: u32,
    ) -> Self {
        Self {
            registry,
            transfer,
            pull_attempts,
            push_attempts,
        }
    }

    /// Move one version's artifact to its destination.
    ///
    /// Returns the bytes to add to the running total: the pushed size for
    /// remote transfers, zero for local ones.
    pub async fn transfer(
        &self,
        task: &BackupTask,
        service_id: &str,
        version: &VersionRecord,
        kind: ArtifactKind,
    ) -> Result<u64, BackupError> {
        let result = match TransferPlan::for_artifact(kind, task) {
            TransferPlan::SlugToRemote(target) => {
                self.slug_to_remote(task, target, service_id, version).await
            }
            TransferPlan::SlugToLocal => self.slug_to_local(task, service_id, version).await,
            TransferPlan::ImageToHub(hub) => self.image_to_hub(task, hub, version).await,
            TransferPlan::ImageToLocal => self.image_to_local(task, service_id, version).await,
        };

        result.map_err(|source| BackupError::Transfer {
            kind,
            service: service_id.to_string(),
            version: version.build_version.clone(),
            source,
        })
    }

    async fn slug_to_remote(
        &self,
        task: &BackupTask,
        target: &RemoteTarget,
        service_id: &str,
        version: &VersionRecord,
    ) -> Result<u64> {
        let remote_path = format!(
            "{}/app_{}/{}.tgz",
            task.remote_root(target),
            service_id,
            version.build_version
        );
        let size = push_scoped(
            self.transfer,
            target,
            Path::new(&version.delivered_path),
            &remote_path,
        )
        .await?;
        tracing::info!(service = service_id, remote = %remote_path, size = %format_bytes(size), "slug pushed");
        Ok(size)
    }

    async fn slug_to_local(
        &self,
        task: &BackupTask,
        service_id: &str,
        version: &VersionRecord,
    ) -> Result<u64> {
        let dst = local_artifact_path(
            &task.source_path(),
            service_id,
            ArtifactKind::Slug,
            &version.build_version,
        );
        ensure_parent_dir(&dst).await?;
        copy_file(&version.delivered_path, &dst).await?;
        Ok(0)
    }

    async fn image_to_hub(
        &self,
        task: &BackupTask,
        hub: &HubTarget,
        version: &VersionRecord,
    ) -> Result<u64> {
        let source = ImageReference::parse(&version.delivered_path)
            .context("Failed to create backup image reference")?;
        let backup = source.backup_reference(
            &hub.hub_url,
            &hub.namespace,
            &version.build_version,
            &task.version,
        );

        let pulled = self
            .registry
            .pull(&version.delivered_path, None, self.pull_attempts)
            .await
            .context("Failed to pull image for backup")?;
        self.registry
            .tag(&version.delivered_path, &backup)
            .await
            .context("Failed to tag backup image")?;

        if hub.trusted {
            self.registry
                .trusted_push(&backup, &hub.auth, self.push_attempts)
                .await
                .context("Failed to push backup image")?;
        } else {
            self.registry
                .push(&backup, &hub.auth, self.push_attempts)
                .await
                .context("Failed to push backup image")?;
        }

        tracing::info!(image = %backup, size = %format_bytes(pulled.size), "image pushed");
        Ok(pulled.size)
    }

    async fn image_to_local(
        &self,
        task: &BackupTask,
        service_id: &str,
        version: &VersionRecord,
    ) -> Result<u64> {
        let dst = local_artifact_path(
            &task.source_path(),
            service_id,
            ArtifactKind::Image,
            &version.build_version,
        );
        ensure_parent_dir(&dst).await?;
        self.registry
            .save(&version.delivered_path, &dst)
            .await
            .context("Failed to save image to local dir")?;
        Ok(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::metadata::VersionStatus;
    use crate::core::remote::testing::MemoryTransfer;
    use crate::core::testing::{FakeRegistry, RegistryCall};
    use serde_json::Map;
    use tempfile::TempDir;

    fn task(source_dir: &Path, mode: &str, slug: bool, hub: bool, trusted: bool) -> BackupTask {
        let raw = serde_json::json!({
            "group_id": "g1",
            "mode": mode,
            "version": "v1",
            "slug_info": if slug {
                serde_json::json!({"namespace": "team", "host": "10.0.0.5", "port": "8080"})
            } else {
                serde_json::json!({})
            },
            "image_info": if hub {
                serde_json::json!({"hub_url": "hub.example.com", "namespace": "bk",
                                   "hub_user": "u", "hub_password": "p", "is_trust": trusted})
            } else {
                serde_json::json!({})
            },
            "source_dir": format!("{}/", source_dir.display()),
            "backup_id": "b1"
        });
        BackupTask::from_descriptor(raw.to_string().as_bytes()).unwrap()
    }

    fn version(kind: &str, path: &str) -> VersionRecord {
        VersionRecord {
            delivered_type: kind.to_string(),
            delivered_path: path.to_string(),
            final_status: VersionStatus::Success,
            build_version: "20240101".to_string(),
            extra: Map::new(),
        }
    }

    #[test]
    fn test_artifact_kind_parse() {
        assert_eq!("image".parse::<ArtifactKind>().unwrap(), ArtifactKind::Image);
        assert_eq!("slug".parse::<ArtifactKind>().unwrap(), ArtifactKind::Slug);
        assert!(matches!(
            "helm".parse::<ArtifactKind>(),
            Err(BackupError::UnknownArtifactKind(_))
        ));
    }

    #[test]
    fn test_plan_matrix() {
        let dir = TempDir::new().unwrap();
        let online = task(dir.path(), "full-online", true, true, false);
        assert!(matches!(
            TransferPlan::for_artifact(ArtifactKind::Slug, &online),
            TransferPlan::SlugToRemote(_)
        ));
        assert!(matches!(
            TransferPlan::for_artifact(ArtifactKind::Image, &online),
            TransferPlan::ImageToHub(_)
        ));

        let offline = task(dir.path(), "full-offline", true, true, false);
        assert_eq!(
            TransferPlan::for_artifact(ArtifactKind::Slug, &offline),
            TransferPlan::SlugToLocal
        );
        assert_eq!(
            TransferPlan::for_artifact(ArtifactKind::Image, &offline),
            TransferPlan::ImageToLocal
        );

        let hub_only = task(dir.path(), "full-online", false, true, false);
        assert_eq!(
            TransferPlan::for_artifact(ArtifactKind::Slug, &hub_only),
            TransferPlan::SlugToLocal
        );
    }

    #[tokio::test]
    async fn test_local_and_remote_slug_content_match() {
        let dir = TempDir::new().unwrap();
        let slug = dir.path().join("build.tgz");
        std::fs::write(&slug, b"slug-content-123").unwrap();
        let work = dir.path().join("work");

        let registry = FakeRegistry::default();
        let transfer = MemoryTransfer::default();
        let strategy = TransferStrategy::new(&registry, &transfer, 1, 1);
        let record = version("slug", slug.to_str().unwrap());

        let offline = task(&work, "full-offline", true, false, false);
        let counted = strategy
            .transfer(&offline, "s1", &record, ArtifactKind::Slug)
            .await
            .unwrap();
        assert_eq!(counted, 0);
        let local = std::fs::read(work.join("app_s1/slug_20240101.tgz")).unwrap();

        let online = task(&work, "full-online", true, false, false);
        let counted = strategy
            .transfer(&online, "s1", &record, ArtifactKind::Slug)
            .await
            .unwrap();
        assert_eq!(counted, 16);
        let files = transfer.files();
        let remote = &files["team/backup/g1_v1/app_s1/20240101.tgz"];

        assert_eq!(&local, remote);
        assert_eq!(transfer.open_close(), (1, 1));
    }

    #[tokio::test]
    async fn test_remote_slug_failure_names_version() {
        let dir = TempDir::new().unwrap();
        let slug = dir.path().join("build.tgz");
        std::fs::write(&slug, b"x").unwrap();

        let registry = FakeRegistry::default();
        let transfer = MemoryTransfer::failing();
        let strategy = TransferStrategy::new(&registry, &transfer, 1, 1);
        let online = task(dir.path(), "full-online", true, false, false);

        let err = strategy
            .transfer(&online, "s1", &version("slug", slug.to_str().unwrap()), ArtifactKind::Slug)
            .await
            .unwrap_err();
        match err {
            BackupError::Transfer { kind, service, version, .. } => {
                assert_eq!(kind, ArtifactKind::Slug);
                assert_eq!(service, "s1");
                assert_eq!(version, "20240101");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(transfer.open_close(), (1, 1));
    }

    #[tokio::test]
    async fn test_image_to_hub_pull_tag_push() {
        let dir = TempDir::new().unwrap();
        let registry = FakeRegistry::default().with_image("goodrain.me/app/web:20240101", 2048);
        let transfer = MemoryTransfer::default();
        let strategy = TransferStrategy::new(&registry, &transfer, 3, 3);

        let online = task(dir.path(), "full-online", false, true, false);
        let counted = strategy
            .transfer(&online, "s1", &version("image", "goodrain.me/app/web:20240101"), ArtifactKind::Image)
            .await
            .unwrap();
        assert_eq!(counted, 2048);

        let backup = "hub.example.com/bk/web:20240101_v1_backup".to_string();
        assert_eq!(
            registry.calls(),
            vec![
                RegistryCall::Pull("goodrain.me/app/web:20240101".into()),
                RegistryCall::Tag("goodrain.me/app/web:20240101".into(), backup.clone()),
                RegistryCall::Push(backup),
            ]
        );
    }

    #[tokio::test]
    async fn test_image_to_trusted_hub() {
        let dir = TempDir::new().unwrap();
        let registry = FakeRegistry::default().with_image("goodrain.me/app/web:20240101", 10);
        let transfer = MemoryTransfer::default();
        let strategy = TransferStrategy::new(&registry, &transfer, 1, 1);

        let online = task(dir.path(), "full-online", false, true, true);
        strategy
            .transfer(&online, "s1", &version("image", "goodrain.me/app/web:20240101"), ArtifactKind::Image)
            .await
            .unwrap();
        assert!(registry
            .calls()
            .contains(&RegistryCall::TrustedPush("hub.example.com/bk/web:20240101_v1_backup".into())));
    }

    #[tokio::test]
    async fn test_image_to_local_saves_tar() {
        let dir = TempDir::new().unwrap();
        let registry = FakeRegistry::default().with_image("goodrain.me/app/web:20240101", 10);
        let transfer = MemoryTransfer::default();
        let strategy = TransferStrategy::new(&registry, &transfer, 1, 1);

        let offline = task(dir.path(), "full-offline", false, false, false);
        let counted = strategy
            .transfer(&offline, "s1", &version("image", "goodrain.me/app/web:20240101"), ArtifactKind::Image)
            .await
            .unwrap();
        assert_eq!(counted, 0);
        assert!(dir.path().join("app_s1/image_20240101.tar").exists());
    }

    #[tokio::test]
    async fn test_image_pull_failure_is_transfer_error() {
        let dir = TempDir::new().unwrap();
        let registry = FakeRegistry::default();
        let transfer = MemoryTransfer::default();
        let strategy = TransferStrategy::new(&registry, &transfer, 1, 1);

        let online = task(dir.path(), "full-online", false, true, false);
        let err = strategy
            .transfer(&online, "s1", &version("image", "goodrain.me/app/missing:1"), ArtifactKind::Image)
            .await
            .unwrap_err();
        assert!(matches!(err, BackupError::Transfer { kind: ArtifactKind::Image, .. }));
    }
}
