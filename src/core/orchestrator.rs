/// Per-service backup: build versions first, then persistent data
///
/// Services and versions are processed strictly in declared order. A
/// version that is missing or fails to transfer is skipped; a service that
/// ends up with no transferred version aborts the task.

use anyhow::Result;
use std::path::{Path, PathBuf};

use crate::core::error::{error_chain, BackupError, BackupResult};
use crate::core::event::{EventLogger, EventStatus};
use crate::core::metadata::{ServiceSnapshot, VersionRecord, VersionStatus};
use crate::core::reference::ImageReference;
use crate::core::registry::RegistryClient;
use crate::core::task::BackupTask;
use crate::core::transfer::{ArtifactKind, TransferStrategy};
use crate::utils::{
    dir_is_empty, format_bytes, sanitize_volume_name, zip_dir, WorkerConfig, STEP_BACKUP,
};

/// Volume label used for the whole-service data bundle
pub const ALL_DATA_VOLUME: &str = "all";

/// What happened to one service
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServiceSummary {
    pub service_id: String,
    pub transferred: usize,
    pub lost: usize,
    pub failed: usize,
    pub volume_bundles: Vec<PathBuf>,
}

pub struct ServiceBackupOrchestrator<'a> {
    strategy: TransferStrategy<'a>,
    registry: &'a dyn RegistryClient,
    logger: &'a dyn EventLogger,
    config: &'a WorkerConfig,
    max_versions: usize,
}

impl<'a> ServiceBackupOrchestrator<'a> {
    pub fn new(
        strategy: TransferStrategy<'a>,
        registry: &'a dyn RegistryClient,
        logger: &'a dyn EventLogger,
        config: &'a WorkerConfig,
    ) -> Self {
        Self {
            strategy,
            registry,
            logger,
            config,
            max_versions: config.max_backup_versions,
        }
    }

    pub fn max_versions(&self) -> usize {
        self.max_versions
    }

    pub async fn backup_services(
        &self,
        task: &mut BackupTask,
        services: &mut [ServiceSnapshot],
    ) -> BackupResult<Vec<ServiceSummary>> {
        let mut summaries = Vec::with_capacity(services.len());
        for service in services.iter_mut() {
            summaries.push(self.backup_service(task, service).await?);
        }
        Ok(summaries)
    }

    async fn backup_service(
        &self,
        task: &mut BackupTask,
        service: &mut ServiceSnapshot,
    ) -> BackupResult<ServiceSummary> {
        let name = service.display_name().to_string();
        let mut summary = ServiceSummary {
            service_id: service.service_id.clone(),
            ..Default::default()
        };

        self.logger.info(
            &format!("Start backup Application({}) runtime", name),
            STEP_BACKUP,
            EventStatus::Starting,
        );

        for version in service.versions.iter_mut() {
            if summary.transferred >= self.max_versions {
                break;
            }
            if version.final_status != VersionStatus::Success {
                continue;
            }

            let kind = match version.delivered_type.parse::<ArtifactKind>() {
                Ok(kind) => kind,
                Err(e) => {
                    tracing::warn!(
                        service = %service.service_id,
                        version = %version.build_version,
                        "skipping version: {}", e
                    );
                    summary.failed += 1;
                    continue;
                }
            };

            if !self.version_exists(kind, version).await {
                version.final_status = VersionStatus::Lost;
                summary.lost += 1;
                continue;
            }

            match self
                .strategy
                .transfer(task, &service.service_id, version, kind)
                .await
            {
                Ok(bytes) => {
                    task.add_size(bytes);
                    summary.transferred += 1;
                }
                Err(e) => {
                    tracing::error!(
                        service = %service.service_id,
                        version = %version.build_version,
                        "{}", error_chain(&e)
                    );
                    summary.failed += 1;
                }
            }
        }

        if summary.transferred == 0 {
            self.logger.error(
                &format!("Application({}) Backup build version failure.", name),
                STEP_BACKUP,
                EventStatus::Failure,
            );
            return Err(BackupError::ServiceExhausted { service: name });
        }

        tracing::info!(
            service = %service.service_id,
            transferred = summary.transferred,
            lost = summary.lost,
            failed = summary.failed,
            "service runtime backed up"
        );
        self.logger.info(
            &format!(
                "Complete backup application ({}) runtime {} version",
                name, summary.transferred
            ),
            STEP_BACKUP,
            EventStatus::Success,
        );

        self.logger.info(
            &format!("Start backup application({}) persistent data", name),
            STEP_BACKUP,
            EventStatus::Starting,
        );
        summary.volume_bundles = self.backup_volumes(task, service).await.map_err(|e| {
            self.logger.error(
                &format!("Backup application({}) persistent data failure", name),
                STEP_BACKUP,
                EventStatus::Failure,
            );
            e
        })?;
        self.logger.info(
            &format!("Complete backup application({}) persistent data", name),
            STEP_BACKUP,
            EventStatus::Success,
        );

        Ok(summary)
    }

    /// A failed check counts as missing
    async fn version_exists(&self, kind: ArtifactKind, version: &VersionRecord) -> bool {
        let checked = match kind {
            ArtifactKind::Slug => slug_exists(Path::new(&version.delivered_path)).await,
            ArtifactKind::Image => self.image_exists(&version.delivered_path).await,
        };

        match checked {
            Ok(exists) => {
                if !exists {
                    tracing::warn!(path = %version.delivered_path, "{} not found, marking version lost", kind);
                }
                exists
            }
            Err(e) => {
                tracing::warn!(
                    path = %version.delivered_path,
                    "failed to check {}, it could be not exist: {:#}", kind, e
                );
                false
            }
        }
    }

    async fn image_exists(&self, reference: &str) -> Result<bool> {
        let reference = ImageReference::parse(reference)?;
        self.registry.manifest(&reference).await?;
        Ok(true)
    }

    async fn backup_volumes(
        &self,
        task: &BackupTask,
        service: &ServiceSnapshot,
    ) -> BackupResult<Vec<PathBuf>> {
        let data_dir = task
            .source_path()
            .join(format!("data_{}", service.service_id));
        let mut bundles = Vec::new();

        if service.volumes.is_empty() {
            let shared = self
                .config
                .service_data_dir(&service.service.tenant_id, &service.service_id);
            if !dir_is_empty(&shared).await {
                let dst = data_dir.join("data.zip");
                let size = zip_dir(&shared, &dst)
                    .await
                    .map_err(|source| BackupError::Volume {
                        service: service.service_id.clone(),
                        volume: ALL_DATA_VOLUME.to_string(),
                        source,
                    })?;
                tracing::debug!(service = %service.service_id, size = %format_bytes(size), "service data bundled");
                bundles.push(dst);
            }
        }

        for volume in &service.volumes {
            if volume.host_path.is_empty() || dir_is_empty(&volume.host_path).await {
                continue;
            }

            let mut name = sanitize_volume_name(&volume.volume_name);
            if name.is_empty() {
                name = "volume".to_string();
            }
            let dst = data_dir.join(format!("{}.zip", name));
            let size = zip_dir(&volume.host_path, &dst)
                .await
                .map_err(|source| BackupError::Volume {
                    service: service.service_id.clone(),
                    volume: volume.volume_name.clone(),
                    source,
                })?;
            tracing::debug!(
                service = %service.service_id,
                volume = %volume.volume_name,
                size = %format_bytes(size),
                "volume bundled"
            );
            bundles.push(dst);
        }

        Ok(bundles)
    }
}

/// A directory at the slug path does not count as the slug
async fn slug_exists(path: &Path) -> Result<bool> {
    match tokio::fs::metadata(path).await {
        Ok(metadata) => Ok(!metadata.is_dir()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e.into()),
    }
}
