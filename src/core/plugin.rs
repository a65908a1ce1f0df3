/// Plugin image backup for structured snapshots
///
/// Every plugin build version is pulled and saved into the working
/// directory as `plugin_{id}/image_{deploy_version}.tar`. Unlike service
/// versions, any failure here aborts the task.

use std::path::PathBuf;

use crate::core::error::{BackupError, BackupResult};
use crate::core::event::{EventLogger, EventStatus};
use crate::core::metadata::PluginBuildVersion;
use crate::core::registry::RegistryClient;
use crate::core::task::BackupTask;
use crate::utils::{ensure_dir, STEP_BACKUP};

pub struct PluginBackup<'a> {
    registry: &'a dyn RegistryClient,
    logger: &'a dyn EventLogger,
    pull_attempts: u32,
}

impl<'a> PluginBackup<'a> {
    pub fn new(registry: &'a dyn RegistryClient, logger: &'a dyn EventLogger, pull_attempts: u32) -> Self {
        Self {
            registry,
            logger,
            pull_attempts,
        }
    }

    /// Save every plugin image, returning the tarballs written
    pub async fn backup_plugins(
        &self,
        task: &BackupTask,
        build_versions: &[PluginBuildVersion],
    ) -> BackupResult<Vec<PathBuf>> {
        let mut saved = Vec::with_capacity(build_versions.len());
        for build in build_versions {
            saved.push(self.backup_plugin(task, build).await?);
        }
        Ok(saved)
    }

    async fn backup_plugin(&self, task: &BackupTask, build: &PluginBuildVersion) -> BackupResult<PathBuf> {
        self.logger.info(
            &format!("Start backup plugin({}) image", build.plugin_id),
            STEP_BACKUP,
            EventStatus::Starting,
        );

        let dir = task.source_path().join(format!("plugin_{}", build.plugin_id));
        let dst = dir.join(format!("image_{}.tar", build.deploy_version));

        let result = async {
            ensure_dir(&dir).await?;
            self.registry
                .pull(&build.build_local_image, None, self.pull_attempts)
                .await?;
            self.registry.save(&build.build_local_image, &dst).await
        }
        .await;

        match result {
            Ok(size) => {
                tracing::debug!(plugin = %build.plugin_id, path = %dst.display(), size, "plugin image saved");
                self.logger.info(
                    &format!("Complete backup plugin({}) image", build.plugin_id),
                    STEP_BACKUP,
                    EventStatus::Success,
                );
                Ok(dst)
            }
            Err(source) => {
                self.logger.error(
                    &format!("Backup plugin({}) image failure", build.plugin_id),
                    STEP_BACKUP,
                    EventStatus::Failure,
                );
                Err(BackupError::Plugin {
                    plugin: build.plugin_id.clone(),
                    image: build.build_local_image.clone(),
                    source,
                })
            }
        }
    }
}
