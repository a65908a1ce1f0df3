/// Archive finalization and status reporting
///
/// The working directory is zipped into `{source_dir}.zip` and removed.
/// With a remote destination the archive is pushed and the local copy
/// dropped, so the recorded location is always where the archive lives.

use std::path::Path;

use crate::core::error::{BackupError, BackupResult};
use crate::core::event::{EventLogger, EventStatus};
use crate::core::remote::{push_scoped, TransferClient};
use crate::core::storage::BackupStatusStore;
use crate::core::task::{BackupDestination, BackupTask};
use crate::utils::{
    format_bytes, strip_trailing_separator, zip_dir, zip_path_for, REMOTE_ARCHIVE_NAME,
    REMOTE_SOURCE_TYPE, STEP_BACKUP,
};

pub struct Reporter<'a> {
    transfer: &'a dyn TransferClient,
    logger: &'a dyn EventLogger,
}

impl<'a> Reporter<'a> {
    pub fn new(transfer: &'a dyn TransferClient, logger: &'a dyn EventLogger) -> Self {
        Self { transfer, logger }
    }

    /// Zip the working directory and move the archive to its destination.
    /// Updates the task's location, location kind and size.
    pub async fn finalize(&self, task: &mut BackupTask) -> BackupResult<()> {
        let source = strip_trailing_separator(&task.source_dir).to_string();
        let source_path = Path::new(&source);
        let archive = zip_path_for(source_path);

        let size = zip_dir(source_path, &archive)
            .await
            .map_err(|source| BackupError::Finalize {
                step: "compress backup directory",
                source,
            })?;
        task.add_size(size);

        discard(source_path).await;
        task.source_dir = archive.display().to_string();
        tracing::info!(archive = %task.source_dir, size = %format_bytes(size), "backup archive created");

        if let BackupDestination::Remote(target) = &task.destination {
            let remote_path = format!("{}/{}", task.remote_root(target), REMOTE_ARCHIVE_NAME);
            self.logger.info(
                "Start uploading backup metadata to the cloud",
                STEP_BACKUP,
                EventStatus::Starting,
            );
            if let Err(source) = push_scoped(self.transfer, target, &archive, &remote_path).await {
                self.logger.error(
                    "Upload backup metadata to the cloud failure",
                    STEP_BACKUP,
                    EventStatus::Failure,
                );
                return Err(BackupError::Finalize {
                    step: "upload backup archive",
                    source,
                });
            }

            discard(&archive).await;

            tracing::info!(remote = %remote_path, "backup archive uploaded");
            self.logger.info(
                "Complete uploading backup metadata to the cloud",
                STEP_BACKUP,
                EventStatus::Success,
            );
            task.source_dir = remote_path;
            task.source_type = REMOTE_SOURCE_TYPE.to_string();
        }

        Ok(())
    }
}

/// Remove a file or directory the archive no longer needs. Failures leave
/// litter behind but never fail the backup. Returns whether it was removed.
async fn discard(path: &Path) -> bool {
    let result = match tokio::fs::symlink_metadata(path).await {
        Ok(meta) if meta.is_dir() => tokio::fs::remove_dir_all(path).await,
        Ok(_) => tokio::fs::remove_file(path).await,
        Err(e) => Err(e),
    };
    match result {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "failed to clean up after archiving");
            false
        }
    }
}

/// Write the task's final status, location, location kind and size
pub async fn persist(store: &dyn BackupStatusStore, task: &BackupTask, status: &str) -> BackupResult<()> {
    let wrap = |source| BackupError::Status {
        backup_id: task.backup_id.clone(),
        source,
    };

    let mut record = store.get(&task.backup_id).await.map_err(wrap)?;
    record.status = status.to_string();
    record.source_dir = task.source_dir.clone();
    record.source_type = task.source_type.clone();
    record.backup_size = task.backup_size;
    store.update(&record).await.map_err(wrap)?;

    tracing::info!(backup_id = %task.backup_id, status, size = task.backup_size, "backup status saved");
    Ok(())
}
