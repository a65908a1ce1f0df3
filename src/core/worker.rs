/// Group application backup worker
///
/// Reads the snapshot metadata from the task's source directory, backs up
/// every service and (for structured snapshots) every plugin image, then
/// archives the directory and records the final status.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::core::error::{error_chain, BackupError, BackupResult};
use crate::core::event::{EventLogger, EventStatus, TracingEventLogger};
use crate::core::metadata::{self, MetadataVersion};
use crate::core::orchestrator::{ServiceBackupOrchestrator, ServiceSummary};
use crate::core::plugin::PluginBackup;
use crate::core::registry::RegistryClient;
use crate::core::remote::TransferClient;
use crate::core::reporter::{persist, Reporter};
use crate::core::storage::BackupStatusStore;
use crate::core::task::BackupTask;
use crate::core::transfer::TransferStrategy;
use crate::utils::{
    format_bytes, WorkerConfig, METADATA_FILE_NAME, STATUS_FAILED, STATUS_SUCCESS, STEP_BACKUP,
    STEP_CALLBACK, WORKER_NAME,
};

/// Lifecycle shared by scheduler-driven workers
#[async_trait]
pub trait TaskWorker: Send {
    fn name(&self) -> &'static str;

    /// Execute the task. `timeout` is advisory: overrunning it is logged,
    /// never enforced.
    async fn run(&mut self, timeout: Duration) -> BackupResult<()>;

    /// No in-flight cancellation
    fn stop(&mut self) {}

    /// Called by the scheduler after `run` failed
    async fn error_callback(&mut self, err: &BackupError);
}

/// Collaborators a worker is built against
#[derive(Clone)]
pub struct WorkerRuntime {
    pub registry: Option<Arc<dyn RegistryClient>>,
    pub transfer: Arc<dyn TransferClient>,
    pub store: Arc<dyn BackupStatusStore>,
    pub config: WorkerConfig,
}

/// Summary of a successful run
#[derive(Debug, Clone)]
pub struct BackupOutcome {
    pub backup_id: String,
    pub metadata_version: MetadataVersion,
    pub location: String,
    pub location_kind: String,
    pub size: u64,
    pub services: Vec<ServiceSummary>,
    pub plugins: usize,
}

pub struct BackupWorker {
    task: BackupTask,
    registry: Arc<dyn RegistryClient>,
    transfer: Arc<dyn TransferClient>,
    store: Arc<dyn BackupStatusStore>,
    logger: Arc<dyn EventLogger>,
    config: WorkerConfig,
    outcome: Option<BackupOutcome>,
}

impl BackupWorker {
    pub fn from_descriptor(raw: &[u8], runtime: &WorkerRuntime) -> BackupResult<Self> {
        let task = BackupTask::from_descriptor(raw)?;
        let registry = runtime.registry.clone().ok_or(BackupError::NoRuntimeClient)?;
        let logger = Arc::new(TracingEventLogger::new(task.event_id.clone()));

        Ok(Self {
            task,
            registry,
            transfer: runtime.transfer.clone(),
            store: runtime.store.clone(),
            logger,
            config: runtime.config.clone(),
            outcome: None,
        })
    }

    pub fn with_logger(mut self, logger: Arc<dyn EventLogger>) -> Self {
        self.logger = logger;
        self
    }

    pub fn task(&self) -> &BackupTask {
        &self.task
    }

    pub fn outcome(&self) -> Option<&BackupOutcome> {
        self.outcome.as_ref()
    }

    async fn execute(&mut self) -> BackupResult<BackupOutcome> {
        let path = self.task.source_path().join(METADATA_FILE_NAME);
        let blob = tokio::fs::read(&path)
            .await
            .map_err(|source| BackupError::ReadMetadata { path, source })?;

        let mut resolved = metadata::resolve(&blob).map_err(|e| {
            self.logger.error(
                "Failed to judge the version of metadata",
                STEP_BACKUP,
                EventStatus::Failure,
            );
            e
        })?;
        tracing::info!(
            backup_id = %self.task.backup_id,
            format = %resolved.version,
            services = resolved.snapshot.services.len(),
            "metadata resolved"
        );

        let registry = self.registry.as_ref();
        let transfer = self.transfer.as_ref();
        let logger = self.logger.as_ref();

        let strategy = TransferStrategy::new(
            registry,
            transfer,
            self.config.image_pull_attempts,
            self.config.image_push_attempts,
        );
        let orchestrator = ServiceBackupOrchestrator::new(strategy, registry, logger, &self.config);
        let services = orchestrator
            .backup_services(&mut self.task, &mut resolved.snapshot.services)
            .await?;

        let mut plugins = 0;
        if resolved.version == MetadataVersion::New {
            let saved = PluginBackup::new(registry, logger, self.config.plugin_pull_attempts)
                .backup_plugins(&self.task, &resolved.snapshot.plugin_build_versions)
                .await?;
            plugins = saved.len();
        }

        logger.info("Start compressing backup data", STEP_BACKUP, EventStatus::Starting);
        if let Err(e) = Reporter::new(transfer, logger).finalize(&mut self.task).await {
            logger.error("Compressed backup data failed", STEP_BACKUP, EventStatus::Failure);
            return Err(e);
        }
        logger.info("Complete compressing backup data", STEP_BACKUP, EventStatus::Success);

        persist(self.store.as_ref(), &self.task, STATUS_SUCCESS).await?;

        Ok(BackupOutcome {
            backup_id: self.task.backup_id.clone(),
            metadata_version: resolved.version,
            location: self.task.source_dir.clone(),
            location_kind: self.task.source_type.clone(),
            size: self.task.backup_size,
            services,
            plugins,
        })
    }
}

#[async_trait]
impl TaskWorker for BackupWorker {
    fn name(&self) -> &'static str {
        WORKER_NAME
    }

    async fn run(&mut self, timeout: Duration) -> BackupResult<()> {
        let started = Instant::now();
        tracing::info!(
            backup_id = %self.task.backup_id,
            group_id = %self.task.group_id,
            mode = ?self.task.mode,
            "starting group app backup"
        );

        let outcome = self.execute().await?;

        let elapsed = started.elapsed();
        if elapsed > timeout {
            tracing::warn!(
                backup_id = %self.task.backup_id,
                "backup took {}, longer than the {} timeout",
                humantime::format_duration(elapsed),
                humantime::format_duration(timeout)
            );
        }

        tracing::info!(
            backup_id = %outcome.backup_id,
            location = %outcome.location,
            size = %format_bytes(outcome.size),
            "group app backup complete"
        );
        self.logger
            .info("Backup group app success", STEP_BACKUP, EventStatus::Success);
        self.outcome = Some(outcome);
        Ok(())
    }

    async fn error_callback(&mut self, err: &BackupError) {
        tracing::error!(backup_id = %self.task.backup_id, "backup failed: {}", error_chain(err));
        self.logger.error(
            &format!("Backup group app failure: {}", err),
            STEP_CALLBACK,
            EventStatus::Failure,
        );

        if let Err(e) = persist(self.store.as_ref(), &self.task, STATUS_FAILED).await {
            tracing::error!(backup_id = %self.task.backup_id, "{}", error_chain(&e));
        }
    }
}
