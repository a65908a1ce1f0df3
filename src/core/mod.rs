pub mod error;
pub mod event;
pub mod metadata;
pub mod reference;
pub mod registry;
pub mod docker;
pub mod remote;
pub mod storage;
pub mod task;
pub mod transfer;
pub mod orchestrator;
pub mod plugin;
pub mod reporter;
pub mod worker;

#[cfg(test)]
pub mod testing;

pub use docker::DockerRegistry;
pub use error::{BackupError, BackupResult};
pub use remote::HttpTransferClient;
pub use storage::FileStatusStore;
pub use worker::{BackupOutcome, BackupWorker, TaskWorker, WorkerRuntime};
