/// Backup worker constants
///
/// File names, layout fragments and event steps shared by the worker stages

/// Worker registration name used by the task scheduler
pub const WORKER_NAME: &str = "backup_apps_new";

/// Snapshot file written by the API into every backup source directory
pub const METADATA_FILE_NAME: &str = "region_apps_metadata.json";

/// Maximum number of build versions backed up per service
pub const DEFAULT_MAX_BACKUP_VERSIONS: usize = 3;

pub const DEFAULT_SHARE_DATA_PATH: &str = "/grdata";

/// Environment override for the shared data root
pub const SHARE_DATA_PATH_ENV: &str = "SHARE_DATA_PATH";

/// Retry budgets for registry operations
pub const DEFAULT_IMAGE_PULL_ATTEMPTS: u32 = 10;
pub const DEFAULT_PLUGIN_PULL_ATTEMPTS: u32 = 20;
pub const DEFAULT_IMAGE_PUSH_ATTEMPTS: u32 = 10;

/// Task descriptor mode strings
pub const MODE_FULL_ONLINE: &str = "full-online";
pub const MODE_FULL_OFFLINE: &str = "full-offline";

/// Location kind recorded once the archive lives on the transfer endpoint
pub const REMOTE_SOURCE_TYPE: &str = "remote";

/// Name of the archive pushed to the transfer endpoint
pub const REMOTE_ARCHIVE_NAME: &str = "metadata_data.zip";

/// Event steps
pub const STEP_BACKUP: &str = "backup_builder";
pub const STEP_CALLBACK: &str = "callback";

/// Persisted status values
pub const STATUS_SUCCESS: &str = "success";
pub const STATUS_FAILED: &str = "failed";
