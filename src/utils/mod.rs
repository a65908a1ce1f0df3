pub mod constants;
pub mod helpers;
pub mod archive;
pub mod app_config;

pub use constants::*;
pub use helpers::*;
pub use archive::zip_dir;
pub use app_config::WorkerConfig;
