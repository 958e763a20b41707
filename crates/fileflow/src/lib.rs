pub mod config;
pub mod error;
pub mod file;
pub mod id;
pub mod pipeline;
pub mod plugin;
pub mod plugins;
pub mod recipe;
pub mod sanitize;
pub mod status;
pub mod storage;
pub mod telemetry;
pub mod upload;

pub use config::{load_settings, load_settings_from_str, Settings};
pub use error::{ConfigError, FileflowError, Result, StorageError};
pub use file::ManagedFile;
pub use pipeline::{FileManager, PipelineError};
pub use plugin::{DynPlugin, NoParams, Plugin, PluginError};
pub use recipe::{OutputFormat, ProcessingStep, Recipe};
pub use status::{ErrorKind, FileProcess, ProcessingResultFile, ProcessingStatus, StatusError};
pub use storage::{StorageLayout, StorageType};
pub use upload::ProgressReader;

/// Library version, reported by the CLI.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
