use thiserror::Error;

use crate::error::StorageError;
use crate::plugin::PluginError;
use crate::status::ErrorKind;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("recipe not found: {0}")]
    RecipeNotFound(String),

    #[error("invalid MIME type: {0}")]
    InvalidMimeType(String),

    #[error("invalid file size: {0} bytes")]
    InvalidFileSize(u64),

    #[error("processing plugin({0}) not found")]
    PluginNotFound(String),

    #[error("plugin '{plugin}' failed: {source}")]
    PluginExecutionFailed {
        plugin: String,
        #[source]
        source: PluginError,
    },

    #[error("no file processed by plugin: {0}")]
    EmptyPluginOutput(String),

    #[error("invalid output path: {0}")]
    InvalidOutputPath(String),

    #[error("invalid storage type: {0}")]
    OutputStorageInvalid(String),

    #[error("failed to save output file: {0}")]
    OutputPersistFailed(#[from] StorageError),

    #[error("upload failed: {0}")]
    UploadIoFailed(#[source] std::io::Error),
}

impl PipelineError {
    /// Serializable failure class carried on the terminal status.
    pub fn kind(&self) -> ErrorKind {
        match self {
            PipelineError::RecipeNotFound(_) => ErrorKind::RecipeNotFound,
            PipelineError::InvalidMimeType(_) => ErrorKind::InvalidMimeType,
            PipelineError::InvalidFileSize(_) => ErrorKind::InvalidFileSize,
            PipelineError::PluginNotFound(_) => ErrorKind::PluginNotFound,
            PipelineError::PluginExecutionFailed { .. } => ErrorKind::PluginExecutionFailed,
            PipelineError::EmptyPluginOutput(_) => ErrorKind::EmptyPluginOutput,
            PipelineError::InvalidOutputPath(_) => ErrorKind::InvalidOutputPath,
            PipelineError::OutputStorageInvalid(_) => ErrorKind::OutputStorageInvalid,
            PipelineError::OutputPersistFailed(_) => ErrorKind::OutputPersistFailed,
            PipelineError::UploadIoFailed(_) => ErrorKind::UploadIoFailed,
        }
    }

    pub(crate) fn to_status_error(&self) -> crate::status::StatusError {
        crate::status::StatusError {
            kind: self.kind(),
            message: self.to_string(),
        }
    }
}
