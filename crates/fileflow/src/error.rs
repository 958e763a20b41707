use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FileflowError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Pipeline error: {0}")]
    Pipeline(#[from] crate::pipeline::PipelineError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Plugin error: {0}")]
    Plugin(#[from] crate::plugin::PluginError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read recipe directory '{path}': {source}")]
    ReadDirectory {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },

    #[error("Failed to parse YAML in '{path}': {message}")]
    ParseYaml { path: PathBuf, message: String },

    #[error("Config validation failed: {message}")]
    Validation { message: String },

    #[error("Invalid recipe '{name}': {reason}")]
    InvalidRecipe { name: String, reason: String },
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Failed to create directory '{path}': {source}")]
    CreateDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write file '{path}': {source}")]
    WriteFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to move file from '{from}' to '{to}': {source}")]
    MoveFile {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Local file not found: {0}")]
    NotFound(PathBuf),

    #[error("Path '{0}' is not inside the public storage")]
    NotInStorage(PathBuf),

    #[error("URL '{0}' is not mapped to a local file")]
    UrlNotMapped(String),

    #[error("Invalid base URL '{url}': {source}")]
    InvalidBaseUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("Base URL '{0}' cannot carry a path")]
    OpaqueBaseUrl(String),

    #[error("File has neither content nor a local path: {0}")]
    NoContent(String),
}

pub type Result<T> = std::result::Result<T, FileflowError>;
