//! Append-only processing log of one pipeline run.

use std::fmt;
use std::path::PathBuf;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::id::{nid, FILE_PROCESS_ID_LENGTH, FILE_PROCESS_ID_PREFIX};

/// Failure classes a consumer can see on a terminal status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    RecipeNotFound,
    InvalidMimeType,
    InvalidFileSize,
    PluginNotFound,
    PluginExecutionFailed,
    EmptyPluginOutput,
    InvalidOutputPath,
    OutputStorageInvalid,
    OutputPersistFailed,
    UploadIoFailed,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::RecipeNotFound => "RecipeNotFound",
            ErrorKind::InvalidMimeType => "InvalidMimeType",
            ErrorKind::InvalidFileSize => "InvalidFileSize",
            ErrorKind::PluginNotFound => "PluginNotFound",
            ErrorKind::PluginExecutionFailed => "PluginExecutionFailed",
            ErrorKind::EmptyPluginOutput => "EmptyPluginOutput",
            ErrorKind::InvalidOutputPath => "InvalidOutputPath",
            ErrorKind::OutputStorageInvalid => "OutputStorageInvalid",
            ErrorKind::OutputPersistFailed => "OutputPersistFailed",
            ErrorKind::UploadIoFailed => "UploadIOFailed",
        };
        f.write_str(name)
    }
}

/// Error attached to a failed status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusError {
    pub kind: ErrorKind,
    pub message: String,
}

impl fmt::Display for StatusError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

/// Transport-friendly projection of an output file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessingResultFile {
    pub file_name: String,
    pub local_path: Option<PathBuf>,
    pub url: Option<String>,
    pub size: u64,
    pub mime_type: String,
    /// Soft findings carried over from the processed file.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub processing_errors: Vec<String>,
}

/// One event in the log. Entries are never mutated once appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessingStatus {
    pub process_id: String,
    /// Unix milliseconds.
    pub timestamp: i64,
    pub processor_name: String,
    pub status_description: String,
    pub percentage: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<StatusError>,
    pub done: bool,
    #[serde(default)]
    pub resulting_files: Vec<ProcessingResultFile>,
}

impl ProcessingStatus {
    /// Non-terminal progress event.
    pub fn progress(
        process_id: &str,
        processor_name: &str,
        description: impl Into<String>,
        percentage: u8,
    ) -> Self {
        Self {
            process_id: process_id.to_string(),
            timestamp: Utc::now().timestamp_millis(),
            processor_name: processor_name.to_string(),
            status_description: description.into(),
            percentage: percentage.min(100),
            error: None,
            done: false,
            resulting_files: Vec::new(),
        }
    }

    /// Terminal failure event.
    pub fn failed(
        process_id: &str,
        processor_name: &str,
        description: impl Into<String>,
        error: StatusError,
    ) -> Self {
        Self {
            error: Some(error),
            done: true,
            ..Self::progress(process_id, processor_name, description, 0)
        }
    }

    /// Terminal success event.
    pub fn completed(
        process_id: &str,
        processor_name: &str,
        description: impl Into<String>,
        resulting_files: Vec<ProcessingResultFile>,
    ) -> Self {
        Self {
            done: true,
            resulting_files,
            ..Self::progress(process_id, processor_name, description, 100)
        }
    }

    pub fn with_resulting_files(mut self, files: Vec<ProcessingResultFile>) -> Self {
        self.resulting_files = files;
        self
    }
}

/// One invocation of the pipeline against one file.
///
/// The log is append-only and `latest_status` always points at its tail.
/// Once a terminal (`done`) entry has been appended, further updates are
/// dropped so that the terminal entry stays last.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileProcess {
    pub id: String,
    pub incoming_file_name: String,
    pub recipe_name: String,
    processing_updates: Vec<ProcessingStatus>,
}

impl FileProcess {
    pub fn new(incoming_file_name: impl Into<String>, recipe_name: impl Into<String>) -> Self {
        Self {
            id: nid(FILE_PROCESS_ID_PREFIX, FILE_PROCESS_ID_LENGTH),
            incoming_file_name: incoming_file_name.into(),
            recipe_name: recipe_name.into(),
            processing_updates: Vec::new(),
        }
    }

    pub fn add_processing_update(&mut self, update: ProcessingStatus) {
        if self.is_done() {
            tracing::warn!(
                process_id = %self.id,
                processor = %update.processor_name,
                "Dropping status update appended after terminal status"
            );
            return;
        }
        self.processing_updates.push(update);
    }

    pub fn processing_updates(&self) -> &[ProcessingStatus] {
        &self.processing_updates
    }

    pub fn latest_status(&self) -> Option<&ProcessingStatus> {
        self.processing_updates.last()
    }

    pub fn is_done(&self) -> bool {
        self.latest_status().is_some_and(|s| s.done)
    }

    pub fn has_failed(&self) -> bool {
        self.latest_status().is_some_and(|s| s.error.is_some())
    }

    /// Output files of a successfully finished run.
    pub fn result_files(&self) -> &[ProcessingResultFile] {
        match self.latest_status() {
            Some(status) if status.done && status.error.is_none() => &status.resulting_files,
            _ => &[],
        }
    }
}
