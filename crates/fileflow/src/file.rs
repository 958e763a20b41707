//! The unit of data flowing through a pipeline run.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::StorageError;
use crate::status::ProcessingResultFile;
use crate::storage::layout::ensure_directory;

/// One file at some point in the pipeline.
///
/// `metadata` doubles as extracted data (EXIF fields, ids) and as input for
/// output-name templating. `processing_errors` collects soft findings that
/// do not abort the pipeline; callers decide whether to honor the output.
/// Dropping a `ManagedFile` never deletes its stored file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManagedFile {
    pub file_name: String,
    #[serde(rename = "mimetype")]
    pub mime_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_path: Option<PathBuf>,
    #[serde(rename = "fileSize")]
    pub size: u64,
    #[serde(default, rename = "metaData")]
    pub metadata: Map<String, Value>,
    #[serde(default)]
    pub processing_errors: Vec<String>,
    #[serde(skip)]
    pub content: Option<Vec<u8>>,
}

impl ManagedFile {
    pub fn new(file_name: impl Into<String>, mime_type: impl Into<String>) -> Self {
        Self {
            file_name: file_name.into(),
            mime_type: mime_type.into(),
            ..Default::default()
        }
    }

    /// In-memory file; size is taken from the content.
    pub fn from_bytes(
        file_name: impl Into<String>,
        mime_type: impl Into<String>,
        content: Vec<u8>,
    ) -> Self {
        Self {
            file_name: file_name.into(),
            mime_type: mime_type.into(),
            size: content.len() as u64,
            content: Some(content),
            ..Default::default()
        }
    }

    pub fn with_local_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.local_path = Some(path.into());
        self
    }

    pub fn set_metadata(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.metadata.insert(key.into(), value.into());
    }

    pub fn metadata_value(&self, key: &str) -> Option<&Value> {
        self.metadata.get(key)
    }

    /// Extension of `file_name` including the leading dot, or an empty string.
    pub fn extension(&self) -> String {
        Path::new(&self.file_name)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| format!(".{}", e))
            .unwrap_or_default()
    }

    /// Directory part of `local_path`.
    pub fn local_directory(&self) -> Option<&Path> {
        self.local_path.as_deref().and_then(Path::parent)
    }

    /// Guesses the mime type from the local path (or file name) extension.
    /// Leaves the current value untouched when nothing can be guessed.
    pub fn update_mime_type(&mut self) -> &str {
        let guessed = match &self.local_path {
            Some(path) => mime_guess::from_path(path).first(),
            None => mime_guess::from_path(&self.file_name).first(),
        };
        if let Some(mime) = guessed {
            self.mime_type = mime.essence_str().to_string();
        }
        &self.mime_type
    }

    /// Fills in `size` from the content or an on-disk stat when it is unset.
    pub fn update_file_size(&mut self) -> u64 {
        if self.size == 0 {
            if let Some(content) = &self.content {
                self.size = content.len() as u64;
            } else if let Some(path) = &self.local_path {
                if let Ok(meta) = std::fs::metadata(path) {
                    self.size = meta.len();
                }
            }
        }
        self.size
    }

    /// Returns the content, reading it from `local_path` when the file was
    /// only adopted by path so far.
    pub fn load_content(&mut self) -> Result<&[u8], StorageError> {
        if self.content.is_none() {
            let path = self
                .local_path
                .as_ref()
                .ok_or_else(|| StorageError::NoContent(self.file_name.clone()))?;
            let bytes = std::fs::read(path).map_err(|e| StorageError::ReadFile {
                path: path.clone(),
                source: e,
            })?;
            self.content = Some(bytes);
        }
        Ok(self.content.as_deref().unwrap_or_default())
    }

    /// Writes `content` to `local_path`, then recomputes size from the
    /// written bytes and mime type from the extension.
    pub fn save(&mut self) -> Result<(), StorageError> {
        let path = self
            .local_path
            .clone()
            .ok_or_else(|| StorageError::NoContent(self.file_name.clone()))?;
        if let Some(parent) = path.parent() {
            ensure_directory(parent)?;
        }

        let content = self.content.as_deref().unwrap_or_default();
        std::fs::write(&path, content).map_err(|e| StorageError::WriteFile {
            path: path.clone(),
            source: e,
        })?;

        self.size = content.len() as u64;
        if let Some(mime) = mime_guess::from_path(&path).first() {
            self.mime_type = mime.essence_str().to_string();
        }
        Ok(())
    }

    pub fn to_result_file(&self) -> ProcessingResultFile {
        ProcessingResultFile {
            file_name: self.file_name.clone(),
            local_path: self.local_path.clone(),
            url: self.url.clone(),
            size: self.size,
            mime_type: self.mime_type.clone(),
            processing_errors: self.processing_errors.clone(),
        }
    }
}
