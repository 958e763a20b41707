//! Streaming ingest with progress reporting.
//!
//! Progress is forwarded with a blocking send, so every update reaches the
//! consumer in order. Backpressure only applies when the caller hands in a
//! bounded channel: with `crossbeam_channel::bounded(n)` a slow consumer
//! slows the upload down, with `unbounded()` updates queue up instead. A
//! consumer that hung up is ignored and the upload carries on. The adapter
//! never emits a terminal status; that belongs to the pipeline run that
//! follows.
//!
//! With a bounded channel the consumer must already be draining before the
//! upload starts, otherwise the first send blocks forever.

use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

use crossbeam_channel::Sender;
use tracing::{debug, info_span, warn};

use crate::file::ManagedFile;
use crate::id::nid;
use crate::pipeline::{FileManager, PipelineError};
use crate::sanitize;
use crate::status::{FileProcess, ProcessingResultFile, ProcessingStatus};
use crate::storage::StorageType;

const UPLOAD_PROCESSOR: &str = "FileUpload";
const UPLOAD_ID_LENGTH: usize = 16;

/// Byte-counting reader that reports upload percentage on the process log.
pub struct ProgressReader<'a, R> {
    inner: R,
    total: Option<u64>,
    transferred: u64,
    last_percentage: Option<u8>,
    process: &'a mut FileProcess,
    status_tx: &'a Sender<FileProcess>,
}

impl<'a, R: Read> ProgressReader<'a, R> {
    /// Reader of unknown length. Bytes are counted but no percentage is
    /// reported until a total is set with [`Self::with_total`].
    pub fn new(inner: R, process: &'a mut FileProcess, status_tx: &'a Sender<FileProcess>) -> Self {
        Self {
            inner,
            total: None,
            transferred: 0,
            last_percentage: None,
            process,
            status_tx,
        }
    }

    pub fn with_total(mut self, total: u64) -> Self {
        self.total = Some(total);
        self
    }

    pub fn transferred(&self) -> u64 {
        self.transferred
    }

    pub fn last_percentage(&self) -> Option<u8> {
        self.last_percentage
    }

    fn report(&mut self) {
        let total = match self.total {
            Some(total) if total > 0 => total,
            _ => return,
        };

        let percentage = (self.transferred.saturating_mul(100) / total).min(100) as u8;
        if self.last_percentage.is_some_and(|last| percentage <= last) {
            return;
        }
        self.last_percentage = Some(percentage);

        let status = ProcessingStatus::progress(
            &self.process.id,
            UPLOAD_PROCESSOR,
            format!("Uploading file: {}", self.process.incoming_file_name),
            percentage,
        );
        self.process.add_processing_update(status);
        if self.status_tx.send(self.process.clone()).is_err() {
            debug!(process_id = %self.process.id, "Status receiver dropped during upload");
        }
    }
}

impl<'a> ProgressReader<'a, File> {
    /// Wraps a file and takes the total from its metadata.
    pub fn from_file(
        file: File,
        process: &'a mut FileProcess,
        status_tx: &'a Sender<FileProcess>,
    ) -> io::Result<Self> {
        let total = file.metadata()?.len();
        Ok(Self::new(file, process, status_tx).with_total(total))
    }
}

impl<R: Read> Read for ProgressReader<'_, R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.transferred += n as u64;
        if n > 0 {
            self.report();
        }
        Ok(n)
    }
}

impl FileManager {
    /// Streams `reader` into temp storage as `upload-<id><ext>`, where the
    /// extension comes from the process's incoming file name.
    ///
    /// Progress is reported while copying when `total` is known. On success
    /// a non-terminal "File uploaded successfully" status carrying the file
    /// is appended; on I/O failure a terminal `UploadIOFailed` status is.
    pub fn handle_file_upload<R: Read>(
        &self,
        reader: R,
        total: Option<u64>,
        process: &mut FileProcess,
        status_tx: &Sender<FileProcess>,
    ) -> Result<ManagedFile, PipelineError> {
        let _span = info_span!("upload",
            process_id = %process.id,
            filename = %sanitize::redact_path(Path::new(&process.incoming_file_name)),
        )
        .entered();

        let incoming_name = sanitize::sanitize_file_name(&process.incoming_file_name);
        let extension = Path::new(&incoming_name)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| format!(".{}", e))
            .unwrap_or_default();
        let file_name = format!("upload-{}{}", nid("", UPLOAD_ID_LENGTH), extension);
        let target = self.layout().local_path_for(StorageType::Temp, &file_name);

        let copied = (|| -> io::Result<u64> {
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let mut out = File::create(&target)?;
            let mut progress = ProgressReader::new(reader, &mut *process, status_tx);
            if let Some(total) = total {
                progress = progress.with_total(total);
            }
            io::copy(&mut progress, &mut out)
        })();

        let size = match copied {
            Ok(size) => size,
            Err(e) => {
                if target.exists() {
                    if let Err(remove_err) = std::fs::remove_file(&target) {
                        warn!("Failed to remove partial upload: {}", remove_err);
                    }
                }
                let error = PipelineError::UploadIoFailed(e);
                process.add_processing_update(ProcessingStatus::failed(
                    &process.id,
                    UPLOAD_PROCESSOR,
                    "Failed to save uploaded file",
                    error.to_status_error(),
                ));
                warn!("Upload failed: {}", error);
                if status_tx.send(process.clone()).is_err() {
                    debug!("Status receiver dropped during upload");
                }
                return Err(error);
            }
        };

        let mut file = ManagedFile::new(&file_name, "application/octet-stream")
            .with_local_path(&target);
        file.size = size;
        file.update_mime_type();

        let status = ProcessingStatus::progress(
            &process.id,
            UPLOAD_PROCESSOR,
            "File uploaded successfully",
            100,
        )
        .with_resulting_files(vec![file.to_result_file()]);
        process.add_processing_update(status);
        debug!(bytes = size, "Upload stored in temp storage");
        if status_tx.send(process.clone()).is_err() {
            debug!("Status receiver dropped during upload");
        }

        Ok(file)
    }
}

impl FileManager {
    /// Uploads `reader` and runs the stored file through `recipe_name`,
    /// sharing one process log.
    ///
    /// The `upload-<id>` file in temp storage is removed once the run
    /// returns, whatever its outcome. `status_tx` is consumed like in
    /// [`FileManager::process_file`], so the channel closes when this
    /// returns.
    pub fn process_upload<R: Read>(
        &self,
        reader: R,
        total: Option<u64>,
        recipe_name: &str,
        process: &mut FileProcess,
        status_tx: Sender<FileProcess>,
    ) -> Result<Vec<ProcessingResultFile>, PipelineError> {
        let file = self.handle_file_upload(reader, total, process, &status_tx)?;
        let upload_path = file.local_path.clone();

        let result = self.process_file(file, recipe_name, process, status_tx);

        if let Some(path) = upload_path.filter(|p| p.exists()) {
            match std::fs::remove_file(&path) {
                Ok(()) => debug!("Removed upload from temp storage"),
                Err(e) => warn!(
                    file = %sanitize::redact_path(&path),
                    "Failed to remove upload from temp storage: {}", e
                ),
            }
        }
        result
    }
}
