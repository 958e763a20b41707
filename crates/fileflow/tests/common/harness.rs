//! Isolated storage directories plus a `FileManager` wired to them.

#![allow(dead_code)]

use std::path::{Path, PathBuf};

use tempfile::TempDir;

use fileflow::{
    FileManager, FileProcess, ManagedFile, PipelineError, ProcessingResultFile, StorageLayout,
};

pub const BASE_URL: &str = "https://cdn.x/";

/// What a consumer observed while a pipeline ran on another thread.
pub struct RunOutcome {
    pub result: Result<Vec<ProcessingResultFile>, PipelineError>,
    /// Every snapshot received on the status channel, in order.
    pub snapshots: Vec<FileProcess>,
    /// The process after the run returned.
    pub process: FileProcess,
}

pub struct TestHarness {
    temp_dir: TempDir,
    pub public_dir: PathBuf,
    pub private_dir: PathBuf,
    pub temp_path: PathBuf,
    pub manager: FileManager,
}

impl TestHarness {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let public_dir = temp_dir.path().join("pub");
        let private_dir = temp_dir.path().join("priv");
        let temp_path = temp_dir.path().join("tmp");

        let layout = StorageLayout::new(&public_dir, &private_dir, &temp_path, BASE_URL)
            .expect("Failed to build storage layout");

        Self {
            temp_dir,
            public_dir,
            private_dir,
            temp_path,
            manager: FileManager::new(layout),
        }
    }

    pub fn root(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Runs the pipeline on a worker thread and drains the channel here,
    /// the way an observer would.
    pub fn run(&self, file: ManagedFile, recipe: &str) -> RunOutcome {
        let mut process = FileProcess::new(file.file_name.clone(), recipe);
        let (status_tx, status_rx) = crossbeam_channel::unbounded();

        let (result, snapshots) = std::thread::scope(|scope| {
            let worker = scope.spawn(|| {
                self.manager
                    .process_file(file, recipe, &mut process, status_tx)
            });
            let snapshots: Vec<FileProcess> = status_rx.iter().collect();
            (worker.join().expect("pipeline thread panicked"), snapshots)
        });

        RunOutcome {
            result,
            snapshots,
            process,
        }
    }

    /// All regular files below `dir`, relative to it.
    pub fn files_in(&self, dir: &Path) -> Vec<PathBuf> {
        let mut files: Vec<PathBuf> = walkdir::WalkDir::new(dir)
            .into_iter()
            .filter_map(Result::ok)
            .filter(|e| e.file_type().is_file())
            .filter_map(|e| e.path().strip_prefix(dir).ok().map(Path::to_path_buf))
            .collect();
        files.sort();
        files
    }
}
