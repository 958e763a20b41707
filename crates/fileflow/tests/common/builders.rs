//! Builders for recipes and small plugins that exercise the engine.

#![allow(dead_code)]

use std::io::{Read, Write};
use std::net::TcpListener;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

use serde_json::Value;

use fileflow::status::ProcessingStatus;
use fileflow::{FileProcess, ManagedFile, OutputFormat, Plugin, PluginError, ProcessingStep, Recipe};

/// Builder for creating `Recipe` instances.
pub struct RecipeBuilder {
    recipe: Recipe,
}

impl RecipeBuilder {
    /// Accepts `text/` files of any size and has no steps or outputs.
    pub fn new(name: &str) -> Self {
        let mut recipe = Recipe::new(name);
        recipe.accepted_mime_types = vec!["text/".to_string()];
        Self { recipe }
    }

    pub fn accept(mut self, mime_types: &[&str]) -> Self {
        self.recipe.accepted_mime_types = mime_types.iter().map(|m| m.to_string()).collect();
        self
    }

    pub fn size_bounds(mut self, min: u64, max: u64) -> Self {
        self.recipe.min_file_size = min;
        self.recipe.max_file_size = max;
        self
    }

    pub fn step(mut self, plugin_name: &str) -> Self {
        self.recipe.processing_steps.push(ProcessingStep {
            plugin_name: plugin_name.to_string(),
            params: Value::Null,
        });
        self
    }

    pub fn step_with(mut self, plugin_name: &str, params: Value) -> Self {
        self.recipe.processing_steps.push(ProcessingStep {
            plugin_name: plugin_name.to_string(),
            params,
        });
        self
    }

    pub fn output(mut self, format: &str, targets: &[&str], storage_type: &str) -> Self {
        self.recipe.output_formats.push(OutputFormat {
            format: format.to_string(),
            target_file_names: targets.iter().map(|t| t.to_string()).collect(),
            storage_type: storage_type.to_string(),
        });
        self
    }

    pub fn build(self) -> Recipe {
        self.recipe
    }
}

/// In-memory text file.
pub fn text_file(name: &str, content: &str) -> ManagedFile {
    ManagedFile::from_bytes(name, "text/plain", content.as_bytes().to_vec())
}

/// Identity plugin that counts its invocations and appends one status.
#[derive(Clone, Default)]
pub struct CountingPlugin {
    calls: Arc<AtomicUsize>,
}

impl CountingPlugin {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Plugin for CountingPlugin {
    type Params = Value;

    fn name(&self) -> &str {
        "Counting"
    }

    fn process(
        &self,
        files: Vec<ManagedFile>,
        _params: &Value,
        process: &mut FileProcess,
    ) -> Result<Vec<ManagedFile>, PluginError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let percentage = process.latest_status().map_or(0, |s| s.percentage);
        let status = ProcessingStatus::progress(&process.id, "Counting", "Counted files", percentage);
        process.add_processing_update(status);
        Ok(files)
    }
}

/// Always fails.
pub struct FailingPlugin;

impl Plugin for FailingPlugin {
    type Params = Value;

    fn name(&self) -> &str {
        "Failing"
    }

    fn process(
        &self,
        _files: Vec<ManagedFile>,
        _params: &Value,
        _process: &mut FileProcess,
    ) -> Result<Vec<ManagedFile>, PluginError> {
        Err(PluginError::Failed("boom".to_string()))
    }
}

/// Returns no files at all.
pub struct SwallowingPlugin;

impl Plugin for SwallowingPlugin {
    type Params = Value;

    fn name(&self) -> &str {
        "Swallowing"
    }

    fn process(
        &self,
        _files: Vec<ManagedFile>,
        _params: &Value,
        _process: &mut FileProcess,
    ) -> Result<Vec<ManagedFile>, PluginError> {
        Ok(Vec::new())
    }
}

/// Splits every input into `parts` text files `part1.txt`, `part2.txt`, ...
/// with `metadata.part` set to the part number.
pub struct SplittingPlugin {
    pub parts: usize,
}

impl Plugin for SplittingPlugin {
    type Params = Value;

    fn name(&self) -> &str {
        "Splitting"
    }

    fn process(
        &self,
        files: Vec<ManagedFile>,
        _params: &Value,
        _process: &mut FileProcess,
    ) -> Result<Vec<ManagedFile>, PluginError> {
        let mut out = Vec::new();
        for file in &files {
            for part in 1..=self.parts {
                let mut piece = text_file(&format!("part{}.txt", part), &format!("part {}", part));
                piece.metadata = file.metadata.clone();
                piece.set_metadata("part", part);
                out.push(piece);
            }
        }
        Ok(out)
    }
}

/// Concatenates every input into one `joined.txt`.
pub struct JoiningPlugin;

impl Plugin for JoiningPlugin {
    type Params = Value;

    fn name(&self) -> &str {
        "Joining"
    }

    fn process(
        &self,
        mut files: Vec<ManagedFile>,
        _params: &Value,
        _process: &mut FileProcess,
    ) -> Result<Vec<ManagedFile>, PluginError> {
        let mut joined = Vec::new();
        for file in &mut files {
            joined.extend_from_slice(file.load_content()?);
        }
        Ok(vec![ManagedFile::from_bytes("joined.txt", "text/plain", joined)])
    }
}

/// clamd stand-in that answers one `zINSTREAM` with `reply`.
pub fn fake_clamd(reply: &'static [u8]) -> (String, thread::JoinHandle<Vec<u8>>) {
    let listener = TcpListener::bind("127.0.0.1:0").expect("Failed to bind fake clamd");
    let address = listener.local_addr().unwrap().to_string();
    let handle = thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        let mut command = [0u8; 10];
        stream.read_exact(&mut command).unwrap();
        assert_eq!(&command, b"zINSTREAM\0");

        let mut received = Vec::new();
        loop {
            let mut len = [0u8; 4];
            stream.read_exact(&mut len).unwrap();
            let len = u32::from_be_bytes(len) as usize;
            if len == 0 {
                break;
            }
            let mut chunk = vec![0u8; len];
            stream.read_exact(&mut chunk).unwrap();
            received.extend_from_slice(&chunk);
        }
        stream.write_all(reply).unwrap();
        received
    });
    (address, handle)
}
