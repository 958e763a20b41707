use std::path::{Component, Path};

use crossbeam_channel::Sender;
use serde_json::Value;
use tracing::{debug, info, info_span, warn};

use crate::error::StorageError;
use crate::file::ManagedFile;
use crate::recipe::{render_target_name, Recipe};
use crate::sanitize;
use crate::status::{FileProcess, ProcessingResultFile, ProcessingStatus};
use crate::storage::StorageType;

use super::error::PipelineError;
use super::manager::FileManager;

/// Recipe name of the throwaway process used by
/// [`FileManager::run_processing_step`].
pub const SINGLE_STEP_RECIPE: &str = "SingleStepProcess";

/// A failed phase: who failed, what the consumer is told, and why.
struct PhaseFailure {
    processor: String,
    description: String,
    error: PipelineError,
}

impl PhaseFailure {
    fn new(processor: &str, description: String, error: PipelineError) -> Self {
        Self {
            processor: processor.to_string(),
            description,
            error,
        }
    }
}

/// Forwards a snapshot of the process. A consumer that went away only stops
/// observing; the run itself continues.
fn forward(status_tx: &Sender<FileProcess>, process: &FileProcess) {
    if status_tx.send(process.clone()).is_err() {
        debug!(process_id = %process.id, "Status receiver dropped, continuing without observer");
    }
}

impl FileManager {
    /// Runs `file` through the named recipe.
    ///
    /// Every status appended to `process` is forwarded on `status_tx`. The
    /// last one is the single terminal status. `status_tx` is consumed, so
    /// the channel closes when this returns, on success and failure alike.
    pub fn process_file(
        &self,
        file: ManagedFile,
        recipe_name: &str,
        process: &mut FileProcess,
        status_tx: Sender<FileProcess>,
    ) -> Result<Vec<ProcessingResultFile>, PipelineError> {
        let filename = sanitize::redact_path(Path::new(&file.file_name));
        let _pipeline_span = info_span!("pipeline",
            process_id = %process.id,
            filename = %filename,
            recipe = %recipe_name,
        )
        .entered();

        match self.run_pipeline(file, recipe_name, process, &status_tx) {
            Ok(resulting_files) => {
                let status = ProcessingStatus::completed(
                    &process.id,
                    "FileProcessing",
                    "File processing completed",
                    resulting_files.clone(),
                );
                process.add_processing_update(status);
                info!(outputs = resulting_files.len(), "File processing completed");
                forward(&status_tx, process);
                Ok(resulting_files)
            }
            Err(failure) => {
                let status = ProcessingStatus::failed(
                    &process.id,
                    &failure.processor,
                    failure.description,
                    failure.error.to_status_error(),
                );
                process.add_processing_update(status);
                info!(processor = %failure.processor, "File processing failed: {}", failure.error);
                forward(&status_tx, process);
                Err(failure.error)
            }
        }
    }

    fn run_pipeline(
        &self,
        mut file: ManagedFile,
        recipe_name: &str,
        process: &mut FileProcess,
        status_tx: &Sender<FileProcess>,
    ) -> Result<Vec<ProcessingResultFile>, PhaseFailure> {
        let recipe = self.get_recipe(recipe_name).ok_or_else(|| {
            PhaseFailure::new(
                "RecipeCheck",
                format!("Recipe not found: {}", recipe_name),
                PipelineError::RecipeNotFound(recipe_name.to_string()),
            )
        })?;

        if !recipe.accepts_mime_type(&file.mime_type) {
            return Err(PhaseFailure::new(
                "MimeTypeCheck",
                format!("Invalid MIME type: {}", file.mime_type),
                PipelineError::InvalidMimeType(file.mime_type.clone()),
            ));
        }

        let size = file.update_file_size();
        if !recipe.accepts_file_size(size) {
            return Err(PhaseFailure::new(
                "FileSizeCheck",
                format!("Invalid file size: {} bytes", size),
                PipelineError::InvalidFileSize(size),
            ));
        }

        let files = self.run_steps(vec![file], &recipe, process, status_tx)?;

        let _step = info_span!("output_expansion").entered();
        self.expand_outputs(files, &recipe, process)
    }

    fn run_steps(
        &self,
        mut files: Vec<ManagedFile>,
        recipe: &Recipe,
        process: &mut FileProcess,
        status_tx: &Sender<FileProcess>,
    ) -> Result<Vec<ManagedFile>, PhaseFailure> {
        let total = recipe.executable_steps().count();

        for (index, step) in recipe.executable_steps().enumerate() {
            let name = step.plugin_name.as_str();
            let _step = info_span!("step", plugin = %name, index).entered();

            let plugin = self.plugin(name).ok_or_else(|| {
                PhaseFailure::new(
                    name,
                    format!("processing plugin({}) not found", name),
                    PipelineError::PluginNotFound(name.to_string()),
                )
            })?;

            files = plugin.run(files, &step.params, process).map_err(|e| {
                PhaseFailure::new(
                    name,
                    format!("Processing failed: {}", e),
                    PipelineError::PluginExecutionFailed {
                        plugin: name.to_string(),
                        source: e,
                    },
                )
            })?;

            // The next step and output expansion both need at least one file.
            if files.is_empty() {
                return Err(PhaseFailure::new(
                    name,
                    format!("Processing plugin({}) returned no files", name),
                    PipelineError::EmptyPluginOutput(name.to_string()),
                ));
            }

            let percentage = ((index + 1) * 100 / total) as u8;
            process.add_processing_update(ProcessingStatus::progress(
                &process.id,
                name,
                format!("Processing step completed: {}", name),
                percentage,
            ));
            debug!(files = files.len(), percentage, "Processing step completed");
            forward(status_tx, process);
        }

        Ok(files)
    }

    /// Materializes every final file for every output format and target
    /// template.
    fn expand_outputs(
        &self,
        mut files: Vec<ManagedFile>,
        recipe: &Recipe,
        process: &FileProcess,
    ) -> Result<Vec<ProcessingResultFile>, PhaseFailure> {
        let mut targets = Vec::with_capacity(recipe.output_formats.len());
        for output in &recipe.output_formats {
            let storage: StorageType = output.storage_type.parse().map_err(|_| {
                PhaseFailure::new(
                    "OutputFormatCheck",
                    format!("Invalid storage type: {}", output.storage_type),
                    PipelineError::OutputStorageInvalid(output.storage_type.clone()),
                )
            })?;
            targets.push((output, storage));
        }

        let mut resulting_files = Vec::new();

        for file in &mut files {
            file.set_metadata("process_id", process.id.clone());
            if targets.is_empty() {
                continue;
            }

            let content = file
                .load_content()
                .map(<[u8]>::to_vec)
                .map_err(|e| save_failure(e.into()))?;

            for (output, storage) in &targets {
                for template in &output.target_file_names {
                    let relative = render_target_name(template, file, &output.format);
                    validate_output_path(&relative).map_err(|e| {
                        PhaseFailure::new(
                            "OutputFormatCheck",
                            format!("Invalid output path: {}", relative),
                            e,
                        )
                    })?;

                    let output_file = self
                        .materialize(file, &relative, *storage, content.clone())
                        .map_err(save_failure)?;
                    debug!(
                        output = %sanitize::redact_path(Path::new(&relative)),
                        storage = %storage,
                        "Stored output file"
                    );
                    resulting_files.push(output_file.to_result_file());
                }
            }
        }

        Ok(resulting_files)
    }

    fn materialize(
        &self,
        source: &ManagedFile,
        relative: &str,
        storage: StorageType,
        content: Vec<u8>,
    ) -> Result<ManagedFile, PipelineError> {
        let local_path = self.layout().local_path_for(storage, relative);
        let url = match storage {
            StorageType::Public => Some(self.layout().public_url_for(&local_path)?),
            StorageType::Private | StorageType::Temp => None,
        };

        let mut output = ManagedFile {
            file_name: sanitize::redact_path(&local_path),
            mime_type: source.mime_type.clone(),
            url,
            local_path: Some(local_path),
            size: source.size,
            metadata: source.metadata.clone(),
            processing_errors: source.processing_errors.clone(),
            content: Some(content),
        };
        output.save()?;
        output.content = None;
        Ok(output)
    }

    /// Runs one plugin against one file outside of any recipe.
    ///
    /// With a `target` storage class the result ends up at
    /// `<base>/<file name>`: written there when the plugin produced content,
    /// moved there otherwise. Public targets get a URL.
    pub fn run_processing_step(
        &self,
        file: ManagedFile,
        plugin_name: &str,
        params: &Value,
        target: Option<StorageType>,
    ) -> Result<ManagedFile, PipelineError> {
        let _span = info_span!("processing_step",
            plugin = %plugin_name,
            filename = %sanitize::redact_path(Path::new(&file.file_name)),
        )
        .entered();

        let plugin = self
            .plugin(plugin_name)
            .ok_or_else(|| PipelineError::PluginNotFound(plugin_name.to_string()))?;

        let mut process = FileProcess::new(&file.file_name, SINGLE_STEP_RECIPE);
        process.add_processing_update(ProcessingStatus::progress(
            &process.id,
            plugin_name,
            "Initiating single step processing",
            0,
        ));

        let result = match plugin.run(vec![file], params, &mut process) {
            Ok(files) => files
                .into_iter()
                .next()
                .ok_or_else(|| PipelineError::EmptyPluginOutput(plugin_name.to_string())),
            Err(e) => Err(PipelineError::PluginExecutionFailed {
                plugin: plugin_name.to_string(),
                source: e,
            }),
        }
        .and_then(|file| match target {
            Some(storage) => self.place_in_storage(file, storage),
            None => Ok(file),
        });

        match result {
            Ok(file) => {
                process.add_processing_update(ProcessingStatus::completed(
                    &process.id,
                    plugin_name,
                    "Processing completed successfully",
                    vec![file.to_result_file()],
                ));
                debug!(updates = process.processing_updates().len(), "Single step completed");
                Ok(file)
            }
            Err(e) => {
                process.add_processing_update(ProcessingStatus::failed(
                    &process.id,
                    plugin_name,
                    "Error during processing",
                    e.to_status_error(),
                ));
                warn!("Single step processing failed: {}", e);
                Err(e)
            }
        }
    }

    fn place_in_storage(
        &self,
        mut file: ManagedFile,
        storage: StorageType,
    ) -> Result<ManagedFile, PipelineError> {
        let file_name = sanitize::sanitize_file_name(&file.file_name);
        let target = self.layout().local_path_for(storage, &file_name);

        match file.local_path.clone() {
            // Content produced by the plugin wins over whatever is on disk.
            _ if file.content.is_some() => {
                file.local_path = Some(target.clone());
                file.save()?;
            }
            Some(current) if current == target => {}
            Some(current) => {
                self.layout().relocate(&current, &target)?;
                file.local_path = Some(target.clone());
            }
            None => return Err(StorageError::NoContent(file.file_name.clone()).into()),
        }

        if storage == StorageType::Public {
            file.url = Some(self.layout().public_url_for(&target)?);
        }
        Ok(file)
    }
}

fn save_failure(error: PipelineError) -> PhaseFailure {
    PhaseFailure {
        processor: "FileSave".to_string(),
        description: format!("Failed to save output file: {}", error),
        error,
    }
}

/// Output names are relative to their storage base and must stay inside it.
fn validate_output_path(relative: &str) -> Result<(), PipelineError> {
    let path = Path::new(relative);
    if relative.trim().is_empty() || path.file_name().is_none() {
        return Err(PipelineError::InvalidOutputPath(format!(
            "Resolved file name is empty: '{}'",
            relative
        )));
    }
    if path.is_absolute() || relative.starts_with('/') || relative.starts_with('\\') {
        return Err(PipelineError::InvalidOutputPath(format!(
            "Resolved path is absolute: {}",
            relative
        )));
    }
    if path
        .components()
        .any(|c| matches!(c, Component::ParentDir | Component::Prefix(_)))
    {
        return Err(PipelineError::InvalidOutputPath(format!(
            "Resolved path contains path traversal: {}",
            relative
        )));
    }
    Ok(())
}
