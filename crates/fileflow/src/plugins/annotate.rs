use serde::Deserialize;
use serde_json::{Map, Value};

use crate::file::ManagedFile;
use crate::plugin::{Plugin, PluginError};
use crate::status::FileProcess;

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AnnotateParams {
    /// Merged into each file's metadata, overwriting existing keys.
    #[serde(default)]
    pub set: Map<String, Value>,
}

/// Attaches static metadata, typically consumed by output name templates.
pub struct Annotate;

impl Plugin for Annotate {
    type Params = AnnotateParams;

    fn name(&self) -> &str {
        "Annotate"
    }

    fn process(
        &self,
        mut files: Vec<ManagedFile>,
        params: &AnnotateParams,
        process: &mut FileProcess,
    ) -> Result<Vec<ManagedFile>, PluginError> {
        for file in &mut files {
            for (key, value) in &params.set {
                file.metadata.insert(key.clone(), value.clone());
            }
        }
        super::report(
            process,
            self.name(),
            format!("Set {} metadata key(s) on {} file(s)", params.set.len(), files.len()),
        );
        Ok(files)
    }
}
