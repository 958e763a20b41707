pub mod loader;
pub mod template;

pub use loader::{load_recipe_file, load_recipes_from_dir, parse_recipe};
pub use template::{render_target_name, replace_file_name_variables};

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Declarative pipeline definition: what it accepts, which steps it runs
/// and where the outputs go.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recipe {
    pub name: String,
    #[serde(default)]
    pub accepted_mime_types: Vec<String>,
    #[serde(default)]
    pub min_file_size: u64,
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,
    #[serde(default)]
    pub processing_steps: Vec<ProcessingStep>,
    #[serde(default)]
    pub output_formats: Vec<OutputFormat>,
}

fn default_max_file_size() -> u64 {
    u64::MAX
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingStep {
    #[serde(default)]
    pub plugin_name: String,
    #[serde(default)]
    pub params: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputFormat {
    #[serde(default)]
    pub format: String,
    #[serde(default)]
    pub target_file_names: Vec<String>,
    /// Kept as written in the recipe; unknown classes fail at run time.
    pub storage_type: String,
}

impl Recipe {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            accepted_mime_types: Vec::new(),
            min_file_size: 0,
            max_file_size: default_max_file_size(),
            processing_steps: Vec::new(),
            output_formats: Vec::new(),
        }
    }

    /// Case-insensitive prefix match against the accepted types, so
    /// `image/` accepts `image/png` and `text/plain` accepts
    /// `text/plain; charset=utf-8`.
    pub fn accepts_mime_type(&self, mime_type: &str) -> bool {
        is_valid_mime_type(mime_type, &self.accepted_mime_types)
    }

    /// Inclusive bounds.
    pub fn accepts_file_size(&self, size: u64) -> bool {
        size >= self.min_file_size && size <= self.max_file_size
    }

    /// Steps that actually run; empty plugin names are no-ops.
    pub fn executable_steps(&self) -> impl Iterator<Item = &ProcessingStep> {
        self.processing_steps
            .iter()
            .filter(|s| !s.plugin_name.trim().is_empty())
    }
}

pub fn is_valid_mime_type(mime_type: &str, accepted_mime_types: &[String]) -> bool {
    let mime_type = mime_type.to_lowercase();
    accepted_mime_types
        .iter()
        .any(|accepted| mime_type.starts_with(&accepted.to_lowercase()))
}
