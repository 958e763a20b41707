//! Loads recipe definitions from a directory of YAML files.

use std::path::Path;

use walkdir::WalkDir;

use super::Recipe;
use crate::error::ConfigError;

/// Loads every `*.yaml` / `*.yml` file directly inside `dir`.
///
/// A missing or unreadable directory is an error. Files that cannot be read,
/// parsed or validated are logged and skipped.
pub fn load_recipes_from_dir<P: AsRef<Path>>(dir: P) -> Result<Vec<Recipe>, ConfigError> {
    let dir = dir.as_ref();
    log::debug!("Loading recipes from {}", dir.display());

    let mut recipes = Vec::new();

    for entry in WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
    {
        let entry = entry.map_err(|e| ConfigError::ReadDirectory {
            path: dir.to_path_buf(),
            source: e,
        })?;
        let path = entry.path();

        if !entry.file_type().is_file() {
            continue;
        }

        let is_hidden = path
            .file_name()
            .and_then(|n| n.to_str())
            .map(|n| n.starts_with('.'))
            .unwrap_or(false);
        if is_hidden {
            continue;
        }

        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        if ext != "yaml" && ext != "yml" {
            continue;
        }

        match load_recipe_file(path) {
            Ok(recipe) => {
                log::debug!("Loaded recipe '{}' from {}", recipe.name, path.display());
                recipes.push(recipe);
            }
            Err(e) => {
                log::warn!("Skipping recipe file {}: {}", path.display(), e);
            }
        }
    }

    Ok(recipes)
}

pub fn load_recipe_file(path: &Path) -> Result<Recipe, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;
    parse_recipe(&content, path)
}

/// Parses and validates one recipe. `path` is only used in error messages.
pub fn parse_recipe(content: &str, path: &Path) -> Result<Recipe, ConfigError> {
    let recipe: Recipe = serde_yaml::from_str(content).map_err(|e| ConfigError::ParseYaml {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;

    validate_recipe(&recipe)?;
    Ok(recipe)
}

fn validate_recipe(recipe: &Recipe) -> Result<(), ConfigError> {
    if recipe.name.trim().is_empty() {
        return Err(ConfigError::InvalidRecipe {
            name: recipe.name.clone(),
            reason: "Recipe name must not be empty".to_string(),
        });
    }

    if recipe.min_file_size > recipe.max_file_size {
        return Err(ConfigError::InvalidRecipe {
            name: recipe.name.clone(),
            reason: format!(
                "min_file_size ({}) is greater than max_file_size ({})",
                recipe.min_file_size, recipe.max_file_size
            ),
        });
    }

    for output in &recipe.output_formats {
        if output.target_file_names.is_empty() {
            log::warn!(
                "Recipe '{}' has an output format without target file names",
                recipe.name
            );
        }
    }

    Ok(())
}
