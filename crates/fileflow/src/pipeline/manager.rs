use std::collections::HashMap;
use std::io::Read;
use std::path::Path;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::config::Settings;
use crate::error::{ConfigError, StorageError};
use crate::file::ManagedFile;
use crate::plugin::DynPlugin;
use crate::recipe::{load_recipes_from_dir, Recipe};
use crate::sanitize;
use crate::storage::layout::ensure_directory;
use crate::storage::{StorageLayout, StorageType};

/// Owns the plugin and recipe registries and the storage layout.
///
/// Registration takes the write lock, lookups during a run take the read
/// lock and clone what they need out of it, so a plugin never runs while a
/// registry lock is held.
pub struct FileManager {
    layout: StorageLayout,
    plugins: RwLock<HashMap<String, Arc<dyn DynPlugin>>>,
    recipes: RwLock<HashMap<String, Recipe>>,
}

fn read_lock<'a, T>(lock: &'a RwLock<T>, what: &str) -> RwLockReadGuard<'a, T> {
    match lock.read() {
        Ok(guard) => guard,
        Err(poisoned) => {
            log::warn!("{} lock was poisoned, recovering", what);
            poisoned.into_inner()
        }
    }
}

fn write_lock<'a, T>(lock: &'a RwLock<T>, what: &str) -> RwLockWriteGuard<'a, T> {
    match lock.write() {
        Ok(guard) => guard,
        Err(poisoned) => {
            log::warn!("{} lock was poisoned, recovering", what);
            poisoned.into_inner()
        }
    }
}

impl FileManager {
    pub fn new(layout: StorageLayout) -> Self {
        Self {
            layout,
            plugins: RwLock::new(HashMap::new()),
            recipes: RwLock::new(HashMap::new()),
        }
    }

    /// Builds the layout from settings and loads the configured recipe
    /// directory, if any. Plugins are not registered here.
    pub fn from_settings(settings: &Settings) -> Result<Self, ConfigError> {
        let layout = settings.storage_layout()?;
        let manager = Self::new(layout);
        if let Some(dir) = &settings.recipes_dir {
            manager.load_recipes(dir)?;
        }
        Ok(manager)
    }

    pub fn layout(&self) -> &StorageLayout {
        &self.layout
    }

    /// Registers `plugin` under `name`. A later registration for the same
    /// name replaces the earlier one.
    pub fn add_processing_plugin<P>(&self, name: impl Into<String>, plugin: P)
    where
        P: DynPlugin + 'static,
    {
        self.add_shared_plugin(name, Arc::new(plugin));
    }

    pub fn add_shared_plugin(&self, name: impl Into<String>, plugin: Arc<dyn DynPlugin>) {
        let name = name.into();
        tracing::debug!(plugin = %name, "Registering processing plugin");
        write_lock(&self.plugins, "Plugin registry").insert(name, plugin);
    }

    pub fn has_plugin(&self, name: &str) -> bool {
        read_lock(&self.plugins, "Plugin registry").contains_key(name)
    }

    pub fn plugin_names(&self) -> Vec<String> {
        let mut names: Vec<String> = read_lock(&self.plugins, "Plugin registry")
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    pub(crate) fn plugin(&self, name: &str) -> Option<Arc<dyn DynPlugin>> {
        read_lock(&self.plugins, "Plugin registry").get(name).cloned()
    }

    /// Registers a recipe. Steps naming unknown plugins are only warned
    /// about; they fail when the recipe runs.
    pub fn add_recipe(&self, recipe: Recipe) {
        for step in recipe.executable_steps() {
            if !self.has_plugin(&step.plugin_name) {
                log::warn!(
                    "Recipe '{}' uses processing plugin '{}' which is not registered",
                    recipe.name,
                    step.plugin_name
                );
            }
        }

        let mut recipes = write_lock(&self.recipes, "Recipe registry");
        if recipes.contains_key(&recipe.name) {
            log::warn!("Recipe '{}' is defined more than once, replacing", recipe.name);
        }
        recipes.insert(recipe.name.clone(), recipe);
    }

    /// Loads every recipe file in `dir` and returns how many were added.
    pub fn load_recipes<P: AsRef<Path>>(&self, dir: P) -> Result<usize, ConfigError> {
        let recipes = load_recipes_from_dir(dir)?;
        let count = recipes.len();
        for recipe in recipes {
            self.add_recipe(recipe);
        }
        log::info!("Loaded {} recipe(s)", count);
        Ok(count)
    }

    pub fn get_recipe(&self, name: &str) -> Option<Recipe> {
        read_lock(&self.recipes, "Recipe registry").get(name).cloned()
    }

    pub fn recipe_names(&self) -> Vec<String> {
        let mut names: Vec<String> = read_lock(&self.recipes, "Recipe registry")
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    /// Adopts an existing file into a storage class.
    ///
    /// The file is moved to `<base>/<file name>` when it is not there yet.
    /// Size and mime type come from the file on disk; public files get a URL.
    pub fn create_managed_file_from_path<P: AsRef<Path>>(
        &self,
        local_path: P,
        storage: StorageType,
    ) -> Result<ManagedFile, StorageError> {
        let local_path = local_path.as_ref();
        let metadata = std::fs::metadata(local_path)
            .map_err(|_| StorageError::NotFound(local_path.to_path_buf()))?;
        if !metadata.is_file() {
            return Err(StorageError::NotFound(local_path.to_path_buf()));
        }

        let file_name = sanitize::redact_path(local_path);
        let mut file = ManagedFile::new(&file_name, "application/octet-stream")
            .with_local_path(local_path);
        file.size = metadata.len();
        file.update_mime_type();

        let target = self.layout.local_path_for(storage, &file_name);
        if target != local_path {
            self.layout.relocate(local_path, &target)?;
            tracing::debug!(
                file = %file_name,
                storage = %storage,
                "Moved adopted file into storage"
            );
            file.local_path = Some(target);
        }

        if storage == StorageType::Public {
            if let Some(path) = &file.local_path {
                file.url = Some(self.layout.public_url_for(path)?);
            }
        }

        Ok(file)
    }

    /// Writes `reader` into `<base>/<file_name>` of the given storage class.
    pub fn create_managed_file_from_reader<R: Read>(
        &self,
        file_name: &str,
        mut reader: R,
        storage: StorageType,
    ) -> Result<ManagedFile, StorageError> {
        let file_name = sanitize::sanitize_file_name(file_name);
        let target = self.layout.local_path_for(storage, &file_name);
        if let Some(parent) = target.parent() {
            ensure_directory(parent)?;
        }

        let mut out = std::fs::File::create(&target).map_err(|e| StorageError::WriteFile {
            path: target.clone(),
            source: e,
        })?;
        let written = std::io::copy(&mut reader, &mut out).map_err(|e| StorageError::WriteFile {
            path: target.clone(),
            source: e,
        })?;

        let mut file = ManagedFile::new(&file_name, "application/octet-stream")
            .with_local_path(&target);
        file.size = written;
        file.update_mime_type();
        if storage == StorageType::Public {
            file.url = Some(self.layout.public_url_for(&target)?);
        }
        Ok(file)
    }
}
