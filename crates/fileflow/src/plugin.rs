//! The contract every processing unit implements.
//!
//! A plugin receives the current ordered file set and the owning
//! [`FileProcess`] and returns a new file set. Files a plugin does not apply
//! to must be passed through unchanged. Any error is fatal for the run.
//!
//! Each plugin declares a typed parameter struct. The recipe's generic
//! `params` value is decoded into it once per step by [`DynPlugin::run`], so
//! a malformed parameter set surfaces as a single
//! [`PluginError::InvalidParams`] before the plugin starts.

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use crate::file::ManagedFile;
use crate::status::FileProcess;

#[derive(Error, Debug)]
pub enum PluginError {
    #[error("Invalid parameters for plugin '{plugin}': {reason}")]
    InvalidParams { plugin: String, reason: String },

    #[error("Failed to decode '{file}': {reason}")]
    Decode { file: String, reason: String },

    #[error("Failed to encode '{file}': {reason}")]
    Encode { file: String, reason: String },

    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Storage error: {0}")]
    Storage(#[from] crate::error::StorageError),

    #[error("{0}")]
    Failed(String),
}

/// A transformation unit with a typed parameter set.
pub trait Plugin: Send + Sync {
    type Params: DeserializeOwned + Default;

    /// Name used in status entries emitted by this plugin.
    fn name(&self) -> &str;

    fn process(
        &self,
        files: Vec<ManagedFile>,
        params: &Self::Params,
        process: &mut FileProcess,
    ) -> Result<Vec<ManagedFile>, PluginError>;
}

/// Object-safe form of [`Plugin`] stored in the registry.
pub trait DynPlugin: Send + Sync {
    fn name(&self) -> &str;

    /// Decodes `params` and runs the plugin. `Value::Null` means "no
    /// parameters" and yields the default parameter set.
    fn run(
        &self,
        files: Vec<ManagedFile>,
        params: &Value,
        process: &mut FileProcess,
    ) -> Result<Vec<ManagedFile>, PluginError>;
}

impl<P: Plugin> DynPlugin for P {
    fn name(&self) -> &str {
        Plugin::name(self)
    }

    fn run(
        &self,
        files: Vec<ManagedFile>,
        params: &Value,
        process: &mut FileProcess,
    ) -> Result<Vec<ManagedFile>, PluginError> {
        let params = decode_params::<P::Params>(Plugin::name(self), params)?;
        self.process(files, &params, process)
    }
}

pub fn decode_params<T: DeserializeOwned + Default>(
    plugin: &str,
    params: &Value,
) -> Result<T, PluginError> {
    if params.is_null() {
        return Ok(T::default());
    }
    serde_json::from_value(params.clone()).map_err(|e| PluginError::InvalidParams {
        plugin: plugin.to_string(),
        reason: e.to_string(),
    })
}

/// Parameter set of plugins that take none. Accepts an empty map and
/// rejects any key.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NoParams {}
