use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::storage::StorageLayout;

/// Runtime settings of a file manager instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub public_base_path: PathBuf,
    pub private_base_path: PathBuf,
    pub temp_path: PathBuf,
    /// URL under which `public_base_path` is served.
    pub base_url: String,
    #[serde(default)]
    pub recipes_dir: Option<PathBuf>,
    /// `host:port` of a clamd daemon; enables the `virus_scan` plugin.
    #[serde(default)]
    pub clamav_address: Option<String>,
    #[serde(default = "default_clamav_timeout_secs")]
    pub clamav_timeout_secs: u64,
}

fn default_clamav_timeout_secs() -> u64 {
    30
}

impl Default for Settings {
    fn default() -> Self {
        let base = std::env::temp_dir().join("fileflow");
        Self {
            public_base_path: base.join("public"),
            private_base_path: base.join("private"),
            temp_path: base.join("temp"),
            base_url: "http://localhost:8080/files/".to_string(),
            recipes_dir: None,
            clamav_address: None,
            clamav_timeout_secs: default_clamav_timeout_secs(),
        }
    }
}

impl Settings {
    /// `<config dir>/fileflow/config.yaml`, when the platform has one.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("fileflow").join("config.yaml"))
    }

    pub fn storage_layout(&self) -> Result<StorageLayout, ConfigError> {
        StorageLayout::new(
            &self.public_base_path,
            &self.private_base_path,
            &self.temp_path,
            &self.base_url,
        )
        .map_err(|e| ConfigError::Validation {
            message: e.to_string(),
        })
    }
}
