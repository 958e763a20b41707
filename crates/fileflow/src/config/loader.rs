use std::path::Path;

use crate::config::schema::Settings;
use crate::error::ConfigError;

pub fn load_settings<P: AsRef<Path>>(path: P) -> Result<Settings, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    let settings: Settings =
        serde_yaml::from_str(&content).map_err(|e| ConfigError::ParseYaml {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

    validate_settings(&settings)?;
    Ok(settings)
}

pub fn load_settings_from_str(content: &str) -> Result<Settings, ConfigError> {
    let settings: Settings =
        serde_yaml::from_str(content).map_err(|e| ConfigError::ParseYaml {
            path: "<inline>".into(),
            message: e.to_string(),
        })?;

    validate_settings(&settings)?;
    Ok(settings)
}

fn validate_settings(settings: &Settings) -> Result<(), ConfigError> {
    let paths = [
        ("public_base_path", &settings.public_base_path),
        ("private_base_path", &settings.private_base_path),
        ("temp_path", &settings.temp_path),
    ];
    for (field, path) in paths {
        if path.as_os_str().is_empty() {
            return Err(ConfigError::Validation {
                message: format!("{} must not be empty", field),
            });
        }
    }

    url::Url::parse(&settings.base_url).map_err(|e| ConfigError::Validation {
        message: format!("Invalid base_url '{}': {}", settings.base_url, e),
    })?;

    if let Some(address) = &settings.clamav_address {
        if !address.contains(':') {
            return Err(ConfigError::Validation {
                message: format!("clamav_address must be host:port, got '{}'", address),
            });
        }
    }

    Ok(())
}
