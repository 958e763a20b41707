pub mod layout;

pub use layout::StorageLayout;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Storage class of a materialized file. Each class has its own base path;
/// only `Public` files get an externally reachable URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageType {
    Private,
    Temp,
    Public,
}

impl StorageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            StorageType::Private => "private",
            StorageType::Temp => "temp",
            StorageType::Public => "public",
        }
    }
}

impl fmt::Display for StorageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Invalid storage type: {0}")]
pub struct ParseStorageTypeError(pub String);

impl FromStr for StorageType {
    type Err = ParseStorageTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "private" => Ok(StorageType::Private),
            "temp" => Ok(StorageType::Temp),
            "public" => Ok(StorageType::Public),
            _ => Err(ParseStorageTypeError(s.to_string())),
        }
    }
}
