use std::path::{Component, Path, PathBuf};

use percent_encoding::percent_decode_str;
use url::Url;

use super::StorageType;
use crate::error::StorageError;

/// Move a file from `src` to `dst`. Uses `rename` first (fast, atomic on same
/// filesystem). Falls back to copy + delete when rename fails, which handles
/// cross-device moves.
pub(crate) fn move_file(src: &Path, dst: &Path) -> Result<(), StorageError> {
    if std::fs::rename(src, dst).is_ok() {
        return Ok(());
    }

    std::fs::copy(src, dst).map_err(|e| StorageError::MoveFile {
        from: src.to_path_buf(),
        to: dst.to_path_buf(),
        source: e,
    })?;
    std::fs::remove_file(src).map_err(|e| StorageError::MoveFile {
        from: src.to_path_buf(),
        to: dst.to_path_buf(),
        source: e,
    })?;
    Ok(())
}

pub(crate) fn ensure_directory(path: &Path) -> Result<(), StorageError> {
    if !path.exists() {
        std::fs::create_dir_all(path).map_err(|e| StorageError::CreateDirectory {
            path: path.to_path_buf(),
            source: e,
        })?;
    }
    Ok(())
}

/// Base paths of the three storage classes and the URL under which the
/// public base path is served.
#[derive(Debug, Clone)]
pub struct StorageLayout {
    public_base: PathBuf,
    private_base: PathBuf,
    temp_base: PathBuf,
    base_url: Url,
}

impl StorageLayout {
    /// The base URL always gets a trailing slash so that relative paths
    /// resolve beneath it rather than replacing its last segment.
    pub fn new<P: AsRef<Path>>(
        public_base: P,
        private_base: P,
        temp_base: P,
        base_url: &str,
    ) -> Result<Self, StorageError> {
        let normalized = if base_url.ends_with('/') {
            base_url.to_string()
        } else {
            format!("{}/", base_url)
        };
        let base_url = Url::parse(&normalized).map_err(|e| StorageError::InvalidBaseUrl {
            url: base_url.to_string(),
            source: e,
        })?;
        if base_url.cannot_be_a_base() {
            return Err(StorageError::OpaqueBaseUrl(base_url.to_string()));
        }

        Ok(Self {
            public_base: public_base.as_ref().to_path_buf(),
            private_base: private_base.as_ref().to_path_buf(),
            temp_base: temp_base.as_ref().to_path_buf(),
            base_url,
        })
    }

    pub fn base_path(&self, storage: StorageType) -> &Path {
        match storage {
            StorageType::Private => &self.private_base,
            StorageType::Temp => &self.temp_base,
            StorageType::Public => &self.public_base,
        }
    }

    pub fn base_url(&self) -> &str {
        self.base_url.as_str()
    }

    pub fn local_path_for<P: AsRef<Path>>(&self, storage: StorageType, relative: P) -> PathBuf {
        self.base_path(storage).join(relative)
    }

    /// Maps a path under the public base path to its public URL.
    ///
    /// Each path component becomes one percent-encoded URL segment under the
    /// base URL, so names containing `:`, `#`, `?` or spaces stay inside it.
    pub fn public_url_for(&self, local_path: &Path) -> Result<String, StorageError> {
        let relative = local_path
            .strip_prefix(&self.public_base)
            .map_err(|_| StorageError::NotInStorage(local_path.to_path_buf()))?;

        let segments: Vec<String> = relative
            .components()
            .filter_map(|c| match c {
                Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
                _ => None,
            })
            .collect();
        if segments.is_empty() {
            return Err(StorageError::NotInStorage(local_path.to_path_buf()));
        }

        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| StorageError::OpaqueBaseUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .extend(&segments);
        Ok(url.to_string())
    }

    /// Reverse of [`Self::public_url_for`]. The file must exist.
    pub fn local_path_of_url(&self, url: &str) -> Result<PathBuf, StorageError> {
        let not_mapped = || StorageError::UrlNotMapped(url.to_string());

        let parsed = Url::parse(url).map_err(|_| not_mapped())?;
        if parsed.origin() != self.base_url.origin()
            || parsed.query().is_some()
            || parsed.fragment().is_some()
        {
            return Err(not_mapped());
        }
        let relative = parsed
            .path()
            .strip_prefix(self.base_url.path())
            .ok_or_else(not_mapped)?;

        let mut local_path = self.public_base.clone();
        let mut has_segment = false;
        for segment in relative.split('/').filter(|s| !s.is_empty()) {
            let decoded = percent_decode_str(segment)
                .decode_utf8()
                .map_err(|_| not_mapped())?;
            if decoded == "." || decoded == ".." || decoded.contains(&['/', '\\'][..]) {
                return Err(not_mapped());
            }
            local_path.push(&*decoded);
            has_segment = true;
        }
        if !has_segment {
            return Err(not_mapped());
        }

        if !local_path.exists() {
            return Err(StorageError::NotFound(local_path));
        }
        Ok(local_path)
    }

    /// Moves `from` to `to`, creating the target directory when needed.
    pub fn relocate(&self, from: &Path, to: &Path) -> Result<(), StorageError> {
        if let Some(parent) = to.parent() {
            ensure_directory(parent)?;
        }
        move_file(from, to)
    }
}
