use std::io;
use std::path::{Path, PathBuf};

use bytes::Bytes;
use tempfile::NamedTempFile;
use tokio::io::AsyncWriteExt;

use crate::config::Config;

use super::ResourceName;

/// The directory resources are stored in, relative to the configured cache dir.
const RESOURCES_DIR: &str = "resources";

/// The durable, on-disk tier of the resource cache.
///
/// Each resource is stored as `<cache_dir>/resources/<name>.json`. Entries never expire,
/// they are only removed explicitly via [`DiskCache::cleanup`].
#[derive(Debug, Clone, Default)]
pub struct DiskCache {
    /// Directory to use for storing resources.
    ///
    /// Leaving this as None will disable the disk tier.
    cache_dir: Option<PathBuf>,

    /// Directory to use for temporary files.
    ///
    /// New entries are written to a temporary file in this sibling directory, and once fully
    /// written atomically moved to their actual location within the `cache_dir`.
    tmp_dir: Option<PathBuf>,
}

impl DiskCache {
    pub fn from_config(config: &Config) -> io::Result<Self> {
        let cache_dir = config.cache_dir(RESOURCES_DIR);
        let tmp_dir = config.cache_dir("tmp");

        for dir in [&cache_dir, &tmp_dir].into_iter().flatten() {
            std::fs::create_dir_all(dir)?;
        }

        Ok(Self { cache_dir, tmp_dir })
    }

    /// A disk cache that never hits and never stores anything.
    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn cache_dir(&self) -> Option<&Path> {
        self.cache_dir.as_deref()
    }

    /// The path a resource is stored at, if the disk tier is enabled.
    pub fn path(&self, name: &ResourceName) -> Option<PathBuf> {
        self.cache_dir().map(|dir| dir.join(name.file_name()))
    }

    /// Reads the raw contents of a cached resource.
    ///
    /// Returns `Ok(None)` if the resource is not on disk or the disk tier is disabled.
    pub async fn read(&self, name: &ResourceName) -> io::Result<Option<Bytes>> {
        let Some(path) = self.path(name) else {
            return Ok(None);
        };

        tracing::trace!(resource = %name, "Looking for resource at {}", path.display());
        match tokio::fs::read(&path).await {
            Ok(contents) => {
                tracing::trace!(resource = %name, "Found resource on disk");
                Ok(Some(contents.into()))
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Stores the raw contents of a resource, replacing any previous entry.
    ///
    /// This is best effort: failures are logged and otherwise ignored, the resource will
    /// simply be fetched again next time.
    pub async fn write(&self, name: &ResourceName, contents: &[u8]) {
        let (Some(path), Some(tmp_dir)) = (self.path(name), self.tmp_dir.as_deref()) else {
            return;
        };

        tracing::trace!(resource = %name, "Writing resource to {}", path.display());
        if let Err(e) = write_atomically(tmp_dir, &path, contents).await {
            tracing::error!(
                error = &e as &dyn std::error::Error,
                path = %path.display(),
                "Failed to write resource to disk",
            );
        }
    }

    /// Removes a resource from disk, for instance because it turned out to be corrupted.
    pub async fn remove(&self, name: &ResourceName) {
        let Some(path) = self.path(name) else {
            return;
        };

        if let Err(e) = tokio::fs::remove_file(&path).await {
            // `NotFound` errors are no cause for concern, somebody else was faster.
            if e.kind() != io::ErrorKind::NotFound {
                tracing::error!(
                    error = &e as &dyn std::error::Error,
                    path = %path.display(),
                    "Failed to remove resource from disk",
                );
            }
        }
    }

    /// Removes every cached resource and all leftover temporary files.
    ///
    /// Returns the number of removed resources.
    pub fn cleanup(&self) -> io::Result<usize> {
        if let Some(tmp_dir) = self.tmp_dir.as_deref() {
            clear_dir(tmp_dir)?;
        }
        match self.cache_dir() {
            Some(cache_dir) => clear_dir(cache_dir),
            None => Ok(0),
        }
    }
}

async fn write_atomically(tmp_dir: &Path, path: &Path, contents: &[u8]) -> io::Result<()> {
    let temp_file = NamedTempFile::new_in(tmp_dir)?;

    let mut file = tokio::fs::File::from_std(temp_file.reopen()?);
    file.write_all(contents).await?;
    file.flush().await?;
    file.sync_data().await?;
    drop(file);

    // renaming within the cache dir does not move filesystem boundaries
    temp_file.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Removes all files within `dir`, keeping the directory itself.
fn clear_dir(dir: &Path) -> io::Result<usize> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e),
    };

    let mut removed = 0;
    for entry in entries {
        let path = entry?.path();
        if path.is_dir() {
            std::fs::remove_dir_all(&path)?;
        } else {
            std::fs::remove_file(&path)?;
        }
        removed += 1;
    }
    Ok(removed)
}
