//! Resources bundled with the application.
//!
//! Bundled assets are consulted synchronously and only ever serve as a placeholder while the
//! authoritative copy of a resource is being resolved.

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use crate::caching::{Resource, ResourceName};

/// Read-only access to the files shipped with the application.
pub trait AssetSource: fmt::Debug + Send + Sync + 'static {
    /// Whether a file with the given name is bundled.
    fn contains(&self, file_name: &str) -> bool;

    /// Reads the full contents of a bundled file.
    fn read(&self, file_name: &str) -> io::Result<Vec<u8>>;
}

/// Loads and parses the bundled asset for `name`, if there is one.
///
/// Unreadable or malformed assets are logged and treated as absent.
pub fn load_asset(assets: &dyn AssetSource, name: &ResourceName) -> Option<Resource> {
    let file_name = name.file_name();
    if !assets.contains(&file_name) {
        return None;
    }

    let bytes = match assets.read(&file_name) {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::error!(
                error = &e as &dyn std::error::Error,
                resource = %name,
                "Failed to read bundled asset",
            );
            return None;
        }
    };

    match serde_json::from_slice(&bytes) {
        Ok(value) => {
            tracing::trace!(resource = %name, "Found bundled asset");
            Some(Arc::new(value))
        }
        Err(e) => {
            tracing::error!(
                error = &e as &dyn std::error::Error,
                resource = %name,
                "Bundled asset is not valid JSON",
            );
            None
        }
    }
}

/// Assets shipped as plain files in a directory.
#[derive(Debug, Clone)]
pub struct DirectoryAssets {
    root: PathBuf,
}

impl DirectoryAssets {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl AssetSource for DirectoryAssets {
    fn contains(&self, file_name: &str) -> bool {
        self.root.join(file_name).is_file()
    }

    fn read(&self, file_name: &str) -> io::Result<Vec<u8>> {
        std::fs::read(self.root.join(file_name))
    }
}

/// Assets kept in memory, typically compiled into the binary with `include_str!`.
#[derive(Debug, Clone, Default)]
pub struct EmbeddedAssets {
    files: BTreeMap<String, Cow<'static, str>>,
}

impl EmbeddedAssets {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds the file `file_name` with the given contents.
    pub fn with_file(
        mut self,
        file_name: impl Into<String>,
        contents: impl Into<Cow<'static, str>>,
    ) -> Self {
        self.files.insert(file_name.into(), contents.into());
        self
    }
}

impl AssetSource for EmbeddedAssets {
    fn contains(&self, file_name: &str) -> bool {
        self.files.contains_key(file_name)
    }

    fn read(&self, file_name: &str) -> io::Result<Vec<u8>> {
        self.files
            .get(file_name)
            .map(|contents| contents.as_bytes().to_vec())
            .ok_or_else(|| io::ErrorKind::NotFound.into())
    }
}

/// No bundled assets at all.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoAssets;

impl AssetSource for NoAssets {
    fn contains(&self, _file_name: &str) -> bool {
        false
    }

    fn read(&self, _file_name: &str) -> io::Result<Vec<u8>> {
        Err(io::ErrorKind::NotFound.into())
    }
}
