use std::fmt;
use std::sync::Arc;

use super::CacheError;

/// The file extension of every resource, on the CDN as well as on disk.
const EXTENSION: &str = "json";

/// The name of a JSON resource.
///
/// The name is used both as the key of the in-memory cache and to derive the file name of the
/// disk cache, bundled asset and remote URL, so it is validated to be a single, non-hidden path
/// component.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceName(Arc<str>);

impl ResourceName {
    /// Validates and wraps the given name.
    pub fn new(name: &str) -> Result<Self, CacheError> {
        let is_valid = !name.is_empty()
            && !name.starts_with('.')
            && !name.contains(['/', '\\', '\0']);

        if is_valid {
            Ok(Self(Arc::from(name)))
        } else {
            Err(CacheError::InvalidName(name.to_owned()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The file name this resource is stored under, `<name>.json`.
    pub fn file_name(&self) -> String {
        format!("{}.{EXTENSION}", self.0)
    }
}

impl AsRef<str> for ResourceName {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl fmt::Display for ResourceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
