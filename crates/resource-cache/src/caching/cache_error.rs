use std::time::Duration;

use thiserror::Error;

/// An error that happens when resolving a resource.
///
/// A single resolution is fanned out to every waiter registered for the resource, which is
/// why this error is cheaply [`Clone`]able and carries only rendered messages.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CacheError {
    /// The resource exists in none of the tiers, and the remote source answered with a 404.
    #[error("not found")]
    NotFound,
    /// The requested name cannot identify a resource.
    ///
    /// Names must be non-empty, must not contain path separators and must not start with a dot.
    #[error("invalid resource name: {0:?}")]
    InvalidName(String),
    /// The resource could not be fetched from the remote source due to a timeout.
    #[error("download timed out after {0:?}")]
    Timeout(Duration),
    /// The resource could not be fetched from the remote source due to another problem,
    /// like connection loss, DNS resolution, or a non-success server response.
    ///
    /// The attached string contains the remote source's response.
    #[error("download failed: {0}")]
    DownloadError(String),
    /// The resource was loaded successfully, but is not a valid JSON document.
    #[error("malformed: {0}")]
    Malformed(String),
    /// An unexpected error in the cache itself.
    #[error("internal error")]
    InternalError,
}

impl From<std::io::Error> for CacheError {
    #[track_caller]
    fn from(err: std::io::Error) -> Self {
        Self::from_std_error(err)
    }
}

impl From<serde_json::Error> for CacheError {
    fn from(err: serde_json::Error) -> Self {
        Self::Malformed(err.to_string())
    }
}

impl CacheError {
    #[track_caller]
    pub fn from_std_error<E: std::error::Error + 'static>(e: E) -> Self {
        let dynerr: &dyn std::error::Error = &e; // tracing expects a `&dyn Error`
        tracing::error!(error = dynerr);
        Self::InternalError
    }

    /// Whether a later fetch of the same resource may succeed.
    ///
    /// Invalid names never resolve, everything else is worth another attempt.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::InvalidName(_))
    }
}

/// An entry in a cache, containing either `Ok(T)` or an error denoting the reason why a
/// resource could not be resolved.
pub type CacheEntry<T = ()> = Result<T, CacheError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_errors_are_malformed() {
        let err = serde_json::from_str::<serde_json::Value>("{ nope").unwrap_err();
        let err = CacheError::from(err);
        assert!(matches!(err, CacheError::Malformed(_)));
        assert!(err.is_retryable());
    }

    #[test]
    fn test_io_errors_are_internal() {
        let err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "nope");
        assert_eq!(CacheError::from(err), CacheError::InternalError);
    }

    #[test]
    fn test_display() {
        assert_eq!(CacheError::NotFound.to_string(), "not found");
        assert_eq!(
            CacheError::DownloadError("500 Internal Server Error".into()).to_string(),
            "download failed: 500 Internal Server Error"
        );
        assert_eq!(
            CacheError::InvalidName("../etc".into()).to_string(),
            "invalid resource name: \"../etc\""
        );
    }
}
