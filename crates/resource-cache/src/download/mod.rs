//! Fetching resources from the remote CDN.
//!
//! The cache only talks to the network through the [`ResourceTransport`] trait, which hands back
//! the raw [`ResourceResponse`]. Interpreting status codes and bodies is left to
//! [`ResourceResponse::into_resource`], so that every transport gets the same error semantics.

use std::error::Error;
use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use futures::future::BoxFuture;
use reqwest::StatusCode;
use url::Url;

use crate::caching::{CacheEntry, CacheError, Resource, ResourceName};

mod http;

pub use self::http::HttpTransport;

impl CacheError {
    fn download_error(mut error: &dyn Error) -> Self {
        while let Some(src) = error.source() {
            error = src;
        }

        let mut error_string = error.to_string();

        // Special-case a few error strings
        if error_string.contains("certificate verify failed") {
            error_string = "certificate verify failed".to_string();
        }

        if error_string.contains("SSL routines") {
            error_string = "SSL error".to_string();
        }

        Self::DownloadError(error_string)
    }
}

impl From<reqwest::Error> for CacheError {
    fn from(error: reqwest::Error) -> Self {
        Self::download_error(&error)
    }
}

/// A GET request for a single resource document on the CDN.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceRequest {
    pub name: ResourceName,
    pub url: Url,
}

impl ResourceRequest {
    /// Creates the request for `<base_url>/<name>.json`.
    ///
    /// The file name is appended as a single, percent-encoded path segment, so the name can
    /// never alter the host, query or fragment of `base_url`.
    pub fn new(base_url: &Url, name: ResourceName) -> CacheEntry<Self> {
        let mut url = base_url.clone();
        url.path_segments_mut()
            .map_err(|_| CacheError::DownloadError(format!("invalid CDN url: {base_url}")))?
            .pop_if_empty()
            .push(&name.file_name());

        Ok(Self { name, url })
    }
}

impl fmt::Display for ResourceRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GET {}", self.url)
    }
}

/// The raw response of the CDN.
#[derive(Debug, Clone)]
pub struct ResourceResponse {
    pub status: StatusCode,
    pub body: Bytes,
}

impl ResourceResponse {
    /// Turns this response into a parsed resource.
    ///
    /// Any non-success status is an error, and a body that is not valid JSON is
    /// [`Malformed`](CacheError::Malformed).
    pub fn into_resource(self) -> CacheEntry<Resource> {
        match self.status {
            status if status.is_success() => {
                let value: serde_json::Value = serde_json::from_slice(&self.body)?;
                Ok(Arc::new(value))
            }
            StatusCode::NOT_FOUND | StatusCode::GONE => Err(CacheError::NotFound),
            status => Err(CacheError::DownloadError(status.to_string())),
        }
    }
}

impl fmt::Display for ResourceResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({} bytes)", self.status, self.body.len())
    }
}

/// The network layer used by the cache to fetch resources.
///
/// Connectivity problems are reported as errors, whereas any response the server gave, whatever
/// its status, is handed back as a [`ResourceResponse`].
pub trait ResourceTransport: fmt::Debug + Send + Sync + 'static {
    fn execute<'a>(
        &'a self,
        request: &'a ResourceRequest,
    ) -> BoxFuture<'a, CacheEntry<ResourceResponse>>;
}
