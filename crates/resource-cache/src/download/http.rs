//! Support to download resources from an HTTP CDN.

use futures::FutureExt;
use futures::future::BoxFuture;
use reqwest::{Client, header};

use crate::caching::{CacheEntry, CacheError};
use crate::config::Config;
use crate::utils::http::{DownloadTimeouts, create_client};

use super::{ResourceRequest, ResourceResponse, ResourceTransport};

/// Transport implementation that fetches resources via HTTP.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    timeouts: DownloadTimeouts,
}

impl HttpTransport {
    pub fn new(client: Client, timeouts: DownloadTimeouts) -> Self {
        Self { client, timeouts }
    }

    pub fn from_config(config: &Config) -> Self {
        let timeouts = DownloadTimeouts::from_config(config);
        Self::new(create_client(&timeouts), timeouts)
    }

    async fn download(&self, request: &ResourceRequest) -> CacheEntry<ResourceResponse> {
        tracing::debug!(resource = %request.name, "{request}");

        let result = self
            .client
            .get(request.url.clone())
            .header(header::ACCEPT, "application/json")
            .send()
            .await;

        let response = match result {
            Ok(response) => response,
            Err(err) if err.is_timeout() => {
                return Err(CacheError::Timeout(self.timeouts.max_download));
            }
            Err(err) => {
                tracing::debug!(
                    error = &err as &dyn std::error::Error,
                    resource = %request.name,
                    "Exception while making resource request"
                );
                return Err(err.into());
            }
        };

        let status = response.status();
        let body = match response.bytes().await {
            Ok(body) => body,
            Err(err) if err.is_timeout() => {
                return Err(CacheError::Timeout(self.timeouts.max_download));
            }
            Err(err) => return Err(err.into()),
        };

        let response = ResourceResponse { status, body };
        tracing::debug!(resource = %request.name, "{response}");

        Ok(response)
    }
}

impl ResourceTransport for HttpTransport {
    fn execute<'a>(
        &'a self,
        request: &'a ResourceRequest,
    ) -> BoxFuture<'a, CacheEntry<ResourceResponse>> {
        self.download(request).boxed()
    }
}
