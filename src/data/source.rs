//! Catalog worker client
//!
//! Fetches the service catalog from the caching worker that fronts the
//! upstream SMM API and decodes it into our `Service` structures.

use async_trait::async_trait;
use reqwest::Client;
use thiserror::Error;
use tracing::debug;

use super::{decode_catalog, DecodedCatalog};

/// Path of the catalog endpoint on the worker
const SERVICES_PATH: &str = "/api/services";

/// Errors that can occur when fetching the catalog
#[derive(Debug, Error)]
pub enum FetchError {
    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// The worker answered with a non-success status
    #[error("catalog worker returned HTTP {0}")]
    Status(u16),

    /// The request did not complete in time
    #[error("catalog request timed out after {0} ms")]
    Timeout(u64),

    /// The body was not a list of services
    #[error("catalog response has an unexpected shape: {0}")]
    InvalidShape(String),

    /// The fetch task ended without producing a result
    #[error("catalog fetch was interrupted")]
    Interrupted,
}

/// Anything that can produce a fresh copy of the catalog
#[async_trait]
pub trait CatalogSource: Send + Sync {
    /// Retrieves the full catalog
    async fn fetch(&self) -> Result<DecodedCatalog, FetchError>;
}

/// Client for the catalog worker's HTTP endpoint
#[derive(Debug, Clone)]
pub struct HttpCatalogSource {
    client: Client,
    base_url: String,
}

impl HttpCatalogSource {
    /// Creates a source for the worker at `base_url`
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(Client::new(), base_url)
    }

    /// Creates a source with a custom HTTP client
    pub fn with_client(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }

    /// Full URL of the catalog endpoint
    pub fn services_url(&self) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), SERVICES_PATH)
    }
}

#[async_trait]
impl CatalogSource for HttpCatalogSource {
    async fn fetch(&self) -> Result<DecodedCatalog, FetchError> {
        let url = self.services_url();
        debug!(%url, "requesting service catalog");

        let response = self.client.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }

        let body = response.bytes().await?;
        decode_catalog(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_services_url_appends_path() {
        let source = HttpCatalogSource::new("https://worker.example.dev");
        assert_eq!(
            source.services_url(),
            "https://worker.example.dev/api/services"
        );
    }

    #[test]
    fn test_services_url_strips_trailing_slash() {
        let source = HttpCatalogSource::new("https://worker.example.dev/");
        assert_eq!(
            source.services_url(),
            "https://worker.example.dev/api/services"
        );
    }

    #[test]
    fn test_fetch_error_messages() {
        assert_eq!(
            FetchError::Status(502).to_string(),
            "catalog worker returned HTTP 502"
        );
        assert_eq!(
            FetchError::Timeout(5000).to_string(),
            "catalog request timed out after 5000 ms"
        );
        assert!(FetchError::InvalidShape("expected a list".to_string())
            .to_string()
            .contains("unexpected shape"));
    }

    #[tokio::test]
    async fn test_fetch_unreachable_host_is_transport_error() {
        // Port 9 on localhost (discard) is essentially never listening.
        let source = HttpCatalogSource::new("http://127.0.0.1:9");
        let err = source.fetch().await.unwrap_err();
        assert!(matches!(err, FetchError::Transport(_)));
    }
}
