//! Keel Resource Manager Client
//!
//! A small, type-safe HTTP client the job manager uses to keep the resource
//! manager's placement bookkeeping in line with task runtimes.
//!
//! # Example
//!
//! ```no_run
//! use keel_client::ResourceManagerClient;
//! use keel_core::dto::resmgr::MarkTasksLaunchedRequest;
//!
//! #[tokio::main]
//! async fn main() -> keel_client::Result<()> {
//!     let client = ResourceManagerClient::new("http://localhost:5290");
//!
//!     client
//!         .mark_tasks_launched(&MarkTasksLaunchedRequest::default())
//!         .await?;
//!     Ok(())
//! }
//! ```

pub mod error;
mod tasks;

// Re-export commonly used types
pub use error::{ClientError, Result};

use reqwest::Client;
use serde::de::DeserializeOwned;
use std::time::Duration;

/// HTTP client for the resource manager API
#[derive(Debug, Clone)]
pub struct ResourceManagerClient {
    /// Base URL of the resource manager (e.g., "http://localhost:5290")
    base_url: String,
    /// HTTP client instance
    client: Client,
}

impl ResourceManagerClient {
    /// Create a new resource manager client
    ///
    /// # Arguments
    /// * `base_url` - The base URL of the resource manager API
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(base_url, Client::new())
    }

    /// Create a client whose every request is bounded by `timeout`
    ///
    /// A request that exceeds the deadline fails with
    /// [`ClientError::RequestFailed`] and `is_timeout()` returns true.
    pub fn with_timeout(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self::with_client(base_url, client))
    }

    /// Create a new client with a custom HTTP client
    ///
    /// This allows you to configure proxies, TLS settings, etc.
    pub fn with_client(base_url: impl Into<String>, client: Client) -> Self {
        let base_url = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        }
    }

    /// Get the base URL of the resource manager
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    // =============================================================================
    // Response Handlers
    // =============================================================================

    /// Handle an API response and deserialize JSON
    async fn handle_response<T: DeserializeOwned>(&self, response: reqwest::Response) -> Result<T> {
        let status = response.status();

        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(ClientError::api_error(status.as_u16(), error_text));
        }

        let body = response.bytes().await?;
        serde_json::from_slice(&body)
            .map_err(|e| ClientError::ParseError(format!("Failed to parse JSON response: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        let client = ResourceManagerClient::new("http://localhost:5290");
        assert_eq!(client.base_url(), "http://localhost:5290");
    }

    #[test]
    fn test_client_trims_trailing_slash() {
        let client = ResourceManagerClient::new("http://localhost:5290/");
        assert_eq!(client.base_url(), "http://localhost:5290");
    }

    #[test]
    fn test_client_with_timeout() {
        let client =
            ResourceManagerClient::with_timeout("http://localhost:5290", Duration::from_secs(5))
                .unwrap();
        assert_eq!(client.base_url(), "http://localhost:5290");
    }
}
