//! Fetch collaborator
//!
//! The engine treats fetching as an opaque `fetch(target) -> body` capability
//! that may fail. This module defines that seam and its default HTTP
//! implementation:
//! - Building HTTP clients from configuration
//! - GET requests with optional query parameters
//! - Error classification into connectivity and body failures

use crate::config::HttpConfig;
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use thiserror::Error;

/// Errors a fetch can end with
///
/// Both kinds are recorded per task by the crawl stage and retried on a later
/// run; neither aborts the run.
#[derive(Debug, Clone, Error)]
pub enum FetchError {
    /// No response could be obtained (connection refused, DNS, TLS, timeout)
    #[error("Connectivity failure for {target}: {message}")]
    Connectivity { target: String, message: String },

    /// A response arrived but its body could not be read
    #[error("Failed to read body of {target}: {message}")]
    Body { target: String, message: String },
}

impl FetchError {
    pub fn connectivity(target: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Connectivity {
            target: target.into(),
            message: message.into(),
        }
    }

    pub fn target(&self) -> &str {
        match self {
            Self::Connectivity { target, .. } | Self::Body { target, .. } => target,
        }
    }

    pub fn is_connectivity(&self) -> bool {
        matches!(self, Self::Connectivity { .. })
    }
}

/// Retrieves the body behind a fetch target
///
/// Implementations must be shareable across the concurrent workers of a crawl
/// stage. Any timeout is the implementation's own business; the engine never
/// cancels a fetch.
#[async_trait]
pub trait Fetch: Send + Sync {
    async fn fetch(&self, target: &str) -> Result<String, FetchError>;
}

/// Builds an HTTP client with proper configuration
///
/// # Arguments
///
/// * `config` - The HTTP section of the pipeline configuration
///
/// # Returns
///
/// * `Ok(Client)` - Successfully built HTTP client
/// * `Err(reqwest::Error)` - Failed to build client
///
/// # Example
///
/// ```no_run
/// use stagecrawl::config::HttpConfig;
/// use stagecrawl::crawler::build_http_client;
///
/// let client = build_http_client(&HttpConfig::default()).unwrap();
/// ```
pub fn build_http_client(config: &HttpConfig) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(config.user_agent.as_str())
        .timeout(Duration::from_secs(config.timeout_secs))
        .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
        .gzip(true)
        .brotli(true)
        .build()
}

/// Default fetcher: an HTTP GET returning the response body as text
///
/// The body is returned whatever the status code; the parse strategy is the one
/// that knows whether an error page holds anything useful.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
    query: Vec<(String, String)>,
}

impl HttpFetcher {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            query: Vec::new(),
        }
    }

    pub fn from_config(config: &HttpConfig) -> Result<Self, reqwest::Error> {
        Ok(Self::new(build_http_client(config)?))
    }

    pub fn with_defaults() -> Result<Self, reqwest::Error> {
        Self::from_config(&HttpConfig::default())
    }

    /// Adds query parameters sent with every request
    pub fn with_query<K, V>(mut self, params: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.query
            .extend(params.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }
}

#[async_trait]
impl Fetch for HttpFetcher {
    async fn fetch(&self, target: &str) -> Result<String, FetchError> {
        let response = self
            .client
            .get(target)
            .query(&self.query)
            .send()
            .await
            .map_err(|e| classify_send_error(target, &e))?;

        let status = response.status();
        if !status.is_success() {
            tracing::debug!("{} answered HTTP {}", target, status.as_u16());
        }

        response.text().await.map_err(|e| FetchError::Body {
            target: target.to_string(),
            message: e.to_string(),
        })
    }
}

/// Every failure to obtain a response is a connectivity failure; the message
/// keeps the cause readable in logs.
fn classify_send_error(target: &str, e: &reqwest::Error) -> FetchError {
    let message = if e.is_timeout() {
        "Request timeout".to_string()
    } else if e.is_connect() {
        format!("Connection failed: {}", e)
    } else {
        e.to_string()
    };
    FetchError::connectivity(target, message)
}
