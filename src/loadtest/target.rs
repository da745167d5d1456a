//! Request targets.
//!
//! The dispatcher talks to the endpoint under test through the [`Target`]
//! trait. [`HttpTarget`] is the production implementation; tests substitute
//! in-process targets to control latency and observe concurrency.

use async_trait::async_trait;
use std::time::Duration;

use crate::loadtest::config::RunConfig;
use crate::loadtest::error::TransportError;

/// One endpoint that can be hit repeatedly.
///
/// Implementations must be shareable across worker tasks. A call returns
/// the HTTP status once the response is complete; any status, including
/// 4xx/5xx, is `Ok`.
#[async_trait]
pub trait Target: Send + Sync {
    /// Issues one request and waits for the complete response.
    async fn send(&self) -> Result<u16, TransportError>;
}

/// reqwest-backed target issuing `{method, url}` with a per-request timeout.
///
/// The response body is drained before returning so measured latency
/// covers the full exchange, and a body that stalls past the timeout is
/// reported as a timeout.
#[derive(Debug, Clone)]
pub struct HttpTarget {
    client: reqwest::Client,
    method: reqwest::Method,
    url: String,
    timeout: Duration,
}

impl HttpTarget {
    /// Creates a target sharing an existing connection pool.
    pub fn new(client: reqwest::Client, config: &RunConfig) -> Self {
        Self {
            client,
            method: config.method.to_reqwest(),
            url: config.url.clone(),
            timeout: config.settings.timeout_as_duration(),
        }
    }

    /// Creates a target with a fresh connection pool.
    pub fn from_config(config: &RunConfig) -> Self {
        Self::new(reqwest::Client::new(), config)
    }

    /// Returns the target URL.
    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl Target for HttpTarget {
    async fn send(&self) -> Result<u16, TransportError> {
        let response = self
            .client
            .request(self.method.clone(), &self.url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| TransportError::classify_reqwest(&e))?;

        let status = response.status().as_u16();
        response
            .bytes()
            .await
            .map_err(|e| TransportError::classify_reqwest(&e))?;
        Ok(status)
    }
}
