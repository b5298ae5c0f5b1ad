//! Connectivity diagnosis via plain HTTP
//!
//! When every candidate failed at the transport level the login asks for an
//! HTTP GET through the same proxy. A 200 means the network is fine and the
//! server is to blame; anything else means the machine is offline or
//! firewalled.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::{Client, Proxy};
use tracing::{debug, warn};
use url::Url;

use crate::config::ProxyInfo;

/// Settings for the connectivity probe
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ProbeConfig {
    /// HTTP URL fetched to test connectivity
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Maximum duration to wait for a response
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

fn default_endpoint() -> String {
    "http://www.google.com:80/".to_string()
}
fn default_timeout() -> u64 {
    10
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            timeout_secs: default_timeout(),
        }
    }
}

impl ProbeConfig {
    /// Validate the endpoint URL and timeout
    pub fn validate(&self) -> Result<(), String> {
        validate_endpoint(&self.endpoint).map_err(|e| e.to_string())?;
        if self.timeout_secs == 0 || self.timeout_secs > 300 {
            return Err(format!(
                "timeout_secs must be between 1 and 300, got: {}",
                self.timeout_secs
            ));
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Errors that can occur during a probe
#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    #[error("Invalid endpoint URL: {0}")]
    InvalidUrl(String),

    #[error("Invalid proxy: {0}")]
    InvalidProxy(String),

    #[error("HTTP client creation failed: {0}")]
    ClientCreationFailed(String),

    #[error("Request failed: {0}")]
    RequestFailed(String),
}

fn validate_endpoint(endpoint: &str) -> Result<(), ProbeError> {
    let url = Url::parse(endpoint)
        .map_err(|e| ProbeError::InvalidUrl(format!("Failed to parse URL: {}", e)))?;

    match url.scheme() {
        "http" | "https" => Ok(()),
        scheme => Err(ProbeError::InvalidUrl(format!(
            "Only HTTP/HTTPS schemes are supported, got: {}",
            scheme
        ))),
    }
}

/// Checks whether plain HTTP gets out
#[async_trait]
pub trait ConnectivityProbe: Send + Sync {
    /// HTTP status of the probe request, `None` when no response came back
    async fn probe(&self, proxy: Option<&ProxyInfo>) -> Option<u16>;
}

/// Probe issuing a GET with `reqwest`
#[derive(Debug, Clone)]
pub struct HttpProbe {
    endpoint: String,
    timeout: Duration,
}

impl HttpProbe {
    /// Create a probe for `config.endpoint`
    ///
    /// Fails if the endpoint is not an HTTP/HTTPS URL.
    #[tracing::instrument(skip(config), fields(endpoint = %config.endpoint))]
    pub fn new(config: &ProbeConfig) -> Result<Self, ProbeError> {
        validate_endpoint(&config.endpoint)?;
        Ok(Self {
            endpoint: config.endpoint.clone(),
            timeout: config.timeout(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// The proxy is fixed per client, so each check builds its own
    fn client(&self, proxy: Option<&ProxyInfo>) -> Result<Client, ProbeError> {
        let mut builder = Client::builder().timeout(self.timeout).use_rustls_tls();

        builder = match proxy {
            Some(info) => {
                let mut proxy = Proxy::all(info.url())
                    .map_err(|e| ProbeError::InvalidProxy(e.to_string()))?;
                if let Some((username, password)) = info.basic_auth() {
                    proxy = proxy.basic_auth(username, password);
                }
                builder.proxy(proxy)
            }
            None => builder.no_proxy(),
        };

        builder
            .build()
            .map_err(|e| ProbeError::ClientCreationFailed(e.to_string()))
    }

    /// Fetch the endpoint and report the status code
    #[tracing::instrument(skip(self, proxy), fields(endpoint = %self.endpoint, proxied = proxy.is_some()))]
    pub async fn check(&self, proxy: Option<&ProxyInfo>) -> Result<u16, ProbeError> {
        let client = self.client(proxy)?;
        let start = Instant::now();

        match client.get(&self.endpoint).send().await {
            Ok(response) => {
                let status = response.status();
                debug!(
                    status = %status,
                    duration_ms = start.elapsed().as_millis(),
                    "Connectivity probe answered"
                );
                Ok(status.as_u16())
            }
            Err(e) => {
                let error_msg = if e.is_timeout() {
                    format!("Request timeout after {:?}", self.timeout)
                } else if e.is_connect() {
                    "Connection refused or unreachable".to_string()
                } else {
                    format!("Request failed: {}", e)
                };
                warn!(
                    error = %error_msg,
                    duration_ms = start.elapsed().as_millis(),
                    "Connectivity probe failed"
                );
                Err(ProbeError::RequestFailed(error_msg))
            }
        }
    }
}

#[async_trait]
impl ConnectivityProbe for HttpProbe {
    async fn probe(&self, proxy: Option<&ProxyInfo>) -> Option<u16> {
        self.check(proxy).await.ok()
    }
}
