//! Hostname resolution
//!
//! [`HostResolver`] is what the login service calls for
//! [`Effect::Resolve`](crate::login::Effect::Resolve). Failures are reduced
//! to a numeric DNS error code so the login state machines stay independent
//! of the resolver library.

use std::net::IpAddr;

use async_trait::async_trait;
use tracing::{debug, info, warn};
use trust_dns_resolver::config::{ResolverConfig, ResolverOpts};
use trust_dns_resolver::error::ResolveErrorKind;
use trust_dns_resolver::TokioAsyncResolver;

use crate::login::generator::ERR_NAME_NOT_RESOLVED;

/// DNS lookup failed for a reason other than "no such name"
pub const ERR_NAME_RESOLUTION_FAILED: i32 = -137;

/// Errors that can occur while resolving a host
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum ResolveError {
    #[error("No addresses found for {0}")]
    NotFound(String),

    #[error("Lookup of {host} failed: {reason}")]
    LookupFailed { host: String, reason: String },
}

impl ResolveError {
    /// Numeric code handed to the connection generator
    pub fn code(&self) -> i32 {
        match self {
            ResolveError::NotFound(_) => ERR_NAME_NOT_RESOLVED,
            ResolveError::LookupFailed { .. } => ERR_NAME_RESOLUTION_FAILED,
        }
    }
}

/// Resolves server hostnames to addresses
#[async_trait]
pub trait HostResolver: Send + Sync {
    async fn resolve(&self, host: &str) -> Result<Vec<IpAddr>, ResolveError>;
}

/// Resolver backed by the system DNS configuration
pub struct SystemResolver {
    resolver: TokioAsyncResolver,
}

impl SystemResolver {
    /// Use the system configuration, falling back to the library default
    pub fn new() -> Self {
        let resolver = match TokioAsyncResolver::tokio_from_system_conf() {
            Ok(resolver) => {
                debug!("Using system DNS resolver");
                resolver
            }
            Err(e) => {
                warn!(
                    "Failed to load system DNS config: {}, falling back to default resolver",
                    e
                );
                TokioAsyncResolver::tokio(ResolverConfig::default(), ResolverOpts::default())
            }
        };

        Self { resolver }
    }
}

impl Default for SystemResolver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HostResolver for SystemResolver {
    #[tracing::instrument(skip(self))]
    async fn resolve(&self, host: &str) -> Result<Vec<IpAddr>, ResolveError> {
        // Literal addresses need no lookup
        if let Ok(address) = host.trim_matches(|c| c == '[' || c == ']').parse::<IpAddr>() {
            return Ok(vec![address]);
        }

        match self.resolver.lookup_ip(host).await {
            Ok(lookup) => {
                let addresses: Vec<IpAddr> = lookup.iter().collect();
                info!(host, count = addresses.len(), "Resolved host");
                if addresses.is_empty() {
                    Err(ResolveError::NotFound(host.to_string()))
                } else {
                    Ok(addresses)
                }
            }
            Err(e) => match e.kind() {
                ResolveErrorKind::NoRecordsFound { .. } => {
                    Err(ResolveError::NotFound(host.to_string()))
                }
                _ => Err(ResolveError::LookupFailed {
                    host: host.to_string(),
                    reason: e.to_string(),
                }),
            },
        }
    }
}
