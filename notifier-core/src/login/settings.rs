//! Concrete connection candidates
//!
//! A [`ConnectionSettings`] is one fully resolved way of reaching a server.
//! [`permutations`] expands a resolved server entry into candidates in the
//! order they should be tried.

use std::fmt;
use std::net::IpAddr;

use crate::config::{ProxyInfo, ServerEntry, FALLBACK_TLS_PORT};

/// One resolved candidate to attempt a login over
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionSettings {
    /// Hostname the address was resolved from
    pub host: String,
    pub address: IpAddr,
    pub port: u16,
    /// Tunnel through the configured proxy
    pub use_proxy: bool,
    /// This candidate uses the 443 fallback port
    pub use_fake_tls_port: bool,
}

impl fmt::Display for ConnectionSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.address {
            IpAddr::V4(v4) => write!(f, "{}:{}", v4, self.port)?,
            IpAddr::V6(v6) => write!(f, "[{}]:{}", v6, self.port)?,
        }
        write!(f, " ({})", self.host)?;
        if self.use_proxy {
            write!(f, " via proxy")?;
        }
        Ok(())
    }
}

/// Expand a resolved server entry into ordered candidates
///
/// Per address: proxied candidates before direct ones, and with port
/// fallback the 443 candidate before the configured port. Direct candidates
/// are skipped when `proxy_only` is set and a proxy exists.
pub fn permutations(
    server: &ServerEntry,
    addresses: &[IpAddr],
    proxy: Option<&ProxyInfo>,
    proxy_only: bool,
) -> Vec<ConnectionSettings> {
    let mut ports = Vec::with_capacity(2);
    if server.allow_port_fallback && server.port != FALLBACK_TLS_PORT {
        ports.push((FALLBACK_TLS_PORT, true));
    }
    ports.push((server.port, false));

    let mut routes = Vec::with_capacity(2);
    if proxy.is_some() {
        routes.push(true);
    }
    if proxy.is_none() || !proxy_only {
        routes.push(false);
    }

    let mut list = Vec::with_capacity(addresses.len() * ports.len() * routes.len());
    for address in addresses {
        for &use_proxy in &routes {
            for &(port, use_fake_tls_port) in &ports {
                list.push(ConnectionSettings {
                    host: server.host.clone(),
                    address: *address,
                    port,
                    use_proxy,
                    use_fake_tls_port,
                });
            }
        }
    }

    list
}
