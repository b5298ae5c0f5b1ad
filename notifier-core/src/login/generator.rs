//! Connection candidate enumeration
//!
//! [`ConnectionGenerator`] walks the server list in priority order, asks for
//! each entry to be resolved, expands the resolved addresses into
//! [`ConnectionSettings`] and hands them out one at a time. It performs no
//! I/O itself: every call returns the next [`Step`] for the owner to act on.

use std::net::IpAddr;

use tracing::{debug, info, warn};

use super::settings::{permutations, ConnectionSettings};
use crate::config::{ProxyInfo, ServerEntry};

/// DNS answered but returned no usable addresses
pub const ERR_NAME_NOT_RESOLVED: i32 = -105;

/// What the owner of a generator has to do next
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// Attempt a login over this candidate
    NewSettings(ConnectionSettings),
    /// Resolve `host`, then call [`ConnectionGenerator::on_resolved`]
    Resolve { server_index: usize, host: String },
    /// Every candidate of every server has been tried
    Exhausted {
        successfully_resolved_dns: bool,
        first_dns_error: i32,
    },
}

/// Position in the working settings list
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Cursor {
    /// Nothing handed out yet
    Before,
    At(usize),
    Exhausted,
}

/// Enumerates connection candidates for one login attempt
///
/// Single use: a fresh generator is needed to start over.
#[derive(Debug)]
pub struct ConnectionGenerator {
    servers: Vec<ServerEntry>,
    proxy: Option<ProxyInfo>,
    proxy_only: bool,
    settings: Vec<ConnectionSettings>,
    cursor: Cursor,
    /// Index of the last server handed to the resolver
    server_index: Option<usize>,
    pending_resolve: Option<usize>,
    started: bool,
    successfully_resolved_dns: bool,
    first_dns_error: i32,
}

impl ConnectionGenerator {
    pub fn new(servers: Vec<ServerEntry>, proxy: Option<ProxyInfo>, proxy_only: bool) -> Self {
        Self {
            servers,
            proxy,
            proxy_only,
            settings: Vec::new(),
            cursor: Cursor::Before,
            server_index: None,
            pending_resolve: None,
            started: false,
            successfully_resolved_dns: false,
            first_dns_error: 0,
        }
    }

    /// Begin enumeration by resolving the first server
    ///
    /// Returns `None` when called a second time.
    pub fn start_generating(&mut self) -> Option<Step> {
        if self.started {
            warn!("Connection generator already started, ignoring");
            return None;
        }
        self.started = true;
        self.use_next_connection()
    }

    /// Advance past the current candidate
    ///
    /// Returns `None` while a resolution is outstanding or once exhausted.
    pub fn use_next_connection(&mut self) -> Option<Step> {
        if !self.started || self.pending_resolve.is_some() {
            return None;
        }

        let next = match self.cursor {
            Cursor::Exhausted => return None,
            Cursor::Before => 0,
            Cursor::At(index) => index + 1,
        };

        if next < self.settings.len() {
            self.cursor = Cursor::At(next);
            let settings = self.settings[next].clone();
            debug!(candidate = %settings, index = next, "Using next connection candidate");
            return Some(Step::NewSettings(settings));
        }

        self.resolve_next_server()
    }

    /// Hand out the current candidate again without advancing
    pub fn use_current_connection(&self) -> Option<Step> {
        match self.cursor {
            Cursor::At(index) if self.pending_resolve.is_none() => {
                Some(Step::NewSettings(self.settings[index].clone()))
            }
            _ => None,
        }
    }

    /// Feed the outcome of a [`Step::Resolve`] back in
    ///
    /// `Err` carries a DNS error code. Results for a server other than the
    /// one being resolved are ignored.
    pub fn on_resolved(&mut self, server_index: usize, result: Result<Vec<IpAddr>, i32>) -> Option<Step> {
        if self.pending_resolve != Some(server_index) {
            debug!(server_index, "Ignoring stale resolution result");
            return None;
        }
        self.pending_resolve = None;

        let addresses = match result {
            Ok(addresses) if !addresses.is_empty() => addresses,
            Ok(_) => {
                self.record_dns_error(server_index, ERR_NAME_NOT_RESOLVED);
                return self.resolve_next_server();
            }
            Err(code) => {
                self.record_dns_error(server_index, code);
                return self.resolve_next_server();
            }
        };

        self.successfully_resolved_dns = true;
        let expanded = permutations(
            &self.servers[server_index],
            &addresses,
            self.proxy.as_ref(),
            self.proxy_only,
        );
        info!(
            host = %self.servers[server_index].host,
            addresses = addresses.len(),
            candidates = expanded.len(),
            "Resolved server"
        );

        // Cursor sits on the last element, so advancing lands on the first
        // appended candidate.
        self.settings.extend(expanded);
        self.use_next_connection()
    }

    /// Candidate currently handed out, if any
    pub fn current(&self) -> Option<&ConnectionSettings> {
        match self.cursor {
            Cursor::At(index) => self.settings.get(index),
            _ => None,
        }
    }

    /// Proxy configured for candidates
    pub fn proxy(&self) -> Option<&ProxyInfo> {
        self.proxy.as_ref()
    }

    /// Proxy used by the current candidate
    pub fn current_proxy(&self) -> Option<&ProxyInfo> {
        self.current()
            .filter(|settings| settings.use_proxy)
            .and(self.proxy.as_ref())
    }

    pub fn is_exhausted(&self) -> bool {
        self.cursor == Cursor::Exhausted
    }

    /// Every candidate generated so far, in try order
    pub fn settings(&self) -> &[ConnectionSettings] {
        &self.settings
    }

    fn record_dns_error(&mut self, server_index: usize, code: i32) {
        warn!(
            host = %self.servers[server_index].host,
            code,
            "DNS resolution failed, moving on to the next server"
        );
        if self.first_dns_error == 0 {
            self.first_dns_error = code;
        }
    }

    fn resolve_next_server(&mut self) -> Option<Step> {
        let next = self.server_index.map_or(0, |index| index + 1);
        self.server_index = Some(next);

        match self.servers.get(next) {
            Some(server) => {
                self.pending_resolve = Some(next);
                debug!(host = %server.host, server_index = next, "Resolving server");
                Some(Step::Resolve {
                    server_index: next,
                    host: server.host.clone(),
                })
            }
            None => {
                self.cursor = Cursor::Exhausted;
                info!(
                    successfully_resolved_dns = self.successfully_resolved_dns,
                    first_dns_error = self.first_dns_error,
                    "All connection candidates exhausted"
                );
                Some(Step::Exhausted {
                    successfully_resolved_dns: self.successfully_resolved_dns,
                    first_dns_error: self.first_dns_error,
                })
            }
        }
    }
}
