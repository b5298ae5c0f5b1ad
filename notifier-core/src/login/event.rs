//! Inputs, effects and outbound events of the login state machines
//!
//! The state machines never block. Anything that has to wait (DNS, sockets,
//! the connectivity probe, timers) leaves as an [`Effect`] and comes back as
//! an [`Input`]. Outbound notifications go through a [`Signal`] queue that the
//! owner drains.

use std::collections::VecDeque;
use std::net::IpAddr;
use std::time::Duration;

use super::client::{ClientEvent, ClientId};
use super::failure::LoginFailure;
use super::settings::ConnectionSettings;
use super::state::ConnectionState;
use super::AttemptId;
use crate::config::ProxyInfo;
use crate::types::Credentials;

/// Everything a connector needs to run one protocol client
#[derive(Debug, Clone)]
pub struct ConnectRequest {
    pub settings: ConnectionSettings,
    /// Proxy to tunnel through, set only when the candidate uses one
    pub proxy: Option<ProxyInfo>,
    pub credentials: Credentials,
    pub lang: String,
    pub allow_unverified_certs: bool,
}

/// Work requested by the state machines
#[derive(Debug, Clone)]
pub enum Effect {
    /// Resolve a server hostname
    Resolve {
        attempt: AttemptId,
        server_index: usize,
        host: String,
    },
    /// Create and start a protocol client
    OpenClient {
        client: ClientId,
        request: ConnectRequest,
    },
    /// Tear down a protocol client; no further events from it are wanted
    CloseClient { client: ClientId },
    /// Plain HTTP connectivity check
    Probe {
        attempt: AttemptId,
        proxy: Option<ProxyInfo>,
    },
    /// Fire [`Input::ReconnectTimerFired`] after `delay`
    ScheduleReconnect { delay: Duration },
    /// Drop any pending reconnect timer
    CancelReconnect,
}

/// Completions and external notifications fed into a login
#[derive(Debug, Clone)]
pub enum Input {
    /// Outcome of [`Effect::Resolve`]; `Err` carries the DNS error code
    Resolved {
        attempt: AttemptId,
        server_index: usize,
        result: Result<Vec<IpAddr>, i32>,
    },
    /// Progress of a client started by [`Effect::OpenClient`]
    Client { client: ClientId, event: ClientEvent },
    /// Outcome of [`Effect::Probe`]; `None` when no HTTP response came back
    ProbeCompleted {
        attempt: AttemptId,
        status: Option<u16>,
    },
    ReconnectTimerFired,
    /// The host's network configuration changed
    NetworkChanged,
}

/// Notifications a login sends to the mediator
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginEvent {
    StateChanged(ConnectionState),
    Failure(LoginFailure),
    Redirected { host: String, port: u16 },
    ReconnectScheduled { delay: Duration },
}

/// Outbound signal queue with permanent disconnect
///
/// Values emitted after [`Signal::disconnect_all`] are dropped.
#[derive(Debug)]
pub struct Signal<T> {
    queue: Option<VecDeque<T>>,
}

impl<T> Signal<T> {
    pub fn new() -> Self {
        Self {
            queue: Some(VecDeque::new()),
        }
    }

    pub fn emit(&mut self, value: T) {
        if let Some(queue) = self.queue.as_mut() {
            queue.push_back(value);
        }
    }

    /// Take everything emitted so far
    pub fn drain(&mut self) -> Vec<T> {
        self.queue
            .as_mut()
            .map(|queue| queue.drain(..).collect())
            .unwrap_or_default()
    }

    /// Sever the signal; pending values are discarded
    pub fn disconnect_all(&mut self) {
        self.queue = None;
    }

    pub fn is_connected(&self) -> bool {
        self.queue.is_some()
    }
}

impl<T> Default for Signal<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signal_drain_and_disconnect() {
        let mut signal = Signal::new();
        signal.emit(1);
        signal.emit(2);
        assert_eq!(signal.drain(), vec![1, 2]);
        assert!(signal.drain().is_empty());

        signal.emit(3);
        signal.disconnect_all();
        assert!(!signal.is_connected());
        signal.emit(4);
        assert!(signal.drain().is_empty());
    }
}
