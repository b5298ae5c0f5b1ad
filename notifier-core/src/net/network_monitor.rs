//! Network state monitoring via D-Bus
//!
//! This module provides NetworkMonitor for detecting network state changes
//! from NetworkManager via D-Bus signals.

use futures_util::StreamExt;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use zbus::Connection;

const NM_SERVICE: &str = "org.freedesktop.NetworkManager";
const NM_PATH: &str = "/org/freedesktop/NetworkManager";
const NM_INTERFACE: &str = "org.freedesktop.NetworkManager";

/// NM_STATE_CONNECTED_GLOBAL
pub const NM_STATE_CONNECTED_GLOBAL: u32 = 70;

/// Events representing network state changes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkEvent {
    /// Full connectivity (re)established
    NetworkUp,

    /// Connectivity lost or limited
    NetworkDown,
}

impl NetworkEvent {
    /// Map a NetworkManager `State` value to an event
    pub fn from_nm_state(state: u32) -> Self {
        if state >= NM_STATE_CONNECTED_GLOBAL {
            NetworkEvent::NetworkUp
        } else {
            NetworkEvent::NetworkDown
        }
    }
}

/// Monitors network state changes from NetworkManager
pub struct NetworkMonitor {
    connection: Connection,
}

impl NetworkMonitor {
    /// Create a new NetworkMonitor
    ///
    /// Connects to system D-Bus and verifies NetworkManager is available
    ///
    /// # Errors
    ///
    /// Returns `NetworkMonitorError` if D-Bus connection fails or NetworkManager is unavailable
    #[tracing::instrument]
    pub async fn new() -> Result<Self, NetworkMonitorError> {
        let connection = Connection::system().await?;

        let proxy = zbus::fdo::DBusProxy::new(&connection).await?;
        let bus_name = zbus::names::BusName::try_from(NM_SERVICE)
            .map_err(|e| NetworkMonitorError::QueryFailed(e.to_string()))?;
        let name_has_owner = proxy
            .name_has_owner(bus_name)
            .await
            .map_err(|e| NetworkMonitorError::QueryFailed(e.to_string()))?;

        if !name_has_owner {
            return Err(NetworkMonitorError::NetworkManagerUnavailable);
        }

        Ok(Self { connection })
    }

    /// Start monitoring network events
    ///
    /// Spawns a background tokio task that listens for `StateChanged` signals
    /// and sends a [`NetworkEvent`] whenever the classification changes. The
    /// task ends when the receiver is dropped or the signal stream closes.
    pub fn start(self) -> mpsc::UnboundedReceiver<NetworkEvent> {
        let (tx, rx) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            if let Err(e) = self.listen(tx).await {
                warn!("Network monitor stopped: {}", e);
            }
        });

        rx
    }

    async fn listen(self, tx: mpsc::UnboundedSender<NetworkEvent>) -> Result<(), NetworkMonitorError> {
        let proxy = self.nm_proxy().await?;
        let mut last = proxy
            .get_property::<u32>("State")
            .await
            .map(NetworkEvent::from_nm_state)
            .ok();

        let mut signals = proxy.receive_signal("StateChanged").await?;
        info!("Listening for NetworkManager state changes");

        while let Some(message) = signals.next().await {
            let state: u32 = match message.body().deserialize() {
                Ok(state) => state,
                Err(e) => {
                    warn!("Unexpected StateChanged payload: {}", e);
                    continue;
                }
            };

            let event = NetworkEvent::from_nm_state(state);
            debug!(state, ?event, "NetworkManager state changed");
            if last == Some(event) {
                continue;
            }
            last = Some(event);

            if tx.send(event).is_err() {
                break;
            }
        }

        Ok(())
    }

    async fn nm_proxy(&self) -> Result<zbus::Proxy<'static>, NetworkMonitorError> {
        Ok(zbus::Proxy::new(&self.connection, NM_SERVICE, NM_PATH, NM_INTERFACE).await?)
    }

    /// Check if network is currently available
    ///
    /// Queries NetworkManager State property to determine if network is connected
    ///
    /// # Errors
    ///
    /// Returns `NetworkMonitorError` if query fails
    #[tracing::instrument(skip(self))]
    pub async fn is_network_available(&self) -> Result<bool, NetworkMonitorError> {
        let proxy = self.nm_proxy().await?;

        let state: u32 = proxy
            .get_property("State")
            .await
            .map_err(|e| NetworkMonitorError::QueryFailed(e.to_string()))?;

        Ok(NetworkEvent::from_nm_state(state) == NetworkEvent::NetworkUp)
    }
}

/// Errors that can occur during network monitoring
#[derive(Debug, thiserror::Error)]
pub enum NetworkMonitorError {
    #[error("D-Bus connection failed: {0}")]
    DBusConnectionFailed(#[from] zbus::Error),

    #[error("NetworkManager not available")]
    NetworkManagerUnavailable,

    #[error("Failed to query network state: {0}")]
    QueryFailed(String),
}
