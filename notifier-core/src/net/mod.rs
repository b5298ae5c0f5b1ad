//! I/O adapters for the login state machines
//!
//! Each adapter carries out one kind of [`Effect`](crate::login::Effect) for
//! the [`LoginService`](crate::service::LoginService).

pub mod connector;
pub mod network_monitor;
pub mod probe;
pub mod resolver;

pub use connector::{ClientReporter, StreamConnector, XmppConnector};
pub use network_monitor::{NetworkEvent, NetworkMonitor, NetworkMonitorError};
pub use probe::{ConnectivityProbe, HttpProbe, ProbeConfig, ProbeError};
pub use resolver::{HostResolver, ResolveError, SystemResolver};
