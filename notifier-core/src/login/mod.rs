//! Connection establishment
//!
//! Three layers, innermost first:
//!
//! - [`generator::ConnectionGenerator`] turns the server list into concrete
//!   candidates (address, port, proxy use) in priority order
//! - [`attempt::SingleLoginAttempt`] logs in over those candidates one at a
//!   time and classifies failures
//! - [`orchestrator::Login`] owns attempts, publishes the connection state and
//!   handles redirects and reconnects
//!
//! None of them perform I/O. See [`event`] for how work leaves and comes back.

pub mod attempt;
pub mod client;
pub mod event;
pub mod failure;
pub mod generator;
pub mod orchestrator;
pub mod reconnect;
pub mod settings;
pub mod state;
pub mod stream_error;

/// Identifies one login attempt within a [`Login`]
pub type AttemptId = u64;

pub use attempt::{AttemptSignal, SingleLoginAttempt};
pub use client::{ClientError, ClientEvent, ClientId, ClientState, TransportFault, XmppErrorCode};
pub use event::{ConnectRequest, Effect, Input, LoginEvent, Signal};
pub use failure::LoginFailure;
pub use generator::{ConnectionGenerator, Step};
pub use orchestrator::Login;
pub use reconnect::{AutoReconnect, ExponentialBackoff, ReconnectPolicy, ReconnectionPolicy};
pub use settings::ConnectionSettings;
pub use state::ConnectionState;
pub use stream_error::{Redirect, StreamError};
