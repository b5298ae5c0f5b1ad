//! Login service
//!
//! Runs a [`Login`] on one tokio task. Effects requested by the state
//! machines are carried out through the adapters in [`crate::net`], whose
//! results are fed back in as [`Input`]s. The mediator controls the service
//! through a [`LoginHandle`] and observes it through a state watch channel
//! and an event channel.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info};

use crate::error::LoginError;
use crate::login::{ClientEvent, ClientId, ConnectionState, Effect, Input, Login, LoginEvent};
use crate::net::{
    ClientReporter, ConnectivityProbe, HostResolver, HttpProbe, ProbeConfig, StreamConnector,
    SystemResolver, XmppConnector,
};

/// Commands to control the login service
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginCommand {
    /// Start connecting
    Start,

    /// Abandon the current candidate
    UseNextConnection,

    /// Reconnect over the current candidate
    UseCurrentConnection,

    /// The host's network configuration changed
    NetworkChanged,

    /// Disconnect and shut the service down
    Stop,
}

/// Adapters that carry out effects
#[derive(Clone)]
pub struct Adapters {
    pub resolver: Arc<dyn HostResolver>,
    pub connector: Arc<dyn XmppConnector>,
    pub probe: Arc<dyn ConnectivityProbe>,
}

impl Adapters {
    /// System DNS, plain TCP connector and HTTP probe
    pub fn system(probe: &ProbeConfig) -> Result<Self, LoginError> {
        let probe = HttpProbe::new(probe).map_err(|e| LoginError::ProbeSetup {
            reason: e.to_string(),
        })?;

        Ok(Self {
            resolver: Arc::new(SystemResolver::new()),
            connector: Arc::new(StreamConnector::default()),
            probe: Arc::new(probe),
        })
    }
}

/// Mediator-side control of a running [`LoginService`]
#[derive(Debug, Clone)]
pub struct LoginHandle {
    commands: mpsc::UnboundedSender<LoginCommand>,
    state: watch::Receiver<ConnectionState>,
}

impl LoginHandle {
    fn send(&self, command: LoginCommand) -> Result<(), LoginError> {
        self.commands
            .send(command)
            .map_err(|_| LoginError::ServiceStopped)
    }

    pub fn start(&self) -> Result<(), LoginError> {
        self.send(LoginCommand::Start)
    }

    pub fn use_next_connection(&self) -> Result<(), LoginError> {
        self.send(LoginCommand::UseNextConnection)
    }

    pub fn use_current_connection(&self) -> Result<(), LoginError> {
        self.send(LoginCommand::UseCurrentConnection)
    }

    pub fn network_changed(&self) -> Result<(), LoginError> {
        self.send(LoginCommand::NetworkChanged)
    }

    pub fn stop(&self) -> Result<(), LoginError> {
        self.send(LoginCommand::Stop)
    }

    /// Current connection state
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Receiver for connection state updates
    pub fn state_receiver(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }
}

/// Drives a [`Login`] with real I/O
pub struct LoginService {
    login: Login,
    adapters: Adapters,
    state_tx: watch::Sender<ConnectionState>,
    event_tx: mpsc::UnboundedSender<LoginEvent>,
    command_rx: mpsc::UnboundedReceiver<LoginCommand>,
    input_tx: mpsc::UnboundedSender<Input>,
    input_rx: mpsc::UnboundedReceiver<Input>,
    clients: HashMap<ClientId, JoinHandle<()>>,
    reconnect_at: Option<Instant>,
}

impl LoginService {
    /// Create a service with its handle and event receiver
    pub fn new(
        login: Login,
        adapters: Adapters,
    ) -> (Self, LoginHandle, mpsc::UnboundedReceiver<LoginEvent>) {
        let (state_tx, state_rx) = watch::channel(login.connection_state());
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (input_tx, input_rx) = mpsc::unbounded_channel();

        let service = Self {
            login,
            adapters,
            state_tx,
            event_tx,
            command_rx,
            input_tx,
            input_rx,
            clients: HashMap::new(),
            reconnect_at: None,
        };
        let handle = LoginHandle {
            commands: command_tx,
            state: state_rx,
        };

        (service, handle, event_rx)
    }

    /// Run the service event loop
    ///
    /// Returns after [`LoginCommand::Stop`] or once every handle is dropped.
    /// This should be spawned as a background tokio task.
    pub async fn run(mut self) {
        loop {
            let deadline = self.reconnect_at.unwrap_or_else(Instant::now);

            tokio::select! {
                command = self.command_rx.recv() => {
                    match command {
                        Some(LoginCommand::Start) => self.login.start_connection(),
                        Some(LoginCommand::UseNextConnection) => self.login.use_next_connection(),
                        Some(LoginCommand::UseCurrentConnection) => self.login.use_current_connection(),
                        Some(LoginCommand::NetworkChanged) => self.login.handle(Input::NetworkChanged),
                        Some(LoginCommand::Stop) | None => {
                            info!("Stopping login service");
                            self.login.stop();
                            self.flush();
                            break;
                        }
                    }
                }

                Some(input) = self.input_rx.recv() => {
                    if let Input::Client { client, event: ClientEvent::Closed(_) } = &input {
                        self.clients.remove(client);
                    }
                    self.login.handle(input);
                }

                _ = sleep_until(deadline), if self.reconnect_at.is_some() => {
                    self.reconnect_at = None;
                    self.login.handle(Input::ReconnectTimerFired);
                }
            }

            self.flush();
        }

        for (_, task) in self.clients.drain() {
            task.abort();
        }
    }

    /// Execute queued effects and publish queued events
    fn flush(&mut self) {
        for effect in self.login.take_effects() {
            self.execute(effect);
        }

        for event in self.login.take_events() {
            if let LoginEvent::StateChanged(state) = &event {
                self.state_tx.send_replace(*state);
            }
            // Nobody listening is fine
            let _ = self.event_tx.send(event);
        }
    }

    fn execute(&mut self, effect: Effect) {
        match effect {
            Effect::Resolve {
                attempt,
                server_index,
                host,
            } => {
                let resolver = Arc::clone(&self.adapters.resolver);
                let inputs = self.input_tx.clone();
                tokio::spawn(async move {
                    let result = resolver.resolve(&host).await.map_err(|e| e.code());
                    let _ = inputs.send(Input::Resolved {
                        attempt,
                        server_index,
                        result,
                    });
                });
            }
            Effect::OpenClient { client, request } => {
                let connector = Arc::clone(&self.adapters.connector);
                let reporter = ClientReporter::new(client, self.input_tx.clone());
                let task = tokio::spawn(async move {
                    connector.run(request, reporter).await;
                });
                self.clients.insert(client, task);
            }
            Effect::CloseClient { client } => {
                if let Some(task) = self.clients.remove(&client) {
                    debug!(client = %client, "Closing client");
                    task.abort();
                }
            }
            Effect::Probe { attempt, proxy } => {
                let probe = Arc::clone(&self.adapters.probe);
                let inputs = self.input_tx.clone();
                tokio::spawn(async move {
                    let status = probe.probe(proxy.as_ref()).await;
                    let _ = inputs.send(Input::ProbeCompleted { attempt, status });
                });
            }
            Effect::ScheduleReconnect { delay } => {
                self.reconnect_at = Some(Instant::now() + delay);
            }
            Effect::CancelReconnect => {
                self.reconnect_at = None;
            }
        }
    }
}
