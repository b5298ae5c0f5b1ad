//! Single login attempt
//!
//! A [`SingleLoginAttempt`] owns one [`ConnectionGenerator`] and at most one
//! live protocol client. It logs in over the candidates the generator hands
//! out, classifies why each client closed, and either moves on to the next
//! candidate or reports upward through [`AttemptSignal`]s. Once every
//! candidate has failed it diagnoses the failure, optionally with a plain
//! HTTP probe.

use std::mem;

use tracing::{debug, info, warn};

use super::client::{ClientError, ClientEvent, ClientId, ClientState, TransportFault, XmppErrorCode};
use super::event::{ConnectRequest, Effect, Signal};
use super::failure::LoginFailure;
use super::generator::{ConnectionGenerator, Step};
use super::settings::ConnectionSettings;
use super::stream_error::{Redirect, StreamError};
use super::AttemptId;
use crate::config::{LoginSettings, ProxyInfo, ServerEntry};
use crate::types::Credentials;

/// Status code that proves plain HTTP gets through
const PROBE_OK: u16 = 200;

/// What an attempt reports to its owner
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptSignal {
    ClientStateChange(ClientState),
    /// Terminal; the attempt will not try anything else
    LoginFailure(LoginFailure),
    /// The server asked to be contacted elsewhere
    Redirect(Redirect),
    /// An open session dropped
    UnexpectedDisconnect,
    /// Every candidate failed after an earlier session had worked
    NeedAutoReconnect,
    /// The client closed without error
    Logoff,
}

/// State machine for one login over a sequence of candidates
#[derive(Debug)]
pub struct SingleLoginAttempt {
    id: AttemptId,
    credentials: Credentials,
    lang: String,
    allow_unverified_certs: bool,
    auto_reconnect: bool,
    generator: ConnectionGenerator,
    state: ClientState,
    code: XmppErrorCode,
    subcode: i32,
    need_authentication: bool,
    certificate_expired: bool,
    successful_connection: bool,
    client: Option<ClientId>,
    next_client_seq: u32,
    last_proxy: Option<ProxyInfo>,
    diagnosing: bool,
    stopped: bool,
    signals: Signal<AttemptSignal>,
    effects: Vec<Effect>,
}

impl SingleLoginAttempt {
    /// Create an attempt over `servers`
    ///
    /// `successful_connection` carries over whether an earlier attempt of the
    /// same login ever reached `Open`.
    pub fn new(
        id: AttemptId,
        settings: &LoginSettings,
        servers: Vec<ServerEntry>,
        successful_connection: bool,
    ) -> Self {
        let generator = ConnectionGenerator::new(
            servers,
            settings.options.proxy.resolve(),
            settings.proxy_only,
        );

        Self {
            id,
            credentials: settings.credentials.clone(),
            lang: settings.lang.clone(),
            allow_unverified_certs: settings.options.allow_unverified_certs,
            auto_reconnect: settings.options.auto_reconnect,
            generator,
            state: ClientState::None,
            code: XmppErrorCode::None,
            subcode: 0,
            need_authentication: false,
            certificate_expired: false,
            successful_connection,
            client: None,
            next_client_seq: 0,
            last_proxy: None,
            diagnosing: false,
            stopped: false,
            signals: Signal::new(),
            effects: Vec::new(),
        }
    }

    pub fn id(&self) -> AttemptId {
        self.id
    }

    pub fn state(&self) -> ClientState {
        self.state
    }

    pub fn has_client(&self) -> bool {
        self.client.is_some()
    }

    pub fn successful_connection(&self) -> bool {
        self.successful_connection
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    /// Proxy of the working candidate, or of the last one attempted
    pub fn proxy(&self) -> Option<&ProxyInfo> {
        self.last_proxy.as_ref()
    }

    /// Candidate currently in use
    pub fn current_settings(&self) -> Option<&ConnectionSettings> {
        self.generator.current()
    }

    /// Start enumerating candidates
    pub fn start(&mut self) {
        if self.stopped {
            return;
        }
        if let Some(step) = self.generator.start_generating() {
            self.handle_step(step);
        }
    }

    /// Tear down the current client and try the next candidate
    pub fn use_next_connection(&mut self) {
        if self.stopped {
            return;
        }
        self.clear_client();
        if let Some(step) = self.generator.use_next_connection() {
            self.handle_step(step);
        }
    }

    /// Tear down the current client and retry the same candidate
    pub fn use_current_connection(&mut self) {
        if self.stopped {
            return;
        }
        self.clear_client();
        if let Some(step) = self.generator.use_current_connection() {
            self.handle_step(step);
        }
    }

    /// Feed a DNS result for this attempt's generator
    pub fn on_resolved(&mut self, server_index: usize, result: Result<Vec<std::net::IpAddr>, i32>) {
        if self.stopped {
            return;
        }
        if let Some(step) = self.generator.on_resolved(server_index, result) {
            self.handle_step(step);
        }
    }

    /// Feed progress of a protocol client
    ///
    /// Events from any client other than the live one are dropped.
    pub fn on_client_event(&mut self, client: ClientId, event: ClientEvent) {
        if self.stopped || self.client != Some(client) {
            debug!(attempt = self.id, client = %client, "Ignoring event from stale client");
            return;
        }

        match event {
            ClientEvent::Opening => self.on_client_state_change(ClientState::Opening),
            ClientEvent::Open => self.on_client_state_change(ClientState::Open),
            ClientEvent::Closed(error) => self.on_client_closed(error),
        }
    }

    /// Feed the connectivity probe's HTTP status
    pub fn on_probe_completed(&mut self, status: Option<u16>) {
        if self.stopped || !self.diagnosing {
            return;
        }
        self.diagnosing = false;

        if status == Some(PROBE_OK) {
            // Plain HTTP works, so the server itself is the problem
            info!(code = %self.code, subcode = self.subcode, "Connectivity probe succeeded");
            self.signal_failure(LoginFailure::protocol(self.code, self.subcode));
        } else {
            warn!(?status, "Connectivity probe failed, reporting network problem");
            self.signal_failure(LoginFailure::no_connectivity());
        }
    }

    /// Stop the attempt
    ///
    /// The live client is torn down first and its final transitions are
    /// returned; afterwards every signal is severed for good.
    pub fn stop(&mut self) -> Vec<AttemptSignal> {
        if self.stopped {
            return Vec::new();
        }

        self.clear_client();
        self.stopped = true;
        self.diagnosing = false;

        let remaining = self.signals.drain();
        self.signals.disconnect_all();
        remaining
    }

    /// Signals emitted since the last call
    pub fn take_signals(&mut self) -> Vec<AttemptSignal> {
        self.signals.drain()
    }

    /// Effects requested since the last call
    pub fn take_effects(&mut self) -> Vec<Effect> {
        mem::take(&mut self.effects)
    }

    fn handle_step(&mut self, step: Step) {
        match step {
            Step::NewSettings(settings) => self.do_login(settings),
            Step::Resolve { server_index, host } => self.effects.push(Effect::Resolve {
                attempt: self.id,
                server_index,
                host,
            }),
            Step::Exhausted {
                successfully_resolved_dns,
                first_dns_error,
            } => self.on_attempted_all_connections(successfully_resolved_dns, first_dns_error),
        }
    }

    fn do_login(&mut self, settings: ConnectionSettings) {
        if self.client.is_some() {
            debug!(attempt = self.id, "Client already live, ignoring new settings");
            return;
        }

        self.next_client_seq += 1;
        let client = ClientId {
            attempt: self.id,
            seq: self.next_client_seq,
        };

        let proxy = if settings.use_proxy {
            self.generator.proxy().cloned()
        } else {
            None
        };
        self.last_proxy = proxy.clone();

        info!(client = %client, candidate = %settings, "Starting login");

        self.client = Some(client);
        self.on_client_state_change(ClientState::Start);
        self.effects.push(Effect::OpenClient {
            client,
            request: ConnectRequest {
                settings,
                proxy,
                credentials: self.credentials.clone(),
                lang: self.lang.clone(),
                allow_unverified_certs: self.allow_unverified_certs,
            },
        });
    }

    /// Destroy the live client, processing its close synchronously
    fn clear_client(&mut self) {
        if let Some(client) = self.client {
            self.effects.push(Effect::CloseClient { client });
            self.on_client_closed(ClientError::none());
            debug_assert!(self.client.is_none(), "client survived its own disconnect");
        }
    }

    fn on_client_state_change(&mut self, state: ClientState) {
        if self.state == state {
            return;
        }
        self.state = state;

        if state == ClientState::Open {
            self.successful_connection = true;
        }
        self.signals.emit(AttemptSignal::ClientStateChange(state));
    }

    fn on_client_closed(&mut self, error: ClientError) {
        let previous = self.state;
        self.state = ClientState::Closed;

        // Exclusive owner: the handle goes away before anything else happens
        let client = self.client.take();
        debug_assert!(client.is_some(), "closed without a live client");

        debug!(attempt = self.id, error = %error, previous = %previous, "Client closed");

        if error.fault == Some(TransportFault::ProxyAuthenticationRequired) {
            self.need_authentication = true;
        }

        self.signals
            .emit(AttemptSignal::ClientStateChange(ClientState::Closed));
        self.on_client_state_change(ClientState::None);

        if !error.is_error() {
            self.signals.emit(AttemptSignal::Logoff);
        } else if previous == ClientState::Open {
            // We were fully connected and dropped
            self.signals.emit(AttemptSignal::UnexpectedDisconnect);
        } else {
            self.handle_connection_error(error);
        }
    }

    fn handle_connection_error(&mut self, error: ClientError) {
        info!(code = %error.code, subcode = error.subcode, "Connection error");

        self.code = error.code;
        self.subcode = error.subcode;

        if self.code.is_credential_error() {
            // A different transport will not fix bad credentials
            info!("Credentials rejected, giving up");
            self.signal_failure(LoginFailure::protocol(self.code, self.subcode));
            return;
        }

        if error.fault == Some(TransportFault::CertificateExpired) {
            self.certificate_expired = true;
        }

        // Let the server pick the resource on the next try
        self.credentials.resource = None;

        if let Some(raw) = error.stream_error.as_deref() {
            match StreamError::parse(raw) {
                Ok(stream_error) => {
                    if let Some(redirect) = stream_error.redirect() {
                        info!(host = %redirect.host, port = redirect.port, "Server redirect");
                        self.signals.emit(AttemptSignal::Redirect(redirect));
                        return;
                    }
                }
                Err(e) => warn!("Unparsable stream error: {}", e),
            }
        }

        self.use_next_connection();
    }

    fn on_attempted_all_connections(&mut self, successfully_resolved_dns: bool, first_dns_error: i32) {
        if self.need_authentication {
            self.signal_failure(LoginFailure::ProxyAuthenticationRequired);
            return;
        }

        if self.certificate_expired {
            self.signal_failure(LoginFailure::CertificateExpired);
            return;
        }

        if !successfully_resolved_dns {
            self.code = XmppErrorCode::Socket;
            self.subcode = first_dns_error;
        }

        info!(code = %self.code, subcode = self.subcode, "Connection failed");

        if self.successful_connection && self.auto_reconnect {
            // A session worked before, the network is presumably fine
            self.signals.emit(AttemptSignal::NeedAutoReconnect);
            return;
        }

        self.diagnose_connection_error();
    }

    fn diagnose_connection_error(&mut self) {
        if !self.code.needs_diagnosis() {
            self.signal_failure(LoginFailure::protocol(self.code, self.subcode));
            return;
        }

        debug!(attempt = self.id, "Probing plain HTTP connectivity");
        self.diagnosing = true;
        self.effects.push(Effect::Probe {
            attempt: self.id,
            proxy: self.generator.proxy().cloned(),
        });
    }

    fn signal_failure(&mut self, failure: LoginFailure) {
        self.signals.emit(AttemptSignal::LoginFailure(failure));
    }
}
