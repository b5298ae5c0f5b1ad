//! Login orchestration
//!
//! [`Login`] is the long-lived façade the mediator talks to. It owns at most
//! one [`SingleLoginAttempt`] at a time, maps its client transitions to a
//! public [`ConnectionState`], honours server redirects for a limited window
//! and hands reconnect timing to [`AutoReconnect`].

use std::mem;
use std::time::Instant;

use tracing::{debug, info, warn};

use super::attempt::{AttemptSignal, SingleLoginAttempt};
use super::client::ClientState;
use super::event::{Effect, Input, LoginEvent, Signal};
use super::failure::LoginFailure;
use super::reconnect::AutoReconnect;
use super::state::ConnectionState;
use super::stream_error::Redirect;
use super::AttemptId;
use crate::config::{LoginSettings, ProxyInfo, ServerEntry};

#[derive(Debug, Clone)]
struct RedirectOverride {
    redirect: Redirect,
    received_at: Instant,
}

/// Connection orchestrator for one account
#[derive(Debug)]
pub struct Login {
    settings: LoginSettings,
    state: ConnectionState,
    attempt: Option<SingleLoginAttempt>,
    next_attempt_id: AttemptId,
    /// Some attempt of this login reached `Open`
    successful_connection: bool,
    redirect: Option<RedirectOverride>,
    /// A redirect was followed since the last `Open`
    redirected: bool,
    /// The last attempt ended with no connectivity; a network change retries
    offline: bool,
    last_proxy: Option<ProxyInfo>,
    auto_reconnect: AutoReconnect,
    signals: Signal<LoginEvent>,
    effects: Vec<Effect>,
}

impl Login {
    pub fn new(settings: LoginSettings, auto_reconnect: AutoReconnect) -> Self {
        Self {
            settings,
            state: ConnectionState::Closed,
            attempt: None,
            next_attempt_id: 0,
            successful_connection: false,
            redirect: None,
            redirected: false,
            offline: false,
            last_proxy: None,
            auto_reconnect,
            signals: Signal::new(),
            effects: Vec::new(),
        }
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.state
    }

    /// Proxy of the working connection, or of the last one attempted
    pub fn proxy(&self) -> Option<&ProxyInfo> {
        self.attempt
            .as_ref()
            .and_then(|attempt| attempt.proxy())
            .or(self.last_proxy.as_ref())
    }

    /// Seconds until the next automatic retry, only while `Retrying`
    pub fn seconds_until_reconnect(&self) -> Option<u64> {
        if self.state != ConnectionState::Retrying {
            return None;
        }
        self.auto_reconnect.seconds_until_reconnect()
    }

    /// Id of the live attempt
    pub fn attempt_id(&self) -> Option<AttemptId> {
        self.attempt.as_ref().map(|attempt| attempt.id())
    }

    pub fn settings(&self) -> &LoginSettings {
        &self.settings
    }

    /// Begin connecting unless an attempt is already running
    pub fn start_connection(&mut self) {
        if self.attempt.is_some() {
            debug!("Login attempt already running");
            return;
        }

        if self.auto_reconnect.is_retrying() {
            self.auto_reconnect.cancel();
            self.effects.push(Effect::CancelReconnect);
        }

        self.offline = false;
        self.next_attempt_id += 1;
        let servers = self.servers();
        info!(
            attempt = self.next_attempt_id,
            servers = servers.len(),
            "Starting connection"
        );

        let mut attempt = SingleLoginAttempt::new(
            self.next_attempt_id,
            &self.settings,
            servers,
            self.successful_connection,
        );
        attempt.start();
        self.attempt = Some(attempt);
        self.set_state(ConnectionState::Opening);
        self.pump();
    }

    /// Tear down the running attempt and start a fresh one
    pub fn restart_connection(&mut self) {
        self.abort_attempt();
        self.start_connection();
    }

    /// Skip the current candidate
    pub fn use_next_connection(&mut self) {
        if let Some(attempt) = self.attempt.as_mut() {
            attempt.use_next_connection();
            self.pump();
        }
    }

    /// Reconnect over the current candidate
    pub fn use_current_connection(&mut self) {
        if let Some(attempt) = self.attempt.as_mut() {
            attempt.use_current_connection();
            self.pump();
        }
    }

    /// Stop connecting and drop any scheduled retry
    pub fn stop(&mut self) {
        if self.auto_reconnect.is_retrying() {
            self.auto_reconnect.cancel();
            self.effects.push(Effect::CancelReconnect);
        }
        self.redirected = false;
        self.offline = false;
        self.abort_attempt();
        self.set_state(ConnectionState::Closed);
    }

    /// Feed a completion or external notification
    pub fn handle(&mut self, input: Input) {
        match input {
            Input::Resolved {
                attempt,
                server_index,
                result,
            } => {
                if let Some(live) = self.live_attempt(attempt) {
                    live.on_resolved(server_index, result);
                    self.pump();
                }
            }
            Input::Client { client, event } => {
                if let Some(live) = self.live_attempt(client.attempt) {
                    live.on_client_event(client, event);
                    self.pump();
                }
            }
            Input::ProbeCompleted { attempt, status } => {
                if let Some(live) = self.live_attempt(attempt) {
                    live.on_probe_completed(status);
                    self.pump();
                }
            }
            Input::ReconnectTimerFired => self.on_reconnect_timer(),
            Input::NetworkChanged => self.on_network_changed(),
        }
    }

    /// Events emitted since the last call
    pub fn take_events(&mut self) -> Vec<LoginEvent> {
        self.signals.drain()
    }

    /// Effects requested since the last call
    pub fn take_effects(&mut self) -> Vec<Effect> {
        mem::take(&mut self.effects)
    }

    fn live_attempt(&mut self, id: AttemptId) -> Option<&mut SingleLoginAttempt> {
        match self.attempt.as_mut() {
            Some(attempt) if attempt.id() == id => Some(attempt),
            _ => {
                debug!(attempt = id, "Dropping input for a finished attempt");
                None
            }
        }
    }

    /// Server list for the next attempt
    fn servers(&self) -> Vec<ServerEntry> {
        match &self.redirect {
            Some(over) if over.received_at.elapsed() < self.settings.redirect_timeout => {
                vec![ServerEntry::new(
                    over.redirect.host.clone(),
                    over.redirect.port,
                    false,
                )]
            }
            _ => self.settings.servers.clone(),
        }
    }

    /// Move the attempt's effects and signals up until it goes quiet
    fn pump(&mut self) {
        loop {
            let Some(attempt) = self.attempt.as_mut() else {
                return;
            };
            let id = attempt.id();
            self.effects.extend(attempt.take_effects());

            let signals = attempt.take_signals();
            if signals.is_empty() {
                return;
            }

            for signal in signals {
                if self.attempt_id() != Some(id) {
                    // The attempt was replaced or dropped while handling
                    return;
                }
                self.on_attempt_signal(signal);
            }
        }
    }

    fn abort_attempt(&mut self) {
        let Some(mut attempt) = self.attempt.take() else {
            return;
        };

        debug!(attempt = attempt.id(), "Aborting login attempt");
        let remaining = attempt.stop();
        self.effects.extend(attempt.take_effects());
        if let Some(proxy) = attempt.proxy() {
            self.last_proxy = Some(proxy.clone());
        }

        for signal in remaining {
            self.on_attempt_signal(signal);
        }
    }

    fn on_attempt_signal(&mut self, signal: AttemptSignal) {
        match signal {
            AttemptSignal::ClientStateChange(state) => self.on_client_state_change(state),
            AttemptSignal::Logoff => {
                info!("Logged off");
                self.abort_attempt();
                self.set_state(ConnectionState::Closed);
            }
            AttemptSignal::LoginFailure(failure) => self.on_login_failure(failure),
            AttemptSignal::Redirect(redirect) => self.on_redirect(redirect),
            AttemptSignal::UnexpectedDisconnect => {
                warn!("Connection dropped unexpectedly");
                self.try_reconnect();
            }
            AttemptSignal::NeedAutoReconnect => {
                info!("All candidates failed after an earlier session, reconnecting later");
                self.try_reconnect();
            }
        }
    }

    fn on_client_state_change(&mut self, state: ClientState) {
        match state {
            ClientState::Start | ClientState::Opening => self.set_state(ConnectionState::Opening),
            ClientState::Open => {
                self.successful_connection = true;
                self.redirected = false;
                self.auto_reconnect.reset();
                if let Some(proxy) = self.attempt.as_ref().and_then(|a| a.proxy()) {
                    self.last_proxy = Some(proxy.clone());
                }
                self.set_state(ConnectionState::Opened);
            }
            // Transient; the attempt reports what follows
            ClientState::None | ClientState::Closed => {}
        }
    }

    fn on_login_failure(&mut self, failure: LoginFailure) {
        warn!(%failure, "Login failed");

        if self.auto_reconnect.is_retrying() {
            self.auto_reconnect.cancel();
            self.effects.push(Effect::CancelReconnect);
        }
        self.offline = failure.is_no_connectivity();
        self.set_state(ConnectionState::Closed);
        self.signals.emit(LoginEvent::Failure(failure));
        self.abort_attempt();
    }

    fn on_redirect(&mut self, redirect: Redirect) {
        self.signals.emit(LoginEvent::Redirected {
            host: redirect.host.clone(),
            port: redirect.port,
        });
        self.redirect = Some(RedirectOverride {
            redirect,
            received_at: Instant::now(),
        });

        if mem::replace(&mut self.redirected, true) {
            // Redirected again without ever opening: back off
            info!("Repeated redirect, reconnecting later");
            self.try_reconnect();
        } else {
            self.restart_connection();
        }
    }

    fn try_reconnect(&mut self) {
        if self.settings.options.auto_reconnect {
            // Start the countdown first so the close reads as Retrying
            let delay = self.auto_reconnect.schedule();
            self.effects.push(Effect::ScheduleReconnect { delay });
            self.signals.emit(LoginEvent::ReconnectScheduled { delay });
        }
        self.abort_attempt();
        self.set_state(ConnectionState::Closed);
    }

    fn on_network_changed(&mut self) {
        if self.offline && self.attempt.is_none() && self.state == ConnectionState::Closed {
            info!("Network changed after a connectivity failure, reconnecting");
            self.start_connection();
            return;
        }

        if !matches!(
            self.state,
            ConnectionState::Opened | ConnectionState::Retrying
        ) {
            debug!(state = %self.state, "Ignoring network change");
            return;
        }

        info!("Network changed, reconnecting");
        let delay = self.auto_reconnect.schedule_network_change();
        self.effects.push(Effect::ScheduleReconnect { delay });
        self.signals.emit(LoginEvent::ReconnectScheduled { delay });
        self.abort_attempt();
        self.set_state(ConnectionState::Closed);
    }

    fn on_reconnect_timer(&mut self) {
        if !self.auto_reconnect.is_retrying() {
            debug!("Ignoring cancelled reconnect timer");
            return;
        }

        self.auto_reconnect.fired();
        self.restart_connection();
    }

    /// Publish a state change; `Closed` reads as `Retrying` while a retry is due
    fn set_state(&mut self, state: ConnectionState) {
        let state = if state == ConnectionState::Closed && self.auto_reconnect.is_retrying() {
            ConnectionState::Retrying
        } else {
            state
        };

        if self.state == state {
            return;
        }
        debug!(from = %self.state, to = %state, "Connection state changed");
        self.state = state;
        self.signals.emit(LoginEvent::StateChanged(state));
    }
}
