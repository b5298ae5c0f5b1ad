//! Integration tests for the login orchestrator
//!
//! Exercises Login end to end over scripted DNS and client results:
//! fallback across servers, redirects, reconnect scheduling, network changes
//! and shutdown.

use notifier_core::config::{
    ConnectionOptions, LoginSettings, ProxyInfo, ProxyMode, ServerEntry,
};
use notifier_core::login::{
    AttemptId, AutoReconnect, ClientError, ClientEvent, ClientId, ConnectRequest,
    ConnectionState, Effect, ExponentialBackoff, Input, Login, LoginEvent, LoginFailure,
    ReconnectionPolicy, XmppErrorCode,
};
use notifier_core::types::{AuthToken, Credentials};
use std::net::IpAddr;
use std::time::Duration;

const SEE_OTHER_HOST: &str = "<stream:error>\
    <see-other-host xmlns='urn:ietf:params:xml:ns:xmpp-streams'>other.example.com:5223</see-other-host>\
    </stream:error>";

// Helper function to create the reconnection policy used by these tests
fn test_policy() -> ReconnectionPolicy {
    ReconnectionPolicy {
        base_interval_secs: 5,
        backoff_multiplier: 2,
        max_interval_secs: 60,
        network_change_delay_secs: 1,
    }
}

fn settings(servers: Vec<ServerEntry>) -> LoginSettings {
    let options = ConnectionOptions {
        proxy: ProxyMode::None,
        ..ConnectionOptions::default()
    };
    LoginSettings::new(
        servers,
        options,
        Credentials::new("user@example.com", AuthToken::new("token".into())),
    )
}

fn two_servers() -> LoginSettings {
    settings(vec![
        ServerEntry::new("a.example.com", 5222, false),
        ServerEntry::new("b.example.com", 5222, false),
    ])
}

fn login(settings: LoginSettings) -> Login {
    let policy = ExponentialBackoff::new(test_policy());
    Login::new(settings, AutoReconnect::new(Box::new(policy)))
}

fn addr(s: &str) -> IpAddr {
    s.parse().unwrap()
}

/// The resolution requested by the latest batch of effects
fn resolve_request(login: &mut Login) -> (AttemptId, usize, String) {
    login
        .take_effects()
        .into_iter()
        .find_map(|effect| match effect {
            Effect::Resolve {
                attempt,
                server_index,
                host,
            } => Some((attempt, server_index, host)),
            _ => None,
        })
        .expect("expected a Resolve effect")
}

/// The client opened by the latest batch of effects
fn opened_client(login: &mut Login) -> (ClientId, ConnectRequest) {
    login
        .take_effects()
        .into_iter()
        .find_map(|effect| match effect {
            Effect::OpenClient { client, request } => Some((client, request)),
            _ => None,
        })
        .expect("expected an OpenClient effect")
}

fn resolved(attempt: AttemptId, server_index: usize, addresses: &[&str]) -> Input {
    Input::Resolved {
        attempt,
        server_index,
        result: Ok(addresses.iter().map(|a| addr(a)).collect()),
    }
}

fn client_event(client: ClientId, event: ClientEvent) -> Input {
    Input::Client { client, event }
}

fn states(events: &[LoginEvent]) -> Vec<ConnectionState> {
    events
        .iter()
        .filter_map(|event| match event {
            LoginEvent::StateChanged(state) => Some(*state),
            _ => None,
        })
        .collect()
}

/// Start, resolve the first server and open the first candidate
fn connect(login: &mut Login) -> (ClientId, ConnectRequest) {
    login.start_connection();
    let (attempt, index, _) = resolve_request(login);
    login.handle(resolved(attempt, index, &["10.0.0.1"]));
    let (client, request) = opened_client(login);
    login.handle(client_event(client, ClientEvent::Opening));
    login.handle(client_event(client, ClientEvent::Open));
    (client, request)
}

/// Test the first server failing falls through to the second one
#[test]
fn test_second_server_after_first_fails() {
    let mut login = login(two_servers());
    login.start_connection();

    let (attempt, index, host) = resolve_request(&mut login);
    assert_eq!((index, host.as_str()), (0, "a.example.com"));
    login.handle(resolved(attempt, 0, &["10.0.0.1"]));

    let (first, _) = opened_client(&mut login);
    login.handle(client_event(first, ClientEvent::Closed(ClientError::socket(-111))));

    let (attempt, index, host) = resolve_request(&mut login);
    assert_eq!((index, host.as_str()), (1, "b.example.com"));
    login.handle(resolved(attempt, 1, &["10.0.1.1"]));

    let (second, request) = opened_client(&mut login);
    assert_eq!(request.settings.host, "b.example.com");
    login.handle(client_event(second, ClientEvent::Opening));
    login.handle(client_event(second, ClientEvent::Open));

    assert_eq!(
        states(&login.take_events()),
        vec![ConnectionState::Opening, ConnectionState::Opened]
    );
    assert_eq!(login.connection_state(), ConnectionState::Opened);
}

/// Test starting twice does not create a second attempt
#[test]
fn test_start_connection_is_idempotent() {
    let mut login = login(two_servers());
    login.start_connection();
    let first = login.attempt_id();
    login.start_connection();

    assert_eq!(login.attempt_id(), first);
    let resolves = login
        .take_effects()
        .iter()
        .filter(|e| matches!(e, Effect::Resolve { .. }))
        .count();
    assert_eq!(resolves, 1);
}

/// Test a dropped session schedules a reconnect and retries when it fires
#[test]
fn test_unexpected_disconnect_schedules_reconnect() {
    let mut login = login(two_servers());
    let (client, _) = connect(&mut login);
    login.take_events();

    login.handle(client_event(
        client,
        ClientEvent::Closed(ClientError::new(XmppErrorCode::ConnectionClosed, 0)),
    ));

    assert_eq!(
        login.take_events(),
        vec![
            LoginEvent::ReconnectScheduled {
                delay: Duration::from_secs(5)
            },
            LoginEvent::StateChanged(ConnectionState::Retrying),
        ]
    );
    assert!(login.take_effects().iter().any(|e| matches!(
        e,
        Effect::ScheduleReconnect { delay } if *delay == Duration::from_secs(5)
    )));
    assert_eq!(login.attempt_id(), None);
    let secs = login.seconds_until_reconnect().unwrap();
    assert!((4..=5).contains(&secs));

    login.handle(Input::ReconnectTimerFired);
    assert_eq!(
        states(&login.take_events()),
        vec![ConnectionState::Opening]
    );
    let (attempt, index, _) = resolve_request(&mut login);
    assert_eq!((attempt, index), (2, 0));

    // The old client is long gone
    login.handle(client_event(client, ClientEvent::Open));
    assert!(login.take_events().is_empty());
    assert_eq!(login.connection_state(), ConnectionState::Opening);
}

/// Test backoff grows across failed retries and resets after a session
#[test]
fn test_backoff_resets_after_open() {
    let mut login = login(settings(vec![ServerEntry::new("a.example.com", 5222, false)]));
    let (client, _) = connect(&mut login);
    login.handle(client_event(
        client,
        ClientEvent::Closed(ClientError::new(XmppErrorCode::ConnectionClosed, 0)),
    ));
    login.take_events();

    // Retry fails everywhere; an earlier success means no probe, just backoff
    login.handle(Input::ReconnectTimerFired);
    let (attempt, index, _) = resolve_request(&mut login);
    login.handle(resolved(attempt, index, &["10.0.0.1"]));
    let (client, _) = opened_client(&mut login);
    login.handle(client_event(client, ClientEvent::Closed(ClientError::socket(-111))));

    assert!(login.take_events().contains(&LoginEvent::ReconnectScheduled {
        delay: Duration::from_secs(10)
    }));
    assert_eq!(login.connection_state(), ConnectionState::Retrying);

    // This time the session comes up, then drops again
    login.handle(Input::ReconnectTimerFired);
    let (attempt, index, _) = resolve_request(&mut login);
    login.handle(resolved(attempt, index, &["10.0.0.1"]));
    let (client, _) = opened_client(&mut login);
    login.handle(client_event(client, ClientEvent::Open));
    login.handle(client_event(
        client,
        ClientEvent::Closed(ClientError::new(XmppErrorCode::ConnectionClosed, 0)),
    ));

    assert!(login.take_events().contains(&LoginEvent::ReconnectScheduled {
        delay: Duration::from_secs(5)
    }));
}

/// Test without auto-reconnect a dropped session just closes
#[test]
fn test_disconnect_without_auto_reconnect() {
    let mut settings = two_servers();
    settings.options.auto_reconnect = false;
    let mut login = login(settings);
    let (client, _) = connect(&mut login);
    login.take_events();
    login.take_effects();

    login.handle(client_event(
        client,
        ClientEvent::Closed(ClientError::new(XmppErrorCode::ConnectionClosed, 0)),
    ));

    assert_eq!(
        login.take_events(),
        vec![LoginEvent::StateChanged(ConnectionState::Closed)]
    );
    assert!(!login
        .take_effects()
        .iter()
        .any(|e| matches!(e, Effect::ScheduleReconnect { .. })));
    assert_eq!(login.seconds_until_reconnect(), None);
}

/// Test a terminal failure closes the login and is forwarded once
#[test]
fn test_login_failure_is_forwarded() {
    let mut login = login(two_servers());
    login.start_connection();
    let (attempt, index, _) = resolve_request(&mut login);
    login.handle(resolved(attempt, index, &["10.0.0.1", "10.0.0.2"]));
    let (client, _) = opened_client(&mut login);
    login.take_events();

    login.handle(client_event(
        client,
        ClientEvent::Closed(ClientError::new(XmppErrorCode::Unauthorized, 0)),
    ));

    let failure = LoginFailure::protocol(XmppErrorCode::Unauthorized, 0);
    assert_eq!(
        login.take_events(),
        vec![
            LoginEvent::StateChanged(ConnectionState::Closed),
            LoginEvent::Failure(failure),
        ]
    );
    assert_eq!(login.attempt_id(), None);

    // Nothing is retried and late results go nowhere
    login.handle(resolved(attempt, index, &["10.0.0.3"]));
    assert!(login.take_events().is_empty());
    assert!(!login
        .take_effects()
        .iter()
        .any(|e| matches!(e, Effect::OpenClient { .. } | Effect::ScheduleReconnect { .. })));
}

/// Test a probe result for the live attempt ends it
#[test]
fn test_probe_result_reaches_attempt() {
    let mut login = login(settings(vec![ServerEntry::new("a.example.com", 5222, false)]));
    login.start_connection();
    let (attempt, index, _) = resolve_request(&mut login);
    login.handle(resolved(attempt, index, &["10.0.0.1"]));
    let (client, _) = opened_client(&mut login);
    login.handle(client_event(client, ClientEvent::Closed(ClientError::socket(-111))));

    assert!(login
        .take_effects()
        .iter()
        .any(|e| matches!(e, Effect::Probe { attempt: a, proxy: None } if *a == attempt)));

    login.handle(Input::ProbeCompleted {
        attempt,
        status: Some(503),
    });
    assert!(login
        .take_events()
        .contains(&LoginEvent::Failure(LoginFailure::no_connectivity())));
    assert_eq!(login.connection_state(), ConnectionState::Closed);
}

/// Test a redirect restarts the login against the redirected host
#[test]
fn test_redirect_restarts_with_target() {
    let mut login = login(two_servers());
    login.start_connection();
    let (attempt, index, _) = resolve_request(&mut login);
    login.handle(resolved(attempt, index, &["10.0.0.1", "10.0.0.2"]));
    let (client, _) = opened_client(&mut login);

    login.handle(client_event(client, ClientEvent::Closed(ClientError::stream(SEE_OTHER_HOST))));

    assert!(login.take_events().contains(&LoginEvent::Redirected {
        host: "other.example.com".into(),
        port: 5223
    }));
    let (attempt, index, host) = resolve_request(&mut login);
    assert_eq!((attempt, index, host.as_str()), (2, 0, "other.example.com"));

    login.handle(resolved(attempt, 0, &["10.9.9.9"]));
    let (_, request) = opened_client(&mut login);
    assert_eq!(request.settings.port, 5223);
    assert!(!request.settings.use_fake_tls_port);
    assert_eq!(login.connection_state(), ConnectionState::Opening);
}

/// Test a second redirect before any session opens waits for the backoff
#[test]
fn test_repeated_redirect_backs_off() {
    let mut settings = two_servers();
    settings.redirect_timeout = Duration::ZERO;
    let mut login = login(settings);
    login.start_connection();
    let (attempt, index, _) = resolve_request(&mut login);
    login.handle(resolved(attempt, index, &["10.0.0.1"]));
    let (client, _) = opened_client(&mut login);

    // First redirect restarts right away
    login.handle(client_event(client, ClientEvent::Closed(ClientError::stream(SEE_OTHER_HOST))));
    let (attempt, index, _) = resolve_request(&mut login);
    assert_eq!(attempt, 2);
    login.handle(resolved(attempt, index, &["10.0.0.1"]));
    let (client, _) = opened_client(&mut login);
    login.take_events();

    login.handle(client_event(client, ClientEvent::Closed(ClientError::stream(SEE_OTHER_HOST))));

    assert_eq!(
        login.take_events(),
        vec![
            LoginEvent::Redirected {
                host: "other.example.com".into(),
                port: 5223
            },
            LoginEvent::ReconnectScheduled {
                delay: Duration::from_secs(5)
            },
            LoginEvent::StateChanged(ConnectionState::Retrying),
        ]
    );
    let effects = login.take_effects();
    assert!(!effects.iter().any(|e| matches!(e, Effect::Resolve { .. })));
    assert!(effects.iter().any(|e| matches!(
        e,
        Effect::ScheduleReconnect { delay } if *delay == Duration::from_secs(5)
    )));
    assert_eq!(login.attempt_id(), None);

    // An open session clears the count
    login.handle(Input::ReconnectTimerFired);
    let (attempt, index, _) = resolve_request(&mut login);
    assert_eq!(attempt, 3);
    login.handle(resolved(attempt, index, &["10.0.0.1"]));
    let (client, _) = opened_client(&mut login);
    login.handle(client_event(client, ClientEvent::Open));
    login.handle(client_event(client, ClientEvent::Closed(ClientError::none())));

    login.start_connection();
    let (attempt, index, _) = resolve_request(&mut login);
    login.handle(resolved(attempt, index, &["10.0.0.1"]));
    let (client, _) = opened_client(&mut login);
    login.handle(client_event(client, ClientEvent::Closed(ClientError::stream(SEE_OTHER_HOST))));

    let (attempt, _, _) = resolve_request(&mut login);
    assert_eq!(attempt, 5);
}

/// Test an expired redirect falls back to the configured servers
#[test]
fn test_redirect_window_expires() {
    let mut settings = two_servers();
    settings.redirect_timeout = Duration::ZERO;
    let mut login = login(settings);
    login.start_connection();
    let (attempt, index, _) = resolve_request(&mut login);
    login.handle(resolved(attempt, index, &["10.0.0.1"]));
    let (client, _) = opened_client(&mut login);

    login.handle(client_event(client, ClientEvent::Closed(ClientError::stream(SEE_OTHER_HOST))));

    let (_, _, host) = resolve_request(&mut login);
    assert_eq!(host, "a.example.com");
}

/// Test stop tears the client down and silences late callbacks
#[test]
fn test_stop_suppresses_late_callbacks() {
    let mut login = login(two_servers());
    let (client, _) = connect(&mut login);
    login.take_events();

    login.stop();

    assert!(login
        .take_effects()
        .iter()
        .any(|e| matches!(e, Effect::CloseClient { client: c } if *c == client)));
    assert_eq!(
        login.take_events(),
        vec![LoginEvent::StateChanged(ConnectionState::Closed)]
    );

    login.handle(client_event(client, ClientEvent::Closed(ClientError::socket(-111))));
    login.handle(Input::ReconnectTimerFired);
    assert!(login.take_events().is_empty());
    assert!(login.take_effects().is_empty());
    assert_eq!(login.connection_state(), ConnectionState::Closed);
}

/// Test stop while retrying cancels the countdown
#[test]
fn test_stop_while_retrying() {
    let mut login = login(two_servers());
    let (client, _) = connect(&mut login);
    login.handle(client_event(
        client,
        ClientEvent::Closed(ClientError::new(XmppErrorCode::ConnectionClosed, 0)),
    ));
    login.take_effects();
    assert_eq!(login.connection_state(), ConnectionState::Retrying);

    login.stop();

    assert_eq!(login.take_effects().len(), 1);
    assert_eq!(login.connection_state(), ConnectionState::Closed);
    assert_eq!(login.seconds_until_reconnect(), None);
}

/// Test a network change reconnects an open session after a short delay
#[test]
fn test_network_change_reconnects() {
    let mut login = login(two_servers());
    let (client, _) = connect(&mut login);
    login.take_events();
    login.take_effects();

    login.handle(Input::NetworkChanged);

    assert_eq!(
        login.take_events(),
        vec![
            LoginEvent::ReconnectScheduled {
                delay: Duration::from_secs(1)
            },
            LoginEvent::StateChanged(ConnectionState::Retrying),
        ]
    );
    let effects = login.take_effects();
    assert!(effects
        .iter()
        .any(|e| matches!(e, Effect::CloseClient { client: c } if *c == client)));
    assert!(effects.iter().any(|e| matches!(
        e,
        Effect::ScheduleReconnect { delay } if *delay == Duration::from_secs(1)
    )));
}

/// Test a clean logoff ends the attempt so the login can start again
#[test]
fn test_logoff_allows_restart() {
    let mut login = login(two_servers());
    let (client, _) = connect(&mut login);
    login.take_events();
    login.take_effects();

    login.handle(client_event(client, ClientEvent::Closed(ClientError::none())));

    assert_eq!(
        login.take_events(),
        vec![LoginEvent::StateChanged(ConnectionState::Closed)]
    );
    assert_eq!(login.attempt_id(), None);
    assert!(!login
        .take_effects()
        .iter()
        .any(|e| matches!(e, Effect::ScheduleReconnect { .. })));

    login.start_connection();
    let (attempt, index, host) = resolve_request(&mut login);
    assert_eq!((attempt, index, host.as_str()), (2, 0, "a.example.com"));
    assert_eq!(login.connection_state(), ConnectionState::Opening);
}

/// Test a network change retries after a connectivity failure
#[test]
fn test_network_change_after_connectivity_failure() {
    let mut login = login(settings(vec![ServerEntry::new("a.example.com", 5222, false)]));
    login.start_connection();
    let (attempt, index, _) = resolve_request(&mut login);
    login.handle(resolved(attempt, index, &["10.0.0.1"]));
    let (client, _) = opened_client(&mut login);
    login.handle(client_event(client, ClientEvent::Closed(ClientError::socket(-106))));
    login.handle(Input::ProbeCompleted {
        attempt,
        status: None,
    });
    assert_eq!(login.connection_state(), ConnectionState::Closed);
    login.take_events();

    login.handle(Input::NetworkChanged);

    assert_eq!(
        states(&login.take_events()),
        vec![ConnectionState::Opening]
    );
    let (attempt, _, _) = resolve_request(&mut login);
    assert_eq!(attempt, 2);
}

/// Test a network change does not undo other terminal failures
#[test]
fn test_network_change_ignored_after_credential_failure() {
    let mut login = login(two_servers());
    login.start_connection();
    let (attempt, index, _) = resolve_request(&mut login);
    login.handle(resolved(attempt, index, &["10.0.0.1"]));
    let (client, _) = opened_client(&mut login);
    login.handle(client_event(
        client,
        ClientEvent::Closed(ClientError::new(XmppErrorCode::Unauthorized, 0)),
    ));
    login.take_events();
    login.take_effects();

    login.handle(Input::NetworkChanged);

    assert!(login.take_events().is_empty());
    assert!(login.take_effects().is_empty());
    assert_eq!(login.attempt_id(), None);
}

/// Test a network change is ignored while closed
#[test]
fn test_network_change_ignored_when_closed() {
    let mut login = login(two_servers());
    login.handle(Input::NetworkChanged);

    assert!(login.take_events().is_empty());
    assert!(login.take_effects().is_empty());
}

/// Test the working proxy is reported and remembered
#[test]
fn test_proxy_of_working_connection() {
    let proxy = ProxyInfo::new("proxy.local", 3128);
    let mut settings = two_servers();
    settings.options.proxy = ProxyMode::Fixed(proxy.clone());
    let mut login = login(settings);
    assert_eq!(login.proxy(), None);

    let (_, request) = connect(&mut login);
    assert!(request.settings.use_proxy);
    assert_eq!(request.proxy.as_ref(), Some(&proxy));
    assert_eq!(login.proxy(), Some(&proxy));

    login.stop();
    assert_eq!(login.proxy(), Some(&proxy));
}
