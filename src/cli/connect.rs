//! Connect command
//!
//! Runs the login service until Ctrl-C, printing state changes and
//! failures as they happen.

use chrono::Local;
use colored::{ColoredString, Colorize};
use notifier_core::config::{toml_config, LoginSettings};
use notifier_core::credentials::keyring;
use notifier_core::error::NotifierError;
use notifier_core::login::{AutoReconnect, ConnectionState, ExponentialBackoff, Login, LoginEvent};
use notifier_core::net::{NetworkEvent, NetworkMonitor};
use notifier_core::service::{Adapters, LoginHandle, LoginService};
use tracing::{debug, info};

/// Run the connect command
pub fn run_connect() -> Result<(), NotifierError> {
    let config = toml_config::load_config()?;
    let token = keyring::retrieve_token(&config.notifier.username)?;
    println!("Connecting as {}", config.notifier.username.bold());

    let settings = LoginSettings::from_config(&config.notifier, token);
    let policy = ExponentialBackoff::new(config.reconnection_policy());
    let login = Login::new(settings, AutoReconnect::new(Box::new(policy)));
    let adapters = Adapters::system(&config.probe_config())?;

    let runtime = super::runtime()?;
    runtime.block_on(async move {
        let (service, handle, mut events) = LoginService::new(login, adapters);
        let service_task = tokio::spawn(service.run());

        watch_network(handle.clone()).await;
        handle.start()?;

        let mut stopping = false;
        loop {
            tokio::select! {
                event = events.recv() => match event {
                    Some(event) => print_event(&event),
                    // Service finished
                    None => break,
                },
                _ = tokio::signal::ctrl_c(), if !stopping => {
                    println!();
                    info!("Interrupted, disconnecting");
                    stopping = true;
                    handle.stop()?;
                }
            }
        }

        let _ = service_task.await;
        Ok::<(), NotifierError>(())
    })
}

/// Forward NetworkManager connectivity changes, when available
async fn watch_network(handle: LoginHandle) {
    let monitor = match NetworkMonitor::new().await {
        Ok(monitor) => monitor,
        Err(e) => {
            debug!("Network change detection unavailable: {}", e);
            return;
        }
    };

    match monitor.is_network_available().await {
        Ok(false) => println!("{}", "Network appears to be offline, will retry".yellow()),
        Ok(true) => {}
        Err(e) => debug!("Could not query network state: {}", e),
    }

    let mut network_events = monitor.start();
    tokio::spawn(async move {
        while let Some(event) = network_events.recv().await {
            if event == NetworkEvent::NetworkUp && handle.network_changed().is_err() {
                break;
            }
        }
    });
}

fn print_event(event: &LoginEvent) {
    let timestamp = Local::now().format("%H:%M:%S").to_string().dimmed();

    match event {
        LoginEvent::StateChanged(state) => {
            println!("[{}] {}", timestamp, colored_state(*state));
        }
        LoginEvent::Failure(failure) => {
            println!("[{}] {} {}", timestamp, "✗".red().bold(), failure.to_string().red());
            if failure.is_credential_error() {
                println!("    Run `notifier set-token` to store a fresh token.");
            }
        }
        LoginEvent::Redirected { host, port } => {
            println!("[{}] ↪ redirected to {}:{}", timestamp, host, port);
        }
        LoginEvent::ReconnectScheduled { delay } => {
            println!("[{}] reconnecting in {}s", timestamp, delay.as_secs());
        }
    }
}

fn colored_state(state: ConnectionState) -> ColoredString {
    let label = state.to_string();
    match state {
        ConnectionState::Opened => label.green().bold(),
        ConnectionState::Opening => label.cyan(),
        ConnectionState::Retrying => label.yellow(),
        ConnectionState::Closed => label.red(),
    }
}
