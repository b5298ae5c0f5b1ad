//! Core library for the notifier XMPP client
//!
//! This crate provides connection establishment for the notification
//! client: candidate enumeration, single login attempts with failure
//! diagnosis, and the login orchestrator with redirect and reconnect
//! handling, plus the configuration and credential storage around them.

pub mod error;
pub mod types;

pub mod config;
pub mod credentials;
pub mod login;
pub mod net;
pub mod service;

/// Initialize logging infrastructure
///
/// Sets up tracing with systemd journal logging for production use.
/// In development, logs to stderr with appropriate formatting. `RUST_LOG`
/// overrides the default INFO level.
pub fn init_logging() -> Result<(), Box<dyn std::error::Error>> {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = || EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    // Try to use systemd journal logging if available
    #[cfg(target_os = "linux")]
    {
        if std::env::var("JOURNAL_STREAM").is_ok() {
            let journal_layer = tracing_journald::layer()?;
            tracing_subscriber::registry()
                .with(journal_layer)
                .with(filter())
                .init();
            return Ok(());
        }
    }

    // Fallback to stderr logging with pretty formatting
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().pretty().with_writer(std::io::stderr))
        .with(filter())
        .init();

    Ok(())
}
