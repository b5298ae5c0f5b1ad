//! Error types for the notifier login subsystem
//!
//! Configuration, keyring and runtime errors surface through `NotifierError`.
//! Login outcomes that the mediator reports to the user are modelled separately
//! as [`crate::login::LoginFailure`], which is a value rather than a Rust error
//! path.

use thiserror::Error;

/// Main error type for the notifier crates
#[derive(Error, Debug)]
pub enum NotifierError {
    /// Errors related to configuration loading/parsing
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Errors related to keyring operations
    #[error("Keyring error: {0}")]
    Keyring(#[from] KeyringError),

    /// Errors raised while setting up or driving a login
    #[error("Login error: {0}")]
    Login(#[from] LoginError),

    /// Generic I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parsing errors
    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    /// TOML serialization errors
    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load configuration file: {path}")]
    LoadFailed { path: String },

    #[error("Failed to save configuration file: {path}")]
    SaveFailed { path: String },

    #[error("Invalid proxy URL: {url}")]
    InvalidProxyUrl { url: String },

    #[error("Missing required configuration field: {field}")]
    MissingField { field: String },

    #[error("Configuration validation error: {message}")]
    ValidationError { message: String },

    #[error("I/O error: {message}")]
    IoError { message: String },
}

/// System keyring operation errors
#[derive(Error, Debug)]
pub enum KeyringError {
    #[error("Keyring service unavailable")]
    ServiceUnavailable,

    #[error("Failed to store credential in keyring")]
    StoreFailed,

    #[error("Auth token not found in keyring")]
    TokenNotFound,
}

/// Runtime errors of the login machinery itself
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LoginError {
    #[error("Login service is no longer running")]
    ServiceStopped,

    #[error("Failed to build HTTP client for connectivity probe: {reason}")]
    ProbeSetup { reason: String },
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, NotifierError>;
