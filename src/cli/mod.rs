//! CLI command implementations
//!
//! This module contains the implementation of all CLI subcommands.

pub mod candidates;
pub mod connect;
pub mod setup;

use notifier_core::error::NotifierError;

/// Single-threaded runtime hosting the login machinery
pub fn runtime() -> Result<tokio::runtime::Runtime, NotifierError> {
    Ok(tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?)
}
