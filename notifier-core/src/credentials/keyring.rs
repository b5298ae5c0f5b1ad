//! Keyring operations for secure credential storage
//!
//! Uses the system keyring (GNOME Keyring on Linux) to store and retrieve
//! the XMPP auth token.

use crate::error::{KeyringError, NotifierError};
use crate::types::{AuthToken, KEYRING_SERVICE_TOKEN};
use keyring::Entry;

fn entry(username: &str) -> Result<Entry, NotifierError> {
    Entry::new(KEYRING_SERVICE_TOKEN, username)
        .map_err(|_| NotifierError::Keyring(KeyringError::ServiceUnavailable))
}

/// Store an auth token in the system keyring
pub fn store_token(username: &str, token: &AuthToken) -> Result<(), NotifierError> {
    entry(username)?
        .set_password(token.expose())
        .map_err(|_| NotifierError::Keyring(KeyringError::StoreFailed))
}

/// Retrieve the auth token for `username`
///
/// Returns KeyringError::TokenNotFound if none is stored.
pub fn retrieve_token(username: &str) -> Result<AuthToken, NotifierError> {
    let token = entry(username)?
        .get_password()
        .map_err(|_| NotifierError::Keyring(KeyringError::TokenNotFound))?;

    Ok(AuthToken::new(token.trim().to_string()))
}

/// Check if an auth token exists in the keyring for the given username
pub fn has_token(username: &str) -> Result<bool, NotifierError> {
    Ok(entry(username)?.get_password().is_ok())
}

/// Delete the auth token from the keyring
pub fn delete_token(username: &str) -> Result<(), NotifierError> {
    match entry(username)?.delete_credential() {
        Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
        Err(_) => Err(NotifierError::Keyring(KeyringError::StoreFailed)),
    }
}
