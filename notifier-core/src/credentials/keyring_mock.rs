//! Mock keyring implementation for testing
//!
//! Provides an in-memory keyring implementation that doesn't require
//! system keyring access. Used in CI environments and for testing.

use crate::error::{KeyringError, NotifierError};
use crate::types::{AuthToken, KEYRING_SERVICE_TOKEN};
use std::collections::HashMap;
use std::sync::Mutex;

lazy_static::lazy_static! {
    static ref MOCK_KEYRING: Mutex<HashMap<String, String>> = Mutex::new(HashMap::new());
}

/// Generate a key for the mock keyring
fn make_key(username: &str) -> String {
    format!("{}:{}", KEYRING_SERVICE_TOKEN, username)
}

/// Store an auth token in the mock keyring
pub fn store_token(username: &str, token: &AuthToken) -> Result<(), NotifierError> {
    let mut keyring = MOCK_KEYRING
        .lock()
        .map_err(|_| NotifierError::Keyring(KeyringError::StoreFailed))?;
    keyring.insert(make_key(username), token.expose().to_string());
    Ok(())
}

/// Retrieve an auth token from the mock keyring
pub fn retrieve_token(username: &str) -> Result<AuthToken, NotifierError> {
    let keyring = MOCK_KEYRING
        .lock()
        .map_err(|_| NotifierError::Keyring(KeyringError::ServiceUnavailable))?;
    keyring
        .get(&make_key(username))
        .map(|token| AuthToken::new(token.trim().to_string()))
        .ok_or(NotifierError::Keyring(KeyringError::TokenNotFound))
}

/// Check if an auth token exists in the mock keyring for the given username
pub fn has_token(username: &str) -> Result<bool, NotifierError> {
    let keyring = MOCK_KEYRING
        .lock()
        .map_err(|_| NotifierError::Keyring(KeyringError::ServiceUnavailable))?;
    Ok(keyring.contains_key(&make_key(username)))
}

/// Delete an auth token from the mock keyring
pub fn delete_token(username: &str) -> Result<(), NotifierError> {
    let mut keyring = MOCK_KEYRING
        .lock()
        .map_err(|_| NotifierError::Keyring(KeyringError::StoreFailed))?;
    keyring.remove(&make_key(username));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_token_operations() {
        let username = "test_user_token_mock@example.com";

        // Clean up first
        let _ = delete_token(username);
        assert!(!has_token(username).expect("Failed to check token"));

        store_token(username, &AuthToken::new("cookie-value".into())).expect("Failed to store token");
        assert!(has_token(username).expect("Failed to check token"));

        let retrieved = retrieve_token(username).expect("Failed to retrieve token");
        assert_eq!(retrieved.expose(), "cookie-value");

        delete_token(username).expect("Failed to delete token");
        assert!(matches!(
            retrieve_token(username),
            Err(NotifierError::Keyring(KeyringError::TokenNotFound))
        ));
    }
}
