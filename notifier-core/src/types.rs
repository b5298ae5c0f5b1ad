//! Type definitions and wrappers for secure data handling
//!
//! The auth token handed to the XMPP client is wrapped with the secrecy crate
//! so it never ends up in logs or debug output.

use secrecy::{ExposeSecret, Secret};

/// Keyring service name under which auth tokens are stored
pub const KEYRING_SERVICE_TOKEN: &str = "notifier-xmpp-token";

/// Wrapper for the XMPP auth token (cookie)
#[derive(Clone, Debug)]
pub struct AuthToken(Secret<String>);

impl AuthToken {
    /// Create a new token from its raw value
    pub fn new(token: String) -> Self {
        Self(Secret::new(token))
    }

    /// Expose the token value (use with caution!)
    ///
    /// Only the protocol client's pre-XMPP authentication step should need
    /// this.
    pub fn expose(&self) -> &str {
        self.0.expose_secret()
    }

    pub fn is_empty(&self) -> bool {
        self.expose().trim().is_empty()
    }
}

impl From<String> for AuthToken {
    fn from(token: String) -> Self {
        Self::new(token)
    }
}

/// User-level settings passed through to the protocol client
///
/// Everything in here is opaque to the login state machines except the
/// resource, which is cleared after a connection error so the server can
/// assign a fresh one.
#[derive(Clone, Debug)]
pub struct Credentials {
    /// Bare JID, e.g. `user@gmail.com`
    pub username: String,
    /// Auth cookie presented to the server
    pub token: AuthToken,
    /// Service the token was issued for
    pub token_service: String,
    /// Requested resource, if any
    pub resource: Option<String>,
}

impl Credentials {
    pub fn new(username: impl Into<String>, token: AuthToken) -> Self {
        Self {
            username: username.into(),
            token,
            token_service: String::new(),
            resource: None,
        }
    }

    /// Domain part of the username, used as the stream's `to` address
    pub fn domain(&self) -> Option<&str> {
        self.username
            .split_once('@')
            .map(|(_, domain)| domain)
            .filter(|domain| !domain.is_empty())
    }
}
