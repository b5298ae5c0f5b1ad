//! Terminal login failures surfaced to the mediator

use thiserror::Error;

use super::client::XmppErrorCode;

/// Subcode used when the connectivity probe also failed
///
/// Marks "this machine cannot reach the internet, or a local firewall blocks
/// the client". Outside every OS and network error range.
pub const NO_CONNECTIVITY_SUBCODE: i32 = i32::MIN;

/// Why a login gave up
///
/// Signalled once per terminal failure. The login machinery never retries a
/// failure by itself.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LoginFailure {
    #[error("Proxy authentication required")]
    ProxyAuthenticationRequired,

    #[error("Server certificate expired")]
    CertificateExpired,

    #[error("XMPP error: {code} (subcode {subcode})")]
    ProtocolError { code: XmppErrorCode, subcode: i32 },
}

impl LoginFailure {
    pub fn protocol(code: XmppErrorCode, subcode: i32) -> Self {
        LoginFailure::ProtocolError { code, subcode }
    }

    /// Diagnosis when even plain HTTP could not get through
    pub fn no_connectivity() -> Self {
        LoginFailure::ProtocolError {
            code: XmppErrorCode::Socket,
            subcode: NO_CONNECTIVITY_SUBCODE,
        }
    }

    pub fn is_no_connectivity(&self) -> bool {
        *self == LoginFailure::no_connectivity()
    }

    /// Bad credentials; the user has to act
    pub fn is_credential_error(&self) -> bool {
        matches!(self, LoginFailure::ProtocolError { code, .. } if code.is_credential_error())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_display() {
        assert_eq!(
            LoginFailure::ProxyAuthenticationRequired.to_string(),
            "Proxy authentication required"
        );
        assert_eq!(
            LoginFailure::protocol(XmppErrorCode::Socket, -105).to_string(),
            "XMPP error: socket (subcode -105)"
        );
    }

    #[test]
    fn test_credential_failures() {
        assert!(LoginFailure::protocol(XmppErrorCode::Unauthorized, 0).is_credential_error());
        assert!(!LoginFailure::no_connectivity().is_credential_error());
        assert!(!LoginFailure::CertificateExpired.is_credential_error());
    }

    #[test]
    fn test_no_connectivity_is_distinct() {
        let failure = LoginFailure::no_connectivity();
        assert!(failure.is_no_connectivity());
        assert_ne!(failure, LoginFailure::protocol(XmppErrorCode::Socket, 0));
        assert!(!LoginFailure::protocol(XmppErrorCode::Socket, 0).is_no_connectivity());
        assert!(!LoginFailure::protocol(XmppErrorCode::Socket, -111).is_no_connectivity());
    }
}
