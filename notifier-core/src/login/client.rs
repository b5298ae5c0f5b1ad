//! Protocol client vocabulary
//!
//! States, error codes and progress events reported by an XMPP client for a
//! single connection. The client itself runs elsewhere (see
//! [`crate::net::connector`]); the login state machines only see these values.

use std::fmt;

use super::AttemptId;

/// Connection state of one protocol client
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ClientState {
    #[default]
    None,
    Start,
    Opening,
    Open,
    Closed,
}

impl fmt::Display for ClientState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClientState::None => write!(f, "none"),
            ClientState::Start => write!(f, "start"),
            ClientState::Opening => write!(f, "opening"),
            ClientState::Open => write!(f, "open"),
            ClientState::Closed => write!(f, "closed"),
        }
    }
}

/// Error codes reported by the protocol engine when a client closes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum XmppErrorCode {
    /// Clean close
    #[default]
    None = 0,
    /// Malformed XML
    Xml = 1,
    /// Stream-level error, usually with a `<stream:error/>` element
    Stream = 2,
    /// Unsupported protocol version
    Version = 3,
    /// Credentials rejected
    Unauthorized = 4,
    /// TLS negotiation failed
    Tls = 5,
    /// Authentication mechanism failure
    Auth = 6,
    /// Resource binding failed
    Bind = 7,
    /// Peer closed the connection unexpectedly
    ConnectionClosed = 8,
    /// Peer closed the stream document
    DocumentClosed = 9,
    /// Socket-level failure, subcode carries the OS/DNS error
    Socket = 10,
    /// No response in time
    NetworkTimeout = 11,
    /// No username configured
    MissingUsername = 12,
}

impl XmppErrorCode {
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    /// Credential problems that no other transport can fix
    pub fn is_credential_error(self) -> bool {
        matches!(self, XmppErrorCode::Unauthorized | XmppErrorCode::MissingUsername)
    }

    /// Transport-class failures worth a connectivity diagnosis
    pub fn needs_diagnosis(self) -> bool {
        matches!(self, XmppErrorCode::ConnectionClosed | XmppErrorCode::Socket)
    }
}

impl fmt::Display for XmppErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            XmppErrorCode::None => "none",
            XmppErrorCode::Xml => "xml",
            XmppErrorCode::Stream => "stream",
            XmppErrorCode::Version => "version",
            XmppErrorCode::Unauthorized => "unauthorized",
            XmppErrorCode::Tls => "tls",
            XmppErrorCode::Auth => "auth",
            XmppErrorCode::Bind => "bind",
            XmppErrorCode::ConnectionClosed => "connection closed",
            XmppErrorCode::DocumentClosed => "document closed",
            XmppErrorCode::Socket => "socket",
            XmppErrorCode::NetworkTimeout => "network timeout",
            XmppErrorCode::MissingUsername => "missing username",
        };
        write!(f, "{}", name)
    }
}

/// Transport conditions the socket layer reports in a platform-neutral way
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportFault {
    /// The proxy answered 407
    ProxyAuthenticationRequired,
    /// The server certificate has expired
    CertificateExpired,
}

/// Why a client closed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientError {
    pub code: XmppErrorCode,
    pub subcode: i32,
    /// Raw `<stream:error>` element, only for [`XmppErrorCode::Stream`]
    pub stream_error: Option<String>,
    pub fault: Option<TransportFault>,
}

impl ClientError {
    /// A clean close
    pub fn none() -> Self {
        Self::default()
    }

    pub fn new(code: XmppErrorCode, subcode: i32) -> Self {
        Self {
            code,
            subcode,
            stream_error: None,
            fault: None,
        }
    }

    /// Socket failure with an OS or DNS error subcode
    pub fn socket(subcode: i32) -> Self {
        Self::new(XmppErrorCode::Socket, subcode)
    }

    /// Stream error carrying the raw element
    pub fn stream(element: impl Into<String>) -> Self {
        Self {
            code: XmppErrorCode::Stream,
            subcode: 0,
            stream_error: Some(element.into()),
            fault: None,
        }
    }

    pub fn with_fault(mut self, fault: TransportFault) -> Self {
        self.fault = Some(fault);
        self
    }

    pub fn is_error(&self) -> bool {
        self.code != XmppErrorCode::None
    }
}

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.code, self.subcode)?;
        if let Some(fault) = self.fault {
            write!(f, " [{:?}]", fault)?;
        }
        Ok(())
    }
}

/// Identity of one protocol client instance
///
/// Sequence numbers are unique within an attempt, attempt ids are unique
/// within a login, so a late event from a destroyed client never matches the
/// live one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClientId {
    pub attempt: AttemptId,
    pub seq: u32,
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.attempt, self.seq)
    }
}

/// Progress reported by a running client
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    /// Transport is up, stream negotiation in progress
    Opening,
    /// Session established
    Open,
    /// Client is gone
    Closed(ClientError),
}
