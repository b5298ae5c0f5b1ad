//! Login connection state

use serde::{Deserialize, Serialize};

/// Publicly observable state of a [`super::Login`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConnectionState {
    /// Not connected and nothing scheduled
    #[default]
    Closed,

    /// Not connected, an automatic retry is counting down
    Retrying,

    /// A login attempt is in progress
    Opening,

    /// Session established
    Opened,
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Opened)
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionState::Closed => write!(f, "closed"),
            ConnectionState::Retrying => write!(f, "retrying"),
            ConnectionState::Opening => write!(f, "opening"),
            ConnectionState::Opened => write!(f, "opened"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(format!("{}", ConnectionState::Closed), "closed");
        assert_eq!(format!("{}", ConnectionState::Retrying), "retrying");
        assert_eq!(format!("{}", ConnectionState::Opening), "opening");
        assert_eq!(format!("{}", ConnectionState::Opened), "opened");
    }

    #[test]
    fn test_default_is_closed() {
        assert_eq!(ConnectionState::default(), ConnectionState::Closed);
        assert!(!ConnectionState::default().is_connected());
        assert!(ConnectionState::Opened.is_connected());
    }
}
