use std::fmt::{Display, Formatter};

/// Socket lifecycle as observed by UI widgets.
///
/// Owned exclusively by the connection actor; everyone else reads it through
/// the watch channel exposed on [`crate::connection::ConnectionHandle`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    /// No socket, no attempt in flight.
    Disconnected,
    /// An open attempt is in flight.
    Connecting,
    /// The socket is open and heartbeating.
    Connected,
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected)
    }
}

impl Display for ConnectionState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disconnected => write!(f, "DISCONNECTED"),
            Self::Connecting => write!(f, "CONNECTING"),
            Self::Connected => write!(f, "CONNECTED"),
        }
    }
}
