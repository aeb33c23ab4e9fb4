use std::fmt::{Display, Formatter};

use serde::Deserialize;

/// Handshake progression for one login attempt.
///
/// Valid forward paths go `Uninitialized → NeedQr → Connecting → Online`;
/// any state may drop to `Offline` on timeout or explicit failure. The
/// controller owns the transitions; the backend only reports its view.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LoginState {
    Uninitialized,
    NeedQr,
    Connecting,
    Online,
    Offline,
}

impl LoginState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, LoginState::Online | LoginState::Offline)
    }
}

impl Display for LoginState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Uninitialized => write!(f, "UNINITIALIZED"),
            Self::NeedQr => write!(f, "NEED_QR"),
            Self::Connecting => write!(f, "CONNECTING"),
            Self::Online => write!(f, "ONLINE"),
            Self::Offline => write!(f, "OFFLINE"),
        }
    }
}
