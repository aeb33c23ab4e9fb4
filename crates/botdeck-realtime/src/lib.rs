mod actors;
pub mod accounts;
pub mod backoff;
pub mod config;
pub mod connection;
pub mod hotkeys;
pub mod login;
pub mod router;
pub mod transport;

pub use accounts::{Account, AccountRoster, AccountSwitchBus, AccountSwitchEvent};
pub use connection::{ConnectionEvent, ConnectionHandle, ConnectionState};
pub use hotkeys::{HotkeyDispatcher, HotkeyIntent, HotkeyOutcome};
pub use login::{LoginController, LoginEvent, LoginState};
pub use router::MessageRouter;
