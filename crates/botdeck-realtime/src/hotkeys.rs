use std::sync::Arc;

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use tracing::{debug, warn};

use crate::accounts::{AccountRoster, SwitchError};

/// What a chord asks the dashboard to do.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HotkeyIntent {
    /// 1-based position in the roster.
    SelectAccount(usize),
    OpenAccountManager,
    ForceRefresh,
}

/// Result of feeding one key event through the dispatcher.
#[derive(Debug, PartialEq, Eq)]
pub enum HotkeyOutcome {
    /// The roster switched; carries the id that is now active.
    Switched(String),
    OpenAccountManager,
    ForceRefresh,
    /// Surfaced to the user as a lightweight warning, never fatal.
    Rejected(SwitchError),
}

/// Translates keyboard chords into intents and feeds account selections
/// into the roster's mutation entry point — the same one UI buttons call.
pub struct HotkeyDispatcher {
    roster: Arc<AccountRoster>,
}

impl HotkeyDispatcher {
    pub fn new(roster: Arc<AccountRoster>) -> Self {
        Self { roster }
    }

    /// Match a chord against the fixed table.
    ///
    /// Combination chords are checked before plain single-modifier chords:
    /// they share the digit base keys, and with containment matching
    /// `Alt+0` would otherwise shadow `Alt+Shift+0`.
    pub fn intent_for(key: &KeyEvent) -> Option<HotkeyIntent> {
        let KeyCode::Char(c) = key.code else {
            return None;
        };

        if key.modifiers.contains(KeyModifiers::ALT | KeyModifiers::SHIFT) && c == '0' {
            return Some(HotkeyIntent::ForceRefresh);
        }
        if key.modifiers.contains(KeyModifiers::ALT) {
            if c == '0' {
                return Some(HotkeyIntent::OpenAccountManager);
            }
            if let Some(digit) = c.to_digit(10) {
                return Some(HotkeyIntent::SelectAccount(digit as usize));
            }
        }
        None
    }

    /// Feed one key event through; `None` means the chord is unbound and
    /// the keystroke belongs to whoever else is listening.
    pub fn handle(&self, key: &KeyEvent) -> Option<HotkeyOutcome> {
        let intent = Self::intent_for(key)?;
        debug!(?intent, "hotkey chord matched");

        Some(match intent {
            HotkeyIntent::SelectAccount(position) => {
                match self.roster.switch_to_position(position) {
                    Ok(account_id) => HotkeyOutcome::Switched(account_id),
                    Err(err) => {
                        warn!(%err, "hotkey account selection rejected");
                        HotkeyOutcome::Rejected(err)
                    }
                }
            }
            HotkeyIntent::OpenAccountManager => HotkeyOutcome::OpenAccountManager,
            HotkeyIntent::ForceRefresh => HotkeyOutcome::ForceRefresh,
        })
    }
}
