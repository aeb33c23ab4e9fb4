use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Emitted exactly once per completed switch of the active account.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AccountSwitchEvent {
    pub account_id: String,
    pub previous_account_id: Option<String>,
}

/// One managed messaging-bot account.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Account {
    pub id: String,
    pub label: String,
}

impl Account {
    pub fn new(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SwitchError {
    /// A hotkey (or caller) referenced a position with no account behind it.
    #[error("no account at position {requested} (have {available})")]
    OutOfRange { requested: usize, available: usize },
    #[error("unknown account id {0}")]
    UnknownAccount(String),
}

/// Process-wide channel broadcasting active-account changes to decoupled
/// consumers.
///
/// The bus only reports *future* switches: a consumer that mounts between
/// two switches must seed itself from [`AccountRoster::active`] first.
/// Delivery is in registration order; consumers that went away are pruned
/// on the next publish.
#[derive(Default)]
pub struct AccountSwitchBus {
    inner: Mutex<BusInner>,
}

#[derive(Default)]
struct BusInner {
    next_id: u64,
    subscribers: Vec<BusSubscriber>,
}

struct BusSubscriber {
    id: u64,
    sender: mpsc::UnboundedSender<AccountSwitchEvent>,
}

impl AccountSwitchBus {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Register a consumer; dropping the returned subscription removes it.
    pub fn subscribe(self: &Arc<Self>) -> BusSubscription {
        let (sender, receiver) = mpsc::unbounded_channel();
        let id = {
            let mut inner = self.lock();
            let id = inner.next_id;
            inner.next_id += 1;
            inner.subscribers.push(BusSubscriber { id, sender });
            id
        };

        BusSubscription {
            bus: Arc::downgrade(self),
            id,
            receiver,
        }
    }

    /// Deliver to every currently-registered subscriber, in registration
    /// order. Subscribers registered afterwards do not see this event.
    pub fn publish(&self, event: AccountSwitchEvent) {
        let mut inner = self.lock();
        debug!(
            account = %event.account_id,
            subscribers = inner.subscribers.len(),
            "publishing account switch"
        );
        inner
            .subscribers
            .retain(|subscriber| subscriber.sender.send(event.clone()).is_ok());
    }

    fn unsubscribe(&self, id: u64) {
        let mut inner = self.lock();
        inner.subscribers.retain(|subscriber| subscriber.id != id);
    }

    fn lock(&self) -> MutexGuard<'_, BusInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[cfg(test)]
    fn subscriber_count(&self) -> usize {
        self.lock().subscribers.len()
    }
}

/// Live bus registration; dropping it removes the consumer.
pub struct BusSubscription {
    bus: Weak<AccountSwitchBus>,
    id: u64,
    receiver: mpsc::UnboundedReceiver<AccountSwitchEvent>,
}

impl BusSubscription {
    pub async fn recv(&mut self) -> Option<AccountSwitchEvent> {
        self.receiver.recv().await
    }

    pub fn try_recv(&mut self) -> Option<AccountSwitchEvent> {
        self.receiver.try_recv().ok()
    }
}

impl Drop for BusSubscription {
    fn drop(&mut self) {
        if let Some(bus) = self.bus.upgrade() {
            bus.unsubscribe(self.id);
        }
    }
}

/// Owns the account list and the single mutation entry point that changes
/// the active account — UI buttons and hotkeys both land here.
pub struct AccountRoster {
    bus: Arc<AccountSwitchBus>,
    inner: Mutex<RosterInner>,
}

#[derive(Default)]
struct RosterInner {
    accounts: Vec<Account>,
    active: Option<String>,
}

impl AccountRoster {
    pub fn new(bus: Arc<AccountSwitchBus>) -> Self {
        Self {
            bus,
            inner: Mutex::new(RosterInner::default()),
        }
    }

    /// Replace the account list, keeping the active id when it survives.
    pub fn set_accounts(&self, accounts: Vec<Account>) {
        let mut inner = self.lock();
        if let Some(active) = &inner.active {
            if !accounts.iter().any(|account| &account.id == active) {
                warn!(%active, "active account disappeared from the roster");
                inner.active = None;
            }
        }
        inner.accounts = accounts;
    }

    pub fn accounts(&self) -> Vec<Account> {
        self.lock().accounts.clone()
    }

    /// The current active account; new consumers read this at mount time
    /// because the bus only reports future switches.
    pub fn active(&self) -> Option<Account> {
        let inner = self.lock();
        let active = inner.active.as_deref()?;
        inner.accounts.iter().find(|a| a.id == active).cloned()
    }

    /// Switch by account id.
    pub fn switch_to(&self, account_id: &str) -> Result<(), SwitchError> {
        let event = {
            let mut inner = self.lock();
            if !inner.accounts.iter().any(|a| a.id == account_id) {
                return Err(SwitchError::UnknownAccount(account_id.to_string()));
            }
            if inner.active.as_deref() == Some(account_id) {
                debug!(account = %account_id, "already active, nothing to switch");
                return Ok(());
            }
            let previous = inner.active.replace(account_id.to_string());
            AccountSwitchEvent {
                account_id: account_id.to_string(),
                previous_account_id: previous,
            }
        };

        info!(account = %event.account_id, "active account switched");
        self.bus.publish(event);
        Ok(())
    }

    /// Switch by 1-based position, as the digit hotkeys do. Returns the id
    /// of the account that is now active.
    pub fn switch_to_position(&self, position: usize) -> Result<String, SwitchError> {
        let account_id = {
            let inner = self.lock();
            if position == 0 || position > inner.accounts.len() {
                return Err(SwitchError::OutOfRange {
                    requested: position,
                    available: inner.accounts.len(),
                });
            }
            inner.accounts[position - 1].id.clone()
        };

        self.switch_to(&account_id)?;
        Ok(account_id)
    }

    fn lock(&self) -> MutexGuard<'_, RosterInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
