use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, Weak};

use tokio::sync::mpsc;
use tracing::{debug, warn};

use botdeck_wire::{Envelope, EventKind};

/// Ordered multi-subscriber registry keyed by message type.
///
/// Replaces a single callback bag per connection: independent widgets
/// register and unregister without clobbering each other. `dispatch` runs
/// inside the socket read path and therefore never panics; subscribers that
/// went away are pruned on the next delivery.
#[derive(Default)]
pub struct MessageRouter {
    inner: Mutex<RouterInner>,
}

#[derive(Default)]
struct RouterInner {
    next_id: u64,
    handlers: HashMap<EventKind, Vec<RegisteredHandler>>,
}

struct RegisteredHandler {
    id: u64,
    sender: mpsc::UnboundedSender<Envelope>,
}

impl MessageRouter {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Register interest in one message type. Registration order is delivery
    /// order; dropping the returned subscription removes the handler.
    pub fn subscribe(self: &Arc<Self>, kind: EventKind) -> Subscription {
        let (sender, receiver) = mpsc::unbounded_channel();
        let id = {
            let mut inner = self.lock();
            let id = inner.next_id;
            inner.next_id += 1;
            inner
                .handlers
                .entry(kind)
                .or_default()
                .push(RegisteredHandler { id, sender });
            id
        };

        Subscription {
            router: Arc::downgrade(self),
            kind,
            id,
            receiver,
        }
    }

    /// Fan an inbound envelope out to every subscriber of its type.
    pub fn dispatch(&self, envelope: &Envelope) {
        let Some(kind) = envelope.event_kind() else {
            warn!(kind = %envelope.kind, "ignoring message of unrecognized type");
            return;
        };

        let mut inner = self.lock();
        let Some(handlers) = inner.handlers.get_mut(&kind) else {
            debug!(%kind, "no subscribers for message");
            return;
        };
        handlers.retain(|handler| handler.sender.send(envelope.clone()).is_ok());
    }

    fn unsubscribe(&self, kind: EventKind, id: u64) {
        let mut inner = self.lock();
        if let Some(handlers) = inner.handlers.get_mut(&kind) {
            handlers.retain(|handler| handler.id != id);
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, RouterInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[cfg(test)]
    fn handler_count(&self, kind: EventKind) -> usize {
        self.lock().handlers.get(&kind).map_or(0, Vec::len)
    }
}

/// Live registration; dropping it removes the handler from the registry.
pub struct Subscription {
    router: Weak<MessageRouter>,
    kind: EventKind,
    id: u64,
    receiver: mpsc::UnboundedReceiver<Envelope>,
}

impl Subscription {
    pub fn kind(&self) -> EventKind {
        self.kind
    }

    pub async fn recv(&mut self) -> Option<Envelope> {
        self.receiver.recv().await
    }

    pub fn try_recv(&mut self) -> Option<Envelope> {
        self.receiver.try_recv().ok()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(router) = self.router.upgrade() {
            router.unsubscribe(self.kind, self.id);
        }
    }
}
