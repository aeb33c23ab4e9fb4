pub(crate) mod message;
mod state;

use std::pin::Pin;
use std::sync::Arc;

use tokio::select;
use tokio::sync::{mpsc, watch};
use tokio::time::{sleep, Instant, Sleep};
use tracing::{debug, error, warn};

use botdeck_wire::{Envelope, EventKind};

use crate::actors::socket_reader::spawn_reader;
use crate::actors::socket_writer::WriterRef;
use crate::backoff::Backoff;
use crate::config::RealtimeConfig;
use crate::router::MessageRouter;
use crate::transport::Connector;

use message::{ConnectionCommand, SocketEvent};
pub use state::ConnectionState;

/// Lifecycle notices for the owning view.
///
/// Transient failures stay inside the actor; only state changes and the
/// terminal exhaustion of the retry budget surface here.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConnectionEvent {
    Open,
    Closed { reason: String },
    /// Retry budget spent; a manual `connect` is required.
    ReconnectExhausted,
}

/// Cloneable handle to one connection actor.
///
/// The actor is constructed explicitly and passed down to whoever needs it;
/// there is deliberately no process-global instance, so tests (and a second
/// dashboard window, should one ever exist) get isolated managers.
#[derive(Clone)]
pub struct ConnectionHandle {
    sender: mpsc::Sender<ConnectionCommand>,
    state: watch::Receiver<ConnectionState>,
}

impl ConnectionHandle {
    pub fn new(
        config: RealtimeConfig,
        connector: Arc<dyn Connector>,
        router: Arc<MessageRouter>,
        events: mpsc::UnboundedSender<ConnectionEvent>,
    ) -> Self {
        let (sender, mailbox) = mpsc::channel(10);
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);
        let actor = Connection::new(mailbox, config, connector, router, events, state_tx);
        tokio::spawn(run_connection(actor));

        Self {
            sender,
            state: state_rx,
        }
    }

    /// Idempotent: collapses into an in-flight attempt or an open socket.
    pub async fn connect(&self) {
        self.command(ConnectionCommand::Connect).await;
    }

    /// Clean close; suppresses automatic reconnection until the next
    /// [`connect`](Self::connect).
    pub async fn disconnect(&self) {
        self.command(ConnectionCommand::Disconnect).await;
    }

    /// Best-effort send: dropped with a logged warning when the socket is
    /// not open. Callers must not assume delivery.
    pub async fn send(&self, envelope: Envelope) {
        self.command(ConnectionCommand::Send(envelope)).await;
    }

    pub fn is_connected(&self) -> bool {
        self.state.borrow().is_connected()
    }

    /// Live view of the socket state for UI widgets.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    async fn command(&self, command: ConnectionCommand) {
        if self.sender.send(command).await.is_err() {
            warn!("connection actor is gone, dropping command");
        }
    }
}

struct Connection {
    mailbox: mpsc::Receiver<ConnectionCommand>,
    config: RealtimeConfig,
    connector: Arc<dyn Connector>,
    router: Arc<MessageRouter>,
    events: mpsc::UnboundedSender<ConnectionEvent>,
    state: watch::Sender<ConnectionState>,
    socket_events: mpsc::Receiver<SocketEvent>,
    socket_events_tx: mpsc::Sender<SocketEvent>,
    /// Bumped for every new attempt and every deliberate teardown; socket
    /// events carrying an older generation are ignored.
    generation: u64,
    writer: Option<WriterRef>,
    backoff: Backoff,
    heartbeat_timer: Pin<Box<Sleep>>,
    retry_timer: Pin<Box<Sleep>>,
    pong_timer: Pin<Box<Sleep>>,
    retry_armed: bool,
    pong_armed: bool,
}

impl Connection {
    fn new(
        mailbox: mpsc::Receiver<ConnectionCommand>,
        config: RealtimeConfig,
        connector: Arc<dyn Connector>,
        router: Arc<MessageRouter>,
        events: mpsc::UnboundedSender<ConnectionEvent>,
        state: watch::Sender<ConnectionState>,
    ) -> Self {
        let (socket_events_tx, socket_events) = mpsc::channel(64);
        let backoff = Backoff::new(config.reconnect.policy());
        let heartbeat_timer = sleep(config.heartbeat());
        Self {
            mailbox,
            config,
            connector,
            router,
            events,
            state,
            socket_events,
            socket_events_tx,
            generation: 0,
            writer: None,
            backoff,
            heartbeat_timer: Box::pin(heartbeat_timer),
            retry_timer: Box::pin(sleep(std::time::Duration::ZERO)),
            pong_timer: Box::pin(sleep(std::time::Duration::ZERO)),
            retry_armed: false,
            pong_armed: false,
        }
    }

    fn current_state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    fn set_state(&mut self, next: ConnectionState) {
        if self.current_state() != next {
            debug!(%next, "connection state changed");
            let _ = self.state.send(next);
        }
    }

    fn notify(&self, event: ConnectionEvent) {
        let _ = self.events.send(event);
    }

    async fn handle_command(&mut self, command: ConnectionCommand) {
        match command {
            ConnectionCommand::Connect => self.on_connect_requested(),
            ConnectionCommand::Disconnect => self.on_disconnect_requested().await,
            ConnectionCommand::Send(envelope) => self.on_send(envelope).await,
        }
    }

    fn on_connect_requested(&mut self) {
        match self.current_state() {
            ConnectionState::Connecting | ConnectionState::Connected => {
                debug!("connect requested but a socket is already up or in flight");
            }
            ConnectionState::Disconnected => {
                // A manual connect outranks a scheduled retry.
                self.retry_armed = false;
                self.begin_attempt();
            }
        }
    }

    fn begin_attempt(&mut self) {
        self.generation += 1;
        let generation = self.generation;
        self.set_state(ConnectionState::Connecting);

        let connector = Arc::clone(&self.connector);
        let endpoint = self.config.endpoint.clone();
        let events = self.socket_events_tx.clone();
        tokio::spawn(async move {
            match connector.connect(&endpoint).await {
                Ok(socket) => {
                    let writer = WriterRef::new(socket.sink);
                    spawn_reader(socket.stream, generation, events.clone());
                    let _ = events.send(SocketEvent::Opened { generation, writer }).await;
                }
                Err(error) => {
                    let _ = events.send(SocketEvent::OpenFailed { generation, error }).await;
                }
            }
        });
    }

    async fn on_socket_event(&mut self, event: SocketEvent) {
        match event {
            SocketEvent::Opened { generation, writer } => {
                if generation != self.generation {
                    debug!("closing socket from a stale attempt");
                    writer.close().await;
                    return;
                }
                self.writer = Some(writer);
                self.backoff.reset();
                self.pong_armed = false;
                self.arm_heartbeat();
                self.set_state(ConnectionState::Connected);
                self.notify(ConnectionEvent::Open);
            }
            SocketEvent::OpenFailed { generation, error } => {
                if generation != self.generation {
                    return;
                }
                warn!(%error, "connection attempt failed");
                self.on_lost();
            }
            SocketEvent::Inbound {
                generation,
                envelope,
            } => {
                if generation != self.generation {
                    return;
                }
                if envelope.event_kind() == Some(EventKind::Pong) {
                    self.pong_armed = false;
                }
                self.router.dispatch(&envelope);
            }
            SocketEvent::Closed { generation, reason } => {
                if generation != self.generation {
                    debug!(%reason, "ignoring close from a stale socket");
                    return;
                }
                self.writer = None;
                self.pong_armed = false;
                self.notify(ConnectionEvent::Closed {
                    reason: reason.to_string(),
                });
                if reason.is_clean() {
                    debug!(%reason, "socket closed cleanly");
                    self.set_state(ConnectionState::Disconnected);
                } else {
                    warn!(%reason, "socket lost");
                    self.on_lost();
                }
            }
        }
    }

    /// Abnormal loss of the socket (or a failed attempt): schedule the next
    /// retry, or give up once the budget is spent.
    fn on_lost(&mut self) {
        self.writer = None;
        self.pong_armed = false;
        self.set_state(ConnectionState::Disconnected);

        if self.backoff.is_exhausted() {
            error!(
                attempts = self.backoff.attempt(),
                "reconnect budget exhausted, waiting for a manual connect"
            );
            self.notify(ConnectionEvent::ReconnectExhausted);
            // The next manual connect starts a fresh cycle.
            self.backoff.reset();
            return;
        }

        let delay = self.backoff.next_delay();
        debug!(
            delay_ms = delay.as_millis() as u64,
            attempt = self.backoff.attempt(),
            "scheduling reconnect"
        );
        self.retry_timer.as_mut().reset(Instant::now() + delay);
        self.retry_armed = true;
    }

    async fn on_disconnect_requested(&mut self) {
        let was_active = self.writer.is_some()
            || self.retry_armed
            || self.current_state() != ConnectionState::Disconnected;

        // Invalidate the current socket and any in-flight attempt; their
        // eventual close events will arrive with a stale generation.
        self.generation += 1;
        self.retry_armed = false;
        self.pong_armed = false;
        if let Some(writer) = self.writer.take() {
            writer.close().await;
        }
        self.set_state(ConnectionState::Disconnected);
        if was_active {
            self.notify(ConnectionEvent::Closed {
                reason: "disconnect requested".to_string(),
            });
        }
    }

    async fn on_send(&mut self, envelope: Envelope) {
        match self.writer {
            Some(ref writer) => writer.send_envelope(envelope).await,
            // Callers must not assume delivery.
            None => warn!(kind = %envelope.kind, "socket not open, dropping envelope"),
        }
    }

    async fn on_heartbeat(&mut self) {
        if let Some(ref writer) = self.writer {
            writer.send_envelope(Envelope::ping()).await;
            // The deadline tracks the oldest unanswered ping; re-arming it
            // on every ping would let a dead peer slide forever.
            if let Some(timeout) = self.config.pong_deadline() {
                if !self.pong_armed {
                    self.pong_timer.as_mut().reset(Instant::now() + timeout);
                    self.pong_armed = true;
                }
            }
        }
        self.arm_heartbeat();
    }

    fn arm_heartbeat(&mut self) {
        let deadline = Instant::now() + self.config.heartbeat();
        self.heartbeat_timer.as_mut().reset(deadline);
    }

    /// The peer stopped answering pings: a half-open socket is treated the
    /// same as an abnormal close.
    async fn on_pong_timeout(&mut self) {
        warn!("no pong within the deadline, treating the socket as dead");
        self.pong_armed = false;
        self.generation += 1;
        if let Some(writer) = self.writer.take() {
            writer.close().await;
        }
        self.notify(ConnectionEvent::Closed {
            reason: "pong timeout".to_string(),
        });
        self.on_lost();
    }
}

async fn run_connection(mut actor: Connection) {
    loop {
        let next_command = actor.mailbox.recv();
        let next_socket_event = actor.socket_events.recv();

        select! {
            command = next_command => {
                match command {
                    Some(command) => actor.handle_command(command).await,
                    None => break,
                }
            }
            event = next_socket_event => {
                match event {
                    Some(event) => actor.on_socket_event(event).await,
                    // Unreachable while the actor holds its own sender.
                    None => break,
                }
            }
            () = &mut actor.heartbeat_timer.as_mut(), if actor.writer.is_some() => {
                actor.on_heartbeat().await;
            }
            () = &mut actor.retry_timer.as_mut(), if actor.retry_armed => {
                actor.retry_armed = false;
                actor.begin_attempt();
            }
            () = &mut actor.pong_timer.as_mut(), if actor.pong_armed => {
                actor.on_pong_timeout().await;
            }
        }
    }

    debug!("connection actor is shutting down");
}
