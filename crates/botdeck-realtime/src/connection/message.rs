use botdeck_wire::{CloseReason, Envelope};

use crate::actors::socket_writer::WriterRef;
use crate::transport::TransportError;

/// Caller-facing commands accepted by the connection actor.
#[derive(Debug)]
pub(crate) enum ConnectionCommand {
    Connect,
    Disconnect,
    Send(Envelope),
}

/// Reports from the socket tasks of one particular connection attempt.
///
/// The generation lets the actor ignore events from sockets it has already
/// abandoned (a late open racing a `disconnect`, a close from a replaced
/// socket).
#[derive(Debug)]
pub(crate) enum SocketEvent {
    Opened {
        generation: u64,
        writer: WriterRef,
    },
    OpenFailed {
        generation: u64,
        error: TransportError,
    },
    Inbound {
        generation: u64,
        envelope: Envelope,
    },
    Closed {
        generation: u64,
        reason: CloseReason,
    },
}
