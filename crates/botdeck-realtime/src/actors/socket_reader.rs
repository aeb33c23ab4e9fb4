use futures::StreamExt;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use botdeck_wire::{CloseReason, Envelope};

use crate::connection::message::SocketEvent;
use crate::transport::{FrameStream, SocketFrame};

/// Drains one socket's inbound side, tagging everything with the generation
/// of the attempt that opened it so a stale socket cannot corrupt the
/// connection actor's state.
pub(crate) fn spawn_reader(
    stream: FrameStream,
    generation: u64,
    events: mpsc::Sender<SocketEvent>,
) {
    tokio::spawn(run_reader(stream, generation, events));
}

async fn run_reader(
    mut stream: FrameStream,
    generation: u64,
    events: mpsc::Sender<SocketEvent>,
) {
    let reason = loop {
        match stream.next().await {
            Some(Ok(SocketFrame::Text(raw))) => match Envelope::from_json(&raw) {
                Ok(envelope) => {
                    let event = SocketEvent::Inbound {
                        generation,
                        envelope,
                    };
                    if events.send(event).await.is_err() {
                        return;
                    }
                }
                // A malformed frame never takes the connection down.
                Err(err) => warn!(%err, "dropping malformed envelope"),
            },
            Some(Ok(SocketFrame::Close(reason))) => break reason,
            Some(Err(err)) => break CloseReason::abnormal(err.to_string()),
            None => break CloseReason::abnormal("stream ended"),
        }
    };

    debug!(%reason, "reader loop is shutting down");
    let _ = events.send(SocketEvent::Closed { generation, reason }).await;
}
