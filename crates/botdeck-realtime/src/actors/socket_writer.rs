use futures::SinkExt;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use botdeck_wire::Envelope;

use crate::transport::FrameSink;

#[derive(Debug)]
pub(crate) enum WriterMessage {
    SendEnvelope(Envelope),
    Close,
}

#[derive(Clone, Debug)]
pub(crate) struct WriterRef {
    sender: mpsc::Sender<WriterMessage>,
}

impl WriterRef {
    pub(crate) fn new(sink: FrameSink) -> Self {
        let (sender, mailbox) = mpsc::channel(10);
        let actor = WriterActor { sink, mailbox };
        tokio::spawn(run_writer(actor));

        Self { sender }
    }

    pub(crate) async fn send_envelope(&self, envelope: Envelope) {
        if self
            .sender
            .send(WriterMessage::SendEnvelope(envelope))
            .await
            .is_err()
        {
            warn!("writer is gone, dropping outbound envelope");
        }
    }

    /// Ask the peer for a clean close and stop the writer.
    pub(crate) async fn close(&self) {
        let _ = self.sender.send(WriterMessage::Close).await;
    }
}

struct WriterActor {
    sink: FrameSink,
    mailbox: mpsc::Receiver<WriterMessage>,
}

impl WriterActor {
    /// Returns `false` once the sink is finished.
    async fn handle(&mut self, message: WriterMessage) -> bool {
        match message {
            WriterMessage::SendEnvelope(envelope) => {
                if let Err(err) = self.sink.send(envelope.to_json()).await {
                    warn!(%err, "failed to write frame");
                    return false;
                }
                debug!(kind = %envelope.kind, "sent envelope");
                true
            }
            WriterMessage::Close => {
                if let Err(err) = self.sink.close().await {
                    debug!(%err, "error while closing sink");
                }
                false
            }
        }
    }
}

async fn run_writer(mut actor: WriterActor) {
    while let Some(msg) = actor.mailbox.recv().await {
        if !actor.handle(msg).await {
            break;
        }
    }

    debug!("writer loop is shutting down");
}
