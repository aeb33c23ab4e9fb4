mod ws;

use std::pin::Pin;

use async_trait::async_trait;
use futures::{Sink, Stream};
use thiserror::Error;

use botdeck_wire::CloseReason;

pub use ws::WebSocketConnector;

pub type FrameSink = Pin<Box<dyn Sink<String, Error = TransportError> + Send>>;
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<SocketFrame, TransportError>> + Send>>;

/// One established socket, split for the reader and writer actors.
pub struct Socket {
    pub sink: FrameSink,
    pub stream: FrameStream,
}

#[derive(Clone, Debug)]
pub enum SocketFrame {
    Text(String),
    Close(CloseReason),
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("connection failed: {0}")]
    Connect(String),
    #[error("socket failure: {0}")]
    Socket(String),
}

/// Seam between the connection manager and the actual wire, so tests can
/// drive the manager with channel-backed sockets.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    async fn connect(&self, endpoint: &str) -> Result<Socket, TransportError>;
}
