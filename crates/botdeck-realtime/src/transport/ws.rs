use async_trait::async_trait;
use futures::{future, SinkExt, StreamExt};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::protocol::Message;
use tracing::debug;

use botdeck_wire::CloseReason;

use crate::transport::{Connector, Socket, SocketFrame, TransportError};

/// Production connector over `tokio-tungstenite`.
#[derive(Clone, Copy, Debug, Default)]
pub struct WebSocketConnector;

#[async_trait]
impl Connector for WebSocketConnector {
    async fn connect(&self, endpoint: &str) -> Result<Socket, TransportError> {
        let (ws, response) = connect_async(endpoint)
            .await
            .map_err(|err| TransportError::Connect(err.to_string()))?;
        debug!(status = %response.status(), "websocket established");

        let (sink, stream) = ws.split();
        let sink = sink
            .sink_map_err(|err| TransportError::Socket(err.to_string()))
            .with(|text: String| future::ready(Ok(Message::Text(text))));
        let stream = stream.filter_map(|item| {
            future::ready(match item {
                Ok(Message::Text(text)) => Some(Ok(SocketFrame::Text(text))),
                Ok(Message::Close(frame)) => {
                    let reason = match frame {
                        Some(frame) => {
                            CloseReason::new(Some(u16::from(frame.code)), frame.reason.to_string())
                        }
                        None => CloseReason::abnormal("close without a frame"),
                    };
                    Some(Ok(SocketFrame::Close(reason)))
                }
                // Protocol-level pings are answered by tungstenite itself;
                // binary frames are not part of the envelope protocol.
                Ok(_) => None,
                Err(err) => Some(Err(TransportError::Socket(err.to_string()))),
            })
        });

        Ok(Socket {
            sink: Box::pin(sink),
            stream: Box::pin(stream),
        })
    }
}
