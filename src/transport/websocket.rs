//! WebSocket transport for the remote auth gateway
//!
//! Connects over TLS and exchanges JSON text frames. Control messages
//! (ping/pong) are handled below this layer; close frames surface as a
//! clean end of stream.

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};

use super::{Connection, FrameSink, FrameStream, TransportError, TransportResult};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Connect to a gateway URL (`wss://...`) and split the connection
pub async fn connect(url: &str) -> TransportResult<Connection> {
    let (ws, _) = connect_async(url)
        .await
        .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;
    let (write, read) = ws.split();

    Ok(Connection {
        sink: Box::new(WsFrameSink { write }),
        stream: Box::new(WsFrameStream { read }),
    })
}

struct WsFrameSink {
    write: SplitSink<WsStream, Message>,
}

#[async_trait]
impl FrameSink for WsFrameSink {
    async fn send(&mut self, frame: String) -> TransportResult<()> {
        self.write
            .send(Message::Text(frame))
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))
    }

    async fn close(&mut self) -> TransportResult<()> {
        self.write
            .close()
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))
    }
}

struct WsFrameStream {
    read: SplitStream<WsStream>,
}

#[async_trait]
impl FrameStream for WsFrameStream {
    async fn next_frame(&mut self) -> TransportResult<Option<String>> {
        while let Some(message) = self.read.next().await {
            match message {
                Ok(Message::Text(text)) => return Ok(Some(text)),
                Ok(Message::Binary(bytes)) => {
                    return String::from_utf8(bytes)
                        .map(Some)
                        .map_err(|_| {
                            TransportError::InvalidData("non-UTF-8 binary frame".to_string())
                        })
                }
                Ok(Message::Close(_)) => return Ok(None),
                // Ping/pong are answered by the websocket library
                Ok(_) => continue,
                Err(e) => return Err(TransportError::ReceiveFailed(e.to_string())),
            }
        }
        Ok(None)
    }
}
