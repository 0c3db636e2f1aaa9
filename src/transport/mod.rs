//! Transport layer abstraction
//!
//! This module moves JSON text frames between the client and the remote
//! gateway. Two implementations are provided:
//! - WebSocket over TLS (the production transport)
//! - In-memory channels (for testing the protocol without a network)
//!
//! # Design
//!
//! A connection is split into a send half and a receive half. The
//! dispatch loop owns the receive half exclusively; the send half is
//! shared behind an async mutex because both the dispatch loop (protocol
//! replies) and the liveness monitor (heartbeats) write to it.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::Mutex;

pub mod websocket;

/// Transport errors
#[derive(Error, Debug)]
pub enum TransportError {
    /// Connection failed
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// Connection closed
    #[error("connection closed")]
    Disconnected,

    /// Send failed
    #[error("failed to send: {0}")]
    SendFailed(String),

    /// Receive failed
    #[error("failed to receive: {0}")]
    ReceiveFailed(String),

    /// Invalid data on the wire
    #[error("invalid data: {0}")]
    InvalidData(String),
}

/// Result type for transport operations
pub type TransportResult<T> = Result<T, TransportError>;

/// The send half of a connection
#[async_trait]
pub trait FrameSink: Send {
    /// Send one text frame to the peer
    async fn send(&mut self, frame: String) -> TransportResult<()>;

    /// Close the connection
    ///
    /// Safe to call on an already-closed connection.
    async fn close(&mut self) -> TransportResult<()>;
}

/// The receive half of a connection
#[async_trait]
pub trait FrameStream: Send {
    /// Receive the next text frame
    ///
    /// Returns `Ok(None)` when the peer closed the connection cleanly.
    async fn next_frame(&mut self) -> TransportResult<Option<String>>;
}

/// An established frame connection, split into its two halves
pub struct Connection {
    /// Send half
    pub sink: Box<dyn FrameSink>,
    /// Receive half
    pub stream: Box<dyn FrameStream>,
}

/// A send half shared between the dispatch loop and the liveness
/// monitor; the mutex serializes every write path to the transport.
pub type SharedSink = Arc<Mutex<Box<dyn FrameSink>>>;

/// In-memory transport for testing
///
/// Uses channels to simulate a connection between two endpoints.
pub mod memory {
    use super::*;
    use tokio::sync::mpsc;

    /// Create a pair of connected in-memory endpoints
    pub fn create_pair() -> (Connection, Connection) {
        let (tx1, rx1) = mpsc::channel(100);
        let (tx2, rx2) = mpsc::channel(100);

        let a = Connection {
            sink: Box::new(ChannelSink { tx: Some(tx1) }),
            stream: Box::new(ChannelStream { rx: rx2 }),
        };
        let b = Connection {
            sink: Box::new(ChannelSink { tx: Some(tx2) }),
            stream: Box::new(ChannelStream { rx: rx1 }),
        };

        (a, b)
    }

    /// Send half backed by a channel
    pub struct ChannelSink {
        tx: Option<mpsc::Sender<String>>,
    }

    /// Receive half backed by a channel
    pub struct ChannelStream {
        rx: mpsc::Receiver<String>,
    }

    #[async_trait]
    impl FrameSink for ChannelSink {
        async fn send(&mut self, frame: String) -> TransportResult<()> {
            let tx = self.tx.as_ref().ok_or(TransportError::Disconnected)?;
            tx.send(frame)
                .await
                .map_err(|_| TransportError::SendFailed("channel closed".to_string()))
        }

        async fn close(&mut self) -> TransportResult<()> {
            // Dropping the sender is observed as a clean close by the peer
            self.tx = None;
            Ok(())
        }
    }

    #[async_trait]
    impl FrameStream for ChannelStream {
        async fn next_frame(&mut self) -> TransportResult<Option<String>> {
            Ok(self.rx.recv().await)
        }
    }
}
