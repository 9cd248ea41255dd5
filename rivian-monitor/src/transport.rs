//! The duplex, message-framed connection the supervisor drives.
//!
//! A [`Connector`] opens one connection and returns its two halves. The
//! supervisor writes through the sink under its link lock and reads the
//! stream from a single receive task.

use async_trait::async_trait;

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("failed to open connection: {0}")]
    Connect(String),
    #[error("failed to send frame: {0}")]
    Send(String),
    #[error("connection is closed")]
    Closed,
}

/// What the read half produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadEvent {
    /// A text frame
    Text(String),
    /// The peer closed the connection, with its close reason if any
    Closed(Option<String>),
    /// A ping or pong; the peer is alive but sent no data
    Heartbeat,
    /// The connection failed
    Error(String),
}

#[async_trait]
pub trait FrameSink: Send {
    async fn send_text(&mut self, text: String) -> Result<(), TransportError>;

    async fn close(&mut self) -> Result<(), TransportError>;
}

#[async_trait]
pub trait FrameStream: Send {
    /// Next event. After `Closed` or `Error` the stream is finished.
    async fn next_event(&mut self) -> ReadEvent;
}

pub type Transport = (Box<dyn FrameSink>, Box<dyn FrameStream>);

#[async_trait]
pub trait Connector: Send + Sync + 'static {
    async fn open(&self) -> Result<Transport, TransportError>;
}
