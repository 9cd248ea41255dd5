//! In-memory transport. Each `open` hands the test a [`ServerSide`] that
//! plays the gateway: it reads what the client wrote and pushes events
//! into the client's read half.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use rivian_monitor::transport::{FrameSink, FrameStream, Transport};
use rivian_monitor::{Connector, ReadEvent, TransportError};
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tokio::time::Instant;

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[derive(Clone)]
pub struct MockConnector {
    servers: mpsc::UnboundedSender<ServerSide>,
    failures: Arc<AtomicUsize>,
    attempts: Arc<Mutex<Vec<Instant>>>,
}

pub struct MockServer {
    servers: mpsc::UnboundedReceiver<ServerSide>,
    failures: Arc<AtomicUsize>,
    attempts: Arc<Mutex<Vec<Instant>>>,
}

pub fn mock() -> (MockConnector, MockServer) {
    let (tx, rx) = mpsc::unbounded_channel();
    let failures = Arc::new(AtomicUsize::new(0));
    let attempts = Arc::new(Mutex::new(Vec::new()));
    (
        MockConnector {
            servers: tx,
            failures: Arc::clone(&failures),
            attempts: Arc::clone(&attempts),
        },
        MockServer {
            servers: rx,
            failures,
            attempts,
        },
    )
}

impl MockServer {
    /// Refuse the next `count` connection attempts
    pub fn refuse_next(&self, count: usize) {
        self.failures.store(count, Ordering::SeqCst);
    }

    /// When each `open` was called, refused or not
    pub fn attempts(&self) -> Vec<Instant> {
        self.attempts.lock().unwrap().clone()
    }

    pub async fn accept(&mut self) -> ServerSide {
        tokio::time::timeout(Duration::from_secs(600), self.servers.recv())
            .await
            .expect("no connection attempt")
            .expect("connector dropped")
    }

    /// Accept a connection and check its `connection_init`
    pub async fn accept_init(&mut self) -> ServerSide {
        let mut server = self.accept().await;
        let init = server.recv().await;
        assert_eq!(init["type"], "connection_init");
        assert_eq!(init["payload"], init_payload());
        server
    }

    pub async fn no_connection_within(&mut self, wait: Duration) -> bool {
        tokio::time::timeout(wait, self.servers.recv()).await.is_err()
    }
}

pub fn init_payload() -> Value {
    json!({"u-sess": "session-token"})
}

#[async_trait]
impl Connector for MockConnector {
    async fn open(&self) -> Result<Transport, TransportError> {
        self.attempts.lock().unwrap().push(Instant::now());

        let refused = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if refused {
            return Err(TransportError::Connect("connection refused".to_string()));
        }

        let (to_server, from_client) = mpsc::unbounded_channel();
        let (to_client, from_server) = mpsc::unbounded_channel();
        self.servers
            .send(ServerSide {
                from_client,
                to_client,
            })
            .map_err(|_| TransportError::Connect("server gone".to_string()))?;

        Ok((
            Box::new(MockSink {
                tx: Some(to_server),
            }),
            Box::new(MockStream { rx: from_server }),
        ))
    }
}

struct MockSink {
    tx: Option<mpsc::UnboundedSender<String>>,
}

#[async_trait]
impl FrameSink for MockSink {
    async fn send_text(&mut self, text: String) -> Result<(), TransportError> {
        match &self.tx {
            Some(tx) => tx.send(text).map_err(|_| TransportError::Closed),
            None => Err(TransportError::Closed),
        }
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.tx = None;
        Ok(())
    }
}

struct MockStream {
    rx: mpsc::UnboundedReceiver<ReadEvent>,
}

#[async_trait]
impl FrameStream for MockStream {
    async fn next_event(&mut self) -> ReadEvent {
        self.rx.recv().await.unwrap_or(ReadEvent::Closed(None))
    }
}

pub struct ServerSide {
    from_client: mpsc::UnboundedReceiver<String>,
    to_client: mpsc::UnboundedSender<ReadEvent>,
}

impl ServerSide {
    /// Next frame written by the client
    pub async fn recv(&mut self) -> Value {
        let text = tokio::time::timeout(Duration::from_secs(5), self.from_client.recv())
            .await
            .expect("client sent nothing")
            .expect("client closed the connection");
        serde_json::from_str(&text).expect("client sent invalid JSON")
    }

    /// `None` if the client stayed quiet for `wait`
    pub async fn try_recv(&mut self, wait: Duration) -> Option<Value> {
        match tokio::time::timeout(wait, self.from_client.recv()).await {
            Ok(Some(text)) => Some(serde_json::from_str(&text).expect("client sent invalid JSON")),
            _ => None,
        }
    }

    /// Whether the client closed its write half
    pub async fn client_closed(&mut self) -> bool {
        matches!(
            tokio::time::timeout(Duration::from_secs(5), self.from_client.recv()).await,
            Ok(None)
        )
    }

    pub fn send(&self, frame: Value) {
        let _ = self.to_client.send(ReadEvent::Text(frame.to_string()));
    }

    /// A keepalive with no data frame
    pub fn ping(&self) {
        let _ = self.to_client.send(ReadEvent::Heartbeat);
    }

    pub fn ack(&self) {
        self.send(json!({"type": "connection_ack"}));
    }

    pub fn close(&self, reason: Option<&str>) {
        let _ = self
            .to_client
            .send(ReadEvent::Closed(reason.map(str::to_string)));
    }

    pub fn fail(&self, detail: &str) {
        let _ = self.to_client.send(ReadEvent::Error(detail.to_string()));
    }
}
