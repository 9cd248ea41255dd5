//! WebSocket transport over tokio-tungstenite.

use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use crate::MonitorConfig;
use crate::transport::{Connector, FrameSink, FrameStream, ReadEvent, Transport, TransportError};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Opens a fresh WebSocket with the configured subprotocol on every call
#[derive(Debug, Clone)]
pub struct WsConnector {
    url: String,
    subprotocol: String,
    connect_timeout: Duration,
}

impl WsConnector {
    pub fn new(config: &MonitorConfig) -> Self {
        Self {
            url: config.url.clone(),
            subprotocol: config.subprotocol.clone(),
            connect_timeout: config.connect_timeout,
        }
    }
}

#[async_trait]
impl Connector for WsConnector {
    async fn open(&self) -> Result<Transport, TransportError> {
        log::debug!("[rivian-monitor] Opening WebSocket to {}", self.url);

        let mut request = self
            .url
            .as_str()
            .into_client_request()
            .map_err(|e| TransportError::Connect(format!("invalid request: {e}")))?;
        let protocol = HeaderValue::from_str(&self.subprotocol)
            .map_err(|e| TransportError::Connect(format!("invalid subprotocol: {e}")))?;
        request.headers_mut().insert("Sec-WebSocket-Protocol", protocol);

        let (stream, _response) = tokio::time::timeout(self.connect_timeout, connect_async(request))
            .await
            .map_err(|_| TransportError::Connect(format!("timed out after {:?}", self.connect_timeout)))?
            .map_err(|e| TransportError::Connect(e.to_string()))?;

        let (sink, stream) = stream.split();
        Ok((Box::new(WsSink(sink)), Box::new(WsReader(stream))))
    }
}

struct WsSink(SplitSink<WsStream, Message>);

#[async_trait]
impl FrameSink for WsSink {
    async fn send_text(&mut self, text: String) -> Result<(), TransportError> {
        self.0
            .send(Message::Text(text.into()))
            .await
            .map_err(|e| TransportError::Send(e.to_string()))
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.0
            .close()
            .await
            .map_err(|e| TransportError::Send(e.to_string()))
    }
}

struct WsReader(SplitStream<WsStream>);

#[async_trait]
impl FrameStream for WsReader {
    async fn next_event(&mut self) -> ReadEvent {
        loop {
            match self.0.next().await {
                Some(Ok(Message::Text(text))) => return ReadEvent::Text(text.to_string()),
                Some(Ok(Message::Binary(data))) => match String::from_utf8(data.to_vec()) {
                    Ok(text) => return ReadEvent::Text(text),
                    Err(_) => log::warn!("[rivian-monitor] Dropping non UTF-8 binary frame"),
                },
                Some(Ok(Message::Close(frame))) => {
                    let reason = frame
                        .map(|f| f.reason.to_string())
                        .filter(|r| !r.is_empty());
                    return ReadEvent::Closed(reason);
                }
                // tungstenite queues the pong for pings itself
                Some(Ok(Message::Ping(_) | Message::Pong(_))) => return ReadEvent::Heartbeat,
                Some(Ok(_)) => continue,
                Some(Err(e)) => return ReadEvent::Error(e.to_string()),
                None => return ReadEvent::Closed(None),
            }
        }
    }
}
