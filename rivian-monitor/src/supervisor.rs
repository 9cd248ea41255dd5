//! Connection supervisor for a `graphql-transport-ws` subscription socket.
//!
//! Two background tasks run per supervisor:
//!
//! - the receive task reads frames from the current connection, routes
//!   `next` frames to subscription callbacks and flips the state to
//!   `Acknowledged` on `connection_ack`
//! - the monitor task waits for the receive task to end, then reconnects
//!   with exponential backoff until it succeeds or the supervisor closes
//!
//! Every write to the socket and every state transition happens under the
//! link lock, so a `subscribe` can never observe `Acknowledged` and then
//! write to a connection that has since been replaced.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex, MutexGuard, PoisonError, Weak};

use serde_json::Value;
use tokio::sync::{Mutex, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, timeout, timeout_at};

use rivian_proto::{CLOSE_UNAUTHENTICATED, ClientMessage, ServerMessage};

use crate::registry::{Callback, SubscriptionRegistry};
use crate::transport::{Connector, FrameSink, FrameStream, ReadEvent, TransportError};
use crate::{MonitorConfig, MonitorError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    AwaitingAck,
    /// `connection_ack` received, subscriptions may flow
    Acknowledged,
    /// Between a drop and the next successful connection
    Reconnecting,
    /// Closed by the caller or rejected by the server; terminal
    PermanentlyClosed,
}

impl ConnectionState {
    /// A transport is open, acknowledged or not
    pub fn is_connected(self) -> bool {
        matches!(self, ConnectionState::AwaitingAck | ConnectionState::Acknowledged)
    }
}

/// Builds the `connection_init` payload. Called once per connection, so
/// per-connection fields can be regenerated.
type InitPayload = Arc<dyn Fn() -> Value + Send + Sync>;

/// Why a receive loop ended
#[derive(Debug, Clone, PartialEq, Eq)]
enum Disconnect {
    Closed(Option<String>),
    Error(String),
}

struct Link {
    sink: Option<Box<dyn FrameSink>>,
    /// Set on reconnect; the registry is replayed when the ack arrives
    replay_on_ack: bool,
}

impl Link {
    async fn send(&mut self, frame: String) -> Result<(), MonitorError> {
        match self.sink.as_mut() {
            Some(sink) => Ok(sink.send_text(frame).await?),
            None => Err(MonitorError::NotConnected),
        }
    }
}

#[derive(Default)]
struct Tasks {
    monitor: Option<JoinHandle<()>>,
    receiver: Option<JoinHandle<()>>,
}

struct Inner {
    connector: Arc<dyn Connector>,
    init: InitPayload,
    config: MonitorConfig,
    link: Mutex<Link>,
    state: watch::Sender<ConnectionState>,
    registry: StdMutex<SubscriptionRegistry>,
    tasks: StdMutex<Tasks>,
    closed: AtomicBool,
}

/// Owns one subscription connection and keeps it alive.
///
/// Subscriptions survive reconnects: after every reconnect the registry is
/// replayed as fresh `subscribe` frames once the server acknowledges the
/// new connection.
pub struct Supervisor {
    inner: Arc<Inner>,
}

impl Supervisor {
    pub fn new<C, F>(connector: C, init: F, config: MonitorConfig) -> Self
    where
        C: Connector,
        F: Fn() -> Value + Send + Sync + 'static,
    {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            inner: Arc::new(Inner {
                connector: Arc::new(connector),
                init: Arc::new(init),
                config,
                link: Mutex::new(Link {
                    sink: None,
                    replay_on_ack: false,
                }),
                state,
                registry: StdMutex::new(SubscriptionRegistry::new()),
                tasks: StdMutex::new(Tasks::default()),
                closed: AtomicBool::new(false),
            }),
        }
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.inner.config
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.state()
    }

    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state.subscribe()
    }

    pub fn is_connected(&self) -> bool {
        self.state().is_connected()
    }

    pub fn subscription_count(&self) -> usize {
        self.inner.registry().len()
    }

    /// Open the first connection and start the reconnect loop.
    ///
    /// Returns once `connection_init` is sent; it does not wait for the ack.
    /// Calling it on a live supervisor does nothing.
    pub async fn connect(&self) -> Result<(), MonitorError> {
        {
            let mut link = self.inner.link.lock().await;
            match self.inner.state() {
                ConnectionState::PermanentlyClosed => return Err(MonitorError::Closed),
                ConnectionState::Disconnected => {
                    self.inner.transition(&mut link, ConnectionState::Connecting)
                }
                _ => return Ok(()),
            }
        }

        let ended = self.inner.establish(false).await?;
        self.inner.spawn_monitor(ended);
        Ok(())
    }

    /// Wait, at most `request_timeout`, for the current connection to be
    /// acknowledged
    pub async fn wait_until_acknowledged(&self) -> Result<(), MonitorError> {
        let deadline = Instant::now() + self.inner.config.request_timeout;
        self.inner.wait_acknowledged(deadline).await
    }

    /// Register `callback` and send a `subscribe` frame for `payload`.
    ///
    /// Waits up to `request_timeout` for the connection to be acknowledged
    /// and fails with [`MonitorError::ConnectionTimeout`] otherwise; nothing
    /// is queued.
    pub async fn subscribe(
        &self,
        payload: Value,
        callback: Callback,
    ) -> Result<SubscriptionHandle, MonitorError> {
        match self.state() {
            ConnectionState::Disconnected => return Err(MonitorError::NotConnected),
            ConnectionState::PermanentlyClosed => return Err(MonitorError::Closed),
            _ => {}
        }

        let deadline = Instant::now() + self.inner.config.request_timeout;
        loop {
            self.inner.wait_acknowledged(deadline).await?;

            let mut link = self.inner.link.lock().await;
            if self.inner.state() != ConnectionState::Acknowledged {
                // dropped between the signal and the lock
                continue;
            }

            let id = uuid::Uuid::new_v4().to_string();
            let frame = ClientMessage::Subscribe {
                id: &id,
                payload: &payload,
            }
            .to_text()?;

            // registered first so a fast reply is not dropped
            self.inner.registry().add(id.clone(), callback, payload);
            if let Err(e) = link.send(frame).await {
                self.inner.registry().remove(&id);
                return Err(e);
            }

            log::debug!("[rivian-monitor] Subscribed {id}");
            return Ok(SubscriptionHandle {
                id,
                inner: Arc::downgrade(&self.inner),
            });
        }
    }

    /// Stop both background tasks, close the transport and drop every
    /// subscription. Safe to call repeatedly.
    ///
    /// Must not be called from inside a subscription callback, since the
    /// callback runs on the receive task this waits for.
    pub async fn close(&self) {
        self.inner.closed.store(true, Ordering::SeqCst);

        let monitor = self.inner.tasks().monitor.take();
        if let Some(monitor) = monitor {
            monitor.abort();
            let _ = monitor.await;
        }

        // `closed` is checked under this lock before a receiver is spawned
        let mut link = self.inner.link.lock().await;

        let receiver = self.inner.tasks().receiver.take();
        if let Some(receiver) = receiver {
            receiver.abort();
            let _ = receiver.await;
        }

        if let Some(mut sink) = link.sink.take() {
            if let Err(e) = sink.close().await {
                log::debug!("[rivian-monitor] Error closing transport: {e}");
            }
        }

        self.inner.registry().clear();
        self.inner.transition(&mut link, ConnectionState::PermanentlyClosed);
    }
}

impl Drop for Supervisor {
    fn drop(&mut self) {
        self.inner.closed.store(true, Ordering::SeqCst);
        let mut tasks = self.inner.tasks();
        for handle in [tasks.monitor.take(), tasks.receiver.take()]
            .into_iter()
            .flatten()
        {
            handle.abort();
        }
    }
}

impl Inner {
    fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn registry(&self) -> MutexGuard<'_, SubscriptionRegistry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn tasks(&self) -> MutexGuard<'_, Tasks> {
        self.tasks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Callers hold the link lock. Nothing leaves `PermanentlyClosed`.
    fn transition(&self, _link: &mut Link, next: ConnectionState) {
        self.state.send_if_modified(|current| {
            if *current == next || *current == ConnectionState::PermanentlyClosed {
                return false;
            }
            log::debug!("[rivian-monitor] {current:?} -> {next:?}");
            *current = next;
            true
        });
    }

    async fn wait_acknowledged(&self, deadline: Instant) -> Result<(), MonitorError> {
        let mut state = self.state.subscribe();
        let reached = match timeout_at(
            deadline,
            state.wait_for(|s| {
                matches!(s, ConnectionState::Acknowledged | ConnectionState::PermanentlyClosed)
            }),
        )
        .await
        {
            Err(_) => return Err(MonitorError::ConnectionTimeout(self.config.request_timeout)),
            Ok(Err(_)) => return Err(MonitorError::Closed),
            Ok(Ok(state)) => *state,
        };

        match reached {
            ConnectionState::PermanentlyClosed => Err(MonitorError::Closed),
            _ => Ok(()),
        }
    }

    /// Open a new transport, send `connection_init` and start its receive
    /// task. The returned receiver resolves when that task ends.
    async fn establish(
        self: &Arc<Self>,
        reconnect: bool,
    ) -> Result<oneshot::Receiver<Disconnect>, MonitorError> {
        self.stop_receiver().await;
        {
            let mut link = self.link.lock().await;
            if self.is_closed() {
                return Err(MonitorError::Closed);
            }
            link.sink = None;
            self.transition(&mut link, ConnectionState::Connecting);
        }

        let opened = match timeout(self.config.connect_timeout, self.connector.open()).await {
            Ok(opened) => opened,
            Err(_) => Err(TransportError::Connect(format!(
                "timed out after {:?}",
                self.config.connect_timeout
            ))),
        };

        let mut link = self.link.lock().await;
        let fallback = if reconnect {
            ConnectionState::Reconnecting
        } else {
            ConnectionState::Disconnected
        };

        let (mut sink, stream) = match opened {
            Ok(transport) => transport,
            Err(e) => {
                self.transition(&mut link, fallback);
                return Err(e.into());
            }
        };

        if self.is_closed() {
            let _ = sink.close().await;
            return Err(MonitorError::Closed);
        }

        let payload = (self.init)();
        let init = ClientMessage::ConnectionInit { payload: &payload }.to_text()?;
        if let Err(e) = sink.send_text(init).await {
            self.transition(&mut link, fallback);
            return Err(e.into());
        }

        link.sink = Some(sink);
        link.replay_on_ack = reconnect;
        self.transition(&mut link, ConnectionState::AwaitingAck);

        let (done, ended) = oneshot::channel();
        let receiver = tokio::spawn(Arc::clone(self).receive(stream, done));
        self.tasks().receiver = Some(receiver);

        Ok(ended)
    }

    /// Cancel and await the previous receive task, so two loops never
    /// dispatch at the same time
    async fn stop_receiver(&self) {
        let receiver = self.tasks().receiver.take();
        if let Some(receiver) = receiver {
            receiver.abort();
            let _ = receiver.await;
        }
    }

    fn spawn_monitor(self: &Arc<Self>, ended: oneshot::Receiver<Disconnect>) {
        if self.is_closed() {
            return;
        }
        let monitor = tokio::spawn(Arc::clone(self).monitor(ended));
        if let Some(previous) = self.tasks().monitor.replace(monitor) {
            previous.abort();
        }
    }

    async fn receive(self: Arc<Self>, mut stream: Box<dyn FrameStream>, done: oneshot::Sender<Disconnect>) {
        let reason = loop {
            match timeout(self.config.liveness_timeout, stream.next_event()).await {
                Err(_) => self.resubscribe_all().await,
                Ok(ReadEvent::Text(text)) => self.dispatch(&text).await,
                Ok(ReadEvent::Heartbeat) => {}
                Ok(ReadEvent::Closed(reason)) => break Disconnect::Closed(reason),
                Ok(ReadEvent::Error(detail)) => break Disconnect::Error(detail),
            }
        };
        let _ = done.send(reason);
    }

    async fn dispatch(&self, text: &str) {
        let frame: Value = match serde_json::from_str(text) {
            Ok(frame) => frame,
            Err(e) => {
                log::warn!("[rivian-monitor] Failed to parse frame: {e}");
                return;
            }
        };

        let callback = match ServerMessage::classify(&frame) {
            ServerMessage::ConnectionAck => {
                self.acknowledge().await;
                return;
            }
            ServerMessage::Next { id } => {
                let callback = self.registry().callback(id);
                if callback.is_none() {
                    log::debug!("[rivian-monitor] No subscription found for id: {id}");
                }
                callback
            }
            ServerMessage::Error { id } => {
                log::error!("[rivian-monitor] Error frame for {}: {text}", id.unwrap_or("-"));
                return;
            }
            other => {
                log::debug!("[rivian-monitor] Ignoring frame {other:?}");
                return;
            }
        };

        if let Some(callback) = callback {
            callback(frame).await;
        }
    }

    async fn acknowledge(&self) {
        let mut link = self.link.lock().await;
        if self.state() != ConnectionState::AwaitingAck {
            log::debug!("[rivian-monitor] Ignoring connection_ack in {:?}", self.state());
            return;
        }

        if std::mem::take(&mut link.replay_on_ack) {
            let count = self.replay(&mut link).await;
            log::info!("[rivian-monitor] Resubscribed {count} subscription(s) after reconnect");
        }
        self.transition(&mut link, ConnectionState::Acknowledged);
    }

    /// Heartbeat recovery: nothing arrived within the liveness window, so
    /// re-send every subscription on the connection we still have.
    // TODO: decide with the gateway owners whether a silent socket should
    // be torn down instead once duplicate subscribe handling is confirmed
    async fn resubscribe_all(&self) {
        let mut link = self.link.lock().await;
        if self.state() != ConnectionState::Acknowledged {
            log::warn!(
                "[rivian-monitor] No frame within {:?} before ack, not resubscribing",
                self.config.liveness_timeout
            );
            return;
        }

        let count = self.replay(&mut link).await;
        log::info!(
            "[rivian-monitor] No frame within {:?}, resubscribed {count} subscription(s)",
            self.config.liveness_timeout
        );
    }

    /// Send one `subscribe` frame per registry entry, in registry order
    async fn replay(&self, link: &mut Link) -> usize {
        let frames: Vec<String> = self
            .registry()
            .iter()
            .filter_map(|s| {
                ClientMessage::Subscribe {
                    id: &s.id,
                    payload: &s.payload,
                }
                .to_text()
                .map_err(|e| log::warn!("[rivian-monitor] Failed to encode {}: {e}", s.id))
                .ok()
            })
            .collect();

        let mut sent = 0;
        for frame in frames {
            if let Err(e) = link.send(frame).await {
                log::warn!("[rivian-monitor] Failed to re-subscribe: {e}");
                break;
            }
            sent += 1;
        }
        sent
    }

    async fn monitor(self: Arc<Self>, mut ended: oneshot::Receiver<Disconnect>) {
        let backoff = self.config.backoff();
        loop {
            let reason = ended
                .await
                .unwrap_or_else(|_| Disconnect::Error("receive task stopped".to_string()));
            if !self.disconnected(reason).await {
                return;
            }

            let mut attempt: u32 = 0;
            ended = loop {
                let delay = backoff.delay(attempt);
                log::info!(
                    "[rivian-monitor] Attempting reconnection in {delay:?} (attempt {})",
                    attempt + 1
                );
                tokio::time::sleep(delay).await;

                match self.establish(true).await {
                    Ok(ended) => {
                        log::info!("[rivian-monitor] Reconnection successful");
                        break ended;
                    }
                    Err(MonitorError::Closed) => return,
                    Err(e) => {
                        log::error!("[rivian-monitor] Reconnection attempt {} failed: {e}", attempt + 1);
                        attempt = attempt.saturating_add(1);
                    }
                }
            };
        }
    }

    /// Returns whether to reconnect
    async fn disconnected(&self, reason: Disconnect) -> bool {
        let mut link = self.link.lock().await;
        link.sink = None;
        if self.is_closed() {
            return false;
        }

        match reason {
            Disconnect::Closed(Some(reason)) if reason == CLOSE_UNAUTHENTICATED => {
                log::error!("[rivian-monitor] Session rejected by server, not reconnecting");
                self.closed.store(true, Ordering::SeqCst);
                self.registry().clear();
                self.transition(&mut link, ConnectionState::PermanentlyClosed);
                return false;
            }
            Disconnect::Closed(reason) => log::debug!(
                "[rivian-monitor] Connection closed: {}",
                reason.as_deref().unwrap_or("no reason")
            ),
            Disconnect::Error(detail) => log::warn!("[rivian-monitor] Connection failed: {detail}"),
        }

        self.transition(&mut link, ConnectionState::Reconnecting);
        true
    }
}

/// Returned by [`Supervisor::subscribe`]
#[derive(Debug, Clone)]
pub struct SubscriptionHandle {
    id: String,
    inner: Weak<Inner>,
}

impl SubscriptionHandle {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Forget the subscription and, when a transport is open, send
    /// `complete` for it. Only the first call has any effect.
    pub async fn unsubscribe(&self) -> Result<(), MonitorError> {
        let Some(inner) = self.inner.upgrade() else {
            return Ok(());
        };

        let mut link = inner.link.lock().await;
        if !inner.registry().remove(&self.id) {
            return Ok(());
        }
        if !inner.state().is_connected() || link.sink.is_none() {
            log::debug!("[rivian-monitor] Unsubscribed {} locally", self.id);
            return Ok(());
        }

        let frame = ClientMessage::Complete { id: &self.id }.to_text()?;
        link.send(frame).await
    }
}
