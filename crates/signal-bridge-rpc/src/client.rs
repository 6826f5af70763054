//! RPC client for the signal-cli daemon.
//!
//! One [`RpcClient`] owns one connection at a time and multiplexes any number
//! of concurrent requests over it. Responses are matched to callers by id, in
//! whatever order the daemon sends them. When an established connection drops,
//! every outstanding call fails with [`ClientError::ConnectionClosed`] and the
//! client keeps reconnecting at a fixed interval until [`RpcClient::close`].
//!
//! Connection state and the pending-call table share one lock. A request is
//! registered under the same lock that observes `Connected`, so a concurrent
//! connection loss either fails it or refuses it, never strands it.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::io::AsyncWriteExt;
use tokio::sync::{broadcast, oneshot};
use tokio::task::JoinHandle;
use tokio_util::codec::{FramedRead, FramedWrite};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::ClientConfig;
use crate::connector::{BoxedReader, BoxedWriter, Connector, DaemonAddress};
use crate::error::{ClientError, ValidationError};
use crate::protocol::{Notification, RawRequest, Request, Response};
use crate::transport::{InboundFrame, JsonLineCodec};

type PendingRequest = oneshot::Sender<Result<Response, ClientError>>;
type SharedSink = Arc<tokio::sync::Mutex<FramedWrite<BoxedWriter, JsonLineCodec>>>;

/// Observable connection lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    /// Terminal: set by [`RpcClient::close`].
    Closed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Closed => "closed",
        };
        f.write_str(name)
    }
}

struct Connection {
    generation: u64,
    sink: SharedSink,
    reader: JoinHandle<()>,
}

enum Link {
    Disconnected,
    Connecting,
    Connected(Connection),
    Closed,
}

impl Link {
    fn state(&self) -> ConnectionState {
        match self {
            Link::Disconnected => ConnectionState::Disconnected,
            Link::Connecting => ConnectionState::Connecting,
            Link::Connected(_) => ConnectionState::Connected,
            Link::Closed => ConnectionState::Closed,
        }
    }
}

struct Shared {
    link: Link,
    pending: HashMap<u64, PendingRequest>,
    generation: u64,
}

struct Inner {
    connector: Box<dyn Connector>,
    reconnect_delay: Duration,
    connect_timeout: Duration,
    shared: Mutex<Shared>,
    next_id: AtomicU64,
    closed: CancellationToken,
    notifications: broadcast::Sender<Notification>,
}

/// RPC client for communicating with the signal-cli daemon
pub struct RpcClient {
    inner: Arc<Inner>,
}

impl RpcClient {
    /// Create a disconnected client for `address` with default timings.
    #[must_use]
    pub fn new(address: DaemonAddress) -> Self {
        Self::with_connector(address, &ClientConfig::default())
    }

    /// Create a disconnected client from a loaded config.
    #[must_use]
    pub fn from_config(config: &ClientConfig) -> Self {
        Self::with_connector(config.address(), config)
    }

    /// Create a disconnected client over a custom transport.
    ///
    /// Timings and notification capacity come from `config`; its `address` is ignored.
    #[must_use]
    pub fn with_connector(connector: impl Connector, config: &ClientConfig) -> Self {
        let (notifications, _) = broadcast::channel(config.notification_capacity.max(1));

        Self {
            inner: Arc::new(Inner {
                connector: Box::new(connector),
                reconnect_delay: config.reconnect_delay(),
                connect_timeout: config.connect_timeout(),
                shared: Mutex::new(Shared {
                    link: Link::Disconnected,
                    pending: HashMap::new(),
                    generation: 0,
                }),
                next_id: AtomicU64::new(1),
                closed: CancellationToken::new(),
                notifications,
            }),
        }
    }

    /// Open the connection.
    ///
    /// A failed attempt leaves the client disconnected and does not schedule
    /// a reconnect; only the loss of an established connection does.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::InvalidState` unless the client is disconnected,
    /// `ClientError::Io` or `ClientError::Timeout` if the attempt fails, and
    /// `ClientError::ConnectionClosed` if the client was closed meanwhile.
    pub async fn connect(&self) -> Result<(), ClientError> {
        self.inner.connect().await
    }

    /// Close the client for good.
    ///
    /// Stops any scheduled reconnect, shuts the transport down and fails all
    /// outstanding calls with `ClientError::ConnectionClosed`, including calls
    /// still blocked writing their request. Idempotent, and never waits on the
    /// daemon.
    pub async fn close(&self) {
        let Some(sink) = self.inner.shutdown() else {
            return;
        };

        // A writer stuck on a full socket still holds the lock; it drops its
        // half of the transport once it sees the cancelled token.
        let Ok(mut sink) = sink.try_lock() else {
            debug!("Write in progress, leaving transport to be dropped");
            return;
        };

        // Shut down the raw writer: flushing the frame buffer could block.
        if let Err(e) = sink.get_mut().shutdown().await {
            debug!("Error shutting down transport: {}", e);
        }
    }

    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.inner.lock().link.state()
    }

    /// Number of calls currently awaiting a response.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.inner.lock().pending.len()
    }

    /// Receive daemon notifications (e.g. incoming messages).
    ///
    /// Only notifications arriving after this call are delivered.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.inner.notifications.subscribe()
    }

    /// Send an RPC request and wait for its response.
    ///
    /// Dropping the returned future before it completes removes the call from
    /// the pending table; a late response for it is then discarded.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::NotConnected` without writing anything when there
    /// is no connection, a transport error if the write fails,
    /// `ClientError::Rpc` if the daemon answers with an error envelope, and
    /// `ClientError::ConnectionClosed` if the connection is lost or closed first.
    pub async fn request(
        &self,
        method: &str,
        params: Option<Value>,
    ) -> Result<Response, ClientError> {
        let (call, sink) = self.inner.register()?;
        let request = Request::new(method, params, call.id);

        debug!("Sending request: method={}, id={}", method, call.id);
        tokio::select! {
            () = self.inner.closed.cancelled() => return Err(ClientError::ConnectionClosed),
            sent = async { sink.lock().await.send(request).await } => sent?,
        }

        call.wait().await
    }

    /// Like [`request`](Self::request), giving up after `timeout`.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Timeout` if no response arrived in time, or any
    /// error [`request`](Self::request) returns.
    pub async fn request_timeout(
        &self,
        method: &str,
        params: Option<Value>,
        timeout: Duration,
    ) -> Result<Response, ClientError> {
        tokio::time::timeout(timeout, self.request(method, params))
            .await
            .map_err(|_| ClientError::Timeout)?
    }

    /// Like [`request`](Self::request), abandoning the call when `cancel` fires.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Cancelled` if the token fired first, or any error
    /// [`request`](Self::request) returns.
    pub async fn request_cancellable(
        &self,
        method: &str,
        params: Option<Value>,
        cancel: &CancellationToken,
    ) -> Result<Response, ClientError> {
        tokio::select! {
            () = cancel.cancelled() => Err(ClientError::Cancelled),
            result = self.request(method, params) => result,
        }
    }

    /// Send a request and deserialize its result into `T`.
    ///
    /// # Errors
    ///
    /// Returns any error [`request`](Self::request) returns, or
    /// `ClientError::Json` if the result does not match `T`.
    pub async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Option<Value>,
    ) -> Result<T, ClientError> {
        let response = self.request(method, params).await?;
        Ok(response.parse_result()?)
    }

    /// Forward a request built outside the client.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::CallerSuppliedId` if the request carries an
    /// id, or any error [`request`](Self::request) returns.
    pub async fn request_raw(&self, raw: RawRequest) -> Result<Response, ClientError> {
        if raw.id.is_some() {
            return Err(ValidationError::CallerSuppliedId.into());
        }
        self.request(&raw.method, raw.params).await
    }
}

impl fmt::Debug for RpcClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RpcClient")
            .field("daemon", &self.inner.connector.to_string())
            .field("state", &self.state())
            .field("pending", &self.pending_count())
            .finish()
    }
}

impl Drop for RpcClient {
    fn drop(&mut self) {
        let _ = self.inner.shutdown();
    }
}

/// Removes its table entry when dropped, so abandoned calls cannot leak.
struct PendingCall<'a> {
    inner: &'a Inner,
    id: u64,
    rx: Option<oneshot::Receiver<Result<Response, ClientError>>>,
}

impl PendingCall<'_> {
    async fn wait(mut self) -> Result<Response, ClientError> {
        let Some(rx) = self.rx.take() else {
            return Err(ClientError::ConnectionClosed);
        };
        rx.await.unwrap_or(Err(ClientError::ConnectionClosed))
    }
}

impl Drop for PendingCall<'_> {
    fn drop(&mut self) {
        if self.inner.lock().pending.remove(&self.id).is_some() {
            debug!("Abandoned pending request id={}", self.id);
        }
    }
}

/// Clears `Connecting` if an attempt fails or its future is dropped.
struct ConnectAttempt<'a> {
    inner: &'a Inner,
    settled: bool,
}

impl Drop for ConnectAttempt<'_> {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        let mut shared = self.inner.lock();
        if matches!(shared.link, Link::Connecting) {
            shared.link = Link::Disconnected;
        }
    }
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, Shared> {
        self.shared.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn connect(self: &Arc<Self>) -> Result<(), ClientError> {
        {
            let mut shared = self.lock();
            if !matches!(shared.link, Link::Disconnected) {
                return Err(ClientError::InvalidState {
                    state: shared.link.state(),
                });
            }
            shared.link = Link::Connecting;
        }

        let mut attempt = ConnectAttempt {
            inner: self,
            settled: false,
        };

        debug!("Connecting to {}", self.connector);
        let stream = tokio::time::timeout(self.connect_timeout, self.connector.connect())
            .await
            .map_err(|_| ClientError::Timeout)??;
        let (reader, writer) = stream.into_parts();

        let mut shared = self.lock();
        if !matches!(shared.link, Link::Connecting) {
            return Err(ClientError::ConnectionClosed);
        }

        shared.generation += 1;
        let generation = shared.generation;
        let frames = FramedRead::new(reader, JsonLineCodec::new());
        let reader = tokio::spawn(read_loop(Arc::clone(self), generation, frames));

        shared.link = Link::Connected(Connection {
            generation,
            sink: Arc::new(tokio::sync::Mutex::new(FramedWrite::new(
                writer,
                JsonLineCodec::new(),
            ))),
            reader,
        });
        attempt.settled = true;

        info!("Connected to {} (generation {})", self.connector, generation);
        Ok(())
    }

    fn register(&self) -> Result<(PendingCall<'_>, SharedSink), ClientError> {
        let mut shared = self.lock();
        let sink = match &shared.link {
            Link::Connected(connection) => Arc::clone(&connection.sink),
            _ => return Err(ClientError::NotConnected),
        };

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();
        shared.pending.insert(id, tx);

        let call = PendingCall {
            inner: self,
            id,
            rx: Some(rx),
        };
        Ok((call, sink))
    }

    fn dispatch(&self, mut response: Response) {
        let Some(tx) = self.lock().pending.remove(&response.id) else {
            warn!("No pending request for id {}, discarding response", response.id);
            return;
        };

        let outcome = match response.error.take() {
            Some(error) => Err(ClientError::Rpc(error)),
            None => Ok(response),
        };

        if tx.send(outcome).is_err() {
            debug!("Caller went away before its response arrived");
        }
    }

    fn publish(&self, notification: Notification) {
        debug!("Notification: method={}", notification.method);
        if self.notifications.send(notification).is_err() {
            debug!("No notification subscribers");
        }
    }

    fn connection_lost(self: &Arc<Self>, generation: u64) {
        let pending = {
            let mut shared = self.lock();
            let current =
                matches!(&shared.link, Link::Connected(c) if c.generation == generation);
            if !current {
                return;
            }
            shared.link = Link::Disconnected;
            std::mem::take(&mut shared.pending)
        };

        warn!(
            "Connection to {} lost, failing {} pending request(s)",
            self.connector,
            pending.len()
        );
        fail_all(pending);

        if !self.closed.is_cancelled() {
            self.schedule_reconnect();
        }
    }

    fn schedule_reconnect(self: &Arc<Self>) {
        let inner = Arc::clone(self);

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    () = inner.closed.cancelled() => {
                        debug!("Reconnect cancelled");
                        return;
                    }
                    () = tokio::time::sleep(inner.reconnect_delay) => {}
                }

                info!("Reconnecting to {}...", inner.connector);
                match inner.connect().await {
                    Ok(()) => {
                        info!("Reconnected");
                        return;
                    }
                    Err(ClientError::InvalidState { state }) => {
                        debug!("Reconnect not needed, client is {}", state);
                        return;
                    }
                    Err(ClientError::ConnectionClosed) => return,
                    Err(e) => warn!("Reconnect failed: {}", e),
                }
            }
        });
    }

    /// Make the client terminal; returns the sink of the connection it tore down.
    fn shutdown(&self) -> Option<SharedSink> {
        self.closed.cancel();

        let (previous, pending) = {
            let mut shared = self.lock();
            let previous = std::mem::replace(&mut shared.link, Link::Closed);
            (previous, std::mem::take(&mut shared.pending))
        };

        fail_all(pending);

        match previous {
            Link::Connected(connection) => {
                connection.reader.abort();
                info!("Closed connection to {}", self.connector);
                Some(connection.sink)
            }
            _ => None,
        }
    }
}

fn fail_all(pending: HashMap<u64, PendingRequest>) {
    for (_, tx) in pending {
        let _ = tx.send(Err(ClientError::ConnectionClosed));
    }
}

async fn read_loop(
    inner: Arc<Inner>,
    generation: u64,
    mut frames: FramedRead<BoxedReader, JsonLineCodec>,
) {
    while let Some(frame) = frames.next().await {
        match frame {
            Ok(InboundFrame::Response(response)) => inner.dispatch(response),
            Ok(InboundFrame::Notification(notification)) => inner.publish(notification),
            Ok(InboundFrame::Unparseable { line, reason }) => {
                warn!("Dropping unparseable line ({}): {}", reason, line);
            }
            Ok(InboundFrame::Unrecognized { line, reason }) => {
                warn!("Dropping unrecognized message ({}): {}", reason, line);
            }
            Err(e) => {
                error!("Connection error: {}", e);
                break;
            }
        }
    }

    inner.connection_lost(generation);
}
