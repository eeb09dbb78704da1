//! Connection supervision.
//!
//! One `Connection` owns exactly one WebSocket. A single reader task owns
//! the read half and dispatches inbound envelopes; writers serialize through
//! a mutex around the sink. The supervisor performs authentication and
//! workspace selection on connect, attempts one in-place reconnect on an
//! unexpected close, and drains background tasks on shutdown.

use crate::config::Config;
use crate::error::ClientError;
use crate::pool::BufferPool;
use crate::registry::{PendingRequests, Subscriptions};
use bytes::Bytes;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinSet;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::{CloseFrame, WebSocketConfig};
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{connect_async_with_config, MaybeTlsStream, WebSocketStream};
use vergedb_codec::{
    decode_basic_responses, decode_notification_id, decode_response, encode_request, Request,
    Response, Value,
};

const PATH_RPC: &str = "/rpc";
const SUBPROTOCOL: &str = "cbor";
const VERSION_PREFIX: &str = "vergedb-";

/// Ceiling on waiting for background tasks during `close`.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;
type WsSource = SplitStream<WsStream>;

/// Supervisor states, observable via [`Connection::state`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum State {
    Idle = 0,
    Opening,
    Authenticating,
    SelectingWorkspace,
    Ready,
    Reconnecting,
    Closing,
    Closed,
}

impl State {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => State::Opening,
            2 => State::Authenticating,
            3 => State::SelectingWorkspace,
            4 => State::Ready,
            5 => State::Reconnecting,
            6 => State::Closing,
            7 => State::Closed,
            _ => State::Idle,
        }
    }
}

/// A supervised connection to a VergeDB server.
pub struct Connection {
    pub(crate) config: Config,
    /// Write half of the socket. `None` until connected and after close.
    writer: Mutex<Option<WsSink>>,
    pub(crate) pending: PendingRequests,
    pub(crate) subscriptions: Subscriptions,
    buffers: BufferPool,
    state: AtomicU8,
    closed: AtomicBool,
    token: RwLock<String>,
    version: RwLock<String>,
    shutdown: watch::Sender<bool>,
    tasks: Mutex<JoinSet<()>>,
}

/// Deregisters a pending key on every exit path, including cancellation of
/// the waiting future.
struct PendingGuard<'a> {
    pending: &'a PendingRequests,
    key: &'a str,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.pending.cleanup(self.key);
    }
}

impl Connection {
    pub(crate) fn new(config: Config) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            config,
            writer: Mutex::new(None),
            pending: PendingRequests::default(),
            subscriptions: Subscriptions::default(),
            buffers: BufferPool::new(),
            state: AtomicU8::new(State::Idle as u8),
            closed: AtomicBool::new(false),
            token: RwLock::new(String::new()),
            version: RwLock::new(String::new()),
            shutdown,
            tasks: Mutex::new(JoinSet::new()),
        }
    }

    /// Current supervisor state.
    pub fn state(&self) -> State {
        State::from_u8(self.state.load(Ordering::SeqCst))
    }

    /// Returns whether the connection is open and the session established.
    pub fn is_connected(&self) -> bool {
        self.state() == State::Ready
    }

    /// Number of in-flight requests.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Number of registered live-query channels.
    pub fn subscription_count(&self) -> usize {
        self.subscriptions.len()
    }

    fn set_state(&self, state: State) {
        self.state.store(state as u8, Ordering::SeqCst);
        tracing::debug!(?state, "connection state");
    }

    pub(crate) fn shutting_down(&self) -> bool {
        *self.shutdown.borrow()
    }

    pub(crate) fn subscribe_shutdown(&self) -> watch::Receiver<bool> {
        self.shutdown.subscribe()
    }

    pub(crate) fn set_token(&self, token: String) {
        if let Ok(mut slot) = self.token.write() {
            *slot = token;
        }
    }

    /// The session token returned by the last sign-in.
    pub fn token(&self) -> String {
        self.token.read().map(|t| t.clone()).unwrap_or_default()
    }

    /// The server version probed during connect, without its product prefix.
    pub fn version(&self) -> String {
        self.version.read().map(|v| v.clone()).unwrap_or_default()
    }

    /// Spawns a background task tracked by the shutdown drain.
    pub(crate) async fn spawn<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.tasks.lock().await.spawn(task);
    }

    /// Opens the socket, spawns the reader and establishes the session.
    pub(crate) async fn connect(self: &Arc<Self>) -> Result<(), ClientError> {
        self.set_state(State::Opening);
        let stream = self.dial().await?;
        let source = self.install(stream).await;

        let conn = Arc::clone(self);
        self.spawn(conn.read_loop(source)).await;

        self.set_state(State::Authenticating);
        self.signin().await?;

        self.set_state(State::SelectingWorkspace);
        self.select_workspace().await?;

        let version = self.version_rpc().await?;
        if let Ok(mut slot) = self.version.write() {
            *slot = version;
        }

        self.set_state(State::Ready);
        Ok(())
    }

    async fn dial(&self) -> Result<WsStream, ClientError> {
        let scheme = if self.config.secure { "wss" } else { "ws" };
        let url = format!("{scheme}://{}{PATH_RPC}", self.config.host);
        tracing::debug!(%url, "opening websocket");

        let mut request = url.into_client_request()?;
        request
            .headers_mut()
            .insert("Sec-WebSocket-Protocol", HeaderValue::from_static(SUBPROTOCOL));

        let mut ws_config = WebSocketConfig::default();
        ws_config.max_message_size = Some(self.config.read_limit);
        ws_config.max_frame_size = Some(self.config.read_limit);

        let (stream, _) = connect_async_with_config(request, Some(ws_config), false).await?;
        Ok(stream)
    }

    /// Splits the socket, installs the write half and returns the read half.
    async fn install(&self, stream: WsStream) -> WsSource {
        let (sink, source) = stream.split();
        *self.writer.lock().await = Some(sink);
        source
    }

    /// Signs in with the configured credentials and stores the session token.
    pub(crate) async fn signin(&self) -> Result<(), ClientError> {
        let user = self.config.username.clone();
        let pass = self.config.password.clone();
        self.signin_with(&user, &pass).await
    }

    pub(crate) async fn signin_with(&self, user: &str, pass: &str) -> Result<(), ClientError> {
        let mut credentials = vergedb_codec::Object::new();
        credentials.insert("user".to_string(), Value::from(user));
        credentials.insert("pass".to_string(), Value::from(pass));

        let raw = self
            .send(Request::new("signin").with_params(vec![Value::Object(credentials)]))
            .await?;

        match vergedb_codec::from_slice(&raw, &self.config.decode_limits)? {
            Value::String(token) => self.set_token(token),
            Value::Null | Value::None => {}
            other => {
                return Err(vergedb_codec::CodecError::TypeMismatch {
                    expected: "token string",
                    actual: other.type_name(),
                }
                .into())
            }
        }
        Ok(())
    }

    async fn use_rpc(&self) -> Result<(), ClientError> {
        self.send(Request::new("use").with_params(vec![
            Value::from(self.config.namespace.as_str()),
            Value::from(self.config.database.as_str()),
        ]))
        .await?;
        Ok(())
    }

    /// Selects the workspace and creates it if it does not exist.
    async fn select_workspace(&self) -> Result<(), ClientError> {
        self.use_rpc().await?;

        let raw = self
            .query_raw(
                format!("DEFINE NAMESPACE IF NOT EXISTS {}", self.config.namespace),
                None,
            )
            .await?;
        self.check_basic(&raw)?;

        let raw = self
            .query_raw(
                format!("DEFINE DATABASE IF NOT EXISTS {}", self.config.database),
                None,
            )
            .await?;
        self.check_basic(&raw)?;

        Ok(())
    }

    async fn version_rpc(&self) -> Result<String, ClientError> {
        let raw = self.send(Request::new("version")).await?;
        let version = String::try_from(vergedb_codec::from_slice(
            &raw,
            &self.config.decode_limits,
        )?)?;
        Ok(trim_version(&version))
    }

    pub(crate) async fn query_raw(
        &self,
        sql: String,
        vars: Option<vergedb_codec::Object>,
    ) -> Result<Bytes, ClientError> {
        let vars = match vars {
            Some(vars) => Value::Object(vars),
            None => Value::Null,
        };
        self.send(Request::new("query").with_params(vec![Value::String(sql), vars]))
            .await
    }

    /// Verifies that the first statement of a query response succeeded.
    pub(crate) fn check_basic(&self, raw: &Bytes) -> Result<(), ClientError> {
        let responses = decode_basic_responses(raw, &self.config.decode_limits)?;
        let first = responses.first().ok_or(ClientError::EmptyResponse)?;
        if !first.is_ok() {
            return Err(ClientError::ResponseNotOkay(first.status.clone()));
        }
        Ok(())
    }

    /// Sends one request and waits for its correlated response.
    pub(crate) async fn send(&self, mut request: Request) -> Result<Bytes, ClientError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(ClientError::ConnectionClosed);
        }

        let (key, rx) = self.pending.prepare();
        request.id = key.clone();
        let _guard = PendingGuard {
            pending: &self.pending,
            key: &key,
        };

        tracing::debug!(id = %request.id, method = %request.method, "sending request");

        let mut buf = self.buffers.acquire();
        if let Err(err) = encode_request(&mut buf, &request) {
            self.buffers.release(buf);
            return Err(err.into());
        }
        let frame = Message::binary(buf.to_vec());
        self.buffers.release(buf);

        {
            let mut writer = self.writer.lock().await;
            let sink = writer.as_mut().ok_or(ClientError::NotConnected)?;
            sink.send(frame).await?;
        }

        let mut shutdown = self.shutdown.subscribe();
        if *shutdown.borrow() {
            return Err(ClientError::ConnectionClosed);
        }

        tokio::select! {
            _ = shutdown.changed() => Err(ClientError::Cancelled),
            received = timeout(self.config.request_timeout, rx) => match received {
                Err(_) => Err(ClientError::Timeout),
                Ok(Err(_)) => Err(ClientError::ChannelClosed),
                Ok(Ok(outcome)) => outcome,
            },
        }
    }

    /// The reader task. Owns the read half; decode and dispatch run strictly
    /// in arrival order.
    async fn read_loop(self: Arc<Self>, mut source: WsSource) {
        tracing::debug!("reader task started");
        let mut shutdown = self.shutdown.subscribe();

        loop {
            let message = tokio::select! {
                _ = shutdown.changed() => break,
                message = source.next() => message,
            };

            match message {
                Some(Ok(Message::Binary(payload))) => {
                    self.handle_frame(Bytes::from(payload)).await;
                }
                Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => {}
                Some(Ok(Message::Close(frame))) => {
                    // A close without a status code counts as a normal closure.
                    let unexpected = frame
                        .as_ref()
                        .map(|f| f.code != CloseCode::Normal)
                        .unwrap_or(false);
                    if !unexpected || self.shutting_down() {
                        tracing::debug!("websocket closed");
                        break;
                    }
                    tracing::error!(
                        close_frame = ?frame,
                        "websocket closed unexpectedly, trying to reconnect"
                    );
                    match self.try_reconnect().await {
                        Some(new_source) => source = new_source,
                        None => break,
                    }
                }
                Some(Ok(_)) => {
                    tracing::error!(
                        error = %ClientError::ExpectedBinaryMessage,
                        "dropping non-binary message"
                    );
                }
                Some(Err(err)) => {
                    if self.shutting_down() {
                        break;
                    }
                    match err {
                        tungstenite::Error::ConnectionClosed
                        | tungstenite::Error::AlreadyClosed => {
                            tracing::debug!("websocket closed");
                            break;
                        }
                        err => {
                            tracing::error!(
                                error = %err,
                                "websocket read failed, trying to reconnect"
                            );
                            match self.try_reconnect().await {
                                Some(new_source) => source = new_source,
                                None => break,
                            }
                        }
                    }
                }
                None => {
                    if self.shutting_down() {
                        break;
                    }
                    tracing::error!("websocket stream ended unexpectedly, trying to reconnect");
                    match self.try_reconnect().await {
                        Some(new_source) => source = new_source,
                        None => break,
                    }
                }
            }
        }

        tracing::debug!("reader task stopped");
    }

    /// One in-place reconnect attempt. In-flight waiters observe closed
    /// channels; live-query channels stay registered but their server-side
    /// ids are invalidated.
    async fn try_reconnect(self: &Arc<Self>) -> Option<WsSource> {
        if self.shutting_down() {
            return None;
        }

        self.set_state(State::Reconnecting);
        self.pending.reset();
        self.writer.lock().await.take();

        let stream = match self.dial().await {
            Ok(stream) => stream,
            Err(err) => {
                tracing::error!(error = %err, "could not reconnect to websocket");
                return None;
            }
        };
        let source = self.install(stream).await;

        // Session restoration runs beside the resumed reader so its own
        // responses can be dispatched.
        let conn = Arc::clone(self);
        self.spawn(async move {
            conn.set_state(State::Authenticating);
            match conn.resume_session().await {
                Ok(()) => conn.set_state(State::Ready),
                Err(err) => {
                    tracing::error!(error = %err, "could not restore session after reconnect");
                }
            }
        })
        .await;

        Some(source)
    }

    async fn resume_session(&self) -> Result<(), ClientError> {
        self.signin().await?;
        self.use_rpc().await?;
        Ok(())
    }

    async fn handle_frame(&self, frame: Bytes) {
        let response = match decode_response(&frame, &self.config.decode_limits) {
            Ok(response) => response,
            Err(err) => {
                tracing::error!(error = %err, "could not decode websocket message");
                return;
            }
        };

        if response.id.is_empty() {
            if let Some(error) = response.error {
                tracing::error!(
                    code = error.code,
                    message = %error.message,
                    "received error notification"
                );
                return;
            }
            if let Some(result) = response.result {
                self.handle_notification(result).await;
            }
            return;
        }

        self.handle_result(response);
    }

    fn handle_result(&self, response: Response) {
        let Some(tx) = self.pending.take(&response.id) else {
            // Late delivery after a timeout or cancellation; expected.
            tracing::debug!(id = %response.id, "no pending request for response");
            return;
        };

        let outcome = match response.error {
            Some(error) => Err(ClientError::Query {
                code: error.code,
                message: error.message,
            }),
            None => Ok(response.result.unwrap_or_default()),
        };

        if tx.send(outcome).is_err() {
            tracing::debug!(id = %response.id, "pending waiter already gone");
        }
    }

    async fn handle_notification(&self, payload: Bytes) {
        let id = match decode_notification_id(&payload, &self.config.decode_limits) {
            Ok(id) => id,
            Err(err) => {
                tracing::error!(error = %err, "could not decode live notification");
                return;
            }
        };

        let Some(tx) = self.subscriptions.sender(&id) else {
            tracing::error!(id = ?id, "no live query channel for notification");
            return;
        };

        // The reader must never block indefinitely on a slow subscriber.
        let mut shutdown = self.shutdown.subscribe();
        tokio::select! {
            _ = shutdown.changed() => {
                tracing::debug!(id = ?id, "shutting down, dropping live notification");
            }
            sent = timeout(self.config.request_timeout, tx.send(payload)) => match sent {
                Err(_) => {
                    tracing::error!(id = ?id, "timeout delivering live notification, dropping");
                }
                Ok(Err(_)) => {
                    tracing::debug!(id = ?id, "live query channel closed, dropping notification");
                }
                Ok(Ok(())) => {}
            },
        }
    }

    /// Closes the connection, wakes every waiter and drains background
    /// tasks. Safe to call more than once.
    pub(crate) async fn close(&self) -> Result<(), ClientError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        self.set_state(State::Closing);
        tracing::info!("closing client");

        if let Some(mut sink) = self.writer.lock().await.take() {
            let close = Message::Close(Some(CloseFrame {
                code: CloseCode::Normal,
                reason: "closing client".into(),
            }));
            if let Err(err) = sink.send(close).await {
                tracing::debug!(error = %err, "could not send close frame");
            }
        }

        let _ = self.shutdown.send(true);
        self.pending.reset();
        self.subscriptions.reset();

        tracing::debug!("waiting for background tasks to finish");
        let mut tasks = self.tasks.lock().await;
        let drained = timeout(SHUTDOWN_TIMEOUT, async {
            while tasks.join_next().await.is_some() {}
        })
        .await;

        self.set_state(State::Closed);
        drained.map_err(|_| ClientError::ShutdownTimeout)
    }
}

fn trim_version(version: &str) -> String {
    version
        .strip_prefix(VERSION_PREFIX)
        .unwrap_or(version)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    fn config() -> Config {
        Config::new("localhost:8000", "root", "root", "test_ns", "test_db")
    }

    #[test]
    fn test_state_roundtrip() {
        for state in [
            State::Idle,
            State::Opening,
            State::Authenticating,
            State::SelectingWorkspace,
            State::Ready,
            State::Reconnecting,
            State::Closing,
            State::Closed,
        ] {
            assert_eq!(State::from_u8(state as u8), state);
        }
    }

    #[test]
    fn test_new_connection_is_idle() {
        let conn = Connection::new(config());
        assert_eq!(conn.state(), State::Idle);
        assert!(!conn.is_connected());
        assert_eq!(conn.pending_count(), 0);
        assert_eq!(conn.subscription_count(), 0);
        assert_eq!(conn.token(), "");
        assert_eq!(conn.version(), "");
    }

    #[test]
    fn test_trim_version() {
        assert_eq!(trim_version("vergedb-2.1.0"), "2.1.0");
        assert_eq!(trim_version("2.1.0"), "2.1.0");
    }

    #[tokio::test]
    async fn test_send_without_connection() {
        let conn = Connection::new(config());
        let result = conn.send(Request::new("version")).await;
        assert!(matches!(result, Err(ClientError::NotConnected)));
        // The pending entry is cleaned up on the failure path.
        assert_eq!(conn.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let conn = Connection::new(config());
        conn.close().await.unwrap();
        assert_eq!(conn.state(), State::Closed);
        conn.close().await.unwrap();

        let result = conn.send(Request::new("version")).await;
        assert!(matches!(result, Err(ClientError::ConnectionClosed)));
    }
}
