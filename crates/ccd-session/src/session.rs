//! Single persistent hub connection with call/response and push fan-out.

use crate::config::{ConfigError, SessionConfig};
use crate::notify::{Notice, Notifier};
use ccd_core::hub_rpc::{
    decode_frame, encode_request, recover_request_id, CommonError, FrameError, InboundFrame,
    PushEvent, PushTopic, RpcErrorObject, RpcRequest, RpcResponse,
};
use futures_util::{SinkExt, StreamExt};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, watch};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};
use url::Url;

const MAX_RECONNECT_BACKOFF: Duration = Duration::from_secs(10);

type HubSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;
type CallReply = Result<Result<Value, RpcErrorObject>, SessionError>;
type PushSinks = Arc<Mutex<HashMap<PushTopic, mpsc::UnboundedSender<PushEvent>>>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Open,
    /// Terminal. Reached through `close` or once reconnects are exhausted.
    Closed,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Open => "open",
            ConnectionState::Closed => "closed",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("agent hub connection did not open in time")]
    ConnectionTimeout,
    #[error("session is closed")]
    Closed,
    #[error("connection closed before the hub replied")]
    ConnectionClosed,
    #[error("rpc error {code}: {message}")]
    Rpc {
        code: i64,
        message: String,
        data: Option<Value>,
    },
    #[error(transparent)]
    Frame(#[from] FrameError),
    #[error("unexpected result for {method}: {reason}")]
    Decode { method: String, reason: String },
}

impl SessionError {
    pub fn rpc_code(&self) -> Option<i64> {
        match self {
            SessionError::Rpc { code, .. } => Some(*code),
            _ => None,
        }
    }
}

impl From<RpcErrorObject> for SessionError {
    fn from(error: RpcErrorObject) -> Self {
        SessionError::Rpc {
            code: error.code,
            message: error.message,
            data: error.data,
        }
    }
}

/// Result of a call that reached the hub. Common errors are reported through
/// the notifier and surface here as `Suppressed` instead of a value.
#[derive(Debug, Clone, PartialEq)]
pub enum CallOutcome<T> {
    Ok(T),
    Suppressed(CommonError),
}

impl<T> CallOutcome<T> {
    pub fn into_option(self) -> Option<T> {
        match self {
            CallOutcome::Ok(value) => Some(value),
            CallOutcome::Suppressed(_) => None,
        }
    }

    pub fn is_suppressed(&self) -> bool {
        matches!(self, CallOutcome::Suppressed(_))
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> CallOutcome<U> {
        match self {
            CallOutcome::Ok(value) => CallOutcome::Ok(f(value)),
            CallOutcome::Suppressed(error) => CallOutcome::Suppressed(error),
        }
    }
}

enum Command {
    Call {
        method: String,
        params: Value,
        reply: oneshot::Sender<CallReply>,
    },
}

enum Pending {
    Call(oneshot::Sender<CallReply>),
    Subscribe,
}

enum ConnectionEnd {
    Shutdown,
    Dropped,
}

/// Cloneable handle to one hub connection. The connection task stops when
/// `close` is called or the last handle is dropped.
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<Inner>,
}

struct Inner {
    config: SessionConfig,
    notifier: Arc<dyn Notifier>,
    command_tx: mpsc::Sender<Command>,
    state_rx: watch::Receiver<ConnectionState>,
    shutdown_tx: watch::Sender<bool>,
    sinks: PushSinks,
}

impl SessionManager {
    /// Must be called from within a tokio runtime.
    pub fn spawn(config: SessionConfig, notifier: Arc<dyn Notifier>) -> Result<Self, SessionError> {
        let endpoint = config.endpoint()?;
        let (command_tx, command_rx) = mpsc::channel(config.command_queue_capacity.max(1));
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let sinks: PushSinks = Arc::new(Mutex::new(HashMap::new()));

        let driver = ConnectionDriver {
            endpoint,
            config: config.clone(),
            notifier: notifier.clone(),
            state_tx,
            sinks: sinks.clone(),
            next_id: 0,
        };
        tokio::spawn(driver.run(command_rx, shutdown_rx));

        Ok(Self {
            inner: Arc::new(Inner {
                config,
                notifier,
                command_tx,
                state_rx,
                shutdown_tx,
                sinks,
            }),
        })
    }

    pub fn config(&self) -> &SessionConfig {
        &self.inner.config
    }

    pub fn state(&self) -> ConnectionState {
        *self.inner.state_rx.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state_rx.clone()
    }

    pub(crate) fn notify(&self, notice: Notice) {
        self.inner.notifier.notify(notice);
    }

    /// Registers the sink for one push topic, replacing any earlier sink.
    /// Sinks are unbounded so a slow consumer never holds up call replies.
    pub fn on_push(&self, topic: PushTopic, sink: mpsc::UnboundedSender<PushEvent>) {
        let mut sinks = self
            .inner
            .sinks
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if sinks.insert(topic, sink).is_some() {
            debug!(event = "push_sink_replaced", topic = %topic);
        }
    }

    pub async fn call<T>(&self, method: &str, params: Value) -> Result<CallOutcome<T>, SessionError>
    where
        T: DeserializeOwned,
    {
        let config = &self.inner.config;
        match wait_for_open(
            &self.inner.state_rx,
            config.connect_poll_interval,
            config.connect_poll_attempts,
        )
        .await
        {
            Ok(()) => {}
            Err(SessionError::ConnectionTimeout) => {
                warn!(event = "hub_call_timeout", method);
                self.notify(Notice::HubNotResponding);
                return Err(SessionError::ConnectionTimeout);
            }
            Err(err) => return Err(err),
        }

        let (reply_tx, reply_rx) = oneshot::channel();
        self.inner
            .command_tx
            .send(Command::Call {
                method: method.to_string(),
                params,
                reply: reply_tx,
            })
            .await
            .map_err(|_| SessionError::Closed)?;
        let outcome = reply_rx.await.map_err(|_| SessionError::ConnectionClosed)??;

        match outcome {
            Ok(value) => serde_json::from_value(value)
                .map(CallOutcome::Ok)
                .map_err(|err| SessionError::Decode {
                    method: method.to_string(),
                    reason: err.to_string(),
                }),
            Err(error) => match CommonError::from_code(error.code) {
                Some(common) => {
                    debug!(event = "hub_call_suppressed", method, code = error.code, message = %error.message);
                    self.notify(Notice::from(common));
                    Ok(CallOutcome::Suppressed(common))
                }
                None => Err(SessionError::from(error)),
            },
        }
    }

    /// Idempotent. Resolves once the connection task has reached `Closed`.
    pub async fn close(&self) {
        self.inner.shutdown_tx.send_replace(true);
        let mut state_rx = self.inner.state_rx.clone();
        let _ = state_rx
            .wait_for(|state| *state == ConnectionState::Closed)
            .await;
    }
}

/// Polls `state_rx` every `interval`, giving up after `attempts` polls.
async fn wait_for_open(
    state_rx: &watch::Receiver<ConnectionState>,
    interval: Duration,
    attempts: u32,
) -> Result<(), SessionError> {
    let mut polls = 0;
    loop {
        let state = *state_rx.borrow();
        match state {
            ConnectionState::Open => return Ok(()),
            ConnectionState::Closed => return Err(SessionError::Closed),
            ConnectionState::Disconnected | ConnectionState::Connecting => {}
        }
        if polls >= attempts {
            return Err(SessionError::ConnectionTimeout);
        }
        polls += 1;
        tokio::time::sleep(interval).await;
    }
}

struct ConnectionDriver {
    endpoint: Url,
    config: SessionConfig,
    notifier: Arc<dyn Notifier>,
    state_tx: watch::Sender<ConnectionState>,
    sinks: PushSinks,
    next_id: u64,
}

impl ConnectionDriver {
    async fn run(
        mut self,
        mut command_rx: mpsc::Receiver<Command>,
        mut shutdown_rx: watch::Receiver<bool>,
    ) {
        let mut backoff = self.config.reconnect_interval;
        let mut failures = 0u32;
        let mut outage_announced = false;

        loop {
            if *shutdown_rx.borrow() {
                break;
            }
            self.set_state(ConnectionState::Connecting);
            let connect = tokio::select! {
                result = connect_async(self.endpoint.as_str()) => result,
                _ = shutdown_rx.changed() => break,
            };

            match connect {
                Ok((ws, _)) => {
                    failures = 0;
                    backoff = self.config.reconnect_interval;
                    info!(event = "hub_connected", endpoint = %self.endpoint);
                    self.set_state(ConnectionState::Open);

                    let end = self.drive(ws, &mut command_rx, &mut shutdown_rx).await;
                    self.set_state(ConnectionState::Disconnected);
                    fail_queued(&mut command_rx, || SessionError::ConnectionClosed);
                    match end {
                        ConnectionEnd::Shutdown => break,
                        ConnectionEnd::Dropped => {
                            warn!(event = "hub_connection_lost", endpoint = %self.endpoint);
                            self.notifier.notify(Notice::HubUnreachable);
                            outage_announced = true;
                        }
                    }
                }
                Err(err) => {
                    failures += 1;
                    warn!(event = "hub_connect_error", attempt = failures, error = %err);
                    self.set_state(ConnectionState::Disconnected);
                    if !outage_announced {
                        self.notifier.notify(Notice::HubUnreachable);
                        outage_announced = true;
                    }
                    if failures >= self.config.max_reconnect_attempts {
                        warn!(event = "hub_reconnect_exhausted", attempts = failures);
                        self.notifier
                            .notify(Notice::ReconnectExhausted { attempts: failures });
                        break;
                    }
                }
            }

            tokio::select! {
                _ = tokio::time::sleep(backoff) => {}
                _ = shutdown_rx.changed() => break,
            }
            backoff = next_backoff(backoff);
        }

        self.set_state(ConnectionState::Closed);
        command_rx.close();
        fail_queued(&mut command_rx, || SessionError::Closed);
        info!(event = "hub_session_closed");
    }

    async fn drive(
        &mut self,
        mut ws: HubSocket,
        command_rx: &mut mpsc::Receiver<Command>,
        shutdown_rx: &mut watch::Receiver<bool>,
    ) -> ConnectionEnd {
        let mut pending: HashMap<u64, Pending> = HashMap::new();
        self.subscribe(&mut ws, &mut pending).await;

        let end = loop {
            tokio::select! {
                maybe_msg = ws.next() => {
                    match maybe_msg {
                        Some(Ok(Message::Text(text))) => self.handle_text(&text, &mut pending),
                        Some(Ok(Message::Close(frame))) => {
                            debug!(event = "hub_close_frame", frame = ?frame);
                            break ConnectionEnd::Dropped;
                        }
                        Some(Ok(_)) => {}
                        Some(Err(err)) => {
                            warn!(event = "hub_read_error", error = %err);
                            break ConnectionEnd::Dropped;
                        }
                        None => break ConnectionEnd::Dropped,
                    }
                }
                maybe_command = command_rx.recv() => {
                    let Some(Command::Call { method, params, reply }) = maybe_command else {
                        let _ = ws.close(None).await;
                        break ConnectionEnd::Shutdown;
                    };
                    let id = self.next_request_id();
                    let request = RpcRequest::new(id, method, params);
                    let text = match encode_request(&request, self.config.max_frame_bytes) {
                        Ok(text) => text,
                        Err(err) => {
                            let _ = reply.send(Err(SessionError::Frame(err)));
                            continue;
                        }
                    };
                    if let Err(err) = ws.send(Message::Text(text)).await {
                        warn!(event = "hub_send_error", method = %request.method, error = %err);
                        let _ = reply.send(Err(SessionError::ConnectionClosed));
                        break ConnectionEnd::Dropped;
                    }
                    debug!(event = "hub_call_sent", id, method = %request.method);
                    pending.insert(id, Pending::Call(reply));
                }
                _ = shutdown_rx.changed() => {
                    let _ = ws.close(None).await;
                    break ConnectionEnd::Shutdown;
                }
            }
        };

        for (_, entry) in pending.drain() {
            if let Pending::Call(reply) = entry {
                let _ = reply.send(Err(SessionError::ConnectionClosed));
            }
        }
        end
    }

    /// Failures are logged only; the read side notices a dead socket.
    async fn subscribe(&mut self, ws: &mut HubSocket, pending: &mut HashMap<u64, Pending>) {
        let id = self.next_request_id();
        let request = RpcRequest::subscribe(id, &PushTopic::ALL);
        let text = match encode_request(&request, self.config.max_frame_bytes) {
            Ok(text) => text,
            Err(err) => {
                warn!(event = "hub_subscribe_failed", error = %err);
                return;
            }
        };
        if let Err(err) = ws.send(Message::Text(text)).await {
            warn!(event = "hub_subscribe_failed", error = %err);
            return;
        }
        pending.insert(id, Pending::Subscribe);
    }

    fn handle_text(&self, text: &str, pending: &mut HashMap<u64, Pending>) {
        let frame = match decode_frame(text, self.config.max_frame_bytes) {
            Ok(frame) => frame,
            Err(err) => {
                warn!(event = "hub_frame_error", error = %err);
                fail_rejected(text, err, pending);
                return;
            }
        };
        match frame {
            InboundFrame::Response(response) => resolve_response(response, pending),
            InboundFrame::Notification(notification) => {
                match PushEvent::from_notification(&notification) {
                    Ok(Some(push)) => self.dispatch(push),
                    Ok(None) => debug!(event = "hub_push_ignored", topic = %notification.topic),
                    Err(err) => {
                        warn!(event = "hub_push_decode_error", topic = %notification.topic, error = %err)
                    }
                }
            }
        }
    }

    fn dispatch(&self, push: PushEvent) {
        let topic = push.topic();
        let Some(sink) = self.sink_for(topic) else {
            debug!(event = "hub_push_unrouted", topic = %topic);
            return;
        };
        if sink.send(push).is_err() {
            debug!(event = "hub_push_sink_closed", topic = %topic);
        }
    }

    fn sink_for(&self, topic: PushTopic) -> Option<mpsc::UnboundedSender<PushEvent>> {
        self.sinks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&topic)
            .cloned()
    }

    fn set_state(&self, state: ConnectionState) {
        let previous = self.state_tx.send_replace(state);
        if previous != state {
            debug!(event = "hub_state", from = %previous, to = %state);
        }
    }

    fn next_request_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }
}

fn resolve_response(response: RpcResponse, pending: &mut HashMap<u64, Pending>) {
    let Some(entry) = response.id.as_num().and_then(|id| pending.remove(&id)) else {
        debug!(event = "hub_response_unmatched", id = %response.id);
        return;
    };
    match entry {
        Pending::Call(reply) => {
            let _ = reply.send(Ok(response.outcome));
        }
        Pending::Subscribe => match response.outcome {
            Ok(result) => log_subscribe_result(&result),
            Err(error) => {
                warn!(event = "hub_subscribe_failed", code = error.code, message = %error.message)
            }
        },
    }
}

/// Fails the call a rejected frame was answering, if its id can be read.
fn fail_rejected(text: &str, err: FrameError, pending: &mut HashMap<u64, Pending>) {
    let Some(entry) = recover_request_id(text)
        .and_then(|id| id.as_num())
        .and_then(|id| pending.remove(&id))
    else {
        return;
    };
    match entry {
        Pending::Call(reply) => {
            let _ = reply.send(Err(SessionError::Frame(err)));
        }
        Pending::Subscribe => warn!(event = "hub_subscribe_failed", error = %err),
    }
}

fn log_subscribe_result(result: &Value) {
    let Value::Object(topics) = result else {
        info!(event = "hub_subscribed");
        return;
    };
    for (topic, status) in topics {
        if status.as_str() == Some("ok") {
            info!(event = "hub_subscribed", topic = %topic);
        } else {
            warn!(event = "hub_subscribe_rejected", topic = %topic, status = %status);
        }
    }
}

fn fail_queued(command_rx: &mut mpsc::Receiver<Command>, error: impl Fn() -> SessionError) {
    while let Ok(Command::Call { method, reply, .. }) = command_rx.try_recv() {
        debug!(event = "hub_call_dropped", method = %method);
        let _ = reply.send(Err(error()));
    }
}

fn next_backoff(current: Duration) -> Duration {
    let next = current + current;
    if next > MAX_RECONNECT_BACKOFF {
        MAX_RECONNECT_BACKOFF
    } else {
        next
    }
}
