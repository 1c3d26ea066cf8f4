//! Device control session: connection lifecycle and the only component
//! allowed to touch the WebSocket transport.
//!
//! Each connect spawns one transport task tagged with a generation number.
//! Every callback the task emits carries that generation; the session
//! discards callbacks from superseded connections, so a late close or
//! message from an old socket can never corrupt the state of a newer one.

use futures_util::{SinkExt, StreamExt};
use pup_core::activity::ActivityLog;
use pup_core::wire::{register_message, Command, CommandError};
use std::fmt;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::warn;
use url::Url;

pub const OUTBOUND_QUEUE_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Open,
    Closed,
}

impl SessionState {
    pub fn as_str(self) -> &'static str {
        match self {
            SessionState::Disconnected => "disconnected",
            SessionState::Connecting => "connecting",
            SessionState::Open => "open",
            SessionState::Closed => "closed",
        }
    }

    fn can_connect(self) -> bool {
        matches!(self, SessionState::Disconnected | SessionState::Closed)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raw transport callback, before the generation guard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Opened,
    Message(String),
    Closed { code: Option<u16>, reason: String },
    Error(String),
    ConnectFailed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionEvent {
    pub generation: u64,
    pub event: TransportEvent,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SendError {
    #[error("not connected (session {0})")]
    NotConnected(SessionState),
    #[error(transparent)]
    Invalid(#[from] CommandError),
    #[error("outbound queue full")]
    QueueFull,
}

pub struct Session {
    state: SessionState,
    endpoint: Url,
    client_name: String,
    generation: u64,
    outbound: Option<mpsc::Sender<Message>>,
    event_tx: mpsc::Sender<SessionEvent>,
}

impl Session {
    pub fn new(endpoint: Url, client_name: String, event_tx: mpsc::Sender<SessionEvent>) -> Self {
        Self {
            state: SessionState::Disconnected,
            endpoint,
            client_name,
            generation: 0,
            outbound: None,
            event_tx,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_open(&self) -> bool {
        self.state == SessionState::Open
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Endpoint edits only apply between connections.
    pub fn set_endpoint(&mut self, endpoint: Url, log: &mut ActivityLog) {
        if !self.state.can_connect() {
            log.append(format!(
                "endpoint change ignored while {} (disconnect first)",
                self.state
            ));
            return;
        }
        log.append(format!("endpoint set to {endpoint}"));
        self.endpoint = endpoint;
    }

    /// Opens a new transport. No-op unless disconnected or closed; there is
    /// never more than one live handle per session.
    pub fn connect(&mut self, log: &mut ActivityLog) {
        if !self.state.can_connect() {
            log.append(format!("connect ignored (session already {})", self.state));
            return;
        }
        self.generation += 1;
        let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_QUEUE_CAPACITY);
        self.outbound = Some(outbound_tx);
        self.state = SessionState::Connecting;
        log.append(format!("connecting to {}", self.endpoint));
        tokio::spawn(transport_loop(
            self.generation,
            self.endpoint.clone(),
            register_message(&self.client_name),
            outbound_rx,
            self.event_tx.clone(),
        ));
    }

    /// Drops the transport handle and requests close. Idempotent; the state
    /// returns to disconnected immediately so a fresh connect is possible
    /// while the old socket finishes shutting down. The generation bump
    /// invalidates the aborted connection: any callback it still delivers
    /// (late open, buffered messages, the close handshake) is stale.
    pub fn disconnect(&mut self, log: &mut ActivityLog) {
        if self.outbound.take().is_none() {
            return;
        }
        self.generation += 1;
        self.state = SessionState::Disconnected;
        log.append("disconnect requested");
    }

    /// Guarded send: commands go out only while the session is open, and
    /// are never queued for later delivery. Every rejection produces one
    /// log entry naming the reason.
    pub fn send(&mut self, command: &Command, log: &mut ActivityLog) -> Result<(), SendError> {
        if self.state != SessionState::Open {
            let err = SendError::NotConnected(self.state);
            log.append(format!("send rejected ({}): {err}", command.label()));
            return Err(err);
        }
        if let Err(invalid) = command.validate() {
            log.append(format!("send rejected ({}): {invalid}", command.label()));
            return Err(SendError::Invalid(invalid));
        }
        let Some(outbound) = &self.outbound else {
            let err = SendError::NotConnected(self.state);
            log.append(format!("send rejected ({}): {err}", command.label()));
            return Err(err);
        };
        if outbound.try_send(Message::Text(command.encode())).is_err() {
            log.append(format!(
                "send rejected ({}): outbound queue full",
                command.label()
            ));
            return Err(SendError::QueueFull);
        }
        log.append(format!("sent {}", command.label()));
        Ok(())
    }

    /// Applies one transport callback. Returns the raw text of an inbound
    /// message so the caller can route it to the decoder; message arrival
    /// never changes connection state. Callbacks from superseded
    /// connections are dropped.
    pub fn handle_event(&mut self, event: SessionEvent, log: &mut ActivityLog) -> Option<String> {
        if event.generation != self.generation {
            return None;
        }
        match event.event {
            TransportEvent::Opened => {
                self.state = SessionState::Open;
                log.append(format!("connected to {}", self.endpoint));
                None
            }
            TransportEvent::Message(raw) => Some(raw),
            TransportEvent::Closed { code, reason } => {
                self.outbound = None;
                self.state = SessionState::Closed;
                let code = code.map_or_else(|| "none".to_string(), |c| c.to_string());
                let reason = if reason.is_empty() {
                    "no reason given".to_string()
                } else {
                    reason
                };
                log.append(format!("connection closed (code {code}): {reason}"));
                None
            }
            TransportEvent::Error(detail) => {
                // close, not error, is authoritative for state
                log.append(format!("transport error: {detail}"));
                None
            }
            TransportEvent::ConnectFailed(detail) => {
                self.outbound = None;
                self.state = SessionState::Disconnected;
                log.append(format!("connect failed: {detail}"));
                None
            }
        }
    }
}

async fn transport_loop(
    generation: u64,
    endpoint: Url,
    register: String,
    mut outbound_rx: mpsc::Receiver<Message>,
    event_tx: mpsc::Sender<SessionEvent>,
) {
    let emit = |event: TransportEvent| {
        let event_tx = event_tx.clone();
        async move {
            let _ = event_tx.send(SessionEvent { generation, event }).await;
        }
    };

    let (mut ws, _) = match connect_async(endpoint).await {
        Ok(value) => value,
        Err(err) => {
            warn!("ws_connect_error: {err}");
            emit(TransportEvent::ConnectFailed(err.to_string())).await;
            return;
        }
    };

    if ws.send(Message::Text(register)).await.is_err() {
        warn!("ws_register_error");
        let _ = ws.close(None).await;
        emit(TransportEvent::Closed {
            code: None,
            reason: "registration send failed".to_string(),
        })
        .await;
        return;
    }
    emit(TransportEvent::Opened).await;

    let mut outbound_open = true;
    loop {
        tokio::select! {
            maybe_msg = ws.next() => {
                match maybe_msg {
                    Some(Ok(Message::Text(text))) => {
                        emit(TransportEvent::Message(text)).await;
                    }
                    Some(Ok(Message::Close(frame))) => {
                        let (code, reason) = match frame {
                            Some(frame) => (Some(u16::from(frame.code)), frame.reason.to_string()),
                            None => (None, String::new()),
                        };
                        emit(TransportEvent::Closed { code, reason }).await;
                        return;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(err)) => {
                        warn!("ws_read_error: {err}");
                        emit(TransportEvent::Error(err.to_string())).await;
                    }
                    None => {
                        emit(TransportEvent::Closed {
                            code: None,
                            reason: "stream ended".to_string(),
                        })
                        .await;
                        return;
                    }
                }
            }
            maybe_out = outbound_rx.recv(), if outbound_open => {
                match maybe_out {
                    Some(frame) => {
                        if let Err(err) = ws.send(frame).await {
                            warn!("ws_write_error: {err}");
                            emit(TransportEvent::Error(err.to_string())).await;
                        }
                    }
                    None => {
                        // session dropped its handle: ask the peer to close,
                        // then drain until the close handshake completes
                        outbound_open = false;
                        let _ = ws.close(None).await;
                    }
                }
            }
        }
    }
}
