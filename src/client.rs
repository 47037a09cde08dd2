// file: src/client.rs
// description: chat transport client: authenticated WebSocket with bounded reconnects, heartbeat and stream reassembly

use crate::{
    client_state::{
        ClientState, CloseOutcome, ConnectDecision, ConnectionStatus, SharedClientState,
        TokenChange,
    },
    config::Config,
    error::{ChatClientError, is_auth_failure},
    events::{ClientEvent, EventReceiver, EventSender, create_event_channel},
    monitoring::{
        AUTH_FAILURE_COUNTER, CONNECTED_GAUGE, MESSAGES_RECEIVED_COUNTER, MESSAGES_SENT_COUNTER,
        PARSE_ERROR_COUNTER, RECONNECT_COUNTER,
    },
    transport::{self, WsStream},
    types::{ChatEvent, InboundMessage, OutboundMessage},
};
use futures_util::{SinkExt, StreamExt};
use std::{future::Future, pin::Pin, sync::Arc, time::Duration};
use tokio::{
    sync::{Mutex, mpsc},
    task::JoinHandle,
    time::{Instant, MissedTickBehavior, Sleep, interval_at, sleep},
};
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tracing::{debug, error, info, trace, warn};
use url::Url;

/// Sent to the consumer on any transport-level failure.
pub const CONNECTION_ERROR_MESSAGE: &str = "Connection error. Please check your network connection.";

/// Sent once automatic reconnection has given up.
pub const RETRIES_EXHAUSTED_MESSAGE: &str =
    "Unable to connect to chat server. Please refresh the page to try again.";

const CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

type ConnectFuture = Pin<Box<dyn Future<Output = Result<WsStream, ChatClientError>> + Send>>;

enum Command {
    Connect,
    Reconnect,
    Disconnect,
    Send(OutboundMessage),
    Ping,
    SetToken(Option<String>),
    Shutdown,
}

impl Command {
    // never log payloads: they carry message text and tokens
    fn name(&self) -> &'static str {
        match self {
            Command::Connect => "connect",
            Command::Reconnect => "reconnect",
            Command::Disconnect => "disconnect",
            Command::Send(_) => "send",
            Command::Ping => "ping",
            Command::SetToken(_) => "set_token",
            Command::Shutdown => "shutdown",
        }
    }
}

/// Owns the socket, the timers and the in-flight connect. Runs as a single
/// task; every callback-like reaction happens on that task, in order.
pub struct ChatTransportClient {
    pub config: Arc<Config>,
    endpoint: Url,
    event_sender: EventSender,
    pub state: SharedClientState,
    commands: mpsc::UnboundedReceiver<Command>,
    socket: Option<WsStream>,
    connecting: Option<ConnectFuture>,
    pending_connect: Option<Pin<Box<Sleep>>>,
}

impl ChatTransportClient {
    pub fn new(
        config: Arc<Config>,
        token: Option<String>,
        event_sender: EventSender,
    ) -> Result<(Self, ChatClientHandle), ChatClientError> {
        config.validate()?;
        let endpoint = config.endpoint()?;
        let state: SharedClientState = Arc::new(Mutex::new(ClientState::new(token)));
        let (command_tx, command_rx) = mpsc::unbounded_channel();

        let client = Self {
            config,
            endpoint,
            event_sender,
            state: Arc::clone(&state),
            commands: command_rx,
            socket: None,
            connecting: None,
            pending_connect: None,
        };
        let handle = ChatClientHandle {
            commands: command_tx,
            state,
        };
        Ok((client, handle))
    }

    /// Builds the client and runs it on a new task. Must be called inside a
    /// tokio runtime.
    pub fn spawn(
        config: Arc<Config>,
        token: Option<String>,
    ) -> Result<(ChatClientHandle, EventReceiver, JoinHandle<()>), ChatClientError> {
        let (event_sender, event_receiver) = create_event_channel();
        let (client, handle) = Self::new(config, token, event_sender)?;
        let task = tokio::spawn(client.run());
        Ok((handle, event_receiver, task))
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Event loop. Returns after `shutdown()` or once every handle is dropped.
    pub async fn run(mut self) {
        info!(endpoint = %self.endpoint, "Chat client started");

        let period = self.config.heartbeat.interval;
        let mut heartbeat = interval_at(Instant::now() + period, period);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let has_token = self.state.lock().await.token().is_some();
        if has_token {
            self.schedule_connect(self.config.session.token_settle_delay);
        }

        loop {
            tokio::select! {
                command = self.commands.recv() => {
                    let Some(command) = command else {
                        debug!("All client handles dropped");
                        break;
                    };
                    if !self.handle_command(command).await {
                        break;
                    }
                }
                result = poll_connecting(&mut self.connecting) => {
                    self.connecting = None;
                    self.handle_connect_result(result).await;
                }
                frame = next_frame(&mut self.socket) => {
                    self.handle_frame(frame).await;
                }
                () = wait_pending(&mut self.pending_connect) => {
                    self.pending_connect = None;
                    self.connect().await;
                }
                _ = heartbeat.tick() => {
                    self.heartbeat_tick().await;
                }
            }
        }

        self.teardown().await;
        let _ = self.send_event(ClientEvent::Stopped).await;
        info!("Chat client stopped");
    }

    async fn handle_command(&mut self, command: Command) -> bool {
        trace!(command = command.name(), "Handling client command");
        match command {
            Command::Connect => self.connect().await,
            Command::Reconnect => {
                let lifted = self
                    .state
                    .lock()
                    .await
                    .reset_exhausted_attempts(&self.config.reconnect);
                if lifted {
                    info!("Manual reconnect requested after retries were exhausted");
                }
                self.connect().await;
            }
            Command::Disconnect => self.disconnect().await,
            Command::Send(message) => {
                if let Err(e) = self.write(&message).await {
                    warn!(kind = message.kind(), error = %e, "Dropping outbound chat message");
                    if self.socket.is_some() {
                        self.fail_transport().await;
                    }
                }
            }
            Command::Ping => self.send_ping().await,
            Command::SetToken(token) => self.set_token(token).await,
            Command::Shutdown => return false,
        }
        true
    }

    async fn connect(&mut self) {
        let decision = self
            .state
            .lock()
            .await
            .begin_connect(&self.config.reconnect);

        if let ConnectDecision::Skip(reason) = decision {
            debug!(?reason, "Connect skipped");
            return;
        }

        // a connect only proceeds from Disconnected; drop anything left over
        self.pending_connect = None;
        self.connecting = None;
        self.close_socket().await;

        info!(url = %self.endpoint, "Connecting to chat server");
        let _ = self
            .send_event(ClientEvent::Connecting {
                url: self.endpoint.to_string(),
            })
            .await;

        let endpoint = self.endpoint.clone();
        let timeout = self.config.websocket.connect_timeout;
        self.connecting = Some(Box::pin(async move {
            transport::connect(&endpoint, timeout).await
        }));
    }

    async fn handle_connect_result(&mut self, result: Result<WsStream, ChatClientError>) {
        let ws = match result {
            Ok(ws) => ws,
            Err(e) => {
                warn!(error = %e, url = %self.endpoint, "Chat connection failed");
                let _ = self
                    .send_event(ClientEvent::Error(CONNECTION_ERROR_MESSAGE.to_string()))
                    .await;
                self.on_transport_closed().await;
                return;
            }
        };

        let (token, connection_id) = {
            let mut state = self.state.lock().await;
            match state.transport_opened() {
                Some(token) => (token, state.connection_id.clone().unwrap_or_default()),
                None => {
                    state.disconnected();
                    drop(state);
                    debug!("Transport opened without a usable token; closing it");
                    self.socket = Some(ws);
                    self.close_socket().await;
                    return;
                }
            }
        };

        self.socket = Some(ws);
        let _ = self
            .send_event(ClientEvent::Authenticating {
                connection_id: connection_id.clone(),
            })
            .await;

        debug!(connection_id = %connection_id, "Sending auth handshake");
        if let Err(e) = self.write(&OutboundMessage::auth(&token)).await {
            warn!(error = %e, "Failed to send auth handshake");
            self.fail_transport().await;
        }
    }

    async fn handle_frame(&mut self, frame: Option<Result<Message, WsError>>) {
        match frame {
            Some(Ok(Message::Text(text))) => {
                trace!("Received text frame: {}", text);
                self.handle_text(&text).await;
            }
            Some(Ok(Message::Binary(data))) => {
                debug!("Received binary frame of {} bytes", data.len());
                warn!("Binary frames are not part of the chat protocol");
                self.state.lock().await.record_parse_error();
                PARSE_ERROR_COUNTER.increment(1);
            }
            Some(Ok(Message::Ping(_))) => {
                // tungstenite queues the pong itself
                trace!("Received transport ping");
            }
            Some(Ok(Message::Pong(_))) => {
                trace!("Received transport pong");
            }
            Some(Ok(Message::Close(frame))) => {
                info!(?frame, "Chat server closed the connection");
                self.on_transport_closed().await;
            }
            Some(Ok(Message::Frame(_))) => {
                debug!("Received raw frame");
            }
            Some(Err(e)) => {
                warn!(error = %e, "Chat WebSocket error");
                let _ = self
                    .send_event(ClientEvent::Error(CONNECTION_ERROR_MESSAGE.to_string()))
                    .await;
                self.on_transport_closed().await;
            }
            None => {
                info!("Chat WebSocket stream ended");
                self.on_transport_closed().await;
            }
        }
    }

    async fn handle_text(&mut self, text: &str) {
        self.state.lock().await.record_message();
        MESSAGES_RECEIVED_COUNTER.increment(1);

        let message = match InboundMessage::parse(text) {
            Ok(InboundMessage::Unknown) => {
                debug!(frame = %preview(text), "Ignoring chat frame with unrecognised type");
                return;
            }
            Ok(message) => message,
            Err(e) => {
                warn!(error = %e, frame = %preview(text), "Discarding malformed chat frame");
                self.state.lock().await.record_parse_error();
                PARSE_ERROR_COUNTER.increment(1);
                return;
            }
        };

        self.handle_inbound(message).await;
    }

    async fn handle_inbound(&mut self, message: InboundMessage) {
        match message {
            InboundMessage::Connected { message } => {
                let connection_id = {
                    let mut state = self.state.lock().await;
                    state.authenticated();
                    state.connection_id.clone().unwrap_or_default()
                };
                CONNECTED_GAUGE.set(1.0);
                info!(connection_id = %connection_id, "Chat connection authenticated");
                let _ = self
                    .send_event(ClientEvent::Connected {
                        connection_id,
                        message,
                    })
                    .await;
            }

            InboundMessage::Response {
                response,
                source,
                related_questions,
            } => {
                debug!(len = response.len(), source = ?source, "Assistant response received");
                let event = ChatEvent::assistant(response, source, related_questions);
                let _ = self.send_event(ClientEvent::Message(event)).await;
            }

            InboundMessage::StreamStart => {
                debug!("Assistant stream started");
                self.state.lock().await.begin_stream();
                let _ = self.send_event(ClientEvent::StreamStarted).await;
            }

            InboundMessage::StreamChunk { chunk } => {
                let content = self.state.lock().await.append_chunk(&chunk).to_string();
                trace!(chunk_len = chunk.len(), total_len = content.len(), "Stream chunk");
                let _ = self
                    .send_event(ClientEvent::StreamProgress {
                        message: ChatEvent::streaming(content),
                        delta: chunk,
                    })
                    .await;
            }

            InboundMessage::StreamEnd { related_questions } => {
                let content = self.state.lock().await.finish_stream();
                debug!(len = content.len(), "Assistant stream finished");
                let event = ChatEvent::assistant(content, None, related_questions);
                let _ = self.send_event(ClientEvent::Message(event)).await;
            }

            InboundMessage::Error { error } => {
                let text = InboundMessage::error_text(error.as_deref());
                if is_auth_failure(&text) {
                    self.state.lock().await.auth_rejected();
                    AUTH_FAILURE_COUNTER.increment(1);
                    CONNECTED_GAUGE.set(0.0);
                    warn!(error = %text, "Chat authentication rejected; automatic reconnects disabled");
                } else {
                    warn!(error = %text, "Chat server reported an error");
                }
                let _ = self.send_event(ClientEvent::Error(text)).await;
            }

            InboundMessage::Pong => {
                trace!("Heartbeat acknowledged");
                self.state.lock().await.record_pong();
            }

            InboundMessage::Unknown => {}
        }
    }

    async fn on_transport_closed(&mut self) {
        self.socket = None;
        self.connecting = None;
        CONNECTED_GAUGE.set(0.0);

        let (outcome, state) = {
            let mut state = self.state.lock().await;
            let outcome = state.transport_closed(&self.config.reconnect);
            (outcome, state.state())
        };

        let _ = self.send_event(ClientEvent::Disconnected { state }).await;

        match outcome {
            CloseOutcome::Reconnect { attempt, delay } => {
                RECONNECT_COUNTER.increment(1);
                warn!(
                    attempt,
                    max_attempts = self.config.reconnect.max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    "Chat connection lost; scheduling reconnect"
                );
                self.schedule_connect(delay);
                let _ = self
                    .send_event(ClientEvent::Reconnecting { attempt, delay })
                    .await;
            }
            CloseOutcome::Exhausted { attempts } => {
                error!(attempts, "Maximum reconnection attempts reached");
                let _ = self
                    .send_event(ClientEvent::Error(RETRIES_EXHAUSTED_MESSAGE.to_string()))
                    .await;
            }
            CloseOutcome::StopAuthFailed => {
                info!("Not reconnecting: authentication failed");
            }
            CloseOutcome::StopNoToken => {
                info!("Not reconnecting: no token");
            }
        }
    }

    /// Closes a socket that misbehaved and runs the normal close path.
    async fn fail_transport(&mut self) {
        let _ = self
            .send_event(ClientEvent::Error(CONNECTION_ERROR_MESSAGE.to_string()))
            .await;
        self.close_socket().await;
        self.on_transport_closed().await;
    }

    async fn disconnect(&mut self) {
        let was_active =
            self.socket.is_some() || self.connecting.is_some() || self.pending_connect.is_some();

        self.pending_connect = None;
        self.connecting = None;
        self.close_socket().await;
        CONNECTED_GAUGE.set(0.0);

        let state = {
            let mut state = self.state.lock().await;
            state.disconnected();
            state.state()
        };

        if was_active {
            info!("Chat client disconnected");
            let _ = self.send_event(ClientEvent::Disconnected { state }).await;
        }
    }

    async fn teardown(&mut self) {
        self.pending_connect = None;
        self.connecting = None;
        self.close_socket().await;
        self.state.lock().await.disconnected();
        CONNECTED_GAUGE.set(0.0);
    }

    async fn close_socket(&mut self) {
        if let Some(mut ws) = self.socket.take() {
            match tokio::time::timeout(CLOSE_TIMEOUT, ws.close(None)).await {
                Ok(Ok(())) => debug!("Chat socket closed"),
                Ok(Err(e)) => debug!(error = %e, "Chat socket close failed"),
                Err(_) => debug!("Chat socket close timed out"),
            }
        }
    }

    async fn set_token(&mut self, token: Option<String>) {
        let (was_rejected, change) = {
            let mut state = self.state.lock().await;
            let was_rejected = state.auth_failed();
            (was_rejected, state.replace_token(token))
        };

        // a rejected socket left open would later close into the backoff path
        if was_rejected && matches!(change, TokenChange::Installed { .. }) {
            self.connecting = None;
            self.close_socket().await;
        }

        match change {
            TokenChange::Installed {
                should_connect: true,
            } => {
                info!("Chat token installed; connecting shortly");
                self.schedule_connect(self.config.session.token_settle_delay);
            }
            TokenChange::Installed {
                should_connect: false,
            } => debug!("Chat token replaced"),
            TokenChange::Cleared => info!("Chat token cleared"),
            TokenChange::Unchanged => trace!("Chat token unchanged"),
        }
    }

    async fn heartbeat_tick(&mut self) {
        let (open, overdue) = {
            let state = self.state.lock().await;
            let overdue = self
                .config
                .heartbeat
                .pong_timeout
                .is_some_and(|timeout| state.pong_overdue(timeout));
            (state.transport_open() && self.socket.is_some(), overdue)
        };

        if open && overdue {
            warn!("Heartbeat went unanswered; dropping chat connection");
            self.fail_transport().await;
            return;
        }
        if open {
            self.send_ping().await;
        }
    }

    async fn send_ping(&mut self) {
        let open = self.state.lock().await.transport_open();
        if !open || self.socket.is_none() {
            trace!("Skipping ping: transport not open");
            return;
        }
        match self.write(&OutboundMessage::Ping).await {
            Ok(()) => self.state.lock().await.record_ping_sent(),
            Err(e) => {
                warn!(error = %e, "Failed to send heartbeat ping");
                self.fail_transport().await;
            }
        }
    }

    async fn write(&mut self, message: &OutboundMessage) -> Result<(), ChatClientError> {
        let Some(socket) = self.socket.as_mut() else {
            return Err(ChatClientError::NotConnected);
        };
        let payload = message.to_json()?;
        socket.send(Message::Text(payload.into())).await?;

        if matches!(message, OutboundMessage::Message { .. }) {
            MESSAGES_SENT_COUNTER.increment(1);
        }
        trace!(kind = message.kind(), "Sent chat frame");
        Ok(())
    }

    fn schedule_connect(&mut self, delay: Duration) {
        debug!(delay_ms = delay.as_millis() as u64, "Connect scheduled");
        self.pending_connect = Some(Box::pin(sleep(delay)));
    }

    async fn send_event(&mut self, event: ClientEvent) -> Result<(), ChatClientError> {
        self.event_sender
            .send(event)
            .await
            .map_err(|e| ChatClientError::EventSendError(e.to_string()))
    }
}

async fn poll_connecting(
    connecting: &mut Option<ConnectFuture>,
) -> Result<WsStream, ChatClientError> {
    match connecting {
        Some(fut) => fut.as_mut().await,
        None => std::future::pending().await,
    }
}

async fn next_frame(socket: &mut Option<WsStream>) -> Option<Result<Message, WsError>> {
    match socket {
        Some(ws) => ws.next().await,
        None => std::future::pending().await,
    }
}

async fn wait_pending(timer: &mut Option<Pin<Box<Sleep>>>) {
    match timer {
        Some(sleep) => sleep.as_mut().await,
        None => std::future::pending().await,
    }
}

fn preview(text: &str) -> String {
    text.chars().take(100).collect()
}

/// Cloneable front for a running [`ChatTransportClient`].
///
/// Commands are queued to the client task in call order. Dropping the last
/// handle stops the client.
#[derive(Clone)]
pub struct ChatClientHandle {
    commands: mpsc::UnboundedSender<Command>,
    state: SharedClientState,
}

impl ChatClientHandle {
    pub async fn status(&self) -> ConnectionStatus {
        self.state.lock().await.status()
    }

    pub async fn is_connected(&self) -> bool {
        self.state.lock().await.is_connected()
    }

    pub async fn is_connecting(&self) -> bool {
        self.state.lock().await.is_connecting()
    }

    pub async fn auth_failed(&self) -> bool {
        self.state.lock().await.auth_failed()
    }

    pub async fn has_token(&self) -> bool {
        self.state.lock().await.token().is_some()
    }

    /// Queues `text` if the connection is authenticated.
    ///
    /// `true` only means the frame was handed to the transport; there is no
    /// acknowledgment from the peer. Returns `false` and sends nothing otherwise.
    pub async fn send_message(&self, text: &str) -> bool {
        let state = self.state.lock().await;
        if !state.can_send() {
            debug!(state = state.state().as_str(), "Message not sent: chat is not connected");
            return false;
        }
        self.commands
            .send(Command::Send(OutboundMessage::message(text)))
            .is_ok()
    }

    pub fn connect(&self) -> Result<(), ChatClientError> {
        self.command(Command::Connect)
    }

    /// Like [`connect`](Self::connect), but also lifts the lockout left by
    /// exhausted automatic retries.
    pub fn reconnect(&self) -> Result<(), ChatClientError> {
        self.command(Command::Reconnect)
    }

    pub fn disconnect(&self) -> Result<(), ChatClientError> {
        self.command(Command::Disconnect)
    }

    pub fn send_ping(&self) -> Result<(), ChatClientError> {
        self.command(Command::Ping)
    }

    pub fn set_token(&self, token: Option<String>) -> Result<(), ChatClientError> {
        self.command(Command::SetToken(token))
    }

    pub fn shutdown(&self) -> Result<(), ChatClientError> {
        self.command(Command::Shutdown)
    }

    fn command(&self, command: Command) -> Result<(), ChatClientError> {
        self.commands
            .send(command)
            .map_err(|_| ChatClientError::ClientStopped)
    }
}
