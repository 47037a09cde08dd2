/// file: src/client_state.rs
/// description: Connection state machine for the chat transport, kept apart from socket handling
use crate::config::ReconnectPolicy;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    AwaitingAuth,
    Connected,
    /// Token rejected by the peer. Sticky until the token is replaced.
    AuthFailed,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::AwaitingAuth => "awaiting_auth",
            ConnectionState::Connected => "connected",
            ConnectionState::AuthFailed => "auth_failed",
        }
    }
}

/// Why a `connect()` call did nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    NoToken,
    AuthFailed,
    AlreadyConnecting,
    AlreadyOpen,
    AttemptsExhausted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectDecision {
    Proceed,
    Skip(SkipReason),
}

/// What to do after the transport closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseOutcome {
    Reconnect { attempt: u32, delay: Duration },
    /// Retries used up; the consumer gets the terminal error.
    Exhausted { attempts: u32 },
    StopAuthFailed,
    StopNoToken,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenChange {
    Unchanged,
    Cleared,
    /// A usable token is now set. `should_connect` is true when the previous
    /// token was absent or had been rejected.
    Installed { should_connect: bool },
}

/// Point-in-time view handed to consumers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionStatus {
    pub state: ConnectionState,
    pub is_connected: bool,
    pub is_connecting: bool,
    pub auth_failed: bool,
    pub has_token: bool,
    pub reconnect_attempts: u32,
    pub connection_id: Option<String>,
    pub total_messages_received: u64,
    pub parse_errors: u64,
    /// Time since the last inbound frame on any connection.
    pub idle_for: Option<Duration>,
}

#[derive(Debug)]
pub struct ClientState {
    state: ConnectionState,
    token: Option<String>,
    reconnect_attempts: u32,
    streaming_buffer: String,
    pub connection_id: Option<String>,
    pub last_message_time: Option<Instant>,
    pub awaiting_pong_since: Option<Instant>,
    pub total_messages_received: u64,
    pub parse_errors: u64,
}

impl ClientState {
    pub fn new(token: Option<String>) -> Self {
        Self {
            state: ConnectionState::Disconnected,
            token: token.filter(|t| !t.is_empty()),
            reconnect_attempts: 0,
            streaming_buffer: String::new(),
            connection_id: None,
            last_message_time: None,
            awaiting_pong_since: None,
            total_messages_received: 0,
            parse_errors: 0,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    pub fn reconnect_attempts(&self) -> u32 {
        self.reconnect_attempts
    }

    pub fn streaming_buffer(&self) -> &str {
        &self.streaming_buffer
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    pub fn is_connecting(&self) -> bool {
        matches!(
            self.state,
            ConnectionState::Connecting | ConnectionState::AwaitingAuth
        )
    }

    pub fn auth_failed(&self) -> bool {
        self.state == ConnectionState::AuthFailed
    }

    /// True while a transport is open, authenticated or not.
    pub fn transport_open(&self) -> bool {
        matches!(
            self.state,
            ConnectionState::AwaitingAuth | ConnectionState::Connected
        )
    }

    pub fn can_send(&self) -> bool {
        self.is_connected()
    }

    pub fn status(&self) -> ConnectionStatus {
        ConnectionStatus {
            state: self.state,
            is_connected: self.is_connected(),
            is_connecting: self.is_connecting(),
            auth_failed: self.auth_failed(),
            has_token: self.token.is_some(),
            reconnect_attempts: self.reconnect_attempts,
            connection_id: self.connection_id.clone(),
            total_messages_received: self.total_messages_received,
            parse_errors: self.parse_errors,
            idle_for: self.last_message_time.map(|at| at.elapsed()),
        }
    }

    /// Gate for `connect()`. On `Proceed` the state is already `Connecting`.
    pub fn begin_connect(&mut self, policy: &ReconnectPolicy) -> ConnectDecision {
        let skip = match self.state {
            ConnectionState::AuthFailed => Some(SkipReason::AuthFailed),
            ConnectionState::Connecting => Some(SkipReason::AlreadyConnecting),
            ConnectionState::AwaitingAuth | ConnectionState::Connected => {
                Some(SkipReason::AlreadyOpen)
            }
            ConnectionState::Disconnected if self.token.is_none() => Some(SkipReason::NoToken),
            ConnectionState::Disconnected if self.reconnect_attempts >= policy.max_attempts => {
                Some(SkipReason::AttemptsExhausted)
            }
            ConnectionState::Disconnected => None,
        };

        match skip {
            Some(reason) => ConnectDecision::Skip(reason),
            None => {
                self.state = ConnectionState::Connecting;
                ConnectDecision::Proceed
            }
        }
    }

    /// Lifts the exhausted-retries lockout for an explicit `reconnect()`.
    pub fn reset_exhausted_attempts(&mut self, policy: &ReconnectPolicy) -> bool {
        if self.reconnect_attempts >= policy.max_attempts {
            self.reconnect_attempts = 0;
            return true;
        }
        false
    }

    /// Transport is up: returns the token to authenticate with.
    ///
    /// `None` means the open raced a `disconnect()` or a cleared token and the
    /// socket should be dropped.
    pub fn transport_opened(&mut self) -> Option<String> {
        if self.state != ConnectionState::Connecting {
            return None;
        }
        let token = self.token.clone()?;
        self.state = ConnectionState::AwaitingAuth;
        self.connection_id = Some(uuid::Uuid::new_v4().to_string());
        self.last_message_time = Some(Instant::now());
        self.awaiting_pong_since = None;
        Some(token)
    }

    /// Peer accepted the token.
    pub fn authenticated(&mut self) {
        self.reconnect_attempts = 0;
        if self.state != ConnectionState::AuthFailed {
            self.state = ConnectionState::Connected;
        }
    }

    /// Peer reported an error that matched the auth-failure predicate.
    pub fn auth_rejected(&mut self) {
        self.state = ConnectionState::AuthFailed;
    }

    pub fn transport_closed(&mut self, policy: &ReconnectPolicy) -> CloseOutcome {
        self.connection_id = None;
        self.awaiting_pong_since = None;
        self.streaming_buffer.clear();

        if self.state == ConnectionState::AuthFailed {
            return CloseOutcome::StopAuthFailed;
        }
        self.state = ConnectionState::Disconnected;
        if self.token.is_none() {
            return CloseOutcome::StopNoToken;
        }

        self.reconnect_attempts = (self.reconnect_attempts + 1).min(policy.max_attempts);
        if self.reconnect_attempts < policy.max_attempts {
            CloseOutcome::Reconnect {
                attempt: self.reconnect_attempts,
                delay: policy.delay_for(self.reconnect_attempts),
            }
        } else {
            CloseOutcome::Exhausted {
                attempts: self.reconnect_attempts,
            }
        }
    }

    /// Explicit shutdown of the live connection. An auth failure stays in force.
    pub fn disconnected(&mut self) {
        self.connection_id = None;
        self.awaiting_pong_since = None;
        self.streaming_buffer.clear();
        if self.state != ConnectionState::AuthFailed {
            self.state = ConnectionState::Disconnected;
        }
    }

    pub fn replace_token(&mut self, token: Option<String>) -> TokenChange {
        let token = token.filter(|t| !t.is_empty());
        if token == self.token {
            return TokenChange::Unchanged;
        }

        let Some(token) = token else {
            self.token = None;
            return TokenChange::Cleared;
        };

        let was_absent = self.token.replace(token).is_none();
        let was_rejected = self.state == ConnectionState::AuthFailed;
        if was_rejected {
            self.state = ConnectionState::Disconnected;
            self.reconnect_attempts = 0;
        }
        TokenChange::Installed {
            should_connect: was_absent || was_rejected,
        }
    }

    pub fn record_message(&mut self) {
        self.last_message_time = Some(Instant::now());
        self.total_messages_received += 1;
    }

    pub fn record_parse_error(&mut self) {
        self.parse_errors += 1;
    }

    pub fn record_ping_sent(&mut self) {
        if self.awaiting_pong_since.is_none() {
            self.awaiting_pong_since = Some(Instant::now());
        }
    }

    pub fn record_pong(&mut self) {
        self.awaiting_pong_since = None;
    }

    pub fn pong_overdue(&self, timeout: Duration) -> bool {
        self.awaiting_pong_since
            .is_some_and(|since| since.elapsed() >= timeout)
    }

    pub fn begin_stream(&mut self) {
        self.streaming_buffer.clear();
    }

    /// Appends a chunk and returns everything accumulated so far.
    pub fn append_chunk(&mut self, chunk: &str) -> &str {
        self.streaming_buffer.push_str(chunk);
        &self.streaming_buffer
    }

    /// Takes the accumulated response, leaving the buffer empty.
    pub fn finish_stream(&mut self) -> String {
        std::mem::take(&mut self.streaming_buffer)
    }
}

pub type SharedClientState = Arc<Mutex<ClientState>>;

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> ReconnectPolicy {
        ReconnectPolicy::default()
    }

    fn connected_state() -> ClientState {
        let mut state = ClientState::new(Some("token".into()));
        assert_eq!(state.begin_connect(&policy()), ConnectDecision::Proceed);
        assert_eq!(state.transport_opened().as_deref(), Some("token"));
        state.authenticated();
        state
    }

    #[test]
    fn handshake_reaches_connected_with_attempts_reset() {
        let mut state = ClientState::new(Some("token".into()));
        assert_eq!(state.begin_connect(&policy()), ConnectDecision::Proceed);
        assert_eq!(state.state(), ConnectionState::Connecting);
        assert!(state.is_connecting());

        assert_eq!(state.transport_opened().as_deref(), Some("token"));
        assert_eq!(state.state(), ConnectionState::AwaitingAuth);
        assert!(state.transport_open());
        assert!(!state.can_send());

        state.authenticated();
        assert!(state.is_connected());
        assert_eq!(state.reconnect_attempts(), 0);
        assert!(state.connection_id.is_some());
    }

    #[test]
    fn connect_is_a_no_op_while_connecting_or_open() {
        let mut state = ClientState::new(Some("token".into()));
        state.begin_connect(&policy());
        assert_eq!(
            state.begin_connect(&policy()),
            ConnectDecision::Skip(SkipReason::AlreadyConnecting)
        );
        state.transport_opened();
        assert_eq!(
            state.begin_connect(&policy()),
            ConnectDecision::Skip(SkipReason::AlreadyOpen)
        );

        let mut state = connected_state();
        state.transport_closed(&policy());
        state.begin_connect(&policy());
        state.transport_opened();
        // attempts survive a skipped connect
        assert_eq!(state.reconnect_attempts(), 1);
        assert_eq!(
            state.begin_connect(&policy()),
            ConnectDecision::Skip(SkipReason::AlreadyOpen)
        );
        assert_eq!(state.reconnect_attempts(), 1);
    }

    #[test]
    fn connect_requires_token() {
        let mut state = ClientState::new(None);
        assert_eq!(
            state.begin_connect(&policy()),
            ConnectDecision::Skip(SkipReason::NoToken)
        );
        let mut state = ClientState::new(Some(String::new()));
        assert_eq!(
            state.begin_connect(&policy()),
            ConnectDecision::Skip(SkipReason::NoToken)
        );
        assert_eq!(state.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn closes_schedule_linear_backoff_until_exhausted() {
        let mut state = connected_state();
        assert_eq!(
            state.transport_closed(&policy()),
            CloseOutcome::Reconnect {
                attempt: 1,
                delay: Duration::from_millis(3000)
            }
        );
        assert_eq!(state.state(), ConnectionState::Disconnected);

        state.begin_connect(&policy());
        assert_eq!(
            state.transport_closed(&policy()),
            CloseOutcome::Reconnect {
                attempt: 2,
                delay: Duration::from_millis(6000)
            }
        );

        state.begin_connect(&policy());
        assert_eq!(
            state.transport_closed(&policy()),
            CloseOutcome::Exhausted { attempts: 3 }
        );
        assert_eq!(
            state.begin_connect(&policy()),
            ConnectDecision::Skip(SkipReason::AttemptsExhausted)
        );

        // further closes never push the counter past the bound
        assert_eq!(
            state.transport_closed(&policy()),
            CloseOutcome::Exhausted { attempts: 3 }
        );
        assert_eq!(state.reconnect_attempts(), 3);
    }

    #[test]
    fn delay_is_capped_for_large_policies() {
        let policy = ReconnectPolicy {
            max_attempts: 10,
            ..ReconnectPolicy::default()
        };
        let mut state = ClientState::new(Some("token".into()));
        let mut delays = Vec::new();
        for _ in 0..5 {
            state.begin_connect(&policy);
            if let CloseOutcome::Reconnect { delay, .. } = state.transport_closed(&policy) {
                delays.push(delay.as_millis());
            }
        }
        assert_eq!(delays, vec![3000, 6000, 9000, 10_000, 10_000]);
    }

    #[test]
    fn authenticated_connection_resets_attempts() {
        let mut state = connected_state();
        state.transport_closed(&policy());
        state.begin_connect(&policy());
        state.transport_closed(&policy());
        assert_eq!(state.reconnect_attempts(), 2);

        state.begin_connect(&policy());
        state.transport_opened();
        state.authenticated();
        assert_eq!(state.reconnect_attempts(), 0);
    }

    #[test]
    fn explicit_reconnect_lifts_exhaustion_only() {
        let mut state = connected_state();
        assert!(!state.reset_exhausted_attempts(&policy()));
        for _ in 0..3 {
            state.transport_closed(&policy());
        }
        assert!(state.reset_exhausted_attempts(&policy()));
        assert_eq!(state.begin_connect(&policy()), ConnectDecision::Proceed);
    }

    #[test]
    fn auth_failure_blocks_reconnect_until_token_replaced() {
        let mut state = connected_state();
        state.auth_rejected();
        assert!(state.auth_failed());
        assert_eq!(state.transport_closed(&policy()), CloseOutcome::StopAuthFailed);
        assert!(state.auth_failed());
        assert_eq!(
            state.begin_connect(&policy()),
            ConnectDecision::Skip(SkipReason::AuthFailed)
        );

        // explicit reconnect and disconnect do not lift the lockout
        state.reset_exhausted_attempts(&policy());
        state.disconnected();
        assert!(state.auth_failed());

        assert_eq!(
            state.replace_token(Some("token".into())),
            TokenChange::Unchanged
        );
        assert!(state.auth_failed());

        assert_eq!(
            state.replace_token(Some("fresh".into())),
            TokenChange::Installed {
                should_connect: true
            }
        );
        assert_eq!(state.state(), ConnectionState::Disconnected);
        assert_eq!(state.reconnect_attempts(), 0);
        assert_eq!(state.begin_connect(&policy()), ConnectDecision::Proceed);
    }

    #[test]
    fn token_changes_report_whether_to_connect() {
        let mut state = ClientState::new(None);
        assert_eq!(
            state.replace_token(Some("a".into())),
            TokenChange::Installed {
                should_connect: true
            }
        );
        assert_eq!(
            state.replace_token(Some("b".into())),
            TokenChange::Installed {
                should_connect: false
            }
        );
        assert_eq!(state.replace_token(None), TokenChange::Cleared);
        assert_eq!(state.replace_token(Some(String::new())), TokenChange::Unchanged);
        assert!(!state.status().has_token);
    }

    #[test]
    fn close_without_token_stops() {
        let mut state = connected_state();
        state.replace_token(None);
        assert_eq!(state.transport_closed(&policy()), CloseOutcome::StopNoToken);
        assert_eq!(state.reconnect_attempts(), 0);
    }

    #[test]
    fn open_after_disconnect_is_discarded() {
        let mut state = ClientState::new(Some("token".into()));
        state.begin_connect(&policy());
        state.disconnected();
        assert_eq!(state.transport_opened(), None);
        assert_eq!(state.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn disconnect_twice_stays_disconnected() {
        let mut state = connected_state();
        state.disconnected();
        state.disconnected();
        assert_eq!(state.state(), ConnectionState::Disconnected);
        assert!(state.connection_id.is_none());
    }

    #[test]
    fn stream_buffer_reconstructs_and_empties() {
        let mut state = connected_state();
        state.begin_stream();
        assert_eq!(state.append_chunk("Hel"), "Hel");
        assert_eq!(state.append_chunk("lo"), "Hello");
        assert_eq!(state.finish_stream(), "Hello");
        assert!(state.streaming_buffer().is_empty());
    }

    #[test]
    fn stream_start_discards_stale_partial() {
        let mut state = connected_state();
        state.append_chunk("left over");
        state.begin_stream();
        assert!(state.streaming_buffer().is_empty());
    }

    #[test]
    fn pong_bookkeeping() {
        let mut state = connected_state();
        assert!(!state.pong_overdue(Duration::ZERO));
        state.record_ping_sent();
        assert!(state.pong_overdue(Duration::ZERO));
        assert!(!state.pong_overdue(Duration::from_secs(3600)));
        state.record_pong();
        assert!(!state.pong_overdue(Duration::ZERO));
    }

    #[test]
    fn status_reports_parse_errors_and_idle_time() {
        let mut state = connected_state();
        let status = state.status();
        assert_eq!(status.parse_errors, 0);
        assert_eq!(status.idle_for, None);

        state.record_message();
        state.record_parse_error();
        let status = state.status();
        assert_eq!(status.total_messages_received, 1);
        assert_eq!(status.parse_errors, 1);
        assert!(status.idle_for.is_some_and(|idle| idle < Duration::from_secs(60)));
    }
}
