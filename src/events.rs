/// file: src/events.rs
/// description: Event system to decouple the chat transport from whatever renders it
use crate::{client_state::ConnectionState, types::ChatEvent};
use std::time::Duration;
use tokio::sync::mpsc;

/// Everything the client reports to its consumer, in production order.
///
/// `Message` and `Error` are the consumer's message and error callbacks; the
/// remaining variants describe connection lifecycle.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    Connecting { url: String },
    Authenticating { connection_id: String },
    Connected { connection_id: String, message: Option<String> },
    /// Completed assistant message (`response` or `stream_end`).
    Message(ChatEvent),
    StreamStarted,
    /// Transient partial response: `message` holds the accumulated text under
    /// the sentinel id, `delta` only the newest chunk.
    StreamProgress { message: ChatEvent, delta: String },
    Error(String),
    Reconnecting { attempt: u32, delay: Duration },
    Disconnected { state: ConnectionState },
    Stopped,
}

// Chat traffic is low volume; the bound only guards against a stalled consumer.
const EVENT_CHANNEL_CAPACITY: usize = 1_024;

pub type EventSender = mpsc::Sender<ClientEvent>;
pub type EventReceiver = mpsc::Receiver<ClientEvent>;

pub fn create_event_channel() -> (EventSender, EventReceiver) {
    mpsc::channel(EVENT_CHANNEL_CAPACITY)
}
