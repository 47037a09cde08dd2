/// file: src/types.rs
/// description: wire protocol messages for the chat backend and the chat events handed to consumers
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifier shared by every transient streaming event.
///
/// Consumers overwrite the message carrying this id on each chunk; the final
/// event of a stream gets a fresh id and replaces it.
pub const STREAMING_MESSAGE_ID: &str = "streaming";

const UNKNOWN_SERVER_ERROR: &str = "Unknown server error";

// Client -> server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundMessage {
    Auth { token: String },
    Message { message: String },
    Ping,
}

impl OutboundMessage {
    pub fn auth(token: &str) -> Self {
        Self::Auth {
            token: token.to_string(),
        }
    }

    pub fn message(text: &str) -> Self {
        Self::Message {
            message: text.to_string(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Auth { .. } => "auth",
            Self::Message { .. } => "message",
            Self::Ping => "ping",
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

// Server -> client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundMessage {
    Connected {
        #[serde(default)]
        message: Option<String>,
    },
    Response {
        #[serde(default)]
        response: String,
        #[serde(default)]
        source: Option<String>,
        #[serde(default)]
        related_questions: Option<Vec<String>>,
    },
    StreamStart,
    StreamChunk {
        #[serde(default)]
        chunk: String,
    },
    StreamEnd {
        #[serde(default)]
        related_questions: Option<Vec<String>>,
    },
    Error {
        #[serde(default)]
        error: Option<String>,
    },
    Pong,
    #[serde(other)]
    Unknown,
}

impl InboundMessage {
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// Error text as forwarded to the consumer.
    pub fn error_text(error: Option<&str>) -> String {
        error
            .filter(|e| !e.is_empty())
            .unwrap_or(UNKNOWN_SERVER_ERROR)
            .to_string()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    User,
    Assistant,
}

impl Sender {
    pub fn as_str(&self) -> &'static str {
        match self {
            Sender::User => "user",
            Sender::Assistant => "assistant",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatEvent {
    pub id: String,
    pub content: String,
    pub sender: Sender,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub related_questions: Option<Vec<String>>,
}

impl ChatEvent {
    /// Message typed by the local user. Built by the consumer, never by the client.
    pub fn user(content: &str) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            content: content.to_string(),
            sender: Sender::User,
            timestamp: Utc::now(),
            source: None,
            related_questions: None,
        }
    }

    pub fn assistant(
        content: String,
        source: Option<String>,
        related_questions: Option<Vec<String>>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            content,
            sender: Sender::Assistant,
            timestamp: Utc::now(),
            source,
            related_questions,
        }
    }

    /// Transient partial response; always carries [`STREAMING_MESSAGE_ID`].
    pub fn streaming(content: String) -> Self {
        Self {
            id: STREAMING_MESSAGE_ID.to_string(),
            content,
            sender: Sender::Assistant,
            timestamp: Utc::now(),
            source: None,
            related_questions: None,
        }
    }

    pub fn is_transient(&self) -> bool {
        self.id == STREAMING_MESSAGE_ID
    }

    pub fn related_questions(&self) -> &[String] {
        self.related_questions.as_deref().unwrap_or(&[])
    }
}
