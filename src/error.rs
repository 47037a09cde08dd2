use thiserror::Error;

#[derive(Error, Debug)]
pub enum ChatClientError {
    #[error("WebSocket connection error: {0}")]
    WebSocketError(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("JSON serialization/deserialization error: {0}")]
    SerdeError(#[from] serde_json::Error),

    #[error("URL parsing error: {0}")]
    UrlError(#[from] url::ParseError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TLS configuration error: {0}")]
    TlsError(#[from] rustls::Error),

    #[error("Connection timeout after {0:?}")]
    Timeout(std::time::Duration),

    #[error("Unsupported endpoint scheme: {0}")]
    UnsupportedScheme(String),

    #[error("Chat transport is not open")]
    NotConnected,

    #[error("Chat client has stopped")]
    ClientStopped,

    #[error("Event channel closed: {0}")]
    EventSendError(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Metrics server error: {0}")]
    MetricsError(String),
}

/// Returns true when a peer-reported error means the token was rejected.
///
/// The backend has no structured error code for this, so the check is a
/// case-insensitive substring match on "auth". Every auth decision in the
/// client goes through here.
pub fn is_auth_failure(error: &str) -> bool {
    error.to_ascii_lowercase().contains("auth")
}
