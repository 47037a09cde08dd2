// file: src/transport.rs
// description: opening the chat WebSocket, plain or TLS, bounded by a connect timeout

use crate::error::ChatClientError;
use std::{sync::Arc, time::Duration};
use tokio::net::TcpStream;
use tokio_tungstenite::{
    Connector, MaybeTlsStream, WebSocketStream, connect_async_tls_with_config,
};
use tracing::{debug, info};
use url::Url;

pub type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// rustls client config with the ring provider and the webpki root set.
pub fn tls_connector() -> Result<Connector, ChatClientError> {
    let config = rustls::ClientConfig::builder_with_provider(Arc::new(
        rustls::crypto::ring::default_provider(),
    ))
    .with_safe_default_protocol_versions()?
    .with_root_certificates(rustls::RootCertStore {
        roots: webpki_roots::TLS_SERVER_ROOTS.to_vec(),
    })
    .with_no_client_auth();

    Ok(Connector::Rustls(Arc::new(config)))
}

/// Opens a WebSocket to `url`. Only the transport is established here; the
/// chat handshake happens in the client.
pub async fn connect(url: &Url, timeout: Duration) -> Result<WsStream, ChatClientError> {
    let connector = match url.scheme() {
        "wss" => Some(tls_connector()?),
        "ws" => None,
        other => return Err(ChatClientError::UnsupportedScheme(other.to_string())),
    };

    debug!(url = %url, ?timeout, "Opening WebSocket transport");

    let (ws, response) = tokio::time::timeout(
        timeout,
        connect_async_tls_with_config(url.as_str(), None, false, connector),
    )
    .await
    .map_err(|_| ChatClientError::Timeout(timeout))??;

    info!(url = %url, status = %response.status(), "WebSocket transport open");
    Ok(ws)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_tls_connector() {
        assert!(matches!(tls_connector(), Ok(Connector::Rustls(_))));
    }

    #[tokio::test]
    async fn rejects_non_websocket_scheme() {
        let url = Url::parse("http://localhost:1/ws/chat").unwrap();
        let err = connect(&url, Duration::from_secs(1)).await.unwrap_err();
        assert!(matches!(err, ChatClientError::UnsupportedScheme(s) if s == "http"));
    }

    #[tokio::test]
    async fn refused_connection_is_a_websocket_error() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let url = Url::parse(&format!("ws://127.0.0.1:{port}/ws/chat")).unwrap();
        let err = connect(&url, Duration::from_secs(5)).await.unwrap_err();
        assert!(matches!(
            err,
            ChatClientError::WebSocketError(_) | ChatClientError::IoError(_)
        ));
    }
}
