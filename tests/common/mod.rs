//! Local chat server and event helpers shared by the integration tests.
#![allow(dead_code)]

use campus_chat::{
    ClientEvent,
    config::{Config, ReconnectPolicy},
    events::EventReceiver,
};
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::{
    WebSocketStream, accept_hdr_async,
    tungstenite::{
        Message,
        handshake::server::{ErrorResponse, Request, Response},
    },
};
use url::Url;

pub const WAIT: Duration = Duration::from_secs(5);

pub type ServerSocket = WebSocketStream<TcpStream>;

pub struct TestServer {
    listener: TcpListener,
    pub url: Url,
}

impl TestServer {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let url = Url::parse(&format!("ws://127.0.0.1:{port}")).unwrap();
        Self { listener, url }
    }

    /// Accepts the next WebSocket and returns it with the requested path.
    pub async fn accept(&self) -> (ServerSocket, String) {
        tokio::time::timeout(WAIT, self.accept_inner())
            .await
            .expect("client did not connect in time")
    }

    /// `None` if no client connects within `window`.
    pub async fn try_accept(&self, window: Duration) -> Option<(ServerSocket, String)> {
        tokio::time::timeout(window, self.accept_inner()).await.ok()
    }

    async fn accept_inner(&self) -> (ServerSocket, String) {
        let (stream, _) = self.listener.accept().await.unwrap();
        let mut path = String::new();
        let ws = accept_hdr_async(stream, |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
            path = req.uri().path().to_string();
            Ok(resp)
        })
        .await
        .unwrap();
        (ws, path)
    }

    /// Accepts a connection and completes the auth handshake, returning the token used.
    pub async fn accept_authenticated(&self) -> (ServerSocket, String) {
        let (mut ws, _) = self.accept().await;
        let auth = recv_json(&mut ws).await;
        assert_eq!(auth["type"], "auth");
        let token = auth["token"].as_str().unwrap().to_string();
        send_json(&mut ws, serde_json::json!({"type": "connected", "message": "Welcome"})).await;
        (ws, token)
    }
}

/// Config aimed at `server` with millisecond-scale timers.
pub fn test_config(server: &TestServer) -> Config {
    let mut config = Config::new(server.url.clone());
    config.websocket.connect_timeout = Duration::from_secs(2);
    config.reconnect = ReconnectPolicy {
        max_attempts: 3,
        base_delay: Duration::from_millis(100),
        max_delay: Duration::from_millis(1_000),
    };
    config.heartbeat.interval = Duration::from_secs(3600);
    config.session.token_settle_delay = Duration::from_millis(10);
    config
}

/// Next text frame from the client, parsed as JSON. Transport pings are skipped.
pub async fn recv_json(ws: &mut ServerSocket) -> Value {
    tokio::time::timeout(WAIT, async {
        loop {
            match ws.next().await {
                Some(Ok(Message::Text(text))) => return serde_json::from_str::<Value>(&text).unwrap(),
                Some(Ok(Message::Close(_))) | None => panic!("client closed the socket"),
                Some(Ok(_)) => continue,
                Some(Err(e)) => panic!("server socket error: {e}"),
            }
        }
    })
    .await
    .expect("no frame from client in time")
}

pub async fn send_json(ws: &mut ServerSocket, value: Value) {
    ws.send(Message::Text(value.to_string().into())).await.unwrap();
}

/// Waits until the socket is closed by the client.
pub async fn expect_closed(ws: &mut ServerSocket) {
    tokio::time::timeout(WAIT, async {
        loop {
            match ws.next().await {
                Some(Ok(Message::Close(_))) | None | Some(Err(_)) => return,
                Some(Ok(_)) => continue,
            }
        }
    })
    .await
    .expect("client did not close the socket");
}

pub async fn next_event(events: &mut EventReceiver) -> ClientEvent {
    tokio::time::timeout(WAIT, events.recv())
        .await
        .expect("timed out waiting for client event")
        .expect("event channel closed")
}

/// Skips events until `pred` matches, returning the match.
pub async fn wait_for<F>(events: &mut EventReceiver, mut pred: F) -> ClientEvent
where
    F: FnMut(&ClientEvent) -> bool,
{
    loop {
        let event = next_event(events).await;
        if pred(&event) {
            return event;
        }
    }
}

/// Collects every event that arrives within `window`.
pub async fn drain(events: &mut EventReceiver, window: Duration) -> Vec<ClientEvent> {
    let mut seen = Vec::new();
    let deadline = tokio::time::Instant::now() + window;
    while let Ok(Some(event)) = tokio::time::timeout_at(deadline, events.recv()).await {
        seen.push(event);
    }
    seen
}
