use crate::{client_state::ConnectionStatus, error::ChatClientError};
use metrics::{Counter, Gauge, counter, gauge};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::{net::SocketAddr, sync::LazyLock};
use tracing::{error, info};

// Global metrics
pub static MESSAGES_RECEIVED_COUNTER: LazyLock<Counter> =
    LazyLock::new(|| counter!("campus_chat_messages_received_total"));
pub static MESSAGES_SENT_COUNTER: LazyLock<Counter> =
    LazyLock::new(|| counter!("campus_chat_messages_sent_total"));
pub static RECONNECT_COUNTER: LazyLock<Counter> =
    LazyLock::new(|| counter!("campus_chat_reconnects_total"));
pub static AUTH_FAILURE_COUNTER: LazyLock<Counter> =
    LazyLock::new(|| counter!("campus_chat_auth_failures_total"));
pub static PARSE_ERROR_COUNTER: LazyLock<Counter> =
    LazyLock::new(|| counter!("campus_chat_parse_errors_total"));
pub static CONNECTED_GAUGE: LazyLock<Gauge> = LazyLock::new(|| gauge!("campus_chat_connected"));

pub async fn setup_metrics(port: u16) -> Result<(), ChatClientError> {
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();

    let builder = PrometheusBuilder::new()
        .with_http_listener(addr)
        .add_global_label("service", "campus-chat")
        .add_global_label("version", env!("CARGO_PKG_VERSION"));

    match builder.install() {
        Ok(()) => {
            info!(
                "Prometheus metrics server started on http://{}/metrics",
                addr
            );

            MESSAGES_RECEIVED_COUNTER.absolute(0);
            MESSAGES_SENT_COUNTER.absolute(0);
            RECONNECT_COUNTER.absolute(0);
            AUTH_FAILURE_COUNTER.absolute(0);
            PARSE_ERROR_COUNTER.absolute(0);
            CONNECTED_GAUGE.set(0.0);

            Ok(())
        }
        Err(e) => {
            error!("Failed to start metrics server: {}", e);
            Err(ChatClientError::MetricsError(e.to_string()))
        }
    }
}

#[derive(Debug)]
pub struct HealthStatus {
    pub is_healthy: bool,
    pub state: &'static str,
    pub auth_failed: bool,
    pub has_token: bool,
    pub reconnect_attempts: u32,
    pub connection_id: Option<String>,
    pub total_messages: u64,
    pub parse_errors: u64,
    pub idle_ms: Option<u64>,
}

impl From<&ConnectionStatus> for HealthStatus {
    fn from(status: &ConnectionStatus) -> Self {
        Self {
            is_healthy: status.is_connected,
            state: status.state.as_str(),
            auth_failed: status.auth_failed,
            has_token: status.has_token,
            reconnect_attempts: status.reconnect_attempts,
            connection_id: status.connection_id.clone(),
            total_messages: status.total_messages_received,
            parse_errors: status.parse_errors,
            idle_ms: status.idle_for.map(|idle| idle.as_millis() as u64),
        }
    }
}

impl HealthStatus {
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "status": if self.is_healthy { "healthy" } else { "unhealthy" },
            "state": self.state,
            "auth_failed": self.auth_failed,
            "has_token": self.has_token,
            "reconnect_attempts": self.reconnect_attempts,
            "connection_id": self.connection_id,
            "total_messages": self.total_messages,
            "parse_errors": self.parse_errors,
            "idle_ms": self.idle_ms,
            "timestamp": chrono::Utc::now()
        })
    }
}
