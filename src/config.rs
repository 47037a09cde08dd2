/// file: src/config.rs
/// description: Configuration model for the chat transport client and the terminal front end
use crate::{cli::Args, error::ChatClientError, formatter::OutputFormat};
use std::time::Duration;
use url::Url;

pub const CHAT_PATH: &str = "ws/chat";
pub const STREAM_CHAT_PATH: &str = "ws/chat/stream";

#[derive(Debug, Clone)]
pub struct Config {
    pub websocket: WebSocketConfig,
    pub reconnect: ReconnectPolicy,
    pub heartbeat: HeartbeatConfig,
    pub session: SessionConfig,
    pub metrics: MetricsConfig,
    pub output: OutputConfig,
}

#[derive(Debug, Clone)]
pub struct WebSocketConfig {
    pub base_url: Url,
    pub streaming: bool,
    pub connect_timeout: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

#[derive(Debug, Clone)]
pub struct HeartbeatConfig {
    pub interval: Duration,
    /// `None` keeps pongs as pure acknowledgments.
    pub pong_timeout: Option<Duration>,
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub token_settle_delay: Duration,
}

#[derive(Debug, Clone)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub port: u16,
}

#[derive(Debug, Clone)]
pub struct OutputConfig {
    pub format: OutputFormat,
    pub colored: bool,
    pub quiet: bool,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(3000),
            max_delay: Duration::from_millis(10_000),
        }
    }
}

impl ReconnectPolicy {
    /// Delay before automatic reconnect number `attempt` (1-based): linear, capped.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(attempt).min(self.max_delay)
    }
}

impl Config {
    /// Documented defaults against `base_url`.
    pub fn new(base_url: Url) -> Self {
        Self {
            websocket: WebSocketConfig {
                base_url,
                streaming: false,
                connect_timeout: Duration::from_secs(10),
            },
            reconnect: ReconnectPolicy::default(),
            heartbeat: HeartbeatConfig {
                interval: Duration::from_secs(30),
                pong_timeout: None,
            },
            session: SessionConfig {
                token_settle_delay: Duration::from_millis(100),
            },
            metrics: MetricsConfig {
                enabled: false,
                port: 9090,
            },
            output: OutputConfig {
                format: OutputFormat::Text,
                colored: true,
                quiet: false,
            },
        }
    }

    pub fn from_args(args: &Args) -> Result<Self, ChatClientError> {
        let base_url = Url::parse(&args.url)?;
        if !matches!(base_url.scheme(), "ws" | "wss") {
            return Err(ChatClientError::UnsupportedScheme(
                base_url.scheme().to_string(),
            ));
        }
        let config = Config {
            websocket: WebSocketConfig {
                base_url,
                streaming: args.streaming,
                connect_timeout: Duration::from_secs(args.timeout),
            },
            reconnect: ReconnectPolicy {
                max_attempts: args.max_reconnects,
                base_delay: Duration::from_millis(args.reconnect_delay_ms),
                max_delay: Duration::from_millis(args.max_reconnect_delay_ms),
            },
            heartbeat: HeartbeatConfig {
                interval: Duration::from_secs(args.heartbeat_interval),
                pong_timeout: (args.pong_timeout > 0)
                    .then(|| Duration::from_secs(args.pong_timeout)),
            },
            session: SessionConfig {
                token_settle_delay: Duration::from_millis(args.token_settle_ms),
            },
            metrics: MetricsConfig {
                enabled: args.metrics,
                port: args.metrics_port,
            },
            output: OutputConfig {
                format: OutputFormat::from(args.format.as_str()),
                colored: !args.no_color,
                quiet: args.quiet,
            },
        };
        config.validate()?;
        Ok(config)
    }

    /// Rejects settings under which the client could never connect or would
    /// panic building its timers.
    pub fn validate(&self) -> Result<(), ChatClientError> {
        if self.reconnect.max_attempts == 0 {
            return Err(ChatClientError::InvalidConfig(
                "max reconnect attempts must be at least 1".to_string(),
            ));
        }
        if self.heartbeat.interval.is_zero() {
            return Err(ChatClientError::InvalidConfig(
                "heartbeat interval must be non-zero".to_string(),
            ));
        }
        if self.websocket.connect_timeout.is_zero() {
            return Err(ChatClientError::InvalidConfig(
                "connect timeout must be non-zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Endpoint chosen at construction time; never switched per message.
    pub fn endpoint(&self) -> Result<Url, ChatClientError> {
        let path = if self.websocket.streaming {
            STREAM_CHAT_PATH
        } else {
            CHAT_PATH
        };
        let mut base = self.websocket.base_url.clone();
        if !base.path().ends_with('/') {
            let with_slash = format!("{}/", base.path());
            base.set_path(&with_slash);
        }
        Ok(base.join(path)?)
    }
}
