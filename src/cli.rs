use clap::Parser;

#[derive(Parser, Debug)]
#[command(
    name = "campus-chat",
    about = "terminal client for the campus assistant chat backend",
    version
)]
pub struct Args {
    /// Chat backend base URL (ws:// or wss://)
    #[arg(short, long, env = "CAMPUS_CHAT_URL", default_value = "ws://localhost:8000")]
    pub url: String,

    /// Access token used to authenticate the chat connection
    #[arg(short, long, env = "CAMPUS_CHAT_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Use the streaming chat endpoint
    #[arg(short, long)]
    pub streaming: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "warn")]
    pub log_level: String,

    /// Output logs in JSON format
    #[arg(long)]
    pub json_logs: bool,

    /// Enable metrics server
    #[arg(long)]
    pub metrics: bool,

    /// Metrics server port
    #[arg(long, default_value = "9090")]
    pub metrics_port: u16,

    /// Connection timeout in seconds
    #[arg(long, default_value = "10")]
    pub timeout: u64,

    /// Maximum number of automatic reconnection attempts
    #[arg(long, default_value = "3")]
    pub max_reconnects: u32,

    /// Base reconnection delay in milliseconds (multiplied by the attempt number)
    #[arg(long, default_value = "3000")]
    pub reconnect_delay_ms: u64,

    /// Upper bound for the reconnection delay in milliseconds
    #[arg(long, default_value = "10000")]
    pub max_reconnect_delay_ms: u64,

    /// Heartbeat ping interval in seconds
    #[arg(long, default_value = "30")]
    pub heartbeat_interval: u64,

    /// Reconnect when a ping goes unanswered this many seconds (0 disables)
    #[arg(long, default_value = "0")]
    pub pong_timeout: u64,

    /// Delay before connecting once a token becomes available, in milliseconds
    #[arg(long, default_value = "100")]
    pub token_settle_ms: u64,

    /// Output format: text, json, minimal
    #[arg(long, default_value = "text")]
    pub format: String,

    /// Disable colored output (useful for piping to files)
    #[arg(long)]
    pub no_color: bool,

    /// Quiet mode - only print assistant replies and errors
    #[arg(long)]
    pub quiet: bool,
}
