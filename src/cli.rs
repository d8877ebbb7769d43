use clap::Parser;

#[derive(Parser, Debug)]
#[command(
    name = "rs-dashstream",
    about = "watch a dashboard event stream and print categorized events as they arrive",
    version
)]
pub struct Args {
    /// WebSocket endpoint URL
    #[arg(short, long, default_value = "ws://localhost:8080/ws")]
    pub url: String,

    /// Comma-separated categories to subscribe to (market, transaction, investment, notification, user); empty for all
    #[arg(short, long, value_delimiter = ',')]
    pub categories: Vec<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
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
    #[arg(long, default_value = "30")]
    pub timeout: u64,

    /// Reconnection delay in milliseconds (initial delay when backoff is exponential)
    #[arg(long, default_value = "3000")]
    pub reconnect_delay_ms: u64,

    /// Double the reconnection delay after each consecutive failure
    #[arg(long)]
    pub exponential_backoff: bool,

    /// Ceiling for the exponential reconnection delay in milliseconds
    #[arg(long, default_value = "30000")]
    pub max_reconnect_delay_ms: u64,

    /// Maximum random jitter added to exponential delays in milliseconds
    #[arg(long, default_value = "250")]
    pub reconnect_jitter_ms: u64,

    /// Drop the connection after this many seconds without a frame (0 to disable)
    #[arg(long, default_value = "0")]
    pub idle_timeout: u64,

    /// Output format: table, json, minimal
    #[arg(long, default_value = "table")]
    pub format: String,

    /// Disable colored output (useful for piping to files)
    #[arg(long)]
    pub no_color: bool,

    /// Quiet mode - only frames and notices, no connection status lines
    #[arg(long)]
    pub quiet: bool,

    /// Stop after printing this many frames (0 for unlimited)
    #[arg(long, default_value = "0")]
    pub max_frames: u64,
}
