/// file: src/config.rs
/// description: runtime configuration for the event stream, reconnect policy, metrics and display
use crate::{cli::Args, error::DashstreamError, formatter::OutputFormat, types::Category};
use anyhow::Result;
use std::time::Duration;
use url::Url;

pub const DEFAULT_ENDPOINT: &str = "ws://localhost:8080/ws";
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_millis(3_000);

#[derive(Debug, Clone)]
pub struct Config {
    pub stream: StreamConfig,
    pub metrics: MetricsConfig,
    pub display: DisplayConfig,
}

#[derive(Debug, Clone)]
pub struct StreamConfig {
    pub url: Url,
    pub connect_timeout: Duration,
    pub reconnect: ReconnectPolicy,
    /// Treat an open connection as dropped after this long without a frame.
    pub idle_timeout: Option<Duration>,
}

/// How long to wait before the next connection attempt. Attempts are never
/// capped; the client keeps trying until it connects or is told to stop.
#[derive(Debug, Clone, PartialEq)]
pub enum ReconnectPolicy {
    Constant {
        delay: Duration,
    },
    Exponential {
        initial: Duration,
        max: Duration,
        jitter: Duration,
    },
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        ReconnectPolicy::Constant {
            delay: DEFAULT_RECONNECT_DELAY,
        }
    }
}

impl ReconnectPolicy {
    /// `failures` is the 1-based count of consecutive failed attempts.
    pub fn delay_for(&self, failures: u32) -> Duration {
        match self {
            ReconnectPolicy::Constant { delay } => *delay,
            ReconnectPolicy::Exponential {
                initial,
                max,
                jitter,
            } => {
                let exp = failures.saturating_sub(1).min(31);
                let base = initial.saturating_mul(1u32 << exp).min(*max);
                let jitter_ms = jitter.as_millis() as u64;
                let extra = if jitter_ms == 0 {
                    0
                } else {
                    fastrand::u64(0..=jitter_ms)
                };
                base + Duration::from_millis(extra)
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub port: u16,
}

#[derive(Debug, Clone)]
pub struct DisplayConfig {
    pub categories: Vec<Category>,
    pub format: OutputFormat,
    pub colored: bool,
    pub quiet: bool,
    pub max_frames: Option<u64>,
}

impl StreamConfig {
    pub fn new(url: Url) -> Result<Self, DashstreamError> {
        validate_endpoint(&url)?;
        Ok(Self {
            url,
            connect_timeout: Duration::from_secs(30),
            reconnect: ReconnectPolicy::default(),
            idle_timeout: None,
        })
    }
}

impl Config {
    /// Defaults for library use: no metrics, all categories, table output.
    pub fn new(url: &str) -> Result<Self, DashstreamError> {
        let url = Url::parse(url)?;
        Ok(Config {
            stream: StreamConfig::new(url)?,
            metrics: MetricsConfig {
                enabled: false,
                port: 9090,
            },
            display: DisplayConfig {
                categories: Category::ALL.to_vec(),
                format: OutputFormat::Table,
                colored: true,
                quiet: false,
                max_frames: None,
            },
        })
    }

    pub fn from_args(args: &Args) -> Result<Self> {
        let url = Url::parse(&args.url)?;
        let mut stream = StreamConfig::new(url)?;
        stream.connect_timeout = Duration::from_secs(args.timeout);
        stream.idle_timeout = (args.idle_timeout > 0).then(|| Duration::from_secs(args.idle_timeout));
        stream.reconnect = if args.exponential_backoff {
            ReconnectPolicy::Exponential {
                initial: Duration::from_millis(args.reconnect_delay_ms),
                max: Duration::from_millis(args.max_reconnect_delay_ms.max(args.reconnect_delay_ms)),
                jitter: Duration::from_millis(args.reconnect_jitter_ms),
            }
        } else {
            ReconnectPolicy::Constant {
                delay: Duration::from_millis(args.reconnect_delay_ms),
            }
        };

        let categories = if args.categories.is_empty() {
            Category::ALL.to_vec()
        } else {
            let mut categories = args
                .categories
                .iter()
                .map(|c| c.trim().parse::<Category>())
                .collect::<Result<Vec<_>, _>>()?;
            categories.sort();
            categories.dedup();
            categories
        };

        Ok(Config {
            stream,
            metrics: MetricsConfig {
                enabled: args.metrics,
                port: args.metrics_port,
            },
            display: DisplayConfig {
                categories,
                format: OutputFormat::from(args.format.as_str()),
                colored: !args.no_color,
                quiet: args.quiet,
                max_frames: (args.max_frames > 0).then_some(args.max_frames),
            },
        })
    }
}

fn validate_endpoint(url: &Url) -> Result<(), DashstreamError> {
    match url.scheme() {
        "ws" | "wss" => {}
        other => {
            return Err(DashstreamError::InvalidEndpoint(format!(
                "unsupported scheme '{other}', expected ws or wss"
            )));
        }
    }
    if url.host_str().is_none() {
        return Err(DashstreamError::InvalidEndpoint(format!(
            "missing host in {url}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn constant_policy_ignores_streak() {
        let policy = ReconnectPolicy::default();
        assert_eq!(policy.delay_for(1), Duration::from_millis(3_000));
        assert_eq!(policy.delay_for(500), Duration::from_millis(3_000));
    }

    #[test]
    fn exponential_policy_doubles_up_to_ceiling() {
        let policy = ReconnectPolicy::Exponential {
            initial: Duration::from_millis(500),
            max: Duration::from_secs(4),
            jitter: Duration::ZERO,
        };
        assert_eq!(policy.delay_for(1), Duration::from_millis(500));
        assert_eq!(policy.delay_for(2), Duration::from_millis(1_000));
        assert_eq!(policy.delay_for(4), Duration::from_millis(4_000));
        assert_eq!(policy.delay_for(40), Duration::from_millis(4_000));
    }

    #[test]
    fn exponential_jitter_stays_in_bounds() {
        let policy = ReconnectPolicy::Exponential {
            initial: Duration::from_millis(100),
            max: Duration::from_millis(100),
            jitter: Duration::from_millis(50),
        };
        for _ in 0..100 {
            let delay = policy.delay_for(3);
            assert!(delay >= Duration::from_millis(100));
            assert!(delay <= Duration::from_millis(150));
        }
    }

    #[test]
    fn rejects_non_websocket_endpoints() {
        assert!(matches!(
            Config::new("https://example.com/ws"),
            Err(DashstreamError::InvalidEndpoint(_))
        ));
        assert!(matches!(
            Config::new("not a url"),
            Err(DashstreamError::UrlError(_))
        ));
        assert!(Config::new("wss://stream.example.com/ws").is_ok());
    }

    #[test]
    fn from_args_builds_policy_and_categories() {
        let args = Args::parse_from([
            "rs-dashstream",
            "--url",
            "ws://127.0.0.1:9000/ws",
            "--categories",
            "notification,market,market",
            "--exponential-backoff",
            "--reconnect-delay-ms",
            "250",
            "--max-reconnect-delay-ms",
            "8000",
            "--idle-timeout",
            "45",
        ]);
        let config = Config::from_args(&args).unwrap();

        assert_eq!(
            config.display.categories,
            vec![Category::Market, Category::Notification]
        );
        assert_eq!(
            config.stream.reconnect,
            ReconnectPolicy::Exponential {
                initial: Duration::from_millis(250),
                max: Duration::from_millis(8_000),
                jitter: Duration::from_millis(250),
            }
        );
        assert_eq!(config.stream.idle_timeout, Some(Duration::from_secs(45)));
        assert_eq!(config.display.max_frames, None);
    }

    #[test]
    fn from_args_rejects_unknown_category() {
        let args = Args::parse_from(["rs-dashstream", "--categories", "market,orderbook"]);
        assert!(Config::from_args(&args).is_err());
    }
}
