use crate::{
    client_state::{ClientState, ConnectionState},
    error::DashstreamError,
};
use anyhow::Result;
use metrics::{Counter, Gauge, counter, gauge};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::{
    net::SocketAddr,
    sync::{LazyLock, atomic::Ordering},
};
use tracing::{error, info};

// Global metrics
pub static FRAMES_RECEIVED_COUNTER: LazyLock<Counter> =
    LazyLock::new(|| counter!("dashstream_frames_received_total"));
pub static FRAMES_DELIVERED_COUNTER: LazyLock<Counter> =
    LazyLock::new(|| counter!("dashstream_frames_delivered_total"));
pub static FRAMES_DROPPED_COUNTER: LazyLock<Counter> =
    LazyLock::new(|| counter!("dashstream_frames_dropped_total"));
pub static SUBSCRIBER_PANIC_COUNTER: LazyLock<Counter> =
    LazyLock::new(|| counter!("dashstream_subscriber_panics_total"));
pub static CONNECTION_ATTEMPT_COUNTER: LazyLock<Counter> =
    LazyLock::new(|| counter!("dashstream_connection_attempts_total"));
pub static RECONNECT_COUNTER: LazyLock<Counter> =
    LazyLock::new(|| counter!("dashstream_reconnects_total"));
pub static SENDS_DROPPED_COUNTER: LazyLock<Counter> =
    LazyLock::new(|| counter!("dashstream_sends_dropped_total"));
pub static CONNECTED_GAUGE: LazyLock<Gauge> = LazyLock::new(|| gauge!("dashstream_connected"));

pub async fn setup_metrics(port: u16) -> Result<()> {
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();

    let builder = PrometheusBuilder::new()
        .with_http_listener(addr)
        .add_global_label("service", "dashstream")
        .add_global_label("version", env!("CARGO_PKG_VERSION"));

    match builder.install() {
        Ok(_) => {
            info!(
                "Prometheus metrics server started on http://{}/metrics",
                addr
            );

            FRAMES_RECEIVED_COUNTER.absolute(0);
            FRAMES_DELIVERED_COUNTER.absolute(0);
            FRAMES_DROPPED_COUNTER.absolute(0);
            SUBSCRIBER_PANIC_COUNTER.absolute(0);
            CONNECTION_ATTEMPT_COUNTER.absolute(0);
            RECONNECT_COUNTER.absolute(0);
            SENDS_DROPPED_COUNTER.absolute(0);
            CONNECTED_GAUGE.set(0.0);

            Ok(())
        }
        Err(e) => {
            error!("Failed to start metrics server: {}", e);
            Err(DashstreamError::MetricsError(e.to_string()).into())
        }
    }
}

#[derive(Debug, Clone)]
pub struct HealthStatus {
    pub state: ConnectionState,
    pub connection_id: Option<String>,
    pub last_message_time: Option<chrono::DateTime<chrono::Utc>>,
    pub frames_received: u64,
    pub frames_delivered: u64,
    pub frames_dropped: u64,
    pub subscriber_panics: u64,
    pub connection_attempts: u64,
    pub reconnects_scheduled: u64,
    pub uptime: chrono::Duration,
}

impl HealthStatus {
    pub fn from_state(state: &ClientState) -> Self {
        let now = chrono::Utc::now();
        let last_message_time = state.last_message_time.and_then(|instant| {
            chrono::Duration::from_std(instant.elapsed())
                .ok()
                .map(|ago| now - ago)
        });

        Self {
            state: state.state,
            connection_id: state.connection_id.clone(),
            last_message_time,
            frames_received: state.frames_received.load(Ordering::Relaxed),
            frames_delivered: state.frames_delivered.load(Ordering::Relaxed),
            frames_dropped: state.frames_dropped.load(Ordering::Relaxed),
            subscriber_panics: state.subscriber_panics.load(Ordering::Relaxed),
            connection_attempts: state.connection_attempts.load(Ordering::Relaxed),
            reconnects_scheduled: state.reconnects_scheduled.load(Ordering::Relaxed),
            uptime: chrono::Duration::from_std(state.started_at.elapsed())
                .unwrap_or_else(|_| chrono::Duration::zero()),
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.state == ConnectionState::Open
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "status": if self.is_healthy() { "healthy" } else { "unhealthy" },
            "connection_id": self.connection_id,
            "last_message_time": self.last_message_time,
            "frames_received": self.frames_received,
            "frames_delivered": self.frames_delivered,
            "frames_dropped": self.frames_dropped,
            "subscriber_panics": self.subscriber_panics,
            "connection_attempts": self.connection_attempts,
            "reconnects_scheduled": self.reconnects_scheduled,
            "uptime_seconds": self.uptime.num_seconds(),
            "timestamp": chrono::Utc::now()
        })
    }
}
