/// file: src/client_state.rs
/// description: connection state and counters shared between the supervisor task and client handles
use std::sync::{
    Arc,
    atomic::{AtomicU32, AtomicU64, Ordering},
};
use tokio::sync::Mutex;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Closed,
    Connecting,
    Open,
}

#[derive(Debug)]
pub struct ClientState {
    pub connection_id: Option<String>,
    pub state: ConnectionState,
    /// Consecutive failures since the last successful open.
    pub failure_streak: AtomicU32,
    pub connection_attempts: AtomicU64,
    pub reconnects_scheduled: AtomicU64,
    pub last_message_time: Option<Instant>,
    pub last_disconnection_time: Option<Instant>,
    pub started_at: Instant,

    pub frames_received: AtomicU64,
    pub frames_delivered: AtomicU64,
    pub frames_dropped: AtomicU64,
    pub subscriber_panics: AtomicU64,
    pub sends_dropped: AtomicU64,
}

impl Default for ClientState {
    fn default() -> Self {
        Self {
            connection_id: None,
            state: ConnectionState::Closed,
            failure_streak: AtomicU32::new(0),
            connection_attempts: AtomicU64::new(0),
            reconnects_scheduled: AtomicU64::new(0),
            last_message_time: None,
            last_disconnection_time: None,
            started_at: Instant::now(),
            frames_received: AtomicU64::new(0),
            frames_delivered: AtomicU64::new(0),
            frames_dropped: AtomicU64::new(0),
            subscriber_panics: AtomicU64::new(0),
            sends_dropped: AtomicU64::new(0),
        }
    }
}

impl ClientState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin_attempt(&mut self) {
        self.state = ConnectionState::Connecting;
        self.connection_attempts.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns the id of the new connection.
    pub fn mark_open(&mut self) -> String {
        let id = uuid::Uuid::new_v4().to_string();
        self.connection_id = Some(id.clone());
        self.state = ConnectionState::Open;
        self.last_message_time = Some(Instant::now());
        self.failure_streak.store(0, Ordering::Relaxed);
        id
    }

    /// Returns the updated failure streak.
    pub fn mark_failed(&mut self) -> u32 {
        self.mark_closed();
        self.reconnects_scheduled.fetch_add(1, Ordering::Relaxed);
        self.failure_streak.fetch_add(1, Ordering::AcqRel) + 1
    }

    pub fn mark_closed(&mut self) {
        if self.state == ConnectionState::Open {
            self.last_disconnection_time = Some(Instant::now());
        }
        self.state = ConnectionState::Closed;
        self.connection_id = None;
    }

    pub fn record_message(&mut self) {
        self.last_message_time = Some(Instant::now());
        self.frames_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_delivery(&self, panicked: usize) {
        self.frames_delivered.fetch_add(1, Ordering::Relaxed);
        self.subscriber_panics
            .fetch_add(panicked as u64, Ordering::Relaxed);
    }

    pub fn record_drop(&self) {
        self.frames_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_send_dropped(&self) {
        self.sends_dropped.fetch_add(1, Ordering::Relaxed);
    }
}

pub type SharedClientState = Arc<Mutex<ClientState>>;
