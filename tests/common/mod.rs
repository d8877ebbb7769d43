#![allow(dead_code, reason = "each test binary uses a different subset")]

use rs_dashstream::{
    Callback, DashstreamError, EventClient, callback,
    config::Config,
    events::{ClientEvent, EventReceiver, create_event_channel},
    transport::{Connection, Transport},
};
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::{
    Arc, Mutex,
    atomic::{AtomicBool, AtomicUsize, Ordering},
};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::timeout;
use url::Url;

pub const ENDPOINT: &str = "ws://fake.test/ws";
pub const WAIT: Duration = Duration::from_secs(120);

/// What the fake server does with one connection attempt.
#[derive(Debug, Clone, Copy)]
pub enum Behavior {
    Accept,
    Refuse,
    Hang,
}

enum ServerMsg {
    /// Leading bytes of a message; `recv` holds them until the rest arrives.
    Partial(String),
    Text(String),
    Error,
    Close,
}

struct Inner {
    attempts: AtomicUsize,
    stall_close: AtomicBool,
    fallback: Behavior,
    script: Mutex<VecDeque<Behavior>>,
    accepted_tx: mpsc::UnboundedSender<ServerEnd>,
    accepted_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<ServerEnd>>,
}

/// Scripted in-memory transport. Attempts follow the script, then `fallback`.
#[derive(Clone)]
pub struct FakeTransport {
    inner: Arc<Inner>,
}

impl FakeTransport {
    pub fn new(fallback: Behavior) -> Self {
        Self::scripted(fallback, [])
    }

    pub fn scripted(fallback: Behavior, script: impl IntoIterator<Item = Behavior>) -> Self {
        let (accepted_tx, accepted_rx) = mpsc::unbounded_channel();
        Self {
            inner: Arc::new(Inner {
                attempts: AtomicUsize::new(0),
                stall_close: AtomicBool::new(false),
                fallback,
                script: Mutex::new(script.into_iter().collect()),
                accepted_tx,
                accepted_rx: tokio::sync::Mutex::new(accepted_rx),
            }),
        }
    }

    /// Connections accepted from now on never finish `close`.
    pub fn stall_close(&self) {
        self.inner.stall_close.store(true, Ordering::SeqCst);
    }

    pub fn attempts(&self) -> usize {
        self.inner.attempts.load(Ordering::SeqCst)
    }

    /// Waits for the client to complete a connection.
    pub async fn next_connection(&self) -> ServerEnd {
        let mut accepted = self.inner.accepted_rx.lock().await;
        timeout(WAIT, accepted.recv())
            .await
            .expect("no connection within the wait window")
            .expect("transport dropped")
    }
}

impl Transport for FakeTransport {
    type Conn = FakeConnection;

    async fn connect(&self, _url: &Url) -> Result<FakeConnection, DashstreamError> {
        self.inner.attempts.fetch_add(1, Ordering::SeqCst);
        let behavior = self
            .inner
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(self.inner.fallback);

        match behavior {
            Behavior::Refuse => Err(DashstreamError::IoError(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "connection refused",
            ))),
            Behavior::Hang => std::future::pending::<Result<FakeConnection, DashstreamError>>().await,
            Behavior::Accept => {
                let (to_client, inbound) = mpsc::unbounded_channel();
                let (outbound, from_client) = mpsc::unbounded_channel();
                let closed = Arc::new(AtomicBool::new(false));
                let _ = self.inner.accepted_tx.send(ServerEnd {
                    to_client,
                    from_client,
                    closed: closed.clone(),
                });
                Ok(FakeConnection {
                    inbound,
                    outbound,
                    closed,
                    stall_close: self.inner.stall_close.load(Ordering::SeqCst),
                    partial: String::new(),
                })
            }
        }
    }
}

pub struct FakeConnection {
    inbound: mpsc::UnboundedReceiver<ServerMsg>,
    outbound: mpsc::UnboundedSender<String>,
    closed: Arc<AtomicBool>,
    stall_close: bool,
    partial: String,
}

impl Connection for FakeConnection {
    async fn recv(&mut self) -> Option<Result<String, DashstreamError>> {
        loop {
            match self.inbound.recv().await {
                Some(ServerMsg::Partial(head)) => self.partial.push_str(&head),
                Some(ServerMsg::Text(tail)) => {
                    let mut text = std::mem::take(&mut self.partial);
                    text.push_str(&tail);
                    return Some(Ok(text));
                }
                Some(ServerMsg::Error) => {
                    return Some(Err(DashstreamError::InvalidMessage(
                        "stream reset".to_string(),
                    )));
                }
                Some(ServerMsg::Close) | None => return None,
            }
        }
    }

    async fn send(&mut self, text: String) -> Result<(), DashstreamError> {
        self.outbound
            .send(text)
            .map_err(|_| DashstreamError::ConnectionClosed)
    }

    async fn close(&mut self) {
        self.closed.store(true, Ordering::SeqCst);
        if self.stall_close {
            std::future::pending::<()>().await;
        }
    }
}

/// Server side of one accepted fake connection.
pub struct ServerEnd {
    to_client: mpsc::UnboundedSender<ServerMsg>,
    pub from_client: mpsc::UnboundedReceiver<String>,
    closed: Arc<AtomicBool>,
}

impl ServerEnd {
    pub fn push(&self, text: impl Into<String>) {
        let _ = self.to_client.send(ServerMsg::Text(text.into()));
    }

    /// Delivers `text` in two pieces: the first `split_at` bytes now, the rest
    /// on [`ServerEnd::finish`].
    pub fn push_partial(&self, text: &str, split_at: usize) -> String {
        let (head, tail) = text.split_at(split_at);
        let _ = self.to_client.send(ServerMsg::Partial(head.to_string()));
        tail.to_string()
    }

    pub fn finish(&self, tail: String) {
        self.push(tail);
    }

    pub fn push_json(&self, frame: Value) {
        self.push(frame.to_string());
    }

    pub fn hang_up(&self) {
        let _ = self.to_client.send(ServerMsg::Close);
    }

    pub fn fail(&self) {
        let _ = self.to_client.send(ServerMsg::Error);
    }

    pub fn closed_by_client(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

pub fn test_config() -> Config {
    Config::new(ENDPOINT).expect("valid test endpoint")
}

pub fn start(transport: &FakeTransport) -> (EventClient, EventReceiver) {
    start_with(test_config(), transport)
}

pub fn start_with(config: Config, transport: &FakeTransport) -> (EventClient, EventReceiver) {
    let (events, event_rx) = create_event_channel();
    let client = EventClient::new(Arc::new(config), transport.clone(), events);
    (client, event_rx)
}

/// Callback that forwards every payload it sees into a channel.
pub fn recorder() -> (Callback, mpsc::UnboundedReceiver<Value>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (
        callback(move |payload| {
            let _ = tx.send(payload.clone());
        }),
        rx,
    )
}

pub async fn recv_payload(rx: &mut mpsc::UnboundedReceiver<Value>) -> Value {
    timeout(WAIT, rx.recv())
        .await
        .expect("no payload within the wait window")
        .expect("recorder dropped")
}

/// Lets the supervisor drain everything already queued.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
    for _ in 0..16 {
        tokio::task::yield_now().await;
    }
}

pub fn drain_events(rx: &mut EventReceiver) -> Vec<ClientEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}
