// file: src/client.rs
// description: event client handle and the supervisor task that owns the connection lifecycle
//
// Every state transition, reconnect timer and frame delivery happens on the
// supervisor task. Handles only push commands into its queue, so the open
// connection and the reconnect timer are never live at the same time.

use crate::{
    client_state::{ClientState, ConnectionState, SharedClientState},
    config::Config,
    error::DashstreamError,
    events::{ClientEvent, EventSender, emit},
    monitoring::{
        CONNECTED_GAUGE, CONNECTION_ATTEMPT_COUNTER, FRAMES_DELIVERED_COUNTER,
        FRAMES_DROPPED_COUNTER, FRAMES_RECEIVED_COUNTER, HealthStatus, RECONNECT_COUNTER,
        SENDS_DROPPED_COUNTER, SUBSCRIBER_PANIC_COUNTER,
    },
    registry::{Callback, SubscriberRegistry, Subscription, callback},
    transport::{Connection, Transport, WsTransport},
    types::{Category, InboundFrame, Notice, ParsedFrame},
};
use serde::Serialize;
use serde_json::Value;
use std::{future::Future, pin::Pin, sync::Arc};
use tokio::{
    sync::{Mutex, mpsc},
    time::{Instant, Sleep, sleep, sleep_until, timeout},
};
use tracing::{debug, info, trace, warn};

#[derive(Debug)]
enum Command {
    Connect,
    Disconnect,
    Send(String),
}

/// Handle to the process-wide event client.
///
/// Cloning yields another handle to the same connection and registry. The
/// supervisor task stops once every handle has been dropped.
#[derive(Clone)]
pub struct EventClient {
    commands: mpsc::UnboundedSender<Command>,
    registry: Arc<SubscriberRegistry>,
    pub state: SharedClientState,
}

impl EventClient {
    /// Spawns the supervisor on the current tokio runtime. No connection is
    /// opened until [`connect`](Self::connect) or [`subscribe`](Self::subscribe).
    pub fn new<T: Transport>(config: Arc<Config>, transport: T, events: EventSender) -> Self {
        let (commands, command_rx) = mpsc::unbounded_channel();
        let registry = Arc::new(SubscriberRegistry::new());
        let state = Arc::new(Mutex::new(ClientState::new()));

        let supervisor = Supervisor {
            config,
            transport,
            commands: command_rx,
            registry: registry.clone(),
            state: state.clone(),
            events,
            idle_deadline: None,
        };
        tokio::spawn(supervisor.run());

        Self {
            commands,
            registry,
            state,
        }
    }

    pub fn with_websocket(config: Arc<Config>, events: EventSender) -> Result<Self, DashstreamError> {
        Ok(Self::new(config, WsTransport::new()?, events))
    }

    /// No-op while open or connecting.
    pub fn connect(&self) {
        self.command(Command::Connect);
    }

    /// Closes the connection and cancels any pending reconnect. Nothing is
    /// retried until the next `connect` or `subscribe`.
    pub fn disconnect(&self) {
        self.command(Command::Disconnect);
    }

    /// Registers `callback` under `category` and makes sure a connection is
    /// open or on its way. Registering the same callback twice is a no-op.
    ///
    /// Callbacks run on the supervisor task and should return quickly.
    pub fn subscribe(&self, category: Category, callback: Callback) -> Subscription {
        if self.registry.insert(category, callback.clone()) {
            debug!(%category, "Subscriber added");
        } else {
            debug!(%category, "Subscriber already registered");
        }
        self.connect();
        Subscription::new(category, callback, self.registry.clone())
    }

    /// Convenience for closures that never need to be unsubscribed by identity.
    pub fn subscribe_fn<F>(&self, category: Category, f: F) -> Subscription
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        self.subscribe(category, callback(f))
    }

    pub fn unsubscribe(&self, category: Category, callback: &Callback) {
        if self.registry.remove(category, callback) {
            debug!(%category, "Subscriber removed");
        }
    }

    /// Fire-and-forget. Dropped with a warning unless the connection is open
    /// when the supervisor gets to it.
    pub fn send<P: Serialize + ?Sized>(&self, payload: &P) {
        match serde_json::to_string(payload) {
            Ok(text) => self.command(Command::Send(text)),
            Err(e) => warn!("Failed to serialize outbound payload: {}", e),
        }
    }

    pub fn listener_count(&self, category: Category) -> usize {
        self.registry.listener_count(category)
    }

    pub async fn connection_state(&self) -> ConnectionState {
        self.state.lock().await.state
    }

    pub async fn health(&self) -> HealthStatus {
        HealthStatus::from_state(&*self.state.lock().await)
    }

    fn command(&self, command: Command) {
        if let Err(e) = self.commands.send(command) {
            warn!(command = ?e.0, "Event client supervisor is gone");
        }
    }
}

type PendingConnect<C> = Pin<Box<dyn Future<Output = Result<C, DashstreamError>> + Send>>;

enum Phase<C> {
    Closed { retry: Option<Pin<Box<Sleep>>> },
    Connecting(PendingConnect<C>),
    Open(C),
}

enum Input<C> {
    Command(Option<Command>),
    RetryDue,
    Attempt(Result<C, DashstreamError>),
    Inbound(Option<Result<String, DashstreamError>>),
    IdleExpired,
}

struct Supervisor<T: Transport> {
    config: Arc<Config>,
    transport: T,
    commands: mpsc::UnboundedReceiver<Command>,
    registry: Arc<SubscriberRegistry>,
    state: SharedClientState,
    events: EventSender,
    idle_deadline: Option<Instant>,
}

impl<T: Transport> Supervisor<T> {
    async fn run(mut self) {
        let mut phase: Phase<T::Conn> = Phase::Closed { retry: None };

        loop {
            let input = self.next_input(&mut phase).await;
            match self.step(phase, input).await {
                Some(next) => phase = next,
                None => break,
            }
        }

        emit(&self.events, ClientEvent::Stopping);
        debug!("Event client supervisor stopped");
    }

    async fn next_input(&mut self, phase: &mut Phase<T::Conn>) -> Input<T::Conn> {
        match phase {
            Phase::Closed { retry: None } => Input::Command(self.commands.recv().await),
            Phase::Closed { retry: Some(timer) } => tokio::select! {
                biased;
                command = self.commands.recv() => Input::Command(command),
                () = timer.as_mut() => Input::RetryDue,
            },
            Phase::Connecting(attempt) => tokio::select! {
                biased;
                command = self.commands.recv() => Input::Command(command),
                result = attempt.as_mut() => Input::Attempt(result),
            },
            Phase::Open(conn) => {
                let deadline = self.idle_deadline;
                tokio::select! {
                    biased;
                    command = self.commands.recv() => Input::Command(command),
                    inbound = conn.recv() => Input::Inbound(inbound),
                    () = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                        Input::IdleExpired
                    }
                }
            }
        }
    }

    /// Applies one input. `None` stops the supervisor.
    async fn step(&mut self, phase: Phase<T::Conn>, input: Input<T::Conn>) -> Option<Phase<T::Conn>> {
        let next = match (phase, input) {
            (phase, Input::Command(None)) => {
                if let Phase::Open(mut conn) = phase {
                    self.close_connection(&mut conn).await;
                }
                self.state.lock().await.mark_closed();
                CONNECTED_GAUGE.set(0.0);
                return None;
            }

            (Phase::Closed { .. }, Input::Command(Some(Command::Connect)))
            | (Phase::Closed { .. }, Input::RetryDue) => self.start_attempt().await,

            (phase @ (Phase::Connecting(_) | Phase::Open(_)), Input::Command(Some(Command::Connect))) => {
                debug!("Connect ignored; connection already open or in progress");
                phase
            }

            (phase, Input::Command(Some(Command::Disconnect))) => self.shut_down(phase).await,

            (Phase::Open(mut conn), Input::Command(Some(Command::Send(text)))) => {
                match conn.send(text).await {
                    Ok(()) => Phase::Open(conn),
                    Err(e) => {
                        warn!("Send failed, dropping connection: {}", e);
                        self.connection_lost(format!("send failed: {e}")).await
                    }
                }
            }

            (phase, Input::Command(Some(Command::Send(_)))) => {
                warn!("Send dropped; connection is not open");
                self.state.lock().await.record_send_dropped();
                SENDS_DROPPED_COUNTER.increment(1);
                phase
            }

            (Phase::Connecting(_), Input::Attempt(Ok(conn))) => {
                let connection_id = self.state.lock().await.mark_open();
                self.reset_idle_deadline();
                CONNECTED_GAUGE.set(1.0);
                info!(
                    connection_id = %connection_id,
                    "Connected to {}", self.config.stream.url
                );
                emit(&self.events, ClientEvent::Connected { connection_id });
                Phase::Open(conn)
            }

            (Phase::Connecting(_), Input::Attempt(Err(e))) => {
                warn!("Connection attempt failed: {}", e);
                self.schedule_retry(e.to_string()).await
            }

            (Phase::Open(conn), Input::Inbound(Some(Ok(text)))) => {
                self.reset_idle_deadline();
                self.handle_text(&text).await;
                Phase::Open(conn)
            }

            (Phase::Open(_), Input::Inbound(Some(Err(e)))) => {
                warn!("WebSocket stream error: {}", e);
                self.connection_lost(e.to_string()).await
            }

            (Phase::Open(_), Input::Inbound(None)) => {
                warn!("Connection closed by server");
                self.connection_lost(DashstreamError::ConnectionClosed.to_string())
                    .await
            }

            (Phase::Open(mut conn), Input::IdleExpired) => {
                warn!(
                    "No frames for {:?}; treating connection as dropped",
                    self.config.stream.idle_timeout
                );
                self.close_connection(&mut conn).await;
                self.connection_lost("idle timeout".to_string()).await
            }

            // inputs are only produced for the phase that awaited them
            (phase, _) => phase,
        };
        Some(next)
    }

    async fn start_attempt(&mut self) -> Phase<T::Conn> {
        let attempt = {
            let mut state = self.state.lock().await;
            state.begin_attempt();
            state
                .connection_attempts
                .load(std::sync::atomic::Ordering::Relaxed)
        };
        CONNECTION_ATTEMPT_COUNTER.increment(1);

        let url = self.config.stream.url.clone();
        debug!(%url, attempt, "Opening connection");
        emit(
            &self.events,
            ClientEvent::Connecting {
                url: url.to_string(),
                attempt,
            },
        );

        let transport = self.transport.clone();
        let limit = self.config.stream.connect_timeout;
        Phase::Connecting(Box::pin(async move {
            match timeout(limit, transport.connect(&url)).await {
                Ok(result) => result,
                Err(_) => Err(DashstreamError::Timeout),
            }
        }))
    }

    async fn shut_down(&mut self, phase: Phase<T::Conn>) -> Phase<T::Conn> {
        match phase {
            Phase::Open(mut conn) => {
                self.close_connection(&mut conn).await;
                info!("Disconnected on request");
            }
            Phase::Connecting(_) => info!("Connection attempt abandoned on request"),
            Phase::Closed { retry: Some(_) } => info!("Pending reconnect cancelled"),
            Phase::Closed { retry: None } => {
                debug!("Disconnect ignored; already closed");
                return Phase::Closed { retry: None };
            }
        }
        self.state.lock().await.mark_closed();
        self.idle_deadline = None;
        CONNECTED_GAUGE.set(0.0);
        emit(&self.events, ClientEvent::Disconnected);
        Phase::Closed { retry: None }
    }

    /// Graceful close, bounded by the connect timeout.
    async fn close_connection(&self, conn: &mut T::Conn) {
        let limit = self.config.stream.connect_timeout;
        if timeout(limit, conn.close()).await.is_err() {
            warn!("Close did not complete within {:?}; dropping connection", limit);
        }
    }

    async fn connection_lost(&mut self, reason: String) -> Phase<T::Conn> {
        CONNECTED_GAUGE.set(0.0);
        emit(&self.events, ClientEvent::Disconnected);
        self.schedule_retry(reason).await
    }

    async fn schedule_retry(&mut self, reason: String) -> Phase<T::Conn> {
        self.idle_deadline = None;
        let streak = self.state.lock().await.mark_failed();
        let delay = self.config.stream.reconnect.delay_for(streak);
        RECONNECT_COUNTER.increment(1);

        warn!(
            "Reconnecting in {} ms (attempt {})",
            delay.as_millis(),
            streak
        );
        emit(&self.events, ClientEvent::ConnectionFailed(reason));
        emit(
            &self.events,
            ClientEvent::Reconnecting {
                attempt: streak,
                delay_ms: delay.as_millis() as u64,
            },
        );

        Phase::Closed {
            retry: Some(Box::pin(sleep(delay))),
        }
    }

    fn reset_idle_deadline(&mut self) {
        self.idle_deadline = self
            .config
            .stream
            .idle_timeout
            .map(|idle| Instant::now() + idle);
    }

    async fn handle_text(&mut self, text: &str) {
        trace!("Received text message: {}", text);
        self.state.lock().await.record_message();
        FRAMES_RECEIVED_COUNTER.increment(1);

        match InboundFrame::parse(text) {
            ParsedFrame::Routable(frame) => self.route(frame).await,
            ParsedFrame::Malformed(reason) => {
                warn!(
                    "Discarding malformed frame: {}. Message: {}",
                    reason,
                    text.chars().take(100).collect::<String>()
                );
                self.record_drop().await;
            }
            ParsedFrame::MissingCategory => {
                debug!("Discarding frame without a type");
                self.record_drop().await;
            }
            ParsedFrame::UnknownCategory(kind) => {
                debug!(kind = %kind, "Ignoring frame for unrecognized category");
                self.record_drop().await;
            }
        }
    }

    async fn route(&mut self, frame: InboundFrame) {
        let mut noticed = false;
        if frame.category == Category::Notification {
            match frame.decode::<Notice>() {
                Ok(notice) => {
                    info!(title = %notice.title, "Notification received");
                    emit(&self.events, ClientEvent::Notice(notice));
                    noticed = true;
                }
                Err(e) => warn!("Notification payload has no title/message: {}", e),
            }
        }

        let report = self.registry.dispatch(frame.category, &frame.payload);
        if report.delivered == 0 && report.panicked == 0 {
            debug!(category = %frame.category, "No subscribers for frame");
            if !noticed {
                self.record_drop().await;
            }
            return;
        }

        self.state.lock().await.record_delivery(report.panicked);
        FRAMES_DELIVERED_COUNTER.increment(1);
        if report.panicked > 0 {
            SUBSCRIBER_PANIC_COUNTER.increment(report.panicked as u64);
        }
    }

    async fn record_drop(&self) {
        self.state.lock().await.record_drop();
        FRAMES_DROPPED_COUNTER.increment(1);
    }
}
