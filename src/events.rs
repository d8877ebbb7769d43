/// file: src/events.rs
/// description: side channel carrying lifecycle changes and user-facing notices from the client to the UI
use crate::types::Notice;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::warn;

#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    Connecting { url: String, attempt: u64 },
    Connected { connection_id: String },
    ConnectionFailed(String),
    Reconnecting { attempt: u32, delay_ms: u64 },
    Disconnected,
    /// Raised for every `notification` frame, in addition to subscriber delivery.
    Notice(Notice),
    Stopping,
}

// The supervisor never waits on the UI. Bursts beyond this are dropped.
const EVENT_CHANNEL_CAPACITY: usize = 1_024;

pub type EventSender = mpsc::Sender<ClientEvent>;
pub type EventReceiver = mpsc::Receiver<ClientEvent>;

pub fn create_event_channel() -> (EventSender, EventReceiver) {
    mpsc::channel(EVENT_CHANNEL_CAPACITY)
}

/// Offers an event without blocking. A closed channel means nobody is
/// listening, which is fine.
pub(crate) fn emit(sender: &EventSender, event: ClientEvent) {
    match sender.try_send(event) {
        Ok(()) | Err(TrySendError::Closed(_)) => {}
        Err(TrySendError::Full(event)) => {
            warn!(?event, "Event channel full; dropping client event");
        }
    }
}
