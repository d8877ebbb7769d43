#![doc = include_str!("../docs/rustdoc.md")]

/// Command-line argument definitions.
pub mod cli;
/// Event client handle and connection supervisor.
pub mod client;
/// Shared connection state and counters.
pub mod client_state;
/// Runtime configuration and reconnect policy.
pub mod config;
/// Error types used across the crate.
pub mod error;
/// Side-channel events between client and UI.
pub mod events;
/// Terminal output formatters.
pub mod formatter;
/// Metrics and health status structures.
pub mod monitoring;
/// Subscriber registry and subscription handles.
pub mod registry;
/// Tracing/logging initialization.
pub mod tracing_setup;
/// Connection traits and the WebSocket transport.
pub mod transport;
/// Frame envelope, categories and payload models.
pub mod types;
/// UI controller and presentation loop.
pub mod ui;

pub use client::EventClient;
pub use client_state::ConnectionState;
/// Primary crate error type.
pub use error::DashstreamError;
pub use registry::{Callback, Subscription, callback};
pub use types::{Category, InboundFrame};
