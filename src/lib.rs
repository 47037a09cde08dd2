#![doc = include_str!("../docs/rustdoc.md")]

/// Command-line argument definitions.
pub mod cli;
/// Chat transport client event loop and consumer handle.
pub mod client;
/// Connection state machine and shared state.
pub mod client_state;
/// Runtime configuration model.
pub mod config;
/// Error types used across the crate.
pub mod error;
/// Event bus messages between client and UI.
pub mod events;
/// Terminal output formatters.
pub mod formatter;
/// Metrics and health status structures.
pub mod monitoring;
/// Tracing/logging initialization.
pub mod tracing_setup;
/// WebSocket transport setup (plain and TLS).
pub mod transport;
/// Chat wire protocol and consumer-facing message types.
pub mod types;
/// UI controller and presentation loop.
pub mod ui;

/// Primary crate error type.
pub use error::ChatClientError;

pub use client::{ChatClientHandle, ChatTransportClient};
pub use client_state::{ConnectionState, ConnectionStatus};
pub use events::ClientEvent;
pub use types::{ChatEvent, Sender};
