pub mod actor;
pub mod events;
pub mod handler;
pub mod registry;
pub mod relay;
pub mod signaling;

use tokio::sync::mpsc;

/// Sender half of a WebSocket connection's channel.
/// Other parts of the system clone this to push events to one specific client.
/// The mpsc channel plus the single writer task per connection give FIFO
/// ordering of deliveries to that connection.
pub type ConnectionHandle = mpsc::UnboundedSender<axum::extract::ws::Message>;
