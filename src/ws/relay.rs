//! Event delivery over the presence registry.
//!
//! Delivery is best-effort and at-most-once: if the target is not registered
//! the event is dropped silently — absence is not an error. Enqueueing on a
//! connection handle never blocks; the per-connection writer task drains the
//! channel in FIFO order.

use crate::ws::events::ServerEvent;
use crate::ws::registry::PresenceRegistry;

/// Send `event` to `user_id`'s connection, if they are online.
pub fn deliver_to(registry: &PresenceRegistry, user_id: &str, event: &ServerEvent) {
    let Some(msg) = event.to_message() else {
        return;
    };
    if let Some(handle) = registry.lookup(user_id) {
        // A send error means the connection is tearing down — the
        // disconnect path will remove the entry.
        let _ = handle.send(msg);
    }
}

/// Send the full online-users snapshot to every registered connection.
///
/// The snapshot is taken once, serialized once, and every client receives
/// the identical payload. Full snapshots instead of deltas keep clients from
/// ever diverging on missed updates; the O(N) cost per connect/disconnect is
/// acceptable at this scale.
pub fn broadcast_presence(registry: &PresenceRegistry) {
    let snapshot = registry.snapshot_identities();
    let event = ServerEvent::OnlineUsers(snapshot);
    let Some(msg) = event.to_message() else {
        return;
    };

    for handle in registry.registered_handles() {
        let _ = handle.send(msg.clone());
    }
}
