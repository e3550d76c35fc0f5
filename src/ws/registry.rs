//! In-memory presence registry: user id -> the one live connection for that user.
//!
//! The registry is the single source of truth for who is online. A new
//! connection for the same user replaces any prior entry (last write wins);
//! removal is conditional on the connection id so a stale disconnect can
//! never clobber a newer reconnect's entry.

use dashmap::DashMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::ws::ConnectionHandle;

#[derive(Clone)]
struct RegisteredConnection {
    conn_id: Uuid,
    handle: ConnectionHandle,
}

/// Concurrent map from user id to their active connection.
///
/// Mutated only by the connection lifecycle (register/unregister); read by
/// the relay and signaling router (lookup/snapshot). No sends happen while a
/// map shard guard is held — lookups clone the sender, snapshots copy out.
#[derive(Clone, Default)]
pub struct PresenceRegistry {
    entries: Arc<DashMap<String, RegisteredConnection>>,
}

impl PresenceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `handle` as the connection for `user_id`, replacing any
    /// existing entry. The superseded connection (if any) stays open but is
    /// no longer addressable; its own disconnect is absorbed by the
    /// conditional `unregister`.
    pub fn register(&self, user_id: &str, conn_id: Uuid, handle: ConnectionHandle) {
        self.entries
            .insert(user_id.to_string(), RegisteredConnection { conn_id, handle });
    }

    /// Remove the entry for `user_id` only if it still belongs to `conn_id`.
    /// Returns whether an entry was removed.
    pub fn unregister(&self, user_id: &str, conn_id: Uuid) -> bool {
        self.entries
            .remove_if(user_id, |_, entry| entry.conn_id == conn_id)
            .is_some()
    }

    /// Connection handle for `user_id`, if they are online.
    pub fn lookup(&self, user_id: &str) -> Option<ConnectionHandle> {
        self.entries.get(user_id).map(|entry| entry.handle.clone())
    }

    /// Sorted snapshot of all online user ids.
    pub fn snapshot_identities(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.entries.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        ids
    }

    /// Handles for every registered connection, cloned out so callers send
    /// without touching the map.
    pub fn registered_handles(&self) -> Vec<ConnectionHandle> {
        self.entries
            .iter()
            .map(|entry| entry.handle.clone())
            .collect()
    }
}
