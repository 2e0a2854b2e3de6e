//! Room-based connection registry.
//!
//! Tracks which live connections exist, which user each one has identified
//! as, and which rooms each one is subscribed to. The membership relation is
//! the only shared mutable state in the messaging core; every operation here
//! runs to completion under a single mutex and never awaits while holding it.

use crate::error::RegistryError;
use crate::message::MessageRecord;
use crate::room::{ConnectionId, RoomKey};
use alumnet_core::UserId;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;
use tracing::debug;

/// Sending half of a connection's bounded outbound queue.
pub type Outbox = mpsc::Sender<Arc<MessageRecord>>;

/// A live connection subscribed to a room, as seen by the dispatcher.
#[derive(Debug, Clone)]
pub struct Subscriber {
    /// The subscribed connection.
    pub connection_id: ConnectionId,
    /// Where pushes for this connection are queued.
    pub outbox: Outbox,
}

#[derive(Debug)]
struct ConnectionEntry {
    user_id: Option<UserId>,
    outbox: Outbox,
    rooms: HashSet<RoomKey>,
}

#[derive(Debug, Default)]
struct RegistryState {
    connections: HashMap<ConnectionId, ConnectionEntry>,
    rooms: HashMap<RoomKey, HashSet<ConnectionId>>,
}

/// Registry of live connections and their room memberships.
///
/// Construct one per process (or per test) and share it behind an `Arc`.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    state: Mutex<RegistryState>,
}

impl ConnectionRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, RegistryState> {
        // Every mutation leaves the maps consistent before it can panic.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers a live connection with its outbound queue.
    ///
    /// Registering an id that is already live swaps in the new outbox and
    /// keeps existing memberships.
    pub fn connect(&self, connection_id: ConnectionId, outbox: Outbox) {
        let mut state = self.lock();
        match state.connections.get_mut(&connection_id) {
            Some(entry) => entry.outbox = outbox,
            None => {
                state.connections.insert(
                    connection_id.clone(),
                    ConnectionEntry {
                        user_id: None,
                        outbox,
                        rooms: HashSet::new(),
                    },
                );
            }
        }
        debug!(%connection_id, live = state.connections.len(), "connection registered");
    }

    /// Subscribes a live connection to a room.
    ///
    /// Idempotent: returns `Ok(false)` if the connection was already a member.
    /// When the room is a per-user room the connection is attributed to that
    /// user.
    pub fn join(&self, connection_id: &ConnectionId, room: &RoomKey) -> Result<bool, RegistryError> {
        let mut guard = self.lock();
        let state = &mut *guard;
        let Some(entry) = state.connections.get_mut(connection_id) else {
            return Err(RegistryError::UnknownConnection {
                connection_id: connection_id.clone(),
            });
        };

        if let Some(user_id) = room.user() {
            entry.user_id = Some(user_id);
        }
        if !entry.rooms.insert(room.clone()) {
            return Ok(false);
        }

        state
            .rooms
            .entry(room.clone())
            .or_default()
            .insert(connection_id.clone());
        debug!(%connection_id, %room, "joined room");
        Ok(true)
    }

    /// Removes a connection and every membership it holds.
    ///
    /// Safe to call for ids that were never registered. Returns how many
    /// room memberships were dropped.
    pub fn leave(&self, connection_id: &ConnectionId) -> usize {
        let mut guard = self.lock();
        let state = &mut *guard;
        let Some(entry) = state.connections.remove(connection_id) else {
            return 0;
        };

        for room in &entry.rooms {
            if let Some(members) = state.rooms.get_mut(room) {
                members.remove(connection_id);
                if members.is_empty() {
                    state.rooms.remove(room);
                }
            }
        }
        debug!(%connection_id, rooms = entry.rooms.len(), "connection removed");
        entry.rooms.len()
    }

    /// Returns the live connections currently subscribed to a room.
    #[must_use]
    pub fn members_of(&self, room: &RoomKey) -> HashSet<ConnectionId> {
        self.lock().rooms.get(room).cloned().unwrap_or_default()
    }

    /// Snapshots the outboxes of a room's members.
    ///
    /// The snapshot is taken under the lock and used after it is released,
    /// so transmission never blocks registry mutations.
    #[must_use]
    pub fn subscribers(&self, room: &RoomKey) -> Vec<Subscriber> {
        let state = self.lock();
        let Some(members) = state.rooms.get(room) else {
            return Vec::new();
        };
        members
            .iter()
            .filter_map(|id| {
                state.connections.get(id).map(|entry| Subscriber {
                    connection_id: id.clone(),
                    outbox: entry.outbox.clone(),
                })
            })
            .collect()
    }

    /// The user a connection identified as, if it has joined a user room.
    #[must_use]
    pub fn user_of(&self, connection_id: &ConnectionId) -> Option<UserId> {
        self.lock()
            .connections
            .get(connection_id)
            .and_then(|entry| entry.user_id)
    }

    /// Number of live connections.
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.lock().connections.len()
    }

    /// Number of rooms with at least one member.
    #[must_use]
    pub fn room_count(&self) -> usize {
        self.lock().rooms.len()
    }
}
