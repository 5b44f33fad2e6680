//! Realtime rooms and the registry that owns them.
//!
//! DESIGN
//! ======
//! A `Registry` maps a room key (board id or team id) to a `Room`. A room
//! holds the live connections for one collaborative surface; each connection
//! is represented by the sending half of its outbound channel.
//!
//! LOCKING
//! =======
//! Two lock levels: the registry mutex guards the key -> room map, and each
//! room's `RwLock` guards its client set. The registry lock may be held while
//! taking a room lock (join, eviction check); a room lock is never held while
//! taking the registry lock. Broadcast only iterates the client set and calls
//! `try_send`, so no socket I/O happens under either lock.
//!
//! Rooms are created on first join and evicted as soon as the last client
//! leaves, so memory is bounded by the set of active rooms.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock, mpsc};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Serialized frame queued for one connection.
pub type Outbound = Arc<str>;

/// Capacity of each connection's outbound queue.
pub const CLIENT_QUEUE_CAPACITY: usize = 256;

// =============================================================================
// CLIENT
// =============================================================================

/// One registered connection.
#[derive(Debug, Clone)]
pub struct Client {
    pub user_id: Uuid,
    /// Caller-supplied display name. Not checked against any user directory.
    pub name: String,
    pub tx: mpsc::Sender<Outbound>,
}

/// Public view of a client, as sent in presence lists.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Participant {
    pub user_id: Uuid,
    pub name: String,
}

// =============================================================================
// ROOM
// =============================================================================

/// Live connections sharing one whiteboard or one team chat.
#[derive(Debug, Default)]
pub struct Room {
    clients: RwLock<HashMap<Uuid, Client>>,
}

impl Room {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection. Replaces any previous entry for the same id.
    pub async fn join(&self, client_id: Uuid, client: Client) {
        self.clients.write().await.insert(client_id, client);
    }

    /// Remove a connection. Returns whether the room is now empty.
    pub async fn leave(&self, client_id: Uuid) -> bool {
        let mut clients = self.clients.write().await;
        clients.remove(&client_id);
        clients.is_empty()
    }

    pub async fn len(&self) -> usize {
        self.clients.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.clients.read().await.is_empty()
    }

    /// Deliver to every registered connection.
    pub async fn broadcast_all(&self, message: &Outbound) {
        self.deliver(message, None).await;
    }

    /// Deliver to every registered connection except `sender`.
    pub async fn broadcast_others(&self, sender: Uuid, message: &Outbound) {
        self.deliver(message, Some(sender)).await;
    }

    /// Deliver to a single connection, if it is still registered.
    pub async fn send_to(&self, client_id: Uuid, message: &Outbound) {
        let clients = self.clients.read().await;
        if let Some(client) = clients.get(&client_id) {
            try_deliver(client_id, client, message);
        }
    }

    /// Connected users, de-duplicated by user id in first-seen order.
    pub async fn participants(&self) -> Vec<Participant> {
        let clients = self.clients.read().await;
        let mut seen = HashSet::with_capacity(clients.len());
        let mut list = Vec::with_capacity(clients.len());
        for client in clients.values() {
            if seen.insert(client.user_id) {
                list.push(Participant { user_id: client.user_id, name: client.name.clone() });
            }
        }
        list
    }

    async fn deliver(&self, message: &Outbound, exclude: Option<Uuid>) {
        let clients = self.clients.read().await;
        for (client_id, client) in clients.iter() {
            if exclude == Some(*client_id) {
                continue;
            }
            try_deliver(*client_id, client, message);
        }
    }
}

/// Best-effort: a full or closed queue drops this frame for this client only.
fn try_deliver(client_id: Uuid, client: &Client, message: &Outbound) {
    match client.tx.try_send(Arc::clone(message)) {
        Ok(()) => {}
        Err(mpsc::error::TrySendError::Full(_)) => {
            warn!(%client_id, user_id = %client.user_id, "room: client queue full; frame dropped");
        }
        Err(mpsc::error::TrySendError::Closed(_)) => {
            debug!(%client_id, "room: client queue closed; frame dropped");
        }
    }
}

// =============================================================================
// REGISTRY
// =============================================================================

/// Key -> room map with create-on-join and evict-on-last-leave lifecycle.
#[derive(Debug, Default)]
pub struct Registry {
    label: &'static str,
    rooms: Mutex<HashMap<String, Arc<Room>>>,
}

impl Registry {
    /// `label` only tags log lines ("whiteboard", "chat").
    #[must_use]
    pub fn new(label: &'static str) -> Self {
        Self { label, rooms: Mutex::new(HashMap::new()) }
    }

    /// Drop the entry for `key` if its room has no clients. Returns whether
    /// an entry was removed.
    pub async fn remove_if_empty(&self, key: &str) -> bool {
        let mut rooms = self.rooms.lock().await;
        let Some(room) = rooms.get(key) else {
            return false;
        };
        if !room.is_empty().await {
            return false;
        }
        rooms.remove(key);
        info!(registry = self.label, room = %key, "room evicted");
        true
    }

    /// Get or create the room and register the client in one registry
    /// critical section, so a concurrent eviction cannot orphan the joiner.
    pub async fn join(&self, key: &str, client_id: Uuid, client: Client) -> Arc<Room> {
        let mut rooms = self.rooms.lock().await;
        let room = self.entry(&mut rooms, key);
        let user_id = client.user_id;
        room.join(client_id, client).await;
        let clients = room.len().await;
        info!(registry = self.label, room = %key, %client_id, %user_id, clients, "client joined room");
        room
    }

    /// Deregister the client and evict the room if it became empty.
    pub async fn leave(&self, key: &str, room: &Room, client_id: Uuid) {
        let now_empty = room.leave(client_id).await;
        info!(registry = self.label, room = %key, %client_id, "client left room");
        if now_empty {
            self.remove_if_empty(key).await;
        }
    }

    /// Existing room for `key`, or a newly inserted empty one.
    fn entry(&self, rooms: &mut HashMap<String, Arc<Room>>, key: &str) -> Arc<Room> {
        Arc::clone(rooms.entry(key.to_owned()).or_insert_with(|| {
            debug!(registry = self.label, room = %key, "room created");
            Arc::new(Room::new())
        }))
    }
}

#[cfg(test)]
impl Registry {
    pub async fn get_or_create_room(&self, key: &str) -> Arc<Room> {
        let mut rooms = self.rooms.lock().await;
        self.entry(&mut rooms, key)
    }

    pub async fn contains(&self, key: &str) -> bool {
        self.rooms.lock().await.contains_key(key)
    }

    pub async fn room_count(&self) -> usize {
        self.rooms.lock().await.len()
    }
}

#[cfg(test)]
#[path = "room_test.rs"]
mod tests;
