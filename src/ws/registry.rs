use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use super::connctx::ConnCtx;
use super::fanout::ResultBus;
use super::roomctx::RoomSession;
use super::roomid::generate_room_id;
use crate::models::{ExecutionResult, Peer};

/// Outcome of attaching a connection to a room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub room_id: String,
    pub is_new_room: bool,
}

/// All live rooms of this process.
///
/// Every mutation of a room happens under that room's own lock, so two events
/// for the same room never interleave while different rooms proceed in
/// parallel. Lock order is always map first, then room.
pub struct RoomRegistry {
    rooms: Mutex<HashMap<String, Arc<Mutex<RoomSession>>>>,
    results: Arc<dyn ResultBus>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl RoomRegistry {
    pub fn new(results: Arc<dyn ResultBus>) -> Self {
        Self {
            rooms: Mutex::new(HashMap::new()),
            results,
        }
    }

    /// Attach a connection, generating a fresh room id when none is given.
    /// The room's in-memory state is created on demand; whether the room
    /// exists durably is not checked here.
    pub fn attach(&self, requested_room: Option<&str>, conn: ConnCtx) -> Attachment {
        let mut rooms = lock(&self.rooms);

        let (room_id, is_new_room) = match requested_room.map(str::trim).filter(|r| !r.is_empty()) {
            Some(room_id) => (room_id.to_string(), false),
            None => (generate_room_id(|candidate| rooms.contains_key(candidate)), true),
        };

        let room = rooms
            .entry(room_id.clone())
            .or_insert_with(|| {
                if is_new_room {
                    info!("Created new room with ID: {}", room_id);
                } else {
                    info!("Creating in-memory entry for existing room: {}", room_id);
                }
                Arc::new(Mutex::new(RoomSession::new(&room_id)))
            })
            .clone();

        let mut session = lock(&room);
        drop(rooms);

        if !session.has_subscription() {
            let rx = self.results.subscribe(&room_id);
            let handle = tokio::spawn(forward_results(room_id.clone(), rx, Arc::downgrade(&room)));
            session.set_subscription(handle);
        }

        session.join(conn, is_new_room);
        let empty = session.is_empty();
        drop(session);

        // The joiner's own socket may already be dead.
        if empty {
            self.reclaim(&room_id);
        }

        Attachment { room_id, is_new_room }
    }

    /// Remove a connection; the last one out tears the room down.
    pub fn detach(&self, room_id: &str, conn_id: &str) {
        self.with_room(room_id, |session| {
            session.leave(conn_id);
        });
    }

    /// Run `f` under the room's lock. Returns `None` when the room is not live.
    pub fn with_room<R>(&self, room_id: &str, f: impl FnOnce(&mut RoomSession) -> R) -> Option<R> {
        let room = lock(&self.rooms).get(room_id).cloned()?;
        let (out, empty) = {
            let mut session = lock(&room);
            let out = f(&mut session);
            (out, session.is_empty())
        };
        if empty {
            self.reclaim(room_id);
        }
        Some(out)
    }

    /// Like [`with_room`](Self::with_room), but only while `conn_id` is still
    /// registered. Events from a handle that a reconnect replaced are dropped.
    pub fn with_member<R>(
        &self,
        room_id: &str,
        conn_id: &str,
        f: impl FnOnce(&mut RoomSession) -> R,
    ) -> Option<R> {
        self.with_room(room_id, |session| {
            if !session.contains(conn_id) {
                debug!("Ignoring event from replaced connection {} in room {}", conn_id, room_id);
                return None;
            }
            Some(f(session))
        })
        .flatten()
    }

    /// Drop an empty room's memory and its result subscription. Durable data
    /// is untouched.
    fn reclaim(&self, room_id: &str) {
        let mut rooms = lock(&self.rooms);
        let Some(room) = rooms.get(room_id).cloned() else {
            return;
        };
        let mut session = lock(&room);
        if !session.is_empty() {
            // Someone joined in between.
            return;
        }
        rooms.remove(room_id);
        session.close_subscription();
        drop(session);

        // Still under the map lock, so a concurrent attach of the same id
        // subscribes only after the old channel is gone.
        self.results.unsubscribe(room_id);
        drop(rooms);
        info!("Room {} is empty, released", room_id);
    }

    pub fn list_peers(&self, room_id: &str) -> Vec<Peer> {
        self.with_room(room_id, |session| session.peers()).unwrap_or_default()
    }

    pub fn active_typist(&self, room_id: &str) -> Option<String> {
        self.with_room(room_id, |session| session.active_typist().map(str::to_string))
            .flatten()
    }

    pub fn is_live(&self, room_id: &str) -> bool {
        lock(&self.rooms).contains_key(room_id)
    }

    pub fn room_count(&self) -> usize {
        lock(&self.rooms).len()
    }

    pub fn connection_count(&self) -> usize {
        let rooms: Vec<_> = lock(&self.rooms).values().cloned().collect();
        rooms.iter().map(|room| lock(room).len()).sum()
    }

    pub fn result_channel_count(&self) -> usize {
        self.results.channel_count()
    }
}

/// Pump one room's published results into the room until it is torn down.
async fn forward_results(
    room_id: String,
    mut rx: broadcast::Receiver<ExecutionResult>,
    room: Weak<Mutex<RoomSession>>,
) {
    loop {
        match rx.recv().await {
            Ok(result) => {
                let Some(room) = room.upgrade() else {
                    break;
                };
                lock(&room).deliver_result(result);
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!("Room {} skipped {} execution results", room_id, skipped);
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}
