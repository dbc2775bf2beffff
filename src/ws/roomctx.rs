use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::connctx::ConnCtx;
use crate::models::{ExecutionResult, OutboundMessage, Peer};

/// Ephemeral state of one live room.
///
/// The shared document (code, language, run button, I/O sessions) is not
/// stored here. It lives in the clients and is relayed between them with
/// last-writer-wins semantics: whatever arrives last at the coordinator is
/// what peers end up showing. No merging or conflict resolution happens.
///
/// Invariant: `active_typist_id` is `None` or the user id of a connection in
/// `connections`.
#[derive(Debug)]
pub struct RoomSession {
    room_id: String,
    connections: Vec<ConnCtx>,
    active_typist_id: Option<String>,
    result_requester: Option<String>,
    subscription: Option<JoinHandle<()>>,
}

impl RoomSession {
    pub fn new(room_id: &str) -> Self {
        Self {
            room_id: room_id.to_string(),
            connections: Vec::new(),
            active_typist_id: None,
            result_requester: None,
            subscription: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    /// Whether `conn_id` is still a registered handle of this room.
    pub fn contains(&self, conn_id: &str) -> bool {
        self.connections.iter().any(|c| c.conn_id == conn_id)
    }

    pub fn peers(&self) -> Vec<Peer> {
        self.connections.iter().map(ConnCtx::peer).collect()
    }

    pub fn active_typist(&self) -> Option<&str> {
        self.active_typist_id.as_deref()
    }

    pub fn has_subscription(&self) -> bool {
        self.subscription.is_some()
    }

    pub fn set_subscription(&mut self, handle: JoinHandle<()>) {
        if let Some(old) = self.subscription.replace(handle) {
            old.abort();
        }
    }

    pub fn close_subscription(&mut self) {
        if let Some(handle) = self.subscription.take() {
            handle.abort();
        }
    }

    fn has_user(&self, user_id: &str) -> bool {
        self.connections.iter().any(|c| c.user_id == user_id)
    }

    pub fn users_message(&self) -> OutboundMessage {
        OutboundMessage::Users {
            users: self.peers(),
            active_typist_id: self.active_typist_id.clone(),
        }
    }

    pub fn typist_message(&self) -> OutboundMessage {
        OutboundMessage::ActiveTypist {
            active_typist_id: self.active_typist_id.clone(),
        }
    }

    /// Add a connection. A second connection for the same user replaces the
    /// first in place; the stale handle is simply forgotten.
    pub fn join(&mut self, conn: ConnCtx, is_new_room: bool) {
        let message = if is_new_room {
            format!("Created new room with ID: {}", self.room_id)
        } else {
            format!("Joined room with ID: {}", self.room_id)
        };
        let user_id = conn.user_id.clone();
        // A failure here is picked up by the broadcasts below.
        let _ = conn.send(OutboundMessage::RoomId {
            room_id: self.room_id.clone(),
            is_new_room,
            message,
        });

        match self.connections.iter_mut().find(|c| c.user_id == conn.user_id) {
            Some(existing) => {
                info!("User {} reconnected to room {}, replacing stale handle", conn.user_id, self.room_id);
                *existing = conn;
            }
            None => {
                info!("User {} ({}) joined room {}", conn.user_id, conn.name, self.room_id);
                self.connections.push(conn);
            }
        }

        if self.active_typist_id.is_none() {
            self.active_typist_id = Some(user_id);
        }

        self.broadcast(self.users_message());
        self.broadcast(self.typist_message());
    }

    /// Remove the connection `conn_id`. Returns false when the handle was
    /// already replaced or removed.
    pub fn leave(&mut self, conn_id: &str) -> bool {
        if !self.contains(conn_id) {
            return false;
        }
        self.forget(vec![conn_id.to_string()]);
        true
    }

    /// Remove connections and tell the remaining members, repeating while
    /// those notifications uncover more dead handles.
    fn forget(&mut self, mut gone: Vec<String>) {
        while !gone.is_empty() {
            self.connections.retain(|c| {
                let keep = !gone.contains(&c.conn_id);
                if !keep {
                    info!("User {} left room {}", c.user_id, self.room_id);
                }
                keep
            });

            let typist_cleared = self
                .active_typist_id
                .as_deref()
                .is_some_and(|typist| !self.has_user(typist));
            if typist_cleared {
                self.active_typist_id = None;
            }

            gone = self.send_where(&self.users_message(), |_| true);
            if typist_cleared {
                gone.extend(self.send_where(&self.typist_message(), |_| true));
            }
            gone.sort();
            gone.dedup();
        }
    }

    /// Send to every matching connection; returns the handles that are dead.
    fn send_where(&self, msg: &OutboundMessage, filter: impl Fn(&ConnCtx) -> bool) -> Vec<String> {
        self.connections
            .iter()
            .filter(|c| filter(c))
            .filter_map(|c| match c.send(msg.clone()) {
                Ok(()) => None,
                Err(_) => {
                    warn!("Dropping dead connection {} of user {} in room {}", c.conn_id, c.user_id, self.room_id);
                    Some(c.conn_id.clone())
                }
            })
            .collect()
    }

    fn dispatch(&mut self, msg: OutboundMessage, filter: impl Fn(&ConnCtx) -> bool) -> usize {
        let targets = self.connections.iter().filter(|c| filter(c)).count();
        let dead = self.send_where(&msg, filter);
        let delivered = targets - dead.len();
        self.forget(dead);
        delivered
    }

    /// Send to every member, the sender included.
    pub fn broadcast(&mut self, msg: OutboundMessage) -> usize {
        self.dispatch(msg, |_| true)
    }

    /// Send to every member except the connection `conn_id`.
    pub fn broadcast_except(&mut self, conn_id: &str, msg: OutboundMessage) -> usize {
        self.dispatch(msg, |c| c.conn_id != conn_id)
    }

    pub fn send_to_user(&mut self, user_id: &str, msg: OutboundMessage) -> usize {
        self.dispatch(msg, |c| c.user_id == user_id)
    }

    /// Ask the first other member to send its snapshot to `requester`.
    /// Returns false when nobody else is connected.
    pub fn forward_sync_request(&mut self, requester: &str) -> bool {
        // Walk peers in join order; a dead peer is dropped and the next one tried.
        loop {
            let Some(peer) = self.connections.iter().find(|c| c.user_id != requester).cloned() else {
                debug!("No peer can answer sync request of {} in room {}", requester, self.room_id);
                return false;
            };
            let request = OutboundMessage::RequestForAllData {
                user_id: requester.to_string(),
            };
            if peer.send(request).is_ok() {
                debug!("Forwarded sync request of {} to {} in room {}", requester, peer.user_id, self.room_id);
                return true;
            }
            warn!("Dropping dead connection {} of user {} in room {}", peer.conn_id, peer.user_id, self.room_id);
            self.forget(vec![peer.conn_id]);
        }
    }

    /// Last request wins; everyone is told the new holder.
    pub fn request_typing(&mut self, user_id: &str) {
        if !self.has_user(user_id) {
            return;
        }
        self.active_typist_id = Some(user_id.to_string());
        self.broadcast(self.typist_message());
    }

    /// Only the holder can release. Returns whether anything changed.
    pub fn release_typing(&mut self, user_id: &str) -> bool {
        if self.active_typist_id.as_deref() != Some(user_id) {
            return false;
        }
        self.active_typist_id = None;
        self.broadcast(self.typist_message());
        true
    }

    /// Record `user_id` as the member whose run the next results belong to.
    pub fn claim_results(&mut self, user_id: &str) {
        self.result_requester = Some(user_id.to_string());
    }

    /// Deliver a published result to the requesting member only.
    pub fn deliver_result(&mut self, result: ExecutionResult) -> bool {
        let Some(requester) = self.result_requester.clone() else {
            warn!("Result for session {} in room {} has no requester, dropping", result.session_id, self.room_id);
            return false;
        };
        let msg = OutboundMessage::Output {
            message: result.result,
            session_id: result.session_id,
        };
        let delivered = self.send_to_user(&requester, msg) > 0;
        if delivered {
            debug!("Output for session {} sent to {} in room {}", result.session_id, requester, self.room_id);
        } else {
            warn!("Requester {} is no longer in room {}, dropping output", requester, self.room_id);
        }
        delivered
    }
}
