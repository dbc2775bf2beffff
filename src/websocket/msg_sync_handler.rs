use tracing::{debug, warn};

use crate::models::{DocumentSnapshot, OutboundMessage};
use crate::ws::connctx::ConnCtx;
use crate::ws::registry::RoomRegistry;

/// Handle requestForAllData - ask one peer to send its state to the joiner.
///
/// Fire and forget: nothing waits for the answer. A lone joiner gets no reply
/// and keeps whatever it loaded from durable storage.
pub fn handle_request_for_all_data(registry: &RoomRegistry, room_id: &str, conn: &ConnCtx) {
    let forwarded = registry
        .with_member(room_id, &conn.conn_id, |session| session.forward_sync_request(&conn.user_id))
        .unwrap_or(false);
    if !forwarded {
        debug!("Sync request of {} in room {} left unanswered", conn.user_id, room_id);
    }
}

/// Handle allData - deliver a peer's snapshot to the requester only
pub fn handle_all_data(registry: &RoomRegistry, room_id: &str, conn: &ConnCtx, target: &str, snapshot: DocumentSnapshot) {
    let delivered = registry
        .with_member(room_id, &conn.conn_id, |session| {
            session.send_to_user(target, OutboundMessage::AllData(snapshot))
        })
        .unwrap_or(0);
    if delivered == 0 {
        warn!("Snapshot from {} for {} in room {} had no recipient", conn.user_id, target, room_id);
    } else {
        debug!("Snapshot from {} delivered to {} in room {}", conn.user_id, target, room_id);
    }
}
