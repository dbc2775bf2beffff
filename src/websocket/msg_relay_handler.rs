use tracing::debug;

use crate::models::OutboundMessage;
use crate::ws::connctx::ConnCtx;
use crate::ws::registry::RoomRegistry;

/// Handle a document mutation - pass it on verbatim to every other member.
///
/// Last writer wins; nothing is validated or merged.
pub fn handle_relay(registry: &RoomRegistry, room_id: &str, conn: &ConnCtx, msg: OutboundMessage) {
    let reached = registry
        .with_member(room_id, &conn.conn_id, |session| session.broadcast_except(&conn.conn_id, msg))
        .unwrap_or(0);
    debug!("Relayed update from {} in room {} to {} peer(s)", conn.user_id, room_id, reached);
}

/// Handle submitBtnStatus - relay it, and a run start makes the sender the
/// recipient of the room's execution results.
pub fn handle_submit_status(registry: &RoomRegistry, room_id: &str, conn: &ConnCtx, value: String, is_loading: bool) {
    if is_loading {
        debug!("User {} started a run in room {}", conn.user_id, room_id);
        registry.with_member(room_id, &conn.conn_id, |session| session.claim_results(&conn.user_id));
    }
    handle_relay(registry, room_id, conn, OutboundMessage::SubmitBtnStatus { value, is_loading });
}
