use tracing::debug;

use crate::ws::connctx::ConnCtx;
use crate::ws::registry::RoomRegistry;

/// Handle requestToGetUsers - resend the peer list to the whole room
pub fn handle_request_users(registry: &RoomRegistry, room_id: &str, conn: &ConnCtx) {
    let reached = registry
        .with_member(room_id, &conn.conn_id, |session| session.broadcast(session.users_message()))
        .unwrap_or(0);
    debug!("Peer list requested by {} in room {}, sent to {} member(s)", conn.user_id, room_id, reached);
}
