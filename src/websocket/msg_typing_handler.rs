use tracing::{debug, info};

use crate::ws::connctx::ConnCtx;
use crate::ws::registry::RoomRegistry;

/// Handle requestTypingControl - unconditional hand-over to the requester
pub fn handle_request_typing(registry: &RoomRegistry, room_id: &str, conn: &ConnCtx) {
    info!("User {} takes typing control in room {}", conn.user_id, room_id);
    registry.with_member(room_id, &conn.conn_id, |session| session.request_typing(&conn.user_id));
}

/// Handle releaseTypingControl - only the holder can let go
pub fn handle_release_typing(registry: &RoomRegistry, room_id: &str, conn: &ConnCtx) {
    let released = registry
        .with_member(room_id, &conn.conn_id, |session| session.release_typing(&conn.user_id))
        .unwrap_or(false);
    if released {
        info!("User {} released typing control in room {}", conn.user_id, room_id);
    } else {
        debug!("Ignoring release from non-holder {} in room {}", conn.user_id, room_id);
    }
}
