use chrono::Utc;
use tracing::debug;

use crate::models::{ChatMessage, OutboundMessage};
use crate::ws::connctx::ConnCtx;
use crate::ws::registry::RoomRegistry;

/// Handle chat - stamp and echo to the whole room, the sender included
pub fn handle_chat(registry: &RoomRegistry, room_id: &str, conn: &ConnCtx, message: String) {
    let chat_message = ChatMessage {
        user_id: conn.user_id.clone(),
        user_name: conn.name.clone(),
        message,
        timestamp: Utc::now().to_rfc3339(),
    };
    debug!("Chat from {} in room {}", conn.user_id, room_id);
    registry.with_member(room_id, &conn.conn_id, |session| {
        session.broadcast(OutboundMessage::Chat { chat_message })
    });
}
