use tracing::info;

use crate::models::OutboundMessage;
use crate::ws::connctx::ConnCtx;
use crate::ws::registry::RoomRegistry;

/// Handle startLearningModule - send every member into the module
pub fn handle_start_learning_module(registry: &RoomRegistry, room_id: &str, conn: &ConnCtx, module_id: String) {
    info!("User {} starts module {} in room {}", conn.user_id, module_id, room_id);
    registry.with_member(room_id, &conn.conn_id, |session| {
        session.broadcast(OutboundMessage::EnterLearningModule { module_id })
    });
}

/// Tell a live room that its shared checkpoint pointer moved
pub fn notify_checkpoint(registry: &RoomRegistry, room_id: &str, module_id: &str, current_checkpoint_index: usize) {
    let reached = registry
        .with_room(room_id, |session| {
            session.broadcast(OutboundMessage::Checkpoint {
                module_id: module_id.to_string(),
                current_checkpoint_index,
            })
        })
        .unwrap_or(0);
    info!("Room {} moved to checkpoint {}, {} member(s) notified", room_id, current_checkpoint_index, reached);
}
