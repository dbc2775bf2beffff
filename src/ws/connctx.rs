use tokio::sync::mpsc;

use crate::models::{OutboundMessage, Peer};

/// Outbound half of one client connection as seen by the room.
#[derive(Clone, Debug)]
pub struct ConnCtx {
    pub conn_id: String,
    pub user_id: String,
    pub name: String,
    tx: mpsc::UnboundedSender<OutboundMessage>,
}

/// Why a send did not reach the client.
#[derive(Debug, PartialEq, Eq)]
pub struct DeadHandle;

impl ConnCtx {
    pub fn new(conn_id: String, user_id: String, name: String, tx: mpsc::UnboundedSender<OutboundMessage>) -> Self {
        Self { conn_id, user_id, name, tx }
    }

    /// Queue a message for the connection's writer task. Fails only when the
    /// writer is gone, i.e. the socket is closed.
    pub fn send(&self, msg: OutboundMessage) -> Result<(), DeadHandle> {
        self.tx.send(msg).map_err(|_| DeadHandle)
    }

    pub fn peer(&self) -> Peer {
        Peer {
            id: self.user_id.clone(),
            name: self.name.clone(),
        }
    }
}
