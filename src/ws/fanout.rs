use sqlx::postgres::{PgListener, PgNotification};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::models::ExecutionResult;

/// Results buffered per room before a slow forwarder starts lagging.
const ROOM_CHANNEL_CAPACITY: usize = 64;

/// Keyed publish/subscribe channel delivering execution results per room.
pub trait ResultBus: Send + Sync {
    /// Start receiving results published for `room_id`.
    fn subscribe(&self, room_id: &str) -> broadcast::Receiver<ExecutionResult>;

    /// Stop listening on `room_id`. Receivers handed out earlier see the
    /// channel close.
    fn unsubscribe(&self, room_id: &str);

    /// Number of rooms currently subscribed.
    fn channel_count(&self) -> usize;
}

/// Room id to in-process fan-out sender.
#[derive(Default)]
struct ChannelMap {
    channels: Mutex<HashMap<String, broadcast::Sender<ExecutionResult>>>,
}

impl ChannelMap {
    /// Returns the receiver and whether the channel had to be created.
    fn subscribe(&self, room_id: &str) -> (broadcast::Receiver<ExecutionResult>, bool) {
        let mut channels = self.channels.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(tx) = channels.get(room_id) {
            return (tx.subscribe(), false);
        }
        let (tx, rx) = broadcast::channel(ROOM_CHANNEL_CAPACITY);
        channels.insert(room_id.to_string(), tx);
        (rx, true)
    }

    fn remove(&self, room_id: &str) -> bool {
        self.channels
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(room_id)
            .is_some()
    }

    /// Returns the number of receivers reached.
    fn publish(&self, room_id: &str, result: ExecutionResult) -> usize {
        let channels = self.channels.lock().unwrap_or_else(PoisonError::into_inner);
        match channels.get(room_id) {
            Some(tx) => tx.send(result).unwrap_or(0),
            None => 0,
        }
    }

    fn len(&self) -> usize {
        self.channels.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

/// In-process bus. Used by tests and when no database is configured.
#[derive(Default)]
pub struct LocalResultBus {
    channels: ChannelMap,
}

impl LocalResultBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish(&self, room_id: &str, result: ExecutionResult) -> usize {
        self.channels.publish(room_id, result)
    }
}

impl ResultBus for LocalResultBus {
    fn subscribe(&self, room_id: &str) -> broadcast::Receiver<ExecutionResult> {
        self.channels.subscribe(room_id).0
    }

    fn unsubscribe(&self, room_id: &str) {
        self.channels.remove(room_id);
    }

    fn channel_count(&self) -> usize {
        self.channels.len()
    }
}

enum ListenCommand {
    Listen(String),
    Unlisten(String),
}

enum ListenerEvent {
    Command(Option<ListenCommand>),
    Notification(Result<PgNotification, sqlx::Error>),
}

/// Bus backed by Postgres LISTEN/NOTIFY. The execution backend publishes with
/// `SELECT pg_notify('<roomId>', '{"result": "...", "sessionId": 1}')`.
pub struct PgResultBus {
    channels: Arc<ChannelMap>,
    commands: mpsc::UnboundedSender<ListenCommand>,
    task: JoinHandle<()>,
}

impl PgResultBus {
    pub async fn connect(database_url: &str) -> Result<Self, sqlx::Error> {
        let listener = PgListener::connect(database_url).await?;
        let channels = Arc::new(ChannelMap::default());
        let (commands, rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(run_listener(listener, rx, channels.clone()));
        info!("Result channel listener connected");
        Ok(Self { channels, commands, task })
    }
}

impl Drop for PgResultBus {
    fn drop(&mut self) {
        self.task.abort();
    }
}

impl ResultBus for PgResultBus {
    fn subscribe(&self, room_id: &str) -> broadcast::Receiver<ExecutionResult> {
        let (rx, created) = self.channels.subscribe(room_id);
        if created && self.commands.send(ListenCommand::Listen(room_id.to_string())).is_err() {
            error!("Result listener is gone, room {} will not receive results", room_id);
        }
        rx
    }

    fn unsubscribe(&self, room_id: &str) {
        if self.channels.remove(room_id) && self.commands.send(ListenCommand::Unlisten(room_id.to_string())).is_err() {
            warn!("Result listener is gone, could not unlisten room {}", room_id);
        }
    }

    fn channel_count(&self) -> usize {
        self.channels.len()
    }
}

async fn run_listener(
    mut listener: PgListener,
    mut commands: mpsc::UnboundedReceiver<ListenCommand>,
    channels: Arc<ChannelMap>,
) {
    loop {
        // Resolve the select before touching the listener again.
        let event = tokio::select! {
            cmd = commands.recv() => ListenerEvent::Command(cmd),
            notification = listener.recv() => ListenerEvent::Notification(notification),
        };

        match event {
            ListenerEvent::Command(Some(ListenCommand::Listen(room_id))) => {
                if let Err(e) = listener.listen(&room_id).await {
                    error!("Failed to LISTEN on room {}: {}", room_id, e);
                }
            }
            ListenerEvent::Command(Some(ListenCommand::Unlisten(room_id))) => {
                if let Err(e) = listener.unlisten(&room_id).await {
                    error!("Failed to UNLISTEN on room {}: {}", room_id, e);
                }
            }
            ListenerEvent::Command(None) => break,
            ListenerEvent::Notification(Ok(notification)) => {
                let room_id = notification.channel();
                match serde_json::from_str::<ExecutionResult>(notification.payload()) {
                    Ok(result) => {
                        let reached = channels.publish(room_id, result);
                        debug!("Result for room {} reached {} subscriber(s)", room_id, reached);
                    }
                    Err(e) => warn!("Ignoring malformed result on room {}: {}", room_id, e),
                }
            }
            ListenerEvent::Notification(Err(e)) => {
                error!("Result listener error: {}", e);
                tokio::time::sleep(Duration::from_secs(1)).await;
            }
        }
    }
    info!("Result channel listener stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(text: &str, session_id: u64) -> ExecutionResult {
        ExecutionResult { result: text.to_string(), session_id }
    }

    #[tokio::test]
    async fn publish_reaches_only_the_named_room() {
        let bus = LocalResultBus::new();
        let mut a = bus.subscribe("111111");
        let mut b = bus.subscribe("222222");

        assert_eq!(bus.publish("111111", result("42\n", 3)), 1);
        assert_eq!(a.recv().await.unwrap(), result("42\n", 3));
        assert!(b.try_recv().is_err());
    }

    #[tokio::test]
    async fn unsubscribe_closes_the_channel() {
        let bus = LocalResultBus::new();
        let mut rx = bus.subscribe("111111");
        assert_eq!(bus.channel_count(), 1);

        bus.unsubscribe("111111");
        assert_eq!(bus.channel_count(), 0);
        assert!(matches!(rx.recv().await, Err(broadcast::error::RecvError::Closed)));
        assert_eq!(bus.publish("111111", result("lost", 1)), 0);
    }

    #[test]
    fn payload_matches_runner_format() {
        let parsed: ExecutionResult = serde_json::from_str(r#"{"result":"42\n","sessionId":3}"#).unwrap();
        assert_eq!(parsed, result("42\n", 3));
    }
}
