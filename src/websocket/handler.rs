use std::sync::Arc;
use axum::{
    extract::{Query, State, ws::{Message, WebSocket, WebSocketUpgrade}},
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::AppState;
use crate::models::{InboundMessage, OutboundMessage};
use crate::utils::scope_guard::ScopeGuard;
use crate::websocket::msg_chat_handler::handle_chat;
use crate::websocket::msg_learning_handler::handle_start_learning_module;
use crate::websocket::msg_presence_handler::handle_request_users;
use crate::websocket::msg_relay_handler::{handle_relay, handle_submit_status};
use crate::websocket::msg_sync_handler::{handle_all_data, handle_request_for_all_data};
use crate::websocket::msg_typing_handler::{handle_release_typing, handle_request_typing};
use crate::ws::connctx::ConnCtx;
use crate::ws::registry::RoomRegistry;

/// Query string of the room connection
#[derive(Deserialize, Debug)]
pub struct ConnectParams {
    #[serde(rename = "roomId")]
    pub room_id: Option<String>,
    pub id: String,
    pub name: Option<String>,
}

/// WebSocket handler
pub async fn websocket_handler(
    Query(params): Query<ConnectParams>,
    ws: WebSocketUpgrade,
    State(app_state): State<Arc<AppState>>,
) -> Response {
    info!("New WebSocket connection attempt for user {} (room {:?})", params.id, params.room_id);
    ws.on_upgrade(move |socket| handle_socket(socket, params, app_state.registry.clone()))
}

/// Handle WebSocket connection
async fn handle_socket(socket: WebSocket, params: ConnectParams, registry: Arc<RoomRegistry>) {
    // Unique per socket, so a stale socket of the same user can be told apart
    let conn_id = Uuid::new_v4().to_string();
    let name = params.name.filter(|n| !n.trim().is_empty()).unwrap_or_else(|| params.id.clone());

    let (mut sender, mut receiver) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<OutboundMessage>();
    let conn = ConnCtx::new(conn_id.clone(), params.id.clone(), name, tx);

    let attachment = registry.attach(params.room_id.as_deref(), conn.clone());
    let room_id = attachment.room_id.clone();
    info!("WebSocket connection {} established for user {} in room {}", conn_id, conn.user_id, room_id);

    // Whatever ends this function, the registry forgets the connection
    let _detach = {
        let registry = registry.clone();
        let room_id = room_id.clone();
        let conn_id = conn_id.clone();
        ScopeGuard::new(move || registry.detach(&room_id, &conn_id))
    };

    // Writer: serialize queued events onto the socket
    let mut send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let text = match serde_json::to_string(&msg) {
                Ok(text) => text,
                Err(e) => {
                    error!("Failed to serialize outbound message: {}", e);
                    continue;
                }
            };
            if sender.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    // Reader: interpret inbound events until the socket closes
    let reader_registry = registry.clone();
    let reader_room = room_id.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(frame) = receiver.next().await {
            let text = match frame {
                Ok(Message::Text(text)) => text,
                Ok(Message::Close(_)) => break,
                Ok(_) => continue,
                Err(e) => {
                    debug!("WebSocket read error in room {}: {}", reader_room, e);
                    break;
                }
            };

            let msg: InboundMessage = match serde_json::from_str(&text) {
                Ok(msg) => msg,
                Err(e) => {
                    warn!("Ignoring unrecognized message in room {}: {}", reader_room, e);
                    continue;
                }
            };
            handle_inbound(&reader_registry, &reader_room, &conn, msg);
        }
    });

    // Wait for either task to finish (and finish the other)
    tokio::select! {
        _ = (&mut send_task) => recv_task.abort(),
        _ = (&mut recv_task) => send_task.abort(),
    };
    info!("WebSocket connection {} of room {} terminated", conn_id, room_id);
}

/// Route one inbound event to its handler
pub fn handle_inbound(registry: &RoomRegistry, room_id: &str, conn: &ConnCtx, msg: InboundMessage) {
    match msg {
        InboundMessage::RequestToGetUsers => handle_request_users(registry, room_id, conn),
        InboundMessage::RequestForAllData => handle_request_for_all_data(registry, room_id, conn),
        InboundMessage::AllData { user_id, snapshot } => handle_all_data(registry, room_id, conn, &user_id, snapshot),
        InboundMessage::Code { code } => handle_relay(registry, room_id, conn, OutboundMessage::Code { code }),
        InboundMessage::Input { input } => handle_relay(registry, room_id, conn, OutboundMessage::Input { input }),
        InboundMessage::Language { language } => {
            handle_relay(registry, room_id, conn, OutboundMessage::Language { language })
        }
        InboundMessage::SubmitBtnStatus { value, is_loading } => {
            handle_submit_status(registry, room_id, conn, value, is_loading)
        }
        InboundMessage::CursorPosition { cursor_position } => handle_relay(
            registry,
            room_id,
            conn,
            OutboundMessage::CursorPosition {
                cursor_position,
                user_id: conn.user_id.clone(),
            },
        ),
        InboundMessage::IoSessions { sessions } => {
            handle_relay(registry, room_id, conn, OutboundMessage::IoSessions { sessions })
        }
        InboundMessage::ActiveIoSession { session_id } => {
            handle_relay(registry, room_id, conn, OutboundMessage::ActiveIoSession { session_id })
        }
        InboundMessage::Chat { message } => handle_chat(registry, room_id, conn, message),
        InboundMessage::RequestTypingControl => handle_request_typing(registry, room_id, conn),
        InboundMessage::ReleaseTypingControl => handle_release_typing(registry, room_id, conn),
        InboundMessage::StartLearningModule { module_id } => {
            handle_start_learning_module(registry, room_id, conn, module_id)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DocumentSnapshot, ExecutionResult, IoSession};
    use crate::ws::fanout::LocalResultBus;
    use crate::ws::roomctx::tests::{conn, drain};
    use serde_json::json;
    use std::time::Duration;

    fn join_two() -> (
        RoomRegistry,
        Arc<LocalResultBus>,
        (ConnCtx, mpsc::UnboundedReceiver<OutboundMessage>),
        (ConnCtx, mpsc::UnboundedReceiver<OutboundMessage>),
    ) {
        let bus = Arc::new(LocalResultBus::new());
        let registry = RoomRegistry::new(bus.clone());
        let (a, mut a_rx) = conn("a");
        let (b, mut b_rx) = conn("b");
        registry.attach(Some("482913"), a.clone());
        registry.attach(Some("482913"), b.clone());
        drain(&mut a_rx);
        drain(&mut b_rx);
        (registry, bus, (a, a_rx), (b, b_rx))
    }

    #[tokio::test]
    async fn mutation_events_go_to_others_only() {
        let (registry, _bus, (a, mut a_rx), (_b, mut b_rx)) = join_two();

        let sessions = vec![IoSession { id: 2, input: "5".into(), output: vec![] }];
        for msg in [
            InboundMessage::Code { code: "print(1)".into() },
            InboundMessage::Language { language: "python".into() },
            InboundMessage::IoSessions { sessions: sessions.clone() },
            InboundMessage::ActiveIoSession { session_id: 2 },
            InboundMessage::CursorPosition { cursor_position: json!({"lineNumber": 3, "column": 7}) },
        ] {
            handle_inbound(&registry, "482913", &a, msg);
        }

        assert!(drain(&mut a_rx).is_empty());
        assert_eq!(
            drain(&mut b_rx),
            vec![
                OutboundMessage::Code { code: "print(1)".into() },
                OutboundMessage::Language { language: "python".into() },
                OutboundMessage::IoSessions { sessions },
                OutboundMessage::ActiveIoSession { session_id: 2 },
                OutboundMessage::CursorPosition {
                    cursor_position: json!({"lineNumber": 3, "column": 7}),
                    user_id: "a".into(),
                },
            ]
        );
    }

    #[tokio::test]
    async fn chat_is_echoed_to_sender() {
        let (registry, _bus, (a, mut a_rx), (_b, mut b_rx)) = join_two();
        handle_inbound(&registry, "482913", &a, InboundMessage::Chat { message: "hi".into() });

        for rx in [&mut a_rx, &mut b_rx] {
            let msgs = drain(rx);
            assert_eq!(msgs.len(), 1);
            let OutboundMessage::Chat { chat_message } = &msgs[0] else {
                panic!("expected chat, got {:?}", msgs[0]);
            };
            assert_eq!(chat_message.user_id, "a");
            assert_eq!(chat_message.user_name, "name-a");
            assert_eq!(chat_message.message, "hi");
            assert!(chrono::DateTime::parse_from_rfc3339(&chat_message.timestamp).is_ok());
        }
    }

    #[tokio::test]
    async fn late_joiner_resync_round_trip() {
        let (registry, _bus, (a, mut a_rx), (b, mut b_rx)) = join_two();

        handle_inbound(&registry, "482913", &b, InboundMessage::RequestForAllData);
        assert_eq!(drain(&mut a_rx), vec![OutboundMessage::RequestForAllData { user_id: "b".into() }]);
        assert!(drain(&mut b_rx).is_empty());

        let snapshot = DocumentSnapshot {
            code: Some("x = 1".into()),
            language: Some("python".into()),
            current_button_state: Some("Submit Code".into()),
            is_loading: Some(false),
            ..DocumentSnapshot::default()
        };
        handle_inbound(
            &registry,
            "482913",
            &a,
            InboundMessage::AllData { user_id: "b".into(), snapshot: snapshot.clone() },
        );
        assert_eq!(drain(&mut b_rx), vec![OutboundMessage::AllData(snapshot)]);
        assert!(drain(&mut a_rx).is_empty());
    }

    #[tokio::test]
    async fn lone_connection_never_gets_all_data() {
        let registry = RoomRegistry::new(Arc::new(LocalResultBus::new()));
        let (a, mut a_rx) = conn("a");
        let attachment = registry.attach(None, a.clone());
        drain(&mut a_rx);

        handle_inbound(&registry, &attachment.room_id, &a, InboundMessage::RequestForAllData);
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(drain(&mut a_rx).is_empty());
    }

    #[tokio::test]
    async fn run_start_claims_results() {
        let (registry, bus, (a, mut a_rx), (_b, mut b_rx)) = join_two();

        handle_inbound(
            &registry,
            "482913",
            &a,
            InboundMessage::SubmitBtnStatus { value: "Submitting...".into(), is_loading: true },
        );
        assert!(drain(&mut a_rx).is_empty());
        assert_eq!(
            drain(&mut b_rx),
            vec![OutboundMessage::SubmitBtnStatus { value: "Submitting...".into(), is_loading: true }]
        );

        bus.publish("482913", ExecutionResult { result: "42\n".into(), session_id: 3 });
        let msg = tokio::time::timeout(Duration::from_secs(1), a_rx.recv()).await.unwrap().unwrap();
        assert_eq!(msg, OutboundMessage::Output { message: "42\n".into(), session_id: 3 });
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(drain(&mut b_rx).is_empty());
    }

    #[tokio::test]
    async fn start_learning_module_reaches_everyone() {
        let (registry, _bus, (a, mut a_rx), (_b, mut b_rx)) = join_two();
        handle_inbound(
            &registry,
            "482913",
            &a,
            InboundMessage::StartLearningModule { module_id: "loops-beginners".into() },
        );
        let expected = OutboundMessage::EnterLearningModule { module_id: "loops-beginners".into() };
        assert_eq!(drain(&mut a_rx), vec![expected.clone()]);
        assert_eq!(drain(&mut b_rx), vec![expected]);
    }

    #[tokio::test]
    async fn request_users_reports_typist() {
        let (registry, _bus, (a, mut a_rx), (b, mut b_rx)) = join_two();
        handle_inbound(&registry, "482913", &b, InboundMessage::RequestTypingControl);
        handle_inbound(&registry, "482913", &a, InboundMessage::ReleaseTypingControl);
        drain(&mut a_rx);
        drain(&mut b_rx);

        handle_inbound(&registry, "482913", &a, InboundMessage::RequestToGetUsers);
        let msgs = drain(&mut b_rx);
        assert_eq!(msgs.len(), 1);
        let OutboundMessage::Users { users, active_typist_id } = &msgs[0] else {
            panic!("expected users");
        };
        assert_eq!(users.len(), 2);
        assert_eq!(active_typist_id.as_deref(), Some("b"));
        assert_eq!(drain(&mut a_rx).len(), 1);
    }

    #[tokio::test]
    async fn replaced_connection_is_silenced() {
        let (registry, _bus, (stale, mut stale_rx), (_b, mut b_rx)) = join_two();
        let (tx, mut fresh_rx) = mpsc::unbounded_channel();
        let fresh = ConnCtx::new("conn-a-2".into(), "a".into(), "name-a".into(), tx);
        registry.attach(Some("482913"), fresh.clone());
        drain(&mut stale_rx);
        drain(&mut fresh_rx);
        drain(&mut b_rx);

        handle_inbound(&registry, "482913", &stale, InboundMessage::Code { code: "old tab".into() });
        handle_inbound(&registry, "482913", &stale, InboundMessage::RequestTypingControl);
        handle_inbound(&registry, "482913", &stale, InboundMessage::Chat { message: "old tab".into() });
        assert!(drain(&mut fresh_rx).is_empty());
        assert!(drain(&mut b_rx).is_empty());

        handle_inbound(&registry, "482913", &fresh, InboundMessage::Code { code: "new tab".into() });
        assert!(drain(&mut fresh_rx).is_empty());
        assert_eq!(drain(&mut b_rx), vec![OutboundMessage::Code { code: "new tab".into() }]);

        // Leaving with the stale handle does not evict the fresh one.
        registry.detach("482913", &stale.conn_id);
        assert_eq!(registry.connection_count(), 2);
    }
}
