use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One test-input/output tab of the shared editor.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct IoSession {
    pub id: u64,
    #[serde(default)]
    pub input: String,
    #[serde(default)]
    pub output: Vec<String>,
}

/// Snapshot of the shared document held by a peer, answered to a late joiner.
///
/// The coordinator never interprets these fields; unknown fields are carried
/// through untouched in `extra`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct DocumentSnapshot {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_button_state: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_loading: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub io_sessions: Option<Vec<IoSession>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_io_session_id: Option<u64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Peer {
    pub id: String,
    pub name: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub user_id: String,
    pub user_name: String,
    pub message: String,
    pub timestamp: String,
}

/// Execution result published by the code runner on the room's channel.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResult {
    pub result: String,
    pub session_id: u64,
}

/// Events a client may send over its room connection.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum InboundMessage {
    RequestToGetUsers,
    RequestForAllData,
    Code {
        code: String,
    },
    Input {
        input: String,
    },
    Language {
        language: String,
    },
    #[serde(rename_all = "camelCase")]
    SubmitBtnStatus {
        value: String,
        #[serde(default)]
        is_loading: bool,
    },
    #[serde(rename_all = "camelCase")]
    AllData {
        user_id: String,
        #[serde(flatten)]
        snapshot: DocumentSnapshot,
    },
    #[serde(rename_all = "camelCase")]
    CursorPosition {
        cursor_position: Value,
    },
    Chat {
        message: String,
    },
    RequestTypingControl,
    ReleaseTypingControl,
    #[serde(rename_all = "camelCase")]
    StartLearningModule {
        module_id: String,
    },
    IoSessions {
        sessions: Vec<IoSession>,
    },
    #[serde(rename_all = "camelCase")]
    ActiveIoSession {
        session_id: u64,
    },
}

/// Events the coordinator sends to a client.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum OutboundMessage {
    #[serde(rename_all = "camelCase")]
    RoomId {
        room_id: String,
        is_new_room: bool,
        message: String,
    },
    #[serde(rename_all = "camelCase")]
    Users {
        users: Vec<Peer>,
        active_typist_id: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    ActiveTypist {
        active_typist_id: Option<String>,
    },
    Code {
        code: String,
    },
    Input {
        input: String,
    },
    Language {
        language: String,
    },
    #[serde(rename_all = "camelCase")]
    SubmitBtnStatus {
        value: String,
        is_loading: bool,
    },
    AllData(DocumentSnapshot),
    #[serde(rename_all = "camelCase")]
    CursorPosition {
        cursor_position: Value,
        user_id: String,
    },
    #[serde(rename_all = "camelCase")]
    Chat {
        chat_message: ChatMessage,
    },
    #[serde(rename_all = "camelCase")]
    Output {
        message: String,
        session_id: u64,
    },
    #[serde(rename_all = "camelCase")]
    EnterLearningModule {
        module_id: String,
    },
    #[serde(rename_all = "camelCase")]
    RequestForAllData {
        user_id: String,
    },
    IoSessions {
        sessions: Vec<IoSession>,
    },
    #[serde(rename_all = "camelCase")]
    ActiveIoSession {
        session_id: u64,
    },
    #[serde(rename_all = "camelCase")]
    Checkpoint {
        module_id: String,
        current_checkpoint_index: usize,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_unit_events_with_extra_fields() {
        let msg: InboundMessage =
            serde_json::from_str(r#"{"type":"requestToGetUsers","userId":"u1"}"#).unwrap();
        assert_eq!(msg, InboundMessage::RequestToGetUsers);
    }

    #[test]
    fn parses_submit_button_status() {
        let msg: InboundMessage = serde_json::from_value(json!({
            "type": "submitBtnStatus",
            "value": "Submitting...",
            "isLoading": true,
            "roomId": "482913"
        }))
        .unwrap();
        assert_eq!(
            msg,
            InboundMessage::SubmitBtnStatus { value: "Submitting...".into(), is_loading: true }
        );
    }

    #[test]
    fn rejects_unknown_event_type() {
        let res = serde_json::from_str::<InboundMessage>(r#"{"type":"selfDestruct"}"#);
        assert!(res.is_err());
    }

    #[test]
    fn all_data_keeps_unknown_snapshot_fields() {
        let msg: InboundMessage = serde_json::from_value(json!({
            "type": "allData",
            "userId": "joiner",
            "code": "print(1)",
            "ioSessions": [{"id": 1, "input": "", "output": ["1"]}],
            "activeIoSessionId": 1,
            "theme": "dark"
        }))
        .unwrap();
        let InboundMessage::AllData { user_id, snapshot } = msg else {
            panic!("expected allData");
        };
        assert_eq!(user_id, "joiner");
        assert_eq!(snapshot.code.as_deref(), Some("print(1)"));
        assert_eq!(snapshot.extra.get("theme"), Some(&json!("dark")));

        let out = serde_json::to_value(OutboundMessage::AllData(snapshot)).unwrap();
        assert_eq!(out["type"], "allData");
        assert_eq!(out["theme"], "dark");
        assert_eq!(out["ioSessions"][0]["output"][0], "1");
        assert!(out.get("userId").is_none());
    }

    #[test]
    fn outbound_events_use_client_field_names() {
        let out = serde_json::to_value(OutboundMessage::ActiveTypist { active_typist_id: None }).unwrap();
        assert_eq!(out, json!({"type": "activeTypist", "activeTypistId": null}));

        let out = serde_json::to_value(OutboundMessage::Output {
            message: "42\n".into(),
            session_id: 3,
        })
        .unwrap();
        assert_eq!(out, json!({"type": "output", "message": "42\n", "sessionId": 3}));

        let out = serde_json::to_value(OutboundMessage::RoomId {
            room_id: "482913".into(),
            is_new_room: true,
            message: "Created new room with ID: 482913".into(),
        })
        .unwrap();
        assert_eq!(out["isNewRoom"], true);
        assert_eq!(out["roomId"], "482913");
    }
}
