use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::SessionError;
use crate::relay::Message;
use crate::room::{RoomSummary, User};
use crate::typing::TypingUser;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ClientCommand {
    #[serde(rename_all = "camelCase")]
    CreateRoom { username: String, user_id: String },
    #[serde(rename_all = "camelCase")]
    JoinRoom {
        room_id: String,
        username: String,
        user_id: String,
    },
    #[serde(rename_all = "camelCase")]
    SendMessage {
        room_id: String,
        message_text: String,
        user_id: String,
        username: String,
    },
    #[serde(rename_all = "camelCase")]
    LeaveRoom {
        room_id: String,
        user_id: String,
        username: String,
    },
    #[serde(rename_all = "camelCase")]
    Typing {
        room_id: String,
        user_id: String,
        username: String,
        is_typing: bool,
    },
    GetRooms,
}

impl ClientCommand {
    pub fn name(&self) -> &'static str {
        match self {
            ClientCommand::CreateRoom { .. } => "create_room",
            ClientCommand::JoinRoom { .. } => "join_room",
            ClientCommand::SendMessage { .. } => "send_message",
            ClientCommand::LeaveRoom { .. } => "leave_room",
            ClientCommand::Typing { .. } => "typing",
            ClientCommand::GetRooms => "get_rooms",
        }
    }
}

/// Raw inbound frame: `{"event": ..., "data": ..., "ack": n}`.
///
/// Decoded in two steps so the `ack` id survives even when the payload is bad.
#[derive(Deserialize, Debug, Clone)]
pub struct InboundFrame {
    pub event: String,
    #[serde(default)]
    pub data: Option<Value>,
    #[serde(default)]
    pub ack: Option<u64>,
}

impl InboundFrame {
    pub fn parse(text: &str) -> Result<Self, SessionError> {
        serde_json::from_str(text).map_err(|e| SessionError::Malformed(e.to_string()))
    }

    pub fn command(&self) -> Result<ClientCommand, SessionError> {
        let mut tagged = Map::new();
        tagged.insert("event".into(), Value::String(self.event.clone()));
        if let Some(data) = self.data.as_ref().filter(|d| !d.is_null()) {
            tagged.insert("data".into(), data.clone());
        }
        serde_json::from_value(Value::Object(tagged))
            .map_err(|e| SessionError::Malformed(format!("{}: {}", self.event, e)))
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UserNotice {
    pub user_id: String,
    pub username: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ServerEvent {
    #[serde(rename_all = "camelCase")]
    Connected { connection_id: String },
    UpdateUsers(Vec<User>),
    UserJoined(UserNotice),
    UserLeft(UserNotice),
    ReceiveMessage(Message),
    TypingUpdate(Vec<TypingUser>),
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Status {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room_id: Option<String>,
    pub message: String,
}

/// Acknowledgement payload for commands that define a response.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(untagged)]
pub enum Reply {
    Status(Status),
    Rooms(Vec<RoomSummary>),
}

impl Reply {
    pub fn ok(message: &str) -> Self {
        Reply::Status(Status {
            success: true,
            room_id: None,
            message: message.to_string(),
        })
    }

    pub fn ok_with_room(room_id: &str, message: &str) -> Self {
        Reply::Status(Status {
            success: true,
            room_id: Some(room_id.to_string()),
            message: message.to_string(),
        })
    }

    pub fn failure(message: &str) -> Self {
        Reply::Status(Status {
            success: false,
            room_id: None,
            message: message.to_string(),
        })
    }
}

#[derive(Serialize)]
struct AckFrame<'a> {
    event: &'static str,
    ack: u64,
    data: &'a Reply,
}

/// Everything a connection's writer task may put on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    Event(ServerEvent),
    Ack { ack: u64, reply: Reply },
}

impl Outbound {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        match self {
            Outbound::Event(event) => serde_json::to_string(event),
            Outbound::Ack { ack, reply } => serde_json::to_string(&AckFrame {
                event: "ack",
                ack: *ack,
                data: reply,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_create_room_with_ack() {
        let frame = InboundFrame::parse(
            r#"{"event":"create_room","data":{"username":"alice","userId":"u1"},"ack":4}"#,
        )
        .unwrap();
        assert_eq!(frame.ack, Some(4));
        assert_eq!(
            frame.command(),
            Ok(ClientCommand::CreateRoom {
                username: "alice".into(),
                user_id: "u1".into(),
            })
        );
    }

    #[test]
    fn parses_typing_and_get_rooms() {
        let frame = InboundFrame::parse(
            r#"{"event":"typing","data":{"roomId":"r","userId":"u1","username":"alice","isTyping":true}}"#,
        )
        .unwrap();
        assert_eq!(frame.ack, None);
        assert!(matches!(frame.command(), Ok(ClientCommand::Typing { is_typing: true, .. })));

        let frame = InboundFrame::parse(r#"{"event":"get_rooms","ack":1}"#).unwrap();
        assert_eq!(frame.command(), Ok(ClientCommand::GetRooms));
    }

    #[test]
    fn bad_payload_keeps_ack() {
        let frame =
            InboundFrame::parse(r#"{"event":"join_room","data":{"roomId":"r"},"ack":9}"#).unwrap();
        assert_eq!(frame.ack, Some(9));
        assert!(matches!(frame.command(), Err(SessionError::Malformed(_))));

        let frame = InboundFrame::parse(r#"{"event":"explode","ack":2}"#).unwrap();
        assert!(matches!(frame.command(), Err(SessionError::Malformed(_))));

        assert!(InboundFrame::parse("not json").is_err());
    }

    #[test]
    fn events_serialize_with_event_and_data() {
        let event = ServerEvent::UpdateUsers(vec![User::new("u1", "alice")]);
        assert_eq!(
            serde_json::to_value(&event).unwrap(),
            json!({"event": "update_users", "data": [{"id": "u1", "username": "alice"}]})
        );

        let event = ServerEvent::UserLeft(UserNotice {
            user_id: "u2".into(),
            username: "bob".into(),
        });
        assert_eq!(
            serde_json::to_value(&event).unwrap(),
            json!({"event": "user_left", "data": {"userId": "u2", "username": "bob"}})
        );
    }

    #[test]
    fn ack_frames() {
        let out = Outbound::Ack {
            ack: 3,
            reply: Reply::ok_with_room("r1", "Room created successfully"),
        };
        let value: Value = serde_json::from_str(&out.to_json().unwrap()).unwrap();
        assert_eq!(
            value,
            json!({"event": "ack", "ack": 3, "data": {"success": true, "roomId": "r1", "message": "Room created successfully"}})
        );

        let out = Outbound::Ack {
            ack: 4,
            reply: Reply::failure("Room does not exist"),
        };
        let value: Value = serde_json::from_str(&out.to_json().unwrap()).unwrap();
        assert_eq!(value["data"], json!({"success": false, "message": "Room does not exist"}));

        let out = Outbound::Ack {
            ack: 5,
            reply: Reply::Rooms(vec![]),
        };
        let value: Value = serde_json::from_str(&out.to_json().unwrap()).unwrap();
        assert_eq!(value["data"], json!([]));
    }
}
