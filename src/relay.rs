use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::SessionError;
use crate::room::RoomStore;
use crate::typing::TypingTracker;

/// A chat message as broadcast to a room. Not retained after emission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub text: String,
    pub user_id: String,
    pub username: String,
    pub room_id: String,
    pub timestamp: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relayed {
    pub message: Message,
    /// The sender had a live typing marker that this message ended.
    pub typing_cleared: bool,
}

pub struct MessageRelay;

impl MessageRelay {
    pub fn send(
        rooms: &RoomStore,
        typing: &mut TypingTracker,
        room_id: &str,
        text: &str,
        user_id: &str,
        username: &str,
    ) -> Result<Relayed, SessionError> {
        if !rooms.contains(room_id) {
            return Err(SessionError::RoomNotFound(room_id.to_string()));
        }

        let message = Message {
            id: Uuid::new_v4().to_string(),
            text: text.to_string(),
            user_id: user_id.to_string(),
            username: username.to_string(),
            room_id: room_id.to_string(),
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        };
        let typing_cleared = typing.clear_typing(room_id, user_id);

        Ok(Relayed {
            message,
            typing_cleared,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::DateTime;

    #[test]
    fn send_stamps_message_and_ends_typing() {
        let mut rooms = RoomStore::new();
        let room_id = rooms.create("u1", "alice").id.clone();
        let mut typing = TypingTracker::default();
        typing.set_typing(&room_id, "u1", "alice");

        let relayed =
            MessageRelay::send(&rooms, &mut typing, &room_id, "hi", "u1", "alice").unwrap();

        assert!(relayed.typing_cleared);
        assert!(typing.snapshot(&room_id).is_empty());
        let msg = relayed.message;
        assert_eq!(msg.text, "hi");
        assert_eq!(msg.room_id, room_id);
        assert!(!msg.id.is_empty());
        assert!(msg.timestamp.ends_with('Z'));
        assert!(DateTime::parse_from_rfc3339(&msg.timestamp).is_ok());
    }

    #[test]
    fn send_without_typing_marker() {
        let mut rooms = RoomStore::new();
        let room_id = rooms.create("u1", "alice").id.clone();
        let mut typing = TypingTracker::default();

        let relayed =
            MessageRelay::send(&rooms, &mut typing, &room_id, "hi", "u1", "alice").unwrap();
        assert!(!relayed.typing_cleared);
    }

    #[test]
    fn send_to_unknown_room_fails() {
        let rooms = RoomStore::new();
        let mut typing = TypingTracker::default();
        let result = MessageRelay::send(&rooms, &mut typing, "nope", "hi", "u1", "alice");
        assert_eq!(result, Err(SessionError::RoomNotFound("nope".into())));
    }

    #[test]
    fn message_ids_are_unique() {
        let mut rooms = RoomStore::new();
        let room_id = rooms.create("u1", "alice").id.clone();
        let mut typing = TypingTracker::default();
        let a = MessageRelay::send(&rooms, &mut typing, &room_id, "a", "u1", "alice").unwrap();
        let b = MessageRelay::send(&rooms, &mut typing, &room_id, "b", "u1", "alice").unwrap();
        assert_ne!(a.message.id, b.message.id);
    }
}
