use std::collections::HashMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::SessionError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    #[serde(rename = "id")]
    pub user_id: String,
    pub username: String,
}

impl User {
    pub fn new(user_id: impl Into<String>, username: impl Into<String>) -> Self {
        User {
            user_id: user_id.into(),
            username: username.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Room {
    pub id: String,
    pub name: String,
    pub created_by: String,
    members: Vec<User>,
}

impl Room {
    fn new(creator: User) -> Self {
        Room {
            id: Uuid::new_v4().to_string(),
            name: format!("{}'s room", creator.username),
            created_by: creator.user_id.clone(),
            members: vec![creator],
        }
    }

    pub fn members(&self) -> &[User] {
        &self.members
    }

    pub fn has_member(&self, user_id: &str) -> bool {
        self.members.iter().any(|u| u.user_id == user_id)
    }
}

/// Public directory entry; carries no membership detail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomSummary {
    pub id: String,
    pub name: String,
    pub user_count: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Removal {
    NotAMember,
    Removed { remaining: usize },
    /// The last member left and the room no longer exists.
    RoomDeleted,
}

/// Rooms keyed by id, iterated in creation order.
#[derive(Debug, Default)]
pub struct RoomStore {
    rooms: HashMap<String, Room>,
    order: Vec<String>,
}

impl RoomStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Room> {
        self.order.iter().filter_map(|id| self.rooms.get(id))
    }

    pub fn find_by_creator(&self, user_id: &str) -> Option<&Room> {
        self.iter().find(|room| room.created_by == user_id)
    }

    pub fn create(&mut self, user_id: &str, username: &str) -> &Room {
        let room = Room::new(User::new(user_id, username));
        let id = room.id.clone();
        self.order.push(id.clone());
        self.rooms.entry(id).or_insert(room)
    }

    pub fn get(&self, room_id: &str) -> Option<&Room> {
        self.rooms.get(room_id)
    }

    pub fn contains(&self, room_id: &str) -> bool {
        self.rooms.contains_key(room_id)
    }

    /// Returns `true` when the user was appended, `false` if already present.
    pub fn add_member(&mut self, room_id: &str, user: User) -> Result<bool, SessionError> {
        let room = self
            .rooms
            .get_mut(room_id)
            .ok_or_else(|| SessionError::RoomNotFound(room_id.to_string()))?;

        if room.has_member(&user.user_id) {
            return Ok(false);
        }
        room.members.push(user);
        Ok(true)
    }

    /// Removes the user and deletes the room in the same step if it is now empty.
    pub fn remove_member(&mut self, room_id: &str, user_id: &str) -> Result<Removal, SessionError> {
        let room = self
            .rooms
            .get_mut(room_id)
            .ok_or_else(|| SessionError::RoomNotFound(room_id.to_string()))?;

        let before = room.members.len();
        room.members.retain(|u| u.user_id != user_id);
        let remaining = room.members.len();

        if remaining == before {
            return Ok(Removal::NotAMember);
        }
        if remaining == 0 {
            self.rooms.remove(room_id);
            self.order.retain(|id| id != room_id);
            return Ok(Removal::RoomDeleted);
        }
        Ok(Removal::Removed { remaining })
    }

    pub fn list(&self) -> Vec<RoomSummary> {
        self.iter()
            .map(|room| RoomSummary {
                id: room.id.clone(),
                name: room.name.clone(),
                user_count: room.members.len(),
            })
            .collect()
    }
}
