//! Command handling for the relay.
//!
//! `SessionController` owns every piece of shared state: the connection
//! registry, the room store, typing markers and the outboxes. Each method
//! runs to completion on `&mut self`, so a caller that serialises access
//! (the server keeps it behind one mutex) gets atomic commands for free.
//!
//! Room membership and the registry's room pointer always move together.
//! Every path that drops a connection out of a room goes through `depart`.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use log::{debug, info, warn};
use thiserror::Error;
use tokio::time::Instant;

use crate::error::SessionError;
use crate::messages::{ClientCommand, Outbound, Reply, ServerEvent};
use crate::presence::{Outbox, Outboxes, PresenceBroadcaster};
use crate::registry::{ConnectionEntry, ConnectionId, ConnectionRegistry};
use crate::relay::{Message, MessageRelay};
use crate::room::{Removal, RoomStore, RoomSummary, User};
use crate::typing::{TypingTracker, TypingUser, DEFAULT_TYPING_TTL};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InvariantViolation {
    #[error("connection {connection_id} points at missing room {room_id}")]
    DanglingRoomPointer {
        connection_id: ConnectionId,
        room_id: String,
    },
    #[error("connection {connection_id} is in room {room_id} but {user_id} is not a member")]
    PointerWithoutMembership {
        connection_id: ConnectionId,
        room_id: String,
        user_id: String,
    },
    #[error("{user_id} is a member of {room_id} without a connection in it")]
    MembershipWithoutPointer { room_id: String, user_id: String },
    #[error("room {0} has no members")]
    EmptyRoom(String),
    #[error("{0} created more than one room")]
    DuplicateCreator(String),
    #[error("typing state kept for missing room {0}")]
    OrphanTypingState(String),
}

pub struct SessionController {
    registry: ConnectionRegistry,
    rooms: RoomStore,
    typing: TypingTracker,
    outboxes: Outboxes,
}

impl Default for SessionController {
    fn default() -> Self {
        Self::new(DEFAULT_TYPING_TTL)
    }
}

impl SessionController {
    pub fn new(typing_ttl: Duration) -> Self {
        SessionController {
            registry: ConnectionRegistry::new(),
            rooms: RoomStore::new(),
            typing: TypingTracker::new(typing_ttl),
            outboxes: Outboxes::new(),
        }
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    pub fn rooms(&self) -> &RoomStore {
        &self.rooms
    }

    pub fn typing_snapshot(&mut self, room_id: &str) -> Vec<TypingUser> {
        self.typing.snapshot(room_id)
    }

    /// Registers the write half of a fresh connection and greets it.
    pub fn connect(&mut self, connection_id: ConnectionId, outbox: Outbox) {
        self.outboxes.attach(connection_id, outbox);
        self.outboxes.send(
            &connection_id,
            Outbound::Event(ServerEvent::Connected {
                connection_id: connection_id.to_string(),
            }),
        );
        info!("User connected: {}", connection_id);
    }

    /// Queues an acknowledgement behind everything already sent to the connection.
    pub fn send_ack(&self, connection_id: &ConnectionId, ack: u64, reply: Reply) {
        self.outboxes.send(connection_id, Outbound::Ack { ack, reply });
    }

    /// Runs one command. Returns the acknowledgement for commands that define
    /// one; failures of the others are logged and dropped.
    pub fn handle(&mut self, connection_id: ConnectionId, command: ClientCommand) -> Option<Reply> {
        let name = command.name();
        match command {
            ClientCommand::CreateRoom { username, user_id } => Some(acknowledge(
                name,
                self.create_room(connection_id, &username, &user_id),
            )),
            ClientCommand::JoinRoom {
                room_id,
                username,
                user_id,
            } => Some(acknowledge(
                name,
                self.join_room(connection_id, &room_id, &username, &user_id),
            )),
            ClientCommand::SendMessage {
                room_id,
                message_text,
                user_id,
                username,
            } => {
                if let Err(e) = self.send_message(&room_id, &message_text, &user_id, &username) {
                    drop_silently(name, &e);
                }
                None
            }
            ClientCommand::LeaveRoom {
                room_id,
                user_id,
                username,
            } => Some(acknowledge(
                name,
                self.leave_room(connection_id, &room_id, &user_id, &username),
            )),
            ClientCommand::Typing {
                room_id,
                user_id,
                username,
                is_typing,
            } => {
                if let Err(e) = self.typing(&room_id, &user_id, &username, is_typing) {
                    drop_silently(name, &e);
                }
                None
            }
            ClientCommand::GetRooms => Some(Reply::Rooms(self.get_rooms())),
        }
    }

    pub fn create_room(
        &mut self,
        connection_id: ConnectionId,
        username: &str,
        user_id: &str,
    ) -> Result<Reply, SessionError> {
        info!("User {} ({}) wants to create a room", username, user_id);
        let user = User::new(user_id, username);
        let current = self.registry.get(&connection_id).cloned();

        if let Some(existing) = self.rooms.find_by_creator(user_id).map(|r| r.id.clone()) {
            info!("User {} already created room {}", username, existing);
            self.leave_current(&connection_id, current.as_ref(), Some(existing.as_str()))?;

            let already_member = self
                .rooms
                .get(&existing)
                .is_some_and(|room| room.has_member(user_id));
            if !already_member {
                self.rooms.add_member(&existing, user.clone())?;
            }
            self.registry
                .bind(connection_id, user_id, username, Some(existing.clone()));

            let broadcaster = PresenceBroadcaster::new(&self.registry, &self.outboxes);
            if already_member {
                if let Some(room) = self.rooms.get(&existing) {
                    self.outboxes.send(
                        &connection_id,
                        Outbound::Event(ServerEvent::UpdateUsers(room.members().to_vec())),
                    );
                }
            } else {
                broadcaster.joined(&self.rooms, &existing, &user);
            }
            return Ok(Reply::ok_with_room(
                &existing,
                "Reconnected to your existing room",
            ));
        }

        self.leave_current(&connection_id, current.as_ref(), None)?;
        let room_id = self.rooms.create(user_id, username).id.clone();
        self.registry
            .bind(connection_id, user_id, username, Some(room_id.clone()));
        info!("Room {} created by {}", room_id, username);

        PresenceBroadcaster::new(&self.registry, &self.outboxes).members(&self.rooms, &room_id);
        Ok(Reply::ok_with_room(&room_id, "Room created successfully"))
    }

    pub fn join_room(
        &mut self,
        connection_id: ConnectionId,
        room_id: &str,
        username: &str,
        user_id: &str,
    ) -> Result<Reply, SessionError> {
        info!("User {} ({}) wants to join room {}", username, user_id, room_id);
        if !self.rooms.contains(room_id) {
            info!("Room {} does not exist", room_id);
            return Err(SessionError::RoomNotFound(room_id.to_string()));
        }

        let current = self.registry.get(&connection_id).cloned();
        if current
            .as_ref()
            .is_some_and(|entry| entry.room_id.as_deref() == Some(room_id))
        {
            return Ok(Reply::ok("Already in this room"));
        }
        self.leave_current(&connection_id, current.as_ref(), Some(room_id))?;

        let user = User::new(user_id, username);
        self.rooms.add_member(room_id, user.clone())?;
        self.registry
            .bind(connection_id, user_id, username, Some(room_id.to_string()));

        PresenceBroadcaster::new(&self.registry, &self.outboxes)
            .joined(&self.rooms, room_id, &user);
        if let Some(room) = self.rooms.get(room_id) {
            debug!("Room {} now has {} users", room_id, room.members().len());
        }
        info!("User {} joined room {}", username, room_id);
        Ok(Reply::ok("Joined room successfully"))
    }

    pub fn send_message(
        &mut self,
        room_id: &str,
        text: &str,
        user_id: &str,
        username: &str,
    ) -> Result<Message, SessionError> {
        debug!("Message from {} in room {}: {}", username, room_id, text);
        let relayed = MessageRelay::send(
            &self.rooms,
            &mut self.typing,
            room_id,
            text,
            user_id,
            username,
        )?;

        let broadcaster = PresenceBroadcaster::new(&self.registry, &self.outboxes);
        broadcaster.message(&relayed.message);
        if relayed.typing_cleared {
            broadcaster.typing(&mut self.typing, room_id, Instant::now());
        }
        Ok(relayed.message)
    }

    pub fn leave_room(
        &mut self,
        connection_id: ConnectionId,
        room_id: &str,
        user_id: &str,
        username: &str,
    ) -> Result<Reply, SessionError> {
        info!("User {} is leaving room {}", username, room_id);
        if !self.rooms.contains(room_id) {
            return Err(SessionError::RoomNotFound(room_id.to_string()));
        }

        let leaving: Vec<ConnectionId> = self.registry.user_in_room(user_id, room_id).collect();
        self.depart(room_id, &User::new(user_id, username), &leaving)?;

        // A connection bound to someone else still leaves under its own identity.
        if let Some(entry) = self.registry.get(&connection_id).cloned() {
            if entry.room_id.as_deref() == Some(room_id) {
                warn!(
                    "Connection {} bound to {} asked to leave as {}",
                    connection_id, entry.user_id, user_id
                );
                let bound = User::new(entry.user_id.as_str(), entry.username.as_str());
                self.depart(room_id, &bound, &[connection_id])?;
            }
        }
        Ok(Reply::ok("Left room successfully"))
    }

    pub fn typing(
        &mut self,
        room_id: &str,
        user_id: &str,
        username: &str,
        is_typing: bool,
    ) -> Result<(), SessionError> {
        self.typing_at(room_id, user_id, username, is_typing, Instant::now())
    }

    pub fn typing_at(
        &mut self,
        room_id: &str,
        user_id: &str,
        username: &str,
        is_typing: bool,
        now: Instant,
    ) -> Result<(), SessionError> {
        if !self.rooms.contains(room_id) {
            return Err(SessionError::RoomNotFound(room_id.to_string()));
        }
        if is_typing {
            debug!("{} is typing in {}", username, room_id);
            self.typing.set_typing_at(room_id, user_id, username, now);
        } else {
            debug!("{} stopped typing in {}", username, room_id);
            self.typing.clear_typing(room_id, user_id);
        }

        PresenceBroadcaster::new(&self.registry, &self.outboxes)
            .typing(&mut self.typing, room_id, now);
        Ok(())
    }

    pub fn get_rooms(&self) -> Vec<RoomSummary> {
        self.rooms.list()
    }

    /// Transport close. Leaves the current room the same way `leave_room`
    /// does, except that the user stays a member while another of their
    /// connections is still in the room.
    pub fn disconnect(&mut self, connection_id: ConnectionId) {
        info!("User disconnected: {}", connection_id);
        self.outboxes.detach(&connection_id);

        let Some(entry) = self.registry.get(&connection_id).cloned() else {
            return;
        };
        if let Some(room_id) = &entry.room_id {
            let user = User::new(entry.user_id.as_str(), entry.username.as_str());
            if let Err(e) = self.depart(room_id, &user, &[connection_id]) {
                warn!("Disconnect of {} from {}: {}", connection_id, room_id, e);
            }
        }
        self.registry.unbind(&connection_id);
    }

    /// Evicts expired typing markers and rebroadcasts each affected room.
    pub fn sweep_typing(&mut self, now: Instant) -> Vec<String> {
        let changed = self.typing.sweep(now);
        let broadcaster = PresenceBroadcaster::new(&self.registry, &self.outboxes);
        for room_id in &changed {
            debug!("Typing markers expired in {}", room_id);
            broadcaster.typing(&mut self.typing, room_id, now);
        }
        changed
    }

    /// Moves the connection out of its current room unless that room is `keep`.
    fn leave_current(
        &mut self,
        connection_id: &ConnectionId,
        current: Option<&ConnectionEntry>,
        keep: Option<&str>,
    ) -> Result<(), SessionError> {
        let Some(entry) = current else {
            return Ok(());
        };
        match entry.room_id.as_deref() {
            Some(old) if Some(old) != keep => {
                let user = User::new(entry.user_id.as_str(), entry.username.as_str());
                self.depart(old, &user, &[*connection_id])
            }
            _ => Ok(()),
        }
    }

    /// Detaches `leaving` from the room, then drops the user from its member
    /// list once none of their connections remain in it.
    fn depart(
        &mut self,
        room_id: &str,
        user: &User,
        leaving: &[ConnectionId],
    ) -> Result<(), SessionError> {
        if !self.rooms.contains(room_id) {
            return Err(SessionError::RoomNotFound(room_id.to_string()));
        }
        for connection_id in leaving {
            if self.registry.room_of(connection_id) == Some(room_id) {
                self.registry.set_room(connection_id, None);
            }
        }
        if self.registry.user_in_room(&user.user_id, room_id).next().is_some() {
            debug!("{} still has a connection in {}", user.user_id, room_id);
            return Ok(());
        }

        let typing_cleared = self.typing.clear_typing(room_id, &user.user_id);
        let removal = self.rooms.remove_member(room_id, &user.user_id)?;
        let broadcaster = PresenceBroadcaster::new(&self.registry, &self.outboxes);
        match removal {
            Removal::RoomDeleted => {
                self.typing.clear_room(room_id);
                info!("User {} removed from room {}", user.username, room_id);
                info!("Room {} deleted because it's empty", room_id);
            }
            Removal::Removed { remaining } => {
                info!("User {} removed from room {} ({} left)", user.username, room_id, remaining);
                broadcaster.left(&self.rooms, room_id, user);
                if typing_cleared {
                    broadcaster.typing(&mut self.typing, room_id, Instant::now());
                }
            }
            Removal::NotAMember => {}
        }
        Ok(())
    }

    /// Verifies the registry/room consistency rules against the current state.
    pub fn check_invariants(&self) -> Result<(), InvariantViolation> {
        let mut pointed: HashSet<(&str, &str)> = HashSet::new();
        for (connection_id, entry) in self.registry.iter() {
            let Some(room_id) = entry.room_id.as_deref() else {
                continue;
            };
            let Some(room) = self.rooms.get(room_id) else {
                return Err(InvariantViolation::DanglingRoomPointer {
                    connection_id: *connection_id,
                    room_id: room_id.to_string(),
                });
            };
            if !room.has_member(&entry.user_id) {
                return Err(InvariantViolation::PointerWithoutMembership {
                    connection_id: *connection_id,
                    room_id: room_id.to_string(),
                    user_id: entry.user_id.clone(),
                });
            }
            pointed.insert((room_id, entry.user_id.as_str()));
        }

        let mut creators: HashMap<&str, usize> = HashMap::new();
        for room in self.rooms.iter() {
            if room.members().is_empty() {
                return Err(InvariantViolation::EmptyRoom(room.id.clone()));
            }
            for member in room.members() {
                if !pointed.contains(&(room.id.as_str(), member.user_id.as_str())) {
                    return Err(InvariantViolation::MembershipWithoutPointer {
                        room_id: room.id.clone(),
                        user_id: member.user_id.clone(),
                    });
                }
            }
            let count = creators.entry(room.created_by.as_str()).or_default();
            *count += 1;
            if *count > 1 {
                return Err(InvariantViolation::DuplicateCreator(room.created_by.clone()));
            }
        }

        if let Some(room_id) = self.typing.rooms().find(|id| !self.rooms.contains(id)) {
            return Err(InvariantViolation::OrphanTypingState(room_id.to_string()));
        }
        Ok(())
    }
}

fn acknowledge(command: &str, result: Result<Reply, SessionError>) -> Reply {
    result.unwrap_or_else(|e| {
        warn!("{} failed: {}", command, e);
        Reply::failure(e.client_message())
    })
}

fn drop_silently(command: &str, error: &SessionError) {
    warn!("Dropping {}: {}", command, error);
}
