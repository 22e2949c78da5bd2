use std::collections::HashMap;
use log::debug;
use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::messages::{Outbound, ServerEvent, UserNotice};
use crate::registry::{ConnectionId, ConnectionRegistry};
use crate::relay::Message;
use crate::room::{RoomStore, User};
use crate::typing::TypingTracker;

pub type Outbox = mpsc::UnboundedSender<Outbound>;

/// Write half of every live connection, fed by unbounded FIFO channels.
#[derive(Debug, Default)]
pub struct Outboxes {
    senders: HashMap<ConnectionId, Outbox>,
}

impl Outboxes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attach(&mut self, connection_id: ConnectionId, outbox: Outbox) {
        self.senders.insert(connection_id, outbox);
    }

    pub fn detach(&mut self, connection_id: &ConnectionId) -> bool {
        self.senders.remove(connection_id).is_some()
    }

    pub fn send(&self, connection_id: &ConnectionId, message: Outbound) {
        if let Some(sender) = self.senders.get(connection_id) {
            if sender.send(message).is_err() {
                debug!("Outbox for {} is closed, dropping message", connection_id);
            }
        }
    }
}

/// Room-scoped fan-out. Recipients are the connections whose registry entry
/// points at the room at the time of the call.
pub struct PresenceBroadcaster<'a> {
    registry: &'a ConnectionRegistry,
    outboxes: &'a Outboxes,
}

impl<'a> PresenceBroadcaster<'a> {
    pub fn new(registry: &'a ConnectionRegistry, outboxes: &'a Outboxes) -> Self {
        PresenceBroadcaster { registry, outboxes }
    }

    pub fn to_room(&self, room_id: &str, event: &ServerEvent) {
        for connection_id in self.registry.in_room(room_id) {
            self.outboxes.send(&connection_id, Outbound::Event(event.clone()));
        }
    }

    /// Authoritative member list. Nothing is sent for a room that no longer exists.
    pub fn members(&self, rooms: &RoomStore, room_id: &str) {
        if let Some(room) = rooms.get(room_id) {
            self.to_room(room_id, &ServerEvent::UpdateUsers(room.members().to_vec()));
        }
    }

    pub fn joined(&self, rooms: &RoomStore, room_id: &str, user: &User) {
        self.to_room(room_id, &ServerEvent::UserJoined(notice(user)));
        self.members(rooms, room_id);
    }

    pub fn left(&self, rooms: &RoomStore, room_id: &str, user: &User) {
        if !rooms.contains(room_id) {
            return;
        }
        self.to_room(room_id, &ServerEvent::UserLeft(notice(user)));
        self.members(rooms, room_id);
    }

    pub fn typing(&self, typing: &mut TypingTracker, room_id: &str, now: Instant) {
        let snapshot = typing.snapshot_at(room_id, now);
        self.to_room(room_id, &ServerEvent::TypingUpdate(snapshot));
    }

    pub fn message(&self, message: &Message) {
        self.to_room(&message.room_id, &ServerEvent::ReceiveMessage(message.clone()));
    }
}

fn notice(user: &User) -> UserNotice {
    UserNotice {
        user_id: user.user_id.clone(),
        username: user.username.clone(),
    }
}
