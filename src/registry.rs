use std::collections::HashMap;
use uuid::Uuid;

pub type ConnectionId = Uuid;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionEntry {
    pub user_id: String,
    pub username: String,
    pub room_id: Option<String>,
}

/// Who sits behind each live connection, and which room it currently occupies.
///
/// Never touches room membership on its own; callers update it together with
/// the `RoomStore`.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    entries: HashMap<ConnectionId, ConnectionEntry>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind(
        &mut self,
        connection_id: ConnectionId,
        user_id: &str,
        username: &str,
        room_id: Option<String>,
    ) {
        self.entries.insert(
            connection_id,
            ConnectionEntry {
                user_id: user_id.to_string(),
                username: username.to_string(),
                room_id,
            },
        );
    }

    pub fn get(&self, connection_id: &ConnectionId) -> Option<&ConnectionEntry> {
        self.entries.get(connection_id)
    }

    pub fn room_of(&self, connection_id: &ConnectionId) -> Option<&str> {
        self.entries.get(connection_id)?.room_id.as_deref()
    }

    pub fn set_room(&mut self, connection_id: &ConnectionId, room_id: Option<String>) {
        if let Some(entry) = self.entries.get_mut(connection_id) {
            entry.room_id = room_id;
        }
    }

    pub fn unbind(&mut self, connection_id: &ConnectionId) -> Option<ConnectionEntry> {
        self.entries.remove(connection_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ConnectionId, &ConnectionEntry)> {
        self.entries.iter()
    }

    /// Connections currently joined to `room_id`.
    pub fn in_room<'a>(&'a self, room_id: &'a str) -> impl Iterator<Item = ConnectionId> + 'a {
        self.entries
            .iter()
            .filter(move |(_, entry)| entry.room_id.as_deref() == Some(room_id))
            .map(|(id, _)| *id)
    }

    /// Connections of `user_id` currently joined to `room_id`.
    pub fn user_in_room<'a>(
        &'a self,
        user_id: &'a str,
        room_id: &'a str,
    ) -> impl Iterator<Item = ConnectionId> + 'a {
        self.entries
            .iter()
            .filter(move |(_, entry)| {
                entry.user_id == user_id && entry.room_id.as_deref() == Some(room_id)
            })
            .map(|(id, _)| *id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bind_is_an_upsert() {
        let mut registry = ConnectionRegistry::new();
        let conn = Uuid::new_v4();

        registry.bind(conn, "u1", "alice", None);
        registry.bind(conn, "u1", "alice2", Some("r1".into()));

        assert_eq!(registry.len(), 1);
        let entry = registry.get(&conn).cloned();
        assert_eq!(
            entry,
            Some(ConnectionEntry {
                user_id: "u1".into(),
                username: "alice2".into(),
                room_id: Some("r1".into()),
            })
        );
    }

    #[test]
    fn set_room_on_unknown_connection_is_ignored() {
        let mut registry = ConnectionRegistry::new();
        registry.set_room(&Uuid::new_v4(), Some("r1".into()));
        assert!(registry.is_empty());
    }

    #[test]
    fn unbind_removes_entry() {
        let mut registry = ConnectionRegistry::new();
        let conn = Uuid::new_v4();
        registry.bind(conn, "u1", "alice", Some("r1".into()));

        registry.set_room(&conn, None);
        assert_eq!(registry.room_of(&conn), None);
        assert!(registry.unbind(&conn).is_some());
        assert!(registry.get(&conn).is_none());
        assert!(registry.unbind(&conn).is_none());
    }

    #[test]
    fn in_room_filters_by_pointer() {
        let mut registry = ConnectionRegistry::new();
        let (a, b, c) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        registry.bind(a, "u1", "alice", Some("r1".into()));
        registry.bind(b, "u2", "bob", Some("r1".into()));
        registry.bind(c, "u3", "carol", Some("r2".into()));

        let mut in_r1: Vec<ConnectionId> = registry.in_room("r1").collect();
        in_r1.sort();
        let mut expected = vec![a, b];
        expected.sort();
        assert_eq!(in_r1, expected);
        assert_eq!(registry.user_in_room("u3", "r2").collect::<Vec<_>>(), vec![c]);
        assert_eq!(registry.user_in_room("u3", "r1").count(), 0);
    }
}
