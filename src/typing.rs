//! "X is typing" markers with wall-clock expiry.
//!
//! A marker lives for `ttl` after its last signal. Expiry happens lazily on
//! every read and eagerly through [`TypingTracker::sweep`], which the server
//! drives on a fixed interval. Re-signalling only moves the timestamp, so a
//! (room, user) pair never has more than one pending expiry.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

pub const DEFAULT_TYPING_TTL: Duration = Duration::from_millis(3000);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypingUser {
    pub user_id: String,
    pub username: String,
}

#[derive(Debug, Clone)]
struct TypingEntry {
    username: String,
    last_signal_at: Instant,
}

#[derive(Debug)]
pub struct TypingTracker {
    ttl: Duration,
    rooms: HashMap<String, BTreeMap<String, TypingEntry>>,
}

impl Default for TypingTracker {
    fn default() -> Self {
        Self::new(DEFAULT_TYPING_TTL)
    }
}

impl TypingTracker {
    pub fn new(ttl: Duration) -> Self {
        TypingTracker {
            ttl,
            rooms: HashMap::new(),
        }
    }

    pub fn set_typing(&mut self, room_id: &str, user_id: &str, username: &str) {
        self.set_typing_at(room_id, user_id, username, Instant::now());
    }

    pub fn set_typing_at(&mut self, room_id: &str, user_id: &str, username: &str, now: Instant) {
        self.rooms.entry(room_id.to_string()).or_default().insert(
            user_id.to_string(),
            TypingEntry {
                username: username.to_string(),
                last_signal_at: now,
            },
        );
    }

    /// Returns `true` if an entry was removed.
    pub fn clear_typing(&mut self, room_id: &str, user_id: &str) -> bool {
        let Some(entries) = self.rooms.get_mut(room_id) else {
            return false;
        };
        let removed = entries.remove(user_id).is_some();
        if entries.is_empty() {
            self.rooms.remove(room_id);
        }
        removed
    }

    pub fn clear_room(&mut self, room_id: &str) {
        self.rooms.remove(room_id);
    }

    pub fn snapshot(&mut self, room_id: &str) -> Vec<TypingUser> {
        self.snapshot_at(room_id, Instant::now())
    }

    /// Live entries for the room. Stale entries found along the way are dropped.
    pub fn snapshot_at(&mut self, room_id: &str, now: Instant) -> Vec<TypingUser> {
        let ttl = self.ttl;
        let Some(entries) = self.rooms.get_mut(room_id) else {
            return Vec::new();
        };

        entries.retain(|_, entry| is_live(entry, now, ttl));
        let snapshot = entries
            .iter()
            .map(|(user_id, entry)| TypingUser {
                user_id: user_id.clone(),
                username: entry.username.clone(),
            })
            .collect();

        if entries.is_empty() {
            self.rooms.remove(room_id);
        }
        snapshot
    }

    /// Evicts every stale entry and returns the rooms whose set changed.
    pub fn sweep(&mut self, now: Instant) -> Vec<String> {
        let ttl = self.ttl;
        let mut changed = Vec::new();

        self.rooms.retain(|room_id, entries| {
            let before = entries.len();
            entries.retain(|_, entry| is_live(entry, now, ttl));
            if entries.len() != before {
                changed.push(room_id.clone());
            }
            !entries.is_empty()
        });

        changed.sort();
        changed
    }

    pub fn rooms(&self) -> impl Iterator<Item = &str> {
        self.rooms.keys().map(String::as_str)
    }
}

fn is_live(entry: &TypingEntry, now: Instant, ttl: Duration) -> bool {
    now.saturating_duration_since(entry.last_signal_at) < ttl
}
