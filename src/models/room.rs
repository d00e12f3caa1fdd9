use std::fmt;

use chrono::{DateTime, Utc};
use dashmap::{DashMap, DashSet};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::User;

/// Room identity: the (game, room) pair a token belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomKey {
    pub game_id: Uuid,
    pub room_id: Uuid,
}

impl RoomKey {
    pub fn new(game_id: Uuid, room_id: Uuid) -> Self {
        Self { game_id, room_id }
    }
}

impl fmt::Display for RoomKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.game_id, self.room_id)
    }
}

/// Optional parameters for an explicitly created room
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RoomParams {
    /// Lifetime override; the data horizon applies when absent.
    #[serde(default)]
    pub room_ttl_seconds: Option<u64>,
    /// Game configuration carried verbatim for the room's lifetime.
    #[serde(default)]
    pub game_configs: Option<serde_json::Value>,
}

/// Broadcast group. Membership and peer registrations are safe to mutate from any worker.
#[derive(Debug)]
pub struct Room {
    pub key: RoomKey,
    pub created_at: DateTime<Utc>,
    pub game_configs: Option<serde_json::Value>,
    users: DashMap<Uuid, User>,
    peer_servers: DashSet<Uuid>,
}

impl Room {
    pub fn new(key: RoomKey) -> Self {
        Self {
            key,
            created_at: Utc::now(),
            game_configs: None,
            users: DashMap::new(),
            peer_servers: DashSet::new(),
        }
    }

    pub fn with_game_configs(mut self, game_configs: Option<serde_json::Value>) -> Self {
        self.game_configs = game_configs;
        self
    }

    /// Insert or replace the member with this user id. Returns the replaced member.
    pub fn add_user(&self, user: User) -> Option<User> {
        self.users.insert(user.id, user)
    }

    pub fn remove_user(&self, user_id: &Uuid) -> Option<User> {
        self.users.remove(user_id).map(|(_, user)| user)
    }

    /// Remove `user_id` only while it is still reachable through `identity`.
    pub fn remove_member(&self, user_id: &Uuid, identity: &str) -> Option<User> {
        self.users
            .remove_if(user_id, |_, user| user.identity() == identity)
            .map(|(_, user)| user)
    }

    /// True when `user_id` is a member reachable through `identity`.
    pub fn has_member(&self, user_id: &Uuid, identity: &str) -> bool {
        self.users
            .get(user_id)
            .map(|user| user.identity() == identity)
            .unwrap_or(false)
    }

    /// Every member except the one(s) behind `identity`.
    pub fn recipients_excluding(&self, identity: &str) -> Vec<User> {
        self.users
            .iter()
            .filter(|entry| entry.identity() != identity)
            .map(|entry| entry.value().clone())
            .collect()
    }

    pub fn user_count(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }

    pub fn add_peer_server(&self, id: Uuid) -> bool {
        self.peer_servers.insert(id)
    }

    pub fn peer_servers(&self) -> Vec<Uuid> {
        self.peer_servers.iter().map(|id| *id).collect()
    }
}
