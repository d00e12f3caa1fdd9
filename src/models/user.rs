use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::RoomKey;
use crate::udp::Connection;

/// Identity carried by a verified bearer token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenInfo {
    pub game_id: Uuid,
    pub room_id: Uuid,
    pub user_id: Uuid,
    pub expiry: Duration,
}

impl TokenInfo {
    pub fn room_key(&self) -> RoomKey {
        RoomKey::new(self.game_id, self.room_id)
    }
}

/// JWT Claims
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // user_id
    pub game_id: String,
    pub room_id: String,
    pub iat: i64,
    pub exp: i64,
}

/// Association between a client's transport identity and its token identity
#[derive(Debug, Clone)]
pub struct Session {
    pub info: TokenInfo,
    pub established_at: DateTime<Utc>,
}

impl Session {
    pub fn new(info: TokenInfo) -> Self {
        Self {
            info,
            established_at: Utc::now(),
        }
    }

    pub fn room_key(&self) -> RoomKey {
        self.info.room_key()
    }
}

/// Room member. The connection is a handle into the socket layer, not an owner of it.
#[derive(Clone)]
pub struct User {
    pub id: Uuid,
    pub connection: Arc<dyn Connection>,
}

impl User {
    pub fn new(id: Uuid, connection: Arc<dyn Connection>) -> Self {
        Self { id, connection }
    }

    pub fn identity(&self) -> String {
        self.connection.identity()
    }
}

impl fmt::Debug for User {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("User")
            .field("id", &self.id)
            .field("connection", &self.connection.identity())
            .finish()
    }
}
