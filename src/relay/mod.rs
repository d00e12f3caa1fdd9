//! Session and room engine.
//!
//! A client with no session is on first contact: its datagram must be a bearer
//! token, which opens the session, joins the room and is answered with the
//! assigned user id. Afterwards every datagram is a payload for the rest of
//! the room, except the ones the handshake-retry predicate claims.

pub mod handshake;

pub use handshake::HandshakeRetry;

use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

use crate::auth::AuthService;
use crate::error::{AppError, Result};
use crate::models::{Room, RoomKey, RoomParams, Session, TokenInfo, User};
use crate::notifier::Notifier;
use crate::store::TtlStore;
use crate::udp::Connection;

/// Sessions keyed by client transport identity
pub type SessionStore = TtlStore<String, Session>;
pub type RoomStore = TtlStore<RoomKey, Arc<Room>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteKind {
    /// Reply to the sender with its user id
    Handshake,
    /// Payload relayed to the other room members
    Broadcast,
}

/// Where a datagram goes and what gets written
#[derive(Debug)]
pub struct Route {
    pub kind: RouteKind,
    pub recipients: Vec<User>,
    pub payload: Vec<u8>,
    pub peer_servers: Vec<Uuid>,
}

impl Route {
    fn handshake(user: User) -> Self {
        let payload = user.id.to_string().into_bytes();
        Self {
            kind: RouteKind::Handshake,
            recipients: vec![user],
            payload,
            peer_servers: Vec::new(),
        }
    }

    fn broadcast(recipients: Vec<User>, payload: Vec<u8>, peer_servers: Vec<Uuid>) -> Self {
        Self {
            kind: RouteKind::Broadcast,
            recipients,
            payload,
            peer_servers,
        }
    }
}

pub struct RelayService {
    auth: Arc<AuthService>,
    sessions: Arc<SessionStore>,
    rooms: Arc<RoomStore>,
    notifier: Arc<Notifier>,
    handshake_retry: HandshakeRetry,
    max_connections: usize,
}

impl RelayService {
    pub fn new(
        auth: Arc<AuthService>,
        sessions: Arc<SessionStore>,
        rooms: Arc<RoomStore>,
        notifier: Arc<Notifier>,
    ) -> Self {
        Self {
            auth,
            sessions,
            rooms,
            notifier,
            handshake_retry: HandshakeRetry::default(),
            max_connections: usize::MAX,
        }
    }

    pub fn with_handshake_retry(mut self, handshake_retry: HandshakeRetry) -> Self {
        self.handshake_retry = handshake_retry;
        self
    }

    pub fn with_max_connections(mut self, max_connections: usize) -> Self {
        self.max_connections = max_connections;
        self
    }

    /// Create the empty room named by `token`. Fails if it already exists.
    pub fn create_room(&self, token: &str, params: RoomParams) -> Result<RoomKey> {
        let info = self.auth.parse_token(token)?;
        let key = info.room_key();

        let ttl = match params.room_ttl_seconds {
            Some(0) => {
                return Err(AppError::BadRequest(
                    "room_ttl_seconds must be positive".to_string(),
                ))
            }
            Some(seconds) => Duration::from_secs(seconds),
            None => self.rooms.horizon(),
        };
        let room = Room::new(key).with_game_configs(params.game_configs);

        if !self.rooms.insert_if_absent_with_ttl(key, Arc::new(room), ttl) {
            return Err(AppError::RoomExists);
        }

        tracing::info!(room = %key, ttl_secs = ttl.as_secs(), "Room created");
        Ok(key)
    }

    /// Resolve one inbound datagram into its recipients and the bytes to write them.
    pub fn resolve_and_route(&self, sender: Arc<dyn Connection>, datagram: &[u8]) -> Result<Route> {
        let identity = sender.identity();

        let session = match self.sessions.get(&identity) {
            Some(session) => session,
            None => return self.first_contact(identity, sender, datagram),
        };

        let room = self.room_for(&session)?;
        self.sessions.touch(&identity);
        self.rooms.touch(&room.key);
        if !self.sessions.touch_connection(&identity) {
            self.sessions.track_connection(identity.clone());
        }

        if self.handshake_retry.matches(datagram) {
            tracing::trace!(client = %identity, "Repeat handshake");
            return Ok(self.join(&room, &session.info, sender, &identity));
        }

        let recipients = self.live_recipients(&room, &identity);
        Ok(Route::broadcast(
            recipients,
            datagram.to_vec(),
            room.peer_servers(),
        ))
    }

    fn first_contact(
        &self,
        identity: String,
        sender: Arc<dyn Connection>,
        datagram: &[u8],
    ) -> Result<Route> {
        let info = self
            .auth
            .parse_bytes(datagram)
            .map_err(|e| AppError::InvalidHandshake(e.to_string()))?;

        let key = info.room_key();
        let room = self
            .rooms
            .get_or_insert_with(key, || Arc::new(Room::new(key)));

        self.sessions.set(identity.clone(), Session::new(info.clone()));
        self.sessions.track_connection(identity.clone());

        tracing::debug!(
            client = %identity,
            room = %key,
            user_id = %info.user_id,
            "Session established"
        );

        Ok(self.join(&room, &info, sender, &identity))
    }

    /// Members other than `identity` whose own session still points at `room`.
    /// Members left behind by an expired or superseded session are evicted.
    fn live_recipients(&self, room: &Room, identity: &str) -> Vec<User> {
        room.recipients_excluding(identity)
            .into_iter()
            .filter(|user| {
                let member = user.identity();
                let live = self
                    .sessions
                    .get(&member)
                    .map(|session| {
                        session.room_key() == room.key && session.info.user_id == user.id
                    })
                    .unwrap_or(false);
                if !live && room.remove_member(&user.id, &member).is_some() {
                    tracing::debug!(
                        room = %room.key,
                        user_id = %user.id,
                        client = %member,
                        "Stale member evicted"
                    );
                }
                live
            })
            .collect()
    }

    fn join(&self, room: &Room, info: &TokenInfo, sender: Arc<dyn Connection>, identity: &str) -> Route {
        if !room.has_member(&info.user_id, identity) {
            room.add_user(User::new(info.user_id, Arc::clone(&sender)));
        }
        Route::handshake(User::new(info.user_id, sender))
    }

    /// Drop `user_id` from the sender's room. Missing session, room or user is not an error.
    pub fn remove_user(&self, sender: &dyn Connection, user_id: Uuid) -> Result<()> {
        let session = match self.session(&sender.identity()) {
            Ok(session) => session,
            Err(AppError::SessionNotFound) => return Ok(()),
            Err(e) => return Err(e),
        };

        let room = match self.room_for(&session) {
            Ok(room) => room,
            Err(AppError::RoomNotFound) => return Ok(()),
            Err(e) => return Err(e),
        };

        if room.remove_user(&user_id).is_some() {
            tracing::debug!(room = %room.key, user_id = %user_id, "User removed");
        }
        Ok(())
    }

    /// Evict `member` from the sender's room unless its id has since rebound to another address.
    pub fn remove_member(&self, sender: &dyn Connection, member: &User) -> Result<()> {
        let session = match self.session(&sender.identity()) {
            Ok(session) => session,
            Err(AppError::SessionNotFound) => return Ok(()),
            Err(e) => return Err(e),
        };

        let room = match self.room_for(&session) {
            Ok(room) => room,
            Err(AppError::RoomNotFound) => return Ok(()),
            Err(e) => return Err(e),
        };

        if room.remove_member(&member.id, &member.identity()).is_some() {
            tracing::debug!(room = %room.key, user_id = %member.id, "Member evicted");
        }
        Ok(())
    }

    /// Active connections and whether that is still below capacity
    pub fn connection_count(&self) -> (usize, bool) {
        let count = self.sessions.count_active();
        (count, count < self.max_connections)
    }

    pub fn max_connections(&self) -> usize {
        self.max_connections
    }

    pub fn active_connections(&self) -> Vec<String> {
        self.sessions.list_active_connections()
    }

    /// Peer servers with an open link
    pub fn peer_server_count(&self) -> usize {
        self.notifier.len()
    }

    /// Register a peer server as hosting members of the token's room.
    pub async fn register_peer(&self, token: &str, peer_id: Uuid, address: &str) -> Result<()> {
        let info = self.auth.parse_token(token)?;
        let room = self
            .rooms
            .get(&info.room_key())
            .ok_or(AppError::RoomNotFound)?;

        self.notifier.register(peer_id, address).await?;
        room.add_peer_server(peer_id);

        tracing::info!(room = %room.key, peer_id = %peer_id, "Room linked to peer server");
        Ok(())
    }

    /// Forward a broadcast payload to peer servers. Returns the peers that failed.
    pub async fn notify_peers(&self, peers: &[Uuid], payload: &[u8]) -> Vec<(Uuid, AppError)> {
        self.notifier.notify(peers, payload).await
    }

    pub fn session(&self, identity: &str) -> Result<Session> {
        self.sessions
            .get(&identity.to_string())
            .ok_or(AppError::SessionNotFound)
    }

    pub fn room(&self, key: &RoomKey) -> Option<Arc<Room>> {
        self.rooms.get(key)
    }

    fn room_for(&self, session: &Session) -> Result<Arc<Room>> {
        let key = session.room_key();
        let room = self.rooms.get(&key).ok_or(AppError::RoomNotFound)?;
        if room.key != key {
            return Err(AppError::RoomBadValue);
        }
        Ok(room)
    }
}
