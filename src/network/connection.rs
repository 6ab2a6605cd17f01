//! Connection Dispatcher
//!
//! Turns one inbound line into room operations and outbound events.
//!
//! # Lock hierarchy
//!
//! ```text
//! PlayerSession mutex  ->  Room mutex  ->  registry lock
//! ```
//!
//! A frame handler takes its own session lock first and, only while holding
//! it, the room lock. It never locks the other player's session: everything
//! that reaches the other player goes through the room's seats. The registry
//! lock is never held while a room lock is being acquired.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::core::grid::Vec2;
use crate::game::player::Role;
use crate::game::room::{RoomError, RoomState};
use crate::network::handshake::{check_client_version, validate_nickname};
use crate::network::protocol::{
    ClientMessage, CreateRoomRequest, Frame, JoinRoomRequest, RoomCreated, RolePayload,
    ServerMessage, ShipPlacement,
};
use crate::network::registry::RoomRegistry;
use crate::network::server::ServerConfig;
use crate::network::session::{FloodGuard, Outbox, PlayerSession};

/// What the reader loop should do after a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// Keep reading.
    Continue,
    /// Tear the connection down.
    Close,
}

/// Per-connection frame dispatcher.
pub struct Connection {
    peer: SocketAddr,
    config: Arc<ServerConfig>,
    registry: Arc<RoomRegistry>,
    session: Mutex<PlayerSession>,
}

impl Connection {
    /// Create a dispatcher for a freshly accepted connection.
    pub fn new(peer: SocketAddr, outbox: Outbox, registry: Arc<RoomRegistry>, config: Arc<ServerConfig>) -> Self {
        let flood = FloodGuard::new(config.flood_interval, config.flood_threshold, Instant::now());
        Self {
            peer,
            config,
            registry,
            session: Mutex::new(PlayerSession::new(outbox, flood)),
        }
    }

    /// Read deadline for the next frame.
    pub async fn read_timeout(&self) -> Duration {
        if self.session.lock().await.in_room() {
            self.config.ping_timeout
        } else {
            self.config.handshake_timeout
        }
    }

    /// Feed the flood guard with a frame arrival.
    pub async fn check_flood(&self, now: Instant) -> Flow {
        let mut session = self.session.lock().await;
        if session.flood_mut().record(now) {
            warn!("Flood detected from {}, closing", self.peer);
            return Flow::Close;
        }
        Flow::Continue
    }

    /// Handle one inbound line.
    pub async fn handle_line(&self, line: &str) -> Flow {
        let frame = Frame::from_json(line);
        let mut session = self.session.lock().await;

        let Some(room) = session.room().cloned() else {
            return self.handle_handshake(&mut session, frame).await;
        };

        let mut state = room.lock().await;
        if state.is_closed() {
            session.leave_room();
            return Flow::Close;
        }

        let frame = match frame {
            Ok(frame) => frame,
            Err(e) => {
                info!("Malformed frame from {}: {}", self.peer, e);
                return Flow::Close;
            }
        };

        if state.expired(Instant::now()) {
            info!(room = %room.handle(), "Phase timeout in {:?}", state.gamestate());
            state.announce(ServerMessage::TimeoutExceeded);
            return Flow::Close;
        }

        let message = match ClientMessage::from_frame(frame) {
            Ok(message) => message,
            Err(e) => {
                debug!("{}: {}", self.peer, e);
                session.send(ServerMessage::unknown_error(e.to_string()));
                return Flow::Continue;
            }
        };

        let Some(role) = session.role() else {
            return Flow::Close;
        };

        match message {
            ClientMessage::Ping => {
                session.send(ServerMessage::Ping);
                Flow::Continue
            }
            ClientMessage::Disconnect => Flow::Close,
            ClientMessage::CreateRoom(_) | ClientMessage::JoinRoom(_) => {
                session.send(ServerMessage::unknown_error(format!("already in room {}", room.handle())));
                Flow::Continue
            }
            ClientMessage::ReadyToPlay(placements) => self.handle_ready(&mut session, &mut state, role, &placements),
            ClientMessage::ShotAt(target) => self.handle_shot(&session, &mut state, role, target),
            ClientMessage::RevengeRequested => self.handle_revenge(&session, &mut state, role),
            ClientMessage::Unsupported(code) => {
                session.send(ServerMessage::unknown_error(format!("unsupported event {code}")));
                Flow::Continue
            }
        }
    }

    // =========================================================================
    // Handshake
    // =========================================================================

    async fn handle_handshake(&self, session: &mut PlayerSession, frame: Result<Frame, serde_json::Error>) -> Flow {
        let message = frame
            .map_err(|e| e.to_string())
            .and_then(|frame| ClientMessage::from_frame(frame).map_err(|e| e.to_string()));

        match message {
            Ok(ClientMessage::CreateRoom(request)) => self.handle_create(session, request).await,
            Ok(ClientMessage::JoinRoom(request)) => self.handle_join(session, request).await,
            Ok(other) => {
                info!("Incorrect initial event {} from {}", other.code(), self.peer);
                Flow::Close
            }
            Err(e) => {
                info!("Incorrect initial handshake from {}: {}", self.peer, e);
                Flow::Close
            }
        }
    }

    /// Version gate and nickname check shared by create and join.
    fn admit(&self, session: &PlayerSession, nickname: &str, client_version: &str) -> Option<Flow> {
        let checked = check_client_version(&self.config.client_version, client_version)
            .and_then(|()| validate_nickname(nickname));

        match checked {
            Ok(()) => None,
            Err(e) if e.is_fatal() => {
                info!("{}: {}", self.peer, e);
                session.send(ServerMessage::InvalidClientVersion);
                Some(Flow::Close)
            }
            Err(e) => {
                debug!("{}: {}", self.peer, e);
                session.send(ServerMessage::InvalidNickname);
                Some(Flow::Continue)
            }
        }
    }

    async fn handle_create(&self, session: &mut PlayerSession, request: CreateRoomRequest) -> Flow {
        if let Some(flow) = self.admit(session, &request.nickname, &request.client_version) {
            return flow;
        }

        let room = self
            .registry
            .create_room(&request.nickname, session.outbox().clone(), self.config.room_timeouts)
            .await;
        info!(room = %room.handle(), "{} created a room from {}", request.nickname, self.peer);

        session.send(ServerMessage::RoomCreated(RoomCreated {
            room_handle: room.handle().to_string(),
        }));
        session.enter_room(room, Role::Primary);
        Flow::Continue
    }

    async fn handle_join(&self, session: &mut PlayerSession, request: JoinRoomRequest) -> Flow {
        if let Some(flow) = self.admit(session, &request.nickname, &request.client_version) {
            return flow;
        }

        let Some(room) = self.registry.get_room(&request.room_handle).await else {
            session.send(ServerMessage::InvalidRoomHandle);
            return Flow::Continue;
        };

        let joined = room.lock().await.join(&request.nickname, session.outbox().clone());
        match joined {
            Ok(()) => {
                session.enter_room(room, Role::Secondary);
            }
            Err(RoomError::RoomFull) => session.send(ServerMessage::RoomIsFull),
            Err(e) => {
                debug!("{} cannot join {}: {}", self.peer, request.room_handle, e);
                session.send(ServerMessage::InvalidRoomHandle);
            }
        }
        Flow::Continue
    }

    // =========================================================================
    // In-room events
    // =========================================================================

    fn handle_ready(
        &self,
        session: &mut PlayerSession,
        state: &mut RoomState,
        role: Role,
        placements: &[ShipPlacement],
    ) -> Flow {
        match state.submit_ships(role, placements) {
            Ok(()) => Flow::Continue,
            Err(e) if e.is_security_violation() => self.security_error(session, &e),
            Err(e) => {
                session.send(ServerMessage::unknown_error(e.to_string()));
                Flow::Continue
            }
        }
    }

    fn handle_shot(&self, session: &PlayerSession, state: &mut RoomState, role: Role, target: Vec2) -> Flow {
        match state.shoot(role, target) {
            Ok(outcome) => debug!("{:?} shot at {}: {:?}", role, target, outcome),
            Err(e) => session.send(ServerMessage::unknown_error(e.to_string())),
        }
        Flow::Continue
    }

    fn handle_revenge(&self, session: &PlayerSession, state: &mut RoomState, role: Role) -> Flow {
        if let Err(e) = state.request_revenge(role) {
            session.send(ServerMessage::unknown_error(e.to_string()));
        }
        Flow::Continue
    }

    /// Report a tampering attempt and close at the configured ceiling.
    fn security_error(&self, session: &mut PlayerSession, error: &RoomError) -> Flow {
        warn!("Security error from {}: {}", self.peer, error);
        session.send(ServerMessage::security_error(error.to_string()));

        let count = session.add_security_error();
        let ceiling = self.config.max_security_errors;
        if ceiling != 0 && count >= ceiling {
            warn!("{} reached {} security errors, closing", self.peer, count);
            return Flow::Close;
        }
        Flow::Continue
    }

    // =========================================================================
    // Teardown
    // =========================================================================

    /// Leave the room (destroying it) and ask the writer to disconnect.
    pub async fn teardown(&self) {
        let mut session = self.session.lock().await;

        if let Some((room, role)) = session.leave_room() {
            let mut state = room.lock().await;
            if !state.is_closed() {
                state.announce(ServerMessage::PlayerDisconnected(RolePayload { role }));
                state.destroy();
            }
            self.registry.remove_room(room.handle()).await;
        }

        session.outbox().close();
    }
}
