//! Protocol Messages
//!
//! Wire format for client-server communication over TCP.
//! One JSON envelope `{"code": <int>, "data": <payload>}` per line.

use serde::de::DeserializeOwned;
use serde::{Serialize, Deserialize};
use serde_json::Value;

use crate::core::grid::{Footprint, Vec2};
use crate::game::player::Role;
use crate::game::ship::{EntityKind, Orientation, Ship};
use crate::game::state::Gamestate;

// =============================================================================
// EVENT CODES
// =============================================================================

/// Numeric event codes shared with the client.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum EventCode {
    /// Reserved.
    InvalidEvent = 0,
    /// Recoverable error, see `ErrorPayload`.
    UnknownError = 1,
    /// Suspected tampering, see `ErrorPayload`.
    SecurityError = 2,
    /// Keep-alive in both directions.
    Ping = 3,
    /// Sent before either side closes.
    Disconnect = 4,
    /// Create a room / room created.
    CreateRoom = 5,
    /// Join a room / room joined.
    JoinRoom = 6,
    /// Join rejected: both seats taken.
    RoomIsFull = 7,
    /// Nickname rejected.
    InvalidNickname = 8,
    /// No room with the given handle.
    InvalidRoomHandle = 9,
    /// Client protocol version mismatch.
    InvalidClientVersion = 10,
    /// Room was torn down.
    RoomClosed = 11,
    /// Room stayed too long in one phase.
    TimeoutExceeded = 12,
    /// The other player left.
    PlayerDisconnected = 13,
    /// Room phase changed.
    SetGamestate = 14,
    /// Fleet submission / fleet accepted.
    ReadyToPlay = 15,
    /// Clear all entities in an area.
    ClearBattlefield = 16,
    /// Draw an entity.
    AddEntity = 17,
    /// Whose move it is.
    SetTurn = 18,
    /// Fire at a cell.
    ShotAt = 19,
    /// Match winner.
    PlayerWin = 20,
    /// Rematch request.
    RevengeRequested = 21,
}

impl EventCode {
    /// Raw wire value.
    #[inline]
    pub const fn as_u16(self) -> u16 {
        self as u16
    }
}

// =============================================================================
// ENVELOPE
// =============================================================================

/// Undecoded frame. The payload shape depends on `code`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Frame {
    /// Event code.
    pub code: u16,
    /// Code-specific payload.
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub data: Value,
}

impl Frame {
    /// Parse one line.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }

    /// Serialize to one line (without the trailing newline).
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Payload decoding failure for a known code.
#[derive(Debug, thiserror::Error)]
#[error("data input read error for event {code}: {source}")]
pub struct FrameError {
    /// Code whose payload failed to decode.
    pub code: u16,
    /// Underlying JSON error.
    #[source]
    pub source: serde_json::Error,
}

fn decode_payload<T: DeserializeOwned>(code: u16, data: Value) -> Result<T, FrameError> {
    serde_json::from_value(data).map_err(|source| FrameError { code, source })
}

// =============================================================================
// CLIENT -> SERVER MESSAGES
// =============================================================================

/// Messages sent from client to server.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientMessage {
    /// Keep-alive.
    Ping,
    /// Client is leaving.
    Disconnect,
    /// Open a new room.
    CreateRoom(CreateRoomRequest),
    /// Take the second seat of an existing room.
    JoinRoom(JoinRoomRequest),
    /// Submit the whole fleet.
    ReadyToPlay(Vec<ShipPlacement>),
    /// Fire at a cell of the opponent's board.
    ShotAt(Vec2),
    /// Ask for a rematch.
    RevengeRequested,
    /// Any code the server does not accept from clients.
    Unsupported(u16),
}

/// Room creation request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRoomRequest {
    /// Display name.
    pub nickname: String,
    /// Client protocol version.
    pub client_version: String,
}

/// Room join request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinRoomRequest {
    /// Display name.
    pub nickname: String,
    /// Handle returned to the room creator.
    pub room_handle: String,
    /// Client protocol version.
    pub client_version: String,
}

/// One ship of a submitted fleet, as raw codes. Validation happens server-side,
/// so any integer decodes here and bad codes surface as placement errors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShipPlacement {
    /// Entity kind code.
    pub ship_kind: i64,
    /// Anchor cell.
    pub position: Vec2,
    /// Orientation code.
    pub orientation: i64,
}

impl ClientMessage {
    /// Decode the payload selected by the frame's code.
    pub fn from_frame(frame: Frame) -> Result<Self, FrameError> {
        let Frame { code, data } = frame;

        let message = match code {
            c if c == EventCode::Ping.as_u16() => ClientMessage::Ping,
            c if c == EventCode::Disconnect.as_u16() => ClientMessage::Disconnect,
            c if c == EventCode::CreateRoom.as_u16() => ClientMessage::CreateRoom(decode_payload(code, data)?),
            c if c == EventCode::JoinRoom.as_u16() => ClientMessage::JoinRoom(decode_payload(code, data)?),
            c if c == EventCode::ReadyToPlay.as_u16() => ClientMessage::ReadyToPlay(decode_payload(code, data)?),
            c if c == EventCode::ShotAt.as_u16() => ClientMessage::ShotAt(decode_payload(code, data)?),
            c if c == EventCode::RevengeRequested.as_u16() => ClientMessage::RevengeRequested,
            other => ClientMessage::Unsupported(other),
        };

        Ok(message)
    }

    /// Parse and decode one line.
    pub fn from_json(s: &str) -> Result<Self, FrameError> {
        let frame = Frame::from_json(s).map_err(|source| FrameError {
            code: EventCode::InvalidEvent.as_u16(),
            source,
        })?;
        Self::from_frame(frame)
    }

    /// Event code of this message.
    pub fn code(&self) -> u16 {
        match self {
            ClientMessage::Ping => EventCode::Ping.as_u16(),
            ClientMessage::Disconnect => EventCode::Disconnect.as_u16(),
            ClientMessage::CreateRoom(_) => EventCode::CreateRoom.as_u16(),
            ClientMessage::JoinRoom(_) => EventCode::JoinRoom.as_u16(),
            ClientMessage::ReadyToPlay(_) => EventCode::ReadyToPlay.as_u16(),
            ClientMessage::ShotAt(_) => EventCode::ShotAt.as_u16(),
            ClientMessage::RevengeRequested => EventCode::RevengeRequested.as_u16(),
            ClientMessage::Unsupported(code) => *code,
        }
    }
}

// =============================================================================
// SERVER -> CLIENT MESSAGES
// =============================================================================

/// Messages sent from server to client.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerMessage {
    /// Recoverable error.
    UnknownError(ErrorPayload),
    /// Suspected tampering.
    SecurityError(ErrorPayload),
    /// Keep-alive reply.
    Ping,
    /// Server is closing this connection.
    Disconnect,
    /// Room created.
    RoomCreated(RoomCreated),
    /// Both seats taken.
    RoomJoined(RoomJoined),
    /// Join rejected: room is full.
    RoomIsFull,
    /// Nickname rejected.
    InvalidNickname,
    /// No such room.
    InvalidRoomHandle,
    /// Client version mismatch.
    InvalidClientVersion,
    /// Room torn down.
    RoomClosed,
    /// Phase ceiling exceeded.
    TimeoutExceeded,
    /// A player left.
    PlayerDisconnected(RolePayload),
    /// Phase changed.
    SetGamestate(GamestatePayload),
    /// A player's fleet was accepted.
    ReadyToPlay(RolePayload),
    /// Clear a rectangle of a board.
    ClearBattlefield(ClearBattlefield),
    /// Draw an entity on a board.
    AddEntity(AddEntity),
    /// Turn holder.
    SetTurn(RolePayload),
    /// Winner.
    PlayerWin(RolePayload),
    /// A player asked for a rematch.
    RevengeRequested(RolePayload),
}

/// Error message payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorPayload {
    /// Human-readable reason.
    pub message: String,
}

/// Room creation result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomCreated {
    /// Handle to share with the opponent.
    pub room_handle: String,
}

/// Both player names, sent once the room is full.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomJoined {
    /// Creator's name.
    pub primary_name: String,
    /// Joiner's name.
    pub secondary_name: String,
}

/// Payload naming a seat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RolePayload {
    /// Seat.
    pub role: Role,
}

/// Phase change payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GamestatePayload {
    /// New phase.
    pub gamestate: Gamestate,
}

/// Clear every entity in a rectangle of `role`'s board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClearBattlefield {
    /// Board owner.
    pub role: Role,
    /// Minimum corner.
    pub rect_start: Vec2,
    /// Maximum corner.
    pub rect_end: Vec2,
}

impl ClearBattlefield {
    /// Clear a footprint of `role`'s board.
    pub fn new(role: Role, area: Footprint) -> Self {
        Self { role, rect_start: area.start, rect_end: area.end }
    }
}

/// Draw an entity on `role`'s board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddEntity {
    /// Board owner.
    pub role: Role,
    /// What to draw.
    pub entity: EntityView,
}

impl AddEntity {
    /// Reveal a real ship.
    pub fn ship(role: Role, ship: &Ship) -> Self {
        Self {
            role,
            entity: EntityView {
                kind: ship.kind(),
                position: ship.anchor(),
                orientation: ship.orientation(),
            },
        }
    }

    /// Reveal a single-cell marker.
    pub fn marker(role: Role, kind: EntityKind, position: Vec2) -> Self {
        Self {
            role,
            entity: EntityView { kind, position, orientation: Orientation::Horizontal },
        }
    }
}

/// Client-visible entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityView {
    /// Ship kind or reveal marker.
    pub kind: EntityKind,
    /// Anchor cell.
    pub position: Vec2,
    /// Orientation.
    pub orientation: Orientation,
}

impl ServerMessage {
    /// Build an `UnknownError`.
    pub fn unknown_error(message: impl Into<String>) -> Self {
        ServerMessage::UnknownError(ErrorPayload { message: message.into() })
    }

    /// Build a `SecurityError`.
    pub fn security_error(message: impl Into<String>) -> Self {
        ServerMessage::SecurityError(ErrorPayload { message: message.into() })
    }

    /// Event code of this message.
    pub fn code(&self) -> EventCode {
        match self {
            ServerMessage::UnknownError(_) => EventCode::UnknownError,
            ServerMessage::SecurityError(_) => EventCode::SecurityError,
            ServerMessage::Ping => EventCode::Ping,
            ServerMessage::Disconnect => EventCode::Disconnect,
            ServerMessage::RoomCreated(_) => EventCode::CreateRoom,
            ServerMessage::RoomJoined(_) => EventCode::JoinRoom,
            ServerMessage::RoomIsFull => EventCode::RoomIsFull,
            ServerMessage::InvalidNickname => EventCode::InvalidNickname,
            ServerMessage::InvalidRoomHandle => EventCode::InvalidRoomHandle,
            ServerMessage::InvalidClientVersion => EventCode::InvalidClientVersion,
            ServerMessage::RoomClosed => EventCode::RoomClosed,
            ServerMessage::TimeoutExceeded => EventCode::TimeoutExceeded,
            ServerMessage::PlayerDisconnected(_) => EventCode::PlayerDisconnected,
            ServerMessage::SetGamestate(_) => EventCode::SetGamestate,
            ServerMessage::ReadyToPlay(_) => EventCode::ReadyToPlay,
            ServerMessage::ClearBattlefield(_) => EventCode::ClearBattlefield,
            ServerMessage::AddEntity(_) => EventCode::AddEntity,
            ServerMessage::SetTurn(_) => EventCode::SetTurn,
            ServerMessage::PlayerWin(_) => EventCode::PlayerWin,
            ServerMessage::RevengeRequested(_) => EventCode::RevengeRequested,
        }
    }

    /// Encode as an envelope.
    pub fn to_frame(&self) -> Result<Frame, serde_json::Error> {
        let data = match self {
            ServerMessage::UnknownError(p) | ServerMessage::SecurityError(p) => serde_json::to_value(p)?,
            ServerMessage::RoomCreated(p) => serde_json::to_value(p)?,
            ServerMessage::RoomJoined(p) => serde_json::to_value(p)?,
            ServerMessage::PlayerDisconnected(p)
            | ServerMessage::ReadyToPlay(p)
            | ServerMessage::SetTurn(p)
            | ServerMessage::PlayerWin(p)
            | ServerMessage::RevengeRequested(p) => serde_json::to_value(p)?,
            ServerMessage::SetGamestate(p) => serde_json::to_value(p)?,
            ServerMessage::ClearBattlefield(p) => serde_json::to_value(p)?,
            ServerMessage::AddEntity(p) => serde_json::to_value(p)?,
            ServerMessage::Ping
            | ServerMessage::Disconnect
            | ServerMessage::RoomIsFull
            | ServerMessage::InvalidNickname
            | ServerMessage::InvalidRoomHandle
            | ServerMessage::InvalidClientVersion
            | ServerMessage::RoomClosed
            | ServerMessage::TimeoutExceeded => Value::Null,
        };
        Ok(Frame { code: self.code().as_u16(), data })
    }

    /// Serialize to one line (without the trailing newline).
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        self.to_frame()?.to_json()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_create_room() {
        let msg = ClientMessage::from_json(
            r#"{"code":5,"data":{"nickname":"Alice","clientVersion":"1.0.0"}}"#,
        ).unwrap();

        assert_eq!(msg, ClientMessage::CreateRoom(CreateRoomRequest {
            nickname: "Alice".to_string(),
            client_version: "1.0.0".to_string(),
        }));
    }

    #[test]
    fn test_decode_without_data() {
        assert_eq!(ClientMessage::from_json(r#"{"code":3}"#).unwrap(), ClientMessage::Ping);
        assert_eq!(
            ClientMessage::from_json(r#"{"code":21,"data":null}"#).unwrap(),
            ClientMessage::RevengeRequested
        );
    }

    #[test]
    fn test_decode_ready_to_play() {
        let line = json!({
            "code": 15,
            "data": [
                {"shipKind": 3, "position": {"x": 1, "y": 1}, "orientation": 1},
                {"shipKind": 6, "position": {"x": 10, "y": 10}, "orientation": 2},
            ]
        }).to_string();

        match ClientMessage::from_json(&line).unwrap() {
            ClientMessage::ReadyToPlay(ships) => {
                assert_eq!(ships.len(), 2);
                assert_eq!(ships[1].position, Vec2::new(10, 10));
                assert_eq!(ships[1].orientation, 2);
            }
            other => panic!("Wrong message type: {:?}", other),
        }
    }

    #[test]
    fn test_bad_payload_reports_code() {
        let err = ClientMessage::from_json(r#"{"code":19,"data":{"x":"a"}}"#).unwrap_err();
        assert_eq!(err.code, 19);
    }

    #[test]
    fn test_unknown_code_is_unsupported() {
        assert_eq!(
            ClientMessage::from_json(r#"{"code":99}"#).unwrap(),
            ClientMessage::Unsupported(99)
        );
        assert_eq!(
            ClientMessage::from_json(r#"{"code":18,"data":{"role":1}}"#).unwrap(),
            ClientMessage::Unsupported(18)
        );
    }

    #[test]
    fn test_encode_add_entity() {
        let msg = ServerMessage::AddEntity(AddEntity::marker(Role::Secondary, EntityKind::EmptyCell, Vec2::new(4, 7)));
        let value: Value = serde_json::from_str(&msg.to_json().unwrap()).unwrap();

        assert_eq!(value, json!({
            "code": 17,
            "data": {
                "role": 2,
                "entity": {"kind": 2, "position": {"x": 4, "y": 7}, "orientation": 1}
            }
        }));
    }

    #[test]
    fn test_encode_clear_battlefield() {
        let msg = ServerMessage::ClearBattlefield(ClearBattlefield::new(Role::Primary, Footprint::GRID));
        let value: Value = serde_json::from_str(&msg.to_json().unwrap()).unwrap();

        assert_eq!(value["code"], 16);
        assert_eq!(value["data"]["rectStart"], json!({"x": 1, "y": 1}));
        assert_eq!(value["data"]["rectEnd"], json!({"x": 10, "y": 10}));
    }

    #[test]
    fn test_empty_payloads_omit_data() {
        let json = ServerMessage::RoomIsFull.to_json().unwrap();
        assert_eq!(json, r#"{"code":7}"#);
    }

    #[test]
    fn test_error_payload() {
        let json = ServerMessage::unknown_error("not your turn").to_json().unwrap();
        assert!(json.contains(r#""message":"not your turn""#));
        assert!(json.starts_with(r#"{"code":1"#));
    }

    #[test]
    fn test_decode_join_room() {
        let msg = ClientMessage::from_json(
            r#"{"code":6,"data":{"nickname":"Bob","roomHandle":"abc","clientVersion":"1.0.0"}}"#,
        ).unwrap();

        assert_eq!(msg, ClientMessage::JoinRoom(JoinRoomRequest {
            nickname: "Bob".to_string(),
            room_handle: "abc".to_string(),
            client_version: "1.0.0".to_string(),
        }));
        assert_eq!(msg.code(), 6);
    }

    #[test]
    fn test_wide_placement_codes_still_decode() {
        let line = json!({
            "code": 15,
            "data": [{"shipKind": -1, "position": {"x": 1, "y": 1}, "orientation": 300}]
        }).to_string();

        match ClientMessage::from_json(&line).unwrap() {
            ClientMessage::ReadyToPlay(ships) => {
                assert_eq!(ships[0].ship_kind, -1);
                assert_eq!(ships[0].orientation, 300);
            }
            other => panic!("Wrong message type: {:?}", other),
        }
    }
}
