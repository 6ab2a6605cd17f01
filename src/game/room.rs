//! Room State Machine
//!
//! The authoritative state of one match: two seats, gamestate, turn and the
//! phase timer. Every state method is synchronous and runs under the room's
//! mutex; outbound events are queued on the seats' outboxes, so a whole
//! transition (including shot resolution) is atomic with respect to the
//! other connection.
//!
//! ```text
//! INITIAL --join--> BUILDING --both built--> PLAYING --annihilated--> OVER
//!    ^                                                                 |
//!    +--------------------- both revenge flags ------------------------+
//! ```

use std::time::Instant;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, info};

use crate::core::grid::{Footprint, Vec2};
use crate::game::player::{Player, Role, ShotOutcome};
use crate::game::ship::{EntityKind, PlacementError, Ship};
use crate::game::state::{Gamestate, RoomTimeouts};
use crate::network::protocol::{
    AddEntity, ClearBattlefield, GamestatePayload, RolePayload, RoomJoined, ServerMessage,
    ShipPlacement,
};
use crate::network::session::Outbox;

/// Room errors. Everything except `Placement` is a recoverable user error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RoomError {
    /// Event arrived in the wrong gamestate.
    #[error("event is not allowed in gamestate {actual:?}, expected {expected:?}")]
    NotInPhase {
        /// Gamestate the event needs.
        expected: Gamestate,
        /// Current gamestate.
        actual: Gamestate,
    },

    /// Shot from the player who does not hold the turn.
    #[error("not your turn")]
    NotYourTurn,

    /// Shot outside the battlefield.
    #[error("cell {0} is outside the battlefield")]
    OutOfBounds(Vec2),

    /// Shot at a cell this player already targeted.
    #[error("cell {0} was already shot")]
    AlreadyShot(Vec2),

    /// Fleet submitted twice.
    #[error("fleet is already placed")]
    AlreadyBuilt,

    /// Valid but incomplete fleet.
    #[error("fleet is incomplete: {placed} ships placed")]
    IncompleteFleet {
        /// Ships in the rejected batch.
        placed: usize,
    },

    /// Second revenge request from the same player.
    #[error("revenge was already requested")]
    AlreadyRequestedRevenge,

    /// Both seats are taken.
    #[error("room is full")]
    RoomFull,

    /// Room was destroyed.
    #[error("room is closed")]
    Closed,

    /// Seat not occupied yet.
    #[error("no player in seat {0:?}")]
    EmptySeat(Role),

    /// Rule-violating placement.
    #[error("invalid placement: {0}")]
    Placement(#[from] PlacementError),
}

impl RoomError {
    /// Check if the error counts as a tampering attempt.
    pub fn is_security_violation(&self) -> bool {
        matches!(self, RoomError::Placement(_))
    }
}

// =============================================================================
// ROOM
// =============================================================================

/// Shared room handle. Stored in the registry and referenced by both sessions.
#[derive(Debug)]
pub struct Room {
    handle: String,
    state: Mutex<RoomState>,
}

impl Room {
    /// Create a room with the creator in the primary seat.
    pub fn new(handle: String, creator: &str, outbox: Outbox, timeouts: RoomTimeouts) -> Self {
        let state = RoomState {
            handle: handle.clone(),
            gamestate: Gamestate::Initial,
            turn: Role::Secondary,
            last_state_change: Instant::now(),
            timeouts,
            primary: Seat::new(Player::new(creator, Role::Primary), outbox),
            secondary: None,
            closed: false,
        };

        Self { handle, state: Mutex::new(state) }
    }

    /// Opaque room handle.
    pub fn handle(&self) -> &str {
        &self.handle
    }

    /// Acquire the room lock.
    pub async fn lock(&self) -> MutexGuard<'_, RoomState> {
        self.state.lock().await
    }
}

/// One occupied seat: the game-side board plus the way to reach its connection.
#[derive(Debug)]
pub struct Seat {
    player: Player,
    outbox: Outbox,
}

impl Seat {
    fn new(player: Player, outbox: Outbox) -> Self {
        Self { player, outbox }
    }

    /// Board.
    pub fn player(&self) -> &Player {
        &self.player
    }
}

/// State guarded by the room mutex.
#[derive(Debug)]
pub struct RoomState {
    handle: String,
    gamestate: Gamestate,
    turn: Role,
    last_state_change: Instant,
    timeouts: RoomTimeouts,
    primary: Seat,
    secondary: Option<Seat>,
    closed: bool,
}

impl RoomState {
    // =========================================================================
    // Accessors
    // =========================================================================

    /// Current gamestate.
    pub fn gamestate(&self) -> Gamestate {
        self.gamestate
    }

    /// Current turn holder.
    pub fn turn(&self) -> Role {
        self.turn
    }

    /// Check if the room was destroyed.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Check if both seats are taken.
    pub fn is_full(&self) -> bool {
        self.secondary.is_some()
    }

    /// Seat for a role, if occupied.
    pub fn seat(&self, role: Role) -> Option<&Seat> {
        match role {
            Role::Primary => Some(&self.primary),
            Role::Secondary => self.secondary.as_ref(),
        }
    }

    /// Board for a role, if occupied.
    pub fn player(&self, role: Role) -> Option<&Player> {
        self.seat(role).map(Seat::player)
    }

    fn seat_mut(&mut self, role: Role) -> Result<&mut Seat, RoomError> {
        match role {
            Role::Primary => Ok(&mut self.primary),
            Role::Secondary => self.secondary.as_mut().ok_or(RoomError::EmptySeat(Role::Secondary)),
        }
    }

    /// (attacker, defender) seats.
    fn duel_mut(&mut self, attacker: Role) -> Result<(&mut Seat, &mut Seat), RoomError> {
        let secondary = self.secondary.as_mut().ok_or(RoomError::EmptySeat(Role::Secondary))?;
        Ok(match attacker {
            Role::Primary => (&mut self.primary, secondary),
            Role::Secondary => (secondary, &mut self.primary),
        })
    }

    fn seats(&self) -> impl Iterator<Item = &Seat> {
        std::iter::once(&self.primary).chain(self.secondary.as_ref())
    }

    fn require_phase(&self, expected: Gamestate) -> Result<(), RoomError> {
        if self.gamestate != expected {
            return Err(RoomError::NotInPhase { expected, actual: self.gamestate });
        }
        Ok(())
    }

    // =========================================================================
    // Outbound
    // =========================================================================

    /// Queue a message to every occupied seat. No-op once closed.
    pub fn announce(&self, message: ServerMessage) {
        if self.closed {
            return;
        }
        for seat in self.seats() {
            seat.outbox.send(message.clone());
        }
    }

    /// Queue a message to one seat. No-op once closed.
    pub fn send_to(&self, role: Role, message: ServerMessage) {
        if self.closed {
            return;
        }
        if let Some(seat) = self.seat(role) {
            seat.outbox.send(message);
        }
    }

    // =========================================================================
    // Transitions
    // =========================================================================

    /// Take the secondary seat and start building.
    pub fn join(&mut self, name: &str, outbox: Outbox) -> Result<(), RoomError> {
        if self.closed {
            return Err(RoomError::Closed);
        }
        if self.is_full() {
            return Err(RoomError::RoomFull);
        }

        self.secondary = Some(Seat::new(Player::new(name, Role::Secondary), outbox));
        info!(room = %self.handle, "{} joined {}", name, self.primary.player.name());

        self.announce(ServerMessage::RoomJoined(RoomJoined {
            primary_name: self.primary.player.name().to_string(),
            secondary_name: name.to_string(),
        }));
        self.start_building();
        Ok(())
    }

    /// Change gamestate, restart the phase timer and announce it.
    fn set_gamestate(&mut self, gamestate: Gamestate) {
        debug!(room = %self.handle, "Gamestate {:?} -> {:?}", self.gamestate, gamestate);
        self.gamestate = gamestate;
        self.last_state_change = Instant::now();
        self.announce(ServerMessage::SetGamestate(GamestatePayload { gamestate }));
    }

    /// INITIAL -> BUILDING. Clears both fleets.
    pub fn start_building(&mut self) -> bool {
        if self.gamestate != Gamestate::Initial || self.secondary.is_none() {
            return false;
        }

        self.primary.player.clear_ships();
        if let Some(secondary) = self.secondary.as_mut() {
            secondary.player.clear_ships();
        }
        self.set_gamestate(Gamestate::Building);
        true
    }

    /// Check if both fleets are complete.
    pub fn can_start_playing(&self) -> bool {
        self.gamestate == Gamestate::Building
            && self.primary.player.is_built()
            && self.secondary.as_ref().is_some_and(|s| s.player.is_built())
    }

    /// BUILDING -> PLAYING. The primary player always moves first.
    pub fn start_playing(&mut self) -> bool {
        if !self.can_start_playing() {
            return false;
        }

        self.set_gamestate(Gamestate::Playing);
        self.turn = Role::Secondary;
        self.switch_turn();
        true
    }

    /// Hand the turn to the other player.
    pub fn switch_turn(&mut self) {
        self.turn = self.turn.opponent();
        self.announce(ServerMessage::SetTurn(RolePayload { role: self.turn }));
    }

    /// Place a whole fleet for `role`.
    ///
    /// The first invalid ship clears the batch and returns a security
    /// violation. A valid but short batch is cleared too.
    pub fn submit_ships(&mut self, role: Role, placements: &[ShipPlacement]) -> Result<(), RoomError> {
        self.require_phase(Gamestate::Building)?;

        let player = &mut self.seat_mut(role)?.player;
        if player.is_built() {
            return Err(RoomError::AlreadyBuilt);
        }

        for placement in placements {
            let placed = Ship::from_placement(placement.ship_kind, placement.position, placement.orientation)
                .and_then(|ship| player.add_ship(ship));
            if let Err(e) = placed {
                player.clear_ships();
                return Err(e.into());
            }
        }

        if !player.is_built() {
            let placed = player.ships().len();
            player.clear_ships();
            return Err(RoomError::IncompleteFleet { placed });
        }

        let mut resync = vec![ServerMessage::ClearBattlefield(ClearBattlefield::new(role, Footprint::GRID))];
        resync.extend(
            player
                .ships()
                .iter()
                .map(|ship| ServerMessage::AddEntity(AddEntity::ship(role, ship))),
        );

        self.announce(ServerMessage::ReadyToPlay(RolePayload { role }));
        for message in resync {
            self.send_to(role, message);
        }
        self.start_playing();
        Ok(())
    }

    /// Resolve a shot from `attacker` at `target`.
    pub fn shoot(&mut self, attacker: Role, target: Vec2) -> Result<ShotOutcome, RoomError> {
        self.require_phase(Gamestate::Playing)?;
        if self.turn != attacker {
            return Err(RoomError::NotYourTurn);
        }
        if !target.in_bounds() {
            return Err(RoomError::OutOfBounds(target));
        }

        let defender = attacker.opponent();
        let (attacking, defending) = self.duel_mut(attacker)?;
        if attacking.player.has_shot_at(target) {
            return Err(RoomError::AlreadyShot(target));
        }

        attacking.player.mark_shot(target);
        let outcome = defending.player.record_shot_received(target);

        match &outcome {
            ShotOutcome::Miss => {
                self.announce(ServerMessage::AddEntity(AddEntity::marker(defender, EntityKind::EmptyCell, target)));
                self.switch_turn();
            }
            ShotOutcome::Hit => {
                self.announce(ServerMessage::AddEntity(AddEntity::marker(defender, EntityKind::HitMark, target)));
                self.switch_turn();
            }
            ShotOutcome::Sunk(ship) => {
                let revealed: Vec<Vec2> = ship
                    .footprint()
                    .dilate(1)
                    .clamp_to_grid()
                    .cells()
                    .filter(|cell| attacking.player.mark_shot(*cell))
                    .collect();
                let annihilated = defending.player.is_annihilated();

                for cell in revealed {
                    self.announce(ServerMessage::AddEntity(AddEntity::marker(defender, EntityKind::EmptyCell, cell)));
                }
                self.send_to(attacker, ServerMessage::ClearBattlefield(ClearBattlefield::new(defender, ship.footprint())));
                self.send_to(attacker, ServerMessage::AddEntity(AddEntity::ship(defender, ship)));
                self.send_to(defender, ServerMessage::AddEntity(AddEntity::marker(defender, EntityKind::HitMark, target)));

                if annihilated {
                    info!(room = %self.handle, "{:?} won", attacker);
                    self.announce(ServerMessage::PlayerWin(RolePayload { role: attacker }));
                    self.set_gamestate(Gamestate::Over);
                }
            }
            ShotOutcome::Repeat => {}
        }

        Ok(outcome)
    }

    /// Flag a rematch request and restart once both players asked.
    pub fn request_revenge(&mut self, role: Role) -> Result<bool, RoomError> {
        self.require_phase(Gamestate::Over)?;

        let player = &mut self.seat_mut(role)?.player;
        if player.revenge_requested() {
            return Err(RoomError::AlreadyRequestedRevenge);
        }
        player.set_revenge_requested(true);

        self.announce(ServerMessage::RevengeRequested(RolePayload { role }));
        Ok(self.start_revenge())
    }

    /// OVER -> INITIAL -> BUILDING when both flags are set.
    pub fn start_revenge(&mut self) -> bool {
        let both = self.gamestate == Gamestate::Over
            && self.primary.player.revenge_requested()
            && self.secondary.as_ref().is_some_and(|s| s.player.revenge_requested());
        if !both {
            return false;
        }

        self.primary.player.set_revenge_requested(false);
        if let Some(secondary) = self.secondary.as_mut() {
            secondary.player.set_revenge_requested(false);
        }

        info!(room = %self.handle, "Revenge accepted");
        self.set_gamestate(Gamestate::Initial);
        self.start_building()
    }

    /// Check the phase ceiling for the current gamestate.
    pub fn expired(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.last_state_change) >= self.timeouts.ceiling(self.gamestate)
    }

    /// Announce `ROOM_CLOSED`, disconnect both seats and mark the room closed.
    ///
    /// Removal from the registry is the caller's job.
    pub fn destroy(&mut self) {
        if self.closed {
            return;
        }

        self.announce(ServerMessage::RoomClosed);
        for seat in self.seats() {
            seat.outbox.close();
        }
        self.closed = true;
        info!(room = %self.handle, "Room destroyed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::sync::mpsc::UnboundedReceiver;
    use crate::core::grid::GRID_SIZE;
    use crate::game::player::standard_fleet;
    use crate::game::ship::Orientation;
    use crate::network::session::Outbound;

    type Inbox = UnboundedReceiver<Outbound>;

    fn outbox(port: u16) -> (Outbox, Inbox) {
        Outbox::channel(format!("127.0.0.1:{port}").parse().unwrap())
    }

    fn drain(rx: &mut Inbox) -> Vec<ServerMessage> {
        let mut messages = Vec::new();
        while let Ok(out) = rx.try_recv() {
            if let Outbound::Message(message) = out {
                messages.push(message);
            }
        }
        messages
    }

    fn placements(fleet: &[Ship]) -> Vec<ShipPlacement> {
        fleet
            .iter()
            .map(|ship| ShipPlacement {
                ship_kind: i64::from(u8::from(ship.kind())),
                position: ship.anchor(),
                orientation: i64::from(u8::from(ship.orientation())),
            })
            .collect()
    }

    fn joined_room() -> (RoomState, Inbox, Inbox) {
        let (primary_out, mut primary_rx) = outbox(1);
        let (secondary_out, mut secondary_rx) = outbox(2);
        let room = Room::new("room".to_string(), "Alice", primary_out, RoomTimeouts::default());
        let mut state = room.state.into_inner();
        state.join("Bob", secondary_out).unwrap();
        drain(&mut primary_rx);
        drain(&mut secondary_rx);
        (state, primary_rx, secondary_rx)
    }

    fn playing_room() -> (RoomState, Inbox, Inbox) {
        let (mut state, mut primary_rx, mut secondary_rx) = joined_room();
        let fleet = placements(&standard_fleet());
        state.submit_ships(Role::Primary, &fleet).unwrap();
        state.submit_ships(Role::Secondary, &fleet).unwrap();
        drain(&mut primary_rx);
        drain(&mut secondary_rx);
        (state, primary_rx, secondary_rx)
    }

    #[test]
    fn test_join_starts_building() {
        let (primary_out, mut primary_rx) = outbox(1);
        let (secondary_out, mut secondary_rx) = outbox(2);
        let room = Room::new("room".to_string(), "Alice", primary_out, RoomTimeouts::default());
        let mut state = room.state.into_inner();

        state.join("Bob", secondary_out).unwrap();
        assert_eq!(state.gamestate(), Gamestate::Building);

        let expected = vec![
            ServerMessage::RoomJoined(RoomJoined {
                primary_name: "Alice".to_string(),
                secondary_name: "Bob".to_string(),
            }),
            ServerMessage::SetGamestate(GamestatePayload { gamestate: Gamestate::Building }),
        ];
        assert_eq!(drain(&mut primary_rx), expected);
        assert_eq!(drain(&mut secondary_rx), expected);
    }

    #[test]
    fn test_join_full_room() {
        let (mut state, _p, _s) = joined_room();
        let (third, _rx) = outbox(3);
        assert_eq!(state.join("Carol", third), Err(RoomError::RoomFull));
    }

    #[test]
    fn test_primary_moves_first() {
        let (mut state, mut primary_rx, _s) = joined_room();
        let fleet = placements(&standard_fleet());

        state.submit_ships(Role::Secondary, &fleet).unwrap();
        assert_eq!(state.gamestate(), Gamestate::Building);
        state.submit_ships(Role::Primary, &fleet).unwrap();

        assert_eq!(state.gamestate(), Gamestate::Playing);
        assert_eq!(state.turn(), Role::Primary);

        let messages = drain(&mut primary_rx);
        assert_eq!(messages.last(), Some(&ServerMessage::SetTurn(RolePayload { role: Role::Primary })));
        assert!(messages.contains(&ServerMessage::ClearBattlefield(ClearBattlefield::new(Role::Primary, Footprint::GRID))));
    }

    #[test]
    fn test_submit_resyncs_own_board() {
        let (mut state, mut primary_rx, mut secondary_rx) = joined_room();
        state.submit_ships(Role::Primary, &placements(&standard_fleet())).unwrap();

        let own = drain(&mut primary_rx);
        assert_eq!(own[0], ServerMessage::ReadyToPlay(RolePayload { role: Role::Primary }));
        assert_eq!(own.len(), 2 + standard_fleet().len());

        let other = drain(&mut secondary_rx);
        assert_eq!(other, vec![ServerMessage::ReadyToPlay(RolePayload { role: Role::Primary })]);
    }

    #[test]
    fn test_invalid_placement_is_security_violation() {
        let (mut state, _p, _s) = joined_room();
        let mut fleet = placements(&standard_fleet());
        fleet[1].position = Vec2::new(2, 2);

        let err = state.submit_ships(Role::Primary, &fleet).unwrap_err();
        assert!(err.is_security_violation());
        assert!(state.player(Role::Primary).unwrap().ships().is_empty());
    }

    #[test]
    fn test_bad_orientation_is_security_violation() {
        let (mut state, _p, _s) = joined_room();
        let mut fleet = placements(&standard_fleet());
        fleet[0].orientation = 7;

        let err = state.submit_ships(Role::Primary, &fleet).unwrap_err();
        assert_eq!(err, RoomError::Placement(PlacementError::InvalidOrientation(7)));
    }

    #[test]
    fn test_extreme_anchor_is_security_violation() {
        let (mut state, _p, _s) = joined_room();
        let fleet = vec![ShipPlacement {
            ship_kind: 3,
            position: Vec2::new(i32::MAX, 5),
            orientation: 1,
        }];

        let err = state.submit_ships(Role::Primary, &fleet).unwrap_err();
        assert!(matches!(err, RoomError::Placement(PlacementError::OutOfBounds { .. })));
        assert!(err.is_security_violation());
    }

    #[test]
    fn test_incomplete_fleet_is_user_error() {
        let (mut state, _p, _s) = joined_room();
        let fleet = placements(&standard_fleet()[..3]);

        let err = state.submit_ships(Role::Primary, &fleet).unwrap_err();
        assert_eq!(err, RoomError::IncompleteFleet { placed: 3 });
        assert!(!err.is_security_violation());
        assert!(state.player(Role::Primary).unwrap().ships().is_empty());
    }

    #[test]
    fn test_double_submit_rejected() {
        let (mut state, _p, _s) = joined_room();
        let fleet = placements(&standard_fleet());
        state.submit_ships(Role::Primary, &fleet).unwrap();
        assert_eq!(state.submit_ships(Role::Primary, &fleet), Err(RoomError::AlreadyBuilt));
    }

    #[test]
    fn test_miss_flips_turn() {
        let (mut state, mut primary_rx, _s) = playing_room();

        let outcome = state.shoot(Role::Primary, Vec2::new(10, 1)).unwrap();
        assert_eq!(outcome, ShotOutcome::Miss);
        assert_eq!(state.turn(), Role::Secondary);

        assert_eq!(drain(&mut primary_rx), vec![
            ServerMessage::AddEntity(AddEntity::marker(Role::Secondary, EntityKind::EmptyCell, Vec2::new(10, 1))),
            ServerMessage::SetTurn(RolePayload { role: Role::Secondary }),
        ]);
    }

    #[test]
    fn test_hit_flips_turn() {
        let (mut state, _p, _s) = playing_room();
        assert_eq!(state.shoot(Role::Primary, Vec2::new(1, 1)).unwrap(), ShotOutcome::Hit);
        assert_eq!(state.turn(), Role::Secondary);
    }

    #[test]
    fn test_sink_keeps_turn_and_reveals_buffer() {
        let (mut state, mut primary_rx, mut secondary_rx) = playing_room();

        let outcome = state.shoot(Role::Primary, Vec2::new(10, 10)).unwrap();
        assert!(matches!(outcome, ShotOutcome::Sunk(_)));
        assert_eq!(state.turn(), Role::Primary);

        // Corner ship: 3 buffer cells on the board.
        let attacker_view = drain(&mut primary_rx);
        let buffer_markers = attacker_view
            .iter()
            .filter(|m| matches!(m, ServerMessage::AddEntity(e) if e.entity.kind == EntityKind::EmptyCell))
            .count();
        assert_eq!(buffer_markers, 3);
        assert!(attacker_view.iter().any(|m| matches!(
            m,
            ServerMessage::AddEntity(e) if e.entity.kind == EntityKind::OneDeck && e.role == Role::Secondary
        )));

        let defender_view = drain(&mut secondary_rx);
        assert_eq!(
            defender_view.last(),
            Some(&ServerMessage::AddEntity(AddEntity::marker(Role::Secondary, EntityKind::HitMark, Vec2::new(10, 10))))
        );

        // Buffer cells count as shot.
        assert_eq!(state.shoot(Role::Primary, Vec2::new(9, 9)), Err(RoomError::AlreadyShot(Vec2::new(9, 9))));
    }

    #[test]
    fn test_shot_validation() {
        let (mut state, _p, _s) = playing_room();

        assert_eq!(state.shoot(Role::Secondary, Vec2::new(1, 1)), Err(RoomError::NotYourTurn));
        assert_eq!(state.shoot(Role::Primary, Vec2::new(0, 5)), Err(RoomError::OutOfBounds(Vec2::new(0, 5))));

        state.shoot(Role::Primary, Vec2::new(10, 1)).unwrap();
        state.shoot(Role::Secondary, Vec2::new(10, 1)).unwrap();
        assert_eq!(state.shoot(Role::Primary, Vec2::new(10, 1)), Err(RoomError::AlreadyShot(Vec2::new(10, 1))));
        assert_eq!(state.turn(), Role::Primary);
    }

    #[test]
    fn test_shot_before_playing_rejected() {
        let (mut state, _p, _s) = joined_room();
        assert!(matches!(
            state.shoot(Role::Primary, Vec2::new(1, 1)),
            Err(RoomError::NotInPhase { expected: Gamestate::Playing, .. })
        ));
    }

    /// Sink the whole standard fleet. The opponent misses along row 9
    /// whenever a hit hands them the turn.
    fn sink_everything_from(state: &mut RoomState, attacker: Role) {
        let mut spare = (1..=GRID_SIZE).map(|x| Vec2::new(x, 9));
        for ship in standard_fleet() {
            for cell in ship.footprint().cells() {
                state.shoot(attacker, cell).unwrap();
                if state.gamestate() == Gamestate::Playing && state.turn() != attacker {
                    state.shoot(attacker.opponent(), spare.next().unwrap()).unwrap();
                }
            }
        }
    }

    fn sink_everything(state: &mut RoomState) {
        sink_everything_from(state, Role::Primary);
    }

    #[test]
    fn test_annihilation_ends_match() {
        let (mut state, mut primary_rx, _s) = playing_room();
        sink_everything(&mut state);

        assert_eq!(state.gamestate(), Gamestate::Over);
        let messages = drain(&mut primary_rx);
        let n = messages.len();
        assert_eq!(messages[n - 2], ServerMessage::PlayerWin(RolePayload { role: Role::Primary }));
        assert_eq!(messages[n - 1], ServerMessage::SetGamestate(GamestatePayload { gamestate: Gamestate::Over }));
    }

    #[test]
    fn test_revenge_needs_both_players() {
        let (mut state, _p, mut secondary_rx) = playing_room();
        sink_everything(&mut state);
        drain(&mut secondary_rx);

        assert_eq!(state.request_revenge(Role::Secondary), Ok(false));
        assert_eq!(state.gamestate(), Gamestate::Over);
        assert_eq!(state.request_revenge(Role::Secondary), Err(RoomError::AlreadyRequestedRevenge));

        assert_eq!(state.request_revenge(Role::Primary), Ok(true));
        assert_eq!(state.gamestate(), Gamestate::Building);
        assert!(!state.player(Role::Primary).unwrap().revenge_requested());
        assert!(state.player(Role::Secondary).unwrap().ships().is_empty());

        let states: Vec<_> = drain(&mut secondary_rx)
            .into_iter()
            .filter_map(|m| match m {
                ServerMessage::SetGamestate(p) => Some(p.gamestate),
                _ => None,
            })
            .collect();
        assert_eq!(states, vec![Gamestate::Initial, Gamestate::Building]);
    }

    #[test]
    fn test_rematch_primary_moves_first_again() {
        let (mut state, _p, _s) = playing_room();
        state.shoot(Role::Primary, Vec2::new(10, 1)).unwrap();
        sink_everything_from(&mut state, Role::Secondary);

        state.request_revenge(Role::Primary).unwrap();
        state.request_revenge(Role::Secondary).unwrap();
        let fleet = placements(&standard_fleet());
        state.submit_ships(Role::Primary, &fleet).unwrap();
        state.submit_ships(Role::Secondary, &fleet).unwrap();

        assert_eq!(state.turn(), Role::Primary);
    }

    #[test]
    fn test_revenge_outside_over_rejected() {
        let (mut state, _p, _s) = playing_room();
        assert!(matches!(state.request_revenge(Role::Primary), Err(RoomError::NotInPhase { .. })));
    }

    #[test]
    fn test_phase_timeouts() {
        let (state, _p, _s) = joined_room();
        let now = Instant::now();
        assert!(!state.expired(now));
        assert!(state.expired(now + Duration::from_secs(10 * 60 + 1)));

        let ceiling_reached = state.last_state_change + RoomTimeouts::default().building;
        assert!(state.expired(ceiling_reached));
    }

    #[test]
    fn test_over_has_short_ceiling() {
        let (mut state, _p, _s) = playing_room();
        sink_everything(&mut state);
        assert!(state.expired(Instant::now() + Duration::from_secs(3 * 60 + 1)));
    }

    #[test]
    fn test_destroy_closes_both_seats() {
        let (mut state, mut primary_rx, mut secondary_rx) = joined_room();
        state.destroy();
        state.destroy();

        for rx in [&mut primary_rx, &mut secondary_rx] {
            assert_eq!(rx.try_recv().ok(), Some(Outbound::Message(ServerMessage::RoomClosed)));
            assert_eq!(rx.try_recv().ok(), Some(Outbound::Close));
            assert!(rx.try_recv().is_err());
        }

        assert!(state.is_closed());
        let (late, _rx) = outbox(9);
        assert_eq!(state.join("Carol", late), Err(RoomError::Closed));
    }

    #[test]
    fn test_vertical_fleet_accepted() {
        let (mut state, _p, _s) = joined_room();
        let mut fleet = standard_fleet();
        fleet[0] = Ship::new(EntityKind::FourDeck, Vec2::new(10, 4), Orientation::Vertical).unwrap();

        state.submit_ships(Role::Primary, &placements(&fleet)).unwrap();
        assert_eq!(
            state.player(Role::Primary).unwrap().ships()[0].footprint(),
            Footprint::new(Vec2::new(10, 1), Vec2::new(10, 4))
        );
    }
}
