//! Session state for the reference server.
//!
//! A session owns one game: its seats, the board, the dice, the per-turn
//! history and the set of connections subscribed to its pushes. Every
//! successful mutation bumps `revision`.

use std::collections::BTreeMap;

use maxgammon_board::{
    BoardState, CheckerPositions, Color, Dice, GameMode, MAX_LOCATION, Point, winner,
};

use crate::ConnectionId;
use crate::ai::AiPolicy;
use crate::history::{History, Snapshot};
use crate::rules;
use crate::validation::Rejection;

/// Short join code handed to clients.
pub type SessionId = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeatKind {
    Human,
    Ai,
}

/// One registered identity and the colour it plays.
#[derive(Debug, Clone)]
pub struct Seat {
    pub name: String,
    pub color: Color,
    pub kind: SeatKind,
    /// Online seats are bound to the connection that claimed them.
    pub connection: Option<ConnectionId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LobbyStatus {
    Waiting,
    Ready,
}

#[derive(Debug, Clone)]
pub struct Session {
    pub id: SessionId,
    mode: GameMode,
    status: LobbyStatus,
    /// Index 0 plays light, index 1 plays dark.
    seats: Vec<Seat>,
    turn: usize,
    dice: Dice,
    checkers: CheckerPositions,
    awaiting_turn_change: bool,
    history: History,
    revision: u64,
    subscribers: Vec<ConnectionId>,
    game_over_announced: bool,
}

impl Session {
    fn new(id: SessionId, mode: GameMode, seats: Vec<Seat>, turn: usize, creator: ConnectionId) -> Self {
        let status = if seats.len() == 2 {
            LobbyStatus::Ready
        } else {
            LobbyStatus::Waiting
        };
        Self {
            id,
            mode,
            status,
            seats,
            turn,
            dice: Dice::empty(),
            checkers: CheckerPositions::starting(),
            awaiting_turn_change: false,
            history: History::new(),
            revision: 0,
            subscribers: vec![creator],
            game_over_announced: false,
        }
    }

    /// Human versus computer. The computer plays light; the human opens.
    pub fn against_ai(id: SessionId, human: String, ai_identity: &str, creator: ConnectionId) -> Self {
        let seats = vec![
            Seat {
                name: ai_identity.to_string(),
                color: Color::Light,
                kind: SeatKind::Ai,
                connection: None,
            },
            Seat {
                name: human,
                color: Color::Dark,
                kind: SeatKind::Human,
                connection: Some(creator),
            },
        ];
        Self::new(id, GameMode::Ai, seats, 1, creator)
    }

    /// Two humans sharing the creating connection.
    pub fn local(id: SessionId, names: [String; 2], opening: usize, creator: ConnectionId) -> Self {
        let [light, dark] = names;
        let seats = vec![
            Seat {
                name: light,
                color: Color::Light,
                kind: SeatKind::Human,
                connection: Some(creator),
            },
            Seat {
                name: dark,
                color: Color::Dark,
                kind: SeatKind::Human,
                connection: Some(creator),
            },
        ];
        Self::new(id, GameMode::Local, seats, opening.min(1), creator)
    }

    /// Online lobby with only the host seated.
    pub fn lobby(id: SessionId, host: String, creator: ConnectionId) -> Self {
        let seats = vec![Seat {
            name: host,
            color: Color::Light,
            kind: SeatKind::Human,
            connection: Some(creator),
        }];
        Self::new(id, GameMode::Online, seats, 0, creator)
    }

    /// Fill the dark seat of a waiting lobby. Caller validates first.
    pub fn join(&mut self, name: String, conn: ConnectionId, opening: usize) {
        self.seats.push(Seat {
            name,
            color: Color::Dark,
            kind: SeatKind::Human,
            connection: Some(conn),
        });
        self.status = LobbyStatus::Ready;
        self.turn = opening.min(1);
        self.subscribe(conn);
        self.revision += 1;
    }

    // ------------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------------

    pub fn mode(&self) -> GameMode {
        self.mode
    }

    pub fn status(&self) -> LobbyStatus {
        self.status
    }

    pub fn seats(&self) -> &[Seat] {
        &self.seats
    }

    pub fn current_seat(&self) -> &Seat {
        // seats is never empty and turn is kept in range
        &self.seats[self.turn.min(self.seats.len() - 1)]
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn subscribers(&self) -> &[ConnectionId] {
        &self.subscribers
    }

    pub fn checkers(&self) -> &CheckerPositions {
        &self.checkers
    }

    pub fn dice(&self) -> &Dice {
        &self.dice
    }

    pub fn subscribe(&mut self, conn: ConnectionId) {
        if !self.subscribers.contains(&conn) {
            self.subscribers.push(conn);
        }
    }

    pub fn unsubscribe(&mut self, conn: ConnectionId) {
        self.subscribers.retain(|&c| c != conn);
    }

    /// Seat index of the human in an AI game.
    pub fn human_seat(&self) -> usize {
        self.seats
            .iter()
            .position(|s| s.kind == SeatKind::Human)
            .unwrap_or(0)
    }

    pub fn winner(&self) -> Option<&Seat> {
        let color = winner(&self.checkers)?;
        self.seats.iter().find(|s| s.color == color)
    }

    /// Winner's name the first time a win is observed for this game.
    pub fn take_game_over(&mut self) -> Option<String> {
        if self.game_over_announced {
            return None;
        }
        let name = self.winner()?.name.clone();
        self.game_over_announced = true;
        Some(name)
    }

    pub fn board_state(&self) -> BoardState {
        BoardState {
            current_turn: self.current_seat().name.clone(),
            dice: self.dice.clone(),
            checkers: self.checkers.clone(),
            awaiting_turn_change: self.awaiting_turn_change,
            revision: self.revision,
        }
    }

    // ------------------------------------------------------------------------
    // Commands
    // ------------------------------------------------------------------------

    /// Replace empty dice with a fresh roll and start a new history.
    pub fn roll(&mut self, dice: Dice) -> Result<&Dice, Rejection> {
        if !self.dice.is_empty() || self.awaiting_turn_change {
            return Err(Rejection::AlreadyRolled);
        }
        self.dice = dice;
        self.history.reset(self.snapshot());
        self.revision += 1;
        Ok(&self.dice)
    }

    /// Destinations for the player on turn from `point`, with pip spent.
    pub fn pick_start(&self, point: u32) -> Result<BTreeMap<Point, u8>, Rejection> {
        let origin = checked_location(point)?;
        let color = self.current_seat().color;
        Ok(rules::possible_moves(&self.checkers, &self.dice, color, origin))
    }

    pub fn make_move(&mut self, previous_position: u32, position: u32) -> Result<(), Rejection> {
        let origin = checked_location(previous_position)?;
        let dest = checked_location(position)?;
        if self.dice.is_empty() {
            return Err(Rejection::NoDice);
        }

        let color = self.current_seat().color;
        let moves = rules::possible_moves(&self.checkers, &self.dice, color, origin);
        let Some(&pip) = moves.get(&dest) else {
            return Err(Rejection::IllegalMove {
                origin: previous_position,
                position,
            });
        };

        rules::apply_move(&mut self.checkers, color, origin, dest);
        self.dice.consume(pip);
        if self.dice.is_empty() {
            self.awaiting_turn_change = true;
        }
        self.history.record(self.snapshot());
        self.revision += 1;
        Ok(())
    }

    /// Returns false when there was nothing to undo.
    pub fn undo(&mut self) -> bool {
        let Some(snapshot) = self.history.undo().cloned() else {
            return false;
        };
        self.restore(snapshot);
        true
    }

    /// Returns false when there was nothing to redo.
    pub fn redo(&mut self) -> bool {
        let Some(snapshot) = self.history.redo().cloned() else {
            return false;
        };
        self.restore(snapshot);
        true
    }

    /// Hand the turn over. Accepted once the dice are spent, or when the
    /// remaining dice have no legal use and are forfeited.
    pub fn change_turn(&mut self) -> Result<(), Rejection> {
        if !self.awaiting_turn_change {
            if self.dice.is_empty() {
                return Err(Rejection::NoDice);
            }
            if self.has_legal_move() {
                return Err(Rejection::DiceOutstanding);
            }
        }
        self.pass_turn();
        self.revision += 1;
        Ok(())
    }

    /// Pure: whether the player on turn can use any of the current dice.
    pub fn has_legal_move(&self) -> bool {
        rules::has_legal_move(&self.checkers, &self.dice, self.current_seat().color)
    }

    /// Play the computer's whole turn with `policy`, then hand the turn back
    /// unless the computer won.
    pub fn ai_play(&mut self, policy: &dyn AiPolicy) -> Result<usize, Rejection> {
        if self.current_seat().kind != SeatKind::Ai {
            return Err(Rejection::NotAiTurn);
        }
        if self.dice.is_empty() {
            return Err(Rejection::NoDice);
        }

        let color = self.current_seat().color;
        let mut played = 0;
        while !self.dice.is_empty() && winner(&self.checkers).is_none() {
            let Some((origin, dest)) = policy.choose(&self.checkers, &self.dice, color) else {
                break;
            };
            let moves = rules::possible_moves(&self.checkers, &self.dice, color, origin);
            let Some(&pip) = moves.get(&dest) else {
                tracing::warn!(policy = policy.name(), origin, dest, "policy chose an illegal move");
                break;
            };
            rules::apply_move(&mut self.checkers, color, origin, dest);
            self.dice.consume(pip);
            played += 1;
        }

        if winner(&self.checkers).is_some() {
            self.dice.clear();
            self.awaiting_turn_change = false;
            self.history.clear();
        } else {
            self.pass_turn();
        }
        self.revision += 1;
        Ok(played)
    }

    /// Back to the starting layout with `opening` on turn.
    pub fn restart(&mut self, opening: usize) {
        self.checkers = CheckerPositions::starting();
        self.dice.clear();
        self.awaiting_turn_change = false;
        self.history.clear();
        self.turn = opening.min(self.seats.len() - 1);
        self.game_over_announced = false;
        self.revision += 1;
    }

    /// Overwrite the position directly. Test fixtures only.
    pub fn stage(&mut self, checkers: CheckerPositions, dice: Dice, turn: &str) -> Result<(), Rejection> {
        checkers
            .validate()
            .map_err(|e| Rejection::BadStaging(e.to_string()))?;
        let seat = self
            .seats
            .iter()
            .position(|s| s.name == turn)
            .ok_or_else(|| Rejection::BadStaging(format!("no seat named {turn:?}")))?;
        self.checkers = checkers;
        self.dice = dice;
        self.turn = seat;
        self.awaiting_turn_change = false;
        self.history.reset(self.snapshot());
        self.game_over_announced = false;
        self.revision += 1;
        Ok(())
    }

    /// Other seat takes the turn with no dice and no history.
    pub fn pass_turn(&mut self) {
        if self.seats.len() == 2 {
            self.turn = 1 - self.turn;
        }
        self.dice.clear();
        self.awaiting_turn_change = false;
        self.history.clear();
    }

    fn snapshot(&self) -> Snapshot {
        Snapshot {
            dice: self.dice.clone(),
            checkers: self.checkers.clone(),
            awaiting_turn_change: self.awaiting_turn_change,
        }
    }

    fn restore(&mut self, snapshot: Snapshot) {
        self.dice = snapshot.dice;
        self.checkers = snapshot.checkers;
        self.awaiting_turn_change = snapshot.awaiting_turn_change;
        self.revision += 1;
    }
}

fn checked_location(index: u32) -> Result<Point, Rejection> {
    Point::try_from(index)
        .ok()
        .filter(|&p| p <= MAX_LOCATION)
        .ok_or(Rejection::LocationOutOfRange(index))
}

// ============================================================================
// Tests
// ============================================================================
