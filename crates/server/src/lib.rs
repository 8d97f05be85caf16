//! Maxgammon Session Server
//!
//! Reference implementation of the session authority a Maxgammon client
//! talks to. It owns:
//! - Session lifecycle (create, lobby, join)
//! - Command validation and the move rules
//! - Per-turn undo/redo history
//! - Push fan-out (`GameReady`, `StateChanged`, `GameOver`)
//!
//! # Architecture
//!
//! The server is a plain state machine: `handle_frame` consumes one
//! `ClientFrame` from a connection and queues exactly one response for it,
//! plus any pushes for other connections. Transports drain the queues with
//! `take_frame`. No I/O happens here; see `loopback` for an in-process
//! transport.

#![deny(unsafe_code)]

pub mod ai;
pub mod history;
pub mod loopback;
pub mod rules;
pub mod session;
pub mod validation;

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;

use maxgammon_board::{AI_IDENTITY, CheckerPositions, Dice, GameMode};
use maxgammon_wire::{
    ClientFrame, ColorAssignment, ColorProto, Command, CreateSession, DiceRolled, GameModeProto,
    GameOver, GameReady, LegalMove, PlayerColor, PushEvent, ResponseResult, ServerFrame,
    SessionCreated, StateChanged, StateProto, TurnChanged, ValidMoves, WinnerChecked,
};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use ai::{AiPolicy, RunnerPolicy};
pub use loopback::{LoopbackTransport, SharedServer};
use session::Session;
pub use session::SessionId;
pub use validation::Rejection;

/// Server-assigned handle for one client connection.
pub type ConnectionId = u64;

// ============================================================================
// Parameters
// ============================================================================

/// Hex digits in a session code.
pub const SESSION_CODE_DIGITS: usize = 6;

const SESSION_CODE_SPACE: u32 = 1 << (4 * SESSION_CODE_DIGITS);

// ============================================================================
// Server State
// ============================================================================

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub seed: u64,
    pub test_mode: bool,
    /// Rolls handed out before falling back to the RNG, opening rolls included.
    pub test_rolls: Vec<(u8, u8)>,
    pub ai_identity: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            seed: 0,
            test_mode: false,
            test_rolls: Vec::new(),
            ai_identity: AI_IDENTITY.to_string(),
        }
    }
}

/// Dice source: scripted rolls first, then a seeded RNG.
struct DiceCup {
    rng: ChaCha8Rng,
    scripted: VecDeque<(u8, u8)>,
}

impl DiceCup {
    fn roll(&mut self) -> (u8, u8) {
        if let Some(roll) = self.scripted.pop_front() {
            return roll;
        }
        (self.rng.gen_range(1..=6), self.rng.gen_range(1..=6))
    }

    /// Seat that opens: light (0) when its die is higher, else dark (1).
    /// Ties are rerolled.
    fn opening_seat(&mut self) -> usize {
        loop {
            let (light, dark) = self.roll();
            if light != dark {
                return if light > dark { 0 } else { 1 };
            }
        }
    }
}

type Outgoing = Vec<(ConnectionId, ServerFrame)>;

/// Session authority for any number of games.
pub struct SessionServer {
    config: ServerConfig,
    cup: DiceCup,
    policy: Box<dyn AiPolicy>,
    sessions: HashMap<SessionId, Session>,
    /// Frames waiting to be read, per connection
    outboxes: HashMap<ConnectionId, VecDeque<ServerFrame>>,
    next_connection_id: ConnectionId,
}

impl SessionServer {
    /// Create a server with the default computer policy.
    pub fn new(config: ServerConfig) -> Self {
        Self::with_policy(config, Box::new(RunnerPolicy))
    }

    pub fn with_policy(config: ServerConfig, policy: Box<dyn AiPolicy>) -> Self {
        let cup = DiceCup {
            rng: ChaCha8Rng::seed_from_u64(config.seed),
            scripted: config.test_rolls.iter().copied().collect(),
        };
        Self {
            cup,
            policy,
            sessions: HashMap::new(),
            outboxes: HashMap::new(),
            next_connection_id: 1,
            config,
        }
    }

    /// Wrap a new server for sharing between loopback transports.
    pub fn shared(config: ServerConfig) -> SharedServer {
        Rc::new(RefCell::new(Self::new(config)))
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    pub fn connection_count(&self) -> usize {
        self.outboxes.len()
    }

    pub fn session(&self, id: &str) -> Option<&Session> {
        self.sessions.get(id)
    }

    /// Register a connection and return its handle.
    pub fn connect(&mut self) -> ConnectionId {
        let id = self.next_connection_id;
        self.next_connection_id += 1;
        self.outboxes.insert(id, VecDeque::new());
        tracing::debug!(connection = id, "connection opened");
        id
    }

    /// Drop a connection's queue and its push subscriptions. Seats stay bound.
    pub fn disconnect(&mut self, conn: ConnectionId) {
        self.outboxes.remove(&conn);
        for session in self.sessions.values_mut() {
            session.unsubscribe(conn);
        }
        tracing::debug!(connection = conn, "connection closed");
    }

    /// Next queued frame for `conn`.
    pub fn take_frame(&mut self, conn: ConnectionId) -> Option<ServerFrame> {
        self.outboxes.get_mut(&conn)?.pop_front()
    }

    /// All queued frames for `conn`.
    pub fn drain(&mut self, conn: ConnectionId) -> Vec<ServerFrame> {
        self.outboxes
            .get_mut(&conn)
            .map(|q| q.drain(..).collect())
            .unwrap_or_default()
    }

    /// Process one frame: queue its response, then any pushes it caused.
    pub fn handle_frame(&mut self, conn: ConnectionId, frame: ClientFrame) {
        let correlation_id = frame.correlation_id;
        let session_id = frame.session_id.clone();
        let mut pushes = Outgoing::new();

        let result = match self.execute(conn, frame, &mut pushes) {
            Ok(result) => result,
            Err(rejection) => {
                tracing::warn!(
                    session_id = %session_id,
                    correlation_id,
                    %rejection,
                    "command rejected"
                );
                ResponseResult::error(rejection.code(), rejection.to_string())
            }
        };

        self.enqueue(conn, ServerFrame::response(correlation_id, result));
        for (target, push) in pushes {
            self.enqueue(target, push);
        }
    }

    /// Overwrite a session's position. Only available in test mode.
    pub fn stage_position(
        &mut self,
        session_id: &str,
        checkers: CheckerPositions,
        dice: Dice,
        turn: &str,
    ) -> Result<(), Rejection> {
        if !self.config.test_mode {
            return Err(Rejection::TestModeOnly);
        }
        let session = self
            .sessions
            .get_mut(session_id)
            .ok_or_else(|| Rejection::UnknownSession(session_id.to_string()))?;
        session.stage(checkers, dice, turn)?;

        let push = ServerFrame::push(
            session_id,
            PushEvent::StateChanged(StateChanged {
                revision: session.revision(),
            }),
        );
        let targets = session.subscribers().to_vec();
        for target in targets {
            self.enqueue(target, push.clone());
        }
        Ok(())
    }

    fn enqueue(&mut self, conn: ConnectionId, frame: ServerFrame) {
        if let Some(outbox) = self.outboxes.get_mut(&conn) {
            outbox.push_back(frame);
        }
    }

    // ========================================================================
    // Command Execution
    // ========================================================================

    fn execute(
        &mut self,
        conn: ConnectionId,
        frame: ClientFrame,
        pushes: &mut Outgoing,
    ) -> Result<ResponseResult, Rejection> {
        let command = frame.command.ok_or(Rejection::MissingCommand)?;
        let kind = command.kind();
        tracing::debug!(
            session_id = %frame.session_id,
            correlation_id = frame.correlation_id,
            command = %kind,
            "command received"
        );

        if !kind.is_unscoped() && frame.session_id.is_empty() {
            return Err(Rejection::MissingSessionId(kind));
        }

        match command {
            Command::CreateSession(create) => self.create_session(conn, create),
            Command::CreateLobby(lobby) => self.open_lobby(conn, lobby.player_name),
            Command::JoinGame(join) => self.join_game(conn, &frame.session_id, join.player_name, pushes),
            command => self.run_in_session(conn, &frame.session_id, command, pushes),
        }
    }

    fn create_session(
        &mut self,
        conn: ConnectionId,
        create: CreateSession,
    ) -> Result<ResponseResult, Rejection> {
        let mode = GameModeProto::try_from(create.mode)
            .ok()
            .and_then(|m| GameMode::try_from(m).ok())
            .ok_or(Rejection::ModeUnspecified)?;
        validation::check_player_names(&create.player_names, &self.config.ai_identity)?;

        let id = self.fresh_session_id();
        let session = match (mode, create.player_names.as_slice()) {
            (GameMode::Ai, [human]) => {
                Session::against_ai(id.clone(), human.clone(), &self.config.ai_identity, conn)
            }
            (GameMode::Local, [light, dark]) => {
                let opening = self.cup.opening_seat();
                Session::local(id.clone(), [light.clone(), dark.clone()], opening, conn)
            }
            (GameMode::Online, [host]) => Session::lobby(id.clone(), host.clone(), conn),
            (GameMode::Ai | GameMode::Online, _) => {
                return Err(Rejection::BadPlayers("exactly one player name is required"));
            }
            (GameMode::Local, _) => {
                return Err(Rejection::BadPlayers("exactly two player names are required"));
            }
        };

        tracing::info!(
            session_id = %id,
            mode = mode.as_str(),
            first_turn = %session.current_seat().name,
            "session created"
        );
        self.sessions.insert(id.clone(), session);
        Ok(ResponseResult::SessionCreated(SessionCreated { session_id: id }))
    }

    fn open_lobby(&mut self, conn: ConnectionId, host: String) -> Result<ResponseResult, Rejection> {
        self.create_session(
            conn,
            CreateSession {
                mode: GameModeProto::Online as i32,
                player_names: vec![host],
            },
        )
    }

    fn join_game(
        &mut self,
        conn: ConnectionId,
        session_id: &str,
        name: String,
        pushes: &mut Outgoing,
    ) -> Result<ResponseResult, Rejection> {
        let session = self
            .sessions
            .get_mut(session_id)
            .ok_or_else(|| Rejection::UnknownSession(session_id.to_string()))?;
        validation::check_join(session, &name, &self.config.ai_identity)?;

        let opening = self.cup.opening_seat();
        session.join(name, conn, opening);

        let players: Vec<String> = session.seats().iter().map(|s| s.name.clone()).collect();
        tracing::info!(
            session_id = %session_id,
            players = ?players,
            first_turn = %session.current_seat().name,
            "lobby filled"
        );
        let ready = ServerFrame::push(session_id, PushEvent::GameReady(GameReady { players }));
        for &target in session.subscribers() {
            pushes.push((target, ready.clone()));
        }
        Ok(ResponseResult::SessionCreated(SessionCreated {
            session_id: session_id.to_string(),
        }))
    }

    fn run_in_session(
        &mut self,
        conn: ConnectionId,
        session_id: &str,
        command: Command,
        pushes: &mut Outgoing,
    ) -> Result<ResponseResult, Rejection> {
        let kind = command.kind();
        let session = self
            .sessions
            .get_mut(session_id)
            .ok_or_else(|| Rejection::UnknownSession(session_id.to_string()))?;
        validation::check_access(session, conn, kind)?;
        session.subscribe(conn);

        let before = session.revision();
        let turn_before = session.current_seat().name.clone();

        let result = match command {
            Command::FetchState(_) => ResponseResult::State(state_proto(session)),
            Command::RollDice(_) => {
                let (first, second) = self.cup.roll();
                let dice = session.roll(Dice::from_roll(first, second))?;
                let dice = dice.values().iter().map(|&d| u32::from(d)).collect();
                ResponseResult::Dice(DiceRolled {
                    dice,
                    revision: session.revision(),
                })
            }
            Command::PickStart(pick) => {
                let moves = session.pick_start(pick.point)?;
                ResponseResult::ValidMoves(ValidMoves {
                    origin: pick.point,
                    moves: moves.keys().map(|&dest| (u32::from(dest), true)).collect(),
                })
            }
            Command::MakeMove(mv) => {
                session.make_move(mv.previous_position, mv.position)?;
                ResponseResult::State(state_proto(session))
            }
            Command::Undo(_) => {
                session.undo();
                ResponseResult::State(state_proto(session))
            }
            Command::Redo(_) => {
                session.redo();
                ResponseResult::State(state_proto(session))
            }
            Command::ChangeTurn(_) => {
                session.change_turn()?;
                ResponseResult::Turn(TurnChanged {
                    current_turn: session.current_seat().name.clone(),
                    revision: session.revision(),
                })
            }
            Command::HasLegalMove(_) => ResponseResult::LegalMove(LegalMove {
                has_legal_move: session.has_legal_move(),
                state: None,
            }),
            Command::IsPossibleMove(_) => ResponseResult::LegalMove(LegalMove {
                has_legal_move: session.has_legal_move(),
                state: Some(state_proto(session)),
            }),
            Command::CheckWinner(_) => {
                let winner = session.winner().map(|s| s.name.clone());
                ResponseResult::Winner(WinnerChecked {
                    has_winner: winner.is_some(),
                    winner: winner.unwrap_or_default(),
                })
            }
            Command::RestartGame(_) => {
                let opening = match session.mode() {
                    GameMode::Ai => session.human_seat(),
                    GameMode::Local | GameMode::Online => self.cup.opening_seat(),
                };
                session.restart(opening);
                tracing::info!(session_id = %session_id, "game restarted");
                ResponseResult::State(state_proto(session))
            }
            Command::FetchColor(_) => ResponseResult::Colors(ColorAssignment {
                players: session
                    .seats()
                    .iter()
                    .map(|s| PlayerColor {
                        player: s.name.clone(),
                        color: ColorProto::from(s.color) as i32,
                    })
                    .collect(),
            }),
            Command::AiPlay(_) => {
                let played = session.ai_play(self.policy.as_ref())?;
                tracing::debug!(session_id = %session_id, played, "computer turn played");
                ResponseResult::State(state_proto(session))
            }
            Command::CreateSession(_) | Command::CreateLobby(_) | Command::JoinGame(_) => {
                return Err(Rejection::NotSessionScoped(kind));
            }
        };

        let revision = session.revision();
        if revision != before {
            let changed = ServerFrame::push(
                session_id,
                PushEvent::StateChanged(StateChanged { revision }),
            );
            for &target in session.subscribers().iter().filter(|&&c| c != conn) {
                pushes.push((target, changed.clone()));
            }
        }

        let turn_after = &session.current_seat().name;
        if *turn_after != turn_before {
            tracing::info!(
                session_id = %session_id,
                from = %turn_before,
                to = %turn_after,
                "turn changed"
            );
        }

        if let Some(winner) = session.take_game_over() {
            tracing::info!(session_id = %session_id, winner = %winner, "game over");
            let over = ServerFrame::push(session_id, PushEvent::GameOver(GameOver { winner }));
            for &target in session.subscribers() {
                pushes.push((target, over.clone()));
            }
        }

        Ok(result)
    }

    fn fresh_session_id(&mut self) -> SessionId {
        loop {
            let code = self.cup.rng.gen_range(0..SESSION_CODE_SPACE);
            let id = format!("{code:0width$X}", width = SESSION_CODE_DIGITS);
            if !self.sessions.contains_key(&id) {
                return id;
            }
        }
    }
}

fn state_proto(session: &Session) -> StateProto {
    StateProto::from(&session.board_state())
}

// ============================================================================
// Tests
// ============================================================================
