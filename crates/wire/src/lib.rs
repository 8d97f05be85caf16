//! Maxgammon Wire Protocol Types
//!
//! This crate defines the shared Protobuf message types exchanged between a
//! Maxgammon client and its session server. Both sides MUST depend on this
//! crate so the schema cannot drift.
//!
//! # Message Categories
//!
//! - **Commands** (`ClientFrame`): one command per frame, scoped by a session
//!   identifier and tagged with a correlation id chosen by the client.
//! - **Responses** (`ServerFrame::Response`): exactly one per command, echoing
//!   its correlation id.
//! - **Pushes** (`ServerFrame::Push`): server-initiated events for a session.
//!
//! # Index Space
//!
//! Point indices are shared with `maxgammon-board`: 0–23 points, 24/25 bar,
//! 26/27 home.

#![deny(unsafe_code)]

pub mod transport;

use std::collections::BTreeMap;

use maxgammon_board::{BoardState, CheckerPositions, Color, Dice, GameMode};
use prost::Message;

pub use transport::{FrameDecoder, TcpTransport, Transport, TransportError, encode_frame};

// ============================================================================
// Type Aliases
// ============================================================================

/// Client-chosen id pairing a command with its single response.
pub type CorrelationId = u64;

// ============================================================================
// Enumerations
// ============================================================================

/// Session mode on the wire.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum GameModeProto {
    Unspecified = 0,
    Ai = 1,
    Local = 2,
    Online = 3,
}

/// Checker colour on the wire.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum ColorProto {
    Unspecified = 0,
    Light = 1,
    Dark = 2,
}

/// Error category reported by the server.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum ErrorCode {
    Unspecified = 0,
    InvalidCommand = 1,
    SessionNotFound = 2,
    ConcurrencyConflict = 3,
    Internal = 4,
}

// ============================================================================
// Client → Server
// ============================================================================

/// One command envelope.
#[derive(Clone, PartialEq, Message)]
pub struct ClientFrame {
    /// Echoed back on the matching `Response`.
    #[prost(uint64, tag = "1")]
    pub correlation_id: CorrelationId,

    /// Session scope. Empty only for `CreateSession` and `CreateLobby`.
    #[prost(string, tag = "2")]
    pub session_id: String,

    #[prost(
        oneof = "Command",
        tags = "3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16, 17, 18"
    )]
    pub command: Option<Command>,
}

/// Command payloads.
#[derive(Clone, PartialEq, prost::Oneof)]
pub enum Command {
    #[prost(message, tag = "3")]
    CreateSession(CreateSession),
    #[prost(message, tag = "4")]
    FetchState(FetchState),
    #[prost(message, tag = "5")]
    RollDice(RollDice),
    #[prost(message, tag = "6")]
    PickStart(PickStart),
    #[prost(message, tag = "7")]
    MakeMove(MakeMove),
    #[prost(message, tag = "8")]
    Undo(Undo),
    #[prost(message, tag = "9")]
    Redo(Redo),
    #[prost(message, tag = "10")]
    ChangeTurn(ChangeTurn),
    #[prost(message, tag = "11")]
    HasLegalMove(HasLegalMove),
    #[prost(message, tag = "12")]
    IsPossibleMove(IsPossibleMove),
    #[prost(message, tag = "13")]
    CheckWinner(CheckWinner),
    #[prost(message, tag = "14")]
    RestartGame(RestartGame),
    #[prost(message, tag = "15")]
    FetchColor(FetchColor),
    #[prost(message, tag = "16")]
    AiPlay(AiPlay),
    #[prost(message, tag = "17")]
    CreateLobby(CreateLobby),
    #[prost(message, tag = "18")]
    JoinGame(JoinGame),
}

#[derive(Clone, PartialEq, Message)]
pub struct CreateSession {
    #[prost(enumeration = "GameModeProto", tag = "1")]
    pub mode: i32,

    /// One name for AI games, two for local games.
    #[prost(string, repeated, tag = "2")]
    pub player_names: Vec<String>,
}

#[derive(Clone, PartialEq, Message)]
pub struct FetchState {}

#[derive(Clone, PartialEq, Message)]
pub struct RollDice {}

#[derive(Clone, PartialEq, Message)]
pub struct PickStart {
    #[prost(uint32, tag = "1")]
    pub point: u32,
}

#[derive(Clone, PartialEq, Message)]
pub struct MakeMove {
    #[prost(uint32, tag = "1")]
    pub previous_position: u32,

    #[prost(uint32, tag = "2")]
    pub position: u32,
}

#[derive(Clone, PartialEq, Message)]
pub struct Undo {}

#[derive(Clone, PartialEq, Message)]
pub struct Redo {}

#[derive(Clone, PartialEq, Message)]
pub struct ChangeTurn {}

/// Pure query: does the player on turn have any legal move for the dice?
#[derive(Clone, PartialEq, Message)]
pub struct HasLegalMove {}

/// Legacy form of `HasLegalMove` that also returns the current state.
/// It never mutates the session.
#[derive(Clone, PartialEq, Message)]
pub struct IsPossibleMove {}

#[derive(Clone, PartialEq, Message)]
pub struct CheckWinner {}

#[derive(Clone, PartialEq, Message)]
pub struct RestartGame {}

#[derive(Clone, PartialEq, Message)]
pub struct FetchColor {}

#[derive(Clone, PartialEq, Message)]
pub struct AiPlay {}

#[derive(Clone, PartialEq, Message)]
pub struct CreateLobby {
    #[prost(string, tag = "1")]
    pub player_name: String,
}

/// Join the lobby named by the frame's `session_id`.
#[derive(Clone, PartialEq, Message)]
pub struct JoinGame {
    #[prost(string, tag = "1")]
    pub player_name: String,
}

// ============================================================================
// Server → Client
// ============================================================================

/// One server frame: either a response or a push.
#[derive(Clone, PartialEq, Message)]
pub struct ServerFrame {
    #[prost(oneof = "ServerFrameKind", tags = "1, 2")]
    pub kind: Option<ServerFrameKind>,
}

#[derive(Clone, PartialEq, prost::Oneof)]
pub enum ServerFrameKind {
    #[prost(message, tag = "1")]
    Response(Response),
    #[prost(message, tag = "2")]
    Push(Push),
}

/// Single-shot response to one command.
#[derive(Clone, PartialEq, Message)]
pub struct Response {
    #[prost(uint64, tag = "1")]
    pub correlation_id: CorrelationId,

    #[prost(oneof = "ResponseResult", tags = "2, 3, 4, 5, 6, 7, 8, 9, 10")]
    pub result: Option<ResponseResult>,
}

#[derive(Clone, PartialEq, prost::Oneof)]
pub enum ResponseResult {
    #[prost(message, tag = "2")]
    SessionCreated(SessionCreated),
    #[prost(message, tag = "3")]
    State(StateProto),
    #[prost(message, tag = "4")]
    Dice(DiceRolled),
    #[prost(message, tag = "5")]
    ValidMoves(ValidMoves),
    #[prost(message, tag = "6")]
    Turn(TurnChanged),
    #[prost(message, tag = "7")]
    LegalMove(LegalMove),
    #[prost(message, tag = "8")]
    Winner(WinnerChecked),
    #[prost(message, tag = "9")]
    Colors(ColorAssignment),
    #[prost(message, tag = "10")]
    Error(ErrorProto),
}

#[derive(Clone, PartialEq, Message)]
pub struct SessionCreated {
    #[prost(string, tag = "1")]
    pub session_id: String,
}

/// Authoritative session state.
#[derive(Clone, PartialEq, Message)]
pub struct StateProto {
    #[prost(string, tag = "1")]
    pub current_turn: String,

    /// Remaining usable pip values.
    #[prost(uint32, repeated, tag = "2")]
    pub dice: Vec<u32>,

    /// `checkers_location[i]` is the 0–27 location of checker `i`.
    #[prost(uint32, repeated, tag = "3")]
    pub checkers_location: Vec<u32>,

    /// Dice were exhausted after a roll; only `ChangeTurn` remains.
    #[prost(bool, tag = "4")]
    pub awaiting_turn_change: bool,

    /// Server-side mutation counter.
    #[prost(uint64, tag = "5")]
    pub revision: u64,
}

#[derive(Clone, PartialEq, Message)]
pub struct DiceRolled {
    #[prost(uint32, repeated, tag = "1")]
    pub dice: Vec<u32>,

    #[prost(uint64, tag = "2")]
    pub revision: u64,
}

/// Destinations reachable from the picked origin. Empty when none.
#[derive(Clone, PartialEq, Message)]
pub struct ValidMoves {
    #[prost(uint32, tag = "1")]
    pub origin: u32,

    #[prost(btree_map = "uint32, bool", tag = "2")]
    pub moves: BTreeMap<u32, bool>,
}

#[derive(Clone, PartialEq, Message)]
pub struct TurnChanged {
    #[prost(string, tag = "1")]
    pub current_turn: String,

    #[prost(uint64, tag = "2")]
    pub revision: u64,
}

#[derive(Clone, PartialEq, Message)]
pub struct LegalMove {
    #[prost(bool, tag = "1")]
    pub has_legal_move: bool,

    /// Present only for `IsPossibleMove`.
    #[prost(message, optional, tag = "2")]
    pub state: Option<StateProto>,
}

#[derive(Clone, PartialEq, Message)]
pub struct WinnerChecked {
    #[prost(bool, tag = "1")]
    pub has_winner: bool,

    /// Winning player's name; empty when `has_winner` is false.
    #[prost(string, tag = "2")]
    pub winner: String,
}

#[derive(Clone, PartialEq, Message)]
pub struct PlayerColor {
    #[prost(string, tag = "1")]
    pub player: String,

    #[prost(enumeration = "ColorProto", tag = "2")]
    pub color: i32,
}

#[derive(Clone, PartialEq, Message)]
pub struct ColorAssignment {
    #[prost(message, repeated, tag = "1")]
    pub players: Vec<PlayerColor>,
}

#[derive(Clone, PartialEq, Message)]
pub struct ErrorProto {
    #[prost(enumeration = "ErrorCode", tag = "1")]
    pub code: i32,

    #[prost(string, tag = "2")]
    pub message: String,
}

// ============================================================================
// Pushes
// ============================================================================

/// Server-initiated event for one session.
#[derive(Clone, PartialEq, Message)]
pub struct Push {
    #[prost(string, tag = "1")]
    pub session_id: String,

    #[prost(oneof = "PushEvent", tags = "2, 3, 4")]
    pub event: Option<PushEvent>,
}

#[derive(Clone, PartialEq, prost::Oneof)]
pub enum PushEvent {
    #[prost(message, tag = "2")]
    GameReady(GameReady),
    #[prost(message, tag = "3")]
    StateChanged(StateChanged),
    #[prost(message, tag = "4")]
    GameOver(GameOver),
}

/// Both seats of an online lobby are filled.
#[derive(Clone, PartialEq, Message)]
pub struct GameReady {
    #[prost(string, repeated, tag = "1")]
    pub players: Vec<String>,
}

/// Another participant mutated the session.
#[derive(Clone, PartialEq, Message)]
pub struct StateChanged {
    #[prost(uint64, tag = "1")]
    pub revision: u64,
}

/// Sent once per game when a colour bears off its last checker.
#[derive(Clone, PartialEq, Message)]
pub struct GameOver {
    #[prost(string, tag = "1")]
    pub winner: String,
}

// ============================================================================
// Command / Push Kinds
// ============================================================================

/// Discriminant of a `Command`, used for logging and in-flight tracking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    CreateSession,
    FetchState,
    RollDice,
    PickStart,
    MakeMove,
    Undo,
    Redo,
    ChangeTurn,
    HasLegalMove,
    IsPossibleMove,
    CheckWinner,
    RestartGame,
    FetchColor,
    AiPlay,
    CreateLobby,
    JoinGame,
}

impl CommandKind {
    /// Whether the command can change authoritative state.
    pub fn is_mutating(self) -> bool {
        !matches!(
            self,
            Self::FetchState
                | Self::PickStart
                | Self::HasLegalMove
                | Self::IsPossibleMove
                | Self::CheckWinner
                | Self::FetchColor
        )
    }

    /// Whether the command is valid without a session id.
    pub fn is_unscoped(self) -> bool {
        matches!(self, Self::CreateSession | Self::CreateLobby)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::CreateSession => "create_session",
            Self::FetchState => "fetch_state",
            Self::RollDice => "roll_dice",
            Self::PickStart => "pick_start",
            Self::MakeMove => "make_move",
            Self::Undo => "undo",
            Self::Redo => "redo",
            Self::ChangeTurn => "change_turn",
            Self::HasLegalMove => "has_legal_move",
            Self::IsPossibleMove => "is_possible_move",
            Self::CheckWinner => "check_winner",
            Self::RestartGame => "restart_game",
            Self::FetchColor => "fetch_color",
            Self::AiPlay => "ai_play",
            Self::CreateLobby => "create_lobby",
            Self::JoinGame => "join_game",
        }
    }
}

impl std::fmt::Display for CommandKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Command {
    pub fn kind(&self) -> CommandKind {
        match self {
            Self::CreateSession(_) => CommandKind::CreateSession,
            Self::FetchState(_) => CommandKind::FetchState,
            Self::RollDice(_) => CommandKind::RollDice,
            Self::PickStart(_) => CommandKind::PickStart,
            Self::MakeMove(_) => CommandKind::MakeMove,
            Self::Undo(_) => CommandKind::Undo,
            Self::Redo(_) => CommandKind::Redo,
            Self::ChangeTurn(_) => CommandKind::ChangeTurn,
            Self::HasLegalMove(_) => CommandKind::HasLegalMove,
            Self::IsPossibleMove(_) => CommandKind::IsPossibleMove,
            Self::CheckWinner(_) => CommandKind::CheckWinner,
            Self::RestartGame(_) => CommandKind::RestartGame,
            Self::FetchColor(_) => CommandKind::FetchColor,
            Self::AiPlay(_) => CommandKind::AiPlay,
            Self::CreateLobby(_) => CommandKind::CreateLobby,
            Self::JoinGame(_) => CommandKind::JoinGame,
        }
    }
}

/// Discriminant of a `PushEvent`. One subscription per kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PushKind {
    GameReady,
    StateChanged,
    GameOver,
}

impl PushEvent {
    pub fn kind(&self) -> PushKind {
        match self {
            Self::GameReady(_) => PushKind::GameReady,
            Self::StateChanged(_) => PushKind::StateChanged,
            Self::GameOver(_) => PushKind::GameOver,
        }
    }
}

impl ServerFrame {
    pub fn response(correlation_id: CorrelationId, result: ResponseResult) -> Self {
        Self {
            kind: Some(ServerFrameKind::Response(Response {
                correlation_id,
                result: Some(result),
            })),
        }
    }

    pub fn push(session_id: &str, event: PushEvent) -> Self {
        Self {
            kind: Some(ServerFrameKind::Push(Push {
                session_id: session_id.to_string(),
                event: Some(event),
            })),
        }
    }
}

impl ResponseResult {
    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::Error(ErrorProto {
            code: code as i32,
            message: message.into(),
        })
    }
}

// ============================================================================
// Conversion Traits
// ============================================================================

impl From<GameMode> for GameModeProto {
    fn from(mode: GameMode) -> Self {
        match mode {
            GameMode::Ai => Self::Ai,
            GameMode::Local => Self::Local,
            GameMode::Online => Self::Online,
        }
    }
}

impl TryFrom<GameModeProto> for GameMode {
    type Error = &'static str;

    fn try_from(mode: GameModeProto) -> Result<Self, Self::Error> {
        match mode {
            GameModeProto::Ai => Ok(Self::Ai),
            GameModeProto::Local => Ok(Self::Local),
            GameModeProto::Online => Ok(Self::Online),
            GameModeProto::Unspecified => Err("game mode must be specified"),
        }
    }
}

impl From<Color> for ColorProto {
    fn from(color: Color) -> Self {
        match color {
            Color::Light => Self::Light,
            Color::Dark => Self::Dark,
        }
    }
}

impl TryFrom<ColorProto> for Color {
    type Error = &'static str;

    fn try_from(color: ColorProto) -> Result<Self, Self::Error> {
        match color {
            ColorProto::Light => Ok(Self::Light),
            ColorProto::Dark => Ok(Self::Dark),
            ColorProto::Unspecified => Err("colour must be specified"),
        }
    }
}

impl From<&BoardState> for StateProto {
    fn from(state: &BoardState) -> Self {
        Self {
            current_turn: state.current_turn.clone(),
            dice: state.dice.values().iter().map(|&d| u32::from(d)).collect(),
            checkers_location: state
                .checkers
                .as_indices()
                .iter()
                .map(|&p| u32::from(p))
                .collect(),
            awaiting_turn_change: state.awaiting_turn_change,
            revision: state.revision,
        }
    }
}

impl TryFrom<StateProto> for BoardState {
    type Error = &'static str;

    fn try_from(s: StateProto) -> Result<Self, Self::Error> {
        if s.current_turn.is_empty() {
            return Err("current_turn must not be empty");
        }
        let dice = Dice::from_values(&s.dice).map_err(|_| "dice must be 0-4 pips in 1..=6")?;
        let checkers = CheckerPositions::from_indices(&s.checkers_location)
            .map_err(|_| "checkers_location must place 30 checkers legally in 0..=27")?;
        Ok(Self {
            current_turn: s.current_turn,
            dice,
            checkers,
            awaiting_turn_change: s.awaiting_turn_change,
            revision: s.revision,
        })
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_frame_roundtrip() {
        let msg = ClientFrame {
            correlation_id: 7,
            session_id: "A1B2C3".to_string(),
            command: Some(Command::MakeMove(MakeMove {
                previous_position: 5,
                position: 9,
            })),
        };
        let encoded = msg.encode_to_vec();
        let decoded = ClientFrame::decode(encoded.as_slice()).unwrap();
        assert_eq!(msg, decoded);
        assert_eq!(decoded.command.unwrap().kind(), CommandKind::MakeMove);
    }

    #[test]
    fn test_empty_command_keeps_its_variant() {
        let msg = ClientFrame {
            correlation_id: 1,
            session_id: "S".to_string(),
            command: Some(Command::Undo(Undo {})),
        };
        let decoded = ClientFrame::decode(msg.encode_to_vec().as_slice()).unwrap();
        assert_eq!(decoded.command, Some(Command::Undo(Undo {})));
    }

    #[test]
    fn test_valid_moves_map_roundtrip() {
        let mut moves = BTreeMap::new();
        moves.insert(9, true);
        moves.insert(11, true);
        let frame = ServerFrame::response(3, ResponseResult::ValidMoves(ValidMoves { origin: 5, moves }));
        let decoded = ServerFrame::decode(frame.encode_to_vec().as_slice()).unwrap();
        assert_eq!(frame, decoded);
    }

    #[test]
    fn test_game_mode_enumeration() {
        let msg = CreateSession {
            mode: GameModeProto::Ai as i32,
            player_names: vec!["Max".to_string()],
        };
        assert_eq!(msg.mode(), GameModeProto::Ai);
        assert_eq!(GameMode::try_from(msg.mode()), Ok(GameMode::Ai));
        assert!(GameMode::try_from(GameModeProto::Unspecified).is_err());
    }

    #[test]
    fn test_state_conversion_roundtrip() {
        let mut state = BoardState::new("Max");
        state.dice = Dice::from_roll(6, 6);
        state.revision = 12;

        let proto = StateProto::from(&state);
        assert_eq!(proto.dice, vec![6, 6, 6, 6]);
        assert_eq!(proto.checkers_location.len(), 30);

        let back = BoardState::try_from(proto).unwrap();
        assert_eq!(back, state);
    }

    #[test]
    fn test_state_conversion_rejects_short_checker_list() {
        let mut proto = StateProto::from(&BoardState::new("Max"));
        proto.checkers_location.pop();
        assert!(BoardState::try_from(proto).is_err());
    }

    #[test]
    fn test_state_conversion_rejects_bad_dice() {
        let mut proto = StateProto::from(&BoardState::new("Max"));
        proto.dice = vec![1, 2, 3];
        assert!(BoardState::try_from(proto).is_err());
    }

    #[test]
    fn test_command_kind_mutation_classes() {
        assert!(CommandKind::RollDice.is_mutating());
        assert!(CommandKind::MakeMove.is_mutating());
        assert!(CommandKind::AiPlay.is_mutating());
        assert!(!CommandKind::PickStart.is_mutating());
        assert!(!CommandKind::CheckWinner.is_mutating());
        assert!(!CommandKind::HasLegalMove.is_mutating());
        assert!(CommandKind::CreateLobby.is_unscoped());
        assert!(!CommandKind::JoinGame.is_unscoped());
    }

    #[test]
    fn test_push_kind() {
        let frame = ServerFrame::push("S", PushEvent::StateChanged(StateChanged { revision: 4 }));
        let Some(ServerFrameKind::Push(push)) = frame.kind else {
            panic!("expected push");
        };
        assert_eq!(push.event.unwrap().kind(), PushKind::StateChanged);
    }
}
