//! Command validation for the session server.
//!
//! Rejection Rules:
//! - Scoped command without a session id: REJECT (InvalidCommand)
//! - Unknown session id: REJECT (SessionNotFound)
//! - Lobby still waiting: only fetch_state / fetch_color pass
//! - Game already won: only queries and restart pass
//! - Online seat not on turn: turn-scoped commands REJECT
//! - AI on turn: human-only commands REJECT

use maxgammon_board::GameMode;
use maxgammon_wire::{CommandKind, ErrorCode};

use crate::ConnectionId;
use crate::session::{LobbyStatus, SeatKind, Session};

/// Why a command was refused. Every variant maps onto a wire `ErrorCode`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Rejection {
    #[error("frame carries no command")]
    MissingCommand,
    #[error("{0} requires a session id")]
    MissingSessionId(CommandKind),
    #[error("{0} does not run inside a session")]
    NotSessionScoped(CommandKind),
    #[error("unknown session {0}")]
    UnknownSession(String),
    #[error("game mode must be specified")]
    ModeUnspecified,
    #[error("invalid players: {0}")]
    BadPlayers(&'static str),
    #[error("player name {0:?} is already seated")]
    NameTaken(String),
    #[error("session {0} is not an open lobby")]
    LobbyClosed(String),
    #[error("waiting for an opponent to join")]
    WaitingForOpponent,
    #[error("game is over; restart to play again")]
    GameFinished,
    #[error("location {0} is outside 0..=27")]
    LocationOutOfRange(u32),
    #[error("dice already rolled this turn")]
    AlreadyRolled,
    #[error("no dice to play; roll first")]
    NoDice,
    #[error("dice still outstanding and a legal move exists")]
    DiceOutstanding,
    #[error("{origin} -> {position} is not a legal move")]
    IllegalMove { origin: u32, position: u32 },
    #[error("it is {0}'s turn")]
    NotOnTurn(String),
    #[error("it is not the computer's turn")]
    NotAiTurn,
    #[error("positions can only be staged in test mode")]
    TestModeOnly,
    #[error("staged position is invalid: {0}")]
    BadStaging(String),
}

impl Rejection {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::UnknownSession(_) => ErrorCode::SessionNotFound,
            Self::TestModeOnly | Self::BadStaging(_) => ErrorCode::Internal,
            _ => ErrorCode::InvalidCommand,
        }
    }
}

/// Commands that act for the player on turn.
fn is_turn_scoped(kind: CommandKind) -> bool {
    matches!(
        kind,
        CommandKind::RollDice
            | CommandKind::PickStart
            | CommandKind::MakeMove
            | CommandKind::Undo
            | CommandKind::Redo
            | CommandKind::ChangeTurn
    )
}

/// Commands a human issues on their own turn; never on the AI's.
fn is_human_only(kind: CommandKind) -> bool {
    is_turn_scoped(kind) && kind != CommandKind::RollDice
}

/// Check whether `conn` may run `kind` against `session` right now.
pub fn check_access(
    session: &Session,
    conn: ConnectionId,
    kind: CommandKind,
) -> Result<(), Rejection> {
    if session.status() == LobbyStatus::Waiting
        && !matches!(kind, CommandKind::FetchState | CommandKind::FetchColor)
    {
        return Err(Rejection::WaitingForOpponent);
    }

    if kind.is_mutating() && kind != CommandKind::RestartGame && session.winner().is_some() {
        return Err(Rejection::GameFinished);
    }

    let seat = session.current_seat();
    match session.mode() {
        GameMode::Online => {
            if is_turn_scoped(kind) && seat.connection != Some(conn) {
                return Err(Rejection::NotOnTurn(seat.name.clone()));
            }
        }
        GameMode::Ai => {
            if is_human_only(kind) && seat.kind == SeatKind::Ai {
                return Err(Rejection::NotOnTurn(seat.name.clone()));
            }
        }
        GameMode::Local => {}
    }
    Ok(())
}

/// Names must be non-empty, distinct, and never the AI identity.
pub fn check_player_names(names: &[String], ai_identity: &str) -> Result<(), Rejection> {
    if names.is_empty() {
        return Err(Rejection::BadPlayers("at least one player name is required"));
    }
    if names.iter().any(|n| n.trim().is_empty()) {
        return Err(Rejection::BadPlayers("player names must not be empty"));
    }
    if names.iter().any(|n| n == ai_identity) {
        return Err(Rejection::BadPlayers("player name is reserved for the computer"));
    }
    if names.len() == 2 && names[0] == names[1] {
        return Err(Rejection::BadPlayers("player names must be distinct"));
    }
    Ok(())
}

/// A joiner needs an open lobby and a name distinct from the host's.
pub fn check_join(session: &Session, name: &str, ai_identity: &str) -> Result<(), Rejection> {
    if session.mode() != GameMode::Online || session.status() != LobbyStatus::Waiting {
        return Err(Rejection::LobbyClosed(session.id.clone()));
    }
    check_player_names(&[name.to_string()], ai_identity)?;
    if session.seats().iter().any(|s| s.name == name) {
        return Err(Rejection::NameTaken(name.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_player_names_rules() {
        assert!(check_player_names(&names(&["Max"]), "AI").is_ok());
        assert!(check_player_names(&names(&["Max", "Ana"]), "AI").is_ok());
        assert!(check_player_names(&names(&[]), "AI").is_err());
        assert!(check_player_names(&names(&[" "]), "AI").is_err());
        assert!(check_player_names(&names(&["AI"]), "AI").is_err());
        assert!(check_player_names(&names(&["Max", "Max"]), "AI").is_err());
    }

    #[test]
    fn test_rejection_codes() {
        assert_eq!(
            Rejection::UnknownSession("X".into()).code(),
            ErrorCode::SessionNotFound
        );
        assert_eq!(Rejection::DiceOutstanding.code(), ErrorCode::InvalidCommand);
        assert_eq!(
            Rejection::IllegalMove { origin: 5, position: 9 }.code(),
            ErrorCode::InvalidCommand
        );
    }

    #[test]
    fn test_lobby_gates_commands() {
        let lobby = Session::lobby("ABC123".into(), "Max".into(), 1);
        assert!(check_access(&lobby, 1, CommandKind::FetchState).is_ok());
        assert!(check_access(&lobby, 1, CommandKind::FetchColor).is_ok());
        assert_eq!(
            check_access(&lobby, 1, CommandKind::RollDice),
            Err(Rejection::WaitingForOpponent)
        );
    }

    #[test]
    fn test_online_seat_must_hold_turn() {
        let mut session = Session::lobby("ABC123".into(), "Max".into(), 1);
        // dark seat opens
        session.join("Ana".into(), 2, 1);
        assert_eq!(session.current_seat().name, "Ana");
        assert!(check_access(&session, 2, CommandKind::RollDice).is_ok());
        assert_eq!(
            check_access(&session, 1, CommandKind::RollDice),
            Err(Rejection::NotOnTurn("Ana".into()))
        );
        // queries are open to both seats
        assert!(check_access(&session, 1, CommandKind::FetchState).is_ok());
    }

    #[test]
    fn test_human_only_commands_blocked_on_ai_turn() {
        let mut session = Session::against_ai("ABC123".into(), "Max".into(), "AI", 1);
        session.pass_turn();
        assert_eq!(session.current_seat().kind, SeatKind::Ai);
        assert!(check_access(&session, 1, CommandKind::RollDice).is_ok());
        assert!(check_access(&session, 1, CommandKind::AiPlay).is_ok());
        assert!(matches!(
            check_access(&session, 1, CommandKind::MakeMove),
            Err(Rejection::NotOnTurn(_))
        ));
    }

    #[test]
    fn test_join_requires_open_lobby_and_new_name() {
        let lobby = Session::lobby("ABC123".into(), "Max".into(), 1);
        assert_eq!(
            check_join(&lobby, "Max", "AI"),
            Err(Rejection::NameTaken("Max".into()))
        );
        assert!(check_join(&lobby, "Ana", "AI").is_ok());

        let local = Session::local("DEF456".into(), ["Max".into(), "Ana".into()], 0, 1);
        assert!(matches!(
            check_join(&local, "Bo", "AI"),
            Err(Rejection::LobbyClosed(_))
        ));
    }
}
