//! Client error taxonomy.

use maxgammon_wire::{CommandKind, ErrorCode, TransportError};

/// Every failure a client operation can surface. None are retried.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// Channel or network failure. The attempted operation had no effect.
    #[error("transport failure: {0}")]
    Transport(#[from] TransportError),

    /// Rejected locally or by the server; client state is unchanged.
    #[error("invalid command: {reason}")]
    InvalidCommand { reason: String },

    /// Fatal for the current session.
    #[error("session {session_id:?} not found")]
    SessionNotFound { session_id: String },

    /// A mutating command was issued while another was unresolved.
    #[error("{in_flight} is still awaiting its response")]
    ConcurrencyConflict { in_flight: CommandKind },
}

pub type Result<T> = std::result::Result<T, ClientError>;

impl ClientError {
    pub fn invalid(reason: impl Into<String>) -> Self {
        Self::InvalidCommand {
            reason: reason.into(),
        }
    }

    /// Map a server `ErrorProto` onto the taxonomy.
    pub fn from_server(code: i32, message: String, session_id: &str, kind: CommandKind) -> Self {
        match ErrorCode::try_from(code) {
            Ok(ErrorCode::SessionNotFound) => Self::SessionNotFound {
                session_id: session_id.to_string(),
            },
            Ok(ErrorCode::ConcurrencyConflict) => Self::ConcurrencyConflict { in_flight: kind },
            _ => Self::InvalidCommand { reason: message },
        }
    }

    /// The session is gone; the caller should leave the game view.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::SessionNotFound { .. })
    }
}
