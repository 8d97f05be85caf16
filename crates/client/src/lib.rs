//! Maxgammon Client
//!
//! Keeps a client's view of one backgammon session in step with the
//! authoritative session server.
//!
//! # Components
//!
//! - [`SessionChannel`]: owned connection with a correlation-id dispatch
//!   table, one handler per push kind, and at most one mutating command in
//!   flight.
//! - [`TurnController`]: derives the turn phase from cached state and
//!   composes the automatic transitions (forfeit, computer turns, win check).
//! - [`CommandDispatcher`]: turns raw clicks and sentinels into commands,
//!   dropping clicks that cannot apply.
//! - [`WinWatcher`]: game-over latch, fed by dice changes and pushes.
//! - [`Lobby`]: create/join flow for online games.
//!
//! The client never mutates the board locally. Selection and cues live in
//! [`ViewState`] and are rebuilt from server responses.

#![deny(unsafe_code)]

mod ai_loop;
pub mod channel;
pub mod config;
pub mod controller;
pub mod dispatcher;
pub mod error;
pub mod lobby;
pub mod view;
pub mod win_watcher;

pub use channel::SessionChannel;
pub use config::{ClientConfig, ConfigError};
pub use controller::{Phase, TurnController};
pub use dispatcher::{CommandDispatcher, IgnoreReason, Intent, Outcome};
pub use error::{ClientError, Result};
pub use lobby::Lobby;
pub use view::{Cue, ViewState};
pub use win_watcher::WinWatcher;
