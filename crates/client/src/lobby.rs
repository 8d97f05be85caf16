//! Online lobby flow.
//!
//! The host creates a lobby and shares its code; a second player joins with
//! that code. Both sides wait for the `GameReady` push, then hand their
//! channel to a turn controller bound to their own seat.

use maxgammon_board::GameMode;
use maxgammon_wire::{
    Command, CommandKind, CreateLobby, JoinGame, PushEvent, PushKind, ResponseResult, Transport,
};

use crate::channel::SessionChannel;
use crate::config::ClientConfig;
use crate::controller::TurnController;
use crate::error::{ClientError, Result};

pub struct Lobby<T: Transport> {
    channel: SessionChannel<T>,
    config: ClientConfig,
    player: String,
    /// Seated players once the lobby is full
    players: Option<Vec<String>>,
}

impl<T: Transport> Lobby<T> {
    /// Open a new lobby hosted by `player`.
    pub fn create(
        mut channel: SessionChannel<T>,
        config: ClientConfig,
        player: impl Into<String>,
    ) -> Result<Self> {
        let player = player.into();
        let result = channel.send(Command::CreateLobby(CreateLobby {
            player_name: player.clone(),
        }))?;
        let ResponseResult::SessionCreated(created) = result else {
            return Err(ClientError::invalid(format!(
                "unexpected response to {}",
                CommandKind::CreateLobby
            )));
        };
        channel.open(created.session_id);
        Ok(Self::waiting(channel, config, player))
    }

    /// Take the second seat of the lobby `session_id`.
    pub fn join(
        mut channel: SessionChannel<T>,
        config: ClientConfig,
        session_id: impl Into<String>,
        player: impl Into<String>,
    ) -> Result<Self> {
        let player = player.into();
        channel.open(session_id);
        let result = channel.send(Command::JoinGame(JoinGame {
            player_name: player.clone(),
        }))?;
        if !matches!(result, ResponseResult::SessionCreated(_)) {
            return Err(ClientError::invalid(format!(
                "unexpected response to {}",
                CommandKind::JoinGame
            )));
        }
        Ok(Self::waiting(channel, config, player))
    }

    fn waiting(mut channel: SessionChannel<T>, config: ClientConfig, player: String) -> Self {
        let session_id = channel.session_id().unwrap_or_default().to_string();
        channel.on_push(PushKind::GameReady, move |event| {
            if let PushEvent::GameReady(ready) = event {
                tracing::info!(session_id = %session_id, players = ?ready.players, "lobby filled");
            }
        });
        Self {
            channel,
            config,
            player,
            players: None,
        }
    }

    /// Code the opponent joins with.
    pub fn session_id(&self) -> Option<&str> {
        self.channel.session_id()
    }

    pub fn player(&self) -> &str {
        &self.player
    }

    /// Check for the ready push. Returns the seated players once full.
    pub fn poll_ready(&mut self) -> Result<Option<&[String]>> {
        if self.players.is_none() {
            self.channel.poll()?;
            for event in self.channel.take_pushes() {
                if let PushEvent::GameReady(ready) = event {
                    self.players = Some(ready.players);
                }
            }
        }
        Ok(self.players.as_deref())
    }

    pub fn is_ready(&self) -> bool {
        self.players.is_some()
    }

    /// Start playing. Fails while the lobby is still waiting.
    pub fn into_controller(self) -> Result<TurnController<T>> {
        if self.players.is_none() {
            return Err(ClientError::invalid("still waiting for an opponent"));
        }
        let session_id = self.channel.session_id().unwrap_or_default().to_string();
        TurnController::attach(
            self.channel,
            self.config,
            GameMode::Online,
            session_id,
            Some(self.player),
        )
    }

    pub fn close(mut self) -> Result<()> {
        self.channel.close()
    }
}

// ============================================================================
// Tests
// ============================================================================
