//! Turn Controller.
//!
//! Owns the session channel and a read-mostly cache of the authoritative
//! state. The phase is never stored; it is derived from the cache, the view
//! selection and the win latch:
//!
//! ```text
//! AwaitingRoll → SelectingOrigin ⇄ SelectingDestination → TurnComplete → AwaitingRoll (next owner)
//!        └──────────────── any ────────────────→ GameOver (until restart)
//! ```
//!
//! After every user action the controller *settles*: it checks for a winner
//! when the dice changed, hands the board to the AI loop when the computer
//! is on turn, and passes the turn when the rolled dice have no legal use.

use std::collections::BTreeSet;

use maxgammon_board::{BoardState, Color, Dice, GameMode, MAX_LOCATION, Point};
use maxgammon_wire::{
    AiPlay, ChangeTurn, CheckWinner, ColorProto, Command, CommandKind, CreateSession, FetchColor,
    FetchState, GameModeProto, HasLegalMove, MakeMove, PickStart, PushEvent, Redo, ResponseResult,
    RestartGame, RollDice, StateProto, Transport, TurnChanged, Undo,
};

use crate::ai_loop;
use crate::channel::SessionChannel;
use crate::config::ClientConfig;
use crate::error::{ClientError, Result};
use crate::view::{Cue, ViewState};
use crate::win_watcher::WinWatcher;

// ============================================================================
// Phase
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    AwaitingRoll,
    SelectingOrigin,
    SelectingDestination,
    TurnComplete,
    GameOver,
}

// ============================================================================
// Controller
// ============================================================================

pub struct TurnController<T: Transport> {
    channel: SessionChannel<T>,
    config: ClientConfig,
    mode: GameMode,
    /// Seat this client plays in online games; the human in AI games.
    local_player: Option<String>,
    players: Vec<(String, Color)>,
    state: BoardState,
    view: ViewState,
    win: WinWatcher,
}

impl<T: Transport> TurnController<T> {
    /// Create a session and attach to it.
    pub fn create(
        mut channel: SessionChannel<T>,
        config: ClientConfig,
        mode: GameMode,
        player_names: &[&str],
    ) -> Result<Self> {
        let result = channel.send(Command::CreateSession(CreateSession {
            mode: GameModeProto::from(mode) as i32,
            player_names: player_names.iter().map(|n| n.to_string()).collect(),
        }))?;
        let ResponseResult::SessionCreated(created) = result else {
            return Err(unexpected(CommandKind::CreateSession));
        };
        let local_player = match mode {
            GameMode::Ai | GameMode::Online => player_names.first().map(|n| n.to_string()),
            GameMode::Local => None,
        };
        Self::attach(channel, config, mode, created.session_id, local_player)
    }

    /// Attach to an existing session. The cache is always refetched.
    pub fn attach(
        mut channel: SessionChannel<T>,
        config: ClientConfig,
        mode: GameMode,
        session_id: impl Into<String>,
        local_player: Option<String>,
    ) -> Result<Self> {
        let session_id = session_id.into();
        if channel.session_id() != Some(session_id.as_str()) {
            channel.open(session_id.as_str());
        }
        let mut controller = Self {
            channel,
            config,
            mode,
            local_player,
            players: Vec::new(),
            state: BoardState::new(String::new()),
            view: ViewState::new(),
            win: WinWatcher::new(),
        };
        controller.fetch_colors()?;
        controller.refresh()?;
        tracing::info!(
            session_id = %session_id,
            mode = mode.as_str(),
            current_turn = %controller.state.current_turn,
            "attached to session"
        );
        controller.settle()?;
        Ok(controller)
    }

    // ------------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------------

    pub fn phase(&self) -> Phase {
        if self.win.is_latched() {
            Phase::GameOver
        } else if self.state.awaiting_turn_change {
            Phase::TurnComplete
        } else if self.state.dice.is_empty() {
            Phase::AwaitingRoll
        } else if self.view.previous_position().is_some() {
            Phase::SelectingDestination
        } else {
            Phase::SelectingOrigin
        }
    }

    pub fn state(&self) -> &BoardState {
        &self.state
    }

    pub fn view(&self) -> &ViewState {
        &self.view
    }

    pub fn mode(&self) -> GameMode {
        self.mode
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn session_id(&self) -> Option<&str> {
        self.channel.session_id()
    }

    pub fn local_player(&self) -> Option<&str> {
        self.local_player.as_deref()
    }

    /// Registered players and their colours.
    pub fn players(&self) -> &[(String, Color)] {
        &self.players
    }

    pub fn winner(&self) -> Option<&str> {
        self.win.winner()
    }

    pub fn is_game_over(&self) -> bool {
        self.win.is_latched()
    }

    pub fn is_ai_turn(&self) -> bool {
        self.mode == GameMode::Ai && self.state.current_turn == self.config.ai_identity
    }

    /// Whether a click from this client may act on the board right now.
    pub fn is_local_turn(&self) -> bool {
        match self.mode {
            GameMode::Ai => !self.is_ai_turn(),
            GameMode::Local => true,
            GameMode::Online => self.local_player.as_deref() == Some(self.state.current_turn.as_str()),
        }
    }

    pub fn take_cues(&mut self) -> Vec<Cue> {
        self.view.take_cues()
    }

    pub fn push_cue(&mut self, cue: Cue) {
        self.view.cue(cue);
    }

    pub fn channel(&self) -> &SessionChannel<T> {
        &self.channel
    }

    pub fn channel_mut(&mut self) -> &mut SessionChannel<T> {
        &mut self.channel
    }

    // ------------------------------------------------------------------------
    // Turn Operations
    // ------------------------------------------------------------------------

    pub fn roll_dice(&mut self) -> Result<&Dice> {
        self.ensure_live()?;
        match self.phase() {
            Phase::AwaitingRoll => {}
            _ => return Err(ClientError::invalid("dice were already rolled this turn")),
        }
        self.roll()?;
        self.settle()?;
        Ok(&self.state.dice)
    }

    /// Ask for the destinations reachable from `point`. An empty set leaves
    /// the controller selecting an origin.
    pub fn pick_start(&mut self, point: Point) -> Result<&BTreeSet<Point>> {
        self.ensure_live()?;
        if point > MAX_LOCATION {
            return Err(ClientError::invalid(format!("point {point} is outside 0..={MAX_LOCATION}")));
        }
        if !matches!(self.phase(), Phase::SelectingOrigin | Phase::SelectingDestination) {
            return Err(ClientError::invalid("no dice to move with"));
        }

        let result = self.channel.send(Command::PickStart(PickStart {
            point: u32::from(point),
        }))?;
        let ResponseResult::ValidMoves(valid) = result else {
            return Err(unexpected(CommandKind::PickStart));
        };
        if valid.origin != u32::from(point) {
            return Err(ClientError::invalid(format!(
                "valid moves returned for {} instead of {point}",
                valid.origin
            )));
        }

        let destinations: BTreeSet<Point> = valid
            .moves
            .into_iter()
            .filter(|&(_, legal)| legal)
            .filter_map(|(dest, _)| Point::try_from(dest).ok())
            .filter(|&dest| dest <= MAX_LOCATION)
            .collect();
        if destinations.is_empty() {
            self.view.clear_selection();
            self.view.cue(Cue::NoDestinations);
        } else {
            self.view.select(point, destinations);
        }
        Ok(self.view.valid_moves())
    }

    /// Move from the selected origin to one of its valid destinations.
    pub fn make_move(&mut self, origin: Point, dest: Point) -> Result<()> {
        self.ensure_live()?;
        if !self.view.allows(origin, dest) {
            self.view.cue(Cue::Rejected);
            return Err(ClientError::invalid(format!(
                "{origin} -> {dest} is not among the last valid moves"
            )));
        }
        let result = self.channel.send(Command::MakeMove(MakeMove {
            previous_position: u32::from(origin),
            position: u32::from(dest),
        }))?;
        self.apply_result(CommandKind::MakeMove, result)?;
        self.settle()
    }

    /// The explicit "done" action. Only once the dice are spent.
    pub fn change_turn(&mut self) -> Result<()> {
        self.ensure_live()?;
        match self.phase() {
            Phase::TurnComplete => {}
            Phase::AwaitingRoll => return Err(ClientError::invalid("roll before finishing the turn")),
            _ => {
                self.view.cue(Cue::Rejected);
                return Err(ClientError::invalid("dice are still outstanding"));
            }
        }
        self.advance_turn()?;
        self.settle()
    }

    /// Step back one move. A no-op when there is nothing to undo.
    pub fn undo(&mut self) -> Result<()> {
        self.ensure_live()?;
        let result = self.channel.send(Command::Undo(Undo {}))?;
        self.apply_result(CommandKind::Undo, result)?;
        self.settle()
    }

    pub fn redo(&mut self) -> Result<()> {
        self.ensure_live()?;
        let result = self.channel.send(Command::Redo(Redo {}))?;
        self.apply_result(CommandKind::Redo, result)?;
        self.settle()
    }

    /// Back to the opening layout. Always allowed, and clears the win latch.
    pub fn restart(&mut self) -> Result<()> {
        // Pushes from the finished game must not latch the new one.
        self.drain_pushes()?;
        let result = self.channel.send(Command::RestartGame(RestartGame {}))?;
        self.win.reset();
        self.apply_result(CommandKind::RestartGame, result)?;
        tracing::info!(session_id = ?self.channel.session_id(), "game restarted");
        self.settle()
    }

    /// Refetch the authoritative state.
    pub fn refresh(&mut self) -> Result<()> {
        let result = self.channel.send(Command::FetchState(FetchState {}))?;
        self.apply_result(CommandKind::FetchState, result)
    }

    /// Handle pushes that arrived since the last call. Returns how many.
    pub fn pump(&mut self) -> Result<usize> {
        self.channel.poll()?;
        let (handled, stale) = self.drain_pushes()?;
        if stale {
            self.refresh()?;
            // Another seat restarted the game.
            if self.win.is_latched() && self.state.winner().is_none() {
                tracing::info!(session_id = ?self.channel.session_id(), "game restarted by another seat");
                self.win.reset();
            }
            self.settle()?;
        }
        Ok(handled)
    }

    /// Leave the session and close the channel.
    pub fn close(&mut self) -> Result<()> {
        self.view.clear_selection();
        self.channel.close()
    }

    // ------------------------------------------------------------------------
    // Raw Commands
    // ------------------------------------------------------------------------

    pub(crate) fn roll(&mut self) -> Result<()> {
        let result = self.channel.send(Command::RollDice(RollDice {}))?;
        let ResponseResult::Dice(rolled) = result else {
            return Err(unexpected(CommandKind::RollDice));
        };
        let dice = Dice::from_values(&rolled.dice)
            .map_err(|e| ClientError::invalid(format!("malformed dice: {e}")))?;
        tracing::debug!(current_turn = %self.state.current_turn, dice = ?dice.values(), "dice rolled");

        let mut next = self.state.clone();
        next.dice = dice;
        next.awaiting_turn_change = false;
        next.revision = rolled.revision;
        self.apply_state(next)
    }

    pub(crate) fn ai_play(&mut self) -> Result<()> {
        let result = self.channel.send(Command::AiPlay(AiPlay {}))?;
        self.apply_result(CommandKind::AiPlay, result)
    }

    /// Pass the turn. Composed by `settle` with the pure legal-move query.
    fn advance_turn(&mut self) -> Result<()> {
        let result = self.channel.send(Command::ChangeTurn(ChangeTurn {}))?;
        let ResponseResult::Turn(turn) = result else {
            return Err(unexpected(CommandKind::ChangeTurn));
        };
        self.apply_turn(turn)
    }

    fn has_legal_move(&mut self) -> Result<bool> {
        let result = self.channel.send(Command::HasLegalMove(HasLegalMove {}))?;
        let ResponseResult::LegalMove(legal) = result else {
            return Err(unexpected(CommandKind::HasLegalMove));
        };
        Ok(legal.has_legal_move)
    }

    fn fetch_colors(&mut self) -> Result<()> {
        let result = self.channel.send(Command::FetchColor(FetchColor {}))?;
        let ResponseResult::Colors(assignment) = result else {
            return Err(unexpected(CommandKind::FetchColor));
        };
        self.players = assignment
            .players
            .into_iter()
            .map(|p| {
                let color = ColorProto::try_from(p.color)
                    .ok()
                    .and_then(|c| Color::try_from(c).ok())
                    .ok_or_else(|| ClientError::invalid(format!("no colour for {}", p.player)))?;
                Ok((p.player, color))
            })
            .collect::<Result<_>>()?;
        Ok(())
    }

    /// Run the owed winner check, if any.
    pub(crate) fn check_winner(&mut self) -> Result<()> {
        if self.win.take_owed().is_none() {
            return Ok(());
        }
        // A win is a pure function of the layout; only ask for the name.
        if self.state.winner().is_none() {
            return Ok(());
        }
        let result = self.channel.send(Command::CheckWinner(CheckWinner {}))?;
        let ResponseResult::Winner(checked) = result else {
            return Err(unexpected(CommandKind::CheckWinner));
        };
        if checked.has_winner {
            self.view.clear_selection();
            self.win.latch(checked.winner);
        }
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Settling
    // ------------------------------------------------------------------------

    /// Chain the automatic transitions until a human has something to do.
    fn settle(&mut self) -> Result<()> {
        for _ in 0..self.config.max_settle_steps {
            self.check_winner()?;
            if self.win.is_latched() {
                return Ok(());
            }
            if self.is_ai_turn() {
                ai_loop::play_out(self)?;
                continue;
            }
            if !self.is_local_turn() {
                return Ok(());
            }
            if self.phase() == Phase::SelectingOrigin && !self.has_legal_move()? {
                tracing::info!(
                    current_turn = %self.state.current_turn,
                    dice = ?self.state.dice.values(),
                    "no legal move, turn forfeited"
                );
                self.advance_turn()?;
                continue;
            }
            match self.phase() {
                Phase::AwaitingRoll => self.view.cue(Cue::RollPrompt),
                Phase::TurnComplete => self.view.cue(Cue::DonePrompt),
                _ => {}
            }
            return Ok(());
        }
        tracing::error!(
            steps = self.config.max_settle_steps,
            current_turn = %self.state.current_turn,
            "automatic transitions did not settle"
        );
        Err(ClientError::invalid("automatic transitions did not settle"))
    }

    // ------------------------------------------------------------------------
    // Cache
    // ------------------------------------------------------------------------

    fn apply_result(&mut self, kind: CommandKind, result: ResponseResult) -> Result<()> {
        match result {
            ResponseResult::State(state) => self.apply_proto(state),
            _ => Err(unexpected(kind)),
        }
    }

    fn apply_proto(&mut self, state: StateProto) -> Result<()> {
        let next = BoardState::try_from(state)
            .map_err(|e| ClientError::invalid(format!("malformed state: {e}")))?;
        self.apply_state(next)
    }

    fn apply_turn(&mut self, turn: TurnChanged) -> Result<()> {
        let mut next = self.state.clone();
        next.current_turn = turn.current_turn;
        next.dice = Dice::empty();
        next.awaiting_turn_change = false;
        next.revision = turn.revision;
        self.apply_state(next)
    }

    /// Replace the cache. Clears the selection; a dice change owes a
    /// winner check.
    fn apply_state(&mut self, next: BoardState) -> Result<()> {
        if !self.players.is_empty() && !self.players.iter().any(|(name, _)| *name == next.current_turn) {
            return Err(ClientError::invalid(format!(
                "turn owner {:?} is not a registered player",
                next.current_turn
            )));
        }
        if next.current_turn != self.state.current_turn && !self.state.current_turn.is_empty() {
            tracing::info!(
                session_id = ?self.channel.session_id(),
                from = %self.state.current_turn,
                to = %next.current_turn,
                "turn changed"
            );
        }
        if next.dice != self.state.dice {
            self.win.observe_dice_change(next.revision);
        }
        self.view.clear_selection();
        self.state = next;
        Ok(())
    }

    /// Apply queued pushes. Returns how many and whether the cache is stale.
    fn drain_pushes(&mut self) -> Result<(usize, bool)> {
        let events = self.channel.take_pushes();
        let mut stale = false;
        for event in &events {
            match event {
                PushEvent::StateChanged(changed) => stale |= changed.revision > self.state.revision,
                PushEvent::GameOver(over) => self.win.latch(over.winner.as_str()),
                PushEvent::GameReady(_) => {
                    self.fetch_colors()?;
                    stale = true;
                }
            }
        }
        Ok((events.len(), stale))
    }

    fn ensure_live(&self) -> Result<()> {
        if self.win.is_latched() {
            return Err(ClientError::invalid("the game is over; only restart is allowed"));
        }
        Ok(())
    }
}

fn unexpected(kind: CommandKind) -> ClientError {
    ClientError::invalid(format!("unexpected response to {kind}"))
}

// ============================================================================
// Tests
// ============================================================================
