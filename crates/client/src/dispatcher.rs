//! Command Dispatcher.
//!
//! Maps raw click values onto controller operations. Negative sentinels are
//! non-board actions; `0..=27` are board locations. Clicks are dropped
//! before any round-trip while the computer is on turn, while the game is
//! over (restart and navigation excepted), or while another online seat owns
//! the turn.

use maxgammon_board::{MAX_LOCATION, Point};
use maxgammon_wire::Transport;

use crate::controller::{Phase, TurnController};
use crate::error::{ClientError, Result};
use crate::view::Cue;

// ============================================================================
// Sentinels
// ============================================================================

pub const NAVIGATE_HOME: i32 = -1;
pub const UNDO: i32 = -2;
pub const RESTART: i32 = -3;
pub const REDO: i32 = -4;
pub const DONE: i32 = -5;
pub const ROLL: i32 = -10;

/// Semantic meaning of one click.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    Roll,
    Undo,
    Redo,
    Done,
    Restart,
    NavigateHome,
    Point(Point),
}

impl Intent {
    pub fn from_click(value: i32) -> Result<Self> {
        match value {
            ROLL => Ok(Self::Roll),
            UNDO => Ok(Self::Undo),
            REDO => Ok(Self::Redo),
            DONE => Ok(Self::Done),
            RESTART => Ok(Self::Restart),
            NAVIGATE_HOME => Ok(Self::NavigateHome),
            v => Point::try_from(v)
                .ok()
                .filter(|&p| p <= MAX_LOCATION)
                .map(Self::Point)
                .ok_or_else(|| ClientError::invalid(format!("click value {v} has no meaning"))),
        }
    }

    /// Actions still accepted after the game is over.
    fn survives_game_over(self) -> bool {
        matches!(self, Self::Restart | Self::NavigateHome)
    }
}

impl TryFrom<i32> for Intent {
    type Error = ClientError;

    fn try_from(value: i32) -> Result<Self> {
        Self::from_click(value)
    }
}

// ============================================================================
// Outcome
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    AiTurn,
    GameOver,
    NotYourTurn,
    RollFirst,
    AlreadyRolled,
    TurnFinished,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Sent and confirmed by the server.
    Applied,
    /// Dropped without a round-trip.
    Ignored(IgnoreReason),
    /// The session view was left and the channel closed.
    NavigateHome,
}

// ============================================================================
// Dispatcher
// ============================================================================

pub struct CommandDispatcher<T: Transport> {
    controller: TurnController<T>,
}

impl<T: Transport> CommandDispatcher<T> {
    pub fn new(controller: TurnController<T>) -> Self {
        Self { controller }
    }

    pub fn controller(&self) -> &TurnController<T> {
        &self.controller
    }

    pub fn controller_mut(&mut self) -> &mut TurnController<T> {
        &mut self.controller
    }

    pub fn into_controller(self) -> TurnController<T> {
        self.controller
    }

    /// Dispatch one raw click.
    pub fn click(&mut self, value: i32) -> Result<Outcome> {
        let intent = Intent::from_click(value)?;
        if let Some(reason) = self.blocked(intent) {
            tracing::debug!(?intent, ?reason, "click ignored");
            return Ok(Outcome::Ignored(reason));
        }

        match intent {
            Intent::NavigateHome => {
                self.controller.close()?;
                return Ok(Outcome::NavigateHome);
            }
            Intent::Restart => self.controller.restart()?,
            Intent::Undo => self.controller.undo()?,
            Intent::Redo => self.controller.redo()?,
            Intent::Done => self.controller.change_turn()?,
            Intent::Roll => {
                if self.controller.phase() != Phase::AwaitingRoll {
                    return Ok(Outcome::Ignored(IgnoreReason::AlreadyRolled));
                }
                self.controller.roll_dice()?;
            }
            Intent::Point(point) => return self.point(point),
        }
        Ok(Outcome::Applied)
    }

    fn blocked(&self, intent: Intent) -> Option<IgnoreReason> {
        if intent.survives_game_over() {
            return None;
        }
        if self.controller.is_game_over() {
            Some(IgnoreReason::GameOver)
        } else if self.controller.is_ai_turn() {
            Some(IgnoreReason::AiTurn)
        } else if !self.controller.is_local_turn() {
            Some(IgnoreReason::NotYourTurn)
        } else {
            None
        }
    }

    fn point(&mut self, point: Point) -> Result<Outcome> {
        match self.controller.phase() {
            Phase::AwaitingRoll => {
                self.cue(Cue::RollPrompt);
                Ok(Outcome::Ignored(IgnoreReason::RollFirst))
            }
            Phase::TurnComplete => {
                self.cue(Cue::DonePrompt);
                Ok(Outcome::Ignored(IgnoreReason::TurnFinished))
            }
            Phase::SelectingDestination => {
                let origin = self.controller.view().previous_position();
                match origin {
                    Some(origin) if self.controller.view().allows(origin, point) => {
                        self.controller.make_move(origin, point)?;
                    }
                    _ => {
                        self.controller.pick_start(point)?;
                    }
                }
                Ok(Outcome::Applied)
            }
            Phase::SelectingOrigin => {
                self.controller.pick_start(point)?;
                Ok(Outcome::Applied)
            }
            Phase::GameOver => Ok(Outcome::Ignored(IgnoreReason::GameOver)),
        }
    }

    fn cue(&mut self, cue: Cue) {
        self.controller.push_cue(cue);
    }
}

// ============================================================================
// Tests
// ============================================================================
