//! View-only state.
//!
//! Nothing here is authoritative or sent to the server. It is rebuilt from
//! server responses and cleared on every state-changing command.

use std::collections::BTreeSet;

use maxgammon_board::Point;

/// Transient feedback for the presentation layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cue {
    /// Human on turn with no dice.
    RollPrompt,
    /// Dice spent; only "done" remains.
    DonePrompt,
    /// The picked origin has no legal destination.
    NoDestinations,
    /// A click was refused before reaching the server.
    Rejected,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ViewState {
    previous_position: Option<Point>,
    valid_moves: BTreeSet<Point>,
    cues: Vec<Cue>,
}

impl ViewState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Origin awaiting a destination.
    pub fn previous_position(&self) -> Option<Point> {
        self.previous_position
    }

    /// Destinations valid for `previous_position` only.
    pub fn valid_moves(&self) -> &BTreeSet<Point> {
        &self.valid_moves
    }

    pub fn allows(&self, origin: Point, dest: Point) -> bool {
        self.previous_position == Some(origin) && self.valid_moves.contains(&dest)
    }

    pub fn select(&mut self, origin: Point, destinations: BTreeSet<Point>) {
        self.previous_position = Some(origin);
        self.valid_moves = destinations;
    }

    /// Drop the selection after any state change.
    pub fn clear_selection(&mut self) {
        self.previous_position = None;
        self.valid_moves.clear();
    }

    pub fn cue(&mut self, cue: Cue) {
        if self.cues.last() != Some(&cue) {
            self.cues.push(cue);
        }
    }

    pub fn take_cues(&mut self) -> Vec<Cue> {
        std::mem::take(&mut self.cues)
    }
}
