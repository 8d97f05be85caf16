//! Per-turn undo/redo history.
//!
//! A roll starts a fresh history whose base entry is the post-roll position.
//! Each move records a new entry and discards anything ahead of the cursor.
//! Turn changes clear it entirely.

use maxgammon_board::{CheckerPositions, Dice};

/// Everything undo restores.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub dice: Dice,
    pub checkers: CheckerPositions,
    pub awaiting_turn_change: bool,
}

#[derive(Debug, Clone, Default)]
pub struct History {
    entries: Vec<Snapshot>,
    cursor: usize,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start over with `base` as the only entry.
    pub fn reset(&mut self, base: Snapshot) {
        self.entries.clear();
        self.entries.push(base);
        self.cursor = 0;
    }

    /// Append after the cursor, truncating any redo tail.
    pub fn record(&mut self, snapshot: Snapshot) {
        if self.entries.is_empty() {
            self.reset(snapshot);
            return;
        }
        self.entries.truncate(self.cursor + 1);
        self.entries.push(snapshot);
        self.cursor = self.entries.len() - 1;
    }

    /// Step back one entry. `None` at the base or when empty.
    pub fn undo(&mut self) -> Option<&Snapshot> {
        if self.cursor == 0 {
            return None;
        }
        self.cursor -= 1;
        self.entries.get(self.cursor)
    }

    /// Step forward one entry. `None` when nothing was undone.
    pub fn redo(&mut self) -> Option<&Snapshot> {
        if self.cursor + 1 >= self.entries.len() {
            return None;
        }
        self.cursor += 1;
        self.entries.get(self.cursor)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.cursor = 0;
    }

    pub fn can_undo(&self) -> bool {
        self.cursor > 0
    }

    pub fn can_redo(&self) -> bool {
        self.cursor + 1 < self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snap(dice: &[u32]) -> Snapshot {
        Snapshot {
            dice: Dice::from_values(dice).unwrap(),
            checkers: CheckerPositions::starting(),
            awaiting_turn_change: dice.is_empty(),
        }
    }

    #[test]
    fn test_empty_history_is_noop() {
        let mut history = History::new();
        assert!(history.undo().is_none());
        assert!(history.redo().is_none());
    }

    #[test]
    fn test_base_cannot_be_undone() {
        let mut history = History::new();
        history.reset(snap(&[3, 5]));
        assert!(!history.can_undo());
        assert!(history.undo().is_none());
    }

    #[test]
    fn test_undo_then_redo() {
        let mut history = History::new();
        history.reset(snap(&[3, 5]));
        history.record(snap(&[5]));
        history.record(snap(&[]));

        assert_eq!(history.undo(), Some(&snap(&[5])));
        assert_eq!(history.undo(), Some(&snap(&[3, 5])));
        assert!(history.undo().is_none());

        assert_eq!(history.redo(), Some(&snap(&[5])));
        assert_eq!(history.redo(), Some(&snap(&[])));
        assert!(history.redo().is_none());
    }

    #[test]
    fn test_record_truncates_redo_tail() {
        let mut history = History::new();
        history.reset(snap(&[2, 4]));
        history.record(snap(&[4]));
        history.undo();
        assert!(history.can_redo());

        history.record(snap(&[2]));
        assert!(!history.can_redo());
        assert_eq!(history.undo(), Some(&snap(&[2, 4])));
    }

    #[test]
    fn test_clear_drops_everything() {
        let mut history = History::new();
        history.reset(snap(&[1, 1, 1, 1]));
        history.record(snap(&[1, 1, 1]));
        history.clear();
        assert!(!history.can_undo());
        assert!(history.undo().is_none());
    }
}
