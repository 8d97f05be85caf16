//! Game-over latch.
//!
//! A `check_winner` is owed once per revision whose dice differ from the
//! previous observation. A `GameOver` push latches directly. Once latched,
//! only a restart clears it, local or seen through another seat's push.

#[derive(Debug, Clone, Default)]
pub struct WinWatcher {
    last_checked: Option<u64>,
    owed: Option<u64>,
    winner: Option<String>,
}

impl WinWatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a dice change observed at `revision`.
    pub fn observe_dice_change(&mut self, revision: u64) {
        if self.winner.is_none() && self.last_checked != Some(revision) {
            self.owed = Some(revision);
        }
    }

    /// Revision to check now, at most once per revision.
    pub fn take_owed(&mut self) -> Option<u64> {
        let revision = self.owed.take()?;
        self.last_checked = Some(revision);
        Some(revision)
    }

    pub fn latch(&mut self, winner: impl Into<String>) {
        if self.winner.is_none() {
            let winner = winner.into();
            tracing::info!(winner = %winner, "game over");
            self.winner = Some(winner);
            self.owed = None;
        }
    }

    pub fn winner(&self) -> Option<&str> {
        self.winner.as_deref()
    }

    pub fn is_latched(&self) -> bool {
        self.winner.is_some()
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_one_check_per_revision() {
        let mut watcher = WinWatcher::new();
        watcher.observe_dice_change(4);
        assert_eq!(watcher.take_owed(), Some(4));
        assert_eq!(watcher.take_owed(), None);

        // same revision observed again
        watcher.observe_dice_change(4);
        assert_eq!(watcher.take_owed(), None);

        watcher.observe_dice_change(5);
        assert_eq!(watcher.take_owed(), Some(5));
    }

    #[test]
    fn test_latch_is_sticky_until_reset() {
        let mut watcher = WinWatcher::new();
        watcher.latch("Max");
        watcher.latch("AI");
        assert_eq!(watcher.winner(), Some("Max"));

        watcher.observe_dice_change(9);
        assert_eq!(watcher.take_owed(), None);

        watcher.reset();
        assert!(!watcher.is_latched());
    }
}
