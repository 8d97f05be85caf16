//! Computer opponent seam.
//!
//! The server invokes a policy one move at a time until the dice are spent
//! or the policy has nothing legal to offer.

use maxgammon_board::{CheckerPositions, Color, Dice, POINT_COUNT, Point};

use crate::rules;

pub trait AiPolicy {
    fn name(&self) -> &'static str;

    /// Next `(origin, destination)` for `color`, or `None` to stop.
    fn choose(&self, positions: &CheckerPositions, dice: &Dice, color: Color) -> Option<(Point, Point)>;
}

/// Deterministic stand-in: bear off whenever possible, otherwise advance the
/// rearmost checker with the largest usable die.
#[derive(Debug, Clone, Copy, Default)]
pub struct RunnerPolicy;

impl AiPolicy for RunnerPolicy {
    fn name(&self) -> &'static str {
        "runner"
    }

    fn choose(&self, positions: &CheckerPositions, dice: &Dice, color: Color) -> Option<(Point, Point)> {
        let mut fallback = None;
        for origin in rearmost_first(color) {
            let moves = rules::possible_moves(positions, dice, color, origin);
            if moves.contains_key(&color.home()) {
                return Some((origin, color.home()));
            }
            if fallback.is_none() {
                fallback = moves
                    .iter()
                    .max_by_key(|&(_, &pip)| pip)
                    .map(|(&dest, _)| (origin, dest));
            }
        }
        fallback
    }
}

/// Bar first, then points from the far end of `color`'s track.
fn rearmost_first(color: Color) -> impl Iterator<Item = Point> {
    let points: Box<dyn Iterator<Item = Point>> = match color {
        Color::Light => Box::new((0..POINT_COUNT).rev()),
        Color::Dark => Box::new(0..POINT_COUNT),
    };
    std::iter::once(color.bar()).chain(points)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::tests::position_with;
    use maxgammon_board::{BAR_LIGHT, HOME_DARK};

    #[test]
    fn test_runner_moves_rearmost_checker() {
        let positions = CheckerPositions::starting();
        let dice = Dice::from_roll(2, 6);
        // light's rearmost checkers sit on 23; 23-6 = 17 is open
        assert_eq!(
            RunnerPolicy.choose(&positions, &dice, Color::Light),
            Some((23, 17))
        );
    }

    #[test]
    fn test_runner_enters_from_bar_first() {
        let positions = position_with(&[(15, BAR_LIGHT), (0, 3)]);
        let dice = Dice::from_roll(4, 1);
        let (origin, _) = RunnerPolicy.choose(&positions, &dice, Color::Light).unwrap();
        assert_eq!(origin, BAR_LIGHT);
    }

    #[test]
    fn test_runner_prefers_bear_off() {
        let positions = position_with(&[(0, 20), (1, 22), (15, 12)]);
        let dice = Dice::from_roll(4, 2);
        assert_eq!(
            RunnerPolicy.choose(&positions, &dice, Color::Dark),
            Some((20, HOME_DARK))
        );
    }

    #[test]
    fn test_runner_gives_up_when_blocked() {
        // light checker on 6, dark primes 0..=5 and the bar is empty
        let mut placements = vec![(15, 6)];
        for (i, point) in (0..6).enumerate() {
            let id = 2 * i as u8;
            placements.push((id, point));
            placements.push((id + 1, point));
        }
        let positions = position_with(&placements);
        let dice = Dice::from_roll(3, 3);
        assert_eq!(RunnerPolicy.choose(&positions, &dice, Color::Light), None);
    }
}
