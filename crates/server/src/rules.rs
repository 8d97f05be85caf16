//! Move legality for the reference session server.
//!
//! Single-die moves only:
//! - a point holding two or more opposing checkers is blocked
//! - a lone opposing checker is hit and sent to its bar
//! - while a colour has checkers on its bar, only the bar is a valid origin
//! - bearing off requires every checker in the home quadrant; an oversized
//!   die may only bear off the farthest checker

use std::collections::BTreeMap;

use maxgammon_board::{CheckerId, CheckerPositions, Color, Dice, POINT_COUNT, Point};

/// Destinations reachable from `origin`, mapped to the pip value spent.
///
/// Empty when `origin` holds none of `color`'s checkers, when the dice are
/// empty, or when every destination is blocked.
pub fn possible_moves(
    positions: &CheckerPositions,
    dice: &Dice,
    color: Color,
    origin: Point,
) -> BTreeMap<Point, u8> {
    let mut moves = BTreeMap::new();
    if dice.is_empty() {
        return moves;
    }

    if positions.bar_count(color) > 0 {
        if origin != color.bar() {
            return moves;
        }
        for pip in dice.distinct() {
            let entry = entry_point(color, pip);
            if is_open(positions, color, entry) {
                moves.entry(entry).or_insert(pip);
            }
        }
        return moves;
    }

    if origin >= POINT_COUNT || positions.count_at(origin, color) == 0 {
        return moves;
    }

    let bearing_off = can_bear_off(positions, color);
    // Ascending so the smallest sufficient die is recorded for bear-off.
    for pip in dice.distinct() {
        match advance(color, origin, pip) {
            Some(target) => {
                if is_open(positions, color, target) {
                    moves.entry(target).or_insert(pip);
                }
            }
            None if bearing_off => {
                let distance = distance_off(color, origin);
                if pip == distance || (pip > distance && is_farthest(positions, color, origin)) {
                    moves.entry(color.home()).or_insert(pip);
                }
            }
            None => {}
        }
    }
    moves
}

/// Whether `color` can use at least one of `dice`.
pub fn has_legal_move(positions: &CheckerPositions, dice: &Dice, color: Color) -> bool {
    origins(color).any(|origin| !possible_moves(positions, dice, color, origin).is_empty())
}

/// Candidate origins for `color`: its bar, then every track point.
pub fn origins(color: Color) -> impl Iterator<Item = Point> {
    std::iter::once(color.bar()).chain(0..POINT_COUNT)
}

/// Move one `color` checker from `origin` to `dest`, hitting a lone opposing
/// checker. Returns the hit checker, if any.
///
/// Caller MUST have checked `dest` against `possible_moves`.
pub fn apply_move(
    positions: &mut CheckerPositions,
    color: Color,
    origin: Point,
    dest: Point,
) -> Option<CheckerId> {
    let mover = positions.checkers_at(origin).filter(|&id| Color::of_checker(id) == color).last()?;

    let mut hit = None;
    if dest < POINT_COUNT {
        let opponent = color.opponent();
        if positions.count_at(dest, opponent) == 1 {
            hit = positions.checkers_at(dest).next();
            if let Some(id) = hit {
                positions.relocate(id, opponent.bar());
            }
        }
    }

    positions.relocate(mover, dest);
    hit
}

// ============================================================================
// Geometry
// ============================================================================

/// Light runs 23 → 0, dark runs 0 → 23.
fn advance(color: Color, origin: Point, pip: u8) -> Option<Point> {
    match color {
        Color::Light => origin.checked_sub(pip),
        Color::Dark => Some(origin + pip).filter(|&p| p < POINT_COUNT),
    }
}

/// Point a checker enters on from the bar.
fn entry_point(color: Color, pip: u8) -> Point {
    match color {
        Color::Light => POINT_COUNT - pip,
        Color::Dark => pip - 1,
    }
}

/// Pips needed to bear off from `origin`.
fn distance_off(color: Color, origin: Point) -> u8 {
    match color {
        Color::Light => origin + 1,
        Color::Dark => POINT_COUNT - origin,
    }
}

fn in_home_quadrant(color: Color, point: Point) -> bool {
    match color {
        Color::Light => point <= 5,
        Color::Dark => (18..POINT_COUNT).contains(&point),
    }
}

fn is_open(positions: &CheckerPositions, color: Color, point: Point) -> bool {
    positions.count_at(point, color.opponent()) <= 1
}

fn can_bear_off(positions: &CheckerPositions, color: Color) -> bool {
    if positions.bar_count(color) > 0 {
        return false;
    }
    color.checkers().all(|id| {
        let loc = positions.location(id);
        loc == color.home() || (loc < POINT_COUNT && in_home_quadrant(color, loc))
    })
}

/// No `color` checker sits farther from home than `origin`.
fn is_farthest(positions: &CheckerPositions, color: Color, origin: Point) -> bool {
    color.checkers().all(|id| {
        let loc = positions.location(id);
        if loc >= POINT_COUNT {
            return true;
        }
        match color {
            Color::Light => loc <= origin,
            Color::Dark => loc >= origin,
        }
    })
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use maxgammon_board::{BAR_DARK, BAR_LIGHT, HOME_DARK, HOME_LIGHT};

    /// Positions with every checker home except the listed placements.
    pub(crate) fn position_with(placements: &[(CheckerId, Point)]) -> CheckerPositions {
        let mut positions = CheckerPositions::starting();
        for color in Color::ALL {
            for id in color.checkers() {
                positions.relocate(id, color.home());
            }
        }
        for &(id, point) in placements {
            positions.relocate(id, point);
        }
        positions
    }

    #[test]
    fn test_opening_moves_for_dark() {
        let positions = CheckerPositions::starting();
        let dice = Dice::from_roll(3, 5);
        let moves = possible_moves(&positions, &dice, Color::Dark, 0);
        // 0+3 = 3 open, 0+5 = 5 blocked by five light checkers
        assert_eq!(moves.into_iter().collect::<Vec<_>>(), vec![(3, 3)]);
    }

    #[test]
    fn test_opening_moves_for_light() {
        let positions = CheckerPositions::starting();
        let dice = Dice::from_roll(1, 2);
        let moves = possible_moves(&positions, &dice, Color::Light, 23);
        assert_eq!(moves.get(&22), Some(&1));
        assert_eq!(moves.get(&21), Some(&2));
    }

    #[test]
    fn test_empty_origin_yields_nothing() {
        let positions = CheckerPositions::starting();
        let dice = Dice::from_roll(3, 4);
        assert!(possible_moves(&positions, &dice, Color::Dark, 1).is_empty());
        // opponent's stack
        assert!(possible_moves(&positions, &dice, Color::Dark, 5).is_empty());
    }

    #[test]
    fn test_no_dice_yields_nothing() {
        let positions = CheckerPositions::starting();
        assert!(possible_moves(&positions, &Dice::empty(), Color::Dark, 0).is_empty());
        assert!(!has_legal_move(&positions, &Dice::empty(), Color::Dark));
    }

    #[test]
    fn test_bar_must_enter_first() {
        // dark checker 0 on its bar, 1 on point 3
        let positions = position_with(&[(0, BAR_DARK), (1, 3)]);
        let dice = Dice::from_roll(2, 4);

        assert!(possible_moves(&positions, &dice, Color::Dark, 3).is_empty());
        let moves = possible_moves(&positions, &dice, Color::Dark, BAR_DARK);
        assert_eq!(moves.get(&1), Some(&2));
        assert_eq!(moves.get(&3), Some(&4));
    }

    #[test]
    fn test_light_enters_from_top() {
        let positions = position_with(&[(15, BAR_LIGHT)]);
        let dice = Dice::from_roll(1, 6);
        let moves = possible_moves(&positions, &dice, Color::Light, BAR_LIGHT);
        assert_eq!(moves.get(&23), Some(&1));
        assert_eq!(moves.get(&18), Some(&6));
    }

    #[test]
    fn test_blocked_point_rejected_and_blot_hit() {
        // dark on 2; light pair on 5, light blot on 6
        let mut positions = position_with(&[(0, 2), (15, 5), (16, 5), (17, 6)]);
        let dice = Dice::from_roll(3, 4);
        let moves = possible_moves(&positions, &dice, Color::Dark, 2);
        assert!(!moves.contains_key(&5));
        assert_eq!(moves.get(&6), Some(&4));

        let hit = apply_move(&mut positions, Color::Dark, 2, 6);
        assert_eq!(hit, Some(17));
        assert_eq!(positions.location(17), BAR_LIGHT);
        assert_eq!(positions.location(0), 6);
        positions.validate().unwrap();
    }

    #[test]
    fn test_bear_off_exact_and_oversized() {
        // light checkers on 2 and 4, the rest home
        let positions = position_with(&[(15, 2), (16, 4)]);
        let dice = Dice::from_roll(3, 6);

        // from 2, a 3 is exact
        let from_two = possible_moves(&positions, &dice, Color::Light, 2);
        assert_eq!(from_two.get(&HOME_LIGHT), Some(&3));

        // from 4, the 6 is oversized but 4 is the farthest checker
        let from_four = possible_moves(&positions, &dice, Color::Light, 4);
        assert_eq!(from_four.get(&HOME_LIGHT), Some(&6));
        assert_eq!(from_four.get(&1), Some(&3));
    }

    #[test]
    fn test_oversized_bear_off_needs_farthest_checker() {
        let positions = position_with(&[(15, 1), (16, 4)]);
        let dice = Dice::from_roll(6, 6);
        let from_one = possible_moves(&positions, &dice, Color::Light, 1);
        assert!(!from_one.contains_key(&HOME_LIGHT));
    }

    #[test]
    fn test_no_bear_off_outside_home_quadrant() {
        let positions = position_with(&[(0, 20), (1, 10)]);
        let dice = Dice::from_roll(4, 4);
        let moves = possible_moves(&positions, &dice, Color::Dark, 20);
        assert!(!moves.contains_key(&HOME_DARK));
    }

    #[test]
    fn test_has_legal_move_false_when_shut_out() {
        // dark on bar; light holds all entry points 0..=5
        let mut placements = vec![(0, BAR_DARK)];
        for (i, point) in (0..6).enumerate() {
            let id = 15 + 2 * i as CheckerId;
            placements.push((id, point));
            placements.push((id + 1, point));
        }
        let positions = position_with(&placements);
        for a in 1..=6 {
            for b in 1..=6 {
                assert!(!has_legal_move(&positions, &Dice::from_roll(a, b), Color::Dark));
            }
        }
    }
}
