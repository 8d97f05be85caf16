//! Maxgammon Board Model
//!
//! Pure data describing one backgammon session as the client observes it:
//! where each of the thirty checkers sits, which dice are still usable, and
//! whose turn it is.
//!
//! # Constraints
//!
//! This crate MUST NOT:
//! - Perform I/O operations (file, network, etc.)
//! - Read wall-clock time
//! - Roll dice (dice values arrive from the session server)
//!
//! # Location Indices
//!
//! Every command and response uses the same index space:
//! - `0..=23`: the twenty-four points
//! - `24` / `25`: light bar / dark bar
//! - `26` / `27`: light home / dark home

#![deny(unsafe_code)]

use std::fmt;

// ============================================================================
// Index Space
// ============================================================================

/// A location index in `0..=27`.
pub type Point = u8;

/// Identity of one checker, `0..30`.
///
/// Checkers `0..15` are dark, `15..30` are light.
pub type CheckerId = u8;

/// Number of track points.
pub const POINT_COUNT: u8 = 24;

/// Bar slot for hit light checkers.
pub const BAR_LIGHT: Point = 24;

/// Bar slot for hit dark checkers.
pub const BAR_DARK: Point = 25;

/// Home slot for borne-off light checkers.
pub const HOME_LIGHT: Point = 26;

/// Home slot for borne-off dark checkers.
pub const HOME_DARK: Point = 27;

/// Highest valid location index.
pub const MAX_LOCATION: Point = 27;

/// Checkers per colour.
pub const CHECKERS_PER_COLOR: usize = 15;

/// Total checkers on the board.
pub const CHECKER_COUNT: usize = 2 * CHECKERS_PER_COLOR;

/// Identity the session server uses for the computer opponent.
pub const AI_IDENTITY: &str = "AI";

// ============================================================================
// Errors
// ============================================================================

/// Board invariant violation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BoardError {
    #[error("location {0} is outside 0..=27")]
    LocationOutOfRange(u32),
    #[error("expected 30 checker locations, got {0}")]
    CheckerCount(usize),
    #[error("point {0} holds checkers of both colours")]
    MixedPoint(Point),
    #[error("checker {checker} ({color}) sits in the opponent's slot {location}")]
    WrongSlot {
        checker: CheckerId,
        color: Color,
        location: Point,
    },
    #[error("die value {0} is outside 1..=6")]
    DieOutOfRange(u32),
    #[error("invalid dice sequence {0:?}")]
    DiceShape(Vec<u8>),
}

// ============================================================================
// Colour
// ============================================================================

/// Checker colour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Color {
    Light,
    Dark,
}

impl Color {
    pub const ALL: [Color; 2] = [Color::Light, Color::Dark];

    /// Colour of a checker identity.
    pub fn of_checker(id: CheckerId) -> Self {
        if usize::from(id) < CHECKERS_PER_COLOR {
            Color::Dark
        } else {
            Color::Light
        }
    }

    pub fn opponent(self) -> Self {
        match self {
            Color::Light => Color::Dark,
            Color::Dark => Color::Light,
        }
    }

    /// Bar slot this colour re-enters from.
    pub fn bar(self) -> Point {
        match self {
            Color::Light => BAR_LIGHT,
            Color::Dark => BAR_DARK,
        }
    }

    /// Home slot this colour bears off into.
    pub fn home(self) -> Point {
        match self {
            Color::Light => HOME_LIGHT,
            Color::Dark => HOME_DARK,
        }
    }

    /// Checker identities owned by this colour.
    pub fn checkers(self) -> std::ops::Range<CheckerId> {
        let per = CHECKERS_PER_COLOR as CheckerId;
        match self {
            Color::Dark => 0..per,
            Color::Light => per..2 * per,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Color::Light => "light",
            Color::Dark => "dark",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "light" => Some(Color::Light),
            "dark" => Some(Color::Dark),
            _ => None,
        }
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Location
// ============================================================================

/// Classified location index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Location {
    Point(u8),
    Bar(Color),
    Home(Color),
}

impl Location {
    pub fn from_index(index: Point) -> Result<Self, BoardError> {
        match index {
            0..=23 => Ok(Location::Point(index)),
            BAR_LIGHT => Ok(Location::Bar(Color::Light)),
            BAR_DARK => Ok(Location::Bar(Color::Dark)),
            HOME_LIGHT => Ok(Location::Home(Color::Light)),
            HOME_DARK => Ok(Location::Home(Color::Dark)),
            _ => Err(BoardError::LocationOutOfRange(u32::from(index))),
        }
    }

    pub fn index(self) -> Point {
        match self {
            Location::Point(p) => p,
            Location::Bar(color) => color.bar(),
            Location::Home(color) => color.home(),
        }
    }
}

/// Whether `index` is a valid board index for commands (`0..=27`).
pub fn is_valid_location(index: u32) -> bool {
    index <= u32::from(MAX_LOCATION)
}

// ============================================================================
// Checker Positions
// ============================================================================

/// Mapping checker identity → location index.
///
/// Colour is fixed by identity, so every value of this type carries exactly
/// fifteen checkers per colour. `validate()` checks the remaining invariants.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CheckerPositions {
    locations: [Point; CHECKER_COUNT],
}

impl CheckerPositions {
    /// Canonical starting layout.
    ///
    /// Dark: 0(2), 11(5), 16(3), 18(5). Light: 23(2), 12(5), 7(3), 5(5).
    pub fn starting() -> Self {
        const STACKS: [(Point, usize); 8] = [
            // dark, ids 0..15
            (0, 2),
            (11, 5),
            (16, 3),
            (18, 5),
            // light, ids 15..30
            (23, 2),
            (12, 5),
            (7, 3),
            (5, 5),
        ];

        let mut locations = [0; CHECKER_COUNT];
        let mut id = 0;
        for (point, count) in STACKS {
            for _ in 0..count {
                locations[id] = point;
                id += 1;
            }
        }
        Self { locations }
    }

    /// Build from raw location indices, validating every invariant.
    pub fn from_indices(indices: &[u32]) -> Result<Self, BoardError> {
        if indices.len() != CHECKER_COUNT {
            return Err(BoardError::CheckerCount(indices.len()));
        }
        let mut locations = [0; CHECKER_COUNT];
        for (slot, &raw) in locations.iter_mut().zip(indices) {
            if !is_valid_location(raw) {
                return Err(BoardError::LocationOutOfRange(raw));
            }
            *slot = raw as Point;
        }
        let positions = Self { locations };
        positions.validate()?;
        Ok(positions)
    }

    /// Raw location per checker identity.
    pub fn as_indices(&self) -> &[Point; CHECKER_COUNT] {
        &self.locations
    }

    pub fn location(&self, id: CheckerId) -> Point {
        self.locations[usize::from(id)]
    }

    /// Checker identities at `index`, ascending.
    pub fn checkers_at(&self, index: Point) -> impl Iterator<Item = CheckerId> + '_ {
        self.locations
            .iter()
            .enumerate()
            .filter(move |(_, loc)| **loc == index)
            .map(|(id, _)| id as CheckerId)
    }

    /// Number of `color` checkers at `index`.
    pub fn count_at(&self, index: Point, color: Color) -> usize {
        color
            .checkers()
            .filter(|&id| self.location(id) == index)
            .count()
    }

    /// Colour occupying a track point, if any.
    pub fn owner_of(&self, index: Point) -> Option<Color> {
        self.checkers_at(index).next().map(Color::of_checker)
    }

    pub fn bar_count(&self, color: Color) -> usize {
        self.count_at(color.bar(), color)
    }

    pub fn home_count(&self, color: Color) -> usize {
        self.count_at(color.home(), color)
    }

    /// Checkers of `color` across points, bar and home.
    pub fn total(&self, color: Color) -> usize {
        (0..=MAX_LOCATION)
            .map(|index| self.count_at(index, color))
            .sum()
    }

    /// Relocate one checker. Caller is responsible for legality.
    pub fn relocate(&mut self, id: CheckerId, to: Point) {
        debug_assert!(to <= MAX_LOCATION, "relocate target out of range");
        self.locations[usize::from(id)] = to;
    }

    /// Check structural invariants.
    ///
    /// - every location is in `0..=27`
    /// - no track point holds both colours
    /// - a checker only ever sits on its own colour's bar and home
    pub fn validate(&self) -> Result<(), BoardError> {
        for (id, &loc) in self.locations.iter().enumerate() {
            let id = id as CheckerId;
            let color = Color::of_checker(id);
            match Location::from_index(loc)? {
                Location::Bar(owner) | Location::Home(owner) if owner != color => {
                    return Err(BoardError::WrongSlot {
                        checker: id,
                        color,
                        location: loc,
                    });
                }
                _ => {}
            }
        }
        for point in 0..POINT_COUNT {
            if self.count_at(point, Color::Light) > 0 && self.count_at(point, Color::Dark) > 0 {
                return Err(BoardError::MixedPoint(point));
            }
        }
        Ok(())
    }
}

impl Default for CheckerPositions {
    fn default() -> Self {
        Self::starting()
    }
}

/// Colour whose fifteen checkers all occupy its home slot.
///
/// Game-over is a pure function of checker locations.
pub fn winner(positions: &CheckerPositions) -> Option<Color> {
    Color::ALL
        .into_iter()
        .find(|&color| positions.home_count(color) == CHECKERS_PER_COLOR)
}

// ============================================================================
// Dice
// ============================================================================

/// Remaining usable pip values, in server order.
///
/// A fresh roll yields two values, or four for doubles. Consuming doubles
/// passes through three, so lengths 3 and 4 imply all values are equal.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Dice {
    values: Vec<u8>,
}

impl Dice {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Expand a physical roll of two dice into usable moves.
    pub fn from_roll(first: u8, second: u8) -> Self {
        let values = if first == second {
            vec![first; 4]
        } else {
            vec![first, second]
        };
        Self { values }
    }

    /// Build from raw pip values, validating shape.
    pub fn from_values(values: &[u32]) -> Result<Self, BoardError> {
        let mut pips = Vec::with_capacity(values.len());
        for &v in values {
            if !(1..=6).contains(&v) {
                return Err(BoardError::DieOutOfRange(v));
            }
            pips.push(v as u8);
        }
        let all_equal = pips.windows(2).all(|w| w[0] == w[1]);
        if pips.len() > 4 || (pips.len() >= 3 && !all_equal) {
            return Err(BoardError::DiceShape(pips));
        }
        Ok(Self { values: pips })
    }

    pub fn values(&self) -> &[u8] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn contains(&self, pip: u8) -> bool {
        self.values.contains(&pip)
    }

    /// Distinct pip values, ascending.
    pub fn distinct(&self) -> Vec<u8> {
        let mut distinct = self.values.clone();
        distinct.sort_unstable();
        distinct.dedup();
        distinct
    }

    /// Remove one die of value `pip`. Returns false if none matched.
    pub fn consume(&mut self, pip: u8) -> bool {
        match self.values.iter().position(|&v| v == pip) {
            Some(idx) => {
                self.values.remove(idx);
                true
            }
            None => false,
        }
    }

    pub fn clear(&mut self) {
        self.values.clear();
    }
}

// ============================================================================
// Session-Level Model
// ============================================================================

/// How a session was created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GameMode {
    /// One human against the computer opponent.
    Ai,
    /// Two humans sharing one client.
    Local,
    /// Two humans on separate clients.
    Online,
}

impl GameMode {
    pub fn as_str(self) -> &'static str {
        match self {
            GameMode::Ai => "ai",
            GameMode::Local => "local",
            GameMode::Online => "online",
        }
    }
}

/// Authoritative board state as last reported by the session server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoardState {
    pub current_turn: String,
    pub dice: Dice,
    pub checkers: CheckerPositions,
    /// Dice were exhausted after a roll and only `change_turn` remains.
    pub awaiting_turn_change: bool,
    /// Server-side mutation counter.
    pub revision: u64,
}

impl BoardState {
    /// Initial state for a fresh game.
    pub fn new(current_turn: impl Into<String>) -> Self {
        Self {
            current_turn: current_turn.into(),
            dice: Dice::empty(),
            checkers: CheckerPositions::starting(),
            awaiting_turn_change: false,
            revision: 0,
        }
    }

    pub fn winner(&self) -> Option<Color> {
        winner(&self.checkers)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_starting_layout_counts() {
        let positions = CheckerPositions::starting();
        positions.validate().unwrap();

        assert_eq!(positions.count_at(0, Color::Dark), 2);
        assert_eq!(positions.count_at(11, Color::Dark), 5);
        assert_eq!(positions.count_at(16, Color::Dark), 3);
        assert_eq!(positions.count_at(18, Color::Dark), 5);
        assert_eq!(positions.count_at(23, Color::Light), 2);
        assert_eq!(positions.count_at(12, Color::Light), 5);
        assert_eq!(positions.count_at(7, Color::Light), 3);
        assert_eq!(positions.count_at(5, Color::Light), 5);

        for color in Color::ALL {
            assert_eq!(positions.total(color), CHECKERS_PER_COLOR);
            assert_eq!(positions.bar_count(color), 0);
            assert_eq!(positions.home_count(color), 0);
        }
        assert_eq!(winner(&positions), None);
    }

    #[test]
    fn test_checker_colors_by_identity() {
        assert_eq!(Color::of_checker(0), Color::Dark);
        assert_eq!(Color::of_checker(14), Color::Dark);
        assert_eq!(Color::of_checker(15), Color::Light);
        assert_eq!(Color::of_checker(29), Color::Light);
        assert_eq!(Color::Dark.checkers().count(), CHECKERS_PER_COLOR);
        assert_eq!(Color::Light.checkers().count(), CHECKERS_PER_COLOR);
    }

    #[test]
    fn test_location_classification() {
        assert_eq!(Location::from_index(3).unwrap(), Location::Point(3));
        assert_eq!(Location::from_index(24).unwrap(), Location::Bar(Color::Light));
        assert_eq!(Location::from_index(25).unwrap(), Location::Bar(Color::Dark));
        assert_eq!(Location::from_index(26).unwrap(), Location::Home(Color::Light));
        assert_eq!(Location::from_index(27).unwrap(), Location::Home(Color::Dark));
        assert!(Location::from_index(28).is_err());
        assert!(is_valid_location(27));
        assert!(!is_valid_location(28));
    }

    #[test]
    fn test_from_indices_rejects_wrong_length() {
        let result = CheckerPositions::from_indices(&[0; 29]);
        assert_eq!(result, Err(BoardError::CheckerCount(29)));
    }

    #[test]
    fn test_from_indices_rejects_mixed_point() {
        let mut raw: Vec<u32> = CheckerPositions::starting()
            .as_indices()
            .iter()
            .map(|&p| u32::from(p))
            .collect();
        // move one light checker onto a dark stack
        raw[15] = 0;
        assert_eq!(
            CheckerPositions::from_indices(&raw),
            Err(BoardError::MixedPoint(0))
        );
    }

    #[test]
    fn test_from_indices_rejects_opponent_home() {
        let mut raw: Vec<u32> = CheckerPositions::starting()
            .as_indices()
            .iter()
            .map(|&p| u32::from(p))
            .collect();
        raw[0] = u32::from(HOME_LIGHT);
        assert!(matches!(
            CheckerPositions::from_indices(&raw),
            Err(BoardError::WrongSlot { checker: 0, .. })
        ));
    }

    #[test]
    fn test_winner_requires_all_fifteen_home() {
        let mut positions = CheckerPositions::starting();
        let dark: Vec<_> = Color::Dark.checkers().collect();
        for &id in &dark[..14] {
            positions.relocate(id, HOME_DARK);
        }
        assert_eq!(winner(&positions), None);

        positions.relocate(dark[14], HOME_DARK);
        assert_eq!(winner(&positions), Some(Color::Dark));
    }

    /// Doubles expand to four usable moves.
    #[test]
    fn test_doubles_expand_to_four() {
        let dice = Dice::from_roll(4, 4);
        assert_eq!(dice.values(), &[4, 4, 4, 4]);

        let dice = Dice::from_roll(3, 5);
        assert_eq!(dice.values(), &[3, 5]);
    }

    #[test]
    fn test_dice_consume() {
        let mut dice = Dice::from_roll(2, 2);
        assert!(dice.consume(2));
        assert_eq!(dice.len(), 3);
        assert!(!dice.consume(5));
        assert_eq!(dice.distinct(), vec![2]);
    }

    #[test]
    fn test_dice_shape_validation() {
        assert!(Dice::from_values(&[]).is_ok());
        assert!(Dice::from_values(&[6]).is_ok());
        assert!(Dice::from_values(&[1, 6]).is_ok());
        assert!(Dice::from_values(&[3, 3, 3]).is_ok());
        assert!(Dice::from_values(&[3, 3, 3, 3]).is_ok());
        assert_eq!(
            Dice::from_values(&[1, 2, 3]),
            Err(BoardError::DiceShape(vec![1, 2, 3]))
        );
        assert_eq!(Dice::from_values(&[0]), Err(BoardError::DieOutOfRange(0)));
        assert_eq!(Dice::from_values(&[7]), Err(BoardError::DieOutOfRange(7)));
        assert!(Dice::from_values(&[2, 2, 2, 2, 2]).is_err());
    }

    proptest! {
        /// Any relocation sequence keeps fifteen checkers per colour.
        #[test]
        fn prop_fifteen_per_color(moves in proptest::collection::vec((0u8..30, 0u8..24), 0..64)) {
            let mut positions = CheckerPositions::starting();
            for (id, to) in moves {
                positions.relocate(id, to);
            }
            for color in Color::ALL {
                prop_assert_eq!(positions.total(color), CHECKERS_PER_COLOR);
            }
        }
    }
}
