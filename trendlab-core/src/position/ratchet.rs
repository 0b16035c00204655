//! Ratchet invariant enforcement: stops may tighten, never loosen.

use crate::domain::Direction;

/// Enforces that a stop level only ever moves in the favorable direction:
/// - `Buy`: stop can only rise (tighten).
/// - `Sell`: stop can only fall (tighten).
#[derive(Debug, Clone, PartialEq)]
pub struct RatchetState {
    current_level: Option<f64>,
    direction: Direction,
    enabled: bool,
}

impl RatchetState {
    pub fn new(direction: Direction) -> Self {
        Self {
            current_level: None,
            direction,
            enabled: true,
        }
    }

    pub fn with_initial_level(direction: Direction, initial_level: f64) -> Self {
        Self {
            current_level: Some(initial_level),
            direction,
            enabled: true,
        }
    }

    /// A disabled ratchet allows loosening (used for testing only).
    pub fn disabled(direction: Direction) -> Self {
        Self {
            current_level: None,
            direction,
            enabled: false,
        }
    }

    /// Apply the ratchet to a proposed stop level, returning the level that
    /// should actually be adopted. Tightens or initializes; never loosens
    /// unless the ratchet is disabled.
    pub fn apply(&mut self, proposed: f64) -> f64 {
        if !self.enabled {
            self.current_level = Some(proposed);
            return proposed;
        }

        let next = match self.current_level {
            None => proposed,
            Some(current) => match self.direction {
                Direction::Buy => current.max(proposed),
                Direction::Sell => current.min(proposed),
            },
        };
        self.current_level = Some(next);
        next
    }

    pub fn current_level(&self) -> Option<f64> {
        self.current_level
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buy_tightening_allowed() {
        let mut r = RatchetState::with_initial_level(Direction::Buy, 1.0900);
        assert_eq!(r.apply(1.1000), 1.1000);
    }

    #[test]
    fn buy_loosening_blocked() {
        let mut r = RatchetState::with_initial_level(Direction::Buy, 1.1000);
        assert_eq!(r.apply(1.0900), 1.1000);
    }

    #[test]
    fn sell_tightening_allowed() {
        let mut r = RatchetState::with_initial_level(Direction::Sell, 1.1050);
        assert_eq!(r.apply(1.1000), 1.1000);
    }

    #[test]
    fn sell_loosening_blocked() {
        let mut r = RatchetState::with_initial_level(Direction::Sell, 1.1000);
        assert_eq!(r.apply(1.1100), 1.1000);
    }

    #[test]
    fn initializes_from_none() {
        let mut r = RatchetState::new(Direction::Buy);
        assert_eq!(r.current_level(), None);
        assert_eq!(r.apply(1.0950), 1.0950);
    }

    #[test]
    fn disabled_allows_loosening() {
        let mut r = RatchetState::disabled(Direction::Buy);
        assert!(!r.is_enabled());
        r.apply(1.1000);
        assert_eq!(r.apply(1.0900), 1.0900);
    }

    #[test]
    fn sequential_tightening_never_regresses() {
        // Once activated, a ratchet seeded at the first candidate only ever
        // tightens further, regardless of how the candidate oscillates.
        let mut r = RatchetState::new(Direction::Buy);
        assert_eq!(r.apply(1.1050), 1.1050);
        assert_eq!(r.apply(1.1000), 1.1050); // candidate loosened, rejected
        assert_eq!(r.apply(1.1150), 1.1150); // candidate tightened, adopted
    }
}
