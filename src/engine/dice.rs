use rand::rngs::StdRng;
use rand::{RngExt, SeedableRng};
use std::collections::VecDeque;

/// Source of die rolls. All engine randomness flows through this trait so
/// games can be replayed with a seeded source.
pub trait DiceRoller: Send {
    /// Uniform integer in [1, 6].
    fn roll(&mut self) -> u8;
}

/// Production roller backed by the thread-local generator.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdDice;

impl DiceRoller for StdDice {
    fn roll(&mut self) -> u8 {
        rand::rng().random_range(1..=6)
    }
}

/// Deterministic roller for replays and tests.
#[derive(Debug)]
pub struct SeededDice(StdRng);

impl SeededDice {
    pub fn new(seed: u64) -> Self {
        Self(StdRng::seed_from_u64(seed))
    }
}

impl DiceRoller for SeededDice {
    fn roll(&mut self) -> u8 {
        self.0.random_range(1..=6)
    }
}

/// Roller that plays back a fixed script, for exercising exact scenarios.
/// Panics if the script runs dry, which in a test is the right failure.
#[derive(Debug, Clone, Default)]
pub struct ScriptedDice(VecDeque<u8>);

impl ScriptedDice {
    pub fn new(rolls: impl IntoIterator<Item = u8>) -> Self {
        Self(rolls.into_iter().collect())
    }
}

impl DiceRoller for ScriptedDice {
    fn roll(&mut self) -> u8 {
        self.0.pop_front().expect("scripted dice exhausted")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn std_dice_stays_in_range() {
        let mut dice = StdDice;
        for _ in 0..1000 {
            let value = dice.roll();
            assert!((1..=6).contains(&value));
        }
    }

    #[test]
    fn seeded_dice_is_reproducible() {
        let mut a = SeededDice::new(42);
        let mut b = SeededDice::new(42);
        let rolls_a: Vec<u8> = (0..32).map(|_| a.roll()).collect();
        let rolls_b: Vec<u8> = (0..32).map(|_| b.roll()).collect();
        assert_eq!(rolls_a, rolls_b);
        assert!(rolls_a.iter().all(|v| (1..=6).contains(v)));
    }

    #[test]
    fn scripted_dice_plays_back_in_order() {
        let mut dice = ScriptedDice::new([6, 6, 6]);
        assert_eq!(dice.roll(), 6);
        assert_eq!(dice.roll(), 6);
        assert_eq!(dice.roll(), 6);
    }
}
