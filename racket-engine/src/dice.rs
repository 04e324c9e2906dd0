//! Random rolls for heists and thefts.
//!
//! A single seedable source behind a mutex, so tests can pin every outcome
//! while production draws from entropy.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::sync::Mutex;

/// Seedable dice shared by the probabilistic services.
pub struct Dice {
    rng: Mutex<StdRng>,
}

impl Dice {
    /// Dice seeded from OS entropy (production).
    pub fn from_entropy() -> Self {
        Self { rng: Mutex::new(StdRng::from_entropy()) }
    }

    /// Dice with a fixed seed (deterministic tests).
    pub fn seeded(seed: u64) -> Self {
        Self { rng: Mutex::new(StdRng::seed_from_u64(seed)) }
    }

    /// Uniform roll in `1..=100`.
    pub fn roll_percent(&self) -> i64 {
        self.rng.lock().unwrap().gen_range(1..=100)
    }

    /// Uniform integer in `min..=max` (swapped bounds are tolerated).
    pub fn range_i64(&self, min: i64, max: i64) -> i64 {
        let (lo, hi) = if min <= max { (min, max) } else { (max, min) };
        self.rng.lock().unwrap().gen_range(lo..=hi)
    }

    /// Uniform cash amount in `min..=max`, drawn in whole cents.
    pub fn range_cash(&self, min: Decimal, max: Decimal) -> Decimal {
        self.range_subunits(min, max, 2)
    }

    /// Uniform crypto amount in `min..=max`, drawn in 1e-4 units.
    pub fn range_crypto(&self, min: Decimal, max: Decimal) -> Decimal {
        self.range_subunits(min, max, 4)
    }

    fn range_subunits(&self, min: Decimal, max: Decimal, scale: u32) -> Decimal {
        let factor = Decimal::from(10i64.pow(scale));
        let lo = (min * factor).round().to_i64().unwrap_or(0);
        let hi = (max * factor).round().to_i64().unwrap_or(0).max(lo);
        let drawn = self.range_i64(lo, hi);
        Decimal::new(drawn, scale)
    }

    /// Pick one element uniformly, `None` for an empty slice.
    pub fn pick<'a, T>(&self, items: &'a [T]) -> Option<&'a T> {
        if items.is_empty() {
            return None;
        }
        let index = self.rng.lock().unwrap().gen_range(0..items.len());
        items.get(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_roll_percent_in_range() {
        let dice = Dice::seeded(1);
        for _ in 0..1000 {
            let roll = dice.roll_percent();
            assert!((1..=100).contains(&roll));
        }
    }

    #[test]
    fn test_seeded_dice_are_reproducible() {
        let a = Dice::seeded(42);
        let b = Dice::seeded(42);
        let rolls_a: Vec<i64> = (0..10).map(|_| a.roll_percent()).collect();
        let rolls_b: Vec<i64> = (0..10).map(|_| b.roll_percent()).collect();
        assert_eq!(rolls_a, rolls_b);
    }

    #[test]
    fn test_range_cash_respects_bounds_and_scale() {
        let dice = Dice::seeded(7);
        for _ in 0..500 {
            let drawn = dice.range_cash(dec!(10), dec!(150));
            assert!(drawn >= dec!(10) && drawn <= dec!(150));
            assert_eq!(drawn, drawn.round_dp(2));
        }
    }

    #[test]
    fn test_range_crypto_respects_bounds() {
        let dice = Dice::seeded(7);
        for _ in 0..500 {
            let drawn = dice.range_crypto(dec!(0.001), dec!(0.01));
            assert!(drawn >= dec!(0.001) && drawn <= dec!(0.01));
            assert_eq!(drawn, drawn.round_dp(4));
        }
    }

    #[test]
    fn test_pick_covers_all_items() {
        let dice = Dice::seeded(3);
        let items = ["a", "b", "c"];
        let mut seen = std::collections::HashSet::new();
        for _ in 0..100 {
            seen.insert(*dice.pick(&items).unwrap());
        }
        assert_eq!(seen.len(), 3);
        let empty: [&str; 0] = [];
        assert!(dice.pick(&empty).is_none());
    }
}
