//! Payout Table
//!
//! Weighted prize distribution for one game. Resolving a draw is a pure
//! function of the table and a caller-supplied uniform sample, so the random
//! source stays injectable and every outcome is reproducible in tests.

use crate::games::types::{
    multiplier_for, Game, GameId, Outcome, PrizeId, PrizeOutcome, MAX_AMOUNT, PROBABILITY_SCALE,
};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Serialize;
use thiserror::Error;

/// Tolerance applied when checking that probabilities do not exceed one
pub const PROBABILITY_EPSILON: Decimal = dec!(0.000000001);

/// Payout table construction and validation errors
#[derive(Debug, Clone, Error, PartialEq)]
pub enum PayoutTableError {
    #[error("Game {game_id} has no configured prize outcomes")]
    Empty { game_id: GameId },

    #[error("Game {game_id} has no probability mass on any outcome")]
    NoProbabilityMass { game_id: GameId },

    #[error("Prize {prize_id} has probability {probability} outside [0, 1]")]
    ProbabilityOutOfRange { prize_id: PrizeId, probability: Decimal },

    #[error("Prize {prize_id} has probability {probability} with more than {max_scale} decimal places")]
    ProbabilityPrecision {
        prize_id: PrizeId,
        probability: Decimal,
        max_scale: u32,
    },

    #[error("Prize {prize_id} has negative value {prize_value}")]
    NegativePrize { prize_id: PrizeId, prize_value: Decimal },

    #[error("Probabilities of game {game_id} sum to {sum}, above 1")]
    ProbabilitySumExceeded { game_id: GameId, sum: Decimal },

    #[error("Prize {prize_id} value {prize_value} exceeds the largest accepted amount")]
    PrizeTooLarge { prize_id: PrizeId, prize_value: Decimal },

    #[error("Game {game_id} has price {price}, not positive or above the largest accepted amount")]
    InvalidPrice { game_id: GameId, price: Decimal },

    #[error("Payout figures of game {game_id} overflow decimal arithmetic")]
    Overflow { game_id: GameId },
}

/// One reachable slot of the distribution after normalisation
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PayoutBucket {
    /// Lowest row id that contributed to this bucket
    pub prize_id: PrizeId,
    pub prize_value: Decimal,
    pub probability: Decimal,
    pub multiplier: Decimal,
    /// Running probability sum up to and including this bucket
    pub cumulative: Decimal,
}

/// Immutable-per-revision distribution resolving samples into outcomes
#[derive(Debug, Clone, PartialEq)]
pub struct PayoutTable {
    game_id: GameId,
    revision: u64,
    price: Decimal,
    buckets: Vec<PayoutBucket>,
    total_probability: Decimal,
    expected_rtp: Decimal,
}

impl PayoutTable {
    /// Build the table for a game from its stored rows.
    ///
    /// Rows paying nothing collapse into a single no-win bucket and rows with
    /// zero probability are dropped. Buckets are ordered by descending
    /// probability, ties broken by ascending row id. Corrupt rows and empty
    /// tables are rejected; an over-full table is accepted here and only
    /// rejected by [`PayoutTable::validate`].
    pub fn build(game: &Game, outcomes: &[PrizeOutcome]) -> Result<Self, PayoutTableError> {
        if outcomes.is_empty() {
            return Err(PayoutTableError::Empty { game_id: game.id });
        }
        if game.price <= Decimal::ZERO || game.price > MAX_AMOUNT {
            return Err(PayoutTableError::InvalidPrice {
                game_id: game.id,
                price: game.price,
            });
        }

        let mut no_win: Option<(PrizeId, Decimal)> = None;
        let mut winners: Vec<(PrizeId, Decimal, Decimal)> = Vec::with_capacity(outcomes.len());

        for row in outcomes {
            if row.probability < Decimal::ZERO || row.probability > Decimal::ONE {
                return Err(PayoutTableError::ProbabilityOutOfRange {
                    prize_id: row.id,
                    probability: row.probability,
                });
            }
            if row.prize_value < Decimal::ZERO {
                return Err(PayoutTableError::NegativePrize {
                    prize_id: row.id,
                    prize_value: row.prize_value,
                });
            }
            if row.prize_value > MAX_AMOUNT {
                return Err(PayoutTableError::PrizeTooLarge {
                    prize_id: row.id,
                    prize_value: row.prize_value,
                });
            }

            if row.prize_value.is_zero() {
                no_win = Some(match no_win {
                    Some((id, mass)) => (id.min(row.id), mass + row.probability),
                    None => (row.id, row.probability),
                });
            } else {
                winners.push((row.id, row.prize_value, row.probability));
            }
        }

        let mut slots: Vec<(PrizeId, Decimal, Decimal)> = winners;
        if let Some((id, mass)) = no_win {
            slots.push((id, Decimal::ZERO, mass));
        }
        slots.retain(|(_, _, probability)| !probability.is_zero());
        slots.sort_by(|a, b| b.2.cmp(&a.2).then(a.0.cmp(&b.0)));

        if slots.is_empty() {
            return Err(PayoutTableError::NoProbabilityMass { game_id: game.id });
        }

        let overflow = PayoutTableError::Overflow { game_id: game.id };
        let mut cumulative = Decimal::ZERO;
        let mut expected_prize = Decimal::ZERO;
        let mut buckets = Vec::with_capacity(slots.len());
        for (prize_id, prize_value, probability) in slots {
            cumulative = cumulative.checked_add(probability).ok_or(overflow.clone())?;
            expected_prize = prize_value
                .checked_mul(probability)
                .and_then(|share| expected_prize.checked_add(share))
                .ok_or(overflow.clone())?;
            buckets.push(PayoutBucket {
                prize_id,
                prize_value,
                probability,
                multiplier: multiplier_for(prize_value, game.price).ok_or(overflow.clone())?,
                cumulative,
            });
        }

        let expected_rtp = expected_prize
            .checked_div(game.price)
            .and_then(|ratio| ratio.checked_mul(Decimal::ONE_HUNDRED))
            .ok_or(overflow)?
            .round_dp(4);

        Ok(Self {
            game_id: game.id,
            revision: game.revision,
            price: game.price,
            buckets,
            total_probability: cumulative,
            expected_rtp,
        })
    }

    /// Administrative validation, run outside the hot path on every table write
    pub fn validate(&self) -> Result<(), PayoutTableError> {
        if self.total_probability > Decimal::ONE + PROBABILITY_EPSILON {
            return Err(PayoutTableError::ProbabilitySumExceeded {
                game_id: self.game_id,
                sum: self.total_probability,
            });
        }
        for bucket in &self.buckets {
            if bucket.probability.normalize().scale() > PROBABILITY_SCALE {
                return Err(PayoutTableError::ProbabilityPrecision {
                    prize_id: bucket.prize_id,
                    probability: bucket.probability,
                    max_scale: PROBABILITY_SCALE,
                });
            }
        }
        Ok(())
    }

    /// Resolve a uniform sample in `[0, 1)` into an outcome.
    ///
    /// Returns the first bucket whose cumulative probability reaches the
    /// sample. Samples beyond the configured mass resolve to
    /// [`Outcome::NO_PRIZE`]. Negative samples and NaN read as zero and
    /// samples of one or more read as exactly one, which lands in the last
    /// bucket of a full table. This never fails.
    pub fn draw(&self, sample: f64) -> Outcome {
        let point = sample_to_decimal(sample);

        self.buckets
            .iter()
            .find(|bucket| bucket.cumulative >= point)
            .map(|bucket| Outcome {
                prize_value: bucket.prize_value,
                multiplier: bucket.multiplier,
                is_winner: bucket.prize_value > Decimal::ZERO,
            })
            .unwrap_or(Outcome::NO_PRIZE)
    }

    pub fn game_id(&self) -> GameId {
        self.game_id
    }

    /// Game revision this table was built from
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn price(&self) -> Decimal {
        self.price
    }

    pub fn buckets(&self) -> &[PayoutBucket] {
        &self.buckets
    }

    pub fn total_probability(&self) -> Decimal {
        self.total_probability
    }

    /// Probability that a play pays anything
    pub fn win_probability(&self) -> Decimal {
        self.buckets
            .iter()
            .filter(|bucket| bucket.prize_value > Decimal::ZERO)
            .map(|bucket| bucket.probability)
            .sum()
    }

    /// Return to player implied by the table, as a percentage of the price
    pub fn expected_rtp(&self) -> Decimal {
        self.expected_rtp
    }
}

fn sample_to_decimal(sample: f64) -> Decimal {
    if sample.is_nan() || sample <= 0.0 {
        return Decimal::ZERO;
    }
    if sample >= 1.0 {
        return Decimal::ONE;
    }
    // Samples just below one may round up to one here
    Decimal::from_f64(sample).unwrap_or(Decimal::ZERO)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rand::{rngs::StdRng, Rng, SeedableRng};

    fn game(price: Decimal) -> Game {
        let now = Utc::now();
        Game {
            id: 1,
            name: "Raspadinha de Ouro".to_string(),
            description: None,
            theme: None,
            price,
            target_rtp: dec!(85),
            active: true,
            revision: 1,
            created_at: now,
            updated_at: now,
        }
    }

    fn rows(pairs: &[(Decimal, Decimal)]) -> Vec<PrizeOutcome> {
        pairs.iter()
            .enumerate()
            .map(|(i, (prize_value, probability))| PrizeOutcome {
                id: i as u64 + 1,
                game_id: 1,
                prize_value: *prize_value,
                probability: *probability,
                multiplier: Decimal::ZERO,
            })
            .collect()
    }

    fn scenario_table() -> PayoutTable {
        PayoutTable::build(
            &game(dec!(10.00)),
            &rows(&[
                (dec!(0), dec!(0.60)),
                (dec!(20.00), dec!(0.25)),
                (dec!(50.00), dec!(0.10)),
                (dec!(100.00), dec!(0.05)),
            ]),
        )
        .expect("valid table")
    }

    #[test]
    fn test_scenario_draws() {
        let table = scenario_table();

        let jackpot = table.draw(0.999);
        assert_eq!(jackpot.prize_value, dec!(100.00));
        assert_eq!(jackpot.multiplier, dec!(10));
        assert!(jackpot.is_winner);

        let small = table.draw(0.70);
        assert_eq!(small.prize_value, dec!(20.00));
        assert_eq!(small.multiplier, dec!(2));

        let nothing = table.draw(0.10);
        assert_eq!(nothing, Outcome::NO_PRIZE);

        // The no-win bucket carries the most mass and is ordered first
        assert_eq!(table.draw(0.50).prize_value, Decimal::ZERO);
    }

    #[test]
    fn test_boundary_sample_belongs_to_lower_bucket() {
        let table = scenario_table();
        assert_eq!(table.draw(0.85).prize_value, dec!(20.00));
        assert_eq!(table.draw(0.0).prize_value, Decimal::ZERO);
    }

    #[test]
    fn test_under_specified_table_resolves_to_no_prize() {
        let table = PayoutTable::build(
            &game(dec!(5.00)),
            &rows(&[(dec!(10.00), dec!(0.30)), (dec!(0), dec!(0.60))]),
        )
        .unwrap();

        assert_eq!(table.total_probability(), dec!(0.90));
        assert_eq!(table.draw(0.95), Outcome::NO_PRIZE);
        assert!(table.validate().is_ok());
    }

    #[test]
    fn test_over_specified_table_draws_but_fails_validation() {
        let table = PayoutTable::build(
            &game(dec!(5.00)),
            &rows(&[(dec!(0), dec!(0.80)), (dec!(10.00), dec!(0.50))]),
        )
        .unwrap();

        assert_eq!(table.draw(0.99).prize_value, dec!(10.00));
        assert!(matches!(
            table.validate(),
            Err(PayoutTableError::ProbabilitySumExceeded { .. })
        ));
    }

    #[test]
    fn test_rows_past_one_are_unreachable() {
        let table = PayoutTable::build(
            &game(dec!(5.00)),
            &rows(&[(dec!(0), dec!(0.60)), (dec!(10.00), dec!(0.50)), (dec!(50.00), dec!(0.30))]),
        )
        .unwrap();

        for sample in [0.0, 0.61, 0.99, 1.0, 2.0] {
            assert_ne!(table.draw(sample).prize_value, dec!(50.00));
        }
        assert_eq!(table.draw(1.0).prize_value, dec!(10.00));
        assert!(table.validate().is_err());
    }

    #[test]
    fn test_empty_table_is_rejected() {
        let result = PayoutTable::build(&game(dec!(5.00)), &[]);
        assert_eq!(result, Err(PayoutTableError::Empty { game_id: 1 }));
    }

    #[test]
    fn test_table_without_mass_is_rejected() {
        let result = PayoutTable::build(&game(dec!(5.00)), &rows(&[(dec!(10.00), dec!(0))]));
        assert_eq!(result, Err(PayoutTableError::NoProbabilityMass { game_id: 1 }));
    }

    #[test]
    fn test_corrupt_rows_are_rejected() {
        let negative = PayoutTable::build(&game(dec!(5.00)), &rows(&[(dec!(-1), dec!(0.5))]));
        assert!(matches!(negative, Err(PayoutTableError::NegativePrize { .. })));

        let above_one = PayoutTable::build(&game(dec!(5.00)), &rows(&[(dec!(1), dec!(1.5))]));
        assert!(matches!(
            above_one,
            Err(PayoutTableError::ProbabilityOutOfRange { .. })
        ));
    }

    #[test]
    fn test_duplicate_no_win_rows_collapse() {
        let table = PayoutTable::build(
            &game(dec!(2.00)),
            &rows(&[
                (dec!(0), dec!(0.30)),
                (dec!(4.00), dec!(0.40)),
                (dec!(0), dec!(0.30)),
            ]),
        )
        .unwrap();

        let buckets = table.buckets();
        assert_eq!(buckets.len(), 2);
        assert_eq!(buckets[0].prize_value, Decimal::ZERO);
        assert_eq!(buckets[0].probability, dec!(0.60));
        assert_eq!(buckets[0].prize_id, 1);
        assert_eq!(buckets[1].prize_value, dec!(4.00));
    }

    #[test]
    fn test_probability_ties_break_by_row_id() {
        let table = PayoutTable::build(
            &game(dec!(1.00)),
            &rows(&[(dec!(3.00), dec!(0.5)), (dec!(2.00), dec!(0.5))]),
        )
        .unwrap();

        assert_eq!(table.buckets()[0].prize_id, 1);
        assert_eq!(table.draw(0.25).prize_value, dec!(3.00));
        assert_eq!(table.draw(0.75).prize_value, dec!(2.00));
    }

    #[test]
    fn test_multiplier_ignores_stored_value() {
        let mut stale = rows(&[(dec!(30.00), dec!(1))]);
        stale[0].multiplier = dec!(99);

        let table = PayoutTable::build(&game(dec!(15.00)), &stale).unwrap();
        assert_eq!(table.draw(0.5).multiplier, dec!(2));
    }

    #[test]
    fn test_out_of_range_samples_never_fail() {
        let table = scenario_table();
        assert_eq!(table.draw(f64::NAN).prize_value, Decimal::ZERO);
        assert_eq!(table.draw(-3.0).prize_value, Decimal::ZERO);
        assert_eq!(table.draw(1.0).prize_value, dec!(100.00));
        assert_eq!(table.draw(42.0).prize_value, dec!(100.00));
        assert_eq!(table.draw(1.0 - f64::EPSILON).prize_value, dec!(100.00));
    }

    #[test]
    fn test_sample_clamps_land_on_interval_ends() {
        assert_eq!(sample_to_decimal(-0.5), Decimal::ZERO);
        assert_eq!(sample_to_decimal(f64::NAN), Decimal::ZERO);
        assert_eq!(sample_to_decimal(7.0), Decimal::ONE);
        assert_eq!(sample_to_decimal(0.25), dec!(0.25));

        // Nothing covers the top of an under-filled table
        let under = PayoutTable::build(&game(dec!(5.00)), &rows(&[(dec!(10.00), dec!(0.5))]))
            .unwrap();
        assert_eq!(under.draw(1.0), Outcome::NO_PRIZE);
    }

    #[test]
    fn test_oversized_amounts_are_rejected_without_panicking() {
        let huge = dec!(10000000000000000000000000000);

        let prize = PayoutTable::build(&game(dec!(0.01)), &rows(&[(huge, dec!(1))]));
        assert!(matches!(prize, Err(PayoutTableError::PrizeTooLarge { prize_id: 1, .. })));

        let price = PayoutTable::build(&game(huge), &rows(&[(dec!(1), dec!(1))]));
        assert!(matches!(price, Err(PayoutTableError::InvalidPrice { .. })));

        // The largest accepted prize on the cheapest price still fits
        let table = PayoutTable::build(&game(dec!(0.01)), &rows(&[(MAX_AMOUNT, dec!(1))])).unwrap();
        assert_eq!(table.expected_rtp(), dec!(10000000000000));
    }

    #[test]
    fn test_sweep_returns_one_consistent_outcome_per_sample() {
        let table = scenario_table();
        for step in 0..10_000 {
            let sample = step as f64 / 10_000.0;
            let first = table.draw(sample);
            let second = table.draw(sample);

            assert_eq!(first, second);
            assert!(first.prize_value >= Decimal::ZERO);
            assert_eq!(first.is_winner, first.prize_value > Decimal::ZERO);
        }
    }

    #[test]
    fn test_empirical_distribution_converges() {
        let table = scenario_table();
        let mut rng = StdRng::seed_from_u64(0x5eed);
        let draws = 200_000;

        let mut counts = [0u32; 4];
        for _ in 0..draws {
            let outcome = table.draw(rng.gen::<f64>());
            let slot = match outcome.prize_value {
                v if v.is_zero() => 0,
                v if v == dec!(20.00) => 1,
                v if v == dec!(50.00) => 2,
                _ => 3,
            };
            counts[slot] += 1;
        }

        let expected = [0.60, 0.25, 0.10, 0.05];
        for (count, p) in counts.iter().zip(expected) {
            let observed = *count as f64 / draws as f64;
            assert!((observed - p).abs() < 0.01, "observed {observed}, expected {p}");
        }
    }

    #[test]
    fn test_expected_rtp_and_win_probability() {
        let table = scenario_table();
        // 20*0.25 + 50*0.10 + 100*0.05 = 15 per 10 wagered
        assert_eq!(table.expected_rtp(), dec!(150));
        assert_eq!(table.win_probability(), dec!(0.40));
    }

    #[test]
    fn test_validate_rejects_excess_precision() {
        let table = PayoutTable::build(
            &game(dec!(1.00)),
            &rows(&[(dec!(2.00), dec!(0.0000001)), (dec!(0), dec!(0.5))]),
        )
        .unwrap();

        assert!(matches!(
            table.validate(),
            Err(PayoutTableError::ProbabilityPrecision { .. })
        ));
    }
}
