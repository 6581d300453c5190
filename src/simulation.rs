//! Offline payout table simulation
//!
//! Runs many draws against a table without touching balances and compares
//! what was paid with what the table promises.

use crate::games::payout_table::PayoutTable;
use crate::games::random::RandomSource;
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Serialize)]
pub struct SimulationReport {
    pub plays: u64,
    pub wins: u64,
    pub total_wagered: Decimal,
    pub total_paid: Decimal,
    /// Observed return to player, percent
    pub observed_rtp: Decimal,
    pub expected_rtp: Decimal,
    pub observed_win_rate: Decimal,
    pub expected_win_rate: Decimal,
    /// Draw count per prize value
    pub hits: BTreeMap<Decimal, u64>,
}

pub fn simulate(table: &PayoutTable, plays: u64, rng: &mut dyn RandomSource) -> SimulationReport {
    let mut wins = 0u64;
    let mut total_paid = Decimal::ZERO;
    let mut hits = BTreeMap::new();

    for _ in 0..plays {
        let outcome = table.draw(rng.next_unit());
        if outcome.is_winner {
            wins += 1;
            total_paid += outcome.prize_value;
        }
        *hits.entry(outcome.prize_value.normalize()).or_insert(0u64) += 1;
    }

    let total_wagered = table.price() * Decimal::from(plays);
    let (observed_rtp, observed_win_rate) = if plays == 0 {
        (Decimal::ZERO, Decimal::ZERO)
    } else {
        (
            (total_paid / total_wagered * Decimal::ONE_HUNDRED).round_dp(4),
            (Decimal::from(wins) / Decimal::from(plays)).round_dp(6),
        )
    };

    SimulationReport {
        plays,
        wins,
        total_wagered,
        total_paid,
        observed_rtp,
        expected_rtp: table.expected_rtp(),
        observed_win_rate,
        expected_win_rate: table.win_probability(),
        hits,
    }
}
