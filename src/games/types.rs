use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::fmt;

pub type UserId = u64;
pub type GameId = u64;
pub type PrizeId = u64;
pub type LedgerEntryId = u64;
pub type PlayId = u64;

/// Fractional digits kept for balances, prices and ledger amounts
pub const MONEY_SCALE: u32 = 2;

/// Maximum fractional digits accepted for probabilities
pub const PROBABILITY_SCALE: u32 = 6;

/// Fractional digits kept for display multipliers
pub const MULTIPLIER_SCALE: u32 = 4;

/// Largest price, prize, deposit or withdrawal accepted
pub const MAX_AMOUNT: Decimal = dec!(1000000000);

/// Round an amount to money precision (banker's rounding is never used for money)
pub fn round_money(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(MONEY_SCALE, RoundingStrategy::MidpointAwayFromZero)
}

/// Multiplier shown to players, always derived from the stored prize value.
///
/// `None` for a zero price or a quotient outside the decimal range.
pub fn multiplier_for(prize_value: Decimal, price: Decimal) -> Option<Decimal> {
    prize_value.checked_div(price).map(|multiplier| {
        multiplier
            .round_dp_with_strategy(MULTIPLIER_SCALE, RoundingStrategy::MidpointAwayFromZero)
            .normalize()
    })
}

/// A purchasable scratch-card product
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Game {
    pub id: GameId,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub theme: Option<String>,
    /// Wager charged for one round
    pub price: Decimal,
    /// Advisory return-to-player percentage, display only
    pub target_rtp: Decimal,
    pub active: bool,
    /// Bumped on every administrative edit, keys the payout table cache
    pub revision: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One configured row of a game's payout table
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PrizeOutcome {
    pub id: PrizeId,
    pub game_id: GameId,
    pub prize_value: Decimal,
    pub probability: Decimal,
    /// Stored for display; recomputed from prize value and price when read
    pub multiplier: Decimal,
}

/// Result of resolving one draw against a payout table
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Outcome {
    pub prize_value: Decimal,
    pub multiplier: Decimal,
    pub is_winner: bool,
}

impl Outcome {
    /// Canonical losing outcome used when a sample falls past the configured mass
    pub const NO_PRIZE: Outcome = Outcome {
        prize_value: Decimal::ZERO,
        multiplier: Decimal::ZERO,
        is_winner: false,
    };
}

/// Player account; the balance is the only contended value on the hot path
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct User {
    pub id: UserId,
    pub name: String,
    pub balance: Decimal,
    pub created_at: DateTime<Utc>,
}

/// Kind of balance movement recorded in the ledger
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum LedgerKind {
    Deposit,
    Withdrawal,
    Prize,
    GameCost,
}

impl fmt::Display for LedgerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LedgerKind::Deposit => write!(f, "deposit"),
            LedgerKind::Withdrawal => write!(f, "withdrawal"),
            LedgerKind::Prize => write!(f, "prize"),
            LedgerKind::GameCost => write!(f, "game_cost"),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum LedgerStatus {
    Pending,
    Completed,
    Failed,
    Cancelled,
}

impl fmt::Display for LedgerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LedgerStatus::Pending => write!(f, "pending"),
            LedgerStatus::Completed => write!(f, "completed"),
            LedgerStatus::Failed => write!(f, "failed"),
            LedgerStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Append-only audit record of one balance movement
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LedgerEntry {
    pub id: LedgerEntryId,
    pub user_id: UserId,
    pub kind: LedgerKind,
    /// Always positive; the kind carries the direction
    pub amount: Decimal,
    pub status: LedgerStatus,
    #[serde(default)]
    pub description: Option<String>,
    /// Play that produced this entry, if any
    #[serde(default)]
    pub play_id: Option<PlayId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl LedgerEntry {
    pub fn new(
        id: LedgerEntryId,
        user_id: UserId,
        kind: LedgerKind,
        amount: Decimal,
        status: LedgerStatus,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            user_id,
            kind,
            amount,
            status,
            description: None,
            play_id: None,
            created_at: at,
            updated_at: at,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_play(mut self, play_id: PlayId) -> Self {
        self.play_id = Some(play_id);
        self
    }
}

/// Write-once history row for one executed play
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlayRecord {
    pub id: PlayId,
    pub user_id: UserId,
    pub game_id: GameId,
    pub wager: Decimal,
    pub prize: Decimal,
    pub is_winner: bool,
    pub ledger_entry_ids: Vec<LedgerEntryId>,
    pub played_at: DateTime<Utc>,
}

/// What a caller gets back from a settled play
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PlayResult {
    pub play_id: PlayId,
    pub is_winner: bool,
    pub prize_value: Decimal,
    pub multiplier: Decimal,
    pub new_balance: Decimal,
    pub ledger_entry_ids: Vec<LedgerEntryId>,
}
