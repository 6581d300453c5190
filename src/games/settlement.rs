//! Settlement Engine
//!
//! Executes one play as a single atomic unit against the player's balance:
//! debit the wager, draw an outcome, credit any prize and record the play.
//! Everything is staged in memory under the player's balance lock and lands
//! through one [`SettlementStore::commit_settlement`] call, so a failure at
//! any point before the commit leaves storage untouched.

use crate::config::SettlementConfig;
use crate::errors::{FailureKind, StorageError};
use crate::games::payout_table::{PayoutTable, PayoutTableError};
use crate::games::random::RandomSource;
use crate::games::types::{
    Game, GameId, LedgerEntry, LedgerKind, LedgerStatus, PlayRecord, PlayResult, User, UserId,
};
use crate::metrics::PlayMetrics;
use crate::store::{Changeset, Sequence, SharedStore};
use chrono::Utc;
use dashmap::DashMap;
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Reasons a play is rejected or fails
#[derive(Debug, Error)]
pub enum PlayError {
    #[error("Game {0} not found")]
    GameNotFound(GameId),

    #[error("User {0} not found")]
    UserNotFound(UserId),

    #[error("Game {0} is not available for play")]
    GameUnavailable(GameId),

    #[error("Game {game_id} is misconfigured: {source}")]
    GameMisconfigured {
        game_id: GameId,
        #[source]
        source: PayoutTableError,
    },

    #[error("Insufficient funds: balance {balance}, price {price}")]
    InsufficientFunds { balance: Decimal, price: Decimal },

    #[error("Game price changed from {expected} to {current}")]
    PriceChanged { expected: Decimal, current: Decimal },

    #[error("Crediting prize {prize} to balance {balance} exceeds the representable range")]
    BalanceOverflow { balance: Decimal, prize: Decimal },

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl PlayError {
    pub fn kind(&self) -> FailureKind {
        match self {
            PlayError::GameNotFound(_) | PlayError::UserNotFound(_) => FailureKind::NotFound,
            PlayError::GameUnavailable(_) => FailureKind::Unavailable,
            PlayError::GameMisconfigured { .. } => FailureKind::Misconfigured,
            PlayError::InsufficientFunds { .. } => FailureKind::InsufficientFunds,
            PlayError::PriceChanged { .. } => FailureKind::Invalid,
            PlayError::BalanceOverflow { .. } => FailureKind::Internal,
            PlayError::Storage(e) => e.kind(),
        }
    }
}

/// One play as requested by a caller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlayRequest {
    pub user_id: UserId,
    pub game_id: GameId,
    /// Price the caller was shown; the play fails instead of charging a different one
    pub expected_price: Option<Decimal>,
}

impl PlayRequest {
    pub fn new(user_id: UserId, game_id: GameId) -> Self {
        Self {
            user_id,
            game_id,
            expected_price: None,
        }
    }

    pub fn expecting_price(mut self, price: Decimal) -> Self {
        self.expected_price = Some(price);
        self
    }
}

pub struct SettlementEngine {
    store: SharedStore,
    /// Built tables per game, valid while the game's revision matches
    tables: DashMap<GameId, Arc<PayoutTable>>,
    lock_timeout: Duration,
    max_history_page: usize,
    metrics: Arc<PlayMetrics>,
}

impl SettlementEngine {
    pub fn new(store: SharedStore, config: &SettlementConfig, metrics: Arc<PlayMetrics>) -> Self {
        Self {
            store,
            tables: DashMap::new(),
            lock_timeout: Duration::from_millis(config.lock_timeout_ms),
            max_history_page: config.max_history_page,
            metrics,
        }
    }

    pub fn metrics(&self) -> &Arc<PlayMetrics> {
        &self.metrics
    }

    /// Play one round of `game_id` for `user_id` at the current price
    pub async fn play_once(
        &self,
        user_id: UserId,
        game_id: GameId,
        rng: &mut dyn RandomSource,
    ) -> Result<PlayResult, PlayError> {
        self.play(PlayRequest::new(user_id, game_id), rng).await
    }

    pub async fn play(
        &self,
        request: PlayRequest,
        rng: &mut dyn RandomSource,
    ) -> Result<PlayResult, PlayError> {
        let started = Instant::now();
        let result = self.settle(&request, rng).await;

        if let Err(e) = &result {
            let kind = e.kind();
            self.metrics.record_failure(kind, started.elapsed());
            if kind.is_transient() {
                tracing::warn!(
                    user_id = request.user_id,
                    game_id = request.game_id,
                    kind = %kind,
                    error = %e,
                    "Play failed, nothing was committed"
                );
            } else {
                tracing::debug!(
                    user_id = request.user_id,
                    game_id = request.game_id,
                    kind = %kind,
                    error = %e,
                    "Play rejected"
                );
            }
        }

        result
    }

    async fn settle(
        &self,
        request: &PlayRequest,
        rng: &mut dyn RandomSource,
    ) -> Result<PlayResult, PlayError> {
        let started = Instant::now();

        // Reject unknown users and unknown, inactive or misconfigured games
        // without taking a lock
        let game = self.playable_game(request.game_id).await?;
        self.payout_table(&game).await?;
        self.load_user(request.user_id).await?;

        let lock = self
            .store
            .lock_user(request.user_id, self.lock_timeout)
            .await?;

        // Price and table as of now; an edit since the pre-check wins
        let game = self.playable_game(request.game_id).await?;
        if let Some(expected) = request.expected_price {
            if expected != game.price {
                return Err(PlayError::PriceChanged {
                    expected,
                    current: game.price,
                });
            }
        }
        let table = self.payout_table(&game).await?;

        let mut user = self.load_user(request.user_id).await?;
        if user.balance < game.price {
            return Err(PlayError::InsufficientFunds {
                balance: user.balance,
                price: game.price,
            });
        }

        let now = Utc::now();
        let play_id = self.store.next_id(Sequence::Play);

        user.balance -= game.price;
        let mut ledger = vec![LedgerEntry::new(
            self.store.next_id(Sequence::Ledger),
            user.id,
            LedgerKind::GameCost,
            game.price,
            LedgerStatus::Completed,
            now,
        )
        .with_description(format!("Play on {}", game.name))
        .with_play(play_id)];

        let outcome = table.draw(rng.next_unit());
        if outcome.is_winner {
            user.balance = user.balance.checked_add(outcome.prize_value).ok_or(
                PlayError::BalanceOverflow {
                    balance: user.balance,
                    prize: outcome.prize_value,
                },
            )?;
            ledger.push(
                LedgerEntry::new(
                    self.store.next_id(Sequence::Ledger),
                    user.id,
                    LedgerKind::Prize,
                    outcome.prize_value,
                    LedgerStatus::Completed,
                    now,
                )
                .with_description(format!("Prize on {}", game.name))
                .with_play(play_id),
            );
        }

        let ledger_entry_ids: Vec<_> = ledger.iter().map(|entry| entry.id).collect();
        let record = PlayRecord {
            id: play_id,
            user_id: user.id,
            game_id: game.id,
            wager: game.price,
            prize: outcome.prize_value,
            is_winner: outcome.is_winner,
            ledger_entry_ids: ledger_entry_ids.clone(),
            played_at: now,
        };
        let new_balance = user.balance;

        self.store
            .commit_settlement(
                &lock,
                Changeset {
                    user,
                    ledger,
                    play: Some(record),
                },
            )
            .await?;
        drop(lock);

        let result = PlayResult {
            play_id,
            is_winner: outcome.is_winner,
            prize_value: outcome.prize_value,
            multiplier: outcome.multiplier,
            new_balance,
            ledger_entry_ids,
        };

        self.metrics
            .record_play(&result, game.price, started.elapsed());
        tracing::info!(
            user_id = request.user_id,
            game_id = game.id,
            play_id,
            wager = %game.price,
            prize = %result.prize_value,
            new_balance = %result.new_balance,
            "Play settled"
        );

        Ok(result)
    }

    async fn playable_game(&self, game_id: GameId) -> Result<Game, PlayError> {
        let game = self
            .store
            .load_game(game_id)
            .await?
            .ok_or(PlayError::GameNotFound(game_id))?;
        if !game.active {
            return Err(PlayError::GameUnavailable(game_id));
        }
        Ok(game)
    }

    /// Cached payout table for the game's current revision
    pub async fn payout_table(&self, game: &Game) -> Result<Arc<PayoutTable>, PlayError> {
        let cached = self.tables.get(&game.id).map(|entry| Arc::clone(entry.value()));
        if let Some(table) = cached.filter(|table| table.revision() == game.revision) {
            return Ok(table);
        }

        let rows = self.store.load_prize_outcomes(game.id).await?;
        let table = PayoutTable::build(game, &rows).map_err(|source| {
            PlayError::GameMisconfigured {
                game_id: game.id,
                source,
            }
        })?;
        let table = Arc::new(table);
        self.tables.insert(game.id, Arc::clone(&table));

        tracing::debug!(
            game_id = game.id,
            revision = game.revision,
            buckets = table.buckets().len(),
            "Loaded payout table"
        );
        Ok(table)
    }

    /// Most recent plays of a user, newest first
    pub async fn play_history(
        &self,
        user_id: UserId,
        limit: usize,
    ) -> Result<Vec<PlayRecord>, PlayError> {
        let limit = limit.clamp(1, self.max_history_page);
        Ok(self.store.user_plays(user_id, limit).await?)
    }

    pub async fn load_user(&self, user_id: UserId) -> Result<User, PlayError> {
        self.store
            .load_user(user_id)
            .await?
            .ok_or(PlayError::UserNotFound(user_id))
    }

    pub fn cached_tables(&self) -> usize {
        self.tables.len()
    }
}
