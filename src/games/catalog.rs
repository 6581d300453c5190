//! Game catalog administration
//!
//! Creates and edits games and their payout tables. Every edit bumps the
//! game's revision, which invalidates the settlement engine's cached table
//! on the next play. Plays already past their table lookup finish with the
//! table they loaded.

use crate::errors::{FailureKind, StorageError};
use crate::games::payout_table::{PayoutTable, PayoutTableError};
use crate::games::types::{
    multiplier_for, round_money, Game, GameId, PrizeOutcome, MAX_AMOUNT, PROBABILITY_SCALE,
};
use crate::store::{CatalogChanges, Sequence, SharedStore};
use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Mutex;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Game {0} not found")]
    GameNotFound(GameId),

    #[error("Invalid game: {0}")]
    InvalidGame(String),

    #[error("Invalid payout table: {0}")]
    InvalidPayoutTable(#[from] PayoutTableError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl CatalogError {
    pub fn kind(&self) -> FailureKind {
        match self {
            CatalogError::GameNotFound(_) => FailureKind::NotFound,
            CatalogError::InvalidGame(_) | CatalogError::InvalidPayoutTable(_) => {
                FailureKind::Invalid
            }
            CatalogError::Storage(e) => e.kind(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewGame {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub theme: Option<String>,
    pub price: Decimal,
    pub target_rtp: Decimal,
}

/// Partial edit; absent fields are left alone
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GameUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub theme: Option<String>,
    pub price: Option<Decimal>,
    pub target_rtp: Option<Decimal>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewPrize {
    pub prize_value: Decimal,
    pub probability: Decimal,
}

/// A game with its payout table and the figures derived from it
#[derive(Debug, Clone, Serialize)]
pub struct GameDetails {
    pub game: Game,
    pub prizes: Vec<PrizeOutcome>,
    /// `None` while the game has no playable table
    pub expected_rtp: Option<Decimal>,
    pub win_probability: Option<Decimal>,
}

fn check_name(name: &str) -> Result<String, CatalogError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(CatalogError::InvalidGame("name must not be empty".to_string()));
    }
    Ok(name.to_string())
}

fn check_price(price: Decimal) -> Result<Decimal, CatalogError> {
    if price <= Decimal::ZERO || price > MAX_AMOUNT || round_money(price) != price {
        return Err(CatalogError::InvalidGame(format!(
            "price {} must be positive, at most {} and have at most two decimal places",
            price, MAX_AMOUNT
        )));
    }
    Ok(price)
}

fn display_multiplier(prize_value: Decimal, price: Decimal) -> Result<Decimal, CatalogError> {
    multiplier_for(prize_value, price).ok_or_else(|| {
        CatalogError::InvalidGame(format!(
            "prize value {} is out of range for price {}",
            prize_value, price
        ))
    })
}

fn check_rtp(rtp: Decimal) -> Result<Decimal, CatalogError> {
    if rtp < Decimal::ZERO || rtp > Decimal::ONE_HUNDRED {
        return Err(CatalogError::InvalidGame(format!(
            "target RTP {} must be within 0..=100",
            rtp
        )));
    }
    Ok(rtp)
}

pub struct CatalogService {
    store: SharedStore,
    /// Serializes admin writes so revisions never go backwards
    writes: Mutex<()>,
}

impl CatalogService {
    pub fn new(store: SharedStore) -> Self {
        Self {
            store,
            writes: Mutex::new(()),
        }
    }

    pub async fn create_game(&self, new_game: NewGame) -> Result<Game, CatalogError> {
        let now = Utc::now();
        let mut game = Game {
            id: 0,
            name: check_name(&new_game.name)?,
            description: new_game.description,
            theme: new_game.theme,
            price: check_price(new_game.price)?,
            target_rtp: check_rtp(new_game.target_rtp)?,
            active: true,
            revision: 1,
            created_at: now,
            updated_at: now,
        };

        let _guard = self.writes.lock().await;
        game.id = self.store.next_id(Sequence::Game);
        self.store
            .commit_catalog(CatalogChanges {
                game: Some(game.clone()),
                prize_table: None,
            })
            .await?;

        tracing::info!(game_id = game.id, name = %game.name, price = %game.price, "Created game");
        Ok(game)
    }

    pub async fn update_game(&self, game_id: GameId, update: GameUpdate) -> Result<Game, CatalogError> {
        let _guard = self.writes.lock().await;
        let mut game = self.load(game_id).await?;

        if let Some(name) = &update.name {
            game.name = check_name(name)?;
        }
        if update.description.is_some() {
            game.description = update.description;
        }
        if update.theme.is_some() {
            game.theme = update.theme;
        }
        if let Some(rtp) = update.target_rtp {
            game.target_rtp = check_rtp(rtp)?;
        }

        // Stored multipliers follow the price
        let mut prize_table = None;
        if let Some(price) = update.price {
            let price = check_price(price)?;
            if price != game.price {
                game.price = price;
                let mut rows = self.store.load_prize_outcomes(game_id).await?;
                for row in &mut rows {
                    row.multiplier = display_multiplier(row.prize_value, price)?;
                }
                prize_table = Some((game_id, rows));
            }
        }

        game.revision += 1;
        game.updated_at = Utc::now();
        self.store
            .commit_catalog(CatalogChanges {
                game: Some(game.clone()),
                prize_table,
            })
            .await?;

        tracing::info!(game_id, revision = game.revision, "Updated game");
        Ok(game)
    }

    pub async fn set_active(&self, game_id: GameId, active: bool) -> Result<Game, CatalogError> {
        let _guard = self.writes.lock().await;
        let mut game = self.load(game_id).await?;

        game.active = active;
        game.revision += 1;
        game.updated_at = Utc::now();
        self.store
            .commit_catalog(CatalogChanges {
                game: Some(game.clone()),
                prize_table: None,
            })
            .await?;

        tracing::info!(game_id, active, "Changed game availability");
        Ok(game)
    }

    /// Validate and store a complete new payout table for a game
    pub async fn replace_payout_table(
        &self,
        game_id: GameId,
        prizes: Vec<NewPrize>,
    ) -> Result<GameDetails, CatalogError> {
        let _guard = self.writes.lock().await;
        let mut game = self.load(game_id).await?;
        game.revision += 1;
        game.updated_at = Utc::now();

        let mut rows = Vec::with_capacity(prizes.len());
        for prize in prizes {
            let id = self.store.next_id(Sequence::Prize);
            if prize.probability.normalize().scale() > PROBABILITY_SCALE {
                return Err(PayoutTableError::ProbabilityPrecision {
                    prize_id: id,
                    probability: prize.probability,
                    max_scale: PROBABILITY_SCALE,
                }
                .into());
            }
            if prize.prize_value > MAX_AMOUNT {
                return Err(PayoutTableError::PrizeTooLarge {
                    prize_id: id,
                    prize_value: prize.prize_value,
                }
                .into());
            }
            if prize.prize_value >= Decimal::ZERO && round_money(prize.prize_value) != prize.prize_value {
                return Err(CatalogError::InvalidGame(format!(
                    "prize value {} has more than two decimal places",
                    prize.prize_value
                )));
            }
            rows.push(PrizeOutcome {
                id,
                game_id,
                prize_value: prize.prize_value,
                probability: prize.probability,
                multiplier: display_multiplier(prize.prize_value, game.price)?,
            });
        }

        let table = PayoutTable::build(&game, &rows)?;
        table.validate()?;

        self.store
            .commit_catalog(CatalogChanges {
                game: Some(game.clone()),
                prize_table: Some((game_id, rows.clone())),
            })
            .await?;

        tracing::info!(
            game_id,
            revision = game.revision,
            rows = rows.len(),
            expected_rtp = %table.expected_rtp(),
            "Replaced payout table"
        );

        Ok(GameDetails {
            expected_rtp: Some(table.expected_rtp()),
            win_probability: Some(table.win_probability()),
            game,
            prizes: rows,
        })
    }

    pub async fn list_games(&self, active_only: bool) -> Result<Vec<Game>, CatalogError> {
        let mut games = self.store.list_games().await?;
        if active_only {
            games.retain(|game| game.active);
        }
        Ok(games)
    }

    pub async fn get_game(&self, game_id: GameId) -> Result<GameDetails, CatalogError> {
        let game = self.load(game_id).await?;
        let prizes = self.store.load_prize_outcomes(game_id).await?;

        let table = PayoutTable::build(&game, &prizes).ok();
        Ok(GameDetails {
            expected_rtp: table.as_ref().map(PayoutTable::expected_rtp),
            win_probability: table.as_ref().map(PayoutTable::win_probability),
            game,
            prizes,
        })
    }

    async fn load(&self, game_id: GameId) -> Result<Game, CatalogError> {
        self.store
            .load_game(game_id)
            .await?
            .ok_or(CatalogError::GameNotFound(game_id))
    }
}
