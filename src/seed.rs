//! Demo catalog for local development

use crate::errors::RaspadinhaResult;
use crate::games::catalog::{NewGame, NewPrize};
use crate::games::types::{Game, User};
use crate::Platform;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

pub struct SeedSummary {
    pub games: Vec<Game>,
    pub user: Option<User>,
}

fn table(rows: &[(Decimal, Decimal)]) -> Vec<NewPrize> {
    rows.iter()
        .map(|&(prize_value, probability)| NewPrize {
            prize_value,
            probability,
        })
        .collect()
}

/// Create two demo games and a funded demo player, unless games already exist
pub async fn seed_demo(platform: &Platform) -> RaspadinhaResult<SeedSummary> {
    if !platform.catalog.list_games(false).await?.is_empty() {
        tracing::info!("Catalog already populated, skipping seed");
        return Ok(SeedSummary {
            games: Vec::new(),
            user: None,
        });
    }

    let demos = [
        (
            NewGame {
                name: "Raspadinha Dourada".to_string(),
                description: Some("Classic ten-real card".to_string()),
                theme: Some("gold".to_string()),
                price: dec!(10.00),
                target_rtp: dec!(90),
            },
            table(&[
                (dec!(0), dec!(0.60)),
                (dec!(20), dec!(0.25)),
                (dec!(50), dec!(0.10)),
                (dec!(100), dec!(0.05)),
            ]),
        ),
        (
            NewGame {
                name: "Trevo da Sorte".to_string(),
                description: Some("Cheap card with frequent small wins".to_string()),
                theme: Some("clover".to_string()),
                price: dec!(2.00),
                target_rtp: dec!(85),
            },
            table(&[
                (dec!(0), dec!(0.70)),
                (dec!(2), dec!(0.20)),
                (dec!(5), dec!(0.08)),
                (dec!(25), dec!(0.02)),
            ]),
        ),
    ];

    let mut games = Vec::with_capacity(demos.len());
    for (new_game, prizes) in demos {
        let game = platform.catalog.create_game(new_game).await?;
        let details = platform.catalog.replace_payout_table(game.id, prizes).await?;
        games.push(details.game);
    }

    let user = platform.wallet.register_user("demo").await?;
    platform
        .wallet
        .deposit(user.id, dec!(100.00), Some("Demo credit".to_string()))
        .await?;
    let user = platform.wallet.user(user.id).await?;

    tracing::info!(games = games.len(), user_id = user.id, "Seeded demo catalog");
    Ok(SeedSummary {
        games,
        user: Some(user),
    })
}
