//! Raspadinha server and operator tools

use clap::{Parser, Subcommand};
use raspadinha::{
    api::ApiServer,
    config::RaspadinhaConfig,
    games::random::SeededRandom,
    seed::seed_demo,
    simulation::simulate,
    Platform,
};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "raspadinha")]
#[command(about = "Scratch-card game settlement server", long_about = None)]
struct Cli {
    /// TOML configuration file; built-in defaults when omitted
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Use the development preset instead of the defaults
    #[arg(long, global = true)]
    dev: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP API
    Serve,

    /// Create demo games and a funded demo player
    Seed,

    /// Draw many outcomes from a game's payout table without touching balances
    Simulate {
        #[arg(long)]
        game_id: u64,

        #[arg(long, default_value = "100000")]
        plays: u64,

        #[arg(long, default_value = "42")]
        seed: u64,
    },
}

fn load_config(cli: &Cli) -> Result<RaspadinhaConfig, Box<dyn std::error::Error>> {
    let config = match (&cli.config, cli.dev) {
        (Some(path), _) => RaspadinhaConfig::load(path)?,
        (None, true) => RaspadinhaConfig::development(),
        (None, false) => RaspadinhaConfig::default(),
    };
    config.validate()?;
    Ok(config)
}

fn init_tracing(config: &RaspadinhaConfig) {
    let default_filter = format!(
        "raspadinha={},tower_http=info",
        config.monitoring.log_level.as_filter()
    );
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .init();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = load_config(&cli)?;
    init_tracing(&config);

    tracing::info!(data_directory = %config.storage.data_directory, "Opening database");
    let platform = Platform::open(&config)?;

    match cli.command {
        Command::Serve => {
            ApiServer::new(config, platform, ApiServer::admin_key_from_env())
                .run()
                .await?;
        }
        Command::Seed => {
            let summary = seed_demo(&platform).await?;
            for game in &summary.games {
                println!("game {:>4}  {:<24} price {}", game.id, game.name, game.price);
            }
            match summary.user {
                Some(user) => println!("user {:>4}  {:<24} balance {}", user.id, user.name, user.balance),
                None => println!("catalog already populated, nothing seeded"),
            }
        }
        Command::Simulate {
            game_id,
            plays,
            seed,
        } => {
            let details = platform.catalog.get_game(game_id).await?;
            let table = platform.engine.payout_table(&details.game).await?;
            let report = simulate(&table, plays, &mut SeededRandom::new(seed));
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }

    Ok(())
}
