//! Raspadinha - scratch-card game settlement core
//!
//! Plays are settled atomically against a player's balance: the wager is
//! debited, an outcome is drawn from the game's payout table, any prize is
//! credited, and ledger entries plus a play record are written in one
//! batch. Plays for the same player are serialized by a per-player lock;
//! different players settle in parallel.
//!
//! The HTTP layer in [`api`] is thin glue over [`games::SettlementEngine`],
//! [`games::Wallet`] and [`games::CatalogService`].

pub mod api;
pub mod config;
pub mod errors;
pub mod games;
pub mod metrics;
pub mod seed;
pub mod simulation;
pub mod storage;
pub mod store;

pub use config::RaspadinhaConfig;
pub use errors::{FailureKind, RaspadinhaError, RaspadinhaResult};
pub use games::{CatalogService, PayoutTable, SettlementEngine, Wallet};
pub use store::{RocksStore, SettlementStore, SharedStore};

use std::sync::Arc;

/// Every service of the platform wired onto one store
#[derive(Clone)]
pub struct Platform {
    pub engine: Arc<SettlementEngine>,
    pub wallet: Arc<Wallet>,
    pub catalog: Arc<CatalogService>,
    pub metrics: Arc<metrics::PlayMetrics>,
}

impl Platform {
    pub fn new(store: SharedStore, config: &RaspadinhaConfig) -> RaspadinhaResult<Self> {
        let metrics = Arc::new(metrics::PlayMetrics::new().map_err(|e| {
            errors::ConfigurationError::ValidationFailed(format!("Metrics registry: {}", e))
        })?);

        Ok(Self {
            engine: Arc::new(SettlementEngine::new(
                store.clone(),
                &config.settlement,
                metrics.clone(),
            )),
            wallet: Arc::new(Wallet::new(store.clone(), &config.settlement)),
            catalog: Arc::new(CatalogService::new(store)),
            metrics,
        })
    }

    /// Open the RocksDB store described by `config` and wire the services
    pub fn open(config: &RaspadinhaConfig) -> RaspadinhaResult<Self> {
        let storage = storage::OptimizedStorage::new_with_config(&config.storage)?;
        let store: SharedStore = Arc::new(RocksStore::open(storage)?);
        Self::new(store, config)
    }
}
