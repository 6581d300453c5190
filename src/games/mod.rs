pub mod catalog;
pub mod payout_table;
pub mod random;
pub mod settlement;
pub mod types;
pub mod wallet;

pub use catalog::{CatalogError, CatalogService, GameDetails, GameUpdate, NewGame, NewPrize};
pub use payout_table::{PayoutBucket, PayoutTable, PayoutTableError};
pub use random::{FixedSamples, RandomSource, SeededRandom, SystemRandom};
pub use settlement::{PlayError, PlayRequest, SettlementEngine};
pub use types::*;
pub use wallet::{Wallet, WalletError};
