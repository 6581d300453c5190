//! Typed persistence for games, users, ledger entries and play records.
//!
//! [`SettlementStore`] is the single persistence seam the engine, wallet and
//! catalog are written against. [`RocksStore`] implements it on RocksDB:
//! records are JSON encoded, keys are a prefix followed by big-endian ids so
//! prefix scans come back in id order, and every balance mutation is one
//! atomic batch committed while the owner's balance lock is held.

use crate::{
    errors::{StorageError, StorageResult},
    games::types::{
        Game, GameId, LedgerEntry, LedgerEntryId, LedgerKind, LedgerStatus, PlayRecord,
        PrizeOutcome, User, UserId,
    },
    storage::{BatchOp, OptimizedStorage},
};
use async_trait::async_trait;
use dashmap::DashMap;
use serde::{de::DeserializeOwned, Serialize};
use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::sync::{Mutex, OwnedMutexGuard};

const GAME_PREFIX: &[u8] = b"game:";
const PRIZE_PREFIX: &[u8] = b"prize:";
const USER_PREFIX: &[u8] = b"user:";
const LEDGER_PREFIX: &[u8] = b"ledger:entry:";
const LEDGER_BY_USER_PREFIX: &[u8] = b"ledger:by_user:";
const PENDING_WITHDRAWAL_PREFIX: &[u8] = b"ledger:pending_withdrawal:";
const PLAY_PREFIX: &[u8] = b"play:record:";
const PLAY_BY_USER_PREFIX: &[u8] = b"play:by_user:";

fn id_key(prefix: &[u8], id: u64) -> Vec<u8> {
    let mut key = Vec::with_capacity(prefix.len() + 8);
    key.extend_from_slice(prefix);
    key.extend_from_slice(&id.to_be_bytes());
    key
}

fn pair_key(prefix: &[u8], owner: u64, id: u64) -> Vec<u8> {
    let mut key = Vec::with_capacity(prefix.len() + 16);
    key.extend_from_slice(prefix);
    key.extend_from_slice(&owner.to_be_bytes());
    key.extend_from_slice(&id.to_be_bytes());
    key
}

/// Trailing big-endian id of a key built by [`id_key`] or [`pair_key`]
fn trailing_id(key: &[u8]) -> Option<u64> {
    let start = key.len().checked_sub(8)?;
    let bytes: [u8; 8] = key[start..].try_into().ok()?;
    Some(u64::from_be_bytes(bytes))
}

fn encode<T: Serialize>(what: &str, id: u64, record: &T) -> StorageResult<Vec<u8>> {
    serde_json::to_vec(record).map_err(|e| {
        StorageError::WriteFailed(format!("Failed to encode {} {}: {}", what, id, e))
    })
}

fn decode<T: DeserializeOwned>(what: &str, key: &[u8], bytes: &[u8]) -> StorageResult<T> {
    serde_json::from_slice(bytes).map_err(|e| {
        StorageError::CorruptedData(format!(
            "Failed to decode {} at {:?}: {}",
            what,
            trailing_id(key),
            e
        ))
    })
}

type LockTable = DashMap<UserId, Arc<Mutex<()>>>;

/// Drop the user's entry unless another task still holds or awaits it
fn forget_idle(locks: &LockTable, user_id: UserId) {
    locks.remove_if(&user_id, |_, mutex| Arc::strong_count(mutex) == 1);
}

/// Exclusive hold on one user's balance row.
///
/// Dropping the lock releases it; anything not committed through
/// [`SettlementStore::commit_settlement`] before that is discarded.
pub struct UserLock {
    user_id: UserId,
    guard: Option<OwnedMutexGuard<()>>,
    locks: Arc<LockTable>,
}

impl UserLock {
    pub fn user_id(&self) -> UserId {
        self.user_id
    }
}

impl Drop for UserLock {
    fn drop(&mut self) {
        drop(self.guard.take());
        forget_idle(&self.locks, self.user_id);
    }
}

/// Per-user lock table; users never contend with each other.
///
/// Entries live only while some task holds or awaits the user's lock.
#[derive(Default)]
pub struct UserLocks {
    locks: Arc<LockTable>,
}

impl UserLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait at most `wait` for the user's lock
    pub async fn acquire(&self, user_id: UserId, wait: Duration) -> StorageResult<UserLock> {
        let mutex = self
            .locks
            .entry(user_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();

        match tokio::time::timeout(wait, mutex.lock_owned()).await {
            Ok(guard) => Ok(UserLock {
                user_id,
                guard: Some(guard),
                locks: Arc::clone(&self.locks),
            }),
            Err(_) => {
                forget_idle(&self.locks, user_id);
                tracing::warn!(user_id, waited_ms = wait.as_millis() as u64, "Balance lock wait expired");
                Err(StorageError::LockTimeout {
                    user_id,
                    waited_ms: wait.as_millis() as u64,
                })
            }
        }
    }

    pub fn tracked_users(&self) -> usize {
        self.locks.len()
    }
}

/// Everything one balance-affecting operation writes, applied atomically
#[derive(Debug, Clone)]
pub struct Changeset {
    /// New state of the locked user's row
    pub user: User,
    /// New entries, or updated entries for a status transition
    pub ledger: Vec<LedgerEntry>,
    pub play: Option<PlayRecord>,
}

/// Catalog edits applied atomically
#[derive(Debug, Clone, Default)]
pub struct CatalogChanges {
    pub game: Option<Game>,
    /// Replaces every stored prize row of the game
    pub prize_table: Option<(GameId, Vec<PrizeOutcome>)>,
}

/// Kinds of ids handed out by the store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sequence {
    Game,
    Prize,
    User,
    Ledger,
    Play,
}

/// Persistence interface behind the settlement engine, wallet and catalog
#[async_trait]
pub trait SettlementStore: Send + Sync {
    async fn load_game(&self, game_id: GameId) -> StorageResult<Option<Game>>;

    async fn list_games(&self) -> StorageResult<Vec<Game>>;

    /// Rows in id order
    async fn load_prize_outcomes(&self, game_id: GameId) -> StorageResult<Vec<PrizeOutcome>>;

    async fn load_user(&self, user_id: UserId) -> StorageResult<Option<User>>;

    async fn insert_user(&self, user: &User) -> StorageResult<()>;

    async fn load_ledger_entry(&self, entry_id: LedgerEntryId)
        -> StorageResult<Option<LedgerEntry>>;

    /// Newest first
    async fn user_ledger(&self, user_id: UserId, limit: usize) -> StorageResult<Vec<LedgerEntry>>;

    /// Newest first
    async fn user_plays(&self, user_id: UserId, limit: usize) -> StorageResult<Vec<PlayRecord>>;

    /// Pending withdrawals of every user, oldest first
    async fn pending_withdrawals(&self, limit: usize) -> StorageResult<Vec<LedgerEntry>>;

    /// Exclusive balance lock for one user, bounded by `wait`
    async fn lock_user(&self, user_id: UserId, wait: Duration) -> StorageResult<UserLock>;

    fn next_id(&self, sequence: Sequence) -> u64;

    /// Atomically apply a balance mutation owned by the locked user
    async fn commit_settlement(&self, lock: &UserLock, changeset: Changeset) -> StorageResult<()>;

    async fn commit_catalog(&self, changes: CatalogChanges) -> StorageResult<()>;
}

struct IdSequences {
    game: AtomicU64,
    prize: AtomicU64,
    user: AtomicU64,
    ledger: AtomicU64,
    play: AtomicU64,
}

impl IdSequences {
    fn get(&self, sequence: Sequence) -> &AtomicU64 {
        match sequence {
            Sequence::Game => &self.game,
            Sequence::Prize => &self.prize,
            Sequence::User => &self.user,
            Sequence::Ledger => &self.ledger,
            Sequence::Play => &self.play,
        }
    }
}

/// RocksDB-backed [`SettlementStore`]
pub struct RocksStore {
    storage: OptimizedStorage,
    locks: UserLocks,
    sequences: IdSequences,
}

impl RocksStore {
    /// Wrap an opened database, recovering id sequences from existing keys
    pub fn open(storage: OptimizedStorage) -> StorageResult<Self> {
        let last = |prefix: &[u8]| -> StorageResult<u64> {
            Ok(storage
                .last_key_with_prefix(prefix)?
                .and_then(|key| trailing_id(&key))
                .unwrap_or(0))
        };

        // Prize keys sort by game first, so the highest id needs a full pass
        let max_prize = storage
            .scan_prefix(PRIZE_PREFIX, None, usize::MAX)?
            .iter()
            .filter_map(|(key, _)| trailing_id(key))
            .max()
            .unwrap_or(0);

        let sequences = IdSequences {
            game: AtomicU64::new(last(GAME_PREFIX)?),
            prize: AtomicU64::new(max_prize),
            user: AtomicU64::new(last(USER_PREFIX)?),
            ledger: AtomicU64::new(last(LEDGER_PREFIX)?),
            play: AtomicU64::new(last(PLAY_PREFIX)?),
        };

        tracing::debug!(
            games = sequences.game.load(Ordering::SeqCst),
            users = sequences.user.load(Ordering::SeqCst),
            ledger_entries = sequences.ledger.load(Ordering::SeqCst),
            plays = sequences.play.load(Ordering::SeqCst),
            "Recovered id sequences"
        );

        Ok(Self {
            storage,
            locks: UserLocks::new(),
            sequences,
        })
    }

    pub fn raw_storage(&self) -> &OptimizedStorage {
        &self.storage
    }

    /// Users whose balance lock is currently held or awaited
    pub fn tracked_users(&self) -> usize {
        self.locks.tracked_users()
    }

    fn get_record<T: DeserializeOwned>(&self, what: &str, key: &[u8]) -> StorageResult<Option<T>> {
        match self.storage.get(key)? {
            Some(bytes) => decode(what, key, &bytes).map(Some),
            None => Ok(None),
        }
    }

    /// Resolve the newest ids from a per-user index into full records
    fn newest_by_user<T: DeserializeOwned>(
        &self,
        index_prefix: &[u8],
        record_prefix: &[u8],
        what: &str,
        user_id: UserId,
        limit: usize,
    ) -> StorageResult<Vec<T>> {
        let prefix = id_key(index_prefix, user_id);
        let mut records = Vec::new();
        for (key, _) in self.storage.scan_prefix_rev(&prefix, limit)? {
            let Some(id) = trailing_id(&key) else {
                continue;
            };
            match self.get_record(what, &id_key(record_prefix, id))? {
                Some(record) => records.push(record),
                None => {
                    tracing::warn!(user_id, id, "Index points at missing {}", what);
                }
            }
        }
        Ok(records)
    }
}

#[async_trait]
impl SettlementStore for RocksStore {
    async fn load_game(&self, game_id: GameId) -> StorageResult<Option<Game>> {
        self.get_record("game", &id_key(GAME_PREFIX, game_id))
    }

    async fn list_games(&self) -> StorageResult<Vec<Game>> {
        self.storage
            .scan_prefix(GAME_PREFIX, None, usize::MAX)?
            .iter()
            .map(|(key, bytes)| decode("game", key, bytes))
            .collect()
    }

    async fn load_prize_outcomes(&self, game_id: GameId) -> StorageResult<Vec<PrizeOutcome>> {
        self.storage
            .scan_prefix(&id_key(PRIZE_PREFIX, game_id), None, usize::MAX)?
            .iter()
            .map(|(key, bytes)| decode("prize", key, bytes))
            .collect()
    }

    async fn load_user(&self, user_id: UserId) -> StorageResult<Option<User>> {
        self.get_record("user", &id_key(USER_PREFIX, user_id))
    }

    async fn insert_user(&self, user: &User) -> StorageResult<()> {
        let key = id_key(USER_PREFIX, user.id);
        if self.storage.get(&key)?.is_some() {
            return Err(StorageError::WriteFailed(format!("User {} already exists", user.id)));
        }
        self.storage.put(&key, &encode("user", user.id, user)?)
    }

    async fn load_ledger_entry(
        &self,
        entry_id: LedgerEntryId,
    ) -> StorageResult<Option<LedgerEntry>> {
        self.get_record("ledger entry", &id_key(LEDGER_PREFIX, entry_id))
    }

    async fn user_ledger(&self, user_id: UserId, limit: usize) -> StorageResult<Vec<LedgerEntry>> {
        self.newest_by_user(LEDGER_BY_USER_PREFIX, LEDGER_PREFIX, "ledger entry", user_id, limit)
    }

    async fn user_plays(&self, user_id: UserId, limit: usize) -> StorageResult<Vec<PlayRecord>> {
        self.newest_by_user(PLAY_BY_USER_PREFIX, PLAY_PREFIX, "play record", user_id, limit)
    }

    async fn pending_withdrawals(&self, limit: usize) -> StorageResult<Vec<LedgerEntry>> {
        let mut entries = Vec::new();
        for (key, _) in self.storage.scan_prefix(PENDING_WITHDRAWAL_PREFIX, None, limit)? {
            let Some(id) = trailing_id(&key) else {
                continue;
            };
            match self.load_ledger_entry(id).await? {
                Some(entry) => entries.push(entry),
                None => tracing::warn!(entry_id = id, "Pending index points at missing ledger entry"),
            }
        }
        Ok(entries)
    }

    async fn lock_user(&self, user_id: UserId, wait: Duration) -> StorageResult<UserLock> {
        self.locks.acquire(user_id, wait).await
    }

    fn next_id(&self, sequence: Sequence) -> u64 {
        self.sequences.get(sequence).fetch_add(1, Ordering::SeqCst) + 1
    }

    async fn commit_settlement(&self, lock: &UserLock, changeset: Changeset) -> StorageResult<()> {
        let owner = lock.user_id();
        let foreign = changeset.user.id != owner
            || changeset.ledger.iter().any(|entry| entry.user_id != owner)
            || changeset.play.as_ref().map_or(false, |play| play.user_id != owner);
        if foreign {
            return Err(StorageError::WriteFailed(format!(
                "Changeset touches rows outside the balance lock of user {}",
                owner
            )));
        }

        let mut ops = Vec::with_capacity(2 + changeset.ledger.len() * 2);
        ops.push(BatchOp::Put(
            id_key(USER_PREFIX, owner),
            encode("user", owner, &changeset.user)?,
        ));
        for entry in &changeset.ledger {
            ops.push(BatchOp::Put(
                id_key(LEDGER_PREFIX, entry.id),
                encode("ledger entry", entry.id, entry)?,
            ));
            ops.push(BatchOp::Put(pair_key(LEDGER_BY_USER_PREFIX, owner, entry.id), Vec::new()));
            if entry.kind == LedgerKind::Withdrawal {
                let pending_key = id_key(PENDING_WITHDRAWAL_PREFIX, entry.id);
                ops.push(match entry.status {
                    LedgerStatus::Pending => BatchOp::Put(pending_key, Vec::new()),
                    _ => BatchOp::Delete(pending_key),
                });
            }
        }
        if let Some(play) = &changeset.play {
            ops.push(BatchOp::Put(id_key(PLAY_PREFIX, play.id), encode("play record", play.id, play)?));
            ops.push(BatchOp::Put(pair_key(PLAY_BY_USER_PREFIX, owner, play.id), Vec::new()));
        }

        self.storage.apply_batch(&ops)?;

        tracing::debug!(
            user_id = owner,
            ledger_entries = changeset.ledger.len(),
            play_id = changeset.play.as_ref().map(|p| p.id),
            "Committed settlement changeset"
        );
        Ok(())
    }

    async fn commit_catalog(&self, changes: CatalogChanges) -> StorageResult<()> {
        let mut ops = Vec::new();

        if let Some(game) = &changes.game {
            ops.push(BatchOp::Put(id_key(GAME_PREFIX, game.id), encode("game", game.id, game)?));
        }

        if let Some((game_id, rows)) = &changes.prize_table {
            let table_prefix = id_key(PRIZE_PREFIX, *game_id);
            for (key, _) in self.storage.scan_prefix(&table_prefix, None, usize::MAX)? {
                ops.push(BatchOp::Delete(key));
            }
            for row in rows {
                if row.game_id != *game_id {
                    return Err(StorageError::WriteFailed(format!(
                        "Prize {} belongs to game {}, not {}",
                        row.id, row.game_id, game_id
                    )));
                }
                // Deletes above and puts here may share a key; the later put wins
                ops.push(BatchOp::Put(
                    pair_key(PRIZE_PREFIX, *game_id, row.id),
                    encode("prize", row.id, row)?,
                ));
            }
        }

        self.storage.apply_batch(&ops)
    }
}

pub type SharedStore = Arc<dyn SettlementStore>;
