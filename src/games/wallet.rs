//! Wallet flows outside of play: registration, deposits and withdrawals.
//!
//! They mutate the same balance row and ledger as the settlement engine
//! and therefore go through the same per-user lock and atomic changeset.

use crate::config::SettlementConfig;
use crate::errors::{FailureKind, StorageError};
use crate::games::types::{
    round_money, LedgerEntry, LedgerEntryId, LedgerKind, LedgerStatus, User, UserId, MAX_AMOUNT,
};
use crate::store::{Changeset, Sequence, SharedStore};
use chrono::Utc;
use rust_decimal::Decimal;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WalletError {
    #[error("User {0} not found")]
    UserNotFound(UserId),

    #[error("Ledger entry {0} not found")]
    EntryNotFound(LedgerEntryId),

    #[error("User name must not be empty")]
    EmptyName,

    #[error("Amount {0} must be positive, within the accepted maximum and have at most two decimal places")]
    InvalidAmount(Decimal),

    #[error("Crediting {amount} to balance {balance} exceeds the representable range")]
    BalanceLimit { balance: Decimal, amount: Decimal },

    #[error("Insufficient funds: balance {balance}, requested {amount}")]
    InsufficientFunds { balance: Decimal, amount: Decimal },

    #[error("Ledger entry {entry_id} is a {status} {kind}, not a pending withdrawal")]
    InvalidTransition {
        entry_id: LedgerEntryId,
        kind: LedgerKind,
        status: LedgerStatus,
    },

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl WalletError {
    pub fn kind(&self) -> FailureKind {
        match self {
            WalletError::UserNotFound(_) | WalletError::EntryNotFound(_) => FailureKind::NotFound,
            WalletError::EmptyName
            | WalletError::InvalidAmount(_)
            | WalletError::BalanceLimit { .. }
            | WalletError::InvalidTransition { .. } => FailureKind::Invalid,
            WalletError::InsufficientFunds { .. } => FailureKind::InsufficientFunds,
            WalletError::Storage(e) => e.kind(),
        }
    }
}

fn credit(balance: Decimal, amount: Decimal) -> Result<Decimal, WalletError> {
    balance
        .checked_add(amount)
        .ok_or(WalletError::BalanceLimit { balance, amount })
}

fn checked_amount(amount: Decimal) -> Result<Decimal, WalletError> {
    if amount <= Decimal::ZERO || amount > MAX_AMOUNT || round_money(amount) != amount {
        return Err(WalletError::InvalidAmount(amount));
    }
    Ok(amount)
}

pub struct Wallet {
    store: SharedStore,
    lock_timeout: Duration,
    max_history_page: usize,
}

impl Wallet {
    pub fn new(store: SharedStore, config: &SettlementConfig) -> Self {
        Self {
            store,
            lock_timeout: Duration::from_millis(config.lock_timeout_ms),
            max_history_page: config.max_history_page,
        }
    }

    /// Create a player account with an empty balance
    pub async fn register_user(&self, name: &str) -> Result<User, WalletError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(WalletError::EmptyName);
        }

        let user = User {
            id: self.store.next_id(Sequence::User),
            name: name.to_string(),
            balance: Decimal::ZERO,
            created_at: Utc::now(),
        };
        self.store.insert_user(&user).await?;

        tracing::info!(user_id = user.id, "Registered user");
        Ok(user)
    }

    pub async fn balance(&self, user_id: UserId) -> Result<Decimal, WalletError> {
        Ok(self.user(user_id).await?.balance)
    }

    pub async fn user(&self, user_id: UserId) -> Result<User, WalletError> {
        self.store
            .load_user(user_id)
            .await?
            .ok_or(WalletError::UserNotFound(user_id))
    }

    /// Credit the balance and record a completed deposit
    pub async fn deposit(
        &self,
        user_id: UserId,
        amount: Decimal,
        description: Option<String>,
    ) -> Result<LedgerEntry, WalletError> {
        let amount = checked_amount(amount)?;
        // Unknown ids never reach the lock table
        self.user(user_id).await?;
        let lock = self.store.lock_user(user_id, self.lock_timeout).await?;
        let mut user = self.user(user_id).await?;

        user.balance = credit(user.balance, amount)?;
        let mut entry = LedgerEntry::new(
            self.store.next_id(Sequence::Ledger),
            user_id,
            LedgerKind::Deposit,
            amount,
            LedgerStatus::Completed,
            Utc::now(),
        );
        entry.description = description;

        let new_balance = user.balance;
        self.store
            .commit_settlement(
                &lock,
                Changeset {
                    user,
                    ledger: vec![entry.clone()],
                    play: None,
                },
            )
            .await?;

        tracing::info!(user_id, entry_id = entry.id, %amount, %new_balance, "Deposit credited");
        Ok(entry)
    }

    /// Debit the balance now and leave a pending withdrawal for an operator
    pub async fn request_withdrawal(
        &self,
        user_id: UserId,
        amount: Decimal,
    ) -> Result<LedgerEntry, WalletError> {
        let amount = checked_amount(amount)?;
        self.user(user_id).await?;
        let lock = self.store.lock_user(user_id, self.lock_timeout).await?;
        let mut user = self.user(user_id).await?;

        if user.balance < amount {
            return Err(WalletError::InsufficientFunds {
                balance: user.balance,
                amount,
            });
        }

        user.balance -= amount;
        let entry = LedgerEntry::new(
            self.store.next_id(Sequence::Ledger),
            user_id,
            LedgerKind::Withdrawal,
            amount,
            LedgerStatus::Pending,
            Utc::now(),
        );

        self.store
            .commit_settlement(
                &lock,
                Changeset {
                    user,
                    ledger: vec![entry.clone()],
                    play: None,
                },
            )
            .await?;

        tracing::info!(user_id, entry_id = entry.id, %amount, "Withdrawal requested");
        Ok(entry)
    }

    /// Approve (pending → completed) or cancel (pending → cancelled, refunded)
    /// a withdrawal
    pub async fn resolve_withdrawal(
        &self,
        entry_id: LedgerEntryId,
        approve: bool,
    ) -> Result<LedgerEntry, WalletError> {
        let owner = self
            .store
            .load_ledger_entry(entry_id)
            .await?
            .ok_or(WalletError::EntryNotFound(entry_id))?
            .user_id;

        let lock = self.store.lock_user(owner, self.lock_timeout).await?;

        // Another operator may have resolved it while we waited
        let mut entry = self
            .store
            .load_ledger_entry(entry_id)
            .await?
            .ok_or(WalletError::EntryNotFound(entry_id))?;
        if entry.kind != LedgerKind::Withdrawal || entry.status != LedgerStatus::Pending {
            return Err(WalletError::InvalidTransition {
                entry_id,
                kind: entry.kind,
                status: entry.status,
            });
        }

        let mut user = self.user(owner).await?;
        entry.updated_at = Utc::now();
        if approve {
            entry.status = LedgerStatus::Completed;
        } else {
            entry.status = LedgerStatus::Cancelled;
            user.balance = credit(user.balance, entry.amount)?;
        }

        self.store
            .commit_settlement(
                &lock,
                Changeset {
                    user,
                    ledger: vec![entry.clone()],
                    play: None,
                },
            )
            .await?;

        tracing::info!(
            user_id = owner,
            entry_id,
            status = %entry.status,
            "Withdrawal resolved"
        );
        Ok(entry)
    }

    /// Most recent ledger entries of a user, newest first
    pub async fn ledger_history(
        &self,
        user_id: UserId,
        limit: usize,
    ) -> Result<Vec<LedgerEntry>, WalletError> {
        let limit = limit.clamp(1, self.max_history_page);
        Ok(self.store.user_ledger(user_id, limit).await?)
    }

    /// Withdrawals waiting for an operator, oldest first
    pub async fn pending_withdrawals(&self, limit: usize) -> Result<Vec<LedgerEntry>, WalletError> {
        let limit = limit.clamp(1, self.max_history_page);
        Ok(self.store.pending_withdrawals(limit).await?)
    }
}
