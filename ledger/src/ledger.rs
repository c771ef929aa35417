//! The stake ledger.
//!
//! Balances are cached per account behind an async mutex; the journal is the
//! source of truth and can be replayed to verify every cached balance.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use tracing::{debug, info, warn};

use crate::batch::{LedgerBatch, Staging};
use crate::journal::Journal;
use crate::types::{
    Account, AccountKind, AccountRef, Balance, Standing, Transaction, TransactionKind, TxLinks,
    DEFAULT_TRUST_SCORE,
};

/// Error types for ledger operations.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LedgerError {
    /// Available credits would go negative
    #[error("Insufficient funds in {account}: requested {requested}, available {available}")]
    InsufficientFunds {
        account: AccountRef,
        requested: u64,
        available: u64,
    },

    /// Staked credits would go negative
    #[error("Insufficient stake in {account}: requested {requested}, staked {staked}")]
    InsufficientStake {
        account: AccountRef,
        requested: u64,
        staked: u64,
    },

    /// Account was never opened
    #[error("Account not found: {0}")]
    AccountNotFound(AccountRef),

    /// Arithmetic overflow
    #[error("Balance overflow")]
    Overflow,

    /// Cached balance disagrees with the journal
    #[error("Ledger inconsistent for {account}: journal {journal:?}, cached {cached:?}")]
    Inconsistent {
        account: AccountRef,
        journal: Balance,
        cached: Balance,
    },
}

/// Where released stake goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StakeDestination {
    /// Back to the owner's available credits
    Owner,
    /// To another account's available credits (forfeiture)
    Account(AccountRef),
}

/// Result of a committed batch.
#[derive(Debug, Clone, Default)]
pub struct Receipt {
    pub batch_id: String,
    pub transactions: Vec<Transaction>,
}

impl Receipt {
    /// Balance of an account after the batch, if the batch touched its credits.
    pub fn balance_of(&self, account: &AccountRef) -> Option<Balance> {
        self.transactions
            .iter()
            .rev()
            .find(|t| &t.account == account)
            .map(|t| t.balance_after)
    }
}

/// Single ledger of record.
pub struct Ledger {
    accounts: DashMap<AccountRef, Arc<Mutex<Account>>>,
    journal: RwLock<Journal>,
    default_trust: f64,
}

impl Ledger {
    /// Create an empty ledger holding only the treasury account.
    pub fn new() -> Self {
        Self::with_default_trust(DEFAULT_TRUST_SCORE)
    }

    /// Create with a custom starting trust score for new accounts.
    pub fn with_default_trust(default_trust: f64) -> Self {
        let ledger = Self {
            accounts: DashMap::new(),
            journal: RwLock::new(Journal::new()),
            default_trust,
        };
        let treasury = AccountRef::treasury();
        ledger
            .accounts
            .insert(treasury.clone(), Arc::new(Mutex::new(Account::new(treasury, 0.0))));
        ledger
    }

    /// Open an account with the default trust score. Idempotent.
    pub async fn open_account(&self, account: &AccountRef) -> Account {
        self.open_account_with_trust(account, self.default_trust).await
    }

    /// Open an account with a given trust score. An existing account is
    /// returned unchanged.
    pub async fn open_account_with_trust(&self, account: &AccountRef, trust_score: f64) -> Account {
        let handle = self
            .accounts
            .entry(account.clone())
            .or_insert_with(|| {
                info!(account = %account, trust_score, "Opening ledger account");
                Arc::new(Mutex::new(Account::new(account.clone(), trust_score)))
            })
            .clone();
        let guard = handle.lock().await;
        guard.clone()
    }

    pub fn contains(&self, account: &AccountRef) -> bool {
        self.accounts.contains_key(account)
    }

    fn handle(&self, account: &AccountRef) -> Result<Arc<Mutex<Account>>, LedgerError> {
        self.accounts
            .get(account)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| LedgerError::AccountNotFound(account.clone()))
    }

    /// Snapshot of an account.
    pub async fn account(&self, account: &AccountRef) -> Result<Account, LedgerError> {
        let handle = self.handle(account)?;
        let guard = handle.lock().await;
        Ok(guard.clone())
    }

    /// Cached balance of an account.
    pub async fn balance(&self, account: &AccountRef) -> Result<Balance, LedgerError> {
        Ok(self.account(account).await?.balance)
    }

    /// All opened account references.
    pub fn account_refs(&self) -> Vec<AccountRef> {
        let mut refs: Vec<AccountRef> = self.accounts.iter().map(|e| e.key().clone()).collect();
        refs.sort();
        refs
    }

    /// Snapshots of every account of one kind.
    pub async fn accounts_of_kind(&self, kind: AccountKind) -> Vec<Account> {
        let mut accounts = Vec::new();
        for account in self.account_refs().into_iter().filter(|a| a.kind == kind) {
            if let Ok(snapshot) = self.account(&account).await {
                accounts.push(snapshot);
            }
        }
        accounts
    }

    /// Commit a batch atomically.
    ///
    /// Locks every touched account in sorted order, validates all legs against
    /// staged copies, and only then writes the journal and the cached balances.
    pub async fn commit(&self, batch: LedgerBatch) -> Result<Receipt, LedgerError> {
        if batch.is_empty() {
            return Ok(Receipt::default());
        }

        let mut guards: Vec<(AccountRef, OwnedMutexGuard<Account>)> = Vec::new();
        for account in batch.accounts() {
            let handle = self.handle(&account)?;
            guards.push((account, handle.lock_owned().await));
        }

        let staged: BTreeMap<AccountRef, Account> = guards
            .iter()
            .map(|(account, guard)| (account.clone(), (**guard).clone()))
            .collect();

        let batch_id = uuid::Uuid::new_v4().to_string();
        let mut staging = Staging::new(staged, batch_id.clone(), batch.links.clone(), Utc::now());

        if let Err(e) = staging.apply_all(&batch.legs) {
            warn!(
                batch_id = %batch_id,
                error = %e,
                legs = batch.legs.len(),
                "Ledger batch rejected"
            );
            return Err(e);
        }

        let (mut updated, entries) = staging.into_parts();

        {
            let mut journal = self.journal.write().await;
            for entry in &entries {
                journal.append(entry.clone());
            }
        }

        for (account, guard) in guards.iter_mut() {
            if let Some(next) = updated.remove(account) {
                **guard = next;
            }
        }

        info!(
            batch_id = %batch_id,
            legs = batch.legs.len(),
            entries = entries.len(),
            bounty_id = ?batch.links.bounty_id,
            dispute_id = ?batch.links.dispute_id,
            "Ledger batch committed"
        );

        Ok(Receipt {
            batch_id,
            transactions: entries,
        })
    }

    /// Apply a single signed change to available credits.
    pub async fn apply_transaction(
        &self,
        account: &AccountRef,
        kind: TransactionKind,
        amount: i64,
        links: TxLinks,
    ) -> Result<Balance, LedgerError> {
        let magnitude = amount.unsigned_abs();
        let batch = if amount >= 0 {
            LedgerBatch::linked(links).credit(account, magnitude, kind)
        } else {
            LedgerBatch::linked(links).debit(account, magnitude, kind)
        };
        self.commit(batch).await?;
        self.balance(account).await
    }

    pub async fn deposit(&self, account: &AccountRef, amount: u64) -> Result<Balance, LedgerError> {
        self.commit(LedgerBatch::new().credit(account, amount, TransactionKind::Deposit))
            .await?;
        self.balance(account).await
    }

    pub async fn withdraw(
        &self,
        account: &AccountRef,
        amount: u64,
    ) -> Result<Balance, LedgerError> {
        self.commit(LedgerBatch::new().debit(account, amount, TransactionKind::Withdrawal))
            .await?;
        self.balance(account).await
    }

    /// Move available credits into stake.
    pub async fn lock_stake(
        &self,
        account: &AccountRef,
        amount: u64,
        links: TxLinks,
    ) -> Result<Balance, LedgerError> {
        self.commit(LedgerBatch::linked(links).lock(account, amount))
            .await?;
        self.balance(account).await
    }

    /// Release staked credits to the owner or forfeit them to another account.
    /// Returns the source account's balance.
    pub async fn release_stake(
        &self,
        account: &AccountRef,
        amount: u64,
        destination: StakeDestination,
        links: TxLinks,
    ) -> Result<Balance, LedgerError> {
        let batch = match destination {
            StakeDestination::Owner => LedgerBatch::linked(links).release(account, amount),
            StakeDestination::Account(to) => {
                LedgerBatch::linked(links).forfeit(account, &to, amount)
            }
        };
        self.commit(batch).await?;
        self.balance(account).await
    }

    /// Mutate an account's standing under its lock. Balances are not reachable
    /// from here.
    pub async fn update_standing<F, R>(&self, account: &AccountRef, f: F) -> Result<R, LedgerError>
    where
        F: FnOnce(&mut Standing) -> R,
    {
        let handle = self.handle(account)?;
        let mut guard = handle.lock().await;
        Ok(f(&mut guard.standing))
    }

    /// Journal entries for an account in creation order.
    pub async fn transactions_for(&self, account: &AccountRef) -> Vec<Transaction> {
        self.journal.read().await.for_account(account)
    }

    pub async fn journal_len(&self) -> usize {
        self.journal.read().await.len()
    }

    /// Rebuild a balance purely from the journal.
    pub async fn reconstruct(&self, account: &AccountRef) -> Result<Balance, LedgerError> {
        let (available, staked, _) = self.journal.read().await.replay(account);
        let available = u64::try_from(available).map_err(|_| LedgerError::Overflow)?;
        let staked = u64::try_from(staked).map_err(|_| LedgerError::Overflow)?;
        Ok(Balance::new(available, staked))
    }

    /// Check that journal sums, the last `balance_after` and the cached
    /// balance all agree.
    pub async fn verify_account(&self, account: &AccountRef) -> Result<Balance, LedgerError> {
        let handle = self.handle(account)?;
        let guard = handle.lock().await;
        let cached = guard.balance;

        let (available, staked, last) = self.journal.read().await.replay(account);
        let journal = Balance::new(
            u64::try_from(available).map_err(|_| LedgerError::Overflow)?,
            u64::try_from(staked).map_err(|_| LedgerError::Overflow)?,
        );
        let last = last.unwrap_or_default();

        if journal != cached || last != cached {
            warn!(account = %account, ?journal, ?cached, ?last, "Ledger inconsistency detected");
            return Err(LedgerError::Inconsistent {
                account: account.clone(),
                journal,
                cached,
            });
        }

        debug!(account = %account, ?cached, "Account verified against journal");
        Ok(cached)
    }

    /// Verify every account.
    pub async fn verify_all(&self) -> Result<(), LedgerError> {
        for account in self.account_refs() {
            self.verify_account(&account).await?;
        }
        Ok(())
    }
}

impl Default for Ledger {
    fn default() -> Self {
        Self::new()
    }
}
