//! Multi-leg ledger batches.
//!
//! A [`LedgerBatch`] is the unit of atomicity: every leg is applied to a
//! staged copy of the touched accounts, and only when all legs validate are
//! the staged accounts and journal entries written back.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::ledger::LedgerError;
use crate::types::{Account, AccountRef, Balance, Transaction, TransactionKind, TxLinks};

/// One step of a batch.
#[derive(Debug, Clone, PartialEq)]
pub enum Leg {
    /// Add to available credits.
    Credit {
        account: AccountRef,
        amount: u64,
        kind: TransactionKind,
    },
    /// Remove from available credits.
    Debit {
        account: AccountRef,
        amount: u64,
        kind: TransactionKind,
    },
    /// Move available credits into stake.
    Lock { account: AccountRef, amount: u64 },
    /// Move staked credits back to the owner's available credits.
    Release { account: AccountRef, amount: u64 },
    /// Move staked credits of `from` into the available credits of `to`.
    Forfeit {
        from: AccountRef,
        to: AccountRef,
        amount: u64,
        debit_kind: TransactionKind,
        credit_kind: TransactionKind,
    },
    /// Signed trust score change, clamped to the trust scale.
    AdjustTrust { account: AccountRef, delta: f64 },
}

impl Leg {
    fn accounts(&self) -> Vec<&AccountRef> {
        match self {
            Leg::Credit { account, .. }
            | Leg::Debit { account, .. }
            | Leg::Lock { account, .. }
            | Leg::Release { account, .. }
            | Leg::AdjustTrust { account, .. } => vec![account],
            Leg::Forfeit { from, to, .. } => vec![from, to],
        }
    }
}

/// An ordered set of legs committed all-or-nothing.
#[derive(Debug, Clone, Default)]
pub struct LedgerBatch {
    pub links: TxLinks,
    pub legs: Vec<Leg>,
}

impl LedgerBatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a batch whose entries link back to the given domain objects.
    pub fn linked(links: TxLinks) -> Self {
        Self {
            links,
            legs: Vec::new(),
        }
    }

    pub fn credit(mut self, account: &AccountRef, amount: u64, kind: TransactionKind) -> Self {
        if amount > 0 {
            self.legs.push(Leg::Credit {
                account: account.clone(),
                amount,
                kind,
            });
        }
        self
    }

    pub fn debit(mut self, account: &AccountRef, amount: u64, kind: TransactionKind) -> Self {
        if amount > 0 {
            self.legs.push(Leg::Debit {
                account: account.clone(),
                amount,
                kind,
            });
        }
        self
    }

    pub fn lock(mut self, account: &AccountRef, amount: u64) -> Self {
        if amount > 0 {
            self.legs.push(Leg::Lock {
                account: account.clone(),
                amount,
            });
        }
        self
    }

    pub fn release(mut self, account: &AccountRef, amount: u64) -> Self {
        if amount > 0 {
            self.legs.push(Leg::Release {
                account: account.clone(),
                amount,
            });
        }
        self
    }

    /// Forfeit stake from one account to another, recorded as a dispute loss
    /// and win respectively.
    pub fn forfeit(self, from: &AccountRef, to: &AccountRef, amount: u64) -> Self {
        self.forfeit_as(
            from,
            to,
            amount,
            TransactionKind::DisputeLoss,
            TransactionKind::DisputeWin,
        )
    }

    pub fn forfeit_as(
        mut self,
        from: &AccountRef,
        to: &AccountRef,
        amount: u64,
        debit_kind: TransactionKind,
        credit_kind: TransactionKind,
    ) -> Self {
        if amount > 0 {
            self.legs.push(Leg::Forfeit {
                from: from.clone(),
                to: to.clone(),
                amount,
                debit_kind,
                credit_kind,
            });
        }
        self
    }

    pub fn adjust_trust(mut self, account: &AccountRef, delta: f64) -> Self {
        if delta != 0.0 {
            self.legs.push(Leg::AdjustTrust {
                account: account.clone(),
                delta,
            });
        }
        self
    }

    /// Append all legs of another batch, keeping this batch's links.
    pub fn extend(mut self, other: LedgerBatch) -> Self {
        self.legs.extend(other.legs);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.legs.is_empty()
    }

    /// Every account touched by the batch, in lock order.
    pub fn accounts(&self) -> BTreeSet<AccountRef> {
        self.legs
            .iter()
            .flat_map(|leg| leg.accounts())
            .cloned()
            .collect()
    }
}

/// Staged copies of the accounts a batch touches.
pub(crate) struct Staging {
    accounts: BTreeMap<AccountRef, Account>,
    entries: Vec<Transaction>,
    batch_id: String,
    links: TxLinks,
    now: DateTime<Utc>,
}

impl Staging {
    pub(crate) fn new(
        accounts: BTreeMap<AccountRef, Account>,
        batch_id: String,
        links: TxLinks,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            accounts,
            entries: Vec::new(),
            batch_id,
            links,
            now,
        }
    }

    /// Apply every leg in order. Any failure leaves the live accounts untouched
    /// because only the staged copies have been modified.
    pub(crate) fn apply_all(&mut self, legs: &[Leg]) -> Result<(), LedgerError> {
        for leg in legs {
            self.apply(leg)?;
        }
        Ok(())
    }

    pub(crate) fn into_parts(self) -> (BTreeMap<AccountRef, Account>, Vec<Transaction>) {
        (self.accounts, self.entries)
    }

    fn apply(&mut self, leg: &Leg) -> Result<(), LedgerError> {
        debug!(batch_id = %self.batch_id, leg = ?leg, "Staging ledger leg");

        match leg {
            Leg::Credit {
                account,
                amount,
                kind,
            } => {
                let balance = self.balance_of(account)?;
                let available = checked_add(balance.available, *amount)?;
                self.write(
                    account,
                    *kind,
                    signed(*amount)?,
                    0,
                    Balance::new(available, balance.staked),
                )
            }
            Leg::Debit {
                account,
                amount,
                kind,
            } => {
                let balance = self.balance_of(account)?;
                let available = balance.available.checked_sub(*amount).ok_or_else(|| {
                    LedgerError::InsufficientFunds {
                        account: account.clone(),
                        requested: *amount,
                        available: balance.available,
                    }
                })?;
                self.write(
                    account,
                    *kind,
                    -signed(*amount)?,
                    0,
                    Balance::new(available, balance.staked),
                )
            }
            Leg::Lock { account, amount } => {
                let balance = self.balance_of(account)?;
                let available = balance.available.checked_sub(*amount).ok_or_else(|| {
                    LedgerError::InsufficientFunds {
                        account: account.clone(),
                        requested: *amount,
                        available: balance.available,
                    }
                })?;
                let staked = checked_add(balance.staked, *amount)?;
                let delta = signed(*amount)?;
                self.write(
                    account,
                    TransactionKind::StakeLock,
                    -delta,
                    delta,
                    Balance::new(available, staked),
                )
            }
            Leg::Release { account, amount } => {
                let balance = self.balance_of(account)?;
                let staked = balance.staked.checked_sub(*amount).ok_or_else(|| {
                    LedgerError::InsufficientStake {
                        account: account.clone(),
                        requested: *amount,
                        staked: balance.staked,
                    }
                })?;
                let available = checked_add(balance.available, *amount)?;
                let delta = signed(*amount)?;
                self.write(
                    account,
                    TransactionKind::StakeRelease,
                    delta,
                    -delta,
                    Balance::new(available, staked),
                )
            }
            Leg::Forfeit {
                from,
                to,
                amount,
                debit_kind,
                credit_kind,
            } => {
                let delta = signed(*amount)?;

                let source = self.balance_of(from)?;
                let staked = source.staked.checked_sub(*amount).ok_or_else(|| {
                    LedgerError::InsufficientStake {
                        account: from.clone(),
                        requested: *amount,
                        staked: source.staked,
                    }
                })?;
                self.write(from, *debit_kind, 0, -delta, Balance::new(source.available, staked))?;

                let target = self.balance_of(to)?;
                let available = checked_add(target.available, *amount)?;
                self.write(to, *credit_kind, delta, 0, Balance::new(available, target.staked))
            }
            Leg::AdjustTrust { account, delta } => {
                let now = self.now;
                let staged = self.account_mut(account)?;
                staged.standing.adjust(*delta);
                staged.standing.last_active_at = now;
                Ok(())
            }
        }
    }

    fn balance_of(&self, account: &AccountRef) -> Result<Balance, LedgerError> {
        self.accounts
            .get(account)
            .map(|a| a.balance)
            .ok_or_else(|| LedgerError::AccountNotFound(account.clone()))
    }

    fn account_mut(&mut self, account: &AccountRef) -> Result<&mut Account, LedgerError> {
        self.accounts
            .get_mut(account)
            .ok_or_else(|| LedgerError::AccountNotFound(account.clone()))
    }

    fn write(
        &mut self,
        account: &AccountRef,
        kind: TransactionKind,
        amount: i64,
        staked_delta: i64,
        balance_after: Balance,
    ) -> Result<(), LedgerError> {
        let now = self.now;
        let staged = self.account_mut(account)?;
        staged.balance = balance_after;
        // Sweep adjustments are not activity.
        if kind != TransactionKind::DecayAdjustment {
            staged.standing.last_active_at = now;
        }

        self.entries.push(Transaction {
            id: uuid::Uuid::new_v4().to_string(),
            batch_id: self.batch_id.clone(),
            account: account.clone(),
            links: self.links.clone(),
            kind,
            amount,
            staked_delta,
            balance_after,
            created_at: now,
        });
        Ok(())
    }
}

fn checked_add(a: u64, b: u64) -> Result<u64, LedgerError> {
    a.checked_add(b).ok_or(LedgerError::Overflow)
}

fn signed(amount: u64) -> Result<i64, LedgerError> {
    i64::try_from(amount).map_err(|_| LedgerError::Overflow)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_amount_legs_are_dropped() {
        let guild = AccountRef::guild("g1");
        let batch = LedgerBatch::new()
            .lock(&guild, 0)
            .credit(&guild, 0, TransactionKind::Deposit)
            .adjust_trust(&guild, 0.0);
        assert!(batch.is_empty());
    }

    #[test]
    fn test_accounts_sorted_and_deduplicated() {
        let guild = AccountRef::guild("g1");
        let client = AccountRef::user("c1");
        let batch = LedgerBatch::new()
            .release(&guild, 5)
            .forfeit(&client, &guild, 10)
            .lock(&client, 1);

        let accounts: Vec<_> = batch.accounts().into_iter().collect();
        assert_eq!(accounts, vec![client, guild]);
    }

    #[test]
    fn test_staging_rejects_overdraw_without_touching_others() {
        let client = AccountRef::user("c1");
        let guild = AccountRef::guild("g1");

        let mut client_account = Account::new(client.clone(), 50.0);
        client_account.balance = Balance::new(100, 0);
        let guild_account = Account::new(guild.clone(), 50.0);

        let accounts = BTreeMap::from([
            (client.clone(), client_account),
            (guild.clone(), guild_account),
        ]);
        let mut staging = Staging::new(accounts, "b".into(), TxLinks::default(), Utc::now());

        let legs = LedgerBatch::new()
            .lock(&client, 60)
            .lock(&guild, 1)
            .legs;

        let err = staging.apply_all(&legs).unwrap_err();
        assert!(matches!(
            err,
            LedgerError::InsufficientFunds { ref account, .. } if *account == guild
        ));
    }

    #[test]
    fn test_trust_leg_marks_account_active() {
        let guild = AccountRef::guild("g1");
        let mut guild_account = Account::new(guild.clone(), 50.0);
        guild_account.standing.last_active_at = Utc::now() - chrono::Duration::days(30);

        let now = Utc::now();
        let accounts = BTreeMap::from([(guild.clone(), guild_account)]);
        let mut staging = Staging::new(accounts, "b".into(), TxLinks::default(), now);

        let legs = LedgerBatch::new().adjust_trust(&guild, 5.0).legs;
        staging.apply_all(&legs).unwrap();

        let staged = &staging.accounts[&guild];
        assert!((staged.standing.trust_score - 55.0).abs() < 1e-9);
        assert_eq!(staged.standing.last_active_at, now);
        assert!(staging.entries.is_empty());
    }
}
