//! Append-only transaction journal with a per-account index.

use std::collections::HashMap;

use crate::types::{AccountRef, Balance, Transaction};

/// The journal never removes or rewrites entries.
#[derive(Debug, Default)]
pub struct Journal {
    entries: Vec<Transaction>,
    by_account: HashMap<AccountRef, Vec<usize>>,
}

impl Journal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, entry: Transaction) {
        let index = self.entries.len();
        self.by_account
            .entry(entry.account.clone())
            .or_default()
            .push(index);
        self.entries.push(entry);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries for one account in creation order.
    pub fn for_account(&self, account: &AccountRef) -> Vec<Transaction> {
        self.by_account
            .get(account)
            .map(|indices| indices.iter().map(|&i| self.entries[i].clone()).collect())
            .unwrap_or_default()
    }

    /// Replay an account's entries from zero.
    ///
    /// Returns the summed balance and the `balance_after` of the last entry,
    /// or `None` for the latter when the account has no entries.
    pub fn replay(&self, account: &AccountRef) -> (i128, i128, Option<Balance>) {
        let Some(indices) = self.by_account.get(account) else {
            return (0, 0, None);
        };

        let mut available: i128 = 0;
        let mut staked: i128 = 0;
        for &i in indices {
            available += i128::from(self.entries[i].amount);
            staked += i128::from(self.entries[i].staked_delta);
        }
        let last = indices.last().map(|&i| self.entries[i].balance_after);
        (available, staked, last)
    }
}
