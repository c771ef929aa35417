//! Stake Ledger for Guildhall
//!
//! Append-only record of every credit movement between users, guilds, the
//! AI arbiter and the protocol treasury:
//!
//! - **Accounts**: available and staked credits plus a trust standing
//! - **Batches**: multi-leg movements committed all-or-nothing
//! - **Journal**: the source of truth; cached balances can be replayed and verified
//!
//! # Example
//!
//! ```ignore
//! use ledger::{AccountRef, Ledger, LedgerBatch};
//!
//! let ledger = Ledger::new();
//! let guild = AccountRef::guild("guild-7");
//! ledger.open_account(&guild).await;
//! ledger.deposit(&guild, 500).await?;
//!
//! let batch = LedgerBatch::new().lock(&guild, 50);
//! ledger.commit(batch).await?;
//! ledger.verify_account(&guild).await?;
//! ```

pub mod batch;
pub mod journal;
pub mod ledger;
pub mod types;

// Re-export main types
pub use batch::{LedgerBatch, Leg};
pub use journal::Journal;
pub use ledger::{Ledger, LedgerError, Receipt, StakeDestination};
pub use types::*;
