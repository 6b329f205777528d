//! Economy Core
//!
//! Append-only financial ledger with derived balances, fee calculation, and
//! atomic transfer / withdrawal orchestration.
//!
//! # Architecture
//!
//! - **Append-only ledger**: every change in financial state is a new row;
//!   balances are derived, never stored
//! - **Single writer**: one actor task serializes all mutations, closing the
//!   check-then-act race between balance validation and commit
//! - **Atomic batches**: multi-row operations commit in one `WriteBatch`
//! - **Idempotent events**: externally delivered events apply exactly once
//!
//! # Invariants
//!
//! - Conservation: Σ(balances) == Σ(purchases in) − Σ(withdrawals out)
//! - Append-only: ledger rows are never deleted; the only mutation is the
//!   reversal status flip, itself recorded as a new row
//! - Derived balance: recomputing from the ledger always reproduces it

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    rust_2018_idioms,
    missing_debug_implementations,
    clippy::all
)]

pub mod actor;
pub mod audit;
pub mod balance;
pub mod config;
pub mod engine;
pub mod error;
pub mod fees;
pub mod ledger;
pub mod metrics;
pub mod storage;
pub mod types;
pub mod validators;
pub mod withdrawal;

// Re-exports
pub use config::Config;
pub use error::{Error, Result};
pub use ledger::{ConservationReport, EconomyLedger};
pub use types::{
    AuditRecord, BalanceSummary, EntryKind, EntryStatus, EventOutcome, ExternalEventKind,
    LedgerEntry, OpContext, ProcessedEvent, Receipt, UserId, Withdrawal, WithdrawalStatus,
};
