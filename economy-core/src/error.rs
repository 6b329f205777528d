//! Error types for the economy core

use crate::types::EntryKind;
use rust_decimal::Decimal;
use thiserror::Error;
use uuid::Uuid;

/// Result type for economy operations
pub type Result<T> = std::result::Result<T, Error>;

/// Economy errors
///
/// Validators surface these before any write is attempted; there is no
/// partial-success outcome for a multi-row commit. `StoreUnavailable` is the
/// only condition worth retrying from the caller side, and only because the
/// idempotency layer makes retries safe.
#[derive(Error, Debug)]
pub enum Error {
    /// Amount is non-positive or exceeds the configured maximum
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    /// Sender and recipient are the same account
    #[error("Transfer to self is not allowed")]
    SelfTransfer,

    /// Derived balance is below the requested debit
    #[error("Insufficient balance: required {required}, available {available}")]
    InsufficientBalance {
        /// Amount the operation needed
        required: Decimal,
        /// Derived balance at validation time
        available: Decimal,
    },

    /// Balance net of withdrawal holds is below the requested hold
    #[error("Insufficient available balance: required {required}, available {available} ({held} held by open withdrawals)")]
    InsufficientAvailableBalance {
        /// Amount the withdrawal request needed
        required: Decimal,
        /// Derived balance minus existing holds
        available: Decimal,
        /// Sum of the user's open withdrawal holds
        held: Decimal,
    },

    /// Transaction kind has no entry in the fee schedule
    #[error("No fee schedule for transaction kind {0}")]
    UnknownTransactionType(EntryKind),

    /// Target ledger entry was already reversed
    #[error("Ledger entry already reversed: {0}")]
    AlreadyReversed(Uuid),

    /// Withdrawal state machine rejected the transition
    #[error("Invalid withdrawal state: {0}")]
    InvalidState(String),

    /// Ledger entry not found
    #[error("Ledger entry not found: {0}")]
    EntryNotFound(Uuid),

    /// Withdrawal not found
    #[error("Withdrawal not found: {0}")]
    WithdrawalNotFound(Uuid),

    /// Externally delivered event could not be interpreted
    #[error("Invalid external event: {0}")]
    InvalidEvent(String),

    /// Storage error (RocksDB)
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    /// Concurrency error (actor mailbox closed, etc.)
    #[error("Concurrency error: {0}")]
    Concurrency(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<rocksdb::Error> for Error {
    fn from(err: rocksdb::Error) -> Self {
        Error::StoreUnavailable(err.to_string())
    }
}
