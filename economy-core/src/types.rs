//! Core types for the economy ledger
//!
//! All types are designed for:
//! - Deterministic serialization (bincode)
//! - Memory safety (no unsafe code)
//! - Exact arithmetic (Decimal for money)

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

/// Metadata key: marketplace listing that triggered the purchase
pub const META_LISTING_ID: &str = "listing_id";
/// Metadata key: withdrawal a ledger debit belongs to
pub const META_WITHDRAWAL_ID: &str = "withdrawal_id";
/// Metadata key: main entry a platform-fee entry was split from
pub const META_PARENT_ENTRY_ID: &str = "parent_entry_id";
/// Metadata key: fee entry split from a main entry
pub const META_FEE_ENTRY_ID: &str = "fee_entry_id";
/// Metadata key: entry a reversal record compensates
pub const META_REVERSAL_OF: &str = "reversal_of";
/// Metadata key: human-readable reversal reason
pub const META_REASON: &str = "reason";
/// Metadata key: external event id that produced an entry
pub const META_EXTERNAL_EVENT_ID: &str = "external_event_id";

/// User account identifier
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct UserId(String);

impl UserId {
    /// Create new user ID
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get as string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Kind of financial movement
///
/// Closed set: adding a kind forces every match over it to be revisited,
/// including the fee schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntryKind {
    /// External funding entering the system (no `from_user`)
    Purchase,
    /// User-to-user transfer
    Transfer,
    /// Buyer pays seller for a marketplace listing
    MarketplacePurchase,
    /// Platform pays a creator royalties
    RoyaltyPayout,
    /// Funds leaving the system (no `to_user`)
    Withdrawal,
    /// Record of a reversal; never enters balance sums
    Reversal,
}

impl EntryKind {
    /// Stable name, used in metrics labels and audit records
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryKind::Purchase => "purchase",
            EntryKind::Transfer => "transfer",
            EntryKind::MarketplacePurchase => "marketplace_purchase",
            EntryKind::RoyaltyPayout => "royalty_payout",
            EntryKind::Withdrawal => "withdrawal",
            EntryKind::Reversal => "reversal",
        }
    }
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Status of a ledger entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntryStatus {
    /// Counted by the balance calculator
    Complete,
    /// Excluded from balance sums; the flip to this status is the single
    /// permitted in-place mutation of a ledger row
    Reversed,
}

/// Immutable record of one financial movement
///
/// The ledger is append-only: no row's `amount`, `fee`, `net`, `from_user`,
/// or `to_user` is ever updated after creation. The only mutation is the
/// `status` flip performed by a reversal, which is itself recorded as a new
/// `Reversal`-kind row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// Unique entry ID (UUIDv7 for time-ordering)
    pub id: Uuid,

    /// Kind of movement
    pub kind: EntryKind,

    /// Debited account; `None` for external funding
    pub from_user: Option<UserId>,

    /// Credited account; `None` for withdrawals
    pub to_user: Option<UserId>,

    /// Gross value moved (strictly positive)
    pub amount: Decimal,

    /// Fee computed at write time, never recomputed
    pub fee: Decimal,

    /// `amount - fee`; what the recipient actually receives
    pub net: Decimal,

    /// Entry status
    pub status: EntryStatus,

    /// Free-form context (listing id, withdrawal id, reversal links)
    #[serde(default)]
    pub metadata: HashMap<String, String>,

    /// Originating request id, for audit
    pub request_id: Option<String>,

    /// Originating source IP, for audit
    pub source_ip: Option<String>,

    /// Immutable creation timestamp
    pub created_at: DateTime<Utc>,
}

impl LedgerEntry {
    /// Whether this entry counts toward balance sums
    pub fn is_complete(&self) -> bool {
        self.status == EntryStatus::Complete
    }

    /// Id of the platform-fee entry split from this one, if any
    pub fn fee_entry_id(&self) -> Option<Uuid> {
        self.metadata
            .get(META_FEE_ENTRY_ID)
            .and_then(|v| Uuid::parse_str(v).ok())
    }

    /// Id of the main entry this fee entry was split from, if any
    pub fn parent_entry_id(&self) -> Option<Uuid> {
        self.metadata
            .get(META_PARENT_ENTRY_ID)
            .and_then(|v| Uuid::parse_str(v).ok())
    }
}

/// Balance derived from the ledger; never stored
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceSummary {
    /// `total_credits - total_debits`
    pub balance: Decimal,

    /// Sum of `net` over complete entries crediting the user
    pub total_credits: Decimal,

    /// Sum of `amount` over complete entries debiting the user
    pub total_debits: Decimal,
}

impl BalanceSummary {
    /// Empty summary (no ledger activity)
    pub fn zero() -> Self {
        Self {
            balance: Decimal::ZERO,
            total_credits: Decimal::ZERO,
            total_debits: Decimal::ZERO,
        }
    }
}

/// Withdrawal status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WithdrawalStatus {
    /// Requested by the user, awaiting review
    Pending,
    /// Accepted by a reviewer, awaiting payout
    Approved,
    /// Ledger debit posted, payout in flight
    Processing,
    /// Payout settled (terminal)
    Complete,
    /// Abandoned before any ledger debit (terminal)
    Cancelled,
}

impl WithdrawalStatus {
    /// Whether the withdrawal can still change state
    pub fn is_terminal(&self) -> bool {
        matches!(self, WithdrawalStatus::Complete | WithdrawalStatus::Cancelled)
    }

    /// Whether the withdrawal reserves funds against available balance
    ///
    /// `Processing` and `Complete` do not hold: their debit is already a
    /// ledger row. `Cancelled` releases the hold by leaving this set.
    pub fn holds_funds(&self) -> bool {
        matches!(self, WithdrawalStatus::Pending | WithdrawalStatus::Approved)
    }
}

impl fmt::Display for WithdrawalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            WithdrawalStatus::Pending => "pending",
            WithdrawalStatus::Approved => "approved",
            WithdrawalStatus::Processing => "processing",
            WithdrawalStatus::Complete => "complete",
            WithdrawalStatus::Cancelled => "cancelled",
        };
        write!(f, "{}", s)
    }
}

/// Request to convert ledger balance into an external payout
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Withdrawal {
    /// Unique withdrawal ID
    pub id: Uuid,

    /// Requesting user
    pub user_id: UserId,

    /// Gross amount requested
    pub amount: Decimal,

    /// Fee computed at request time
    pub fee: Decimal,

    /// `amount - fee`; what the user is paid out
    pub net: Decimal,

    /// Current state
    pub status: WithdrawalStatus,

    /// Reviewer who approved, if any
    pub reviewed_by: Option<UserId>,

    /// Approval timestamp
    pub reviewed_at: Option<DateTime<Utc>>,

    /// Timestamp the ledger debit was posted
    pub processed_at: Option<DateTime<Utc>>,

    /// Ledger debit, populated once `Processing` posts it
    pub ledger_entry_id: Option<Uuid>,

    /// Request timestamp
    pub created_at: DateTime<Utc>,
}

/// Idempotency marker for an externally delivered event
///
/// Presence of a row means "already applied, do not reapply".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessedEvent {
    /// External event id (unique key)
    pub event_id: String,

    /// Kind the event was interpreted as
    pub event_kind: ExternalEventKind,

    /// Ledger entries the first application produced
    pub entry_ids: Vec<Uuid>,

    /// Application timestamp
    pub applied_at: DateTime<Utc>,
}

/// Kind of externally delivered event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExternalEventKind {
    /// Payment provider confirmed a fiat-to-token purchase
    PaymentConfirmed,
    /// Payment provider charged a prior purchase back
    PaymentChargeback,
}

impl ExternalEventKind {
    /// Parse from the provider's event type string
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "payment.confirmed" => Some(ExternalEventKind::PaymentConfirmed),
            "payment.chargeback" => Some(ExternalEventKind::PaymentChargeback),
            _ => None,
        }
    }

    /// Stable name
    pub fn as_str(&self) -> &'static str {
        match self {
            ExternalEventKind::PaymentConfirmed => "payment.confirmed",
            ExternalEventKind::PaymentChargeback => "payment.chargeback",
        }
    }
}

/// Append-only forensic record of one economic action
///
/// Never used to derive balance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    /// Trace id (UUIDv7 so the audit log is time-ordered)
    pub trace_id: Uuid,

    /// Action name ("transfer", "withdrawal_request", ...)
    pub action: String,

    /// Acting account, if the action had one
    pub actor: Option<UserId>,

    /// Gross amount involved, if any
    pub amount: Option<Decimal>,

    /// Ledger entries the action produced or touched
    pub entry_ids: Vec<Uuid>,

    /// Originating request id
    pub request_id: Option<String>,

    /// Originating source IP
    pub source_ip: Option<String>,

    /// Record timestamp
    pub created_at: DateTime<Utc>,
}

/// Caller-supplied provenance attached to mutating operations
#[derive(Debug, Clone, Default)]
pub struct OpContext {
    /// Request id from the calling layer
    pub request_id: Option<String>,

    /// Source IP from the calling layer
    pub source_ip: Option<String>,
}

/// Result of a successful money-moving operation
#[derive(Debug, Clone)]
pub struct Receipt {
    /// Fee charged by the operation
    pub fee: Decimal,

    /// Net amount the recipient received
    pub net: Decimal,

    /// Ledger entries committed by the operation
    pub entries: Vec<LedgerEntry>,
}

/// Result of applying an externally delivered event
#[derive(Debug, Clone)]
pub struct EventOutcome {
    /// False when the event id was already processed (idempotent replay)
    pub applied: bool,

    /// Entries produced by the first application of this event
    pub entry_ids: Vec<Uuid>,
}
