//! Withdrawal workflow helpers
//!
//! The state machine itself lives on [`WithdrawalStatus`]; this module holds
//! the hold arithmetic shared by the orchestrator: a withdrawal in `Pending`
//! or `Approved` reserves its gross amount against the user's available
//! balance until it is cancelled or its ledger debit posts.

use crate::types::{BalanceSummary, Withdrawal};
use rust_decimal::Decimal;

/// Sum of gross amounts held by a user's open withdrawals
pub fn outstanding_holds(withdrawals: &[Withdrawal]) -> Decimal {
    withdrawals
        .iter()
        .filter(|w| w.status.holds_funds())
        .map(|w| w.amount)
        .sum()
}

/// Derived balance minus open withdrawal holds
///
/// This is what a new withdrawal request is validated against; the ledger
/// itself still shows the full surplus until the debit posts.
pub fn available_balance(summary: &BalanceSummary, withdrawals: &[Withdrawal]) -> Decimal {
    summary.balance - outstanding_holds(withdrawals)
}
