//! Balance calculator
//!
//! Balance is never stored. It is derived on every call as a fold over the
//! user's ledger rows:
//!
//! ```text
//! balance(U) = Σ net    where to_user   = U and status = Complete
//!            - Σ amount where from_user = U and status = Complete
//! ```
//!
//! There is deliberately no caching layer: any cache would need invalidation
//! tied 1:1 to ledger writes, and staleness bugs there are worse than the
//! read cost here.

use crate::types::{BalanceSummary, LedgerEntry, UserId};
use rust_decimal::Decimal;

/// Fold ledger entries into a balance summary for `user`
///
/// Entries not involving `user` are ignored, so callers may pass either a
/// pre-filtered slice or a full scan.
pub fn summarize<'a, I>(entries: I, user: &UserId) -> BalanceSummary
where
    I: IntoIterator<Item = &'a LedgerEntry>,
{
    let mut total_credits = Decimal::ZERO;
    let mut total_debits = Decimal::ZERO;

    for entry in entries {
        if !entry.is_complete() {
            continue;
        }
        if entry.to_user.as_ref() == Some(user) {
            total_credits += entry.net;
        }
        if entry.from_user.as_ref() == Some(user) {
            total_debits += entry.amount;
        }
    }

    BalanceSummary {
        balance: total_credits - total_debits,
        total_credits,
        total_debits,
    }
}

/// Whether the derived balance covers `amount`
pub fn has_sufficient_balance(summary: &BalanceSummary, amount: Decimal) -> bool {
    summary.balance >= amount
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{EntryKind, EntryStatus};
    use chrono::Utc;
    use std::collections::HashMap;
    use uuid::Uuid;

    fn entry(
        kind: EntryKind,
        from: Option<&str>,
        to: Option<&str>,
        amount_cents: i64,
        fee_cents: i64,
        status: EntryStatus,
    ) -> LedgerEntry {
        LedgerEntry {
            id: Uuid::now_v7(),
            kind,
            from_user: from.map(UserId::new),
            to_user: to.map(UserId::new),
            amount: Decimal::new(amount_cents, 2),
            fee: Decimal::new(fee_cents, 2),
            net: Decimal::new(amount_cents - fee_cents, 2),
            status,
            metadata: HashMap::new(),
            request_id: None,
            source_ip: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_summarize_credits_and_debits() {
        let alice = UserId::new("alice");
        let entries = vec![
            // alice funded with 100.00
            entry(EntryKind::Purchase, None, Some("alice"), 10000, 0, EntryStatus::Complete),
            // alice sends 50.00, fee 0.73
            entry(EntryKind::Transfer, Some("alice"), Some("bob"), 5000, 73, EntryStatus::Complete),
            // unrelated entry
            entry(EntryKind::Purchase, None, Some("bob"), 20000, 0, EntryStatus::Complete),
        ];

        let summary = summarize(&entries, &alice);
        assert_eq!(summary.total_credits, Decimal::new(10000, 2));
        assert_eq!(summary.total_debits, Decimal::new(5000, 2));
        assert_eq!(summary.balance, Decimal::new(5000, 2));
    }

    #[test]
    fn test_recipient_gains_net_not_amount() {
        let bob = UserId::new("bob");
        let entries = vec![entry(
            EntryKind::Transfer,
            Some("alice"),
            Some("bob"),
            10000,
            146,
            EntryStatus::Complete,
        )];

        let summary = summarize(&entries, &bob);
        assert_eq!(summary.balance, Decimal::new(9854, 2));
    }

    #[test]
    fn test_reversed_entries_are_excluded() {
        let alice = UserId::new("alice");
        let entries = vec![
            entry(EntryKind::Purchase, None, Some("alice"), 10000, 0, EntryStatus::Complete),
            entry(EntryKind::Transfer, Some("alice"), Some("bob"), 5000, 73, EntryStatus::Reversed),
        ];

        let summary = summarize(&entries, &alice);
        assert_eq!(summary.balance, Decimal::new(10000, 2));
        assert_eq!(summary.total_debits, Decimal::ZERO);
    }

    #[test]
    fn test_has_sufficient_balance() {
        let summary = BalanceSummary {
            balance: Decimal::new(10000, 2),
            total_credits: Decimal::new(10000, 2),
            total_debits: Decimal::ZERO,
        };
        assert!(has_sufficient_balance(&summary, Decimal::new(10000, 2)));
        assert!(!has_sufficient_balance(&summary, Decimal::new(10001, 2)));
    }

    #[test]
    fn test_empty_ledger_is_zero() {
        let summary = summarize(&[], &UserId::new("alice"));
        assert_eq!(summary, BalanceSummary::zero());
    }
}
