//! Precondition checks for mutating operations
//!
//! Validators perform no side effects and recover nothing locally: every
//! failure surfaces to the caller as a tagged error before any ledger write
//! is attempted. [`validate_transfer`] is the single gate every money-moving
//! operation passes through.

use crate::error::{Error, Result};
use crate::types::{BalanceSummary, UserId};
use rust_decimal::Decimal;

/// Reject non-positive amounts and amounts above the configured maximum
pub fn validate_amount(amount: Decimal, max: Decimal) -> Result<()> {
    if amount <= Decimal::ZERO {
        return Err(Error::InvalidAmount(format!(
            "amount must be positive, got {}",
            amount
        )));
    }
    if amount > max {
        return Err(Error::InvalidAmount(format!(
            "amount {} exceeds maximum {}",
            amount, max
        )));
    }
    Ok(())
}

/// Reject transfers where sender and recipient are the same account
pub fn validate_users(from: &UserId, to: &UserId) -> Result<()> {
    if from == to {
        return Err(Error::SelfTransfer);
    }
    Ok(())
}

/// Reject debits the derived balance cannot cover
pub fn validate_balance(summary: &BalanceSummary, amount: Decimal) -> Result<()> {
    if summary.balance < amount {
        return Err(Error::InsufficientBalance {
            required: amount,
            available: summary.balance,
        });
    }
    Ok(())
}

/// Composite gate for user-to-user movements
pub fn validate_transfer(
    from: &UserId,
    to: &UserId,
    amount: Decimal,
    max: Decimal,
    from_summary: &BalanceSummary,
) -> Result<()> {
    validate_amount(amount, max)?;
    validate_users(from, to)?;
    validate_balance(from_summary, amount)?;
    Ok(())
}
