//! Fee engine
//!
//! Pure function from (transaction kind, gross amount) to (fee, net). The
//! schedule is a closed match over [`EntryKind`]: adding a kind fails to
//! compile until it is placed either in the schedule or in the non-fee-bearing
//! arm, so no kind can silently fall through a lookup.

use crate::error::{Error, Result};
use crate::types::EntryKind;
use rust_decimal::{Decimal, RoundingStrategy};

/// Fee and resulting net for one operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeeBreakdown {
    /// Fee retained by the platform
    pub fee: Decimal,

    /// `amount - fee`
    pub net: Decimal,
}

/// Transfer fee rate: 1.46 %
fn transfer_rate() -> Decimal {
    Decimal::new(146, 4)
}

/// Marketplace purchase fee rate: 5 %
fn marketplace_rate() -> Decimal {
    Decimal::new(5, 2)
}

/// Compute fee and net for a fee-bearing transaction kind
///
/// Fees are rounded half-up to 2 decimal places. `Purchase` and `Reversal`
/// never pass through the schedule; asking for them fails with
/// [`Error::UnknownTransactionType`]. The caller must still reject the
/// operation if `net` is not strictly positive.
pub fn quote(kind: EntryKind, amount: Decimal) -> Result<FeeBreakdown> {
    let rate = match kind {
        EntryKind::Transfer => transfer_rate(),
        EntryKind::MarketplacePurchase => marketplace_rate(),
        EntryKind::RoyaltyPayout => Decimal::ZERO,
        EntryKind::Withdrawal => Decimal::ZERO,
        EntryKind::Purchase | EntryKind::Reversal => {
            return Err(Error::UnknownTransactionType(kind));
        }
    };

    let fee = (amount * rate).round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    let net = amount - fee;

    Ok(FeeBreakdown { fee, net })
}
