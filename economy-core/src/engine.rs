//! Orchestration core
//!
//! Composes validators, the fee engine, and ledger writes into atomic
//! operations. Every method here runs inside the single-writer actor (see
//! [`crate::actor`]), so a balance derived at the top of a method still holds
//! when the commit lands at the bottom: validation and write share one
//! serialized step, which is what closes the check-then-act race.
//!
//! Methods build a [`CommitBatch`] first and commit it once, so multi-row
//! operations (transfer + platform fee, withdrawal debit + state change,
//! external event + idempotency marker) land atomically or not at all.

use crate::{
    audit::AuditSink,
    balance,
    error::{Error, Result},
    fees,
    metrics::Metrics,
    storage::{CommitBatch, Storage},
    types::{
        AuditRecord, BalanceSummary, EntryKind, EntryStatus, EventOutcome, ExternalEventKind,
        LedgerEntry, OpContext, ProcessedEvent, Receipt, UserId, Withdrawal, WithdrawalStatus,
        META_EXTERNAL_EVENT_ID, META_FEE_ENTRY_ID, META_LISTING_ID, META_PARENT_ENTRY_ID,
        META_REASON, META_REVERSAL_OF, META_WITHDRAWAL_ID,
    },
    validators, withdrawal,
};
use chrono::Utc;
use rust_decimal::Decimal;
use serde_json::Value;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use uuid::Uuid;

/// The transaction engine
///
/// Owned by the actor task; never shared across threads, so each operation
/// observes and extends the ledger without interleaving.
pub struct Engine {
    storage: Arc<Storage>,
    audit: Arc<dyn AuditSink>,
    metrics: Arc<Metrics>,
    platform: UserId,
    max_amount: Decimal,
}

impl Engine {
    /// Create a new engine
    pub fn new(
        storage: Arc<Storage>,
        audit: Arc<dyn AuditSink>,
        metrics: Arc<Metrics>,
        platform: UserId,
        max_amount: Decimal,
    ) -> Self {
        Self {
            storage,
            audit,
            metrics,
            platform,
            max_amount,
        }
    }

    /// Derive a user's balance fresh from the ledger
    pub fn balance(&self, user: &UserId) -> Result<BalanceSummary> {
        let entries = self.storage.user_entries(user)?;
        Ok(balance::summarize(&entries, user))
    }

    // Funding and transfers

    /// External funding enters the system
    ///
    /// Writes one credit entry; no debit exists because the funds originate
    /// outside the ledger. A platform fee row would join the batch if the
    /// schedule ever priced purchases.
    pub fn purchase(&self, user: UserId, amount: Decimal, ctx: &OpContext) -> Result<Receipt> {
        validators::validate_amount(amount, self.max_amount)?;

        let entries = self.build_purchase_entries(&user, amount, HashMap::new(), ctx);
        self.commit_appends(&entries)?;

        self.record_audit("purchase", Some(&user), Some(amount), ids(&entries), ctx);
        Ok(Receipt {
            fee: Decimal::ZERO,
            net: amount,
            entries,
        })
    }

    /// User-to-user transfer (1.46 % fee)
    pub fn transfer(
        &self,
        from: UserId,
        to: UserId,
        amount: Decimal,
        ctx: &OpContext,
    ) -> Result<Receipt> {
        self.transfer_shaped(EntryKind::Transfer, from, to, amount, HashMap::new(), "transfer", ctx)
    }

    /// Buyer pays seller for a marketplace listing (5 % fee)
    pub fn marketplace_purchase(
        &self,
        buyer: UserId,
        seller: UserId,
        amount: Decimal,
        listing_id: &str,
        ctx: &OpContext,
    ) -> Result<Receipt> {
        let mut metadata = HashMap::new();
        metadata.insert(META_LISTING_ID.to_string(), listing_id.to_string());
        self.transfer_shaped(
            EntryKind::MarketplacePurchase,
            buyer,
            seller,
            amount,
            metadata,
            "marketplace_purchase",
            ctx,
        )
    }

    /// Platform pays a creator royalties (no fee)
    pub fn royalty_payout(
        &self,
        creator: UserId,
        amount: Decimal,
        ctx: &OpContext,
    ) -> Result<Receipt> {
        self.transfer_shaped(
            EntryKind::RoyaltyPayout,
            self.platform.clone(),
            creator,
            amount,
            HashMap::new(),
            "royalty_payout",
            ctx,
        )
    }

    /// Shared shape for debit-credit pairs
    ///
    /// Validates against the sender's derived balance, quotes the fee, then
    /// commits the main row plus a platform fee row (when fee > 0) in one
    /// batch. The two rows are cross-linked via metadata so reversal can
    /// flip them together.
    fn transfer_shaped(
        &self,
        kind: EntryKind,
        from: UserId,
        to: UserId,
        amount: Decimal,
        mut metadata: HashMap<String, String>,
        action: &str,
        ctx: &OpContext,
    ) -> Result<Receipt> {
        let from_summary = self.balance(&from)?;
        validators::validate_transfer(&from, &to, amount, self.max_amount, &from_summary)?;

        let fees::FeeBreakdown { fee, net } = fees::quote(kind, amount)?;
        if net <= Decimal::ZERO {
            return Err(Error::InvalidAmount(format!(
                "net amount {} is not positive",
                net
            )));
        }

        let main_id = Uuid::now_v7();
        let fee_id = if fee > Decimal::ZERO {
            let id = Uuid::now_v7();
            metadata.insert(META_FEE_ENTRY_ID.to_string(), id.to_string());
            Some(id)
        } else {
            None
        };

        let now = Utc::now();
        let mut entries = vec![LedgerEntry {
            id: main_id,
            kind,
            from_user: Some(from.clone()),
            to_user: Some(to),
            amount,
            fee,
            net,
            status: EntryStatus::Complete,
            metadata,
            request_id: ctx.request_id.clone(),
            source_ip: ctx.source_ip.clone(),
            created_at: now,
        }];

        if let Some(fee_id) = fee_id {
            let mut fee_metadata = HashMap::new();
            fee_metadata.insert(META_PARENT_ENTRY_ID.to_string(), main_id.to_string());
            entries.push(LedgerEntry {
                id: fee_id,
                kind,
                from_user: None,
                to_user: Some(self.platform.clone()),
                amount: fee,
                fee: Decimal::ZERO,
                net: fee,
                status: EntryStatus::Complete,
                metadata: fee_metadata,
                request_id: ctx.request_id.clone(),
                source_ip: ctx.source_ip.clone(),
                created_at: now,
            });
        }

        self.commit_appends(&entries)?;

        self.record_audit(action, Some(&from), Some(amount), ids(&entries), ctx);
        Ok(Receipt { fee, net, entries })
    }

    // Reversal

    /// Reverse a prior entry without deleting history
    ///
    /// Flips the original row (and its platform-fee sibling) to `Reversed` —
    /// that flip is what inverts the balance effect, exactly once — and
    /// appends a `Reversal`-kind record of the flip, born `Reversed` so it
    /// never enters the balance sums.
    pub fn reversal(&self, entry_id: Uuid, reason: &str, ctx: &OpContext) -> Result<Receipt> {
        let (flips, record) = self.build_reversal(entry_id, reason, ctx)?;

        let original_amount = record.amount;
        let actor = record.to_user.clone();
        let mut entry_ids: Vec<Uuid> = flips.iter().map(|e| e.id).collect();
        entry_ids.push(record.id);

        let batch = CommitBatch {
            appends: vec![record.clone()],
            flips,
            ..Default::default()
        };
        self.storage.commit(&batch)?;

        self.metrics.entries_total.inc();
        self.metrics.reversals_total.inc_by(batch.flips.len() as u64);
        self.record_audit("reversal", actor.as_ref(), Some(original_amount), entry_ids, ctx);

        Ok(Receipt {
            fee: record.fee,
            net: record.net,
            entries: vec![record],
        })
    }

    /// Build the flips and record row for a reversal without committing
    ///
    /// Shared with chargeback events so the idempotency marker can join the
    /// same batch.
    fn build_reversal(
        &self,
        entry_id: Uuid,
        reason: &str,
        ctx: &OpContext,
    ) -> Result<(Vec<LedgerEntry>, LedgerEntry)> {
        let mut target = self.storage.get_entry(entry_id)?;

        // Fee rows reverse through their parent so the pair never half-flips
        if let Some(parent_id) = target.parent_entry_id() {
            target = self.storage.get_entry(parent_id)?;
        }

        if target.status == EntryStatus::Reversed {
            return Err(Error::AlreadyReversed(target.id));
        }

        let mut flips = Vec::new();
        let mut flipped = target.clone();
        flipped.status = EntryStatus::Reversed;
        flips.push(flipped);

        if let Some(fee_id) = target.fee_entry_id() {
            let mut fee_row = self.storage.get_entry(fee_id)?;
            if fee_row.status == EntryStatus::Complete {
                fee_row.status = EntryStatus::Reversed;
                flips.push(fee_row);
            }
        }

        let mut metadata = HashMap::new();
        metadata.insert(META_REVERSAL_OF.to_string(), target.id.to_string());
        if !reason.is_empty() {
            metadata.insert(META_REASON.to_string(), reason.to_string());
        }

        // Mirror of the original movement; forensic only
        let record = LedgerEntry {
            id: Uuid::now_v7(),
            kind: EntryKind::Reversal,
            from_user: target.to_user.clone(),
            to_user: target.from_user.clone(),
            amount: target.amount,
            fee: target.fee,
            net: target.net,
            status: EntryStatus::Reversed,
            metadata,
            request_id: ctx.request_id.clone(),
            source_ip: ctx.source_ip.clone(),
            created_at: Utc::now(),
        };

        Ok((flips, record))
    }

    // Withdrawal workflow

    /// Create a pending withdrawal, holding funds against available balance
    pub fn request_withdrawal(
        &self,
        user: UserId,
        amount: Decimal,
        ctx: &OpContext,
    ) -> Result<Withdrawal> {
        validators::validate_amount(amount, self.max_amount)?;

        let summary = self.balance(&user)?;
        let existing = self.storage.user_withdrawals(&user)?;
        let held = withdrawal::outstanding_holds(&existing);
        let available = summary.balance - held;
        if available < amount {
            return Err(Error::InsufficientAvailableBalance {
                required: amount,
                available,
                held,
            });
        }

        let fees::FeeBreakdown { fee, net } = fees::quote(EntryKind::Withdrawal, amount)?;

        let w = Withdrawal {
            id: Uuid::now_v7(),
            user_id: user.clone(),
            amount,
            fee,
            net,
            status: WithdrawalStatus::Pending,
            reviewed_by: None,
            reviewed_at: None,
            processed_at: None,
            ledger_entry_id: None,
            created_at: Utc::now(),
        };

        self.commit_withdrawal(w.clone(), None)?;
        self.record_audit("withdrawal_request", Some(&user), Some(amount), vec![], ctx);
        Ok(w)
    }

    /// Reviewer accepts a pending withdrawal
    pub fn approve_withdrawal(
        &self,
        withdrawal_id: Uuid,
        reviewer: UserId,
        ctx: &OpContext,
    ) -> Result<Withdrawal> {
        let mut w = self.storage.get_withdrawal(withdrawal_id)?;
        if w.status != WithdrawalStatus::Pending {
            return Err(Error::InvalidState(format!(
                "cannot approve withdrawal in state {}",
                w.status
            )));
        }

        w.status = WithdrawalStatus::Approved;
        w.reviewed_by = Some(reviewer.clone());
        w.reviewed_at = Some(Utc::now());

        self.commit_withdrawal(w.clone(), None)?;
        self.record_audit("withdrawal_approve", Some(&reviewer), Some(w.amount), vec![], ctx);
        Ok(w)
    }

    /// Post the ledger debit and mark the withdrawal processing
    ///
    /// The only point funds leave the ledger. The balance is re-checked
    /// here: holds only fence other withdrawals, so a transfer may have
    /// drained the account since approval.
    pub fn process_withdrawal(&self, withdrawal_id: Uuid, ctx: &OpContext) -> Result<Withdrawal> {
        let mut w = self.storage.get_withdrawal(withdrawal_id)?;
        if w.status != WithdrawalStatus::Approved {
            return Err(Error::InvalidState(format!(
                "cannot process withdrawal in state {}",
                w.status
            )));
        }

        let summary = self.balance(&w.user_id)?;
        validators::validate_balance(&summary, w.amount)?;

        let now = Utc::now();
        let mut metadata = HashMap::new();
        metadata.insert(META_WITHDRAWAL_ID.to_string(), w.id.to_string());
        let entry = LedgerEntry {
            id: Uuid::now_v7(),
            kind: EntryKind::Withdrawal,
            from_user: Some(w.user_id.clone()),
            to_user: None,
            amount: w.amount,
            fee: w.fee,
            net: w.net,
            status: EntryStatus::Complete,
            metadata,
            request_id: ctx.request_id.clone(),
            source_ip: ctx.source_ip.clone(),
            created_at: now,
        };

        w.status = WithdrawalStatus::Processing;
        w.ledger_entry_id = Some(entry.id);
        w.processed_at = Some(now);

        let entry_ids = vec![entry.id];
        self.commit_withdrawal(w.clone(), Some(entry))?;
        self.record_audit(
            "withdrawal_process",
            Some(&w.user_id),
            Some(w.amount),
            entry_ids,
            ctx,
        );
        Ok(w)
    }

    /// Mark a processing withdrawal complete once the external payout settles
    pub fn complete_withdrawal(&self, withdrawal_id: Uuid, ctx: &OpContext) -> Result<Withdrawal> {
        let mut w = self.storage.get_withdrawal(withdrawal_id)?;
        if w.status != WithdrawalStatus::Processing {
            return Err(Error::InvalidState(format!(
                "cannot complete withdrawal in state {}",
                w.status
            )));
        }

        w.status = WithdrawalStatus::Complete;

        self.commit_withdrawal(w.clone(), None)?;
        self.record_audit(
            "withdrawal_complete",
            Some(&w.user_id),
            Some(w.amount),
            vec![],
            ctx,
        );
        Ok(w)
    }

    /// Abandon a withdrawal before its debit posts, releasing the hold
    pub fn cancel_withdrawal(
        &self,
        withdrawal_id: Uuid,
        user: UserId,
        ctx: &OpContext,
    ) -> Result<Withdrawal> {
        let mut w = self.storage.get_withdrawal(withdrawal_id)?;
        if w.user_id != user {
            return Err(Error::InvalidState(
                "withdrawal does not belong to the cancelling user".to_string(),
            ));
        }
        if !w.status.holds_funds() {
            return Err(Error::InvalidState(format!(
                "cannot cancel withdrawal in state {}",
                w.status
            )));
        }

        w.status = WithdrawalStatus::Cancelled;

        self.commit_withdrawal(w.clone(), None)?;
        self.record_audit("withdrawal_cancel", Some(&user), Some(w.amount), vec![], ctx);
        Ok(w)
    }

    // Externally delivered events

    /// Apply an external event exactly once
    ///
    /// A replayed event id is a no-op reporting `applied: false`. First
    /// application commits the resulting ledger rows and the idempotency
    /// marker in the same atomic batch, so a crash can never leave one
    /// without the other.
    pub fn apply_external_event(
        &self,
        event_id: &str,
        kind: ExternalEventKind,
        payload: &Value,
        ctx: &OpContext,
    ) -> Result<EventOutcome> {
        if event_id.is_empty() {
            return Err(Error::InvalidEvent("empty event id".to_string()));
        }

        if let Some(existing) = self.storage.get_processed_event(event_id)? {
            tracing::info!(event_id, "Duplicate external event ignored");
            return Ok(EventOutcome {
                applied: false,
                entry_ids: existing.entry_ids,
            });
        }

        let (appends, flips, actor, amount) = match kind {
            ExternalEventKind::PaymentConfirmed => {
                let user = payload
                    .get("user_id")
                    .and_then(Value::as_str)
                    .ok_or_else(|| Error::InvalidEvent("missing user_id".to_string()))?;
                let amount = parse_amount(payload)?;
                validators::validate_amount(amount, self.max_amount)?;

                let user = UserId::new(user);
                let mut metadata = HashMap::new();
                metadata.insert(META_EXTERNAL_EVENT_ID.to_string(), event_id.to_string());
                let appends = self.build_purchase_entries(&user, amount, metadata, ctx);
                (appends, vec![], Some(user), Some(amount))
            }
            ExternalEventKind::PaymentChargeback => {
                let entry_id = payload
                    .get("entry_id")
                    .and_then(Value::as_str)
                    .and_then(|s| Uuid::parse_str(s).ok())
                    .ok_or_else(|| {
                        Error::InvalidEvent("missing or invalid entry_id".to_string())
                    })?;
                let (flips, record) = self.build_reversal(entry_id, "payment chargeback", ctx)?;
                let actor = record.from_user.clone();
                let amount = record.amount;
                (vec![record], flips, actor, Some(amount))
            }
        };

        let entry_ids: Vec<Uuid> = appends
            .iter()
            .chain(flips.iter())
            .map(|e| e.id)
            .collect();

        let batch = CommitBatch {
            appends,
            flips,
            withdrawal: None,
            processed_event: Some(ProcessedEvent {
                event_id: event_id.to_string(),
                event_kind: kind,
                entry_ids: entry_ids.clone(),
                applied_at: Utc::now(),
            }),
        };
        self.storage.commit(&batch)?;
        self.metrics.entries_total.inc_by(batch.appends.len() as u64);

        self.record_audit("external_event", actor.as_ref(), amount, entry_ids.clone(), ctx);
        Ok(EventOutcome {
            applied: true,
            entry_ids,
        })
    }

    // Helpers

    fn build_purchase_entries(
        &self,
        user: &UserId,
        amount: Decimal,
        metadata: HashMap<String, String>,
        ctx: &OpContext,
    ) -> Vec<LedgerEntry> {
        vec![LedgerEntry {
            id: Uuid::now_v7(),
            kind: EntryKind::Purchase,
            from_user: None,
            to_user: Some(user.clone()),
            amount,
            fee: Decimal::ZERO,
            net: amount,
            status: EntryStatus::Complete,
            metadata,
            request_id: ctx.request_id.clone(),
            source_ip: ctx.source_ip.clone(),
            created_at: Utc::now(),
        }]
    }

    fn commit_appends(&self, entries: &[LedgerEntry]) -> Result<()> {
        self.storage
            .commit(&CommitBatch::appending(entries.to_vec()))?;
        self.metrics.entries_total.inc_by(entries.len() as u64);
        Ok(())
    }

    fn commit_withdrawal(&self, w: Withdrawal, entry: Option<LedgerEntry>) -> Result<()> {
        let appended = entry.is_some();
        let batch = CommitBatch {
            appends: entry.into_iter().collect(),
            flips: vec![],
            withdrawal: Some(w),
            processed_event: None,
        };
        self.storage.commit(&batch)?;
        if appended {
            self.metrics.entries_total.inc();
        }
        Ok(())
    }

    fn record_audit(
        &self,
        action: &str,
        actor: Option<&UserId>,
        amount: Option<Decimal>,
        entry_ids: Vec<Uuid>,
        ctx: &OpContext,
    ) {
        self.metrics.operations_total.with_label_values(&[action]).inc();
        let record = AuditRecord {
            trace_id: Uuid::now_v7(),
            action: action.to_string(),
            actor: actor.cloned(),
            amount,
            entry_ids,
            request_id: ctx.request_id.clone(),
            source_ip: ctx.source_ip.clone(),
            created_at: Utc::now(),
        };
        self.audit.record(&record);
    }
}

fn parse_amount(payload: &Value) -> Result<Decimal> {
    match payload.get("amount") {
        Some(Value::String(s)) => Decimal::from_str(s)
            .map_err(|e| Error::InvalidEvent(format!("invalid amount: {}", e))),
        Some(Value::Number(n)) => Decimal::from_str(&n.to_string())
            .map_err(|e| Error::InvalidEvent(format!("invalid amount: {}", e))),
        _ => Err(Error::InvalidEvent("missing amount".to_string())),
    }
}

fn ids(entries: &[LedgerEntry]) -> Vec<Uuid> {
    entries.iter().map(|e| e.id).collect()
}
