//! Main economy orchestration layer
//!
//! Ties storage, the engine, and the actor together into the high-level API
//! the platform's domain modules call. Mutating operations go through the
//! single-writer actor; reads go straight to storage.
//!
//! # Example
//!
//! ```no_run
//! use economy_core::{Config, EconomyLedger, OpContext, UserId};
//! use rust_decimal::Decimal;
//!
//! #[tokio::main]
//! async fn main() -> economy_core::Result<()> {
//!     let config = Config::default();
//!     let economy = EconomyLedger::open(config).await?;
//!
//!     let alice = UserId::new("alice");
//!     economy
//!         .execute_purchase(alice.clone(), Decimal::new(10000, 2), OpContext::default())
//!         .await?;
//!     let summary = economy.get_balance(&alice)?;
//!     println!("balance = {}", summary.balance);
//!
//!     economy.shutdown().await
//! }
//! ```

use crate::{
    actor::{spawn_economy_actor, EconomyHandle},
    audit::{AuditSink, StorageAuditSink},
    balance,
    engine::Engine,
    error::{Error, Result},
    metrics::Metrics,
    storage::{Storage, StorageStats},
    types::{
        AuditRecord, BalanceSummary, EntryKind, EventOutcome, ExternalEventKind, LedgerEntry,
        OpContext, Receipt, UserId, Withdrawal,
    },
    Config,
};
use rust_decimal::Decimal;
use std::collections::BTreeSet;
use std::sync::Arc;
use uuid::Uuid;

/// Main economy interface
pub struct EconomyLedger {
    /// Actor handle for mutating operations
    handle: EconomyHandle,

    /// Direct storage access (for reads)
    storage: Arc<Storage>,

    /// Metrics collector
    metrics: Arc<Metrics>,

    /// Configuration
    config: Config,
}

impl EconomyLedger {
    /// Open with the default storage-backed audit sink
    pub async fn open(config: Config) -> Result<Self> {
        let storage = Arc::new(Storage::open(&config)?);
        let audit: Arc<dyn AuditSink> = Arc::new(StorageAuditSink::new(storage.clone()));
        Self::assemble(config, storage, audit)
    }

    /// Open with an injected audit sink
    pub async fn open_with_audit(config: Config, audit: Arc<dyn AuditSink>) -> Result<Self> {
        let storage = Arc::new(Storage::open(&config)?);
        Self::assemble(config, storage, audit)
    }

    fn assemble(config: Config, storage: Arc<Storage>, audit: Arc<dyn AuditSink>) -> Result<Self> {
        let metrics = Arc::new(
            Metrics::new().map_err(|e| Error::Config(format!("metrics registry: {}", e)))?,
        );

        let engine = Engine::new(
            storage.clone(),
            audit,
            metrics.clone(),
            UserId::new(config.platform_account.clone()),
            config.limits.max_transaction_amount,
        );
        let handle = spawn_economy_actor(engine, metrics.clone());

        tracing::info!(
            service = %config.service_name,
            version = %config.service_version,
            platform_account = %config.platform_account,
            "Economy ledger opened"
        );

        Ok(Self {
            handle,
            storage,
            metrics,
            config,
        })
    }

    // Reads (straight to storage)

    /// Derive a user's balance fresh from the ledger
    pub fn get_balance(&self, user: &UserId) -> Result<BalanceSummary> {
        let entries = self.storage.user_entries(user)?;
        Ok(balance::summarize(&entries, user))
    }

    /// Get a ledger entry by id
    pub fn get_entry(&self, entry_id: Uuid) -> Result<LedgerEntry> {
        self.storage.get_entry(entry_id)
    }

    /// All entries involving a user, ordered by time
    pub fn user_entries(&self, user: &UserId) -> Result<Vec<LedgerEntry>> {
        self.storage.user_entries(user)
    }

    /// Get a withdrawal by id
    pub fn get_withdrawal(&self, withdrawal_id: Uuid) -> Result<Withdrawal> {
        self.storage.get_withdrawal(withdrawal_id)
    }

    /// All withdrawals for a user, ordered by time
    pub fn user_withdrawals(&self, user: &UserId) -> Result<Vec<Withdrawal>> {
        self.storage.user_withdrawals(user)
    }

    /// Audit records in time order, up to `limit`
    pub fn audit_records(&self, limit: usize) -> Result<Vec<AuditRecord>> {
        self.storage.audit_records(limit)
    }

    /// Storage statistics
    pub fn stats(&self) -> Result<StorageStats> {
        self.storage.get_stats()
    }

    /// Metrics collector (for scraping)
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Configuration the ledger was opened with
    pub fn config(&self) -> &Config {
        &self.config
    }

    // Mutations (through the actor)

    /// External funding enters the system
    pub async fn execute_purchase(
        &self,
        user: UserId,
        amount: Decimal,
        ctx: OpContext,
    ) -> Result<Receipt> {
        self.handle.purchase(user, amount, ctx).await
    }

    /// User-to-user transfer (1.46 % fee)
    pub async fn execute_transfer(
        &self,
        from: UserId,
        to: UserId,
        amount: Decimal,
        ctx: OpContext,
    ) -> Result<Receipt> {
        self.handle.transfer(from, to, amount, ctx).await
    }

    /// Buyer pays seller for a marketplace listing (5 % fee)
    pub async fn execute_marketplace_purchase(
        &self,
        buyer: UserId,
        seller: UserId,
        amount: Decimal,
        listing_id: &str,
        ctx: OpContext,
    ) -> Result<Receipt> {
        self.handle
            .marketplace_purchase(buyer, seller, amount, listing_id.to_string(), ctx)
            .await
    }

    /// Platform pays a creator royalties (no fee)
    pub async fn execute_royalty_payout(
        &self,
        creator: UserId,
        amount: Decimal,
        ctx: OpContext,
    ) -> Result<Receipt> {
        self.handle.royalty_payout(creator, amount, ctx).await
    }

    /// Reverse a prior entry without deleting history
    pub async fn execute_reversal(
        &self,
        entry_id: Uuid,
        reason: &str,
        ctx: OpContext,
    ) -> Result<Receipt> {
        self.handle.reversal(entry_id, reason.to_string(), ctx).await
    }

    /// Create a pending withdrawal, holding funds against available balance
    pub async fn request_withdrawal(
        &self,
        user: UserId,
        amount: Decimal,
        ctx: OpContext,
    ) -> Result<Withdrawal> {
        self.handle.request_withdrawal(user, amount, ctx).await
    }

    /// Reviewer accepts a pending withdrawal
    pub async fn approve_withdrawal(
        &self,
        withdrawal_id: Uuid,
        reviewer: UserId,
        ctx: OpContext,
    ) -> Result<Withdrawal> {
        self.handle
            .approve_withdrawal(withdrawal_id, reviewer, ctx)
            .await
    }

    /// Post the ledger debit for an approved withdrawal
    pub async fn process_withdrawal(
        &self,
        withdrawal_id: Uuid,
        ctx: OpContext,
    ) -> Result<Withdrawal> {
        self.handle.process_withdrawal(withdrawal_id, ctx).await
    }

    /// Mark a processing withdrawal complete once the external payout settles
    pub async fn complete_withdrawal(
        &self,
        withdrawal_id: Uuid,
        ctx: OpContext,
    ) -> Result<Withdrawal> {
        self.handle.complete_withdrawal(withdrawal_id, ctx).await
    }

    /// Abandon a withdrawal before its debit posts, releasing the hold
    pub async fn cancel_withdrawal(
        &self,
        withdrawal_id: Uuid,
        user: UserId,
        ctx: OpContext,
    ) -> Result<Withdrawal> {
        self.handle.cancel_withdrawal(withdrawal_id, user, ctx).await
    }

    /// Apply an externally delivered event exactly once
    ///
    /// `event_type` is the provider's type string (e.g. `payment.confirmed`).
    pub async fn apply_external_event(
        &self,
        event_id: &str,
        event_type: &str,
        payload: serde_json::Value,
        ctx: OpContext,
    ) -> Result<EventOutcome> {
        let kind = ExternalEventKind::parse(event_type)
            .ok_or_else(|| Error::InvalidEvent(format!("unknown event type {}", event_type)))?;
        self.handle
            .apply_external_event(event_id.to_string(), kind, payload, ctx)
            .await
    }

    /// Shutdown the actor
    pub async fn shutdown(self) -> Result<()> {
        self.handle.shutdown().await
    }

    // Invariant checks

    /// Check money conservation across the whole ledger
    ///
    /// The sum of every account's derived balance (platform included) must
    /// equal purchases in minus withdrawals out. Balances are derived via the
    /// per-user index while the totals come from a full scan, so this also
    /// cross-checks the indices against the primary rows.
    pub fn check_conservation(&self) -> Result<ConservationReport> {
        let entries = self.storage.all_entries()?;

        let mut total_purchased = Decimal::ZERO;
        let mut total_withdrawn = Decimal::ZERO;
        let mut users: BTreeSet<UserId> = BTreeSet::new();

        for entry in &entries {
            if entry.is_complete() {
                match entry.kind {
                    EntryKind::Purchase => total_purchased += entry.net,
                    EntryKind::Withdrawal => total_withdrawn += entry.amount,
                    _ => {}
                }
            }
            if let Some(user) = &entry.from_user {
                users.insert(user.clone());
            }
            if let Some(user) = &entry.to_user {
                users.insert(user.clone());
            }
        }

        let mut total_balances = Decimal::ZERO;
        for user in &users {
            total_balances += self.get_balance(user)?.balance;
        }

        Ok(ConservationReport {
            total_purchased,
            total_withdrawn,
            total_balances,
            conserved: total_balances == total_purchased - total_withdrawn,
        })
    }
}

/// Outcome of a conservation check
#[derive(Debug, Clone)]
pub struct ConservationReport {
    /// Net credited by complete purchase entries
    pub total_purchased: Decimal,

    /// Gross debited by complete withdrawal entries
    pub total_withdrawn: Decimal,

    /// Sum of every account's derived balance, platform included
    pub total_balances: Decimal,

    /// Whether no money was created or destroyed
    pub conserved: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(cents: i64) -> Decimal {
        Decimal::new(cents, 2)
    }

    async fn create_test_ledger() -> (EconomyLedger, tempfile::TempDir) {
        let temp_dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.data_dir = temp_dir.path().to_path_buf();

        (EconomyLedger::open(config).await.unwrap(), temp_dir)
    }

    #[tokio::test]
    async fn test_ledger_open_and_shutdown() {
        let (economy, _temp) = create_test_ledger().await;
        economy.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_purchase_and_balance() {
        let (economy, _temp) = create_test_ledger().await;
        let alice = UserId::new("alice");

        let receipt = economy
            .execute_purchase(alice.clone(), dec(10000), OpContext::default())
            .await
            .unwrap();
        assert_eq!(receipt.entries.len(), 1);

        let summary = economy.get_balance(&alice).unwrap();
        assert_eq!(summary.balance, dec(10000));
        assert_eq!(summary.total_credits, dec(10000));
        assert_eq!(summary.total_debits, Decimal::ZERO);

        economy.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_audit_trail_written() {
        let (economy, _temp) = create_test_ledger().await;
        let alice = UserId::new("alice");

        let ctx = OpContext {
            request_id: Some("req-77".to_string()),
            source_ip: Some("10.0.0.1".to_string()),
        };
        economy
            .execute_purchase(alice.clone(), dec(10000), ctx)
            .await
            .unwrap();
        economy
            .execute_transfer(alice, UserId::new("bob"), dec(5000), OpContext::default())
            .await
            .unwrap();

        let records = economy.audit_records(10).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].action, "purchase");
        assert_eq!(records[0].request_id, Some("req-77".to_string()));
        assert_eq!(records[1].action, "transfer");
        assert_eq!(records[1].entry_ids.len(), 2);

        economy.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_conservation_report() {
        let (economy, _temp) = create_test_ledger().await;
        let ctx = OpContext::default();

        economy
            .execute_purchase(UserId::new("alice"), dec(10000), ctx.clone())
            .await
            .unwrap();
        economy
            .execute_transfer(
                UserId::new("alice"),
                UserId::new("bob"),
                dec(4000),
                ctx.clone(),
            )
            .await
            .unwrap();

        let report = economy.check_conservation().unwrap();
        assert!(report.conserved);
        assert_eq!(report.total_purchased, dec(10000));
        assert_eq!(report.total_withdrawn, Decimal::ZERO);
        assert_eq!(report.total_balances, dec(10000));

        economy.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_unknown_event_type_rejected() {
        let (economy, _temp) = create_test_ledger().await;

        let err = economy
            .apply_external_event(
                "evt_1",
                "payment.unheard_of",
                serde_json::json!({}),
                OpContext::default(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidEvent(_)));

        economy.shutdown().await.unwrap();
    }
}
