//! Actor-based concurrency for the economy core
//!
//! One logical writer task serializes every mutating operation. The actor is
//! the transaction boundary: each message is handled start-to-finish before
//! the next one is picked up, so the balance a handler derives cannot change
//! under it before its `WriteBatch` commits. Two concurrent debits against
//! the same account therefore resolve in some serial order, and the loser of
//! that order sees the drained balance and fails — no double spend.
//!
//! Reads never enter the mailbox; they go straight to storage.

use crate::{
    engine::Engine,
    error::{Error, Result},
    metrics::Metrics,
    types::{EventOutcome, ExternalEventKind, OpContext, Receipt, UserId, Withdrawal},
};
use rust_decimal::Decimal;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

/// Message sent to the economy actor
pub enum EconomyMessage {
    /// External funding credit
    Purchase {
        /// Funded user
        user: UserId,
        /// Gross amount
        amount: Decimal,
        /// Provenance
        ctx: OpContext,
        /// Reply channel
        response: oneshot::Sender<Result<Receipt>>,
    },

    /// User-to-user transfer
    Transfer {
        /// Sender
        from: UserId,
        /// Recipient
        to: UserId,
        /// Gross amount
        amount: Decimal,
        /// Provenance
        ctx: OpContext,
        /// Reply channel
        response: oneshot::Sender<Result<Receipt>>,
    },

    /// Marketplace purchase
    MarketplacePurchase {
        /// Buyer
        buyer: UserId,
        /// Seller
        seller: UserId,
        /// Gross amount
        amount: Decimal,
        /// Listing being bought
        listing_id: String,
        /// Provenance
        ctx: OpContext,
        /// Reply channel
        response: oneshot::Sender<Result<Receipt>>,
    },

    /// Royalty payout from the platform account
    RoyaltyPayout {
        /// Receiving creator
        creator: UserId,
        /// Gross amount
        amount: Decimal,
        /// Provenance
        ctx: OpContext,
        /// Reply channel
        response: oneshot::Sender<Result<Receipt>>,
    },

    /// Reversal of a prior entry
    Reversal {
        /// Entry to reverse
        entry_id: Uuid,
        /// Reason recorded with the reversal
        reason: String,
        /// Provenance
        ctx: OpContext,
        /// Reply channel
        response: oneshot::Sender<Result<Receipt>>,
    },

    /// Create a pending withdrawal
    RequestWithdrawal {
        /// Requesting user
        user: UserId,
        /// Gross amount
        amount: Decimal,
        /// Provenance
        ctx: OpContext,
        /// Reply channel
        response: oneshot::Sender<Result<Withdrawal>>,
    },

    /// Approve a pending withdrawal
    ApproveWithdrawal {
        /// Withdrawal to approve
        withdrawal_id: Uuid,
        /// Approving reviewer
        reviewer: UserId,
        /// Provenance
        ctx: OpContext,
        /// Reply channel
        response: oneshot::Sender<Result<Withdrawal>>,
    },

    /// Post the ledger debit for an approved withdrawal
    ProcessWithdrawal {
        /// Withdrawal to process
        withdrawal_id: Uuid,
        /// Provenance
        ctx: OpContext,
        /// Reply channel
        response: oneshot::Sender<Result<Withdrawal>>,
    },

    /// Mark a processing withdrawal complete
    CompleteWithdrawal {
        /// Withdrawal to complete
        withdrawal_id: Uuid,
        /// Provenance
        ctx: OpContext,
        /// Reply channel
        response: oneshot::Sender<Result<Withdrawal>>,
    },

    /// Cancel a pending or approved withdrawal
    CancelWithdrawal {
        /// Withdrawal to cancel
        withdrawal_id: Uuid,
        /// Owner requesting cancellation
        user: UserId,
        /// Provenance
        ctx: OpContext,
        /// Reply channel
        response: oneshot::Sender<Result<Withdrawal>>,
    },

    /// Apply an externally delivered event exactly once
    ExternalEvent {
        /// External event id
        event_id: String,
        /// Interpreted event kind
        kind: ExternalEventKind,
        /// Provider payload
        payload: Value,
        /// Provenance
        ctx: OpContext,
        /// Reply channel
        response: oneshot::Sender<Result<EventOutcome>>,
    },

    /// Shutdown actor
    Shutdown,
}

impl EconomyMessage {
    /// Operation name for metrics
    fn op_name(&self) -> &'static str {
        match self {
            EconomyMessage::Purchase { .. } => "purchase",
            EconomyMessage::Transfer { .. } => "transfer",
            EconomyMessage::MarketplacePurchase { .. } => "marketplace_purchase",
            EconomyMessage::RoyaltyPayout { .. } => "royalty_payout",
            EconomyMessage::Reversal { .. } => "reversal",
            EconomyMessage::RequestWithdrawal { .. } => "withdrawal_request",
            EconomyMessage::ApproveWithdrawal { .. } => "withdrawal_approve",
            EconomyMessage::ProcessWithdrawal { .. } => "withdrawal_process",
            EconomyMessage::CompleteWithdrawal { .. } => "withdrawal_complete",
            EconomyMessage::CancelWithdrawal { .. } => "withdrawal_cancel",
            EconomyMessage::ExternalEvent { .. } => "external_event",
            EconomyMessage::Shutdown => "shutdown",
        }
    }
}

/// Actor that processes economy messages
pub struct EconomyActor {
    /// Orchestration core
    engine: Engine,

    /// Mailbox for incoming messages
    mailbox: mpsc::Receiver<EconomyMessage>,

    /// Metrics collector
    metrics: Arc<Metrics>,
}

impl EconomyActor {
    /// Create new actor
    pub fn new(engine: Engine, mailbox: mpsc::Receiver<EconomyMessage>, metrics: Arc<Metrics>) -> Self {
        Self {
            engine,
            mailbox,
            metrics,
        }
    }

    /// Run the actor event loop
    pub async fn run(mut self) {
        while let Some(msg) = self.mailbox.recv().await {
            if matches!(msg, EconomyMessage::Shutdown) {
                break;
            }
            self.handle_message(msg);
        }

        tracing::debug!("Economy actor stopped");
    }

    /// Handle a single message
    fn handle_message(&mut self, msg: EconomyMessage) {
        let op = msg.op_name();
        let timer = self.metrics.op_duration.start_timer();

        match msg {
            EconomyMessage::Purchase {
                user,
                amount,
                ctx,
                response,
            } => {
                let result = self.engine.purchase(user, amount, &ctx);
                self.observe(op, &result);
                let _ = response.send(result);
            }

            EconomyMessage::Transfer {
                from,
                to,
                amount,
                ctx,
                response,
            } => {
                let result = self.engine.transfer(from, to, amount, &ctx);
                self.observe(op, &result);
                let _ = response.send(result);
            }

            EconomyMessage::MarketplacePurchase {
                buyer,
                seller,
                amount,
                listing_id,
                ctx,
                response,
            } => {
                let result =
                    self.engine
                        .marketplace_purchase(buyer, seller, amount, &listing_id, &ctx);
                self.observe(op, &result);
                let _ = response.send(result);
            }

            EconomyMessage::RoyaltyPayout {
                creator,
                amount,
                ctx,
                response,
            } => {
                let result = self.engine.royalty_payout(creator, amount, &ctx);
                self.observe(op, &result);
                let _ = response.send(result);
            }

            EconomyMessage::Reversal {
                entry_id,
                reason,
                ctx,
                response,
            } => {
                let result = self.engine.reversal(entry_id, &reason, &ctx);
                self.observe(op, &result);
                let _ = response.send(result);
            }

            EconomyMessage::RequestWithdrawal {
                user,
                amount,
                ctx,
                response,
            } => {
                let result = self.engine.request_withdrawal(user, amount, &ctx);
                self.observe(op, &result);
                let _ = response.send(result);
            }

            EconomyMessage::ApproveWithdrawal {
                withdrawal_id,
                reviewer,
                ctx,
                response,
            } => {
                let result = self.engine.approve_withdrawal(withdrawal_id, reviewer, &ctx);
                self.observe(op, &result);
                let _ = response.send(result);
            }

            EconomyMessage::ProcessWithdrawal {
                withdrawal_id,
                ctx,
                response,
            } => {
                let result = self.engine.process_withdrawal(withdrawal_id, &ctx);
                self.observe(op, &result);
                let _ = response.send(result);
            }

            EconomyMessage::CompleteWithdrawal {
                withdrawal_id,
                ctx,
                response,
            } => {
                let result = self.engine.complete_withdrawal(withdrawal_id, &ctx);
                self.observe(op, &result);
                let _ = response.send(result);
            }

            EconomyMessage::CancelWithdrawal {
                withdrawal_id,
                user,
                ctx,
                response,
            } => {
                let result = self.engine.cancel_withdrawal(withdrawal_id, user, &ctx);
                self.observe(op, &result);
                let _ = response.send(result);
            }

            EconomyMessage::ExternalEvent {
                event_id,
                kind,
                payload,
                ctx,
                response,
            } => {
                let result = self
                    .engine
                    .apply_external_event(&event_id, kind, &payload, &ctx);
                self.observe(op, &result);
                let _ = response.send(result);
            }

            EconomyMessage::Shutdown => {
                // Handled in main loop
            }
        }

        timer.observe_duration();
    }

    fn observe<T>(&self, op: &str, result: &Result<T>) {
        if let Err(e) = result {
            self.metrics.rejections_total.with_label_values(&[op]).inc();
            tracing::debug!(op, error = %e, "Operation rejected");
        }
    }
}

/// Handle for sending messages to the actor
#[derive(Clone)]
pub struct EconomyHandle {
    sender: mpsc::Sender<EconomyMessage>,
}

impl EconomyHandle {
    /// Create new handle
    pub fn new(sender: mpsc::Sender<EconomyMessage>) -> Self {
        Self { sender }
    }

    async fn send(&self, msg: EconomyMessage) -> Result<()> {
        self.sender
            .send(msg)
            .await
            .map_err(|_| Error::Concurrency("Actor mailbox closed".to_string()))
    }

    fn closed<T>() -> Result<T> {
        Err(Error::Concurrency("Response channel closed".to_string()))
    }

    /// External funding credit
    pub async fn purchase(&self, user: UserId, amount: Decimal, ctx: OpContext) -> Result<Receipt> {
        let (tx, rx) = oneshot::channel();
        self.send(EconomyMessage::Purchase {
            user,
            amount,
            ctx,
            response: tx,
        })
        .await?;
        rx.await.unwrap_or_else(|_| Self::closed())
    }

    /// User-to-user transfer
    pub async fn transfer(
        &self,
        from: UserId,
        to: UserId,
        amount: Decimal,
        ctx: OpContext,
    ) -> Result<Receipt> {
        let (tx, rx) = oneshot::channel();
        self.send(EconomyMessage::Transfer {
            from,
            to,
            amount,
            ctx,
            response: tx,
        })
        .await?;
        rx.await.unwrap_or_else(|_| Self::closed())
    }

    /// Marketplace purchase
    pub async fn marketplace_purchase(
        &self,
        buyer: UserId,
        seller: UserId,
        amount: Decimal,
        listing_id: String,
        ctx: OpContext,
    ) -> Result<Receipt> {
        let (tx, rx) = oneshot::channel();
        self.send(EconomyMessage::MarketplacePurchase {
            buyer,
            seller,
            amount,
            listing_id,
            ctx,
            response: tx,
        })
        .await?;
        rx.await.unwrap_or_else(|_| Self::closed())
    }

    /// Royalty payout
    pub async fn royalty_payout(
        &self,
        creator: UserId,
        amount: Decimal,
        ctx: OpContext,
    ) -> Result<Receipt> {
        let (tx, rx) = oneshot::channel();
        self.send(EconomyMessage::RoyaltyPayout {
            creator,
            amount,
            ctx,
            response: tx,
        })
        .await?;
        rx.await.unwrap_or_else(|_| Self::closed())
    }

    /// Reverse a prior entry
    pub async fn reversal(&self, entry_id: Uuid, reason: String, ctx: OpContext) -> Result<Receipt> {
        let (tx, rx) = oneshot::channel();
        self.send(EconomyMessage::Reversal {
            entry_id,
            reason,
            ctx,
            response: tx,
        })
        .await?;
        rx.await.unwrap_or_else(|_| Self::closed())
    }

    /// Create a pending withdrawal
    pub async fn request_withdrawal(
        &self,
        user: UserId,
        amount: Decimal,
        ctx: OpContext,
    ) -> Result<Withdrawal> {
        let (tx, rx) = oneshot::channel();
        self.send(EconomyMessage::RequestWithdrawal {
            user,
            amount,
            ctx,
            response: tx,
        })
        .await?;
        rx.await.unwrap_or_else(|_| Self::closed())
    }

    /// Approve a pending withdrawal
    pub async fn approve_withdrawal(
        &self,
        withdrawal_id: Uuid,
        reviewer: UserId,
        ctx: OpContext,
    ) -> Result<Withdrawal> {
        let (tx, rx) = oneshot::channel();
        self.send(EconomyMessage::ApproveWithdrawal {
            withdrawal_id,
            reviewer,
            ctx,
            response: tx,
        })
        .await?;
        rx.await.unwrap_or_else(|_| Self::closed())
    }

    /// Post the ledger debit for an approved withdrawal
    pub async fn process_withdrawal(&self, withdrawal_id: Uuid, ctx: OpContext) -> Result<Withdrawal> {
        let (tx, rx) = oneshot::channel();
        self.send(EconomyMessage::ProcessWithdrawal {
            withdrawal_id,
            ctx,
            response: tx,
        })
        .await?;
        rx.await.unwrap_or_else(|_| Self::closed())
    }

    /// Mark a processing withdrawal complete
    pub async fn complete_withdrawal(&self, withdrawal_id: Uuid, ctx: OpContext) -> Result<Withdrawal> {
        let (tx, rx) = oneshot::channel();
        self.send(EconomyMessage::CompleteWithdrawal {
            withdrawal_id,
            ctx,
            response: tx,
        })
        .await?;
        rx.await.unwrap_or_else(|_| Self::closed())
    }

    /// Cancel a pending or approved withdrawal
    pub async fn cancel_withdrawal(
        &self,
        withdrawal_id: Uuid,
        user: UserId,
        ctx: OpContext,
    ) -> Result<Withdrawal> {
        let (tx, rx) = oneshot::channel();
        self.send(EconomyMessage::CancelWithdrawal {
            withdrawal_id,
            user,
            ctx,
            response: tx,
        })
        .await?;
        rx.await.unwrap_or_else(|_| Self::closed())
    }

    /// Apply an externally delivered event exactly once
    pub async fn apply_external_event(
        &self,
        event_id: String,
        kind: ExternalEventKind,
        payload: Value,
        ctx: OpContext,
    ) -> Result<EventOutcome> {
        let (tx, rx) = oneshot::channel();
        self.send(EconomyMessage::ExternalEvent {
            event_id,
            kind,
            payload,
            ctx,
            response: tx,
        })
        .await?;
        rx.await.unwrap_or_else(|_| Self::closed())
    }

    /// Shutdown actor
    pub async fn shutdown(&self) -> Result<()> {
        self.send(EconomyMessage::Shutdown).await
    }
}

/// Spawn the economy actor
pub fn spawn_economy_actor(engine: Engine, metrics: Arc<Metrics>) -> EconomyHandle {
    let (tx, rx) = mpsc::channel(1000); // Bounded channel for backpressure
    let actor = EconomyActor::new(engine, rx, metrics);

    tokio::spawn(async move {
        actor.run().await;
    });

    EconomyHandle::new(tx)
}
