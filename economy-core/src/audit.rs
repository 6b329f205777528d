//! Audit port
//!
//! Every economic action emits one [`AuditRecord`] through an [`AuditSink`]
//! injected at construction, so the core carries no ambient global sink and
//! tests can swap in a recording fake. Audit is best-effort logging, not a
//! consistency gate: a sink failure is logged and never rolls back the
//! operation that produced the record.

use crate::storage::Storage;
use crate::types::AuditRecord;
use std::sync::Arc;

/// Destination for audit records
pub trait AuditSink: Send + Sync {
    /// Record one economic action; must not fail the calling operation
    fn record(&self, record: &AuditRecord);
}

/// Sink that persists records to the `audit_log` column family and mirrors
/// them to tracing
pub struct StorageAuditSink {
    storage: Arc<Storage>,
}

impl StorageAuditSink {
    /// Create a sink over the given storage
    pub fn new(storage: Arc<Storage>) -> Self {
        Self { storage }
    }
}

impl AuditSink for StorageAuditSink {
    fn record(&self, record: &AuditRecord) {
        tracing::info!(
            trace_id = %record.trace_id,
            action = %record.action,
            actor = ?record.actor,
            amount = ?record.amount,
            entries = record.entry_ids.len(),
            "economy audit"
        );

        if let Err(e) = self.storage.append_audit(record) {
            tracing::warn!(trace_id = %record.trace_id, error = %e, "Audit record dropped");
        }
    }
}

/// Sink that discards every record
///
/// Useful when a caller embeds the core somewhere audit persistence is
/// handled out-of-process.
pub struct NullAuditSink;

impl AuditSink for NullAuditSink {
    fn record(&self, _record: &AuditRecord) {}
}
