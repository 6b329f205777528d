//! Storage layer using RocksDB
//!
//! # Column Families
//!
//! - `ledger` - Append-only ledger rows (key: entry id)
//! - `withdrawals` - Withdrawal requests (key: withdrawal id)
//! - `processed_events` - Idempotency markers (key: external event id)
//! - `audit_log` - Append-only audit records (key: trace id)
//! - `indices` - Secondary indices for per-user lookups
//!
//! Only `ledger` is authoritative for balance. All writes belonging to one
//! economic operation go through [`Storage::commit`] as a single
//! [`WriteBatch`]: every row lands or none do.

use crate::{
    error::{Error, Result},
    types::{AuditRecord, LedgerEntry, ProcessedEvent, UserId, Withdrawal},
    Config,
};
use rocksdb::{
    ColumnFamily, ColumnFamilyDescriptor, DBCompactionStyle, Direction, IteratorMode, Options,
    WriteBatch, DB,
};
use std::sync::Arc;
use uuid::Uuid;

/// Column family names
const CF_LEDGER: &str = "ledger";
const CF_WITHDRAWALS: &str = "withdrawals";
const CF_PROCESSED_EVENTS: &str = "processed_events";
const CF_AUDIT_LOG: &str = "audit_log";
const CF_INDICES: &str = "indices";

/// Index namespace tags inside `indices`
const IDX_USER_ENTRY: &[u8] = b"ue|";
const IDX_USER_WITHDRAWAL: &[u8] = b"uw|";

/// One atomic unit of ledger mutation
///
/// Everything an economic operation writes — appended rows, status flips,
/// the withdrawal it touched, the idempotency marker — commits together.
#[derive(Debug, Default)]
pub struct CommitBatch {
    /// New ledger rows to append
    pub appends: Vec<LedgerEntry>,

    /// Existing rows rewritten with `status = Reversed` (the one permitted
    /// in-place mutation; financial fields must be unchanged)
    pub flips: Vec<LedgerEntry>,

    /// Withdrawal to insert or update
    pub withdrawal: Option<Withdrawal>,

    /// Idempotency marker to record
    pub processed_event: Option<ProcessedEvent>,
}

impl CommitBatch {
    /// Batch that only appends ledger rows
    pub fn appending(entries: Vec<LedgerEntry>) -> Self {
        Self {
            appends: entries,
            ..Default::default()
        }
    }

    /// Whether the batch writes anything at all
    pub fn is_empty(&self) -> bool {
        self.appends.is_empty()
            && self.flips.is_empty()
            && self.withdrawal.is_none()
            && self.processed_event.is_none()
    }
}

/// Storage wrapper for RocksDB
pub struct Storage {
    db: Arc<DB>,
}

impl Storage {
    /// Open or create database
    pub fn open(config: &Config) -> Result<Self> {
        let path = &config.data_dir;

        std::fs::create_dir_all(path)?;

        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);

        // Tuning from config
        db_opts.set_write_buffer_size(config.rocksdb.write_buffer_size_mb * 1024 * 1024);
        db_opts.set_max_write_buffer_number(config.rocksdb.max_write_buffer_number);
        db_opts.set_target_file_size_base(config.rocksdb.target_file_size_mb * 1024 * 1024);
        db_opts.set_max_background_jobs(config.rocksdb.max_background_jobs);
        db_opts.set_level_zero_file_num_compaction_trigger(
            config.rocksdb.level0_file_num_compaction_trigger,
        );

        // Universal compaction for the append-heavy workload
        db_opts.set_compaction_style(DBCompactionStyle::Universal);

        if config.rocksdb.enable_statistics {
            db_opts.enable_statistics();
        }

        let cf_descriptors = vec![
            ColumnFamilyDescriptor::new(CF_LEDGER, Self::cf_options_ledger()),
            ColumnFamilyDescriptor::new(CF_WITHDRAWALS, Self::cf_options_withdrawals()),
            ColumnFamilyDescriptor::new(CF_PROCESSED_EVENTS, Self::cf_options_processed_events()),
            ColumnFamilyDescriptor::new(CF_AUDIT_LOG, Self::cf_options_audit_log()),
            ColumnFamilyDescriptor::new(CF_INDICES, Self::cf_options_indices()),
        ];

        let db = DB::open_cf_descriptors(&db_opts, path, cf_descriptors)?;

        tracing::info!(path = ?path, "Opened economy store");

        Ok(Self { db: Arc::new(db) })
    }

    // Column family options

    fn cf_options_ledger() -> Options {
        let mut opts = Options::default();
        opts.set_compression_type(rocksdb::DBCompressionType::Zstd);
        opts.set_bottommost_compression_type(rocksdb::DBCompressionType::Zstd);
        opts
    }

    fn cf_options_withdrawals() -> Options {
        let mut opts = Options::default();
        // Small and frequently re-read during the workflow
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
        opts
    }

    fn cf_options_processed_events() -> Options {
        let mut opts = Options::default();
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
        opts
    }

    fn cf_options_audit_log() -> Options {
        let mut opts = Options::default();
        opts.set_compression_type(rocksdb::DBCompressionType::Zstd);
        opts
    }

    fn cf_options_indices() -> Options {
        let mut opts = Options::default();
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
        // Point lookups on indices benefit from bloom filters
        let mut block_opts = rocksdb::BlockBasedOptions::default();
        block_opts.set_bloom_filter(10.0, false);
        opts.set_block_based_table_factory(&block_opts);
        opts
    }

    fn cf_handle(&self, name: &str) -> Result<&ColumnFamily> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| Error::StoreUnavailable(format!("Column family {} not found", name)))
    }

    // Atomic commit

    /// Apply one [`CommitBatch`] atomically
    ///
    /// Appended rows also get an index row per involved user. Flipped rows
    /// only rewrite the ledger row: their index rows already exist.
    pub fn commit(&self, batch: &CommitBatch) -> Result<()> {
        let cf_ledger = self.cf_handle(CF_LEDGER)?;
        let cf_withdrawals = self.cf_handle(CF_WITHDRAWALS)?;
        let cf_processed = self.cf_handle(CF_PROCESSED_EVENTS)?;
        let cf_indices = self.cf_handle(CF_INDICES)?;

        let mut wb = WriteBatch::default();

        for entry in &batch.appends {
            let value = bincode::serialize(entry)?;
            wb.put_cf(cf_ledger, entry.id.as_bytes(), &value);

            if let Some(user) = &entry.from_user {
                wb.put_cf(cf_indices, Self::index_key_user_entry(user, entry.id), &[]);
            }
            if let Some(user) = &entry.to_user {
                wb.put_cf(cf_indices, Self::index_key_user_entry(user, entry.id), &[]);
            }
        }

        for entry in &batch.flips {
            let value = bincode::serialize(entry)?;
            wb.put_cf(cf_ledger, entry.id.as_bytes(), &value);
        }

        if let Some(withdrawal) = &batch.withdrawal {
            let value = bincode::serialize(withdrawal)?;
            wb.put_cf(cf_withdrawals, withdrawal.id.as_bytes(), &value);
            wb.put_cf(
                cf_indices,
                Self::index_key_user_withdrawal(&withdrawal.user_id, withdrawal.id),
                &[],
            );
        }

        if let Some(event) = &batch.processed_event {
            let value = bincode::serialize(event)?;
            wb.put_cf(cf_processed, event.event_id.as_bytes(), &value);
        }

        self.db.write(wb)?;

        tracing::debug!(
            appended = batch.appends.len(),
            flipped = batch.flips.len(),
            withdrawal = batch.withdrawal.is_some(),
            marker = batch.processed_event.is_some(),
            "Batch committed"
        );

        Ok(())
    }

    // Ledger reads

    /// Get entry by ID
    pub fn get_entry(&self, entry_id: Uuid) -> Result<LedgerEntry> {
        let cf = self.cf_handle(CF_LEDGER)?;

        let value = self
            .db
            .get_cf(cf, entry_id.as_bytes())?
            .ok_or(Error::EntryNotFound(entry_id))?;

        let entry: LedgerEntry = bincode::deserialize(&value)?;
        Ok(entry)
    }

    /// All entries involving a user, ordered by time
    ///
    /// Entry ids are UUIDv7, so the index scan yields insertion order.
    pub fn user_entries(&self, user: &UserId) -> Result<Vec<LedgerEntry>> {
        let mut prefix = IDX_USER_ENTRY.to_vec();
        prefix.extend_from_slice(user.as_str().as_bytes());
        prefix.push(b'|');

        let mut entries = Vec::new();
        for key in self.scan_index_keys(&prefix)? {
            // Entry id is the final 16 bytes of the index key
            if key.len() >= prefix.len() + 16 {
                let id_bytes: [u8; 16] = key[key.len() - 16..].try_into().expect("sliced 16 bytes");
                entries.push(self.get_entry(Uuid::from_bytes(id_bytes))?);
            }
        }

        Ok(entries)
    }

    /// Full ledger scan, ordered by entry id (time order for UUIDv7 keys)
    pub fn all_entries(&self) -> Result<Vec<LedgerEntry>> {
        let cf = self.cf_handle(CF_LEDGER)?;

        let mut entries = Vec::new();
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (_, value) = item?;
            entries.push(bincode::deserialize::<LedgerEntry>(&value)?);
        }

        Ok(entries)
    }

    // Withdrawal reads

    /// Get withdrawal by ID
    pub fn get_withdrawal(&self, withdrawal_id: Uuid) -> Result<Withdrawal> {
        let cf = self.cf_handle(CF_WITHDRAWALS)?;

        let value = self
            .db
            .get_cf(cf, withdrawal_id.as_bytes())?
            .ok_or(Error::WithdrawalNotFound(withdrawal_id))?;

        let withdrawal: Withdrawal = bincode::deserialize(&value)?;
        Ok(withdrawal)
    }

    /// All withdrawals for a user, ordered by time
    pub fn user_withdrawals(&self, user: &UserId) -> Result<Vec<Withdrawal>> {
        let mut prefix = IDX_USER_WITHDRAWAL.to_vec();
        prefix.extend_from_slice(user.as_str().as_bytes());
        prefix.push(b'|');

        let mut withdrawals = Vec::new();
        for key in self.scan_index_keys(&prefix)? {
            if key.len() >= prefix.len() + 16 {
                let id_bytes: [u8; 16] = key[key.len() - 16..].try_into().expect("sliced 16 bytes");
                withdrawals.push(self.get_withdrawal(Uuid::from_bytes(id_bytes))?);
            }
        }

        Ok(withdrawals)
    }

    // Idempotency markers

    /// Look up the marker for an external event id
    pub fn get_processed_event(&self, event_id: &str) -> Result<Option<ProcessedEvent>> {
        let cf = self.cf_handle(CF_PROCESSED_EVENTS)?;

        match self.db.get_cf(cf, event_id.as_bytes())? {
            Some(value) => Ok(Some(bincode::deserialize(&value)?)),
            None => Ok(None),
        }
    }

    // Audit log

    /// Append one audit record (outside any operation batch)
    pub fn append_audit(&self, record: &AuditRecord) -> Result<()> {
        let cf = self.cf_handle(CF_AUDIT_LOG)?;
        let value = bincode::serialize(record)?;

        self.db.put_cf(cf, record.trace_id.as_bytes(), &value)?;

        Ok(())
    }

    /// Audit records in time order, up to `limit`
    pub fn audit_records(&self, limit: usize) -> Result<Vec<AuditRecord>> {
        let cf = self.cf_handle(CF_AUDIT_LOG)?;

        let mut records = Vec::new();
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (_, value) = item?;
            records.push(bincode::deserialize::<AuditRecord>(&value)?);
            if records.len() >= limit {
                break;
            }
        }

        Ok(records)
    }

    // Index helpers

    fn index_key_user_entry(user: &UserId, entry_id: Uuid) -> Vec<u8> {
        let mut key = IDX_USER_ENTRY.to_vec();
        key.extend_from_slice(user.as_str().as_bytes());
        key.push(b'|');
        key.extend_from_slice(entry_id.as_bytes());
        key
    }

    fn index_key_user_withdrawal(user: &UserId, withdrawal_id: Uuid) -> Vec<u8> {
        let mut key = IDX_USER_WITHDRAWAL.to_vec();
        key.extend_from_slice(user.as_str().as_bytes());
        key.push(b'|');
        key.extend_from_slice(withdrawal_id.as_bytes());
        key
    }

    /// Collect index keys under a prefix, stopping at the first non-match
    fn scan_index_keys(&self, prefix: &[u8]) -> Result<Vec<Box<[u8]>>> {
        let cf = self.cf_handle(CF_INDICES)?;

        let mut keys = Vec::new();
        let iter = self
            .db
            .iterator_cf(cf, IteratorMode::From(prefix, Direction::Forward));
        for item in iter {
            let (key, _) = item?;
            if !key.starts_with(prefix) {
                break;
            }
            keys.push(key);
        }

        Ok(keys)
    }

    // Statistics

    /// Get storage statistics
    pub fn get_stats(&self) -> Result<StorageStats> {
        let total_entries = self.approximate_count(self.cf_handle(CF_LEDGER)?)?;
        let total_withdrawals = self.approximate_count(self.cf_handle(CF_WITHDRAWALS)?)?;
        let total_processed_events =
            self.approximate_count(self.cf_handle(CF_PROCESSED_EVENTS)?)?;

        Ok(StorageStats {
            total_entries,
            total_withdrawals,
            total_processed_events,
        })
    }

    fn approximate_count(&self, cf: &ColumnFamily) -> Result<u64> {
        let prop = self
            .db
            .property_int_value_cf(cf, "rocksdb.estimate-num-keys")?
            .unwrap_or(0);

        Ok(prop)
    }
}

/// Storage statistics
#[derive(Debug, Clone)]
pub struct StorageStats {
    /// Approximate ledger row count
    pub total_entries: u64,
    /// Approximate withdrawal count
    pub total_withdrawals: u64,
    /// Approximate idempotency marker count
    pub total_processed_events: u64,
}
