use crate::domain::ports::RecordStore;
use crate::domain::stored::StoredTransactionRecord;
use crate::error::{Result, TerminalError};
use async_trait::async_trait;
use rocksdb::{ColumnFamilyDescriptor, DB, Options};
use std::path::Path;
use std::sync::Arc;

/// Column family for the offline ledger.
pub const CF_STORED: &str = "stored_transactions";

/// A persistent ledger store backed by RocksDB, keyed by tpId.
///
/// This struct is thread-safe (`Clone` shares the underlying `Arc<DB>`).
#[derive(Clone)]
pub struct RocksDbRecordStore {
    db: Arc<DB>,
}

impl RocksDbRecordStore {
    /// Opens or creates a RocksDB instance at the specified path, ensuring
    /// the ledger column family exists.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cf_stored = ColumnFamilyDescriptor::new(CF_STORED, Options::default());
        let db = DB::open_cf_descriptors(&opts, path, vec![cf_stored])?;

        Ok(Self { db: Arc::new(db) })
    }

    fn cf(&self) -> Result<&rocksdb::ColumnFamily> {
        self.db
            .cf_handle(CF_STORED)
            .ok_or_else(|| TerminalError::Storage("ledger column family not found".to_string()))
    }
}

#[async_trait]
impl RecordStore for RocksDbRecordStore {
    async fn put(&self, record: StoredTransactionRecord) -> Result<()> {
        let cf = self.cf()?;
        let value = serde_json::to_vec(&record)
            .map_err(|e| TerminalError::Storage(format!("serialization error: {e}")))?;
        self.db.put_cf(cf, record.id.as_bytes(), value)?;
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<StoredTransactionRecord>> {
        let cf = self.cf()?;
        match self.db.get_cf(cf, id.as_bytes())? {
            Some(bytes) => {
                let record = serde_json::from_slice(&bytes)
                    .map_err(|e| TerminalError::Storage(format!("deserialization error: {e}")))?;
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }

    async fn all(&self) -> Result<Vec<StoredTransactionRecord>> {
        let cf = self.cf()?;
        let mut records = Vec::new();
        for item in self.db.iterator_cf(cf, rocksdb::IteratorMode::Start) {
            let (_key, value) =
                item.map_err(|e| TerminalError::Storage(format!("iteration error: {e}")))?;
            let record: StoredTransactionRecord = serde_json::from_slice(&value)
                .map_err(|e| TerminalError::Storage(format!("deserialization error: {e}")))?;
            records.push(record);
        }
        Ok(records)
    }

    async fn remove(&self, id: &str) -> Result<bool> {
        let cf = self.cf()?;
        let exists = self.db.get_pinned_cf(cf, id.as_bytes())?.is_some();
        if exists {
            self.db.delete_cf(cf, id.as_bytes())?;
        }
        Ok(exists)
    }
}
