use crate::domain::ports::RecordStore;
use crate::domain::stored::StoredTransactionRecord;
use crate::error::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// A thread-safe in-memory store for the offline ledger.
///
/// Uses `Arc<RwLock<HashMap<String, StoredTransactionRecord>>>` for shared
/// concurrent access. Ideal for tests and embedders that bring their own
/// durability.
#[derive(Default, Clone)]
pub struct InMemoryRecordStore {
    records: Arc<RwLock<HashMap<String, StoredTransactionRecord>>>,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn put(&self, record: StoredTransactionRecord) -> Result<()> {
        let mut records = self.records.write().await;
        records.insert(record.id.clone(), record);
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<StoredTransactionRecord>> {
        let records = self.records.read().await;
        Ok(records.get(id).cloned())
    }

    async fn all(&self) -> Result<Vec<StoredTransactionRecord>> {
        let records = self.records.read().await;
        Ok(records.values().cloned().collect())
    }

    async fn remove(&self, id: &str) -> Result<bool> {
        let mut records = self.records.write().await;
        Ok(records.remove(id).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::stored::StoredState;
    use crate::domain::transaction::TransactionKind;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn record(id: &str) -> StoredTransactionRecord {
        StoredTransactionRecord {
            id: id.to_string(),
            state: StoredState::Stored,
            total_amount: dec!(1.31),
            created_on: Utc::now(),
            card: None,
            transaction_type: TransactionKind::Sale,
        }
    }

    #[tokio::test]
    async fn put_get_roundtrip() {
        let store = InMemoryRecordStore::new();
        store.put(record("tp-1")).await.unwrap();

        let retrieved = store.get("tp-1").await.unwrap().unwrap();
        assert_eq!(retrieved.total_amount, dec!(1.31));
        assert!(store.get("tp-2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn remove_reports_presence() {
        let store = InMemoryRecordStore::new();
        store.put(record("tp-1")).await.unwrap();

        assert!(store.remove("tp-1").await.unwrap());
        assert!(!store.remove("tp-1").await.unwrap());
        assert_eq!(store.all().await.unwrap().len(), 0);
    }
}
