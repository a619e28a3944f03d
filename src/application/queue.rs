use crate::config::StoreAndForwardConfig;
use crate::domain::ports::{HostForwarderBox, RecordStoreBox};
use crate::domain::stored::{StoredState, StoredTransactionRecord};
use crate::domain::transaction::{CardSummary, TransactionRequest};
use crate::error::{Result, TerminalError};
use chrono::{Duration as ChronoDuration, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Outcome of a manual forward attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ForwardOutcome {
    /// The host accepted the record; it is now Processed.
    Settled { host_transaction_id: String },
    /// The record was already Processed; nothing was submitted.
    AlreadyProcessed,
    /// The host could not be reached; the record is back in Stored and may
    /// be retried.
    Retained { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForwardResult {
    pub id: String,
    pub outcome: ForwardOutcome,
}

/// Durable ledger of transactions accepted by the device without host
/// confirmation, and the means to later reconcile them.
pub struct OfflineQueue {
    store: RecordStoreBox,
    forwarder: HostForwarderBox,
    config: StoreAndForwardConfig,
    /// Per-record serialization for forward: the same id is never submitted
    /// to the host twice concurrently.
    forward_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    sequence: AtomicU64,
}

impl OfflineQueue {
    pub fn new(
        store: RecordStoreBox,
        forwarder: HostForwarderBox,
        config: StoreAndForwardConfig,
    ) -> Self {
        Self {
            store,
            forwarder,
            config,
            forward_locks: Mutex::new(HashMap::new()),
            sequence: AtomicU64::new(0),
        }
    }

    /// All non-Deleted records in stable order (creation time, then id).
    pub async fn list(&self) -> Result<Vec<StoredTransactionRecord>> {
        let mut records: Vec<_> = self
            .store
            .all()
            .await?
            .into_iter()
            .filter(|r| r.state != StoredState::Deleted)
            .collect();
        records.sort_by(|a, b| a.created_on.cmp(&b.created_on).then(a.id.cmp(&b.id)));
        Ok(records)
    }

    pub async fn get(&self, id: &str) -> Result<StoredTransactionRecord> {
        self.store
            .get(id)
            .await?
            .ok_or_else(|| TerminalError::NotFound(id.to_string()))
    }

    pub async fn list_by_state(&self, state: StoredState) -> Result<Vec<StoredTransactionRecord>> {
        Ok(self
            .list()
            .await?
            .into_iter()
            .filter(|r| r.state == state)
            .collect())
    }

    /// Attempts to settle one stored record with the host processor. Success
    /// moves it to Processed; a host failure returns it to Stored for retry.
    /// A record that is already Processed is a no-op success. The record is
    /// never deleted by this path.
    pub async fn forward(&self, id: &str) -> Result<ForwardResult> {
        let lock = self.forward_lock(id).await;
        let result = {
            let _guard = lock.lock().await;
            self.forward_locked(id).await
        };
        self.prune_forward_lock(id, &lock).await;
        result
    }

    async fn forward_locked(&self, id: &str) -> Result<ForwardResult> {
        let mut record = self.get(id).await?;
        match record.state {
            StoredState::Processed => {
                return Ok(ForwardResult {
                    id: id.to_string(),
                    outcome: ForwardOutcome::AlreadyProcessed,
                });
            }
            StoredState::Deleted => {
                return Err(TerminalError::NotFound(id.to_string()));
            }
            StoredState::Processing => {
                // Live forwards hold the per-id lock, so Processing seen here
                // means an earlier attempt died before persisting its outcome.
                // Settlement status is unknown; resume the forward.
                warn!(tp_id = %id, "resuming stale Processing record");
            }
            StoredState::Stored | StoredState::PendingSecondaryAuth => {}
        }

        record.advance(StoredState::Processing)?;
        self.store.put(record.clone()).await?;

        match self.forwarder.forward(&record).await {
            Ok(ack) => {
                record.advance(StoredState::Processed)?;
                self.store.put(record).await?;
                info!(tp_id = %id, host_transaction_id = %ack.host_transaction_id, "stored transaction settled");
                Ok(ForwardResult {
                    id: id.to_string(),
                    outcome: ForwardOutcome::Settled {
                        host_transaction_id: ack.host_transaction_id,
                    },
                })
            }
            Err(err) => {
                record.advance(StoredState::Stored)?;
                self.store.put(record).await?;
                warn!(tp_id = %id, %err, "forward failed, record retained");
                Ok(ForwardResult {
                    id: id.to_string(),
                    outcome: ForwardOutcome::Retained {
                        reason: err.to_string(),
                    },
                })
            }
        }
    }

    /// Operator convenience: forwards every forwardable record (Stored or
    /// PendingSecondaryAuth), reporting one outcome per record.
    pub async fn forward_all(&self) -> Result<Vec<ForwardResult>> {
        let mut results = Vec::new();
        for record in self.list().await? {
            if record.state.is_forwardable() {
                results.push(self.forward(&record.id).await?);
            }
        }
        Ok(results)
    }

    /// Marks a record Deleted. Returns false for unknown or already-Deleted
    /// ids; the record stays on disk until reclamation purges it. Takes the
    /// per-id forward lock, so a delete racing an in-flight forward waits it
    /// out and then still wins (Processed -> Deleted is legal).
    pub async fn delete(&self, id: &str) -> Result<bool> {
        let lock = self.forward_lock(id).await;
        let result = {
            let _guard = lock.lock().await;
            self.delete_locked(id).await
        };
        self.prune_forward_lock(id, &lock).await;
        result
    }

    async fn delete_locked(&self, id: &str) -> Result<bool> {
        let Some(mut record) = self.store.get(id).await? else {
            return Ok(false);
        };
        if record.state == StoredState::Deleted {
            return Ok(false);
        }
        record.advance(StoredState::Deleted)?;
        self.store.put(record).await?;
        Ok(true)
    }

    /// Admission gate for the transaction path: a record is only created when
    /// storing is allowed and both the per-transaction and the aggregate
    /// outstanding limits hold. A violation fails the originating transaction
    /// outright; nothing is queued.
    pub(crate) async fn admit(
        &self,
        request: &TransactionRequest,
        card: Option<CardSummary>,
    ) -> Result<StoredTransactionRecord> {
        if !self.config.storing_transactions_allowed {
            return Err(TerminalError::HostUnreachable(
                "host unreachable and offline storing is disabled".to_string(),
            ));
        }
        if request.amount > self.config.transaction_amount_limit {
            return Err(TerminalError::QueueLimitExceeded(format!(
                "amount {} exceeds per-transaction limit {}",
                request.amount, self.config.transaction_amount_limit
            )));
        }
        let outstanding: rust_decimal::Decimal = self
            .store
            .all()
            .await?
            .iter()
            .filter(|r| r.state.is_outstanding())
            .map(|r| r.total_amount)
            .sum();
        if outstanding + request.amount > self.config.unprocessed_total_amount_limit {
            return Err(TerminalError::QueueLimitExceeded(format!(
                "outstanding total {} + {} exceeds aggregate limit {}",
                outstanding, request.amount, self.config.unprocessed_total_amount_limit
            )));
        }

        let record = StoredTransactionRecord {
            id: self.next_tp_id(),
            state: StoredState::Stored,
            total_amount: request.amount,
            created_on: Utc::now(),
            card,
            transaction_type: request.kind,
        };
        self.store.put(record.clone()).await?;
        debug!(tp_id = %record.id, "stored transaction record created");
        Ok(record)
    }

    /// Physically purges Processed records older than the retention window,
    /// plus anything marked Deleted. Stored and Processing records are never
    /// reclaimed regardless of age.
    pub async fn reclaim(&self) -> Result<usize> {
        let cutoff =
            Utc::now() - ChronoDuration::days(self.config.days_to_retain_processed_transactions);
        let mut purged = 0;
        for record in self.store.all().await? {
            let eligible = match record.state {
                StoredState::Deleted => true,
                StoredState::Processed => record.created_on < cutoff,
                _ => false,
            };
            if eligible && self.store.remove(&record.id).await? {
                purged += 1;
            }
        }
        if purged > 0 {
            info!(purged, "reclaimed stored transaction records");
        }
        Ok(purged)
    }

    fn next_tp_id(&self) -> String {
        let seq = self.sequence.fetch_add(1, Ordering::Relaxed);
        format!("tp-{}-{:04}", Utc::now().timestamp_millis(), seq)
    }

    async fn forward_lock(&self, id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.forward_locks.lock().await;
        locks
            .entry(id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Drops the lock entry once nobody else holds it, keeping the map
    /// bounded on long-running lanes.
    async fn prune_forward_lock(&self, id: &str, lock: &Arc<Mutex<()>>) {
        let mut locks = self.forward_locks.lock().await;
        // Two strong refs are the map entry plus ours; more means another
        // task is using or waiting on this id.
        if Arc::strong_count(lock) == 2 {
            locks.remove(id);
        }
    }
}
