use crate::domain::transaction::{CardSummary, TransactionKind};
use crate::error::{Result, TerminalError};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StoredState {
    Stored,
    /// Written by the device when a record needs a second authorization pass
    /// before it can be forwarded; this crate forwards such records but never
    /// creates them.
    PendingSecondaryAuth,
    Processing,
    Processed,
    Deleted,
}

impl StoredState {
    pub fn is_forwardable(&self) -> bool {
        matches!(self, StoredState::Stored | StoredState::PendingSecondaryAuth)
    }

    /// Counts against the outstanding-amount admission limit.
    pub fn is_outstanding(&self) -> bool {
        !matches!(self, StoredState::Processed | StoredState::Deleted)
    }
}

/// Durable ledger entry for a transaction accepted by the device while the
/// host was unreachable. The id is the "tpId" the rest of the system keys on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredTransactionRecord {
    pub id: String,
    pub state: StoredState,
    pub total_amount: Decimal,
    pub created_on: DateTime<Utc>,
    pub card: Option<CardSummary>,
    pub transaction_type: TransactionKind,
}

impl StoredTransactionRecord {
    /// Moves the record along the ledger state machine. Transitions are
    /// monotonic: Stored -> PendingSecondaryAuth -> Processing ->
    /// {Processed | Stored (retry) | Deleted}; Deleted is terminal.
    pub fn advance(&mut self, next: StoredState) -> Result<()> {
        let allowed = match (self.state, next) {
            (StoredState::Stored, StoredState::PendingSecondaryAuth)
            | (StoredState::Stored, StoredState::Processing)
            | (StoredState::Stored, StoredState::Deleted)
            | (StoredState::PendingSecondaryAuth, StoredState::Processing)
            | (StoredState::PendingSecondaryAuth, StoredState::Deleted)
            | (StoredState::Processing, StoredState::Processed)
            | (StoredState::Processing, StoredState::Stored)
            | (StoredState::Processing, StoredState::Deleted)
            | (StoredState::Processed, StoredState::Deleted) => true,
            (current, candidate) => current == candidate,
        };
        if !allowed {
            return Err(TerminalError::Storage(format!(
                "illegal state transition for {}: {:?} -> {:?}",
                self.id, self.state, next
            )));
        }
        self.state = next;
        Ok(())
    }
}
