use crate::error::{ErrorDetail, Result, TerminalError};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransactionKind {
    Sale,
    Refund,
    /// Refund tied to an earlier transaction by id; card-absent.
    LinkedRefund,
    /// Reversal of an earlier transaction by id; card-absent.
    Void,
    Authorization,
}

impl TransactionKind {
    /// Kinds that read a physical card and therefore require a connected
    /// device. LinkedRefund and Void carry the original transaction id and
    /// may be routed over a backend-only transport.
    pub fn is_card_present(&self) -> bool {
        matches!(
            self,
            TransactionKind::Sale | TransactionKind::Refund | TransactionKind::Authorization
        )
    }

    fn requires_original_id(&self) -> bool {
        matches!(self, TransactionKind::LinkedRefund | TransactionKind::Void)
    }
}

/// Free-form operational metadata attached to a request, mirroring what a
/// point-of-sale lane reports alongside the amount.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OperatorMetadata {
    pub lane_id: String,
    pub clerk_id: String,
    pub shift_id: String,
    pub ticket_number: String,
}

/// Immutable description of one attempted transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionRequest {
    pub kind: TransactionKind,
    pub amount: Decimal,
    pub reference_number: String,
    #[serde(default)]
    pub operator: OperatorMetadata,
    #[serde(default)]
    pub original_transaction_id: Option<String>,
}

impl TransactionRequest {
    pub fn new(kind: TransactionKind, amount: Decimal, reference_number: impl Into<String>) -> Self {
        Self {
            kind,
            amount,
            reference_number: reference_number.into(),
            operator: OperatorMetadata::default(),
            original_transaction_id: None,
        }
    }

    pub fn with_operator(mut self, operator: OperatorMetadata) -> Self {
        self.operator = operator;
        self
    }

    pub fn with_original_transaction_id(mut self, id: impl Into<String>) -> Self {
        self.original_transaction_id = Some(id.into());
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.reference_number.is_empty() {
            return Err(TerminalError::InvalidRequest(
                "reference_number must not be empty".to_string(),
            ));
        }
        if self.amount < Decimal::ZERO {
            return Err(TerminalError::InvalidRequest(format!(
                "amount must be non-negative, got {}",
                self.amount
            )));
        }
        if self.kind.requires_original_id()
            && self
                .original_transaction_id
                .as_deref()
                .is_none_or(str::is_empty)
        {
            return Err(TerminalError::InvalidRequest(format!(
                "{:?} requires original_transaction_id",
                self.kind
            )));
        }
        Ok(())
    }
}

/// Masked card data reported by the device after a read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardSummary {
    pub masked_number: String,
    pub brand: String,
    pub entry_mode: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionStatus {
    Approved,
    Declined,
    /// Accepted by the device but not settled with the host. Callers must not
    /// treat this as settled money movement.
    StoredOffline,
    Error,
}

/// Outcome of a `TransactionRequest`. Built only by the coordinator; immutable
/// once returned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionResult {
    pub status: TransactionStatus,
    pub approved_amount: Option<Decimal>,
    pub host_transaction_id: Option<String>,
    pub approval_code: Option<String>,
    pub card: Option<CardSummary>,
    pub error: Option<ErrorDetail>,
}

impl TransactionResult {
    pub fn error(detail: ErrorDetail) -> Self {
        Self {
            status: TransactionStatus::Error,
            approved_amount: None,
            host_transaction_id: None,
            approval_code: None,
            card: None,
            error: Some(detail),
        }
    }

    pub fn is_approved(&self) -> bool {
        self.status == TransactionStatus::Approved
    }
}
