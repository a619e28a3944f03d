use crate::config::Configuration;
use crate::domain::connection::{DeviceDescriptor, DeviceInfo};
use crate::domain::stored::StoredTransactionRecord;
use crate::domain::transaction::{CardSummary, TransactionRequest};
use crate::error::Result;
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::sync::Arc;
use tokio::sync::broadcast;

/// How the host resolved a transaction the device completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceOutcome {
    HostApproved,
    HostDeclined,
    /// The device accepted the transaction but could not reach the host;
    /// the store-and-forward path decides what happens next.
    HostUnreachable,
}

/// Explicit completion schema reported by the link. Device SDK shape
/// differences stay inside the link adapter; nothing downstream probes for
/// fields.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceCompletion {
    /// Echo of the request's reference number, used to correlate completions
    /// with the dispatch that caused them.
    pub reference: String,
    pub outcome: DeviceOutcome,
    pub approved_amount: Option<Decimal>,
    pub host_transaction_id: Option<String>,
    pub approval_code: Option<String>,
    pub card: Option<CardSummary>,
}

/// Everything the device emits on its own initiative.
#[derive(Debug, Clone)]
pub enum DeviceEvent {
    Connected(DeviceInfo),
    Disconnected,
    ConnectionError(String),
    BatteryLow,
    Warning(String),
    /// The device wants pairing confirmed; answer via
    /// `DeviceLink::confirm_pairing`.
    PairingRequested { device_name: String },
    /// Named progress transition inside a transaction flow.
    StatusChanged(String),
    TransactionCompleted(DeviceCompletion),
    TransactionError { reference: String, detail: String },
}

/// Kinds of numeric entry a device can ask for mid-transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumericInputKind {
    Cashback,
    Tip,
    Zip,
    Other,
}

/// A device-originated interactive prompt. Response-bearing variants must be
/// answered exactly once; the rest are notifications.
#[derive(Debug, Clone)]
pub enum Prompt {
    ChoiceSelection { options: Vec<String> },
    ApplicationSelection { candidates: Vec<String> },
    NumericInput { kind: NumericInputKind },
    AmountConfirmation { amount: Decimal },
    DisplayText(String),
    Wait(String),
    PromptForCard(String),
    RemoveCard,
    CardRemoved,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PromptResponse {
    /// Index into the offered options; -1 aborts the selection.
    Selection(i32),
    Digits(String),
    Confirmation(bool),
    /// Notifications carry no answer.
    Acknowledged,
}

/// Resolves prompts during a transaction. The link calls this for every
/// prompt and blocks the flow until the response arrives.
#[async_trait]
pub trait PromptHandler: Send + Sync {
    async fn on_prompt(&self, prompt: Prompt) -> PromptResponse;
}

/// Answer source plugged into the interaction bridge: automatic defaults for
/// unattended lanes, or a relay to a human operator.
#[async_trait]
pub trait PromptPolicy: Send + Sync {
    async fn choice_selection(&self, options: &[String]) -> usize;
    /// `None` aborts; only expected when `candidates` is empty.
    async fn application_selection(&self, candidates: &[String]) -> Option<usize>;
    async fn numeric_input(&self, kind: NumericInputKind) -> String;
    async fn amount_confirmation(&self, amount: Decimal) -> bool;
}

/// Capability contract of the external device/transport collaborator. Connect
/// and send_transaction initiate work; terminal outcomes arrive on the event
/// stream.
#[async_trait]
pub trait DeviceLink: Send + Sync {
    /// Discovery. May never complete on its own; callers enforce a timeout.
    async fn scan(&self, config: &Configuration) -> Result<Vec<DeviceDescriptor>>;

    async fn connect(&self, descriptor: &DeviceDescriptor, config: &Configuration) -> Result<()>;

    async fn disconnect(&self) -> Result<()>;

    async fn confirm_pairing(&self, accept: bool) -> Result<()>;

    /// Dispatches a transaction; prompts raised mid-flow are resolved through
    /// `prompts`. Completion or error is delivered as a `DeviceEvent`.
    async fn send_transaction(
        &self,
        request: TransactionRequest,
        prompts: Arc<dyn PromptHandler>,
    ) -> Result<()>;

    async fn cancel_current_flow(&self) -> Result<()>;

    fn subscribe(&self) -> broadcast::Receiver<DeviceEvent>;
}

/// Durable storage for the offline ledger.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn put(&self, record: StoredTransactionRecord) -> Result<()>;
    async fn get(&self, id: &str) -> Result<Option<StoredTransactionRecord>>;
    async fn all(&self) -> Result<Vec<StoredTransactionRecord>>;
    /// Physical purge; only reclamation calls this.
    async fn remove(&self, id: &str) -> Result<bool>;
}

/// Host acknowledgment for a forwarded record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostAck {
    pub host_transaction_id: String,
    pub approval_code: Option<String>,
}

/// Submits one stored record to the host processor.
#[async_trait]
pub trait HostForwarder: Send + Sync {
    async fn forward(&self, record: &StoredTransactionRecord) -> Result<HostAck>;
}

#[async_trait]
impl<T: HostForwarder + ?Sized> HostForwarder for Arc<T> {
    async fn forward(&self, record: &StoredTransactionRecord) -> Result<HostAck> {
        (**self).forward(record).await
    }
}

pub type DeviceLinkRef = Arc<dyn DeviceLink>;
pub type RecordStoreBox = Box<dyn RecordStore>;
pub type HostForwarderBox = Box<dyn HostForwarder>;
