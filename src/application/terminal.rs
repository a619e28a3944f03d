use crate::application::bridge::InteractionBridge;
use crate::application::connection::ConnectionManager;
use crate::application::coordinator::TransactionCoordinator;
use crate::application::queue::{ForwardResult, OfflineQueue};
use crate::config::Configuration;
use crate::domain::connection::{DeviceConnection, DeviceDescriptor, DeviceInfo};
use crate::domain::ports::{
    DeviceLinkRef, HostForwarderBox, PromptPolicy, RecordStoreBox,
};
use crate::domain::stored::{StoredState, StoredTransactionRecord};
use crate::domain::transaction::{
    OperatorMetadata, TransactionKind, TransactionRequest, TransactionResult,
};
use crate::error::Result;
use rust_decimal::Decimal;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::warn;

/// Everything the terminal reports back to the application on its single
/// outbound stream: connection lifecycle, prompt notifications, and
/// status-name transitions.
#[derive(Debug, Clone)]
pub enum TerminalEvent {
    Connected(DeviceInfo),
    Disconnected,
    ConnectionError(String),
    BatteryLow,
    Warning(String),
    PairingRequested { device_name: String },
    PairingConfirmed { device_name: String },
    Status(String),
    Display(String),
    CardPrompt(String),
}

const EVENT_CAPACITY: usize = 256;

/// Facade wiring the connection manager, interaction bridge, transaction
/// coordinator and offline queue over one injected device link. All
/// collaborators are constructor-injected; there is no shared device handle.
pub struct Terminal {
    config: Configuration,
    connection: Arc<ConnectionManager>,
    coordinator: TransactionCoordinator,
    queue: Arc<OfflineQueue>,
    events: broadcast::Sender<TerminalEvent>,
}

impl Terminal {
    pub fn new(
        link: DeviceLinkRef,
        store: RecordStoreBox,
        forwarder: HostForwarderBox,
        policy: Arc<dyn PromptPolicy>,
        config: Configuration,
    ) -> Result<Self> {
        config.validate()?;
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let connection = Arc::new(ConnectionManager::new(
            link.clone(),
            config.timings.clone(),
            config.device.auto_confirm_pairing,
            events.clone(),
        ));
        let bridge = Arc::new(InteractionBridge::new(policy, events.clone()));
        let queue = Arc::new(OfflineQueue::new(
            store,
            forwarder,
            config.store_and_forward.clone(),
        ));
        let coordinator = TransactionCoordinator::new(
            link,
            connection.clone(),
            bridge,
            queue.clone(),
            config.timings.clone(),
        );
        Ok(Self {
            config,
            connection,
            coordinator,
            queue,
            events,
        })
    }

    /// The single outbound event stream.
    pub fn subscribe(&self) -> broadcast::Receiver<TerminalEvent> {
        self.events.subscribe()
    }

    pub async fn scan(&self) -> Result<Vec<DeviceDescriptor>> {
        self.connection.scan(&self.config).await
    }

    /// Establishes the device session. With auto-forward enabled, a freshly
    /// established session also kicks off settlement of the offline ledger in
    /// the background.
    pub async fn connect(&self, descriptor: &DeviceDescriptor) -> Result<DeviceConnection> {
        let connection = self.connection.connect(descriptor, &self.config).await?;
        if self.config.store_and_forward.should_auto_forward {
            let queue = self.queue.clone();
            tokio::spawn(async move {
                if let Err(err) = queue.forward_all().await {
                    warn!(%err, "auto-forward after connect failed");
                }
            });
        }
        Ok(connection)
    }

    pub async fn disconnect(&self) -> Result<()> {
        self.connection.disconnect().await
    }

    pub async fn connection_state(&self) -> DeviceConnection {
        self.connection.state().await
    }

    pub async fn process_sale(
        &self,
        amount: Decimal,
        reference: impl Into<String>,
        operator: OperatorMetadata,
    ) -> Result<TransactionResult> {
        self.coordinator
            .transact(
                TransactionRequest::new(TransactionKind::Sale, amount, reference)
                    .with_operator(operator),
            )
            .await
    }

    pub async fn process_refund(
        &self,
        amount: Decimal,
        reference: impl Into<String>,
        operator: OperatorMetadata,
    ) -> Result<TransactionResult> {
        self.coordinator
            .transact(
                TransactionRequest::new(TransactionKind::Refund, amount, reference)
                    .with_operator(operator),
            )
            .await
    }

    pub async fn process_authorization(
        &self,
        amount: Decimal,
        reference: impl Into<String>,
        operator: OperatorMetadata,
    ) -> Result<TransactionResult> {
        self.coordinator
            .transact(
                TransactionRequest::new(TransactionKind::Authorization, amount, reference)
                    .with_operator(operator),
            )
            .await
    }

    pub async fn process_linked_refund(
        &self,
        amount: Decimal,
        reference: impl Into<String>,
        original_transaction_id: impl Into<String>,
    ) -> Result<TransactionResult> {
        self.coordinator
            .transact(
                TransactionRequest::new(TransactionKind::LinkedRefund, amount, reference)
                    .with_original_transaction_id(original_transaction_id),
            )
            .await
    }

    pub async fn process_void(
        &self,
        reference: impl Into<String>,
        original_transaction_id: impl Into<String>,
    ) -> Result<TransactionResult> {
        self.coordinator
            .transact(
                TransactionRequest::new(TransactionKind::Void, Decimal::ZERO, reference)
                    .with_original_transaction_id(original_transaction_id),
            )
            .await
    }

    pub async fn cancel_transaction(&self) {
        self.coordinator.cancel().await
    }

    pub async fn list_stored_transactions(&self) -> Result<Vec<StoredTransactionRecord>> {
        self.queue.list().await
    }

    pub async fn get_stored_transaction(&self, id: &str) -> Result<StoredTransactionRecord> {
        self.queue.get(id).await
    }

    pub async fn list_stored_transactions_by_state(
        &self,
        state: StoredState,
    ) -> Result<Vec<StoredTransactionRecord>> {
        self.queue.list_by_state(state).await
    }

    pub async fn forward_transaction(&self, id: &str) -> Result<ForwardResult> {
        self.queue.forward(id).await
    }

    pub async fn forward_all_stored(&self) -> Result<Vec<ForwardResult>> {
        self.queue.forward_all().await
    }

    pub async fn delete_stored_transaction(&self, id: &str) -> Result<bool> {
        self.queue.delete(id).await
    }

    pub async fn reclaim_stored_transactions(&self) -> Result<usize> {
        self.queue.reclaim().await
    }
}
