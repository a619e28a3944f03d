use crate::config::Configuration;
use crate::domain::connection::{DeviceDescriptor, DeviceInfo, Transport};
use crate::domain::ports::{
    DeviceCompletion, DeviceEvent, DeviceLink, DeviceOutcome, HostAck, HostForwarder, Prompt,
    PromptHandler,
};
use crate::domain::stored::StoredTransactionRecord;
use crate::domain::transaction::{CardSummary, TransactionRequest};
use crate::error::{Result, TerminalError};
use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, broadcast};
use tokio::time::sleep;
use tracing::debug;

/// How a simulated connect attempt behaves.
#[derive(Debug, Clone)]
pub enum ConnectMode {
    Immediate,
    Delayed(Duration),
    /// Never emits a connected or error event; exercises the connect timeout.
    Silent,
    Fail(String),
}

/// How a simulated scan behaves.
#[derive(Debug, Clone)]
pub enum ScanMode {
    Respond,
    /// Never completes; exercises the scan timeout.
    Hang,
}

const EVENT_CAPACITY: usize = 256;

/// Scriptable stand-in for the physical device and its transport. Used by the
/// demo binary and the integration tests; every timing and failure mode the
/// orchestration core must survive can be dialed in here.
pub struct SimulatedDeviceLink {
    events: broadcast::Sender<DeviceEvent>,
    devices: Mutex<Vec<DeviceDescriptor>>,
    connect_mode: Mutex<ConnectMode>,
    scan_mode: Mutex<ScanMode>,
    /// Emits a pairing request before the connected event.
    request_pairing: AtomicBool,
    pairing_confirms: AtomicUsize,
    host_reachable: AtomicBool,
    decline_next: AtomicBool,
    /// Swallows the transaction without ever completing it; exercises the
    /// coordinator watchdog.
    silent_transaction: AtomicBool,
    completion_delay: Mutex<Duration>,
    cancels: AtomicUsize,
    in_flight: Arc<AtomicUsize>,
    overlap_observed: AtomicBool,
    sequence: AtomicU64,
}

impl Default for SimulatedDeviceLink {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedDeviceLink {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            events,
            devices: Mutex::new(vec![DeviceDescriptor {
                name: "Lane/3000".to_string(),
                identifier: "D1".to_string(),
                transport: Transport::ShortRange,
            }]),
            connect_mode: Mutex::new(ConnectMode::Immediate),
            scan_mode: Mutex::new(ScanMode::Respond),
            request_pairing: AtomicBool::new(false),
            pairing_confirms: AtomicUsize::new(0),
            host_reachable: AtomicBool::new(true),
            decline_next: AtomicBool::new(false),
            silent_transaction: AtomicBool::new(false),
            completion_delay: Mutex::new(Duration::from_millis(5)),
            cancels: AtomicUsize::new(0),
            in_flight: Arc::new(AtomicUsize::new(0)),
            overlap_observed: AtomicBool::new(false),
            sequence: AtomicU64::new(1),
        }
    }

    pub async fn set_connect_mode(&self, mode: ConnectMode) {
        *self.connect_mode.lock().await = mode;
    }

    pub async fn set_scan_mode(&self, mode: ScanMode) {
        *self.scan_mode.lock().await = mode;
    }

    pub async fn set_completion_delay(&self, delay: Duration) {
        *self.completion_delay.lock().await = delay;
    }

    pub fn set_host_reachable(&self, reachable: bool) {
        self.host_reachable.store(reachable, Ordering::SeqCst);
    }

    pub fn set_decline_next(&self, decline: bool) {
        self.decline_next.store(decline, Ordering::SeqCst);
    }

    pub fn set_silent_transaction(&self, silent: bool) {
        self.silent_transaction.store(silent, Ordering::SeqCst);
    }

    pub fn set_request_pairing(&self, request: bool) {
        self.request_pairing.store(request, Ordering::SeqCst);
    }

    pub fn pairing_confirms(&self) -> usize {
        self.pairing_confirms.load(Ordering::SeqCst)
    }

    pub fn cancels(&self) -> usize {
        self.cancels.load(Ordering::SeqCst)
    }

    /// True if two transactions were ever dispatched concurrently. The
    /// coordinator's single-flight gate must keep this false forever.
    pub fn overlap_observed(&self) -> bool {
        self.overlap_observed.load(Ordering::SeqCst)
    }

    fn emit(&self, event: DeviceEvent) {
        let _ = self.events.send(event);
    }

    fn card_summary() -> CardSummary {
        CardSummary {
            masked_number: "************1111".to_string(),
            brand: "Visa".to_string(),
            entry_mode: "Chip".to_string(),
        }
    }
}

#[async_trait]
impl DeviceLink for SimulatedDeviceLink {
    async fn scan(&self, _config: &Configuration) -> Result<Vec<DeviceDescriptor>> {
        match self.scan_mode.lock().await.clone() {
            ScanMode::Respond => Ok(self.devices.lock().await.clone()),
            ScanMode::Hang => std::future::pending().await,
        }
    }

    async fn connect(&self, descriptor: &DeviceDescriptor, _config: &Configuration) -> Result<()> {
        let mode = self.connect_mode.lock().await.clone();
        let events = self.events.clone();
        let info = DeviceInfo {
            model: "Lane/3000".to_string(),
            serial: format!("SN-{}", descriptor.identifier),
        };
        let pairing = self.request_pairing.load(Ordering::SeqCst);
        let device_name = descriptor.name.clone();
        tokio::spawn(async move {
            if pairing {
                let _ = events.send(DeviceEvent::PairingRequested { device_name });
            }
            match mode {
                ConnectMode::Immediate => {
                    let _ = events.send(DeviceEvent::Connected(info));
                }
                ConnectMode::Delayed(delay) => {
                    sleep(delay).await;
                    let _ = events.send(DeviceEvent::Connected(info));
                }
                ConnectMode::Silent => {}
                ConnectMode::Fail(detail) => {
                    let _ = events.send(DeviceEvent::ConnectionError(detail));
                }
            }
        });
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        self.emit(DeviceEvent::Disconnected);
        Ok(())
    }

    async fn confirm_pairing(&self, accept: bool) -> Result<()> {
        if accept {
            self.pairing_confirms.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }

    async fn send_transaction(
        &self,
        request: TransactionRequest,
        prompts: Arc<dyn PromptHandler>,
    ) -> Result<()> {
        let prior = self.in_flight.fetch_add(1, Ordering::SeqCst);
        if prior > 0 {
            self.overlap_observed.store(true, Ordering::SeqCst);
        }

        if self.silent_transaction.load(Ordering::SeqCst) {
            // Never completes; the watchdog owns this flow now.
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            return Ok(());
        }

        let events = self.events.clone();
        let delay = *self.completion_delay.lock().await;
        let reachable = self.host_reachable.load(Ordering::SeqCst);
        let declined = self.decline_next.swap(false, Ordering::SeqCst);
        let seq = self.sequence.fetch_add(1, Ordering::SeqCst);
        let in_flight = self.in_flight.clone();
        debug!(reference = %request.reference_number, "simulated device accepted transaction");

        // The flow runs on a background worker, as the real transport would.
        let card_present = request.kind.is_card_present();
        tokio::spawn(async move {
            if card_present {
                let _ = events.send(DeviceEvent::StatusChanged("WaitingForCard".to_string()));
                prompts
                    .on_prompt(Prompt::PromptForCard("Insert/Swipe/Tap Card".to_string()))
                    .await;
                let _ = events.send(DeviceEvent::StatusChanged("ReadingCard".to_string()));
                prompts
                    .on_prompt(Prompt::ChoiceSelection {
                        options: vec!["Credit".to_string(), "Debit".to_string()],
                    })
                    .await;
                prompts
                    .on_prompt(Prompt::AmountConfirmation {
                        amount: request.amount,
                    })
                    .await;
                prompts.on_prompt(Prompt::CardRemoved).await;
            }
            let _ = events.send(DeviceEvent::StatusChanged("SendingToHost".to_string()));
            sleep(delay).await;

            let completion = if !reachable {
                DeviceCompletion {
                    reference: request.reference_number.clone(),
                    outcome: DeviceOutcome::HostUnreachable,
                    approved_amount: None,
                    host_transaction_id: None,
                    approval_code: None,
                    card: card_present.then(SimulatedDeviceLink::card_summary),
                }
            } else if declined {
                DeviceCompletion {
                    reference: request.reference_number.clone(),
                    outcome: DeviceOutcome::HostDeclined,
                    approved_amount: None,
                    host_transaction_id: Some(format!("H-{seq}")),
                    approval_code: None,
                    card: card_present.then(SimulatedDeviceLink::card_summary),
                }
            } else {
                DeviceCompletion {
                    reference: request.reference_number.clone(),
                    outcome: DeviceOutcome::HostApproved,
                    approved_amount: Some(request.amount),
                    host_transaction_id: Some(format!("H-{seq}")),
                    approval_code: Some(format!("OK{seq:04}")),
                    card: card_present.then(SimulatedDeviceLink::card_summary),
                }
            };

            in_flight.fetch_sub(1, Ordering::SeqCst);
            let _ = events.send(DeviceEvent::TransactionCompleted(completion));
        });
        Ok(())
    }

    async fn cancel_current_flow(&self) -> Result<()> {
        self.cancels.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<DeviceEvent> {
        self.events.subscribe()
    }
}

/// Host-processor double for the forward path: a reachability toggle and a
/// submission counter proving nothing is ever double-submitted.
pub struct SimulatedHost {
    reachable: AtomicBool,
    forward_delay: Mutex<Duration>,
    submissions: AtomicUsize,
    sequence: AtomicU64,
}

impl Default for SimulatedHost {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedHost {
    pub fn new() -> Self {
        Self {
            reachable: AtomicBool::new(true),
            forward_delay: Mutex::new(Duration::ZERO),
            submissions: AtomicUsize::new(0),
            sequence: AtomicU64::new(1),
        }
    }

    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    /// How long each forward takes before the host answers.
    pub async fn set_forward_delay(&self, delay: Duration) {
        *self.forward_delay.lock().await = delay;
    }

    pub fn submissions(&self) -> usize {
        self.submissions.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl HostForwarder for SimulatedHost {
    async fn forward(&self, record: &StoredTransactionRecord) -> Result<HostAck> {
        let delay = *self.forward_delay.lock().await;
        if !delay.is_zero() {
            sleep(delay).await;
        }
        if !self.reachable.load(Ordering::SeqCst) {
            return Err(TerminalError::HostUnreachable(
                "simulated host offline".to_string(),
            ));
        }
        self.submissions.fetch_add(1, Ordering::SeqCst);
        let seq = self.sequence.fetch_add(1, Ordering::SeqCst);
        debug!(tp_id = %record.id, "simulated host settled record");
        Ok(HostAck {
            host_transaction_id: format!("FWD-{seq}"),
            approval_code: Some(format!("OK{seq:04}")),
        })
    }
}
