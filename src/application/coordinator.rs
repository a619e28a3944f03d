use crate::application::connection::ConnectionManager;
use crate::application::queue::OfflineQueue;
use crate::config::LinkTimings;
use crate::domain::ports::{
    DeviceCompletion, DeviceEvent, DeviceLinkRef, DeviceOutcome, PromptHandler,
};
use crate::domain::transaction::{TransactionRequest, TransactionResult, TransactionStatus};
use crate::error::{ErrorDetail, Result, TerminalError};
use std::sync::Arc;
use tokio::sync::{Mutex, broadcast};
use tokio::time::{Instant, sleep, timeout};
use tracing::{debug, info, warn};

/// Drives one transaction at a time end-to-end: single-flight gate, session
/// hygiene (residual-flow cancel plus settle delay), dispatch, and a
/// watchdog-bounded wait for the completion callback.
pub struct TransactionCoordinator {
    link: DeviceLinkRef,
    connection: Arc<ConnectionManager>,
    prompts: Arc<dyn PromptHandler>,
    queue: Arc<OfflineQueue>,
    timings: LinkTimings,
    in_flight: Mutex<()>,
}

impl TransactionCoordinator {
    pub fn new(
        link: DeviceLinkRef,
        connection: Arc<ConnectionManager>,
        prompts: Arc<dyn PromptHandler>,
        queue: Arc<OfflineQueue>,
        timings: LinkTimings,
    ) -> Self {
        Self {
            link,
            connection,
            prompts,
            queue,
            timings,
            in_flight: Mutex::new(()),
        }
    }

    /// Single entry point for every transaction kind.
    ///
    /// Pre-flight violations (invalid request, not connected, another
    /// transaction in flight) are returned as `Err`. Once the request has
    /// been dispatched, every outcome including device faults and watchdog
    /// expiry comes back as a `TransactionResult`.
    pub async fn transact(&self, request: TransactionRequest) -> Result<TransactionResult> {
        request.validate()?;

        // Card-absent kinds (Void, LinkedRefund) may be routed over a
        // backend-only transport and skip the Connected precondition.
        if request.kind.is_card_present() && !self.connection.is_connected().await {
            return Err(TerminalError::NotConnected);
        }

        let _flight = self
            .in_flight
            .try_lock()
            .map_err(|_| TerminalError::DeviceBusy("transaction already in flight"))?;

        // A previous transaction's tail state must not corrupt this one.
        // Nothing to cancel is not a failure.
        if let Err(err) = self.link.cancel_current_flow().await {
            debug!(%err, "residual-flow cancel reported an error, ignoring");
        }
        sleep(self.timings.settle_delay).await;

        let mut rx = self.link.subscribe();
        info!(kind = ?request.kind, reference = %request.reference_number, amount = %request.amount, "dispatching transaction");
        if let Err(err) = self
            .link
            .send_transaction(request.clone(), self.prompts.clone())
            .await
        {
            return Ok(TransactionResult::error(ErrorDetail::from(&err)));
        }

        self.await_completion(&request, &mut rx).await
    }

    /// Best-effort cancellation of the in-flight transaction. Always succeeds
    /// from the caller's perspective; the definitive state arrives via the
    /// completion callback or the watchdog.
    pub async fn cancel(&self) {
        if let Err(err) = self.link.cancel_current_flow().await {
            debug!(%err, "cancel reported an error, ignoring");
        }
    }

    async fn await_completion(
        &self,
        request: &TransactionRequest,
        rx: &mut broadcast::Receiver<DeviceEvent>,
    ) -> Result<TransactionResult> {
        let deadline = Instant::now() + self.timings.transaction_timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let event = match timeout(remaining, rx.recv()).await {
                Ok(Ok(event)) => event,
                Ok(Err(broadcast::error::RecvError::Lagged(_))) => continue,
                Ok(Err(broadcast::error::RecvError::Closed)) => {
                    return Ok(TransactionResult::error(ErrorDetail::from(
                        &TerminalError::ConnectionError(
                            "device link closed mid-transaction".to_string(),
                        ),
                    )));
                }
                Err(_) => {
                    warn!(reference = %request.reference_number, "watchdog expired, releasing the lane");
                    let _ = self.link.cancel_current_flow().await;
                    return Ok(TransactionResult::error(ErrorDetail::from(
                        &TerminalError::TransactionTimeout(self.timings.transaction_timeout),
                    )));
                }
            };
            match event {
                DeviceEvent::TransactionCompleted(completion)
                    if completion.reference == request.reference_number =>
                {
                    return self.resolve(request, completion).await;
                }
                DeviceEvent::TransactionError { reference, detail }
                    if reference == request.reference_number =>
                {
                    return Ok(TransactionResult::error(ErrorDetail::from(
                        &TerminalError::ConnectionError(detail),
                    )));
                }
                // Late callbacks from an earlier, already-resolved flow are
                // dropped here by the reference mismatch.
                _ => continue,
            }
        }
    }

    async fn resolve(
        &self,
        request: &TransactionRequest,
        completion: DeviceCompletion,
    ) -> Result<TransactionResult> {
        match completion.outcome {
            DeviceOutcome::HostApproved => Ok(TransactionResult {
                status: TransactionStatus::Approved,
                approved_amount: completion.approved_amount.or(Some(request.amount)),
                host_transaction_id: completion.host_transaction_id,
                approval_code: completion.approval_code,
                card: completion.card,
                error: None,
            }),
            DeviceOutcome::HostDeclined => Ok(TransactionResult {
                status: TransactionStatus::Declined,
                approved_amount: None,
                host_transaction_id: completion.host_transaction_id,
                approval_code: None,
                card: completion.card,
                error: None,
            }),
            DeviceOutcome::HostUnreachable => {
                match self.queue.admit(request, completion.card.clone()).await {
                    Ok(record) => {
                        info!(tp_id = %record.id, amount = %record.total_amount, "transaction stored offline");
                        Ok(TransactionResult {
                            status: TransactionStatus::StoredOffline,
                            approved_amount: Some(request.amount),
                            // The ledger id stands in when the host never
                            // assigned one.
                            host_transaction_id: completion
                                .host_transaction_id
                                .or(Some(record.id.clone())),
                            approval_code: None,
                            card: completion.card,
                            error: None,
                        })
                    }
                    Err(err) => {
                        warn!(%err, reference = %request.reference_number, "offline admission refused, failing transaction");
                        Ok(TransactionResult::error(ErrorDetail::from(&err)))
                    }
                }
            }
        }
    }
}
