use crate::application::terminal::TerminalEvent;
use crate::config::{Configuration, LinkTimings};
use crate::domain::connection::{DeviceConnection, DeviceDescriptor, LinkState};
use crate::domain::ports::{DeviceEvent, DeviceLinkRef};
use crate::error::{Result, TerminalError};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock, broadcast};
use tokio::task::JoinHandle;
use tokio::time::{Instant, timeout};
use tracing::{debug, info, warn};

/// Owns the lifecycle of the single logical device session: discovery,
/// connect with deadline, idempotent disconnect, and republication of
/// device-originated lifecycle events onto the terminal stream.
pub struct ConnectionManager {
    link: DeviceLinkRef,
    state: Arc<RwLock<DeviceConnection>>,
    /// Held while a connect attempt is outstanding; a second concurrent
    /// connect is rejected rather than queued.
    connect_gate: Mutex<()>,
    timings: LinkTimings,
    events: broadcast::Sender<TerminalEvent>,
    pump: JoinHandle<()>,
}

impl ConnectionManager {
    pub fn new(
        link: DeviceLinkRef,
        timings: LinkTimings,
        auto_confirm_pairing: bool,
        events: broadcast::Sender<TerminalEvent>,
    ) -> Self {
        let state = Arc::new(RwLock::new(DeviceConnection::disconnected()));
        let pump = tokio::spawn(pump_events(
            link.clone(),
            state.clone(),
            events.clone(),
            auto_confirm_pairing,
        ));
        Self {
            link,
            state,
            connect_gate: Mutex::new(()),
            timings,
            events,
            pump,
        }
    }

    pub async fn state(&self) -> DeviceConnection {
        self.state.read().await.clone()
    }

    pub async fn is_connected(&self) -> bool {
        self.state.read().await.is_connected()
    }

    /// Requests discovery from the link. Always returns within the configured
    /// scan timeout; on expiry the link is forced back to a clean
    /// disconnected state and an empty list is returned.
    pub async fn scan(&self, config: &Configuration) -> Result<Vec<DeviceDescriptor>> {
        if self.is_connected().await {
            self.disconnect().await?;
        }
        match timeout(self.timings.scan_timeout, self.link.scan(config)).await {
            Ok(found) => found,
            Err(_) => {
                warn!(timeout = ?self.timings.scan_timeout, "scan timed out, tearing link down");
                let _ = self.link.disconnect().await;
                self.state.write().await.state = LinkState::Disconnected;
                Ok(Vec::new())
            }
        }
    }

    /// Establishes the session. Blocks the caller until the device reports
    /// connected, reports an error, or the connect timeout elapses. A connect
    /// while already connected first forces a disconnect; a connect while
    /// another connect is outstanding is rejected with `DeviceBusy`.
    pub async fn connect(
        &self,
        descriptor: &DeviceDescriptor,
        config: &Configuration,
    ) -> Result<DeviceConnection> {
        let _gate = self
            .connect_gate
            .try_lock()
            .map_err(|_| TerminalError::DeviceBusy("connect already in progress"))?;

        if self.is_connected().await {
            debug!("connected session present, forcing disconnect before reconnect");
            self.disconnect_link().await;
        }

        // Subscribe before initiating so the connected event cannot be missed.
        let mut rx = self.link.subscribe();
        {
            let mut state = self.state.write().await;
            state.identifier = descriptor.identifier.clone();
            state.transport = descriptor.transport;
            state.state = LinkState::Connecting;
            state.info = None;
        }

        if let Err(err) = self.link.connect(descriptor, config).await {
            self.state.write().await.state = LinkState::Disconnected;
            return Err(TerminalError::ConnectionError(err.to_string()));
        }

        let deadline = Instant::now() + self.timings.connect_timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let event = match timeout(remaining, rx.recv()).await {
                Ok(Ok(event)) => event,
                Ok(Err(broadcast::error::RecvError::Lagged(_))) => continue,
                Ok(Err(broadcast::error::RecvError::Closed)) => {
                    self.state.write().await.state = LinkState::Disconnected;
                    return Err(TerminalError::ConnectionError(
                        "device link closed during connect".to_string(),
                    ));
                }
                Err(_) => {
                    warn!(identifier = %descriptor.identifier, "connect timed out");
                    self.disconnect_link().await;
                    return Err(TerminalError::ConnectionTimeout(
                        self.timings.connect_timeout,
                    ));
                }
            };
            match event {
                DeviceEvent::Connected(device) => {
                    let mut state = self.state.write().await;
                    state.state = LinkState::Connected;
                    state.info = Some(device.clone());
                    info!(model = %device.model, serial = %device.serial, "device connected");
                    return Ok(state.clone());
                }
                DeviceEvent::ConnectionError(detail) => {
                    self.state.write().await.state = LinkState::Erroring;
                    return Err(TerminalError::ConnectionError(detail));
                }
                _ => continue,
            }
        }
    }

    /// Idempotent teardown. The underlying disconnect is always attempted,
    /// then local state is forced to Disconnected.
    pub async fn disconnect(&self) -> Result<()> {
        self.disconnect_link().await;
        let _ = self.events.send(TerminalEvent::Disconnected);
        Ok(())
    }

    async fn disconnect_link(&self) {
        if let Err(err) = self.link.disconnect().await {
            warn!(%err, "link disconnect failed, forcing state anyway");
        }
        let mut state = self.state.write().await;
        state.state = LinkState::Disconnected;
        state.info = None;
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        self.pump.abort();
    }
}

/// Forwards device lifecycle events to the terminal stream after updating the
/// session state. Pairing confirmation is answered here when the lane runs
/// unattended.
async fn pump_events(
    link: DeviceLinkRef,
    state: Arc<RwLock<DeviceConnection>>,
    events: broadcast::Sender<TerminalEvent>,
    auto_confirm_pairing: bool,
) {
    let mut rx = link.subscribe();
    loop {
        let event = match rx.recv().await {
            Ok(event) => event,
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "event pump lagged behind the device link");
                continue;
            }
            Err(broadcast::error::RecvError::Closed) => break,
        };
        match event {
            DeviceEvent::Connected(device) => {
                let mut s = state.write().await;
                s.state = LinkState::Connected;
                s.info = Some(device.clone());
                let _ = events.send(TerminalEvent::Connected(device));
            }
            DeviceEvent::Disconnected => {
                let mut s = state.write().await;
                if s.state == LinkState::Connected {
                    s.state = LinkState::Disconnected;
                    s.info = None;
                }
                let _ = events.send(TerminalEvent::Disconnected);
            }
            DeviceEvent::ConnectionError(detail) => {
                state.write().await.state = LinkState::Erroring;
                let _ = events.send(TerminalEvent::ConnectionError(detail));
            }
            DeviceEvent::BatteryLow => {
                let _ = events.send(TerminalEvent::BatteryLow);
            }
            DeviceEvent::Warning(message) => {
                let _ = events.send(TerminalEvent::Warning(message));
            }
            DeviceEvent::PairingRequested { device_name } => {
                if auto_confirm_pairing {
                    if let Err(err) = link.confirm_pairing(true).await {
                        warn!(%err, "pairing auto-confirm failed");
                    } else {
                        info!(%device_name, "pairing auto-confirmed");
                        let _ = events.send(TerminalEvent::PairingConfirmed { device_name });
                    }
                } else {
                    let _ = events.send(TerminalEvent::PairingRequested { device_name });
                }
            }
            DeviceEvent::StatusChanged(status) => {
                let _ = events.send(TerminalEvent::Status(status));
            }
            // Transaction terminal events are the coordinator's concern.
            DeviceEvent::TransactionCompleted(_) | DeviceEvent::TransactionError { .. } => {}
        }
    }
}
