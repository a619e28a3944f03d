use serde::{Deserialize, Serialize};

/// How the physical device is reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Transport {
    /// Bluetooth-class short-range pairing.
    ShortRange,
    /// TCP/IP address on the local network.
    NetworkAddress,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LinkState {
    Disconnected,
    Connecting,
    Connected,
    Erroring,
}

/// A device surfaced by discovery, addressable for a later connect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceDescriptor {
    pub name: String,
    pub identifier: String,
    pub transport: Transport,
}

/// Model and serial reported by the device once the session is up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub model: String,
    pub serial: String,
}

/// The logical session to one physical device. Exactly one connection may be
/// Connecting or Connected per process; only the ConnectionManager mutates it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceConnection {
    pub identifier: String,
    pub transport: Transport,
    pub state: LinkState,
    pub info: Option<DeviceInfo>,
}

impl DeviceConnection {
    pub fn disconnected() -> Self {
        Self {
            identifier: String::new(),
            transport: Transport::ShortRange,
            state: LinkState::Disconnected,
            info: None,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.state == LinkState::Connected
    }
}
