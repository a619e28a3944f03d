#![allow(dead_code)]

use cardlane::application::bridge::AutoDefaultPolicy;
use cardlane::application::terminal::Terminal;
use cardlane::config::{Configuration, HostConfig, LinkTimings};
use cardlane::domain::connection::{DeviceConnection, DeviceDescriptor, Transport};
use cardlane::domain::ports::DeviceLinkRef;
use cardlane::infrastructure::in_memory::InMemoryRecordStore;
use cardlane::infrastructure::simulated::{SimulatedDeviceLink, SimulatedHost};
use std::sync::Arc;
use std::time::Duration;

/// A fully wired terminal over the simulated device and host, with handles on
/// every double so tests can script failures.
pub struct Lane {
    pub link: Arc<SimulatedDeviceLink>,
    pub host: Arc<SimulatedHost>,
    pub store: InMemoryRecordStore,
    pub terminal: Arc<Terminal>,
}

pub fn test_host_config() -> HostConfig {
    HostConfig {
        acceptor_id: "test-acceptor".to_string(),
        account_id: "test-account".to_string(),
        account_token: "test-token".to_string(),
        application_id: "8414".to_string(),
        application_name: "cardlane-tests".to_string(),
        application_version: "0.0.0".to_string(),
    }
}

/// Production defaults are seconds; tests run the same paths in milliseconds.
pub fn fast_config() -> Configuration {
    let mut config = Configuration::new(test_host_config());
    config.timings = LinkTimings {
        scan_timeout: Duration::from_millis(200),
        connect_timeout: Duration::from_millis(300),
        transaction_timeout: Duration::from_millis(500),
        settle_delay: Duration::from_millis(5),
    };
    config
}

pub fn lane_with(config: Configuration) -> Lane {
    let link = Arc::new(SimulatedDeviceLink::new());
    let host = Arc::new(SimulatedHost::new());
    let store = InMemoryRecordStore::new();
    let terminal = Terminal::new(
        link.clone() as DeviceLinkRef,
        Box::new(store.clone()),
        Box::new(host.clone()),
        Arc::new(AutoDefaultPolicy),
        config,
    )
    .expect("terminal construction");
    Lane {
        link,
        host,
        store,
        terminal: Arc::new(terminal),
    }
}

pub fn lane() -> Lane {
    lane_with(fast_config())
}

pub fn d1() -> DeviceDescriptor {
    DeviceDescriptor {
        name: "Lane/3000".to_string(),
        identifier: "D1".to_string(),
        transport: Transport::ShortRange,
    }
}

pub async fn connect(lane: &Lane) -> DeviceConnection {
    lane.terminal.connect(&d1()).await.expect("connect to D1")
}
