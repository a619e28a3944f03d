use crate::error::{Result, TerminalError};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Credentials and identification for the host processor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostConfig {
    pub acceptor_id: String,
    pub account_id: String,
    pub account_token: String,
    #[serde(default = "default_application_id")]
    pub application_id: String,
    #[serde(default = "default_application_name")]
    pub application_name: String,
    #[serde(default = "default_application_version")]
    pub application_version: String,
}

fn default_application_id() -> String {
    "8414".to_string()
}

fn default_application_name() -> String {
    "cardlane".to_string()
}

fn default_application_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

impl HostConfig {
    /// Missing credentials are a configuration error, caught before any
    /// device traffic happens.
    pub fn validate(&self) -> Result<()> {
        if self.acceptor_id.is_empty() || self.account_id.is_empty() || self.account_token.is_empty()
        {
            return Err(TerminalError::InvalidConfig(
                "missing acceptor_id, account_id or account_token".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplicationConfig {
    #[serde(default)]
    pub production: bool,
    #[serde(default = "default_idle_prompt")]
    pub idle_prompt: String,
}

fn default_idle_prompt() -> String {
    "cardlane".to_string()
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            production: false,
            idle_prompt: default_idle_prompt(),
        }
    }
}

/// Device-side behavior knobs forwarded to the link on connect.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    #[serde(default = "default_true")]
    pub contactless_allowed: bool,
    #[serde(default = "default_true")]
    pub keyed_entry_allowed: bool,
    #[serde(default = "default_terminal_id")]
    pub terminal_id: String,
    #[serde(default = "default_true")]
    pub heartbeat_enabled: bool,
    /// Pairing confirmation prompts are accepted without operator input when
    /// set, so unattended lanes can recover from a re-pair.
    #[serde(default = "default_true")]
    pub auto_confirm_pairing: bool,
}

fn default_true() -> bool {
    true
}

fn default_terminal_id() -> String {
    "1234".to_string()
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            contactless_allowed: true,
            keyed_entry_allowed: true,
            terminal_id: default_terminal_id(),
            heartbeat_enabled: true,
            auto_confirm_pairing: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionConfig {
    #[serde(default = "default_currency")]
    pub currency_code: String,
    #[serde(default = "default_true")]
    pub amount_confirmation_enabled: bool,
    #[serde(default = "default_true")]
    pub debit_allowed: bool,
    #[serde(default)]
    pub duplicate_transactions_allowed: bool,
}

fn default_currency() -> String {
    "USD".to_string()
}

impl Default for TransactionConfig {
    fn default() -> Self {
        Self {
            currency_code: default_currency(),
            amount_confirmation_enabled: true,
            debit_allowed: true,
            duplicate_transactions_allowed: false,
        }
    }
}

/// Limits and retention for the offline store-and-forward ledger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreAndForwardConfig {
    #[serde(default = "default_true")]
    pub storing_transactions_allowed: bool,
    /// Largest single amount that may be stored offline.
    #[serde(default = "default_transaction_amount_limit")]
    pub transaction_amount_limit: Decimal,
    /// Cap on the summed amounts of all outstanding (not yet processed,
    /// not deleted) records.
    #[serde(default = "default_unprocessed_total_limit")]
    pub unprocessed_total_amount_limit: Decimal,
    #[serde(default = "default_retain_days")]
    pub days_to_retain_processed_transactions: i64,
    #[serde(default)]
    pub should_auto_forward: bool,
}

fn default_transaction_amount_limit() -> Decimal {
    Decimal::from(50)
}

fn default_unprocessed_total_limit() -> Decimal {
    Decimal::from(100)
}

fn default_retain_days() -> i64 {
    1
}

impl Default for StoreAndForwardConfig {
    fn default() -> Self {
        Self {
            storing_transactions_allowed: true,
            transaction_amount_limit: default_transaction_amount_limit(),
            unprocessed_total_amount_limit: default_unprocessed_total_limit(),
            days_to_retain_processed_transactions: default_retain_days(),
            should_auto_forward: false,
        }
    }
}

/// Deadlines and pauses for the device link. Production defaults are seconds;
/// tests dial these down to milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkTimings {
    #[serde(default = "default_scan_timeout")]
    pub scan_timeout: Duration,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout: Duration,
    /// Watchdog for a dispatched transaction; fires when the device never
    /// delivers a completion or error callback.
    #[serde(default = "default_transaction_timeout")]
    pub transaction_timeout: Duration,
    /// Pause after cancelling a residual device flow, letting device-side
    /// state fully reset before a new request is sent.
    #[serde(default = "default_settle_delay")]
    pub settle_delay: Duration,
}

pub const DEFAULT_SCAN_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_TRANSACTION_TIMEOUT: Duration = Duration::from_secs(60);
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_millis(750);

fn default_scan_timeout() -> Duration {
    DEFAULT_SCAN_TIMEOUT
}

fn default_connect_timeout() -> Duration {
    DEFAULT_CONNECT_TIMEOUT
}

fn default_transaction_timeout() -> Duration {
    DEFAULT_TRANSACTION_TIMEOUT
}

fn default_settle_delay() -> Duration {
    DEFAULT_SETTLE_DELAY
}

impl Default for LinkTimings {
    fn default() -> Self {
        Self {
            scan_timeout: DEFAULT_SCAN_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            transaction_timeout: DEFAULT_TRANSACTION_TIMEOUT,
            settle_delay: DEFAULT_SETTLE_DELAY,
        }
    }
}

/// Full configuration handed to `Terminal::new`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Configuration {
    pub host: HostConfig,
    #[serde(default)]
    pub application: ApplicationConfig,
    #[serde(default)]
    pub device: DeviceConfig,
    #[serde(default)]
    pub transaction: TransactionConfig,
    #[serde(default)]
    pub store_and_forward: StoreAndForwardConfig,
    #[serde(default)]
    pub timings: LinkTimings,
}

impl Configuration {
    /// Configuration with the given credentials and default everything else.
    pub fn new(host: HostConfig) -> Self {
        Self {
            host,
            application: ApplicationConfig::default(),
            device: DeviceConfig::default(),
            transaction: TransactionConfig::default(),
            store_and_forward: StoreAndForwardConfig::default(),
            timings: LinkTimings::default(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.host.validate()
    }
}
