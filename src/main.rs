use cardlane::application::terminal::Terminal;
use cardlane::application::bridge::AutoDefaultPolicy;
use cardlane::config::{Configuration, HostConfig};
use cardlane::domain::connection::{DeviceDescriptor, Transport};
use cardlane::domain::ports::{DeviceLinkRef, HostForwarderBox, RecordStoreBox};
use cardlane::domain::stored::StoredState;
use cardlane::domain::transaction::OperatorMetadata;
use cardlane::infrastructure::in_memory::InMemoryRecordStore;
use cardlane::infrastructure::simulated::{SimulatedDeviceLink, SimulatedHost};
use clap::Parser;
use miette::{IntoDiagnostic, Result};
use rust_decimal::Decimal;
#[cfg(feature = "storage-rocksdb")]
use std::path::PathBuf;
use std::sync::Arc;

/// Demo lane: connects to a simulated payment device, runs one sale and
/// reconciles the offline ledger.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Sale amount
    #[arg(long, default_value = "1.31")]
    amount: Decimal,

    /// Client reference number for the sale
    #[arg(long, default_value = "1234567890A")]
    reference: String,

    /// Simulate an unreachable host so the sale is stored offline
    #[arg(long)]
    offline: bool,

    /// Path to persistent ledger database (optional). If provided, uses RocksDB.
    #[cfg(feature = "storage-rocksdb")]
    #[arg(long)]
    db_path: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cardlane=info".into()),
        )
        .init();

    let cli = Cli::parse();

    let link = Arc::new(SimulatedDeviceLink::new());
    link.set_host_reachable(!cli.offline);
    let host = Arc::new(SimulatedHost::new());

    let store: RecordStoreBox = open_store(&cli)?;
    let forwarder: HostForwarderBox = Box::new(host.clone());

    let config = Configuration::new(HostConfig {
        acceptor_id: "demo-acceptor".to_string(),
        account_id: "demo-account".to_string(),
        account_token: "demo-token".to_string(),
        application_id: "8414".to_string(),
        application_name: "cardlane-demo".to_string(),
        application_version: env!("CARGO_PKG_VERSION").to_string(),
    });

    let terminal = Terminal::new(
        link.clone() as DeviceLinkRef,
        store,
        forwarder,
        Arc::new(AutoDefaultPolicy),
        config,
    )
    .into_diagnostic()?;

    // Mirror the outbound stream to stdout while the demo runs.
    let mut events = terminal.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            println!("event: {event:?}");
        }
    });

    let devices = terminal.scan().await.into_diagnostic()?;
    println!("discovered: {devices:?}");
    let descriptor = devices.into_iter().next().unwrap_or(DeviceDescriptor {
        name: "Lane/3000".to_string(),
        identifier: "D1".to_string(),
        transport: Transport::ShortRange,
    });

    let connection = terminal.connect(&descriptor).await.into_diagnostic()?;
    println!("connected: {} ({:?})", connection.identifier, connection.transport);

    let result = terminal
        .process_sale(cli.amount, &cli.reference, OperatorMetadata::default())
        .await
        .into_diagnostic()?;
    println!("sale result: {result:?}");

    let stored = terminal
        .list_stored_transactions_by_state(StoredState::Stored)
        .await
        .into_diagnostic()?;
    if !stored.is_empty() {
        println!("{} transaction(s) stored for later forwarding", stored.len());
        // Host is back: settle the ledger.
        link.set_host_reachable(true);
        host.set_reachable(true);
        for outcome in terminal.forward_all_stored().await.into_diagnostic()? {
            println!("forward: {outcome:?}");
        }
    }

    terminal.disconnect().await.into_diagnostic()?;
    Ok(())
}

#[cfg(feature = "storage-rocksdb")]
fn open_store(cli: &Cli) -> Result<RecordStoreBox> {
    use cardlane::infrastructure::rocksdb::RocksDbRecordStore;
    Ok(match &cli.db_path {
        Some(path) => Box::new(RocksDbRecordStore::open(path).into_diagnostic()?),
        None => Box::new(InMemoryRecordStore::new()),
    })
}

#[cfg(not(feature = "storage-rocksdb"))]
fn open_store(_cli: &Cli) -> Result<RecordStoreBox> {
    Ok(Box::new(InMemoryRecordStore::new()))
}
