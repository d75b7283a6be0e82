//! Binary entry point: CLI parsing, logger setup, BLE MAC discovery,
//! and the accept loop, torn down on SIGINT/SIGTERM via an explicit
//! shutdown channel rather than a global signal handler.

use std::sync::Arc;

use clap::Parser;
use esphome_bt_proxyd::ble::coordinator::Coordinator;
use esphome_bt_proxyd::ble::mock::MockBackend;
use esphome_bt_proxyd::ble::BleBackend;
use esphome_bt_proxyd::config::Config;
use esphome_bt_proxyd::device_info::{DeviceInfoProvider, MacProbe};
use esphome_bt_proxyd::server::ApiServer;

/// No platform MAC probe ships with this crate (see
/// `device_info::MacProbe`'s docs); the shell-tool fallback spec.md §4.3
/// describes is an external collaborator this daemon doesn't implement.
struct NoMacProbe;

impl MacProbe for NoMacProbe {
    fn probe(&self) -> Option<String> {
        None
    }
}

fn init_logger(config: &Config) {
    let mut builder = env_logger::Builder::new();
    builder.parse_filters(&config.log_level);
    if let Ok(filter) = std::env::var("RUST_LOG") {
        builder.parse_filters(&filter);
    }
    if let Some(path) = &config.log_file {
        match std::fs::OpenOptions::new().create(true).append(true).open(path) {
            Ok(file) => {
                builder.target(env_logger::Target::Pipe(Box::new(file)));
            }
            Err(err) => {
                eprintln!("could not open log file {}: {err}", path.display());
            }
        }
    }
    builder.init();
}

#[tokio::main(flavor = "multi_thread")]
async fn main() {
    let config = Config::parse();
    init_logger(&config);

    // No concrete BleBackend ships with this crate; the in-memory
    // backend stands in until a platform backend is wired in.
    log::warn!("no platform BLE backend is wired in; running against an in-memory stand-in");
    let backend = Arc::new(MockBackend::new());

    let adapter_mac = backend.adapter_mac().await.ok().flatten().map(|mac| mac.to_string());
    let mac_address = DeviceInfoProvider::resolve_mac(adapter_mac, &NoMacProbe);
    let bluetooth_mac_address = mac_address.clone();

    let provider = DeviceInfoProvider::new(
        config.name.clone(),
        config.friendly_name.clone(),
        config.password.is_some(),
        config.active_connections,
    );
    let device_info = provider.build(mac_address, bluetooth_mac_address);

    let coordinator = Arc::new(Coordinator::new(
        backend,
        config.max_connections,
        config.active_scan,
    ));
    let server = Arc::new(ApiServer::new(coordinator, device_info, config.password.clone()));

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    tokio::spawn(async move {
        wait_for_shutdown_signal().await;
        log::info!("shutdown signal received");
        let _ = shutdown_tx.send(true);
    });

    if let Err(err) = server.run(config.bind_addr(), shutdown_rx).await {
        log::error!("server exited with an error: {err}");
        std::process::exit(1);
    }
}

#[cfg(unix)]
async fn wait_for_shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};
    let mut sigterm = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = sigterm.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
