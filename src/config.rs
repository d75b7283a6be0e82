//! Daemon configuration, populated from the command line via
//! [`clap::Parser`].

use std::net::IpAddr;
use std::path::PathBuf;

use clap::Parser;

#[derive(Debug, Parser)]
#[command(name = "esphome-bt-proxyd", about = "ESPHome-style Bluetooth proxy daemon", version)]
pub struct Config {
    /// Address to bind the native API listener to.
    #[arg(long, default_value = "0.0.0.0")]
    pub bind_host: IpAddr,

    /// Port to bind the native API listener to.
    #[arg(long, default_value_t = 6053)]
    pub port: u16,

    /// Device name reported to clients.
    #[arg(long, default_value = "rust-bluetooth-proxy")]
    pub name: String,

    /// Human-friendly device name reported to clients.
    #[arg(long, default_value = "Rust Bluetooth Proxy")]
    pub friendly_name: String,

    /// API password. Clients must supply it via `ConnectRequest` once
    /// `Hello` is sent; if unset, any client is authenticated by
    /// `Hello` entering `Connected` with no further requirement beyond
    /// the `Connect` handshake itself.
    #[arg(long)]
    pub password: Option<String>,

    /// Log level, used when `RUST_LOG` is not set.
    #[arg(long, default_value = "info")]
    pub log_level: String,

    /// Write logs to this file instead of stderr.
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    /// Advertise and honor GATT connect/disconnect, read, write, and
    /// notify requests. Disabled hosts only scan and relay
    /// advertisements.
    #[arg(long)]
    pub active_connections: bool,

    /// Size of the BLE connection slot pool.
    #[arg(long, default_value_t = 3)]
    pub max_connections: usize,

    /// Scan in active mode (request scan responses) rather than passive.
    #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
    pub active_scan: bool,

    /// Advertisement batch size. Accepted for interface completeness;
    /// the wire contract's batch bound (`FLUSH_BATCH_SIZE`, see
    /// `batcher.rs`) is a protocol invariant, not a runtime knob, so
    /// this flag is parsed but not threaded through.
    #[arg(long, default_value_t = crate::batcher::FLUSH_BATCH_SIZE)]
    pub batch_size: usize,
}

impl Config {
    pub fn bind_addr(&self) -> std::net::SocketAddr {
        std::net::SocketAddr::new(self.bind_host, self.port)
    }
}
