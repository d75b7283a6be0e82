//! A host-side daemon speaking the ESPHome native API protocol,
//! proxying Bluetooth Low Energy traffic between upstream controllers
//! and nearby BLE peripherals.
//!
//! The BLE transport itself is an abstract [`ble::BleBackend`] trait
//! object; no concrete platform backend ships with this crate (see
//! `ble::mock` for the in-memory stand-in used by tests and, absent a
//! real backend, by the binary).

pub mod batcher;
pub mod ble;
pub mod config;
pub mod device_info;
pub mod error;
pub mod proto;
pub mod server;

pub use error::{Error, Result};
