//! The abstract BLE backend contract and the domain types it trades
//! in, plus the coordination layer built on top of it.
//!
//! `BleBackend` is the Rust re-expression of the host's BLE stack as
//! an async trait, directly modeled on this crate's own
//! `api::Central` + `api::Peripheral` traits: one trait boundary
//! standing in for "however the host talks to its Bluetooth
//! controller." No concrete implementation ships (BlueZ, CoreBluetooth
//! and WinRT backends are out of scope), only the in-memory
//! [`mock`] used by tests.

pub mod address;
pub mod coordinator;
pub mod gatt;
#[cfg(any(test, feature = "mock-backend"))]
pub mod mock;
pub mod scanner;
pub mod slot;

use async_trait::async_trait;
use futures::stream::BoxStream;
use uuid::Uuid;

use crate::error::Result;
use crate::ble::address::{AddressKind, BtAddr};

/// One BLE advertisement observed by the backend, before it's been
/// packed into a wire `BluetoothLEAdvertisementResponse`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawAdvertisement {
    pub address: BtAddr,
    pub address_kind: AddressKind,
    pub rssi: i32,
    pub manufacturer_data: std::collections::HashMap<u16, Vec<u8>>,
    pub service_data: std::collections::HashMap<Uuid, Vec<u8>>,
    pub local_name: Option<String>,
}

impl RawAdvertisement {
    /// Pack manufacturer data, service data, and local name into a flat
    /// AD-structure byte string (`[len][type][payload]...`), capped at
    /// 62 bytes to match the legacy advertising PDU's 31+31 byte split
    /// between the advertising and scan-response payloads.
    pub fn encode_data(&self) -> Vec<u8> {
        const MAX_LEN: usize = 62;
        const AD_TYPE_MANUFACTURER: u8 = 0xff;
        const AD_TYPE_SERVICE_DATA_16: u8 = 0x16;
        const AD_TYPE_COMPLETE_LOCAL_NAME: u8 = 0x09;

        let mut out = Vec::new();
        for (company_id, data) in &self.manufacturer_data {
            let mut structure = Vec::with_capacity(3 + data.len());
            structure.push(AD_TYPE_MANUFACTURER);
            structure.extend_from_slice(&company_id.to_le_bytes());
            structure.extend_from_slice(data);
            push_ad_structure(&mut out, &structure);
        }
        for (uuid, data) in &self.service_data {
            let mut structure = Vec::with_capacity(3 + data.len());
            structure.push(AD_TYPE_SERVICE_DATA_16);
            structure.extend_from_slice(&crate::proto::uuid::uuid_to_wire_bytes(uuid)[..2]);
            structure.extend_from_slice(data);
            push_ad_structure(&mut out, &structure);
        }
        if let Some(name) = &self.local_name {
            let mut structure = Vec::with_capacity(1 + name.len());
            structure.push(AD_TYPE_COMPLETE_LOCAL_NAME);
            structure.extend_from_slice(name.as_bytes());
            push_ad_structure(&mut out, &structure);
        }
        out.truncate(MAX_LEN);
        out
    }
}

fn push_ad_structure(out: &mut Vec<u8>, structure: &[u8]) {
    out.push(structure.len() as u8);
    out.extend_from_slice(structure);
}

/// Handle to a live backend connection. One connection per address at
/// a time, so the address itself is a sufficient handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionHandle(pub BtAddr);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendDescriptor {
    pub uuid: Uuid,
    pub handle: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendCharacteristic {
    pub uuid: Uuid,
    pub handle: u32,
    pub properties: u32,
    pub descriptors: Vec<BackendDescriptor>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendService {
    pub uuid: Uuid,
    pub handle: u32,
    pub characteristics: Vec<BackendCharacteristic>,
}

/// The abstract contract the coordinator drives. Implementations must
/// not leak their own error taxonomy: everything surfaces as
/// `crate::Error::BackendTransient` except for the startup-time
/// `adapter_mac` probe, whose absence is handled by the caller
/// (`DeviceInfoProvider::resolve_mac`), not by this trait.
#[async_trait]
pub trait BleBackend: Send + Sync + 'static {
    /// The adapter's own hardware address, if the backend can report one.
    async fn adapter_mac(&self) -> Result<Option<BtAddr>>;

    async fn start_scan(&self, active: bool) -> Result<()>;
    async fn stop_scan(&self) -> Result<()>;

    /// Advertisements observed since the stream was created. Live for
    /// as long as the backend itself.
    fn advertisements(&self) -> BoxStream<'static, RawAdvertisement>;

    async fn connect(&self, address: BtAddr, kind: AddressKind) -> Result<ConnectionHandle>;
    async fn disconnect(&self, handle: &ConnectionHandle) -> Result<()>;
    async fn discover_services(&self, handle: &ConnectionHandle) -> Result<Vec<BackendService>>;

    async fn read(&self, handle: &ConnectionHandle, char_handle: u32) -> Result<Vec<u8>>;
    async fn write(
        &self,
        handle: &ConnectionHandle,
        char_handle: u32,
        data: &[u8],
        with_response: bool,
    ) -> Result<()>;

    async fn read_descriptor(&self, handle: &ConnectionHandle, desc_handle: u32) -> Result<Vec<u8>>;
    async fn write_descriptor(
        &self,
        handle: &ConnectionHandle,
        desc_handle: u32,
        data: &[u8],
    ) -> Result<()>;

    async fn subscribe(
        &self,
        handle: &ConnectionHandle,
        char_handle: u32,
    ) -> Result<BoxStream<'static, Vec<u8>>>;
    async fn unsubscribe(&self, handle: &ConnectionHandle, char_handle: u32) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_data_prefixes_each_structure_with_its_length() {
        let adv = RawAdvertisement {
            address: BtAddr::from([0, 0, 0, 0, 0, 1]),
            address_kind: AddressKind::Public,
            rssi: -50,
            manufacturer_data: std::collections::HashMap::new(),
            service_data: std::collections::HashMap::new(),
            local_name: Some("foo".to_string()),
        };
        let data = adv.encode_data();
        // [len=4][0x09]['f']['o']['o']
        assert_eq!(data, vec![4, 0x09, b'f', b'o', b'o']);
    }

    #[test]
    fn encode_data_truncates_to_62_bytes() {
        let mut manufacturer_data = std::collections::HashMap::new();
        manufacturer_data.insert(0x1234, vec![0xAB; 100]);
        let adv = RawAdvertisement {
            address: BtAddr::from([0, 0, 0, 0, 0, 1]),
            address_kind: AddressKind::Public,
            rssi: -50,
            manufacturer_data,
            service_data: std::collections::HashMap::new(),
            local_name: None,
        };
        assert_eq!(adv.encode_data().len(), 62);
    }
}
