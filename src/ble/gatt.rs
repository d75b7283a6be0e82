//! GATT operation dispatch: translates wire-level GATT requests into
//! [`BleBackend`] calls and shapes their outcome into the matching
//! wire response.
//!
//! Grounded on `gatt_operations.py`'s `GATTOperationHandler`. That
//! handler fans every response out to *all* authenticated API
//! connections, not just the one that issued the request (read the
//! `_send_gatt_*` helpers); this dispatcher leaves fan-out to its
//! caller (the coordinator) and only shapes the response, since
//! fan-out needs the client registry this module has no business
//! holding.

use std::sync::Arc;

use futures::stream::BoxStream;

use crate::ble::address::BtAddr;
use crate::ble::slot::SlotPool;
use crate::ble::{BleBackend, ConnectionHandle};
use crate::proto::messages::{
    BluetoothGATTGetServicesResponse, BluetoothGATTNotifyResponse, BluetoothGATTReadResponse,
    BluetoothGATTService, BluetoothGATTWriteResponse, GATT_ERROR_GENERIC, GATT_ERROR_NONE,
};

/// Outcome of a notify-enable/disable request: disabling never needs a
/// stream, enabling always produces one alongside the ack.
pub enum NotifyOutcome {
    Disabled(BluetoothGATTNotifyResponse),
    Enabled {
        response: BluetoothGATTNotifyResponse,
        data: BoxStream<'static, Vec<u8>>,
    },
}

pub struct Dispatcher {
    backend: Arc<dyn BleBackend>,
    slots: SlotPool,
}

impl Dispatcher {
    pub fn new(backend: Arc<dyn BleBackend>, slots: SlotPool) -> Self {
        Self { backend, slots }
    }

    /// Resolve `address` to its connection handle, but only while the
    /// slot is actually `Connected` — `Connecting` and `Disconnecting`
    /// slots have no handle fit to dispatch a GATT op to.
    fn handle_for(&self, address: BtAddr) -> Option<ConnectionHandle> {
        self.slots.connected_handle(&address)
    }

    /// Resolve `address` and `handle` together: the slot must be
    /// `Connected` and `handle` must name a characteristic or
    /// descriptor in its cached discovered services.
    fn resolve(&self, address: BtAddr, handle: u32) -> Option<ConnectionHandle> {
        let conn = self.handle_for(address)?;
        if self.slots.contains_handle(&address, handle) {
            Some(conn)
        } else {
            None
        }
    }

    pub fn slots(&self) -> SlotPool {
        self.slots.clone()
    }

    /// Service discovery is cached per slot and serialized: a second
    /// caller arriving while discovery is in flight waits on the same
    /// slot lock rather than issuing its own backend round-trip, then
    /// reuses whatever the first caller cached.
    pub async fn get_services(&self, address: u64) -> BluetoothGATTGetServicesResponse {
        let addr = match BtAddr::try_from(address) {
            Ok(addr) => addr,
            Err(_) => return BluetoothGATTGetServicesResponse { address, services: Vec::new() },
        };
        let Some(handle) = self.handle_for(addr) else {
            return BluetoothGATTGetServicesResponse { address, services: Vec::new() };
        };
        if let Some(cached) = self.slots.cached_services(&addr) {
            let services = cached.into_iter().map(to_wire_service).collect();
            return BluetoothGATTGetServicesResponse { address, services };
        }
        let Some(discovery_lock) = self.slots.discovery_lock(&addr) else {
            return BluetoothGATTGetServicesResponse { address, services: Vec::new() };
        };
        let _guard = discovery_lock.lock().await;
        if let Some(cached) = self.slots.cached_services(&addr) {
            let services = cached.into_iter().map(to_wire_service).collect();
            return BluetoothGATTGetServicesResponse { address, services };
        }
        let discovered = self.backend.discover_services(&handle).await.unwrap_or_default();
        self.slots.set_services(&addr, discovered.clone());
        let services = discovered.into_iter().map(to_wire_service).collect();
        BluetoothGATTGetServicesResponse { address, services }
    }

    pub async fn read(&self, address: u64, handle: u32) -> BluetoothGATTReadResponse {
        let addr = match BtAddr::try_from(address) {
            Ok(addr) => addr,
            Err(_) => return error_read(address, handle),
        };
        let Some(conn) = self.resolve(addr, handle) else {
            return error_read(address, handle);
        };
        match self.backend.read(&conn, handle).await {
            Ok(data) => BluetoothGATTReadResponse {
                address,
                handle,
                data,
                error: GATT_ERROR_NONE,
            },
            Err(_) => error_read(address, handle),
        }
    }

    pub async fn read_descriptor(&self, address: u64, handle: u32) -> BluetoothGATTReadResponse {
        let addr = match BtAddr::try_from(address) {
            Ok(addr) => addr,
            Err(_) => return error_read(address, handle),
        };
        let Some(conn) = self.resolve(addr, handle) else {
            return error_read(address, handle);
        };
        match self.backend.read_descriptor(&conn, handle).await {
            Ok(data) => BluetoothGATTReadResponse {
                address,
                handle,
                data,
                error: GATT_ERROR_NONE,
            },
            Err(_) => error_read(address, handle),
        }
    }

    /// Returns `None` when the write succeeded and no response was
    /// requested; the caller must not emit anything in that case.
    pub async fn write(
        &self,
        address: u64,
        handle: u32,
        data: &[u8],
        response_requested: bool,
    ) -> Option<BluetoothGATTWriteResponse> {
        let addr = BtAddr::try_from(address).ok();
        let result = match addr.and_then(|a| self.resolve(a, handle)) {
            Some(conn) => self.backend.write(&conn, handle, data, response_requested).await,
            None => Err(crate::error::Error::BackendTransient("not connected".into())),
        };
        match result {
            Ok(()) if !response_requested => None,
            Ok(()) => Some(BluetoothGATTWriteResponse {
                address,
                handle,
                error: GATT_ERROR_NONE,
            }),
            Err(_) => Some(BluetoothGATTWriteResponse {
                address,
                handle,
                error: GATT_ERROR_GENERIC,
            }),
        }
    }

    pub async fn write_descriptor(
        &self,
        address: u64,
        handle: u32,
        data: &[u8],
        response_requested: bool,
    ) -> Option<BluetoothGATTWriteResponse> {
        let addr = BtAddr::try_from(address).ok();
        let result = match addr.and_then(|a| self.resolve(a, handle)) {
            Some(conn) => self.backend.write_descriptor(&conn, handle, data).await,
            None => Err(crate::error::Error::BackendTransient("not connected".into())),
        };
        match result {
            Ok(()) if !response_requested => None,
            Ok(()) => Some(BluetoothGATTWriteResponse {
                address,
                handle,
                error: GATT_ERROR_NONE,
            }),
            Err(_) => Some(BluetoothGATTWriteResponse {
                address,
                handle,
                error: GATT_ERROR_GENERIC,
            }),
        }
    }

    pub async fn notify(&self, address: u64, handle: u32, enable: bool) -> NotifyOutcome {
        let addr = BtAddr::try_from(address).ok();
        let conn = addr.and_then(|a| self.resolve(a, handle));

        if !enable {
            if let Some(conn) = &conn {
                let _ = self.backend.unsubscribe(conn, handle).await;
            }
            return NotifyOutcome::Disabled(BluetoothGATTNotifyResponse {
                address,
                handle,
                error: GATT_ERROR_NONE,
            });
        }

        let Some(conn) = conn else {
            return NotifyOutcome::Disabled(BluetoothGATTNotifyResponse {
                address,
                handle,
                error: GATT_ERROR_GENERIC,
            });
        };
        match self.backend.subscribe(&conn, handle).await {
            Ok(data) => NotifyOutcome::Enabled {
                response: BluetoothGATTNotifyResponse {
                    address,
                    handle,
                    error: GATT_ERROR_NONE,
                },
                data,
            },
            Err(_) => NotifyOutcome::Disabled(BluetoothGATTNotifyResponse {
                address,
                handle,
                error: GATT_ERROR_GENERIC,
            }),
        }
    }
}

fn error_read(address: u64, handle: u32) -> BluetoothGATTReadResponse {
    BluetoothGATTReadResponse {
        address,
        handle,
        data: Vec::new(),
        error: GATT_ERROR_GENERIC,
    }
}

fn to_wire_service(service: crate::ble::BackendService) -> BluetoothGATTService {
    BluetoothGATTService {
        uuid: service.uuid,
        handle: service.handle,
        characteristics: service
            .characteristics
            .into_iter()
            .map(|c| crate::proto::messages::BluetoothGATTCharacteristic {
                uuid: c.uuid,
                handle: c.handle,
                properties: c.properties,
                descriptors: c
                    .descriptors
                    .into_iter()
                    .map(|d| crate::proto::messages::BluetoothGATTDescriptor {
                        uuid: d.uuid,
                        handle: d.handle,
                    })
                    .collect(),
            })
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ble::mock::MockBackend;

    #[tokio::test]
    async fn read_on_disconnected_device_is_an_error() {
        let backend = Arc::new(MockBackend::new());
        let dispatcher = Dispatcher::new(backend, SlotPool::new(3));
        let resp = dispatcher.read(0x1122334455, 5).await;
        assert_eq!(resp.error, GATT_ERROR_GENERIC);
        assert!(resp.data.is_empty());
    }

    /// Acquire a slot, mark it `Connected`, and seed its cached
    /// services with one characteristic (handle 3) holding one
    /// descriptor (handle 4), for tests that need a handle to resolve.
    fn connected_slot_with_handle(addr: BtAddr) -> SlotPool {
        let slots = SlotPool::new(3);
        let handle = ConnectionHandle(addr);
        slots.acquire(addr, handle, crate::ble::address::AddressKind::Public).unwrap();
        slots.mark_connected(&addr, crate::ble::slot::DEFAULT_MTU);
        slots.set_services(
            &addr,
            vec![crate::ble::BackendService {
                uuid: uuid::Uuid::nil(),
                handle: 1,
                characteristics: vec![crate::ble::BackendCharacteristic {
                    uuid: uuid::Uuid::nil(),
                    handle: 3,
                    properties: 0,
                    descriptors: vec![crate::ble::BackendDescriptor {
                        uuid: uuid::Uuid::nil(),
                        handle: 4,
                    }],
                }],
            }],
        );
        slots
    }

    #[tokio::test]
    async fn write_without_response_emits_nothing_on_success() {
        let backend = Arc::new(MockBackend::new());
        let addr = BtAddr::from([0, 0, 0, 0, 0, 1]);
        let slots = connected_slot_with_handle(addr);
        let dispatcher = Dispatcher::new(backend, slots);
        let resp = dispatcher.write(addr.into(), 3, b"hi", false).await;
        assert!(resp.is_none());
    }

    #[tokio::test]
    async fn read_while_slot_still_connecting_is_an_error() {
        let backend = Arc::new(MockBackend::new());
        let addr = BtAddr::from([0, 0, 0, 0, 0, 1]);
        let slots = SlotPool::new(3);
        let handle = backend.connect(addr, crate::ble::address::AddressKind::Public).await.unwrap();
        slots.acquire(addr, handle, crate::ble::address::AddressKind::Public).unwrap();
        let dispatcher = Dispatcher::new(backend, slots);
        let resp = dispatcher.read(addr.into(), 3).await;
        assert_eq!(resp.error, GATT_ERROR_GENERIC);
    }

    #[tokio::test]
    async fn write_with_unknown_handle_is_an_error() {
        let backend = Arc::new(MockBackend::new());
        let addr = BtAddr::from([0, 0, 0, 0, 0, 1]);
        let slots = connected_slot_with_handle(addr);
        let dispatcher = Dispatcher::new(backend, slots);
        let resp = dispatcher.write(addr.into(), 999, b"hi", true).await;
        assert_eq!(resp.unwrap().error, GATT_ERROR_GENERIC);
    }

    #[tokio::test]
    async fn read_descriptor_resolves_descriptor_handles_too() {
        let backend = Arc::new(MockBackend::new());
        let addr = BtAddr::from([0, 0, 0, 0, 0, 1]);
        let slots = connected_slot_with_handle(addr);
        let dispatcher = Dispatcher::new(backend, slots);
        let resp = dispatcher.read_descriptor(addr.into(), 4).await;
        assert_eq!(resp.error, GATT_ERROR_NONE);
    }

    #[tokio::test]
    async fn get_services_caches_after_first_discovery() {
        let backend = Arc::new(MockBackend::new());
        let addr = BtAddr::from([0, 0, 0, 0, 0, 1]);
        backend.set_services(addr, vec![crate::ble::BackendService {
            uuid: uuid::Uuid::nil(),
            handle: 1,
            characteristics: Vec::new(),
        }]);
        let slots = SlotPool::new(3);
        let handle = backend.connect(addr, crate::ble::address::AddressKind::Public).await.unwrap();
        slots.acquire(addr, handle, crate::ble::address::AddressKind::Public).unwrap();
        slots.mark_connected(&addr, crate::ble::slot::DEFAULT_MTU);
        let dispatcher = Dispatcher::new(backend.clone(), slots);

        let first = dispatcher.get_services(addr.into()).await;
        let second = dispatcher.get_services(addr.into()).await;

        assert_eq!(first.services.len(), 1);
        assert_eq!(second.services.len(), 1);
        assert_eq!(backend.discover_call_count(), 1, "second call must reuse the cache");
    }
}
