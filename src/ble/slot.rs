//! Bounded pool of BLE connection slots.
//!
//! Grounded on `common/adapter_manager.rs`'s `AdapterManager`: a
//! `DashMap` address index guarded behind a small `Arc<Shared>`
//! wrapper, `Clone` and cheap to share across tasks. Unlike
//! `AdapterManager`, slot count is capped — that bound is the whole
//! point of this type.
//!
//! Each occupied slot carries the state
//! `examples/original_source/src/esphome_bluetooth_proxy/ble_connection.py`
//! keeps per connection: a lifecycle state, the negotiated MTU, a
//! lazily discovered service list, and the handles subscribed to
//! notifications. `send_service_index` mirrors that module's
//! `self.send_service_index`: `-2` before discovery has run, `-1` once
//! the cached list has been handed to a caller. This dispatcher always
//! sends the whole service list in one wire response, so the index
//! never takes on the positive "next chunk to send" values the
//! original uses for its incremental transfer.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinHandle;

use crate::ble::address::{AddressKind, BtAddr};
#[cfg(test)]
use crate::ble::{BackendCharacteristic, BackendDescriptor};
use crate::ble::{BackendService, ConnectionHandle};
use crate::error::{Error, Result};

/// Negotiated MTU before any exchange takes place.
pub const DEFAULT_MTU: u32 = 23;

/// Service discovery has not been attempted for this slot yet.
const SERVICES_NOT_DISCOVERED: i32 = -2;
/// Discovery ran and the cached list has been handed out.
const SERVICES_SENT: i32 = -1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    Disconnected,
    Connecting,
    Connected,
    Disconnecting,
}

/// Per-connection state tracked for the lifetime of one occupied slot.
struct Slot {
    handle: ConnectionHandle,
    kind: AddressKind,
    state: SlotState,
    mtu: u32,
    services: Option<Vec<BackendService>>,
    send_service_index: i32,
    /// Forwarding tasks for enabled notifications, keyed by
    /// characteristic handle. Aborted whole on release.
    notify_sinks: std::collections::HashMap<u32, JoinHandle<()>>,
    /// Serializes `GetServices` against the backend: a concurrent
    /// caller waits on this rather than triggering a second discovery.
    discovery: Arc<AsyncMutex<()>>,
}

impl Slot {
    fn new(handle: ConnectionHandle, kind: AddressKind) -> Self {
        Self {
            handle,
            kind,
            state: SlotState::Connecting,
            mtu: DEFAULT_MTU,
            services: None,
            send_service_index: SERVICES_NOT_DISCOVERED,
            notify_sinks: std::collections::HashMap::new(),
            discovery: Arc::new(AsyncMutex::new(())),
        }
    }

    fn abort_notify_sinks(&mut self) {
        for (_, task) in self.notify_sinks.drain() {
            task.abort();
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SlotSnapshot {
    pub state: SlotState,
    pub mtu: u32,
    pub kind: AddressKind,
}

#[derive(Clone)]
pub struct SlotPool {
    shared: Arc<Shared>,
}

struct Shared {
    max_connections: usize,
    slots: DashMap<BtAddr, Slot>,
}

impl SlotPool {
    pub fn new(max_connections: usize) -> Self {
        Self {
            shared: Arc::new(Shared {
                max_connections,
                slots: DashMap::new(),
            }),
        }
    }

    pub fn max_connections(&self) -> usize {
        self.shared.max_connections
    }

    pub fn in_use(&self) -> usize {
        self.shared.slots.len()
    }

    pub fn free_slots(&self) -> usize {
        self.shared.max_connections.saturating_sub(self.in_use())
    }

    pub fn get(&self, address: &BtAddr) -> Option<ConnectionHandle> {
        self.shared.slots.get(address).map(|entry| entry.handle)
    }

    /// The handle for `address`, but only if the slot has actually
    /// reached `Connected` — a slot still `Connecting` or already
    /// `Disconnecting` has no handle fit to dispatch a GATT op to.
    pub fn connected_handle(&self, address: &BtAddr) -> Option<ConnectionHandle> {
        self.shared.slots.get(address).and_then(|entry| {
            if entry.state == SlotState::Connected {
                Some(entry.handle)
            } else {
                None
            }
        })
    }

    /// Whether `handle` names a characteristic or descriptor in the
    /// slot's cached discovered services. `false` if the slot is gone
    /// or discovery hasn't populated the cache yet.
    pub fn contains_handle(&self, address: &BtAddr, handle: u32) -> bool {
        self.shared
            .slots
            .get(address)
            .and_then(|entry| entry.services.as_ref().map(|services| services_contain_handle(services, handle)))
            .unwrap_or(false)
    }

    pub fn is_connected(&self, address: &BtAddr) -> bool {
        self.shared.slots.contains_key(address)
    }

    pub fn snapshot(&self, address: &BtAddr) -> Option<SlotSnapshot> {
        self.shared.slots.get(address).map(|entry| SlotSnapshot {
            state: entry.state,
            mtu: entry.mtu,
            kind: entry.kind,
        })
    }

    /// Reserve a slot for `address`. Fails with [`Error::SlotExhaustion`]
    /// if the pool is already full; the caller owns rejecting the
    /// connect request with `connected=false, error=1`.
    pub fn acquire(&self, address: BtAddr, handle: ConnectionHandle, kind: AddressKind) -> Result<()> {
        if self.shared.slots.contains_key(&address) {
            return Ok(());
        }
        if self.in_use() >= self.shared.max_connections {
            return Err(Error::SlotExhaustion);
        }
        self.shared.slots.insert(address, Slot::new(handle, kind));
        Ok(())
    }

    /// Mark a slot connected once the backend confirms it, recording
    /// the negotiated MTU.
    pub fn mark_connected(&self, address: &BtAddr, mtu: u32) {
        if let Some(mut entry) = self.shared.slots.get_mut(address) {
            entry.state = SlotState::Connected;
            entry.mtu = mtu;
        }
    }

    /// Mark a slot as tearing down. Still present in the index until
    /// [`release`](Self::release) removes it.
    pub fn mark_disconnecting(&self, address: &BtAddr) {
        if let Some(mut entry) = self.shared.slots.get_mut(address) {
            entry.state = SlotState::Disconnecting;
        }
    }

    /// Remove the slot, aborting every forwarding task it owns. Safe
    /// to call on an address with no slot.
    pub fn release(&self, address: &BtAddr) {
        if let Some((_, mut slot)) = self.shared.slots.remove(address) {
            slot.abort_notify_sinks();
        }
    }

    /// Cached service list, if discovery has already completed.
    pub fn cached_services(&self, address: &BtAddr) -> Option<Vec<BackendService>> {
        self.shared.slots.get(address).and_then(|entry| {
            if entry.send_service_index == SERVICES_SENT {
                entry.services.clone()
            } else {
                None
            }
        })
    }

    /// Store a freshly discovered service list and mark it cached.
    pub fn set_services(&self, address: &BtAddr, services: Vec<BackendService>) {
        if let Some(mut entry) = self.shared.slots.get_mut(address) {
            entry.services = Some(services);
            entry.send_service_index = SERVICES_SENT;
        }
    }

    /// The mutex serializing concurrent discovery for this slot, so a
    /// second `GetServices` call waits for the first instead of
    /// issuing its own backend round-trip. `None` if the slot is gone.
    pub fn discovery_lock(&self, address: &BtAddr) -> Option<Arc<AsyncMutex<()>>> {
        self.shared.slots.get(address).map(|entry| entry.discovery.clone())
    }

    /// Register a notification forwarding task, aborting any existing
    /// one for the same handle (a re-subscribe replaces it).
    pub fn register_notify_sink(&self, address: &BtAddr, handle: u32, task: JoinHandle<()>) {
        if let Some(mut entry) = self.shared.slots.get_mut(address) {
            if let Some(previous) = entry.notify_sinks.insert(handle, task) {
                previous.abort();
            }
        } else {
            task.abort();
        }
    }

    /// Cancel and drop the forwarding task for one handle, if any.
    pub fn unregister_notify_sink(&self, address: &BtAddr, handle: u32) {
        if let Some(mut entry) = self.shared.slots.get_mut(address) {
            if let Some(task) = entry.notify_sinks.remove(&handle) {
                task.abort();
            }
        }
    }

    pub fn addresses(&self) -> Vec<BtAddr> {
        self.shared.slots.iter().map(|entry| *entry.key()).collect()
    }
}

fn services_contain_handle(services: &[BackendService], handle: u32) -> bool {
    services.iter().any(|service| {
        service
            .characteristics
            .iter()
            .any(|c| c.handle == handle || c.descriptors.iter().any(|d| d.handle == handle))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(n: u8) -> BtAddr {
        BtAddr::from([0, 0, 0, 0, 0, n])
    }

    #[test]
    fn acquire_up_to_max_then_rejects() {
        let pool = SlotPool::new(2);
        pool.acquire(addr(1), ConnectionHandle(addr(1)), AddressKind::Public).unwrap();
        pool.acquire(addr(2), ConnectionHandle(addr(2)), AddressKind::Public).unwrap();
        assert_eq!(pool.free_slots(), 0);
        let err = pool
            .acquire(addr(3), ConnectionHandle(addr(3)), AddressKind::Public)
            .unwrap_err();
        assert!(matches!(err, Error::SlotExhaustion));
    }

    #[test]
    fn release_frees_a_slot() {
        let pool = SlotPool::new(1);
        pool.acquire(addr(1), ConnectionHandle(addr(1)), AddressKind::Public).unwrap();
        pool.release(&addr(1));
        assert_eq!(pool.free_slots(), 1);
        pool.acquire(addr(2), ConnectionHandle(addr(2)), AddressKind::Public).unwrap();
    }

    #[test]
    fn reacquiring_the_same_address_is_idempotent() {
        let pool = SlotPool::new(1);
        pool.acquire(addr(1), ConnectionHandle(addr(1)), AddressKind::Public).unwrap();
        pool.acquire(addr(1), ConnectionHandle(addr(1)), AddressKind::Public).unwrap();
        assert_eq!(pool.in_use(), 1);
    }

    #[test]
    fn invariant_in_use_equals_map_size_and_bounded_by_max() {
        let pool = SlotPool::new(3);
        for i in 1..=3 {
            pool.acquire(addr(i), ConnectionHandle(addr(i)), AddressKind::Public).unwrap();
        }
        assert_eq!(pool.in_use(), pool.shared.slots.len());
        assert!(pool.in_use() <= pool.max_connections());
    }

    #[test]
    fn mark_connected_updates_state_and_mtu() {
        let pool = SlotPool::new(1);
        pool.acquire(addr(1), ConnectionHandle(addr(1)), AddressKind::Public).unwrap();
        pool.mark_connected(&addr(1), 185);
        let snap = pool.snapshot(&addr(1)).unwrap();
        assert_eq!(snap.state, SlotState::Connected);
        assert_eq!(snap.mtu, 185);
    }

    #[test]
    fn connected_handle_is_none_until_connected() {
        let pool = SlotPool::new(1);
        pool.acquire(addr(1), ConnectionHandle(addr(1)), AddressKind::Public).unwrap();
        assert!(pool.connected_handle(&addr(1)).is_none());
        pool.mark_connected(&addr(1), DEFAULT_MTU);
        assert!(pool.connected_handle(&addr(1)).is_some());
        pool.mark_disconnecting(&addr(1));
        assert!(pool.connected_handle(&addr(1)).is_none());
    }

    #[test]
    fn contains_handle_checks_characteristics_and_descriptors() {
        let pool = SlotPool::new(1);
        pool.acquire(addr(1), ConnectionHandle(addr(1)), AddressKind::Public).unwrap();
        assert!(!pool.contains_handle(&addr(1), 10));
        pool.set_services(
            &addr(1),
            vec![BackendService {
                uuid: uuid::Uuid::nil(),
                handle: 1,
                characteristics: vec![BackendCharacteristic {
                    uuid: uuid::Uuid::nil(),
                    handle: 10,
                    properties: 0,
                    descriptors: vec![BackendDescriptor {
                        uuid: uuid::Uuid::nil(),
                        handle: 11,
                    }],
                }],
            }],
        );
        assert!(pool.contains_handle(&addr(1), 10));
        assert!(pool.contains_handle(&addr(1), 11));
        assert!(!pool.contains_handle(&addr(1), 99));
    }

    #[test]
    fn services_are_uncached_until_set() {
        let pool = SlotPool::new(1);
        pool.acquire(addr(1), ConnectionHandle(addr(1)), AddressKind::Public).unwrap();
        assert!(pool.cached_services(&addr(1)).is_none());
        pool.set_services(&addr(1), Vec::new());
        assert!(pool.cached_services(&addr(1)).is_some());
    }

    #[test]
    fn release_clears_cached_state() {
        let pool = SlotPool::new(1);
        pool.acquire(addr(1), ConnectionHandle(addr(1)), AddressKind::Public).unwrap();
        pool.set_services(&addr(1), Vec::new());
        pool.release(&addr(1));
        pool.acquire(addr(1), ConnectionHandle(addr(1)), AddressKind::Public).unwrap();
        assert!(pool.cached_services(&addr(1)).is_none());
    }
}
