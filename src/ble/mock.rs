//! In-memory [`BleBackend`] used by tests (and by the `mock-backend`
//! feature for manual exercising of the daemon without real
//! hardware), filling the role this crate's own manual mocks fill in
//! its platform test suites.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use futures::stream::BoxStream;
use tokio::sync::{broadcast, mpsc};
use tokio_stream::wrappers::{BroadcastStream, UnboundedReceiverStream};
use tokio_stream::StreamExt;

use crate::ble::address::{AddressKind, BtAddr};
use crate::ble::{BackendService, BleBackend, ConnectionHandle, RawAdvertisement};
use crate::error::{Error, Result};

#[derive(Default)]
pub struct MockBackend {
    adapter_mac: Option<BtAddr>,
    services: DashMap<BtAddr, Vec<BackendService>>,
    notify_senders: DashMap<(BtAddr, u32), mpsc::UnboundedSender<Vec<u8>>>,
    advertisements: broadcast::Sender<RawAdvertisement>,
    /// Addresses that must fail to connect, for exercising error paths.
    unreachable: DashMap<BtAddr, ()>,
    discover_calls: std::sync::atomic::AtomicUsize,
}

impl MockBackend {
    pub fn new() -> Self {
        let (advertisements, _) = broadcast::channel(64);
        Self {
            adapter_mac: None,
            services: DashMap::new(),
            notify_senders: DashMap::new(),
            advertisements,
            unreachable: DashMap::new(),
            discover_calls: std::sync::atomic::AtomicUsize::new(0),
        }
    }

    /// Number of `discover_services` calls the backend has actually
    /// served, for asserting that a caller's cache avoided one.
    pub fn discover_call_count(&self) -> usize {
        self.discover_calls.load(std::sync::atomic::Ordering::SeqCst)
    }

    pub fn with_adapter_mac(mut self, mac: BtAddr) -> Self {
        self.adapter_mac = Some(mac);
        self
    }

    pub fn set_services(&self, address: BtAddr, services: Vec<BackendService>) {
        self.services.insert(address, services);
    }

    pub fn mark_unreachable(&self, address: BtAddr) {
        self.unreachable.insert(address, ());
    }

    pub fn push_advertisement(&self, advertisement: RawAdvertisement) {
        let _ = self.advertisements.send(advertisement);
    }

    /// Deliver one notification payload to whoever subscribed to
    /// `(address, char_handle)`. No-op if nobody is subscribed.
    pub fn push_notification(&self, address: BtAddr, char_handle: u32, data: Vec<u8>) {
        if let Some(sender) = self.notify_senders.get(&(address, char_handle)) {
            let _ = sender.send(data);
        }
    }
}

#[async_trait]
impl BleBackend for MockBackend {
    async fn adapter_mac(&self) -> Result<Option<BtAddr>> {
        Ok(self.adapter_mac)
    }

    async fn start_scan(&self, _active: bool) -> Result<()> {
        Ok(())
    }

    async fn stop_scan(&self) -> Result<()> {
        Ok(())
    }

    fn advertisements(&self) -> BoxStream<'static, RawAdvertisement> {
        let receiver = self.advertisements.subscribe();
        Box::pin(BroadcastStream::new(receiver).filter_map(|item| item.ok()))
    }

    async fn connect(&self, address: BtAddr, _kind: AddressKind) -> Result<ConnectionHandle> {
        if self.unreachable.contains_key(&address) {
            return Err(Error::BackendTransient("mock: unreachable".into()));
        }
        Ok(ConnectionHandle(address))
    }

    async fn disconnect(&self, _handle: &ConnectionHandle) -> Result<()> {
        Ok(())
    }

    async fn discover_services(&self, handle: &ConnectionHandle) -> Result<Vec<BackendService>> {
        self.discover_calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        Ok(self
            .services
            .get(&handle.0)
            .map(|entry| entry.value().clone())
            .unwrap_or_default())
    }

    async fn read(&self, handle: &ConnectionHandle, char_handle: u32) -> Result<Vec<u8>> {
        let _ = (handle, char_handle);
        Ok(vec![0xAB, 0xCD])
    }

    async fn write(
        &self,
        _handle: &ConnectionHandle,
        _char_handle: u32,
        _data: &[u8],
        _with_response: bool,
    ) -> Result<()> {
        Ok(())
    }

    async fn read_descriptor(&self, _handle: &ConnectionHandle, _desc_handle: u32) -> Result<Vec<u8>> {
        Ok(vec![0x01])
    }

    async fn write_descriptor(
        &self,
        _handle: &ConnectionHandle,
        _desc_handle: u32,
        _data: &[u8],
    ) -> Result<()> {
        Ok(())
    }

    async fn subscribe(
        &self,
        handle: &ConnectionHandle,
        char_handle: u32,
    ) -> Result<BoxStream<'static, Vec<u8>>> {
        let (sender, receiver) = mpsc::unbounded_channel();
        self.notify_senders.insert((handle.0, char_handle), sender);
        Ok(Box::pin(UnboundedReceiverStream::new(receiver)))
    }

    async fn unsubscribe(&self, handle: &ConnectionHandle, char_handle: u32) -> Result<()> {
        self.notify_senders.remove(&(handle.0, char_handle));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn connect_to_marked_unreachable_address_fails() {
        let backend = MockBackend::new();
        let addr = BtAddr::from([0, 0, 0, 0, 0, 9]);
        backend.mark_unreachable(addr);
        let result = backend.connect(addr, AddressKind::Public).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn subscribe_then_push_notification_delivers_data() {
        let backend = MockBackend::new();
        let addr = BtAddr::from([0, 0, 0, 0, 0, 1]);
        let handle = ConnectionHandle(addr);
        let mut stream = backend.subscribe(&handle, 7).await.unwrap();
        backend.push_notification(addr, 7, vec![1, 2, 3]);
        let data = stream.next().await.unwrap();
        assert_eq!(data, vec![1, 2, 3]);
    }
}
