//! The TCP accept loop: one [`client::handle_connection`] task per
//! incoming connection, all sharing one [`Coordinator`].

pub mod client;

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinSet;

use crate::ble::coordinator::{ClientId, Coordinator};
use crate::device_info::DeviceInfo;
use crate::error::Result;

pub struct ApiServer {
    coordinator: Arc<Coordinator>,
    device_info: Arc<DeviceInfo>,
    password: Option<String>,
    next_client_id: AtomicU64,
}

impl ApiServer {
    pub fn new(coordinator: Arc<Coordinator>, device_info: DeviceInfo, password: Option<String>) -> Self {
        Self {
            coordinator,
            device_info: Arc::new(device_info),
            password,
            next_client_id: AtomicU64::new(1),
        }
    }

    /// Accept connections on `bind_addr` until `shutdown` is signalled.
    /// On shutdown: stop accepting, ask the coordinator to disconnect
    /// every BLE slot and notify clients, wait up to three seconds for
    /// open connections to close on their own, then abort whatever's
    /// still running.
    pub async fn run(self: Arc<Self>, bind_addr: SocketAddr, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        let listener = TcpListener::bind(bind_addr).await?;
        log::info!("listening on {bind_addr}");

        let mut connections = JoinSet::new();

        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    let (stream, addr) = match accepted {
                        Ok(pair) => pair,
                        Err(err) => {
                            log::warn!("failed to accept connection: {err}");
                            continue;
                        }
                    };
                    let _ = addr;
                    let id = ClientId(self.next_client_id.fetch_add(1, Ordering::Relaxed));
                    let coordinator = self.coordinator.clone();
                    let device_info = self.device_info.clone();
                    let password = self.password.clone();
                    connections.spawn(client::handle_connection(stream, id, coordinator, device_info, password));
                }
                _ = shutdown.changed() => {
                    log::info!("shutdown requested, no longer accepting connections");
                    break;
                }
            }
        }

        // Best-effort: disconnect every BLE slot and notify clients,
        // then give already-open connections a grace period to close
        // on their own before aborting whatever's left.
        self.coordinator.shutdown().await;
        let grace = tokio::time::timeout(Duration::from_secs(3), async {
            while connections.join_next().await.is_some() {}
        });
        if grace.await.is_err() {
            log::warn!("shutdown grace period elapsed with connections still open; closing the rest");
        }
        connections.shutdown().await;
        Ok(())
    }
}
