//! Per-connection API client state machine.
//!
//! Grounded on `connection.py`'s `APIConnection`: a `Framed` split into
//! a single writer task (through which both direct responses and the
//! coordinator's fan-out travel, so a client's socket is never written
//! from two places at once) and a read loop enforcing the state
//! machine. `Hello` always lands in `Connected` here rather than
//! auto-authenticating when no password is configured — stricter than
//! the source, matching the state diagram this was distilled to.

use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_util::codec::Framed;

use crate::ble::address::AddressKind;
use crate::ble::coordinator::{ClientId, Coordinator, OutboundMessage};
use crate::device_info::DeviceInfo;
use crate::proto::messages::{
    BluetoothDeviceRequest, BluetoothGATTGetServicesRequest, BluetoothGATTNotifyRequest,
    BluetoothGATTReadDescriptorRequest, BluetoothGATTReadRequest, BluetoothGATTWriteDescriptorRequest,
    BluetoothGATTWriteRequest, ConnectRequest, ConnectResponse, DisconnectResponse, HelloRequest,
    HelloResponse, ListEntitiesDoneResponse, PingResponse,
};
use crate::proto::{MessageType, WireCodec};

const READ_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConnectionState {
    Connecting,
    Connected,
    Authenticated,
}

/// Drive one accepted TCP connection to completion. Returns once the
/// client disconnects, times out, or is closed for a protocol reason.
pub async fn handle_connection(
    stream: TcpStream,
    id: ClientId,
    coordinator: Arc<Coordinator>,
    device_info: Arc<DeviceInfo>,
    password: Option<String>,
) {
    let peer = stream
        .peer_addr()
        .map(|addr| addr.to_string())
        .unwrap_or_else(|_| "unknown".to_string());
    log::info!("new connection from {peer}");

    let framed = Framed::new(stream, WireCodec);
    let (mut sink, mut frames) = framed.split();

    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<OutboundMessage>();
    let mut coord_rx = coordinator.register_client(id);

    let forward_tx = out_tx.clone();
    let forward = tokio::spawn(async move {
        while let Some(msg) = coord_rx.recv().await {
            if forward_tx.send(msg).is_err() {
                return;
            }
        }
    });

    let writer = tokio::spawn(async move {
        while let Some(msg) = out_rx.recv().await {
            if sink.send(msg).await.is_err() {
                return;
            }
        }
    });

    let mut client = ApiClient {
        id,
        state: ConnectionState::Connecting,
        password,
        device_info,
        coordinator: coordinator.clone(),
        out: out_tx,
    };

    loop {
        let frame = match tokio::time::timeout(READ_TIMEOUT, frames.next()).await {
            Ok(Some(Ok(frame))) => frame,
            Ok(Some(Err(err))) => {
                log::error!("protocol error from {peer}: {err}");
                break;
            }
            Ok(None) => {
                log::info!("client {peer} disconnected");
                break;
            }
            Err(_) => {
                log::warn!("connection {peer} timed out");
                break;
            }
        };

        let (message_type, payload) = frame;
        if !client.handle_message(message_type, &payload).await {
            break;
        }
    }

    coordinator.on_client_disconnected(id).await;
    forward.abort();
    writer.abort();
}

struct ApiClient {
    id: ClientId,
    state: ConnectionState,
    password: Option<String>,
    device_info: Arc<DeviceInfo>,
    coordinator: Arc<Coordinator>,
    out: mpsc::UnboundedSender<OutboundMessage>,
}

impl ApiClient {
    fn send(&self, message_type: MessageType, payload: Vec<u8>) {
        let _ = self.out.send((message_type.wire_value(), payload));
    }

    /// Dispatch one inbound message. Returns `false` when the
    /// connection must close.
    async fn handle_message(&mut self, message_type: u32, payload: &[u8]) -> bool {
        let Some(message_type) = MessageType::from_wire_value(message_type) else {
            log::warn!("unhandled message type {message_type} from client {}", self.id.0);
            return true;
        };

        match message_type {
            MessageType::HelloRequest => return self.handle_hello(payload),
            MessageType::ConnectRequest => return self.handle_connect(payload),
            MessageType::DisconnectRequest => {
                self.send(MessageType::DisconnectResponse, DisconnectResponse.encode());
                return false;
            }
            MessageType::PingRequest => {
                if self.state == ConnectionState::Authenticated {
                    self.send(MessageType::PingResponse, PingResponse.encode());
                }
            }
            MessageType::DeviceInfoRequest => self.handle_device_info(payload),
            MessageType::ListEntitiesRequest => {
                if self.state == ConnectionState::Authenticated {
                    self.send(
                        MessageType::ListEntitiesDoneResponse,
                        ListEntitiesDoneResponse.encode(),
                    );
                }
            }
            MessageType::SubscribeStatesRequest => {
                if self.state == ConnectionState::Authenticated {
                    self.coordinator.subscribe_states(self.id).await;
                }
            }
            MessageType::BluetoothDeviceRequest => {
                if self.state == ConnectionState::Authenticated {
                    if let Ok(request) = BluetoothDeviceRequest::decode(payload) {
                        let kind = AddressKind::from_wire_value(request.address_type);
                        if request.action == BluetoothDeviceRequest::ACTION_DISCONNECT {
                            self.coordinator.disconnect_device(request.address).await;
                        } else {
                            self.coordinator.connect_device(self.id, request.address, kind).await;
                        }
                    }
                }
            }
            MessageType::BluetoothGATTGetServicesRequest => {
                if self.state == ConnectionState::Authenticated {
                    if let Ok(request) = BluetoothGATTGetServicesRequest::decode(payload) {
                        let response = self.coordinator.dispatcher().get_services(request.address).await;
                        self.send(MessageType::BluetoothGATTGetServicesResponse, response.encode());
                    }
                }
            }
            MessageType::BluetoothGATTReadRequest => {
                if self.state == ConnectionState::Authenticated {
                    if let Ok(request) = BluetoothGATTReadRequest::decode(payload) {
                        let response = self
                            .coordinator
                            .dispatcher()
                            .read(request.address, request.handle)
                            .await;
                        self.send(MessageType::BluetoothGATTReadResponse, response.encode());
                    }
                }
            }
            MessageType::BluetoothGATTReadDescriptorRequest => {
                if self.state == ConnectionState::Authenticated {
                    if let Ok(request) = BluetoothGATTReadDescriptorRequest::decode(payload) {
                        let response = self
                            .coordinator
                            .dispatcher()
                            .read_descriptor(request.address, request.handle)
                            .await;
                        self.send(MessageType::BluetoothGATTReadResponse, response.encode());
                    }
                }
            }
            MessageType::BluetoothGATTWriteRequest => {
                if self.state == ConnectionState::Authenticated {
                    if let Ok(request) = BluetoothGATTWriteRequest::decode(payload) {
                        let response = self
                            .coordinator
                            .dispatcher()
                            .write(request.address, request.handle, &request.data, request.response)
                            .await;
                        if let Some(response) = response {
                            self.send(MessageType::BluetoothGATTWriteResponse, response.encode());
                        }
                    }
                }
            }
            MessageType::BluetoothGATTWriteDescriptorRequest => {
                if self.state == ConnectionState::Authenticated {
                    if let Ok(request) = BluetoothGATTWriteDescriptorRequest::decode(payload) {
                        let response = self
                            .coordinator
                            .dispatcher()
                            .write_descriptor(request.address, request.handle, &request.data, request.response)
                            .await;
                        if let Some(response) = response {
                            self.send(MessageType::BluetoothGATTWriteResponse, response.encode());
                        }
                    }
                }
            }
            MessageType::BluetoothGATTNotifyRequest => {
                if self.state == ConnectionState::Authenticated {
                    if let Ok(request) = BluetoothGATTNotifyRequest::decode(payload) {
                        self.coordinator
                            .notify(request.address, request.handle, request.enable)
                            .await;
                    }
                }
            }
            other => {
                log::debug!("no handler for {other:?} from client {}", self.id.0);
            }
        }
        true
    }

    /// `Hello` is only valid in `Connecting`; arriving in any other
    /// state is a protocol error that closes the connection.
    fn handle_hello(&mut self, payload: &[u8]) -> bool {
        if self.state != ConnectionState::Connecting {
            log::warn!(
                "unexpected HelloRequest from client {} in state {:?}",
                self.id.0,
                self.state
            );
            return false;
        }
        let Ok(request) = HelloRequest::decode(payload) else {
            return false;
        };
        log::info!(
            "hello from client {}: '{}' API v{}.{}",
            self.id.0,
            request.client_info,
            request.api_major,
            request.api_minor
        );
        self.send(
            MessageType::HelloResponse,
            HelloResponse {
                api_major: 1,
                api_minor: 10,
                server_info: format!("esphome-bt-proxyd {}", env!("CARGO_PKG_VERSION")),
                name: self.device_info.name.clone(),
            }
            .encode(),
        );
        self.state = ConnectionState::Connected;
        true
    }

    /// `Connect` is ignored outside `Connected` (idempotent re-auth
    /// when already `Authenticated`, a protocol warning otherwise).
    fn handle_connect(&mut self, payload: &[u8]) -> bool {
        if self.state == ConnectionState::Authenticated {
            return true;
        }
        if self.state != ConnectionState::Connected {
            log::warn!(
                "unexpected ConnectRequest from client {} in state {:?}",
                self.id.0,
                self.state
            );
            return true;
        }
        let Ok(request) = ConnectRequest::decode(payload) else {
            return true;
        };
        let password_valid = match &self.password {
            None => true,
            Some(expected) => &request.password == expected,
        };
        self.send(
            MessageType::ConnectResponse,
            ConnectResponse {
                invalid_password: !password_valid,
            }
            .encode(),
        );
        if password_valid {
            self.state = ConnectionState::Authenticated;
            self.coordinator.mark_authenticated(self.id);
            true
        } else {
            log::warn!("client {} supplied an invalid password", self.id.0);
            false
        }
    }

    /// Honored in `Authenticated` always, and in `Connected` iff no
    /// password is configured, so clients that skip `Connect` when
    /// none is required still get a reply.
    fn handle_device_info(&mut self, _payload: &[u8]) {
        let allowed = match self.state {
            ConnectionState::Authenticated => true,
            ConnectionState::Connected => self.password.is_none(),
            ConnectionState::Connecting => false,
        };
        if !allowed {
            log::warn!("DeviceInfoRequest from unauthenticated client {}", self.id.0);
            return;
        }
        self.send(
            MessageType::DeviceInfoResponse,
            self.device_info.to_response().encode(),
        );
    }
}
