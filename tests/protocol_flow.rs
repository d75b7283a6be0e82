//! End-to-end scenarios driven over a real TCP socket, each one
//! grounded on a literal scenario from the protocol's conformance
//! suite rather than a unit-level shortcut.
//!
//! Request messages are only ever *decoded* by the production code (a
//! real ESPHome client encodes them), so this harness builds request
//! bytes directly from the same field-encoding helpers the response
//! types use, rather than inventing encoders the crate itself has no
//! use for.

use std::sync::Arc;
use std::time::Duration;

use esphome_bt_proxyd::ble::coordinator::{ClientId, Coordinator};
use esphome_bt_proxyd::ble::mock::MockBackend;
use esphome_bt_proxyd::device_info::DeviceInfoProvider;
use esphome_bt_proxyd::proto::wire::{encode_string_field, encode_varint_field, FieldCursor, WIRE_LEN, WIRE_VARINT};
use esphome_bt_proxyd::proto::WireCodec;
use esphome_bt_proxyd::server::client::handle_connection;
use futures::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::codec::Framed;

fn hello_request_bytes(client_info: &str, api_major: u64, api_minor: u64) -> Vec<u8> {
    let mut out = Vec::new();
    encode_string_field(1, client_info, &mut out);
    encode_varint_field(2, api_major, &mut out);
    encode_varint_field(3, api_minor, &mut out);
    out
}

fn connect_request_bytes(password: &str) -> Vec<u8> {
    let mut out = Vec::new();
    encode_string_field(1, password, &mut out);
    out
}

/// The crate's response types only ever need `encode` in production (a
/// real ESPHome client is the one decoding them), so this harness walks
/// their field tables by hand with the same cursor production code uses.
struct HelloResponseFields {
    api_major: u64,
    api_minor: u64,
    name: String,
}

fn decode_hello_response(payload: &[u8]) -> HelloResponseFields {
    let mut fields = HelloResponseFields { api_major: 0, api_minor: 0, name: String::new() };
    let mut cursor = FieldCursor::new(payload);
    while let Some(key) = cursor.next_key().unwrap() {
        match (key.field_number, key.wire_type) {
            (1, WIRE_VARINT) => fields.api_major = cursor.read_varint().unwrap(),
            (2, WIRE_VARINT) => fields.api_minor = cursor.read_varint().unwrap(),
            (4, WIRE_LEN) => fields.name = cursor.read_string().unwrap(),
            (_, wire_type) => cursor.skip(wire_type).unwrap(),
        }
    }
    fields
}

fn decode_connect_response_invalid_password(payload: &[u8]) -> bool {
    let mut invalid = false;
    let mut cursor = FieldCursor::new(payload);
    while let Some(key) = cursor.next_key().unwrap() {
        match (key.field_number, key.wire_type) {
            (1, WIRE_VARINT) => invalid = cursor.read_bool().unwrap(),
            (_, wire_type) => cursor.skip(wire_type).unwrap(),
        }
    }
    invalid
}

fn decode_device_info_feature_flags(payload: &[u8]) -> u64 {
    let mut flags = 0;
    let mut cursor = FieldCursor::new(payload);
    while let Some(key) = cursor.next_key().unwrap() {
        match (key.field_number, key.wire_type) {
            (15, WIRE_VARINT) => flags = cursor.read_varint().unwrap(),
            (_, wire_type) => cursor.skip(wire_type).unwrap(),
        }
    }
    flags
}

async fn spawn_server(
    password: Option<String>,
    active_connections: bool,
) -> (std::net::SocketAddr, Arc<Coordinator>) {
    let backend = Arc::new(MockBackend::new());
    let coordinator = Arc::new(Coordinator::new(backend, 3, true));
    let provider = DeviceInfoProvider::new("proxy", "Proxy", password.is_some(), active_connections);
    let device_info = Arc::new(provider.build("AA:BB:CC:DD:EE:FF".to_string(), "AA:BB:CC:DD:EE:FF".to_string()));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let coordinator_for_task = coordinator.clone();
    tokio::spawn(async move {
        let mut next_id = 1u64;
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                return;
            };
            let id = ClientId(next_id);
            next_id += 1;
            tokio::spawn(handle_connection(
                stream,
                id,
                coordinator_for_task.clone(),
                device_info.clone(),
                password.clone(),
            ));
        }
    });

    (addr, coordinator)
}

async fn connect(addr: std::net::SocketAddr) -> Framed<TcpStream, WireCodec> {
    let stream = TcpStream::connect(addr).await.unwrap();
    Framed::new(stream, WireCodec)
}

async fn say_hello(client: &mut Framed<TcpStream, WireCodec>) -> HelloResponseFields {
    client.send((1, hello_request_bytes("test-client", 1, 9))).await.unwrap();
    let (ty, payload) = client.next().await.unwrap().unwrap();
    assert_eq!(ty, 2, "expected HelloResponse's wire type");
    decode_hello_response(&payload)
}

#[tokio::test]
async fn hello_only_handshake_matches_literal_bytes() {
    // marker, payload length 5, type 1 (HelloRequest), field 1 length-3 string "foo"
    let literal = vec![0x00, 0x05, 0x01, 0x0A, 0x03, b'f', b'o', b'o'];
    assert_eq!(literal, esphome_bt_proxyd::proto::encode_frame(1, &hello_request_bytes("foo", 0, 0)));

    let (addr, _coordinator) = spawn_server(None, false).await;
    let mut client = connect(addr).await;
    client.send((1, hello_request_bytes("foo", 0, 0))).await.unwrap();

    let (ty, payload) = client.next().await.unwrap().unwrap();
    assert_eq!(ty, 2);
    let response = decode_hello_response(&payload);
    assert_eq!(response.api_major, 1);
    assert_eq!(response.api_minor, 10);
    assert_eq!(response.name, "proxy");
}

#[tokio::test]
async fn device_info_without_connect_reports_feature_flags_for_passive_mode() {
    let (addr, _coordinator) = spawn_server(None, false).await;
    let mut client = connect(addr).await;
    say_hello(&mut client).await;

    client.send((9, Vec::new())).await.unwrap();
    let (ty, payload) = client.next().await.unwrap().unwrap();
    assert_eq!(ty, 10);
    assert_eq!(decode_device_info_feature_flags(&payload), 97);
}

#[tokio::test]
async fn device_info_with_active_connections_reports_127() {
    let (addr, _coordinator) = spawn_server(None, true).await;
    let mut client = connect(addr).await;
    say_hello(&mut client).await;

    client.send((9, Vec::new())).await.unwrap();
    let (_ty, payload) = client.next().await.unwrap().unwrap();
    assert_eq!(decode_device_info_feature_flags(&payload), 127);
}

#[tokio::test]
async fn bad_password_closes_the_connection() {
    let (addr, _coordinator) = spawn_server(Some("secret".to_string()), false).await;
    let mut client = connect(addr).await;
    say_hello(&mut client).await;

    client.send((3, connect_request_bytes("nope"))).await.unwrap();
    let (ty, payload) = client.next().await.unwrap().unwrap();
    assert_eq!(ty, 4);
    assert!(decode_connect_response_invalid_password(&payload));

    // server closes after a failed auth; the stream yields EOF next
    let closed = tokio::time::timeout(Duration::from_secs(2), client.next()).await.unwrap();
    assert!(closed.is_none());
}

#[tokio::test]
async fn hello_outside_connecting_closes_the_connection() {
    let (addr, _coordinator) = spawn_server(None, false).await;
    let mut client = connect(addr).await;
    say_hello(&mut client).await;

    // A second Hello is invalid outside Connecting and must close the connection.
    client.send((1, hello_request_bytes("again", 1, 9))).await.unwrap();
    let closed = tokio::time::timeout(Duration::from_secs(2), client.next()).await.unwrap();
    assert!(closed.is_none());
}

#[tokio::test]
async fn connect_request_reaches_authenticated_and_unlocks_ping() {
    let (addr, _coordinator) = spawn_server(None, false).await;
    let mut client = connect(addr).await;
    say_hello(&mut client).await;

    client.send((3, connect_request_bytes(""))).await.unwrap();
    let (ty, payload) = client.next().await.unwrap().unwrap();
    assert_eq!(ty, 4);
    assert!(!decode_connect_response_invalid_password(&payload));

    client.send((7, Vec::new())).await.unwrap();
    let (ty, _payload) = client.next().await.unwrap().unwrap();
    assert_eq!(ty, 8, "expected PingResponse now that the client is authenticated");
}

#[tokio::test]
async fn coordinator_shutdown_notifies_authenticated_clients() {
    let (addr, coordinator) = spawn_server(None, false).await;
    let mut client = connect(addr).await;
    say_hello(&mut client).await;
    client.send((3, connect_request_bytes(""))).await.unwrap();
    let (ty, _payload) = client.next().await.unwrap().unwrap();
    assert_eq!(ty, 4);

    coordinator.shutdown().await;

    let (ty, _payload) = client.next().await.unwrap().unwrap();
    assert_eq!(ty, 5, "expected a DisconnectRequest pushed by the shutdown");
}
