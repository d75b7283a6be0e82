//! Crate-wide error type.
//!
//! Mirrors the error taxonomy of the protocol this daemon implements:
//! transport failures close a single client, malformed frames and
//! protocol violations close a single client with a log at `error`,
//! and backend failures are either surfaced to the requesting client
//! (as a response `error` field) or, for adapter discovery, fatal to
//! the whole process.

use thiserror::Error;

/// The crate's error type.
#[derive(Debug, Error)]
pub enum Error {
    /// Socket read/write failure or peer closure.
    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),

    /// The wire format was violated (bad marker, oversized varint,
    /// truncated length-prefixed value).
    #[error("malformed frame: {0}")]
    MalformedFrame(String),

    /// A request arrived in a state that does not permit it.
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    /// The BLE hardware MAC could not be discovered by any method.
    #[error("BLE backend unavailable: {0}")]
    BackendUnavailable(String),

    /// A BLE backend call (connect, read, write, notify, discovery)
    /// failed. Surfaced to the requesting client, never fatal.
    #[error("BLE backend error: {0}")]
    BackendTransient(String),

    /// The connection pool has no free slot for a new device.
    #[error("no free BLE connection slot")]
    SlotExhaustion,
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;
