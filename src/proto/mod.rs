//! The native API wire protocol: framing, varints, field encoding, and
//! the message catalogue built on top of them.

pub mod codec;
pub mod frame;
pub mod messages;
pub mod uuid;
pub mod varint;
pub mod wire;

pub use codec::WireCodec;
pub use frame::{encode_frame, FrameDecoder};
pub use messages::MessageType;
