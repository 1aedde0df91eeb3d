//! Trellis mesh wire protocol
//!
//! This crate defines the self-framing binary codec shared by every node
//! in the mesh (host, display controller, wireless bridge). The same
//! frame layout travels over both transports: the point-to-point byte
//! stream and the publish/subscribe bus.
//!
//! # Frame layout
//!
//! ```text
//! ┌────────┬──────────┬────────────┬─────────────┬──────────┐
//! │ OPCODE │ DESC LEN │ DESCRIPTOR │ FIELDS      │ SENTINEL │
//! │ 1B     │ 1B       │ 0–64B      │ per desc.   │ 7B       │
//! └────────┴──────────┴────────────┴─────────────┴──────────┘
//! ```
//!
//! The descriptor is an ASCII type string, one code per field, prefixed
//! by its own byte length so a decoder can locate the payload boundary
//! before interpreting field types. The first four fields are always the
//! integer-typed routing header: origin, destination, correlation id,
//! channel. A fixed 7-byte sentinel terminates every frame; a receiver
//! that loses framing resynchronizes on the next sentinel.

#![no_std]
#![deny(unsafe_code)]

// Host-side test tooling (proptest) needs std
#[cfg(test)]
extern crate std;

pub mod address;
pub mod frame;
pub mod message;
pub mod opcode;
pub mod value;

pub use address::{Channel, NodeAddress};
pub use frame::{FrameError, WireType, FRAME_SENTINEL, MAX_DESCRIPTOR_LEN, MAX_FRAME_SIZE};
pub use message::{Message, MAX_PAYLOAD_VALUES};
pub use opcode::Opcode;
pub use value::{Value, MAX_BYTES_LEN};
