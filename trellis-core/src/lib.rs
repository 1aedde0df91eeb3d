//! Node-agnostic messaging core for the Trellis mesh
//!
//! This crate contains everything a mesh node needs above the wire
//! codec and below the device-specific glue:
//!
//! - Transport adapters (point-to-point stream, publish/subscribe bus)
//! - Reliable delivery tracker (bounded retries for important sends)
//! - Per-node router over the static mesh topology
//! - Schema snapshot types and the connectivity fingerprint
//! - Synchronization protocol (handshake, heartbeat, schema gating)
//! - The node composition and its cooperative tick loop
//!
//! The core is sans-io: adapters are fed bytes and timestamps by the
//! owning node's loop, and nothing in here blocks, allocates, or spawns.

#![no_std]
#![deny(unsafe_code)]

// Host-side test tooling (proptest, mock transports) needs std
#[cfg(test)]
extern crate std;

#[macro_use]
mod fmt;

pub mod node;
pub mod router;
pub mod schema;
pub mod sync;
pub mod tracker;
pub mod transport;
