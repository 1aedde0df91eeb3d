//! Transport adapters
//!
//! A transport adapter turns one unreliable byte carrier into a uniform
//! non-blocking frame interface: best-effort writes, at most one decoded
//! message per read call, and explicit fault reporting. Two variants
//! exist — a point-to-point byte [`stream`] and a publish/subscribe
//! [`bus`] — and the node composition treats them identically.

pub mod bus;
pub mod stream;

use heapless::Vec;

use trellis_protocol::{Channel, FrameError, Message, MAX_FRAME_SIZE};

/// Faults at the transport layer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TransportError {
    /// The underlying wire reported a read or write error
    Wire,
    /// Frame assembly exceeded the hard buffer cap; the adapter stays
    /// down until reopened around a fresh wire
    Overflow,
    /// Adapter is faulted or absent; writes are refused
    NotReady,
}

/// A decoded inbound frame together with its raw bytes
///
/// The raw bytes are kept so a router can forward the frame
/// byte-for-byte unchanged instead of re-encoding it.
#[derive(Debug, Clone)]
pub struct Inbound {
    pub message: Message,
    pub raw: Vec<u8, MAX_FRAME_SIZE>,
}

/// Result of one non-blocking read attempt
#[derive(Debug)]
pub enum ReadOutcome {
    /// One complete frame was assembled and decoded
    Frame(Inbound),
    /// No complete frame available yet
    Pending,
    /// A complete or stalled frame failed to decode; it was discarded
    /// and the adapter keeps running
    Corrupt(FrameError),
    /// The adapter itself failed; the link should be treated as lost
    Fault(TransportError),
}

/// Uniform non-blocking frame interface over one carrier
pub trait Transport {
    /// Best-effort write of one encoded frame; must never block on a
    /// slow or absent peer
    fn send_raw(&mut self, raw: &[u8], channel: Channel) -> Result<(), TransportError>;

    /// Poll for inbound data, returning at most one frame per call
    fn try_read(&mut self, now_ms: u64) -> ReadOutcome;

    /// False once the adapter has hit a fatal fault
    fn is_ready(&self) -> bool;
}

/// Placeholder transport for single-link nodes
///
/// Never ready, never produces frames, refuses writes.
#[derive(Debug, Default)]
pub struct NullTransport;

impl Transport for NullTransport {
    fn send_raw(&mut self, _raw: &[u8], _channel: Channel) -> Result<(), TransportError> {
        Err(TransportError::NotReady)
    }

    fn try_read(&mut self, _now_ms: u64) -> ReadOutcome {
        ReadOutcome::Pending
    }

    fn is_ready(&self) -> bool {
        false
    }
}
