//! Schema synchronization
//!
//! Peers exchange a short fingerprint of their schema snapshot instead
//! of the snapshot itself; full snapshot bytes cross the wire only on
//! mismatch. Each transport link carries its own little state machine
//! tracking whether the peer on the far end is known to hold the same
//! snapshot.

pub mod link;
pub mod signature;

pub use link::{LinkState, LinkStatus, SyncEvent, SyncLink, SyncRole};
pub use signature::{Signature, SIGNATURE_LEN};
