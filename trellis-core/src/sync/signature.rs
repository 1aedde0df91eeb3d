//! Snapshot fingerprint
//!
//! Truncated SHA-256 over the canonical field order. Two snapshots with
//! the same fields produce the same signature no matter how they were
//! built; signatures are compared, never merged.

use sha2::{Digest, Sha256};

use crate::schema::Snapshot;

/// Fingerprint length on the wire
pub const SIGNATURE_LEN: usize = 6;

/// Truncated digest of one schema snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Signature([u8; SIGNATURE_LEN]);

impl Signature {
    /// Compute the fingerprint of a snapshot
    ///
    /// Each field contributes its key, label, unit (NUL-terminated, so
    /// adjacent strings cannot alias) and type code. Field order is the
    /// snapshot's canonical key order.
    pub fn of(snapshot: &Snapshot) -> Self {
        let mut hasher = Sha256::new();
        for field in snapshot.fields() {
            hasher.update(field.key.as_bytes());
            hasher.update([0]);
            hasher.update(field.label.as_bytes());
            hasher.update([0]);
            hasher.update(field.unit.as_bytes());
            hasher.update([0, field.ty.code()]);
        }
        let digest = hasher.finalize();

        let mut bytes = [0u8; SIGNATURE_LEN];
        bytes.copy_from_slice(&digest[..SIGNATURE_LEN]);
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; SIGNATURE_LEN] {
        &self.0
    }

    /// Parse a fingerprint received on the wire
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        let bytes: [u8; SIGNATURE_LEN] = bytes.try_into().ok()?;
        Some(Self(bytes))
    }
}
