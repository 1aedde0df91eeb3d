//! Shared reading-schema snapshot
//!
//! The host owns the authoritative description of what it measures:
//! an ordered set of field specs (key, display label, unit, wire
//! type). Peers hold replicas and use the shared field order to unpack
//! positional readings. Snapshots travel as postcard bytes inside
//! `SchemaData` frames.
//!
//! Fields are kept sorted by key at all times, so any two replicas
//! with the same contents serialize identically regardless of
//! insertion order. The synchronization fingerprint depends on this.

use heapless::{String, Vec};
use serde::{Deserialize, Serialize};

use trellis_protocol::WireType;

/// Maximum fields per snapshot
pub const MAX_FIELDS: usize = 24;

/// Maximum field key length
pub const MAX_KEY_LEN: usize = 16;

/// Maximum display label length
pub const MAX_LABEL_LEN: usize = 32;

/// Maximum unit suffix length
pub const MAX_UNIT_LEN: usize = 8;

/// Serialized snapshot budget, sized to fit a frame's byte-string value
pub const MAX_SNAPSHOT_BYTES: usize = 768;

/// Errors from snapshot mutation and serialization
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SchemaError {
    /// Snapshot is at field capacity
    Full,
    /// Snapshot does not fit the serialization buffer
    Serialize,
    /// Inbound bytes are not a valid snapshot
    Deserialize,
}

/// Wire representation of one reading field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FieldType {
    U8,
    U16,
    I16,
    #[default]
    I32,
    U32,
    F32,
    Bool,
}

impl FieldType {
    /// Descriptor code this field encodes as
    pub fn code(self) -> u8 {
        match self {
            FieldType::U8 => b'B',
            FieldType::U16 => b'H',
            FieldType::I16 => b'h',
            FieldType::I32 => b'i',
            FieldType::U32 => b'I',
            FieldType::F32 => b'f',
            FieldType::Bool => b'?',
        }
    }

    pub fn wire_type(self) -> WireType {
        match self {
            FieldType::U8 => WireType::U8,
            FieldType::U16 => WireType::U16,
            FieldType::I16 => WireType::I16,
            FieldType::I32 => WireType::I32,
            FieldType::U32 => WireType::U32,
            FieldType::F32 => WireType::F32,
            FieldType::Bool => WireType::Bool,
        }
    }
}

/// One reading field: stable key plus presentation metadata
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct FieldSpec {
    /// Stable identifier, unique within a snapshot
    pub key: String<MAX_KEY_LEN>,
    /// Human-readable label for display nodes
    pub label: String<MAX_LABEL_LEN>,
    /// Unit suffix ("°C", "%", ...)
    pub unit: String<MAX_UNIT_LEN>,
    pub ty: FieldType,
}

/// Key-sorted set of field specs
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Snapshot {
    fields: Vec<FieldSpec, MAX_FIELDS>,
}

impl Snapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a field, keeping key order; an existing key is replaced
    pub fn insert(&mut self, spec: FieldSpec) -> Result<(), SchemaError> {
        match self.fields.binary_search_by(|f| f.key.cmp(&spec.key)) {
            Ok(pos) => {
                self.fields[pos] = spec;
                Ok(())
            }
            Err(pos) => self
                .fields
                .insert(pos, spec)
                .map_err(|_| SchemaError::Full),
        }
    }

    pub fn get(&self, key: &str) -> Option<&FieldSpec> {
        self.fields
            .binary_search_by(|f| f.key.as_str().cmp(key))
            .ok()
            .map(|pos| &self.fields[pos])
    }

    /// Fields in canonical (key) order; readings follow this order
    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Serialize into a caller-provided buffer
    pub fn to_postcard<'a>(&self, buffer: &'a mut [u8]) -> Result<&'a [u8], SchemaError> {
        postcard::to_slice(self, buffer)
            .map(|written| &*written)
            .map_err(|_| SchemaError::Serialize)
    }

    pub fn from_postcard(bytes: &[u8]) -> Result<Self, SchemaError> {
        postcard::from_bytes(bytes).map_err(|_| SchemaError::Deserialize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(key: &str, ty: FieldType) -> FieldSpec {
        FieldSpec {
            key: String::try_from(key).unwrap(),
            label: String::try_from(key).unwrap(),
            unit: String::try_from("u").unwrap(),
            ty,
        }
    }

    #[test]
    fn test_insert_keeps_key_order() {
        let mut snapshot = Snapshot::new();
        snapshot.insert(spec("temp", FieldType::F32)).unwrap();
        snapshot.insert(spec("cpu", FieldType::U8)).unwrap();
        snapshot.insert(spec("rssi", FieldType::I16)).unwrap();

        let keys: std::vec::Vec<&str> =
            snapshot.fields().iter().map(|f| f.key.as_str()).collect();
        assert_eq!(keys, ["cpu", "rssi", "temp"]);
    }

    #[test]
    fn test_insertion_order_does_not_matter() {
        let mut a = Snapshot::new();
        a.insert(spec("temp", FieldType::F32)).unwrap();
        a.insert(spec("cpu", FieldType::U8)).unwrap();

        let mut b = Snapshot::new();
        b.insert(spec("cpu", FieldType::U8)).unwrap();
        b.insert(spec("temp", FieldType::F32)).unwrap();

        assert_eq!(a, b);
    }

    #[test]
    fn test_duplicate_key_replaces() {
        let mut snapshot = Snapshot::new();
        snapshot.insert(spec("temp", FieldType::I32)).unwrap();
        snapshot.insert(spec("temp", FieldType::F32)).unwrap();

        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot.get("temp").unwrap().ty, FieldType::F32);
    }

    #[test]
    fn test_capacity_enforced() {
        let mut snapshot = Snapshot::new();
        for i in 0..MAX_FIELDS {
            let key = std::format!("field{:02}", i);
            snapshot.insert(spec(&key, FieldType::U8)).unwrap();
        }
        assert_eq!(
            snapshot.insert(spec("overflow", FieldType::U8)),
            Err(SchemaError::Full)
        );
    }

    #[test]
    fn test_postcard_roundtrip() {
        let mut snapshot = Snapshot::new();
        snapshot.insert(spec("temp", FieldType::F32)).unwrap();
        snapshot.insert(spec("fan", FieldType::Bool)).unwrap();

        let mut buffer = [0u8; MAX_SNAPSHOT_BYTES];
        let bytes = snapshot.to_postcard(&mut buffer).unwrap();
        let restored = Snapshot::from_postcard(bytes).unwrap();
        assert_eq!(restored, snapshot);
    }

    #[test]
    fn test_bad_bytes_rejected() {
        assert_eq!(
            Snapshot::from_postcard(&[0xFF; 4]),
            Err(SchemaError::Deserialize)
        );
    }
}
