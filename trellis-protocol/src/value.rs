//! Typed payload values
//!
//! A message payload is an ordered sequence of these values. Each value
//! knows its descriptor code and its little-endian field encoding; the
//! receiver recovers the same sequence from the descriptor alone.

use heapless::Vec;

use crate::frame::{FrameError, WireType};

/// Maximum length of a single byte-string value
pub const MAX_BYTES_LEN: usize = 768;

/// One typed payload value
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Value {
    U8(u8),
    U16(u16),
    I16(i16),
    I32(i32),
    U32(u32),
    F32(f32),
    Bool(bool),
    Bytes(Vec<u8, MAX_BYTES_LEN>),
}

impl Value {
    /// Build a byte-string value
    pub fn bytes(data: &[u8]) -> Result<Self, FrameError> {
        let mut vec = Vec::new();
        vec.extend_from_slice(data)
            .map_err(|_| FrameError::PayloadTooLarge)?;
        Ok(Value::Bytes(vec))
    }

    /// Auto encoding mode: pick the narrowest integer width from the
    /// runtime magnitude (small non-negative values stay one byte,
    /// anything else widens to i32)
    ///
    /// Convenience sends only; schema-bearing opcodes declare their
    /// field types explicitly so widths stay stable across calls.
    pub fn auto_int(v: i32) -> Self {
        if (0..=255).contains(&v) {
            Value::U8(v as u8)
        } else {
            Value::I32(v)
        }
    }

    /// Integer view of this value, if it is integer-typed
    pub fn as_int(&self) -> Option<i64> {
        match *self {
            Value::U8(v) => Some(v as i64),
            Value::U16(v) => Some(v as i64),
            Value::I16(v) => Some(v as i64),
            Value::I32(v) => Some(v as i64),
            Value::U32(v) => Some(v as i64),
            _ => None,
        }
    }

    /// Byte-string view of this value
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(b) => Some(b),
            _ => None,
        }
    }

    /// The wire type this value encodes as
    pub fn wire_type(&self) -> WireType {
        match self {
            Value::U8(_) => WireType::U8,
            Value::U16(_) => WireType::U16,
            Value::I16(_) => WireType::I16,
            Value::I32(_) => WireType::I32,
            Value::U32(_) => WireType::U32,
            Value::F32(_) => WireType::F32,
            Value::Bool(_) => WireType::Bool,
            Value::Bytes(b) => WireType::Bytes(b.len()),
        }
    }

    /// Append this value's descriptor code(s) to a descriptor buffer
    pub fn push_code<const N: usize>(&self, desc: &mut Vec<u8, N>) -> Result<(), FrameError> {
        let code = match self {
            Value::U8(_) => b'B',
            Value::U16(_) => b'H',
            Value::I16(_) => b'h',
            Value::I32(_) => b'i',
            Value::U32(_) => b'I',
            Value::F32(_) => b'f',
            Value::Bool(_) => b'?',
            Value::Bytes(b) => {
                let mut digits = [0u8; 4];
                let text = format_len(b.len(), &mut digits);
                desc.extend_from_slice(text)
                    .map_err(|_| FrameError::PayloadTooLarge)?;
                b's'
            }
        };
        desc.push(code).map_err(|_| FrameError::PayloadTooLarge)
    }

    /// Append this value's little-endian field encoding to a buffer
    pub fn encode_into<const N: usize>(&self, out: &mut Vec<u8, N>) -> Result<(), FrameError> {
        let overflow = |_| FrameError::PayloadTooLarge;

        match self {
            Value::U8(v) => out.extend_from_slice(&[*v]).map_err(overflow),
            Value::U16(v) => out.extend_from_slice(&v.to_le_bytes()).map_err(overflow),
            Value::I16(v) => out.extend_from_slice(&v.to_le_bytes()).map_err(overflow),
            Value::I32(v) => out.extend_from_slice(&v.to_le_bytes()).map_err(overflow),
            Value::U32(v) => out.extend_from_slice(&v.to_le_bytes()).map_err(overflow),
            Value::F32(v) => out.extend_from_slice(&v.to_le_bytes()).map_err(overflow),
            Value::Bool(v) => out.extend_from_slice(&[*v as u8]).map_err(overflow),
            Value::Bytes(b) => out.extend_from_slice(b).map_err(overflow),
        }
    }

    /// Decode one value of the given wire type from the front of `body`
    ///
    /// Returns the value and the remaining bytes. The caller has already
    /// validated that `body` is long enough via the descriptor sizes.
    pub fn decode(ty: WireType, body: &[u8]) -> Result<(Self, &[u8]), FrameError> {
        let size = ty.size();
        if body.len() < size {
            return Err(FrameError::DescriptorMismatch);
        }
        let (field, rest) = body.split_at(size);

        let value = match ty {
            WireType::U8 => Value::U8(field[0]),
            WireType::U16 => Value::U16(u16::from_le_bytes([field[0], field[1]])),
            WireType::I16 => Value::I16(i16::from_le_bytes([field[0], field[1]])),
            WireType::I32 => {
                Value::I32(i32::from_le_bytes([field[0], field[1], field[2], field[3]]))
            }
            WireType::U32 => {
                Value::U32(u32::from_le_bytes([field[0], field[1], field[2], field[3]]))
            }
            WireType::F32 => {
                Value::F32(f32::from_le_bytes([field[0], field[1], field[2], field[3]]))
            }
            WireType::Bool => Value::Bool(field[0] != 0),
            WireType::Bytes(_) => Value::bytes(field)?,
        };

        Ok((value, rest))
    }
}

impl From<u8> for Value {
    fn from(v: u8) -> Self {
        Value::U8(v)
    }
}

impl From<u16> for Value {
    fn from(v: u16) -> Self {
        Value::U16(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::I32(v)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::F32(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

/// Format a byte-string length as decimal ASCII
fn format_len(mut len: usize, buf: &mut [u8; 4]) -> &[u8] {
    if len == 0 {
        buf[0] = b'0';
        return &buf[..1];
    }

    let mut i = buf.len();
    while len > 0 && i > 0 {
        i -= 1;
        buf[i] = b'0' + (len % 10) as u8;
        len /= 10;
    }
    &buf[i..]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auto_int_widths() {
        assert_eq!(Value::auto_int(0), Value::U8(0));
        assert_eq!(Value::auto_int(255), Value::U8(255));
        assert_eq!(Value::auto_int(256), Value::I32(256));
        assert_eq!(Value::auto_int(-1), Value::I32(-1));
    }

    #[test]
    fn test_scalar_roundtrip() {
        let values = [
            Value::U8(7),
            Value::U16(0xBEEF),
            Value::I16(-1234),
            Value::I32(-70_000),
            Value::U32(3_000_000_000),
            Value::F32(36.6),
            Value::Bool(true),
            Value::Bool(false),
        ];

        for value in values {
            let mut desc = Vec::<u8, 8>::new();
            let mut body = Vec::<u8, 8>::new();
            value.push_code(&mut desc).unwrap();
            value.encode_into(&mut body).unwrap();

            let ty = crate::frame::DescriptorIter::new(&desc)
                .next()
                .unwrap()
                .unwrap();
            let (decoded, rest) = Value::decode(ty, &body).unwrap();
            assert_eq!(decoded, value);
            assert!(rest.is_empty());
        }
    }

    #[test]
    fn test_bytes_roundtrip() {
        let value = Value::bytes(b"snapshot").unwrap();

        let mut desc = Vec::<u8, 8>::new();
        let mut body = Vec::<u8, 16>::new();
        value.push_code(&mut desc).unwrap();
        value.encode_into(&mut body).unwrap();

        assert_eq!(&desc[..], b"8s");
        let ty = crate::frame::DescriptorIter::new(&desc)
            .next()
            .unwrap()
            .unwrap();
        let (decoded, _) = Value::decode(ty, &body).unwrap();
        assert_eq!(decoded.as_bytes(), Some(&b"snapshot"[..]));
    }

    #[test]
    fn test_truncated_body() {
        assert_eq!(
            Value::decode(WireType::U32, &[1, 2]),
            Err(FrameError::DescriptorMismatch)
        );
    }

    #[test]
    fn test_format_len() {
        let mut buf = [0u8; 4];
        assert_eq!(format_len(0, &mut buf), b"0");
        let mut buf = [0u8; 4];
        assert_eq!(format_len(6, &mut buf), b"6");
        let mut buf = [0u8; 4];
        assert_eq!(format_len(768, &mut buf), b"768");
    }

    #[test]
    fn test_as_int() {
        assert_eq!(Value::U8(9).as_int(), Some(9));
        assert_eq!(Value::I32(-2).as_int(), Some(-2));
        assert_eq!(Value::F32(1.0).as_int(), None);
        assert_eq!(Value::Bool(true).as_int(), None);
    }
}
