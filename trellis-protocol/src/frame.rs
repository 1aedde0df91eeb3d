//! Frame boundaries and the header descriptor
//!
//! Every frame is terminated by a fixed 7-byte sentinel and carries a
//! self-length-prefixed ASCII descriptor describing the typed fields
//! that follow. The descriptor lets a decoder find the payload boundary
//! and verify the field layout before touching a single field byte.
//!
//! Descriptor codes:
//! - `B` u8, `H` u16, `h` i16, `i` i32, `I` u32 (little-endian)
//! - `f` f32 (little-endian IEEE 754)
//! - `?` bool (one byte, zero/non-zero)
//! - `<digits>s` byte string of explicit length, e.g. `6s`

/// Fixed out-of-band frame terminator (`\0m]X]X]`)
pub const FRAME_SENTINEL: [u8; 7] = [0x00, b'm', b']', b'X', b']', b'X', b']'];

/// Maximum complete frame size, sentinel included
pub const MAX_FRAME_SIZE: usize = 1024;

/// Maximum descriptor length in bytes
pub const MAX_DESCRIPTOR_LEN: usize = 64;

/// Errors that can occur during frame encoding or decoding
///
/// Decoding fails closed: a malformed frame yields one of these, never
/// a panic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FrameError {
    /// Encoded frame or a payload value exceeds its capacity
    PayloadTooLarge,
    /// Frame does not end with the sentinel
    MissingSentinel,
    /// Encoded payload bytes would contain the sentinel sequence
    SentinelInPayload,
    /// Descriptor length prefix inconsistent or code unparseable
    BadDescriptor,
    /// Descriptor does not describe the remaining bytes
    DescriptorMismatch,
    /// Fewer fields than the mandatory routing header
    MissingHeader,
    /// A mandatory header field is not integer-typed
    NonIntegerHeader,
    /// A header field value does not fit its domain
    HeaderOutOfRange,
    /// Origin or destination is not a known address
    UnknownAddress,
}

/// Wire type of a single field, parsed from the descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireType {
    U8,
    U16,
    I16,
    I32,
    U32,
    F32,
    Bool,
    Bytes(usize),
}

impl WireType {
    /// Encoded size of one field of this type
    pub fn size(self) -> usize {
        match self {
            WireType::U8 | WireType::Bool => 1,
            WireType::U16 | WireType::I16 => 2,
            WireType::I32 | WireType::U32 | WireType::F32 => 4,
            WireType::Bytes(len) => len,
        }
    }

    /// The mandatory header fields must all be integer-typed
    pub fn is_integer(self) -> bool {
        matches!(
            self,
            WireType::U8 | WireType::U16 | WireType::I16 | WireType::I32 | WireType::U32
        )
    }
}

/// Iterator over the field types described by a descriptor
pub struct DescriptorIter<'a> {
    rest: &'a [u8],
}

impl<'a> DescriptorIter<'a> {
    pub fn new(descriptor: &'a [u8]) -> Self {
        Self { rest: descriptor }
    }
}

impl<'a> Iterator for DescriptorIter<'a> {
    type Item = Result<WireType, FrameError>;

    fn next(&mut self) -> Option<Self::Item> {
        let (&code, tail) = self.rest.split_first()?;
        self.rest = tail;

        let ty = match code {
            b'B' => WireType::U8,
            b'H' => WireType::U16,
            b'h' => WireType::I16,
            b'i' => WireType::I32,
            b'I' => WireType::U32,
            b'f' => WireType::F32,
            b'?' => WireType::Bool,
            b'0'..=b'9' => {
                // Decimal length followed by 's'
                let mut len = (code - b'0') as usize;
                loop {
                    match self.rest.split_first() {
                        Some((&b's', tail)) => {
                            self.rest = tail;
                            break;
                        }
                        Some((&digit @ b'0'..=b'9', tail)) => {
                            len = match len
                                .checked_mul(10)
                                .and_then(|l| l.checked_add((digit - b'0') as usize))
                            {
                                Some(l) if l <= MAX_FRAME_SIZE => l,
                                _ => return Some(Err(FrameError::BadDescriptor)),
                            };
                            self.rest = tail;
                        }
                        _ => return Some(Err(FrameError::BadDescriptor)),
                    }
                }
                WireType::Bytes(len)
            }
            _ => return Some(Err(FrameError::BadDescriptor)),
        };

        Some(Ok(ty))
    }
}

/// Split a complete frame into opcode byte, descriptor, and field body
///
/// Verifies the sentinel terminator and the descriptor length prefix;
/// does not interpret field types.
pub fn split_frame(bytes: &[u8]) -> Result<(u8, &[u8], &[u8]), FrameError> {
    if bytes.len() < FRAME_SENTINEL.len() || !bytes.ends_with(&FRAME_SENTINEL) {
        return Err(FrameError::MissingSentinel);
    }

    let inner = &bytes[..bytes.len() - FRAME_SENTINEL.len()];
    if inner.len() < 2 {
        return Err(FrameError::BadDescriptor);
    }

    let opcode = inner[0];
    let desc_len = inner[1] as usize;
    if inner.len() < 2 + desc_len {
        return Err(FrameError::BadDescriptor);
    }

    let descriptor = &inner[2..2 + desc_len];
    let body = &inner[2 + desc_len..];
    Ok((opcode, descriptor, body))
}

/// Check whether the sentinel sequence occurs anywhere in `bytes`
pub fn contains_sentinel(bytes: &[u8]) -> bool {
    bytes
        .windows(FRAME_SENTINEL.len())
        .any(|w| w == FRAME_SENTINEL)
}
