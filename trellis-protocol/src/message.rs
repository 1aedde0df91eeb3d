//! Addressed messages and their frame codec
//!
//! A [`Message`] is the unit of communication: five mandatory header
//! fields (opcode, origin, destination, correlation id, channel) plus
//! an ordered typed payload. Messages are ephemeral — built per send,
//! decoded per receive, never persisted.

use heapless::Vec;

use crate::address::{Channel, NodeAddress};
use crate::frame::{
    contains_sentinel, split_frame, DescriptorIter, FrameError, FRAME_SENTINEL,
    MAX_DESCRIPTOR_LEN, MAX_FRAME_SIZE,
};
use crate::opcode::Opcode;
use crate::value::Value;

/// Maximum payload values per message
pub const MAX_PAYLOAD_VALUES: usize = 24;

/// Descriptor codes for the mandatory header fields
/// (origin u8, destination u8, correlation u16, channel u8)
const HEADER_CODES: &[u8] = b"BBHB";

/// Number of mandatory fields after the opcode byte
const HEADER_FIELDS: usize = 4;

/// One addressed message
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Message {
    /// Semantic operation
    pub opcode: Opcode,
    /// Sending node
    pub origin: NodeAddress,
    /// Final destination (routers forward until it matches)
    pub destination: NodeAddress,
    /// Sender-chosen id matching replies to pending requests
    pub correlation_id: u16,
    /// Public broadcast or private node-pair visibility
    pub channel: Channel,
    /// Ordered typed payload, shape implied by the opcode
    pub payload: Vec<Value, MAX_PAYLOAD_VALUES>,
}

impl Message {
    /// Create a message with an empty payload
    pub fn new(
        opcode: Opcode,
        origin: NodeAddress,
        destination: NodeAddress,
        correlation_id: u16,
        channel: Channel,
    ) -> Self {
        Self {
            opcode,
            origin,
            destination,
            correlation_id,
            channel,
            payload: Vec::new(),
        }
    }

    /// Append a payload value
    pub fn push(&mut self, value: Value) -> Result<(), FrameError> {
        self.payload
            .push(value)
            .map_err(|_| FrameError::PayloadTooLarge)
    }

    /// Build a reply: origin and destination swapped, correlation id and
    /// channel preserved so the sender's pending entry clears
    pub fn reply(&self, opcode: Opcode) -> Self {
        Self::new(
            opcode,
            self.destination,
            self.origin,
            self.correlation_id,
            self.channel,
        )
    }

    /// Encode this message into a complete sentinel-terminated frame
    ///
    /// Deterministic and total over representable payloads, except that
    /// payloads whose encoded bytes would contain the sentinel sequence
    /// are rejected outright — the sentinel is unescaped on the wire, so
    /// letting one through would silently corrupt framing downstream.
    pub fn encode(&self) -> Result<Vec<u8, MAX_FRAME_SIZE>, FrameError> {
        let mut descriptor = Vec::<u8, MAX_DESCRIPTOR_LEN>::new();
        descriptor
            .extend_from_slice(HEADER_CODES)
            .map_err(|_| FrameError::PayloadTooLarge)?;
        for value in &self.payload {
            value.push_code(&mut descriptor)?;
        }

        let mut out = Vec::new();
        let overflow = |_| FrameError::PayloadTooLarge;
        out.push(self.opcode.to_byte()).map_err(overflow)?;
        out.push(descriptor.len() as u8).map_err(overflow)?;
        out.extend_from_slice(&descriptor)
            .map_err(|_| FrameError::PayloadTooLarge)?;

        out.push(self.origin.to_byte()).map_err(overflow)?;
        out.push(self.destination.to_byte()).map_err(overflow)?;
        out.extend_from_slice(&self.correlation_id.to_le_bytes())
            .map_err(|_| FrameError::PayloadTooLarge)?;
        out.push(self.channel.to_byte()).map_err(overflow)?;
        for value in &self.payload {
            value.encode_into(&mut out)?;
        }

        if contains_sentinel(&out) {
            return Err(FrameError::SentinelInPayload);
        }

        out.extend_from_slice(&FRAME_SENTINEL)
            .map_err(|_| FrameError::PayloadTooLarge)?;
        Ok(out)
    }

    /// Decode a complete frame back into a message
    ///
    /// Fails closed with a typed [`FrameError`] on any inconsistency:
    /// bad sentinel, descriptor that does not describe the body, missing
    /// or non-integer header fields, unknown addresses.
    pub fn decode(bytes: &[u8]) -> Result<Self, FrameError> {
        let (opcode_byte, descriptor, body) = split_frame(bytes)?;

        let mut fields = DescriptorIter::new(descriptor);
        let mut rest = body;

        let mut header = [0i64; HEADER_FIELDS];
        for slot in header.iter_mut() {
            let ty = fields.next().ok_or(FrameError::MissingHeader)??;
            if !ty.is_integer() {
                return Err(FrameError::NonIntegerHeader);
            }
            let (value, tail) = Value::decode(ty, rest)?;
            rest = tail;
            // Integer-typed by the check above
            *slot = value.as_int().ok_or(FrameError::NonIntegerHeader)?;
        }

        let origin = addr_field(header[0])?;
        let destination = addr_field(header[1])?;
        let correlation_id =
            u16::try_from(header[2]).map_err(|_| FrameError::HeaderOutOfRange)?;
        let channel = u8::try_from(header[3])
            .ok()
            .and_then(Channel::from_byte)
            .ok_or(FrameError::HeaderOutOfRange)?;

        let mut payload = Vec::new();
        for ty in fields {
            let (value, tail) = Value::decode(ty?, rest)?;
            rest = tail;
            payload
                .push(value)
                .map_err(|_| FrameError::PayloadTooLarge)?;
        }

        if !rest.is_empty() {
            return Err(FrameError::DescriptorMismatch);
        }

        Ok(Self {
            opcode: Opcode::from_byte(opcode_byte),
            origin,
            destination,
            correlation_id,
            channel,
            payload,
        })
    }
}

fn addr_field(raw: i64) -> Result<NodeAddress, FrameError> {
    u8::try_from(raw)
        .ok()
        .and_then(NodeAddress::from_byte)
        .ok_or(FrameError::UnknownAddress)
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    fn arb_address() -> impl Strategy<Value = NodeAddress> {
        prop_oneof![
            Just(NodeAddress::Public),
            Just(NodeAddress::Host),
            Just(NodeAddress::Display),
            Just(NodeAddress::Bridge),
        ]
    }

    fn arb_value() -> impl Strategy<Value = Value> {
        prop_oneof![
            any::<u8>().prop_map(Value::U8),
            any::<u16>().prop_map(Value::U16),
            any::<i16>().prop_map(Value::I16),
            any::<i32>().prop_map(Value::I32),
            any::<u32>().prop_map(Value::U32),
            proptest::num::f32::NORMAL.prop_map(Value::F32),
            any::<bool>().prop_map(Value::Bool),
            // Byte strings without NUL can never contain the sentinel
            proptest::collection::vec(1u8..=255, 0..24)
                .prop_map(|b| Value::bytes(&b).unwrap()),
        ]
    }

    proptest! {
        #[test]
        fn decode_inverts_encode(
            origin in arb_address(),
            destination in arb_address(),
            correlation_id in any::<u16>(),
            public in any::<bool>(),
            opcode_byte in any::<u8>(),
            values in proptest::collection::vec(arb_value(), 0..8),
        ) {
            let mut msg = Message::new(
                Opcode::from_byte(opcode_byte),
                origin,
                destination,
                correlation_id,
                if public { Channel::Public } else { Channel::Private },
            );
            for value in values {
                msg.push(value).unwrap();
            }

            let frame = msg.encode().unwrap();
            prop_assert_eq!(Message::decode(&frame).unwrap(), msg);
        }
    }
}
