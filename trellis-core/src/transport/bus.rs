//! Publish/subscribe bus adapter
//!
//! Maps the message channel onto one of two logical topic pairs: the
//! public broadcast pair, or a private pair scoped to this node's
//! identity. Each inbound bus delivery carries at most one frame.

use core::fmt::Write as _;

use heapless::{String, Vec};

use trellis_protocol::{Channel, Message, MAX_FRAME_SIZE};

use super::{Inbound, ReadOutcome, Transport, TransportError};

/// Maximum topic length in bytes
pub const MAX_TOPIC_LEN: usize = 48;

/// Maximum node identity length in bytes (hex of a unique chip id)
pub const MAX_NODE_ID_LEN: usize = 16;

/// Node identity used to scope the private topic pair
pub type NodeId = String<MAX_NODE_ID_LEN>;

/// Topic for broadcast traffic leaving a node
pub const PUBLIC_OUT: &str = "public/out";
/// Topic for broadcast traffic arriving at a node
pub const PUBLIC_IN: &str = "public/in";

/// Private outbound topic for one node
pub fn node_out(id: &str) -> Option<String<MAX_TOPIC_LEN>> {
    let mut topic = String::new();
    write!(topic, "node/{}/out", id).ok()?;
    Some(topic)
}

/// Private inbound topic for one node
pub fn node_in(id: &str) -> Option<String<MAX_TOPIC_LEN>> {
    let mut topic = String::new();
    write!(topic, "node/{}/in", id).ok()?;
    Some(topic)
}

/// Swap a topic's direction (out ↔ in), preserving its scope
pub fn reverse_topic(topic: &str) -> Option<String<MAX_TOPIC_LEN>> {
    if topic == PUBLIC_OUT {
        let mut t = String::new();
        t.push_str(PUBLIC_IN).ok()?;
        return Some(t);
    }
    if topic == PUBLIC_IN {
        let mut t = String::new();
        t.push_str(PUBLIC_OUT).ok()?;
        return Some(t);
    }

    let mut parts = topic.split('/');
    match (parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some("node"), Some(id), Some("out"), None) => node_in(id),
        (Some("node"), Some(id), Some("in"), None) => node_out(id),
        _ => None,
    }
}

/// Extract the node identity a private topic is scoped to
pub fn topic_node_id(topic: &str) -> Option<&str> {
    let mut parts = topic.split('/');
    match (parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some("node"), Some(id), Some("out" | "in"), None) => Some(id),
        _ => None,
    }
}

/// Message-level access to the underlying bus client
///
/// Supplied by device glue (an MQTT client, an in-memory broker in
/// tests). The glue owns subscriptions: it subscribes to this node's
/// private inbound topic and to the public broadcast topic, and hands
/// whole deliveries up. Both operations must be non-blocking.
pub trait BusWire {
    type Error;

    /// Publish one frame on a topic, best effort
    fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<(), Self::Error>;

    /// Pop one queued delivery for this node, if any
    fn try_recv(&mut self) -> Result<Option<Vec<u8, MAX_FRAME_SIZE>>, Self::Error>;
}

/// Frame adapter over a publish/subscribe bus
pub struct BusTransport<W: BusWire> {
    wire: W,
    private_out: String<MAX_TOPIC_LEN>,
}

impl<W: BusWire> BusTransport<W> {
    /// Create an adapter scoped to this node's identity
    ///
    /// Returns None if the identity does not fit the topic budget.
    pub fn new(wire: W, node_id: &NodeId) -> Option<Self> {
        Some(Self {
            wire,
            private_out: node_out(node_id)?,
        })
    }
}

impl<W: BusWire> Transport for BusTransport<W> {
    fn send_raw(&mut self, raw: &[u8], channel: Channel) -> Result<(), TransportError> {
        let topic = match channel {
            Channel::Public => PUBLIC_OUT,
            Channel::Private => self.private_out.as_str(),
        };
        self.wire
            .publish(topic, raw)
            .map_err(|_| TransportError::Wire)
    }

    fn try_read(&mut self, _now_ms: u64) -> ReadOutcome {
        match self.wire.try_recv() {
            Ok(Some(raw)) => match Message::decode(&raw) {
                Ok(message) => ReadOutcome::Frame(Inbound { message, raw }),
                Err(err) => ReadOutcome::Corrupt(err),
            },
            Ok(None) => ReadOutcome::Pending,
            Err(_) => ReadOutcome::Fault(TransportError::Wire),
        }
    }

    fn is_ready(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::string::String as StdString;
    use std::vec::Vec as StdVec;

    use trellis_protocol::{NodeAddress, Opcode};

    #[derive(Default)]
    struct FakeBroker {
        published: StdVec<(StdString, StdVec<u8>)>,
        queued: VecDeque<Vec<u8, MAX_FRAME_SIZE>>,
        down: bool,
    }

    impl BusWire for FakeBroker {
        type Error = ();

        fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<(), ()> {
            if self.down {
                return Err(());
            }
            self.published.push((topic.into(), payload.to_vec()));
            Ok(())
        }

        fn try_recv(&mut self) -> Result<Option<Vec<u8, MAX_FRAME_SIZE>>, ()> {
            if self.down {
                return Err(());
            }
            Ok(self.queued.pop_front())
        }
    }

    fn bridge_id() -> NodeId {
        NodeId::try_from("a1b2c3d4").unwrap()
    }

    #[test]
    fn test_topic_pairs() {
        assert_eq!(node_out("a1b2").unwrap(), "node/a1b2/out");
        assert_eq!(node_in("a1b2").unwrap(), "node/a1b2/in");
    }

    #[test]
    fn test_reverse_topic() {
        assert_eq!(reverse_topic(PUBLIC_OUT).unwrap(), PUBLIC_IN);
        assert_eq!(reverse_topic(PUBLIC_IN).unwrap(), PUBLIC_OUT);
        assert_eq!(reverse_topic("node/a1b2/out").unwrap(), "node/a1b2/in");
        assert_eq!(reverse_topic("node/a1b2/in").unwrap(), "node/a1b2/out");
        assert!(reverse_topic("bogus/topic").is_none());
    }

    #[test]
    fn test_topic_node_id() {
        assert_eq!(topic_node_id("node/a1b2/out"), Some("a1b2"));
        assert_eq!(topic_node_id(PUBLIC_OUT), None);
    }

    #[test]
    fn test_channel_selects_topic() {
        let mut transport = BusTransport::new(FakeBroker::default(), &bridge_id()).unwrap();

        transport.send_raw(b"pub", Channel::Public).unwrap();
        transport.send_raw(b"priv", Channel::Private).unwrap();

        assert_eq!(transport.wire.published[0].0, PUBLIC_OUT);
        assert_eq!(transport.wire.published[1].0, "node/a1b2c3d4/out");
    }

    #[test]
    fn test_one_message_per_delivery() {
        let frame = Message::new(
            Opcode::Registered,
            NodeAddress::Public,
            NodeAddress::Bridge,
            3,
            Channel::Public,
        )
        .encode()
        .unwrap();

        let mut transport = BusTransport::new(FakeBroker::default(), &bridge_id()).unwrap();
        transport.wire.queued.push_back(frame);

        match transport.try_read(0) {
            ReadOutcome::Frame(inbound) => {
                assert_eq!(inbound.message.opcode, Opcode::Registered)
            }
            other => panic!("expected frame, got {:?}", other),
        }
        assert!(matches!(transport.try_read(0), ReadOutcome::Pending));
    }

    #[test]
    fn test_corrupt_delivery_discarded() {
        let mut transport = BusTransport::new(FakeBroker::default(), &bridge_id()).unwrap();
        transport
            .wire
            .queued
            .push_back(Vec::from_slice(b"not a frame").unwrap());
        assert!(matches!(transport.try_read(0), ReadOutcome::Corrupt(_)));
    }

    #[test]
    fn test_broker_down_is_fault() {
        let mut transport = BusTransport::new(
            FakeBroker {
                down: true,
                ..Default::default()
            },
            &bridge_id(),
        )
        .unwrap();
        assert!(matches!(
            transport.try_read(0),
            ReadOutcome::Fault(TransportError::Wire)
        ));
        assert!(matches!(
            transport.send_raw(b"x", Channel::Public),
            Err(TransportError::Wire)
        ));
    }
}
