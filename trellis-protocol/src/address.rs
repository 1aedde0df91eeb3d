//! Node addresses and channel visibility
//!
//! The mesh topology is a fixed tree known at build time:
//! host ↔ display ↔ bridge ↔ public bus. There is no runtime discovery;
//! every node carries the same closed address set.

/// Logical endpoints in the mesh
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum NodeAddress {
    /// Placeholder for broadcast traffic on the bus
    Public,
    /// Host machine (sensor source)
    Host,
    /// Local display controller
    Display,
    /// Wireless bridge
    Bridge,
}

// Wire format values
const ADDR_PUBLIC: u8 = 0x00;
const ADDR_HOST: u8 = 0x01;
const ADDR_DISPLAY: u8 = 0x02;
const ADDR_BRIDGE: u8 = 0x03;

impl NodeAddress {
    /// Parse an address from its wire format byte
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            ADDR_PUBLIC => Some(NodeAddress::Public),
            ADDR_HOST => Some(NodeAddress::Host),
            ADDR_DISPLAY => Some(NodeAddress::Display),
            ADDR_BRIDGE => Some(NodeAddress::Bridge),
            _ => None,
        }
    }

    /// Convert to wire format byte
    pub fn to_byte(self) -> u8 {
        match self {
            NodeAddress::Public => ADDR_PUBLIC,
            NodeAddress::Host => ADDR_HOST,
            NodeAddress::Display => ADDR_DISPLAY,
            NodeAddress::Bridge => ADDR_BRIDGE,
        }
    }
}

/// Visibility qualifier for a message
///
/// Private traffic stays on a node-pair topic (or the stream, where the
/// distinction is moot); public traffic goes out on the broadcast pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Channel {
    /// Point-to-point exchange between two nodes
    Private,
    /// Broadcast visible to every bus subscriber
    Public,
}

const CHANNEL_PRIVATE: u8 = 0x00;
const CHANNEL_PUBLIC: u8 = 0x01;

impl Channel {
    /// Parse a channel from its wire format byte
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            CHANNEL_PRIVATE => Some(Channel::Private),
            CHANNEL_PUBLIC => Some(Channel::Public),
            _ => None,
        }
    }

    /// Convert to wire format byte
    pub fn to_byte(self) -> u8 {
        match self {
            Channel::Private => CHANNEL_PRIVATE,
            Channel::Public => CHANNEL_PUBLIC,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_roundtrip() {
        let addrs = [
            NodeAddress::Public,
            NodeAddress::Host,
            NodeAddress::Display,
            NodeAddress::Bridge,
        ];

        for addr in addrs {
            assert_eq!(NodeAddress::from_byte(addr.to_byte()), Some(addr));
        }
    }

    #[test]
    fn test_unknown_address() {
        assert!(NodeAddress::from_byte(0x7F).is_none());
        assert!(NodeAddress::from_byte(0xFF).is_none());
    }

    #[test]
    fn test_channel_roundtrip() {
        assert_eq!(Channel::from_byte(Channel::Private.to_byte()), Some(Channel::Private));
        assert_eq!(Channel::from_byte(Channel::Public.to_byte()), Some(Channel::Public));
        assert!(Channel::from_byte(0x02).is_none());
    }
}
