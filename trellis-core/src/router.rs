//! Destination-based routing
//!
//! Each node holds a static route table mapping destination addresses to
//! one of its (at most two) transport links. Frames addressed to this
//! node are dispatched locally; frames for a reachable peer are
//! forwarded byte-for-byte; everything else is dropped. The mesh is a
//! line, so no route ever has more than one candidate link and loops
//! cannot form.

use heapless::Vec;

use trellis_protocol::NodeAddress;

/// Which of a node's transport links a route points at
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LinkId {
    Primary,
    Secondary,
}

/// What to do with one inbound frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RouteDecision {
    /// Addressed to this node; dispatch to the local handler
    Local,
    /// Addressed to a reachable peer; relay the raw frame unchanged
    Forward(LinkId),
    /// No route; discard
    Drop,
}

/// Static destination → link mapping for one node
#[derive(Debug)]
pub struct RouteTable {
    self_addr: NodeAddress,
    routes: Vec<(NodeAddress, LinkId), 4>,
}

impl RouteTable {
    /// Edge node: reaches the rest of the mesh through its one link
    pub fn host() -> Self {
        Self::line_end(NodeAddress::Host)
    }

    /// Middle node: primary link toward the host, secondary toward the
    /// bridge (and through it the public side)
    pub fn display() -> Self {
        let mut routes = Vec::new();
        let _ = routes.push((NodeAddress::Host, LinkId::Primary));
        let _ = routes.push((NodeAddress::Bridge, LinkId::Secondary));
        let _ = routes.push((NodeAddress::Public, LinkId::Secondary));
        Self {
            self_addr: NodeAddress::Display,
            routes,
        }
    }

    /// Gateway node: primary link toward the display (and through it
    /// the host), secondary onto the public bus
    pub fn bridge() -> Self {
        let mut routes = Vec::new();
        let _ = routes.push((NodeAddress::Display, LinkId::Primary));
        let _ = routes.push((NodeAddress::Host, LinkId::Primary));
        let _ = routes.push((NodeAddress::Public, LinkId::Secondary));
        Self {
            self_addr: NodeAddress::Bridge,
            routes,
        }
    }

    fn line_end(self_addr: NodeAddress) -> Self {
        let mut routes = Vec::new();
        for addr in [
            NodeAddress::Host,
            NodeAddress::Display,
            NodeAddress::Bridge,
            NodeAddress::Public,
        ] {
            if addr != self_addr {
                let _ = routes.push((addr, LinkId::Primary));
            }
        }
        Self { self_addr, routes }
    }

    pub fn self_addr(&self) -> NodeAddress {
        self.self_addr
    }

    /// Route one frame by its destination address
    pub fn decide(&self, destination: NodeAddress) -> RouteDecision {
        if destination == self.self_addr {
            return RouteDecision::Local;
        }
        for &(addr, link) in &self.routes {
            if addr == destination {
                return RouteDecision::Forward(link);
            }
        }
        RouteDecision::Drop
    }

    /// Link an outbound frame from this node should leave on, if any
    pub fn link_for(&self, destination: NodeAddress) -> Option<LinkId> {
        match self.decide(destination) {
            RouteDecision::Forward(link) => Some(link),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_own_address_is_local() {
        assert_eq!(
            RouteTable::display().decide(NodeAddress::Display),
            RouteDecision::Local
        );
        assert_eq!(
            RouteTable::host().decide(NodeAddress::Host),
            RouteDecision::Local
        );
    }

    #[test]
    fn test_host_reaches_everything_over_one_link() {
        let table = RouteTable::host();
        for addr in [
            NodeAddress::Display,
            NodeAddress::Bridge,
            NodeAddress::Public,
        ] {
            assert_eq!(
                table.decide(addr),
                RouteDecision::Forward(LinkId::Primary),
                "{:?}",
                addr
            );
        }
    }

    #[test]
    fn test_display_splits_traffic() {
        let table = RouteTable::display();
        assert_eq!(
            table.decide(NodeAddress::Host),
            RouteDecision::Forward(LinkId::Primary)
        );
        assert_eq!(
            table.decide(NodeAddress::Bridge),
            RouteDecision::Forward(LinkId::Secondary)
        );
        assert_eq!(
            table.decide(NodeAddress::Public),
            RouteDecision::Forward(LinkId::Secondary)
        );
    }

    #[test]
    fn test_bridge_gateways_to_public() {
        let table = RouteTable::bridge();
        assert_eq!(
            table.decide(NodeAddress::Host),
            RouteDecision::Forward(LinkId::Primary)
        );
        assert_eq!(
            table.decide(NodeAddress::Public),
            RouteDecision::Forward(LinkId::Secondary)
        );
    }

    #[test]
    fn test_link_for_outbound() {
        let table = RouteTable::display();
        assert_eq!(table.link_for(NodeAddress::Host), Some(LinkId::Primary));
        assert_eq!(table.link_for(NodeAddress::Display), None);
    }
}
