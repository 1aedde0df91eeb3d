//! Per-link synchronization state machine
//!
//! The peer's schema knowledge is a function of the current state and
//! an event. The node drives this from its tick loop and from inbound
//! handshake frames; the state machine itself owns no I/O.

/// Peer-synchronization states for one link
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LinkState {
    /// Peer unknown or unreachable; no data requests allowed
    #[default]
    Disconnected,
    /// Fingerprint sent, waiting for confirmation or a snapshot
    Handshaking,
    /// Peer confirmed to hold the same snapshot
    Synchronized,
}

/// Events that drive the link state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SyncEvent {
    /// A fingerprint probe went out (or a mismatch forced a re-probe)
    HandshakeStarted,
    /// Peer confirmed matching fingerprints
    PeerConfirmed,
    /// Peer's snapshot was applied locally; fingerprints now match
    SnapshotApplied,
    /// Heartbeat retries exhausted
    HeartbeatLost,
    /// The transport under this link faulted
    TransportFault,
}

/// Status changes worth reporting to the collaborator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LinkStatus {
    /// Link reached `Synchronized`
    Connected,
    /// Link fell back to `Disconnected`
    Lost,
    /// A synchronized link went back into handshake
    Resyncing,
}

/// Which side of the handshake this link plays
///
/// Only the client initiates probes and heartbeats; the server answers.
/// On a point-to-point stream the node closer to the host is the
/// server, so exactly one side paces the traffic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SyncRole {
    Client,
    Server,
}

impl LinkState {
    /// Data requests are only allowed against a synchronized peer
    pub fn data_allowed(&self) -> bool {
        matches!(self, LinkState::Synchronized)
    }

    /// Process an event and return the next state
    pub fn transition(self, event: SyncEvent) -> Self {
        use LinkState::*;
        use SyncEvent::*;

        match (self, event) {
            (_, HeartbeatLost) => Disconnected,
            (_, TransportFault) => Disconnected,

            (_, HandshakeStarted) => Handshaking,

            // A confirmation or applied snapshot means fingerprints
            // match, whatever we believed before
            (_, PeerConfirmed) => Synchronized,
            (_, SnapshotApplied) => Synchronized,
        }
    }
}

/// State machine plus heartbeat bookkeeping for one link
#[derive(Debug, Default)]
pub struct SyncLink {
    state: LinkState,
    /// Correlation id of the heartbeat in flight, if any
    ping_pending: Option<u16>,
}

impl SyncLink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> LinkState {
        self.state
    }

    pub fn ping_pending(&self) -> Option<u16> {
        self.ping_pending
    }

    pub fn ping_sent(&mut self, correlation_id: u16) {
        self.ping_pending = Some(correlation_id);
    }

    pub fn pong_received(&mut self, correlation_id: u16) {
        if self.ping_pending == Some(correlation_id) {
            self.ping_pending = None;
        }
    }

    /// Apply an event; returns a status change to report, if any
    pub fn apply(&mut self, event: SyncEvent) -> Option<LinkStatus> {
        let previous = self.state;
        self.state = previous.transition(event);

        if self.state == LinkState::Disconnected {
            self.ping_pending = None;
        }

        match (previous, self.state) {
            (LinkState::Synchronized, LinkState::Synchronized) => None,
            (_, LinkState::Synchronized) => Some(LinkStatus::Connected),
            (LinkState::Synchronized, LinkState::Handshaking) => Some(LinkStatus::Resyncing),
            (LinkState::Disconnected, _) | (LinkState::Handshaking, LinkState::Handshaking) => {
                None
            }
            (_, LinkState::Disconnected) => Some(LinkStatus::Lost),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handshake_reaches_synchronized() {
        let state = LinkState::Disconnected.transition(SyncEvent::HandshakeStarted);
        assert_eq!(state, LinkState::Handshaking);

        assert_eq!(
            state.transition(SyncEvent::PeerConfirmed),
            LinkState::Synchronized
        );
        assert_eq!(
            state.transition(SyncEvent::SnapshotApplied),
            LinkState::Synchronized
        );
    }

    #[test]
    fn test_loss_from_any_state() {
        for state in [
            LinkState::Disconnected,
            LinkState::Handshaking,
            LinkState::Synchronized,
        ] {
            assert_eq!(
                state.transition(SyncEvent::HeartbeatLost),
                LinkState::Disconnected
            );
            assert_eq!(
                state.transition(SyncEvent::TransportFault),
                LinkState::Disconnected
            );
        }
    }

    #[test]
    fn test_no_terminal_state() {
        // After loss a fresh handshake recovers the link
        let state = LinkState::Synchronized
            .transition(SyncEvent::HeartbeatLost)
            .transition(SyncEvent::HandshakeStarted)
            .transition(SyncEvent::PeerConfirmed);
        assert_eq!(state, LinkState::Synchronized);
    }

    #[test]
    fn test_data_gating() {
        assert!(LinkState::Synchronized.data_allowed());
        assert!(!LinkState::Handshaking.data_allowed());
        assert!(!LinkState::Disconnected.data_allowed());
    }

    #[test]
    fn test_status_notifications() {
        let mut link = SyncLink::new();

        assert_eq!(link.apply(SyncEvent::HandshakeStarted), None);
        assert_eq!(
            link.apply(SyncEvent::PeerConfirmed),
            Some(LinkStatus::Connected)
        );
        // Staying synchronized is quiet
        assert_eq!(link.apply(SyncEvent::SnapshotApplied), None);
        assert_eq!(
            link.apply(SyncEvent::HandshakeStarted),
            Some(LinkStatus::Resyncing)
        );
        assert_eq!(link.apply(SyncEvent::HeartbeatLost), Some(LinkStatus::Lost));
        // Already disconnected; further faults are quiet
        assert_eq!(link.apply(SyncEvent::TransportFault), None);
    }

    #[test]
    fn test_ping_bookkeeping() {
        let mut link = SyncLink::new();
        link.apply(SyncEvent::HandshakeStarted);
        link.apply(SyncEvent::PeerConfirmed);

        link.ping_sent(42);
        assert_eq!(link.ping_pending(), Some(42));

        // Stale pong is ignored
        link.pong_received(41);
        assert_eq!(link.ping_pending(), Some(42));

        link.pong_received(42);
        assert_eq!(link.ping_pending(), None);
    }

    #[test]
    fn test_disconnect_clears_pending_ping() {
        let mut link = SyncLink::new();
        link.apply(SyncEvent::HandshakeStarted);
        link.apply(SyncEvent::PeerConfirmed);
        link.ping_sent(7);

        link.apply(SyncEvent::TransportFault);
        assert_eq!(link.ping_pending(), None);
    }
}
