//! Node composition and tick loop
//!
//! A [`Node`] ties the layers together for one mesh member: a route
//! table, one or two links (transport adapter + delivery tracker +
//! sync state each), the schema snapshot with its fingerprint, and a
//! [`Collaborator`] supplying the node-specific behavior.
//!
//! Everything runs inside [`Node::tick`], called periodically from a
//! single-threaded loop with a monotonic millisecond timestamp. The
//! core never blocks and never sleeps; pacing is the caller's job.

use heapless::Vec;

use trellis_protocol::{
    Channel, Message, NodeAddress, Opcode, Value, MAX_PAYLOAD_VALUES,
};

use crate::router::{LinkId, RouteDecision, RouteTable};
use crate::schema::{Snapshot, MAX_SNAPSHOT_BYTES};
use crate::sync::{LinkState, LinkStatus, Signature, SyncEvent, SyncLink, SyncRole};
use crate::tracker::{DeliveryTracker, TrackerEvent};
use crate::transport::{Inbound, NullTransport, ReadOutcome, Transport, TransportError};

/// Inbound frames handled per link per tick, so one chatty link cannot
/// starve the other
pub const MAX_FRAMES_PER_TICK: usize = 8;

/// Ticks between delivery tracker sweeps
pub const SWEEP_INTERVAL_TICKS: u64 = 10;

/// Ticks between synchronization duties (handshake probe / heartbeat)
pub const SYNC_INTERVAL_TICKS: u64 = 20;

/// Errors from [`Node::send`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SendError {
    /// Destination is not reachable from this node
    NoRoute,
    /// Destination is this node itself
    SelfAddressed,
    /// The message does not encode (too large, sentinel in payload)
    Frame(trellis_protocol::FrameError),
    /// The outbound link refused the frame
    Transport(TransportError),
    /// Important send went out but cannot be tracked
    TrackerFull,
}

/// Node-specific behavior plugged into the core
///
/// The core calls down for data and pushes notifications up; the
/// collaborator never touches transports or framing. Side-effecting
/// operations (relay power-cycle, reset lines, registration glue) live
/// behind [`Collaborator::handle_opcode`].
pub trait Collaborator {
    /// Authoritative snapshot at startup; peers serve their replica
    fn schema_snapshot(&self) -> Snapshot {
        Snapshot::new()
    }

    /// Current readings, one value per schema field in canonical order
    fn live_readings(&mut self, schema: &Snapshot, out: &mut Vec<Value, MAX_PAYLOAD_VALUES>);

    /// Handle an opcode the core has no semantics for; return false if
    /// this node does not implement it either
    fn handle_opcode(&mut self, message: &Message) -> bool;

    /// Schema-validated readings received from a peer
    fn readings(&mut self, _schema: &Snapshot, _values: &[Value]) {}

    /// A link's synchronization status changed
    fn link_status(&mut self, _peer: NodeAddress, _status: LinkStatus) {}

    /// An important send exhausted its retries
    fn delivery_failed(&mut self, _correlation_id: u16) {}
}

/// One transport link with its per-link state
struct Link<T: Transport> {
    /// Direct peer at the far end of this link
    peer: NodeAddress,
    role: SyncRole,
    transport: T,
    tracker: DeliveryTracker,
    sync: SyncLink,
}

impl<T: Transport> Link<T> {
    fn new(peer: NodeAddress, role: SyncRole, transport: T) -> Self {
        Self {
            peer,
            role,
            transport,
            tracker: DeliveryTracker::new(),
            sync: SyncLink::new(),
        }
    }

    /// Drain ready frames, bounded per tick
    ///
    /// Corrupt frames are logged, discarded, and still consume the
    /// per-tick budget, so a peer streaming garbage cannot monopolize
    /// a tick. A transport fault drops the link to `Disconnected`; the
    /// returned status change is reported by the caller.
    fn poll(
        &mut self,
        now_ms: u64,
        out: &mut Vec<Inbound, MAX_FRAMES_PER_TICK>,
    ) -> Option<(NodeAddress, LinkStatus)> {
        for _ in 0..MAX_FRAMES_PER_TICK {
            match self.transport.try_read(now_ms) {
                ReadOutcome::Frame(inbound) => {
                    // Capacity equals the budget
                    let _ = out.push(inbound);
                }
                ReadOutcome::Pending => break,
                ReadOutcome::Corrupt(err) => {
                    warn!("corrupt frame discarded: {}", err);
                }
                ReadOutcome::Fault(err) => {
                    warn!("transport fault: {}", err);
                    return self
                        .sync
                        .apply(SyncEvent::TransportFault)
                        .map(|status| (self.peer, status));
                }
            }
        }
        None
    }
}

/// Tracker sweep for one link: re-send timed-out frames, report
/// exhausted ones, and treat a failed heartbeat as link loss
fn sweep_link<T: Transport, C: Collaborator>(
    link: &mut Link<T>,
    collaborator: &mut C,
    now_ms: u64,
) {
    let Link {
        peer,
        transport,
        tracker,
        sync,
        ..
    } = link;

    let mut heartbeat_lost = false;
    tracker.sweep(now_ms, |event| match event {
        TrackerEvent::Resend(request) => {
            if transport.send_raw(&request.raw, request.channel).is_err() {
                warn!("retry send failed for {}", request.correlation_id);
            }
        }
        TrackerEvent::Failed(request) => {
            collaborator.delivery_failed(request.correlation_id);
            if sync.ping_pending() == Some(request.correlation_id) {
                heartbeat_lost = true;
            }
        }
    });

    if heartbeat_lost {
        if let Some(status) = sync.apply(SyncEvent::HeartbeatLost) {
            collaborator.link_status(*peer, status);
        }
    }
}

/// One mesh member: router, links, schema replica, collaborator
pub struct Node<A: Transport, B: Transport, C: Collaborator> {
    routes: RouteTable,
    primary: Link<A>,
    secondary: Option<Link<B>>,
    snapshot: Snapshot,
    signature: Signature,
    collaborator: C,
    ticks: u64,
    corr_seq: u16,
}

impl<A: Transport, C: Collaborator> Node<A, NullTransport, C> {
    /// Edge node with a single link
    ///
    /// `corr_seed` offsets this node's correlation sequence; supply
    /// per-device entropy (unique chip id, boot clock) so concurrent
    /// nodes do not mint colliding ids.
    pub fn single(
        routes: RouteTable,
        peer: NodeAddress,
        role: SyncRole,
        transport: A,
        collaborator: C,
        corr_seed: u16,
    ) -> Self {
        let snapshot = collaborator.schema_snapshot();
        let signature = Signature::of(&snapshot);
        Self {
            routes,
            primary: Link::new(peer, role, transport),
            secondary: None,
            snapshot,
            signature,
            collaborator,
            ticks: 0,
            corr_seq: corr_seed,
        }
    }
}

impl<A: Transport, B: Transport, C: Collaborator> Node<A, B, C> {
    /// Relay node with two links
    ///
    /// `corr_seed` offsets this node's correlation sequence; supply
    /// per-device entropy (unique chip id, boot clock) so concurrent
    /// nodes do not mint colliding ids.
    pub fn dual(
        routes: RouteTable,
        primary: (NodeAddress, SyncRole, A),
        secondary: (NodeAddress, SyncRole, B),
        collaborator: C,
        corr_seed: u16,
    ) -> Self {
        let snapshot = collaborator.schema_snapshot();
        let signature = Signature::of(&snapshot);
        Self {
            routes,
            primary: Link::new(primary.0, primary.1, primary.2),
            secondary: Some(Link::new(secondary.0, secondary.1, secondary.2)),
            snapshot,
            signature,
            collaborator,
            ticks: 0,
            corr_seq: corr_seed,
        }
    }

    pub fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }

    pub fn signature(&self) -> Signature {
        self.signature
    }

    pub fn link_state(&self, link: LinkId) -> Option<LinkState> {
        match link {
            LinkId::Primary => Some(self.primary.sync.state()),
            LinkId::Secondary => self.secondary.as_ref().map(|l| l.sync.state()),
        }
    }

    pub fn collaborator(&self) -> &C {
        &self.collaborator
    }

    pub fn collaborator_mut(&mut self) -> &mut C {
        &mut self.collaborator
    }

    /// One cooperative scheduling round
    ///
    /// `now_ms` must be monotonic. The caller owns pacing; intervals
    /// below are counted in ticks, not milliseconds.
    pub fn tick(&mut self, now_ms: u64) {
        self.ticks += 1;

        for link in [LinkId::Primary, LinkId::Secondary] {
            let mut inbox: Vec<Inbound, MAX_FRAMES_PER_TICK> = Vec::new();
            let notify = match link {
                LinkId::Primary => self.primary.poll(now_ms, &mut inbox),
                LinkId::Secondary => match self.secondary.as_mut() {
                    Some(l) => l.poll(now_ms, &mut inbox),
                    None => None,
                },
            };
            if let Some((peer, status)) = notify {
                self.collaborator.link_status(peer, status);
            }
            for inbound in inbox {
                self.handle_inbound(link, inbound, now_ms);
            }
        }

        if self.ticks % SWEEP_INTERVAL_TICKS == 0 {
            sweep_link(&mut self.primary, &mut self.collaborator, now_ms);
            if let Some(link) = self.secondary.as_mut() {
                sweep_link(link, &mut self.collaborator, now_ms);
            }
        }

        if self.ticks % SYNC_INTERVAL_TICKS == 0 {
            self.sync_duty(LinkId::Primary, now_ms);
            self.sync_duty(LinkId::Secondary, now_ms);
        }
    }

    /// Send a message from this node
    ///
    /// The channel is public exactly when the destination is the public
    /// bus. Returns the correlation id so the caller can match a later
    /// reply. Important sends are retried by the tracker until
    /// acknowledged or exhausted.
    pub fn send(
        &mut self,
        destination: NodeAddress,
        opcode: Opcode,
        payload: &[Value],
        important: bool,
        now_ms: u64,
    ) -> Result<u16, SendError> {
        if destination == self.routes.self_addr() {
            return Err(SendError::SelfAddressed);
        }
        let link = self.routes.link_for(destination).ok_or(SendError::NoRoute)?;

        let channel = if destination == NodeAddress::Public {
            Channel::Public
        } else {
            Channel::Private
        };
        let corr = self.next_corr();
        let mut message = Message::new(opcode, self.routes.self_addr(), destination, corr, channel);
        for value in payload {
            message.push(value.clone()).map_err(SendError::Frame)?;
        }

        self.send_on(link, &message, important, now_ms)?;
        Ok(corr)
    }

    /// Replace the snapshot and announce the new fingerprint to every
    /// synchronized peer so stale replicas re-handshake
    pub fn update_snapshot(&mut self, snapshot: Snapshot, now_ms: u64) {
        self.snapshot = snapshot;
        self.signature = Signature::of(&self.snapshot);
        info!("snapshot updated, announcing new fingerprint");

        for link in [LinkId::Primary, LinkId::Secondary] {
            self.announce_schema(link, now_ms);
        }
    }

    fn next_corr(&mut self) -> u16 {
        self.corr_seq = self.corr_seq.wrapping_add(1);
        self.corr_seq
    }

    fn handle_inbound(&mut self, link: LinkId, inbound: Inbound, now_ms: u64) {
        match self.routes.decide(inbound.message.destination) {
            RouteDecision::Local => {
                self.clear_tracker(link, inbound.message.correlation_id);
                self.dispatch_local(link, inbound.message, now_ms);
            }
            RouteDecision::Forward(out) => {
                let channel = inbound.message.channel;
                if self.send_raw_on(out, &inbound.raw, channel).is_err() {
                    warn!("forward failed, frame dropped");
                }
            }
            RouteDecision::Drop => {
                warn!(
                    "no route for destination {}, frame dropped",
                    inbound.message.destination.to_byte()
                );
            }
        }
    }

    /// Tagged dispatch of frames addressed to this node
    fn dispatch_local(&mut self, link: LinkId, message: Message, now_ms: u64) {
        match message.opcode {
            Opcode::Ping => {
                self.send_reply(link, message.reply(Opcode::Pong), now_ms);
            }
            Opcode::Pong => {
                self.pong_received(link, message.correlation_id);
            }

            Opcode::GetSchema => {
                let theirs = payload_signature(&message, 0);
                if theirs == Some(self.signature) {
                    // Peer already holds this snapshot; confirm without
                    // shipping it
                    self.send_reply(link, message.reply(Opcode::SchemaOk), now_ms);
                    self.apply_sync(link, SyncEvent::PeerConfirmed);
                } else {
                    let mut reply = message.reply(Opcode::SchemaData);
                    let mut buffer = [0u8; MAX_SNAPSHOT_BYTES];
                    let encoded = self
                        .snapshot
                        .to_postcard(&mut buffer)
                        .ok()
                        .and_then(|bytes| Value::bytes(bytes).ok())
                        .and_then(|value| reply.push(value).ok());
                    match encoded {
                        Some(()) => {
                            self.send_reply(link, reply, now_ms);
                            self.apply_sync(link, SyncEvent::HandshakeStarted);
                        }
                        None => warn!("snapshot does not fit a frame, handshake stalled"),
                    }
                }
            }
            Opcode::SchemaOk => {
                self.apply_sync(link, SyncEvent::PeerConfirmed);
            }
            Opcode::SchemaData => {
                let snapshot = message
                    .payload
                    .first()
                    .and_then(|v| v.as_bytes())
                    .and_then(|bytes| Snapshot::from_postcard(bytes).ok());
                match snapshot {
                    Some(snapshot) => {
                        self.snapshot = snapshot;
                        self.signature = Signature::of(&self.snapshot);
                        info!("peer snapshot applied ({} fields)", self.snapshot.len());
                        self.apply_sync(link, SyncEvent::SnapshotApplied);
                        // Confirm so the sender leaves handshake too
                        self.send_reply(link, message.reply(Opcode::SchemaOk), now_ms);
                        self.propagate_schema_change(link, now_ms);
                    }
                    None => warn!("undecodable snapshot payload discarded"),
                }
            }
            Opcode::SchemaChanged => {
                let theirs = payload_signature(&message, 0);
                if theirs == Some(self.signature) {
                    self.send_reply(link, message.reply(Opcode::SchemaOk), now_ms);
                    self.apply_sync(link, SyncEvent::PeerConfirmed);
                } else {
                    // Our replica is stale; the reply doubles as an ack
                    // and a fetch
                    let mut reply = message.reply(Opcode::GetSchema);
                    let pushed = Value::bytes(self.signature.as_bytes())
                        .ok()
                        .and_then(|v| reply.push(v).ok());
                    if pushed.is_some() {
                        self.send_reply(link, reply, now_ms);
                        self.apply_sync(link, SyncEvent::HandshakeStarted);
                    }
                }
            }

            Opcode::GetReadings => {
                let mut values: Vec<Value, MAX_PAYLOAD_VALUES> = Vec::new();
                self.collaborator.live_readings(&self.snapshot, &mut values);

                let mut reply = message.reply(Opcode::ReadingsData);
                let mut ok = true;
                for value in values {
                    if reply.push(value).is_err() {
                        ok = false;
                        break;
                    }
                }
                // Trailing fingerprint gates positional unpacking on the
                // receiving side
                ok = ok
                    && Value::bytes(self.signature.as_bytes())
                        .ok()
                        .and_then(|v| reply.push(v).ok())
                        .is_some();
                if ok {
                    self.send_reply(link, reply, now_ms);
                } else {
                    warn!("readings overflow payload, reply dropped");
                }
            }
            Opcode::ReadingsData => {
                let trailing = message
                    .payload
                    .last()
                    .and_then(|v| v.as_bytes())
                    .and_then(Signature::from_bytes);
                if trailing == Some(self.signature) {
                    let values = &message.payload[..message.payload.len() - 1];
                    self.collaborator.readings(&self.snapshot, values);
                } else {
                    warn!("readings under a stale fingerprint, resynchronizing");
                    self.request_resync(link, now_ms);
                }
            }

            _ => {
                if !self.collaborator.handle_opcode(&message) {
                    debug!("opcode {} unhandled", message.opcode.to_byte());
                }
            }
        }
    }

    /// Periodic per-link duty: probe while unsynchronized, heartbeat
    /// while synchronized. Only the client end initiates either.
    fn sync_duty(&mut self, link: LinkId, now_ms: u64) {
        let Some((peer, role, state, ping_pending)) = self.link_view(link) else {
            return;
        };
        if role != SyncRole::Client {
            return;
        }

        match state {
            LinkState::Disconnected | LinkState::Handshaking => {
                self.send_handshake(link, peer, now_ms);
            }
            LinkState::Synchronized => {
                if ping_pending.is_none() {
                    let corr = self.next_corr();
                    let ping = Message::new(
                        Opcode::Ping,
                        self.routes.self_addr(),
                        peer,
                        corr,
                        Channel::Private,
                    );
                    if self.send_on(link, &ping, true, now_ms).is_ok() {
                        self.ping_sent(link, corr);
                    }
                }
            }
        }
    }

    /// Send a fingerprint probe and enter handshake
    fn send_handshake(&mut self, link: LinkId, peer: NodeAddress, now_ms: u64) {
        let corr = self.next_corr();
        let mut probe = Message::new(
            Opcode::GetSchema,
            self.routes.self_addr(),
            peer,
            corr,
            Channel::Private,
        );
        let pushed = Value::bytes(self.signature.as_bytes())
            .ok()
            .and_then(|v| probe.push(v).ok());
        if pushed.is_some() && self.send_on(link, &probe, true, now_ms).is_ok() {
            self.apply_sync(link, SyncEvent::HandshakeStarted);
        }
    }

    /// A stale fingerprint was observed on this link; fetch the peer's
    /// snapshot before trusting positional data again
    fn request_resync(&mut self, link: LinkId, now_ms: u64) {
        let Some((peer, _, _, _)) = self.link_view(link) else {
            return;
        };
        self.send_handshake(link, peer, now_ms);
    }

    /// Announce the current fingerprint on a synchronized link
    fn announce_schema(&mut self, link: LinkId, now_ms: u64) {
        let Some((peer, _, state, _)) = self.link_view(link) else {
            return;
        };
        if state != LinkState::Synchronized {
            return;
        }

        let corr = self.next_corr();
        let mut announce = Message::new(
            Opcode::SchemaChanged,
            self.routes.self_addr(),
            peer,
            corr,
            Channel::Private,
        );
        let pushed = Value::bytes(self.signature.as_bytes())
            .ok()
            .and_then(|v| announce.push(v).ok());
        if pushed.is_some() && self.send_on(link, &announce, true, now_ms).is_err() {
            warn!("schema announcement failed");
        }
    }

    /// After applying a new snapshot from one link, invalidate the
    /// replica on the other
    fn propagate_schema_change(&mut self, from: LinkId, now_ms: u64) {
        let other = match from {
            LinkId::Primary => LinkId::Secondary,
            LinkId::Secondary => LinkId::Primary,
        };
        self.announce_schema(other, now_ms);
    }

    fn send_reply(&mut self, link: LinkId, reply: Message, now_ms: u64) {
        if let Err(err) = self.send_on(link, &reply, false, now_ms) {
            warn!("reply send failed: {}", err);
        }
    }

    fn send_on(
        &mut self,
        link: LinkId,
        message: &Message,
        important: bool,
        now_ms: u64,
    ) -> Result<(), SendError> {
        let raw = message.encode().map_err(SendError::Frame)?;
        self.send_raw_on(link, &raw, message.channel)
            .map_err(SendError::Transport)?;

        if important {
            let watched = match link {
                LinkId::Primary => &mut self.primary.tracker,
                LinkId::Secondary => match self.secondary.as_mut() {
                    Some(l) => &mut l.tracker,
                    None => return Err(SendError::NoRoute),
                },
            }
            .watch(message.correlation_id, message.channel, &raw, now_ms);
            watched.map_err(|_| SendError::TrackerFull)?;
        }
        Ok(())
    }

    fn send_raw_on(
        &mut self,
        link: LinkId,
        raw: &[u8],
        channel: Channel,
    ) -> Result<(), TransportError> {
        match link {
            LinkId::Primary => self.primary.transport.send_raw(raw, channel),
            LinkId::Secondary => match self.secondary.as_mut() {
                Some(l) => l.transport.send_raw(raw, channel),
                None => Err(TransportError::NotReady),
            },
        }
    }

    fn clear_tracker(&mut self, link: LinkId, correlation_id: u16) {
        let cleared = match link {
            LinkId::Primary => self.primary.tracker.clear(correlation_id),
            LinkId::Secondary => self
                .secondary
                .as_mut()
                .is_some_and(|l| l.tracker.clear(correlation_id)),
        };
        if cleared {
            trace!("request {} acknowledged", correlation_id);
        }
    }

    fn apply_sync(&mut self, link: LinkId, event: SyncEvent) {
        let notify = match link {
            LinkId::Primary => self
                .primary
                .sync
                .apply(event)
                .map(|status| (self.primary.peer, status)),
            LinkId::Secondary => self
                .secondary
                .as_mut()
                .and_then(|l| l.sync.apply(event).map(|status| (l.peer, status))),
        };
        if let Some((peer, status)) = notify {
            self.collaborator.link_status(peer, status);
        }
    }

    fn ping_sent(&mut self, link: LinkId, correlation_id: u16) {
        match link {
            LinkId::Primary => self.primary.sync.ping_sent(correlation_id),
            LinkId::Secondary => {
                if let Some(l) = self.secondary.as_mut() {
                    l.sync.ping_sent(correlation_id);
                }
            }
        }
    }

    fn pong_received(&mut self, link: LinkId, correlation_id: u16) {
        match link {
            LinkId::Primary => self.primary.sync.pong_received(correlation_id),
            LinkId::Secondary => {
                if let Some(l) = self.secondary.as_mut() {
                    l.sync.pong_received(correlation_id);
                }
            }
        }
    }

    fn link_view(&self, link: LinkId) -> Option<(NodeAddress, SyncRole, LinkState, Option<u16>)> {
        match link {
            LinkId::Primary => Some((
                self.primary.peer,
                self.primary.role,
                self.primary.sync.state(),
                self.primary.sync.ping_pending(),
            )),
            LinkId::Secondary => self.secondary.as_ref().map(|l| {
                (l.peer, l.role, l.sync.state(), l.sync.ping_pending())
            }),
        }
    }
}

/// Parse a fingerprint out of a payload position
fn payload_signature(message: &Message, index: usize) -> Option<Signature> {
    message
        .payload
        .get(index)
        .and_then(|v| v.as_bytes())
        .and_then(Signature::from_bytes)
}
