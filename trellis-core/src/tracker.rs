//! Reliable delivery tracker
//!
//! At-least-once delivery for messages explicitly flagged important at
//! send time; everything else is fire-and-forget. One tracker per
//! transport adapter, owned by the node's loop; the sweep is driven on
//! a coarse periodic basis from that loop, which is plenty for
//! multi-second timeouts.

use heapless::{FnvIndexMap, Vec};

use trellis_protocol::{Channel, MAX_FRAME_SIZE};

/// Time before an unacknowledged request is re-sent
pub const RETRY_TIMEOUT_MS: u64 = 3_000;

/// Retries before a request is declared failed
pub const MAX_RETRIES: u8 = 3;

/// Maximum simultaneously tracked requests (power of two for the map)
pub const MAX_PENDING: usize = 8;

/// One outbound important message awaiting acknowledgment
///
/// Created when the send is flagged important, mutated only by the
/// sweep, destroyed on a matching inbound correlation id or on retry
/// exhaustion.
#[derive(Debug, Clone)]
pub struct PendingRequest {
    pub correlation_id: u16,
    /// Monotonic send (or last re-send) time
    pub sent_at_ms: u64,
    pub retries: u8,
    pub channel: Channel,
    /// Raw encoded frame, re-sent verbatim on retry
    pub raw: Vec<u8, MAX_FRAME_SIZE>,
}

/// Outcome of one sweep step for one pending request
#[derive(Debug)]
pub enum TrackerEvent<'a> {
    /// Timed out; the raw frame should be re-sent on the owning adapter
    Resend(&'a PendingRequest),
    /// Retries exhausted; reported exactly once, entry already removed
    Failed(&'a PendingRequest),
}

/// Error from [`DeliveryTracker::watch`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TrackerError {
    /// Pending map is at capacity; the send went out untracked
    Full,
}

/// Pending-acknowledgment bookkeeping for one transport adapter
#[derive(Debug, Default)]
pub struct DeliveryTracker {
    pending: FnvIndexMap<u16, PendingRequest, MAX_PENDING>,
}

impl DeliveryTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking one sent frame
    pub fn watch(
        &mut self,
        correlation_id: u16,
        channel: Channel,
        raw: &[u8],
        now_ms: u64,
    ) -> Result<(), TrackerError> {
        let mut bytes = Vec::new();
        bytes
            .extend_from_slice(raw)
            .map_err(|_| TrackerError::Full)?;

        let request = PendingRequest {
            correlation_id,
            sent_at_ms: now_ms,
            retries: 0,
            channel,
            raw: bytes,
        };

        self.pending
            .insert(correlation_id, request)
            .map(|_| ())
            .map_err(|_| TrackerError::Full)
    }

    /// Acknowledge by correlation id; any inbound opcode counts
    pub fn clear(&mut self, correlation_id: u16) -> bool {
        self.pending.remove(&correlation_id).is_some()
    }

    pub fn contains(&self, correlation_id: u16) -> bool {
        self.pending.contains_key(&correlation_id)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Retry/timeout sweep
    ///
    /// Re-arms timed-out entries (reporting [`TrackerEvent::Resend`])
    /// and removes exhausted ones (reporting [`TrackerEvent::Failed`]
    /// exactly once). Entries are independent; no cross-id ordering.
    pub fn sweep(&mut self, now_ms: u64, mut handle: impl FnMut(TrackerEvent<'_>)) {
        let mut due: Vec<u16, MAX_PENDING> = Vec::new();
        for (&id, request) in self.pending.iter() {
            if now_ms >= request.sent_at_ms + RETRY_TIMEOUT_MS {
                // Capacity matches the map; push cannot fail
                let _ = due.push(id);
            }
        }

        for id in due {
            if let Some(request) = self.pending.get_mut(&id) {
                if request.retries >= MAX_RETRIES {
                    // Checked above that the key exists
                    if let Some(request) = self.pending.remove(&id) {
                        warn!("request {} failed after {} retries", id, MAX_RETRIES);
                        handle(TrackerEvent::Failed(&request));
                    }
                } else {
                    request.retries += 1;
                    request.sent_at_ms = now_ms;
                    debug!("request {} timed out, retry {}", id, request.retries);
                    handle(TrackerEvent::Resend(request));
                }
            }
        }
    }
}
