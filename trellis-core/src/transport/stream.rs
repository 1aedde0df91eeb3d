//! Point-to-point byte stream adapter
//!
//! Accumulates bytes from a non-blocking wire until the frame sentinel
//! appears. Two failure regimes:
//!
//! - a partial frame that goes idle too long is dropped (recoverable;
//!   framing resynchronizes on the next sentinel),
//! - the assembly buffer overflowing its hard cap is fatal for this
//!   adapter instance; the underlying wire must be reopened.

use heapless::Vec;

use trellis_protocol::{Channel, Message, FRAME_SENTINEL, MAX_FRAME_SIZE};

use super::{Inbound, ReadOutcome, Transport, TransportError};

/// Idle timeout for a partially assembled frame; re-armed on every byte
pub const IDLE_TIMEOUT_MS: u64 = 50;

/// Byte-level access to the underlying stream device
///
/// Supplied by device glue (a UART, a serial port, an in-memory pipe in
/// tests). Both operations must be non-blocking.
pub trait StreamWire {
    type Error;

    /// Pop one received byte if available
    fn read_byte(&mut self) -> Result<Option<u8>, Self::Error>;

    /// Queue bytes for transmission
    fn write_all(&mut self, bytes: &[u8]) -> Result<(), Self::Error>;
}

/// Frame adapter over a point-to-point byte stream
pub struct StreamTransport<W: StreamWire> {
    wire: W,
    buf: Vec<u8, MAX_FRAME_SIZE>,
    last_byte_ms: u64,
    faulted: bool,
}

impl<W: StreamWire> StreamTransport<W> {
    pub fn new(wire: W) -> Self {
        Self {
            wire,
            buf: Vec::new(),
            last_byte_ms: 0,
            faulted: false,
        }
    }

    /// Replace the wire after a fatal fault and resume assembly from a
    /// clean buffer
    pub fn reopen(&mut self, wire: W) {
        self.wire = wire;
        self.buf.clear();
        self.faulted = false;
    }

    /// Bytes currently sitting in the assembly buffer
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }
}

impl<W: StreamWire> Transport for StreamTransport<W> {
    fn send_raw(&mut self, raw: &[u8], _channel: Channel) -> Result<(), TransportError> {
        if self.faulted {
            return Err(TransportError::NotReady);
        }
        self.wire
            .write_all(raw)
            .map_err(|_| TransportError::Wire)
    }

    fn try_read(&mut self, now_ms: u64) -> ReadOutcome {
        if self.faulted {
            return ReadOutcome::Fault(TransportError::Overflow);
        }

        loop {
            let byte = match self.wire.read_byte() {
                Ok(Some(byte)) => byte,
                Ok(None) => break,
                Err(_) => return ReadOutcome::Fault(TransportError::Wire),
            };

            if self.buf.push(byte).is_err() {
                // Hard cap exceeded: fatal until reopened
                warn!("stream assembly overflow at {} bytes", MAX_FRAME_SIZE);
                self.buf.clear();
                self.faulted = true;
                return ReadOutcome::Fault(TransportError::Overflow);
            }
            self.last_byte_ms = now_ms;

            if self.buf.ends_with(&FRAME_SENTINEL) {
                let raw = self.buf.clone();
                self.buf.clear();

                return match Message::decode(&raw) {
                    Ok(message) => ReadOutcome::Frame(Inbound { message, raw }),
                    Err(err) => ReadOutcome::Corrupt(err),
                };
            }
        }

        // No byte arrived this call; drop a stalled partial frame so the
        // next sentinel realigns framing
        if !self.buf.is_empty() && now_ms.saturating_sub(self.last_byte_ms) >= IDLE_TIMEOUT_MS {
            warn!("dropping stalled partial frame ({} bytes)", self.buf.len());
            self.buf.clear();
            return ReadOutcome::Corrupt(trellis_protocol::FrameError::MissingSentinel);
        }

        ReadOutcome::Pending
    }

    fn is_ready(&self) -> bool {
        !self.faulted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::vec::Vec as StdVec;

    use trellis_protocol::{NodeAddress, Opcode};

    #[derive(Default)]
    struct PipeWire {
        rx: VecDeque<u8>,
        tx: StdVec<u8>,
        fail_reads: bool,
    }

    impl StreamWire for PipeWire {
        type Error = ();

        fn read_byte(&mut self) -> Result<Option<u8>, ()> {
            if self.fail_reads {
                return Err(());
            }
            Ok(self.rx.pop_front())
        }

        fn write_all(&mut self, bytes: &[u8]) -> Result<(), ()> {
            self.tx.extend_from_slice(bytes);
            Ok(())
        }
    }

    fn ping_frame() -> StdVec<u8> {
        Message::new(
            Opcode::Ping,
            NodeAddress::Host,
            NodeAddress::Display,
            7,
            Channel::Private,
        )
        .encode()
        .unwrap()
        .to_vec()
    }

    #[test]
    fn test_whole_frame_in_one_read() {
        let mut wire = PipeWire::default();
        wire.rx.extend(ping_frame());
        let mut transport = StreamTransport::new(wire);

        match transport.try_read(0) {
            ReadOutcome::Frame(inbound) => {
                assert_eq!(inbound.message.opcode, Opcode::Ping);
                assert_eq!(inbound.raw.as_slice(), ping_frame().as_slice());
            }
            other => panic!("expected frame, got {:?}", other),
        }
    }

    #[test]
    fn test_sentinel_split_across_reads() {
        // Frame arrives in two chunks, cut in the middle of the sentinel
        let frame = ping_frame();
        let cut = frame.len() - 3;

        let mut transport = StreamTransport::new(PipeWire::default());
        transport.wire.rx.extend(&frame[..cut]);
        assert!(matches!(transport.try_read(0), ReadOutcome::Pending));

        transport.wire.rx.extend(&frame[cut..]);
        match transport.try_read(10) {
            ReadOutcome::Frame(inbound) => {
                assert_eq!(inbound.message.correlation_id, 7)
            }
            other => panic!("expected frame, got {:?}", other),
        }
    }

    #[test]
    fn test_idle_timeout_drops_partial() {
        let frame = ping_frame();

        let mut transport = StreamTransport::new(PipeWire::default());
        transport.wire.rx.extend(&frame[..4]);
        assert!(matches!(transport.try_read(0), ReadOutcome::Pending));

        // Under the timeout the partial survives
        assert!(matches!(transport.try_read(49), ReadOutcome::Pending));
        // Past the timeout it is discarded
        assert!(matches!(transport.try_read(50), ReadOutcome::Corrupt(_)));
        assert_eq!(transport.buffered(), 0);
        assert!(transport.is_ready());
    }

    #[test]
    fn test_idle_timeout_rearms_per_byte() {
        let frame = ping_frame();
        let mut transport = StreamTransport::new(PipeWire::default());

        // Bytes trickle in slower than the frame but faster than the
        // per-byte timeout; the frame still assembles
        let mut now = 0;
        for chunk in frame.chunks(2) {
            transport.wire.rx.extend(chunk);
            match transport.try_read(now) {
                ReadOutcome::Pending => {}
                ReadOutcome::Frame(inbound) => {
                    assert_eq!(inbound.message.opcode, Opcode::Ping);
                    return;
                }
                other => panic!("unexpected outcome {:?}", other),
            }
            now += 40;
        }
        panic!("frame never completed");
    }

    #[test]
    fn test_overflow_is_fatal_until_reopen() {
        let mut transport = StreamTransport::new(PipeWire::default());
        // Sentinel-free garbage past the hard cap
        transport.wire.rx.extend(std::iter::repeat(0x41).take(MAX_FRAME_SIZE + 1));

        assert!(matches!(
            transport.try_read(0),
            ReadOutcome::Fault(TransportError::Overflow)
        ));
        assert!(!transport.is_ready());
        assert!(matches!(
            transport.try_read(1),
            ReadOutcome::Fault(TransportError::Overflow)
        ));
        assert!(matches!(
            transport.send_raw(&[1, 2, 3], Channel::Private),
            Err(TransportError::NotReady)
        ));

        transport.reopen(PipeWire::default());
        assert!(transport.is_ready());
        transport.wire.rx.extend(ping_frame());
        assert!(matches!(transport.try_read(2), ReadOutcome::Frame(_)));
    }

    #[test]
    fn test_corrupt_frame_discarded_stream_continues() {
        let mut garbage = ping_frame();
        garbage[2] ^= 0xFF; // clobber the descriptor

        let mut transport = StreamTransport::new(PipeWire::default());
        transport.wire.rx.extend(&garbage);
        transport.wire.rx.extend(ping_frame());

        assert!(matches!(transport.try_read(0), ReadOutcome::Corrupt(_)));
        assert!(matches!(transport.try_read(0), ReadOutcome::Frame(_)));
    }

    #[test]
    fn test_wire_error_surfaces_as_fault() {
        let mut transport = StreamTransport::new(PipeWire {
            fail_reads: true,
            ..Default::default()
        });
        assert!(matches!(
            transport.try_read(0),
            ReadOutcome::Fault(TransportError::Wire)
        ));
        // Wire faults are not latched; a reopened/recovered wire resumes
        assert!(transport.is_ready());
    }

    #[test]
    fn test_writes_pass_through() {
        let mut transport = StreamTransport::new(PipeWire::default());
        transport.send_raw(&[0xAA, 0xBB], Channel::Private).unwrap();
        assert_eq!(transport.wire.tx, [0xAA, 0xBB]);
    }
}
