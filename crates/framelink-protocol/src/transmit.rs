//! Frame composition and the transmit path.
//!
//! The [`Transmitter`] owns everything a frame needs on its way out: the
//! host's byte sink, the transmit lock, the id counter and the compose
//! buffer. Frames are built either all at once (`send`, `respond`) or as
//! a multi-part composition (`send_multipart` … `multipart_payload` …
//! `multipart_close`) that streams the payload without ever holding it
//! whole. Both paths produce identical wire bytes.
//!
//! Listener callbacks receive `&mut Transmitter`, which is how a handler
//! responds to a request from inside dispatch without touching the
//! listener tables.

use crate::checksum::ChecksumState;
use crate::config::FrameConfig;
use crate::frame::Message;
use crate::wire;
use bytes::Bytes;
use framelink_core::{Error, Peer};
use std::mem;
use tracing::{debug, warn};

/// Byte sink the engine writes composed frames to.
///
/// The host implements this over its UART, socket or pipe. Writes are
/// synchronous and presumed to succeed; if the sink blocks, the engine
/// blocks with it.
pub trait FrameSink {
    /// Write `bytes` to the transport.
    fn write_bytes(&mut self, bytes: &[u8]);
}

/// Capture sink, mostly for tests and loopback wiring.
impl FrameSink for Vec<u8> {
    fn write_bytes(&mut self, bytes: &[u8]) {
        self.extend_from_slice(bytes);
    }
}

/// Transmit lock guarding the compose path.
///
/// At most one composition may be active per engine. Hosts that share an
/// engine between a producer thread and dispatch-triggered responders
/// implement this over a real mutex; single-threaded hosts use the
/// built-in [`SoftLock`].
pub trait TxLock {
    /// Try to claim the transmit path. `false` aborts the send.
    fn claim(&mut self) -> bool;

    /// Release the transmit path after the frame is flushed.
    fn release(&mut self);
}

/// Plain boolean lock for single-threaded hosts.
///
/// Guards against nested compositions (a send started while a multi-part
/// frame is open) but provides no cross-thread exclusion.
#[derive(Debug, Default)]
pub struct SoftLock {
    held: bool,
}

impl TxLock for SoftLock {
    fn claim(&mut self) -> bool {
        if self.held {
            return false;
        }
        self.held = true;
        true
    }

    fn release(&mut self) {
        self.held = false;
    }
}

/// The transmit half of an engine.
///
/// Obtained by listener callbacks during dispatch; the engine itself
/// forwards its whole send/respond/multipart surface here.
pub struct Transmitter<W, L = SoftLock> {
    config: FrameConfig,
    sink: W,
    lock: L,
    peer: Peer,

    /// Counter for the next allocated id, role bit excluded.
    next_id: u32,

    /// Compose buffer; flushed to the sink whenever it fills.
    buf: Vec<u8>,

    /// Declared payload length of the frame in progress.
    frame_len: u32,

    /// Payload bytes still expected before the frame closes.
    remaining: u32,

    /// Running payload checksum of the frame in progress.
    cksum: ChecksumState,

    /// A multi-part composition is open and holds the lock.
    multipart: bool,
}

impl<W: FrameSink, L: TxLock> Transmitter<W, L> {
    pub(crate) fn new(config: FrameConfig, peer: Peer, sink: W, lock: L) -> Self {
        Transmitter {
            buf: Vec::with_capacity(config.tx_capacity),
            config,
            sink,
            lock,
            peer,
            next_id: 0,
            frame_len: 0,
            remaining: 0,
            cksum: ChecksumState::None,
            multipart: false,
        }
    }

    /// Link configuration this transmitter was built with.
    #[must_use]
    pub fn config(&self) -> &FrameConfig {
        &self.config
    }

    /// Borrow the write sink.
    #[must_use]
    pub fn sink(&self) -> &W {
        &self.sink
    }

    /// Mutably borrow the write sink.
    pub fn sink_mut(&mut self) -> &mut W {
        &mut self.sink
    }

    /// Whether a multi-part composition is currently open.
    #[must_use]
    pub fn is_transmitting(&self) -> bool {
        self.multipart
    }

    /// Send a frame, assigning a fresh id unless it is a response.
    ///
    /// On success the assigned id is stored back into `msg.id` so the
    /// caller can correlate a future reply. Fails when the transmit lock
    /// is held or a field does not fit its configured width.
    pub fn send(&mut self, msg: &mut Message) -> bool {
        let payload = msg.payload.clone();
        let Ok(len) = u32::try_from(payload.len()) else {
            debug!("send rejected: payload longer than the wire format allows");
            return false;
        };
        if !self.begin(msg, len) {
            return false;
        }
        self.push_payload(&payload);
        self.close();
        true
    }

    /// Send a frame of `frame_type` carrying `payload`, no message struct.
    pub fn send_simple(&mut self, frame_type: u32, payload: &[u8]) -> bool {
        let mut msg = Message::new(frame_type, Bytes::copy_from_slice(payload));
        self.send(&mut msg)
    }

    /// Send a response to a received message, reusing its id.
    pub fn respond(&mut self, msg: &mut Message) -> bool {
        msg.is_response = true;
        self.send(msg)
    }

    /// Open a multi-part frame declaring `len` payload bytes.
    ///
    /// The header goes out immediately; the transmit lock stays held
    /// until [`multipart_close`]. `msg.payload` is ignored.
    ///
    /// [`multipart_close`]: Transmitter::multipart_close
    pub fn send_multipart(&mut self, msg: &mut Message, len: u32) -> bool {
        if !self.begin(msg, len) {
            return false;
        }
        self.multipart = true;
        true
    }

    /// [`send_multipart`] without the message struct.
    ///
    /// [`send_multipart`]: Transmitter::send_multipart
    pub fn send_simple_multipart(&mut self, frame_type: u32, len: u32) -> bool {
        let mut msg = Message::new(frame_type, Bytes::new());
        self.send_multipart(&mut msg, len)
    }

    /// Open a multi-part response, reusing the incoming id.
    pub fn respond_multipart(&mut self, msg: &mut Message, len: u32) -> bool {
        msg.is_response = true;
        self.send_multipart(msg, len)
    }

    /// Stream part of the payload of an open multi-part frame.
    ///
    /// May be called any number of times; the running total must reach
    /// the declared length by [`multipart_close`]. Bytes beyond the
    /// declared length are dropped with a warning.
    ///
    /// [`multipart_close`]: Transmitter::multipart_close
    pub fn multipart_payload(&mut self, bytes: &[u8]) {
        if !self.multipart {
            debug!("multipart_payload called with no open frame");
            return;
        }
        self.push_payload(bytes);
    }

    /// Close an open multi-part frame: append the payload checksum,
    /// flush, release the transmit lock.
    pub fn multipart_close(&mut self) {
        if !self.multipart {
            debug!("multipart_close called with no open frame");
            return;
        }
        if self.remaining > 0 {
            warn!(
                missing = self.remaining,
                "closing multipart frame short of its declared length"
            );
        }
        self.multipart = false;
        self.close();
    }

    /// Allocate the next frame id, pinning the peer role bit.
    fn alloc_id(&mut self) -> u32 {
        let bits = self.config.id_width.as_usize() * 8;
        let role_mask = 1u32 << (bits - 1);
        let counter_mask = role_mask - 1;

        let mut id = self.next_id & counter_mask;
        if self.peer.is_master() {
            id |= role_mask;
        }
        self.next_id = (self.next_id + 1) & counter_mask;
        id
    }

    /// Claim the lock and write the frame header.
    fn begin(&mut self, msg: &mut Message, len: u32) -> bool {
        if !self.lock.claim() {
            debug!(error = %Error::TxBusy, "send rejected");
            return false;
        }
        if !self.config.type_width.fits(msg.frame_type) {
            let error = Error::FieldOverflow {
                value: msg.frame_type,
                width: self.config.type_width.as_usize(),
            };
            debug!(%error, "send rejected");
            self.lock.release();
            return false;
        }
        if !self.config.len_width.fits(len) {
            let error = Error::FrameTooLarge {
                size: len as usize,
                max_size: self.config.len_width.max_value() as usize,
            };
            debug!(%error, "send rejected");
            self.lock.release();
            return false;
        }
        if !msg.is_response {
            msg.id = self.alloc_id();
        }

        self.buf.clear();
        self.frame_len = len;
        self.remaining = len;

        let kind = self.config.checksum.clone();
        let mut header_cksum = kind.start();
        if let Some(sof) = self.config.sof {
            self.write_raw(&[sof]);
            kind.update(&mut header_cksum, &[sof]);
        }
        for (value, width) in [
            (msg.id, self.config.id_width),
            (len, self.config.len_width),
            (msg.frame_type, self.config.type_width),
        ] {
            let (tmp, n) = wire::uint_be(value, width.as_usize());
            self.write_raw(&tmp[..n]);
            kind.update(&mut header_cksum, &tmp[..n]);
        }
        if kind.is_enabled() {
            let (tmp, n) = wire::uint_be(kind.finalize(header_cksum), kind.width());
            self.write_raw(&tmp[..n]);
        }
        self.cksum = kind.start();
        true
    }

    /// Fold payload bytes into the checksum and the compose buffer.
    fn push_payload(&mut self, bytes: &[u8]) {
        let take = (self.remaining as usize).min(bytes.len());
        if take < bytes.len() {
            warn!(
                extra = bytes.len() - take,
                "payload bytes beyond the declared frame length were dropped"
            );
        }
        let bytes = &bytes[..take];
        self.config.checksum.update(&mut self.cksum, bytes);
        self.write_raw(bytes);
        self.remaining -= take as u32;
    }

    /// Append the payload checksum, flush, release the lock.
    fn close(&mut self) {
        let kind = self.config.checksum.clone();
        if self.frame_len > 0 && kind.is_enabled() {
            let state = mem::replace(&mut self.cksum, ChecksumState::None);
            let (tmp, n) = wire::uint_be(kind.finalize(state), kind.width());
            self.write_raw(&tmp[..n]);
        }
        self.flush();
        self.lock.release();
    }

    /// Buffered write: spill to the sink whenever the buffer fills.
    fn write_raw(&mut self, bytes: &[u8]) {
        let mut rest = bytes;
        while !rest.is_empty() {
            let space = self.config.tx_capacity - self.buf.len();
            if space == 0 {
                self.flush();
                continue;
            }
            let n = space.min(rest.len());
            self.buf.extend_from_slice(&rest[..n]);
            rest = &rest[n..];
        }
    }

    fn flush(&mut self) {
        if !self.buf.is_empty() {
            self.sink.write_bytes(&self.buf);
            self.buf.clear();
        }
    }
}
