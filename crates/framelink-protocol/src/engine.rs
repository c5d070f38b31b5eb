//! The framing engine: parser, dispatcher, transmitter and timers under
//! one handle.
//!
//! An engine is one end of a point-to-point link. Bytes from the
//! transport go in through [`accept`]; complete frames are routed to
//! listeners synchronously, inside the `accept` call that delivered the
//! final byte. Outbound frames go through the send/query/respond family,
//! which composes wire bytes into the host's [`FrameSink`]. A periodic
//! [`tick`] drives the parser watchdog and id-listener expiry.
//!
//! The engine is single-threaded and cooperative: the host must not
//! overlap calls into the same engine. The only shared resource is the
//! transmit path, guarded by a [`TxLock`] so a dispatch-triggered
//! response and an outside producer cannot interleave frame bytes.
//!
//! [`accept`]: Engine::accept
//! [`tick`]: Engine::tick
//!
//! # Request/response in one picture
//!
//! ```
//! use bytes::Bytes;
//! use framelink_core::Peer;
//! use framelink_protocol::{Engine, FrameConfig, ListenerResult, Message};
//!
//! let config = FrameConfig::default();
//! let mut master = Engine::new(config.clone(), Peer::Master, Vec::new()).unwrap();
//! let mut slave = Engine::new(config, Peer::Slave, Vec::new()).unwrap();
//!
//! // The slave answers every frame of type 0x10 in place.
//! slave.add_type_listener(0x10, Box::new(|tx, msg| {
//!     let mut reply = msg.clone();
//!     reply.payload = Bytes::from_static(b"!");
//!     tx.respond(&mut reply);
//!     ListenerResult::Stay
//! }));
//!
//! // The master asks and waits for the correlated reply.
//! let mut question = Message::new(0x10, Bytes::from_static(b"?"));
//! master.query(
//!     &mut question,
//!     Box::new(|_tx, reply| {
//!         assert_eq!(reply.payload.as_ref(), b"!");
//!         ListenerResult::Close
//!     }),
//!     None,
//!     5,
//! );
//!
//! // Shuttle the bytes across the "wire" in both directions.
//! let request = std::mem::take(master.sink_mut());
//! slave.accept(&request);
//! let response = std::mem::take(slave.sink_mut());
//! master.accept(&response);
//!
//! assert_eq!(master.active_id_listeners(), 0);
//! ```

use crate::config::FrameConfig;
use crate::frame::{Frame, Message};
use crate::listener::{
    FrameCallback, GenericListener, IdListener, ListenerResult, ListenerTables,
    TimeoutCallback, TypeListener,
};
use crate::parser::{Parser, ParserState};
use crate::transmit::{FrameSink, SoftLock, Transmitter, TxLock};
use bytes::Bytes;
use framelink_core::{Error, Peer, Result};
use tracing::{debug, trace};

/// One peer of a framed point-to-point link.
pub struct Engine<W, L = SoftLock> {
    parser: Parser,
    tx: Transmitter<W, L>,
    listeners: ListenerTables<W, L>,
}

impl<W: FrameSink> Engine<W, SoftLock> {
    /// Build an engine with the internal boolean transmit lock.
    ///
    /// # Errors
    /// Returns `Error::InvalidConfig` when the configuration is
    /// internally inconsistent (see [`FrameConfig::validate`]).
    pub fn new(config: FrameConfig, peer: Peer, sink: W) -> Result<Self> {
        Self::with_lock(config, peer, sink, SoftLock::default())
    }
}

impl<W: FrameSink, L: TxLock> Engine<W, L> {
    /// Build an engine with a host-provided transmit lock.
    ///
    /// # Errors
    /// Returns `Error::InvalidConfig` when the configuration is
    /// internally inconsistent.
    pub fn with_lock(config: FrameConfig, peer: Peer, sink: W, lock: L) -> Result<Self> {
        config.validate()?;
        Ok(Engine {
            parser: Parser::new(config.clone()),
            listeners: ListenerTables::new(
                config.id_listener_slots,
                config.type_listener_slots,
                config.generic_listener_slots,
            ),
            tx: Transmitter::new(config, peer, sink, lock),
        })
    }

    // ------------------------------------------------------------------
    // Receive path
    // ------------------------------------------------------------------

    /// Accept incoming bytes and dispatch every frame they complete.
    ///
    /// Listener callbacks run synchronously inside this call.
    pub fn accept(&mut self, bytes: &[u8]) {
        for &byte in bytes {
            self.accept_byte(byte);
        }
    }

    /// Accept a single incoming byte.
    pub fn accept_byte(&mut self, byte: u8) {
        if let Some(frame) = self.parser.accept_byte(byte) {
            self.dispatch(frame);
        }
    }

    /// Reset the frame parser; registered listeners are unaffected.
    pub fn reset_parser(&mut self) {
        self.parser.reset();
    }

    /// Advance time by one tick.
    ///
    /// Drives the parser watchdog and decrements every id listener
    /// registered with a timeout; expired listeners fire their timeout
    /// callback exactly once, in table scan order, and are removed.
    pub fn tick(&mut self) {
        self.parser.tick();

        let mut expired = false;
        for slot in 0..self.listeners.id_high_water {
            let timed_out = match self.listeners.id_slots[slot].as_mut() {
                Some(entry) if entry.initial_ticks > 0 && entry.remaining_ticks > 0 => {
                    entry.remaining_ticks -= 1;
                    entry.remaining_ticks == 0
                }
                _ => false,
            };
            if !timed_out {
                continue;
            }
            if let Some(mut entry) = self.listeners.id_slots[slot].take() {
                debug!(id = entry.id, "id listener expired");
                if let Some(on_timeout) = entry.on_timeout.as_mut() {
                    on_timeout(&mut self.tx);
                }
                expired = true;
            }
        }
        if expired {
            self.listeners.recount_id();
        }
    }

    // ------------------------------------------------------------------
    // Listener registration
    // ------------------------------------------------------------------

    /// Register a listener for replies carrying `id`.
    ///
    /// `timeout_ticks` of 0 keeps the listener until removed; otherwise
    /// `on_timeout` fires once after that many ticks without a matching
    /// frame and the slot is freed. Fails on a full table or when `id`
    /// is already being listened for.
    pub fn add_id_listener(
        &mut self,
        id: u32,
        on_frame: FrameCallback<W, L>,
        on_timeout: Option<TimeoutCallback<W, L>>,
        timeout_ticks: u32,
    ) -> bool {
        self.listeners.add_id(IdListener {
            id,
            on_frame,
            on_timeout,
            remaining_ticks: timeout_ticks,
            initial_ticks: timeout_ticks,
        })
    }

    /// Remove an id listener. A clean teardown: no callback fires.
    pub fn remove_id_listener(&mut self, id: u32) -> bool {
        self.listeners.remove_id(id)
    }

    /// Reload the timeout of a registered id listener from outside
    /// (the in-dispatch equivalent is returning [`ListenerResult::Renew`]).
    pub fn renew_id_listener(&mut self, id: u32) -> bool {
        self.listeners.renew_id(id)
    }

    /// Register a listener for every frame of `frame_type`.
    pub fn add_type_listener(&mut self, frame_type: u32, on_frame: FrameCallback<W, L>) -> bool {
        self.listeners.add_type(TypeListener {
            frame_type,
            on_frame,
        })
    }

    /// Remove the first listener registered for `frame_type`.
    pub fn remove_type_listener(&mut self, frame_type: u32) -> bool {
        self.listeners.remove_type(frame_type)
    }

    /// Register a fallback listener; returns its slot for removal.
    pub fn add_generic_listener(&mut self, on_frame: FrameCallback<W, L>) -> Option<usize> {
        self.listeners.add_generic(GenericListener { on_frame })
    }

    /// Remove a generic listener by the slot its registration returned.
    pub fn remove_generic_listener(&mut self, slot: usize) -> bool {
        self.listeners.remove_generic(slot)
    }

    // ------------------------------------------------------------------
    // Send path
    // ------------------------------------------------------------------

    /// Send a frame. The assigned id is stored back into `msg.id`.
    pub fn send(&mut self, msg: &mut Message) -> bool {
        self.tx.send(msg)
    }

    /// Send a frame of `frame_type` carrying `payload`.
    pub fn send_simple(&mut self, frame_type: u32, payload: &[u8]) -> bool {
        self.tx.send_simple(frame_type, payload)
    }

    /// Send a response to a received message, reusing its id.
    pub fn respond(&mut self, msg: &mut Message) -> bool {
        self.tx.respond(msg)
    }

    /// Send a frame and listen for the correlated reply.
    ///
    /// The listener slot is secured before any byte is composed, so a
    /// failed send never leaves an orphaned wait; conversely a full
    /// table fails the query before the frame goes out.
    pub fn query(
        &mut self,
        msg: &mut Message,
        on_reply: FrameCallback<W, L>,
        on_timeout: Option<TimeoutCallback<W, L>>,
        timeout_ticks: u32,
    ) -> bool {
        if !self.listeners.has_free_id_slot() {
            debug!(error = %Error::ListenerTableFull, "query rejected");
            return false;
        }
        if !self.tx.send(msg) {
            return false;
        }
        self.add_id_listener(msg.id, on_reply, on_timeout, timeout_ticks)
    }

    /// [`query`](Engine::query) without the message struct.
    pub fn query_simple(
        &mut self,
        frame_type: u32,
        payload: &[u8],
        on_reply: FrameCallback<W, L>,
        on_timeout: Option<TimeoutCallback<W, L>>,
        timeout_ticks: u32,
    ) -> bool {
        let mut msg = Message::new(frame_type, Bytes::copy_from_slice(payload));
        self.query(&mut msg, on_reply, on_timeout, timeout_ticks)
    }

    // ------------------------------------------------------------------
    // Multi-part send path
    // ------------------------------------------------------------------

    /// Open a multi-part frame declaring `len` payload bytes; the payload
    /// follows through [`multipart_payload`] and [`multipart_close`].
    ///
    /// [`multipart_payload`]: Engine::multipart_payload
    /// [`multipart_close`]: Engine::multipart_close
    pub fn send_multipart(&mut self, msg: &mut Message, len: u32) -> bool {
        self.tx.send_multipart(msg, len)
    }

    /// [`send_multipart`](Engine::send_multipart) without the struct.
    pub fn send_simple_multipart(&mut self, frame_type: u32, len: u32) -> bool {
        self.tx.send_simple_multipart(frame_type, len)
    }

    /// Open a multi-part response, reusing the incoming id.
    pub fn respond_multipart(&mut self, msg: &mut Message, len: u32) -> bool {
        self.tx.respond_multipart(msg, len)
    }

    /// Open a multi-part query and listen for the correlated reply.
    pub fn query_multipart(
        &mut self,
        msg: &mut Message,
        len: u32,
        on_reply: FrameCallback<W, L>,
        on_timeout: Option<TimeoutCallback<W, L>>,
        timeout_ticks: u32,
    ) -> bool {
        if !self.listeners.has_free_id_slot() {
            debug!(error = %Error::ListenerTableFull, "query rejected");
            return false;
        }
        if !self.tx.send_multipart(msg, len) {
            return false;
        }
        self.add_id_listener(msg.id, on_reply, on_timeout, timeout_ticks)
    }

    /// [`query_multipart`](Engine::query_multipart) without the struct.
    pub fn query_simple_multipart(
        &mut self,
        frame_type: u32,
        len: u32,
        on_reply: FrameCallback<W, L>,
        on_timeout: Option<TimeoutCallback<W, L>>,
        timeout_ticks: u32,
    ) -> bool {
        let mut msg = Message::new(frame_type, Bytes::new());
        self.query_multipart(&mut msg, len, on_reply, on_timeout, timeout_ticks)
    }

    /// Stream part of the payload of an open multi-part frame.
    pub fn multipart_payload(&mut self, bytes: &[u8]) {
        self.tx.multipart_payload(bytes);
    }

    /// Close the open multi-part frame and release the transmit lock.
    pub fn multipart_close(&mut self) {
        self.tx.multipart_close();
    }

    // ------------------------------------------------------------------
    // Diagnostics
    // ------------------------------------------------------------------

    /// Current parser state.
    #[must_use]
    pub fn parser_state(&self) -> ParserState {
        self.parser.state()
    }

    /// Link configuration.
    #[must_use]
    pub fn config(&self) -> &FrameConfig {
        self.tx.config()
    }

    /// Whether a multi-part composition currently holds the transmit lock.
    #[must_use]
    pub fn is_transmitting(&self) -> bool {
        self.tx.is_transmitting()
    }

    /// Number of registered id listeners.
    #[must_use]
    pub fn active_id_listeners(&self) -> usize {
        self.listeners.active_id()
    }

    /// Number of registered type listeners.
    #[must_use]
    pub fn active_type_listeners(&self) -> usize {
        self.listeners.active_type()
    }

    /// Number of registered generic listeners.
    #[must_use]
    pub fn active_generic_listeners(&self) -> usize {
        self.listeners.active_generic()
    }

    /// Borrow the write sink.
    #[must_use]
    pub fn sink(&self) -> &W {
        self.tx.sink()
    }

    /// Mutably borrow the write sink.
    pub fn sink_mut(&mut self) -> &mut W {
        self.tx.sink_mut()
    }

    // ------------------------------------------------------------------
    // Dispatch
    // ------------------------------------------------------------------

    /// Route a complete frame through the listener tables.
    ///
    /// Precedence: the matching id listener, else the first matching
    /// type listener, else every generic listener in insertion order.
    /// A `Next` verdict continues with the following tier.
    fn dispatch(&mut self, frame: Frame) {
        let msg = Message::from(frame);
        trace!(
            id = msg.id,
            frame_type = msg.frame_type,
            len = msg.len(),
            "dispatching frame"
        );

        if let Some(slot) = self.listeners.find_id(msg.id) {
            if let Some(mut entry) = self.listeners.id_slots[slot].take() {
                let verdict = (entry.on_frame)(&mut self.tx, &msg);
                match verdict {
                    ListenerResult::Close => self.listeners.recount_id(),
                    ListenerResult::Renew => {
                        entry.remaining_ticks = entry.initial_ticks;
                        self.listeners.id_slots[slot] = Some(entry);
                    }
                    ListenerResult::Stay | ListenerResult::Next => {
                        self.listeners.id_slots[slot] = Some(entry);
                    }
                }
                if verdict != ListenerResult::Next {
                    return;
                }
            }
        }

        if let Some(slot) = self.listeners.find_type(msg.frame_type) {
            if let Some(mut entry) = self.listeners.type_slots[slot].take() {
                let verdict = (entry.on_frame)(&mut self.tx, &msg);
                if verdict == ListenerResult::Close {
                    self.listeners.recount_type();
                } else {
                    self.listeners.type_slots[slot] = Some(entry);
                }
                if verdict != ListenerResult::Next {
                    return;
                }
            }
        }

        for slot in 0..self.listeners.generic_high_water {
            let Some(mut entry) = self.listeners.generic_slots[slot].take() else {
                continue;
            };
            let verdict = (entry.on_frame)(&mut self.tx, &msg);
            if verdict == ListenerResult::Close {
                self.listeners.recount_generic();
            } else {
                self.listeners.generic_slots[slot] = Some(entry);
            }
            if verdict != ListenerResult::Next {
                return;
            }
        }

        trace!(id = msg.id, "frame not consumed by any listener");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    fn engine() -> Engine<Vec<u8>, SoftLock> {
        Engine::new(FrameConfig::default(), Peer::Master, Vec::new()).unwrap()
    }

    /// Send a frame on `from` and feed the bytes into `to`.
    fn shuttle(from: &mut Engine<Vec<u8>, SoftLock>, to: &mut Engine<Vec<u8>, SoftLock>) {
        let bytes = std::mem::take(from.sink_mut());
        to.accept(&bytes);
    }

    #[test]
    fn test_loopback_dispatches_to_type_listener() {
        let mut sender = engine();
        let mut receiver = Engine::new(FrameConfig::default(), Peer::Slave, Vec::new()).unwrap();

        let hits = Rc::new(Cell::new(0));
        let seen = Rc::clone(&hits);
        receiver.add_type_listener(
            0x22,
            Box::new(move |_tx, msg| {
                assert_eq!(msg.payload.as_ref(), b"AB");
                seen.set(seen.get() + 1);
                ListenerResult::Stay
            }),
        );

        assert!(sender.send_simple(0x22, b"AB"));
        shuttle(&mut sender, &mut receiver);
        assert_eq!(hits.get(), 1);
    }

    #[test]
    fn test_id_listener_takes_precedence_over_type() {
        let mut sender = engine();
        let mut receiver = Engine::new(FrameConfig::default(), Peer::Slave, Vec::new()).unwrap();

        let order = Rc::new(Cell::new(0u8));

        let by_id = Rc::clone(&order);
        let mut msg = Message::new(0x22, Bytes::from_static(b"x"));
        assert!(sender.send(&mut msg));
        receiver.add_id_listener(
            msg.id,
            Box::new(move |_tx, _msg| {
                by_id.set(by_id.get() | 1);
                ListenerResult::Close
            }),
            None,
            0,
        );

        let by_type = Rc::clone(&order);
        receiver.add_type_listener(
            0x22,
            Box::new(move |_tx, _msg| {
                by_type.set(by_type.get() | 2);
                ListenerResult::Stay
            }),
        );

        shuttle(&mut sender, &mut receiver);
        assert_eq!(order.get(), 1, "type listener must not run");
        assert_eq!(receiver.active_id_listeners(), 0, "CLOSE frees the slot");
    }

    #[test]
    fn test_next_falls_through_all_tiers() {
        let mut sender = engine();
        let mut receiver = Engine::new(FrameConfig::default(), Peer::Slave, Vec::new()).unwrap();

        let trail = Rc::new(Cell::new(0u8));

        let mut msg = Message::new(0x22, Bytes::from_static(b"x"));
        assert!(sender.send(&mut msg));

        let t = Rc::clone(&trail);
        receiver.add_id_listener(
            msg.id,
            Box::new(move |_tx, _msg| {
                t.set(t.get() | 1);
                ListenerResult::Next
            }),
            None,
            0,
        );
        let t = Rc::clone(&trail);
        receiver.add_type_listener(
            0x22,
            Box::new(move |_tx, _msg| {
                t.set(t.get() | 2);
                ListenerResult::Next
            }),
        );
        let t = Rc::clone(&trail);
        receiver.add_generic_listener(Box::new(move |_tx, _msg| {
            t.set(t.get() | 4);
            ListenerResult::Stay
        }));

        shuttle(&mut sender, &mut receiver);
        assert_eq!(trail.get(), 0b111);
        // NEXT from the id listener leaves its slot registered.
        assert_eq!(receiver.active_id_listeners(), 1);
    }

    #[test]
    fn test_timeout_fires_exactly_once() {
        let mut engine = engine();

        let fired = Rc::new(Cell::new(0));
        let counter = Rc::clone(&fired);
        assert!(engine.query_simple(
            0x10,
            b"?",
            Box::new(|_tx, _msg| ListenerResult::Close),
            Some(Box::new(move |_tx| counter.set(counter.get() + 1))),
            3,
        ));

        engine.tick();
        engine.tick();
        assert_eq!(fired.get(), 0);
        engine.tick();
        assert_eq!(fired.get(), 1);
        assert_eq!(engine.active_id_listeners(), 0);

        // A fourth tick is a no-op for the freed slot.
        engine.tick();
        assert_eq!(fired.get(), 1);
    }

    #[test]
    fn test_removal_is_a_clean_teardown() {
        let mut engine = engine();

        let fired = Rc::new(Cell::new(0));
        let counter = Rc::clone(&fired);
        let mut msg = Message::new(0x10, Bytes::from_static(b"?"));
        assert!(engine.query(
            &mut msg,
            Box::new(|_tx, _msg| ListenerResult::Close),
            Some(Box::new(move |_tx| counter.set(counter.get() + 1))),
            3,
        ));

        assert!(engine.remove_id_listener(msg.id));
        for _ in 0..5 {
            engine.tick();
        }
        assert_eq!(fired.get(), 0, "removal must not fire the timeout");
    }

    #[test]
    fn test_renew_from_callback_reloads_timeout() {
        let mut sender = engine();
        let mut receiver = Engine::new(FrameConfig::default(), Peer::Slave, Vec::new()).unwrap();

        let mut msg = Message::new(0x22, Bytes::from_static(b"x"));
        assert!(sender.send(&mut msg));
        receiver.add_id_listener(
            msg.id,
            Box::new(|_tx, _msg| ListenerResult::Renew),
            None,
            3,
        );

        receiver.tick();
        receiver.tick();
        shuttle(&mut sender, &mut receiver); // Renew with 1 tick left
        receiver.tick();
        receiver.tick();
        assert_eq!(receiver.active_id_listeners(), 1);
        receiver.tick();
        assert_eq!(receiver.active_id_listeners(), 0);
    }

    #[test]
    fn test_query_fails_cleanly_when_table_full() {
        let config = FrameConfig::default().with_listener_slots(1, 1, 1);
        let mut engine = Engine::new(config, Peer::Master, Vec::new()).unwrap();

        assert!(engine.query_simple(
            0x10,
            b"a",
            Box::new(|_tx, _msg| ListenerResult::Close),
            None,
            0,
        ));
        engine.sink_mut().clear();

        // Second query: no slot, nothing composed.
        assert!(!engine.query_simple(
            0x10,
            b"b",
            Box::new(|_tx, _msg| ListenerResult::Close),
            None,
            0,
        ));
        assert!(engine.sink().is_empty());
    }

    #[test]
    fn test_respond_from_inside_callback() {
        let mut master = engine();
        let mut slave = Engine::new(FrameConfig::default(), Peer::Slave, Vec::new()).unwrap();

        slave.add_type_listener(
            0x10,
            Box::new(|tx, msg| {
                let mut reply = msg.clone();
                reply.payload = Bytes::from_static(b"pong");
                assert!(tx.respond(&mut reply));
                ListenerResult::Stay
            }),
        );

        let reply_payload = Rc::new(Cell::new(None::<Vec<u8>>));
        let got = Rc::clone(&reply_payload);
        let mut msg = Message::new(0x10, Bytes::from_static(b"ping"));
        assert!(master.query(
            &mut msg,
            Box::new(move |_tx, reply| {
                got.set(Some(reply.payload.to_vec()));
                ListenerResult::Close
            }),
            None,
            5,
        ));
        let query_id = msg.id;

        shuttle(&mut master, &mut slave);
        shuttle(&mut slave, &mut master);

        assert_eq!(reply_payload.take().as_deref(), Some(&b"pong"[..]));
        assert_eq!(master.active_id_listeners(), 0);
        assert_eq!(query_id & 0x80, 0x80, "master ids carry the role bit");
    }
}
