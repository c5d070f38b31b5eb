//! Shared helpers for the protocol integration tests.

use framelink_core::Peer;
use framelink_protocol::{Engine, FrameConfig, FrameSink, SoftLock};
use std::cell::RefCell;
use std::rc::Rc;

/// Byte sink shared between a test and the engine that owns it.
///
/// Cloning shares the underlying buffer, so the test keeps a handle to
/// the bytes an engine writes.
#[derive(Clone, Default)]
pub struct SharedSink(Rc<RefCell<Vec<u8>>>);

impl SharedSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drain and return everything written so far.
    pub fn take(&self) -> Vec<u8> {
        self.0.borrow_mut().drain(..).collect()
    }
}

impl FrameSink for SharedSink {
    fn write_bytes(&mut self, bytes: &[u8]) {
        self.0.borrow_mut().extend_from_slice(bytes);
    }
}

/// Engine plus a handle to its outbound bytes.
pub fn engine(config: FrameConfig, peer: Peer) -> (Engine<SharedSink, SoftLock>, SharedSink) {
    let sink = SharedSink::new();
    let engine = Engine::new(config, peer, sink.clone()).expect("valid test configuration");
    (engine, sink)
}

/// Move every byte `from` has written into `to`'s parser.
pub fn shuttle(from: &SharedSink, to: &mut Engine<SharedSink, SoftLock>) {
    let bytes = from.take();
    to.accept(&bytes);
}
