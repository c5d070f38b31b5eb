//! Incremental frame parser.
//!
//! The parser is a strict byte-driven state machine: every arriving byte
//! advances it by at most one transition, and at most one frame completes
//! per byte (the byte that finishes it). It never returns errors to the
//! byte source; a damaged frame is logged, dropped and the machine
//! resynchronizes on the next start-of-frame marker.
//!
//! # State Machine
//!
//! ```text
//! AwaitingSof -> ReadingId -> ReadingLen -> ReadingType
//!                                               |
//!                  ,---------------------------'
//!                  v
//!          ReadingHeaderChecksum -> ReadingData -> ReadingDataChecksum
//!                  |    (len == 0)        |              |
//!                  '-> frame complete     '--------------'-> frame complete
//! ```
//!
//! With checksums disabled the two checksum states are skipped; with the
//! SOF marker disabled the machine idles in `ReadingId` instead of
//! `AwaitingSof`.
//!
//! A watchdog counter, reloaded by every byte and decremented by
//! [`Parser::tick`], abandons partially received frames so that a burst
//! of line noise cannot wedge the machine between frames.

use crate::checksum::ChecksumState;
use crate::config::FrameConfig;
use crate::frame::Frame;
use bytes::Bytes;
use framelink_core::Error;
use tracing::{debug, trace, warn};

/// State of the parser state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParserState {
    /// Discarding bytes until the start-of-frame marker arrives.
    AwaitingSof,
    /// Accumulating the frame id field.
    ReadingId,
    /// Accumulating the payload length field.
    ReadingLen,
    /// Accumulating the frame type field.
    ReadingType,
    /// Accumulating the reference header checksum.
    ReadingHeaderChecksum,
    /// Receiving payload bytes.
    ReadingData,
    /// Accumulating the reference payload checksum.
    ReadingDataChecksum,
}

/// Byte-driven frame parser.
///
/// Feed it bytes with [`accept_byte`]; a `Some(Frame)` return is a
/// complete, checksum-verified frame. Drive [`tick`] from the host's
/// periodic timer to expire stalled partial frames.
///
/// # Example
/// ```
/// use framelink_protocol::{ChecksumKind, FrameConfig, Parser};
///
/// let config = FrameConfig::default().with_checksum(ChecksumKind::None);
/// let mut parser = Parser::new(config);
///
/// // SOF, id 0x80, len 0x0002, type 0x22, payload "AB"
/// let mut frames = Vec::new();
/// for byte in [0x01, 0x80, 0x00, 0x02, 0x22, 0x41, 0x42] {
///     frames.extend(parser.accept_byte(byte));
/// }
/// assert_eq!(frames.len(), 1);
/// assert_eq!(frames[0].payload.as_ref(), b"AB");
/// ```
///
/// [`accept_byte`]: Parser::accept_byte
/// [`tick`]: Parser::tick
#[derive(Debug)]
pub struct Parser {
    config: FrameConfig,

    state: ParserState,

    /// Accumulator for the multi-byte field currently being read.
    acc: u32,

    /// Byte counter toward completing the current field or payload.
    rxi: usize,

    /// Decoded fields of the frame in progress.
    frame_id: u32,
    frame_len: u32,
    frame_type: u32,

    /// Payload collected so far (unused while discarding).
    payload: Vec<u8>,

    /// Running checksum of the region currently being read.
    cksum: ChecksumState,

    /// Locally computed checksum, compared against the reference.
    computed_cksum: u32,

    /// Reference checksum accumulated from the wire.
    ref_cksum: u32,

    /// Payload exceeds capacity: consume the frame but drop it.
    discard: bool,

    /// Ticks left before a partial frame is abandoned.
    watchdog: u32,
}

impl Parser {
    /// Create a parser for the given link configuration.
    pub fn new(config: FrameConfig) -> Self {
        let mut parser = Parser {
            state: ParserState::AwaitingSof,
            acc: 0,
            rxi: 0,
            frame_id: 0,
            frame_len: 0,
            frame_type: 0,
            payload: Vec::with_capacity(config.rx_capacity),
            cksum: ChecksumState::None,
            computed_cksum: 0,
            ref_cksum: 0,
            discard: false,
            watchdog: config.parser_timeout_ticks,
            config,
        };
        parser.reset();
        parser
    }

    /// Current state of the machine.
    #[must_use]
    pub fn state(&self) -> ParserState {
        self.state
    }

    /// Whether a frame is partially received.
    #[must_use]
    pub fn mid_frame(&self) -> bool {
        self.state != self.entry_state() || self.rxi != 0
    }

    /// Reset the state machine, dropping any partial frame.
    ///
    /// Listener state is unaffected; this only concerns the byte stream.
    pub fn reset(&mut self) {
        self.state = self.entry_state();
        self.acc = 0;
        self.rxi = 0;
        self.frame_id = 0;
        self.frame_len = 0;
        self.frame_type = 0;
        self.payload.clear();
        self.cksum = self.config.checksum.start();
        self.computed_cksum = 0;
        self.ref_cksum = 0;
        self.discard = false;
    }

    /// Advance the watchdog by one tick.
    ///
    /// When the configured number of ticks elapses without a byte while a
    /// frame is partially received, the parser silently resets; the next
    /// valid byte begins a fresh frame.
    pub fn tick(&mut self) {
        if self.config.parser_timeout_ticks == 0 || !self.mid_frame() {
            return;
        }
        if self.watchdog > 0 {
            self.watchdog -= 1;
        }
        if self.watchdog == 0 {
            trace!("partial frame timed out, resetting parser");
            self.reset();
        }
    }

    /// Process one received byte.
    ///
    /// Returns the completed frame when `byte` is the one that finishes
    /// it. Checksum failures and oversized frames return `None` and reset
    /// the machine.
    pub fn accept_byte(&mut self, byte: u8) -> Option<Frame> {
        self.watchdog = self.config.parser_timeout_ticks;

        match self.state {
            ParserState::AwaitingSof => {
                if self.config.sof == Some(byte) {
                    self.cksum = self.config.checksum.start();
                    self.config.checksum.update(&mut self.cksum, &[byte]);
                    self.acc = 0;
                    self.rxi = 0;
                    self.state = ParserState::ReadingId;
                }
                None
            }
            ParserState::ReadingId => {
                self.accumulate_header_byte(byte);
                if self.rxi == self.config.id_width.as_usize() {
                    self.frame_id = self.acc;
                    self.begin_field(ParserState::ReadingLen);
                }
                None
            }
            ParserState::ReadingLen => {
                self.accumulate_header_byte(byte);
                if self.rxi == self.config.len_width.as_usize() {
                    self.frame_len = self.acc;
                    self.begin_field(ParserState::ReadingType);
                }
                None
            }
            ParserState::ReadingType => {
                self.accumulate_header_byte(byte);
                if self.rxi == self.config.type_width.as_usize() {
                    self.frame_type = self.acc;
                    self.begin_field(ParserState::ReadingHeaderChecksum);
                    if self.config.checksum.is_enabled() {
                        let state =
                            std::mem::replace(&mut self.cksum, ChecksumState::None);
                        self.computed_cksum = self.config.checksum.finalize(state);
                        self.ref_cksum = 0;
                        None
                    } else if self.frame_len == 0 {
                        self.complete_frame()
                    } else {
                        self.begin_data();
                        None
                    }
                } else {
                    None
                }
            }
            ParserState::ReadingHeaderChecksum => {
                self.ref_cksum = (self.ref_cksum << 8) | u32::from(byte);
                self.rxi += 1;
                if self.rxi < self.config.checksum.width() {
                    return None;
                }
                if self.ref_cksum != self.computed_cksum {
                    let error = Error::HeaderChecksumMismatch {
                        expected: self.computed_cksum,
                        actual: self.ref_cksum,
                    };
                    debug!(%error, "dropping frame");
                    self.reset();
                    None
                } else if self.frame_len == 0 {
                    self.complete_frame()
                } else {
                    self.begin_data();
                    None
                }
            }
            ParserState::ReadingData => {
                if !self.discard {
                    self.payload.push(byte);
                }
                self.config.checksum.update(&mut self.cksum, &[byte]);
                self.rxi += 1;
                if self.rxi < self.frame_len as usize {
                    return None;
                }
                if self.config.checksum.is_enabled() {
                    let state = std::mem::replace(&mut self.cksum, ChecksumState::None);
                    self.computed_cksum = self.config.checksum.finalize(state);
                    self.ref_cksum = 0;
                    self.rxi = 0;
                    self.state = ParserState::ReadingDataChecksum;
                    None
                } else {
                    self.complete_frame()
                }
            }
            ParserState::ReadingDataChecksum => {
                self.ref_cksum = (self.ref_cksum << 8) | u32::from(byte);
                self.rxi += 1;
                if self.rxi < self.config.checksum.width() {
                    return None;
                }
                if self.ref_cksum != self.computed_cksum {
                    let error = Error::PayloadChecksumMismatch {
                        expected: self.computed_cksum,
                        actual: self.ref_cksum,
                    };
                    debug!(%error, "dropping frame");
                    self.reset();
                    None
                } else {
                    self.complete_frame()
                }
            }
        }
    }

    fn entry_state(&self) -> ParserState {
        if self.config.sof.is_some() {
            ParserState::AwaitingSof
        } else {
            ParserState::ReadingId
        }
    }

    /// Fold a header byte into the running checksum and the accumulator.
    fn accumulate_header_byte(&mut self, byte: u8) {
        self.config.checksum.update(&mut self.cksum, &[byte]);
        self.acc = (self.acc << 8) | u32::from(byte);
        self.rxi += 1;
    }

    fn begin_field(&mut self, next: ParserState) {
        self.acc = 0;
        self.rxi = 0;
        self.state = next;
    }

    fn begin_data(&mut self) {
        self.discard = self.frame_len as usize > self.config.rx_capacity;
        if self.discard {
            warn!(
                len = self.frame_len,
                capacity = self.config.rx_capacity,
                "payload exceeds receive capacity, frame will be dropped"
            );
        }
        self.payload.clear();
        self.cksum = self.config.checksum.start();
        self.rxi = 0;
        self.state = ParserState::ReadingData;
    }

    fn complete_frame(&mut self) -> Option<Frame> {
        let frame = if self.discard {
            None
        } else {
            Some(Frame {
                id: self.frame_id,
                frame_type: self.frame_type,
                payload: Bytes::copy_from_slice(&self.payload),
            })
        };
        self.reset();
        frame
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checksum::ChecksumKind;
    use crate::wire::encode_frame;
    use bytes::BytesMut;
    use framelink_core::FieldWidth;

    fn encode(config: &FrameConfig, frame: &Frame) -> Vec<u8> {
        let mut dst = BytesMut::new();
        encode_frame(config, frame, &mut dst).unwrap();
        dst.to_vec()
    }

    fn feed(parser: &mut Parser, bytes: &[u8]) -> Vec<Frame> {
        bytes.iter().filter_map(|&b| parser.accept_byte(b)).collect()
    }

    #[test]
    fn test_new_parser_awaits_sof() {
        let parser = Parser::new(FrameConfig::default());
        assert_eq!(parser.state(), ParserState::AwaitingSof);
        assert!(!parser.mid_frame());
    }

    #[test]
    fn test_sofless_parser_idles_in_reading_id() {
        let parser = Parser::new(FrameConfig::default().without_sof());
        assert_eq!(parser.state(), ParserState::ReadingId);
        assert!(!parser.mid_frame());
    }

    #[test]
    fn test_complete_frame_byte_by_byte() {
        let config = FrameConfig::default();
        let mut parser = Parser::new(config.clone());

        let frame = Frame::new(0x81, 0x22, Bytes::from_static(b"AB"));
        let frames = feed(&mut parser, &encode(&config, &frame));

        assert_eq!(frames, vec![frame]);
        assert_eq!(parser.state(), ParserState::AwaitingSof);
    }

    #[test]
    fn test_zero_length_frame_completes_without_data_phase() {
        let config = FrameConfig::default();
        let mut parser = Parser::new(config.clone());

        let frame = Frame::new(0x80, 0x05, Bytes::new());
        let frames = feed(&mut parser, &encode(&config, &frame));

        assert_eq!(frames.len(), 1);
        assert!(frames[0].is_empty());
    }

    #[test]
    fn test_garbage_before_sof_is_skipped() {
        let config = FrameConfig::default();
        let mut parser = Parser::new(config.clone());

        let frame = Frame::new(0x81, 0x22, Bytes::from_static(b"AB"));
        let mut stream = vec![0xFF, 0x55, 0xAA];
        stream.extend(encode(&config, &frame));

        let frames = feed(&mut parser, &stream);
        assert_eq!(frames, vec![frame]);
    }

    #[test]
    fn test_corrupt_header_checksum_drops_frame() {
        let config = FrameConfig::default();
        let mut parser = Parser::new(config.clone());

        let frame = Frame::new(0x81, 0x22, Bytes::from_static(b"AB"));
        let mut bytes = encode(&config, &frame);
        bytes[1] ^= 0x40; // corrupt the id field

        assert!(feed(&mut parser, &bytes).is_empty());

        // A clean frame right after is parsed normally.
        let frames = feed(&mut parser, &encode(&config, &frame));
        assert_eq!(frames, vec![frame]);
    }

    #[test]
    fn test_corrupt_payload_drops_frame() {
        let config = FrameConfig::default();
        let mut parser = Parser::new(config.clone());

        let frame = Frame::new(0x81, 0x22, Bytes::from_static(b"AB"));
        let mut bytes = encode(&config, &frame);
        let payload_at = config.header_len();
        bytes[payload_at] ^= 0x01;

        assert!(feed(&mut parser, &bytes).is_empty());
        assert_eq!(parser.state(), ParserState::AwaitingSof);
    }

    #[test]
    fn test_oversize_frame_is_consumed_but_not_emitted() {
        let config = FrameConfig::default().with_rx_capacity(8);
        let mut parser = Parser::new(config.clone());

        // Encoder-side config without the rx limit, to build the big frame.
        let big = Frame::new(0x80, 0x07, Bytes::from(vec![0x5Au8; 64]));
        assert!(feed(&mut parser, &encode(&FrameConfig::default(), &big)).is_empty());
        assert!(!parser.mid_frame());

        // The stream is still in sync afterwards.
        let small = Frame::new(0x81, 0x07, Bytes::from_static(b"ok"));
        let frames = feed(&mut parser, &encode(&config, &small));
        assert_eq!(frames, vec![small]);
    }

    #[test]
    fn test_watchdog_abandons_partial_frame() {
        let config = FrameConfig::default().with_parser_timeout(3);
        let mut parser = Parser::new(config);

        parser.accept_byte(0x01);
        parser.accept_byte(0x81);
        assert!(parser.mid_frame());

        parser.tick();
        parser.tick();
        assert!(parser.mid_frame());
        parser.tick();
        assert!(!parser.mid_frame());
        assert_eq!(parser.state(), ParserState::AwaitingSof);
    }

    #[test]
    fn test_watchdog_reloads_on_byte_arrival() {
        let config = FrameConfig::default().with_parser_timeout(2);
        let mut parser = Parser::new(config);

        parser.accept_byte(0x01);
        parser.tick();
        parser.accept_byte(0x81); // reloads the watchdog
        parser.tick();
        assert!(parser.mid_frame());
        parser.tick();
        assert!(!parser.mid_frame());
    }

    #[test]
    fn test_watchdog_idle_is_a_no_op() {
        let mut parser = Parser::new(FrameConfig::default().with_parser_timeout(1));
        for _ in 0..5 {
            parser.tick();
        }
        assert_eq!(parser.state(), ParserState::AwaitingSof);
    }

    #[test]
    fn test_reset_drops_partial_frame() {
        let config = FrameConfig::default();
        let mut parser = Parser::new(config.clone());

        parser.accept_byte(0x01);
        parser.accept_byte(0x81);
        parser.reset();
        assert!(!parser.mid_frame());

        let frame = Frame::new(0x82, 0x22, Bytes::from_static(b"x"));
        let frames = feed(&mut parser, &encode(&config, &frame));
        assert_eq!(frames, vec![frame]);
    }

    #[test]
    fn test_back_to_back_frames() {
        let config = FrameConfig::default().with_checksum(ChecksumKind::Xor8);
        let mut parser = Parser::new(config.clone());

        let first = Frame::new(0x80, 0x10, Bytes::from_static(b"one"));
        let second = Frame::new(0x81, 0x11, Bytes::from_static(b"two"));
        let mut stream = encode(&config, &first);
        stream.extend(encode(&config, &second));

        let frames = feed(&mut parser, &stream);
        assert_eq!(frames, vec![first, second]);
    }

    #[test]
    fn test_wide_fields_roundtrip() {
        let config = FrameConfig::default()
            .with_id_width(FieldWidth::Four)
            .with_type_width(FieldWidth::Two)
            .with_checksum(ChecksumKind::Crc32);
        let mut parser = Parser::new(config.clone());

        let frame = Frame::new(0x8000_1234, 0x0102, Bytes::from_static(b"payload"));
        let frames = feed(&mut parser, &encode(&config, &frame));
        assert_eq!(frames, vec![frame]);
    }
}
