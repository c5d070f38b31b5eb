//! Tokio codec for Framelink frames.
//!
//! `FramelinkCodec` bridges the framing layer to async byte streams
//! through Tokio's [`Decoder`]/[`Encoder`] traits, so a socket or serial
//! port wrapped in `Framed` speaks whole [`Frame`]s. It reuses the same
//! incremental [`Parser`] as the engine and the same wire encoding, but
//! performs no dispatch: correlation and listeners remain the engine's
//! business. Use the codec when a host wants framing only, for example
//! to forward frames between transports.
//!
//! # Usage with Tokio Framed
//!
//! ```no_run
//! use futures::{SinkExt, StreamExt};
//! use tokio_util::codec::Framed;
//! use framelink_protocol::{Frame, FramelinkCodec};
//!
//! # async fn example() -> framelink_core::Result<()> {
//! # let stream = tokio::io::duplex(64).0;
//! let mut framed = Framed::new(stream, FramelinkCodec::new());
//!
//! framed.send(Frame::new(0x80, 0x22, &b"AB"[..])).await?;
//! if let Some(frame) = framed.next().await {
//!     println!("received: {}", frame?);
//! }
//! # Ok(())
//! # }
//! ```

use crate::config::FrameConfig;
use crate::frame::Frame;
use crate::parser::Parser;
use crate::wire;
use bytes::BytesMut;
use framelink_core::{Error, Result};
use tokio_util::codec::{Decoder, Encoder};

/// Tokio codec speaking the Framelink wire format.
///
/// Both ends of a stream must use codecs built from the same
/// [`FrameConfig`], exactly like two engines sharing a link.
#[derive(Debug)]
pub struct FramelinkCodec {
    parser: Parser,
    config: FrameConfig,
}

impl FramelinkCodec {
    /// Codec with the default frame format.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(FrameConfig::default())
    }

    /// Codec with an explicit frame format.
    #[must_use]
    pub fn with_config(config: FrameConfig) -> Self {
        FramelinkCodec {
            parser: Parser::new(config.clone()),
            config,
        }
    }

    /// The frame format this codec was built with.
    #[must_use]
    pub fn config(&self) -> &FrameConfig {
        &self.config
    }
}

impl Default for FramelinkCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for FramelinkCodec {
    type Item = Frame;
    type Error = Error;

    /// Extract the next complete frame from the stream buffer.
    ///
    /// Damaged frames are dropped by the parser, never surfaced as
    /// errors: the stream resynchronizes on the next start-of-frame
    /// marker, matching the engine's behavior on a noisy transport.
    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Frame>> {
        let mut consumed = src.len();
        let mut decoded = None;
        for (i, &byte) in src.iter().enumerate() {
            if let Some(frame) = self.parser.accept_byte(byte) {
                consumed = i + 1;
                decoded = Some(frame);
                break;
            }
        }
        let _ = src.split_to(consumed);
        Ok(decoded)
    }
}

impl Encoder<Frame> for FramelinkCodec {
    type Error = Error;

    /// Encode a frame, including checksums, into the stream buffer.
    ///
    /// # Errors
    /// Returns [`Error::FrameTooLarge`] or [`Error::FieldOverflow`] when
    /// the frame does not fit the configured field widths.
    fn encode(&mut self, frame: Frame, dst: &mut BytesMut) -> Result<()> {
        wire::encode_frame(&self.config, &frame, dst)
    }
}
