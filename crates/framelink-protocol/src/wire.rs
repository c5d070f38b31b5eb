//! Big-endian wire integers and whole-frame encoding.
//!
//! Frame fields are unsigned integers of 1, 2 or 4 bytes, most
//! significant byte first. The incremental decode lives in the parser
//! (`acc = (acc << 8) | byte`); this module owns the encode direction
//! plus a standalone whole-frame encoder shared by the tokio codec
//! adapter and the tests.

use crate::config::FrameConfig;
use crate::frame::Frame;
use bytes::{BufMut, BytesMut};
use framelink_core::{Error, FieldWidth, Result};

/// Encode `value` big-endian into `nbytes` bytes.
///
/// Returns a fixed array plus the number of significant leading bytes;
/// callers slice with `&buf[..n]`. Values wider than `nbytes` are
/// truncated to the low bytes, so range checks belong to the caller.
pub(crate) fn uint_be(value: u32, nbytes: usize) -> ([u8; 4], usize) {
    let raw = value.to_be_bytes();
    let mut out = [0u8; 4];
    out[..nbytes].copy_from_slice(&raw[4 - nbytes..]);
    (out, nbytes)
}

/// Encode a whole frame into `dst` per the link configuration.
///
/// This is the single-buffer sibling of the engine's streaming composer:
/// same wire bytes, but the caller provides the output buffer and no
/// transmit lock is involved. Used by the `Encoder` half of
/// [`FramelinkCodec`] and anywhere a frame needs encoding without an
/// engine.
///
/// # Errors
/// - [`Error::FrameTooLarge`] when the payload length does not fit the
///   configured length field.
/// - [`Error::FieldOverflow`] when the id or type does not fit its
///   configured width.
///
/// [`FramelinkCodec`]: crate::codec::FramelinkCodec
pub fn encode_frame(config: &FrameConfig, frame: &Frame, dst: &mut BytesMut) -> Result<()> {
    let len = frame.payload.len();
    if !config.len_width.fits(u32::try_from(len).unwrap_or(u32::MAX)) {
        return Err(Error::FrameTooLarge {
            size: len,
            max_size: config.len_width.max_value() as usize,
        });
    }
    check_fits(frame.id, config.id_width)?;
    check_fits(frame.frame_type, config.type_width)?;

    dst.reserve(config.frame_overhead() + len);

    let kind = &config.checksum;
    let mut header_cksum = kind.start();
    if let Some(sof) = config.sof {
        dst.put_u8(sof);
        kind.update(&mut header_cksum, &[sof]);
    }
    for (value, width) in [
        (frame.id, config.id_width),
        (len as u32, config.len_width),
        (frame.frame_type, config.type_width),
    ] {
        let (buf, n) = uint_be(value, width.as_usize());
        dst.put_slice(&buf[..n]);
        kind.update(&mut header_cksum, &buf[..n]);
    }
    if kind.is_enabled() {
        let (buf, n) = uint_be(kind.finalize(header_cksum), kind.width());
        dst.put_slice(&buf[..n]);
    }

    if len > 0 {
        dst.put_slice(&frame.payload);
        if kind.is_enabled() {
            let (buf, n) = uint_be(kind.compute(&frame.payload), kind.width());
            dst.put_slice(&buf[..n]);
        }
    }
    Ok(())
}

fn check_fits(value: u32, width: FieldWidth) -> Result<()> {
    if width.fits(value) {
        Ok(())
    } else {
        Err(Error::FieldOverflow {
            value,
            width: width.as_usize(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checksum::ChecksumKind;
    use bytes::Bytes;
    use rstest::rstest;

    #[rstest]
    #[case(0x00, 1, &[0x00])]
    #[case(0xAB, 1, &[0xAB])]
    #[case(0xABCD, 2, &[0xAB, 0xCD])]
    #[case(0x0102, 2, &[0x01, 0x02])]
    #[case(0xDEADBEEF, 4, &[0xDE, 0xAD, 0xBE, 0xEF])]
    fn test_uint_be(#[case] value: u32, #[case] nbytes: usize, #[case] expected: &[u8]) {
        let (buf, n) = uint_be(value, nbytes);
        assert_eq!(&buf[..n], expected);
    }

    #[test]
    fn test_encode_frame_layout_without_checksum() {
        // id 1B, len 2B, type 1B, no checksum, SOF 0x01
        let config = FrameConfig::default().with_checksum(ChecksumKind::None);
        let frame = Frame::new(0x81, 0x22, Bytes::from_static(b"AB"));

        let mut dst = BytesMut::new();
        encode_frame(&config, &frame, &mut dst).unwrap();

        assert_eq!(&dst[..], &[0x01, 0x81, 0x00, 0x02, 0x22, 0x41, 0x42]);
    }

    #[test]
    fn test_encode_empty_frame_has_no_data_checksum() {
        let config = FrameConfig::default();
        let frame = Frame::new(0x80, 0x05, Bytes::new());

        let mut dst = BytesMut::new();
        encode_frame(&config, &frame, &mut dst).unwrap();

        // SOF + id + len + type + header checksum, nothing after.
        assert_eq!(dst.len(), 1 + 1 + 2 + 1 + 2);
    }

    #[test]
    fn test_encode_rejects_oversized_payload() {
        let config = FrameConfig::default().with_len_width(framelink_core::FieldWidth::One);
        let frame = Frame::new(0x80, 0x05, Bytes::from(vec![0u8; 300]));

        let mut dst = BytesMut::new();
        let err = encode_frame(&config, &frame, &mut dst).unwrap_err();
        assert!(matches!(err, Error::FrameTooLarge { size: 300, .. }));
    }

    #[test]
    fn test_encode_rejects_wide_type() {
        let config = FrameConfig::default();
        let frame = Frame::new(0x80, 0x1234, Bytes::new());

        let mut dst = BytesMut::new();
        let err = encode_frame(&config, &frame, &mut dst).unwrap_err();
        assert!(matches!(err, Error::FieldOverflow { value: 0x1234, .. }));
    }
}
