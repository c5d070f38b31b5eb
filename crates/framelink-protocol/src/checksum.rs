//! Rolling checksums over frame header and payload regions.
//!
//! A frame carries up to two independent checksums: one over the header
//! (SOF through the type field) and one over the payload. Both use the
//! same algorithm, selected once per engine through [`FrameConfig`]; the
//! peers of a link must agree on it.
//!
//! Every algorithm is expressed as the same three operations: start a
//! fresh state, fold bytes into it, finalize it into an unsigned output
//! of the algorithm's width. The built-in CRC variants delegate to the
//! [`crc`] crate; hosts with hardware checksum units or proprietary
//! algorithms can plug in their own through [`CustomChecksum`].
//!
//! [`FrameConfig`]: crate::config::FrameConfig

use crc::{CRC_8_MAXIM_DOW, CRC_16_ARC, CRC_32_ISO_HDLC, Crc, Digest};
use std::fmt;
use std::sync::Arc;

/// CRC-8 Dallas/Maxim (1-wire): polynomial 0x8C reflected, init 0.
static CRC8: Crc<u8> = Crc::<u8>::new(&CRC_8_MAXIM_DOW);

/// CRC-16 IBM/ANSI: polynomial 0x8005 reflected (0xA001), init 0.
static CRC16: Crc<u16> = Crc::<u16>::new(&CRC_16_ARC);

/// CRC-32 IEEE: polynomial 0xEDB88320 reflected, init and final-xor 0xFFFFFFFF.
static CRC32: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

/// Host-provided checksum algorithm.
///
/// The three operations mirror the built-in variants: `start` produces a
/// fresh state, `update` folds one byte in, `finalize` yields the wire
/// value. The output width on the wire is fixed by the
/// [`ChecksumKind::Custom8`]/[`Custom16`]/[`Custom32`] variant carrying
/// the implementation, not by the implementation itself; finalized values
/// are masked to that width.
///
/// [`Custom16`]: ChecksumKind::Custom16
/// [`Custom32`]: ChecksumKind::Custom32
pub trait CustomChecksum {
    /// Initial state of a fresh checksum.
    fn start(&self) -> u32;

    /// Fold a single byte into the state.
    fn update(&self, state: u32, byte: u8) -> u32;

    /// Finish the computation, producing the value emitted on the wire.
    fn finalize(&self, state: u32) -> u32;
}

/// Checksum algorithm selected for a link.
#[derive(Clone, Default)]
pub enum ChecksumKind {
    /// No checksums on the wire; both checksum fields are absent.
    None,
    /// Inverted XOR of all bytes in the region, 1 byte on the wire.
    Xor8,
    /// CRC-8 Dallas/Maxim.
    Crc8,
    /// CRC-16 with the 0x8005 polynomial, reflected.
    #[default]
    Crc16,
    /// CRC-32 with the 0xEDB88320 polynomial, reflected.
    Crc32,
    /// Host algorithm emitting 1 byte.
    Custom8(Arc<dyn CustomChecksum>),
    /// Host algorithm emitting 2 bytes.
    Custom16(Arc<dyn CustomChecksum>),
    /// Host algorithm emitting 4 bytes.
    Custom32(Arc<dyn CustomChecksum>),
}

/// Running checksum state for one header or payload region.
pub enum ChecksumState {
    None,
    Xor8(u8),
    Crc8(Digest<'static, u8>),
    Crc16(Digest<'static, u16>),
    Crc32(Digest<'static, u32>),
    Custom(u32),
}

impl ChecksumKind {
    /// Width of the checksum on the wire, in bytes (0 for `None`).
    #[must_use]
    pub fn width(&self) -> usize {
        match self {
            ChecksumKind::None => 0,
            ChecksumKind::Xor8 | ChecksumKind::Crc8 | ChecksumKind::Custom8(_) => 1,
            ChecksumKind::Crc16 | ChecksumKind::Custom16(_) => 2,
            ChecksumKind::Crc32 | ChecksumKind::Custom32(_) => 4,
        }
    }

    /// Whether checksum fields appear on the wire at all.
    #[inline]
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.width() > 0
    }

    /// Mask covering the significant bits of a finalized value.
    #[must_use]
    pub fn mask(&self) -> u32 {
        match self.width() {
            0 => 0,
            1 => 0xFF,
            2 => 0xFFFF,
            _ => u32::MAX,
        }
    }

    /// Begin a fresh checksum over a new region.
    #[must_use]
    pub fn start(&self) -> ChecksumState {
        match self {
            ChecksumKind::None => ChecksumState::None,
            ChecksumKind::Xor8 => ChecksumState::Xor8(0),
            ChecksumKind::Crc8 => ChecksumState::Crc8(CRC8.digest()),
            ChecksumKind::Crc16 => ChecksumState::Crc16(CRC16.digest()),
            ChecksumKind::Crc32 => ChecksumState::Crc32(CRC32.digest()),
            ChecksumKind::Custom8(algo)
            | ChecksumKind::Custom16(algo)
            | ChecksumKind::Custom32(algo) => ChecksumState::Custom(algo.start()),
        }
    }

    /// Fold `bytes` into a running state.
    pub fn update(&self, state: &mut ChecksumState, bytes: &[u8]) {
        match state {
            ChecksumState::None => {}
            ChecksumState::Xor8(acc) => {
                for &b in bytes {
                    *acc ^= b;
                }
            }
            ChecksumState::Crc8(digest) => digest.update(bytes),
            ChecksumState::Crc16(digest) => digest.update(bytes),
            ChecksumState::Crc32(digest) => digest.update(bytes),
            ChecksumState::Custom(acc) => {
                if let Some(algo) = self.custom_algo() {
                    for &b in bytes {
                        *acc = algo.update(*acc, b);
                    }
                }
            }
        }
    }

    /// Finish a region, producing the value compared or emitted on the wire.
    #[must_use]
    pub fn finalize(&self, state: ChecksumState) -> u32 {
        let value = match state {
            ChecksumState::None => 0,
            ChecksumState::Xor8(acc) => u32::from(!acc),
            ChecksumState::Crc8(digest) => u32::from(digest.finalize()),
            ChecksumState::Crc16(digest) => u32::from(digest.finalize()),
            ChecksumState::Crc32(digest) => digest.finalize(),
            ChecksumState::Custom(acc) => self
                .custom_algo()
                .map_or(acc, |algo| algo.finalize(acc)),
        };
        value & self.mask()
    }

    /// Convenience: checksum a whole region in one call.
    #[must_use]
    pub fn compute(&self, bytes: &[u8]) -> u32 {
        let mut state = self.start();
        self.update(&mut state, bytes);
        self.finalize(state)
    }

    fn custom_algo(&self) -> Option<&dyn CustomChecksum> {
        match self {
            ChecksumKind::Custom8(algo)
            | ChecksumKind::Custom16(algo)
            | ChecksumKind::Custom32(algo) => Some(algo.as_ref()),
            _ => None,
        }
    }
}

impl fmt::Debug for ChecksumKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ChecksumKind::None => "None",
            ChecksumKind::Xor8 => "Xor8",
            ChecksumKind::Crc8 => "Crc8",
            ChecksumKind::Crc16 => "Crc16",
            ChecksumKind::Crc32 => "Crc32",
            ChecksumKind::Custom8(_) => "Custom8",
            ChecksumKind::Custom16(_) => "Custom16",
            ChecksumKind::Custom32(_) => "Custom32",
        };
        write!(f, "ChecksumKind::{name}")
    }
}

impl fmt::Debug for ChecksumState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ChecksumState::None => "None",
            ChecksumState::Xor8(_) => "Xor8",
            ChecksumState::Crc8(_) => "Crc8",
            ChecksumState::Crc16(_) => "Crc16",
            ChecksumState::Crc32(_) => "Crc32",
            ChecksumState::Custom(_) => "Custom",
        };
        write!(f, "ChecksumState::{name}")
    }
}
