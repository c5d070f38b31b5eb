use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Peer role of an engine.
///
/// The role pins the high bit of every frame id the engine generates, so
/// two peers allocating ids concurrently can never produce the same id:
/// a slave engine only generates ids with the high bit clear, a master
/// engine only generates ids with the high bit set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Peer {
    /// Slave device, id high bit fixed to 0.
    Slave,
    /// Master device, id high bit fixed to 1.
    Master,
}

impl Peer {
    /// Returns `true` for the master role.
    #[inline]
    #[must_use]
    pub fn is_master(self) -> bool {
        matches!(self, Peer::Master)
    }
}

impl fmt::Display for Peer {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Peer::Slave => write!(f, "slave"),
            Peer::Master => write!(f, "master"),
        }
    }
}

/// Wire width of an unsigned frame field (id, length or type).
///
/// Fields are encoded big-endian in exactly this many bytes. Both peers
/// must agree on the width of every field; a mismatch desynchronizes the
/// parsers on either end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FieldWidth {
    One = 1,
    Two = 2,
    Four = 4,
}

impl FieldWidth {
    /// Create a field width from a byte count.
    ///
    /// # Errors
    /// Returns `Error::InvalidConfig` unless `bytes` is 1, 2 or 4.
    pub fn new(bytes: usize) -> Result<Self> {
        match bytes {
            1 => Ok(FieldWidth::One),
            2 => Ok(FieldWidth::Two),
            4 => Ok(FieldWidth::Four),
            _ => Err(Error::InvalidConfig(format!(
                "field width must be 1, 2 or 4 bytes, got {bytes}"
            ))),
        }
    }

    /// Width in bytes.
    #[inline]
    #[must_use]
    pub fn as_usize(self) -> usize {
        self as usize
    }

    /// Largest value encodable in this width.
    #[inline]
    #[must_use]
    pub fn max_value(self) -> u32 {
        match self {
            FieldWidth::One => u8::MAX as u32,
            FieldWidth::Two => u16::MAX as u32,
            FieldWidth::Four => u32::MAX,
        }
    }

    /// Whether `value` is encodable in this width.
    #[inline]
    #[must_use]
    pub fn fits(self, value: u32) -> bool {
        value <= self.max_value()
    }
}

impl fmt::Display for FieldWidth {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}B", self.as_usize())
    }
}
