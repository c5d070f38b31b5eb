//! Frame-format and engine configuration.

use crate::checksum::ChecksumKind;
use framelink_core::constants::*;
use framelink_core::{Error, FieldWidth, Result};

/// Frame format and engine capacities for one link.
///
/// Both peers of a link must be built with identical frame-format
/// settings (field widths, checksum, SOF); the capacities are local to
/// each engine. The defaults mirror the classic serial-link profile:
/// 1-byte id and type, 2-byte length, CRC-16, SOF `0x01`.
///
/// # Example
/// ```
/// use framelink_core::FieldWidth;
/// use framelink_protocol::{ChecksumKind, FrameConfig};
///
/// let config = FrameConfig::default()
///     .with_id_width(FieldWidth::Two)
///     .with_checksum(ChecksumKind::Crc32)
///     .without_sof();
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Wire width of the frame id field.
    pub id_width: FieldWidth,

    /// Wire width of the payload length field.
    pub len_width: FieldWidth,

    /// Wire width of the frame type field.
    pub type_width: FieldWidth,

    /// Checksum algorithm for both the header and payload regions.
    pub checksum: ChecksumKind,

    /// Start-of-frame marker, or `None` to frame without one.
    pub sof: Option<u8>,

    /// Receive payload capacity; longer frames are consumed but dropped.
    pub rx_capacity: usize,

    /// Compose buffer capacity; larger payloads flush in multiple sink calls.
    pub tx_capacity: usize,

    /// Slots in the id listener table.
    pub id_listener_slots: usize,

    /// Slots in the type listener table.
    pub type_listener_slots: usize,

    /// Slots in the generic listener table.
    pub generic_listener_slots: usize,

    /// Ticks before a partially received frame is abandoned (0 = never).
    pub parser_timeout_ticks: u32,
}

impl Default for FrameConfig {
    fn default() -> Self {
        FrameConfig {
            id_width: FieldWidth::One,
            len_width: FieldWidth::Two,
            type_width: FieldWidth::One,
            checksum: ChecksumKind::Crc16,
            sof: Some(DEFAULT_SOF_BYTE),
            rx_capacity: DEFAULT_RX_CAPACITY,
            tx_capacity: DEFAULT_TX_CAPACITY,
            id_listener_slots: DEFAULT_ID_LISTENER_SLOTS,
            type_listener_slots: DEFAULT_TYPE_LISTENER_SLOTS,
            generic_listener_slots: DEFAULT_GENERIC_LISTENER_SLOTS,
            parser_timeout_ticks: DEFAULT_PARSER_TIMEOUT_TICKS,
        }
    }
}

impl FrameConfig {
    /// Configuration with the default serial-link profile.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the id field width.
    #[must_use]
    pub fn with_id_width(mut self, width: FieldWidth) -> Self {
        self.id_width = width;
        self
    }

    /// Set the length field width.
    #[must_use]
    pub fn with_len_width(mut self, width: FieldWidth) -> Self {
        self.len_width = width;
        self
    }

    /// Set the type field width.
    #[must_use]
    pub fn with_type_width(mut self, width: FieldWidth) -> Self {
        self.type_width = width;
        self
    }

    /// Select the checksum algorithm.
    #[must_use]
    pub fn with_checksum(mut self, checksum: ChecksumKind) -> Self {
        self.checksum = checksum;
        self
    }

    /// Frame with the given start-of-frame marker.
    #[must_use]
    pub fn with_sof(mut self, sof: u8) -> Self {
        self.sof = Some(sof);
        self
    }

    /// Frame without a start-of-frame marker.
    #[must_use]
    pub fn without_sof(mut self) -> Self {
        self.sof = None;
        self
    }

    /// Set the receive payload capacity.
    #[must_use]
    pub fn with_rx_capacity(mut self, capacity: usize) -> Self {
        self.rx_capacity = capacity;
        self
    }

    /// Set the compose buffer capacity.
    #[must_use]
    pub fn with_tx_capacity(mut self, capacity: usize) -> Self {
        self.tx_capacity = capacity;
        self
    }

    /// Set the listener table capacities.
    #[must_use]
    pub fn with_listener_slots(mut self, id: usize, frame_type: usize, generic: usize) -> Self {
        self.id_listener_slots = id;
        self.type_listener_slots = frame_type;
        self.generic_listener_slots = generic;
        self
    }

    /// Set the parser watchdog, in ticks (0 disables it).
    #[must_use]
    pub fn with_parser_timeout(mut self, ticks: u32) -> Self {
        self.parser_timeout_ticks = ticks;
        self
    }

    /// Bytes of a frame header on the wire: SOF, id, length, type and the
    /// header checksum.
    #[must_use]
    pub fn header_len(&self) -> usize {
        usize::from(self.sof.is_some())
            + self.id_width.as_usize()
            + self.len_width.as_usize()
            + self.type_width.as_usize()
            + self.checksum.width()
    }

    /// Wire overhead of a frame beyond its payload.
    #[must_use]
    pub fn frame_overhead(&self) -> usize {
        self.header_len() + self.checksum.width()
    }

    /// Check the configuration for internal consistency.
    ///
    /// # Errors
    /// Returns `Error::InvalidConfig` when a buffer capacity cannot hold
    /// what the engine must write or read through it.
    pub fn validate(&self) -> Result<()> {
        if self.rx_capacity == 0 {
            return Err(Error::InvalidConfig(
                "receive capacity must be non-zero".to_string(),
            ));
        }
        if self.tx_capacity < self.header_len() {
            return Err(Error::InvalidConfig(format!(
                "compose buffer of {} bytes cannot hold a {}-byte frame header",
                self.tx_capacity,
                self.header_len()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_profile() {
        let config = FrameConfig::default();
        assert_eq!(config.id_width, FieldWidth::One);
        assert_eq!(config.len_width, FieldWidth::Two);
        assert_eq!(config.type_width, FieldWidth::One);
        assert_eq!(config.sof, Some(0x01));
        assert_eq!(config.checksum.width(), 2);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_header_len_counts_every_field() {
        // SOF(1) + id(1) + len(2) + type(1) + crc16(2)
        assert_eq!(FrameConfig::default().header_len(), 7);

        let bare = FrameConfig::default()
            .without_sof()
            .with_checksum(ChecksumKind::None);
        assert_eq!(bare.header_len(), 4);
        assert_eq!(bare.frame_overhead(), 4);
    }

    #[test]
    fn test_validate_rejects_tiny_compose_buffer() {
        let config = FrameConfig::default().with_tx_capacity(4);
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_validate_rejects_zero_rx_capacity() {
        let config = FrameConfig::default().with_rx_capacity(0);
        assert!(config.validate().is_err());
    }
}
