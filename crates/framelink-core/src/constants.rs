//! Protocol-level constants shared across the Framelink crates.
//!
//! These are the defaults for the configurable frame format; every value
//! can be overridden per engine through `FrameConfig`. Both peers of a
//! link must be built with matching frame-format settings.
//!
//! # Wire Format
//!
//! ```text
//! ,-----+-----+-----+------+------------+- - - -+-------------,
//! | SOF | ID  | LEN | TYPE | HEAD_CKSUM | DATA  | DATA_CKSUM  |
//! | 0-1 | 1-4 | 1-4 | 1-4  | 0-4        | ...   | 0-4         |  <- size (bytes)
//! '-----+-----+-----+------+------------+- - - -+-------------'
//! ```
//!
//! All multi-byte fields are big-endian.

// ============================================================================
// Frame Format Defaults
// ============================================================================

/// Default start-of-frame marker.
///
/// The SOF byte lets the parser resynchronize after line noise: while
/// waiting for a frame, every byte other than the marker is discarded.
pub const DEFAULT_SOF_BYTE: u8 = 0x01;

// ============================================================================
// Buffer Capacities
// ============================================================================

/// Default receive payload capacity in bytes.
///
/// Frames declaring a longer payload are still consumed, so that the
/// stream stays in sync, but their bytes are discarded and the frame is
/// never dispatched.
pub const DEFAULT_RX_CAPACITY: usize = 1024;

/// Default compose buffer capacity in bytes.
///
/// Larger payloads are not rejected; they are flushed to the write sink
/// in multiple calls. Lowering this trades sink calls for memory.
pub const DEFAULT_TX_CAPACITY: usize = 128;

// ============================================================================
// Listener Tables
// ============================================================================

/// Default slot count for id listeners (response / multi-part waiters).
pub const DEFAULT_ID_LISTENER_SLOTS: usize = 10;

/// Default slot count for type listeners (request handlers).
pub const DEFAULT_TYPE_LISTENER_SLOTS: usize = 10;

/// Default slot count for generic fallback listeners.
pub const DEFAULT_GENERIC_LISTENER_SLOTS: usize = 5;

// ============================================================================
// Timeouts
// ============================================================================

/// Default parser watchdog, in ticks.
///
/// A partially received frame is abandoned after this many `tick()` calls
/// without a byte arriving. 0 disables the watchdog.
pub const DEFAULT_PARSER_TIMEOUT_TICKS: u32 = 10;
