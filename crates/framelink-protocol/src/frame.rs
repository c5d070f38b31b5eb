use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Frame is the wire-level unit exchanged between two peers.
///
/// A frame carries an id (used to correlate a reply with the request that
/// caused it), a type (used to dispatch by message class) and a payload.
/// The length field, the optional SOF marker and the optional checksums
/// exist only on the wire; a parsed `Frame` has already had them checked
/// and stripped.
///
/// # Basic Usage
/// ```
/// use bytes::Bytes;
/// use framelink_protocol::Frame;
///
/// let frame = Frame::new(0x81, 0x22, Bytes::from_static(b"AB"));
/// assert_eq!(frame.len(), 2);
/// assert_eq!(frame.payload.as_ref(), b"AB");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Frame {
    /// Frame id, with the sender's peer role in the high bit.
    pub id: u32,

    /// Message class, dispatched against type listeners.
    pub frame_type: u32,

    /// Payload bytes; the wire length field counts exactly these.
    pub payload: Bytes,
}

impl Frame {
    /// Create a new frame.
    pub fn new(id: u32, frame_type: u32, payload: impl Into<Bytes>) -> Self {
        Frame {
            id,
            frame_type,
            payload: payload.into(),
        }
    }

    /// Payload length in bytes.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.payload.len()
    }

    /// Whether the payload is empty.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Frame[id={:#x}, type={:#x}, len={}]",
            self.id,
            self.frame_type,
            self.len()
        )
    }
}

/// User-level view of a frame.
///
/// A `Message` is what the send family consumes and what listener
/// callbacks receive. On top of the frame fields it carries the
/// `is_response` flag: set by the respond family so that composition
/// reuses the incoming id instead of allocating a fresh one.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Message {
    /// Frame id. Assigned by the engine on send; preserved on respond.
    pub id: u32,

    /// Message class.
    pub frame_type: u32,

    /// Payload to send, or the received payload when dispatched.
    pub payload: Bytes,

    /// Marks a reply: composition keeps `id` instead of allocating one.
    pub is_response: bool,
}

impl Message {
    /// Create a message for a new (non-response) frame.
    ///
    /// The id is assigned by the engine when the message is sent.
    pub fn new(frame_type: u32, payload: impl Into<Bytes>) -> Self {
        Message {
            id: 0,
            frame_type,
            payload: payload.into(),
            is_response: false,
        }
    }

    /// Payload length in bytes.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.payload.len()
    }

    /// Whether the payload is empty.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}

impl From<&Frame> for Message {
    fn from(frame: &Frame) -> Self {
        Message {
            id: frame.id,
            frame_type: frame.frame_type,
            payload: frame.payload.clone(),
            is_response: false,
        }
    }
}

impl From<Frame> for Message {
    fn from(frame: Frame) -> Self {
        Message {
            id: frame.id,
            frame_type: frame.frame_type,
            payload: frame.payload,
            is_response: false,
        }
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Message[id={:#x}, type={:#x}, len={}, response={}]",
            self.id,
            self.frame_type,
            self.len(),
            self.is_response
        )
    }
}
