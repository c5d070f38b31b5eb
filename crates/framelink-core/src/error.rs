use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors
    #[error("Invalid engine configuration: {0}")]
    InvalidConfig(String),

    // Frame errors
    #[error("Frame too large: {size} bytes exceeds limit of {max_size}")]
    FrameTooLarge { size: usize, max_size: usize },

    #[error("Value {value:#x} does not fit in a {width}-byte field")]
    FieldOverflow { value: u32, width: usize },

    #[error("Header checksum mismatch: expected {expected:#x}, got {actual:#x}")]
    HeaderChecksumMismatch { expected: u32, actual: u32 },

    #[error("Payload checksum mismatch: expected {expected:#x}, got {actual:#x}")]
    PayloadChecksumMismatch { expected: u32, actual: u32 },

    // Transmit errors
    #[error("Transmitter busy: another composition holds the lock")]
    TxBusy,

    // Listener errors
    #[error("Listener table full")]
    ListenerTableFull,

    #[error("Id listener {id:#x} is already registered")]
    DuplicateIdListener { id: u32 },

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
