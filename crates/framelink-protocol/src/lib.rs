pub mod checksum;
pub mod codec;
pub mod config;
pub mod engine;
pub mod frame;
pub mod listener;
pub mod parser;
pub mod transmit;
pub mod wire;

pub use checksum::{ChecksumKind, CustomChecksum};
pub use codec::FramelinkCodec;
pub use config::FrameConfig;
pub use engine::Engine;
pub use frame::{Frame, Message};
pub use listener::{FrameCallback, ListenerResult, TimeoutCallback};
pub use parser::{Parser, ParserState};
pub use transmit::{FrameSink, SoftLock, Transmitter, TxLock};
