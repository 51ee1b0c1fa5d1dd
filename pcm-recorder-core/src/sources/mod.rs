//! Frame sources.
//!
//! Each source owns a producer thread that moves device bytes into a
//! `RingTransfer`; `read_into` drains that transfer on the session thread.

pub mod command;
pub mod reader;
pub mod tone;

pub use command::CommandSource;
pub use reader::ReaderSource;
pub use tone::ToneSource;

/// Device buffer latency used to size source rings.
pub const DEFAULT_BUFFER_MILLIS: u32 = 40;
