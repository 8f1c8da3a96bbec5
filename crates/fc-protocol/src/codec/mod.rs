//! Framed transport layer: two wire dialects, one logical packet shape
//! (spec §4.A, §6).

pub mod binary;
pub mod text;

use crate::packet::Packet;

/// Framing/decode failures (spec §7).
///
/// `Framing` is fatal to the current connection (bad magic, unparseable
/// length tag); `Io` passes through lower-level read errors for the caller
/// to classify.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("bad magic: expected {expected}, got {got}")]
    BadMagic { expected: i32, got: i32 },
    #[error("unparseable length tag: {0:?}")]
    LengthTag(String),
    #[error("invalid UTF-8 payload")]
    InvalidUtf8,
}

/// Common shape for both dialect decoders: feed bytes in, pull complete
/// packets out. Partial frames are buffered and return `Ok(None)` without
/// consuming input (spec §4.A, "need more data").
pub trait Decoder {
    fn feed(&mut self, bytes: &[u8]);
    fn decode_next(&mut self) -> Result<Option<Packet>, CodecError>;
}

pub use binary::BinaryCodec;
pub use text::TextCodec;
