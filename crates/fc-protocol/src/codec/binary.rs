//! Binary dialect: 7 big-endian int32s + UTF-8 payload (spec §4.A, §6).

use super::{CodecError, Decoder};
use crate::fctype::FcType;
use crate::packet::{Packet, PacketPayload};

/// Fixed sentinel opening every binary frame; any other value is a fatal
/// framing error.
pub const MAGIC: i32 = -2027771214;

const HEADER_LEN: usize = 7 * 4;

/// Stateful binary-dialect frame decoder.
///
/// Bytes are appended via [`Decoder::feed`]; [`Decoder::decode_next`] pops
/// one complete frame at a time, leaving any trailing partial frame
/// buffered for the next call.
#[derive(Debug, Default)]
pub struct BinaryCodec {
    buf: Vec<u8>,
}

impl BinaryCodec {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Decoder for BinaryCodec {
    fn feed(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    fn decode_next(&mut self) -> Result<Option<Packet>, CodecError> {
        if self.buf.len() < HEADER_LEN {
            return Ok(None);
        }

        let magic = read_i32(&self.buf, 0);
        if magic != MAGIC {
            return Err(CodecError::BadMagic {
                expected: MAGIC,
                got: magic,
            });
        }
        let fc_type = read_i32(&self.buf, 4);
        let n_from = read_i32(&self.buf, 8);
        let n_to = read_i32(&self.buf, 12);
        let n_arg1 = read_i32(&self.buf, 16);
        let n_arg2 = read_i32(&self.buf, 20);
        let payload_len = read_i32(&self.buf, 24);

        if payload_len < 0 {
            return Err(CodecError::LengthTag(payload_len.to_string()));
        }
        let total_len = HEADER_LEN + payload_len as usize;
        if self.buf.len() < total_len {
            return Ok(None);
        }

        let message = if payload_len > 0 {
            let raw = &self.buf[HEADER_LEN..total_len];
            let s = std::str::from_utf8(raw)
                .map_err(|_| CodecError::InvalidUtf8)?
                .to_string();
            decode_payload(s)
        } else {
            PacketPayload::Absent
        };

        self.buf.drain(0..total_len);

        Ok(Some(Packet::new(
            FcType::from_i32(fc_type),
            n_from,
            n_to,
            n_arg1,
            n_arg2,
            message,
        )))
    }
}

/// If the payload parses as JSON, keep the structured value; otherwise keep
/// the raw string (spec §4.A, "payload decoding").
fn decode_payload(raw: String) -> PacketPayload {
    match serde_json::from_str::<serde_json::Value>(&raw) {
        Ok(v) => PacketPayload::Structured(v),
        Err(_) => PacketPayload::Raw(raw),
    }
}

fn read_i32(buf: &[u8], offset: usize) -> i32 {
    i32::from_be_bytes([
        buf[offset],
        buf[offset + 1],
        buf[offset + 2],
        buf[offset + 3],
    ])
}

/// Encode an outbound binary frame (spec §4.A, "Outbound").
///
/// Unlike inbound frames (which carry `nFrom`), outbound frames carry the
/// client's own `sessionId` in that slot.
pub fn encode_binary(
    fc_type: FcType,
    session_id: i32,
    n_to: i32,
    n_arg1: i32,
    n_arg2: i32,
    payload: Option<&str>,
) -> Vec<u8> {
    let payload_bytes = payload.unwrap_or("").as_bytes();
    let mut out = Vec::with_capacity(HEADER_LEN + payload_bytes.len());
    out.extend_from_slice(&MAGIC.to_be_bytes());
    out.extend_from_slice(&fc_type.to_i32().to_be_bytes());
    out.extend_from_slice(&session_id.to_be_bytes());
    out.extend_from_slice(&n_to.to_be_bytes());
    out.extend_from_slice(&n_arg1.to_be_bytes());
    out.extend_from_slice(&n_arg2.to_be_bytes());
    out.extend_from_slice(&(payload_bytes.len() as i32).to_be_bytes());
    out.extend_from_slice(payload_bytes);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(fc_type: i32, n_from: i32, n_to: i32, payload: &str) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&MAGIC.to_be_bytes());
        out.extend_from_slice(&fc_type.to_be_bytes());
        out.extend_from_slice(&n_from.to_be_bytes());
        out.extend_from_slice(&n_to.to_be_bytes());
        out.extend_from_slice(&0i32.to_be_bytes());
        out.extend_from_slice(&0i32.to_be_bytes());
        out.extend_from_slice(&(payload.len() as i32).to_be_bytes());
        out.extend_from_slice(payload.as_bytes());
        out
    }

    #[test]
    fn decodes_two_concatenated_frames_in_order() {
        let mut bytes = frame(1, 0, 42, "alice");
        bytes.extend(frame(19, 0, 0, r#"{"uid":42}"#));

        let mut codec = BinaryCodec::new();
        codec.feed(&bytes);

        let p1 = codec.decode_next().unwrap().unwrap();
        assert_eq!(p1.fc_type, FcType::Login);
        assert_eq!(p1.n_to, 42);

        let p2 = codec.decode_next().unwrap().unwrap();
        assert_eq!(p2.fc_type, FcType::SessionState);
        assert_eq!(p2.message.as_json().unwrap()["uid"], 42);

        assert!(codec.decode_next().unwrap().is_none());
    }

    #[test]
    fn partial_frame_waits_for_remaining_bytes() {
        let bytes = frame(1, 0, 1, "x");
        let mut codec = BinaryCodec::new();

        for (i, b) in bytes.iter().enumerate() {
            codec.feed(&[*b]);
            let result = codec.decode_next().unwrap();
            if i + 1 < bytes.len() {
                assert!(result.is_none(), "should not decode until all bytes arrive");
            } else {
                assert!(result.is_some(), "should decode once the final byte arrives");
            }
        }
    }

    #[test]
    fn bad_magic_is_fatal() {
        let mut bytes = frame(1, 0, 1, "");
        bytes[0] ^= 0xFF;
        let mut codec = BinaryCodec::new();
        codec.feed(&bytes);
        assert!(matches!(
            codec.decode_next(),
            Err(CodecError::BadMagic { .. })
        ));
    }

    #[test]
    fn round_trip_encode_decode() {
        let encoded = encode_binary(FcType::CMesg, 7, 42, 0, 0, Some("hello"));
        let mut codec = BinaryCodec::new();
        codec.feed(&encoded);
        let packet = codec.decode_next().unwrap().unwrap();
        assert_eq!(packet.fc_type, FcType::CMesg);
        assert_eq!(packet.n_from, 7);
        assert_eq!(packet.n_to, 42);
        assert_eq!(packet.message.as_str(), Some("hello"));
    }
}
