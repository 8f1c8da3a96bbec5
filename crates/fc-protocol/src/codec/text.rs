//! Text (WebSocket) dialect: 4-digit length tag + space-delimited body
//! (spec §4.A, §6).

use super::{CodecError, Decoder};
use crate::fctype::FcType;
use crate::packet::{Packet, PacketPayload};
use regex::Regex;
use std::sync::LazyLock;

/// Noise-filter pattern: the 4-digit length tag directly followed by the
/// body's five space-delimited integer fields (`fcType sessionId nTo nArg1
/// nArg2`), with no separator between the tag and `fcType` (the body starts
/// immediately after the tag, per spec §4.A). A naive variant with a space
/// inserted after the tag looks tempting from the prose rendering of the
/// spec's worked examples, but it actually *matches* the deliberately
/// adversarial garbage prefix in spec §8's noise-filter scenario
/// (`"garbage0123 5 6 7 8 9 "` parses as a bogus 4-digit tag followed by
/// four more space-delimited numbers) and so never gets stripped. Anchoring
/// `fcType` directly against the tag with no separator is what the real
/// wire format produces and correctly rejects that garbage.
static FRAME_START: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{4}\d+ \d+ \d+ \d+ \d+").unwrap());

/// Stateful text-dialect frame decoder.
#[derive(Debug, Default)]
pub struct TextCodec {
    buf: Vec<u8>,
}

impl TextCodec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop leading bytes that don't look like the start of a frame, per
    /// spec §4.A's noise filter. Stops as soon as fewer than five bytes
    /// remain, leaving them buffered for more input.
    fn strip_noise(&mut self) {
        loop {
            if self.buf.len() < 5 {
                return;
            }
            // Only valid UTF-8 prefixes can match the regex; a non-UTF-8
            // leading byte is noise by definition.
            let Ok(s) = std::str::from_utf8(&self.buf) else {
                self.buf.remove(0);
                continue;
            };
            if FRAME_START.is_match(s) {
                return;
            }
            self.buf.remove(0);
        }
    }
}

impl Decoder for TextCodec {
    fn feed(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    fn decode_next(&mut self) -> Result<Option<Packet>, CodecError> {
        self.strip_noise();

        if self.buf.len() < 4 {
            return Ok(None);
        }
        let prefix = std::str::from_utf8(&self.buf[0..4]).map_err(|_| CodecError::InvalidUtf8)?;
        let body_len: usize = prefix
            .parse()
            .map_err(|_| CodecError::LengthTag(prefix.to_string()))?;

        let total_len = 4 + body_len;
        if self.buf.len() < total_len {
            return Ok(None);
        }

        let body_bytes = self.buf[4..total_len].to_vec();
        let body = std::str::from_utf8(&body_bytes)
            .map_err(|_| CodecError::InvalidUtf8)?
            .to_string();

        self.buf.drain(0..total_len);

        parse_body(&body).map(Some)
    }
}

fn parse_body(body: &str) -> Result<Packet, CodecError> {
    let body = body.strip_suffix("\n\0").unwrap_or(body);
    let parts: Vec<&str> = body.splitn(6, ' ').collect();
    if parts.len() < 5 {
        return Err(CodecError::LengthTag(format!(
            "malformed text body: {body:?}"
        )));
    }

    let fc_type: i32 = parts[0]
        .parse()
        .map_err(|_| CodecError::LengthTag(parts[0].to_string()))?;
    let session_id: i32 = parts[1]
        .parse()
        .map_err(|_| CodecError::LengthTag(parts[1].to_string()))?;
    let n_to: i32 = parts[2]
        .parse()
        .map_err(|_| CodecError::LengthTag(parts[2].to_string()))?;
    let n_arg1: i32 = parts[3]
        .parse()
        .map_err(|_| CodecError::LengthTag(parts[3].to_string()))?;
    let (n_arg2, payload) = if parts.len() == 6 {
        let n_arg2: i32 = parts[4]
            .parse()
            .map_err(|_| CodecError::LengthTag(parts[4].to_string()))?;
        (n_arg2, Some(parts[5]))
    } else {
        let n_arg2: i32 = parts[4]
            .parse()
            .map_err(|_| CodecError::LengthTag(parts[4].to_string()))?;
        (n_arg2, None)
    };

    let message = match payload {
        None => PacketPayload::Absent,
        Some(raw) => decode_payload(raw),
    };

    Ok(Packet::new(
        FcType::from_i32(fc_type),
        session_id,
        n_to,
        n_arg1,
        n_arg2,
        message,
    ))
}

/// URL-decode, then attempt JSON; fall back to the URL-decoded raw string
/// (spec §4.A, "payload decoding").
fn decode_payload(raw: &str) -> PacketPayload {
    let decoded = urlencoding::decode(raw)
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| raw.to_string());
    match serde_json::from_str::<serde_json::Value>(&decoded) {
        Ok(v) => PacketPayload::Structured(v),
        Err(_) => PacketPayload::Raw(decoded),
    }
}

/// Encode an outbound text frame: no length prefix (the server frames it),
/// trailing `\n\0` terminator (spec §4.A, "Outbound").
pub fn encode_text(
    fc_type: FcType,
    session_id: i32,
    n_to: i32,
    n_arg1: i32,
    n_arg2: i32,
    payload: Option<&str>,
) -> String {
    let mut out = format!(
        "{} {} {} {} {}",
        fc_type.to_i32(),
        session_id,
        n_to,
        n_arg1,
        n_arg2
    );
    if let Some(p) = payload {
        out.push(' ');
        out.push_str(&urlencoding::encode(p));
    }
    out.push('\n');
    out.push('\0');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_single_frame_with_json_payload() {
        let body = "19 1 1 0 0 {\"uid\":42}\n\0";
        let frame = format!("{:04}{}", body.len(), body);
        let mut codec = TextCodec::new();
        codec.feed(frame.as_bytes());
        let packet = codec.decode_next().unwrap().unwrap();
        assert_eq!(packet.fc_type, FcType::SessionState);
        assert_eq!(packet.message.as_json().unwrap()["uid"], 42);
        assert!(codec.decode_next().unwrap().is_none());
    }

    #[test]
    fn decodes_frame_with_no_payload() {
        let body = "1 1 1 0 0\n\0";
        let frame = format!("{:04}{}", body.len(), body);
        let mut codec = TextCodec::new();
        codec.feed(frame.as_bytes());
        let packet = codec.decode_next().unwrap().unwrap();
        assert_eq!(packet.fc_type, FcType::Login);
        assert!(matches!(packet.message, PacketPayload::Absent));
    }

    #[test]
    fn noise_filter_skips_garbage_prefix() {
        let body = "1 1 0 0 0 {}\n\0";
        let valid_frame = format!("{:04}{}", body.len(), body);
        let mut input = b"garbage0123 5 6 7 8 9 ".to_vec();
        input.extend_from_slice(valid_frame.as_bytes());

        let mut codec = TextCodec::new();
        codec.feed(&input);
        let packet = codec.decode_next().unwrap().unwrap();
        assert_eq!(packet.fc_type, FcType::Login);
        assert!(codec.decode_next().unwrap().is_none());
    }

    #[test]
    fn round_trip_encode_decode_modulo_url_encoding() {
        let encoded = encode_text(FcType::CMesg, 9, 42, 0, 0, Some("hi there"));
        let frame = format!("{:04}{}", encoded.len(), encoded);
        let mut codec = TextCodec::new();
        codec.feed(frame.as_bytes());
        let packet = codec.decode_next().unwrap().unwrap();
        assert_eq!(packet.fc_type, FcType::CMesg);
        assert_eq!(packet.n_from, 9);
        assert_eq!(packet.n_to, 42);
        assert_eq!(packet.message.as_str(), Some("hi there"));
    }
}
