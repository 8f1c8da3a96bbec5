//! The typed packet envelope and its derived views (spec §3, §4.B).

use crate::fctype::{FcType, JoinAction};
use crate::ids::to_user_id;
use crate::value::{ModelSessionState, SessionValue};

/// `sMessage`: absent, a raw string, or a decoded structured value (spec §3).
#[derive(Debug, Clone, PartialEq)]
pub enum PacketPayload {
    Absent,
    Raw(String),
    Structured(serde_json::Value),
}

impl PacketPayload {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            PacketPayload::Raw(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_json(&self) -> Option<&serde_json::Value> {
        match self {
            PacketPayload::Structured(v) => Some(v),
            _ => None,
        }
    }

    /// Best-effort extraction of a `ModelSessionState` from a structured
    /// payload, used by the dispatcher's candidate-state-update handlers
    /// (spec §4.E).
    pub fn as_session_state(&self) -> Option<ModelSessionState> {
        let json = self.as_json()?;
        if !json.is_object() {
            return None;
        }
        match SessionValue::from(json.clone()) {
            SessionValue::Bag(bag) => Some(bag),
            _ => None,
        }
    }
}

/// An immutable decoded packet (spec §3, `Packet`).
#[derive(Debug, Clone, PartialEq)]
pub struct Packet {
    pub fc_type: FcType,
    pub n_from: i32,
    pub n_to: i32,
    pub n_arg1: i32,
    pub n_arg2: i32,
    pub payload_length: i32,
    pub message: PacketPayload,
}

impl Packet {
    pub fn new(
        fc_type: FcType,
        n_from: i32,
        n_to: i32,
        n_arg1: i32,
        n_arg2: i32,
        message: PacketPayload,
    ) -> Self {
        let payload_length = match &message {
            PacketPayload::Absent => 0,
            PacketPayload::Raw(s) => s.len() as i32,
            PacketPayload::Structured(v) => {
                serde_json::to_string(v).map(|s| s.len() as i32).unwrap_or(0)
            }
        };
        Packet {
            fc_type,
            n_from,
            n_to,
            n_arg1,
            n_arg2,
            payload_length,
            message,
        }
    }

    pub fn join_action(&self) -> JoinAction {
        JoinAction::from_i32(self.n_arg2)
    }

    /// `aboutModel`: the model this packet concerns, or `None` (spec §4.B).
    ///
    /// For room/tip/chat/PM types the subject is the normalized target user
    /// (`nTo` for chat/PM/tip, `nArg2` for JOINCHAN's target room, `nFrom`
    /// otherwise). For `SESSIONSTATE`/`DETAILS`-shaped packets the subject
    /// comes from the payload's `uid`/`sid` instead.
    pub fn about_model(&self) -> Option<i64> {
        match self.fc_type {
            FcType::CMesg | FcType::PMesg => Some(to_user_id(self.n_to as i64)),
            FcType::JoinChan => Some(to_user_id(self.n_from as i64)),
            FcType::Details
            | FcType::RoomHelper
            | FcType::SessionState
            | FcType::AddFriend
            | FcType::AddIgnore
            | FcType::TxProfile
            | FcType::UsernameLookup
            | FcType::MyCamState
            | FcType::MyWebcam => {
                let state = self.message.as_session_state()?;
                let uid = state.uid();
                let sid = state.sid();
                if uid == 0 && sid > 0 {
                    Some(sid)
                } else if uid != 0 {
                    Some(uid)
                } else {
                    None
                }
            }
            _ => {
                let candidate = to_user_id(self.n_to as i64);
                if candidate != 0 {
                    Some(candidate)
                } else {
                    let candidate = to_user_id(self.n_arg2 as i64);
                    if candidate != 0 {
                        Some(candidate)
                    } else {
                        let candidate = to_user_id(self.n_from as i64);
                        if candidate != 0 { Some(candidate) } else { None }
                    }
                }
            }
        }
    }

    /// `chatString`: human-readable rendering, only defined for chat/PM/tip
    /// types (spec §4.B). Emotes of the form `#~ue,<hash>.gif,<code>~#` are
    /// replaced by `:<code>`.
    pub fn chat_string(&self) -> Option<String> {
        if !matches!(self.fc_type, FcType::CMesg | FcType::PMesg) {
            return None;
        }
        let (username, text) = match &self.message {
            PacketPayload::Raw(s) => {
                // Wire shape for a plain chat payload is `username:text`.
                match s.split_once(':') {
                    Some((u, t)) => (u.to_string(), t.to_string()),
                    None => (String::new(), s.clone()),
                }
            }
            PacketPayload::Structured(v) => {
                let username = v
                    .get("nm")
                    .or_else(|| v.get("username"))
                    .and_then(|x| x.as_str())
                    .unwrap_or("")
                    .to_string();
                let text = v
                    .get("msg")
                    .or_else(|| v.get("body"))
                    .and_then(|x| x.as_str())
                    .unwrap_or("")
                    .to_string();
                (username, text)
            }
            PacketPayload::Absent => return None,
        };
        Some(format!("{}: {}", username, render_emotes(&text)))
    }
}

/// Replace `#~ue,<hash>.gif,<code>~#` emote markers with `:<code>`.
fn render_emotes(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find("#~ue,") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 5..];
        match after.find("~#") {
            Some(end) => {
                let body = &after[..end];
                // body shape: "<hash>.gif,<code>"
                let code = body.rsplit_once(',').map(|(_, c)| c).unwrap_or(body);
                out.push(':');
                out.push_str(code);
                rest = &after[end + 2..];
            }
            None => {
                out.push_str(&rest[start..]);
                rest = "";
                break;
            }
        }
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_string_renders_plain_message() {
        let p = Packet::new(
            FcType::CMesg,
            0,
            0,
            0,
            0,
            PacketPayload::Raw("alice:hello there".to_string()),
        );
        assert_eq!(p.chat_string().unwrap(), "alice: hello there");
    }

    #[test]
    fn chat_string_renders_emotes() {
        let p = Packet::new(
            FcType::CMesg,
            0,
            0,
            0,
            0,
            PacketPayload::Raw("bob:hi #~ue,abcd1234.gif,smile~# there".to_string()),
        );
        assert_eq!(p.chat_string().unwrap(), "bob: hi :smile there");
    }

    #[test]
    fn chat_string_absent_for_non_chat_types() {
        let p = Packet::new(FcType::Login, 0, 0, 0, 0, PacketPayload::Absent);
        assert!(p.chat_string().is_none());
    }

    #[test]
    fn about_model_for_pmesg_uses_normalized_target() {
        let p = Packet::new(
            FcType::PMesg,
            0,
            crate::ids::ID_START_USER as i32 + 7,
            0,
            0,
            PacketPayload::Absent,
        );
        assert_eq!(p.about_model(), Some(7));
    }

    #[test]
    fn about_model_for_sessionstate_uses_payload_uid() {
        let payload =
            serde_json::json!({"uid": 0, "sid": 55, "lv": 4});
        let p = Packet::new(
            FcType::SessionState,
            0,
            0,
            0,
            0,
            PacketPayload::Structured(payload),
        );
        assert_eq!(p.about_model(), Some(55));
    }
}
