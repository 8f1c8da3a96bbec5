//! Packet kind enumeration and related small enums (spec §6).

use serde::{Deserialize, Serialize};

/// The finite enumeration of packet kinds carried in `Packet::fc_type`.
///
/// Only the subset relied on by this spec (spec §6) is modeled; anything
/// else decodes to [`FcType::Unknown`] and is emitted under its numeric name
/// (spec §7, "Unknown fcType").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FcType {
    Null,
    Login,
    Details,
    RoomHelper,
    SessionState,
    AddFriend,
    AddIgnore,
    CMesg,
    PMesg,
    TxProfile,
    UsernameLookup,
    MyCamState,
    MyWebcam,
    JoinChan,
    Tags,
    Bookmarks,
    ExtData,
    Metrics,
    ManageList,
    RoomData,
    TokenInc,
    ZBan,
    BanChan,
    Status,
    Unknown(i32),
}

impl FcType {
    /// Decode a wire integer into its typed form.
    pub fn from_i32(v: i32) -> Self {
        match v {
            0 => FcType::Null,
            1 => FcType::Login,
            15 => FcType::Details,
            18 => FcType::RoomHelper,
            19 => FcType::SessionState,
            20 => FcType::AddFriend,
            21 => FcType::AddIgnore,
            31 => FcType::CMesg,
            32 => FcType::PMesg,
            33 => FcType::TxProfile,
            24 => FcType::UsernameLookup,
            13 => FcType::MyCamState,
            14 => FcType::MyWebcam,
            81 => FcType::JoinChan,
            84 => FcType::Tags,
            22 => FcType::Bookmarks,
            40 => FcType::ExtData,
            41 => FcType::Metrics,
            50 => FcType::ManageList,
            42 => FcType::RoomData,
            62 => FcType::TokenInc,
            85 => FcType::ZBan,
            86 => FcType::BanChan,
            10 => FcType::Status,
            other => FcType::Unknown(other),
        }
    }

    /// Encode back to the wire integer.
    pub fn to_i32(self) -> i32 {
        match self {
            FcType::Null => 0,
            FcType::Login => 1,
            FcType::Details => 15,
            FcType::RoomHelper => 18,
            FcType::SessionState => 19,
            FcType::AddFriend => 20,
            FcType::AddIgnore => 21,
            FcType::CMesg => 31,
            FcType::PMesg => 32,
            FcType::TxProfile => 33,
            FcType::UsernameLookup => 24,
            FcType::MyCamState => 13,
            FcType::MyWebcam => 14,
            FcType::JoinChan => 81,
            FcType::Tags => 84,
            FcType::Bookmarks => 22,
            FcType::ExtData => 40,
            FcType::Metrics => 41,
            FcType::ManageList => 50,
            FcType::RoomData => 42,
            FcType::TokenInc => 62,
            FcType::ZBan => 85,
            FcType::BanChan => 86,
            FcType::Status => 10,
            FcType::Unknown(v) => v,
        }
    }

    /// Event name used for type-specific emission (spec §6, "Emitted event names").
    pub fn event_name(self) -> String {
        match self {
            FcType::Unknown(v) => v.to_string(),
            other => format!("{other:?}").to_uppercase(),
        }
    }

    /// The set of "state-class" packet types used by the stronger silence
    /// watchdog (spec §4.F, §4.E "DETAILS handler group").
    pub const STATE_CLASS: &'static [FcType] = &[
        FcType::Details,
        FcType::RoomHelper,
        FcType::SessionState,
        FcType::AddFriend,
        FcType::AddIgnore,
        FcType::CMesg,
        FcType::PMesg,
        FcType::TxProfile,
        FcType::UsernameLookup,
        FcType::MyCamState,
        FcType::MyWebcam,
        FcType::JoinChan,
    ];

    pub fn is_state_class(self) -> bool {
        Self::STATE_CLASS.contains(&self)
    }
}

/// `JOINCHAN` secondary action, carried in `nArg2`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinAction {
    Join,
    Part,
    Other(i32),
}

impl JoinAction {
    pub fn from_i32(v: i32) -> Self {
        match v {
            0 => JoinAction::Join,
            1 => JoinAction::Part,
            other => JoinAction::Other(other),
        }
    }

    pub fn to_i32(self) -> i32 {
        match self {
            JoinAction::Join => 0,
            JoinAction::Part => 1,
            JoinAction::Other(v) => v,
        }
    }
}

/// `FCWOPT` values relevant to `EXTDATA` indirection (spec §4.E).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FcwOpt {
    RedisJson,
    Other(i32),
}

impl FcwOpt {
    pub fn from_i32(v: i32) -> Self {
        match v {
            6 => FcwOpt::RedisJson,
            other => FcwOpt::Other(other),
        }
    }
}

/// `FCL` list kinds carried in a `MANAGELIST` payload (spec §4.E, §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ListKind {
    Roommates,
    Cams,
    Friends,
    Ignores,
    Tags,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_i32() {
        for ty in [
            FcType::Login,
            FcType::Details,
            FcType::ManageList,
            FcType::JoinChan,
        ] {
            assert_eq!(FcType::from_i32(ty.to_i32()), ty);
        }
    }

    #[test]
    fn unknown_type_preserves_numeric_value() {
        let ty = FcType::from_i32(9999);
        assert_eq!(ty, FcType::Unknown(9999));
        assert_eq!(ty.event_name(), "9999");
    }

    #[test]
    fn state_class_matches_details_handler_group() {
        assert!(FcType::Details.is_state_class());
        assert!(FcType::JoinChan.is_state_class());
        assert!(!FcType::Login.is_state_class());
        assert!(!FcType::Tags.is_state_class());
    }
}
