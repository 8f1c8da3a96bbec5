//! Room/user id band normalization (wire contract, spec §6).
//!
//! The service multiplexes two integer spaces onto the wire: room ids and
//! user ids. Several disjoint bands of room id encode "room for user X" as
//! `band_start + X`. The band constants are unexplained in the source this
//! was distilled from; reproduced verbatim rather than rationalized
//! (spec §9, "open question — magic band constants").

/// `id >= ID_START_USER` ⇒ `userId = id - ID_START_USER`.
pub const ID_START_USER: i64 = 1_000_000_000;

/// Cam-channel room band.
pub const ID_START_CAMCHAN: i64 = 400_000_000;

/// Legacy room band.
pub const ID_START_LEGACY: i64 = 300_000_000;

/// Session-channel room band.
pub const ID_START_SESSCHAN: i64 = 100_000_000;

/// Default public-room band.
pub const ID_START_CHANNEL: i64 = 0;

/// Normalize a room/session id down to the user id it refers to.
///
/// Bands are checked from highest to lowest; an id below every band is
/// returned unchanged (it is already a bare user id).
pub fn to_user_id(id: i64) -> i64 {
    if id >= ID_START_USER {
        id - ID_START_USER
    } else if id >= ID_START_CAMCHAN {
        id - ID_START_CAMCHAN
    } else if id >= ID_START_LEGACY {
        id - ID_START_LEGACY
    } else if id >= ID_START_SESSCHAN {
        id - ID_START_SESSCHAN
    } else {
        id
    }
}

/// Normalize a user id into its canonical public-room id.
///
/// `toRoomId` always uses the default channel band, matching the source's
/// choice of the lowest (public-room) band as canonical for outbound
/// `JoinRoom`/`LeaveRoom` commands.
pub fn to_room_id(uid: i64) -> i64 {
    ID_START_CHANNEL + to_user_id(uid)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn to_user_id_strips_each_band() {
        assert_eq!(to_user_id(ID_START_USER + 42), 42);
        assert_eq!(to_user_id(ID_START_CAMCHAN + 42), 42);
        assert_eq!(to_user_id(ID_START_LEGACY + 42), 42);
        assert_eq!(to_user_id(ID_START_SESSCHAN + 42), 42);
        assert_eq!(to_user_id(42), 42);
    }

    #[test]
    fn to_user_id_picks_highest_matching_band() {
        // A value that falls in multiple bands is normalized by the highest one.
        let id = ID_START_USER + 5;
        assert_eq!(to_user_id(id), 5);
    }

    #[test]
    fn round_trip_room_and_user_id() {
        for x in [1_i64, 42, ID_START_SESSCHAN + 7, ID_START_USER + 99] {
            assert_eq!(to_room_id(to_user_id(x)), to_room_id(x));
        }
        for uid in [1_i64, 42, 123_456] {
            assert_eq!(to_user_id(to_room_id(uid)), uid);
        }
    }
}
