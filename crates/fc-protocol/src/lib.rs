//! Wire types, framing, and schema-directed list decoding for a persistent
//! broadcaster-chat connection (spec §3, §4.A, §4.B, §4.D).
//!
//! This crate has no knowledge of sockets, reconnect policy, or the model
//! registry — it only knows how to turn bytes into [`packet::Packet`]s and
//! back, and how to interpret the payload shapes the service sends.

pub mod codec;
pub mod fctype;
pub mod ids;
pub mod listdata;
pub mod packet;
pub mod value;

pub use codec::{BinaryCodec, CodecError, Decoder, TextCodec};
pub use fctype::{FcType, FcwOpt, JoinAction, ListKind};
pub use ids::{to_room_id, to_user_id};
pub use listdata::{decode_list, ListRecord};
pub use packet::{Packet, PacketPayload};
pub use value::{ModelSessionState, SessionValue};
