//! Protocol and state-merge engine for a persistent broadcaster-chat
//! connection (spec §1).
//!
//! This crate owns the hard part — framing, reconnect, dispatch, and the
//! model registry's session-merge algorithm — and treats everything else
//! (CLI entry points, log formatting, cookie-based password discovery,
//! emote catalogs, generic HTTP helpers) as an external collaborator
//! reached through a small trait (`http::HttpGet`, `emote::EmoteEncoder`).
//!
//! `fc_protocol` (a sibling crate) owns the wire types themselves: framing,
//! the `Packet` envelope, id-band normalization, and the schema-directed
//! list decoder. This crate re-exports the pieces callers need so most
//! consumers only depend on `fc-chat-core`.

pub mod client;
pub mod config;
pub mod connection;
pub mod dispatch;
pub mod emote;
pub mod error;
pub mod events;
pub mod http;
pub mod registry;
pub mod serverconfig;
pub mod transport;

pub use client::{Client, JoinError};
pub use config::ClientOptions;
pub use connection::ConnectionState;
pub use emote::{EmoteEncoder, LocalEmoteEncoder};
pub use error::{ClientError, HttpError};
pub use http::{HttpGet, ReqwestHttpGet};
pub use registry::{ChangeEvent, Model, Registry, SharedRegistry};
pub use serverconfig::DialTarget;

pub use fc_protocol::{FcType, ModelSessionState, Packet, SessionValue};
