//! Mock service endpoints for exercising the client core end-to-end, without
//! a real network.
//!
//! Each mock binds to a random local port and hands back a connection handle
//! the test drives by hand: read what the client sent, script whatever
//! response the scenario needs. Neither mock implements the service's full
//! behavior (login validation, room membership, …) — that's the dispatcher's
//! job on the client side; these only need to speak the wire dialect.

pub mod binary;
pub mod text;

pub use binary::{MockBinaryConn, MockBinaryServer};
pub use text::{MockTextConn, MockTextServer};
