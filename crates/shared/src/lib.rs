//! Shared types for the deskwire realtime channel: the wire protocol spoken
//! between the client SDK and a deskwire server, and the error taxonomy both
//! sides report against.

pub mod error;
pub mod protocol;

pub use error::*;
pub use protocol::*;
