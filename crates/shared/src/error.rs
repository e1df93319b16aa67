//! Error taxonomy for the realtime channel.
//!
//! The split matters to the reconnect logic: transport failures are
//! retryable, while a rejected credential or an exhausted retry budget ends
//! the session until the caller intervenes.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RealtimeError {
    /// Dial, read, write, or timeout failure on the transport.
    #[error("transport error: {0}")]
    Transport(String),

    /// The server rejected the presented credential.
    #[error("authentication rejected ({code}): {message}")]
    Auth { code: String, message: String },

    /// The reconnect ceiling was reached without a successful connection.
    #[error("gave up reconnecting after {attempts} attempts")]
    RetriesExhausted { attempts: u32 },

    /// A frame could not be encoded or decoded.
    #[error("malformed frame: {0}")]
    Frame(String),
}

impl RealtimeError {
    /// Whether the reconnect policy applies to this failure.
    pub fn is_retryable(&self) -> bool {
        matches!(self, RealtimeError::Transport(_) | RealtimeError::Frame(_))
    }
}
