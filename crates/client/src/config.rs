//! Client configuration.

use std::time::Duration;

use url::Url;

use deskwire_shared::RealtimeError;

use crate::ws::ReconnectPolicy;

/// Configuration for a [`RealtimeManager`](crate::ws::RealtimeManager).
#[derive(Debug, Clone)]
pub struct RealtimeConfig {
    /// Realtime endpoint, e.g. `wss://support.example.com/api/ws`.
    pub url: String,
    /// Ceiling for one dial plus the auth handshake.
    pub connect_timeout: Duration,
    /// Backoff schedule applied between reconnect attempts.
    pub reconnect: ReconnectPolicy,
}

impl RealtimeConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            connect_timeout: Duration::from_millis(20_000),
            reconnect: ReconnectPolicy::default(),
        }
    }

    /// Parse and validate the configured endpoint.
    pub fn endpoint(&self) -> Result<Url, RealtimeError> {
        let url = Url::parse(&self.url)
            .map_err(|e| RealtimeError::Transport(format!("invalid endpoint {}: {}", self.url, e)))?;
        match url.scheme() {
            "ws" | "wss" => Ok(url),
            other => Err(RealtimeError::Transport(format!(
                "unsupported endpoint scheme: {}",
                other
            ))),
        }
    }
}
