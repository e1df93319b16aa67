//! deskwire realtime client.
//!
//! This crate owns the live-updates side of a deskwire session: a single
//! authenticated WebSocket connection to a deskwire server, automatic
//! reconnection with bounded exponential backoff, and an in-process event
//! bus that decouples transport callbacks from the UI code consuming them.
//!
//! See [`ws::RealtimeManager`] for the entry point.

pub mod bus;
pub mod config;
pub mod credentials;
pub mod logging;
pub mod storage;
pub mod ws;

pub use bus::{EventBus, HandlerId};
pub use config::RealtimeConfig;
pub use ws::{ConnectionState, RealtimeManager, ReconnectPolicy};
