//! Realtime connection management.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────┐
//! │                 RealtimeManager                  │
//! │ (credential read, subscribe/publish gating, bus) │
//! └──────────────────────────────────────────────────┘
//!                        │ spawns
//!                        ▼
//!               ┌─────────────────┐
//!               │  WsConnection   │   one background driver task:
//!               │  (driver task)  │   dial → authenticate → session loop,
//!               └─────────────────┘   backoff between attempts
//!                        │ emits
//!                        ▼
//!               ┌─────────────────┐
//!               │    EventBus     │
//!               └─────────────────┘
//!                        │
//!          ┌─────────────┼─────────────┐
//!          ▼             ▼             ▼
//!    UI component  UI component  UI component
//! ```
//!
//! UI components never touch the socket: they register callbacks on the bus
//! (`ticket-updated`, `new-message`, ...) and call `subscribe`/`publish` on
//! the manager. Transport failures become state transitions and log lines,
//! never panics in UI code.

mod connection;
mod manager;

pub use connection::{ConnectionState, ReconnectPolicy, CONNECTION_STATE_EVENT};
pub use manager::RealtimeManager;
