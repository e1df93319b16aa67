//! Connection state, reconnect policy, and the command handle shared by the
//! platform drivers.

use std::sync::{Arc, Mutex, PoisonError};

use futures_channel::mpsc::UnboundedSender;
use serde::Serialize;
use serde_json::Value;

use deskwire_shared::{ClientCommand, RealtimeError, ServerEvent, WsEnvelope};

use crate::bus::EventBus;

/// Bus event published on every connection-state transition, so UI code can
/// render a status indicator without polling.
pub const CONNECTION_STATE_EVENT: &str = "connection-state";

// The drivers hand user code to background tasks; on native those cross
// threads, on wasm everything stays on the browser event loop.
#[cfg(not(target_arch = "wasm32"))]
pub(crate) type Shared<T> = std::sync::Arc<T>;
#[cfg(target_arch = "wasm32")]
pub(crate) type Shared<T> = std::rc::Rc<T>;

#[cfg(not(target_arch = "wasm32"))]
pub(crate) type TokenSource = Shared<dyn Fn() -> Option<String> + Send + Sync>;
#[cfg(target_arch = "wasm32")]
pub(crate) type TokenSource = Shared<dyn Fn() -> Option<String>>;

#[cfg(not(target_arch = "wasm32"))]
pub(crate) type EventSink = Shared<dyn Fn(WsEnvelope<ServerEvent>) + Send + Sync>;
#[cfg(target_arch = "wasm32")]
pub(crate) type EventSink = Shared<dyn Fn(WsEnvelope<ServerEvent>)>;

/// Lifecycle of the single managed transport connection.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "kebab-case")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    /// Socket open, `authenticate` sent, waiting for the server's verdict.
    Authenticating,
    Connected,
    /// Connection attempt failed. Terminal once no reconnect is pending
    /// (credential rejected, or the retry budget ran out).
    Failed { reason: String },
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected)
    }

    pub fn is_connecting(&self) -> bool {
        matches!(
            self,
            ConnectionState::Connecting | ConnectionState::Authenticating
        )
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, ConnectionState::Failed { .. })
    }
}

/// Exponential backoff schedule for reconnect attempts.
///
/// Delay for attempt `n` is `min(base_delay_ms * 2^n, max_delay_ms)`. After
/// `max_attempts` consecutive failures [`next_delay`](Self::next_delay)
/// refuses further attempts until [`reset`](Self::reset), which a
/// successful connection always triggers.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectPolicy {
    attempt: u32,
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            attempt: 0,
            max_attempts: 5,
            base_delay_ms: 1_000,
            max_delay_ms: 30_000,
        }
    }
}

impl ReconnectPolicy {
    /// Delay for a given attempt number, independent of internal state.
    pub fn delay_for_attempt(&self, attempt: u32) -> u64 {
        self.base_delay_ms
            .saturating_mul(2u64.saturating_pow(attempt))
            .min(self.max_delay_ms)
    }

    /// Consume one attempt: the delay to wait before the next dial, or
    /// `None` once the ceiling is reached.
    pub fn next_delay(&mut self) -> Option<u64> {
        if self.attempt >= self.max_attempts {
            return None;
        }
        let delay = self.delay_for_attempt(self.attempt);
        self.attempt += 1;
        Some(delay)
    }

    /// Consecutive failed attempts so far.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn is_exhausted(&self) -> bool {
        self.attempt >= self.max_attempts
    }

    /// Clear the failure count after a successful connection.
    pub fn reset(&mut self) {
        self.attempt = 0;
    }
}

/// Connection state shared between the driver task and the manager.
///
/// `set` deduplicates: only actual transitions are stored and re-published
/// on the bus under [`CONNECTION_STATE_EVENT`].
#[derive(Clone)]
pub struct SharedState {
    cell: Arc<Mutex<ConnectionState>>,
    bus: EventBus,
}

impl SharedState {
    pub(crate) fn new(bus: EventBus) -> Self {
        Self {
            cell: Arc::new(Mutex::new(ConnectionState::Disconnected)),
            bus,
        }
    }

    pub fn get(&self) -> ConnectionState {
        self.cell
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub(crate) fn set(&self, next: ConnectionState) {
        let changed = {
            let mut current = self.cell.lock().unwrap_or_else(PoisonError::into_inner);
            if *current == next {
                false
            } else {
                *current = next.clone();
                true
            }
        };
        if changed {
            let payload = serde_json::to_value(&next).unwrap_or(Value::Null);
            self.bus.emit(CONNECTION_STATE_EVENT, &payload);
        }
    }
}

/// Commands accepted by the driver task.
#[derive(Debug)]
pub(crate) enum LinkCmd {
    Frame(WsEnvelope<ClientCommand>),
    Shutdown,
}

/// Cheap cloneable handle for pushing commands into the driver task.
#[derive(Clone)]
pub struct RealtimeHandle {
    sender: UnboundedSender<LinkCmd>,
}

impl RealtimeHandle {
    pub(crate) fn new(sender: UnboundedSender<LinkCmd>) -> Self {
        Self { sender }
    }

    fn send(&self, cmd: ClientCommand) -> Result<(), RealtimeError> {
        self.sender
            .unbounded_send(LinkCmd::Frame(WsEnvelope::new(cmd)))
            .map_err(|_| RealtimeError::Transport("connection task is not running".to_string()))
    }

    /// Ask the server to scope `room` events to this connection.
    pub fn join_room(&self, room: &str) -> Result<(), RealtimeError> {
        self.send(ClientCommand::JoinRoom {
            room: room.to_string(),
        })
    }

    /// Leave a previously joined room.
    pub fn leave_room(&self, room: &str) -> Result<(), RealtimeError> {
        self.send(ClientCommand::LeaveRoom {
            room: room.to_string(),
        })
    }

    /// Send a free-form application event.
    pub fn publish(&self, event: &str, payload: Value) -> Result<(), RealtimeError> {
        self.send(ClientCommand::Publish {
            event: event.to_string(),
            payload,
        })
    }

    /// Ask the driver task to close the socket and exit. Fire-and-forget;
    /// safe to call on a driver that already stopped.
    pub(crate) fn shutdown(&self) {
        let _ = self.sender.unbounded_send(LinkCmd::Shutdown);
    }
}

// Platform-specific driver implementation
#[cfg(target_arch = "wasm32")]
mod connection_wasm;
#[cfg(target_arch = "wasm32")]
pub(crate) use connection_wasm::WsConnection;

#[cfg(not(target_arch = "wasm32"))]
mod connection_native;
#[cfg(not(target_arch = "wasm32"))]
pub(crate) use connection_native::WsConnection;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_and_clamps() {
        let policy = ReconnectPolicy::default();
        assert_eq!(policy.delay_for_attempt(0), 1_000);
        assert_eq!(policy.delay_for_attempt(1), 2_000);
        assert_eq!(policy.delay_for_attempt(2), 4_000);
        assert_eq!(policy.delay_for_attempt(3), 8_000);
        assert_eq!(policy.delay_for_attempt(4), 16_000);
        // 1000 * 2^5 = 32000, clamped to the 30s ceiling
        assert_eq!(policy.delay_for_attempt(5), 30_000);
        assert_eq!(policy.delay_for_attempt(6), 30_000);
        // Far past the ceiling the multiplication saturates instead of
        // overflowing
        assert_eq!(policy.delay_for_attempt(90), 30_000);
    }

    #[test]
    fn next_delay_stops_at_the_ceiling() {
        let mut policy = ReconnectPolicy::default();
        let delays: Vec<u64> = std::iter::from_fn(|| policy.next_delay()).collect();
        assert_eq!(delays, [1_000, 2_000, 4_000, 8_000, 16_000]);
        assert!(policy.is_exhausted());
        // No sixth attempt
        assert_eq!(policy.next_delay(), None);
        assert_eq!(policy.next_delay(), None);
    }

    #[test]
    fn reset_restores_the_full_budget() {
        let mut policy = ReconnectPolicy::default();
        for _ in 0..5 {
            policy.next_delay();
        }
        assert!(policy.is_exhausted());
        policy.reset();
        assert_eq!(policy.attempt(), 0);
        assert_eq!(policy.next_delay(), Some(1_000));
    }

    #[test]
    fn state_predicates() {
        assert!(ConnectionState::Connected.is_connected());
        assert!(!ConnectionState::Disconnected.is_connected());
        assert!(ConnectionState::Connecting.is_connecting());
        assert!(ConnectionState::Authenticating.is_connecting());
        assert!(ConnectionState::Failed {
            reason: "x".to_string()
        }
        .is_failed());
    }

    #[test]
    fn state_transitions_are_published_once() {
        let bus = EventBus::new();
        let seen = Arc::new(Mutex::new(Vec::<serde_json::Value>::new()));
        let seen_clone = seen.clone();
        bus.on(CONNECTION_STATE_EVENT, move |payload| {
            seen_clone.lock().unwrap().push(payload.clone());
        });

        let state = SharedState::new(bus);
        assert_eq!(state.get(), ConnectionState::Disconnected);

        state.set(ConnectionState::Connecting);
        state.set(ConnectionState::Connecting); // deduplicated
        state.set(ConnectionState::Connected);

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0]["state"], "connecting");
        assert_eq!(seen[1]["state"], "connected");
    }

    #[test]
    fn failed_state_serializes_its_reason() {
        let value = serde_json::to_value(ConnectionState::Failed {
            reason: "gave up reconnecting after 5 attempts".to_string(),
        })
        .unwrap();
        assert_eq!(value["state"], "failed");
        assert_eq!(value["reason"], "gave up reconnecting after 5 attempts");
    }

    #[test]
    fn handle_send_fails_once_the_driver_is_gone() {
        let (sender, receiver) = futures_channel::mpsc::unbounded();
        let handle = RealtimeHandle::new(sender);
        drop(receiver);
        assert!(handle.join_room("ticket:T-1").is_err());
        // shutdown on a dead driver is still safe
        handle.shutdown();
    }
}
