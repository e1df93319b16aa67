//! The realtime connection manager.
//!
//! Owns at most one live connection to the deskwire server. UI code creates
//! one manager per application root, hands it the shared [`EventBus`], and
//! calls [`initialize`](RealtimeManager::initialize) once a login token is
//! available. Everything else (reconnection, re-joining rooms, state
//! reporting) happens in the background driver task.

use serde_json::{json, Value};

use deskwire_shared::{protocol::events, ServerEvent, WsEnvelope};

use super::connection::{
    ConnectionState, EventSink, Shared, SharedState, TokenSource, WsConnection,
};
use crate::bus::{EventBus, HandlerId};
use crate::config::RealtimeConfig;
use crate::credentials;

pub struct RealtimeManager {
    config: RealtimeConfig,
    bus: EventBus,
    connection: Option<WsConnection>,
    token_source: TokenSource,
}

impl RealtimeManager {
    /// Create a manager wired to `bus`. No connection is opened until
    /// [`initialize`](Self::initialize) is called.
    pub fn new(bus: EventBus, config: RealtimeConfig) -> Self {
        Self {
            config,
            bus,
            connection: None,
            token_source: Shared::new(credentials::get),
        }
    }

    /// Replace the credential source; the default reads the token persisted
    /// by [`credentials`]. Call before [`initialize`](Self::initialize).
    #[cfg(not(target_arch = "wasm32"))]
    pub fn with_token_source(
        mut self,
        source: impl Fn() -> Option<String> + Send + Sync + 'static,
    ) -> Self {
        self.token_source = Shared::new(source);
        self
    }

    /// Replace the credential source; the default reads the token persisted
    /// by [`credentials`]. Call before [`initialize`](Self::initialize).
    #[cfg(target_arch = "wasm32")]
    pub fn with_token_source(mut self, source: impl Fn() -> Option<String> + 'static) -> Self {
        self.token_source = Shared::new(source);
        self
    }

    /// Read the stored credential and open the transport.
    ///
    /// A missing credential leaves the manager `Disconnected`, the expected
    /// state for a session that has not logged in yet, not an error. While
    /// a connection is established or in progress this is a no-op, so at
    /// most one transport ever exists per manager.
    pub fn initialize(&mut self) {
        let current = self.state();
        if current.is_connected() || current.is_connecting() {
            crate::log_debug!("initialize: connection already active ({:?})", current);
            return;
        }

        // Replace any driver that already ran to completion. Each driver
        // owns its own state cell, so a late write from the old one cannot
        // clobber the new connection's state.
        if let Some(old) = self.connection.take() {
            old.shutdown();
        }

        if (self.token_source)().is_none() {
            crate::log_info!("no stored credential; realtime stays offline until login");
            return;
        }

        self.connection = Some(WsConnection::new(
            self.config.clone(),
            self.token_source.clone(),
            SharedState::new(self.bus.clone()),
            self.event_sink(),
        ));
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        self.connection
            .as_ref()
            .map_or(ConnectionState::Disconnected, WsConnection::state)
    }

    /// The bus this manager publishes on.
    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// Join a room (a ticket, a chat, ...). Only sent while connected;
    /// otherwise ignored. Rooms are re-joined automatically after a
    /// reconnect, but a join requested while offline is dropped.
    pub fn subscribe(&self, room: &str) {
        if !self.state().is_connected() {
            crate::log_debug!("subscribe({}) ignored while not connected", room);
            return;
        }
        if let Some(connection) = &self.connection {
            if let Err(err) = connection.handle().join_room(room) {
                crate::log_warn!("join-room {} failed: {}", room, err);
            }
        }
    }

    /// Leave a previously joined room. Ignored while not connected.
    pub fn unsubscribe(&self, room: &str) {
        if !self.state().is_connected() {
            crate::log_debug!("unsubscribe({}) ignored while not connected", room);
            return;
        }
        if let Some(connection) = &self.connection {
            if let Err(err) = connection.handle().leave_room(room) {
                crate::log_warn!("leave-room {} failed: {}", room, err);
            }
        }
    }

    /// Send an application event to the server. Dropped with a warning
    /// while not connected; there is no outbound queue.
    pub fn publish(&self, event: &str, payload: Value) {
        if !self.state().is_connected() {
            crate::log_warn!("dropping publish of {} while not connected", event);
            return;
        }
        if let Some(connection) = &self.connection {
            if let Err(err) = connection.handle().publish(event, payload) {
                crate::log_warn!("publish of {} failed: {}", event, err);
            }
        }
    }

    /// Register a callback for a named event. Works in any connection
    /// state, so listeners can attach before a connection exists.
    #[cfg(not(target_arch = "wasm32"))]
    pub fn on(&self, event: &str, callback: impl Fn(&Value) + Send + Sync + 'static) -> HandlerId {
        self.bus.on(event, callback)
    }

    /// Register a callback for a named event. Works in any connection
    /// state, so listeners can attach before a connection exists.
    #[cfg(target_arch = "wasm32")]
    pub fn on(&self, event: &str, callback: impl Fn(&Value) + 'static) -> HandlerId {
        self.bus.on(event, callback)
    }

    /// Unregister a callback registered with [`on`](Self::on).
    pub fn off(&self, handle: &HandlerId) {
        self.bus.off(handle);
    }

    /// Close the transport and cancel any pending reconnect. Safe to call
    /// repeatedly; the manager can be re-initialized afterwards.
    pub fn teardown(&mut self) {
        if let Some(connection) = self.connection.take() {
            connection.shutdown();
        }
    }

    /// Forward inbound frames onto the bus.
    fn event_sink(&self) -> EventSink {
        let bus = self.bus.clone();
        Shared::new(move |frame: WsEnvelope<ServerEvent>| {
            let name = frame.payload.name();
            match frame.payload {
                ServerEvent::Error {
                    code,
                    message,
                    correlation_id,
                } => {
                    crate::log_warn!("server error {}: {}", code, message);
                    bus.emit(
                        events::SERVER_ERROR,
                        &json!({
                            "code": code,
                            "message": message,
                            "correlationId": correlation_id,
                        }),
                    );
                }
                // The driver consumes auth frames during the handshake.
                ServerEvent::AuthOk { .. } | ServerEvent::AuthError { .. } => {
                    crate::log_debug!("ignoring stray {} frame", name);
                }
                other => {
                    if let Some((event, payload)) = other.into_application_event() {
                        bus.emit(event, &payload);
                    }
                }
            }
        })
    }
}

impl Drop for RealtimeManager {
    fn drop(&mut self) {
        self.teardown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn offline_manager() -> RealtimeManager {
        RealtimeManager::new(
            EventBus::new(),
            RealtimeConfig::new("ws://localhost:9/api/ws"),
        )
        .with_token_source(|| None)
    }

    #[test]
    fn starts_disconnected() {
        let manager = offline_manager();
        assert_eq!(manager.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn missing_credential_is_not_an_error() {
        let mut manager = offline_manager();
        manager.initialize();
        assert_eq!(manager.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn subscribe_and_publish_while_disconnected_are_no_ops() {
        let manager = offline_manager();
        manager.subscribe("ticket:T-1");
        manager.unsubscribe("ticket:T-1");
        manager.publish("agent-typing", json!({ "ticketId": "T-1" }));
        assert_eq!(manager.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn teardown_is_idempotent() {
        let mut manager = offline_manager();
        manager.initialize();
        manager.teardown();
        manager.teardown();
        assert_eq!(manager.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn listeners_attach_before_any_connection() {
        let manager = offline_manager();
        let seen = Arc::new(Mutex::new(Vec::<Value>::new()));
        let seen_clone = seen.clone();
        let handle = manager.on("ticket-updated", move |payload| {
            seen_clone.lock().unwrap().push(payload.clone());
        });

        // Simulate what the driver does on an inbound frame.
        let sink = manager.event_sink();
        let payload = json!({ "ticketId": "T-9", "status": "pending" });
        sink(WsEnvelope::new(ServerEvent::TicketUpdated(payload.clone())));

        assert_eq!(seen.lock().unwrap().as_slice(), [payload]);

        manager.off(&handle);
        sink(WsEnvelope::new(ServerEvent::TicketUpdated(json!({}))));
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[test]
    fn server_faults_surface_on_the_bus_not_as_panics() {
        let manager = offline_manager();
        let seen = Arc::new(Mutex::new(Vec::<Value>::new()));
        let seen_clone = seen.clone();
        manager.on("error", move |payload| {
            seen_clone.lock().unwrap().push(payload.clone());
        });

        let sink = manager.event_sink();
        sink(WsEnvelope::new(ServerEvent::Error {
            code: "room_not_found".to_string(),
            message: "no such room".to_string(),
            correlation_id: Some("corr-3".to_string()),
        }));

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0]["code"], "room_not_found");
        assert_eq!(seen[0]["correlationId"], "corr-3");
    }
}
