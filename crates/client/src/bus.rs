//! In-process event fanout.
//!
//! The bus decouples transport callbacks from the UI components consuming
//! them: the connection manager emits named events, and arbitrary consumers
//! register callbacks without the manager knowing who is listening.
//!
//! There is deliberately no global instance. Create one bus per application
//! root and hand clones to whatever needs it; clones share the same
//! registry. Registration works in any connection state, so listeners can
//! attach before a connection exists.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use serde_json::Value;

#[cfg(not(target_arch = "wasm32"))]
type Handler = Arc<dyn Fn(&Value) + Send + Sync>;
#[cfg(target_arch = "wasm32")]
type Handler = std::rc::Rc<dyn Fn(&Value)>;

/// Returned by [`EventBus::on`]; pass it back to [`EventBus::off`] to
/// unregister the callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerId {
    event: String,
    id: u64,
}

/// Named-event fanout shared by the connection manager and UI components.
#[derive(Clone, Default)]
pub struct EventBus {
    inner: Arc<BusInner>,
}

#[derive(Default)]
struct BusInner {
    handlers: Mutex<HashMap<String, Vec<(u64, Handler)>>>,
    next_id: AtomicU64,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `callback` for `event`.
    #[cfg(not(target_arch = "wasm32"))]
    pub fn on(&self, event: &str, callback: impl Fn(&Value) + Send + Sync + 'static) -> HandlerId {
        self.register(event, Arc::new(callback))
    }

    /// Register `callback` for `event`.
    #[cfg(target_arch = "wasm32")]
    pub fn on(&self, event: &str, callback: impl Fn(&Value) + 'static) -> HandlerId {
        self.register(event, std::rc::Rc::new(callback))
    }

    fn register(&self, event: &str, callback: Handler) -> HandlerId {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let mut handlers = self.lock();
        handlers
            .entry(event.to_string())
            .or_default()
            .push((id, callback));
        HandlerId {
            event: event.to_string(),
            id,
        }
    }

    /// Unregister a callback. Unknown or already-removed handles are
    /// ignored.
    pub fn off(&self, handle: &HandlerId) {
        let mut handlers = self.lock();
        if let Some(list) = handlers.get_mut(&handle.event) {
            list.retain(|(id, _)| *id != handle.id);
            if list.is_empty() {
                handlers.remove(&handle.event);
            }
        }
    }

    /// Invoke every callback registered for `event` with `payload`.
    /// Events nobody listens to are dropped silently.
    pub fn emit(&self, event: &str, payload: &Value) {
        // Snapshot outside the lock so callbacks may register/unregister.
        let snapshot: Vec<Handler> = {
            let handlers = self.lock();
            handlers
                .get(event)
                .map(|list| list.iter().map(|(_, h)| h.clone()).collect())
                .unwrap_or_default()
        };
        for handler in snapshot {
            handler(payload);
        }
    }

    /// Number of callbacks currently registered for `event`.
    pub fn handler_count(&self, event: &str) -> usize {
        self.lock().get(event).map_or(0, Vec::len)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Vec<(u64, Handler)>>> {
        self.inner
            .handlers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn delivers_payload_unchanged() {
        let bus = EventBus::new();
        let seen = Arc::new(Mutex::new(Vec::<Value>::new()));
        let seen_clone = seen.clone();
        // Listener attached before anything ever emits
        bus.on("ticket-updated", move |payload| {
            seen_clone.lock().unwrap().push(payload.clone());
        });

        let payload = json!({ "ticketId": "T-1", "fields": { "priority": "high" } });
        bus.emit("ticket-updated", &payload);

        let seen = seen.lock().unwrap();
        assert_eq!(seen.as_slice(), [payload]);
    }

    #[test]
    fn fans_out_to_every_listener() {
        let bus = EventBus::new();
        let count = Arc::new(std::sync::atomic::AtomicU64::new(0));
        for _ in 0..3 {
            let count = count.clone();
            bus.on("new-message", move |_| {
                count.fetch_add(1, Ordering::Relaxed);
            });
        }
        bus.emit("new-message", &json!({}));
        assert_eq!(count.load(Ordering::Relaxed), 3);
    }

    #[test]
    fn off_removes_only_that_handle() {
        let bus = EventBus::new();
        let count = Arc::new(std::sync::atomic::AtomicU64::new(0));
        let c1 = count.clone();
        let h1 = bus.on("notification", move |_| {
            c1.fetch_add(1, Ordering::Relaxed);
        });
        let c2 = count.clone();
        let _h2 = bus.on("notification", move |_| {
            c2.fetch_add(10, Ordering::Relaxed);
        });

        bus.off(&h1);
        bus.emit("notification", &json!({}));
        assert_eq!(count.load(Ordering::Relaxed), 10);
        assert_eq!(bus.handler_count("notification"), 1);

        // Double-off is harmless
        bus.off(&h1);
        assert_eq!(bus.handler_count("notification"), 1);
    }

    #[test]
    fn emit_without_listeners_is_a_no_op() {
        let bus = EventBus::new();
        bus.emit("user-typing", &json!({ "userId": "u-1" }));
        assert_eq!(bus.handler_count("user-typing"), 0);
    }

    #[test]
    fn clones_share_one_registry() {
        let bus = EventBus::new();
        let other = bus.clone();
        let count = Arc::new(std::sync::atomic::AtomicU64::new(0));
        let c = count.clone();
        other.on("user-online", move |_| {
            c.fetch_add(1, Ordering::Relaxed);
        });
        bus.emit("user-online", &json!({}));
        assert_eq!(count.load(Ordering::Relaxed), 1);
    }
}
