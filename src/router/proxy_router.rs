//! Event/method/fire-and-forget backend maps for one service client
//! instance.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use crate::header::MethodId;

use super::router_connector::RouterConnector;
use super::{EventBackend, FireAndForgetBackend, MethodBackend};

/// Routes incoming events, method responses, and fire-and-forget
/// confirmations for one service client instance to the backend
/// registered for each id.
pub struct ProxyRouter {
    event_backends: HashMap<MethodId, Arc<dyn EventBackend>>,
    method_backends: HashMap<MethodId, Arc<dyn MethodBackend>>,
    fnf_backends: HashMap<MethodId, Arc<dyn FireAndForgetBackend>>,
    connector: Weak<RouterConnector>,
}

impl ProxyRouter {
    /// Create an empty router bound to `connector`.
    pub fn new(connector: Weak<RouterConnector>) -> Self {
        Self {
            event_backends: HashMap::new(),
            method_backends: HashMap::new(),
            fnf_backends: HashMap::new(),
            connector,
        }
    }

    /// The connector this router belongs to, if it is still alive.
    pub fn connector(&self) -> Option<Arc<RouterConnector>> {
        self.connector.upgrade()
    }

    /// Register a backend for `event_id`.
    ///
    /// # Panics
    ///
    /// Panics if a backend is already registered for this event id; this
    /// is a usage error, not a recoverable condition.
    pub fn add_event_xf(&mut self, event_id: MethodId, backend: Arc<dyn EventBackend>) {
        if self.event_backends.insert(event_id, backend).is_some() {
            panic!("duplicate event backend registered for event {event_id}");
        }
    }

    /// Look up the backend registered for `event_id`.
    pub fn get_event_xf(&self, event_id: MethodId) -> Option<Arc<dyn EventBackend>> {
        self.event_backends.get(&event_id).cloned()
    }

    /// Register a backend for `method_id`.
    ///
    /// # Panics
    ///
    /// Panics if a backend is already registered for this method id.
    pub fn add_method_xf(&mut self, method_id: MethodId, backend: Arc<dyn MethodBackend>) {
        if self.method_backends.insert(method_id, backend).is_some() {
            panic!("duplicate method backend registered for method {method_id}");
        }
    }

    /// Look up the backend registered for `method_id`.
    pub fn get_method_xf(&self, method_id: MethodId) -> Option<Arc<dyn MethodBackend>> {
        self.method_backends.get(&method_id).cloned()
    }

    /// Register a fire-and-forget backend for `method_id`.
    ///
    /// # Panics
    ///
    /// Panics if a backend is already registered for this method id.
    pub fn add_fnf_xf(&mut self, method_id: MethodId, backend: Arc<dyn FireAndForgetBackend>) {
        if self.fnf_backends.insert(method_id, backend).is_some() {
            panic!("duplicate fire-and-forget backend registered for method {method_id}");
        }
    }

    /// Look up the fire-and-forget backend registered for `method_id`.
    pub fn get_fnf_xf(&self, method_id: MethodId) -> Option<Arc<dyn FireAndForgetBackend>> {
        self.fnf_backends.get(&method_id).cloned()
    }

    /// Cascade a connection state change to every registered backend.
    pub fn set_connection_state(&self, connected: bool) {
        for backend in self.event_backends.values() {
            backend.set_connection_state(connected);
        }
        for backend in self.method_backends.values() {
            backend.set_connection_state(connected);
        }
        for backend in self.fnf_backends.values() {
            backend.set_connection_state(connected);
        }
    }

    /// Cascade a service discovery availability change to every
    /// registered backend.
    pub fn set_service_state(&self, available: bool) {
        for backend in self.event_backends.values() {
            backend.set_service_state(available);
        }
        for backend in self.method_backends.values() {
            backend.set_service_state(available);
        }
        for backend in self.fnf_backends.values() {
            backend.set_service_state(available);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    struct CountingEventBackend {
        events: AtomicUsize,
        connected: AtomicBool,
    }

    impl super::super::RouterBackend for CountingEventBackend {
        fn set_connection_state(&self, connected: bool) {
            self.connected.store(connected, Ordering::SeqCst);
        }
        fn set_service_state(&self, _available: bool) {}
    }

    impl EventBackend for CountingEventBackend {
        fn on_event(&self, _event_id: MethodId, _payload: &[u8]) {
            self.events.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_add_and_get_event_backend() {
        let mut router = ProxyRouter::new(Weak::new());
        let backend = Arc::new(CountingEventBackend {
            events: AtomicUsize::new(0),
            connected: AtomicBool::new(false),
        });
        router.add_event_xf(MethodId::event(1), backend.clone());

        assert!(router.get_event_xf(MethodId::event(1)).is_some());
        assert!(router.get_event_xf(MethodId::event(2)).is_none());
    }

    #[test]
    #[should_panic(expected = "duplicate event backend")]
    fn test_duplicate_event_registration_panics() {
        let mut router = ProxyRouter::new(Weak::new());
        let backend = Arc::new(CountingEventBackend {
            events: AtomicUsize::new(0),
            connected: AtomicBool::new(false),
        });
        router.add_event_xf(MethodId::event(1), backend.clone());
        router.add_event_xf(MethodId::event(1), backend);
    }

    #[test]
    fn test_connection_state_cascades_to_backends() {
        let mut router = ProxyRouter::new(Weak::new());
        let backend = Arc::new(CountingEventBackend {
            events: AtomicUsize::new(0),
            connected: AtomicBool::new(false),
        });
        router.add_event_xf(MethodId::event(1), backend.clone());

        router.set_connection_state(true);
        assert!(backend.connected.load(Ordering::SeqCst));

        router.set_connection_state(false);
        assert!(!backend.connected.load(Ordering::SeqCst));
    }
}
