//! Client map for one service instance, plus the preallocated scratch
//! vector used to fan an event out to every client's backend.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::header::{ClientId, MethodId};

use super::proxy_router::ProxyRouter;
use super::EventBackend;

/// Capacity is grown in increments of this many entries whenever a new
/// client is added, to amortize allocation of the scratch vector.
const SCRATCH_GROWTH_STEP: usize = 10;

struct MapperState {
    clients: HashMap<ClientId, Arc<ProxyRouter>>,
    /// Reused across `get_all_event_xfs` calls; cleared and refilled
    /// each time rather than reallocated.
    scratch: Vec<Arc<dyn EventBackend>>,
}

/// Maps each client of one service instance to its [`ProxyRouter`], and
/// lets an incoming event be fanned out to every client currently
/// subscribed to it.
pub struct RouterMapper {
    state: Mutex<MapperState>,
}

impl RouterMapper {
    /// Create an empty mapper.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MapperState {
                clients: HashMap::new(),
                scratch: Vec::new(),
            }),
        }
    }

    /// Register `router` for `client_id`.
    ///
    /// # Panics
    ///
    /// Panics if a router is already registered for this client id.
    pub fn add_client(&self, client_id: ClientId, router: Arc<ProxyRouter>) {
        let mut state = self.state.lock().unwrap();
        if state.clients.insert(client_id, router).is_some() {
            panic!("duplicate router registered for client {client_id}");
        }
        if state.scratch.capacity() < state.clients.len() {
            state.scratch.reserve(SCRATCH_GROWTH_STEP);
        }
    }

    /// Remove the router registered for `client_id`, if any.
    pub fn remove_client(&self, client_id: ClientId) {
        self.state.lock().unwrap().clients.remove(&client_id);
    }

    /// Number of clients currently registered.
    pub fn client_count(&self) -> usize {
        self.state.lock().unwrap().clients.len()
    }

    /// The router registered for `client_id`, if any.
    pub fn get_router(&self, client_id: ClientId) -> Option<Arc<ProxyRouter>> {
        self.state.lock().unwrap().clients.get(&client_id).cloned()
    }

    /// Collect every client's backend for `event_id`, reusing the
    /// mapper's scratch vector.
    pub fn get_all_event_xfs(&self, event_id: MethodId) -> Vec<Arc<dyn EventBackend>> {
        let mut state = self.state.lock().unwrap();
        state.scratch.clear();
        for router in state.clients.values() {
            if let Some(backend) = router.get_event_xf(event_id) {
                state.scratch.push(backend);
            }
        }
        state.scratch.clone()
    }

    /// Cascade a connection state change to every client's router.
    pub fn set_connection_state(&self, connected: bool) {
        for router in self.state.lock().unwrap().clients.values() {
            router.set_connection_state(connected);
        }
    }

    /// Cascade a service discovery availability change to every
    /// client's router.
    pub fn set_service_state(&self, available: bool) {
        for router in self.state.lock().unwrap().clients.values() {
            router.set_service_state(available);
        }
    }
}

impl Default for RouterMapper {
    fn default() -> Self {
        Self::new()
    }
}
