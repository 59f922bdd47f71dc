//! Links a service instance's router tree to the connection that
//! carries its traffic.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};

use crate::header::{ClientId, MethodId};

use super::router_mapper::RouterMapper;

/// Identifies one deployed instance of a service on the network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ServiceInstanceId(pub u16);

impl std::fmt::Display for ServiceInstanceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "0x{:04X}", self.0)
    }
}

/// What a [`RouterConnector`] needs from the connection that owns it,
/// to turn a router-level call into bytes on the wire. Implemented by
/// the connection proxy; kept as a trait here so this module does not
/// need to depend on the connection module.
pub trait ProxyHandle: Send + Sync {
    /// Send a request and expect a response to be routed back later.
    fn send_request(
        &self,
        service_instance: ServiceInstanceId,
        client_id: ClientId,
        method_id: MethodId,
        payload: &[u8],
    ) -> bool;

    /// Send a request with no response expected.
    fn send_request_no_return(
        &self,
        service_instance: ServiceInstanceId,
        client_id: ClientId,
        method_id: MethodId,
        payload: &[u8],
    ) -> bool;

    /// Subscribe to an event.
    fn subscribe_event(
        &self,
        service_instance: ServiceInstanceId,
        client_id: ClientId,
        event_id: MethodId,
    ) -> bool;

    /// Unsubscribe from an event.
    fn unsubscribe_event(
        &self,
        service_instance: ServiceInstanceId,
        client_id: ClientId,
        event_id: MethodId,
    ) -> bool;
}

/// Owns the per-service-instance [`RouterMapper`]s for one connection,
/// and a weak reference back to the connection itself.
pub struct RouterConnector {
    mappers: Mutex<HashMap<ServiceInstanceId, Arc<RouterMapper>>>,
    proxy: Mutex<Weak<dyn ProxyHandle>>,
}

impl RouterConnector {
    /// Create a connector with no mappers and no proxy yet attached.
    pub fn new() -> Self {
        Self {
            mappers: Mutex::new(HashMap::new()),
            proxy: Mutex::new(Weak::<NoProxy>::new() as Weak<dyn ProxyHandle>),
        }
    }

    /// Publish the connection proxy this connector should use to send.
    pub fn set_proxy(&self, proxy: Weak<dyn ProxyHandle>) {
        *self.proxy.lock().unwrap() = proxy;
    }

    /// The currently published proxy, if it is still alive.
    pub fn proxy(&self) -> Option<Arc<dyn ProxyHandle>> {
        self.proxy.lock().unwrap().upgrade()
    }

    /// Register `mapper` for `service_instance`.
    pub fn add_router_mapper(&self, service_instance: ServiceInstanceId, mapper: Arc<RouterMapper>) {
        self.mappers.lock().unwrap().insert(service_instance, mapper);
    }

    /// Remove the mapper for `service_instance` and return how many
    /// mappers remain, so the caller can decide whether the entire
    /// proxy-side tree for this connection can now be torn down.
    pub fn release_router_mapper(&self, service_instance: ServiceInstanceId) -> usize {
        let mut mappers = self.mappers.lock().unwrap();
        mappers.remove(&service_instance);
        mappers.len()
    }

    /// The mapper registered for `service_instance`, if any.
    pub fn get_router_mapper(&self, service_instance: ServiceInstanceId) -> Option<Arc<RouterMapper>> {
        self.mappers.lock().unwrap().get(&service_instance).cloned()
    }

    /// Cascade a connection-up transition to every mapper.
    pub fn on_connected(&self) {
        for mapper in self.mappers.lock().unwrap().values() {
            mapper.set_connection_state(true);
        }
    }

    /// Cascade a connection-down transition to every mapper.
    pub fn on_disconnected(&self) {
        for mapper in self.mappers.lock().unwrap().values() {
            mapper.set_connection_state(false);
        }
    }

    /// Cascade a service discovery availability change for
    /// `service_instance` to its mapper, if one is registered.
    pub fn set_service_state(&self, service_instance: ServiceInstanceId, available: bool) {
        if let Some(mapper) = self.get_router_mapper(service_instance) {
            mapper.set_service_state(available);
        }
    }
}

impl Default for RouterConnector {
    fn default() -> Self {
        Self::new()
    }
}

/// Placeholder type purely so `Weak::<NoProxy>::new()` has a concrete
/// type to coerce to `Weak<dyn ProxyHandle>` before a real proxy exists.
struct NoProxy;

impl ProxyHandle for NoProxy {
    fn send_request(&self, _: ServiceInstanceId, _: ClientId, _: MethodId, _: &[u8]) -> bool {
        false
    }
    fn send_request_no_return(&self, _: ServiceInstanceId, _: ClientId, _: MethodId, _: &[u8]) -> bool {
        false
    }
    fn subscribe_event(&self, _: ServiceInstanceId, _: ClientId, _: MethodId) -> bool {
        false
    }
    fn unsubscribe_event(&self, _: ServiceInstanceId, _: ClientId, _: MethodId) -> bool {
        false
    }
}
