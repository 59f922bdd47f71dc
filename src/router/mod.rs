//! Proxy-side routing: event/method backend maps, client fan-out, and
//! the connector that ties a service instance's router tree to its
//! underlying connection.
//!
//! On a connection state change or a service discovery up/down signal,
//! the tree cascades `set_connection_state`/`set_service_state` down to
//! every registered backend; backends must tolerate either transition
//! arriving at any time.

mod proxy_router;
mod router_connector;
mod router_mapper;

pub use proxy_router::ProxyRouter;
pub use router_connector::{ProxyHandle, RouterConnector, ServiceInstanceId};
pub use router_mapper::RouterMapper;

use crate::header::MethodId;

/// Common lifecycle hooks every router backend receives, regardless of
/// whether it handles events, methods, or fire-and-forget calls.
pub trait RouterBackend: Send + Sync {
    /// The underlying connection came up or went down.
    fn set_connection_state(&self, connected: bool);

    /// Service discovery reported the service available or unavailable.
    fn set_service_state(&self, available: bool);
}

/// Receives deserialized event notifications, and subscription
/// acknowledgements, for one event id.
pub trait EventBackend: RouterBackend {
    /// A notification for this event arrived.
    fn on_event(&self, event_id: MethodId, payload: &[u8]);

    /// The skeleton accepted a `subscribe_event` call for this event.
    fn on_subscribe_ack(&self, event_id: MethodId) {
        let _ = event_id;
    }

    /// The skeleton rejected a `subscribe_event` call for this event.
    fn on_subscribe_nack(&self, event_id: MethodId) {
        let _ = event_id;
    }
}

/// Receives deserialized responses for one method id.
pub trait MethodBackend: RouterBackend {
    /// A successful response to a call on this method arrived.
    fn on_response(&self, method_id: MethodId, payload: &[u8]);

    /// An error response (protocol-level return code) to a call on this
    /// method arrived.
    fn on_error_response(&self, method_id: MethodId, payload: &[u8]) {
        let _ = (method_id, payload);
    }

    /// The skeleton reported an application-level error for a call on
    /// this method, distinct from a SOME/IP error return code.
    fn on_application_error(&self, method_id: MethodId, payload: &[u8]) {
        let _ = (method_id, payload);
    }
}

/// Receives delivery confirmation for request-no-return calls. No
/// response is expected, so there is nothing to dispatch back but the
/// lifecycle cascade.
pub trait FireAndForgetBackend: RouterBackend {}
