//! Request routing server.
//!
//! Routes are keyed by method, then by a uri pattern matched by substring
//! containment. When several patterns of the same method are contained in
//! the incoming uri the longest one wins; equal lengths go to the earliest
//! registration.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use parking_lot::RwLock;
use sidemesh_core::{Endpoint, Method, Request, Response, StatusCode};
use tracing::trace;

use crate::network::{ListenerError, Packet, Socket, SocketListener, TransportError};

/// Detail of the 400 sent for a request without method or uri.
pub const INVALID_REQUEST_DETAIL: &str = "uri or method is invalid";

/// Detail of the 404 sent when no pattern matches.
pub const NO_HANDLER_DETAIL: &str = "can not find handler of uri";

// ---------------------------------------------------------------------------
// Handler
// ---------------------------------------------------------------------------

/// Turns a request into a response.
///
/// Implemented for any `Fn(Request) -> impl Future<Output = Response>`.
#[async_trait]
pub trait Handler: Send + Sync {
    async fn handle(&self, request: Request) -> Response;
}

#[async_trait]
impl<F, Fut> Handler for F
where
    F: Fn(Request) -> Fut + Send + Sync,
    Fut: Future<Output = Response> + Send,
{
    async fn handle(&self, request: Request) -> Response {
        (self)(request).await
    }
}

// ---------------------------------------------------------------------------
// RouteTable
// ---------------------------------------------------------------------------

struct Route {
    pattern: String,
    handler: Arc<dyn Handler>,
}

#[derive(Default)]
struct RouteTable {
    routes: RwLock<HashMap<Method, Vec<Route>>>,
}

impl RouteTable {
    fn insert(&self, method: Method, pattern: String, handler: Arc<dyn Handler>) {
        let mut routes = self.routes.write();
        let list = routes.entry(method).or_default();
        if let Some(existing) = list.iter_mut().find(|r| r.pattern == pattern) {
            existing.handler = handler;
        } else {
            list.push(Route { pattern, handler });
        }
    }

    /// Picks the handler for `request`, or the error response to send back.
    fn resolve(&self, request: &Request) -> Result<Arc<dyn Handler>, Response> {
        let id = request.id();
        let Some(method) = request.method().filter(|_| request.is_valid()) else {
            return Err(Response::of(id, StatusCode::BadRequest)
                .with_problem_details(INVALID_REQUEST_DETAIL));
        };

        let routes = self.routes.read();
        let Some(list) = routes.get(&method).filter(|list| !list.is_empty()) else {
            let status = StatusCode::MethodNotAllowed;
            return Err(Response::of(id, status).with_problem_details(status.reason()));
        };

        let mut best: Option<&Route> = None;
        for route in list.iter().filter(|r| request.uri().contains(r.pattern.as_str())) {
            let longer = match best {
                Some(b) => route.pattern.len() > b.pattern.len(),
                None => true,
            };
            if longer {
                best = Some(route);
            }
        }
        best.map(|route| Arc::clone(&route.handler)).ok_or_else(|| {
            Response::of(id, StatusCode::NotFound).with_problem_details(NO_HANDLER_DETAIL)
        })
    }
}

/// Socket listener dispatching inbound requests through the route table.
struct Dispatcher {
    routes: Arc<RouteTable>,
    socket: Weak<dyn Socket>,
}

#[async_trait]
impl SocketListener for Dispatcher {
    async fn handle(&self, packet: &Packet) -> Result<(), ListenerError> {
        let request = packet.payload.as_request()?;
        let id = request.id();
        let response = match self.routes.resolve(request) {
            Ok(handler) => handler.handle(request.clone()).await,
            Err(rejection) => rejection,
        };
        trace!(
            request_id = %id,
            uri = request.uri(),
            status = response.status().code(),
            "request served"
        );

        let socket = self.socket.upgrade().ok_or(ListenerError::SocketGone)?;
        socket.send(packet.reply(response.relayed_to(id)))?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Server
// ---------------------------------------------------------------------------

/// Serves requests arriving at one endpoint.
///
/// Responses go out through the same socket the request came in on, from
/// the request's destination back to its source.
pub struct Server {
    socket: Arc<dyn Socket>,
    endpoint: Endpoint,
    routes: Arc<RouteTable>,
}

impl Server {
    /// Creates a server on `socket`. Nothing is bound until [`Server::start`].
    #[must_use]
    pub fn new(socket: Arc<dyn Socket>, endpoint: Endpoint) -> Self {
        let routes = Arc::new(RouteTable::default());
        socket.add_listener(Arc::new(Dispatcher {
            routes: Arc::clone(&routes),
            socket: Arc::downgrade(&socket),
        }));
        Self {
            socket,
            endpoint,
            routes,
        }
    }

    #[must_use]
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Registers `handler` for `method` requests whose uri contains
    /// `pattern`. Registering the same pattern again replaces its handler.
    pub fn route(
        &self,
        method: Method,
        pattern: impl Into<String>,
        handler: impl Handler + 'static,
    ) {
        self.routes.insert(method, pattern.into(), Arc::new(handler));
    }

    pub fn get(&self, pattern: impl Into<String>, handler: impl Handler + 'static) {
        self.route(Method::Get, pattern, handler);
    }

    pub fn post(&self, pattern: impl Into<String>, handler: impl Handler + 'static) {
        self.route(Method::Post, pattern, handler);
    }

    pub fn put(&self, pattern: impl Into<String>, handler: impl Handler + 'static) {
        self.route(Method::Put, pattern, handler);
    }

    pub fn delete(&self, pattern: impl Into<String>, handler: impl Handler + 'static) {
        self.route(Method::Delete, pattern, handler);
    }

    /// Binds the endpoint and starts accepting requests.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::EndpointAlreadyBound`] if the endpoint is
    /// taken.
    pub fn start(&self) -> Result<(), TransportError> {
        Arc::clone(&self.socket).listen(self.endpoint.clone())
    }

    /// Unbinds the endpoint. Requests already being handled still complete.
    pub fn shutdown(&self) {
        self.socket.close(&self.endpoint);
    }
}
