//! Process-wide binding table and asynchronous packet delivery.

use std::sync::{Arc, OnceLock};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use sidemesh_core::Endpoint;
use tracing::trace;

use super::error::TransportError;
use super::packet::Packet;
use super::socket::Socket;

/// Maps endpoints to the sockets bound on them and delivers packets.
///
/// Delivery is fire-and-forget: [`Fabric::send`] schedules the destination
/// socket's `receive` on its own task and returns immediately. Consecutive
/// packets between the same pair of endpoints may be processed in any order.
///
/// Tests build their own instance with [`Fabric::new`]; long-running
/// processes can share [`Fabric::global`].
pub struct Fabric {
    bindings: DashMap<Endpoint, Arc<dyn Socket>>,
}

impl Fabric {
    #[must_use]
    pub fn new() -> Self {
        Self {
            bindings: DashMap::new(),
        }
    }

    /// The shared process-wide fabric, created on first use.
    #[must_use]
    pub fn global() -> Arc<Self> {
        static GLOBAL: OnceLock<Arc<Fabric>> = OnceLock::new();
        Arc::clone(GLOBAL.get_or_init(|| Arc::new(Self::new())))
    }

    /// Binds `socket` at `endpoint`.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::EndpointAlreadyBound`] if another socket
    /// already occupies the endpoint. The existing binding is left intact.
    pub fn bind(&self, endpoint: Endpoint, socket: Arc<dyn Socket>) -> Result<(), TransportError> {
        match self.bindings.entry(endpoint) {
            Entry::Occupied(occupied) => {
                Err(TransportError::EndpointAlreadyBound(occupied.key().clone()))
            }
            Entry::Vacant(vacant) => {
                trace!(endpoint = %vacant.key(), "bound");
                vacant.insert(socket);
                Ok(())
            }
        }
    }

    /// Removes the binding at `endpoint`, if any.
    pub fn unbind(&self, endpoint: &Endpoint) {
        if self.bindings.remove(endpoint).is_some() {
            trace!(endpoint = %endpoint, "unbound");
        }
    }

    #[must_use]
    pub fn is_bound(&self, endpoint: &Endpoint) -> bool {
        self.bindings.contains_key(endpoint)
    }

    #[must_use]
    pub fn bound_count(&self) -> usize {
        self.bindings.len()
    }

    /// Hands `packet` to the socket bound at `packet.dest`.
    ///
    /// Must be called from within a Tokio runtime: the socket's `receive`
    /// runs on a freshly spawned task and the caller gets no confirmation of
    /// processing.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::ConnectionRefused`] if nothing is bound at
    /// the destination. The packet is dropped without being observed.
    pub fn send(&self, packet: Packet) -> Result<(), TransportError> {
        let socket = self
            .bindings
            .get(&packet.dest)
            .map(|entry| Arc::clone(entry.value()));

        let Some(socket) = socket else {
            metrics::counter!("sidemesh_packets_refused_total").increment(1);
            return Err(TransportError::ConnectionRefused(packet.dest));
        };

        metrics::counter!("sidemesh_packets_sent_total").increment(1);
        tokio::spawn(async move {
            socket.receive(packet).await;
        });
        Ok(())
    }
}

impl Default for Fabric {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Fabric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Fabric")
            .field("bindings", &self.bindings.len())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
