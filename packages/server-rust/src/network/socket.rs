//! Duplex packet channel with observer fan-out.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use sidemesh_core::Endpoint;
use tracing::debug;

use super::error::{ListenerError, TransportError};
use super::fabric::Fabric;
use super::packet::Packet;

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// Observer invoked for every packet a socket receives.
#[async_trait]
pub trait SocketListener: Send + Sync {
    /// Handles one packet. An error is logged by the socket and does not stop
    /// delivery to the listeners registered after this one.
    async fn handle(&self, packet: &Packet) -> Result<(), ListenerError>;
}

/// Socket capability shared by the plain socket and every sidecar wrapping
/// one.
///
/// Whichever value is outermost in a sidecar stack is what gets bound in the
/// fabric, so inbound packets traverse the whole stack on `receive`.
#[async_trait]
pub trait Socket: Send + Sync {
    /// Fabric this socket binds into and sends through.
    fn fabric(&self) -> &Arc<Fabric>;

    /// Binds this socket at `endpoint`.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::EndpointAlreadyBound`] if the endpoint is
    /// taken.
    fn listen(self: Arc<Self>, endpoint: Endpoint) -> Result<(), TransportError>;

    /// Releases the binding at `endpoint`.
    fn close(&self, endpoint: &Endpoint);

    /// Hands a packet to the fabric for delivery.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::ConnectionRefused`] if the destination is
    /// not bound.
    fn send(&self, packet: Packet) -> Result<(), TransportError>;

    /// Entry point the fabric calls on delivery.
    async fn receive(&self, packet: Packet);

    fn add_listener(&self, listener: Arc<dyn SocketListener>);
}

// ---------------------------------------------------------------------------
// DefaultSocket
// ---------------------------------------------------------------------------

/// The raw socket every sidecar stack bottoms out in.
///
/// `receive` calls each listener in registration order on the delivery
/// task.
pub struct DefaultSocket {
    fabric: Arc<Fabric>,
    listeners: RwLock<Vec<Arc<dyn SocketListener>>>,
}

impl DefaultSocket {
    #[must_use]
    pub fn new(fabric: Arc<Fabric>) -> Self {
        Self {
            fabric,
            listeners: RwLock::new(Vec::new()),
        }
    }
}

#[async_trait]
impl Socket for DefaultSocket {
    fn fabric(&self) -> &Arc<Fabric> {
        &self.fabric
    }

    fn listen(self: Arc<Self>, endpoint: Endpoint) -> Result<(), TransportError> {
        let fabric = Arc::clone(&self.fabric);
        fabric.bind(endpoint, self)
    }

    fn close(&self, endpoint: &Endpoint) {
        self.fabric.unbind(endpoint);
    }

    fn send(&self, packet: Packet) -> Result<(), TransportError> {
        self.fabric.send(packet)
    }

    async fn receive(&self, packet: Packet) {
        // Snapshot so no lock is held across listener awaits.
        let listeners = self.listeners.read().clone();
        for listener in listeners {
            if let Err(e) = listener.handle(&packet).await {
                debug!(
                    src = %packet.src,
                    dest = %packet.dest,
                    payload = packet.payload.kind(),
                    error = %e,
                    "listener failed"
                );
            }
        }
    }

    fn add_listener(&self, listener: Arc<dyn SocketListener>) {
        self.listeners.write().push(listener);
    }
}

// ---------------------------------------------------------------------------
// Test support
// ---------------------------------------------------------------------------

/// Listener that records every packet it sees.
#[cfg(test)]
#[derive(Default)]
pub(crate) struct RecordingListener {
    seen: parking_lot::Mutex<Vec<Packet>>,
}

#[cfg(test)]
impl RecordingListener {
    pub(crate) fn packets(&self) -> Vec<Packet> {
        self.seen.lock().clone()
    }

    /// Polls until at least `n` packets arrived, giving up after a second.
    pub(crate) async fn wait_for(&self, n: usize) -> Vec<Packet> {
        for _ in 0..100 {
            let packets = self.packets();
            if packets.len() >= n {
                return packets;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        panic!("expected {n} packets, saw {}", self.packets().len());
    }
}

#[cfg(test)]
#[async_trait]
impl SocketListener for RecordingListener {
    async fn handle(&self, packet: &Packet) -> Result<(), ListenerError> {
        self.seen.lock().push(packet.clone());
        Ok(())
    }
}
