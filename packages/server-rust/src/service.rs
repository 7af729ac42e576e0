//! Lifecycle of the services hosted on the mesh.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use sidemesh_core::Endpoint;
use tracing::{info, warn};

// ---------------------------------------------------------------------------
// MeshService trait
// ---------------------------------------------------------------------------

/// A component listening on one mesh endpoint.
///
/// Implemented by the registry and the mediator.
#[async_trait]
pub trait MeshService: Send + Sync {
    /// Unique name, e.g. `"registry"`.
    fn name(&self) -> &'static str;

    /// Where the service accepts requests once running.
    fn endpoint(&self) -> &Endpoint;

    /// Prepares state, registers routes and binds the endpoint.
    async fn run(&self) -> anyhow::Result<()>;

    /// Unbinds the endpoint. Requests already accepted still complete.
    async fn shutdown(&self) -> anyhow::Result<()>;
}

// ---------------------------------------------------------------------------
// ServiceHost
// ---------------------------------------------------------------------------

/// Runs services in registration order and shuts them down in reverse.
#[derive(Default)]
pub struct ServiceHost {
    services: RwLock<Vec<Arc<dyn MeshService>>>,
}

impl ServiceHost {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, service: Arc<dyn MeshService>) {
        self.services.write().push(service);
    }

    #[must_use]
    pub fn get_by_name(&self, name: &str) -> Option<Arc<dyn MeshService>> {
        self.services
            .read()
            .iter()
            .find(|s| s.name() == name)
            .map(Arc::clone)
    }

    /// Runs every service in registration order.
    ///
    /// # Errors
    ///
    /// Returns the first failing service's error. Services started before it
    /// are shut down again, newest first.
    pub async fn run_all(&self) -> anyhow::Result<()> {
        let services = self.services.read().clone();
        for (started, service) in services.iter().enumerate() {
            if let Err(e) = service.run().await {
                warn!(service = service.name(), error = %e, "service failed to start");
                for earlier in services[..started].iter().rev() {
                    if let Err(stop_err) = earlier.shutdown().await {
                        warn!(service = earlier.name(), error = %stop_err, "shutdown failed");
                    }
                }
                return Err(e.context(format!("starting {}", service.name())));
            }
            info!(service = service.name(), endpoint = %service.endpoint(), "service running");
        }
        Ok(())
    }

    /// Shuts every service down in reverse registration order.
    ///
    /// # Errors
    ///
    /// Returns the first error after attempting every shutdown.
    pub async fn shutdown_all(&self) -> anyhow::Result<()> {
        let services = self.services.read().clone();
        let mut first_err = None;
        for service in services.iter().rev() {
            match service.shutdown().await {
                Ok(()) => info!(service = service.name(), "service stopped"),
                Err(e) => {
                    warn!(service = service.name(), error = %e, "shutdown failed");
                    first_err.get_or_insert(e);
                }
            }
        }
        first_err.map_or(Ok(()), Err)
    }
}
