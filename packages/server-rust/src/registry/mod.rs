//! Service registry: profile management, subscriptions and discovery.
//!
//! | Method | Path                      | Input                          | Success |
//! |--------|---------------------------|--------------------------------|---------|
//! | PUT    | `/api/v1/service-profile` | profile body                   | 201     |
//! | POST   | `/api/v1/service-profile` | profile body                   | 200     |
//! | DELETE | `/api/v1/service-profile` | `service-id` header            | 204     |
//! | GET    | `/api/v1/service-profile` | `service-id`/`service-type` query | 200  |
//! | PUT    | `/api/v1/subscription`    | subscription body, empty id    | 201     |
//! | DELETE | `/api/v1/subscription`    | `subscription-id` header       | 204     |

pub mod discovery;
pub mod error;
pub mod management;
pub mod records;

use std::future::{ready, Ready};
use std::sync::Arc;

use async_trait::async_trait;
use sidemesh_core::{Endpoint, Request, Response};
use tracing::info;

pub use discovery::{discover, Discovery};
pub use error::RegistryError;
pub use management::{Management, Notifier};
pub use records::ServiceProfileRecord;

use crate::config::MeshConfig;
use crate::protocol::{Handler, Server};
use crate::service::MeshService;
use crate::sidecar::SidecarFactory;
use crate::storage::Store;

pub const REGION_TABLE: &str = "regions";
pub const PROFILE_TABLE: &str = "profiles";
pub const SUBSCRIPTION_TABLE: &str = "subscriptions";

pub const PROFILE_PATH: &str = "/api/v1/service-profile";
pub const SUBSCRIPTION_PATH: &str = "/api/v1/subscription";

pub const SERVICE_ID_HEADER: &str = "service-id";
pub const SUBSCRIPTION_ID_HEADER: &str = "subscription-id";
pub const SERVICE_ID_QUERY: &str = "service-id";
pub const SERVICE_TYPE_QUERY: &str = "service-type";

/// Adapts a synchronous handler method into a route [`Handler`].
fn handler<T>(target: &Arc<T>, op: fn(&T, Request) -> Response) -> impl Handler
where
    T: Send + Sync + 'static,
{
    let target = Arc::clone(target);
    move |request: Request| -> Ready<Response> { ready(op(target.as_ref(), request)) }
}

/// The registry service, listening on `registry_ip:service_port`.
pub struct Registry {
    store: Arc<dyn Store>,
    server: Server,
    management: Arc<Management>,
    discovery: Arc<Discovery>,
}

impl Registry {
    /// Builds the registry on a fresh socket from `factory`. Nothing is
    /// bound until [`MeshService::run`].
    #[must_use]
    pub fn new(
        config: &MeshConfig,
        store: Arc<dyn Store>,
        factory: Arc<dyn SidecarFactory>,
    ) -> Self {
        let endpoint = Endpoint::new(config.registry_ip.clone(), config.service_port);
        let server = Server::new(factory.create(), endpoint);
        let notifier = Notifier::new(
            Arc::clone(&store),
            factory,
            config.registry_ip.clone(),
            config.client.clone(),
        );
        Self {
            management: Arc::new(Management::new(Arc::clone(&store), notifier)),
            discovery: Arc::new(Discovery::new(Arc::clone(&store))),
            store,
            server,
        }
    }
}

#[async_trait]
impl MeshService for Registry {
    fn name(&self) -> &'static str {
        "registry"
    }

    fn endpoint(&self) -> &Endpoint {
        self.server.endpoint()
    }

    async fn run(&self) -> anyhow::Result<()> {
        for table in [REGION_TABLE, PROFILE_TABLE, SUBSCRIPTION_TABLE] {
            self.store.create_table_if_not_exists(table);
        }

        let m = &self.management;
        self.server.put(PROFILE_PATH, handler(m, Management::register));
        self.server.post(PROFILE_PATH, handler(m, Management::update));
        self.server.delete(PROFILE_PATH, handler(m, Management::deregister));
        self.server
            .get(PROFILE_PATH, handler(&self.discovery, Discovery::discovery));
        self.server.put(SUBSCRIPTION_PATH, handler(m, Management::subscribe));
        self.server
            .delete(SUBSCRIPTION_PATH, handler(m, Management::unsubscribe));

        self.server.start()?;
        info!(endpoint = %self.server.endpoint(), "registry listening");
        Ok(())
    }

    async fn shutdown(&self) -> anyhow::Result<()> {
        self.server.shutdown();
        Ok(())
    }
}
