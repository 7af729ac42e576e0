use std::sync::Arc;

use async_trait::async_trait;
use sidemesh_core::{Endpoint, Method, Request, Response, ServiceProfile};
use tracing::{debug, info, warn};

use super::{split_target, ForwardError, Mediator};
use crate::config::{ClientConfig, MeshConfig};
use crate::protocol::{Client, Server};
use crate::registry::{PROFILE_PATH, SERVICE_TYPE_QUERY};
use crate::service::MeshService;
use crate::sidecar::SidecarFactory;

/// Resolves service types through the registry and relays requests.
///
/// Stateless: every discovery and every forwarded request uses its own
/// fresh client, closed as soon as the answer is in.
pub struct Forwarder {
    registry: Endpoint,
    local_ip: String,
    factory: Arc<dyn SidecarFactory>,
    client: ClientConfig,
}

impl Forwarder {
    #[must_use]
    pub fn new(
        registry: Endpoint,
        local_ip: impl Into<String>,
        factory: Arc<dyn SidecarFactory>,
        client: ClientConfig,
    ) -> Self {
        Self {
            registry,
            local_ip: local_ip.into(),
            factory,
            client,
        }
    }

    fn connect(&self) -> Result<Client, ForwardError> {
        Client::connect(self.factory.create(), self.local_ip.clone(), &self.client)
            .map_err(ForwardError::Client)
    }

    /// Asks the registry for the best instance of `service_type`.
    async fn discover(&self, service_type: &str) -> Result<ServiceProfile, ForwardError> {
        let failed = |detail: String| ForwardError::Discovery {
            service_type: service_type.to_string(),
            detail,
        };
        let client = self.connect()?;
        let request = Request::of(Method::Get, PROFILE_PATH)
            .with_query_param(SERVICE_TYPE_QUERY, service_type);
        let response = client
            .send(&self.registry, request)
            .await
            .map_err(|e| failed(e.to_string()))?;
        if !response.is_success() {
            let detail = if response.problem_details().is_empty() {
                response.status().to_string()
            } else {
                response.problem_details().to_string()
            };
            return Err(failed(detail));
        }
        response
            .into_body()
            .into_profile()
            .map_err(|e| failed(e.to_string()))
    }

    async fn try_forward(&self, request: &Request) -> Result<Response, ForwardError> {
        let (service_type, rest) = split_target(request.uri())?;
        let profile = self.discover(service_type).await?;
        debug!(
            service_type,
            instance = %profile.id,
            endpoint = %profile.endpoint,
            uri = rest,
            "forwarding"
        );

        let client = self.connect()?;
        client
            .send(&profile.endpoint, request.forwarded(rest))
            .await
            .map_err(ForwardError::Forward)
    }
}

#[async_trait]
impl Mediator for Forwarder {
    async fn forward(&self, request: Request) -> Response {
        let id = request.id();
        match self.try_forward(&request).await {
            Ok(downstream) => Response::of(id, downstream.status())
                .with_headers(downstream.headers().clone())
                .with_problem_details(downstream.problem_details())
                .with_body(downstream.into_body()),
            Err(e) => {
                warn!(uri = request.uri(), error = %e, "forward failed");
                Response::of(id, e.status()).with_problem_details(e.to_string())
            }
        }
    }
}

/// The mediator service, listening on `mediator_ip:service_port` and
/// forwarding every method.
pub struct ServiceMediator {
    server: Server,
    forwarder: Arc<Forwarder>,
}

impl ServiceMediator {
    #[must_use]
    pub fn new(config: &MeshConfig, factory: Arc<dyn SidecarFactory>) -> Self {
        let endpoint = Endpoint::new(config.mediator_ip.clone(), config.service_port);
        let server = Server::new(factory.create(), endpoint);
        let forwarder = Forwarder::new(
            Endpoint::new(config.registry_ip.clone(), config.service_port),
            config.mediator_ip.clone(),
            factory,
            config.client.clone(),
        );
        Self {
            server,
            forwarder: Arc::new(forwarder),
        }
    }
}

#[async_trait]
impl Mediator for ServiceMediator {
    async fn forward(&self, request: Request) -> Response {
        self.forwarder.forward(request).await
    }
}

#[async_trait]
impl MeshService for ServiceMediator {
    fn name(&self) -> &'static str {
        "mediator"
    }

    fn endpoint(&self) -> &Endpoint {
        self.server.endpoint()
    }

    async fn run(&self) -> anyhow::Result<()> {
        for method in [Method::Get, Method::Post, Method::Put, Method::Delete] {
            let forwarder = Arc::clone(&self.forwarder);
            self.server.route(method, "/", move |request: Request| {
                let forwarder = Arc::clone(&forwarder);
                async move { forwarder.forward(request).await }
            });
        }
        self.server.start()?;
        info!(endpoint = %self.server.endpoint(), "mediator listening");
        Ok(())
    }

    async fn shutdown(&self) -> anyhow::Result<()> {
        self.server.shutdown();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use sidemesh_core::{Region, StatusCode};

    use super::*;
    use crate::network::Fabric;
    use crate::registry::Registry;
    use crate::sidecar::RawSocketFactory;
    use crate::storage::MemoryStore;

    struct Mesh {
        fabric: Arc<Fabric>,
        factory: Arc<RawSocketFactory>,
        registry: Registry,
        mediator: ServiceMediator,
        client: Client,
    }

    async fn mesh() -> Mesh {
        let fabric = Arc::new(Fabric::new());
        let factory = Arc::new(RawSocketFactory::new(Arc::clone(&fabric)));
        let config = MeshConfig::default();
        let registry = Registry::new(&config, Arc::new(MemoryStore::new()), factory.clone());
        registry.run().await.unwrap();
        let mediator = ServiceMediator::new(&config, factory.clone());
        mediator.run().await.unwrap();
        let client = Client::connect(factory.create(), "10.0.0.50", &ClientConfig::default()).unwrap();
        Mesh {
            fabric,
            factory,
            registry,
            mediator,
            client,
        }
    }

    impl Mesh {
        /// Starts an instance of `svcA` at `ip:80` and registers it.
        async fn instance(&self, id: &str, ip: &str) -> Server {
            let server = Server::new(self.factory.create(), Endpoint::with_default_port(ip));
            let tag = id.to_string();
            server.get("/", move |req: Request| {
                let tag = tag.clone();
                async move {
                    Response::of(req.id(), StatusCode::Ok)
                        .with_header("served-by", tag)
                        .with_body(req.uri().to_string())
                }
            });
            server.start().unwrap();

            let profile = ServiceProfile::builder(id, "svcA")
                .endpoint(server.endpoint().clone())
                .region(Region::new("r1", "beijing", "China"))
                .build();
            let registered = self
                .client
                .send(
                    self.registry.endpoint(),
                    Request::of(Method::Put, PROFILE_PATH).with_body(profile),
                )
                .await
                .unwrap();
            assert_eq!(registered.status(), StatusCode::Created);
            server
        }

        async fn via_mediator(&self, request: Request) -> Response {
            self.client
                .send(self.mediator.endpoint(), request)
                .await
                .unwrap()
        }
    }

    #[tokio::test]
    async fn forwards_with_the_service_segment_stripped() {
        let mesh = mesh().await;
        let _instance = mesh.instance("svcA-1", "10.0.0.3").await;

        let request = Request::of(Method::Get, "/svcA/x/y").with_header("trace", "t1");
        let id = request.id();
        let response = mesh.via_mediator(request).await;

        assert_eq!(response.status(), StatusCode::Ok);
        assert_eq!(response.request_id(), id);
        assert_eq!(response.body().as_text().unwrap(), "/x/y");
        assert_eq!(response.header("served-by"), Some("svcA-1"));
    }

    #[tokio::test]
    async fn bare_service_segment_forwards_to_root() {
        let mesh = mesh().await;
        let _instance = mesh.instance("svcA-1", "10.0.0.3").await;
        let response = mesh.via_mediator(Request::of(Method::Get, "/svcA")).await;
        assert_eq!(response.body().as_text().unwrap(), "/");
    }

    #[tokio::test]
    async fn downstream_errors_are_relayed_unchanged() {
        let mesh = mesh().await;
        let _instance = mesh.instance("svcA-1", "10.0.0.3").await;
        let response = mesh.via_mediator(Request::of(Method::Delete, "/svcA/x")).await;
        assert_eq!(response.status(), StatusCode::MethodNotAllowed);
        assert_eq!(response.problem_details(), "Method Not Allowed");
    }

    #[tokio::test]
    async fn unknown_service_type_is_a_500() {
        let mesh = mesh().await;
        let response = mesh.via_mediator(Request::of(Method::Get, "/nothing/x")).await;
        assert_eq!(response.status(), StatusCode::InternalServerError);
        assert!(response
            .problem_details()
            .starts_with("discovery nothing failed: "));
    }

    #[tokio::test]
    async fn missing_service_segment_is_a_400() {
        let mesh = mesh().await;
        let response = mesh.via_mediator(Request::of(Method::Post, "/")).await;
        assert_eq!(response.status(), StatusCode::BadRequest);
    }

    #[tokio::test]
    async fn vanished_instance_is_a_500_with_the_transport_error() {
        let mesh = mesh().await;
        let instance = mesh.instance("svcA-1", "10.0.0.3").await;
        instance.shutdown();

        let response = mesh.via_mediator(Request::of(Method::Get, "/svcA/x")).await;
        assert_eq!(response.status(), StatusCode::InternalServerError);
        assert!(response.problem_details().contains("connection refused"));
    }

    #[tokio::test]
    async fn forward_clients_are_released() {
        let mesh = mesh().await;
        let _instance = mesh.instance("svcA-1", "10.0.0.3").await;
        let before = mesh.fabric.bound_count();
        mesh.via_mediator(Request::of(Method::Get, "/svcA/x")).await;
        assert_eq!(mesh.fabric.bound_count(), before);
    }
}
