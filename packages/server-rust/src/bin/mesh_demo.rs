//! Runs a registry, a mediator and a sample `hello` service on one fabric,
//! then walks a request through them.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use sidemesh_core::{Endpoint, Method, Request, Response, ServiceProfile, StatusCode, Subscription};
use sidemesh_server::monitor::AccessLogMonitor;
use sidemesh_server::mq::MemoryQueue;
use sidemesh_server::network::Fabric;
use sidemesh_server::protocol::{Client, Server};
use sidemesh_server::registry::{PROFILE_PATH, SUBSCRIPTION_ID_HEADER, SUBSCRIPTION_PATH};
use sidemesh_server::sidecar::{factory_for, SidecarFactory};
use sidemesh_server::storage::MemoryStore;
use sidemesh_server::telemetry::init_tracing;
use sidemesh_server::{
    LogFormat, MeshConfig, MeshService, Registry, ServiceHost, ServiceMediator, SidecarKind,
};
use tokio::sync::mpsc;
use tracing::{info, warn};

/// sidemesh demo.
#[derive(Parser, Debug)]
#[command(name = "mesh-demo")]
#[command(about = "Register a service, then call it through the mediator")]
#[command(version)]
struct Cli {
    #[arg(long, env = "SIDEMESH_REGISTRY_IP", default_value = "192.168.0.1")]
    registry_ip: String,

    #[arg(long, env = "SIDEMESH_MEDIATOR_IP", default_value = "192.168.0.2")]
    mediator_ip: String,

    /// Address of the sample `hello` service.
    #[arg(long, default_value = "192.168.0.3")]
    hello_ip: String,

    #[arg(long, env = "SIDEMESH_SIDECAR", value_enum, default_value_t = SidecarKind::AllInOne)]
    sidecar: SidecarKind,

    #[arg(long, env = "SIDEMESH_LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

impl Cli {
    fn mesh_config(&self) -> MeshConfig {
        MeshConfig {
            registry_ip: self.registry_ip.clone(),
            mediator_ip: self.mediator_ip.clone(),
            sidecar: self.sidecar,
            log_format: self.log_format,
            ..MeshConfig::default()
        }
    }
}

const WATCHER_IP: &str = "192.168.0.4";
const CALLER_IP: &str = "192.168.0.9";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = cli.mesh_config();
    init_tracing(config.log_format)?;
    info!(
        sidecar = ?config.sidecar,
        registry = %config.registry_ip,
        mediator = %config.mediator_ip,
        "mesh-demo starting"
    );

    let fabric = Fabric::global();
    let queue = MemoryQueue::global();
    let factory = factory_for(&config, Arc::clone(&fabric), queue.clone());

    let monitor = AccessLogMonitor::new(&config, queue.clone(), MemoryStore::global());
    monitor.start();

    let host = ServiceHost::new();
    let registry = Arc::new(Registry::new(&config, MemoryStore::global(), Arc::clone(&factory)));
    let mediator = Arc::new(ServiceMediator::new(&config, Arc::clone(&factory)));
    host.register(registry.clone());
    host.register(mediator.clone());
    host.run_all().await?;

    let hello = Server::new(
        factory.create(),
        Endpoint::new(cli.hello_ip.clone(), config.service_port),
    );
    hello.get("/greeting", |req: Request| async move {
        Response::of(req.id(), StatusCode::Ok).with_body("hello from the mesh")
    });
    hello.start().context("starting hello service")?;

    let (tx, mut notifications) = mpsc::unbounded_channel();
    let watcher = Server::new(factory.create(), Endpoint::with_default_port(WATCHER_IP));
    watcher.post("/notify", move |req: Request| {
        let tx = tx.clone();
        async move {
            if let Ok(notification) = req.body().as_notification() {
                let _ = tx.send(notification.clone());
            }
            Response::of(req.id(), StatusCode::Ok)
        }
    });
    watcher.start().context("starting watcher")?;

    let client = Client::connect(factory.create(), CALLER_IP, &config.client)?;

    let subscription = Subscription::to_type(
        "watcher",
        "hello",
        format!("http://{WATCHER_IP}:{}/notify", config.service_port),
    );
    let response = client
        .send(
            registry.endpoint(),
            Request::of(Method::Put, SUBSCRIPTION_PATH).with_body(subscription),
        )
        .await?;
    info!(
        status = %response.status(),
        subscription_id = response.header(SUBSCRIPTION_ID_HEADER).unwrap_or_default(),
        "watcher subscribed to hello"
    );

    let profile = ServiceProfile::builder("hello-1", "hello")
        .endpoint(hello.endpoint().clone())
        .build();
    let response = client
        .send(
            registry.endpoint(),
            Request::of(Method::Put, PROFILE_PATH).with_body(profile),
        )
        .await?;
    info!(status = %response.status(), "hello-1 registered");

    match tokio::time::timeout(Duration::from_secs(1), notifications.recv()).await {
        Ok(Some(notification)) => info!(
            kind = ?notification.kind,
            service_id = %notification.profile.id,
            "watcher notified"
        ),
        _ => warn!("watcher heard nothing"),
    }

    let response = client
        .send(mediator.endpoint(), Request::of(Method::Get, "/hello/greeting"))
        .await?;
    info!(
        status = %response.status(),
        body = response.body().as_text().unwrap_or_default(),
        details = response.problem_details(),
        "called hello through the mediator"
    );

    client.close();
    monitor.stop().await;
    for ((endpoint, direction), count) in monitor.tally()? {
        info!(%endpoint, direction = direction.as_str(), count, "access log tally");
    }

    watcher.shutdown();
    hello.shutdown();
    host.shutdown_all().await?;
    info!(still_bound = fabric.bound_count(), "mesh-demo done");
    Ok(())
}
