//! Socket decorators and the factories that assemble them.
//!
//! Every sidecar implements [`Socket`] and delegates to an inner one, so
//! stacks are built by plain composition. The standard stack puts access
//! logging outermost and admission control innermost:
//!
//! ```text
//! AccessLogSidecar -> AdmissionControlSidecar -> DefaultSocket
//! ```

pub mod access_log;
pub mod admission;
pub mod admission_state;

use std::sync::Arc;

pub use access_log::{AccessLogEntry, AccessLogSidecar, Direction};
pub use admission::AdmissionControlSidecar;
pub use admission_state::{AdmissionContext, AdmissionState};

use crate::config::{AdmissionConfig, MeshConfig, SidecarKind};
use crate::mq::{Producer, Topic};
use crate::network::{DefaultSocket, Fabric, Socket};

/// Creates one fresh socket stack per call.
///
/// Each listening endpoint and each client gets its own stack, so admission
/// counters are never shared between them.
pub trait SidecarFactory: Send + Sync {
    fn create(&self) -> Arc<dyn Socket>;
}

impl<F> SidecarFactory for F
where
    F: Fn() -> Arc<dyn Socket> + Send + Sync,
{
    fn create(&self) -> Arc<dyn Socket> {
        (self)()
    }
}

/// Plain sockets with no decorators.
pub struct RawSocketFactory {
    fabric: Arc<Fabric>,
}

impl RawSocketFactory {
    #[must_use]
    pub fn new(fabric: Arc<Fabric>) -> Self {
        Self { fabric }
    }
}

impl SidecarFactory for RawSocketFactory {
    fn create(&self) -> Arc<dyn Socket> {
        Arc::new(DefaultSocket::new(Arc::clone(&self.fabric)))
    }
}

/// Access logging over admission control over a plain socket.
pub struct AllInOneFactory {
    fabric: Arc<Fabric>,
    producer: Arc<dyn Producer>,
    topic: Topic,
    admission: AdmissionConfig,
}

impl AllInOneFactory {
    #[must_use]
    pub fn new(
        fabric: Arc<Fabric>,
        producer: Arc<dyn Producer>,
        topic: impl Into<Topic>,
        admission: AdmissionConfig,
    ) -> Self {
        Self {
            fabric,
            producer,
            topic: topic.into(),
            admission,
        }
    }
}

impl SidecarFactory for AllInOneFactory {
    fn create(&self) -> Arc<dyn Socket> {
        let raw: Arc<dyn Socket> = Arc::new(DefaultSocket::new(Arc::clone(&self.fabric)));
        let admission: Arc<dyn Socket> =
            Arc::new(AdmissionControlSidecar::new(raw, self.admission.clone()));
        Arc::new(AccessLogSidecar::new(
            admission,
            Arc::clone(&self.producer),
            self.topic.clone(),
        ))
    }
}

/// Picks the factory `config.sidecar` names.
#[must_use]
pub fn factory_for(
    config: &MeshConfig,
    fabric: Arc<Fabric>,
    producer: Arc<dyn Producer>,
) -> Arc<dyn SidecarFactory> {
    match config.sidecar {
        SidecarKind::Raw => Arc::new(RawSocketFactory::new(fabric)),
        SidecarKind::AllInOne => Arc::new(AllInOneFactory::new(
            fabric,
            producer,
            config.access_log_topic.as_str(),
            config.admission.clone(),
        )),
    }
}
