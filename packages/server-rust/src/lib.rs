//! sidemesh server: an in-process service mesh.
//!
//! A [`network::Fabric`] stands in for the network. Sockets bind endpoints on
//! it and may be wrapped in [`sidecar`] decorators. A minimal request/response
//! [`protocol`] runs on top, and two services are built from it: the
//! [`registry`] (profiles, subscriptions, discovery) and the [`mediator`]
//! (discovery-driven forwarding). The [`monitor`] turns access-log lines
//! into stored records.

pub mod config;
pub mod mediator;
pub mod monitor;
pub mod mq;
pub mod network;
pub mod protocol;
pub mod registry;
pub mod service;
pub mod sidecar;
pub mod storage;
pub mod telemetry;

pub use config::{AdmissionConfig, ClientConfig, LogFormat, MeshConfig, SidecarKind};
pub use mediator::{Mediator, ServiceMediator};
pub use registry::Registry;
pub use service::{MeshService, ServiceHost};
