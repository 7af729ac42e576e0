//! Configuration for mesh components.

use std::ops::Range;
use std::time::Duration;

use clap::ValueEnum;

/// Which socket stack services and clients are built on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum SidecarKind {
    /// Plain socket, no decorators.
    Raw,
    /// Access logging outermost, admission control innermost.
    #[default]
    AllInOne,
}

/// Output format of the tracing subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Thresholds of the admission-control state machine.
///
/// Rates are attempts per second measured over at least one `window`.
#[derive(Debug, Clone)]
pub struct AdmissionConfig {
    /// Minimum time between state re-evaluations.
    pub window: Duration,
    /// Rates at or below this stay `Normal`.
    pub minor_rate_threshold: u64,
    /// Rates above this go `Major`.
    pub major_rate_threshold: u64,
    /// Share of requests rejected in `Minor`, in percent.
    pub minor_reject_percent: u32,
    /// Share of requests rejected in `Major`, in percent.
    pub major_reject_percent: u32,
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            window: Duration::from_secs(1),
            minor_rate_threshold: 10,
            major_rate_threshold: 50,
            minor_reject_percent: 20,
            major_reject_percent: 50,
        }
    }
}

/// Protocol client settings.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// How long `send` waits before synthesizing a 504.
    pub response_timeout: Duration,
    /// Ports the client picks its ephemeral endpoint from.
    pub ephemeral_ports: Range<u16>,
    /// Fresh ports tried before giving up on binding.
    pub bind_attempts: u32,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            response_timeout: Duration::from_secs(3),
            ephemeral_ports: 10_000..20_000,
            bind_attempts: 8,
        }
    }
}

/// Addresses and policies shared by the registry, the mediator and the
/// services they front.
#[derive(Debug, Clone)]
pub struct MeshConfig {
    pub registry_ip: String,
    pub mediator_ip: String,
    /// Port every service listens on.
    pub service_port: u16,
    pub sidecar: SidecarKind,
    /// Queue topic access-log lines are produced to.
    pub access_log_topic: String,
    pub admission: AdmissionConfig,
    pub client: ClientConfig,
    pub log_format: LogFormat,
}

impl Default for MeshConfig {
    fn default() -> Self {
        Self {
            registry_ip: "192.168.0.1".to_string(),
            mediator_ip: "192.168.0.2".to_string(),
            service_port: 80,
            sidecar: SidecarKind::default(),
            access_log_topic: "access_log.topic".to_string(),
            admission: AdmissionConfig::default(),
            client: ClientConfig::default(),
            log_format: LogFormat::default(),
        }
    }
}
