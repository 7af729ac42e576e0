use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sidemesh_core::Endpoint;
use tracing::{debug, warn};

use crate::mq::{Message, Producer, Topic};
use crate::network::{Fabric, Packet, Payload, Socket, SocketListener, TransportError};

/// Direction tag of an access-log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Direction {
    SendReq,
    SendResp,
    RecvReq,
    RecvResp,
}

impl Direction {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::SendReq => "SEND_REQ",
            Self::SendResp => "SEND_RESP",
            Self::RecvReq => "RECV_REQ",
            Self::RecvResp => "RECV_RESP",
        }
    }
}

/// One access-log record as produced to the queue (JSON encoded).
///
/// `source` is always the local side: the sender for `SEND_*`, the receiver
/// for `RECV_*`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessLogEntry {
    pub direction: Direction,
    pub source: String,
    pub destination: String,
}

impl AccessLogEntry {
    fn outbound(packet: &Packet) -> Option<Self> {
        let direction = match packet.payload {
            Payload::Request(_) => Direction::SendReq,
            Payload::Response(_) => Direction::SendResp,
            Payload::Raw(_) => return None,
        };
        Some(Self {
            direction,
            source: packet.src.to_string(),
            destination: packet.dest.to_string(),
        })
    }

    fn inbound(packet: &Packet) -> Option<Self> {
        let direction = match packet.payload {
            Payload::Request(_) => Direction::RecvReq,
            Payload::Response(_) => Direction::RecvResp,
            Payload::Raw(_) => return None,
        };
        Some(Self {
            direction,
            source: packet.dest.to_string(),
            destination: packet.src.to_string(),
        })
    }
}

impl fmt::Display for AccessLogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (verb, what, prep) = match self.direction {
            Direction::SendReq => ("send", "request", "to"),
            Direction::SendResp => ("send", "response", "to"),
            Direction::RecvReq => ("receive", "request", "from"),
            Direction::RecvResp => ("receive", "response", "from"),
        };
        write!(
            f,
            "[{}][{}]{verb} http {what} {prep} {}",
            self.source,
            self.direction.as_str(),
            self.destination
        )
    }
}

/// Records every request and response crossing the wrapped socket.
///
/// Raw payloads are not logged. The packet itself is always forwarded
/// unchanged, whether or not producing the log line succeeded.
pub struct AccessLogSidecar {
    inner: Arc<dyn Socket>,
    producer: Arc<dyn Producer>,
    topic: Topic,
}

impl AccessLogSidecar {
    #[must_use]
    pub fn new(
        inner: Arc<dyn Socket>,
        producer: Arc<dyn Producer>,
        topic: impl Into<Topic>,
    ) -> Self {
        Self {
            inner,
            producer,
            topic: topic.into(),
        }
    }

    fn record(&self, entry: Option<AccessLogEntry>) {
        let Some(entry) = entry else {
            return;
        };
        debug!(
            direction = entry.direction.as_str(),
            source = %entry.source,
            destination = %entry.destination,
            "{entry}"
        );
        let payload = match serde_json::to_string(&entry) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(error = %e, "could not encode access log entry");
                return;
            }
        };
        if let Err(e) = self.producer.produce(Message::new(self.topic.clone(), payload)) {
            warn!(topic = %self.topic, error = %e, "could not produce access log entry");
        }
    }
}

#[async_trait]
impl Socket for AccessLogSidecar {
    fn fabric(&self) -> &Arc<Fabric> {
        self.inner.fabric()
    }

    fn listen(self: Arc<Self>, endpoint: Endpoint) -> Result<(), TransportError> {
        let fabric = Arc::clone(self.fabric());
        fabric.bind(endpoint, self)
    }

    fn close(&self, endpoint: &Endpoint) {
        self.inner.close(endpoint);
    }

    fn send(&self, packet: Packet) -> Result<(), TransportError> {
        self.record(AccessLogEntry::outbound(&packet));
        self.inner.send(packet)
    }

    async fn receive(&self, packet: Packet) {
        self.record(AccessLogEntry::inbound(&packet));
        self.inner.receive(packet).await;
    }

    fn add_listener(&self, listener: Arc<dyn SocketListener>) {
        self.inner.add_listener(listener);
    }
}
