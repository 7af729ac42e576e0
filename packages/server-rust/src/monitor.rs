//! Access-log monitor.
//!
//! Drains the access-log topic on a background task and turns every line
//! into a [`MonitorRecord`] row, so traffic can be tallied per endpoint and
//! direction after the fact.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use sidemesh_core::{ClockSource, SystemClock};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::MeshConfig;
use crate::mq::{Consumer, Topic};
use crate::sidecar::{AccessLogEntry, Direction};
use crate::storage::{StorageError, Store, StoreExt};

/// Table the monitor writes its records to.
pub const MONITOR_TABLE: &str = "monitor_records";

/// One observed packet, as seen by the endpoint that logged it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitorRecord {
    pub id: String,
    /// Local endpoint of the logging sidecar.
    pub endpoint: String,
    pub direction: Direction,
    pub peer: String,
    /// Ingestion time, milliseconds since the Unix epoch.
    pub timestamp: u64,
}

impl MonitorRecord {
    /// Parses one access-log line. Lines that are not access-log entries
    /// yield `None`.
    #[must_use]
    pub fn extract(line: &str, timestamp: u64) -> Option<Self> {
        let entry: AccessLogEntry = serde_json::from_str(line).ok()?;
        Some(Self {
            id: Uuid::new_v4().to_string(),
            endpoint: entry.source,
            direction: entry.direction,
            peer: entry.destination,
            timestamp,
        })
    }
}

struct Worker {
    shutdown_tx: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

struct Ingest {
    consumer: Arc<dyn Consumer>,
    store: Arc<dyn Store>,
    topic: Topic,
    clock: Arc<dyn ClockSource>,
}

impl Ingest {
    fn record(&self, line: &str) {
        let Some(record) = MonitorRecord::extract(line, self.clock.now()) else {
            debug!(topic = %self.topic, line, "skipping unparsable access log line");
            metrics::counter!("sidemesh_monitor_lines_total", "outcome" => "skipped")
                .increment(1);
            return;
        };
        if let Err(e) = self.store.insert_row(MONITOR_TABLE, &record.id, &record) {
            warn!(error = %e, "could not store monitor record");
            metrics::counter!("sidemesh_monitor_lines_total", "outcome" => "failed")
                .increment(1);
            return;
        }
        metrics::counter!(
            "sidemesh_monitor_lines_total",
            "outcome" => "stored",
            "direction" => record.direction.as_str()
        )
        .increment(1);
    }

    async fn run(self, mut shutdown_rx: oneshot::Receiver<()>) {
        loop {
            tokio::select! {
                message = self.consumer.consume(&self.topic) => match message {
                    Ok(message) => self.record(&message.payload),
                    Err(e) => {
                        warn!(topic = %self.topic, error = %e, "access log topic closed");
                        return;
                    }
                },
                _ = &mut shutdown_rx => break,
            }
        }
        // Lines already queued at shutdown still count.
        while let Some(message) = self.consumer.try_consume(&self.topic) {
            self.record(&message.payload);
        }
    }
}

/// Background consumer of the access-log topic.
pub struct AccessLogMonitor {
    consumer: Arc<dyn Consumer>,
    store: Arc<dyn Store>,
    topic: Topic,
    clock: Arc<dyn ClockSource>,
    worker: parking_lot::Mutex<Option<Worker>>,
}

impl AccessLogMonitor {
    #[must_use]
    pub fn new(config: &MeshConfig, consumer: Arc<dyn Consumer>, store: Arc<dyn Store>) -> Self {
        Self::with_clock(config, consumer, store, Arc::new(SystemClock))
    }

    #[must_use]
    pub fn with_clock(
        config: &MeshConfig,
        consumer: Arc<dyn Consumer>,
        store: Arc<dyn Store>,
        clock: Arc<dyn ClockSource>,
    ) -> Self {
        Self {
            consumer,
            store,
            topic: Topic::new(config.access_log_topic.as_str()),
            clock,
            worker: parking_lot::Mutex::new(None),
        }
    }

    /// Creates the record table and starts consuming. A second call while
    /// running does nothing.
    pub fn start(&self) {
        let mut worker = self.worker.lock();
        if worker.is_some() {
            return;
        }
        self.store.create_table_if_not_exists(MONITOR_TABLE);
        let ingest = Ingest {
            consumer: Arc::clone(&self.consumer),
            store: Arc::clone(&self.store),
            topic: self.topic.clone(),
            clock: Arc::clone(&self.clock),
        };
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let handle = tokio::spawn(ingest.run(shutdown_rx));
        *worker = Some(Worker { shutdown_tx, handle });
        info!(topic = %self.topic, "access log monitor started");
    }

    /// Stops consuming once the lines already queued are recorded.
    pub async fn stop(&self) {
        let Some(worker) = self.worker.lock().take() else {
            return;
        };
        let _ = worker.shutdown_tx.send(());
        if let Err(e) = worker.handle.await {
            warn!(error = %e, "access log monitor task failed");
        }
        info!(topic = %self.topic, "access log monitor stopped");
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.worker.lock().is_some()
    }

    /// Every record stored so far.
    ///
    /// # Errors
    ///
    /// [`StorageError::TableNotFound`] before the first `start`, or
    /// [`StorageError::Codec`].
    pub fn records(&self) -> Result<Vec<MonitorRecord>, StorageError> {
        self.store
            .query_by_visitor(MONITOR_TABLE, &|_: &str, _: &MonitorRecord| true)
    }

    /// Record counts per endpoint and direction.
    ///
    /// # Errors
    ///
    /// As [`AccessLogMonitor::records`].
    pub fn tally(&self) -> Result<BTreeMap<(String, Direction), usize>, StorageError> {
        let mut counts = BTreeMap::new();
        for record in self.records()? {
            *counts.entry((record.endpoint, record.direction)).or_insert(0) += 1;
        }
        Ok(counts)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use sidemesh_core::{Endpoint, ManualClock, Method, Request, Response, StatusCode};

    use super::*;
    use crate::config::ClientConfig;
    use crate::mq::{MemoryQueue, Message, Producer};
    use crate::network::{DefaultSocket, Fabric, Socket};
    use crate::protocol::{Client, Server};
    use crate::sidecar::AccessLogSidecar;
    use crate::storage::MemoryStore;

    const TOPIC: &str = "access_log.topic";

    fn line(direction: Direction, source: &str, destination: &str) -> String {
        serde_json::to_string(&AccessLogEntry {
            direction,
            source: source.to_string(),
            destination: destination.to_string(),
        })
        .unwrap()
    }

    fn monitor(queue: &Arc<MemoryQueue>) -> AccessLogMonitor {
        AccessLogMonitor::with_clock(
            &MeshConfig::default(),
            queue.clone(),
            Arc::new(MemoryStore::new()),
            Arc::new(ManualClock::new(42)),
        )
    }

    async fn settle(monitor: &AccessLogMonitor, n: usize) {
        for _ in 0..100 {
            if monitor.records().map(|r| r.len()).unwrap_or(0) >= n {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("monitor never stored {n} records");
    }

    #[test]
    fn extract_reads_the_logging_endpoint_and_direction() {
        let record = MonitorRecord::extract(
            &line(Direction::RecvReq, "192.168.1.1:8088", "192.168.1.91:80"),
            7,
        )
        .unwrap();
        assert_eq!(record.endpoint, "192.168.1.1:8088");
        assert_eq!(record.direction, Direction::RecvReq);
        assert_eq!(record.peer, "192.168.1.91:80");
        assert_eq!(record.timestamp, 7);
        assert!(MonitorRecord::extract("not json", 7).is_none());
        assert!(MonitorRecord::extract(r#"{"direction":"SIDEWAYS"}"#, 7).is_none());
    }

    #[tokio::test]
    async fn queued_lines_become_records() {
        let queue = Arc::new(MemoryQueue::new());
        let monitor = monitor(&queue);
        monitor.start();
        assert!(monitor.is_running());

        for (direction, source) in [
            (Direction::RecvReq, "10.0.0.1:80"),
            (Direction::SendResp, "10.0.0.1:80"),
            (Direction::RecvReq, "10.0.0.1:80"),
        ] {
            queue
                .produce(Message::new(TOPIC, line(direction, source, "10.0.0.5:12345")))
                .unwrap();
        }
        queue.produce(Message::new(TOPIC, "garbage")).unwrap();
        settle(&monitor, 3).await;

        let tally = monitor.tally().unwrap();
        assert_eq!(tally.len(), 2);
        assert_eq!(tally[&("10.0.0.1:80".to_string(), Direction::RecvReq)], 2);
        assert_eq!(tally[&("10.0.0.1:80".to_string(), Direction::SendResp)], 1);
        assert!(monitor.records().unwrap().iter().all(|r| r.timestamp == 42));

        monitor.stop().await;
        assert!(!monitor.is_running());
    }

    #[tokio::test]
    async fn stop_records_what_is_already_queued() {
        let queue = Arc::new(MemoryQueue::new());
        let monitor = monitor(&queue);
        monitor.start();
        monitor.start();
        for _ in 0..5 {
            queue
                .produce(Message::new(TOPIC, line(Direction::SendReq, "a:1", "b:2")))
                .unwrap();
        }
        monitor.stop().await;
        assert_eq!(monitor.records().unwrap().len(), 5);
        assert!(queue.try_consume(&Topic::new(TOPIC)).is_none());

        // Stopping twice is harmless.
        monitor.stop().await;
    }

    #[tokio::test]
    async fn records_traffic_through_an_access_log_sidecar() {
        let fabric = Arc::new(Fabric::new());
        let queue = Arc::new(MemoryQueue::new());
        let monitor = monitor(&queue);
        monitor.start();

        let logged = |fabric: &Arc<Fabric>| -> Arc<dyn Socket> {
            Arc::new(AccessLogSidecar::new(
                Arc::new(DefaultSocket::new(Arc::clone(fabric))),
                queue.clone(),
                TOPIC,
            ))
        };
        let server_ep = Endpoint::new("10.0.0.1", 80);
        let server = Server::new(logged(&fabric), server_ep.clone());
        server.get("/", |req: Request| async move { Response::of(req.id(), StatusCode::Ok) });
        server.start().unwrap();
        let client = Client::connect(logged(&fabric), "10.0.0.5", &ClientConfig::default()).unwrap();
        client
            .send(&server_ep, Request::of(Method::Get, "/"))
            .await
            .unwrap();
        settle(&monitor, 4).await;

        let tally = monitor.tally().unwrap();
        let client_ep = client.local_endpoint().to_string();
        assert_eq!(tally[&(client_ep.clone(), Direction::SendReq)], 1);
        assert_eq!(tally[&("10.0.0.1:80".to_string(), Direction::RecvReq)], 1);
        assert_eq!(tally[&("10.0.0.1:80".to_string(), Direction::SendResp)], 1);
        assert_eq!(tally[&(client_ep, Direction::RecvResp)], 1);
        monitor.stop().await;
    }
}
