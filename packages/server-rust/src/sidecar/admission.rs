use std::sync::Arc;

use async_trait::async_trait;
use sidemesh_core::{ClockSource, Endpoint, Response, StatusCode, SystemClock};
use tracing::debug;

use super::admission_state::AdmissionContext;
use crate::config::AdmissionConfig;
use crate::network::{Fabric, Packet, Payload, Socket, SocketListener, TransportError};

/// Detail of the 429 sent for a rejected request.
pub const REJECT_DETAIL: &str = "enter flow ctrl state";

/// Inbound admission control.
///
/// Only requests arriving on `receive` are checked. A rejected request is
/// answered with a 429 straight from this layer and never reaches the inner
/// socket's listeners. Everything else passes through untouched.
pub struct AdmissionControlSidecar {
    inner: Arc<dyn Socket>,
    ctx: AdmissionContext,
}

impl AdmissionControlSidecar {
    #[must_use]
    pub fn new(inner: Arc<dyn Socket>, config: AdmissionConfig) -> Self {
        Self::with_clock(inner, config, Arc::new(SystemClock))
    }

    #[must_use]
    pub fn with_clock(
        inner: Arc<dyn Socket>,
        config: AdmissionConfig,
        clock: Arc<dyn ClockSource>,
    ) -> Self {
        Self {
            inner,
            ctx: AdmissionContext::new(config, clock),
        }
    }

    #[must_use]
    pub fn context(&self) -> &AdmissionContext {
        &self.ctx
    }
}

#[async_trait]
impl Socket for AdmissionControlSidecar {
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
        self.inner.send(packet)
    }

    async fn receive(&self, packet: Packet) {
        let Payload::Request(request) = &packet.payload else {
            self.inner.receive(packet).await;
            return;
        };
        if self.ctx.try_accept() {
            self.inner.receive(packet).await;
            return;
        }

        let state = self.ctx.current_state();
        metrics::counter!("sidemesh_admission_rejected_total", "state" => state.as_str())
            .increment(1);
        let rejection = Response::of(request.id(), StatusCode::TooManyRequests)
            .with_problem_details(REJECT_DETAIL);
        if let Err(e) = self.inner.send(packet.reply(rejection)) {
            debug!(dest = %packet.src, error = %e, "could not deliver 429");
        }
    }

    fn add_listener(&self, listener: Arc<dyn SocketListener>) {
        self.inner.add_listener(listener);
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use sidemesh_core::{ManualClock, Method, Request};

    use super::*;
    use crate::network::socket::RecordingListener;
    use crate::network::DefaultSocket;
    use crate::sidecar::admission_state::AdmissionState;

    struct Fixture {
        fabric: Arc<Fabric>,
        clock: Arc<ManualClock>,
        sidecar: Arc<AdmissionControlSidecar>,
        handler_seen: Arc<RecordingListener>,
        caller_seen: Arc<RecordingListener>,
    }

    fn server_ep() -> Endpoint {
        Endpoint::new("10.0.0.1", 80)
    }

    fn caller_ep() -> Endpoint {
        Endpoint::new("10.0.0.2", 12_345)
    }

    fn fixture() -> Fixture {
        let fabric = Arc::new(Fabric::new());
        let clock = Arc::new(ManualClock::new(0));
        let config = AdmissionConfig {
            // Always reject outside Normal so outcomes are deterministic.
            minor_reject_percent: 100,
            major_reject_percent: 100,
            ..AdmissionConfig::default()
        };
        let sidecar = Arc::new(AdmissionControlSidecar::with_clock(
            Arc::new(DefaultSocket::new(Arc::clone(&fabric))),
            config,
            clock.clone(),
        ));
        let handler_seen = Arc::new(RecordingListener::default());
        sidecar.add_listener(handler_seen.clone());
        Arc::clone(&sidecar).listen(server_ep()).unwrap();

        let caller = Arc::new(DefaultSocket::new(Arc::clone(&fabric)));
        let caller_seen = Arc::new(RecordingListener::default());
        caller.add_listener(caller_seen.clone());
        caller.listen(caller_ep()).unwrap();

        Fixture {
            fabric,
            clock,
            sidecar,
            handler_seen,
            caller_seen,
        }
    }

    fn request_packet() -> Packet {
        Packet::request(caller_ep(), server_ep(), Request::of(Method::Get, "/x"))
    }

    #[tokio::test]
    async fn accepted_requests_reach_the_inner_socket() {
        let f = fixture();
        f.fabric.send(request_packet()).unwrap();
        f.handler_seen.wait_for(1).await;
        assert!(f.caller_seen.packets().is_empty());
    }

    #[tokio::test]
    async fn rejected_requests_get_429_and_never_reach_the_inner_socket() {
        let f = fixture();
        // Push the window into Minor.
        for _ in 0..20 {
            f.sidecar.receive(request_packet()).await;
        }
        let before = f.handler_seen.packets().len();
        f.clock.advance(Duration::from_secs(1));

        let packet = request_packet();
        let Payload::Request(req) = &packet.payload else {
            unreachable!()
        };
        let id = req.id();
        f.sidecar.receive(packet).await;
        assert_eq!(f.sidecar.context().current_state(), AdmissionState::Minor);

        let replies = f.caller_seen.wait_for(1).await;
        let reply = replies[0].payload.as_response().unwrap();
        assert_eq!(reply.status(), StatusCode::TooManyRequests);
        assert_eq!(reply.request_id(), id);
        assert_eq!(reply.problem_details(), REJECT_DETAIL);
        assert_eq!(replies[0].src, server_ep());
        assert_eq!(f.handler_seen.packets().len(), before);
    }

    #[tokio::test]
    async fn non_request_payloads_bypass_admission() {
        let f = fixture();
        for _ in 0..100 {
            f.sidecar.receive(request_packet()).await;
        }
        f.clock.advance(Duration::from_secs(1));

        let response = Packet::response(
            caller_ep(),
            server_ep(),
            Response::of(sidemesh_core::RequestId::next(), StatusCode::Ok),
        );
        let before = f.handler_seen.packets().len();
        f.sidecar.receive(response).await;
        assert_eq!(f.handler_seen.packets().len(), before + 1);
        assert_eq!(f.sidecar.context().current_state(), AdmissionState::Normal);
    }
}
