//! Request/response client with single-slot correlation.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use sidemesh_core::{Endpoint, Request, RequestId, Response, StatusCode};
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, trace};

use crate::config::ClientConfig;
use crate::network::{ListenerError, Packet, Socket, SocketListener, TransportError};

/// Detail of the response synthesized when the timeout elapses.
pub const TIMEOUT_DETAIL: &str = "http server response timeout";

/// Detail of the response synthesized when the mailbox closes mid-call.
pub const MAILBOX_CLOSED_DETAIL: &str = "connection is break";

/// Listener feeding inbound responses into the client's one-slot channel.
///
/// Only the response to the request currently in flight may take the slot;
/// anything else is dropped on arrival.
struct Mailbox {
    tx: parking_lot::Mutex<Option<mpsc::Sender<Response>>>,
    expected: parking_lot::Mutex<Option<RequestId>>,
}

impl Mailbox {
    fn new(tx: mpsc::Sender<Response>) -> Self {
        Self {
            tx: parking_lot::Mutex::new(Some(tx)),
            expected: parking_lot::Mutex::new(None),
        }
    }

    fn expect(&self, id: Option<RequestId>) {
        *self.expected.lock() = id;
    }

    fn close(&self) {
        self.tx.lock().take();
    }
}

#[async_trait]
impl SocketListener for Mailbox {
    async fn handle(&self, packet: &Packet) -> Result<(), ListenerError> {
        let response = packet.payload.as_response()?;
        let expected = *self.expected.lock();
        if expected != Some(response.request_id()) {
            debug!(got = %response.request_id(), ?expected, "dropping uncorrelated response");
            return Ok(());
        }
        let tx = self.tx.lock().clone().ok_or(ListenerError::MailboxClosed)?;
        tx.try_send(response.clone()).map_err(|e| match e {
            TrySendError::Full(_) => ListenerError::MailboxFull,
            TrySendError::Closed(_) => ListenerError::MailboxClosed,
        })
    }
}

/// Sends requests from an ephemeral endpoint and waits for the answer.
///
/// A client has room for one outstanding request. Concurrent `send` calls on
/// the same client queue up behind each other rather than interleaving.
/// A remote failure never surfaces as an `Err`: timeouts and a closed
/// mailbox come back as synthesized 504 and 500 responses, so callers branch
/// on status.
pub struct Client {
    socket: Arc<dyn Socket>,
    local: Endpoint,
    mailbox: Arc<Mailbox>,
    rx: tokio::sync::Mutex<mpsc::Receiver<Response>>,
    response_timeout: Duration,
}

impl Client {
    /// Binds `socket` on a random port of `ip` and wires up the mailbox.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::EndpointAlreadyBound`] when every attempted
    /// port was taken.
    pub fn connect(
        socket: Arc<dyn Socket>,
        ip: impl Into<String>,
        config: &ClientConfig,
    ) -> Result<Self, TransportError> {
        let ip = ip.into();
        let ports = config.ephemeral_ports.clone();

        let (tx, rx) = mpsc::channel(1);
        let mailbox = Arc::new(Mailbox::new(tx));
        socket.add_listener(mailbox.clone());

        let mut last_err =
            TransportError::EndpointAlreadyBound(Endpoint::new(ip.clone(), ports.start));
        for _ in 0..config.bind_attempts.max(1) {
            let port = if ports.is_empty() {
                ports.start
            } else {
                rand::rng().random_range(ports.clone())
            };
            let local = Endpoint::new(ip.clone(), port);
            match Arc::clone(&socket).listen(local.clone()) {
                Ok(()) => {
                    trace!(endpoint = %local, "client bound");
                    return Ok(Self {
                        socket,
                        local,
                        mailbox,
                        rx: tokio::sync::Mutex::new(rx),
                        response_timeout: config.response_timeout,
                    });
                }
                Err(e) => last_err = e,
            }
        }
        Err(last_err)
    }

    #[must_use]
    pub fn local_endpoint(&self) -> &Endpoint {
        &self.local
    }

    /// Sends `request` to `dest` and waits for its response.
    ///
    /// Any response left over from an earlier timed-out call is discarded
    /// first; responses carrying another request's id are skipped while
    /// waiting.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::ConnectionRefused`] if `dest` is not bound.
    pub async fn send(
        &self,
        dest: &Endpoint,
        request: Request,
    ) -> Result<Response, TransportError> {
        let mut rx = self.rx.lock().await;
        while let Ok(stale) = rx.try_recv() {
            debug!(request_id = %stale.request_id(), "dropping stale response");
        }

        let id = request.id();
        self.mailbox.expect(Some(id));
        let outcome = self.exchange(&mut rx, dest, request).await;
        self.mailbox.expect(None);
        outcome
    }

    async fn exchange(
        &self,
        rx: &mut mpsc::Receiver<Response>,
        dest: &Endpoint,
        request: Request,
    ) -> Result<Response, TransportError> {
        let id = request.id();
        self.socket
            .send(Packet::request(self.local.clone(), dest.clone(), request))?;

        let deadline = tokio::time::Instant::now() + self.response_timeout;
        loop {
            match tokio::time::timeout_at(deadline, rx.recv()).await {
                Err(_) => {
                    debug!(request_id = %id, dest = %dest, "response timed out");
                    return Ok(Response::of(id, StatusCode::GatewayTimeout)
                        .with_problem_details(TIMEOUT_DETAIL));
                }
                Ok(None) => {
                    return Ok(Response::of(id, StatusCode::InternalServerError)
                        .with_problem_details(MAILBOX_CLOSED_DETAIL));
                }
                Ok(Some(response)) if response.request_id() == id => return Ok(response),
                Ok(Some(other)) => {
                    debug!(
                        expected = %id,
                        got = %other.request_id(),
                        "skipping uncorrelated response"
                    );
                }
            }
        }
    }

    /// Unbinds the endpoint and closes the mailbox. A `send` in flight
    /// resolves with a 500.
    pub fn close(&self) {
        self.socket.close(&self.local);
        self.mailbox.close();
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use sidemesh_core::Method;

    use super::*;
    use crate::network::socket::RecordingListener;
    use crate::network::{DefaultSocket, Fabric};
    use crate::protocol::server::Server;

    fn raw_socket(fabric: &Arc<Fabric>) -> Arc<dyn Socket> {
        Arc::new(DefaultSocket::new(Arc::clone(fabric)))
    }

    fn connect(fabric: &Arc<Fabric>) -> Client {
        Client::connect(raw_socket(fabric), "10.0.0.5", &ClientConfig::default()).unwrap()
    }

    fn echo_server(fabric: &Arc<Fabric>, ep: Endpoint) -> Server {
        let server = Server::new(raw_socket(fabric), ep);
        server.get("/echo", |req: Request| async move {
            Response::of(req.id(), StatusCode::Ok).with_body(req.uri().to_string())
        });
        server.start().unwrap();
        server
    }

    #[tokio::test]
    async fn binds_in_the_ephemeral_range() {
        let fabric = Arc::new(Fabric::new());
        let client = connect(&fabric);
        let port = client.local_endpoint().port();
        assert!((10_000..20_000).contains(&port));
        assert!(fabric.is_bound(client.local_endpoint()));

        client.close();
        assert_eq!(fabric.bound_count(), 0);
    }

    #[tokio::test]
    async fn completes_with_the_server_response() {
        let fabric = Arc::new(Fabric::new());
        let server_ep = Endpoint::new("10.0.0.1", 80);
        let _server = echo_server(&fabric, server_ep.clone());
        let client = connect(&fabric);

        let request = Request::of(Method::Get, "/echo/x");
        let id = request.id();
        let response = client.send(&server_ep, request).await.unwrap();
        assert_eq!(response.status(), StatusCode::Ok);
        assert_eq!(response.request_id(), id);
        assert_eq!(response.body().as_text().unwrap(), "/echo/x");
    }

    #[tokio::test]
    async fn unbound_destination_is_refused() {
        let fabric = Arc::new(Fabric::new());
        let client = connect(&fabric);
        let nowhere = Endpoint::new("10.9.9.9", 80);
        let err = client
            .send(&nowhere, Request::of(Method::Get, "/"))
            .await
            .unwrap_err();
        assert_eq!(err, TransportError::ConnectionRefused(nowhere));
    }

    #[tokio::test(start_paused = true)]
    async fn silent_server_times_out_with_504() {
        let fabric = Arc::new(Fabric::new());
        // Bound but never answers.
        let silent_ep = Endpoint::new("10.0.0.2", 80);
        raw_socket(&fabric).listen(silent_ep.clone()).unwrap();

        let client = connect(&fabric);
        let response = client
            .send(&silent_ep, Request::of(Method::Get, "/"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::GatewayTimeout);
        assert_eq!(response.problem_details(), TIMEOUT_DETAIL);
    }

    #[tokio::test]
    async fn closing_mid_call_yields_500() {
        let fabric = Arc::new(Fabric::new());
        let silent_ep = Endpoint::new("10.0.0.2", 80);
        raw_socket(&fabric).listen(silent_ep.clone()).unwrap();

        let client = Arc::new(connect(&fabric));
        let pending = {
            let client = Arc::clone(&client);
            let dest = silent_ep.clone();
            tokio::spawn(async move { client.send(&dest, Request::of(Method::Get, "/")).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        client.close();

        let response = pending.await.unwrap().unwrap();
        assert_eq!(response.status(), StatusCode::InternalServerError);
        assert_eq!(response.problem_details(), MAILBOX_CLOSED_DETAIL);
    }

    #[tokio::test]
    async fn mailbox_rejects_non_response_payloads() {
        let (tx, _rx) = mpsc::channel(1);
        let mailbox = Mailbox::new(tx);
        let packet = Packet::request(
            Endpoint::new("a", 1),
            Endpoint::new("b", 2),
            Request::of(Method::Get, "/"),
        );
        assert_eq!(
            mailbox.handle(&packet).await,
            Err(ListenerError::UnexpectedPayload {
                expected: "response",
                found: "request",
            })
        );
    }

    #[tokio::test]
    async fn uncorrelated_responses_never_take_the_slot() {
        let (tx, mut rx) = mpsc::channel(1);
        let mailbox = Mailbox::new(tx);
        let mine = RequestId::next();
        let other = RequestId::next();
        let reply = |id| {
            Packet::response(
                Endpoint::new("b", 2),
                Endpoint::new("a", 1),
                Response::of(id, StatusCode::Ok),
            )
        };

        mailbox.expect(Some(mine));
        assert_eq!(mailbox.handle(&reply(other)).await, Ok(()));
        assert!(rx.try_recv().is_err());

        assert_eq!(mailbox.handle(&reply(mine)).await, Ok(()));
        // Slot is full now, yet a late straggler is still just dropped.
        assert_eq!(mailbox.handle(&reply(other)).await, Ok(()));
        assert_eq!(rx.try_recv().unwrap().request_id(), mine);
    }

    #[tokio::test(start_paused = true)]
    async fn late_answer_to_a_timed_out_call_does_not_cost_the_next_one() {
        let fabric = Arc::new(Fabric::new());
        let server_ep = Endpoint::new("10.0.0.1", 80);
        let server = Server::new(raw_socket(&fabric), server_ep.clone());
        server.get("/slow", |req: Request| async move {
            tokio::time::sleep(Duration::from_millis(3_500)).await;
            Response::of(req.id(), StatusCode::Ok).with_body("slow")
        });
        server.get("/fast", |req: Request| async move {
            tokio::time::sleep(Duration::from_millis(500)).await;
            Response::of(req.id(), StatusCode::Ok).with_body("fast")
        });
        server.start().unwrap();
        let client = connect(&fabric);

        let first = client
            .send(&server_ep, Request::of(Method::Get, "/slow"))
            .await
            .unwrap();
        assert_eq!(first.status(), StatusCode::GatewayTimeout);

        // Both answers land at t=3.5s.
        let second = client
            .send(&server_ep, Request::of(Method::Get, "/fast"))
            .await
            .unwrap();
        assert_eq!(second.status(), StatusCode::Ok);
        assert_eq!(second.body().as_text().unwrap(), "fast");
    }

    #[tokio::test]
    async fn stale_response_is_drained_before_sending() {
        let fabric = Arc::new(Fabric::new());
        let server_ep = Endpoint::new("10.0.0.1", 80);
        let _server = echo_server(&fabric, server_ep.clone());
        let client = connect(&fabric);

        // A response that slipped in just as its call gave up.
        let gone = RequestId::next();
        client.mailbox.expect(Some(gone));
        let stale = Packet::response(
            server_ep.clone(),
            client.local_endpoint().clone(),
            Response::of(gone, StatusCode::Ok).with_body("stale"),
        );
        client.mailbox.handle(&stale).await.unwrap();

        let nowhere = Endpoint::new("10.9.9.9", 80);
        assert!(client.send(&nowhere, Request::of(Method::Get, "/")).await.is_err());
        assert!(client.rx.lock().await.try_recv().is_err());

        let response = client
            .send(&server_ep, Request::of(Method::Get, "/echo/fresh"))
            .await
            .unwrap();
        assert_eq!(response.body().as_text().unwrap(), "/echo/fresh");
    }

    #[tokio::test]
    async fn responses_for_other_requests_are_skipped_while_waiting() {
        let fabric = Arc::new(Fabric::new());
        let server_ep = Endpoint::new("10.0.0.1", 80);
        let server_socket = raw_socket(&fabric);
        let inbox = Arc::new(RecordingListener::default());
        server_socket.add_listener(inbox.clone());
        Arc::clone(&server_socket).listen(server_ep.clone()).unwrap();

        let client = Arc::new(connect(&fabric));
        let pending = {
            let client = Arc::clone(&client);
            let dest = server_ep.clone();
            tokio::spawn(async move { client.send(&dest, Request::of(Method::Get, "/")).await })
        };

        let packets = inbox.wait_for(1).await;
        let request_id = packets[0].payload.as_request().unwrap().id();
        let other = Response::of(RequestId::next(), StatusCode::Ok).with_body("other");
        server_socket.send(packets[0].reply(other)).unwrap();
        let mine = Response::of(request_id, StatusCode::Ok).with_body("mine");
        server_socket.send(packets[0].reply(mine)).unwrap();

        let response = pending.await.unwrap().unwrap();
        assert_eq!(response.request_id(), request_id);
        assert_eq!(response.body().as_text().unwrap(), "mine");
    }

    #[tokio::test]
    async fn taken_ports_are_retried_until_attempts_run_out() {
        let fabric = Arc::new(Fabric::new());
        let taken = Endpoint::new("10.0.0.5", 10_000);
        raw_socket(&fabric).listen(taken.clone()).unwrap();

        let narrow = ClientConfig {
            ephemeral_ports: 10_000..10_001,
            bind_attempts: 3,
            ..ClientConfig::default()
        };
        let err = Client::connect(raw_socket(&fabric), "10.0.0.5", &narrow).err();
        assert_eq!(err, Some(TransportError::EndpointAlreadyBound(taken)));
        assert_eq!(fabric.bound_count(), 1);

        let wider = ClientConfig {
            ephemeral_ports: 10_000..10_002,
            bind_attempts: 64,
            ..ClientConfig::default()
        };
        let client = Client::connect(raw_socket(&fabric), "10.0.0.5", &wider).unwrap();
        assert_eq!(client.local_endpoint().port(), 10_001);
    }
}
