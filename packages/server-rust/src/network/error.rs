use sidemesh_core::Endpoint;

/// Failures of the binding table and packet delivery.
///
/// Both are returned synchronously to the caller of `bind`/`send` and are
/// never retried by the fabric.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("endpoint {0} is already bound")]
    EndpointAlreadyBound(Endpoint),
    #[error("connection refused: nothing is bound at {0}")]
    ConnectionRefused(Endpoint),
}

/// Failure of a single socket listener while handling a packet.
///
/// Local to that listener: the socket logs it and keeps delivering to the
/// remaining listeners. The sender never sees it.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ListenerError {
    #[error("unexpected {found} payload, expected {expected}")]
    UnexpectedPayload {
        expected: &'static str,
        found: &'static str,
    },
    #[error("mailbox is closed")]
    MailboxClosed,
    #[error("mailbox is full")]
    MailboxFull,
    #[error("socket is no longer listening")]
    SocketGone,
    #[error(transparent)]
    Transport(#[from] TransportError),
}
