use bytes::Bytes;
use sidemesh_core::{Endpoint, Request, Response};

use super::error::ListenerError;

/// Application value carried by a packet.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Request(Request),
    Response(Response),
    /// Anything that is not protocol traffic. Sidecars pass it through
    /// untouched.
    Raw(Bytes),
}

impl Payload {
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Request(_) => "request",
            Self::Response(_) => "response",
            Self::Raw(_) => "raw",
        }
    }

    /// # Errors
    ///
    /// Returns [`ListenerError::UnexpectedPayload`] unless this is a request.
    pub fn as_request(&self) -> Result<&Request, ListenerError> {
        match self {
            Self::Request(req) => Ok(req),
            other => Err(ListenerError::UnexpectedPayload {
                expected: "request",
                found: other.kind(),
            }),
        }
    }

    /// # Errors
    ///
    /// Returns [`ListenerError::UnexpectedPayload`] unless this is a response.
    pub fn as_response(&self) -> Result<&Response, ListenerError> {
        match self {
            Self::Response(resp) => Ok(resp),
            other => Err(ListenerError::UnexpectedPayload {
                expected: "response",
                found: other.kind(),
            }),
        }
    }
}

/// A unit of delivery through the fabric.
#[derive(Debug, Clone, PartialEq)]
pub struct Packet {
    pub src: Endpoint,
    pub dest: Endpoint,
    pub payload: Payload,
}

impl Packet {
    #[must_use]
    pub fn new(src: Endpoint, dest: Endpoint, payload: Payload) -> Self {
        Self { src, dest, payload }
    }

    #[must_use]
    pub fn request(src: Endpoint, dest: Endpoint, request: Request) -> Self {
        Self::new(src, dest, Payload::Request(request))
    }

    #[must_use]
    pub fn response(src: Endpoint, dest: Endpoint, response: Response) -> Self {
        Self::new(src, dest, Payload::Response(response))
    }

    /// Packet travelling back along this one's path, from `dest` to `src`.
    #[must_use]
    pub fn reply(&self, response: Response) -> Self {
        Self::response(self.dest.clone(), self.src.clone(), response)
    }
}
