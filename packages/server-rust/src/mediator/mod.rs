//! Service mediator: resolves `/{serviceType}/{rest}` through discovery and
//! proxies the request to the chosen instance as `{rest}`.

pub mod service;

use async_trait::async_trait;
use sidemesh_core::{Request, Response, StatusCode};

pub use service::{Forwarder, ServiceMediator};

use crate::network::TransportError;

/// Forwards a request somewhere else and answers with what came back.
#[async_trait]
pub trait Mediator: Send + Sync {
    async fn forward(&self, request: Request) -> Response;
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ForwardError {
    #[error("uri {0:?} does not start with a service type segment")]
    InvalidTarget(String),
    #[error("discovery {service_type} failed: {detail}")]
    Discovery { service_type: String, detail: String },
    #[error("create client failed: {0}")]
    Client(TransportError),
    #[error("forward request failed: {0}")]
    Forward(TransportError),
}

impl ForwardError {
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::InvalidTarget(_) => StatusCode::BadRequest,
            _ => StatusCode::InternalServerError,
        }
    }
}

/// Splits a mediator uri into the service type and the uri to forward.
///
/// `/order/api/v1/task` becomes `("order", "/api/v1/task")`; `/order` alone
/// forwards to `/`.
///
/// # Errors
///
/// [`ForwardError::InvalidTarget`] when the uri has no leading `/` or its
/// first segment is empty.
pub fn split_target(uri: &str) -> Result<(&str, &str), ForwardError> {
    let invalid = || ForwardError::InvalidTarget(uri.to_string());
    let path = uri.strip_prefix('/').ok_or_else(invalid)?;
    let (service_type, rest) = match path.find('/') {
        Some(idx) => (&path[..idx], &path[idx..]),
        None => (path, "/"),
    };
    if service_type.is_empty() {
        return Err(invalid());
    }
    Ok((service_type, rest))
}
