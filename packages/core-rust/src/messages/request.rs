use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::{Body, Method, RequestId};

/// An HTTP-like request.
///
/// Built with [`Request::new`] and the chainable `with_*` methods. Each
/// request carries a fresh [`RequestId`] that the matching response echoes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Request {
    id: RequestId,
    method: Option<Method>,
    uri: String,
    query_params: BTreeMap<String, String>,
    headers: BTreeMap<String, String>,
    body: Body,
}

impl Default for Request {
    fn default() -> Self {
        Self::new()
    }
}

impl Request {
    /// Empty request with a fresh id and no method (structurally invalid
    /// until a method and uri are set).
    #[must_use]
    pub fn new() -> Self {
        Self {
            id: RequestId::next(),
            method: None,
            uri: String::new(),
            query_params: BTreeMap::new(),
            headers: BTreeMap::new(),
            body: Body::Empty,
        }
    }

    /// Shorthand for `Request::new().with_method(method).with_uri(uri)`.
    #[must_use]
    pub fn of(method: Method, uri: impl Into<String>) -> Self {
        Self::new().with_method(method).with_uri(uri)
    }

    #[must_use]
    pub fn with_method(mut self, method: Method) -> Self {
        self.method = Some(method);
        self
    }

    #[must_use]
    pub fn with_uri(mut self, uri: impl Into<String>) -> Self {
        self.uri = uri.into();
        self
    }

    #[must_use]
    pub fn with_query_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query_params.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn with_body(mut self, body: impl Into<Body>) -> Self {
        self.body = body.into();
        self
    }

    /// Copy of this request aimed at `uri`, under a fresh id.
    ///
    /// Method, query params, headers and body carry over unchanged.
    #[must_use]
    pub fn forwarded(&self, uri: impl Into<String>) -> Self {
        Self {
            id: RequestId::next(),
            uri: uri.into(),
            ..self.clone()
        }
    }

    #[must_use]
    pub fn id(&self) -> RequestId {
        self.id
    }

    #[must_use]
    pub fn method(&self) -> Option<Method> {
        self.method
    }

    #[must_use]
    pub fn uri(&self) -> &str {
        &self.uri
    }

    #[must_use]
    pub fn query_params(&self) -> &BTreeMap<String, String> {
        &self.query_params
    }

    #[must_use]
    pub fn query_param(&self, key: &str) -> Option<&str> {
        self.query_params.get(key).map(String::as_str)
    }

    #[must_use]
    pub fn headers(&self) -> &BTreeMap<String, String> {
        &self.headers
    }

    #[must_use]
    pub fn header(&self, key: &str) -> Option<&str> {
        self.headers.get(key).map(String::as_str)
    }

    #[must_use]
    pub fn body(&self) -> &Body {
        &self.body
    }

    #[must_use]
    pub fn into_body(self) -> Body {
        self.body
    }

    /// A request is valid when it has a method and a non-empty uri.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.method.is_some() && !self.uri.is_empty()
    }
}
