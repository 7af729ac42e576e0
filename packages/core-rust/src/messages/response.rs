use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::{Body, RequestId};

/// The closed set of status codes the mesh emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StatusCode {
    Ok,
    Created,
    NoContent,
    BadRequest,
    NotFound,
    MethodNotAllowed,
    TooManyRequests,
    InternalServerError,
    GatewayTimeout,
}

impl StatusCode {
    #[must_use]
    pub fn code(self) -> u16 {
        match self {
            Self::Ok => 200,
            Self::Created => 201,
            Self::NoContent => 204,
            Self::BadRequest => 400,
            Self::NotFound => 404,
            Self::MethodNotAllowed => 405,
            Self::TooManyRequests => 429,
            Self::InternalServerError => 500,
            Self::GatewayTimeout => 504,
        }
    }

    #[must_use]
    pub fn reason(self) -> &'static str {
        match self {
            Self::Ok => "OK",
            Self::Created => "Created",
            Self::NoContent => "No Content",
            Self::BadRequest => "Bad Request",
            Self::NotFound => "Not Found",
            Self::MethodNotAllowed => "Method Not Allowed",
            Self::TooManyRequests => "Too Many Requests",
            Self::InternalServerError => "Internal Server Error",
            Self::GatewayTimeout => "Gateway Timeout",
        }
    }

    /// True for the 2xx codes.
    #[must_use]
    pub fn is_success(self) -> bool {
        (200..300).contains(&self.code())
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.code(), self.reason())
    }
}

/// Reply to a [`Request`](super::Request), correlated by request id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Response {
    request_id: RequestId,
    status: StatusCode,
    headers: BTreeMap<String, String>,
    body: Body,
    problem_details: String,
}

impl Response {
    /// Response to `request_id` with no headers, body or detail.
    #[must_use]
    pub fn of(request_id: RequestId, status: StatusCode) -> Self {
        Self {
            request_id,
            status,
            headers: BTreeMap::new(),
            body: Body::Empty,
            problem_details: String::new(),
        }
    }

    #[must_use]
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    /// Replaces every header.
    #[must_use]
    pub fn with_headers(mut self, headers: BTreeMap<String, String>) -> Self {
        self.headers = headers;
        self
    }

    #[must_use]
    pub fn with_body(mut self, body: impl Into<Body>) -> Self {
        self.body = body.into();
        self
    }

    #[must_use]
    pub fn with_problem_details(mut self, details: impl Into<String>) -> Self {
        self.problem_details = details.into();
        self
    }

    /// Same status, headers, body and detail, answering a different request.
    #[must_use]
    pub fn relayed_to(self, request_id: RequestId) -> Self {
        Self { request_id, ..self }
    }

    #[must_use]
    pub fn request_id(&self) -> RequestId {
        self.request_id
    }

    #[must_use]
    pub fn status(&self) -> StatusCode {
        self.status
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

    #[must_use]
    pub fn problem_details(&self) -> &str {
        &self.problem_details
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_and_reasons() {
        let all = [
            (StatusCode::Ok, 200),
            (StatusCode::Created, 201),
            (StatusCode::NoContent, 204),
            (StatusCode::BadRequest, 400),
            (StatusCode::NotFound, 404),
            (StatusCode::MethodNotAllowed, 405),
            (StatusCode::TooManyRequests, 429),
            (StatusCode::InternalServerError, 500),
            (StatusCode::GatewayTimeout, 504),
        ];
        for (status, code) in all {
            assert_eq!(status.code(), code);
            assert_eq!(status.is_success(), code < 300);
        }
        assert_eq!(StatusCode::TooManyRequests.to_string(), "429 Too Many Requests");
    }

    #[test]
    fn relayed_response_keeps_payload() {
        let original = RequestId::next();
        let caller = RequestId::next();
        let resp = Response::of(original, StatusCode::Created)
            .with_header("subscription-id", "s1")
            .with_body("done")
            .with_problem_details("none")
            .relayed_to(caller);
        assert_eq!(resp.request_id(), caller);
        assert_eq!(resp.status(), StatusCode::Created);
        assert_eq!(resp.header("subscription-id"), Some("s1"));
        assert_eq!(resp.body().as_text().unwrap(), "done");
        assert_eq!(resp.problem_details(), "none");
        assert!(resp.is_success());
    }
}
