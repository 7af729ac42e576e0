//! Network endpoint value type.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Port used when an endpoint is created without an explicit one.
pub const DEFAULT_PORT: u16 = 80;

/// An immutable `(ip, port)` address identifying a socket binding.
///
/// Identity is by value. An endpoint is never mutated in place; build a new
/// one to address somewhere else.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Endpoint {
    ip: String,
    port: u16,
}

impl Endpoint {
    #[must_use]
    pub fn new(ip: impl Into<String>, port: u16) -> Self {
        Self {
            ip: ip.into(),
            port,
        }
    }

    /// Endpoint on [`DEFAULT_PORT`].
    #[must_use]
    pub fn with_default_port(ip: impl Into<String>) -> Self {
        Self::new(ip, DEFAULT_PORT)
    }

    #[must_use]
    pub fn ip(&self) -> &str {
        &self.ip
    }

    #[must_use]
    pub fn port(&self) -> u16 {
        self.port
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.ip, self.port)
    }
}

/// Error returned when parsing an `ip:port` string fails.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EndpointParseError {
    #[error("endpoint `{0}` is missing a `:port` suffix")]
    MissingPort(String),
    #[error("endpoint `{0}` has an empty ip")]
    EmptyIp(String),
    #[error("endpoint `{input}` has an invalid port: {reason}")]
    InvalidPort { input: String, reason: String },
}

impl FromStr for Endpoint {
    type Err = EndpointParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (ip, port) = s
            .rsplit_once(':')
            .ok_or_else(|| EndpointParseError::MissingPort(s.to_string()))?;
        if ip.is_empty() {
            return Err(EndpointParseError::EmptyIp(s.to_string()));
        }
        let port = port
            .parse::<u16>()
            .map_err(|e| EndpointParseError::InvalidPort {
                input: s.to_string(),
                reason: e.to_string(),
            })?;
        Ok(Self::new(ip, port))
    }
}
