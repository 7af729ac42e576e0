//! Change subscriptions and their callback addresses.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::endpoint::Endpoint;

/// A standing request to be notified about changes to a target service.
///
/// The target is identified by `target_service_id` when non-empty, otherwise
/// by `target_service_type`. `id` is empty on the way in and assigned by the
/// registry when the subscription is accepted.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subscription {
    pub id: String,
    pub source_service_id: String,
    pub target_service_id: String,
    pub target_service_type: String,
    /// Callback of the form `scheme://ip:port/path`.
    pub notify_url: String,
}

/// Parsed form of [`Subscription::notify_url`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackUrl {
    pub endpoint: Endpoint,
    /// Path including its leading `/`.
    pub path: String,
}

/// The notify URL did not have the `scheme://ip:port/path` shape.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CallbackUrlError {
    #[error("notify url `{0}` is not of the form scheme://ip:port/path")]
    Malformed(String),
    #[error("notify url `{url}` has an invalid port: {port}")]
    InvalidPort { url: String, port: String },
}

static CALLBACK_PATTERN: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z][a-zA-Z0-9+.\-]*://([^/:]+):(\d{1,5})(/.*)$").ok());

impl Subscription {
    /// Subscription targeting a single service instance by id.
    #[must_use]
    pub fn to_service(
        source_service_id: impl Into<String>,
        target_service_id: impl Into<String>,
        notify_url: impl Into<String>,
    ) -> Self {
        Self {
            source_service_id: source_service_id.into(),
            target_service_id: target_service_id.into(),
            notify_url: notify_url.into(),
            ..Self::default()
        }
    }

    /// Subscription targeting every instance of a service type.
    #[must_use]
    pub fn to_type(
        source_service_id: impl Into<String>,
        target_service_type: impl Into<String>,
        notify_url: impl Into<String>,
    ) -> Self {
        Self {
            source_service_id: source_service_id.into(),
            target_service_type: target_service_type.into(),
            notify_url: notify_url.into(),
            ..Self::default()
        }
    }

    /// Splits `notify_url` into the endpoint to send to and the request path.
    ///
    /// # Errors
    ///
    /// Returns [`CallbackUrlError`] when the URL is not `scheme://ip:port/path`
    /// or the port does not fit in a `u16`.
    pub fn callback(&self) -> Result<CallbackUrl, CallbackUrlError> {
        let caps = CALLBACK_PATTERN
            .as_ref()
            .and_then(|pattern| pattern.captures(&self.notify_url))
            .ok_or_else(|| CallbackUrlError::Malformed(self.notify_url.clone()))?;
        let (ip, port, path) = (&caps[1], &caps[2], &caps[3]);
        let port = port
            .parse::<u16>()
            .map_err(|_| CallbackUrlError::InvalidPort {
                url: self.notify_url.clone(),
                port: port.to_string(),
            })?;
        Ok(CallbackUrl {
            endpoint: Endpoint::new(ip, port),
            path: path.to_string(),
        })
    }
}
