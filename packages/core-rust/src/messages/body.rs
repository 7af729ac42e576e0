use serde::{Deserialize, Serialize};

use crate::model::{Notification, ServiceProfile, Subscription};

/// Payload of a request or response.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "camelCase")]
pub enum Body {
    #[default]
    Empty,
    Profile(ServiceProfile),
    Subscription(Subscription),
    Notification(Notification),
    Json(serde_json::Value),
    Text(String),
}

/// A body held a different variant than the consumer expected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BodyError {
    #[error("expected a {expected} body, found {found}")]
    UnexpectedKind {
        expected: &'static str,
        found: &'static str,
    },
}

impl Body {
    /// Variant name, used in diagnostics.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Empty => "empty",
            Self::Profile(_) => "profile",
            Self::Subscription(_) => "subscription",
            Self::Notification(_) => "notification",
            Self::Json(_) => "json",
            Self::Text(_) => "text",
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }

    fn unexpected(&self, expected: &'static str) -> BodyError {
        BodyError::UnexpectedKind {
            expected,
            found: self.kind(),
        }
    }

    /// # Errors
    ///
    /// Returns [`BodyError::UnexpectedKind`] unless the body is a profile.
    pub fn as_profile(&self) -> Result<&ServiceProfile, BodyError> {
        match self {
            Self::Profile(p) => Ok(p),
            other => Err(other.unexpected("profile")),
        }
    }

    /// # Errors
    ///
    /// Returns [`BodyError::UnexpectedKind`] unless the body is a profile.
    pub fn into_profile(self) -> Result<ServiceProfile, BodyError> {
        match self {
            Self::Profile(p) => Ok(p),
            other => Err(other.unexpected("profile")),
        }
    }

    /// # Errors
    ///
    /// Returns [`BodyError::UnexpectedKind`] unless the body is a subscription.
    pub fn into_subscription(self) -> Result<Subscription, BodyError> {
        match self {
            Self::Subscription(s) => Ok(s),
            other => Err(other.unexpected("subscription")),
        }
    }

    /// # Errors
    ///
    /// Returns [`BodyError::UnexpectedKind`] unless the body is a notification.
    pub fn as_notification(&self) -> Result<&Notification, BodyError> {
        match self {
            Self::Notification(n) => Ok(n),
            other => Err(other.unexpected("notification")),
        }
    }

    /// # Errors
    ///
    /// Returns [`BodyError::UnexpectedKind`] unless the body is text.
    pub fn as_text(&self) -> Result<&str, BodyError> {
        match self {
            Self::Text(t) => Ok(t),
            other => Err(other.unexpected("text")),
        }
    }
}

impl From<ServiceProfile> for Body {
    fn from(value: ServiceProfile) -> Self {
        Self::Profile(value)
    }
}

impl From<Subscription> for Body {
    fn from(value: Subscription) -> Self {
        Self::Subscription(value)
    }
}

impl From<Notification> for Body {
    fn from(value: Notification) -> Self {
        Self::Notification(value)
    }
}

impl From<String> for Body {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<&str> for Body {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typed_extraction_reports_the_found_kind() {
        let body = Body::from("hello");
        assert_eq!(body.as_text().unwrap(), "hello");
        assert_eq!(
            body.clone().into_profile(),
            Err(BodyError::UnexpectedKind {
                expected: "profile",
                found: "text",
            })
        );
        assert_eq!(
            Body::Empty.into_subscription().unwrap_err().to_string(),
            "expected a subscription body, found empty"
        );
    }

    #[test]
    fn profile_body_round_trips_through_json() {
        let profile = ServiceProfile::builder("svc1", "order").load(7).build();
        let body = Body::from(profile.clone());
        let json = serde_json::to_string(&body).unwrap();
        let back: Body = serde_json::from_str(&json).unwrap();
        assert_eq!(back.into_profile().unwrap(), profile);
    }
}
