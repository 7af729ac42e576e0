use serde::{Deserialize, Serialize};

use super::profile::ServiceProfile;

/// Which registry operation produced a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NotifyType {
    Register,
    Update,
    Deregister,
}

/// Change event pushed to a subscriber's callback.
///
/// `profile` is an owned snapshot taken at the time of the change; later
/// registry mutations never show through it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub subscription_id: String,
    #[serde(rename = "type")]
    pub kind: NotifyType,
    pub profile: ServiceProfile,
}

impl Notification {
    #[must_use]
    pub fn new(
        subscription_id: impl Into<String>,
        kind: NotifyType,
        profile: ServiceProfile,
    ) -> Self {
        Self {
            subscription_id: subscription_id.into(),
            kind,
            profile,
        }
    }
}
