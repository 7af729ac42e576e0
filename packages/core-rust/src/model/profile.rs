//! Service profiles: a registered instance's identity, location, and
//! scheduling hints.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use super::region::Region;
use crate::endpoint::Endpoint;

/// Highest accepted priority value. Lower values are preferred.
pub const MAX_PRIORITY: u8 = 100;

/// Health of a registered service instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ServiceStatus {
    #[default]
    Normal,
    Fault,
    Unknown,
}

/// A registered service instance.
///
/// Uniquely keyed by `id` within the registry. `priority` ranges over
/// `0..=100` with lower values preferred; `load` grows with how busy the
/// instance is.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceProfile {
    pub id: String,
    pub service_type: String,
    pub status: ServiceStatus,
    pub endpoint: Endpoint,
    pub region: Region,
    pub priority: u8,
    pub load: u32,
}

/// Reasons a profile is rejected before it reaches storage.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProfileError {
    #[error("service profile id is empty")]
    EmptyId,
    #[error("service profile {id} has an empty service type")]
    EmptyType { id: String },
    #[error("service profile {id} has priority {priority}, expected 0..={MAX_PRIORITY}")]
    PriorityOutOfRange { id: String, priority: u8 },
}

impl ServiceProfile {
    /// Starts a builder pre-filled with the stock defaults: status `Normal`,
    /// endpoint `192.168.0.1:80`, region `region1`/`beijing`/`China`,
    /// priority 1 and load 100.
    #[must_use]
    pub fn builder(
        id: impl Into<String>,
        service_type: impl Into<String>,
    ) -> ServiceProfileBuilder {
        ServiceProfileBuilder {
            profile: Self {
                id: id.into(),
                service_type: service_type.into(),
                status: ServiceStatus::Normal,
                endpoint: Endpoint::new("192.168.0.1", 80),
                region: Region::new("region1", "beijing", "China"),
                priority: 1,
                load: 100,
            },
        }
    }

    /// Checks the invariants the registry relies on.
    ///
    /// # Errors
    ///
    /// Returns the first violated invariant.
    pub fn validate(&self) -> Result<(), ProfileError> {
        if self.id.is_empty() {
            return Err(ProfileError::EmptyId);
        }
        if self.service_type.is_empty() {
            return Err(ProfileError::EmptyType {
                id: self.id.clone(),
            });
        }
        if self.priority > MAX_PRIORITY {
            return Err(ProfileError::PriorityOutOfRange {
                id: self.id.clone(),
                priority: self.priority,
            });
        }
        Ok(())
    }

    /// Selection order used by discovery: ascending priority, then ascending
    /// load. `Ordering::Less` means `self` is the better candidate.
    #[must_use]
    pub fn preference(&self, other: &Self) -> Ordering {
        self.priority
            .cmp(&other.priority)
            .then_with(|| self.load.cmp(&other.load))
    }
}

/// Chainable builder for [`ServiceProfile`].
#[derive(Debug, Clone)]
pub struct ServiceProfileBuilder {
    profile: ServiceProfile,
}

impl ServiceProfileBuilder {
    #[must_use]
    pub fn status(mut self, status: ServiceStatus) -> Self {
        self.profile.status = status;
        self
    }

    #[must_use]
    pub fn endpoint(mut self, endpoint: Endpoint) -> Self {
        self.profile.endpoint = endpoint;
        self
    }

    #[must_use]
    pub fn region(mut self, region: Region) -> Self {
        self.profile.region = region;
        self
    }

    #[must_use]
    pub fn priority(mut self, priority: u8) -> Self {
        self.profile.priority = priority;
        self
    }

    #[must_use]
    pub fn load(mut self, load: u32) -> Self {
        self.profile.load = load;
        self
    }

    #[must_use]
    pub fn build(self) -> ServiceProfile {
        self.profile
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_fills_defaults() {
        let profile = ServiceProfile::builder("svc1", "svc").build();
        assert_eq!(profile.status, ServiceStatus::Normal);
        assert_eq!(profile.endpoint, Endpoint::new("192.168.0.1", 80));
        assert_eq!(profile.region, Region::new("region1", "beijing", "China"));
        assert_eq!(profile.priority, 1);
        assert_eq!(profile.load, 100);
    }

    #[test]
    fn builder_overrides_every_field() {
        let profile = ServiceProfile::builder("svc2", "order")
            .status(ServiceStatus::Fault)
            .endpoint(Endpoint::new("10.0.0.9", 8080))
            .region(Region::new("2", "shanghai", "CN"))
            .priority(7)
            .load(3)
            .build();
        assert_eq!(profile.id, "svc2");
        assert_eq!(profile.service_type, "order");
        assert_eq!(profile.status, ServiceStatus::Fault);
        assert_eq!(profile.endpoint.port(), 8080);
        assert_eq!(profile.region.id, "2");
        assert_eq!(profile.priority, 7);
        assert_eq!(profile.load, 3);
    }

    #[test]
    fn validate_rejects_broken_profiles() {
        let ok = ServiceProfile::builder("a", "t").build();
        assert!(ok.validate().is_ok());

        let no_id = ServiceProfile::builder("", "t").build();
        assert_eq!(no_id.validate(), Err(ProfileError::EmptyId));

        let no_type = ServiceProfile::builder("a", "").build();
        assert!(matches!(no_type.validate(), Err(ProfileError::EmptyType { .. })));

        let too_high = ServiceProfile::builder("a", "t").priority(101).build();
        assert!(matches!(
            too_high.validate(),
            Err(ProfileError::PriorityOutOfRange { priority: 101, .. })
        ));
    }

    #[test]
    fn preference_orders_by_priority_then_load() {
        let busy = ServiceProfile::builder("a", "t").priority(1).load(50).build();
        let idle = ServiceProfile::builder("b", "t").priority(1).load(10).build();
        let backup = ServiceProfile::builder("c", "t").priority(2).load(0).build();

        assert_eq!(idle.preference(&busy), Ordering::Less);
        assert_eq!(busy.preference(&backup), Ordering::Less);
        assert_eq!(backup.preference(&idle), Ordering::Greater);
    }

    #[test]
    fn clone_is_independent_of_the_original() {
        let mut original = ServiceProfile::builder("a", "t").build();
        let snapshot = original.clone();
        original.region.name = "changed".to_string();
        original.load = 999;
        assert_eq!(snapshot.region.name, "beijing");
        assert_eq!(snapshot.load, 100);
    }
}
