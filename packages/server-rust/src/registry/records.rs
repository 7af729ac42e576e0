//! Row shapes of the registry tables.

use serde::{Deserialize, Serialize};
use sidemesh_core::{Endpoint, Region, ServiceProfile, ServiceStatus};

/// A profile as stored: location flattened, region referenced by id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceProfileRecord {
    pub id: String,
    pub service_type: String,
    pub status: ServiceStatus,
    pub ip: String,
    pub port: u16,
    pub region_id: String,
    pub priority: u8,
    pub load: u32,
}

impl ServiceProfileRecord {
    /// Rebuilds the profile around its hydrated `region`.
    #[must_use]
    pub fn into_profile(self, region: Region) -> ServiceProfile {
        ServiceProfile::builder(self.id, self.service_type)
            .status(self.status)
            .endpoint(Endpoint::new(self.ip, self.port))
            .region(region)
            .priority(self.priority)
            .load(self.load)
            .build()
    }
}

impl From<&ServiceProfile> for ServiceProfileRecord {
    fn from(profile: &ServiceProfile) -> Self {
        Self {
            id: profile.id.clone(),
            service_type: profile.service_type.clone(),
            status: profile.status,
            ip: profile.endpoint.ip().to_string(),
            port: profile.endpoint.port(),
            region_id: profile.region.id.clone(),
            priority: profile.priority,
            load: profile.load,
        }
    }
}
