use std::sync::Arc;

use sidemesh_core::{matches_target, Region, Request, Response, ServiceProfile, StatusCode};
use tracing::trace;

use super::error::RegistryError;
use super::records::ServiceProfileRecord;
use super::{PROFILE_TABLE, REGION_TABLE, SERVICE_ID_QUERY, SERVICE_TYPE_QUERY};
use crate::storage::{Store, StoreExt};

/// Best profile matching `service_id`, or else `service_type`.
///
/// Lower priority wins, then lower load.
///
/// # Errors
///
/// [`RegistryError::NotFound`] when nothing matches; a storage failure
/// while scanning or hydrating regions otherwise.
pub fn discover(
    store: &dyn Store,
    service_id: &str,
    service_type: &str,
) -> Result<ServiceProfile, RegistryError> {
    let visitor = |_key: &str, r: &ServiceProfileRecord| {
        matches_target(&r.id, &r.service_type, service_id, service_type)
    };
    let records: Vec<ServiceProfileRecord> = store.query_by_visitor(PROFILE_TABLE, &visitor)?;

    let mut best: Option<ServiceProfile> = None;
    for record in records {
        let region: Region = store.get_row(REGION_TABLE, &record.region_id)?;
        let candidate = record.into_profile(region);
        best = match best {
            Some(current) if current.preference(&candidate).is_le() => Some(current),
            _ => Some(candidate),
        };
    }
    best.ok_or_else(|| {
        RegistryError::NotFound(format!(
            "no service matches id {service_id:?} or type {service_type:?}"
        ))
    })
}

/// Handler for `GET /api/v1/service-profile`.
pub struct Discovery {
    store: Arc<dyn Store>,
}

impl Discovery {
    #[must_use]
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Reads `service-id` and `service-type` from the query; 200 with the
    /// chosen profile, 404 when nothing matches.
    pub fn discovery(&self, request: Request) -> Response {
        let id = request.id();
        let service_id = request.query_param(SERVICE_ID_QUERY).unwrap_or_default();
        let service_type = request.query_param(SERVICE_TYPE_QUERY).unwrap_or_default();
        match discover(self.store.as_ref(), service_id, service_type) {
            Ok(profile) => {
                trace!(service_id = %profile.id, endpoint = %profile.endpoint, "discovered");
                Response::of(id, StatusCode::Ok).with_body(profile)
            }
            Err(e) => e.into_response(id),
        }
    }
}
