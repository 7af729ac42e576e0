//! Registration, update, deregistration and subscriptions, plus the
//! fire-and-forget notification fan-out they trigger.

use std::sync::Arc;

use sidemesh_core::{
    matches_target, Method, Notification, NotifyType, Region, Request, Response, ServiceProfile,
    StatusCode, Subscription,
};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::error::RegistryError;
use super::records::ServiceProfileRecord;
use super::{
    PROFILE_TABLE, REGION_TABLE, SERVICE_ID_HEADER, SUBSCRIPTION_ID_HEADER, SUBSCRIPTION_TABLE,
};
use crate::config::ClientConfig;
use crate::protocol::Client;
use crate::sidecar::SidecarFactory;
use crate::storage::{StorageError, Store, StoreExt, Transaction};

const REGISTER_BODY_DETAIL: &str = "service register request's body is not a service profile";
const UPDATE_BODY_DETAIL: &str = "service update request's body is not a service profile";
const DEREGISTER_HEADER_DETAIL: &str = "service deregister request does not contain service-id header";
const SUBSCRIBE_BODY_DETAIL: &str = "subscribe request's body is not a subscription";
const SUBSCRIBE_ID_DETAIL: &str = "subscription id must be empty, ids are assigned by the registry";
const UNSUBSCRIBE_HEADER_DETAIL: &str =
    "unsubscribe request does not contain subscription-id header";

/// Stores `profile` and, if it is new, its region, all or nothing.
///
/// # Errors
///
/// Returns the failing command's [`StorageError`] after rolling back.
pub fn store_profile(store: &dyn Store, profile: &ServiceProfile) -> Result<(), StorageError> {
    let mut tx = Transaction::begin(store, "register");
    if store.find_row::<Region>(REGION_TABLE, &profile.region.id)?.is_none() {
        tx.insert(REGION_TABLE, &profile.region.id, &profile.region)?;
    }
    tx.insert(PROFILE_TABLE, &profile.id, &ServiceProfileRecord::from(profile))?;
    tx.commit()
}

/// Rewrites an existing profile and its region, all or nothing.
///
/// # Errors
///
/// Returns [`StorageError::RecordNotFound`] if either row is missing.
pub fn replace_profile(store: &dyn Store, profile: &ServiceProfile) -> Result<(), StorageError> {
    let mut tx = Transaction::begin(store, "update");
    tx.update(REGION_TABLE, &profile.region.id, &profile.region)?;
    tx.update(PROFILE_TABLE, &profile.id, &ServiceProfileRecord::from(profile))?;
    tx.commit()
}

fn profile_body(request: Request, detail: &str) -> Result<ServiceProfile, RegistryError> {
    let profile = request
        .into_body()
        .into_profile()
        .map_err(|_| RegistryError::BadRequest(detail.to_string()))?;
    profile
        .validate()
        .map_err(|e| RegistryError::BadRequest(e.to_string()))?;
    Ok(profile)
}

fn required_header(request: &Request, name: &str, detail: &str) -> Result<String, RegistryError> {
    request
        .header(name)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .ok_or_else(|| RegistryError::BadRequest(detail.to_string()))
}

// ---------------------------------------------------------------------------
// Management
// ---------------------------------------------------------------------------

/// Handlers for the mutating half of the registry surface.
pub struct Management {
    store: Arc<dyn Store>,
    notifier: Notifier,
}

impl Management {
    #[must_use]
    pub fn new(store: Arc<dyn Store>, notifier: Notifier) -> Self {
        Self { store, notifier }
    }

    /// `PUT /api/v1/service-profile`: 201 on success.
    pub fn register(&self, request: Request) -> Response {
        let id = request.id();
        let result = profile_body(request, REGISTER_BODY_DETAIL).and_then(|profile| {
            store_profile(self.store.as_ref(), &profile)?;
            info!(
                service_id = %profile.id,
                service_type = %profile.service_type,
                "service registered"
            );
            self.notifier.spawn(NotifyType::Register, profile);
            Ok(Response::of(id, StatusCode::Created))
        });
        result.unwrap_or_else(|e| e.into_response(id))
    }

    /// `POST /api/v1/service-profile`: 200 on success.
    pub fn update(&self, request: Request) -> Response {
        let id = request.id();
        let result = profile_body(request, UPDATE_BODY_DETAIL).and_then(|profile| {
            replace_profile(self.store.as_ref(), &profile)?;
            debug!(service_id = %profile.id, load = profile.load, "service updated");
            self.notifier.spawn(NotifyType::Update, profile);
            Ok(Response::of(id, StatusCode::Ok))
        });
        result.unwrap_or_else(|e| e.into_response(id))
    }

    /// `DELETE /api/v1/service-profile` with a `service-id` header: 204 on
    /// success, 400 for an unknown id.
    pub fn deregister(&self, request: Request) -> Response {
        let id = request.id();
        self.try_deregister(&request)
            .map(|()| Response::of(id, StatusCode::NoContent))
            .unwrap_or_else(|e| e.into_response(id))
    }

    fn try_deregister(&self, request: &Request) -> Result<(), RegistryError> {
        let service_id = required_header(request, SERVICE_ID_HEADER, DEREGISTER_HEADER_DETAIL)?;
        let Some(record) = self
            .store
            .find_row::<ServiceProfileRecord>(PROFILE_TABLE, &service_id)?
        else {
            return Err(RegistryError::BadRequest(format!(
                "service-id {service_id} does not exist"
            )));
        };
        let region: Region = self.store.get_row(REGION_TABLE, &record.region_id)?;
        let snapshot = record.into_profile(region);

        self.store.delete(PROFILE_TABLE, &service_id)?;
        info!(service_id = %service_id, "service deregistered");
        self.notifier.spawn(NotifyType::Deregister, snapshot);
        Ok(())
    }

    /// `PUT /api/v1/subscription`: 201 with the assigned id in the
    /// `subscription-id` header.
    pub fn subscribe(&self, request: Request) -> Response {
        let id = request.id();
        self.try_subscribe(request)
            .map(|subscription_id| {
                Response::of(id, StatusCode::Created)
                    .with_header(SUBSCRIPTION_ID_HEADER, subscription_id)
            })
            .unwrap_or_else(|e| e.into_response(id))
    }

    fn try_subscribe(&self, request: Request) -> Result<String, RegistryError> {
        let mut subscription = request
            .into_body()
            .into_subscription()
            .map_err(|_| RegistryError::BadRequest(SUBSCRIBE_BODY_DETAIL.to_string()))?;
        if !subscription.id.is_empty() {
            return Err(RegistryError::BadRequest(SUBSCRIBE_ID_DETAIL.to_string()));
        }

        subscription.id = Uuid::new_v4().to_string();
        self.store
            .insert_row(SUBSCRIPTION_TABLE, &subscription.id, &subscription)?;
        info!(
            subscription_id = %subscription.id,
            source = %subscription.source_service_id,
            target_id = %subscription.target_service_id,
            target_type = %subscription.target_service_type,
            "subscription added"
        );
        Ok(subscription.id)
    }

    /// `DELETE /api/v1/subscription` with a `subscription-id` header: 204
    /// whether or not the subscription existed.
    pub fn unsubscribe(&self, request: Request) -> Response {
        let id = request.id();
        let result = required_header(&request, SUBSCRIPTION_ID_HEADER, UNSUBSCRIBE_HEADER_DETAIL)
            .and_then(|subscription_id| {
                match self.store.delete(SUBSCRIPTION_TABLE, &subscription_id) {
                    Ok(_) | Err(StorageError::RecordNotFound { .. }) => Ok(()),
                    Err(e) => Err(e.into()),
                }
            });
        result
            .map(|()| Response::of(id, StatusCode::NoContent))
            .unwrap_or_else(|e| e.into_response(id))
    }
}

// ---------------------------------------------------------------------------
// Notifier
// ---------------------------------------------------------------------------

/// Delivers change events to matching subscribers.
#[derive(Clone)]
pub struct Notifier {
    store: Arc<dyn Store>,
    factory: Arc<dyn SidecarFactory>,
    local_ip: String,
    client: ClientConfig,
}

impl Notifier {
    #[must_use]
    pub fn new(
        store: Arc<dyn Store>,
        factory: Arc<dyn SidecarFactory>,
        local_ip: impl Into<String>,
        client: ClientConfig,
    ) -> Self {
        Self {
            store,
            factory,
            local_ip: local_ip.into(),
            client,
        }
    }

    /// Runs [`Notifier::notify`] on its own task. The caller does not wait.
    pub fn spawn(&self, kind: NotifyType, profile: ServiceProfile) {
        let notifier = self.clone();
        tokio::spawn(async move { notifier.notify(kind, profile).await });
    }

    /// Sends `kind` for `profile` to every subscriber targeting it.
    ///
    /// All deliveries share one fresh client and go out one at a time. A
    /// callback URL that does not parse, or a subscriber endpoint that
    /// refuses the packet, ends the fan-out and the remaining subscribers
    /// are skipped. A subscriber answering with a non-2xx status is logged
    /// and the fan-out continues.
    pub async fn notify(&self, kind: NotifyType, profile: ServiceProfile) {
        let visitor = |_key: &str, s: &Subscription| {
            matches_target(
                &profile.id,
                &profile.service_type,
                &s.target_service_id,
                &s.target_service_type,
            )
        };
        let subscriptions: Vec<Subscription> =
            match self.store.query_by_visitor(SUBSCRIPTION_TABLE, &visitor) {
                Ok(found) => found,
                Err(e) => {
                    warn!(service_id = %profile.id, error = %e, "subscription scan failed");
                    return;
                }
            };
        if subscriptions.is_empty() {
            return;
        }

        let connected = Client::connect(self.factory.create(), self.local_ip.clone(), &self.client);
        let client = match connected {
            Ok(client) => client,
            Err(e) => {
                warn!(error = %e, "no client for notification fan-out");
                return;
            }
        };

        for subscription in subscriptions {
            let callback = match subscription.callback() {
                Ok(callback) => callback,
                Err(e) => {
                    warn!(
                        subscription_id = %subscription.id,
                        error = %e,
                        "bad callback url, fan-out aborted"
                    );
                    record_outcome(kind, "failed");
                    return;
                }
            };
            let notification = Notification::new(subscription.id.clone(), kind, profile.clone());
            let request = Request::of(Method::Post, callback.path).with_body(notification);

            match client.send(&callback.endpoint, request).await {
                Ok(response) if response.is_success() => {
                    debug!(subscription_id = %subscription.id, ?kind, "notification delivered");
                    record_outcome(kind, "delivered");
                }
                Ok(response) => {
                    warn!(
                        subscription_id = %subscription.id,
                        status = response.status().code(),
                        details = response.problem_details(),
                        "subscriber rejected notification"
                    );
                    record_outcome(kind, "failed");
                }
                Err(e) => {
                    warn!(
                        subscription_id = %subscription.id,
                        error = %e,
                        "notification undeliverable, fan-out aborted"
                    );
                    record_outcome(kind, "failed");
                    return;
                }
            }
        }
    }
}

fn record_outcome(kind: NotifyType, outcome: &'static str) {
    let kind = match kind {
        NotifyType::Register => "register",
        NotifyType::Update => "update",
        NotifyType::Deregister => "deregister",
    };
    metrics::counter!("sidemesh_notifications_total", "type" => kind, "outcome" => outcome)
        .increment(1);
}
