//! Registry domain model: service profiles, regions, subscriptions and the
//! notifications sent to subscribers.

pub mod notification;
pub mod profile;
pub mod region;
pub mod subscription;

pub use notification::{Notification, NotifyType};
pub use profile::{ProfileError, ServiceProfile, ServiceProfileBuilder, ServiceStatus, MAX_PRIORITY};
pub use region::Region;
pub use subscription::{CallbackUrl, CallbackUrlError, Subscription};

/// Target matching shared by discovery and notification fan-out.
///
/// A non-empty `query_id` takes precedence and must equal `candidate_id`.
/// Otherwise a non-empty `query_type` must equal `candidate_type`. When both
/// are empty nothing matches.
#[must_use]
pub fn matches_target(
    candidate_id: &str,
    candidate_type: &str,
    query_id: &str,
    query_type: &str,
) -> bool {
    if !query_id.is_empty() {
        return candidate_id == query_id;
    }
    !query_type.is_empty() && candidate_type == query_type
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_takes_precedence_over_type() {
        assert!(matches_target("svc1", "order", "svc1", "other"));
        assert!(!matches_target("svc2", "order", "svc1", "order"));
    }

    #[test]
    fn type_matches_when_id_is_empty() {
        assert!(matches_target("svc1", "order", "", "order"));
        assert!(!matches_target("svc1", "order", "", "payment"));
    }

    #[test]
    fn empty_query_matches_nothing() {
        assert!(!matches_target("svc1", "order", "", ""));
        assert!(!matches_target("", "", "", ""));
    }
}
