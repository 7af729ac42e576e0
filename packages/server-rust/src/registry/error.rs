use sidemesh_core::{RequestId, Response, StatusCode};

use crate::storage::StorageError;

/// Failure of a registry operation, carried back to the caller as a status.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    /// Malformed payload or missing header.
    #[error("{0}")]
    BadRequest(String),
    /// Discovery matched nothing.
    #[error("{0}")]
    NotFound(String),
    /// Storage or transaction failure; any rollback has already run.
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl RegistryError {
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BadRequest,
            Self::NotFound(_) => StatusCode::NotFound,
            Self::Storage(_) => StatusCode::InternalServerError,
        }
    }

    /// The response answering request `id` with this error.
    #[must_use]
    pub fn into_response(self, id: RequestId) -> Response {
        Response::of(id, self.status()).with_problem_details(self.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses_follow_the_error_kind() {
        assert_eq!(
            RegistryError::BadRequest("x".into()).status(),
            StatusCode::BadRequest
        );
        assert_eq!(RegistryError::NotFound("x".into()).status(), StatusCode::NotFound);
        let storage = RegistryError::from(StorageError::TableNotFound("profiles".into()));
        assert_eq!(storage.status(), StatusCode::InternalServerError);
    }

    #[test]
    fn response_carries_the_error_text() {
        let id = RequestId::next();
        let response = RegistryError::from(StorageError::PrimaryKeyConflict {
            table: "profiles".into(),
            key: "svc1".into(),
        })
        .into_response(id);
        assert_eq!(response.request_id(), id);
        assert_eq!(
            response.problem_details(),
            "primary key svc1 already exists in profiles"
        );
    }
}
