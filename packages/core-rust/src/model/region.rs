use serde::{Deserialize, Serialize};

/// Geographic region a service instance runs in.
///
/// Stored in its own table and referenced from profiles by `id`. Registering
/// a profile creates the region row if it is missing but never overwrites an
/// existing one.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Region {
    pub id: String,
    pub name: String,
    pub country: String,
}

impl Region {
    #[must_use]
    pub fn new(id: impl Into<String>, name: impl Into<String>, country: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            country: country.into(),
        }
    }
}
