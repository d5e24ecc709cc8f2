//! Rows returned by the store.

use chrono::{DateTime, Utc};
use policy::{Principal, PrincipalId, Resource, ResourceId};
use serde::Serialize;

/// A principal together with when it was created.
#[derive(Debug, Clone, Serialize)]
pub struct PrincipalRecord {
    #[serde(flatten)]
    pub principal: Principal,
    pub created_at: DateTime<Utc>,
}

/// A stored resource instance.
#[derive(Debug, Clone, Serialize)]
pub struct ResourceRecord {
    pub id: ResourceId,
    pub kind: String,
    pub title: String,
    pub owner: Option<PrincipalId>,
    pub created_at: DateTime<Utc>,
}

impl ResourceRecord {
    /// The authorization subject for this row.
    pub fn as_resource(&self) -> Resource {
        Resource {
            id: self.id,
            kind: self.kind.clone(),
            owner: self.owner,
        }
    }
}
