//! Principals and the resources they own.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use uuid::Uuid;

/// Role every principal is granted at creation.
pub const DEFAULT_ROLE: &str = "Members";

/// A unique identifier for a principal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PrincipalId(pub Uuid);

impl PrincipalId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for PrincipalId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for PrincipalId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A unique identifier for a resource instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ResourceId(pub Uuid);

impl ResourceId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ResourceId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ResourceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An authenticated identity with its materialized role set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub id: PrincipalId,
    pub username: String,
    pub is_superuser: bool,
    pub is_staff: bool,
    pub roles: BTreeSet<String>,
}

impl Principal {
    /// A new regular user holding only the default role.
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            id: PrincipalId::new(),
            username: username.into(),
            is_superuser: false,
            is_staff: false,
            roles: BTreeSet::from([DEFAULT_ROLE.to_string()]),
        }
    }

    pub fn superuser(mut self) -> Self {
        self.is_superuser = true;
        self
    }

    pub fn staff(mut self) -> Self {
        self.is_staff = true;
        self
    }

    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.roles.insert(role.into());
        self
    }

    /// Drop every role, including the default one.
    pub fn without_roles(mut self) -> Self {
        self.roles.clear();
        self
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.contains(role)
    }
}

/// An entity used as the subject of ownership checks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    pub id: ResourceId,
    pub kind: String,
    pub owner: Option<PrincipalId>,
}

impl Resource {
    pub fn new(kind: impl Into<String>, owner: Option<PrincipalId>) -> Self {
        Self {
            id: ResourceId::new(),
            kind: kind.into(),
            owner,
        }
    }

    pub fn owned_by(kind: impl Into<String>, owner: PrincipalId) -> Self {
        Self::new(kind, Some(owner))
    }

    /// Unknown owners never match.
    pub fn is_owned_by(&self, principal: &Principal) -> bool {
        self.owner == Some(principal.id)
    }
}
