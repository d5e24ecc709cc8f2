//! Composable access requirements.

use crate::Capability;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A predicate a principal must satisfy, optionally against a resource.
///
/// Requirements nest, so "owner, or holds the blanket capability, or is a
/// superuser" is one value rather than a hand-written OR at every call site.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Requirement {
    /// The principal is flagged as a superuser.
    Superuser,
    /// The principal is flagged as staff.
    Staff,
    /// The principal owns the resource under check.
    Owner,
    /// The principal holds the capability (superusers always do).
    Capability(Capability),
    /// At least one nested requirement holds. Empty never holds.
    AnyOf(Vec<Requirement>),
    /// Every nested requirement holds. Empty never holds.
    AllOf(Vec<Requirement>),
}

impl Requirement {
    pub fn capability(token: impl Into<Capability>) -> Self {
        Self::Capability(token.into())
    }

    pub fn any_of(requirements: impl IntoIterator<Item = Requirement>) -> Self {
        Self::AnyOf(requirements.into_iter().collect())
    }

    pub fn all_of(requirements: impl IntoIterator<Item = Requirement>) -> Self {
        Self::AllOf(requirements.into_iter().collect())
    }

    /// Owner, or holder of the blanket capability, or superuser.
    pub fn owner_or(token: impl Into<Capability>) -> Self {
        Self::any_of([Self::Owner, Self::capability(token), Self::Superuser])
    }

    /// Every capability token mentioned, depth first.
    pub fn capabilities(&self) -> Vec<&Capability> {
        match self {
            Self::Capability(cap) => vec![cap],
            Self::AnyOf(inner) | Self::AllOf(inner) => {
                inner.iter().flat_map(Self::capabilities).collect()
            }
            Self::Superuser | Self::Staff | Self::Owner => Vec::new(),
        }
    }

    /// Whether evaluating this requirement needs a resource.
    pub fn needs_resource(&self) -> bool {
        match self {
            Self::Owner => true,
            Self::AnyOf(inner) | Self::AllOf(inner) => inner.iter().any(Self::needs_resource),
            Self::Superuser | Self::Staff | Self::Capability(_) => false,
        }
    }
}

impl fmt::Display for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Superuser => f.write_str("superuser"),
            Self::Staff => f.write_str("staff"),
            Self::Owner => f.write_str("owner"),
            Self::Capability(cap) => write!(f, "{cap}"),
            Self::AnyOf(inner) => write_list(f, "any of", inner),
            Self::AllOf(inner) => write_list(f, "all of", inner),
        }
    }
}

fn write_list(f: &mut fmt::Formatter<'_>, label: &str, items: &[Requirement]) -> fmt::Result {
    write!(f, "{label} (")?;
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{item}")?;
    }
    f.write_str(")")
}
