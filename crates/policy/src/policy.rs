//! Capability resolution and access checks.

use crate::{Capability, Error, Principal, Requirement, Resource, Result, RoleRegistry};
use std::collections::BTreeSet;

/// Result of an access check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny { reason: String },
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allow)
    }
}

/// Resolves capabilities for principals against an already-loaded registry.
///
/// Holds no state of its own: every answer is computed from the registry and
/// the principal passed in.
#[derive(Debug, Clone, Copy)]
pub struct Authorizer<'a> {
    registry: &'a RoleRegistry,
}

impl<'a> Authorizer<'a> {
    pub fn new(registry: &'a RoleRegistry) -> Self {
        Self { registry }
    }

    /// Whether the principal holds the capability through any of its roles,
    /// or is a superuser.
    pub fn can(&self, principal: &Principal, capability: &Capability) -> bool {
        if principal.is_superuser {
            return true;
        }
        principal
            .roles
            .iter()
            .any(|role| self.registry.capabilities(role).any(|c| c == capability))
    }

    /// The union of the capability sets of the principal's roles.
    ///
    /// Superusers get every capability the registry knows about.
    pub fn effective_capabilities(&self, principal: &Principal) -> BTreeSet<Capability> {
        if principal.is_superuser {
            return self.registry.known_capabilities().cloned().collect();
        }
        principal
            .roles
            .iter()
            .flat_map(|role| self.registry.capabilities(role))
            .cloned()
            .collect()
    }

    /// Evaluate a requirement. A missing resource never satisfies `Owner`.
    pub fn satisfies(
        &self,
        principal: &Principal,
        requirement: &Requirement,
        resource: Option<&Resource>,
    ) -> bool {
        match requirement {
            Requirement::Superuser => principal.is_superuser,
            Requirement::Staff => principal.is_staff,
            Requirement::Owner => resource.is_some_and(|r| r.is_owned_by(principal)),
            Requirement::Capability(cap) => self.can(principal, cap),
            Requirement::AnyOf(inner) => inner
                .iter()
                .any(|r| self.satisfies(principal, r, resource)),
            Requirement::AllOf(inner) => {
                !inner.is_empty() && inner.iter().all(|r| self.satisfies(principal, r, resource))
            }
        }
    }

    /// Check a requirement and explain a denial.
    pub fn check(
        &self,
        principal: &Principal,
        requirement: &Requirement,
        resource: Option<&Resource>,
    ) -> Decision {
        if self.satisfies(principal, requirement, resource) {
            tracing::debug!(user = %principal.username, %requirement, "access allowed");
            return Decision::Allow;
        }

        let reason = format!(
            "{} does not satisfy {}{}",
            principal.username,
            requirement,
            resource
                .map(|r| format!(" (resource: {} {})", r.kind, r.id))
                .unwrap_or_default()
        );
        tracing::debug!(user = %principal.username, %requirement, "access denied");
        Decision::Deny { reason }
    }

    /// Check a requirement, returning an error if denied.
    pub fn require(
        &self,
        principal: &Principal,
        requirement: &Requirement,
        resource: Option<&Resource>,
    ) -> Result<()> {
        match self.check(principal, requirement, resource) {
            Decision::Allow => Ok(()),
            Decision::Deny { reason } => Err(Error::Denied(reason)),
        }
    }
}
