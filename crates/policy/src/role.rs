//! Role registry and the store abstraction the seeder writes through.

use crate::{Capability, CapabilityEntry, Catalog, Error, Result};
use std::collections::{BTreeMap, BTreeSet};

/// A persistent home for role -> capability assignments.
///
/// Every write must be idempotent: creation is get-or-create and assignment
/// is a full replace, so concurrent or repeated seeding converges.
pub trait RoleStore {
    type Error;

    /// Make sure the catalog entries exist. Existing entries are left alone.
    fn ensure_capabilities(
        &mut self,
        entries: &[CapabilityEntry],
    ) -> std::result::Result<(), Self::Error>;

    /// Create the role if missing. Returns `true` if it was created.
    fn get_or_create_role(
        &mut self,
        name: &str,
        description: &str,
    ) -> std::result::Result<bool, Self::Error>;

    /// Replace the role's capability set with exactly `capabilities`.
    fn replace_capabilities(
        &mut self,
        role: &str,
        capabilities: &BTreeSet<Capability>,
    ) -> std::result::Result<(), Self::Error>;

    /// Every capability the store already holds, from earlier seeding runs.
    fn load_catalog(&self) -> std::result::Result<Catalog, Self::Error>;
}

/// A role as held by the registry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Role {
    pub description: String,
    pub capabilities: BTreeSet<Capability>,
}

/// In-memory materialization of every role and its capability set.
#[derive(Debug, Clone, Default)]
pub struct RoleRegistry {
    roles: BTreeMap<String, Role>,
    catalog: Catalog,
}

impl RoleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite a role.
    pub fn insert(&mut self, name: impl Into<String>, role: Role) {
        self.roles.insert(name.into(), role);
    }

    pub fn get(&self, name: &str) -> Option<&Role> {
        self.roles.get(name)
    }

    /// Capabilities held by a role; empty for unknown roles.
    pub fn capabilities(&self, name: &str) -> impl Iterator<Item = &Capability> {
        self.roles
            .get(name)
            .into_iter()
            .flat_map(|r| r.capabilities.iter())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.roles.contains_key(name)
    }

    pub fn roles(&self) -> impl Iterator<Item = (&str, &Role)> {
        self.roles.iter().map(|(name, role)| (name.as_str(), role))
    }

    /// Every capability known to the registry, assigned or not.
    pub fn known_capabilities(&self) -> impl Iterator<Item = &Capability> {
        self.catalog
            .capabilities()
            .chain(self.roles.values().flat_map(|r| r.capabilities.iter()))
    }

    /// Catalog entries learned so far.
    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Record catalog entries without assigning them.
    pub fn learn_capabilities(&mut self, entries: impl IntoIterator<Item = CapabilityEntry>) {
        self.catalog.extend(entries);
    }
}

impl RoleStore for RoleRegistry {
    type Error = Error;

    fn ensure_capabilities(&mut self, entries: &[CapabilityEntry]) -> Result<()> {
        self.learn_capabilities(entries.iter().cloned());
        Ok(())
    }

    fn load_catalog(&self) -> Result<Catalog> {
        Ok(self.catalog.clone())
    }

    fn get_or_create_role(&mut self, name: &str, description: &str) -> Result<bool> {
        if self.roles.contains_key(name) {
            return Ok(false);
        }
        self.roles.insert(
            name.to_string(),
            Role {
                description: description.to_string(),
                capabilities: BTreeSet::new(),
            },
        );
        Ok(true)
    }

    fn replace_capabilities(&mut self, role: &str, capabilities: &BTreeSet<Capability>) -> Result<()> {
        let entry = self
            .roles
            .get_mut(role)
            .ok_or_else(|| Error::UnknownRole(role.to_string()))?;
        entry.capabilities = capabilities.clone();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_or_create_is_idempotent() {
        let mut registry = RoleRegistry::new();
        assert!(registry.get_or_create_role("Authors", "writers").unwrap());
        assert!(!registry.get_or_create_role("Authors", "other").unwrap());
        assert_eq!(registry.get("Authors").unwrap().description, "writers");
    }

    #[test]
    fn test_replace_capabilities_overwrites() {
        let mut registry = RoleRegistry::new();
        registry.get_or_create_role("Members", "").unwrap();

        let first: BTreeSet<Capability> = BTreeSet::from(["add_article".into(), "change_article".into()]);
        registry.replace_capabilities("Members", &first).unwrap();
        let second: BTreeSet<Capability> = BTreeSet::from(["add_article".into()]);
        registry.replace_capabilities("Members", &second).unwrap();

        let held: Vec<_> = registry.capabilities("Members").collect();
        assert_eq!(held, vec![&Capability::new("add_article")]);
    }

    #[test]
    fn test_replace_on_missing_role_fails() {
        let mut registry = RoleRegistry::new();
        let err = registry
            .replace_capabilities("Ghosts", &BTreeSet::new())
            .unwrap_err();
        assert!(matches!(err, Error::UnknownRole(name) if name == "Ghosts"));
    }
}
