use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Actions every registered resource type gets by default.
pub const DEFAULT_ACTIONS: [&str; 4] = ["add", "change", "delete", "view"];

/// An atomic permission token, e.g. `publish_article`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Capability(String);

impl Capability {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Token for a default action on a resource type, e.g. `change_article`.
    pub fn action(action: &str, resource: &str) -> Self {
        Self(format!("{action}_{resource}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Capability {
    fn from(token: &str) -> Self {
        Self::new(token)
    }
}

impl From<String> for Capability {
    fn from(token: String) -> Self {
        Self(token)
    }
}

/// A catalog entry: the capability plus the resource type it is scoped to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilityEntry {
    pub capability: Capability,
    pub resource: String,
    pub description: String,
}

/// Every capability known to the system.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    entries: BTreeMap<Capability, CapabilityEntry>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Catalog of the content site: users, groups, profiles and articles.
    pub fn site_default() -> Self {
        crate::Bootstrap::site_default().catalog()
    }

    /// Register a resource type with the default add/change/delete/view actions.
    pub fn register_resource(&mut self, resource: &str) {
        for action in DEFAULT_ACTIONS {
            let capability = Capability::action(action, resource);
            let description = format!("Can {action} {resource}");
            self.insert(capability, resource, description);
        }
    }

    /// Register a capability that is not one of the default actions.
    pub fn register_custom(
        &mut self,
        resource: &str,
        token: impl Into<Capability>,
        description: impl Into<String>,
    ) {
        self.insert(token.into(), resource, description.into());
    }

    fn insert(&mut self, capability: Capability, resource: &str, description: String) {
        // First registration wins: capabilities are immutable once defined.
        self.entries
            .entry(capability.clone())
            .or_insert_with(|| CapabilityEntry {
                capability,
                resource: resource.to_string(),
                description,
            });
    }

    pub fn contains(&self, capability: &Capability) -> bool {
        self.entries.contains_key(capability)
    }

    pub fn get(&self, capability: &Capability) -> Option<&CapabilityEntry> {
        self.entries.get(capability)
    }

    /// Whether any capability is scoped to the resource type.
    pub fn has_resource(&self, resource: &str) -> bool {
        self.entries.values().any(|e| e.resource == resource)
    }

    /// Capabilities scoped to the resource type.
    pub fn for_resource<'a>(&'a self, resource: &'a str) -> impl Iterator<Item = &'a Capability> {
        self.entries
            .values()
            .filter(move |e| e.resource == resource)
            .map(|e| &e.capability)
    }

    pub fn capabilities(&self) -> impl Iterator<Item = &Capability> {
        self.entries.keys()
    }

    pub fn entries(&self) -> impl Iterator<Item = &CapabilityEntry> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<CapabilityEntry> for Catalog {
    fn from_iter<I: IntoIterator<Item = CapabilityEntry>>(iter: I) -> Self {
        let mut catalog = Self::new();
        catalog.extend(iter);
        catalog
    }
}

impl Extend<CapabilityEntry> for Catalog {
    fn extend<I: IntoIterator<Item = CapabilityEntry>>(&mut self, iter: I) {
        for entry in iter {
            self.insert(entry.capability, &entry.resource, entry.description);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_resource_adds_default_actions() {
        let mut catalog = Catalog::new();
        catalog.register_resource("article");

        assert_eq!(catalog.len(), 4);
        assert!(catalog.contains(&"add_article".into()));
        assert!(catalog.contains(&"view_article".into()));
        assert_eq!(catalog.for_resource("article").count(), 4);
    }

    #[test]
    fn test_first_registration_wins() {
        let mut catalog = Catalog::new();
        catalog.register_custom("article", "publish_article", "first");
        catalog.register_custom("profile", "publish_article", "second");

        let entry = catalog.get(&"publish_article".into()).unwrap();
        assert_eq!(entry.resource, "article");
        assert_eq!(entry.description, "first");
    }

    #[test]
    fn test_site_default() {
        let catalog = Catalog::site_default();
        assert!(catalog.contains(&"delete_profile".into()));
        assert!(catalog.contains(&"publish_article".into()));
        assert!(catalog.has_resource("group"));
        assert!(!catalog.has_resource("comment"));
        // 4 resources x 4 actions + 6 custom
        assert_eq!(catalog.len(), 22);
    }
}
