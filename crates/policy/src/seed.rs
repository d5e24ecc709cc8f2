//! Idempotent bootstrap of roles and their capability sets.

use crate::{Capability, CapabilityEntry, Catalog, Error, Result, RoleStore};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};

/// Selects capabilities from the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectorRule {
    /// Every capability in the catalog at seed time.
    All,
    /// Every capability scoped to one of these resource types.
    Resources(Vec<String>),
    /// Exactly these tokens.
    Tokens(Vec<Capability>),
}

/// A role and the rules that produce its capability set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleDefinition {
    pub name: String,

    #[serde(default)]
    pub description: String,

    /// Union of these rules is the role's capability set.
    #[serde(default)]
    pub rules: Vec<SelectorRule>,
}

impl RoleDefinition {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            rules: Vec::new(),
        }
    }

    pub fn with_rule(mut self, rule: SelectorRule) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn all(self) -> Self {
        self.with_rule(SelectorRule::All)
    }

    pub fn resources<I, S>(self, resources: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.with_rule(SelectorRule::Resources(
            resources.into_iter().map(Into::into).collect(),
        ))
    }

    pub fn tokens<I, S>(self, tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<Capability>,
    {
        self.with_rule(SelectorRule::Tokens(
            tokens.into_iter().map(Into::into).collect(),
        ))
    }

    /// Resolve the rules against the catalog.
    ///
    /// Fails on the first token or resource type the catalog does not know.
    pub fn resolve(&self, catalog: &Catalog) -> Result<BTreeSet<Capability>> {
        let mut resolved = BTreeSet::new();
        for rule in &self.rules {
            match rule {
                SelectorRule::All => {
                    resolved.extend(catalog.capabilities().cloned());
                    tracing::info!(
                        role = %self.name,
                        count = catalog.len(),
                        "granting every catalog capability"
                    );
                }
                SelectorRule::Resources(resources) => {
                    for resource in resources {
                        if !catalog.has_resource(resource) {
                            return Err(Error::UnknownResource {
                                role: self.name.clone(),
                                resource: resource.clone(),
                            });
                        }
                        resolved.extend(catalog.for_resource(resource).cloned());
                    }
                }
                SelectorRule::Tokens(tokens) => {
                    for token in tokens {
                        if !catalog.contains(token) {
                            return Err(Error::UnknownCapability {
                                role: self.name.clone(),
                                token: token.to_string(),
                            });
                        }
                        resolved.insert(token.clone());
                    }
                }
            }
        }
        Ok(resolved)
    }
}

/// A role whose capability set has been resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedRole {
    pub name: String,
    pub description: String,
    pub capabilities: BTreeSet<Capability>,
}

/// Fully resolved seeding work. Building one performs every validation, so
/// applying it never fails on configuration.
#[derive(Debug, Clone)]
pub struct SeedPlan {
    entries: Vec<CapabilityEntry>,
    roles: Vec<PlannedRole>,
}

impl SeedPlan {
    pub fn new(catalog: &Catalog, definitions: &[RoleDefinition]) -> Result<Self> {
        let mut seen = HashSet::new();
        let mut roles = Vec::with_capacity(definitions.len());

        for definition in definitions {
            if !seen.insert(definition.name.as_str()) {
                return Err(Error::Invalid(format!(
                    "role '{}' is defined more than once",
                    definition.name
                )));
            }
            roles.push(PlannedRole {
                name: definition.name.clone(),
                description: definition.description.clone(),
                capabilities: definition.resolve(catalog)?,
            });
        }

        Ok(Self {
            entries: catalog.entries().cloned().collect(),
            roles,
        })
    }

    pub fn roles(&self) -> &[PlannedRole] {
        &self.roles
    }

    /// Write the plan through the store.
    ///
    /// Roles are created if missing and their capability sets replaced.
    /// Roles the plan does not mention are untouched.
    pub fn apply<S: RoleStore>(&self, store: &mut S) -> std::result::Result<SeedReport, S::Error> {
        store.ensure_capabilities(&self.entries)?;

        let mut report = SeedReport::default();
        for role in &self.roles {
            let created = store.get_or_create_role(&role.name, &role.description)?;
            if created {
                tracing::info!(role = %role.name, "created role");
            } else {
                tracing::debug!(role = %role.name, "role already exists");
            }

            store.replace_capabilities(&role.name, &role.capabilities)?;
            tracing::info!(
                role = %role.name,
                capabilities = role.capabilities.len(),
                "assigned capabilities"
            );

            report.roles.push(SeededRole {
                name: role.name.clone(),
                created,
                capabilities: role.capabilities.len(),
            });
        }
        Ok(report)
    }
}

/// Outcome of seeding one role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SeededRole {
    pub name: String,
    pub created: bool,
    pub capabilities: usize,
}

/// Outcome of a seeding run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SeedReport {
    pub roles: Vec<SeededRole>,
}

impl SeedReport {
    pub fn created(&self) -> impl Iterator<Item = &str> {
        self.roles.iter().filter(|r| r.created).map(|r| r.name.as_str())
    }

    pub fn existing(&self) -> impl Iterator<Item = &str> {
        self.roles.iter().filter(|r| !r.created).map(|r| r.name.as_str())
    }
}

/// Resolve `definitions` against `catalog` plus whatever the store already
/// holds, and write them through `store`.
///
/// Capabilities registered by earlier runs stay selectable, so an `all` rule
/// keeps covering them even when `catalog` no longer names them.
/// Configuration errors surface before anything is written.
pub fn seed<S>(
    store: &mut S,
    catalog: &Catalog,
    definitions: &[RoleDefinition],
) -> std::result::Result<SeedReport, S::Error>
where
    S: RoleStore,
    S::Error: From<Error>,
{
    let mut merged = catalog.clone();
    merged.extend(store.load_catalog()?.entries().cloned());
    let plan = SeedPlan::new(&merged, definitions)?;
    plan.apply(store)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Authorizer, Principal, RoleRegistry};

    fn members(tokens: &[&str]) -> Vec<RoleDefinition> {
        vec![RoleDefinition::new("Members", "Basic user access").tokens(tokens.iter().copied())]
    }

    fn held(registry: &RoleRegistry, role: &str) -> Vec<String> {
        registry.capabilities(role).map(|c| c.to_string()).collect()
    }

    #[test]
    fn test_seed_twice_equals_once() {
        let catalog = Catalog::site_default();
        let defs = crate::Bootstrap::site_default().roles;

        let mut once = RoleRegistry::new();
        seed(&mut once, &catalog, &defs).unwrap();

        let mut twice = RoleRegistry::new();
        let first = seed(&mut twice, &catalog, &defs).unwrap();
        let second = seed(&mut twice, &catalog, &defs).unwrap();

        for (name, role) in once.roles() {
            assert_eq!(twice.get(name), Some(role));
        }
        assert_eq!(first.created().count(), 4);
        assert_eq!(second.created().count(), 0);
        assert_eq!(second.existing().count(), 4);
    }

    #[test]
    fn test_reseed_replaces_not_unions() {
        let catalog = Catalog::site_default();
        let mut registry = RoleRegistry::new();

        seed(&mut registry, &catalog, &members(&["add_article", "change_article"])).unwrap();
        assert_eq!(held(&registry, "Members"), ["add_article", "change_article"]);

        seed(&mut registry, &catalog, &members(&["add_article"])).unwrap();
        assert_eq!(held(&registry, "Members"), ["add_article"]);
    }

    #[test]
    fn test_authors_by_token_list() {
        let catalog = Catalog::site_default();
        let mut registry = RoleRegistry::new();
        let defs = vec![RoleDefinition::new("Authors", "").tokens([
            "add_article",
            "change_article",
            "delete_article",
            "publish_article",
        ])];
        seed(&mut registry, &catalog, &defs).unwrap();

        let author = Principal::new("alice").without_roles().with_role("Authors");
        let auth = Authorizer::new(&registry);
        assert!(auth.can(&author, &"publish_article".into()));
        assert!(!auth.can(&author, &"delete_profile".into()));
    }

    #[test]
    fn test_resources_rule_selects_by_type() {
        let catalog = Catalog::site_default();
        let def = RoleDefinition::new("Moderators", "").resources(["article", "profile"]);
        let resolved = def.resolve(&catalog).unwrap();

        assert!(resolved.contains(&"publish_article".into()));
        assert!(resolved.contains(&"edit_all_profiles".into()));
        assert!(!resolved.contains(&"add_user".into()));
        assert_eq!(resolved.len(), 14);
    }

    #[test]
    fn test_all_rule_tracks_catalog() {
        let mut catalog = Catalog::site_default();
        let def = RoleDefinition::new("Site Admins", "").all();
        assert_eq!(def.resolve(&catalog).unwrap().len(), catalog.len());

        catalog.register_resource("comment");
        let resolved = def.resolve(&catalog).unwrap();
        assert!(resolved.contains(&"delete_comment".into()));
    }

    #[test]
    fn test_unknown_token_aborts_before_writes() {
        let catalog = Catalog::site_default();
        let mut registry = RoleRegistry::new();
        let defs = vec![
            RoleDefinition::new("Members", "").tokens(["add_article"]),
            RoleDefinition::new("Authors", "").tokens(["add_article", "can_fly"]),
        ];

        let err = seed(&mut registry, &catalog, &defs).unwrap_err();
        match err {
            Error::UnknownCapability { role, token } => {
                assert_eq!(role, "Authors");
                assert_eq!(token, "can_fly");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(registry.roles().count(), 0);
    }

    #[test]
    fn test_unknown_resource_is_config_error() {
        let catalog = Catalog::site_default();
        let def = RoleDefinition::new("Moderators", "").resources(["comment"]);
        let err = def.resolve(&catalog).unwrap_err();
        assert!(matches!(err, Error::UnknownResource { resource, .. } if resource == "comment"));
    }

    #[test]
    fn test_duplicate_role_rejected() {
        let catalog = Catalog::site_default();
        let defs = vec![
            RoleDefinition::new("Members", ""),
            RoleDefinition::new("Members", ""),
        ];
        assert!(matches!(SeedPlan::new(&catalog, &defs), Err(Error::Invalid(_))));
    }

    #[test]
    fn test_all_rule_keeps_stored_capabilities() {
        let mut extended = Catalog::site_default();
        extended.register_resource("comment");
        let admins = [RoleDefinition::new("Site Admins", "").all()];

        let mut registry = RoleRegistry::new();
        seed(&mut registry, &extended, &admins).unwrap();
        seed(&mut registry, &Catalog::site_default(), &admins).unwrap();

        let held: BTreeSet<_> = registry.capabilities("Site Admins").cloned().collect();
        assert_eq!(held.len(), extended.len());
        assert!(held.contains(&"delete_comment".into()));
    }

    #[test]
    fn test_tokens_may_name_stored_capabilities() {
        let mut registry = RoleRegistry::new();
        let mut extended = Catalog::site_default();
        extended.register_custom("article", "feature_article", "Can feature article");
        seed(&mut registry, &extended, &[]).unwrap();

        let defs = [RoleDefinition::new("Editors", "").tokens(["feature_article"])];
        seed(&mut registry, &Catalog::site_default(), &defs).unwrap();
        assert_eq!(held(&registry, "Editors"), ["feature_article"]);
    }

    #[test]
    fn test_roles_outside_definitions_survive() {
        let catalog = Catalog::site_default();
        let mut registry = RoleRegistry::new();
        seed(
            &mut registry,
            &catalog,
            &[RoleDefinition::new("Editors", "").tokens(["change_article"])],
        )
        .unwrap();
        seed(&mut registry, &catalog, &members(&["add_article"])).unwrap();

        assert_eq!(held(&registry, "Editors"), ["change_article"]);
    }
}
