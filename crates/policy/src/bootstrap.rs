//! Bootstrap definitions loaded from TOML.

use crate::{Catalog, Error, Requirement, Result, RoleDefinition, SeedPlan};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// A resource type and the capabilities it contributes to the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceSpec {
    pub name: String,

    /// Register add/change/delete/view for this type.
    #[serde(default = "default_true")]
    pub default_actions: bool,

    /// Capabilities beyond the default actions.
    #[serde(default)]
    pub custom: Vec<CustomCapability>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomCapability {
    pub token: String,
    #[serde(default)]
    pub description: String,
}

fn default_true() -> bool {
    true
}

/// Everything the seeder and the guard lookups need.
///
/// Sections left out of the document fall back to the site defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bootstrap {
    #[serde(default = "default_resources")]
    pub resources: Vec<ResourceSpec>,

    #[serde(default = "default_roles")]
    pub roles: Vec<RoleDefinition>,

    /// Named requirements checked before actions.
    #[serde(default = "default_guards")]
    pub guards: BTreeMap<String, Requirement>,
}

impl Default for Bootstrap {
    fn default() -> Self {
        Self::site_default()
    }
}

impl Bootstrap {
    /// Load definitions from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::parse(&content)
    }

    /// Parse definitions from TOML string.
    pub fn parse(toml: &str) -> Result<Self> {
        toml::from_str(toml).map_err(|e| Error::Parse(e.to_string()))
    }

    /// The content site's resources, roles and view guards.
    pub fn site_default() -> Self {
        Self {
            resources: default_resources(),
            roles: default_roles(),
            guards: default_guards(),
        }
    }

    /// Build the capability catalog from the resource section.
    pub fn catalog(&self) -> Catalog {
        let mut catalog = Catalog::new();
        for resource in &self.resources {
            if resource.default_actions {
                catalog.register_resource(&resource.name);
            }
            for custom in &resource.custom {
                catalog.register_custom(&resource.name, custom.token.as_str(), &custom.description);
            }
        }
        catalog
    }

    /// Resolve the role definitions and check every guard against the catalog.
    pub fn plan(&self) -> Result<SeedPlan> {
        self.plan_with(&Catalog::new())
    }

    /// Like [`Bootstrap::plan`], but capabilities already in `stored` stay
    /// selectable alongside the configured ones.
    pub fn plan_with(&self, stored: &Catalog) -> Result<SeedPlan> {
        let mut catalog = self.catalog();
        catalog.extend(stored.entries().cloned());
        for (name, requirement) in &self.guards {
            if let Some(token) = requirement.capabilities().into_iter().find(|c| !catalog.contains(c)) {
                return Err(Error::UnknownGuardCapability {
                    guard: name.clone(),
                    token: token.to_string(),
                });
            }
        }
        SeedPlan::new(&catalog, &self.roles)
    }

    pub fn guard(&self, name: &str) -> Result<&Requirement> {
        self.guards
            .get(name)
            .ok_or_else(|| Error::Invalid(format!("no guard named '{name}'")))
    }
}

fn custom(token: &str, description: &str) -> CustomCapability {
    CustomCapability {
        token: token.to_string(),
        description: description.to_string(),
    }
}

fn resource(name: &str, custom: Vec<CustomCapability>) -> ResourceSpec {
    ResourceSpec {
        name: name.to_string(),
        default_actions: true,
        custom,
    }
}

/// The profile's "delete user profiles" permission is the default
/// `delete_profile` action, not a separate custom token.
fn default_resources() -> Vec<ResourceSpec> {
    vec![
        resource("user", Vec::new()),
        resource("group", Vec::new()),
        resource(
            "profile",
            vec![
                custom("view_all_profiles", "Can view all user profiles"),
                custom("edit_all_profiles", "Can edit all user profiles"),
            ],
        ),
        resource(
            "article",
            vec![
                custom("publish_article", "Can publish articles"),
                custom("unpublish_article", "Can unpublish articles"),
                custom("view_unpublished_article", "Can view unpublished articles"),
                custom("edit_all_articles", "Can edit any article"),
            ],
        ),
    ]
}

fn default_roles() -> Vec<RoleDefinition> {
    vec![
        RoleDefinition::new("Site Admins", "Full administrative access").all(),
        RoleDefinition::new("Moderators", "Content moderation and user management")
            .resources(["article", "profile"]),
        RoleDefinition::new("Authors", "Can create and publish articles").tokens([
            "add_article",
            "change_article",
            "delete_article",
            "publish_article",
            "unpublish_article",
        ]),
        RoleDefinition::new(crate::DEFAULT_ROLE, "Basic user access")
            .tokens(["add_article", "change_article"]),
    ]
}

fn default_guards() -> BTreeMap<String, Requirement> {
    BTreeMap::from([
        (
            "user_list".to_string(),
            Requirement::capability("view_all_profiles"),
        ),
        (
            "user_management".to_string(),
            Requirement::capability("edit_all_profiles"),
        ),
        (
            "article_edit".to_string(),
            Requirement::any_of([
                Requirement::Owner,
                Requirement::capability("edit_all_articles"),
                Requirement::Staff,
                Requirement::Superuser,
            ]),
        ),
        (
            "article_publish".to_string(),
            Requirement::any_of([Requirement::capability("publish_article"), Requirement::Staff]),
        ),
        ("admin_user_update".to_string(), Requirement::Superuser),
        ("bulk_article_update".to_string(), Requirement::Staff),
    ])
}
