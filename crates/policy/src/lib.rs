//! Role-based access control for the content site.
//!
//! Core principle: **a principal may act only through a capability one of its
//! roles grants, through ownership where a guard allows it, or as a
//! superuser.**
//!
//! # Overview
//!
//! - [`Catalog`] lists every [`Capability`] the site knows, scoped to resource
//!   types.
//! - [`RoleRegistry`] holds each role's capability set, materialized from a
//!   [`RoleStore`].
//! - [`Authorizer`] answers `can(principal, capability)` and evaluates
//!   composable [`Requirement`]s such as "owner or blanket capability".
//! - [`seed`] converges a store onto a set of [`RoleDefinition`]s.
//!
//! # Example
//!
//! ```
//! use policy::{Authorizer, Bootstrap, Principal, Requirement, Resource, RoleRegistry, seed};
//!
//! let bootstrap = Bootstrap::site_default();
//! let mut registry = RoleRegistry::new();
//! seed(&mut registry, &bootstrap.catalog(), &bootstrap.roles)?;
//!
//! let auth = Authorizer::new(&registry);
//! let alice = Principal::new("alice").with_role("Authors");
//! assert!(auth.can(&alice, &"publish_article".into()));
//!
//! let bob = Principal::new("bob");
//! let article = Resource::owned_by("article", alice.id);
//! let edit = Requirement::owner_or("edit_all_articles");
//! assert!(auth.check(&alice, &edit, Some(&article)).is_allowed());
//! assert!(!auth.check(&bob, &edit, Some(&article)).is_allowed());
//! # Ok::<(), policy::Error>(())
//! ```

mod bootstrap;
mod capability;
mod error;
mod policy;
mod principal;
mod requirement;
mod role;
mod seed;

pub use bootstrap::{Bootstrap, CustomCapability, ResourceSpec};
pub use capability::{Capability, CapabilityEntry, Catalog, DEFAULT_ACTIONS};
pub use error::{Error, Result};
pub use policy::{Authorizer, Decision};
pub use principal::{DEFAULT_ROLE, Principal, PrincipalId, Resource, ResourceId};
pub use requirement::Requirement;
pub use role::{Role, RoleRegistry, RoleStore};
pub use seed::{PlannedRole, RoleDefinition, SeedPlan, SeedReport, SeededRole, SelectorRule, seed};
