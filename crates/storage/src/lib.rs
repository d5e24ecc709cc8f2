//! SQLite-backed persistence for roles, principals and resources.
//!
//! This crate is the backing store behind the [`policy`] crate: it keeps the
//! capability catalog, each role's capability set, the principals and their
//! role memberships, and the resources whose owners drive ownership checks.
//!
//! # Overview
//!
//! The [`Store`] implements [`policy::RoleStore`], so the bootstrap seeder
//! writes straight through it. Every seeding write is idempotent:
//!
//! - catalog rows and roles are inserted only if missing
//! - a role's capability set is replaced wholesale inside one transaction
//!
//! Two deploy processes seeding the same database at once therefore converge
//! on the same assignments without any locking of their own.
//!
//! Reads hand back already-materialized values ([`policy::RoleRegistry`],
//! [`policy::Principal`]) for the [`policy::Authorizer`] to evaluate.
//!
//! # Example
//!
//! ```no_run
//! use policy::{Authorizer, Bootstrap, seed};
//! use storage::Store;
//!
//! let mut store = Store::open("gatehouse.db")?;
//! let bootstrap = Bootstrap::site_default();
//! seed(&mut store, &bootstrap.catalog(), &bootstrap.roles)?;
//!
//! let alice = store.create_principal("alice", false, false)?;
//! store.assign_role("alice", "Authors")?;
//!
//! let registry = store.load_registry()?;
//! let auth = Authorizer::new(&registry);
//! let alice = store.find_principal(&alice.username)?;
//! assert!(auth.can(&alice, &"publish_article".into()));
//! # Ok::<(), storage::Error>(())
//! ```

mod error;
mod record;
mod store;

pub use error::{Error, Result};
pub use record::{PrincipalRecord, ResourceRecord};
pub use store::Store;
